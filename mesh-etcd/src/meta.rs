//! `KeyMeta`: the `(createRevision, modRevision)` pair tracked per
//! published key, created lazily on first emission and dropped on delete.

use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyMeta {
	pub create_revision: i64,
	pub mod_revision: i64,
}

#[derive(Default)]
pub struct MetaTable {
	entries: Mutex<HashMap<String, KeyMeta>>,
}

impl MetaTable {
	/// Returns the meta for `key`, creating it at `revision` (both fields
	/// equal) the first time it's seen.
	pub fn get_or_create(&self, key: &str, revision: u64) -> KeyMeta {
		let mut entries = self.entries.lock().unwrap();
		*entries
			.entry(key.to_string())
			.or_insert(KeyMeta { create_revision: revision as i64, mod_revision: revision as i64 })
	}

	/// Records a PUT at `revision`: creates the entry if this is the first
	/// time the key is seen, otherwise bumps `mod_revision` only.
	pub fn put(&self, key: &str, revision: u64) -> KeyMeta {
		let mut entries = self.entries.lock().unwrap();
		let meta = entries
			.entry(key.to_string())
			.or_insert(KeyMeta { create_revision: revision as i64, mod_revision: revision as i64 });
		meta.mod_revision = revision as i64;
		*meta
	}

	pub fn remove(&self, key: &str) {
		self.entries.lock().unwrap().remove(key);
	}
}
