//! The process-wide revision counter. Every successful cache mutation
//! advances it by exactly one; the etcd façade reads it to stamp
//! `createRevision`/`modRevision` on the keys it serves.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct Revision(AtomicU64);

impl Revision {
	pub fn current(&self) -> u64 {
		self.0.load(Ordering::SeqCst)
	}

	/// Advances the counter by one and returns the new value.
	pub fn advance(&self) -> u64 {
		self.0.fetch_add(1, Ordering::SeqCst) + 1
	}
}
