//! A typed, concurrent single-writer/many-reader store. Mirrors the
//! original implementation's per-kind `map[string]*T` guarded by a
//! `sync.RWMutex`: every Get/List clones out, every Insert clones in, so
//! the cache never hands out data that aliases its own internal state.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use mesh_core::Identified;

use crate::error::CacheError;
use crate::revision::Revision;

pub struct Store<T> {
	inner: RwLock<HashMap<String, T>>,
	revision: Arc<Revision>,
}

impl<T> Store<T>
where
	T: Identified + Clone,
{
	pub fn new(revision: Arc<Revision>) -> Self {
		Store { inner: RwLock::new(HashMap::new()), revision }
	}

	pub fn get(&self, id: &str) -> Result<T, CacheError> {
		let store = self.inner.read().unwrap();
		store.get(id).cloned().ok_or(CacheError::ObjectNotFound)
	}

	pub fn list(&self) -> Vec<T> {
		let store = self.inner.read().unwrap();
		store.values().cloned().collect()
	}

	/// Inserts or replaces `obj`, keyed by its id, and advances the
	/// process-wide revision. Returns the revision the mutation landed at.
	pub fn insert(&self, obj: T) -> u64 {
		let id = obj.id().as_str().to_string();
		let mut store = self.inner.write().unwrap();
		store.insert(id, obj);
		self.revision.advance()
	}

	/// Deletes the object by id, advancing the revision on success.
	pub fn delete(&self, id: &str) -> Result<u64, CacheError> {
		let mut store = self.inner.write().unwrap();
		if store.remove(id).is_none() {
			return Err(CacheError::ObjectNotFound);
		}
		drop(store);
		Ok(self.revision.advance())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use mesh_core::{Route, UpstreamType, Upstream};

	fn route(name: &str) -> Route {
		Route::new(name, vec!["/x".into()], "u1")
	}

	#[test]
	fn get_and_list_return_deep_copies() {
		let store: Store<Route> = Store::new(Arc::new(Revision::default()));
		let r = route("r1");
		store.insert(r.clone());

		let mut got = store.get(&r.id).unwrap();
		got.hosts.push("mutated.example".into());

		assert_ne!(got, store.get(&r.id).unwrap());
		assert_eq!(store.list().len(), 1);
	}

	#[test]
	fn missing_get_is_object_not_found() {
		let store: Store<Route> = Store::new(Arc::new(Revision::default()));
		assert_eq!(store.get("nope"), Err(CacheError::ObjectNotFound));
	}

	#[test]
	fn missing_delete_is_object_not_found() {
		let store: Store<Route> = Store::new(Arc::new(Revision::default()));
		assert_eq!(store.delete("nope"), Err(CacheError::ObjectNotFound));
	}

	#[test]
	fn insert_and_delete_each_advance_revision_by_one() {
		let revision = Arc::new(Revision::default());
		let store: Store<Upstream> = Store::new(revision.clone());
		let u = Upstream::new("u1", UpstreamType::Roundrobin);

		assert_eq!(store.insert(u.clone()), 1);
		assert_eq!(store.delete(&u.id).unwrap(), 2);
		assert_eq!(revision.current(), 2);
	}
}
