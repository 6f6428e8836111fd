//! The in-memory Route/Upstream cache (component C3): a typed, concurrent
//! store with deep-copy semantics and a process-wide revision counter that
//! the etcd façade uses to stamp `createRevision`/`modRevision`.

pub mod error;
pub mod revision;
pub mod store;

use std::sync::Arc;

use mesh_core::{Event, EventKind, Route, Upstream};

pub use error::CacheError;
pub use revision::Revision;
pub use store::Store;

pub struct Cache {
	routes: Store<Route>,
	upstreams: Store<Upstream>,
	revision: Arc<Revision>,
}

impl Cache {
	pub fn new() -> Self {
		let revision = Arc::new(Revision::default());
		Cache { routes: Store::new(revision.clone()), upstreams: Store::new(revision.clone()), revision }
	}

	pub fn routes(&self) -> &Store<Route> {
		&self.routes
	}

	pub fn upstreams(&self) -> &Store<Upstream> {
		&self.upstreams
	}

	pub fn revision(&self) -> u64 {
		self.revision.current()
	}

	/// Applies one Route event to the cache, returning the revision it
	/// landed at. Add/Update both insert (Insert is upsert-by-id); Delete
	/// removes. Deleting an id the cache never held is not an error here —
	/// the provisioner's own diff is authoritative about what existed.
	pub fn apply_route_event(&self, event: &Event<Route>) -> u64 {
		match event.kind {
			EventKind::Add | EventKind::Update => self.routes.insert(event.object.clone()),
			EventKind::Delete => {
				self.routes.delete(&event.object.id).unwrap_or_else(|_| self.revision.advance())
			}
		}
	}

	pub fn apply_upstream_event(&self, event: &Event<Upstream>) -> u64 {
		match event.kind {
			EventKind::Add | EventKind::Update => self.upstreams.insert(event.object.clone()),
			EventKind::Delete => {
				self.upstreams.delete(&event.object.id).unwrap_or_else(|_| self.revision.advance())
			}
		}
	}
}

impl Default for Cache {
	fn default() -> Self {
		Self::new()
	}
}
