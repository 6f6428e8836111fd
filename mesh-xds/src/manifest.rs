//! The per-resource-kind manifest the provisioner rebuilds on every
//! response/file change, diffed against the previous one to produce the
//! emitted event batch.

use mesh_core::diff::{compare_routes, compare_upstreams};
use mesh_core::model::{Event, Route, Upstream};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Manifest {
	pub routes: Vec<Route>,
	pub upstreams: Vec<Upstream>,
}

impl Manifest {
	pub fn len(&self) -> usize {
		self.routes.len() + self.upstreams.len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Diffs `self` (the new manifest) against `previous`, returning the
	/// batch of events to emit. Route and Upstream diffs are computed
	/// independently and concatenated; order within a kind follows the
	/// diff helper's added/deleted/updated grouping.
	pub fn diff_from(&self, previous: &Manifest) -> Vec<AnyEvent> {
		let (added, deleted, updated) = compare_routes(&previous.routes, &self.routes);
		let mut events: Vec<AnyEvent> = Vec::new();
		events.extend(added.into_iter().map(|r| AnyEvent::Route(Event::add(r))));
		events.extend(updated.into_iter().map(|r| AnyEvent::Route(Event::update(r))));
		events.extend(deleted.into_iter().map(|r| AnyEvent::Route(Event::delete(r.clone(), r))));

		let (added, deleted, updated) = compare_upstreams(&previous.upstreams, &self.upstreams);
		events.extend(added.into_iter().map(|u| AnyEvent::Upstream(Event::add(u))));
		events.extend(updated.into_iter().map(|u| AnyEvent::Upstream(Event::update(u))));
		events.extend(deleted.into_iter().map(|u| AnyEvent::Upstream(Event::delete(u.clone(), u))));
		events
	}
}

/// An Event for either resource kind, as sent on the provisioner's output
/// channel; the orchestrator dispatches on this before handing batches to
/// the cache.
#[derive(Debug, Clone, PartialEq)]
pub enum AnyEvent {
	Route(Event<Route>),
	Upstream(Event<Upstream>),
}

#[cfg(test)]
mod tests {
	use super::*;

	fn route(name: &str) -> Route {
		Route::new(name, vec!["/x".into()], "u1")
	}

	#[test]
	fn identical_manifests_emit_nothing() {
		let m = Manifest { routes: vec![route("r1")], upstreams: vec![] };
		assert!(m.diff_from(&m).is_empty());
	}

	#[test]
	fn new_route_emits_add() {
		let old = Manifest::default();
		let new = Manifest { routes: vec![route("r1")], upstreams: vec![] };
		let events = new.diff_from(&old);
		assert_eq!(events, vec![AnyEvent::Route(Event::add(route("r1")))]);
	}

	#[test]
	fn removed_route_emits_delete_with_tombstone() {
		let old = Manifest { routes: vec![route("r1")], upstreams: vec![] };
		let new = Manifest::default();
		let events = new.diff_from(&old);
		match &events[0] {
			AnyEvent::Route(ev) => assert_eq!(ev.tombstone, Some(route("r1"))),
			_ => panic!("expected a route event"),
		}
	}
}
