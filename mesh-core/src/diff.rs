//! Generic id-keyed diffing, mirroring the original implementation's
//! `CompareRoutes`/`CompareUpstreams` helpers: given an old and a new
//! manifest for one resource kind, compute what was added, deleted, and
//! updated by id.

use std::collections::HashMap;

use crate::model::Identified;

/// Computes `(added, deleted, updated)` between `old` and `new`, keyed by
/// [`Identified::id`]. An item present in both with an unequal value is
/// `updated`; `old` and `new` are otherwise left untouched by identity
/// (this only reports membership, it never mutates either slice).
pub fn diff_by_id<T>(old: &[T], new: &[T]) -> (Vec<T>, Vec<T>, Vec<T>)
where
	T: Identified + Clone + PartialEq,
{
	if old.is_empty() {
		return (new.to_vec(), Vec::new(), Vec::new());
	}
	if new.is_empty() {
		return (Vec::new(), old.to_vec(), Vec::new());
	}

	let old_by_id: HashMap<&str, &T> = old.iter().map(|o| (o.id().as_str(), o)).collect();
	let new_by_id: HashMap<&str, &T> = new.iter().map(|n| (n.id().as_str(), n)).collect();

	let mut added = Vec::new();
	let mut updated = Vec::new();
	for n in new {
		match old_by_id.get(n.id().as_str()) {
			None => added.push(n.clone()),
			Some(o) if *o != n => updated.push(n.clone()),
			Some(_) => {}
		}
	}

	let mut deleted = Vec::new();
	for o in old {
		if !new_by_id.contains_key(o.id().as_str()) {
			deleted.push(o.clone());
		}
	}

	(added, deleted, updated)
}

/// `CompareRoutes` equivalent.
pub fn compare_routes(old: &[crate::model::Route], new: &[crate::model::Route]) -> (Vec<crate::model::Route>, Vec<crate::model::Route>, Vec<crate::model::Route>) {
	diff_by_id(old, new)
}

/// `CompareUpstreams` equivalent.
pub fn compare_upstreams(old: &[crate::model::Upstream], new: &[crate::model::Upstream]) -> (Vec<crate::model::Upstream>, Vec<crate::model::Upstream>, Vec<crate::model::Upstream>) {
	diff_by_id(old, new)
}
