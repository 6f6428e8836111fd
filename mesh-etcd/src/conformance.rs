//! Protocol-conformance checks, kept out of the request handlers so
//! Range and Watch share exactly one definition of "capable".

use crate::error::FacadeError;
use crate::pb::etcdserverpb::{RangeRequest, SortOrder, WatchCreateRequest};

pub fn check_range(req: &RangeRequest) -> Result<(), FacadeError> {
	if req.key.is_empty() {
		return Err(FacadeError::EmptyKey);
	}
	if req.limit != 0 || req.sort_order != SortOrder::None as i32 || req.revision != 0 {
		return Err(FacadeError::NotCapable);
	}
	Ok(())
}

pub fn check_watch_create(req: &WatchCreateRequest) -> Result<(), FacadeError> {
	if req.key.is_empty() {
		return Err(FacadeError::EmptyKey);
	}
	if req.prev_kv || req.progress_notify || req.fragment {
		return Err(FacadeError::NotCapable);
	}
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn empty_key_is_rejected() {
		let req = RangeRequest { key: vec![], ..Default::default() };
		assert!(matches!(check_range(&req), Err(FacadeError::EmptyKey)));
	}

	#[test]
	fn limit_sort_or_revision_is_not_capable() {
		let base = RangeRequest { key: b"/apisix/routes".to_vec(), ..Default::default() };
		assert!(matches!(check_range(&RangeRequest { limit: 1, ..base.clone() }), Err(FacadeError::NotCapable)));
		assert!(matches!(
			check_range(&RangeRequest { sort_order: SortOrder::Ascend as i32, ..base.clone() }),
			Err(FacadeError::NotCapable)
		));
		assert!(matches!(check_range(&RangeRequest { revision: 5, ..base }), Err(FacadeError::NotCapable)));
	}

	#[test]
	fn plain_range_is_capable() {
		let req = RangeRequest { key: b"/apisix/routes".to_vec(), ..Default::default() };
		assert!(check_range(&req).is_ok());
	}

	#[test]
	fn watch_create_rejects_prev_kv_progress_notify_fragment() {
		let base = WatchCreateRequest { key: b"/apisix/routes".to_vec(), ..Default::default() };
		assert!(matches!(check_watch_create(&WatchCreateRequest { prev_kv: true, ..base.clone() }), Err(FacadeError::NotCapable)));
		assert!(matches!(
			check_watch_create(&WatchCreateRequest { progress_notify: true, ..base.clone() }),
			Err(FacadeError::NotCapable)
		));
		assert!(matches!(check_watch_create(&WatchCreateRequest { fragment: true, ..base }), Err(FacadeError::NotCapable)));
	}
}
