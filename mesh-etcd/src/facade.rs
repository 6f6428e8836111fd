//! The façade's shared state: the cache it serves reads from, the
//! KeyMeta table, and the registry of live watch streams it fans events
//! out to.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use mesh_cache::Cache;
use mesh_core::{Event as NativeEvent, Route, Upstream};
use rand::Rng;
use tokio::sync::mpsc;
use tonic::Status;
use tracing::warn;

use crate::conformance;
use crate::error::FacadeError;
use crate::keys::{self, Query, ResourceKind};
use crate::meta::MetaTable;
use crate::pb::etcdserverpb::event::EventType;
use crate::pb::etcdserverpb::{Event, KeyValue, ResponseHeader, WatchCreateRequest, WatchResponse};

/// Where the façade reads the current revision from. Implemented for
/// [`Cache`] so the orchestrator can hand the façade a shared `Arc<Cache>`
/// directly as its `Revisioner`, rather than the façade depending back on
/// a concrete orchestrator type.
pub trait Revisioner: Send + Sync {
	fn current_revision(&self) -> u64;
}

impl Revisioner for Cache {
	fn current_revision(&self) -> u64 {
		self.revision()
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct WatchTarget {
	kind: ResourceKind,
	id: Option<String>,
}

struct WatcherEntry {
	tx: mpsc::Sender<Result<WatchResponse, Status>>,
	watches: Mutex<HashMap<i64, WatchTarget>>,
}

pub enum CreateOutcome {
	Ignored,
	Response(WatchResponse),
}

pub struct Facade {
	cache: Arc<Cache>,
	key_prefix: String,
	meta: MetaTable,
	watchers: Mutex<HashMap<u64, WatcherEntry>>,
	next_stream_id: AtomicU64,
}

impl Facade {
	pub fn new(cache: Arc<Cache>, key_prefix: impl Into<String>) -> Self {
		Facade { cache, key_prefix: key_prefix.into(), meta: MetaTable::default(), watchers: Mutex::new(HashMap::new()), next_stream_id: AtomicU64::new(1) }
	}

	pub fn key_prefix(&self) -> &str {
		&self.key_prefix
	}

	pub fn current_revision(&self) -> u64 {
		self.cache.revision()
	}

	fn header(&self) -> ResponseHeader {
		ResponseHeader { revision: self.current_revision() }
	}

	pub fn range(&self, query: Query, keys_only: bool) -> Vec<KeyValue> {
		match query {
			Query::Exact { kind, id } => self.lookup_one(kind, &id, keys_only).into_iter().collect(),
			Query::Range { kind } => self.list_kind(kind, keys_only),
		}
	}

	fn lookup_one(&self, kind: ResourceKind, id: &str, keys_only: bool) -> Option<KeyValue> {
		let value = match kind {
			ResourceKind::Route => self.cache.routes().get(id).ok().map(|r| serde_json::to_vec(&r).expect("Route serializes")),
			ResourceKind::Upstream => self.cache.upstreams().get(id).ok().map(|u| serde_json::to_vec(&u).expect("Upstream serializes")),
		}?;
		Some(self.to_kv(kind, id, value, keys_only))
	}

	fn list_kind(&self, kind: ResourceKind, keys_only: bool) -> Vec<KeyValue> {
		match kind {
			ResourceKind::Route => self
				.cache
				.routes()
				.list()
				.into_iter()
				.map(|r| {
					let id = r.id.to_string();
					let value = serde_json::to_vec(&r).expect("Route serializes");
					self.to_kv(kind, &id, value, keys_only)
				})
				.collect(),
			ResourceKind::Upstream => self
				.cache
				.upstreams()
				.list()
				.into_iter()
				.map(|u| {
					let id = u.id.to_string();
					let value = serde_json::to_vec(&u).expect("Upstream serializes");
					self.to_kv(kind, &id, value, keys_only)
				})
				.collect(),
		}
	}

	fn to_kv(&self, kind: ResourceKind, id: &str, value: Vec<u8>, keys_only: bool) -> KeyValue {
		let key = keys::object_key(&self.key_prefix, kind, id);
		let meta = self.meta.get_or_create(&key, self.current_revision());
		KeyValue { key: key.into_bytes(), create_revision: meta.create_revision, mod_revision: meta.mod_revision, value: if keys_only { Vec::new() } else { value } }
	}

	pub fn register_stream(&self) -> (u64, mpsc::Receiver<Result<WatchResponse, Status>>) {
		let (tx, rx) = mpsc::channel(64);
		let id = self.next_stream_id.fetch_add(1, Ordering::Relaxed);
		self.watchers.lock().unwrap().insert(id, WatcherEntry { tx, watches: Mutex::new(HashMap::new()) });
		(id, rx)
	}

	pub fn deregister_stream(&self, stream_id: u64) {
		self.watchers.lock().unwrap().remove(&stream_id);
	}

	/// Delivers a one-shot create/cancel reply. Unlike [`Facade::dispatch`]
	/// this blocks, since losing a direct reply would desync the client's
	/// protocol state rather than just delay an update.
	pub async fn send_reply(&self, stream_id: u64, item: Result<WatchResponse, Status>) {
		let tx = self.watchers.lock().unwrap().get(&stream_id).map(|e| e.tx.clone());
		if let Some(tx) = tx {
			let _ = tx.send(item).await;
		}
	}

	pub fn create_watch(&self, stream_id: u64, req: WatchCreateRequest) -> Result<CreateOutcome, FacadeError> {
		conformance::check_watch_create(&req)?;

		let Some(query) = keys::parse_query(&self.key_prefix, &req.key, &req.range_end) else {
			return Ok(CreateOutcome::Ignored);
		};
		let (kind, id_filter) = match query {
			Query::Exact { kind, id } => (kind, Some(id)),
			Query::Range { kind } => (kind, None),
		};

		let watchers = self.watchers.lock().unwrap();
		let entry = watchers.get(&stream_id).ok_or(FacadeError::UnknownWatchId(req.watch_id))?;
		let mut watches = entry.watches.lock().unwrap();

		let watch_id = if req.watch_id == 0 { self.assign_id(&watches) } else { req.watch_id };
		if watches.contains_key(&watch_id) {
			return Err(FacadeError::DuplicateWatchId(watch_id));
		}

		let events = if req.start_revision > 0 { self.replay(kind, id_filter.as_deref(), req.start_revision as u64) } else { Vec::new() };
		watches.insert(watch_id, WatchTarget { kind, id: id_filter });

		Ok(CreateOutcome::Response(WatchResponse { header: Some(self.header()), watch_id, created: true, events, ..Default::default() }))
	}

	fn assign_id(&self, existing: &HashMap<i64, WatchTarget>) -> i64 {
		loop {
			let candidate = rand::rng().random_range(1..i64::MAX);
			if !existing.contains_key(&candidate) {
				return candidate;
			}
		}
	}

	fn replay(&self, kind: ResourceKind, id_filter: Option<&str>, start_revision: u64) -> Vec<Event> {
		let objects: Vec<(String, Vec<u8>)> = match kind {
			ResourceKind::Route => self
				.cache
				.routes()
				.list()
				.into_iter()
				.filter(|r| id_filter.is_none_or(|f| r.id.as_str() == f))
				.map(|r| (r.id.to_string(), serde_json::to_vec(&r).expect("Route serializes")))
				.collect(),
			ResourceKind::Upstream => self
				.cache
				.upstreams()
				.list()
				.into_iter()
				.filter(|u| id_filter.is_none_or(|f| u.id.as_str() == f))
				.map(|u| (u.id.to_string(), serde_json::to_vec(&u).expect("Upstream serializes")))
				.collect(),
		};

		objects
			.into_iter()
			.filter_map(|(id, value)| {
				let key = keys::object_key(&self.key_prefix, kind, &id);
				let meta = self.meta.get_or_create(&key, self.current_revision());
				if (meta.mod_revision as u64) < start_revision {
					return None;
				}
				Some(Event { r#type: EventType::Put as i32, kv: Some(KeyValue { key: key.into_bytes(), create_revision: meta.create_revision, mod_revision: meta.mod_revision, value }) })
			})
			.collect()
	}

	pub fn cancel_watch(&self, stream_id: u64, watch_id: i64) -> Result<WatchResponse, FacadeError> {
		let watchers = self.watchers.lock().unwrap();
		let entry = watchers.get(&stream_id).ok_or(FacadeError::UnknownWatchId(watch_id))?;
		let mut watches = entry.watches.lock().unwrap();
		if watches.remove(&watch_id).is_none() {
			return Err(FacadeError::UnknownWatchId(watch_id));
		}
		Ok(WatchResponse { header: Some(self.header()), watch_id, canceled: true, ..Default::default() })
	}

	/// Applies one Route mutation to the KeyMeta table and fans it out to
	/// every watch stream with a matching watch id.
	pub fn notify_route(&self, event: &NativeEvent<Route>, revision: u64) {
		let id = event.object.id.to_string();
		let value = serde_json::to_vec(&event.object).expect("Route serializes");
		self.notify(ResourceKind::Route, &id, value, event.tombstone.is_some(), revision);
	}

	pub fn notify_upstream(&self, event: &NativeEvent<Upstream>, revision: u64) {
		let id = event.object.id.to_string();
		let value = serde_json::to_vec(&event.object).expect("Upstream serializes");
		self.notify(ResourceKind::Upstream, &id, value, event.tombstone.is_some(), revision);
	}

	fn notify(&self, kind: ResourceKind, id: &str, value: Vec<u8>, is_delete: bool, revision: u64) {
		let key = keys::object_key(&self.key_prefix, kind, id);

		let meta = if is_delete {
			let meta = self.meta.get_or_create(&key, revision);
			self.meta.remove(&key);
			meta
		} else {
			self.meta.put(&key, revision)
		};

		let wire_event = Event {
			r#type: if is_delete { EventType::Delete as i32 } else { EventType::Put as i32 },
			kv: Some(KeyValue { key: key.into_bytes(), create_revision: meta.create_revision, mod_revision: meta.mod_revision, value: if is_delete { Vec::new() } else { value } }),
		};

		self.dispatch(kind, id, wire_event, revision);
	}

	/// Non-blocking: a slow or closed watch stream drops the update rather
	/// than stalling the orchestrator's apply loop.
	fn dispatch(&self, kind: ResourceKind, id: &str, event: Event, revision: u64) {
		let watchers = self.watchers.lock().unwrap();
		for entry in watchers.values() {
			let watch_ids: Vec<i64> = {
				let watches = entry.watches.lock().unwrap();
				watches.iter().filter(|(_, t)| t.kind == kind && t.id.as_deref().is_none_or(|f| f == id)).map(|(id, _)| *id).collect()
			};
			for watch_id in watch_ids {
				let response = WatchResponse { header: Some(ResponseHeader { revision }), watch_id, events: vec![event.clone()], ..Default::default() };
				if entry.tx.try_send(Ok(response)).is_err() {
					warn!(watch_id, "watch stream backlogged or closed, dropping fan-out event");
				}
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use mesh_core::{Upstream as NativeUpstream, UpstreamType};

	fn upstream(name: &str) -> NativeUpstream {
		NativeUpstream::new(name, UpstreamType::Roundrobin)
	}

	#[test]
	fn range_for_list_returns_one_keyvalue_with_expected_key() {
		let cache = Arc::new(Cache::new());
		let u = upstream("1");
		cache.apply_upstream_event(&NativeEvent::add(u.clone()));
		let facade = Facade::new(cache, "/apisix");

		let kvs = facade.range(Query::Range { kind: ResourceKind::Upstream }, false);
		assert_eq!(kvs.len(), 1);
		assert_eq!(String::from_utf8(kvs[0].key.clone()).unwrap(), format!("/apisix/upstreams/{}", u.id));
		assert_eq!(kvs[0].mod_revision, kvs[0].create_revision);
	}

	#[test]
	fn watch_replay_includes_only_objects_at_or_after_start_revision() {
		let cache = Arc::new(Cache::new());
		let facade = Facade::new(cache.clone(), "/apisix");

		// Three upstreams land at revisions 1, 5 and 8 respectively via
		// explicit notify() calls.
		let a = upstream("a");
		let b = upstream("b");
		let c = upstream("c");
		cache.apply_upstream_event(&NativeEvent::add(a.clone()));
		facade.notify_upstream(&NativeEvent::add(a.clone()), 1);
		cache.apply_upstream_event(&NativeEvent::add(b.clone()));
		facade.notify_upstream(&NativeEvent::add(b.clone()), 5);
		cache.apply_upstream_event(&NativeEvent::add(c.clone()));
		facade.notify_upstream(&NativeEvent::add(c.clone()), 8);

		let (stream_id, _rx) = facade.register_stream();
		let outcome = facade
			.create_watch(stream_id, WatchCreateRequest { key: b"/apisix/upstreams".to_vec(), range_end: keys::next_prefix("/apisix/upstreams"), start_revision: 4, ..Default::default() })
			.unwrap();

		let CreateOutcome::Response(resp) = outcome else { panic!("expected a response") };
		assert!(resp.created);
		assert_eq!(resp.events.len(), 2);
	}

	#[test]
	fn duplicate_watch_id_on_same_stream_is_rejected() {
		let cache = Arc::new(Cache::new());
		let facade = Facade::new(cache, "/apisix");
		let (stream_id, _rx) = facade.register_stream();
		let req = WatchCreateRequest { key: b"/apisix/routes".to_vec(), range_end: keys::next_prefix("/apisix/routes"), watch_id: 7, ..Default::default() };
		facade.create_watch(stream_id, req.clone()).unwrap();
		assert!(matches!(facade.create_watch(stream_id, req), Err(FacadeError::DuplicateWatchId(7))));
	}

	#[test]
	fn cancel_unknown_watch_id_is_an_error() {
		let cache = Arc::new(Cache::new());
		let facade = Facade::new(cache, "/apisix");
		let (stream_id, _rx) = facade.register_stream();
		assert!(matches!(facade.cancel_watch(stream_id, 42), Err(FacadeError::UnknownWatchId(42))));
	}
}
