//! Wires a provisioner's event batches into the cache and the etcd facade,
//! applying each event to the cache before notifying the facade so watch
//! replay never observes a notification ahead of the state it describes.

use std::sync::Arc;

use mesh_cache::Cache;
use mesh_etcd::Facade;
use mesh_xds::AnyEvent;
use tokio::sync::mpsc;
use tracing::info;

pub struct Orchestrator {
	cache: Arc<Cache>,
	facade: Arc<Facade>,
}

impl Orchestrator {
	pub fn new(cache: Arc<Cache>, facade: Arc<Facade>) -> Self {
		Orchestrator { cache, facade }
	}

	/// Applies one batch to the cache, then fans the same batch out to the
	/// facade at the revision each mutation landed at. The apply must
	/// happen before the fan-out: a watcher created between the two steps
	/// could otherwise replay from a revision the cache hasn't reached yet.
	pub fn reflect(&self, batch: mesh_xds::EventBatch) {
		for event in batch {
			match event {
				AnyEvent::Route(ev) => {
					let revision = self.cache.apply_route_event(&ev);
					info!(id = %ev.object.id, revision, "applied route event");
					self.facade.notify_route(&ev, revision);
				}
				AnyEvent::Upstream(ev) => {
					let revision = self.cache.apply_upstream_event(&ev);
					info!(id = %ev.object.id, revision, "applied upstream event");
					self.facade.notify_upstream(&ev, revision);
				}
			}
		}
	}

	/// Drains the provisioner's event channel until it closes, which
	/// happens once the provisioner's `run` task returns.
	pub async fn run(&self, mut events: mpsc::Receiver<mesh_xds::EventBatch>) {
		while let Some(batch) = events.recv().await {
			self.reflect(batch);
		}
		info!("provisioner channel closed, orchestrator loop exiting");
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use mesh_core::{Event, Upstream, UpstreamType};

	#[test]
	fn reflect_applies_to_cache_before_fanning_out_to_the_facade() {
		let cache = Arc::new(Cache::new());
		let facade = Arc::new(Facade::new(cache.clone(), "/apisix"));
		let orchestrator = Orchestrator::new(cache.clone(), facade.clone());

		let upstream = Upstream::new("u1", UpstreamType::Roundrobin);
		orchestrator.reflect(vec![AnyEvent::Upstream(Event::add(upstream.clone()))]);

		assert_eq!(cache.revision(), 1);
		assert_eq!(cache.upstreams().get(&upstream.id).unwrap(), upstream);

		let kvs = facade.range(mesh_etcd::keys::Query::Exact { kind: mesh_etcd::keys::ResourceKind::Upstream, id: upstream.id.to_string() }, false);
		assert_eq!(kvs.len(), 1);
	}

	#[tokio::test]
	async fn run_exits_once_the_provisioner_channel_closes() {
		let cache = Arc::new(Cache::new());
		let facade = Arc::new(Facade::new(cache.clone(), "/apisix"));
		let orchestrator = Orchestrator::new(cache, facade);

		let (tx, rx) = mpsc::channel(4);
		let upstream = Upstream::new("u1", UpstreamType::Roundrobin);
		tx.send(vec![AnyEvent::Upstream(Event::add(upstream))]).await.unwrap();
		drop(tx);

		orchestrator.run(rx).await;
	}
}
