//! Ambient process metrics, separate from `mesh_xds::Metrics`'s ADS-client
//! counters: revision and watcher-fleet gauges the admin endpoint exposes.

use mesh_cache::Cache;
use prometheus_client::encoding::text::encode;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::registry::Registry;

#[derive(Clone)]
pub struct ProcessMetrics {
	cache_revision: Gauge,
}

impl ProcessMetrics {
	pub fn new(registry: &mut Registry) -> Self {
		let metrics = ProcessMetrics { cache_revision: Gauge::default() };
		registry.register("mesh_cache_revision", "Current cache revision", metrics.cache_revision.clone());
		metrics
	}

	pub fn observe(&self, cache: &Cache) {
		self.cache_revision.set(cache.revision() as i64);
	}
}

pub fn render(registry: &Registry) -> anyhow::Result<String> {
	let mut buffer = String::new();
	encode(&mut buffer, registry)?;
	Ok(buffer)
}
