//! Ambient xDS client metrics: connection
//! errors, ACK/NACK counts. Exposed by the root crate's admin endpoint.

use prometheus_client::metrics::counter::Counter;
use prometheus_client::registry::Registry;

#[derive(Clone, Default)]
pub struct Metrics {
	connection_errors: Counter,
	acks: Counter,
	nacks: Counter,
}

impl Metrics {
	pub fn new(registry: &mut Registry) -> Self {
		let metrics = Metrics::default();
		registry.register("xds_connection_errors", "ADS stream connection failures", metrics.connection_errors.clone());
		registry.register("xds_acks", "ADS responses acknowledged", metrics.acks.clone());
		registry.register("xds_nacks", "ADS responses rejected", metrics.nacks.clone());
		metrics
	}

	pub fn record_connection_error(&self) {
		self.connection_errors.inc();
	}

	pub fn record_ack(&self) {
		self.acks.inc();
	}

	pub fn record_nack(&self) {
		self.nacks.inc();
	}
}
