//! The gRPC ADS provisioner variant: a State-of-the-World
//! Aggregated Discovery Service client with a strict LDS/CDS → RDS/EDS
//! dependency order and a fixed 1-second retry backoff.

use std::collections::HashMap;
use std::time::Duration;

use envoy_types::pb::envoy::config::cluster::v3::Cluster;
use envoy_types::pb::envoy::config::core::v3::Node as XdsNode;
use envoy_types::pb::envoy::config::endpoint::v3::ClusterLoadAssignment;
use envoy_types::pb::envoy::config::listener::v3::Listener;
use envoy_types::pb::envoy::config::route::v3::RouteConfiguration;
use envoy_types::pb::envoy::service::discovery::v3::aggregated_discovery_service_client::AggregatedDiscoveryServiceClient;
use envoy_types::pb::envoy::service::discovery::v3::{DiscoveryRequest, DiscoveryResponse};
use prost::Message;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tonic::transport::Channel;
use tracing::{debug, error, info, warn};

use super::{EventBatch, Provisioner};
use crate::error::ProvisionerError;
use crate::metrics::Metrics;
use crate::state::XdsState;

const TYPE_URL_LISTENER: &str = "type.googleapis.com/envoy.config.listener.v3.Listener";
const TYPE_URL_ROUTE_CONFIG: &str = "type.googleapis.com/envoy.config.route.v3.RouteConfiguration";
const TYPE_URL_CLUSTER: &str = "type.googleapis.com/envoy.config.cluster.v3.Cluster";
const TYPE_URL_CLA: &str = "type.googleapis.com/envoy.config.endpoint.v3.ClusterLoadAssignment";

const RETRY_BACKOFF: Duration = Duration::from_secs(1);

/// `sidecar~<ipv4>~<run-id>~<dns-domain>`.
pub fn node_id(ipv4: &str, run_id: &str, dns_domain: &str) -> String {
	format!("sidecar~{ipv4}~{run_id}~{dns_domain}")
}

pub struct GrpcProvisioner {
	address: String,
	node_id: String,
	tx: mpsc::Sender<EventBatch>,
	metrics: Metrics,
}

impl GrpcProvisioner {
	pub fn new(address: impl Into<String>, node_id: impl Into<String>, metrics: Metrics) -> (Self, mpsc::Receiver<EventBatch>) {
		let (tx, rx) = mpsc::channel(16);
		(GrpcProvisioner { address: address.into(), node_id: node_id.into(), tx, metrics }, rx)
	}
}

#[async_trait::async_trait]
impl Provisioner for GrpcProvisioner {
	async fn run(self: Box<Self>, stop: CancellationToken) -> anyhow::Result<()> {
		loop {
			if stop.is_cancelled() {
				return Ok(());
			}
			match self.run_once(&stop).await {
				Ok(()) => return Ok(()),
				Err(e) => {
					self.metrics.record_connection_error();
					warn!(error = %e, backoff = ?RETRY_BACKOFF, "ads stream failed, retrying");
					tokio::select! {
						_ = stop.cancelled() => return Ok(()),
						_ = tokio::time::sleep(RETRY_BACKOFF) => {}
					}
				}
			}
		}
	}
}

impl GrpcProvisioner {
	async fn run_once(&self, stop: &CancellationToken) -> Result<(), ProvisionerError> {
		let channel = Channel::from_shared(self.address.clone())
			.map_err(|e| ProvisionerError::InvalidAddress(e.to_string()))?
			.connect()
			.await?;
		let mut client = AggregatedDiscoveryServiceClient::new(channel);

		let (req_tx, req_rx) = mpsc::channel::<DiscoveryRequest>(16);
		let outbound = tokio_stream::wrappers::ReceiverStream::new(req_rx);
		let response = client.stream_aggregated_resources(outbound).await?;
		let mut inbound = response.into_inner();

		let mut session = Session {
			node_id: self.node_id.clone(),
			state: XdsState::new(),
			acked: HashMap::new(),
			known_eds_names: Vec::new(),
		};

		session.send_initial(&req_tx).await;

		loop {
			tokio::select! {
				_ = stop.cancelled() => return Ok(()),
				next = inbound.message() => {
					let Some(resp) = next? else { return Ok(()) };
					session.handle_response(&resp, &req_tx, &self.tx, &self.metrics).await;
				}
			}
		}
	}
}

struct Session {
	node_id: String,
	state: XdsState,
	/// Last successfully-ACKed `version_info` per type_url, used when a
	/// translation failure requires NACKing with the previous good version.
	acked: HashMap<String, String>,
	known_eds_names: Vec<String>,
}

impl Session {
	fn node(&self) -> XdsNode {
		XdsNode { id: self.node_id.clone(), ..Default::default() }
	}

	async fn send_initial(&self, tx: &mpsc::Sender<DiscoveryRequest>) {
		for type_url in [TYPE_URL_LISTENER, TYPE_URL_CLUSTER] {
			let _ = tx
				.send(DiscoveryRequest {
					node: Some(self.node()),
					type_url: type_url.to_string(),
					..Default::default()
				})
				.await;
		}
	}

	async fn handle_response(
		&mut self,
		resp: &DiscoveryResponse,
		req_tx: &mpsc::Sender<DiscoveryRequest>,
		events_tx: &mpsc::Sender<EventBatch>,
		metrics: &Metrics,
	) {
		let follow_up = match resp.type_url.as_str() {
			TYPE_URL_LISTENER => self.on_listener(resp),
			TYPE_URL_ROUTE_CONFIG => self.on_route_config(resp),
			TYPE_URL_CLUSTER => self.on_cluster(resp),
			TYPE_URL_CLA => self.on_cla(resp),
			other => {
				warn!(type_url = %other, "ads server sent an unrecognized resource kind");
				Ok(Vec::new())
			}
		};

		match follow_up {
			Ok(follow_up_requests) => {
				self.acked.insert(resp.type_url.clone(), resp.version_info.clone());
				metrics.record_ack();
				let _ = req_tx
					.send(DiscoveryRequest {
						node: Some(self.node()),
						type_url: resp.type_url.clone(),
						version_info: resp.version_info.clone(),
						response_nonce: resp.nonce.clone(),
						..Default::default()
					})
					.await;
				for req in follow_up_requests {
					let _ = req_tx.send(req).await;
				}
			}
			Err(e) => {
				error!(error = %e, type_url = %resp.type_url, "failed to translate DiscoveryResponse, nacking");
				metrics.record_nack();
				let previous_version = self.acked.get(&resp.type_url).cloned().unwrap_or_default();
				let _ = req_tx
					.send(DiscoveryRequest {
						node: Some(self.node()),
						type_url: resp.type_url.clone(),
						version_info: previous_version,
						response_nonce: resp.nonce.clone(),
						error_detail: Some(envoy_types::pb::google::rpc::Status {
							code: 3, // INVALID_ARGUMENT
							message: e.to_string(),
							details: Vec::new(),
						}),
						..Default::default()
					})
					.await;
			}
		}

		let events = self.state.diff_and_commit();
		if !events.is_empty() {
			let _ = events_tx.send(events).await;
		}
	}

	fn on_listener(&mut self, resp: &DiscoveryResponse) -> Result<Vec<DiscoveryRequest>, crate::error::TranslateError> {
		let listeners = decode_all::<Listener>(&resp.resources);
		let rds_names = self.state.on_lds(&listeners)?;
		if rds_names.is_empty() {
			return Ok(Vec::new());
		}
		Ok(vec![DiscoveryRequest {
			node: Some(self.node()),
			type_url: TYPE_URL_ROUTE_CONFIG.to_string(),
			resource_names: rds_names,
			..Default::default()
		}])
	}

	fn on_route_config(&mut self, resp: &DiscoveryResponse) -> Result<Vec<DiscoveryRequest>, crate::error::TranslateError> {
		let route_configs = decode_all::<RouteConfiguration>(&resp.resources);
		self.state.on_rds(&route_configs);
		Ok(Vec::new())
	}

	fn on_cluster(&mut self, resp: &DiscoveryResponse) -> Result<Vec<DiscoveryRequest>, crate::error::TranslateError> {
		let clusters = decode_all::<Cluster>(&resp.resources);
		let eds_names = self.state.on_cds(&clusters)?;
		if eds_names == self.known_eds_names {
			return Ok(Vec::new());
		}
		self.known_eds_names = eds_names.clone();
		if eds_names.is_empty() {
			return Ok(Vec::new());
		}
		Ok(vec![DiscoveryRequest {
			node: Some(self.node()),
			type_url: TYPE_URL_CLA.to_string(),
			resource_names: eds_names,
			..Default::default()
		}])
	}

	fn on_cla(&mut self, resp: &DiscoveryResponse) -> Result<Vec<DiscoveryRequest>, crate::error::TranslateError> {
		let clas = decode_all::<ClusterLoadAssignment>(&resp.resources);
		for cla in clas {
			let name = cla.cluster_name.clone();
			if cla.endpoints.iter().all(|e| e.lb_endpoints.is_empty()) {
				self.state.clear_eds_nodes(&name);
			} else {
				self.state.on_eds(&name, &cla);
			}
		}
		Ok(Vec::new())
	}
}

fn decode_all<T: Message + Default>(resources: &[envoy_types::pb::google::protobuf::Any]) -> Vec<T> {
	let out: Vec<T> = resources
		.iter()
		.filter_map(|any| match T::decode(any.value.as_slice()) {
			Ok(decoded) => Some(decoded),
			Err(e) => {
				warn!(error = %e, type_url = %any.type_url, "dropping malformed resource in DiscoveryResponse");
				None
			}
		})
		.collect();
	debug!(count = out.len(), "decoded xds resources");
	out
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn node_id_has_expected_shape() {
		assert_eq!(node_id("10.0.0.5", "abc123", "default.svc.cluster.local"), "sidecar~10.0.0.5~abc123~default.svc.cluster.local");
	}
}
