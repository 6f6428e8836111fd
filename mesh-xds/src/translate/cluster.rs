//! Cluster/ClusterLoadAssignment → Upstream/Node translation.

use envoy_types::pb::envoy::config::cluster::v3::cluster::{ClusterDiscoveryType, LbPolicy};
use envoy_types::pb::envoy::config::cluster::v3::Cluster;
use envoy_types::pb::envoy::config::core::v3::socket_address::PortSpecifier;
use envoy_types::pb::envoy::config::core::v3::{address, SocketAddress};
use envoy_types::pb::envoy::config::endpoint::v3::lb_endpoint::HostIdentifier;
use envoy_types::pb::envoy::config::endpoint::v3::ClusterLoadAssignment;
use mesh_core::id;
use mesh_core::model::{Node, Timeout, Upstream, UpstreamType};
use mesh_core::strng;

use crate::error::TranslateError;

/// The distinguished "this cluster needs EDS" marker: a cluster whose
/// `cluster_discovery_type` is `EDS` produces an Upstream with empty nodes
/// and the caller must remember the name for subsequent EDS responses.
pub const EDS_SENTINEL_NODES: &[Node] = &[];

pub fn cluster_to_upstream(c: &Cluster) -> Result<(Upstream, bool), TranslateError> {
	let kind = match LbPolicy::try_from(c.lb_policy).unwrap_or(LbPolicy::RoundRobin) {
		LbPolicy::RoundRobin => UpstreamType::Roundrobin,
		LbPolicy::LeastRequest => UpstreamType::LeastConn,
		other => return Err(TranslateError::UnsupportedLoadBalancer(format!("{other:?}"))),
	};

	let mut ups = Upstream::new(strng::new(&c.name), kind);
	ups.timeout = Timeout {
		connect: c.connect_timeout.as_ref().map(|d| d.seconds as f64 + f64::from(d.nanos) / 1e9),
		send: None,
		read: None,
	};

	let requires_eds = matches!(
		c.cluster_discovery_type,
		Some(ClusterDiscoveryType::Type(t)) if t == envoy_types::pb::envoy::config::cluster::v3::cluster::DiscoveryType::Eds as i32
	);

	if requires_eds {
		ups.nodes = Vec::new();
		return Ok((ups, true));
	}

	if let Some(la) = &c.load_assignment {
		ups.nodes = cla_to_nodes(la);
	}
	Ok((ups, false))
}

/// Flattens `endpoints[].lb_endpoints[]` into Nodes. Non-TCP,
/// named-port, and unrecognized address kinds are dropped per endpoint.
pub fn cla_to_nodes(la: &ClusterLoadAssignment) -> Vec<Node> {
	let mut nodes = Vec::new();
	for locality in &la.endpoints {
		let locality_weight = locality.load_balancing_weight.as_ref().map(|w| w.value as i32).unwrap_or(100);
		for ep in &locality.lb_endpoints {
			let Some(HostIdentifier::Endpoint(endpoint)) = &ep.host_identifier else { continue };
			let Some(addr) = &endpoint.address else { continue };
			let Some(address::Address::SocketAddress(sock)) = &addr.address else { continue };
			if !is_tcp(sock) {
				continue;
			}
			let Some(PortSpecifier::PortValue(port)) = sock.port_specifier else { continue };
			let weight = ep.load_balancing_weight.as_ref().map(|w| w.value as i32).unwrap_or(locality_weight);
			nodes.push(Node { host: sock.address.clone(), port: port as u16, weight });
		}
	}
	nodes
}

fn is_tcp(sock: &SocketAddress) -> bool {
	sock.protocol == envoy_types::pb::envoy::config::core::v3::socket_address::Protocol::Tcp as i32
}

pub fn upstream_id(name: &str) -> mesh_core::Strng {
	id::hash(name)
}

#[cfg(test)]
mod tests {
	use super::*;
	use envoy_types::pb::envoy::config::core::v3::{socket_address, Address};
	use envoy_types::pb::envoy::config::endpoint::v3::{Endpoint, LbEndpoint, LocalityLbEndpoints};
	use envoy_types::pb::google::protobuf::UInt32Value;

	fn tcp_endpoint(host: &str, port: u32) -> LbEndpoint {
		LbEndpoint {
			host_identifier: Some(HostIdentifier::Endpoint(Endpoint {
				address: Some(Address {
					address: Some(address::Address::SocketAddress(SocketAddress {
						protocol: socket_address::Protocol::Tcp as i32,
						address: host.to_string(),
						port_specifier: Some(PortSpecifier::PortValue(port)),
						..Default::default()
					})),
				}),
				..Default::default()
			})),
			..Default::default()
		}
	}

	#[test]
	fn cluster_lb_policy_maps_to_native_types() {
		let c = Cluster { name: "v1".into(), lb_policy: LbPolicy::RoundRobin as i32, ..Default::default() };
		let (ups, eds) = cluster_to_upstream(&c).unwrap();
		assert_eq!(ups.kind, UpstreamType::Roundrobin);
		assert!(!eds);
		assert_eq!(ups.id, id::hash("v1"));
	}

	#[test]
	fn unsupported_lb_policy_errors() {
		let c = Cluster { name: "v1".into(), lb_policy: LbPolicy::Maglev as i32, ..Default::default() };
		assert!(cluster_to_upstream(&c).is_err());
	}

	#[test]
	fn cla_flattens_endpoints_with_weight_fallback() {
		let la = ClusterLoadAssignment {
			endpoints: vec![LocalityLbEndpoints {
				load_balancing_weight: Some(UInt32Value { value: 100 }),
				lb_endpoints: vec![tcp_endpoint("10.0.3.11", 8000)],
				..Default::default()
			}],
			..Default::default()
		};
		let nodes = cla_to_nodes(&la);
		assert_eq!(nodes, vec![Node { host: "10.0.3.11".into(), port: 8000, weight: 100 }]);
	}
}
