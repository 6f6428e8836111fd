//! Aggregates translated resources across the four xDS kinds into one
//! manifest, tracking the bookkeeping (listener-address bindings,
//! per-cluster EDS pendingness) that a single `DiscoveryResponse` cannot
//! carry by itself. Shared by both provisioner variants so the file and
//! gRPC code paths diff identically.

use std::collections::{HashMap, HashSet};

use envoy_types::pb::envoy::config::cluster::v3::Cluster;
use envoy_types::pb::envoy::config::endpoint::v3::ClusterLoadAssignment;
use envoy_types::pb::envoy::config::listener::v3::Listener;
use envoy_types::pb::envoy::config::route::v3::RouteConfiguration;

use crate::error::TranslateError;
use crate::manifest::{AnyEvent, Manifest};
use crate::translate::{cluster_to_upstream, collect_route_names_and_configs, route_config_to_routes, ListenerBinding};
use mesh_core::model::Upstream;

#[derive(Default)]
pub struct XdsState {
	listener_bindings: HashMap<String, ListenerBinding>,
	routes_by_source: HashMap<String, Vec<mesh_core::model::Route>>,
	upstreams_by_cluster: HashMap<String, Upstream>,
	eds_cluster_names: HashSet<String>,
	previous: Manifest,
}

impl XdsState {
	pub fn new() -> Self {
		Self::default()
	}

	/// Processes an LDS response. Returns the RDS route-config names that
	/// must now be requested.
	pub fn on_lds(&mut self, listeners: &[Listener]) -> Result<Vec<String>, TranslateError> {
		let mut rds_names = Vec::new();
		for l in listeners {
			let collected = collect_route_names_and_configs(l)?;
			for name in &collected.rds_names {
				if let Some(b) = &collected.binding {
					self.listener_bindings.insert(name.clone(), b.clone());
				}
				rds_names.push(name.clone());
			}
			for (i, rc) in collected.static_configs.iter().enumerate() {
				let key = format!("{}#static#{i}", rc.name);
				let routes = route_config_to_routes(rc, collected.binding.as_ref());
				self.routes_by_source.insert(key, routes);
			}
		}
		Ok(rds_names)
	}

	pub fn on_rds(&mut self, route_configs: &[RouteConfiguration]) {
		for rc in route_configs {
			let binding = self.listener_bindings.get(&rc.name);
			let routes = route_config_to_routes(rc, binding);
			self.routes_by_source.insert(rc.name.clone(), routes);
		}
	}

	/// Processes a CDS response. Returns the cluster names that are
	/// `EDS`-typed and must now be requested via EDS. Clusters absent from
	/// `clusters` but previously known are dropped (they emit `delete`).
	pub fn on_cds(&mut self, clusters: &[Cluster]) -> Result<Vec<String>, TranslateError> {
		let mut seen = HashSet::new();
		let mut eds_names = Vec::new();
		for c in clusters {
			seen.insert(c.name.clone());
			let (ups, requires_eds) = cluster_to_upstream(c)?;
			self.upstreams_by_cluster.insert(c.name.clone(), ups);
			if requires_eds {
				eds_names.push(c.name.clone());
			}
		}
		self.upstreams_by_cluster.retain(|name, _| seen.contains(name));
		self.eds_cluster_names = eds_names.iter().cloned().collect();
		Ok(eds_names)
	}

	/// Applies an EDS response for one cluster. The Upstream must already
	/// exist from a prior CDS response; an unknown cluster name is ignored
	/// (mirrors the original's "found invalid ClusterLoadAssignment,
	/// cluster unknown" drop).
	pub fn on_eds(&mut self, cluster_name: &str, cla: &ClusterLoadAssignment) {
		if let Some(ups) = self.upstreams_by_cluster.get_mut(cluster_name) {
			ups.nodes = crate::translate::cluster::cla_to_nodes(cla);
		}
	}

	/// An EDS-backed source disappeared: clear the cluster's nodes without
	/// removing the Upstream — the Cluster may still exist, just without a
	/// currently known set of healthy endpoints.
	pub fn clear_eds_nodes(&mut self, cluster_name: &str) {
		if let Some(ups) = self.upstreams_by_cluster.get_mut(cluster_name) {
			ups.nodes.clear();
		}
	}

	pub fn is_eds_cluster(&self, cluster_name: &str) -> bool {
		self.eds_cluster_names.contains(cluster_name)
	}

	/// Removes routes previously inserted under the given source keys
	/// (route-config names, or the `#static#N` keys `on_lds` uses). Lets a
	/// provisioner that tracks per-source contributions retract exactly what
	/// one source last added, without touching routes other sources own.
	pub fn remove_route_sources(&mut self, keys: &[String]) {
		for key in keys {
			self.routes_by_source.remove(key);
		}
	}

	/// Removes upstreams previously inserted under the given cluster names.
	pub fn remove_upstreams(&mut self, names: &[String]) {
		for name in names {
			self.upstreams_by_cluster.remove(name);
			self.eds_cluster_names.remove(name);
		}
	}

	fn snapshot(&self) -> Manifest {
		Manifest {
			routes: self.routes_by_source.values().flatten().cloned().collect(),
			upstreams: self.upstreams_by_cluster.values().cloned().collect(),
		}
	}

	/// Diffs the current aggregate state against the last committed
	/// snapshot and commits the new one, returning the events to emit.
	pub fn diff_and_commit(&mut self) -> Vec<AnyEvent> {
		let new = self.snapshot();
		let events = new.diff_from(&self.previous);
		self.previous = new;
		events
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use envoy_types::pb::envoy::config::cluster::v3::cluster::{ClusterDiscoveryType, DiscoveryType, LbPolicy};

	fn eds_cluster(name: &str) -> Cluster {
		Cluster {
			name: name.into(),
			lb_policy: LbPolicy::RoundRobin as i32,
			cluster_discovery_type: Some(ClusterDiscoveryType::Type(DiscoveryType::Eds as i32)),
			..Default::default()
		}
	}

	#[test]
	fn eds_refinement_is_add_then_update_then_update() {
		let mut state = XdsState::new();
		let names = state.on_cds(&[eds_cluster("httpbin.default.svc.cluster.local")]).unwrap();
		assert_eq!(names, vec!["httpbin.default.svc.cluster.local".to_string()]);

		let added = state.diff_and_commit();
		assert_eq!(added.len(), 1);

		state.on_eds(
			"httpbin.default.svc.cluster.local",
			&envoy_types::pb::envoy::config::endpoint::v3::ClusterLoadAssignment {
				cluster_name: "httpbin.default.svc.cluster.local".into(),
				endpoints: vec![envoy_types::pb::envoy::config::endpoint::v3::LocalityLbEndpoints {
					lb_endpoints: vec![],
					..Default::default()
				}],
				..Default::default()
			},
		);
		let updated = state.diff_and_commit();
		assert!(updated.is_empty(), "an empty-nodes CLA produces no observable change");

		state.clear_eds_nodes("httpbin.default.svc.cluster.local");
		let after_clear = state.diff_and_commit();
		assert!(after_clear.is_empty(), "clearing already-empty nodes is a no-op");
	}

	#[test]
	fn cds_shrink_emits_delete() {
		let mut state = XdsState::new();
		state.on_cds(&[eds_cluster("a"), eds_cluster("b")]).unwrap();
		state.diff_and_commit();
		state.on_cds(&[eds_cluster("a")]).unwrap();
		let events = state.diff_and_commit();
		assert_eq!(events.len(), 1);
	}
}
