//! The file provisioner variant: watches a set of paths, each
//! containing one xDS v3 `DiscoveryResponse` in canonical JSON, and
//! synthesizes the same diff/emit pipeline the gRPC variant uses.

use std::path::{Path, PathBuf};
use std::time::Duration;

use envoy_types::pb::envoy::config::cluster::v3::Cluster;
use envoy_types::pb::envoy::config::endpoint::v3::ClusterLoadAssignment;
use envoy_types::pb::envoy::config::listener::v3::Listener;
use envoy_types::pb::envoy::config::route::v3::RouteConfiguration;
use notify::RecursiveMode;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{EventBatch, Provisioner};
use crate::state::XdsState;
use crate::translate::collect_route_names_and_configs;

const TYPE_URL_LISTENER: &str = "type.googleapis.com/envoy.config.listener.v3.Listener";
const TYPE_URL_ROUTE_CONFIG: &str = "type.googleapis.com/envoy.config.route.v3.RouteConfiguration";
const TYPE_URL_CLUSTER: &str = "type.googleapis.com/envoy.config.cluster.v3.Cluster";
const TYPE_URL_CLA: &str = "type.googleapis.com/envoy.config.endpoint.v3.ClusterLoadAssignment";

/// The on-disk shape each watched file holds: one `DiscoveryResponse`,
/// with resources left as opaque JSON so they can be redecoded into the
/// concrete message type selected by `type_url`.
#[derive(Debug, Deserialize)]
struct RawDiscoveryResponse {
	#[serde(default)]
	version_info: String,
	resources: Vec<serde_json::Value>,
	type_url: String,
}

/// What a watched path last contributed to `XdsState`, so a removal can
/// retract exactly that contribution instead of the whole aggregate.
enum FileContribution {
	Routes(Vec<String>),
	Upstreams(Vec<String>),
	EdsNodes(Vec<String>),
}

pub struct FileProvisioner {
	paths: Vec<PathBuf>,
	tx: mpsc::Sender<EventBatch>,
	state: XdsState,
	/// Last successfully applied contribution per path, so a delete can
	/// diff-remove exactly what that file last contributed.
	last_contribution: std::collections::HashMap<PathBuf, FileContribution>,
}

impl FileProvisioner {
	pub fn new(paths: Vec<PathBuf>) -> (Self, mpsc::Receiver<EventBatch>) {
		let (tx, rx) = mpsc::channel(16);
		(FileProvisioner { paths, tx, state: XdsState::new(), last_contribution: Default::default() }, rx)
	}

	async fn initial_scan(&mut self) -> anyhow::Result<()> {
		for path in self.paths.clone() {
			if path.is_dir() {
				let mut entries = tokio::fs::read_dir(&path).await?;
				while let Some(entry) = entries.next_entry().await? {
					if entry.path().is_file() {
						self.process_path(&entry.path()).await;
					}
				}
			} else {
				self.process_path(&path).await;
			}
		}
		self.emit().await;
		Ok(())
	}

	async fn process_path(&mut self, path: &Path) {
		let contents = match tokio::fs::read_to_string(path).await {
			Ok(c) => c,
			Err(e) => {
				warn!(?path, error = %e, "failed to read xds file");
				return;
			}
		};
		let response: RawDiscoveryResponse = match serde_json::from_str(&contents) {
			Ok(r) => r,
			Err(e) => {
				warn!(?path, error = %e, "malformed DiscoveryResponse, dropping file");
				return;
			}
		};
		debug!(?path, version = %response.version_info, type_url = %response.type_url, "loaded xds file");
		match self.apply_response(&response) {
			Some(contribution) => {
				self.last_contribution.insert(path.to_path_buf(), contribution);
			}
			None => {
				self.last_contribution.remove(path);
			}
		}
	}

	fn apply_response(&mut self, response: &RawDiscoveryResponse) -> Option<FileContribution> {
		match response.type_url.as_str() {
			TYPE_URL_LISTENER => {
				let listeners = decode_all::<Listener>(&response.resources);
				match self.state.on_lds(&listeners) {
					Ok(_rds_names) => {
						let keys = listeners
							.iter()
							.filter_map(|l| collect_route_names_and_configs(l).ok())
							.flat_map(|collected| {
								collected.static_configs.iter().enumerate().map(|(i, rc)| format!("{}#static#{i}", rc.name)).collect::<Vec<_>>()
							})
							.collect();
						Some(FileContribution::Routes(keys))
					}
					Err(e) => {
						error!(error = %e, "failed to translate Listener resources");
						None
					}
				}
			}
			TYPE_URL_ROUTE_CONFIG => {
				let route_configs = decode_all::<RouteConfiguration>(&response.resources);
				let keys = route_configs.iter().map(|rc| rc.name.clone()).collect();
				self.state.on_rds(&route_configs);
				Some(FileContribution::Routes(keys))
			}
			TYPE_URL_CLUSTER => {
				let clusters = decode_all::<Cluster>(&response.resources);
				match self.state.on_cds(&clusters) {
					Ok(_eds_names) => {
						let names = clusters.iter().map(|c| c.name.clone()).collect();
						Some(FileContribution::Upstreams(names))
					}
					Err(e) => {
						error!(error = %e, "failed to translate Cluster resources");
						None
					}
				}
			}
			TYPE_URL_CLA => {
				let mut names = Vec::new();
				for cla in decode_all::<ClusterLoadAssignment>(&response.resources) {
					let name = cla.cluster_name.clone();
					if cla.endpoints.iter().all(|e| e.lb_endpoints.is_empty()) {
						self.state.clear_eds_nodes(&name);
					} else {
						self.state.on_eds(&name, &cla);
					}
					names.push(name);
				}
				Some(FileContribution::EdsNodes(names))
			}
			other => {
				warn!(type_url = %other, "unrecognized xds resource kind, ignoring");
				None
			}
		}
	}

	async fn emit(&mut self) {
		let events = self.state.diff_and_commit();
		if events.is_empty() {
			return;
		}
		if self.tx.send(events).await.is_err() {
			warn!("xds event receiver dropped, provisioner output is now discarded");
		}
	}
}

fn decode_all<T: for<'de> Deserialize<'de>>(resources: &[serde_json::Value]) -> Vec<T> {
	resources
		.iter()
		.filter_map(|v| match serde_json::from_value(v.clone()) {
			Ok(t) => Some(t),
			Err(e) => {
				warn!(error = %e, "dropping malformed resource in DiscoveryResponse");
				None
			}
		})
		.collect()
}

#[async_trait::async_trait]
impl Provisioner for FileProvisioner {
	async fn run(mut self: Box<Self>, stop: CancellationToken) -> anyhow::Result<()> {
		self.initial_scan().await?;

		let (notify_tx, mut notify_rx) = mpsc::channel(16);
		let mut debouncer = notify_debouncer_full::new_debouncer(Duration::from_millis(250), None, move |res| {
			let _ = notify_tx.blocking_send(res);
		})
		.map_err(|e| anyhow::anyhow!("failed to create file watcher: {e}"))?;

		for path in &self.paths {
			debouncer
				.watch(path, RecursiveMode::NonRecursive)
				.map_err(|e| anyhow::anyhow!("cannot watch path {}: {e}", path.display()))?;
		}
		info!(paths = ?self.paths, "file provisioner watching for changes");

		loop {
			tokio::select! {
				_ = stop.cancelled() => {
					info!("file provisioner stopping");
					return Ok(());
				}
				maybe_events = notify_rx.recv() => {
					let Some(result) = maybe_events else { return Ok(()) };
					match result {
						Ok(events) => self.handle_fs_events(events).await,
						Err(errors) => {
							for e in errors {
								warn!(error = %e, "file watcher error");
							}
						}
					}
				}
			}
		}
	}
}

impl FileProvisioner {
	async fn handle_fs_events(&mut self, events: Vec<notify_debouncer_full::DebouncedEvent>) {
		let mut touched: Vec<PathBuf> = Vec::new();
		for event in &events {
			use notify::EventKind;
			match event.kind {
				EventKind::Create(_) | EventKind::Modify(_) => touched.extend(event.paths.iter().cloned()),
				EventKind::Remove(_) => {
					for path in &event.paths {
						self.forget_path(path);
					}
				}
				_ => {}
			}
		}
		touched.sort();
		touched.dedup();
		for path in touched {
			self.process_path(&path).await;
		}
		self.emit().await;
	}

	/// Diff-deletes exactly what `path` last contributed, so removing a file
	/// is equivalent to that source disappearing from the xDS world.
	fn forget_path(&mut self, path: &Path) {
		if let Some(contribution) = self.last_contribution.remove(path) {
			match contribution {
				FileContribution::Routes(keys) => self.state.remove_route_sources(&keys),
				FileContribution::Upstreams(names) => self.state.remove_upstreams(&names),
				FileContribution::EdsNodes(names) => {
					for name in &names {
						self.state.clear_eds_nodes(name);
					}
				}
			}
			info!(?path, "xds file removed");
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn rewatching_same_contents_emits_nothing() {
		let dir = tempfile::tempdir().unwrap();
		let file = dir.path().join("cds.json");
		let body = serde_json::json!({
			"version_info": "1",
			"type_url": TYPE_URL_CLUSTER,
			"resources": [{"name": "v1", "lbPolicy": "ROUND_ROBIN"}],
		});
		tokio::fs::write(&file, body.to_string()).await.unwrap();

		let (mut prov, mut rx) = FileProvisioner::new(vec![dir.path().to_path_buf()]);
		prov.initial_scan().await.unwrap();
		let first = rx.try_recv().unwrap();
		assert_eq!(first.len(), 1);

		tokio::fs::write(&file, body.to_string()).await.unwrap();
		prov.process_path(&file).await;
		prov.emit().await;
		assert!(rx.try_recv().is_err());
	}

	#[tokio::test]
	async fn removing_a_file_diff_deletes_what_it_contributed() {
		let dir = tempfile::tempdir().unwrap();
		let file = dir.path().join("cds.json");
		let body = serde_json::json!({
			"version_info": "1",
			"type_url": TYPE_URL_CLUSTER,
			"resources": [{"name": "v1", "lbPolicy": "ROUND_ROBIN"}],
		});
		tokio::fs::write(&file, body.to_string()).await.unwrap();

		let (mut prov, mut rx) = FileProvisioner::new(vec![dir.path().to_path_buf()]);
		prov.initial_scan().await.unwrap();
		let added = rx.try_recv().unwrap();
		assert_eq!(added.len(), 1);

		prov.forget_path(&file);
		prov.emit().await;
		let deleted = rx.try_recv().unwrap();
		assert_eq!(deleted.len(), 1);
		assert!(prov.last_contribution.is_empty());
	}

	#[tokio::test]
	async fn removing_a_route_config_file_deletes_its_routes() {
		let dir = tempfile::tempdir().unwrap();
		let file = dir.path().join("rds.json");
		let body = serde_json::json!({
			"version_info": "1",
			"type_url": TYPE_URL_ROUTE_CONFIG,
			"resources": [{
				"name": "rc1",
				"virtualHosts": [{
					"name": "vh1",
					"domains": ["*"],
					"routes": [{
						"match": {"prefix": "/x", "caseSensitive": true},
						"route": {"cluster": "c1"},
					}],
				}],
			}],
		});
		tokio::fs::write(&file, body.to_string()).await.unwrap();

		let (mut prov, mut rx) = FileProvisioner::new(vec![dir.path().to_path_buf()]);
		prov.initial_scan().await.unwrap();
		let added = rx.try_recv().unwrap();
		assert_eq!(added.len(), 1);

		prov.forget_path(&file);
		prov.emit().await;
		let deleted = rx.try_recv().unwrap();
		assert_eq!(deleted.len(), 1);
	}
}
