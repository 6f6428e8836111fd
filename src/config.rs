//! CLI surface: the `sidecar` subcommand's flags plus the inert
//! out-of-scope subcommands it sits alongside.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Parser, Debug)]
#[command(name = "apisix-mesh-agent", version, about = "xDS-to-etcd-v3 translation sidecar for APISIX")]
pub struct Cli {
	#[command(subcommand)]
	pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
	/// Run the provisioner -> cache -> etcd-v3 facade pipeline.
	Sidecar(SidecarArgs),
	/// Install traffic-redirect iptables rules.
	Iptables,
	/// Remove traffic-redirect iptables rules.
	CleanupIptables,
	/// Verify the runtime environment before a sidecar run.
	Precheck,
	/// Print build version information.
	Version,
}

#[derive(Args, Debug, Clone)]
pub struct SidecarArgs {
	/// Address the etcd v3 facade's gRPC+HTTP listener binds to.
	#[arg(long, default_value = "0.0.0.0:2379", env = "GRPC_LISTEN")]
	pub grpc_listen: SocketAddr,

	/// Address the Prometheus/health admin endpoint binds to.
	#[arg(long, default_value = "0.0.0.0:15020", env = "ADMIN_LISTEN")]
	pub admin_listen: SocketAddr,

	/// Prefix every emitted etcd key is rooted under.
	#[arg(long, default_value = "/apisix", env = "ETCD_KEY_PREFIX")]
	pub etcd_key_prefix: String,

	#[arg(long, value_enum, default_value_t = ProvisionerKind::XdsV3File, env = "PROVISIONER")]
	pub provisioner: ProvisionerKind,

	/// Files or directories to watch, each holding one DiscoveryResponse.
	/// Only meaningful for `--provisioner=xds-v3-file`.
	#[arg(long, value_delimiter = ',', env = "XDS_WATCH_FILES")]
	pub xds_watch_files: Vec<PathBuf>,

	/// `host:port` of the ADS server. Required for `--provisioner=xds-v3-grpc`.
	#[arg(long, env = "XDS_CONFIG_SOURCE")]
	pub xds_config_source: Option<String>,

	#[arg(long, default_value = "info", env = "LOG_LEVEL")]
	pub log_level: String,

	/// Log to this file instead of stderr.
	#[arg(long, env = "LOG_OUTPUT")]
	pub log_output: Option<PathBuf>,

	#[arg(long, value_enum, default_value_t = RunMode::Standalone, env = "RUN_MODE")]
	pub run_mode: RunMode,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisionerKind {
	#[value(name = "xds-v3-file")]
	XdsV3File,
	#[value(name = "xds-v3-grpc")]
	XdsV3Grpc,
	Nacos,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
	Standalone,
	Bundle,
}

impl SidecarArgs {
	/// Flag combinations clap's own parser can't express.
	pub fn validate(&self) -> anyhow::Result<()> {
		match self.provisioner {
			ProvisionerKind::XdsV3Grpc if self.xds_config_source.is_none() => {
				anyhow::bail!("--xds-config-source is required when --provisioner=xds-v3-grpc")
			}
			ProvisionerKind::XdsV3File if self.xds_watch_files.is_empty() => {
				anyhow::bail!("--xds-watch-files is required when --provisioner=xds-v3-file")
			}
			ProvisionerKind::Nacos => anyhow::bail!("the nacos provisioner is not implemented in this build"),
			_ => Ok(()),
		}
	}

	pub fn pod_namespace() -> String {
		std::env::var("POD_NAMESPACE").unwrap_or_else(|_| "default".to_string())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn base_args() -> SidecarArgs {
		SidecarArgs {
			grpc_listen: "0.0.0.0:2379".parse().unwrap(),
			admin_listen: "0.0.0.0:15020".parse().unwrap(),
			etcd_key_prefix: "/apisix".to_string(),
			provisioner: ProvisionerKind::XdsV3File,
			xds_watch_files: vec![PathBuf::from("/tmp/cds.json")],
			xds_config_source: None,
			log_level: "info".to_string(),
			log_output: None,
			run_mode: RunMode::Standalone,
		}
	}

	#[test]
	fn file_provisioner_without_watch_files_is_rejected() {
		let mut args = base_args();
		args.xds_watch_files.clear();
		assert!(args.validate().is_err());
	}

	#[test]
	fn grpc_provisioner_without_config_source_is_rejected() {
		let mut args = base_args();
		args.provisioner = ProvisionerKind::XdsV3Grpc;
		assert!(args.validate().is_err());
	}

	#[test]
	fn grpc_provisioner_with_config_source_is_accepted() {
		let mut args = base_args();
		args.provisioner = ProvisionerKind::XdsV3Grpc;
		args.xds_config_source = Some("127.0.0.1:18000".to_string());
		assert!(args.validate().is_ok());
	}

	#[test]
	fn nacos_provisioner_is_always_rejected() {
		let mut args = base_args();
		args.provisioner = ProvisionerKind::Nacos;
		assert!(args.validate().is_err());
	}
}
