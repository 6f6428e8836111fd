use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use apisix_mesh_agent::admin::App as AdminApp;
use apisix_mesh_agent::config::{Cli, Command, ProvisionerKind, SidecarArgs};
use apisix_mesh_agent::metrics::ProcessMetrics;
use apisix_mesh_agent::orchestrator::Orchestrator;
use clap::Parser;
use mesh_cache::Cache;
use mesh_etcd::Facade;
use mesh_xds::metrics::Metrics as XdsMetrics;
use mesh_xds::provisioner::grpc::node_id;
use mesh_xds::{FileProvisioner, GrpcProvisioner, Provisioner};
use prometheus_client::registry::Registry;
use rand::Rng;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
	let cli = Cli::parse();

	match cli.command {
		Command::Sidecar(args) => tokio::runtime::Runtime::new()?.block_on(run_sidecar(args)),
		Command::Iptables | Command::CleanupIptables | Command::Precheck => {
			eprintln!("not implemented in this build");
			std::process::exit(1);
		}
		Command::Version => {
			println!("{{\"version\":\"{}\"}}", env!("CARGO_PKG_VERSION"));
			Ok(())
		}
	}
}

fn bootstrap_logging(args: &SidecarArgs) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
	let filter = EnvFilter::try_new(&args.log_level).unwrap_or_else(|_| EnvFilter::new("info"));

	if let Some(path) = &args.log_output {
		let file = std::fs::OpenOptions::new().create(true).append(true).open(path).with_context(|| format!("opening log file {}", path.display()))?;
		let (writer, guard) = tracing_appender::non_blocking(file);
		tracing_subscriber::fmt().with_env_filter(filter).with_writer(writer).with_ansi(false).init();
		Ok(Some(guard))
	} else {
		tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).with_ansi(false).init();
		Ok(None)
	}
}

/// Starts the provisioner for the configured variant, returning it boxed
/// alongside the event-batch channel the orchestrator drains.
fn build_provisioner(args: &SidecarArgs, xds_metrics: XdsMetrics) -> Result<(Box<dyn Provisioner>, tokio::sync::mpsc::Receiver<mesh_xds::EventBatch>)> {
	match args.provisioner {
		ProvisionerKind::XdsV3File => {
			let (provisioner, rx) = FileProvisioner::new(args.xds_watch_files.clone());
			Ok((Box::new(provisioner), rx))
		}
		ProvisionerKind::XdsV3Grpc => {
			let address = args.xds_config_source.clone().context("--xds-config-source is required for the grpc provisioner")?;
			let ipv4 = local_ipv4();
			let run_id = format!("{:x}", rand::rng().random::<u64>());
			let dns_domain = format!("{}.svc.cluster.local", SidecarArgs::pod_namespace());
			let (provisioner, rx) = GrpcProvisioner::new(address, node_id(&ipv4, &run_id, &dns_domain), xds_metrics);
			Ok((Box::new(provisioner), rx))
		}
		ProvisionerKind::Nacos => unreachable!("rejected by SidecarArgs::validate"),
	}
}

fn local_ipv4() -> String {
	std::env::var("POD_IP").unwrap_or_else(|_| "0.0.0.0".to_string())
}

async fn run_admin(addr: std::net::SocketAddr, admin_app: AdminApp) -> Result<()> {
	let listener = tokio::net::TcpListener::bind(addr).await?;
	info!(%addr, "admin endpoint listening");
	axum::serve(listener, admin_app.router()).await?;
	Ok(())
}

async fn run_orchestrator(orchestrator: Orchestrator, events: tokio::sync::mpsc::Receiver<mesh_xds::EventBatch>) -> Result<()> {
	orchestrator.run(events).await;
	Ok(())
}

async fn run_sidecar(args: SidecarArgs) -> Result<()> {
	args.validate()?;
	let _log_guard = bootstrap_logging(&args)?;

	info!(provisioner = ?args.provisioner, run_mode = ?args.run_mode, "starting apisix-mesh-agent");

	let cache = Arc::new(Cache::new());
	let facade = Arc::new(Facade::new(cache.clone(), args.etcd_key_prefix.clone()));
	let orchestrator = Orchestrator::new(cache.clone(), facade.clone());

	let mut registry = Registry::default();
	let xds_metrics = XdsMetrics::new(&mut registry);
	let process_metrics = ProcessMetrics::new(&mut registry);

	let (provisioner, events) = build_provisioner(&args, xds_metrics)?;

	let stop = CancellationToken::new();
	let mut tasks = JoinSet::new();

	tasks.spawn(provisioner.run(stop.clone()));
	tasks.spawn(mesh_etcd::serve(args.grpc_listen, facade.clone(), stop.clone()));
	tasks.spawn(run_admin(args.admin_listen, AdminApp::new(Arc::new(registry), cache.clone(), process_metrics)));
	tasks.spawn(run_orchestrator(orchestrator, events));

	tokio::select! {
		_ = tokio::signal::ctrl_c() => {
			info!("received shutdown signal");
		}
		result = tasks.join_next() => {
			log_task_result(result);
		}
	}

	stop.cancel();
	let grace = tokio::time::timeout(SHUTDOWN_GRACE, async {
		while let Some(result) = tasks.join_next().await {
			log_task_result(Some(result));
		}
	})
	.await;
	if grace.is_err() {
		warn!(grace = ?SHUTDOWN_GRACE, "shutdown grace period elapsed, aborting remaining tasks");
	}
	tasks.shutdown().await;
	Ok(())
}

/// Bound on graceful shutdown after the stop signal fires.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

fn log_task_result(result: Option<Result<Result<()>, tokio::task::JoinError>>) {
	match result {
		Some(Ok(Err(e))) => error!(error = %e, "a supervised task exited with an error"),
		Some(Err(e)) => error!(error = %e, "a supervised task panicked"),
		_ => {}
	}
}
