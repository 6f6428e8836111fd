//! Serves the etcd v3 KV/Watch gRPC services and the HTTP `/version`
//! endpoint off one TCP listener: `tonic`'s server builder converts into
//! an `axum::Router` so a single connection handler serves both, and
//! `hyper_util`'s auto builder negotiates HTTP/1.1 vs HTTP/2 per
//! connection.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower::Service;
use tracing::{debug, info, warn};

use crate::facade::Facade;
use crate::http::version_router;
use crate::kv::KvService;
use crate::pb::etcdserverpb::kv_server::KvServer;
use crate::pb::etcdserverpb::watch_server::WatchServer;
use crate::watch::WatchService;

/// Min client ping interval, server idle timeout, and keepalive timeout
/// enforced on the multiplexed transport.
const MIN_PING_INTERVAL: Duration = Duration::from_secs(15);
const IDLE_TIMEOUT: Duration = Duration::from_secs(300);
const KEEPALIVE_TIMEOUT: Duration = Duration::from_secs(10);

pub async fn serve(addr: SocketAddr, facade: Arc<Facade>, stop: CancellationToken) -> anyhow::Result<()> {
	let mut grpc_routes = tonic::service::Routes::builder();
	grpc_routes.add_service(KvServer::new(KvService::new(facade.clone())));
	grpc_routes.add_service(WatchServer::new(WatchService::new(facade.clone())));
	let grpc = grpc_routes.routes().into_axum_router();

	let app = version_router().merge(grpc);

	let listener = TcpListener::bind(addr).await?;
	info!(%addr, "etcd facade listening");

	loop {
		tokio::select! {
			_ = stop.cancelled() => {
				info!("etcd facade stopping");
				return Ok(());
			}
			accepted = listener.accept() => {
				let (stream, peer) = match accepted {
					Ok(v) => v,
					Err(e) => {
						warn!(error = %e, "accept failed");
						continue;
					}
				};
				let app = app.clone();
				let conn_stop = stop.clone();
				tokio::spawn(async move {
					let io = TokioIo::new(stream);
					let mut builder = auto::Builder::new(TokioExecutor::new());
					builder.http2().keep_alive_interval(Some(MIN_PING_INTERVAL)).keep_alive_timeout(KEEPALIVE_TIMEOUT);
					let service = hyper::service::service_fn(move |req| {
						let mut app = app.clone();
						async move { app.call(req).await }
					});

					let serve = builder.serve_connection(io, service);
					tokio::select! {
						result = serve => {
							if let Err(e) = result {
								debug!(%peer, error = %e, "connection closed with error");
							}
						}
						_ = tokio::time::sleep(IDLE_TIMEOUT) => {
							debug!(%peer, "connection idle timeout");
						}
						_ = conn_stop.cancelled() => {}
					}
				});
			}
		}
	}
}
