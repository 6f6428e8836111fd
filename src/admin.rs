//! The admin HTTP surface: `/metrics` in Prometheus text format and a
//! `/healthz` liveness probe, exposed by a small `App`/`router()` pair.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use prometheus_client::registry::Registry;

use crate::metrics::{render, ProcessMetrics};

#[derive(Clone)]
pub struct App {
	registry: Arc<Registry>,
	cache: Arc<mesh_cache::Cache>,
	process_metrics: ProcessMetrics,
}

impl App {
	pub fn new(registry: Arc<Registry>, cache: Arc<mesh_cache::Cache>, process_metrics: ProcessMetrics) -> Self {
		App { registry, cache, process_metrics }
	}

	pub fn router(&self) -> Router {
		Router::new().route("/metrics", get(metrics_handler)).route("/healthz", get(healthz_handler)).with_state(self.clone())
	}
}

async fn metrics_handler(State(app): State<App>) -> Result<String, StatusCode> {
	app.process_metrics.observe(&app.cache);
	render(&app.registry).map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}

async fn healthz_handler() -> StatusCode {
	StatusCode::OK
}

#[cfg(test)]
mod tests {
	use super::*;
	use axum::body::Body;
	use axum::http::Request;
	use tower::ServiceExt;

	#[tokio::test]
	async fn healthz_reports_ok() {
		let mut registry = Registry::default();
		let process_metrics = ProcessMetrics::new(&mut registry);
		let app = App::new(Arc::new(registry), Arc::new(mesh_cache::Cache::new()), process_metrics);

		let response = app.router().oneshot(Request::builder().uri("/healthz").body(Body::empty()).unwrap()).await.unwrap();
		assert_eq!(response.status(), StatusCode::OK);
	}

	#[tokio::test]
	async fn metrics_exposes_the_cache_revision_gauge() {
		let mut registry = Registry::default();
		let process_metrics = ProcessMetrics::new(&mut registry);
		let cache = Arc::new(mesh_cache::Cache::new());
		cache.apply_upstream_event(&mesh_core::Event::add(mesh_core::Upstream::new("u1", mesh_core::UpstreamType::Roundrobin)));
		let app = App::new(Arc::new(registry), cache, process_metrics);

		let response = app.router().oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap()).await.unwrap();
		assert_eq!(response.status(), StatusCode::OK);
	}
}
