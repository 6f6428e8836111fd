//! The minimal HTTP surface: a fixed `/version` response.

use axum::routing::get;
use axum::Json;
use axum::Router;
use serde_json::{json, Value};

pub fn version_router() -> Router {
	Router::new().route("/version", get(version))
}

async fn version() -> Json<Value> {
	Json(json!({ "etcdserver": "3.5.0-pre", "etcdcluster": "3.5.0" }))
}
