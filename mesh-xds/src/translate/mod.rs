//! Pure xDS v3 → native translation (component C2): no I/O, no caching.

pub mod cluster;
pub mod listener;
pub mod route;

pub use cluster::cluster_to_upstream;
pub use listener::{collect_route_names_and_configs, CollectedRoutes, ListenerBinding};
pub use route::route_config_to_routes;
