//! Listener → (RDS names, inline RouteConfigurations, address bindings).

use envoy_types::pb::envoy::config::core::v3::{address, socket_address, Address};
use envoy_types::pb::envoy::config::listener::v3::Listener;
use envoy_types::pb::envoy::config::listener::v3::filter::ConfigType;
use envoy_types::pb::envoy::config::route::v3::RouteConfiguration;
use envoy_types::pb::envoy::extensions::filters::network::http_connection_manager::v3::http_connection_manager::RouteSpecifier;
use envoy_types::pb::envoy::extensions::filters::network::http_connection_manager::v3::HttpConnectionManager;
use prost::Message;

use crate::error::TranslateError;

const HCM_TYPE_URL: &str = "type.googleapis.com/envoy.extensions.filters.network.http_connection_manager.v3.HttpConnectionManager";
const HCM_FILTER_NAME: &str = "envoy.filters.network.http_connection_manager";

/// The listener socket address a produced route-config is bound to, used
/// by the route translator's original-destination patching. Formatted `ip:port`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ListenerBinding(pub String);

impl ListenerBinding {
	pub fn from_address(addr: &Address) -> Option<Self> {
		let Some(address::Address::SocketAddress(sock)) = &addr.address else { return None };
		let port = match sock.port_specifier {
			Some(socket_address::PortSpecifier::PortValue(p)) => p,
			_ => return None,
		};
		Some(ListenerBinding(format!("{}:{port}", sock.address)))
	}
}

pub struct CollectedRoutes {
	pub rds_names: Vec<String>,
	pub static_configs: Vec<RouteConfiguration>,
	pub binding: Option<ListenerBinding>,
}

/// Walks `filter_chains[].filters[]` for the HTTP connection manager filter
/// and extracts either its RDS route-config name or inlined config.
pub fn collect_route_names_and_configs(l: &Listener) -> Result<CollectedRoutes, TranslateError> {
	let binding = l.address.as_ref().and_then(ListenerBinding::from_address);
	let mut rds_names = Vec::new();
	let mut static_configs = Vec::new();

	for fc in &l.filter_chains {
		for f in &fc.filters {
			if f.name != HCM_FILTER_NAME {
				continue;
			}
			let Some(ConfigType::TypedConfig(any)) = &f.config_type else { continue };
			if any.type_url != HCM_TYPE_URL {
				continue;
			}
			let hcm = HttpConnectionManager::decode(any.value.as_slice())
				.map_err(|e| TranslateError::Malformed(format!("http_connection_manager: {e}")))?;
			match hcm.route_specifier {
				Some(RouteSpecifier::Rds(rds)) => rds_names.push(rds.route_config_name),
				Some(RouteSpecifier::RouteConfig(rc)) => static_configs.push(rc),
				None => {}
			}
		}
	}
	Ok(CollectedRoutes { rds_names, static_configs, binding })
}
