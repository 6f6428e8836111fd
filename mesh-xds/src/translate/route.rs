//! RouteConfiguration → Routes: the bulk of the translator,
//! covering host normalization, header/query matchers, weighted clusters,
//! and original-destination patching.

use envoy_types::pb::envoy::config::route::v3::header_matcher::HeaderMatchSpecifier;
use envoy_types::pb::envoy::config::route::v3::query_parameter_matcher::QueryParameterMatchSpecifier;
use envoy_types::pb::envoy::config::route::v3::route::Action;
use envoy_types::pb::envoy::config::route::v3::route_action::ClusterSpecifier;
use envoy_types::pb::envoy::config::route::v3::route_match::PathSpecifier;
use envoy_types::pb::envoy::config::route::v3::{HeaderMatcher, QueryParameterMatcher, RouteAction, RouteConfiguration, RouteMatch, VirtualHost};
use envoy_types::pb::envoy::r#type::matcher::v3::string_matcher::MatchPattern;
use envoy_types::pb::envoy::r#type::matcher::v3::StringMatcher;

use mesh_core::id;
use mesh_core::model::{Plugins, Route, Status, TrafficSplit, TrafficSplitRule, Var, WeightedUpstream, DEFAULT_PRIORITY};
use mesh_core::set::sorted_dedup;
use mesh_core::strng::{self, Strng};

use super::listener::ListenerBinding;

/// `CollectRouteNamesAndConfigs` found no HCM filter carrying this
/// route-config; callers proceed with `binding = None`.
pub fn route_config_to_routes(rc: &RouteConfiguration, binding: Option<&ListenerBinding>) -> Vec<Route> {
	let prefix = if rc.name.is_empty() { "<anon>" } else { rc.name.as_str() };
	rc.virtual_hosts.iter().flat_map(|vhost| translate_virtual_host(prefix, vhost, binding)).collect()
}

fn translate_virtual_host(prefix: &str, vhost: &VirtualHost, binding: Option<&ListenerBinding>) -> Vec<Route> {
	let hosts = normalize_hosts(&vhost.domains);
	let mut out = Vec::new();

	for route in &vhost.routes {
		let Some(m) = &route.r#match else { continue };
		if let Some(cs) = &m.case_sensitive {
			if !cs.value {
				continue;
			}
		}
		let Some(uri) = derive_uri(m) else { continue };
		let Some(Action::Route(route_action)) = &route.action else { continue };
		let Some((upstream_id, traffic_split)) = resolve_cluster(route_action) else { continue };
		let Some(mut vars) = headers_to_vars(&m.headers) else { continue };
		vars.extend(query_params_to_vars(&m.query_parameters));

		let route_name = if route.name.is_empty() { "<anon>" } else { route.name.as_str() };
		let full_name = format!("{route_name}#{}#{prefix}", vhost.name);
		let priority = if route_name == "allow_any" { 0 } else { DEFAULT_PRIORITY };

		let mut plugins = Plugins::default();
		if let Some(mut ts) = traffic_split {
			if !vars.is_empty() {
				ts.rules[0].r#match = vars.clone();
			}
			plugins.traffic_split = Some(ts);
		}

		let mut r = Route {
			id: id::hash(&full_name),
			name: strng::new(&full_name),
			uris: vec![uri],
			hosts: hosts.clone(),
			priority,
			upstream_id,
			vars,
			plugins,
			status: Status::Enabled,
		};

		if let Some(b) = binding {
			patch_original_dst(&mut r, b);
		}
		out.push(r);
	}
	out
}

/// Strips `:port` suffixes, drops to "any" (empty) when `*` is present,
/// and otherwise dedups + sorts.
fn normalize_hosts(domains: &[String]) -> Vec<String> {
	if domains.iter().any(|d| d == "*") {
		return Vec::new();
	}
	sorted_dedup(domains.iter().map(|d| strip_port(d)))
}

fn strip_port(domain: &str) -> String {
	match domain.rsplit_once(':') {
		Some((host, port)) if port.chars().all(|c| c.is_ascii_digit()) => host.to_string(),
		_ => domain.to_string(),
	}
}

fn derive_uri(m: &RouteMatch) -> Option<String> {
	match &m.path_specifier {
		Some(PathSpecifier::Path(p)) => Some(p.clone()),
		Some(PathSpecifier::Prefix(p)) => Some(format!("{p}*")),
		_ => None,
	}
}

/// `route.cluster` → a single upstream, no traffic-split plugin.
/// `route.weighted_clusters` → the *last* cluster is the Route's default
/// `upstream_id`; every cluster becomes a weighted-upstream entry, with
/// explicit `upstream_id`s on all but the last.
fn resolve_cluster(ra: &RouteAction) -> Option<(Strng, Option<TrafficSplit>)> {
	match &ra.cluster_specifier {
		Some(ClusterSpecifier::Cluster(name)) => Some((id::hash(name), None)),
		Some(ClusterSpecifier::WeightedClusters(wc)) if !wc.clusters.is_empty() => {
			let last_index = wc.clusters.len() - 1;
			let default_id = id::hash(&wc.clusters[last_index].name);
			let weighted_upstreams = wc
				.clusters
				.iter()
				.enumerate()
				.map(|(i, cw)| WeightedUpstream {
					weight: cw.weight.as_ref().map(|w| w.value as i32).unwrap_or(0),
					upstream_id: if i == last_index { None } else { Some(id::hash(&cw.name)) },
				})
				.collect();
			let split = TrafficSplit { rules: vec![TrafficSplitRule { weighted_upstreams, r#match: Vec::new() }] };
			Some((default_id, Some(split)))
		}
		_ => None,
	}
}

fn map_header_name(name: &str) -> String {
	match name {
		":method" => "request_method".to_string(),
		":authority" => "http_host".to_string(),
		other => format!("http_{}", other.to_lowercase().replace('-', "_")),
	}
}

/// `None` means an unsupported matcher kind was seen; the whole route must
/// be skipped.
fn headers_to_vars(headers: &[HeaderMatcher]) -> Option<Vec<Var>> {
	let mut vars = Vec::with_capacity(headers.len());
	for h in headers {
		let name = map_header_name(&h.name);
		let value = match &h.header_match_specifier {
			Some(HeaderMatchSpecifier::ContainsMatch(v)) => v.clone(),
			Some(HeaderMatchSpecifier::ExactMatch(v)) => format!("^{v}$"),
			Some(HeaderMatchSpecifier::PrefixMatch(v)) => format!("^{v}"),
			Some(HeaderMatchSpecifier::SuffixMatch(v)) => format!("{v}$"),
			Some(HeaderMatchSpecifier::SafeRegexMatch(re)) => re.regex.clone(),
			Some(HeaderMatchSpecifier::PresentMatch(_)) => String::new(),
			_ => return None,
		};
		vars.push(if h.invert_match { Var::negated(name, "~~", value) } else { Var::new(name, "~~", value) });
	}
	Some(vars)
}

fn query_params_to_vars(params: &[QueryParameterMatcher]) -> Vec<Var> {
	let mut vars = Vec::with_capacity(params.len());
	for p in params {
		let name = format!("arg_{}", p.name);
		match &p.query_parameter_match_specifier {
			Some(QueryParameterMatchSpecifier::PresentMatch(_)) => {
				vars.push(Var::negated(name, "~~", "^$"));
			}
			Some(QueryParameterMatchSpecifier::StringMatch(sm)) => {
				let (op, value) = string_matcher_value(sm);
				vars.push(Var::new(name, op, value));
			}
			None => {}
		}
	}
	vars
}

fn string_matcher_value(sm: &StringMatcher) -> (&'static str, String) {
	let op = if sm.ignore_case { "~*" } else { "~~" };
	let value = match &sm.match_pattern {
		Some(MatchPattern::Exact(v)) => format!("^{v}$"),
		Some(MatchPattern::Contains(v)) => v.clone(),
		Some(MatchPattern::Prefix(v)) => format!("^{v}"),
		Some(MatchPattern::Suffix(v)) => format!("{v}$"),
		Some(MatchPattern::SafeRegex(re)) => re.regex.clone(),
		None => String::new(),
	};
	(op, value)
}

fn patch_original_dst(route: &mut Route, binding: &ListenerBinding) {
	match binding.0.strip_prefix("0.0.0.0:") {
		Some(port) => route.vars.push(Var::new("connection_original_dst", "~~", format!("{port}$"))),
		None => route.vars.push(Var::new("connection_original_dst", "==", binding.0.clone())),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use envoy_types::pb::envoy::config::route::v3::route::Action;
	use envoy_types::pb::envoy::config::route::v3::weighted_cluster::ClusterWeight;
	use envoy_types::pb::envoy::config::route::v3::{Route as EnvoyRoute, WeightedCluster};
	use envoy_types::pb::google::protobuf::{BoolValue, UInt32Value};

	fn prefix_route(name: &str, prefix: &str, cluster: &str) -> EnvoyRoute {
		EnvoyRoute {
			name: name.into(),
			r#match: Some(RouteMatch {
				case_sensitive: Some(BoolValue { value: true }),
				path_specifier: Some(PathSpecifier::Prefix(prefix.into())),
				headers: vec![HeaderMatcher {
					name: ":method".into(),
					header_match_specifier: Some(HeaderMatchSpecifier::ContainsMatch("POST".into())),
					..Default::default()
				}],
				..Default::default()
			}),
			action: Some(Action::Route(RouteAction {
				cluster_specifier: Some(ClusterSpecifier::Cluster(cluster.into())),
				..Default::default()
			})),
		}
	}

	#[test]
	fn prefix_route_end_to_end() {
		let rc = RouteConfiguration {
			name: "rc1".into(),
			virtual_hosts: vec![VirtualHost {
				name: "vh1".into(),
				domains: vec!["*.apache.org".into(), "apisix.apache.org".into()],
				routes: vec![prefix_route("", "/foo/baz", "k.default.svc.cluster.local")],
				..Default::default()
			}],
			..Default::default()
		};
		let routes = route_config_to_routes(&rc, None);
		assert_eq!(routes.len(), 1);
		let r = &routes[0];
		assert_eq!(r.name.as_str(), "<anon>#vh1#rc1");
		assert_eq!(r.uris, vec!["/foo/baz*"]);
		assert_eq!(r.hosts, vec!["apisix.apache.org", "*.apache.org"]);
		assert_eq!(r.vars, vec![Var::new("request_method", "~~", "POST")]);
		assert_eq!(r.upstream_id, id::hash("k.default.svc.cluster.local"));
		assert_eq!(r.priority, DEFAULT_PRIORITY);
	}

	#[test]
	fn weighted_clusters_last_wins_as_default() {
		let route = EnvoyRoute {
			name: "r1".into(),
			r#match: Some(RouteMatch {
				case_sensitive: Some(BoolValue { value: true }),
				path_specifier: Some(PathSpecifier::Prefix("/".into())),
				..Default::default()
			}),
			action: Some(Action::Route(RouteAction {
				cluster_specifier: Some(ClusterSpecifier::WeightedClusters(WeightedCluster {
					clusters: vec![
						ClusterWeight { name: "v1".into(), weight: Some(UInt32Value { value: 80 }), ..Default::default() },
						ClusterWeight { name: "v2".into(), weight: Some(UInt32Value { value: 20 }), ..Default::default() },
					],
					..Default::default()
				})),
				..Default::default()
			})),
		};
		let rc = RouteConfiguration {
			name: "rc1".into(),
			virtual_hosts: vec![VirtualHost { name: "vh1".into(), domains: vec!["*".into()], routes: vec![route], ..Default::default() }],
			..Default::default()
		};
		let routes = route_config_to_routes(&rc, None);
		let r = &routes[0];
		assert_eq!(r.upstream_id, id::hash("v2"));
		let ts = r.plugins.traffic_split.as_ref().unwrap();
		assert_eq!(ts.rules[0].weighted_upstreams[0].weight, 80);
		assert_eq!(ts.rules[0].weighted_upstreams[0].upstream_id, Some(id::hash("v1")));
		assert_eq!(ts.rules[0].weighted_upstreams[1].upstream_id, None);
	}

	#[test]
	fn original_dst_patches_zero_route_as_port_only() {
		let route = prefix_route("", "/x", "c1");
		let rc = RouteConfiguration {
			name: "rc1".into(),
			virtual_hosts: vec![VirtualHost { name: "vh1".into(), domains: vec!["*".into()], routes: vec![route], ..Default::default() }],
			..Default::default()
		};
		let binding = ListenerBinding("0.0.0.0:9080".into());
		let routes = route_config_to_routes(&rc, Some(&binding));
		assert!(routes[0].vars.iter().any(|v| v.0 == vec!["connection_original_dst", "~~", "9080$"]));
	}

	#[test]
	fn case_insensitive_route_is_skipped() {
		let mut route = prefix_route("", "/x", "c1");
		route.r#match.as_mut().unwrap().case_sensitive = Some(BoolValue { value: false });
		let rc = RouteConfiguration {
			name: "rc1".into(),
			virtual_hosts: vec![VirtualHost { name: "vh1".into(), domains: vec!["*".into()], routes: vec![route], ..Default::default() }],
			..Default::default()
		};
		assert!(route_config_to_routes(&rc, None).is_empty());
	}
}
