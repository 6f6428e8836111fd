//! The native resource model: the projection of xDS configuration that the
//! etcd façade actually serves. Field names and JSON shapes match the
//! proxy's own schema, since these structs are serialized verbatim as
//! etcd values.

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::id;
use crate::set::sorted_dedup;
use crate::strng::{self, Strng};

/// One matcher tuple: `[name, op, value]` or, when negated, `[name, "!", op, value]`.
///
/// Kept as a plain string vector rather than a fixed-arity struct because
/// the wire shape is a JSON array with optional negation spliced in the
/// middle, not a fixed record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Var(pub Vec<String>);

impl Var {
	pub fn new(name: impl Into<String>, op: impl Into<String>, value: impl Into<String>) -> Self {
		Var(vec![name.into(), op.into(), value.into()])
	}

	/// A negated matcher: `[name, "!", op, value]`.
	pub fn negated(name: impl Into<String>, op: impl Into<String>, value: impl Into<String>) -> Self {
		Var(vec![name.into(), "!".to_string(), op.into(), value.into()])
	}

	/// A presence-only matcher with an empty value, e.g. `PresentMatch`.
	pub fn present(name: impl Into<String>, op: impl Into<String>) -> Self {
		Var(vec![name.into(), op.into(), String::new()])
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum Status {
	Disabled,
	Enabled,
}

impl Default for Status {
	fn default() -> Self {
		Status::Enabled
	}
}

impl From<Status> for u8 {
	fn from(s: Status) -> Self {
		match s {
			Status::Disabled => 0,
			Status::Enabled => 1,
		}
	}
}

impl TryFrom<u8> for Status {
	type Error = String;

	fn try_from(v: u8) -> Result<Self, Self::Error> {
		match v {
			0 => Ok(Status::Disabled),
			1 => Ok(Status::Enabled),
			other => Err(format!("invalid route status: {other}")),
		}
	}
}

/// Default route priority; lowered to 0 for the `allow_any` catch-all.
pub const DEFAULT_PRIORITY: i32 = 999;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightedUpstream {
	pub weight: i32,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub upstream_id: Option<Strng>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrafficSplitRule {
	pub weighted_upstreams: Vec<WeightedUpstream>,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub r#match: Vec<Var>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrafficSplit {
	pub rules: Vec<TrafficSplitRule>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Plugins {
	#[serde(rename = "traffic-split", skip_serializing_if = "Option::is_none")]
	pub traffic_split: Option<TrafficSplit>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Route {
	pub id: Strng,
	pub name: Strng,
	pub uris: Vec<String>,
	#[serde(default)]
	pub hosts: Vec<String>,
	pub priority: i32,
	pub upstream_id: Strng,
	#[serde(default)]
	pub vars: Vec<Var>,
	#[serde(default, skip_serializing_if = "is_default_plugins")]
	pub plugins: Plugins,
	pub status: Status,
}

fn is_default_plugins(p: &Plugins) -> bool {
	p.traffic_split.is_none()
}

impl Route {
	/// Builds a Route, deriving `id` from `name` and normalizing `hosts`
	/// into sorted, deduplicated order so equal Routes are byte-equal after
	/// serialization regardless of the order xDS handed hosts to us in.
	pub fn new(name: impl Into<Strng>, uris: Vec<String>, upstream_id: impl Into<Strng>) -> Self {
		let name = name.into();
		let id = id::hash(&name);
		Route {
			id,
			name,
			uris,
			hosts: Vec::new(),
			priority: DEFAULT_PRIORITY,
			upstream_id: upstream_id.into(),
			vars: Vec::new(),
			plugins: Plugins::default(),
			status: Status::Enabled,
		}
	}

	pub fn with_hosts<I, S>(mut self, hosts: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.hosts = sorted_dedup(hosts);
		self
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpstreamType {
	Roundrobin,
	LeastConn,
}

impl UpstreamType {
	pub fn as_str(&self) -> &'static str {
		match self {
			UpstreamType::Roundrobin => "roundrobin",
			UpstreamType::LeastConn => "least_conn",
		}
	}
}

impl std::str::FromStr for UpstreamType {
	type Err = Error;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"roundrobin" => Ok(UpstreamType::Roundrobin),
			"least_conn" => Ok(UpstreamType::LeastConn),
			other => Err(Error::UnsupportedUpstreamType(strng::new(other))),
		}
	}
}

pub const DEFAULT_NODE_WEIGHT: i32 = 100;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
	pub host: String,
	pub port: u16,
	#[serde(default = "default_node_weight")]
	pub weight: i32,
}

fn default_node_weight() -> i32 {
	DEFAULT_NODE_WEIGHT
}

impl Node {
	pub fn new(host: impl Into<String>, port: u16) -> Self {
		Node { host: host.into(), port, weight: DEFAULT_NODE_WEIGHT }
	}
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Timeout {
	#[serde(skip_serializing_if = "Option::is_none")]
	pub connect: Option<f64>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub send: Option<f64>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub read: Option<f64>,
}

impl Timeout {
	fn is_unset(&self) -> bool {
		self.connect.is_none() && self.send.is_none() && self.read.is_none()
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Upstream {
	pub id: Strng,
	pub name: Strng,
	#[serde(rename = "type")]
	pub kind: UpstreamType,
	pub nodes: Vec<Node>,
	#[serde(default, skip_serializing_if = "Timeout::is_unset")]
	pub timeout: Timeout,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub retries: Option<u32>,
}

impl Upstream {
	pub fn new(name: impl Into<Strng>, kind: UpstreamType) -> Self {
		let name = name.into();
		let id = id::hash(&name);
		Upstream { id, name, kind, nodes: Vec::new(), timeout: Timeout::default(), retries: None }
	}
}

/// `{type, object, tombstone}`. `tombstone` is only populated on a delete
/// event, where it carries the last-known state of the deleted object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
	Add,
	Update,
	Delete,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event<T> {
	#[serde(rename = "type")]
	pub kind: EventKind,
	pub object: T,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub tombstone: Option<T>,
}

impl<T> Event<T> {
	pub fn add(object: T) -> Self {
		Event { kind: EventKind::Add, object, tombstone: None }
	}

	pub fn update(object: T) -> Self {
		Event { kind: EventKind::Update, object, tombstone: None }
	}

	pub fn delete(object: T, tombstone: T) -> Self {
		Event { kind: EventKind::Delete, object, tombstone: Some(tombstone) }
	}
}

/// Shared identity for types stored by string id, used by [`crate::diff`].
pub trait Identified {
	fn id(&self) -> &Strng;
}

impl Identified for Route {
	fn id(&self) -> &Strng {
		&self.id
	}
}

impl Identified for Upstream {
	fn id(&self) -> &Strng {
		&self.id
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn route_id_derives_from_name() {
		let r = Route::new("httpbin", vec!["/get".into()], "u1");
		assert_eq!(r.id, id::hash("httpbin"));
	}

	#[test]
	fn hosts_are_sorted_and_deduped() {
		let r = Route::new("r1", vec![], "u1").with_hosts(["b.com", "a.com", "b.com"]);
		assert_eq!(r.hosts, vec!["a.com", "b.com"]);
	}

	#[test]
	fn empty_vars_serialize_as_empty_array() {
		let r = Route::new("r1", vec!["/x".into()], "u1");
		let v = serde_json::to_value(&r).unwrap();
		assert_eq!(v["vars"], serde_json::json!([]));
	}

	#[test]
	fn var_negated_has_four_elements() {
		let v = Var::negated("arg_x", "~~", "^$");
		assert_eq!(v.0, vec!["arg_x", "!", "~~", "^$"]);
	}

	#[test]
	fn upstream_type_roundtrips() {
		assert_eq!("roundrobin".parse::<UpstreamType>().unwrap(), UpstreamType::Roundrobin);
		assert_eq!("least_conn".parse::<UpstreamType>().unwrap(), UpstreamType::LeastConn);
		assert!("sticky".parse::<UpstreamType>().is_err());
	}

	#[test]
	fn node_default_weight_is_100() {
		let n = Node::new("10.0.0.1", 8080);
		assert_eq!(n.weight, DEFAULT_NODE_WEIGHT);
	}

	#[test]
	fn delete_event_carries_tombstone() {
		let u = Upstream::new("u1", UpstreamType::Roundrobin);
		let ev = Event::delete(u.clone(), u.clone());
		assert_eq!(ev.kind, EventKind::Delete);
		assert_eq!(ev.tombstone, Some(u));
	}
}
