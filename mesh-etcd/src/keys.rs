//! The fixed key layout under the configured prefix, and the "next
//! prefix" trick etcd range queries use to list a whole collection.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
	Route,
	Upstream,
}

impl ResourceKind {
	fn segment(self) -> &'static str {
		match self {
			ResourceKind::Route => "routes",
			ResourceKind::Upstream => "upstreams",
		}
	}
}

pub fn collection_prefix(key_prefix: &str, kind: ResourceKind) -> String {
	format!("{key_prefix}/{}", kind.segment())
}

pub fn object_key(key_prefix: &str, kind: ResourceKind, id: &str) -> String {
	format!("{}/{id}", collection_prefix(key_prefix, kind))
}

/// Increments the last byte of `prefix`, so `[prefix, next_prefix)` covers
/// exactly everything stored under `prefix`.
pub fn next_prefix(prefix: &str) -> Vec<u8> {
	let mut bytes = prefix.as_bytes().to_vec();
	if let Some(last) = bytes.last_mut() {
		*last += 1;
	}
	bytes
}

pub enum Query {
	Exact { kind: ResourceKind, id: String },
	Range { kind: ResourceKind },
}

/// Matches a `key`/`range_end` pair against the two known prefixes. `None`
/// means the key is unrelated to anything this façade serves, which Range
/// and Watch both treat as "match nothing" rather than an error, so
/// clients probing unrelated keys don't get spurious failures.
pub fn parse_query(key_prefix: &str, key: &[u8], range_end: &[u8]) -> Option<Query> {
	let key = std::str::from_utf8(key).ok()?;
	for kind in [ResourceKind::Route, ResourceKind::Upstream] {
		let collection = collection_prefix(key_prefix, kind);
		if range_end.is_empty() {
			if let Some(id) = key.strip_prefix(&format!("{collection}/")) {
				if !id.is_empty() {
					return Some(Query::Exact { kind, id: id.to_string() });
				}
			}
			continue;
		}
		if key == collection && range_end == next_prefix(&collection) {
			return Some(Query::Range { kind });
		}
	}
	None
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn next_prefix_increments_last_byte() {
		assert_eq!(next_prefix("/apisix/upstreams"), b"/apisix/upstreamt");
		assert_eq!(next_prefix("/apisix/routes"), b"/apisix/routet");
	}

	#[test]
	fn parse_query_recognizes_exact_and_range() {
		match parse_query("/apisix", b"/apisix/upstreams/1", b"") {
			Some(Query::Exact { kind: ResourceKind::Upstream, id }) => assert_eq!(id, "1"),
			_ => panic!("expected an exact upstream query"),
		}
		assert!(matches!(parse_query("/apisix", b"/apisix/routes", b"/apisix/routet"), Some(Query::Range { kind: ResourceKind::Route })));
	}

	#[test]
	fn parse_query_ignores_unrelated_keys() {
		assert!(parse_query("/apisix", b"/something/else", b"").is_none());
	}
}
