//! Error taxonomy for the shared data model. Translation and cache errors
//! live in their own crates (`mesh-xds`, `mesh-cache`); this is only for
//! failures that can occur while constructing or validating a native
//! resource.

use crate::strng::Strng;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("unsupported upstream load balancer type: {0}")]
	UnsupportedUpstreamType(Strng),
	#[error("node port out of range: {0}")]
	InvalidPort(i64),
}
