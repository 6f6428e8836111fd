#[derive(Debug, thiserror::Error)]
pub enum TranslateError {
	#[error("unsupported load balancer policy: {0}")]
	UnsupportedLoadBalancer(String),
	#[error("unsupported address family on cluster {cluster}")]
	UnsupportedAddress { cluster: String },
	#[error("unsupported route match kind on route {route}")]
	UnsupportedRouteMatch { route: String },
	#[error("unsupported header matcher kind: {0}")]
	UnsupportedHeaderMatcher(String),
	#[error("malformed resource: {0}")]
	Malformed(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ProvisionerError {
	#[error("invalid xds config source address: {0}")]
	InvalidAddress(String),
	#[error("cannot watch path {path}: {source}")]
	Watch { path: String, source: notify::Error },
	#[error("transport error: {0}")]
	Transport(#[from] tonic::transport::Error),
	#[error("grpc status: {0}")]
	Status(#[from] tonic::Status),
}
