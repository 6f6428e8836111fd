//! The façade's error taxonomy: etcd's own protocol-conformance errors
//! (`EmptyKey`, unsupported capability requests) plus the watch stream's
//! fatal conditions.

#[derive(Debug, thiserror::Error)]
pub enum FacadeError {
	#[error("etcdserver: key is not provided")]
	EmptyKey,
	#[error("etcdserver: not capable")]
	NotCapable,
	#[error("etcdserver: duplicate watch id {0}")]
	DuplicateWatchId(i64),
	#[error("etcdserver: unknown watch id {0}")]
	UnknownWatchId(i64),
}

impl From<FacadeError> for tonic::Status {
	fn from(e: FacadeError) -> Self {
		match e {
			FacadeError::EmptyKey | FacadeError::NotCapable => tonic::Status::invalid_argument(e.to_string()),
			FacadeError::DuplicateWatchId(_) | FacadeError::UnknownWatchId(_) => tonic::Status::failed_precondition(e.to_string()),
		}
	}
}
