#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CacheError {
	#[error("object not found")]
	ObjectNotFound,
}
