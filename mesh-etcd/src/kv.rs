//! The `KV` gRPC service: Range is served from the cache; Put is degraded
//! to a revision echo so proxy startup doesn't fatal; DeleteRange/Txn/
//! Compact are refused outright.

use std::sync::Arc;

use tonic::{Request, Response, Status};

use crate::conformance;
use crate::error::FacadeError;
use crate::facade::Facade;
use crate::keys;
use crate::pb::etcdserverpb::kv_server::Kv;
use crate::pb::etcdserverpb::{CompactionRequest, CompactionResponse, DeleteRangeRequest, DeleteRangeResponse, PutRequest, PutResponse, RangeRequest, RangeResponse, ResponseHeader, TxnRequest, TxnResponse};

pub struct KvService {
	facade: Arc<Facade>,
}

impl KvService {
	pub fn new(facade: Arc<Facade>) -> Self {
		KvService { facade }
	}
}

#[tonic::async_trait]
impl Kv for KvService {
	async fn range(&self, request: Request<RangeRequest>) -> Result<Response<RangeResponse>, Status> {
		let req = request.into_inner();
		conformance::check_range(&req)?;

		let header = Some(ResponseHeader { revision: self.facade.current_revision() });

		let Some(query) = keys::parse_query(self.facade.key_prefix(), &req.key, &req.range_end) else {
			return Ok(Response::new(RangeResponse { header, kvs: Vec::new(), more: false, count: 0 }));
		};

		let kvs = self.facade.range(query, req.keys_only);
		let count = kvs.len() as i64;
		Ok(Response::new(RangeResponse { header, kvs, more: false, count }))
	}

	async fn put(&self, _request: Request<PutRequest>) -> Result<Response<PutResponse>, Status> {
		let revision = self.facade.current_revision();
		Ok(Response::new(PutResponse { header: Some(ResponseHeader { revision }) }))
	}

	async fn delete_range(&self, _request: Request<DeleteRangeRequest>) -> Result<Response<DeleteRangeResponse>, Status> {
		Err(FacadeError::NotCapable.into())
	}

	async fn txn(&self, _request: Request<TxnRequest>) -> Result<Response<TxnResponse>, Status> {
		Err(FacadeError::NotCapable.into())
	}

	async fn compact(&self, _request: Request<CompactionRequest>) -> Result<Response<CompactionResponse>, Status> {
		Err(FacadeError::NotCapable.into())
	}
}
