//! The `Watch` gRPC service: one bidirectional stream per client, backed
//! by the façade's watch registry.

use std::pin::Pin;
use std::sync::Arc;

use futures::Stream;
use tokio_stream::{wrappers::ReceiverStream, StreamExt};
use tonic::{Request, Response, Status, Streaming};
use tracing::{info, warn};

use crate::facade::{CreateOutcome, Facade};
use crate::pb::etcdserverpb::watch_request::RequestUnion;
use crate::pb::etcdserverpb::watch_server::Watch;
use crate::pb::etcdserverpb::{WatchRequest, WatchResponse};

pub struct WatchService {
	facade: Arc<Facade>,
}

impl WatchService {
	pub fn new(facade: Arc<Facade>) -> Self {
		WatchService { facade }
	}
}

#[tonic::async_trait]
impl Watch for WatchService {
	type WatchStream = Pin<Box<dyn Stream<Item = Result<WatchResponse, Status>> + Send + 'static>>;

	async fn watch(&self, request: Request<Streaming<WatchRequest>>) -> Result<Response<Self::WatchStream>, Status> {
		let mut inbound = request.into_inner();
		let facade = self.facade.clone();
		let (stream_id, rx) = facade.register_stream();

		tokio::spawn(async move {
			loop {
				match inbound.next().await {
					Some(Ok(req)) => {
						let Some(request_union) = req.request_union else { continue };
						match request_union {
							RequestUnion::CreateRequest(create) => match facade.create_watch(stream_id, create) {
								Ok(CreateOutcome::Ignored) => {}
								Ok(CreateOutcome::Response(resp)) => facade.send_reply(stream_id, Ok(resp)).await,
								Err(e) => {
									warn!(error = %e, stream_id, "watch create rejected, closing stream");
									facade.send_reply(stream_id, Err(e.into())).await;
									break;
								}
							},
							RequestUnion::CancelRequest(cancel) => match facade.cancel_watch(stream_id, cancel.watch_id) {
								Ok(resp) => facade.send_reply(stream_id, Ok(resp)).await,
								Err(e) => {
									warn!(error = %e, stream_id, "cancel of unknown watch id, closing stream");
									facade.send_reply(stream_id, Err(e.into())).await;
									break;
								}
							},
						}
					}
					Some(Err(e)) => {
						warn!(error = %e, stream_id, "watch stream recv error");
						break;
					}
					None => {
						info!(stream_id, "watch stream closed by client");
						break;
					}
				}
			}
			facade.deregister_stream(stream_id);
		});

		Ok(Response::new(Box::pin(ReceiverStream::new(rx)) as Self::WatchStream))
	}
}
