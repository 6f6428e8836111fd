//! Component C1: the two Provisioner variants, sharing the `{Channel, Run}`
//! capability contract via [`crate::manifest::AnyEvent`] batches
//! delivered on a bounded channel.

pub mod file;
pub mod grpc;

use crate::manifest::AnyEvent;

pub type EventBatch = Vec<AnyEvent>;

/// Implemented by both the file and gRPC provisioner variants. `run`
/// consumes `self` because each variant owns its transport for the
/// duration of the process; the event-batch sender was already handed out
/// by the variant's constructor, which is how callers get their `Channel`.
#[async_trait::async_trait]
pub trait Provisioner: Send {
	async fn run(self: Box<Self>, stop: tokio_util::sync::CancellationToken) -> anyhow::Result<()>;
}
