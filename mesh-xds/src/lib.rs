//! The xDS provisioner (C1) and translator (C2): turns Envoy xDS v3
//! configuration, delivered either as files or over an ADS gRPC stream,
//! into batches of native Route/Upstream events.

pub mod error;
pub mod manifest;
pub mod metrics;
pub mod provisioner;
pub mod state;
pub mod translate;

pub use error::{ProvisionerError, TranslateError};
pub use manifest::{AnyEvent, Manifest};
pub use provisioner::{file::FileProvisioner, grpc::GrpcProvisioner, EventBatch, Provisioner};
pub use state::XdsState;
