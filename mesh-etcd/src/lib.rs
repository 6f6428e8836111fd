//! The etcd-v3 façade: a `KV`/`Watch` gRPC server plus a minimal HTTP
//! surface, multiplexed off one TCP listener, serving the Route/Upstream
//! cache the orchestrator owns.

pub mod conformance;
pub mod error;
pub mod facade;
pub mod http;
pub mod keys;
pub mod kv;
pub mod meta;
pub mod mux;
pub mod pb;
pub mod watch;

pub use error::FacadeError;
pub use facade::{Facade, Revisioner};
pub use mux::serve;
