//! Shared types for the mesh agent: the native Route/Upstream/Event data
//! model, id hashing, id-keyed diffing, and the cheap-clone `Strng` string
//! type used throughout the other crates.

pub mod diff;
pub mod error;
pub mod id;
pub mod model;
pub mod set;
pub mod strng;

pub use error::Error;
pub use model::{Event, EventKind, Identified, Node, Route, Timeout, Upstream, UpstreamType, Var};
pub use strng::Strng;
