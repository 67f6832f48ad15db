//! Build engine invocation.
//!
//! Hands a finished [`BuildContext`](crate::archive::BuildContext) to a
//! container engine and streams back its progress events.

mod docker;
mod types;

pub use docker::{DockerEngine, EventStream, decode_events, endpoint_from_env};
pub use types::{BuildEvent, BuildRequest, EngineError, ResourceLimits};
