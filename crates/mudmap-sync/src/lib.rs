//! Bidirectional synchronisation between an agent's local replica and a
//! shared remote one.
//!
//! [`SyncEngine`] pushes dirty local rows and pulls remote changes; both
//! sides are addressed through the replica traits in
//! [`mudmap_core::sync`], so any pair of backends can be synchronised.
//! [`Remote`] picks a concrete remote from a connection string.

mod engine;
mod http;
mod remote;

pub mod error;

pub use engine::{CycleReport, PullReport, PushReport, SyncEngine};
pub use error::{Error, Result};
pub use http::{HttpRemote, RemoteConfig};
pub use remote::Remote;
