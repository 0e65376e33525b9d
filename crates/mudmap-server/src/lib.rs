//! HTTP server for a shared mudmap graph.
//!
//! Exposes an axum [`Router`] that serves a store as the remote replica of
//! the sync engine, plus read-only navigation queries. Every route except
//! `/health` requires Basic auth.

pub mod auth;
pub mod error;
pub mod handlers;

pub use error::ApiError;

use std::{path::PathBuf, sync::Arc};

use axum::{
  Router,
  routing::{get, post, put},
};
use mudmap_core::{store::GraphStore, sync::RemoteReplica};
use serde::Deserialize;
use tower_http::trace::TraceLayer;

use auth::AuthConfig;

// ─── Configuration ───────────────────────────────────────────────────────────

fn default_host() -> String { "127.0.0.1".to_string() }

fn default_port() -> u16 { 7878 }

fn default_realm() -> String { auth::DEFAULT_REALM.to_string() }

/// Runtime server configuration, deserialised from `config.toml` and
/// `MUDMAP_SERVER_*` variables.
#[derive(Deserialize, Clone)]
pub struct ServerConfig {
  #[serde(default = "default_host")]
  pub host:               String,
  #[serde(default = "default_port")]
  pub port:               u16,
  pub store_path:         PathBuf,
  pub auth_username:      String,
  /// argon2 PHC string; see `server --hash-password`.
  pub auth_password_hash: String,
  /// Realm named in the Basic-auth challenge.
  #[serde(default = "default_realm")]
  pub auth_realm:         String,
}

impl ServerConfig {
  pub fn auth(&self) -> Result<AuthConfig, auth::InvalidHash> {
    AuthConfig::new(&self.auth_username, &self.auth_password_hash, &self.auth_realm)
  }
}

// ─── Application state ───────────────────────────────────────────────────────

/// What the server needs from a backend: graph queries and authoritative
/// replica writes.
pub trait ServerStore: GraphStore + RemoteReplica + Send + Sync + 'static {}

impl<S> ServerStore for S where S: GraphStore + RemoteReplica + Send + Sync + 'static {}

/// Shared state threaded through all axum handlers.
pub struct AppState<S> {
  pub store: Arc<S>,
  pub auth:  Arc<AuthConfig>,
}

impl<S> Clone for AppState<S> {
  fn clone(&self) -> Self { Self { store: self.store.clone(), auth: self.auth.clone() } }
}

// ─── Router ──────────────────────────────────────────────────────────────────

pub fn router<S: ServerStore>(state: AppState<S>) -> Router {
  Router::new()
    .route("/health", get(handlers::health))
    // Replica
    .route("/sync/records", put(handlers::sync::store_record::<S>))
    .route("/sync/{model}", get(handlers::sync::changed_since::<S>))
    // Navigation
    .route("/rooms/{num}", get(handlers::graph::room::<S>))
    .route("/rooms/{num}/exits", get(handlers::graph::exits::<S>))
    .route("/rooms/{num}/exits/{direction}", get(handlers::graph::exit_details::<S>))
    .route("/path", get(handlers::graph::path::<S>))
    .route("/unexplored", get(handlers::graph::unexplored::<S>))
    .route("/summary", get(handlers::graph::summary::<S>))
    // Entities
    .route("/nodes/search", get(handlers::nodes::search::<S>))
    .route("/nodes/open", post(handlers::nodes::open::<S>))
    .route("/entities/{kind}", get(handlers::nodes::by_type::<S>))
    .layer(TraceLayer::new_for_http())
    .with_state(state)
}

#[cfg(test)]
mod tests;
