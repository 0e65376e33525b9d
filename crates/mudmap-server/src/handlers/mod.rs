//! Route handlers.

pub mod graph;
pub mod nodes;
pub mod sync;

use axum::Json;
use serde_json::{Value, json};

/// `GET /health`: unauthenticated reachability check.
pub async fn health() -> Json<Value> { Json(json!({ "status": "ok" })) }
