//! Handlers for the entity queries.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/nodes/search?q=` | Name, type or observation text; blank `q` matches nothing |
//! | `POST` | `/nodes/open` | Body: `{"names": [...]}` |
//! | `GET`  | `/entities/{type}` | `room` or `npc`, any case |

use axum::{
  Json,
  extract::{Path, Query, State},
};
use mudmap_core::{
  entity::EntityType,
  store::{GraphStore as _, Node},
};
use serde::Deserialize;
use tracing::debug;

use crate::{AppState, ServerStore, auth::Authenticated, error::ApiError};

#[derive(Debug, Deserialize)]
pub struct SearchParams {
  #[serde(default)]
  pub q: String,
}

/// `GET /nodes/search?q=<text>`
pub async fn search<S: ServerStore>(
  _auth: Authenticated,
  State(state): State<AppState<S>>,
  Query(params): Query<SearchParams>,
) -> Result<Json<Vec<Node>>, ApiError> {
  let nodes = state.store.search_nodes(&params.q).await.map_err(ApiError::store)?;
  debug!(query = %params.q, hits = nodes.len(), "node search");
  Ok(Json(nodes))
}

#[derive(Debug, Deserialize)]
pub struct OpenRequest {
  pub names: Vec<String>,
}

/// `POST /nodes/open`
pub async fn open<S: ServerStore>(
  _auth: Authenticated,
  State(state): State<AppState<S>>,
  Json(req): Json<OpenRequest>,
) -> Result<Json<Vec<Node>>, ApiError> {
  let nodes = state.store.open_nodes(&req.names).await.map_err(ApiError::store)?;
  Ok(Json(nodes))
}

/// `GET /entities/{type}`
pub async fn by_type<S: ServerStore>(
  _auth: Authenticated,
  State(state): State<AppState<S>>,
  Path(kind): Path<String>,
) -> Result<Json<Vec<Node>>, ApiError> {
  let entity_type: EntityType = kind
    .parse()
    .map_err(|_| ApiError::BadRequest(format!("unknown entity type: {kind}")))?;
  let nodes = state.store.entities_by_type(entity_type).await.map_err(ApiError::store)?;
  Ok(Json(nodes))
}
