//! Handlers for the navigation queries.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/rooms/{num}` | 404 if unknown |
//! | `GET`  | `/rooms/{num}/exits` | |
//! | `GET`  | `/rooms/{num}/exits/{direction}` | `{}` if no such exit |
//! | `GET`  | `/path?from=&to=[&max_depth=]` | 404 no route or unknown room, 409 ambiguous name |
//! | `GET`  | `/unexplored?zone=[&visited=1,2]` | |
//! | `GET`  | `/summary` | |

use std::collections::HashSet;

use axum::{
  Json,
  extract::{Path, Query, State},
};
use mudmap_core::{
  exit::RoomExit,
  path::{DEFAULT_MAX_DEPTH, RoomTarget, Route},
  room::Room,
  store::{GraphStore as _, GraphSummary},
};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::{AppState, ServerStore, auth::Authenticated, error::ApiError};

// ─── Rooms ───────────────────────────────────────────────────────────────────

/// `GET /rooms/{num}`
pub async fn room<S: ServerStore>(
  _auth: Authenticated,
  State(state): State<AppState<S>>,
  Path(num): Path<i64>,
) -> Result<Json<Room>, ApiError> {
  state
    .store
    .get_room_by_number(num)
    .await
    .map_err(ApiError::store)?
    .map(Json)
    .ok_or_else(|| ApiError::NotFound(format!("room {num}")))
}

/// `GET /rooms/{num}/exits`
pub async fn exits<S: ServerStore>(
  _auth: Authenticated,
  State(state): State<AppState<S>>,
  Path(num): Path<i64>,
) -> Result<Json<Vec<RoomExit>>, ApiError> {
  let exits = state.store.exits_from(num).await.map_err(ApiError::store)?;
  Ok(Json(exits))
}

/// `GET /rooms/{num}/exits/{direction}`
pub async fn exit_details<S: ServerStore>(
  _auth: Authenticated,
  State(state): State<AppState<S>>,
  Path((num, direction)): Path<(i64, String)>,
) -> Result<Json<Value>, ApiError> {
  let details = state
    .store
    .get_exit_command_details(num, &direction)
    .await
    .map_err(ApiError::store)?;

  match details {
    Some(details) => Ok(Json(serde_json::to_value(details).map_err(ApiError::store)?)),
    None => Ok(Json(json!({}))),
  }
}

// ─── Path ────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct PathParams {
  pub from:      i64,
  /// A room number or a fragment of a room name.
  pub to:        String,
  pub max_depth: Option<usize>,
}

/// `GET /path?from=<num>&to=<num|name>[&max_depth=<n>]`
pub async fn path<S: ServerStore>(
  _auth: Authenticated,
  State(state): State<AppState<S>>,
  Query(params): Query<PathParams>,
) -> Result<Json<Route>, ApiError> {
  let target: RoomTarget = params.to.parse().unwrap_or_else(|never| match never {});
  let depth = params.max_depth.unwrap_or(DEFAULT_MAX_DEPTH);

  state
    .store
    .find_path(params.from, target, depth)
    .await
    .map_err(ApiError::store)?
    .map(Json)
    .map_err(ApiError::Path)
}

// ─── Exploration ─────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct UnexploredParams {
  pub zone:    String,
  /// Comma-separated room numbers to leave out.
  #[serde(default)]
  pub visited: Option<String>,
}

fn parse_visited(raw: Option<&str>) -> Result<HashSet<i64>, ApiError> {
  raw
    .unwrap_or_default()
    .split(',')
    .map(str::trim)
    .filter(|s| !s.is_empty())
    .map(|s| {
      s.parse()
        .map_err(|_| ApiError::BadRequest(format!("invalid room number: {s}")))
    })
    .collect()
}

/// `GET /unexplored?zone=<zone>[&visited=1,2]`
pub async fn unexplored<S: ServerStore>(
  _auth: Authenticated,
  State(state): State<AppState<S>>,
  Query(params): Query<UnexploredParams>,
) -> Result<Json<Vec<Room>>, ApiError> {
  let visited = parse_visited(params.visited.as_deref())?;
  let rooms = state
    .store
    .find_rooms_with_unexplored_exit(&params.zone, &visited)
    .await
    .map_err(ApiError::store)?;
  Ok(Json(rooms))
}

/// `GET /summary`
pub async fn summary<S: ServerStore>(
  _auth: Authenticated,
  State(state): State<AppState<S>>,
) -> Result<Json<GraphSummary>, ApiError> {
  let summary = state.store.summary().await.map_err(ApiError::store)?;
  Ok(Json(summary))
}
