//! Handlers for the replica routes used by the sync engine.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/sync/{model}` | Optional `?since=<rfc3339>` |
//! | `PUT`  | `/sync/records` | Body: a sync record; 409 if a parent is missing |

use axum::{
  Json,
  extract::{Path, Query, State},
  http::StatusCode,
};
use chrono::{DateTime, Utc};
use mudmap_core::sync::{Model, RemoteReplica as _, StoreOutcome, SyncRecord};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::{AppState, ServerStore, auth::Authenticated, error::ApiError};

#[derive(Debug, Deserialize)]
pub struct SinceParams {
  pub since: Option<DateTime<Utc>>,
}

/// `GET /sync/{model}[?since=<rfc3339>]`
pub async fn changed_since<S: ServerStore>(
  _auth: Authenticated,
  State(state): State<AppState<S>>,
  Path(model): Path<String>,
  Query(params): Query<SinceParams>,
) -> Result<Json<Vec<SyncRecord>>, ApiError> {
  let model: Model = model
    .parse()
    .map_err(|_| ApiError::BadRequest(format!("unknown model: {model}")))?;

  let records = state
    .store
    .changed_since(model, params.since)
    .await
    .map_err(ApiError::store)?;
  debug!(%model, since = ?params.since, rows = records.len(), "changes served");
  Ok(Json(records))
}

/// `PUT /sync/records`
pub async fn store_record<S: ServerStore>(
  auth: Authenticated,
  State(state): State<AppState<S>>,
  Json(record): Json<SyncRecord>,
) -> Result<(StatusCode, Json<StoreOutcome>), ApiError> {
  let key = record.natural_key();
  let outcome = state.store.store_record(record).await.map_err(ApiError::store)?;

  let status = match &outcome {
    StoreOutcome::Stored { .. } => {
      debug!(agent = %auth.agent, %key, "record stored");
      StatusCode::OK
    }
    StoreOutcome::Unresolved { missing } => {
      warn!(agent = %auth.agent, %key, %missing, "record rejected: parent missing");
      StatusCode::CONFLICT
    }
  };
  Ok((status, Json(outcome)))
}
