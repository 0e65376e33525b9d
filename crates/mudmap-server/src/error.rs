//! API error type and [`axum::response::IntoResponse`] implementation.

use axum::{
  Json,
  http::{HeaderValue, StatusCode, header},
  response::{IntoResponse, Response},
};
use mudmap_core::path::PathError;
use serde_json::json;
use thiserror::Error;

/// An error returned by a handler. Rendered as `{"error": "..."}`.
#[derive(Debug, Error)]
pub enum ApiError {
  /// Rendered with a `WWW-Authenticate` challenge for `realm`.
  #[error("unauthorized")]
  Unauthorized { realm: String },

  #[error("not found: {0}")]
  NotFound(String),

  #[error("bad request: {0}")]
  BadRequest(String),

  /// A path query with no route; carries the reason.
  #[error("{0}")]
  Path(PathError),

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl ApiError {
  pub(crate) fn store(e: impl std::error::Error + Send + Sync + 'static) -> Self {
    Self::Store(Box::new(e))
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    match self {
      ApiError::Unauthorized { realm } => {
        let mut res = (StatusCode::UNAUTHORIZED, Json(json!({ "error": "unauthorized" }))).into_response();
        let challenge = HeaderValue::from_str(&format!("Basic realm=\"{realm}\", charset=\"UTF-8\""))
          .unwrap_or_else(|_| HeaderValue::from_static("Basic"));
        res.headers_mut().insert(header::WWW_AUTHENTICATE, challenge);
        res
      }
      ApiError::NotFound(m) => (StatusCode::NOT_FOUND, Json(json!({ "error": m }))).into_response(),
      ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, Json(json!({ "error": m }))).into_response(),
      ApiError::Path(e) => {
        let status = match e {
          PathError::Ambiguous { .. } => StatusCode::CONFLICT,
          PathError::NotFound | PathError::UnknownRoom { .. } => StatusCode::NOT_FOUND,
        };
        (status, Json(json!({ "error": e.to_string(), "reason": e }))).into_response()
      }
      ApiError::Store(e) => {
        tracing::error!(error = %e, "store error");
        (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "error": e.to_string() }))).into_response()
      }
    }
  }
}
