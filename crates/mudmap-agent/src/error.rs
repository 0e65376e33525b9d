//! Error type for `mudmap-agent`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("malformed event: {0}")]
  Event(#[from] serde_json::Error),

  #[error("invalid room payload: {0}")]
  Room(#[from] mudmap_core::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
