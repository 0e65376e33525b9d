//! Error types for `mudmap-core`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("room payload is missing a room number")]
  MissingRoomNumber,

  #[error("room {0} payload is missing a name")]
  MissingRoomName(i64),

  #[error("npc payload is missing a name")]
  MissingNpcName,

  #[error("unknown entity type: {0:?}")]
  UnknownEntityType(String),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
