//! Entities, the generic graph nodes that rooms and NPCs specialise, and
//! the bookkeeping columns every persisted row carries.

use chrono::{DateTime, SubsecRound as _, Utc};
use serde::{Deserialize, Serialize};

// ─── Entity type ─────────────────────────────────────────────────────────────

/// The specialisation of an entity. Stored as `"Room"` / `"NPC"`.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
  strum::Display,
  strum::EnumString,
  strum::AsRefStr,
)]
#[strum(ascii_case_insensitive)]
pub enum EntityType {
  Room,
  #[serde(rename = "NPC")]
  #[strum(serialize = "NPC")]
  Npc,
}

// ─── Natural key ─────────────────────────────────────────────────────────────

/// The natural key of an entity: `(name, entity_type)`.
///
/// Unique per replica; used to match entities across replicas whose
/// surrogate ids were generated independently.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityKey {
  pub name:        String,
  pub entity_type: EntityType,
}

impl EntityKey {
  /// The entity backing a room: its name is the decimal room number.
  pub fn room(room_number: i64) -> Self {
    Self { name: room_number.to_string(), entity_type: EntityType::Room }
  }

  pub fn npc(name: impl Into<String>) -> Self {
    Self { name: name.into(), entity_type: EntityType::Npc }
  }
}

impl std::fmt::Display for EntityKey {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}:{}", self.entity_type, self.name)
  }
}

// ─── Sync bookkeeping ────────────────────────────────────────────────────────

/// Whether a row's latest local change has reached the remote replica.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Default,
  Serialize,
  Deserialize,
  strum::Display,
  strum::EnumString,
  strum::AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum SyncStatus {
  #[default]
  Dirty,
  Synced,
}

/// The current time at the precision timestamps are persisted with
/// (microseconds), so a stamped value survives a round-trip unchanged.
pub fn now() -> DateTime<Utc> { Utc::now().trunc_subsecs(6) }

/// Columns shared by every table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowMeta {
  pub created_at:        DateTime<Utc>,
  /// Bumped on every local change.
  pub updated_at:        DateTime<Utc>,
  pub sync_status:       SyncStatus,
  /// The remote's `updated_at` as of the last push or pull of this row.
  pub remote_updated_at: Option<DateTime<Utc>>,
}

// ─── Entity ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
  pub id:          i64,
  pub name:        String,
  pub entity_type: EntityType,
  #[serde(flatten)]
  pub meta:        RowMeta,
}

impl Entity {
  pub fn key(&self) -> EntityKey {
    EntityKey { name: self.name.clone(), entity_type: self.entity_type }
  }
}
