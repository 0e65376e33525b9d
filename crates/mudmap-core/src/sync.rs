//! Replica-neutral record types and the two replica traits the sync engine
//! drives.
//!
//! Surrogate ids are local to a replica, so a [`SyncRecord`] refers to every
//! row, its own included, by natural key.

use std::future::Future;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
  entity::{EntityKey, EntityType},
  exit::ExitDetails,
  room::Coords,
};

// ─── Models ──────────────────────────────────────────────────────────────────

/// The six synchronised tables, declared in parent-before-child order.
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
  strum::EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Model {
  Entity,
  Room,
  RoomExit,
  Npc,
  Observation,
  Relation,
}

impl Model {
  /// Order in which models are pushed and pulled, so parents land first.
  pub fn sync_order() -> impl Iterator<Item = Self> {
    <Self as strum::IntoEnumIterator>::iter()
  }
}

// ─── Natural keys ────────────────────────────────────────────────────────────

/// The identity of a row across replicas.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "model", rename_all = "snake_case")]
pub enum NaturalKey {
  Entity(EntityKey),
  Room { room_number: i64 },
  RoomExit { from_room: i64, to_room_number: i64 },
  Npc { name: String },
  Observation { entity: EntityKey, text: String },
  Relation { from: EntityKey, to: EntityKey, relation_type: String },
}

impl NaturalKey {
  pub fn model(&self) -> Model {
    match self {
      Self::Entity(_) => Model::Entity,
      Self::Room { .. } => Model::Room,
      Self::RoomExit { .. } => Model::RoomExit,
      Self::Npc { .. } => Model::Npc,
      Self::Observation { .. } => Model::Observation,
      Self::Relation { .. } => Model::Relation,
    }
  }
}

impl std::fmt::Display for NaturalKey {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      Self::Entity(key) => write!(f, "entity {key}"),
      Self::Room { room_number } => write!(f, "room {room_number}"),
      Self::RoomExit { from_room, to_room_number } => {
        write!(f, "exit {from_room}->{to_room_number}")
      }
      Self::Npc { name } => write!(f, "npc {name:?}"),
      Self::Observation { entity, text } => write!(f, "observation on {entity}: {text:?}"),
      Self::Relation { from, to, relation_type } => {
        write!(f, "relation {from} -{relation_type}-> {to}")
      }
    }
  }
}

// ─── Records ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordMeta {
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRecord {
  pub name:        String,
  pub entity_type: EntityType,
  #[serde(flatten)]
  pub meta:        RecordMeta,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomRecord {
  pub room_number: i64,
  pub full_name:   Option<String>,
  pub zone:        Option<String>,
  pub terrain:     Option<String>,
  pub outside:     bool,
  pub coords:      Coords,
  pub details:     Option<serde_json::Value>,
  #[serde(flatten)]
  pub meta:        RecordMeta,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExitRecord {
  pub from_room:      i64,
  pub to_room_number: i64,
  pub direction:      String,
  pub details:        ExitDetails,
  #[serde(flatten)]
  pub meta:           RecordMeta,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NpcRecord {
  pub name:         String,
  pub npc_type:     Option<String>,
  /// Optional reference; left empty when the room is unknown to the reader.
  pub current_room: Option<i64>,
  #[serde(flatten)]
  pub meta:         RecordMeta,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservationRecord {
  pub entity:           EntityKey,
  pub text:             String,
  pub observation_type: Option<String>,
  #[serde(flatten)]
  pub meta:             RecordMeta,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationRecord {
  pub from:          EntityKey,
  pub to:            EntityKey,
  pub relation_type: String,
  pub metadata:      Option<serde_json::Value>,
  #[serde(flatten)]
  pub meta:          RecordMeta,
}

/// One row of any model, in replica-neutral form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "model", content = "record", rename_all = "snake_case")]
pub enum SyncRecord {
  Entity(EntityRecord),
  Room(RoomRecord),
  RoomExit(ExitRecord),
  Npc(NpcRecord),
  Observation(ObservationRecord),
  Relation(RelationRecord),
}

impl SyncRecord {
  pub fn model(&self) -> Model {
    match self {
      Self::Entity(_) => Model::Entity,
      Self::Room(_) => Model::Room,
      Self::RoomExit(_) => Model::RoomExit,
      Self::Npc(_) => Model::Npc,
      Self::Observation(_) => Model::Observation,
      Self::Relation(_) => Model::Relation,
    }
  }

  pub fn natural_key(&self) -> NaturalKey {
    match self {
      Self::Entity(r) => NaturalKey::Entity(EntityKey {
        name:        r.name.clone(),
        entity_type: r.entity_type,
      }),
      Self::Room(r) => NaturalKey::Room { room_number: r.room_number },
      Self::RoomExit(r) => NaturalKey::RoomExit {
        from_room:      r.from_room,
        to_room_number: r.to_room_number,
      },
      Self::Npc(r) => NaturalKey::Npc { name: r.name.clone() },
      Self::Observation(r) => NaturalKey::Observation {
        entity: r.entity.clone(),
        text:   r.text.clone(),
      },
      Self::Relation(r) => NaturalKey::Relation {
        from:          r.from.clone(),
        to:            r.to.clone(),
        relation_type: r.relation_type.clone(),
      },
    }
  }

  pub fn meta(&self) -> RecordMeta {
    match self {
      Self::Entity(r) => r.meta,
      Self::Room(r) => r.meta,
      Self::RoomExit(r) => r.meta,
      Self::Npc(r) => r.meta,
      Self::Observation(r) => r.meta,
      Self::Relation(r) => r.meta,
    }
  }

  /// Rows that must already exist on a replica before this one can be
  /// written there.
  pub fn parents(&self) -> Vec<NaturalKey> {
    match self {
      Self::Entity(_) => vec![],
      Self::Room(r) => vec![NaturalKey::Entity(EntityKey::room(r.room_number))],
      Self::RoomExit(r) => vec![NaturalKey::Room { room_number: r.from_room }],
      Self::Npc(r) => vec![NaturalKey::Entity(EntityKey::npc(r.name.clone()))],
      Self::Observation(r) => vec![NaturalKey::Entity(r.entity.clone())],
      Self::Relation(r) => vec![
        NaturalKey::Entity(r.from.clone()),
        NaturalKey::Entity(r.to.clone()),
      ],
    }
  }
}

// ─── Outcomes ────────────────────────────────────────────────────────────────

/// Result of an authoritative write to a remote replica.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum StoreOutcome {
  /// Written; the remote row now carries this `updated_at`.
  Stored { updated_at: DateTime<Utc> },
  /// A required parent does not exist on the remote.
  Unresolved { missing: NaturalKey },
}

/// Result of applying a pulled record to the local replica.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome {
  /// No local row existed; inserted as synced.
  Inserted,
  /// The local row had no unpushed changes; replaced by the remote values.
  Overwritten,
  /// The local row had unpushed changes; merged field by field, still dirty.
  Merged,
  /// A required parent is missing locally.
  Skipped(NaturalKey),
}

// ─── Traits ──────────────────────────────────────────────────────────────────

/// The replica an agent writes to, as seen by the sync engine.
pub trait LocalReplica: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// All rows of `model` with unpushed changes.
  fn dirty_records(
    &self,
    model: Model,
  ) -> impl Future<Output = Result<Vec<SyncRecord>, Self::Error>> + Send + '_;

  /// Mark a pushed row synced, but only if it still carries `pushed_updated_at`
  /// (it has not changed since it was read). Returns whether it was marked.
  fn mark_synced(
    &self,
    key: NaturalKey,
    pushed_updated_at: DateTime<Utc>,
    remote_updated_at: DateTime<Utc>,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  /// Apply a pulled remote row.
  fn merge_record(
    &self,
    record: SyncRecord,
  ) -> impl Future<Output = Result<MergeOutcome, Self::Error>> + Send + '_;
}

/// The shared replica agents synchronise through.
pub trait RemoteReplica: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Cheap reachability check.
  fn ping(&self) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Rows of `model` whose `updated_at` is after `since` (all rows when
  /// `None`).
  fn changed_since(
    &self,
    model: Model,
    since: Option<DateTime<Utc>>,
  ) -> impl Future<Output = Result<Vec<SyncRecord>, Self::Error>> + Send + '_;

  /// Create or overwrite the row with this record's natural key.
  ///
  /// Exit details are only replaced by details with a later
  /// `last_success_at`.
  fn store_record(
    &self,
    record: SyncRecord,
  ) -> impl Future<Output = Result<StoreOutcome, Self::Error>> + Send + '_;
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn models_sync_parents_first() {
    let order: Vec<_> = Model::sync_order().collect();
    assert_eq!(
      order,
      vec![
        Model::Entity,
        Model::Room,
        Model::RoomExit,
        Model::Npc,
        Model::Observation,
        Model::Relation
      ]
    );
    assert_eq!(Model::RoomExit.to_string(), "room_exit");
    assert_eq!("npc".parse::<Model>().unwrap(), Model::Npc);
  }

  #[test]
  fn record_wire_shape() {
    let at = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
    let record = SyncRecord::RoomExit(ExitRecord {
      from_room:      1,
      to_room_number: 2,
      direction:      "n".into(),
      details:        ExitDetails::default(),
      meta:           RecordMeta { created_at: at, updated_at: at },
    });

    let json = serde_json::to_value(&record).unwrap();
    assert_eq!(json["model"], "room_exit");
    assert_eq!(json["record"]["from_room"], 1);
    assert!(json["record"]["updated_at"].is_string());

    let back: SyncRecord = serde_json::from_value(json).unwrap();
    assert_eq!(back.natural_key(), NaturalKey::RoomExit { from_room: 1, to_room_number: 2 });
    assert_eq!(back.parents(), vec![NaturalKey::Room { room_number: 1 }]);
  }
}
