//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! All timestamps are stored as RFC 3339 UTC strings with microsecond
//! precision. Structured fields (room details, exit details, relation
//! metadata) are stored as compact JSON.

use chrono::{DateTime, SecondsFormat, Utc};
use mudmap_core::{
  entity::{Entity, EntityKey, EntityType, RowMeta, SyncStatus},
  exit::{ExitDetails, RoomExit},
  npc::{Npc, Observation, Relation},
  room::{Coords, Room},
  store::Node,
  sync::{
    EntityRecord, ExitRecord, Model, NpcRecord, ObservationRecord, RecordMeta,
    RelationRecord, RoomRecord, SyncRecord,
  },
};

use crate::{Error, Result};

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(format!("{s:?}: {e}")))
}

fn decode_opt_dt(s: Option<&str>) -> Result<Option<DateTime<Utc>>> {
  s.map(decode_dt).transpose()
}

// ─── Enums ───────────────────────────────────────────────────────────────────

pub fn decode_entity_type(s: &str) -> Result<EntityType> {
  s.parse()
    .map_err(|_| mudmap_core::Error::UnknownEntityType(s.to_owned()).into())
}

fn decode_sync_status(s: &str) -> Result<SyncStatus> {
  s.parse()
    .map_err(|_| Error::Corrupt(format!("unknown sync status: {s:?}")))
}

// ─── JSON columns ────────────────────────────────────────────────────────────

pub fn encode_json(value: Option<&serde_json::Value>) -> Option<String> {
  value.map(serde_json::Value::to_string)
}

fn decode_json(s: Option<&str>) -> Result<Option<serde_json::Value>> {
  Ok(s.map(serde_json::from_str).transpose()?)
}

pub fn encode_exit_details(d: &ExitDetails) -> Result<String> {
  Ok(serde_json::to_string(d)?)
}

/// Tolerates the empty and `NULL`-ish blobs older rows may carry.
pub fn decode_exit_details(s: &str) -> serde_json::Result<ExitDetails> {
  if s.trim().is_empty() {
    return Ok(ExitDetails::default());
  }
  serde_json::from_str(s)
}

/// Wrap a non-SQLite failure raised inside a connection closure.
pub fn other(e: impl std::error::Error + Send + Sync + 'static) -> tokio_rusqlite::Error {
  tokio_rusqlite::Error::Other(Box::new(e))
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// The four bookkeeping columns, read in table order.
pub struct RawMeta {
  pub created_at:        String,
  pub updated_at:        String,
  pub sync_status:       String,
  pub remote_updated_at: Option<String>,
}

impl RawMeta {
  fn read(row: &rusqlite::Row<'_>, at: usize) -> rusqlite::Result<Self> {
    Ok(Self {
      created_at:        row.get(at)?,
      updated_at:        row.get(at + 1)?,
      sync_status:       row.get(at + 2)?,
      remote_updated_at: row.get(at + 3)?,
    })
  }

  fn into_meta(self) -> Result<RowMeta> {
    Ok(RowMeta {
      created_at:        decode_dt(&self.created_at)?,
      updated_at:        decode_dt(&self.updated_at)?,
      sync_status:       decode_sync_status(&self.sync_status)?,
      remote_updated_at: decode_opt_dt(self.remote_updated_at.as_deref())?,
    })
  }

  fn record_meta(&self) -> Result<RecordMeta> {
    Ok(RecordMeta {
      created_at: decode_dt(&self.created_at)?,
      updated_at: decode_dt(&self.updated_at)?,
    })
  }
}

pub const ENTITY_SELECT: &str = "SELECT e.id, e.name, e.entity_type,
       e.created_at, e.updated_at, e.sync_status, e.remote_updated_at
  FROM entities e";

pub struct RawEntity {
  pub id:          i64,
  pub name:        String,
  pub entity_type: String,
  pub meta:        RawMeta,
}

impl RawEntity {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:          row.get(0)?,
      name:        row.get(1)?,
      entity_type: row.get(2)?,
      meta:        RawMeta::read(row, 3)?,
    })
  }

  pub fn into_entity(self) -> Result<Entity> {
    Ok(Entity {
      id:          self.id,
      entity_type: decode_entity_type(&self.entity_type)?,
      name:        self.name,
      meta:        self.meta.into_meta()?,
    })
  }

  pub fn into_record(self) -> Result<SyncRecord> {
    Ok(SyncRecord::Entity(EntityRecord {
      entity_type: decode_entity_type(&self.entity_type)?,
      meta:        self.meta.record_meta()?,
      name:        self.name,
    }))
  }
}

/// Entities with their observations: one row per observation, or a single
/// row with a NULL text for an entity without any.
pub const NODE_SELECT: &str = "SELECT e.id, e.name, e.entity_type, o.observation_text
  FROM entities e
  LEFT JOIN observations o ON o.entity_id = e.id";

/// Order that keeps each entity's rows together.
pub const NODE_ORDER: &str = "ORDER BY e.entity_type, e.name, o.id";

pub struct RawNodeRow {
  pub entity_id:   i64,
  pub name:        String,
  pub entity_type: String,
  pub observation: Option<String>,
}

impl RawNodeRow {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      entity_id:   row.get(0)?,
      name:        row.get(1)?,
      entity_type: row.get(2)?,
      observation: row.get(3)?,
    })
  }
}

/// Fold rows in [`NODE_ORDER`] into one node per entity.
pub fn collect_nodes(rows: Vec<RawNodeRow>) -> Result<Vec<Node>> {
  let mut nodes: Vec<Node> = Vec::new();
  let mut current = None;
  for row in rows {
    if current != Some(row.entity_id) {
      current = Some(row.entity_id);
      nodes.push(Node {
        entity_type:  decode_entity_type(&row.entity_type)?,
        name:         row.name,
        observations: Vec::new(),
      });
    }
    if let (Some(text), Some(node)) = (row.observation, nodes.last_mut()) {
      node.observations.push(text);
    }
  }
  Ok(nodes)
}

pub const ROOM_SELECT: &str = "SELECT r.id, r.entity_id, r.room_number, r.full_name,
       r.zone, r.terrain, r.outside, r.coord_x, r.coord_y, r.coord_z, r.details,
       r.created_at, r.updated_at, r.sync_status, r.remote_updated_at
  FROM rooms r";

pub struct RawRoom {
  pub id:          i64,
  pub entity_id:   i64,
  pub room_number: i64,
  pub full_name:   Option<String>,
  pub zone:        Option<String>,
  pub terrain:     Option<String>,
  pub outside:     bool,
  pub coord_x:     Option<i64>,
  pub coord_y:     Option<i64>,
  pub coord_z:     Option<i64>,
  pub details:     Option<String>,
  pub meta:        RawMeta,
}

impl RawRoom {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:          row.get(0)?,
      entity_id:   row.get(1)?,
      room_number: row.get(2)?,
      full_name:   row.get(3)?,
      zone:        row.get(4)?,
      terrain:     row.get(5)?,
      outside:     row.get(6)?,
      coord_x:     row.get(7)?,
      coord_y:     row.get(8)?,
      coord_z:     row.get(9)?,
      details:     row.get(10)?,
      meta:        RawMeta::read(row, 11)?,
    })
  }

  fn coords(&self) -> Coords {
    Coords { x: self.coord_x, y: self.coord_y, z: self.coord_z }
  }

  pub fn into_room(self) -> Result<Room> {
    Ok(Room {
      id:          self.id,
      entity_id:   self.entity_id,
      room_number: self.room_number,
      coords:      self.coords(),
      details:     decode_json(self.details.as_deref())?,
      full_name:   self.full_name,
      zone:        self.zone,
      terrain:     self.terrain,
      outside:     self.outside,
      meta:        self.meta.into_meta()?,
    })
  }

  pub fn into_record(self) -> Result<SyncRecord> {
    Ok(SyncRecord::Room(RoomRecord {
      room_number: self.room_number,
      coords:      self.coords(),
      details:     decode_json(self.details.as_deref())?,
      meta:        self.meta.record_meta()?,
      full_name:   self.full_name,
      zone:        self.zone,
      terrain:     self.terrain,
      outside:     self.outside,
    }))
  }
}

pub const EXIT_SELECT: &str = "SELECT x.id, f.room_number, x.direction, x.to_room_number,
       x.to_room_id IS NOT NULL, x.details,
       x.created_at, x.updated_at, x.sync_status, x.remote_updated_at
  FROM room_exits x
  JOIN rooms f ON f.id = x.from_room_id";

pub struct RawExit {
  pub id:               i64,
  pub from_room_number: i64,
  pub direction:        String,
  pub to_room_number:   i64,
  pub resolved:         bool,
  pub details:          String,
  pub meta:             RawMeta,
}

impl RawExit {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:               row.get(0)?,
      from_room_number: row.get(1)?,
      direction:        row.get(2)?,
      to_room_number:   row.get(3)?,
      resolved:         row.get(4)?,
      details:          row.get(5)?,
      meta:             RawMeta::read(row, 6)?,
    })
  }

  pub fn into_exit(self) -> Result<RoomExit> {
    Ok(RoomExit {
      id:               self.id,
      from_room_number: self.from_room_number,
      to_room_number:   self.to_room_number,
      resolved:         self.resolved,
      details:          decode_exit_details(&self.details)?,
      direction:        self.direction,
      meta:             self.meta.into_meta()?,
    })
  }

  pub fn into_record(self) -> Result<SyncRecord> {
    Ok(SyncRecord::RoomExit(ExitRecord {
      from_room:      self.from_room_number,
      to_room_number: self.to_room_number,
      details:        decode_exit_details(&self.details)?,
      direction:      self.direction,
      meta:           self.meta.record_meta()?,
    }))
  }
}

pub const NPC_SELECT: &str = "SELECT n.id, n.entity_id, e.name, r.room_number, n.npc_type,
       n.created_at, n.updated_at, n.sync_status, n.remote_updated_at
  FROM npcs n
  JOIN entities e ON e.id = n.entity_id
  LEFT JOIN rooms r ON r.id = n.current_room_id";

pub struct RawNpc {
  pub id:           i64,
  pub entity_id:    i64,
  pub name:         String,
  pub current_room: Option<i64>,
  pub npc_type:     Option<String>,
  pub meta:         RawMeta,
}

impl RawNpc {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:           row.get(0)?,
      entity_id:    row.get(1)?,
      name:         row.get(2)?,
      current_room: row.get(3)?,
      npc_type:     row.get(4)?,
      meta:         RawMeta::read(row, 5)?,
    })
  }

  pub fn into_npc(self) -> Result<Npc> {
    Ok(Npc {
      id:           self.id,
      entity_id:    self.entity_id,
      name:         self.name,
      current_room: self.current_room,
      npc_type:     self.npc_type,
      meta:         self.meta.into_meta()?,
    })
  }

  pub fn into_record(self) -> Result<SyncRecord> {
    Ok(SyncRecord::Npc(NpcRecord {
      meta:         self.meta.record_meta()?,
      name:         self.name,
      npc_type:     self.npc_type,
      current_room: self.current_room,
    }))
  }
}

pub const OBSERVATION_SELECT: &str = "SELECT o.id, e.name, e.entity_type,
       o.observation_text, o.observation_type,
       o.created_at, o.updated_at, o.sync_status, o.remote_updated_at
  FROM observations o
  JOIN entities e ON e.id = o.entity_id";

pub struct RawObservation {
  pub id:               i64,
  pub entity_name:      String,
  pub entity_type:      String,
  pub text:             String,
  pub observation_type: Option<String>,
  pub meta:             RawMeta,
}

impl RawObservation {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:               row.get(0)?,
      entity_name:      row.get(1)?,
      entity_type:      row.get(2)?,
      text:             row.get(3)?,
      observation_type: row.get(4)?,
      meta:             RawMeta::read(row, 5)?,
    })
  }

  fn entity(&self) -> Result<EntityKey> {
    Ok(EntityKey {
      name:        self.entity_name.clone(),
      entity_type: decode_entity_type(&self.entity_type)?,
    })
  }

  pub fn into_observation(self) -> Result<Observation> {
    Ok(Observation {
      id:               self.id,
      entity:           self.entity()?,
      text:             self.text,
      observation_type: self.observation_type,
      meta:             self.meta.into_meta()?,
    })
  }

  pub fn into_record(self) -> Result<SyncRecord> {
    Ok(SyncRecord::Observation(ObservationRecord {
      entity:           self.entity()?,
      meta:             self.meta.record_meta()?,
      text:             self.text,
      observation_type: self.observation_type,
    }))
  }
}

pub const RELATION_SELECT: &str = "SELECT l.id, fe.name, fe.entity_type, te.name, te.entity_type,
       l.relation_type, l.metadata,
       l.created_at, l.updated_at, l.sync_status, l.remote_updated_at
  FROM relations l
  JOIN entities fe ON fe.id = l.from_entity_id
  JOIN entities te ON te.id = l.to_entity_id";

pub struct RawRelation {
  pub id:            i64,
  pub from_name:     String,
  pub from_type:     String,
  pub to_name:       String,
  pub to_type:       String,
  pub relation_type: String,
  pub metadata:      Option<String>,
  pub meta:          RawMeta,
}

impl RawRelation {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:            row.get(0)?,
      from_name:     row.get(1)?,
      from_type:     row.get(2)?,
      to_name:       row.get(3)?,
      to_type:       row.get(4)?,
      relation_type: row.get(5)?,
      metadata:      row.get(6)?,
      meta:          RawMeta::read(row, 7)?,
    })
  }

  fn keys(&self) -> Result<(EntityKey, EntityKey)> {
    Ok((
      EntityKey {
        name:        self.from_name.clone(),
        entity_type: decode_entity_type(&self.from_type)?,
      },
      EntityKey {
        name:        self.to_name.clone(),
        entity_type: decode_entity_type(&self.to_type)?,
      },
    ))
  }

  pub fn into_relation(self) -> Result<Relation> {
    let (from, to) = self.keys()?;
    Ok(Relation {
      id: self.id,
      from,
      to,
      metadata: decode_json(self.metadata.as_deref())?,
      relation_type: self.relation_type,
      meta: self.meta.into_meta()?,
    })
  }

  pub fn into_record(self) -> Result<SyncRecord> {
    let (from, to) = self.keys()?;
    Ok(SyncRecord::Relation(RelationRecord {
      from,
      to,
      metadata: decode_json(self.metadata.as_deref())?,
      meta: self.meta.record_meta()?,
      relation_type: self.relation_type,
    }))
  }
}

// ─── Per-model selection ─────────────────────────────────────────────────────

/// A row of any model, as read for synchronisation.
pub enum RawRecord {
  Entity(RawEntity),
  Room(RawRoom),
  Exit(RawExit),
  Npc(RawNpc),
  Observation(RawObservation),
  Relation(RawRelation),
}

impl RawRecord {
  /// The `SELECT … FROM` clause for `model`, and the alias of its table.
  pub fn select(model: Model) -> (&'static str, &'static str) {
    match model {
      Model::Entity => (ENTITY_SELECT, "e"),
      Model::Room => (ROOM_SELECT, "r"),
      Model::RoomExit => (EXIT_SELECT, "x"),
      Model::Npc => (NPC_SELECT, "n"),
      Model::Observation => (OBSERVATION_SELECT, "o"),
      Model::Relation => (RELATION_SELECT, "l"),
    }
  }

  pub fn from_row(model: Model, row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(match model {
      Model::Entity => Self::Entity(RawEntity::from_row(row)?),
      Model::Room => Self::Room(RawRoom::from_row(row)?),
      Model::RoomExit => Self::Exit(RawExit::from_row(row)?),
      Model::Npc => Self::Npc(RawNpc::from_row(row)?),
      Model::Observation => Self::Observation(RawObservation::from_row(row)?),
      Model::Relation => Self::Relation(RawRelation::from_row(row)?),
    })
  }

  pub fn into_record(self) -> Result<SyncRecord> {
    match self {
      Self::Entity(r) => r.into_record(),
      Self::Room(r) => r.into_record(),
      Self::Exit(r) => r.into_record(),
      Self::Npc(r) => r.into_record(),
      Self::Observation(r) => r.into_record(),
      Self::Relation(r) => r.into_record(),
    }
  }
}
