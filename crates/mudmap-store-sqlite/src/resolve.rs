//! Natural-key resolution.
//!
//! Every row is identified across replicas by its natural key; these helpers
//! map keys to the local surrogate ids. Graph writes, pushes and pulls all go
//! through them, so a key always resolves to the same row.

use mudmap_core::{
  entity::{EntityKey, SyncStatus},
  sync::{Model, NaturalKey},
};
use rusqlite::{Connection, OptionalExtension as _};

pub fn table(model: Model) -> &'static str {
  match model {
    Model::Entity => "entities",
    Model::Room => "rooms",
    Model::RoomExit => "room_exits",
    Model::Npc => "npcs",
    Model::Observation => "observations",
    Model::Relation => "relations",
  }
}

// ─── Lookups ─────────────────────────────────────────────────────────────────

pub fn entity_id(conn: &Connection, key: &EntityKey) -> rusqlite::Result<Option<i64>> {
  conn
    .query_row(
      "SELECT id FROM entities WHERE name = ?1 AND entity_type = ?2",
      rusqlite::params![key.name, key.entity_type.as_ref()],
      |r| r.get(0),
    )
    .optional()
}

pub fn room_id(conn: &Connection, room_number: i64) -> rusqlite::Result<Option<i64>> {
  conn
    .query_row(
      "SELECT id FROM rooms WHERE room_number = ?1",
      rusqlite::params![room_number],
      |r| r.get(0),
    )
    .optional()
}

/// Resolve any natural key to the id of its row.
pub fn locate(conn: &Connection, key: &NaturalKey) -> rusqlite::Result<Option<i64>> {
  match key {
    NaturalKey::Entity(k) => entity_id(conn, k),
    NaturalKey::Room { room_number } => room_id(conn, *room_number),
    NaturalKey::RoomExit { from_room, to_room_number } => conn
      .query_row(
        "SELECT x.id FROM room_exits x
           JOIN rooms f ON f.id = x.from_room_id
          WHERE f.room_number = ?1 AND x.to_room_number = ?2",
        rusqlite::params![from_room, to_room_number],
        |r| r.get(0),
      )
      .optional(),
    NaturalKey::Npc { name } => conn
      .query_row(
        "SELECT n.id FROM npcs n
           JOIN entities e ON e.id = n.entity_id
          WHERE e.name = ?1 AND e.entity_type = 'NPC'",
        rusqlite::params![name],
        |r| r.get(0),
      )
      .optional(),
    NaturalKey::Observation { entity, text } => {
      let Some(entity_id) = entity_id(conn, entity)? else {
        return Ok(None);
      };
      conn
        .query_row(
          "SELECT id FROM observations WHERE entity_id = ?1 AND observation_text = ?2",
          rusqlite::params![entity_id, text],
          |r| r.get(0),
        )
        .optional()
    }
    NaturalKey::Relation { from, to, relation_type } => {
      let (Some(from_id), Some(to_id)) = (entity_id(conn, from)?, entity_id(conn, to)?) else {
        return Ok(None);
      };
      conn
        .query_row(
          "SELECT id FROM relations
            WHERE from_entity_id = ?1 AND to_entity_id = ?2 AND relation_type = ?3",
          rusqlite::params![from_id, to_id, relation_type],
          |r| r.get(0),
        )
        .optional()
    }
  }
}

/// The first of `parents` with no local row, if any.
pub fn first_missing(
  conn: &Connection,
  parents: &[NaturalKey],
) -> rusqlite::Result<Option<NaturalKey>> {
  for parent in parents {
    if locate(conn, parent)?.is_none() {
      return Ok(Some(parent.clone()));
    }
  }
  Ok(None)
}

// ─── Find-or-create ──────────────────────────────────────────────────────────

/// Find or create an entity. A created row is stamped `now` with the given
/// sync status.
pub fn ensure_entity(
  conn: &Connection,
  key: &EntityKey,
  now: &str,
  status: SyncStatus,
) -> rusqlite::Result<i64> {
  if let Some(id) = entity_id(conn, key)? {
    return Ok(id);
  }
  conn.execute(
    "INSERT INTO entities (name, entity_type, created_at, updated_at, sync_status)
     VALUES (?1, ?2, ?3, ?3, ?4)",
    rusqlite::params![key.name, key.entity_type.as_ref(), now, status.as_ref()],
  )?;
  Ok(conn.last_insert_rowid())
}

/// Find a room, or create a placeholder row (and its entity) for a room
/// known only by number. Returns the id and whether it was created.
pub fn ensure_room(conn: &Connection, room_number: i64, now: &str) -> rusqlite::Result<(i64, bool)> {
  if let Some(id) = room_id(conn, room_number)? {
    return Ok((id, false));
  }
  let entity_id = ensure_entity(conn, &EntityKey::room(room_number), now, SyncStatus::Dirty)?;
  conn.execute(
    "INSERT INTO rooms (entity_id, room_number, created_at, updated_at, sync_status)
     VALUES (?1, ?2, ?3, ?3, 'dirty')",
    rusqlite::params![entity_id, room_number, now],
  )?;
  let id = conn.last_insert_rowid();
  link_incoming_exits(conn, id, room_number)?;
  Ok((id, true))
}

/// Point stored exits that lead to `room_number` at its row.
///
/// `to_room_id` is derived from `to_room_number`, so this does not count as a
/// change to the exit.
pub fn link_incoming_exits(conn: &Connection, room_id: i64, room_number: i64) -> rusqlite::Result<usize> {
  conn.execute(
    "UPDATE room_exits SET to_room_id = ?1 WHERE to_room_number = ?2 AND to_room_id IS NULL",
    rusqlite::params![room_id, room_number],
  )
}
