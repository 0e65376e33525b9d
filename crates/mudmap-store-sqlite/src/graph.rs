//! Transaction bodies for graph writes and the path search.
//!
//! Each function runs on the connection thread against an open transaction
//! and leaves committing to the caller.

use mudmap_core::{
  direction::{normalize, same_exit},
  entity::{EntityKey, SyncStatus},
  exit::{ExitDetails, ExitSuccess},
  npc::NpcData,
  path::{breadth_first, single_match, Hop, PathError, RoomTarget, Route},
  room::{RoomVisit, VisitExit},
};
use rusqlite::{Connection, OptionalExtension as _};

use crate::{
  encode::{decode_exit_details, encode_json, other},
  resolve::{ensure_entity, ensure_room, link_incoming_exits, room_id},
};

// ─── Rooms ───────────────────────────────────────────────────────────────────

/// The mutable columns of a room row.
#[derive(Debug, PartialEq)]
struct RoomColumns {
  full_name: Option<String>,
  zone:      Option<String>,
  terrain:   Option<String>,
  outside:   bool,
  coord_x:   Option<i64>,
  coord_y:   Option<i64>,
  coord_z:   Option<i64>,
  details:   Option<String>,
}

/// Upsert a visited room with its listed exits and NPC sightings. Returns
/// the room id.
pub fn upsert_room(conn: &Connection, visit: &RoomVisit, now: &str) -> tokio_rusqlite::Result<i64> {
  let entity_id = ensure_entity(conn, &EntityKey::room(visit.room_number), now, SyncStatus::Dirty)?;

  let stored: Option<(i64, RoomColumns)> = conn
    .query_row(
      "SELECT id, full_name, zone, terrain, outside, coord_x, coord_y, coord_z, details
         FROM rooms WHERE room_number = ?1",
      rusqlite::params![visit.room_number],
      |r| {
        Ok((r.get(0)?, RoomColumns {
          full_name: r.get(1)?,
          zone:      r.get(2)?,
          terrain:   r.get(3)?,
          outside:   r.get(4)?,
          coord_x:   r.get(5)?,
          coord_y:   r.get(6)?,
          coord_z:   r.get(7)?,
          details:   r.get(8)?,
        }))
      },
    )
    .optional()?;

  let room_id = match stored {
    None => {
      let coords = visit.coords.unwrap_or_default();
      conn.execute(
        "INSERT INTO rooms (
           entity_id, room_number, full_name, zone, terrain, outside,
           coord_x, coord_y, coord_z, details, created_at, updated_at, sync_status
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?11, 'dirty')",
        rusqlite::params![
          entity_id,
          visit.room_number,
          visit.full_name,
          visit.zone,
          visit.terrain,
          visit.outside.unwrap_or(false),
          coords.x,
          coords.y,
          coords.z,
          encode_json(visit.details.as_ref()),
          now,
        ],
      )?;
      conn.last_insert_rowid()
    }
    Some((id, old)) => {
      let coords = visit.coords.unwrap_or_default();
      let next = RoomColumns {
        full_name: Some(visit.full_name.clone()),
        zone:      visit.zone.clone().or_else(|| old.zone.clone()),
        terrain:   visit.terrain.clone().or_else(|| old.terrain.clone()),
        outside:   visit.outside.unwrap_or(old.outside),
        coord_x:   coords.x.or(old.coord_x),
        coord_y:   coords.y.or(old.coord_y),
        coord_z:   coords.z.or(old.coord_z),
        details:   encode_json(visit.details.as_ref()).or_else(|| old.details.clone()),
      };
      if next != old {
        conn.execute(
          "UPDATE rooms SET full_name = ?2, zone = ?3, terrain = ?4, outside = ?5,
                  coord_x = ?6, coord_y = ?7, coord_z = ?8, details = ?9,
                  updated_at = ?10, sync_status = 'dirty'
            WHERE id = ?1",
          rusqlite::params![
            id,
            next.full_name,
            next.zone,
            next.terrain,
            next.outside,
            next.coord_x,
            next.coord_y,
            next.coord_z,
            next.details,
            now,
          ],
        )?;
      }
      id
    }
  };

  link_incoming_exits(conn, room_id, visit.room_number)?;

  let mut seen_targets = Vec::with_capacity(visit.exits.len());
  for exit in &visit.exits {
    if seen_targets.contains(&exit.to_room_number) {
      continue;
    }
    seen_targets.push(exit.to_room_number);
    upsert_listed_exit(conn, room_id, exit, now)?;
  }

  for sighting in &visit.npcs {
    let npc = NpcData {
      name:        sighting.name().trim().to_owned(),
      npc_type:    sighting.npc_type().map(str::to_owned),
      room_number: Some(visit.room_number),
    };
    upsert_npc(conn, &npc, now)?;
  }

  Ok(room_id)
}

/// Store an exit advertised by a room payload. Labels learned from an
/// observed traversal take precedence over the advertised one.
fn upsert_listed_exit(
  conn: &Connection,
  from_room_id: i64,
  exit: &VisitExit,
  now: &str,
) -> tokio_rusqlite::Result<()> {
  let direction = normalize(&exit.direction);

  let stored: Option<(i64, String, String)> = conn
    .query_row(
      "SELECT id, direction, details FROM room_exits
        WHERE from_room_id = ?1 AND to_room_number = ?2",
      rusqlite::params![from_room_id, exit.to_room_number],
      |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
    )
    .optional()?;

  match stored {
    None => {
      let to_room_id = room_id(conn, exit.to_room_number)?;
      conn.execute(
        "INSERT INTO room_exits (
           from_room_id, direction, to_room_id, to_room_number, details,
           created_at, updated_at, sync_status
         ) VALUES (?1, ?2, ?3, ?4, '{}', ?5, ?5, 'dirty')",
        rusqlite::params![from_room_id, direction, to_room_id, exit.to_room_number, now],
      )?;
    }
    Some((id, old_direction, details)) => {
      let observed = decode_exit_details(&details).map_err(other)?.move_command.is_some();
      if !observed && !same_exit(&old_direction, &direction) {
        conn.execute(
          "UPDATE room_exits SET direction = ?2, updated_at = ?3, sync_status = 'dirty'
            WHERE id = ?1",
          rusqlite::params![id, direction, now],
        )?;
      }
    }
  }
  Ok(())
}

// ─── NPCs ────────────────────────────────────────────────────────────────────

/// Upsert an NPC. Returns the npc id.
pub fn upsert_npc(conn: &Connection, npc: &NpcData, now: &str) -> tokio_rusqlite::Result<i64> {
  let entity_id = ensure_entity(conn, &EntityKey::npc(npc.name.clone()), now, SyncStatus::Dirty)?;
  let room = match npc.room_number {
    Some(n) => room_id(conn, n)?,
    None => None,
  };

  let stored: Option<(i64, Option<i64>, Option<String>)> = conn
    .query_row(
      "SELECT id, current_room_id, npc_type FROM npcs WHERE entity_id = ?1",
      rusqlite::params![entity_id],
      |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
    )
    .optional()?;

  match stored {
    None => {
      conn.execute(
        "INSERT INTO npcs (entity_id, current_room_id, npc_type, created_at, updated_at, sync_status)
         VALUES (?1, ?2, ?3, ?4, ?4, 'dirty')",
        rusqlite::params![entity_id, room, npc.npc_type, now],
      )?;
      Ok(conn.last_insert_rowid())
    }
    Some((id, old_room, old_type)) => {
      let next_room = room.or(old_room);
      let next_type = npc.npc_type.clone().or_else(|| old_type.clone());
      if next_room != old_room || next_type != old_type {
        conn.execute(
          "UPDATE npcs SET current_room_id = ?2, npc_type = ?3,
                  updated_at = ?4, sync_status = 'dirty'
            WHERE id = ?1",
          rusqlite::params![id, next_room, next_type, now],
        )?;
      }
      Ok(id)
    }
  }
}

// ─── Exits ───────────────────────────────────────────────────────────────────

/// Record a screened traversal. Returns the exit id, or `None` when the
/// origin room is unknown.
pub fn record_exit(
  conn: &Connection,
  success: &ExitSuccess,
  fresh: &ExitDetails,
  now: &str,
) -> tokio_rusqlite::Result<Option<i64>> {
  let Some(from_room_id) = room_id(conn, success.from_room)? else {
    return Ok(None);
  };
  let (to_room_id, _) = ensure_room(conn, success.to_room, now)?;

  let stored: Option<(i64, String)> = conn
    .query_row(
      "SELECT id, details FROM room_exits WHERE from_room_id = ?1 AND to_room_number = ?2",
      rusqlite::params![from_room_id, success.to_room],
      |r| Ok((r.get(0)?, r.get(1)?)),
    )
    .optional()?;

  match stored {
    Some((id, details)) => {
      let details = merge_details(&details, fresh).map_err(other)?;
      conn.execute(
        "UPDATE room_exits SET direction = ?2, to_room_id = ?3, details = ?4,
                updated_at = ?5, sync_status = 'dirty'
          WHERE id = ?1",
        rusqlite::params![id, success.direction, to_room_id, details, now],
      )?;
      Ok(Some(id))
    }
    None => {
      let details = merge_details("", fresh).map_err(other)?;
      conn.execute(
        "INSERT INTO room_exits (
           from_room_id, direction, to_room_id, to_room_number, details,
           created_at, updated_at, sync_status
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6, 'dirty')",
        rusqlite::params![from_room_id, success.direction, to_room_id, success.to_room, details, now],
      )?;
      Ok(Some(conn.last_insert_rowid()))
    }
  }
}

/// Overlay `fresh` onto a stored details blob, keeping keys it does not
/// know about.
fn merge_details(stored: &str, fresh: &ExitDetails) -> serde_json::Result<String> {
  let mut map = match stored.trim() {
    "" => serde_json::Map::new(),
    s => match serde_json::from_str::<serde_json::Value>(s)? {
      serde_json::Value::Object(map) => map,
      _ => serde_json::Map::new(),
    },
  };
  if let serde_json::Value::Object(fresh) = serde_json::to_value(fresh)? {
    map.extend(fresh);
  }
  serde_json::to_string(&map)
}

// ─── Path search ─────────────────────────────────────────────────────────────

/// Outgoing edges of a room whose target row exists.
fn hops(conn: &Connection, room_number: i64) -> tokio_rusqlite::Result<Vec<Hop>> {
  let mut stmt = conn.prepare_cached(
    "SELECT t.room_number, x.direction, x.details
       FROM room_exits x
       JOIN rooms f ON f.id = x.from_room_id
       JOIN rooms t ON t.id = x.to_room_id
      WHERE f.room_number = ?1
      ORDER BY x.id",
  )?;
  let rows = stmt
    .query_map(rusqlite::params![room_number], |r| {
      Ok((r.get::<_, i64>(0)?, r.get::<_, String>(1)?, r.get::<_, String>(2)?))
    })?
    .collect::<rusqlite::Result<Vec<_>>>()?;

  rows
    .into_iter()
    .map(|(to, direction, details)| {
      let details = decode_exit_details(&details).map_err(other)?;
      Ok(Hop { to, commands: details.commands(&direction) })
    })
    .collect()
}

/// Room numbers whose full name contains `query`, ignoring case.
fn rooms_named(conn: &Connection, query: &str) -> rusqlite::Result<Vec<i64>> {
  let mut stmt = conn.prepare(
    "SELECT room_number FROM rooms
      WHERE full_name IS NOT NULL AND instr(lower(full_name), lower(?1)) > 0
      ORDER BY room_number",
  )?;
  stmt
    .query_map(rusqlite::params![query], |r| r.get(0))?
    .collect()
}

pub fn find_path(
  conn: &Connection,
  start: i64,
  target: &RoomTarget,
  max_depth: usize,
) -> tokio_rusqlite::Result<Result<Route, PathError>> {
  if room_id(conn, start)?.is_none() {
    return Ok(Err(PathError::UnknownRoom { query: start.to_string() }));
  }

  let target = match target {
    RoomTarget::Number(n) => {
      if room_id(conn, *n)?.is_none() {
        return Ok(Err(PathError::UnknownRoom { query: n.to_string() }));
      }
      *n
    }
    RoomTarget::Name(query) if query.trim().is_empty() => {
      return Ok(Err(PathError::UnknownRoom { query: query.clone() }));
    }
    RoomTarget::Name(query) => match single_match(query, rooms_named(conn, query.trim())?) {
      Ok(n) => n,
      Err(e) => return Ok(Err(e)),
    },
  };

  let route = breadth_first(start, target, max_depth, |room| hops(conn, room))?;
  Ok(route.ok_or(PathError::NotFound))
}
