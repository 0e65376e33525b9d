//! [`LocalReplica`] and [`RemoteReplica`] for [`SqliteStore`].
//!
//! Both directions share the natural-key resolution in [`crate::resolve`]:
//! a record's parents must exist on the receiving side before it is written,
//! and the row it lands on is found by its natural key, never by id.

use chrono::{DateTime, Utc};
use tracing::debug;

use mudmap_core::{
  entity::{now, EntityKey, SyncStatus},
  sync::{
    LocalReplica, MergeOutcome, Model, NaturalKey, RemoteReplica, StoreOutcome, SyncRecord,
  },
};
use rusqlite::Connection;

use crate::{
  encode::{encode_dt, encode_exit_details, encode_json, other, RawRecord},
  resolve::{self, entity_id, first_missing, link_incoming_exits, locate, room_id},
  store::SqliteStore,
  Error, Result,
};

// ─── Reading records ─────────────────────────────────────────────────────────

enum Filter {
  Dirty,
  ChangedSince(Option<String>),
}

fn select_records(conn: &Connection, model: Model, filter: Filter) -> rusqlite::Result<Vec<RawRecord>> {
  let (select, t) = RawRecord::select(model);
  let (sql, since) = match filter {
    Filter::Dirty => (format!("{select} WHERE {t}.sync_status = 'dirty' ORDER BY {t}.id"), None),
    Filter::ChangedSince(Some(since)) => (
      format!("{select} WHERE {t}.updated_at > ?1 ORDER BY {t}.updated_at, {t}.id"),
      Some(since),
    ),
    Filter::ChangedSince(None) => (format!("{select} ORDER BY {t}.id"), None),
  };

  let mut stmt = conn.prepare(&sql)?;
  match since {
    Some(since) => stmt
      .query_map(rusqlite::params![since], |r| RawRecord::from_row(model, r))?
      .collect(),
    None => stmt.query_map([], |r| RawRecord::from_row(model, r))?.collect(),
  }
}

/// The stored row `id` of `model`, as a record, with its sync status.
fn current(conn: &Connection, model: Model, id: i64) -> tokio_rusqlite::Result<(SyncRecord, SyncStatus)> {
  let (select, t) = RawRecord::select(model);
  let raw = conn.query_row(
    &format!("{select} WHERE {t}.id = ?1"),
    rusqlite::params![id],
    |r| RawRecord::from_row(model, r),
  )?;
  let status: String = conn.query_row(
    &format!("SELECT sync_status FROM {} WHERE id = ?1", resolve::table(model)),
    rusqlite::params![id],
    |r| r.get(0),
  )?;

  let record = raw.into_record().map_err(other)?;
  let status = status.parse::<SyncStatus>().unwrap_or_default();
  Ok((record, status))
}

// ─── Writing records ─────────────────────────────────────────────────────────

/// Bookkeeping columns written alongside a record's values.
struct Stamp {
  updated_at:        String,
  status:            SyncStatus,
  remote_updated_at: Option<String>,
}

fn required(id: Option<i64>) -> tokio_rusqlite::Result<i64> {
  id.ok_or(tokio_rusqlite::Error::Rusqlite(rusqlite::Error::QueryReturnedNoRows))
}

fn insert_row(conn: &Connection, record: &SyncRecord, stamp: &Stamp) -> tokio_rusqlite::Result<()> {
  let created_at = encode_dt(record.meta().created_at);
  let (at, status, remote_at) = (&stamp.updated_at, stamp.status.as_ref(), &stamp.remote_updated_at);

  match record {
    SyncRecord::Entity(r) => {
      conn.execute(
        "INSERT INTO entities (name, entity_type, created_at, updated_at, sync_status, remote_updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        rusqlite::params![r.name, r.entity_type.as_ref(), created_at, at, status, remote_at],
      )?;
    }
    SyncRecord::Room(r) => {
      let entity_id = required(entity_id(conn, &EntityKey::room(r.room_number))?)?;
      conn.execute(
        "INSERT INTO rooms (
           entity_id, room_number, full_name, zone, terrain, outside,
           coord_x, coord_y, coord_z, details,
           created_at, updated_at, sync_status, remote_updated_at
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
        rusqlite::params![
          entity_id,
          r.room_number,
          r.full_name,
          r.zone,
          r.terrain,
          r.outside,
          r.coords.x,
          r.coords.y,
          r.coords.z,
          encode_json(r.details.as_ref()),
          created_at,
          at,
          status,
          remote_at,
        ],
      )?;
      link_incoming_exits(conn, conn.last_insert_rowid(), r.room_number)?;
    }
    SyncRecord::RoomExit(r) => {
      let from_id = required(room_id(conn, r.from_room)?)?;
      let to_id = room_id(conn, r.to_room_number)?;
      let details = encode_exit_details(&r.details).map_err(other)?;
      conn.execute(
        "INSERT INTO room_exits (
           from_room_id, direction, to_room_id, to_room_number, details,
           created_at, updated_at, sync_status, remote_updated_at
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        rusqlite::params![
          from_id,
          r.direction,
          to_id,
          r.to_room_number,
          details,
          created_at,
          at,
          status,
          remote_at
        ],
      )?;
    }
    SyncRecord::Npc(r) => {
      let entity_id = required(entity_id(conn, &EntityKey::npc(r.name.clone()))?)?;
      let room = match r.current_room {
        Some(n) => room_id(conn, n)?,
        None => None,
      };
      conn.execute(
        "INSERT INTO npcs (
           entity_id, current_room_id, npc_type,
           created_at, updated_at, sync_status, remote_updated_at
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        rusqlite::params![entity_id, room, r.npc_type, created_at, at, status, remote_at],
      )?;
    }
    SyncRecord::Observation(r) => {
      let entity_id = required(entity_id(conn, &r.entity)?)?;
      conn.execute(
        "INSERT INTO observations (
           entity_id, observation_text, observation_type,
           created_at, updated_at, sync_status, remote_updated_at
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        rusqlite::params![entity_id, r.text, r.observation_type, created_at, at, status, remote_at],
      )?;
    }
    SyncRecord::Relation(r) => {
      let from_id = required(entity_id(conn, &r.from)?)?;
      let to_id = required(entity_id(conn, &r.to)?)?;
      conn.execute(
        "INSERT INTO relations (
           from_entity_id, to_entity_id, relation_type, metadata,
           created_at, updated_at, sync_status, remote_updated_at
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        rusqlite::params![
          from_id,
          to_id,
          r.relation_type,
          encode_json(r.metadata.as_ref()),
          created_at,
          at,
          status,
          remote_at
        ],
      )?;
    }
  }
  Ok(())
}

/// Overwrite the values of row `id` with `record`.
///
/// A placeholder room record carries no room data and only touches the
/// bookkeeping columns; unknown NPC fields never erase known ones.
fn update_row(conn: &Connection, id: i64, record: &SyncRecord, stamp: &Stamp) -> tokio_rusqlite::Result<()> {
  let (at, status, remote_at) = (&stamp.updated_at, stamp.status.as_ref(), &stamp.remote_updated_at);

  match record {
    SyncRecord::Room(r) if r.full_name.is_some() => {
      conn.execute(
        "UPDATE rooms SET full_name = ?2, zone = ?3, terrain = ?4, outside = ?5,
                coord_x = ?6, coord_y = ?7, coord_z = ?8, details = ?9,
                updated_at = ?10, sync_status = ?11, remote_updated_at = ?12
          WHERE id = ?1",
        rusqlite::params![
          id,
          r.full_name,
          r.zone,
          r.terrain,
          r.outside,
          r.coords.x,
          r.coords.y,
          r.coords.z,
          encode_json(r.details.as_ref()),
          at,
          status,
          remote_at,
        ],
      )?;
    }
    SyncRecord::RoomExit(r) => {
      let to_id = room_id(conn, r.to_room_number)?;
      let details = encode_exit_details(&r.details).map_err(other)?;
      conn.execute(
        "UPDATE room_exits SET direction = ?2, to_room_id = COALESCE(?3, to_room_id), details = ?4,
                updated_at = ?5, sync_status = ?6, remote_updated_at = ?7
          WHERE id = ?1",
        rusqlite::params![id, r.direction, to_id, details, at, status, remote_at],
      )?;
    }
    SyncRecord::Npc(r) => {
      let room = match r.current_room {
        Some(n) => room_id(conn, n)?,
        None => None,
      };
      conn.execute(
        "UPDATE npcs SET current_room_id = COALESCE(?2, current_room_id),
                npc_type = COALESCE(?3, npc_type),
                updated_at = ?4, sync_status = ?5, remote_updated_at = ?6
          WHERE id = ?1",
        rusqlite::params![id, room, r.npc_type, at, status, remote_at],
      )?;
    }
    SyncRecord::Observation(r) => {
      conn.execute(
        "UPDATE observations SET observation_type = COALESCE(?2, observation_type),
                updated_at = ?3, sync_status = ?4, remote_updated_at = ?5
          WHERE id = ?1",
        rusqlite::params![id, r.observation_type, at, status, remote_at],
      )?;
    }
    SyncRecord::Relation(r) => {
      conn.execute(
        "UPDATE relations SET metadata = COALESCE(?2, metadata),
                updated_at = ?3, sync_status = ?4, remote_updated_at = ?5
          WHERE id = ?1",
        rusqlite::params![id, encode_json(r.metadata.as_ref()), at, status, remote_at],
      )?;
    }
    SyncRecord::Entity(_) | SyncRecord::Room(_) => {
      let table = resolve::table(record.model());
      conn.execute(
        &format!(
          "UPDATE {table} SET updated_at = ?2, sync_status = ?3, remote_updated_at = ?4 WHERE id = ?1"
        ),
        rusqlite::params![id, at, status, remote_at],
      )?;
    }
  }
  Ok(())
}

// ─── Conflict rules ──────────────────────────────────────────────────────────

/// Merge a pulled record into a locally modified one.
///
/// Scalars follow the record with the later `updated_at`, without letting an
/// unknown value replace a known one; a visited room always beats a
/// placeholder. Exit details follow the later
/// `last_success_at`, carrying their label with them.
fn merge(local: SyncRecord, remote: &SyncRecord) -> SyncRecord {
  let remote_newer = remote.meta().updated_at > local.meta().updated_at;

  match (local, remote) {
    (SyncRecord::Room(mut l), SyncRecord::Room(r)) => {
      if r.full_name.is_some() && (remote_newer || l.full_name.is_none()) {
        l.full_name = r.full_name.clone();
        l.zone = r.zone.clone().or(l.zone);
        l.terrain = r.terrain.clone().or(l.terrain);
        l.outside = r.outside;
        l.coords.x = r.coords.x.or(l.coords.x);
        l.coords.y = r.coords.y.or(l.coords.y);
        l.coords.z = r.coords.z.or(l.coords.z);
        l.details = r.details.clone().or(l.details);
      }
      SyncRecord::Room(l)
    }
    (SyncRecord::RoomExit(mut l), SyncRecord::RoomExit(r)) => {
      if r.details.newer_than(&l.details) {
        l.details = r.details.clone();
        l.direction = r.direction.clone();
      }
      SyncRecord::RoomExit(l)
    }
    (SyncRecord::Npc(mut l), SyncRecord::Npc(r)) => {
      if remote_newer {
        l.npc_type = r.npc_type.clone().or(l.npc_type);
        l.current_room = r.current_room.or(l.current_room);
      }
      SyncRecord::Npc(l)
    }
    (SyncRecord::Observation(mut l), SyncRecord::Observation(r)) => {
      if remote_newer {
        l.observation_type = r.observation_type.clone().or(l.observation_type);
      }
      SyncRecord::Observation(l)
    }
    (SyncRecord::Relation(mut l), SyncRecord::Relation(r)) => {
      if remote_newer {
        l.metadata = r.metadata.clone().or(l.metadata);
      }
      SyncRecord::Relation(l)
    }
    (local, _) => local,
  }
}

/// Keep stored exit details that describe a later traversal than the
/// incoming ones.
fn keep_newer_details(stored: &SyncRecord, mut incoming: SyncRecord) -> SyncRecord {
  if let (SyncRecord::RoomExit(s), SyncRecord::RoomExit(i)) = (stored, &mut incoming) {
    if s.details.newer_than(&i.details) {
      i.details = s.details.clone();
      i.direction = s.direction.clone();
    }
  }
  incoming
}

// ─── LocalReplica impl ───────────────────────────────────────────────────────

impl LocalReplica for SqliteStore {
  type Error = Error;

  async fn dirty_records(&self, model: Model) -> Result<Vec<SyncRecord>> {
    let raws = self
      .conn
      .call(move |conn| Ok(select_records(conn, model, Filter::Dirty)?))
      .await?;

    raws.into_iter().map(RawRecord::into_record).collect()
  }

  async fn mark_synced(
    &self,
    key: NaturalKey,
    pushed_updated_at: DateTime<Utc>,
    remote_updated_at: DateTime<Utc>,
  ) -> Result<bool> {
    let table = resolve::table(key.model());
    let pushed = encode_dt(pushed_updated_at);
    let remote = encode_dt(remote_updated_at);

    let marked = self
      .conn
      .call(move |conn| {
        let Some(id) = locate(conn, &key)? else {
          return Ok(false);
        };
        let changed = conn.execute(
          &format!(
            "UPDATE {table} SET sync_status = 'synced', remote_updated_at = ?2
              WHERE id = ?1 AND updated_at = ?3"
          ),
          rusqlite::params![id, remote, pushed],
        )?;
        Ok(changed > 0)
      })
      .await?;

    Ok(marked)
  }

  async fn merge_record(&self, record: SyncRecord) -> Result<MergeOutcome> {
    validate(&record)?;
    let merged_at = encode_dt(now());
    let remote_at = encode_dt(record.meta().updated_at);
    let key = record.natural_key();

    let outcome = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        if let Some(missing) = first_missing(&tx, &record.parents())? {
          return Ok(MergeOutcome::Skipped(missing));
        }

        let outcome = match locate(&tx, &record.natural_key())? {
          None => {
            let stamp = Stamp {
              updated_at:        remote_at.clone(),
              status:            SyncStatus::Synced,
              remote_updated_at: Some(remote_at),
            };
            insert_row(&tx, &record, &stamp)?;
            MergeOutcome::Inserted
          }
          Some(id) => match current(&tx, record.model(), id)? {
            (_, SyncStatus::Synced) => {
              let stamp = Stamp {
                updated_at:        remote_at.clone(),
                status:            SyncStatus::Synced,
                remote_updated_at: Some(remote_at),
              };
              update_row(&tx, id, &record, &stamp)?;
              MergeOutcome::Overwritten
            }
            (local, SyncStatus::Dirty) => {
              let stamp = Stamp {
                updated_at:        merged_at,
                status:            SyncStatus::Dirty,
                remote_updated_at: Some(remote_at),
              };
              update_row(&tx, id, &merge(local, &record), &stamp)?;
              MergeOutcome::Merged
            }
          },
        };

        tx.commit()?;
        Ok(outcome)
      })
      .await?;

    debug!(%key, ?outcome, "pulled record applied");
    Ok(outcome)
  }
}

// ─── RemoteReplica impl ──────────────────────────────────────────────────────

impl RemoteReplica for SqliteStore {
  type Error = Error;

  async fn ping(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.query_row("SELECT 1", [], |r| r.get::<_, i64>(0))?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn changed_since(
    &self,
    model: Model,
    since: Option<DateTime<Utc>>,
  ) -> Result<Vec<SyncRecord>> {
    let since = since.map(encode_dt);
    let raws = self
      .conn
      .call(move |conn| Ok(select_records(conn, model, Filter::ChangedSince(since))?))
      .await?;

    raws.into_iter().map(RawRecord::into_record).collect()
  }

  async fn store_record(&self, record: SyncRecord) -> Result<StoreOutcome> {
    validate(&record)?;
    let stored_at = now();
    let stamp = Stamp {
      updated_at:        encode_dt(stored_at),
      status:            SyncStatus::Synced,
      remote_updated_at: None,
    };

    let outcome = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        if let Some(missing) = first_missing(&tx, &record.parents())? {
          return Ok(StoreOutcome::Unresolved { missing });
        }

        match locate(&tx, &record.natural_key())? {
          None => insert_row(&tx, &record, &stamp)?,
          Some(id) => {
            let (stored, _) = current(&tx, record.model(), id)?;
            update_row(&tx, id, &keep_newer_details(&stored, record), &stamp)?;
          }
        }

        tx.commit()?;
        Ok(StoreOutcome::Stored { updated_at: stored_at })
      })
      .await?;

    Ok(outcome)
  }
}

/// Reject records naming an entity with a blank name.
fn validate(record: &SyncRecord) -> Result<()> {
  let blank = match record {
    SyncRecord::Entity(r) => r.name.trim().is_empty(),
    SyncRecord::Npc(r) => r.name.trim().is_empty(),
    _ => false,
  };
  if blank {
    return Err(Error::InvalidRecord(format!("blank name in {}", record.natural_key())));
  }
  Ok(())
}
