//! [`SqliteStore`]: the SQLite implementation of [`GraphStore`].

use std::{collections::HashSet, path::Path};

use rusqlite::OptionalExtension as _;
use tracing::{debug, info, warn};

use mudmap_core::{
  entity::{now, EntityKey, EntityType},
  exit::{ExitDetails, ExitSuccess, RoomExit, SOURCE_OBSERVED},
  npc::{Npc, NpcData, Observation, Relation},
  path::{PathError, RoomTarget, Route},
  room::{Room, RoomVisit},
  store::{GraphStore, GraphSummary, Node},
};

use crate::{
  encode::{
    collect_nodes, encode_dt, RawExit, RawNodeRow, RawNpc, RawObservation, RawRelation,
    RawRoom, EXIT_SELECT, NODE_ORDER, NODE_SELECT, NPC_SELECT, OBSERVATION_SELECT,
    RELATION_SELECT, ROOM_SELECT,
  },
  graph,
  resolve::entity_id,
  schema::{SCHEMA, SCHEMA_VERSION},
  Error, Result,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A mudmap graph backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  pub(crate) conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  ///
  /// No store value exists unless the schema is in place, so every
  /// component built on one operates on a complete schema.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store for tests.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    let found: i64 = self
      .conn
      .call(|conn| {
        let version: i64 = conn.query_row("PRAGMA user_version", [], |r| r.get(0))?;
        if version <= SCHEMA_VERSION {
          conn.execute_batch(SCHEMA)?;
        }
        Ok(version)
      })
      .await?;

    if found > SCHEMA_VERSION {
      return Err(Error::Schema { found, supported: SCHEMA_VERSION });
    }
    debug!(version = SCHEMA_VERSION, "schema ready");
    Ok(())
  }

  async fn room_by_id(&self, id: i64) -> Result<Room> {
    let raw: RawRoom = self
      .conn
      .call(move |conn| {
        Ok(conn.query_row(
          &format!("{ROOM_SELECT} WHERE r.id = ?1"),
          rusqlite::params![id],
          RawRoom::from_row,
        )?)
      })
      .await?;
    raw.into_room()
  }

  async fn exit_by_id(&self, id: i64) -> Result<RoomExit> {
    let raw: RawExit = self
      .conn
      .call(move |conn| {
        Ok(conn.query_row(
          &format!("{EXIT_SELECT} WHERE x.id = ?1"),
          rusqlite::params![id],
          RawExit::from_row,
        )?)
      })
      .await?;
    raw.into_exit()
  }

  async fn npc_by_id(&self, id: i64) -> Result<Npc> {
    let raw: RawNpc = self
      .conn
      .call(move |conn| {
        Ok(conn.query_row(
          &format!("{NPC_SELECT} WHERE n.id = ?1"),
          rusqlite::params![id],
          RawNpc::from_row,
        )?)
      })
      .await?;
    raw.into_npc()
  }
}

// ─── GraphStore impl ─────────────────────────────────────────────────────────

impl GraphStore for SqliteStore {
  type Error = Error;

  // ── Writes ────────────────────────────────────────────────────────────────

  async fn upsert_room(&self, visit: RoomVisit) -> Result<Room> {
    let at = encode_dt(now());
    let room_number = visit.room_number;

    let id = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let id = graph::upsert_room(&tx, &visit, &at)?;
        tx.commit()?;
        Ok(id)
      })
      .await?;

    debug!(room = room_number, "room upserted");
    self.room_by_id(id).await
  }

  async fn upsert_npc(&self, npc: NpcData) -> Result<Npc> {
    let npc = npc.validate()?;
    let at = encode_dt(now());

    let id = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let id = graph::upsert_npc(&tx, &npc, &at)?;
        tx.commit()?;
        Ok(id)
      })
      .await?;

    self.npc_by_id(id).await
  }

  async fn record_exit_success(&self, success: ExitSuccess) -> Result<Option<RoomExit>> {
    let Some(success) = success.clone().screen() else {
      debug!(?success, "traversal not recordable");
      return Ok(None);
    };

    let stamped = now();
    let fresh = ExitDetails {
      move_command:    Some(success.move_command.clone()),
      pre_commands:    success.pre_commands.clone(),
      last_success_at: Some(stamped),
      source:          Some(SOURCE_OBSERVED.to_owned()),
    };
    let at = encode_dt(stamped);
    let (from, to, direction) = (success.from_room, success.to_room, success.direction.clone());

    let id = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let id = graph::record_exit(&tx, &success, &fresh, &at)?;
        tx.commit()?;
        Ok(id)
      })
      .await?;

    match id {
      Some(id) => {
        info!(from, to, %direction, "exit recorded");
        Ok(Some(self.exit_by_id(id).await?))
      }
      None => {
        warn!(from, to, %direction, "exit not recorded: origin room unknown");
        Ok(None)
      }
    }
  }

  async fn add_observation(
    &self,
    entity: EntityKey,
    text: String,
    observation_type: Option<String>,
  ) -> Result<Option<Observation>> {
    let at = encode_dt(now());
    let key = entity.clone();

    let id: Option<i64> = self
      .conn
      .call(move |conn| {
        let Some(entity_id) = entity_id(conn, &key)? else {
          return Ok(None);
        };
        let inserted = conn.execute(
          "INSERT OR IGNORE INTO observations (
             entity_id, observation_text, observation_type,
             created_at, updated_at, sync_status
           ) VALUES (?1, ?2, ?3, ?4, ?4, 'dirty')",
          rusqlite::params![entity_id, text, observation_type, at],
        )?;
        Ok((inserted > 0).then(|| conn.last_insert_rowid()))
      })
      .await?;

    let Some(id) = id else {
      debug!(%entity, "observation skipped");
      return Ok(None);
    };

    let raw: RawObservation = self
      .conn
      .call(move |conn| {
        Ok(conn.query_row(
          &format!("{OBSERVATION_SELECT} WHERE o.id = ?1"),
          rusqlite::params![id],
          RawObservation::from_row,
        )?)
      })
      .await?;
    raw.into_observation().map(Some)
  }

  async fn add_relation(
    &self,
    from: EntityKey,
    to: EntityKey,
    relation_type: String,
  ) -> Result<Option<Relation>> {
    let at = encode_dt(now());

    let id: Option<i64> = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let (Some(from_id), Some(to_id)) = (entity_id(&tx, &from)?, entity_id(&tx, &to)?) else {
          return Ok(None);
        };
        tx.execute(
          "INSERT OR IGNORE INTO relations (
             from_entity_id, to_entity_id, relation_type,
             created_at, updated_at, sync_status
           ) VALUES (?1, ?2, ?3, ?4, ?4, 'dirty')",
          rusqlite::params![from_id, to_id, relation_type, at],
        )?;
        let id: i64 = tx.query_row(
          "SELECT id FROM relations
            WHERE from_entity_id = ?1 AND to_entity_id = ?2 AND relation_type = ?3",
          rusqlite::params![from_id, to_id, relation_type],
          |r| r.get(0),
        )?;
        tx.commit()?;
        Ok(Some(id))
      })
      .await?;

    let Some(id) = id else {
      return Ok(None);
    };

    let raw: RawRelation = self
      .conn
      .call(move |conn| {
        Ok(conn.query_row(
          &format!("{RELATION_SELECT} WHERE l.id = ?1"),
          rusqlite::params![id],
          RawRelation::from_row,
        )?)
      })
      .await?;
    raw.into_relation().map(Some)
  }

  // ── Reads ─────────────────────────────────────────────────────────────────

  async fn get_room_by_number(&self, room_number: i64) -> Result<Option<Room>> {
    let raw: Option<RawRoom> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            &format!("{ROOM_SELECT} WHERE r.room_number = ?1"),
            rusqlite::params![room_number],
            RawRoom::from_row,
          )
          .optional()?)
      })
      .await?;

    raw.map(RawRoom::into_room).transpose()
  }

  async fn get_exit_command_details(
    &self,
    from_room: i64,
    direction: &str,
  ) -> Result<Option<ExitDetails>> {
    let exits = self.exits_from(from_room).await?;
    Ok(
      exits
        .into_iter()
        .find(|e| mudmap_core::direction::same_exit(&e.direction, direction))
        .map(|e| e.details),
    )
  }

  async fn find_rooms_with_unexplored_exit(
    &self,
    zone: &str,
    visited: &HashSet<i64>,
  ) -> Result<Vec<Room>> {
    let zone = zone.to_owned();

    let raws: Vec<RawRoom> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "{ROOM_SELECT}
            WHERE r.zone = ?1
              AND EXISTS (
                SELECT 1 FROM room_exits x
                  LEFT JOIN rooms t ON t.id = x.to_room_id
                 WHERE x.from_room_id = r.id
                   AND (x.to_room_id IS NULL OR t.full_name IS NULL)
              )
            ORDER BY r.room_number"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![zone], RawRoom::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws
      .into_iter()
      .filter(|r| !visited.contains(&r.room_number))
      .map(RawRoom::into_room)
      .collect()
  }

  async fn exits_from(&self, room_number: i64) -> Result<Vec<RoomExit>> {
    let raws: Vec<RawExit> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!("{EXIT_SELECT} WHERE f.room_number = ?1 ORDER BY x.id"))?;
        let rows = stmt
          .query_map(rusqlite::params![room_number], RawExit::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawExit::into_exit).collect()
  }

  async fn npcs_in_room(&self, room_number: i64) -> Result<Vec<Npc>> {
    let raws: Vec<RawNpc> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!("{NPC_SELECT} WHERE r.room_number = ?1 ORDER BY e.name"))?;
        let rows = stmt
          .query_map(rusqlite::params![room_number], RawNpc::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawNpc::into_npc).collect()
  }

  async fn room_with_npc(&self, name: &str) -> Result<Option<Room>> {
    let name = name.trim().to_owned();

    let raw: Option<RawRoom> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            &format!(
              "{ROOM_SELECT}
                JOIN npcs n ON n.current_room_id = r.id
                JOIN entities e ON e.id = n.entity_id
               WHERE e.name = ?1 AND e.entity_type = 'NPC'"
            ),
            rusqlite::params![name],
            RawRoom::from_row,
          )
          .optional()?)
      })
      .await?;

    raw.map(RawRoom::into_room).transpose()
  }

  async fn find_path(
    &self,
    start: i64,
    target: RoomTarget,
    max_depth: usize,
  ) -> Result<Result<Route, PathError>> {
    let query = target.clone();
    let result = self
      .conn
      .call(move |conn| {
        // Single read transaction for the whole search.
        let tx = conn.transaction()?;
        let result = graph::find_path(&tx, start, &target, max_depth)?;
        tx.finish()?;
        Ok(result)
      })
      .await?;

    match &result {
      Ok(route) => debug!(start, target = %query, cost = route.cost, "path found"),
      Err(e) => debug!(start, target = %query, reason = %e, "no path"),
    }
    Ok(result)
  }

  async fn summary(&self) -> Result<GraphSummary> {
    let summary = self
      .conn
      .call(|conn| {
        let mut summary = GraphSummary::default();

        let mut stmt = conn.prepare("SELECT entity_type, COUNT(*) FROM entities GROUP BY entity_type")?;
        for row in stmt.query_map([], |r| Ok((r.get::<_, String>(0)?, r.get::<_, i64>(1)?)))? {
          let (kind, count) = row?;
          summary.total_entities += count as u64;
          summary.entity_types.insert(kind, count as u64);
        }

        let mut stmt = conn.prepare("SELECT relation_type, COUNT(*) FROM relations GROUP BY relation_type")?;
        for row in stmt.query_map([], |r| Ok((r.get::<_, String>(0)?, r.get::<_, i64>(1)?)))? {
          let (kind, count) = row?;
          summary.total_relations += count as u64;
          summary.relation_types.insert(kind, count as u64);
        }

        let count = |sql: &str| conn.query_row(sql, [], |r| r.get::<_, i64>(0));
        summary.rooms = count("SELECT COUNT(*) FROM rooms")? as u64;
        summary.exits = count("SELECT COUNT(*) FROM room_exits")? as u64;
        summary.dirty_rows = count(
          "SELECT (SELECT COUNT(*) FROM entities     WHERE sync_status = 'dirty')
                + (SELECT COUNT(*) FROM rooms        WHERE sync_status = 'dirty')
                + (SELECT COUNT(*) FROM room_exits   WHERE sync_status = 'dirty')
                + (SELECT COUNT(*) FROM npcs         WHERE sync_status = 'dirty')
                + (SELECT COUNT(*) FROM observations WHERE sync_status = 'dirty')
                + (SELECT COUNT(*) FROM relations    WHERE sync_status = 'dirty')",
        )? as u64;

        Ok(summary)
      })
      .await?;

    Ok(summary)
  }

  // ── Entity queries ────────────────────────────────────────────────────────

  async fn search_nodes(&self, query: &str) -> Result<Vec<Node>> {
    let query = query.trim().to_lowercase();
    if query.is_empty() {
      return Ok(Vec::new());
    }

    let rows: Vec<RawNodeRow> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "{NODE_SELECT}
            WHERE e.id IN (
                    SELECT id FROM entities
                     WHERE instr(lower(name), ?1) > 0 OR instr(lower(entity_type), ?1) > 0
                    UNION
                    SELECT entity_id FROM observations
                     WHERE instr(lower(observation_text), ?1) > 0
                  )
            {NODE_ORDER}"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![query], RawNodeRow::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    collect_nodes(rows)
  }

  async fn open_nodes(&self, names: &[String]) -> Result<Vec<Node>> {
    if names.is_empty() {
      return Ok(Vec::new());
    }
    let names = names.to_vec();

    let rows: Vec<RawNodeRow> = self
      .conn
      .call(move |conn| {
        let placeholders = vec!["?"; names.len()].join(", ");
        let mut stmt = conn.prepare(&format!("{NODE_SELECT} WHERE e.name IN ({placeholders}) {NODE_ORDER}"))?;
        let rows = stmt
          .query_map(rusqlite::params_from_iter(names.iter()), RawNodeRow::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    collect_nodes(rows)
  }

  async fn entities_by_type(&self, entity_type: EntityType) -> Result<Vec<Node>> {
    let kind = entity_type.to_string();

    let rows: Vec<RawNodeRow> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!("{NODE_SELECT} WHERE e.entity_type = ?1 {NODE_ORDER}"))?;
        let rows = stmt
          .query_map(rusqlite::params![kind], RawNodeRow::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    collect_nodes(rows)
  }
}
