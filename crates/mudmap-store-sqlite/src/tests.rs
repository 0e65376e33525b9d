//! Integration tests for `SqliteStore` against an in-memory database.

use std::collections::HashSet;

use mudmap_core::{
  entity::{EntityKey, EntityType, SyncStatus},
  exit::{ExitDetails, ExitSuccess},
  npc::NpcData,
  path::{PathError, RoomTarget},
  room::{NpcSighting, RoomVisit, VisitExit},
  store::GraphStore,
  sync::{LocalReplica, MergeOutcome, Model, NaturalKey, RemoteReplica, StoreOutcome, SyncRecord},
};

use crate::{Error, SqliteStore};

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

fn visit(n: i64, name: &str, zone: &str, exits: &[(&str, i64)]) -> RoomVisit {
  let mut v = RoomVisit::new(n, name);
  v.zone = Some(zone.into());
  v.exits = exits
    .iter()
    .map(|(d, to)| VisitExit { direction: d.to_string(), to_room_number: *to })
    .collect();
  v
}

fn moved(from: i64, to: i64, cmd: &str) -> ExitSuccess {
  ExitSuccess {
    from_room:    from,
    to_room:      to,
    direction:    cmd.into(),
    move_command: cmd.into(),
    pre_commands: vec![],
  }
}

// ─── Schema ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn newer_schema_is_refused() {
  let path = std::env::temp_dir().join(format!(
    "mudmap-schema-{}-{}.db",
    std::process::id(),
    chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default()
  ));
  {
    let conn = rusqlite::Connection::open(&path).unwrap();
    conn.execute_batch("PRAGMA user_version = 99;").unwrap();
  }

  let result = SqliteStore::open(&path).await;
  assert!(matches!(result, Err(Error::Schema { found: 99, .. })));
  let _ = std::fs::remove_file(&path);
}

// ─── Rooms ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn upsert_room_is_idempotent() {
  let s = store().await;

  let first = s.upsert_room(visit(100, "Town Square", "aylor", &[])).await.unwrap();
  let second = s.upsert_room(visit(100, "Town Square", "aylor", &[])).await.unwrap();

  assert_eq!(first.id, second.id);
  assert_eq!(first.entity_id, second.entity_id);
  assert_eq!(first.meta.updated_at, second.meta.updated_at);

  let summary = s.summary().await.unwrap();
  assert_eq!(summary.rooms, 1);
  assert_eq!(summary.entity_types.get("Room"), Some(&1));
}

#[tokio::test]
async fn upsert_room_keeps_fields_missing_from_payload() {
  let s = store().await;

  let mut v = visit(100, "Town Square", "aylor", &[]);
  v.terrain = Some("city".into());
  s.upsert_room(v).await.unwrap();

  let room = s.upsert_room(RoomVisit::new(100, "Town Square (north)")).await.unwrap();
  assert_eq!(room.full_name.as_deref(), Some("Town Square (north)"));
  assert_eq!(room.zone.as_deref(), Some("aylor"));
  assert_eq!(room.terrain.as_deref(), Some("city"));
}

#[tokio::test]
async fn listed_exits_resolve_when_target_is_visited() {
  let s = store().await;

  s.upsert_room(visit(1, "Gate", "aylor", &[("north", 2)])).await.unwrap();
  let exits = s.exits_from(1).await.unwrap();
  assert_eq!(exits.len(), 1);
  assert_eq!(exits[0].direction, "n");
  assert!(!exits[0].resolved);

  s.upsert_room(visit(2, "Road", "aylor", &[("s", 1)])).await.unwrap();
  let exits = s.exits_from(1).await.unwrap();
  assert!(exits[0].resolved);
  assert!(s.exits_from(2).await.unwrap()[0].resolved);
}

#[tokio::test]
async fn npc_sightings_commit_with_room() {
  let s = store().await;

  let mut v = visit(5, "Guild Hall", "aylor", &[]);
  v.npcs = vec![
    NpcSighting::Name("a guard".into()),
    NpcSighting::Detailed { name: "the questor".into(), npc_type: Some("Questor".into()) },
  ];
  s.upsert_room(v).await.unwrap();

  let npcs = s.npcs_in_room(5).await.unwrap();
  assert_eq!(npcs.len(), 2);
  assert_eq!(npcs[1].npc_type.as_deref(), Some("Questor"));

  let room = s.room_with_npc("the questor").await.unwrap().unwrap();
  assert_eq!(room.room_number, 5);

  // Seen elsewhere: moves without losing its type.
  s.upsert_room(visit(6, "Bank", "aylor", &[])).await.unwrap();
  let npc = s.upsert_npc(NpcData::new("the questor").in_room(6)).await.unwrap();
  assert_eq!(npc.current_room, Some(6));
  assert_eq!(npc.npc_type.as_deref(), Some("Questor"));
}

// ─── Exits ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn record_exit_creates_placeholder_target() {
  let s = store().await;
  s.upsert_room(visit(1, "Gate", "aylor", &[])).await.unwrap();

  let mut success = moved(1, 2, "enter portal");
  success.pre_commands = vec!["unlock portal".into(), "run 2e".into()];
  let exit = s.record_exit_success(success).await.unwrap().unwrap();

  assert_eq!(exit.from_room_number, 1);
  assert_eq!(exit.to_room_number, 2);
  assert!(exit.resolved);
  assert_eq!(exit.details.move_command.as_deref(), Some("enter portal"));
  assert_eq!(exit.details.pre_commands, vec!["unlock portal"]);
  assert_eq!(exit.details.source.as_deref(), Some("observed"));
  assert!(exit.details.last_success_at.is_some());

  let target = s.get_room_by_number(2).await.unwrap().unwrap();
  assert!(target.is_placeholder());
}

#[tokio::test]
async fn record_exit_updates_existing_edge() {
  let s = store().await;
  s.upsert_room(visit(1, "Gate", "aylor", &[("n", 2)])).await.unwrap();

  s.record_exit_success(moved(1, 2, "north")).await.unwrap().unwrap();
  let exits = s.exits_from(1).await.unwrap();
  assert_eq!(exits.len(), 1);
  assert_eq!(exits[0].direction, "n");
  assert_eq!(exits[0].details.move_command.as_deref(), Some("north"));
}

#[tokio::test]
async fn unrecordable_traversals_are_ignored() {
  let s = store().await;
  s.upsert_room(visit(1, "Gate", "aylor", &[])).await.unwrap();

  assert!(s.record_exit_success(moved(1, 2, "run 3n")).await.unwrap().is_none());
  assert!(s.record_exit_success(moved(1, 2, "scan")).await.unwrap().is_none());
  assert!(s.record_exit_success(moved(99, 2, "n")).await.unwrap().is_none());
  assert!(s.exits_from(1).await.unwrap().is_empty());
}

#[tokio::test]
async fn exit_details_resolve_direction_synonyms() {
  let s = store().await;
  s.upsert_room(visit(1, "Gate", "aylor", &[])).await.unwrap();

  let mut success = moved(1, 2, "east");
  success.pre_commands = vec!["open door east".into()];
  s.record_exit_success(success).await.unwrap();

  let short = s.get_exit_command_details(1, "e").await.unwrap().unwrap();
  let long = s.get_exit_command_details(1, "East").await.unwrap().unwrap();
  assert_eq!(short, long);
  assert_eq!(short.pre_commands, vec!["open door east"]);
  assert!(s.get_exit_command_details(1, "w").await.unwrap().is_none());
}

#[tokio::test]
async fn unexplored_exits_are_found_per_zone() {
  let s = store().await;
  s.upsert_room(visit(1, "Gate", "aylor", &[("n", 2), ("e", 3)])).await.unwrap();
  s.upsert_room(visit(2, "Road", "aylor", &[("s", 1)])).await.unwrap();
  s.upsert_room(visit(3, "Field", "aylor", &[("w", 1)])).await.unwrap();
  s.upsert_room(visit(4, "Dock", "harbour", &[("n", 9)])).await.unwrap();
  s.upsert_room(visit(5, "Alley", "aylor", &[("d", 6)])).await.unwrap();

  let rooms = s.find_rooms_with_unexplored_exit("aylor", &HashSet::new()).await.unwrap();
  let numbers: Vec<_> = rooms.iter().map(|r| r.room_number).collect();
  assert_eq!(numbers, vec![5]);

  let visited = HashSet::from([5]);
  assert!(s.find_rooms_with_unexplored_exit("aylor", &visited).await.unwrap().is_empty());
}

// ─── Paths ───────────────────────────────────────────────────────────────────

async fn line(s: &SqliteStore) {
  s.upsert_room(visit(1, "West End", "aylor", &[])).await.unwrap();
  s.upsert_room(visit(2, "Market Street", "aylor", &[])).await.unwrap();
  s.upsert_room(visit(3, "East End", "aylor", &[])).await.unwrap();
  s.record_exit_success(moved(1, 2, "e")).await.unwrap();
  s.record_exit_success(moved(2, 3, "e")).await.unwrap();
  let mut unlock = moved(3, 4, "enter gate");
  unlock.pre_commands = vec!["unlock gate".into()];
  s.record_exit_success(unlock).await.unwrap();
}

#[tokio::test]
async fn path_of_one_hop_costs_one() {
  let s = store().await;
  line(&s).await;

  let route = s.find_path(1, RoomTarget::Number(2), 10).await.unwrap().unwrap();
  assert_eq!(route.path, vec!["e"]);
  assert_eq!(route.cost, 1);
}

#[tokio::test]
async fn path_replays_pre_commands() {
  let s = store().await;
  line(&s).await;

  let route = s.find_path(1, RoomTarget::Number(4), 10).await.unwrap().unwrap();
  assert_eq!(route.path, vec!["e", "e", "unlock gate", "enter gate"]);
  assert_eq!(route.cost, 3);
}

#[tokio::test]
async fn path_beyond_max_depth_is_not_found() {
  let s = store().await;
  line(&s).await;

  let result = s.find_path(1, RoomTarget::Number(3), 1).await.unwrap();
  assert_eq!(result, Err(PathError::NotFound));
}

#[tokio::test]
async fn path_by_name_distinguishes_failures() {
  let s = store().await;
  line(&s).await;

  let route = s.find_path(1, "market".parse().unwrap(), 10).await.unwrap().unwrap();
  assert_eq!(route.rooms, vec![1, 2]);

  let ambiguous = s.find_path(1, "end".parse().unwrap(), 10).await.unwrap();
  assert!(matches!(ambiguous, Err(PathError::Ambiguous { ref matches, .. }) if matches.len() == 2));

  let unknown = s.find_path(1, "castle".parse().unwrap(), 10).await.unwrap();
  assert!(matches!(unknown, Err(PathError::UnknownRoom { .. })));

  let bad_start = s.find_path(42, RoomTarget::Number(1), 10).await.unwrap();
  assert!(matches!(bad_start, Err(PathError::UnknownRoom { .. })));
}

#[tokio::test]
async fn blank_room_name_is_unknown() {
  let s = store().await;
  line(&s).await;

  for blank in ["", "   "] {
    let result = s.find_path(1, RoomTarget::Name(blank.to_owned()), 10).await.unwrap();
    assert!(matches!(result, Err(PathError::UnknownRoom { .. })), "{blank:?}");
  }
}

#[tokio::test]
async fn path_to_self_is_empty() {
  let s = store().await;
  line(&s).await;

  let route = s.find_path(2, RoomTarget::Number(2), 10).await.unwrap().unwrap();
  assert!(route.path.is_empty());
  assert_eq!(route.cost, 0);
}

// ─── Observations & relations ────────────────────────────────────────────────

#[tokio::test]
async fn observations_and_relations_deduplicate() {
  let s = store().await;
  s.upsert_room(visit(5, "Guild Hall", "aylor", &[])).await.unwrap();
  s.upsert_npc(NpcData::new("the questor").in_room(5)).await.unwrap();

  let npc = EntityKey::npc("the questor");
  let first = s
    .add_observation(npc.clone(), "gives quests".into(), Some("role".into()))
    .await
    .unwrap();
  assert!(first.is_some());
  let dup = s.add_observation(npc.clone(), "gives quests".into(), None).await.unwrap();
  assert!(dup.is_none());

  let a = s.add_relation(npc.clone(), EntityKey::room(5), "located_in".into()).await.unwrap().unwrap();
  let b = s.add_relation(npc.clone(), EntityKey::room(5), "located_in".into()).await.unwrap().unwrap();
  assert_eq!(a.id, b.id);
  assert!(s.add_relation(npc, EntityKey::room(77), "located_in".into()).await.unwrap().is_none());

  let summary = s.summary().await.unwrap();
  assert_eq!(summary.total_relations, 1);
  assert_eq!(summary.relation_types.get("located_in"), Some(&1));
  assert_eq!(summary.entity_types.get("NPC"), Some(&1));
}

// ─── Entity queries ──────────────────────────────────────────────────────────

async fn town(s: &SqliteStore) {
  s.upsert_room(visit(100, "Town Square", "aylor", &[])).await.unwrap();
  s.upsert_npc(NpcData::new("Aylor Questor").in_room(100)).await.unwrap();
  s.upsert_npc(NpcData::new("Town Crier").in_room(100)).await.unwrap();
  s.add_observation(EntityKey::room(100), "The questor waits by the fountain".into(), None)
    .await
    .unwrap();
  s.add_observation(EntityKey::npc("Aylor Questor"), "gives quests".into(), Some("role".into()))
    .await
    .unwrap();
  s.add_observation(EntityKey::npc("Aylor Questor"), "never sleeps".into(), None)
    .await
    .unwrap();
}

fn names(nodes: &[mudmap_core::store::Node]) -> Vec<&str> { nodes.iter().map(|n| n.name.as_str()).collect() }

#[tokio::test]
async fn search_matches_names_types_and_observations() {
  let s = store().await;
  town(&s).await;

  let found = s.search_nodes("QUESTOR").await.unwrap();
  assert_eq!(names(&found), vec!["Aylor Questor", "100"]);
  assert_eq!(found[0].entity_type, EntityType::Npc);
  assert_eq!(found[0].observations, vec!["gives quests", "never sleeps"]);
  assert_eq!(found[1].observations, vec!["The questor waits by the fountain"]);

  let by_type = s.search_nodes("npc").await.unwrap();
  assert_eq!(names(&by_type), vec!["Aylor Questor", "Town Crier"]);

  assert!(s.search_nodes("   ").await.unwrap().is_empty());
  assert!(s.search_nodes("dragon").await.unwrap().is_empty());
}

#[tokio::test]
async fn open_nodes_by_exact_name() {
  let s = store().await;
  town(&s).await;

  let wanted = ["Town Crier", "100", "Ghost", "town crier"].map(String::from);
  let opened = s.open_nodes(&wanted).await.unwrap();
  assert_eq!(names(&opened), vec!["Town Crier", "100"]);
  assert!(opened[0].observations.is_empty());

  assert!(s.open_nodes(&[]).await.unwrap().is_empty());
}

#[tokio::test]
async fn entities_listed_by_type() {
  let s = store().await;
  town(&s).await;

  let npcs = s.entities_by_type(EntityType::Npc).await.unwrap();
  assert_eq!(names(&npcs), vec!["Aylor Questor", "Town Crier"]);

  let rooms = s.entities_by_type(EntityType::Room).await.unwrap();
  assert_eq!(names(&rooms), vec!["100"]);
  assert_eq!(rooms[0].observations.len(), 1);
}

// ─── Replication ─────────────────────────────────────────────────────────────

async fn push_all(local: &SqliteStore, remote: &SqliteStore) {
  for model in Model::sync_order() {
    for record in local.dirty_records(model).await.unwrap() {
      let key = record.natural_key();
      let pushed = record.meta().updated_at;
      match remote.store_record(record).await.unwrap() {
        StoreOutcome::Stored { updated_at } => {
          assert!(local.mark_synced(key, pushed, updated_at).await.unwrap());
        }
        StoreOutcome::Unresolved { missing } => panic!("unresolved parent {missing}"),
      }
    }
  }
}

#[tokio::test]
async fn pushed_rows_are_marked_synced() {
  let a = store().await;
  let r = store().await;
  a.upsert_room(visit(1, "Gate", "aylor", &[("n", 2)])).await.unwrap();

  push_all(&a, &r).await;

  assert_eq!(a.summary().await.unwrap().dirty_rows, 0);
  let room = r.get_room_by_number(1).await.unwrap().unwrap();
  assert_eq!(room.zone.as_deref(), Some("aylor"));
  assert_eq!(r.exits_from(1).await.unwrap().len(), 1);

  let local = a.get_room_by_number(1).await.unwrap().unwrap();
  assert_eq!(local.meta.sync_status, SyncStatus::Synced);
  assert!(local.meta.remote_updated_at.is_some());
}

#[tokio::test]
async fn mark_synced_refuses_rows_changed_since_read() {
  let a = store().await;
  a.upsert_room(visit(1, "Gate", "aylor", &[])).await.unwrap();

  let records = a.dirty_records(Model::Room).await.unwrap();
  let pushed = records[0].meta().updated_at;

  let mut changed = visit(1, "Gate", "aylor", &[]);
  changed.terrain = Some("city".into());
  a.upsert_room(changed).await.unwrap();

  let marked = a
    .mark_synced(NaturalKey::Room { room_number: 1 }, pushed, chrono::Utc::now())
    .await
    .unwrap();
  assert!(!marked);
  assert_eq!(a.dirty_records(Model::Room).await.unwrap().len(), 1);
}

#[tokio::test]
async fn store_record_reports_missing_parent() {
  let r = store().await;
  let a = store().await;
  a.upsert_room(visit(1, "Gate", "aylor", &[])).await.unwrap();

  let room = a.dirty_records(Model::Room).await.unwrap().remove(0);
  let outcome = r.store_record(room).await.unwrap();
  assert_eq!(
    outcome,
    StoreOutcome::Unresolved { missing: NaturalKey::Entity(EntityKey::room(1)) }
  );
}

#[tokio::test]
async fn remote_keeps_newer_exit_details() {
  let a = store().await;
  let b = store().await;
  let r = store().await;

  for s in [&a, &b] {
    s.upsert_room(visit(1, "Gate", "aylor", &[])).await.unwrap();
    s.upsert_room(visit(2, "Road", "aylor", &[])).await.unwrap();
  }
  // a traverses first, b later; b pushes first.
  a.record_exit_success(moved(1, 2, "n")).await.unwrap();
  b.record_exit_success(moved(1, 2, "north")).await.unwrap();
  push_all(&b, &r).await;
  push_all(&a, &r).await;

  let details = r.get_exit_command_details(1, "n").await.unwrap().unwrap();
  assert_eq!(details.move_command.as_deref(), Some("north"));
}

#[tokio::test]
async fn pull_inserts_overwrites_and_merges() {
  let a = store().await;
  let b = store().await;
  let r = store().await;

  let mut v = visit(1, "Gate", "aylor", &[]);
  v.terrain = Some("city".into());
  a.upsert_room(v).await.unwrap();
  push_all(&a, &r).await;

  // Fresh replica: everything inserted as synced.
  for model in Model::sync_order() {
    for record in r.changed_since(model, None).await.unwrap() {
      assert_eq!(b.merge_record(record).await.unwrap(), MergeOutcome::Inserted);
    }
  }
  let room = b.get_room_by_number(1).await.unwrap().unwrap();
  assert_eq!((room.room_number, room.zone.as_deref(), room.terrain.as_deref()), (1, Some("aylor"), Some("city")));
  assert_eq!(room.meta.sync_status, SyncStatus::Synced);

  // Synced local row: overwritten.
  let remote_room = r.changed_since(Model::Room, None).await.unwrap().remove(0);
  assert_eq!(b.merge_record(remote_room.clone()).await.unwrap(), MergeOutcome::Overwritten);

  // Dirty local row: merged, stays dirty.
  let mut local_edit = visit(1, "Gate", "aylor", &[]);
  local_edit.outside = Some(true);
  b.upsert_room(local_edit).await.unwrap();
  assert_eq!(b.merge_record(remote_room).await.unwrap(), MergeOutcome::Merged);
  let room = b.get_room_by_number(1).await.unwrap().unwrap();
  assert_eq!(room.meta.sync_status, SyncStatus::Dirty);
  assert!(room.outside);
}

#[tokio::test]
async fn pull_skips_records_with_missing_parent() {
  let a = store().await;
  let b = store().await;
  a.upsert_room(visit(1, "Gate", "aylor", &[])).await.unwrap();

  let room = a.dirty_records(Model::Room).await.unwrap().remove(0);
  let outcome = b.merge_record(room).await.unwrap();
  assert_eq!(outcome, MergeOutcome::Skipped(NaturalKey::Entity(EntityKey::room(1))));
}

#[tokio::test]
async fn merged_exit_details_follow_latest_traversal() {
  let a = store().await;
  let b = store().await;
  let r = store().await;

  for s in [&a, &b] {
    s.upsert_room(visit(1, "Gate", "aylor", &[])).await.unwrap();
    s.upsert_room(visit(2, "Road", "aylor", &[])).await.unwrap();
  }
  b.record_exit_success(moved(1, 2, "n")).await.unwrap();
  a.record_exit_success(moved(1, 2, "north")).await.unwrap();
  push_all(&a, &r).await;

  // b's exit is still dirty and older than a's.
  let exit = r.changed_since(Model::RoomExit, None).await.unwrap().remove(0);
  assert!(matches!(&exit, SyncRecord::RoomExit(_)));
  assert_eq!(b.merge_record(exit).await.unwrap(), MergeOutcome::Merged);

  let details: ExitDetails = b.get_exit_command_details(1, "n").await.unwrap().unwrap();
  assert_eq!(details.move_command.as_deref(), Some("north"));
}
