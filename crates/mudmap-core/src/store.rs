//! The `GraphStore` trait and supporting types.
//!
//! The trait is implemented by storage backends (e.g. `mudmap-store-sqlite`).
//! The movement correlator, the server and the CLI depend on this
//! abstraction, not on any concrete backend.

use std::{
  collections::{BTreeMap, HashSet},
  future::Future,
};

use serde::{Deserialize, Serialize};

use crate::{
  entity::{EntityKey, EntityType},
  exit::{ExitDetails, ExitSuccess, RoomExit},
  npc::{Npc, NpcData, Observation, Relation},
  path::{PathError, RoomTarget, Route},
  room::{Room, RoomVisit},
};

// ─── Summary ─────────────────────────────────────────────────────────────────

/// Counts returned by [`GraphStore::summary`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphSummary {
  pub total_entities:  u64,
  pub total_relations: u64,
  /// Keyed by `Room` / `NPC`.
  pub entity_types:    BTreeMap<String, u64>,
  pub relation_types:  BTreeMap<String, u64>,
  pub rooms:           u64,
  pub exits:           u64,
  /// Rows in any table still waiting to be pushed.
  pub dirty_rows:      u64,
}

// ─── Nodes ───────────────────────────────────────────────────────────────────

/// An entity with the text of its observations, oldest first. Returned by
/// the entity queries ([`GraphStore::search_nodes`] and friends).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
  pub name:         String,
  pub entity_type:  EntityType,
  pub observations: Vec<String>,
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over a mudmap graph backend.
///
/// Writes find-or-create by natural key and then update mutable fields; each
/// write is a single transaction. Any write that changes a row stamps its
/// `updated_at` and marks it dirty.
///
/// All methods return `Send` futures so the trait can be used in multi-threaded
/// async runtimes (e.g. tokio with `axum`).
pub trait GraphStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Writes ────────────────────────────────────────────────────────────

  /// Create or update a room, the exits listed in its payload and the NPCs
  /// sighted in it. Back-fills the target of stored exits that lead here.
  fn upsert_room(
    &self,
    visit: RoomVisit,
  ) -> impl Future<Output = Result<Room, Self::Error>> + Send + '_;

  fn upsert_npc(
    &self,
    npc: NpcData,
  ) -> impl Future<Output = Result<Npc, Self::Error>> + Send + '_;

  /// Record an observed traversal as an exit edge.
  ///
  /// Returns `None` when the traversal is filtered out (see
  /// [`ExitSuccess::screen`]) or the origin room is unknown.
  fn record_exit_success(
    &self,
    success: ExitSuccess,
  ) -> impl Future<Output = Result<Option<RoomExit>, Self::Error>> + Send + '_;

  /// Attach a note to an entity. Exact duplicates on the same entity are
  /// suppressed and return `None`.
  fn add_observation(
    &self,
    entity: EntityKey,
    text: String,
    observation_type: Option<String>,
  ) -> impl Future<Output = Result<Option<Observation>, Self::Error>> + Send + '_;

  /// Link two existing entities. Returns the existing relation when the
  /// triple is already present, `None` when either entity is unknown.
  fn add_relation(
    &self,
    from: EntityKey,
    to: EntityKey,
    relation_type: String,
  ) -> impl Future<Output = Result<Option<Relation>, Self::Error>> + Send + '_;

  // ── Reads ─────────────────────────────────────────────────────────────

  fn get_room_by_number(
    &self,
    room_number: i64,
  ) -> impl Future<Output = Result<Option<Room>, Self::Error>> + Send + '_;

  /// Traversal details of the exit from `from_room` labelled `direction`,
  /// comparing labels by their normalized form.
  fn get_exit_command_details<'a>(
    &'a self,
    from_room: i64,
    direction: &'a str,
  ) -> impl Future<Output = Result<Option<ExitDetails>, Self::Error>> + Send + 'a;

  /// Rooms in `zone`, outside `visited`, with at least one exit whose target
  /// room is not known.
  fn find_rooms_with_unexplored_exit<'a>(
    &'a self,
    zone: &'a str,
    visited: &'a HashSet<i64>,
  ) -> impl Future<Output = Result<Vec<Room>, Self::Error>> + Send + 'a;

  fn exits_from(
    &self,
    room_number: i64,
  ) -> impl Future<Output = Result<Vec<RoomExit>, Self::Error>> + Send + '_;

  fn npcs_in_room(
    &self,
    room_number: i64,
  ) -> impl Future<Output = Result<Vec<Npc>, Self::Error>> + Send + '_;

  /// The room an NPC was last seen in.
  fn room_with_npc<'a>(
    &'a self,
    name: &'a str,
  ) -> impl Future<Output = Result<Option<Room>, Self::Error>> + Send + 'a;

  /// Shortest path by hop count from `start` to `target` over exits whose
  /// target room exists. The outer `Result` is a storage failure; the inner
  /// one says why no route was found.
  fn find_path(
    &self,
    start: i64,
    target: RoomTarget,
    max_depth: usize,
  ) -> impl Future<Output = Result<Result<Route, PathError>, Self::Error>> + Send + '_;

  fn summary(&self) -> impl Future<Output = Result<GraphSummary, Self::Error>> + Send + '_;

  // ── Entity queries ────────────────────────────────────────────────────

  /// Entities whose name, type or any observation contains `query`,
  /// ignoring case. A blank query matches nothing.
  fn search_nodes<'a>(
    &'a self,
    query: &'a str,
  ) -> impl Future<Output = Result<Vec<Node>, Self::Error>> + Send + 'a;

  /// Entities named exactly one of `names`, of either type. Unknown names
  /// are left out.
  fn open_nodes<'a>(
    &'a self,
    names: &'a [String],
  ) -> impl Future<Output = Result<Vec<Node>, Self::Error>> + Send + 'a;

  fn entities_by_type(
    &self,
    entity_type: EntityType,
  ) -> impl Future<Output = Result<Vec<Node>, Self::Error>> + Send + '_;
}
