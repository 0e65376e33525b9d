//! Shortest-path search over exit edges.
//!
//! The search itself is storage-agnostic: [`breadth_first`] pulls outgoing
//! edges through a callback, so a backend can run it inside one read
//! transaction.

use std::{
  collections::{HashMap, VecDeque},
  convert::Infallible,
  str::FromStr,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Search depth used when the caller does not choose one.
pub const DEFAULT_MAX_DEPTH: usize = 1000;

// ─── Query types ─────────────────────────────────────────────────────────────

/// The destination of a path query: a room number, or a fragment of a
/// room's full name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RoomTarget {
  Number(i64),
  Name(String),
}

impl FromStr for RoomTarget {
  type Err = Infallible;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let s = s.trim();
    Ok(match s.parse::<i64>() {
      Ok(n) => Self::Number(n),
      Err(_) => Self::Name(s.to_owned()),
    })
  }
}

impl From<i64> for RoomTarget {
  fn from(n: i64) -> Self { Self::Number(n) }
}

impl std::fmt::Display for RoomTarget {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      Self::Number(n) => write!(f, "{n}"),
      Self::Name(name) => f.write_str(name),
    }
  }
}

/// A found path: the commands to replay, in order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
  pub path:  Vec<String>,
  /// Number of hops.
  pub cost:  usize,
  /// Rooms visited, start and target included.
  pub rooms: Vec<i64>,
}

/// Why a path query produced no route. None of these are failures of the
/// store.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PathError {
  #[error("no path found")]
  NotFound,

  #[error("{query:?} matches {} rooms", matches.len())]
  Ambiguous { query: String, matches: Vec<i64> },

  #[error("unknown room: {query}")]
  UnknownRoom { query: String },
}

/// An outgoing edge as seen by the search.
#[derive(Debug, Clone)]
pub struct Hop {
  pub to:       i64,
  pub commands: Vec<String>,
}

// ─── Search ──────────────────────────────────────────────────────────────────

/// Resolve the room numbers whose name matched `query` to a single room.
pub fn single_match(query: &str, matches: Vec<i64>) -> Result<i64, PathError> {
  match matches.as_slice() {
    [] => Err(PathError::UnknownRoom { query: query.to_owned() }),
    [one] => Ok(*one),
    _ => Err(PathError::Ambiguous { query: query.to_owned(), matches }),
  }
}

/// Unweighted breadth-first search from `start` to `target`.
///
/// Returns `Ok(None)` when the target is unreachable within `max_depth`
/// hops. The route is rebuilt from predecessor pointers on the first dequeue
/// of the target, so it is a shortest one.
pub fn breadth_first<E>(
  start: i64,
  target: i64,
  max_depth: usize,
  mut neighbours: impl FnMut(i64) -> Result<Vec<Hop>, E>,
) -> Result<Option<Route>, E> {
  // room -> (previous room, commands of the edge taken)
  let mut came_from: HashMap<i64, Option<(i64, Vec<String>)>> = HashMap::new();
  let mut queue = VecDeque::new();

  came_from.insert(start, None);
  queue.push_back((start, 0usize));

  while let Some((room, depth)) = queue.pop_front() {
    if room == target {
      return Ok(Some(rebuild(&came_from, target)));
    }
    if depth >= max_depth {
      continue;
    }
    for hop in neighbours(room)? {
      if came_from.contains_key(&hop.to) {
        continue;
      }
      came_from.insert(hop.to, Some((room, hop.commands)));
      queue.push_back((hop.to, depth + 1));
    }
  }

  Ok(None)
}

fn rebuild(came_from: &HashMap<i64, Option<(i64, Vec<String>)>>, target: i64) -> Route {
  let mut rooms = vec![target];
  let mut steps: Vec<&[String]> = Vec::new();
  let mut current = target;

  while let Some(Some((prev, commands))) = came_from.get(&current) {
    steps.push(commands);
    rooms.push(*prev);
    current = *prev;
  }

  rooms.reverse();
  steps.reverse();

  Route {
    cost: steps.len(),
    path: steps.into_iter().flatten().cloned().collect(),
    rooms,
  }
}
