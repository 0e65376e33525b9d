//! Rooms, and the boundary between the protocol layer's loosely-shaped room
//! payloads and the validated visit that the store persists.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{entity::RowMeta, Error, Result};

// ─── Persisted room ──────────────────────────────────────────────────────────

/// Map coordinates as reported by the game, when it reports them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coords {
  pub x: Option<i64>,
  pub y: Option<i64>,
  pub z: Option<i64>,
}

/// A room node. One-to-one with its [`Entity`](crate::entity::Entity).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Room {
  pub id:          i64,
  pub entity_id:   i64,
  pub room_number: i64,
  pub full_name:   Option<String>,
  pub zone:        Option<String>,
  pub terrain:     Option<String>,
  pub outside:     bool,
  pub coords:      Coords,
  /// Opaque structured data from the game (shop flags and the like).
  pub details:     Option<serde_json::Value>,
  #[serde(flatten)]
  pub meta:        RowMeta,
}

impl Room {
  /// A room known only as the target of a traversed exit.
  pub fn is_placeholder(&self) -> bool {
    self.full_name.is_none() && self.zone.is_none()
  }
}

// ─── Protocol payload ────────────────────────────────────────────────────────

/// The target of an exit in a room payload: either a bare room number or a
/// door description carrying one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExitTarget {
  Number(i64),
  Door {
    num:   Option<i64>,
    #[serde(default)]
    state: Option<String>,
  },
}

impl ExitTarget {
  pub fn room_number(&self) -> Option<i64> {
    match self {
      Self::Number(n) => Some(*n),
      Self::Door { num, .. } => *num,
    }
  }
}

/// An NPC seen in a room payload, either by name alone or with a type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NpcSighting {
  Name(String),
  Detailed {
    name:     String,
    #[serde(default)]
    npc_type: Option<String>,
  },
}

impl NpcSighting {
  pub fn name(&self) -> &str {
    match self {
      Self::Name(name) | Self::Detailed { name, .. } => name,
    }
  }

  pub fn npc_type(&self) -> Option<&str> {
    match self {
      Self::Name(_) => None,
      Self::Detailed { npc_type, .. } => npc_type.as_deref(),
    }
  }
}

/// A room notification as published by the protocol layer.
///
/// Every field is optional here; [`RoomData::into_visit`] enforces the ones
/// the store needs. Fields not listed are ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoomData {
  #[serde(default, alias = "room_number")]
  pub num:     Option<i64>,
  #[serde(default)]
  pub name:    Option<String>,
  #[serde(default, alias = "area")]
  pub zone:    Option<String>,
  #[serde(default)]
  pub terrain: Option<String>,
  #[serde(default, deserialize_with = "de_flag")]
  pub outside: Option<bool>,
  #[serde(default, alias = "coord")]
  pub coords:  Option<Coords>,
  #[serde(default)]
  pub exits:   BTreeMap<String, Option<ExitTarget>>,
  #[serde(default)]
  pub npcs:    Vec<NpcSighting>,
  #[serde(default)]
  pub details: Option<serde_json::Value>,
}

impl RoomData {
  /// Validate the payload into the fixed shape the store persists.
  pub fn into_visit(self) -> Result<RoomVisit> {
    let room_number = self.num.filter(|n| *n > 0).ok_or(Error::MissingRoomNumber)?;
    let name = self
      .name
      .map(|n| n.trim().to_owned())
      .filter(|n| !n.is_empty())
      .ok_or(Error::MissingRoomName(room_number))?;

    let exits = self
      .exits
      .into_iter()
      .filter_map(|(direction, target)| {
        let to = target.as_ref().and_then(ExitTarget::room_number)?;
        Some(VisitExit { direction, to_room_number: to })
      })
      .collect();

    let mut npcs: Vec<NpcSighting> = Vec::new();
    for sighting in self.npcs {
      if sighting.name().trim().is_empty() {
        continue;
      }
      if !npcs.iter().any(|s| s.name() == sighting.name()) {
        npcs.push(sighting);
      }
    }

    Ok(RoomVisit {
      room_number,
      full_name: name,
      zone: self.zone,
      terrain: self.terrain,
      outside: self.outside,
      coords: self.coords,
      details: self.details,
      exits,
      npcs,
    })
  }
}

/// Accept `true`/`false`, `0`/`1` or `"0"`/`"1"` for boolean flags.
fn de_flag<'de, D>(deserializer: D) -> std::result::Result<Option<bool>, D::Error>
where
  D: serde::Deserializer<'de>,
{
  #[derive(Deserialize)]
  #[serde(untagged)]
  enum Flag {
    Bool(bool),
    Int(i64),
    Text(String),
  }

  Ok(match Option::<Flag>::deserialize(deserializer)? {
    None => None,
    Some(Flag::Bool(b)) => Some(b),
    Some(Flag::Int(i)) => Some(i != 0),
    Some(Flag::Text(s)) => Some(matches!(s.trim(), "1" | "true" | "yes")),
  })
}

// ─── Validated visit ─────────────────────────────────────────────────────────

/// An exit listed in a room payload whose target room number is known.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisitExit {
  pub direction:      String,
  pub to_room_number: i64,
}

/// Input to [`crate::store::GraphStore::upsert_room`]: a validated room
/// payload.
///
/// `None` fields leave the stored value untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomVisit {
  pub room_number: i64,
  pub full_name:   String,
  pub zone:        Option<String>,
  pub terrain:     Option<String>,
  pub outside:     Option<bool>,
  pub coords:      Option<Coords>,
  pub details:     Option<serde_json::Value>,
  pub exits:       Vec<VisitExit>,
  pub npcs:        Vec<NpcSighting>,
}

impl RoomVisit {
  /// Convenience constructor with every optional field unset.
  pub fn new(room_number: i64, full_name: impl Into<String>) -> Self {
    Self {
      room_number,
      full_name: full_name.into(),
      zone: None,
      terrain: None,
      outside: None,
      coords: None,
      details: None,
      exits: Vec::new(),
      npcs: Vec::new(),
    }
  }
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;

  #[test]
  fn payload_with_mixed_shapes_validates() {
    let data: RoomData = serde_json::from_value(json!({
      "num": 32418,
      "name": "A Dusty Road",
      "zone": "aylor",
      "terrain": "road",
      "outside": 1,
      "coord": { "x": 30, "y": 18, "z": 0 },
      "exits": { "n": 32419, "e": { "num": 32500, "state": "closed" }, "w": null },
      "npcs": ["a guard", { "name": "the questor", "npc_type": "Questor" }, "a guard"],
      "colour": "unused"
    }))
    .unwrap();

    let visit = data.into_visit().unwrap();
    assert_eq!(visit.room_number, 32418);
    assert_eq!(visit.outside, Some(true));
    assert_eq!(visit.coords.unwrap().x, Some(30));
    assert_eq!(visit.exits.len(), 2);
    assert!(visit.exits.iter().any(|e| e.direction == "e" && e.to_room_number == 32500));
    assert_eq!(visit.npcs.len(), 2);
    assert_eq!(visit.npcs[1].npc_type(), Some("Questor"));
  }

  #[test]
  fn payload_without_number_or_name_is_rejected() {
    let missing_num = RoomData { name: Some("Somewhere".into()), ..Default::default() };
    assert!(matches!(missing_num.into_visit(), Err(Error::MissingRoomNumber)));

    let missing_name = RoomData { num: Some(7), name: Some("  ".into()), ..Default::default() };
    assert!(matches!(missing_name.into_visit(), Err(Error::MissingRoomName(7))));
  }
}
