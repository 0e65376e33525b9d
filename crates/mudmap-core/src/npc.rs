//! NPCs, plus the free-form observations and relations that can hang off any
//! entity.

use serde::{Deserialize, Serialize};

use crate::{
  entity::{EntityKey, RowMeta},
  Error, Result,
};

// ─── NPC ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Npc {
  pub id:           i64,
  pub entity_id:    i64,
  pub name:         String,
  /// Room number of the last sighting.
  pub current_room: Option<i64>,
  /// e.g. `Questor`, `Shopkeeper`.
  pub npc_type:     Option<String>,
  #[serde(flatten)]
  pub meta:         RowMeta,
}

/// Input to [`crate::store::GraphStore::upsert_npc`].
///
/// `None` fields leave the stored value untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NpcData {
  pub name:        String,
  #[serde(default)]
  pub npc_type:    Option<String>,
  #[serde(default)]
  pub room_number: Option<i64>,
}

impl NpcData {
  pub fn new(name: impl Into<String>) -> Self {
    Self { name: name.into(), ..Default::default() }
  }

  pub fn in_room(mut self, room_number: i64) -> Self {
    self.room_number = Some(room_number);
    self
  }

  /// Trim the name and reject blank ones.
  pub fn validate(mut self) -> Result<Self> {
    self.name = self.name.trim().to_owned();
    if self.name.is_empty() {
      return Err(Error::MissingNpcName);
    }
    Ok(self)
  }
}

// ─── Observation ─────────────────────────────────────────────────────────────

/// A free-text note attached to an entity. Append-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Observation {
  pub id:               i64,
  pub entity:           EntityKey,
  pub text:             String,
  pub observation_type: Option<String>,
  #[serde(flatten)]
  pub meta:             RowMeta,
}

// ─── Relation ────────────────────────────────────────────────────────────────

/// A typed directed link between two entities, unique per triple.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Relation {
  pub id:            i64,
  pub from:          EntityKey,
  pub to:            EntityKey,
  pub relation_type: String,
  pub metadata:      Option<serde_json::Value>,
  #[serde(flatten)]
  pub meta:          RowMeta,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn blank_npc_names_are_rejected() {
    assert!(matches!(NpcData::new("   ").validate(), Err(Error::MissingNpcName)));
    let npc = NpcData::new(" the questor ").in_room(5).validate().unwrap();
    assert_eq!(npc.name, "the questor");
    assert_eq!(npc.room_number, Some(5));
  }
}
