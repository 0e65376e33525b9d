//! Events exchanged between the protocol layer and the agent, with their
//! JSON-lines encoding.

use mudmap_core::room::{Room, RoomData};
use serde::{Deserialize, Serialize};

use crate::Result;

// ─── Inbound ─────────────────────────────────────────────────────────────────

/// An event published by the protocol layer.
///
/// ```json
/// {"event":"command_sent","command":"n","from_room":null}
/// {"event":"room_update","data":{"num":1,"name":"Gate"}}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum InboundEvent {
  /// Emitted before a command is transmitted. `from_room` is the room in
  /// effect at send time; the bus fills it in when the publisher leaves it
  /// unset.
  CommandSent {
    command:   String,
    #[serde(default)]
    from_room: Option<i64>,
  },
  RoomUpdate { data: RoomData },
}

impl InboundEvent {
  pub fn parse(line: &str) -> Result<Self> { Ok(serde_json::from_str(line.trim())?) }
}

// ─── Outbound ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateKind {
  Room,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UiKind {
  Map,
}

/// An event published by the agent after it changed the graph.
///
/// ```json
/// {"event":"state_update","type":"room","data":{...}}
/// {"event":"ui_update","type":"map"}
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum OutboundEvent {
  StateUpdate {
    #[serde(rename = "type")]
    kind: StateKind,
    data: Box<Room>,
  },
  UiUpdate {
    #[serde(rename = "type")]
    kind: UiKind,
  },
}

impl OutboundEvent {
  pub fn room(room: Room) -> Self {
    Self::StateUpdate { kind: StateKind::Room, data: Box::new(room) }
  }

  pub fn map() -> Self { Self::UiUpdate { kind: UiKind::Map } }

  pub fn to_line(&self) -> Result<String> { Ok(serde_json::to_string(self)?) }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn command_sent_room_is_optional() {
    let event = InboundEvent::parse(r#"{"event":"command_sent","command":"n"}"#).unwrap();
    assert_eq!(event, InboundEvent::CommandSent { command: "n".into(), from_room: None });
  }

  #[test]
  fn room_update_ignores_unknown_fields() {
    let line = r#"{"event":"room_update","data":{"num":7,"name":"Gate","weather":"rain"}}"#;
    let InboundEvent::RoomUpdate { data } = InboundEvent::parse(line).unwrap() else {
      panic!("expected room_update");
    };
    assert_eq!(data.num, Some(7));
  }

  #[test]
  fn unknown_event_is_rejected() {
    assert!(InboundEvent::parse(r#"{"event":"tick"}"#).is_err());
  }

  #[test]
  fn ui_update_line_shape() {
    let line = OutboundEvent::map().to_line().unwrap();
    assert_eq!(line, r#"{"event":"ui_update","type":"map"}"#);
  }
}
