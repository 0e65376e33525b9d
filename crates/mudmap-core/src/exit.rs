//! Directed room-to-room edges and the command sequences that traverse them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
  direction::{normalize, Compass},
  entity::RowMeta,
};

/// `details.source` stamped on exits learned by watching the agent move.
pub const SOURCE_OBSERVED: &str = "observed";

// ─── Traversal details ───────────────────────────────────────────────────────

/// The JSON `details` blob of a [`RoomExit`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExitDetails {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub move_command:    Option<String>,
  #[serde(default)]
  pub pre_commands:    Vec<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub last_success_at: Option<DateTime<Utc>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub source:          Option<String>,
}

impl ExitDetails {
  pub fn is_empty(&self) -> bool {
    self.move_command.is_none()
      && self.pre_commands.is_empty()
      && self.last_success_at.is_none()
      && self.source.is_none()
  }

  /// Whether these details describe a later successful traversal than
  /// `other`. A recorded traversal always beats none.
  pub fn newer_than(&self, other: &Self) -> bool {
    match (self.last_success_at, other.last_success_at) {
      (Some(a), Some(b)) => a > b,
      (Some(_), None) => true,
      (None, _) => false,
    }
  }

  /// Pick the details to keep when two replicas disagree.
  pub fn merge(local: Self, remote: Self) -> Self {
    if remote.newer_than(&local) { remote } else { local }
  }

  /// The commands that traverse the exit: pre-commands, then the move
  /// command, falling back to the exit label.
  pub fn commands(&self, direction: &str) -> Vec<String> {
    let mut out = self.pre_commands.clone();
    out.push(self.move_command.clone().unwrap_or_else(|| direction.to_owned()));
    out
  }
}

// ─── Persisted exit ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomExit {
  pub id:               i64,
  pub from_room_number: i64,
  /// Mutable label, e.g. `n` or `enter portal`.
  pub direction:        String,
  pub to_room_number:   i64,
  /// Whether the target room row exists locally.
  pub resolved:         bool,
  pub details:          ExitDetails,
  #[serde(flatten)]
  pub meta:             RowMeta,
}

impl RoomExit {
  pub fn commands(&self) -> Vec<String> { self.details.commands(&self.direction) }
}

// ─── Observed traversal ──────────────────────────────────────────────────────

/// Input to [`crate::store::GraphStore::record_exit_success`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExitSuccess {
  pub from_room:    i64,
  pub to_room:      i64,
  pub direction:    String,
  pub move_command: String,
  #[serde(default)]
  pub pre_commands: Vec<String>,
}

impl ExitSuccess {
  /// Reject traversals that must not become edges, and drop pre-commands
  /// that cannot be replayed.
  ///
  /// Rejected: speedwalks (`run …`) and command chains (`;`), a bare `enter`,
  /// `scan`, anything mentioning `where`, and a compass move command that
  /// disagrees with a compass direction.
  pub fn screen(mut self) -> Option<Self> {
    let cmd = self.move_command.trim().to_ascii_lowercase();
    let dir = self.direction.trim().to_ascii_lowercase();

    if cmd.is_empty() || dir.is_empty() {
      return None;
    }
    if is_unreplayable(&cmd) || is_unreplayable(&dir) {
      return None;
    }
    if cmd == "enter" || cmd == "scan" || cmd.contains("where") {
      return None;
    }
    if let (Ok(a), Ok(b)) = (cmd.parse::<Compass>(), dir.parse::<Compass>()) {
      if a != b {
        return None;
      }
    }

    self.direction = normalize(&self.direction);
    self.move_command = self.move_command.trim().to_owned();
    self.pre_commands.retain(|p| {
      let p = p.trim().to_ascii_lowercase();
      !p.is_empty() && !is_unreplayable(&p)
    });
    Some(self)
  }
}

fn is_unreplayable(command: &str) -> bool {
  command.starts_with("run") || command.contains(';')
}

#[cfg(test)]
mod tests {
  use super::*;

  fn success(dir: &str, cmd: &str) -> ExitSuccess {
    ExitSuccess {
      from_room:    1,
      to_room:      2,
      direction:    dir.into(),
      move_command: cmd.into(),
      pre_commands: vec![],
    }
  }

  #[test]
  fn screen_rejects_unreplayable_moves() {
    assert!(success("n", "run 3n").screen().is_none());
    assert!(success("n", "n;n").screen().is_none());
    assert!(success("enter", "enter").screen().is_none());
    assert!(success("scan", "scan").screen().is_none());
    assert!(success("where", "where guard").screen().is_none());
    assert!(success("north", "s").screen().is_none());
  }

  #[test]
  fn screen_normalizes_and_filters_pre_commands() {
    let mut s = success("North", "north");
    s.pre_commands = vec!["open north".into(), "run e".into(), "x;y".into()];
    let s = s.screen().unwrap();
    assert_eq!(s.direction, "n");
    assert_eq!(s.pre_commands, vec!["open north".to_owned()]);

    assert!(success("enter portal", "enter portal").screen().is_some());
  }

  #[test]
  fn commands_fall_back_to_direction() {
    let details = ExitDetails {
      pre_commands: vec!["open door".into()],
      ..Default::default()
    };
    assert_eq!(details.commands("e"), vec!["open door", "e"]);
  }

  #[test]
  fn newer_traversal_wins_merge() {
    let older = ExitDetails {
      move_command: Some("n".into()),
      last_success_at: Some(DateTime::from_timestamp(100, 0).unwrap()),
      ..Default::default()
    };
    let newer = ExitDetails {
      move_command: Some("enter gate".into()),
      last_success_at: Some(DateTime::from_timestamp(200, 0).unwrap()),
      ..Default::default()
    };
    assert_eq!(ExitDetails::merge(newer.clone(), older.clone()), newer);
    assert_eq!(ExitDetails::merge(older, newer.clone()), newer);
    assert_eq!(
      ExitDetails::merge(ExitDetails::default(), ExitDetails::default()),
      ExitDetails::default()
    );
  }
}
