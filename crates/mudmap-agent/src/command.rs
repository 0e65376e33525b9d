//! Classification of outgoing commands.

use mudmap_core::direction::Compass;

/// Verbs that prepare an exit without moving: `open door north`,
/// `unlock gate`.
const PRE_COMMAND_VERBS: &[&str] =
  &["open", "unlock", "pick", "bash", "break", "kick", "force", "unbar", "unlatch"];

/// Verbs that move the agent through a non-compass exit.
const MOVEMENT_VERBS: &[&str] = &["enter", "board", "escape", "climb"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandKind {
  /// May change the room; `direction` is set for compass moves.
  Movement { direction: Option<Compass> },
  /// Prepares an exit. `direction` is the compass direction it names, if any.
  PreCommand { direction: Option<Compass> },
  /// May move the agent as a side effect (passwords, triggers).
  Say,
  Untracked,
}

/// Classify a command by its first word.
///
/// Chained commands (`n;n;e`) are never tracked since the room change cannot
/// be attributed to one of them.
pub fn classify(command: &str) -> CommandKind {
  let command = command.trim().to_ascii_lowercase();
  if command.is_empty() || command.contains(';') {
    return CommandKind::Untracked;
  }

  if let Ok(direction) = command.parse::<Compass>() {
    return CommandKind::Movement { direction: Some(direction) };
  }

  let verb = command.split_whitespace().next().unwrap_or_default();
  if MOVEMENT_VERBS.contains(&verb) {
    return CommandKind::Movement { direction: None };
  }
  if PRE_COMMAND_VERBS.contains(&verb) {
    return CommandKind::PreCommand { direction: Compass::mentioned_in(&command) };
  }
  if verb == "say" {
    return CommandKind::Say;
  }
  CommandKind::Untracked
}
