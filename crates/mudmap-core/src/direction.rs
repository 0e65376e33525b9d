//! Compass directions and the synonym rules used to match exit labels.
//!
//! Exit labels arrive in whatever form the player (or the protocol layer)
//! used: `n`, `North`, `enter portal`. Lookups compare normalized forms so
//! `north` and `n` resolve to the same edge.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// One of the ten standard movement directions.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
  strum::Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Compass {
  North,
  South,
  East,
  West,
  Up,
  Down,
  Northeast,
  Northwest,
  Southeast,
  Southwest,
}

impl Compass {
  /// The abbreviation a player types, e.g. `n` or `ne`.
  pub fn short(self) -> &'static str {
    match self {
      Self::North => "n",
      Self::South => "s",
      Self::East => "e",
      Self::West => "w",
      Self::Up => "u",
      Self::Down => "d",
      Self::Northeast => "ne",
      Self::Northwest => "nw",
      Self::Southeast => "se",
      Self::Southwest => "sw",
    }
  }

  /// The last word of `command` that names a direction, if any.
  ///
  /// `open door north` and `unlock n` both mention [`Compass::North`].
  pub fn mentioned_in(command: &str) -> Option<Self> {
    command
      .split_whitespace()
      .rev()
      .find_map(|word| word.parse().ok())
  }
}

impl FromStr for Compass {
  type Err = ();

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_ascii_lowercase().as_str() {
      "n" | "north" => Ok(Self::North),
      "s" | "south" => Ok(Self::South),
      "e" | "east" => Ok(Self::East),
      "w" | "west" => Ok(Self::West),
      "u" | "up" => Ok(Self::Up),
      "d" | "down" => Ok(Self::Down),
      "ne" | "northeast" => Ok(Self::Northeast),
      "nw" | "northwest" => Ok(Self::Northwest),
      "se" | "southeast" => Ok(Self::Southeast),
      "sw" | "southwest" => Ok(Self::Southwest),
      _ => Err(()),
    }
  }
}

/// Normalize an exit label for comparison.
///
/// Compass synonyms collapse to their abbreviation; anything else is
/// lowercased with surrounding whitespace removed.
pub fn normalize(label: &str) -> String {
  match label.parse::<Compass>() {
    Ok(compass) => compass.short().to_owned(),
    Err(()) => label.trim().to_ascii_lowercase(),
  }
}

/// Whether two exit labels name the same exit after normalization.
pub fn same_exit(a: &str, b: &str) -> bool { normalize(a) == normalize(b) }
