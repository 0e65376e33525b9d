//! [`EventBus`]: the channels connecting one agent's protocol layer,
//! correlator and presentation.

use mudmap_core::room::RoomData;
use tokio::sync::{broadcast, watch};
use tracing::trace;

use crate::event::{InboundEvent, OutboundEvent};

/// Default capacity of the broadcast channels.
pub const DEFAULT_CAPACITY: usize = 256;

/// One agent's event channels.
///
/// Cloning is cheap and every clone publishes into the same channels. The bus
/// also tracks the number of the last room published, so a command can be
/// tagged with the room it was sent from without waiting for any consumer.
#[derive(Clone)]
pub struct EventBus {
  inbound:  broadcast::Sender<InboundEvent>,
  outbound: broadcast::Sender<OutboundEvent>,
  room:     watch::Sender<Option<i64>>,
}

impl Default for EventBus {
  fn default() -> Self { Self::new(DEFAULT_CAPACITY) }
}

impl EventBus {
  pub fn new(capacity: usize) -> Self {
    let (inbound, _) = broadcast::channel(capacity);
    let (outbound, _) = broadcast::channel(capacity);
    let (room, _) = watch::channel(None);
    Self { inbound, outbound, room }
  }

  // ── Inbound ───────────────────────────────────────────────────────────────

  /// Publish an event from the protocol layer.
  ///
  /// A `command_sent` without a room is tagged with the current room; a
  /// `room_update` carrying a room number becomes the current room.
  pub fn publish(&self, event: InboundEvent) {
    let event = match event {
      InboundEvent::CommandSent { command, from_room: None } => {
        InboundEvent::CommandSent { command, from_room: self.current_room() }
      }
      InboundEvent::RoomUpdate { data } => {
        if let Some(n) = data.num.filter(|n| *n > 0) {
          self.room.send_replace(Some(n));
        }
        InboundEvent::RoomUpdate { data }
      }
      other => other,
    };

    if self.inbound.send(event).is_err() {
      trace!("no inbound subscribers");
    }
  }

  /// Publish `command_sent` for a command about to be transmitted.
  pub fn send_command(&self, command: impl Into<String>) {
    self.publish(InboundEvent::CommandSent { command: command.into(), from_room: None });
  }

  pub fn room_update(&self, data: RoomData) { self.publish(InboundEvent::RoomUpdate { data }); }

  pub fn subscribe(&self) -> broadcast::Receiver<InboundEvent> { self.inbound.subscribe() }

  // ── Outbound ──────────────────────────────────────────────────────────────

  pub fn emit(&self, event: OutboundEvent) {
    if self.outbound.send(event).is_err() {
      trace!("no outbound subscribers");
    }
  }

  pub fn subscribe_outbound(&self) -> broadcast::Receiver<OutboundEvent> { self.outbound.subscribe() }

  // ── Current room ──────────────────────────────────────────────────────────

  pub fn current_room(&self) -> Option<i64> { *self.room.borrow() }

  pub fn watch_room(&self) -> watch::Receiver<Option<i64>> { self.room.subscribe() }
}
