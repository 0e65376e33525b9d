//! The per-agent side of mudmap: the event bus the protocol layer publishes
//! into, and the movement correlator that turns those events into verified
//! exits in a [`GraphStore`](mudmap_core::store::GraphStore).

pub mod bus;
pub mod command;
pub mod correlator;
pub mod error;
pub mod event;

pub use bus::EventBus;
pub use correlator::{CorrelatorConfig, MovementCorrelator};
pub use error::{Error, Result};
pub use event::{InboundEvent, OutboundEvent};
