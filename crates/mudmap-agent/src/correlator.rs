//! The movement correlator: pairs outgoing movement commands with the room
//! change that follows them and records the pair as a verified exit.
//!
//! [`Correlator`] is the bare state machine. It owns the pending movement and
//! its deadline but never sleeps or touches storage, so every transition is a
//! plain method call. [`MovementCorrelator`] drives it from an [`EventBus`]
//! and writes through a [`GraphStore`].

use std::{future::Future, sync::Arc, time::Duration};

use mudmap_core::{direction::Compass, exit::ExitSuccess, room::RoomData, store::GraphStore};
use tokio::{
  sync::broadcast::{self, error::RecvError},
  task::JoinSet,
  time::Instant,
};
use tracing::{Instrument as _, debug, error, info, info_span, trace, warn};
use uuid::Uuid;

use crate::{
  bus::EventBus,
  command::{CommandKind, classify},
  event::{InboundEvent, OutboundEvent},
};

// ─── Configuration ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
pub struct CorrelatorConfig {
  /// How long a movement waits for the room to change.
  pub exit_timeout:   Duration,
  /// Delay before a `say` command's room check.
  pub implicit_check: Duration,
}

impl Default for CorrelatorConfig {
  fn default() -> Self {
    Self {
      exit_timeout:   Duration::from_secs(5),
      implicit_check: Duration::from_secs(2),
    }
  }
}

// ─── State machine ───────────────────────────────────────────────────────────

/// A pre-command, tagged with the room it was sent from.
#[derive(Debug, Clone, PartialEq, Eq)]
struct PreCommand {
  room:      i64,
  command:   String,
  direction: Option<Compass>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingExit {
  pub from_room:    i64,
  pub command:      String,
  pub pre_commands: Vec<String>,
  pub deadline:     Instant,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum State {
  #[default]
  Idle,
  PendingExit(PendingExit),
}

/// What a command did to the machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
  Ignored,
  PreCommand,
  /// A movement is now waiting for the room to change.
  Pending,
  /// A movement arrived while another was pending. The pending one keeps
  /// waiting and the new one is not tracked.
  Busy,
  /// A `say` command; check for a room change after a delay.
  CheckImplicit { from_room: i64 },
}

#[derive(Debug)]
pub struct Correlator {
  state:        State,
  pre_commands: Vec<PreCommand>,
  exit_timeout: Duration,
}

impl Correlator {
  pub fn new(exit_timeout: Duration) -> Self {
    Self { state: State::Idle, pre_commands: Vec::new(), exit_timeout }
  }

  pub fn state(&self) -> &State { &self.state }

  pub fn deadline(&self) -> Option<Instant> {
    match &self.state {
      State::PendingExit(p) => Some(p.deadline),
      State::Idle => None,
    }
  }

  /// Pre-commands waiting for a movement.
  pub fn pre_commands(&self) -> impl Iterator<Item = &str> {
    self.pre_commands.iter().map(|p| p.command.as_str())
  }

  pub fn on_command(&mut self, command: &str, from_room: Option<i64>, now: Instant) -> Step {
    let command = command.trim();
    match classify(command) {
      CommandKind::Untracked => Step::Ignored,

      CommandKind::PreCommand { direction } => {
        let Some(room) = from_room else {
          return Step::Ignored;
        };
        self.pre_commands.push(PreCommand { room, command: command.to_owned(), direction });
        Step::PreCommand
      }

      CommandKind::Say => match from_room {
        Some(from_room) => Step::CheckImplicit { from_room },
        None => Step::Ignored,
      },

      CommandKind::Movement { direction } => {
        if matches!(self.state, State::PendingExit(_)) {
          return Step::Busy;
        }
        let Some(from_room) = from_room else {
          return Step::Ignored;
        };

        let pre_commands = self
          .pre_commands
          .iter()
          .filter(|p| p.room == from_room)
          .filter(|p| direction.is_none() || p.direction == direction)
          .map(|p| p.command.clone())
          .collect();

        self.state = State::PendingExit(PendingExit {
          from_room,
          command: command.to_owned(),
          pre_commands,
          deadline: now + self.exit_timeout,
        });
        Step::Pending
      }
    }
  }

  /// Feed the room the agent is now in. Returns the traversal to record when
  /// it completes a pending movement.
  pub fn on_room(&mut self, room_number: i64) -> Option<ExitSuccess> {
    match &self.state {
      State::PendingExit(p) if p.from_room != room_number => {}
      _ => return None,
    }

    let State::PendingExit(p) = std::mem::take(&mut self.state) else {
      return None;
    };
    self.pre_commands.clear();
    Some(ExitSuccess {
      from_room:    p.from_room,
      to_room:      room_number,
      direction:    p.command.clone(),
      move_command: p.command,
      pre_commands: p.pre_commands,
    })
  }

  /// Expire the pending movement if its deadline has passed. Returns whether
  /// it did.
  pub fn on_deadline(&mut self, now: Instant) -> bool {
    match self.deadline() {
      Some(deadline) if now >= deadline => {
        self.reset();
        true
      }
      _ => false,
    }
  }

  /// Drop the pending movement and every pre-command.
  pub fn reset(&mut self) {
    self.state = State::Idle;
    self.pre_commands.clear();
  }
}

// ─── Driver ──────────────────────────────────────────────────────────────────

/// Runs a [`Correlator`] against one agent's [`EventBus`].
pub struct MovementCorrelator<S> {
  store:   Arc<S>,
  bus:     EventBus,
  events:  broadcast::Receiver<InboundEvent>,
  config:  CorrelatorConfig,
  machine: Correlator,
  checks:  JoinSet<Option<ExitSuccess>>,
}

impl<S> MovementCorrelator<S>
where
  S: GraphStore + 'static,
{
  /// Subscribes to the bus immediately, so events published before
  /// [`run`](Self::run) is polled are not lost.
  pub fn new(store: Arc<S>, bus: EventBus, config: CorrelatorConfig) -> Self {
    Self {
      events: bus.subscribe(),
      machine: Correlator::new(config.exit_timeout),
      checks: JoinSet::new(),
      store,
      bus,
      config,
    }
  }

  /// Process events until `shutdown` resolves. A pending movement is
  /// dropped on shutdown.
  pub async fn run<F>(mut self, shutdown: F)
  where
    F: Future<Output = ()> + Send,
  {
    let span = info_span!("correlator", session = %Uuid::new_v4());
    async move {
      tokio::pin!(shutdown);
      info!("movement correlator started");

      loop {
        let deadline = self.machine.deadline();
        tokio::select! {
          () = &mut shutdown => break,

          () = wait_until(deadline) => {
            if self.machine.on_deadline(Instant::now()) {
              debug!("movement timed out");
            }
          }

          Some(joined) = self.checks.join_next(), if !self.checks.is_empty() => match joined {
            Ok(Some(success)) => self.record(success).await,
            Ok(None) => {}
            Err(e) => warn!(error = %e, "room check task failed"),
          },

          event = self.events.recv() => match event {
            Ok(event) => self.handle(event).await,
            Err(RecvError::Lagged(skipped)) => {
              warn!(skipped, "event bus lagged; correlator reset");
              self.machine.reset();
            }
            Err(RecvError::Closed) => break,
          },
        }
      }

      self.checks.abort_all();
      info!("movement correlator stopped");
    }
    .instrument(span)
    .await
  }

  async fn handle(&mut self, event: InboundEvent) {
    match event {
      InboundEvent::CommandSent { command, from_room } => {
        match self.machine.on_command(&command, from_room, Instant::now()) {
          Step::Pending => debug!(%command, ?from_room, "awaiting room change"),
          Step::Busy => debug!(%command, "movement already pending; command not tracked"),
          Step::CheckImplicit { from_room } => self.schedule_check(command, from_room),
          Step::PreCommand => trace!(%command, "pre-command noted"),
          Step::Ignored => {}
        }
      }
      InboundEvent::RoomUpdate { data } => self.room_update(data).await,
    }
  }

  async fn room_update(&mut self, data: RoomData) {
    let visit = match data.into_visit() {
      Ok(visit) => visit,
      Err(e) => {
        warn!(error = %e, "room payload dropped");
        return;
      }
    };
    let room_number = visit.room_number;
    let success = self.machine.on_room(room_number);
    if success.is_none() {
      trace!(room = room_number, "room update without movement");
    }

    let room = match self.store.upsert_room(visit).await {
      Ok(room) => Some(room),
      Err(e) => {
        error!(error = %e, room = room_number, "room upsert failed");
        None
      }
    };
    if let Some(success) = success {
      self.record(success).await;
    }

    if let Some(room) = room {
      self.bus.emit(OutboundEvent::room(room));
      self.bus.emit(OutboundEvent::map());
    }
  }

  /// Compare the current room to `from_room` once the check delay elapses.
  fn schedule_check(&mut self, command: String, from_room: i64) {
    let room = self.bus.watch_room();
    let wait = self.config.implicit_check;
    self.checks.spawn(async move {
      tokio::time::sleep(wait).await;
      let current = (*room.borrow())?;
      (current != from_room).then(|| ExitSuccess {
        from_room,
        to_room: current,
        direction: command.clone(),
        move_command: command,
        pre_commands: Vec::new(),
      })
    });
  }

  async fn record(&self, success: ExitSuccess) {
    let (from, to) = (success.from_room, success.to_room);
    match self.store.record_exit_success(success).await {
      Ok(Some(_)) => debug!(from, to, "movement correlated"),
      Ok(None) => debug!(from, to, "traversal not recorded"),
      Err(e) => error!(error = %e, from, to, "failed to record exit"),
    }
  }
}

async fn wait_until(deadline: Option<Instant>) {
  match deadline {
    Some(deadline) => tokio::time::sleep_until(deadline).await,
    None => std::future::pending().await,
  }
}

// ─── State machine tests ─────────────────────────────────────────────────────
