//! An agent session over line-delimited JSON.
//!
//! Inbound events are read one per line and published on the session's
//! [`EventBus`]; outbound events are written back one per line. The
//! correlator and, when configured, the sync loop run alongside until the
//! input closes or the session is interrupted.

use std::{future::Future, sync::Arc, time::Duration};

use anyhow::Context as _;
use mudmap_agent::{CorrelatorConfig, EventBus, InboundEvent, MovementCorrelator, OutboundEvent};
use mudmap_store_sqlite::SqliteStore;
use mudmap_sync::{Remote, SyncEngine};
use tokio::{
  io::{AsyncBufReadExt as _, AsyncRead, AsyncWrite, AsyncWriteExt as _, BufReader},
  sync::{broadcast, broadcast::error::RecvError, watch},
  task::JoinSet,
};
use tracing::{debug, info, warn};

pub struct Session {
  store:      SqliteStore,
  bus:        EventBus,
  correlator: CorrelatorConfig,
  sync:       Option<(SyncEngine<SqliteStore, Remote>, Duration)>,
}

impl Session {
  pub fn new(store: SqliteStore, correlator: CorrelatorConfig) -> Self {
    Self { store, bus: EventBus::default(), correlator, sync: None }
  }

  /// Run `engine` every `interval` for the lifetime of the session.
  pub fn with_sync(mut self, engine: SyncEngine<SqliteStore, Remote>, interval: Duration) -> Self {
    self.sync = Some((engine, interval));
    self
  }

  /// Serve the session until `input` reaches EOF or `interrupt` resolves.
  pub async fn run<R, W, F>(self, input: R, output: W, interrupt: F) -> anyhow::Result<()>
  where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
    F: Future<Output = ()>,
  {
    let (stop, stopped) = watch::channel(false);
    let mut tasks = JoinSet::new();

    let correlator = MovementCorrelator::new(Arc::new(self.store), self.bus.clone(), self.correlator);
    tasks.spawn(correlator.run(wait(stopped.clone())));
    if let Some((engine, interval)) = self.sync {
      tasks.spawn(engine.run(interval, wait(stopped.clone())));
    }
    tasks.spawn(forward(self.bus.subscribe_outbound(), output, wait(stopped)));

    let mut lines = BufReader::new(input).lines();
    tokio::pin!(interrupt);
    loop {
      tokio::select! {
        () = &mut interrupt => {
          info!("interrupted");
          break;
        }
        line = lines.next_line() => match line.context("failed to read input")? {
          Some(line) => publish_line(&self.bus, &line),
          None => {
            debug!("input closed");
            break;
          }
        },
      }
    }

    let _ = stop.send(true);
    while let Some(joined) = tasks.join_next().await {
      if let Err(e) = joined {
        warn!(error = %e, "session task failed");
      }
    }
    info!("session ended");
    Ok(())
  }
}

fn publish_line(bus: &EventBus, line: &str) {
  if line.trim().is_empty() {
    return;
  }
  match InboundEvent::parse(line) {
    Ok(event) => bus.publish(event),
    Err(e) => warn!(error = %e, "ignoring malformed event"),
  }
}

/// Resolves once `stopped` turns true or its sender is gone.
async fn wait(mut stopped: watch::Receiver<bool>) {
  let _ = stopped.wait_for(|s| *s).await;
}

/// Write outbound events to `output`, one JSON object per line.
async fn forward<W, F>(mut events: broadcast::Receiver<OutboundEvent>, mut output: W, stopped: F)
where
  W: AsyncWrite + Unpin,
  F: Future<Output = ()>,
{
  tokio::pin!(stopped);
  loop {
    let event = tokio::select! {
      () = &mut stopped => break,
      event = events.recv() => event,
    };
    match event {
      Ok(event) => {
        if let Err(e) = write_event(&mut output, &event).await {
          warn!(error = %e, "failed to write event");
          break;
        }
      }
      Err(RecvError::Lagged(skipped)) => warn!(skipped, "output lagged"),
      Err(RecvError::Closed) => break,
    }
  }
  let _ = output.flush().await;
}

async fn write_event<W: AsyncWrite + Unpin>(output: &mut W, event: &OutboundEvent) -> anyhow::Result<()> {
  let mut line = event.to_line()?;
  line.push('\n');
  output.write_all(line.as_bytes()).await?;
  output.flush().await?;
  Ok(())
}
