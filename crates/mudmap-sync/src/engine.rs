//! [`SyncEngine`]: push, pull and the periodic sync loop.

use std::{future::Future, time::Duration};

use chrono::{DateTime, Utc};
use mudmap_core::{
  entity::now,
  sync::{LocalReplica, MergeOutcome, Model, RemoteReplica, StoreOutcome},
};
use serde::Serialize;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::{Error, Result};

// ─── Reports ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PushReport {
  /// Rows written to the remote and marked synced locally.
  pub pushed:     usize,
  /// Rows written but changed locally meanwhile; they stay dirty.
  pub superseded: usize,
  /// Rows whose parent the remote does not have yet.
  pub unresolved: usize,
  pub failed:     usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PullReport {
  pub inserted:    usize,
  pub overwritten: usize,
  pub merged:      usize,
  pub skipped:     usize,
  pub failed:      usize,
  /// Whether every model was fetched and every row applied, so the
  /// watermark advanced.
  pub complete:    bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CycleReport {
  pub push: PushReport,
  pub pull: PullReport,
}

// ─── Engine ──────────────────────────────────────────────────────────────────

/// Synchronises a local replica with a remote one.
///
/// Rows are matched across replicas by natural key. The engine keeps a single
/// watermark: the time the last complete pull started. A pull fetches remote
/// rows updated after it.
pub struct SyncEngine<L, R> {
  local:     L,
  remote:    R,
  watermark: Option<DateTime<Utc>>,
}

impl<L, R> SyncEngine<L, R>
where
  L: LocalReplica,
  R: RemoteReplica,
{
  pub fn new(local: L, remote: R) -> Self { Self { local, remote, watermark: None } }

  /// Resume from a previously reached watermark.
  pub fn with_watermark(mut self, watermark: Option<DateTime<Utc>>) -> Self {
    self.watermark = watermark;
    self
  }

  pub fn watermark(&self) -> Option<DateTime<Utc>> { self.watermark }

  pub fn local(&self) -> &L { &self.local }

  pub fn remote(&self) -> &R { &self.remote }

  /// Push every dirty local row, parents first.
  ///
  /// Row failures are logged and counted; the row stays dirty and is retried
  /// next cycle. Only a failure to list dirty rows aborts the push.
  pub async fn push(&self) -> Result<PushReport> {
    let mut report = PushReport::default();

    for model in Model::sync_order() {
      let records = self.local.dirty_records(model).await.map_err(Error::local)?;
      if !records.is_empty() {
        debug!(%model, rows = records.len(), "pushing");
      }

      for record in records {
        let key = record.natural_key();
        let pushed_at = record.meta().updated_at;

        match self.remote.store_record(record).await {
          Ok(StoreOutcome::Stored { updated_at }) => {
            match self.local.mark_synced(key.clone(), pushed_at, updated_at).await {
              Ok(true) => report.pushed += 1,
              Ok(false) => {
                debug!(%key, "row changed during push; left dirty");
                report.superseded += 1;
              }
              Err(e) => {
                warn!(%key, error = %e, "failed to mark row synced");
                report.failed += 1;
              }
            }
          }
          Ok(StoreOutcome::Unresolved { missing }) => {
            warn!(%key, %missing, "remote is missing a parent; row skipped");
            report.unresolved += 1;
          }
          Err(e) => {
            warn!(%key, error = %e, "push failed; row skipped");
            report.failed += 1;
          }
        }
      }
    }

    Ok(report)
  }

  /// Pull remote rows changed since the watermark, parents first.
  ///
  /// The watermark moves to the time this pull started only when every model
  /// was fetched and no row was skipped or failed.
  pub async fn pull(&mut self) -> PullReport {
    let started = now();
    let mut report = PullReport { complete: true, ..Default::default() };

    for model in Model::sync_order() {
      let records = match self.remote.changed_since(model, self.watermark).await {
        Ok(records) => records,
        Err(e) => {
          warn!(%model, error = %e, "fetching remote changes failed");
          report.complete = false;
          continue;
        }
      };
      if !records.is_empty() {
        debug!(%model, rows = records.len(), "pulling");
      }

      for record in records {
        let key = record.natural_key();
        match self.local.merge_record(record).await {
          Ok(MergeOutcome::Inserted) => report.inserted += 1,
          Ok(MergeOutcome::Overwritten) => report.overwritten += 1,
          Ok(MergeOutcome::Merged) => report.merged += 1,
          Ok(MergeOutcome::Skipped(missing)) => {
            debug!(%key, %missing, "local replica is missing a parent; row skipped");
            report.skipped += 1;
            report.complete = false;
          }
          Err(e) => {
            warn!(%key, error = %e, "applying pulled row failed");
            report.failed += 1;
            report.complete = false;
          }
        }
      }
    }

    if report.complete {
      self.watermark = Some(started);
    }
    report
  }

  /// One cycle: ping the remote, push, then pull. Returns `None` when the
  /// remote is unreachable.
  ///
  /// Until a pull has completed the cycle pulls first, so rows left dirty
  /// from an earlier run are merged with the remote's newer state before
  /// they are pushed over it.
  pub async fn sync_once(&mut self) -> Result<Option<CycleReport>> {
    if let Err(e) = self.remote.ping().await {
      warn!(error = %e, "remote unreachable; sync skipped");
      return Ok(None);
    }

    let (push, pull) = if self.watermark.is_none() {
      debug!("no watermark; pulling before push");
      let pull = self.pull().await;
      (self.push().await?, pull)
    } else {
      let push = self.push().await?;
      (push, self.pull().await)
    };
    info!(
      pushed = push.pushed,
      push_failed = push.failed + push.unresolved,
      inserted = pull.inserted,
      overwritten = pull.overwritten,
      merged = pull.merged,
      skipped = pull.skipped + pull.failed,
      "sync cycle complete",
    );
    Ok(Some(CycleReport { push, pull }))
  }

  /// Run a cycle every `interval` until `shutdown` resolves. The first cycle
  /// runs immediately.
  pub async fn run<F>(mut self, interval: Duration, shutdown: F)
  where
    F: Future<Output = ()> + Send,
  {
    tokio::pin!(shutdown);
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!(interval_secs = interval.as_secs(), "sync loop started");

    loop {
      tokio::select! {
        () = &mut shutdown => break,
        _ = ticker.tick() => {
          if let Err(e) = self.sync_once().await {
            error!(error = %e, "sync cycle failed");
          }
        }
      }
    }

    info!("sync loop stopped");
  }
}
