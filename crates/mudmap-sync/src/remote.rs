//! [`Remote`]: the remote replica named by a connection string.

use chrono::{DateTime, Utc};
use mudmap_core::sync::{Model, RemoteReplica, StoreOutcome, SyncRecord};
use mudmap_store_sqlite::SqliteStore;
use tracing::info;

use crate::{
  Error, Result,
  http::{HttpRemote, RemoteConfig},
};

/// A remote replica: a `mudmap-server` over HTTP, or a SQLite file with the
/// same schema.
#[derive(Clone)]
pub enum Remote {
  Http(HttpRemote),
  Sqlite(SqliteStore),
}

impl Remote {
  /// Connect to the replica named by `url`.
  ///
  /// `http://` and `https://` URLs select a server; `sqlite://PATH` or a
  /// plain path selects a database file, created if missing.
  pub async fn connect(url: &str, username: &str, password: &str) -> Result<Self> {
    if url.starts_with("http://") || url.starts_with("https://") {
      info!(%url, "using http remote");
      let remote = HttpRemote::new(RemoteConfig {
        base_url: url.to_owned(),
        username: username.to_owned(),
        password: password.to_owned(),
      })?;
      return Ok(Self::Http(remote));
    }

    let path = url.strip_prefix("sqlite://").unwrap_or(url);
    info!(path, "using sqlite remote");
    Ok(Self::Sqlite(SqliteStore::open(path).await?))
  }
}

impl RemoteReplica for Remote {
  type Error = Error;

  async fn ping(&self) -> Result<()> {
    match self {
      Self::Http(r) => r.ping().await,
      Self::Sqlite(r) => r.ping().await.map_err(Error::remote),
    }
  }

  async fn changed_since(
    &self,
    model: Model,
    since: Option<DateTime<Utc>>,
  ) -> Result<Vec<SyncRecord>> {
    match self {
      Self::Http(r) => r.changed_since(model, since).await,
      Self::Sqlite(r) => r.changed_since(model, since).await.map_err(Error::remote),
    }
  }

  async fn store_record(&self, record: SyncRecord) -> Result<StoreOutcome> {
    match self {
      Self::Http(r) => r.store_record(record).await,
      Self::Sqlite(r) => r.store_record(record).await.map_err(Error::remote),
    }
  }
}
