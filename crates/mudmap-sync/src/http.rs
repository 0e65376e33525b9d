//! [`HttpRemote`]: a remote replica served by `mudmap-server`.

use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use mudmap_core::sync::{Model, RemoteReplica, StoreOutcome, SyncRecord};
use reqwest::{Client, RequestBuilder, Response, StatusCode};

use crate::{Error, Result};

/// Connection settings for a remote server.
#[derive(Debug, Clone)]
pub struct RemoteConfig {
  pub base_url: String,
  pub username: String,
  pub password: String,
}

/// HTTP client for the sync routes of `mudmap-server`.
///
/// Cheap to clone; the inner [`reqwest::Client`] is `Arc`-based.
#[derive(Clone)]
pub struct HttpRemote {
  client: Client,
  config: RemoteConfig,
}

impl HttpRemote {
  pub fn new(config: RemoteConfig) -> Result<Self> {
    let client = Client::builder().timeout(Duration::from_secs(30)).build()?;
    Ok(Self { client, config })
  }

  fn url(&self, path: &str) -> String {
    format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
  }

  fn auth(&self, req: RequestBuilder) -> RequestBuilder {
    if self.config.username.is_empty() {
      req
    } else {
      req.basic_auth(&self.config.username, Some(&self.config.password))
    }
  }
}

/// Turn a non-success response into [`Error::Status`].
async fn check(resp: Response) -> Result<Response> {
  let status = resp.status();
  if status.is_success() {
    return Ok(resp);
  }
  let body = resp.text().await.unwrap_or_default();
  Err(Error::Status { status: status.as_u16(), body })
}

impl RemoteReplica for HttpRemote {
  type Error = Error;

  /// `GET /health`
  async fn ping(&self) -> Result<()> {
    let resp = self.client.get(self.url("/health")).send().await?;
    check(resp).await?;
    Ok(())
  }

  /// `GET /sync/{model}[?since=<rfc3339>]`
  async fn changed_since(
    &self,
    model: Model,
    since: Option<DateTime<Utc>>,
  ) -> Result<Vec<SyncRecord>> {
    let mut req = self.auth(self.client.get(self.url(&format!("/sync/{model}"))));
    if let Some(since) = since {
      req = req.query(&[("since", since.to_rfc3339_opts(SecondsFormat::Micros, true))]);
    }
    let resp = check(req.send().await?).await?;
    Ok(resp.json().await?)
  }

  /// `PUT /sync/records`. A 409 carries the unresolved parent.
  async fn store_record(&self, record: SyncRecord) -> Result<StoreOutcome> {
    let resp = self
      .auth(self.client.put(self.url("/sync/records")))
      .json(&record)
      .send()
      .await?;

    if resp.status() == StatusCode::CONFLICT {
      return Ok(resp.json().await?);
    }
    let resp = check(resp).await?;
    Ok(resp.json().await?)
  }
}
