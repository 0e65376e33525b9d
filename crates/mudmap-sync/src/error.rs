//! Error type for `mudmap-sync`.

use thiserror::Error;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum Error {
  #[error("local replica error: {0}")]
  Local(BoxError),

  #[error("remote replica error: {0}")]
  Remote(BoxError),

  #[error("http error: {0}")]
  Http(#[from] reqwest::Error),

  #[error("remote responded {status}: {body}")]
  Status { status: u16, body: String },

  #[error("store error: {0}")]
  Store(#[from] mudmap_store_sqlite::Error),
}

impl Error {
  pub(crate) fn local(e: impl std::error::Error + Send + Sync + 'static) -> Self {
    Self::Local(Box::new(e))
  }

  pub(crate) fn remote(e: impl std::error::Error + Send + Sync + 'static) -> Self {
    Self::Remote(Box::new(e))
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
