//! Basic auth for agents talking to the map server.
//!
//! Every agent signs in with the same account. The argon2 hash is parsed when
//! the [`AuthConfig`] is built, so a bad `auth_password_hash` stops the server
//! at startup.

use argon2::{Argon2, PasswordHash, PasswordVerifier};
use axum::{
  extract::FromRequestParts,
  http::{HeaderMap, header, request::Parts},
};
use base64::{Engine as _, engine::general_purpose::STANDARD as B64};
use thiserror::Error;
use tracing::debug;

use crate::{AppState, ServerStore, error::ApiError};

/// Realm announced in `WWW-Authenticate` when none is configured.
pub const DEFAULT_REALM: &str = "mudmap";

/// The configured password hash is not an argon2 PHC string.
#[derive(Debug, Error)]
#[error("invalid password hash: {0}")]
pub struct InvalidHash(String);

/// Why a request's credentials were refused. Logged, never sent back.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum Rejected {
  #[error("no Basic credentials")]
  Missing,
  #[error("malformed Basic credentials")]
  Malformed,
  #[error("unknown agent {0:?}")]
  UnknownAgent(String),
  #[error("wrong password for {0:?}")]
  WrongPassword(String),
}

#[derive(Clone, Debug)]
pub struct AuthConfig {
  pub username:  String,
  pub realm:     String,
  password_hash: String,
}

impl AuthConfig {
  pub fn new(
    username: impl Into<String>,
    password_hash: impl Into<String>,
    realm: impl Into<String>,
  ) -> Result<Self, InvalidHash> {
    let password_hash = password_hash.into();
    PasswordHash::new(&password_hash).map_err(|e| InvalidHash(e.to_string()))?;
    Ok(Self { username: username.into(), realm: realm.into(), password_hash })
  }

  /// Check the Basic credentials in `headers`. Returns the agent name.
  pub fn verify(&self, headers: &HeaderMap) -> Result<String, Rejected> {
    let value = headers
      .get(header::AUTHORIZATION)
      .and_then(|v| v.to_str().ok())
      .ok_or(Rejected::Missing)?;
    let encoded = value.strip_prefix("Basic ").ok_or(Rejected::Malformed)?;
    let decoded = B64.decode(encoded.trim()).map_err(|_| Rejected::Malformed)?;
    let creds = String::from_utf8(decoded).map_err(|_| Rejected::Malformed)?;
    let (agent, password) = creds.split_once(':').ok_or(Rejected::Malformed)?;

    if agent != self.username {
      return Err(Rejected::UnknownAgent(agent.to_owned()));
    }
    let hash = PasswordHash::new(&self.password_hash).map_err(|_| Rejected::WrongPassword(agent.to_owned()))?;
    Argon2::default()
      .verify_password(password.as_bytes(), &hash)
      .map_err(|_| Rejected::WrongPassword(agent.to_owned()))?;
    Ok(agent.to_owned())
  }
}

/// An authenticated request, carrying the agent name it signed in with.
pub struct Authenticated {
  pub agent: String,
}

impl<S: ServerStore> FromRequestParts<AppState<S>> for Authenticated {
  type Rejection = ApiError;

  async fn from_request_parts(parts: &mut Parts, state: &AppState<S>) -> Result<Self, Self::Rejection> {
    match state.auth.verify(&parts.headers) {
      Ok(agent) => Ok(Authenticated { agent }),
      Err(reason) => {
        debug!(%reason, uri = %parts.uri, "request refused");
        Err(ApiError::Unauthorized { realm: state.auth.realm.clone() })
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  use argon2::{PasswordHasher, password_hash::SaltString};
  use axum::http::HeaderValue;
  use rand_core::OsRng;

  fn config(password: &str) -> AuthConfig {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
      .hash_password(password.as_bytes(), &salt)
      .unwrap()
      .to_string();
    AuthConfig::new("mapper", hash, DEFAULT_REALM).unwrap()
  }

  fn headers(value: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(header::AUTHORIZATION, HeaderValue::from_str(value).unwrap());
    headers
  }

  fn basic(user: &str, pass: &str) -> String { format!("Basic {}", B64.encode(format!("{user}:{pass}"))) }

  #[test]
  fn correct_credentials_name_the_agent() {
    let cfg = config("secret");
    assert_eq!(cfg.verify(&headers(&basic("mapper", "secret"))), Ok("mapper".to_owned()));
  }

  #[test]
  fn password_may_contain_colons() {
    let cfg = config("a:b");
    assert!(cfg.verify(&headers(&basic("mapper", "a:b"))).is_ok());
  }

  #[test]
  fn wrong_password_or_agent() {
    let cfg = config("secret");
    assert_eq!(
      cfg.verify(&headers(&basic("mapper", "nope"))),
      Err(Rejected::WrongPassword("mapper".to_owned()))
    );
    assert_eq!(
      cfg.verify(&headers(&basic("other", "secret"))),
      Err(Rejected::UnknownAgent("other".to_owned()))
    );
  }

  #[test]
  fn missing_or_malformed_header() {
    let cfg = config("secret");
    assert_eq!(cfg.verify(&HeaderMap::new()), Err(Rejected::Missing));
    assert_eq!(cfg.verify(&headers("Basic !!!")), Err(Rejected::Malformed));
    assert_eq!(cfg.verify(&headers("Bearer abc")), Err(Rejected::Malformed));
  }

  #[test]
  fn plaintext_password_is_not_a_hash() {
    assert!(AuthConfig::new("mapper", "secret", DEFAULT_REALM).is_err());
  }
}
