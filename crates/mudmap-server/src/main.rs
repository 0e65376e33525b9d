//! mudmap server binary: the shared map every agent syncs against.
//!
//! ```toml
//! store_path         = "~/.local/share/mudmap/shared.db"
//! auth_username      = "mapper"
//! auth_password_hash = "$argon2id$v=19$..."   # from `server --hash-password`
//! # host = "127.0.0.1", port = 7878, auth_realm = "mudmap"
//! ```
//!
//! Any key can be overridden with `MUDMAP_SERVER_<KEY>`.

use std::{
  path::{Path, PathBuf},
  sync::Arc,
};

use anyhow::Context as _;
use argon2::{Argon2, PasswordHasher, password_hash::SaltString};
use clap::Parser;
use mudmap_core::store::GraphStore as _;
use mudmap_server::{AppState, ServerConfig};
use mudmap_store_sqlite::SqliteStore;
use rand_core::OsRng;
use tokio::net::TcpListener;
use tracing::{info, level_filters::LevelFilter};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(version, about = "Shared map server for mudmap agents")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "config.toml")]
  config: PathBuf,

  /// Read the agents' password from stdin, print its argon2 hash and exit.
  #[arg(long)]
  hash_password: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  if cli.hash_password {
    let password = read_password()?;
    if password.is_empty() {
      anyhow::bail!("refusing to hash an empty password");
    }
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
      .hash_password(password.as_bytes(), &salt)
      .map_err(|e| anyhow::anyhow!("argon2 error: {e}"))?
      .to_string();
    println!("{hash}");
    return Ok(());
  }

  let settings = config::Config::builder()
    .add_source(config::File::from(cli.config).required(false))
    .add_source(config::Environment::with_prefix("MUDMAP_SERVER"))
    .build()
    .context("failed to read config file")?;

  let server_cfg: ServerConfig = settings
    .try_deserialize()
    .context("invalid server configuration")?;
  let auth = server_cfg.auth().context("auth_password_hash")?;

  let store_path = expand_tilde(&server_cfg.store_path);
  if let Some(parent) = store_path.parent().filter(|p| !p.as_os_str().is_empty()) {
    std::fs::create_dir_all(parent).with_context(|| format!("failed to create {parent:?}"))?;
  }
  let store = SqliteStore::open(&store_path)
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?;
  let summary = store.summary().await.context("failed to read store")?;
  info!(path = ?store_path, rooms = summary.rooms, exits = summary.exits, "shared map opened");

  let state = AppState { store: Arc::new(store), auth: Arc::new(auth) };
  let app = mudmap_server::router(state);
  let address = format!("{}:{}", server_cfg.host, server_cfg.port);

  info!(realm = %server_cfg.auth_realm, "listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, app)
    .with_graceful_shutdown(async {
      let _ = tokio::signal::ctrl_c().await;
    })
    .await
    .context("server error")?;

  info!("server stopped");
  Ok(())
}

/// Read one line from stdin, prompting when it is a terminal.
fn read_password() -> anyhow::Result<String> {
  use std::io::{self, BufRead, IsTerminal, Write};
  if io::stdin().is_terminal() {
    eprint!("Password: ");
    io::stderr().flush().ok();
  }
  let mut line = String::new();
  io::stdin().lock().read_line(&mut line)?;
  Ok(line.trim_end_matches(['\n', '\r']).to_string())
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
