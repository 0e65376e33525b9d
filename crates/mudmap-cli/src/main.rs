//! `mudmap`: map a MUD world from an agent's event stream.
//!
//! # Usage
//!
//! ```text
//! mudmap run < events.jsonl
//! mudmap path 1203 "Temple of Aylor"
//! mudmap exit 1203 north
//! mudmap unexplored aylor --visited 1203,1204
//! mudmap search questor
//! mudmap open "Aylor Questor" 1203
//! mudmap entities npc
//! mudmap sync
//! ```
//!
//! Configuration comes from `mudmap.toml` (or `--config`) and `MUDMAP_*`
//! variables. Logs go to stderr; stdout carries events and query results.

mod session;
mod settings;

use std::{collections::HashSet, path::PathBuf};

use anyhow::{Context as _, Result, bail};
use clap::{Parser, Subcommand};
use mudmap_core::{entity::EntityType, path::RoomTarget, store::GraphStore as _};
use mudmap_store_sqlite::SqliteStore;
use mudmap_sync::{Remote, SyncEngine};
use serde::Serialize;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use crate::{session::Session, settings::AgentConfig};

// ─── CLI args ─────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "mudmap", version, about = "Map a MUD world from an agent's event stream")]
struct Cli {
  /// Path to a TOML config file.
  #[arg(short, long, value_name = "FILE", default_value = "mudmap.toml", global = true)]
  config: PathBuf,

  /// Local database, overriding `store_path`.
  #[arg(long, env = "MUDMAP_STORE_PATH", global = true)]
  store: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Run an agent session: events on stdin, updates on stdout.
  Run {
    /// Do not sync with the remote even if one is configured.
    #[arg(long)]
    no_sync: bool,
  },

  /// Print the shortest path between two rooms.
  Path {
    from:      i64,
    /// Room number or part of a room name.
    to:        String,
    #[arg(long)]
    max_depth: Option<usize>,
  },

  /// Print how to traverse an exit.
  Exit { room: i64, direction: String },

  /// List rooms in a zone with exits leading somewhere unknown.
  Unexplored {
    zone:    String,
    #[arg(long, value_delimiter = ',')]
    visited: Vec<i64>,
  },

  /// Print entity, relation and exit counts.
  Summary,

  /// Find entities by name, type or observation text.
  Search { query: String },

  /// Print the named entities with their observations.
  Open {
    #[arg(required = true)]
    names: Vec<String>,
  },

  /// List every entity of a type (`room` or `npc`).
  Entities { kind: EntityType },

  /// Run one sync cycle against the configured remote.
  Sync,
}

// ─── Entry point ──────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .with_writer(std::io::stderr)
    .init();

  let cli = Cli::parse();
  let mut cfg = AgentConfig::load(&cli.config)?;
  if let Some(store) = cli.store {
    cfg.store_path = store;
  }

  let store_path = cfg.store_path();
  if let Some(parent) = store_path.parent().filter(|p| !p.as_os_str().is_empty()) {
    std::fs::create_dir_all(parent).with_context(|| format!("failed to create {parent:?}"))?;
  }
  let store = SqliteStore::open(&store_path)
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?;

  match cli.command {
    Command::Run { no_sync } => {
      let mut session = Session::new(store.clone(), cfg.correlator());
      if cfg.sync_enabled() && !no_sync {
        session = session.with_sync(sync_engine(&cfg, store).await?, cfg.sync_interval());
      }
      session
        .run(tokio::io::stdin(), tokio::io::stdout(), async {
          let _ = tokio::signal::ctrl_c().await;
        })
        .await?;
    }

    Command::Path { from, to, max_depth } => {
      let target: RoomTarget = to.parse().unwrap_or_else(|never| match never {});
      let depth = max_depth.unwrap_or(cfg.max_path_depth);
      match store.find_path(from, target, depth).await? {
        Ok(route) => print_json(&route)?,
        Err(e) => bail!("{e}"),
      }
    }

    Command::Exit { room, direction } => {
      match store.get_exit_command_details(room, &direction).await? {
        Some(details) => print_json(&details)?,
        None => bail!("no exit {direction:?} from room {room}"),
      }
    }

    Command::Unexplored { zone, visited } => {
      let visited: HashSet<i64> = visited.into_iter().collect();
      let rooms = store.find_rooms_with_unexplored_exit(&zone, &visited).await?;
      print_json(&rooms)?;
    }

    Command::Summary => print_json(&store.summary().await?)?,

    Command::Search { query } => print_json(&store.search_nodes(&query).await?)?,

    Command::Open { names } => print_json(&store.open_nodes(&names).await?)?,

    Command::Entities { kind } => print_json(&store.entities_by_type(kind).await?)?,

    Command::Sync => {
      let mut engine = sync_engine(&cfg, store).await?;
      match engine.sync_once().await? {
        Some(report) => print_json(&report)?,
        None => bail!("remote unreachable"),
      }
    }
  }

  Ok(())
}

async fn sync_engine(cfg: &AgentConfig, store: SqliteStore) -> Result<SyncEngine<SqliteStore, Remote>> {
  let url = cfg
    .remote_url
    .as_deref()
    .context("remote_url is not configured")?;
  let remote = Remote::connect(url, &cfg.remote_username, &cfg.remote_password)
    .await
    .with_context(|| format!("failed to connect to remote {url}"))?;
  Ok(SyncEngine::new(store, remote))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
  println!("{}", serde_json::to_string_pretty(value)?);
  Ok(())
}
