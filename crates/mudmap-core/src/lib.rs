//! Core types and trait definitions for the mudmap knowledge graph.
//!
//! This crate is deliberately free of database, HTTP and runtime
//! dependencies. Storage backends implement [`store::GraphStore`] and the
//! replica traits in [`sync`]; the agent and sync engine depend only on those
//! abstractions.

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod direction;
pub mod entity;
pub mod error;
pub mod exit;
pub mod npc;
pub mod path;
pub mod room;
pub mod store;
pub mod sync;

pub use error::{Error, Result};
