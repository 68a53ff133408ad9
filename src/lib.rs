#![deny(clippy::all)]
#![forbid(unsafe_code)]

//! weeder is a stateful HTTP reverse proxy fronting a distributed blob-storage cluster of
//! master, volume, and filer nodes.
//!
//! It terminates client uploads, downloads, deletes, and path queries, and forwards them to
//! the cluster while handling backend selection, retry with shadow-pool failover, TTL
//! bookkeeping, and whitelist-based admission control so that cluster clients don't have to.
//!
//! # Quick Start
//!
//! Add weeder to your project's dependencies in Cargo.toml, or run the `weederd` binary
//! directly against a config file:
//!
//! ```sh
//! weederd start -c weeder.json
//! ```
//!
//! The [`server`] module exposes [`server::AppState`] and [`server::serve`] for embedding the
//! proxy in your own binary instead.

pub mod config;
pub mod delete;
pub mod download;
pub mod error;
pub mod health;
pub mod httpclient;
pub mod identity;
pub mod logging;
pub mod metrics;
pub mod model;
pub mod query;
pub mod retry;
pub mod router;
pub mod server;
pub mod upload;
pub mod urlcompose;

/// A type-erased error, used at the boundary where different backend error types converge.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;
