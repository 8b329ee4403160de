//! # planet — master server for NFK multiplayer sessions
//!
//! A master-server registry and rendezvous point for a small multiplayer
//! game community. Game clients connect over TCP, announce themselves,
//! optionally register a hosted game session, query the live session
//! list, ping to stay alive, and ask the server to relay join
//! invitations to session owners.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────┐
//! │  CLI (planet-server)                          │
//! ├───────────────────────────────────────────────┤
//! │  Planet     — orchestrator: listener,         │
//! │               dispatcher, sweeper, worker pool│
//! ├───────────────────────────────────────────────┤
//! │  Worker     — owns connections, runs dispatch │
//! │  Protocol   — framing, parsing, encoding      │
//! ├───────────────────────────────────────────────┤
//! │  Registry   — clients, sessions, IP counts    │
//! │  Client     — per-connection state            │
//! │  Session    — one hosted game endpoint        │
//! │  Penalty    — sliding-window flood control    │
//! └───────────────────────────────────────────────┘
//! ```
//!
//! New connections are accepted by a single dispatcher thread and handed
//! to the least-loaded worker of a fixed pool. Each worker owns its
//! connections outright: it runs their read loops, dispatches their
//! commands serially, and is the only thread allowed to tear them down.
//! Cross-worker operations (eviction on a session collision, invite
//! relays, ping-timeout disconnects) travel as messages on the owning
//! worker's queue.
//!
//! ## Quick start
//!
//! ```no_run
//! use planet::{Config, Planet};
//!
//! let mut server = Planet::new(Config::default());
//! server.start().unwrap();
//! ```
//!
//! ## Crate layout
//!
//! - [`server`] — [`Planet`] orchestrator, dispatcher, ping sweeper.
//! - [`worker`] — worker threads and their cross-thread message queues.
//! - [`protocol`] — line framing, command parsing, reply/list encoding,
//!   and the per-line dispatch handler.
//! - [`registry`] — [`Registry`](registry::Registry): shared directories
//!   of clients, sessions, and per-IP counts.
//! - [`client`] — [`Client`](client::Client) per-connection state.
//! - [`session`] — [`Session`](session::Session) hosted-game records.
//! - [`penalty`] — [`PenaltyMeter`](penalty::PenaltyMeter) flood control.
//! - [`config`] — TOML configuration and the persistent blacklist.
//! - [`error`] — [`PlanetError`] and [`Result`] alias.

pub mod client;
mod clock;
pub mod config;
pub mod error;
pub mod penalty;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod session;
pub mod worker;

pub use config::{Config, NetworkConfig, PenaltyConfig, PenaltyCosts};
pub use error::{PlanetError, Result};
pub use server::Planet;
