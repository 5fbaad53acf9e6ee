#![cfg_attr(not(test), deny(clippy::panic))]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions,
    clippy::struct_excessive_bools,
    clippy::too_many_arguments,
    clippy::too_many_lines,
    clippy::similar_names
)]

//! # Raceway Co-op Server
//!
//! A persistent lobby/room/game coordination server for a racing game's
//! community co-op mode: authenticated players traverse a scoped hierarchy
//! (MainLobby / Lobby / Room / Game), form teams, ready up, and play a
//! shared sequence of maps while the server relays gameplay events and
//! persists an authoritative replay log.

/// Token/legacy login handshake and the user directory.
pub mod auth;

/// Role hierarchy shared by every scope carrying admins/mods lists.
pub mod admin;

/// Per-scope chat containers: persistent history plus a bounded tail.
pub mod chat;

/// Server configuration and environment variables.
pub mod config;

/// Core data model: User, Message, Lobby, Room, GameSession, Map.
pub mod domain;

/// Structured logging configuration.
pub mod logging;

/// Random-map provisioning pipeline.
pub mod map_provider;

/// Metrics collection and reporting.
pub mod metrics;

/// Wire protocol: framing, inbound validation, outbound shapes.
pub mod protocol;

/// Canonical registry of live lobbies, rooms, games, and sessions.
pub mod registry;

/// Retry logic utilities.
pub mod retry;

/// Scope controllers and the per-connection driver.
pub mod server;

/// Persistence abstraction with an in-memory implementation.
pub mod store;
