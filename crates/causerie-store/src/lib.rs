//! # causerie-store
//!
//! Durable local cache for the Causerie client, backed by SQLite.
//!
//! The store is pure persistence: last-known chats, per-chat message lists,
//! last-message summaries, the publication feed snapshot and the session
//! record.  No business logic lives here — the reconciliation engine decides
//! what gets written and treats every failure as a logged cache miss.

pub mod chats;
pub mod database;
pub mod messages;
pub mod migrations;
pub mod publications;
pub mod session;

mod error;

pub use database::Database;
pub use error::StoreError;
