//! Database layer for Margin

mod connection;
mod migrations;
mod outbox_repository;
mod repository;

pub use connection::Database;
pub use outbox_repository::{OutboxEntry, OutboxOp, OutboxRepository, SqliteOutboxRepository};
pub use repository::{require, HighlightRepository, SqliteHighlightRepository};
