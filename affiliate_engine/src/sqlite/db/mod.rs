//! # SQLite Database methods
//!
//! This module contains "low-level" SQLite database interactions.
//!
//! All these interaction are maintained by simple functions (rather than stateful structs) that accept a
//! `&mut SqliteConnection` argument. Callers can obtain a connection from a pool,
//! or create an atomic transaction as the need arises and call through to the functions without any other changes.
//!
//! Statements with a `RETURNING` clause are always read with `fetch_all`. SQLite only finishes (and, outside a
//! transaction, commits) such a statement once every row has been stepped through.
use std::env;

use chrono::Utc;
use log::{info, trace};
use sqlx::{sqlite::SqlitePoolOptions, Error as SqlxError, SqliteConnection, SqlitePool};

pub mod commissions;
pub mod fraud;
pub mod members;
pub mod notifications;
pub mod payments;
pub mod payouts;
pub mod tasks;

const SQLITE_DB_URL: &str = "sqlite://data/affiliate.db";

pub fn db_url() -> String {
    let result = env::var("AFF_DATABASE_URL").unwrap_or_else(|_| {
        info!("🗃️ AFF_DATABASE_URL is not set. Using the default.");
        SQLITE_DB_URL.to_string()
    });
    info!("🗃️ Using database URL: {result}");
    result
}

pub async fn new_pool(url: &str, max_connections: u32) -> Result<SqlitePool, SqlxError> {
    let pool = SqlitePoolOptions::new().max_connections(max_connections).connect(url).await?;
    Ok(pool)
}

/// Takes the database write lock for the current transaction.
///
/// `pool.begin()` opens a deferred transaction. One that reads before its first write can lose the lock upgrade to a
/// concurrent writer and fail with `SQLITE_BUSY` straight away. Writing first makes the transaction wait its turn
/// (up to the busy timeout) instead, so call this before any read in a check-then-write transaction.
pub async fn acquire_write_lock(conn: &mut SqliteConnection) -> Result<(), SqlxError> {
    sqlx::query("UPDATE write_lock SET touched_at = $1 WHERE id = 1").bind(Utc::now()).execute(conn).await?;
    trace!("🗃️ Write lock acquired");
    Ok(())
}
