//! SQLite database module for the affiliate engine.
mod sqlite_impl;

pub mod db;
pub use sqlite_impl::SqliteDatabase;
