//! SQLite backend for the ticketing transaction engine.
mod sqlite_impl;

pub mod db;
pub use sqlite_impl::SqliteDatabase;
