//! PostgreSQL backup, restore and pre-check orchestration.
//!
//! Drives `pg_dump`/`pg_restore` over a retrying database session, names
//! artifacts deterministically, and validates that a schema restores cleanly
//! before a real restore of the same scope is trusted.

pub mod activity;
pub mod backup;
pub mod config;
pub mod connection;
pub mod errors;
pub mod precheck;
pub mod restore;
pub mod utils;
