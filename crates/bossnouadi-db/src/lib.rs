//! BossNouadi storage layer
//!
//! Owns the live SQLite database file. Provides:
//! - Pooled connections with WAL journaling and enforced foreign keys
//! - Schema initialization for all application tables
//! - The atomic snapshot primitive (`VACUUM INTO`) used by the backup engine
//! - The close/reopen handshake required by restore: `close()` drops the
//!   pool and releases the file handle, and the next access reopens lazily
//!
//! The backup subsystem never locks the database itself; it only ever asks
//! this layer for a `VACUUM INTO` copy, so concurrent application reads and
//! writes keep flowing while a snapshot is taken.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod schema;
pub mod storage;
pub mod users;

pub use storage::Storage;
pub use users::User;
