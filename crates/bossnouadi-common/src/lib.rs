//! Common types for the BossNouadi server
//!
//! Shared error taxonomy and time helpers used by the storage layer,
//! the backup subsystem and the HTTP surface.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod time;

pub use error::{NouadiError, Result};
