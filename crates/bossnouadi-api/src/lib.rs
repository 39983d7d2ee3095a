//! BossNouadi API library
//!
//! HTTP layer over the storage and backup engines: backup export and
//! restore, backup settings, the auto-cloud trigger and per-item asset
//! uploads.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod handlers;
pub mod routes;

pub use handlers::AppState;
pub use routes::create_router;
