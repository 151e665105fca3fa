//! Berth daemon
//!
//! Serves the per-channel release actors over HTTP and a live WebSocket
//! channel.

pub mod config;
pub mod error;
pub mod routes;
pub mod ws;

pub use config::{Config, StoreKind};
pub use error::ApiError;
pub use routes::{app, AppState};
