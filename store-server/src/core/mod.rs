//! Core server plumbing: configuration, shared state, background tasks,
//! HTTP server lifecycle.

pub mod config;
pub mod server;
pub mod state;
pub mod tasks;

pub use config::{Config, RateLimitRule};
pub use server::Server;
pub use state::AppState;
pub use tasks::{BackgroundTasks, TaskKind};
