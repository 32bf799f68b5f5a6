//! Application layer for coursemind: configuration, component wiring and the
//! HTTP server. The `coursemind` binary is a thin CLI over these modules.

pub mod app;
pub mod config;
pub mod server;

pub use app::{App, Components, MaterialInput, Settings};
pub use config::Config;
