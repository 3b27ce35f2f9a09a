//! Core infrastructure: configuration and process setup

mod config;

pub use config::Config;

/// Set up the process environment: load `.env` and install the tracing
/// subscriber (RUST_LOG-driven, defaults to `info` for this crate).
///
/// Call once at binary startup; safe to skip in tests, which install their
/// own subscribers if they need one.
pub fn setup_environment() {
    dotenv::dotenv().ok();

    use tracing_subscriber::{EnvFilter, fmt, prelude::*};
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,depot_server=debug"));
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();
}
