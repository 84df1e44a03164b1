//! Logging infrastructure: structured `tracing` output via
//! `tracing-subscriber`, JSON or pretty, filtered by `RUST_LOG`/the
//! configured default level.

pub mod logger;

pub use logger::LoggerImpl;
