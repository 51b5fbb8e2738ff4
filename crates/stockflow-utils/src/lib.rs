//! Shared utilities for stockflow
//!
//! This crate provides common functionality used across the stockflow workspace,
//! including logging setup, configuration management, a swappable clock and the
//! storage primitives both the cache tiers and the progress stores build on.

pub mod clock;
pub mod config;
pub mod logging;
pub mod storage;

pub use clock::{Clock, ManualClock, SystemClock, system_clock};
pub use config::{AppConfig, LogFormat};
pub use logging::{init_tracing, init_tracing_json, init_tracing_with};
pub use storage::BackendError;
