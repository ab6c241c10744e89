//! Server library surface: router construction, configuration, logging,
//! and metrics bootstrap. Used by the binary and by integration tests.

pub mod api;
pub mod config;
pub mod logging;
pub mod metrics;
