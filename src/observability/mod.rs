//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! watcher / policy / server
//!     → tracing macros with key/value fields → logging.rs (fmt layer)
//!     → metrics::record_* → Prometheus recorder → GET /metrics
//! ```
//!
//! # Design Decisions
//! - `RUST_LOG` overrides the configured level
//! - Recording without an installed recorder is a no-op, so tests and the
//!   CLI need no setup

pub mod logging;
pub mod metrics;
