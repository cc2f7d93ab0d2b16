//! Resilience helpers.
//!
//! # Data Flow
//! ```text
//! Volume event:
//!     → retries.rs (handler invoked up to N times, fixed sleep between)
//!
//! Command channel call:
//!     → timeouts.rs (per-call deadline, independent of the retry timer)
//! ```
//!
//! # Design Decisions
//! - Retries use a fixed interval with no backoff
//! - Every external call has its own deadline

pub mod retries;
pub mod timeouts;

pub use retries::FixedRetry;
pub use timeouts::{with_timeout, Elapsed};
