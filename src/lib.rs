//! Database configuration rollout: diffing config bundles, deciding restart
//! versus online update, driving per-pod rollouts, and the sidecar that
//! reloads each replica.

// Core
pub mod diff;
pub mod parser;
pub mod policy;
pub mod reconcile;

// Sidecar
pub mod reload;
pub mod server;
pub mod updater;
pub mod watcher;

// Cross-cutting concerns
pub mod config;
pub mod lifecycle;
pub mod observability;
pub mod resilience;

pub use config::ManagerConfig;
pub use diff::{ConfigBundle, ConfigPatch, ConfigSnapshot, ConfigVersion};
pub use lifecycle::Shutdown;
pub use policy::{PolicyRegistry, ReconfigurePolicy, ReturnedStatus};
pub use reconcile::Reconciler;
