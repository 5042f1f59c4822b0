//! Rendering: executor for cache misses and the broker that fronts it.

/// Scratch directory for artifact copies.
pub mod artifact;
/// Broker lifecycle, caching policy and shutdown.
pub mod broker;
/// Engine invocation for cache misses.
pub mod executor;
/// Render outcome type.
pub mod result;

pub use artifact::ScratchDir;
pub use broker::{BrokerState, BrokerStats, RenderBroker, RenderBrokerOpts, ShutdownOutcome};
pub use executor::RenderExecutor;
pub use result::RenderResult;
