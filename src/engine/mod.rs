//! Engine boundary.
//!
//! The engine is the heavyweight external component that turns normalized diagram source into
//! bytes. It is driven through the [`Engine`] trait and owned by an [`EngineHost`], which
//! enforces the start/ready/shutdown lifecycle. The host is shared as an explicit
//! [`EngineHandle`] instead of living in global state.

/// Lifecycle wrapper around an [`Engine`].
pub mod host;
/// PlantUML jar driven through a JVM child process.
pub mod plantuml;
/// Scriptable in-memory engine for tests and debugging.
pub mod recording;

use std::sync::Arc;

use crate::foundation::error::BrokerResult;
use crate::request::model::Format;
use crate::request::normalize::NormalizedRequest;

pub use host::{EngineHost, EngineState};
pub use plantuml::{PlantUmlEngine, PlantUmlEngineOpts};
pub use recording::RecordingEngine;

/// Shared, explicitly passed handle to the single engine instance.
pub type EngineHandle = Arc<EngineHost>;

/// Output selection plus optional quality hints for one invocation.
///
/// Hints are advisory. An engine that cannot apply one ignores it.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FormatOptions {
    pub format: Format,
    pub dpi: Option<u32>,
    pub scale: Option<f64>,
}

impl FormatOptions {
    pub fn for_request(req: &NormalizedRequest) -> Self {
        Self {
            format: req.format,
            dpi: req.dpi_hint(),
            scale: req.scale,
        }
    }
}

/// What `start` resolved about the running engine.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EngineInfo {
    /// Human readable engine version, e.g. the first line of `plantuml -version`.
    pub version: String,
}

/// Contract for the external rendering runtime.
///
/// Implementations must tolerate `invoke` being called from several threads at once; the broker
/// adds no global invocation lock.
pub trait Engine: Send + Sync {
    /// Boot the runtime and resolve its entry points.
    ///
    /// Fails with `EngineUnavailable` when the packaged resource is missing or the runtime does
    /// not come up.
    fn start(&self) -> BrokerResult<EngineInfo>;

    /// Attach the calling thread to the engine's execution context.
    ///
    /// Called before every invocation. Errors are logged and ignored by the host.
    fn attach_current_thread(&self) -> BrokerResult<()> {
        Ok(())
    }

    /// Render `source` and return the produced bytes.
    fn invoke(&self, source: &str, options: &FormatOptions) -> BrokerResult<Vec<u8>>;

    /// Graceful teardown.
    fn shutdown(&self) -> BrokerResult<()>;

    /// Last-resort halt. The engine is unusable afterwards.
    fn force_terminate(&self);
}
