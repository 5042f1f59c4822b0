use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use crate::engine::{Engine, EngineInfo, FormatOptions};
use crate::foundation::error::{BrokerError, BrokerResult};

/// Lifecycle of the hosted engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EngineState {
    /// `start` has not succeeded yet. A failed start leaves the host here so a later call can
    /// attempt a fresh start.
    NotStarted,
    /// `start` is booting the engine.
    Starting,
    /// Started and resolved.
    Running,
    /// Torn down gracefully.
    Stopped,
    /// Halted by `force_terminate`.
    Terminated,
}

/// Owns the one live engine and serializes its lifecycle transitions.
///
/// Concurrent `ensure_ready` calls converge: the first one starts the engine while the rest wait
/// for it to settle and then observe `Running`.
pub struct EngineHost {
    engine: Arc<dyn Engine>,
    lifecycle: Mutex<Lifecycle>,
    /// Signalled whenever a boot leaves `Starting`.
    settled: Condvar,
}

struct Lifecycle {
    state: EngineState,
    info: Option<EngineInfo>,
}

impl EngineHost {
    pub fn new(engine: Arc<dyn Engine>) -> Self {
        Self {
            engine,
            lifecycle: Mutex::new(Lifecycle {
                state: EngineState::NotStarted,
                info: None,
            }),
            settled: Condvar::new(),
        }
    }

    pub fn state(&self) -> EngineState {
        self.lifecycle.lock().state
    }

    /// Version and entry points resolved by the last successful start.
    pub fn info(&self) -> Option<EngineInfo> {
        self.lifecycle.lock().info.clone()
    }

    /// Start the engine unless it is already running.
    ///
    /// The engine boots outside the lifecycle lock. Concurrent callers wait for that boot
    /// instead of starting a second one, and a boot that finishes after `force_terminate`
    /// never makes the host `Running`.
    #[tracing::instrument(skip(self))]
    pub fn start(&self) -> BrokerResult<EngineInfo> {
        {
            let mut lc = self.lifecycle.lock();
            loop {
                match lc.state {
                    EngineState::Running => return Ok(lc.info.clone().unwrap_or_default()),
                    EngineState::Stopped | EngineState::Terminated => {
                        return Err(BrokerError::engine_unavailable(
                            "engine has been shut down and cannot be restarted",
                        ));
                    }
                    EngineState::Starting => self.settled.wait(&mut lc),
                    EngineState::NotStarted => break,
                }
            }
            lc.state = EngineState::Starting;
        }

        let booted = self.engine.start().map_err(|e| match e {
            BrokerError::EngineUnavailable(_) => e,
            other => BrokerError::engine_unavailable(other.to_string()),
        });

        let mut lc = self.lifecycle.lock();
        let res = match (lc.state, booted) {
            (EngineState::Starting, Ok(info)) => {
                tracing::info!(version = %info.version, "engine started");
                lc.state = EngineState::Running;
                lc.info = Some(info.clone());
                Ok(info)
            }
            (EngineState::Starting, Err(e)) => {
                lc.state = EngineState::NotStarted;
                Err(e)
            }
            (_, _) => Err(BrokerError::engine_unavailable(
                "engine was force-terminated while starting",
            )),
        };
        self.settled.notify_all();
        res
    }

    /// No-op once the engine is running.
    pub fn ensure_ready(&self) -> BrokerResult<()> {
        if self.state() == EngineState::Running {
            return Ok(());
        }
        self.start().map(|_| ())
    }

    /// Best-effort attachment of the current thread to the engine context.
    pub fn attach_current_thread(&self) {
        if let Err(e) = self.engine.attach_current_thread() {
            tracing::debug!(error = %e, "thread attach failed; relying on engine auto-attach");
        }
    }

    pub fn invoke(&self, source: &str, options: &FormatOptions) -> BrokerResult<Vec<u8>> {
        match self.state() {
            EngineState::Running => {}
            EngineState::NotStarted | EngineState::Starting => {
                return Err(BrokerError::engine_unavailable("engine not started"));
            }
            EngineState::Stopped | EngineState::Terminated => {
                return Err(BrokerError::engine_unavailable("engine has been shut down"));
            }
        }
        self.attach_current_thread();
        self.engine.invoke(source, options)
    }

    /// Graceful teardown. A host that never started has nothing to tear down; a boot in
    /// progress is allowed to settle first.
    pub fn shutdown(&self) -> BrokerResult<()> {
        let mut lc = self.lifecycle.lock();
        while lc.state == EngineState::Starting {
            self.settled.wait(&mut lc);
        }
        if lc.state != EngineState::Running {
            if lc.state == EngineState::NotStarted {
                lc.state = EngineState::Stopped;
            }
            return Ok(());
        }
        let res = self.engine.shutdown();
        lc.state = EngineState::Stopped;
        match &res {
            Ok(()) => tracing::info!("engine shut down"),
            Err(e) => tracing::warn!(error = %e, "engine shutdown reported an error"),
        }
        res
    }

    /// Halt the engine without waiting for in-flight work or a boot in progress.
    ///
    /// The host is `Terminated` on return. A `start` still booting fails with
    /// `EngineUnavailable` once its engine call returns.
    pub fn force_terminate(&self) {
        tracing::warn!("force-terminating engine");
        self.engine.force_terminate();
        self.lifecycle.lock().state = EngineState::Terminated;
        self.settled.notify_all();
    }
}

impl std::fmt::Debug for EngineHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineHost")
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[path = "../../tests/unit/engine/host.rs"]
mod tests;
