use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::cache::content::{CacheEntry, ContentCache, DEFAULT_CAPACITY};
use crate::engine::{EngineHandle, EngineHost, PlantUmlEngine, PlantUmlEngineOpts};
use crate::foundation::cancel::CancellationToken;
use crate::foundation::config::BrokerConfig;
use crate::foundation::error::{BrokerError, BrokerResult};
use crate::render::artifact::ScratchDir;
use crate::render::executor::RenderExecutor;
use crate::render::result::RenderResult;
use crate::request::fingerprint::Fingerprint;
use crate::request::model::RenderRequest;
use crate::request::normalize::{NormalizedRequest, normalize};

/// Options for constructing a [`RenderBroker`].
#[derive(Clone, Debug)]
pub struct RenderBrokerOpts {
    /// Content cache capacity (entries).
    pub cache_capacity: usize,
    /// Directory for artifact copies.
    pub scratch_dir: PathBuf,
}

impl Default for RenderBrokerOpts {
    fn default() -> Self {
        Self {
            cache_capacity: DEFAULT_CAPACITY,
            scratch_dir: BrokerConfig::default().scratch_dir(),
        }
    }
}

impl RenderBrokerOpts {
    pub fn from_config(cfg: &BrokerConfig) -> Self {
        Self {
            cache_capacity: cfg.cache_capacity,
            scratch_dir: cfg.scratch_dir(),
        }
    }
}

/// Broker lifecycle. There is no way back to `Uninitialized`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BrokerState {
    /// No render has brought the engine up yet.
    Uninitialized,
    /// The engine answered `ensure_ready` at least once.
    Ready,
    /// `shutdown` is draining in-flight renders.
    ShuttingDown,
    /// Engine torn down; every further render fails with `Terminated`.
    Terminated,
}

/// How `shutdown` ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShutdownOutcome {
    /// In-flight renders drained in time and the engine shut down cleanly.
    Graceful,
    /// Renders were still running (or graceful teardown failed); the engine was halted.
    Forced,
    /// Another call already shut the broker down.
    AlreadyShutDown,
}

/// Counters since construction.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BrokerStats {
    /// Renders admitted past the lifecycle check.
    pub renders: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    /// Executor runs, i.e. calls that reached the engine.
    pub engine_invocations: u64,
    /// Renders that returned an error after admission.
    pub failures: u64,
    /// Artifact copies that could not be written.
    pub degraded_writes: u64,
}

#[derive(Debug, Default)]
struct Counters {
    renders: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    engine_invocations: AtomicU64,
    failures: AtomicU64,
    degraded_writes: AtomicU64,
}

impl Counters {
    fn bump(c: &AtomicU64) {
        c.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> BrokerStats {
        BrokerStats {
            renders: self.renders.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            engine_invocations: self.engine_invocations.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            degraded_writes: self.degraded_writes.load(Ordering::Relaxed),
        }
    }
}

struct Lifecycle {
    state: BrokerState,
    inflight: usize,
}

/// Front door for rendering: readiness, normalization, caching and execution.
///
/// The cache lock covers lookups and inserts only. Engine work runs outside it, so distinct
/// diagrams render in parallel; two concurrent misses on the same fingerprint both render and
/// the later insert wins.
pub struct RenderBroker {
    engine: EngineHandle,
    executor: RenderExecutor,
    cache: ContentCache,
    lifecycle: Mutex<Lifecycle>,
    drained: Condvar,
    cancel: CancellationToken,
    counters: Counters,
}

impl RenderBroker {
    pub fn new(engine: EngineHandle, opts: RenderBrokerOpts) -> BrokerResult<Self> {
        let cache = ContentCache::new(opts.cache_capacity)?;
        let executor = RenderExecutor::new(Arc::clone(&engine), ScratchDir::new(opts.scratch_dir));
        Ok(Self {
            engine,
            executor,
            cache,
            lifecycle: Mutex::new(Lifecycle {
                state: BrokerState::Uninitialized,
                inflight: 0,
            }),
            drained: Condvar::new(),
            cancel: CancellationToken::new(),
            counters: Counters::default(),
        })
    }

    /// Broker backed by the PlantUML jar named in `cfg`.
    pub fn from_config(cfg: &BrokerConfig) -> BrokerResult<Self> {
        cfg.validate()?;
        let engine = PlantUmlEngine::new(PlantUmlEngineOpts::from_config(cfg));
        let host = Arc::new(EngineHost::new(Arc::new(engine)));
        Self::new(host, RenderBrokerOpts::from_config(cfg))
    }

    pub fn engine(&self) -> &EngineHandle {
        &self.engine
    }

    pub fn cache(&self) -> &ContentCache {
        &self.cache
    }

    pub fn state(&self) -> BrokerState {
        self.lifecycle.lock().state
    }

    pub fn stats(&self) -> BrokerStats {
        self.counters.snapshot()
    }

    /// Token raised when shutdown begins.
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Bring the engine up ahead of the first render.
    pub fn warm_up(&self) -> BrokerResult<()> {
        let _inflight = self.admit()?;
        self.ensure_ready()
    }

    /// Render a request, serving identical requests from the cache.
    #[tracing::instrument(skip(self, request), fields(format = %request.format))]
    pub fn render(&self, request: &RenderRequest) -> BrokerResult<RenderResult> {
        let _inflight = self.admit()?;
        Counters::bump(&self.counters.renders);
        let res = self.render_admitted(request);
        if let Err(e) = &res {
            Counters::bump(&self.counters.failures);
            tracing::debug!(error = %e, "render failed");
        }
        res
    }

    /// Render from a format name; anything but `png`/`svg` fails with `UnsupportedFormat`
    /// before the engine is touched.
    pub fn render_named(
        &self,
        source_text: &str,
        format: &str,
        dpi: Option<u32>,
        scale: Option<f64>,
    ) -> BrokerResult<RenderResult> {
        let request = RenderRequest::parse(source_text, format, dpi, scale)?;
        self.render(&request)
    }

    /// Render with a caller deadline.
    ///
    /// Expiry only withdraws interest: the render keeps going on its helper thread and still
    /// fills the cache when it finishes.
    pub fn render_with_deadline(
        self: &Arc<Self>,
        request: RenderRequest,
        deadline: Duration,
    ) -> BrokerResult<RenderResult> {
        let (tx, rx) = mpsc::channel();
        let broker = Arc::clone(self);
        std::thread::Builder::new()
            .name("umlbroker-render".to_string())
            .spawn(move || {
                let _ = tx.send(broker.render(&request));
            })
            .map_err(|e| BrokerError::Other(anyhow::Error::new(e)))?;

        match rx.recv_timeout(deadline) {
            Ok(res) => res,
            Err(mpsc::RecvTimeoutError::Timeout) => Err(BrokerError::Timeout(deadline)),
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(BrokerError::render(
                "render thread exited without a result",
            )),
        }
    }

    /// Stop accepting renders, wait up to `grace` for in-flight ones, then tear the engine
    /// down, forcefully if they did not drain.
    pub fn shutdown(&self, grace: Duration) -> ShutdownOutcome {
        let drained = {
            let mut lc = self.lifecycle.lock();
            if matches!(
                lc.state,
                BrokerState::ShuttingDown | BrokerState::Terminated
            ) {
                return ShutdownOutcome::AlreadyShutDown;
            }
            lc.state = BrokerState::ShuttingDown;
            self.cancel.cancel();

            let deadline = Instant::now() + grace;
            while lc.inflight > 0 {
                if self.drained.wait_until(&mut lc, deadline).timed_out() {
                    break;
                }
            }
            if lc.inflight > 0 {
                tracing::warn!(
                    inflight = lc.inflight,
                    "renders still running after {grace:?}"
                );
            }
            lc.inflight == 0
        };

        let outcome = if drained {
            match self.engine.shutdown() {
                Ok(()) => ShutdownOutcome::Graceful,
                Err(_) => {
                    self.engine.force_terminate();
                    ShutdownOutcome::Forced
                }
            }
        } else {
            self.engine.force_terminate();
            ShutdownOutcome::Forced
        };

        self.lifecycle.lock().state = BrokerState::Terminated;
        tracing::info!(?outcome, "broker terminated");
        outcome
    }

    fn render_admitted(&self, request: &RenderRequest) -> BrokerResult<RenderResult> {
        self.ensure_ready()?;

        let normalized = normalize(request);
        let fingerprint = normalized.fingerprint();

        if let Some(entry) = self.cache.get(&fingerprint) {
            Counters::bump(&self.counters.cache_hits);
            tracing::debug!(%fingerprint, "cache hit");
            return Ok(self.serve_hit(&normalized, entry));
        }
        Counters::bump(&self.counters.cache_misses);
        tracing::debug!(%fingerprint, "cache miss");

        if self.cancel.is_cancelled() {
            return Err(BrokerError::Terminated);
        }

        Counters::bump(&self.counters.engine_invocations);
        let result = self.executor.execute(&normalized, fingerprint)?;
        if result.degraded.is_some() {
            Counters::bump(&self.counters.degraded_writes);
        }

        if let Some(evicted) = self.cache.put(
            fingerprint,
            Arc::new(result.bytes.clone()),
            result.vector_text.clone(),
        ) {
            tracing::debug!(%evicted, "evicted least-recently-used artifact");
        }
        Ok(result)
    }

    fn serve_hit(&self, req: &NormalizedRequest, entry: CacheEntry) -> RenderResult {
        let fingerprint: Fingerprint = entry.fingerprint;
        let scratch = self.executor.scratch();
        let (artifact_path, degraded) = match scratch.write(&fingerprint, req.format, &entry.bytes)
        {
            Ok(p) => (p, None),
            Err(e) => {
                Counters::bump(&self.counters.degraded_writes);
                tracing::warn!(error = %e, "skipping artifact copy for cached render");
                (scratch.path_for(&fingerprint, req.format), Some(e.to_string()))
            }
        };
        RenderResult {
            format: req.format,
            fingerprint,
            artifact_path,
            bytes: entry.bytes.as_ref().clone(),
            vector_text: entry.vector_text,
            cache_hit: true,
            degraded,
        }
    }

    fn ensure_ready(&self) -> BrokerResult<()> {
        self.engine.ensure_ready()?;
        let mut lc = self.lifecycle.lock();
        if lc.state == BrokerState::Uninitialized {
            lc.state = BrokerState::Ready;
        }
        Ok(())
    }

    fn admit(&self) -> BrokerResult<InflightGuard<'_>> {
        let mut lc = self.lifecycle.lock();
        match lc.state {
            BrokerState::ShuttingDown | BrokerState::Terminated => Err(BrokerError::Terminated),
            BrokerState::Uninitialized | BrokerState::Ready => {
                lc.inflight += 1;
                Ok(InflightGuard { broker: self })
            }
        }
    }
}

impl std::fmt::Debug for RenderBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderBroker")
            .field("state", &self.state())
            .field("cache", &self.cache)
            .field("engine", &self.engine)
            .finish_non_exhaustive()
    }
}

struct InflightGuard<'a> {
    broker: &'a RenderBroker,
}

impl Drop for InflightGuard<'_> {
    fn drop(&mut self) {
        let mut lc = self.broker.lifecycle.lock();
        lc.inflight -= 1;
        if lc.inflight == 0 {
            self.broker.drained.notify_all();
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/render/broker.rs"]
mod tests;
