use std::io::Cursor;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::engine::{Engine, EngineInfo, FormatOptions};
use crate::foundation::error::{BrokerError, BrokerResult};
use crate::request::model::Format;

/// In-memory engine for tests and debugging.
///
/// Produces a small real PNG for raster requests and an SVG document echoing the source for
/// vector requests. Every call is counted and every received source is captured. Failure modes
/// and blocking are scripted through the builder methods.
#[derive(Debug, Default)]
pub struct RecordingEngine {
    state: Mutex<Recorded>,
    cond: Condvar,
    script: Script,
}

#[derive(Debug, Default)]
struct Script {
    fail_start: Option<String>,
    fail_invoke: Option<String>,
    empty_output: bool,
    block_invocations: bool,
    block_start: bool,
    fail_attach: bool,
}

#[derive(Debug, Default)]
struct Recorded {
    starts: usize,
    shutdowns: usize,
    force_terminations: usize,
    attaches: usize,
    entered: usize,
    completed: usize,
    sources: Vec<String>,
    options: Vec<FormatOptions>,
    released: bool,
    halted: bool,
}

/// Version string reported by [`RecordingEngine::start`].
pub const RECORDING_ENGINE_VERSION: &str = "recording-engine 1.0";

impl RecordingEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `start` fail with `EngineUnavailable(msg)`.
    pub fn failing_start(mut self, msg: impl Into<String>) -> Self {
        self.script.fail_start = Some(msg.into());
        self
    }

    /// Make every invocation fail with `Render(msg)`.
    pub fn failing_invoke(mut self, msg: impl Into<String>) -> Self {
        self.script.fail_invoke = Some(msg.into());
        self
    }

    /// Make every invocation succeed with zero bytes.
    pub fn empty_output(mut self) -> Self {
        self.script.empty_output = true;
        self
    }

    /// Make `attach_current_thread` fail.
    pub fn failing_attach(mut self) -> Self {
        self.script.fail_attach = true;
        self
    }

    /// Park every invocation until [`RecordingEngine::release`] or `force_terminate`.
    pub fn blocking(mut self) -> Self {
        self.script.block_invocations = true;
        self
    }

    /// Park `start` until [`RecordingEngine::release`]. Unlike parked invocations, a parked
    /// boot ignores `force_terminate`, like a JVM that never answers.
    pub fn blocking_start(mut self) -> Self {
        self.script.block_start = true;
        self
    }

    /// Let parked and future calls proceed.
    pub fn release(&self) {
        self.state.lock().released = true;
        self.cond.notify_all();
    }

    pub fn starts(&self) -> usize {
        self.state.lock().starts
    }

    pub fn shutdowns(&self) -> usize {
        self.state.lock().shutdowns
    }

    pub fn force_terminations(&self) -> usize {
        self.state.lock().force_terminations
    }

    pub fn attaches(&self) -> usize {
        self.state.lock().attaches
    }

    /// Invocations that reached the engine, including parked ones.
    pub fn invocations(&self) -> usize {
        self.state.lock().entered
    }

    /// Invocations that returned, successfully or not.
    pub fn completed(&self) -> usize {
        self.state.lock().completed
    }

    /// Sources received so far, in arrival order.
    pub fn sources(&self) -> Vec<String> {
        self.state.lock().sources.clone()
    }

    pub fn options(&self) -> Vec<FormatOptions> {
        self.state.lock().options.clone()
    }

    /// Wait until at least `n` invocations have entered the engine.
    pub fn wait_for_invocations(&self, n: usize, timeout: Duration) -> bool {
        self.wait_until(timeout, |st| st.entered >= n)
    }

    /// Wait until at least `n` starts have entered the engine.
    pub fn wait_for_starts(&self, n: usize, timeout: Duration) -> bool {
        self.wait_until(timeout, |st| st.starts >= n)
    }

    fn wait_until(&self, timeout: Duration, done: impl Fn(&Recorded) -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        let mut st = self.state.lock();
        while !done(&st) {
            if self.cond.wait_until(&mut st, deadline).timed_out() {
                return done(&st);
            }
        }
        true
    }

    fn produce(source: &str, options: &FormatOptions) -> BrokerResult<Vec<u8>> {
        match options.format {
            Format::Raster => {
                // Size varies with the input so distinct diagrams give distinct images.
                let width = 8 + (source.len() % 24) as u32;
                let height = 4 + options.dpi.unwrap_or(96) / 96;
                let img = image::RgbaImage::from_pixel(width, height, image::Rgba([255; 4]));
                let mut buf = Vec::new();
                image::DynamicImage::ImageRgba8(img)
                    .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
                    .map_err(|e| BrokerError::render(format!("png encode failed: {e}")))?;
                Ok(buf)
            }
            Format::Vector => {
                let escaped = source
                    .replace('&', "&amp;")
                    .replace('<', "&lt;")
                    .replace('>', "&gt;");
                Ok(format!(
                    "<svg xmlns=\"http://www.w3.org/2000/svg\"><desc>{escaped}</desc></svg>"
                )
                .into_bytes())
            }
        }
    }
}

impl Engine for RecordingEngine {
    fn start(&self) -> BrokerResult<EngineInfo> {
        let mut st = self.state.lock();
        st.starts += 1;
        self.cond.notify_all();
        if self.script.block_start {
            while !st.released {
                self.cond.wait(&mut st);
            }
        }
        if let Some(msg) = &self.script.fail_start {
            return Err(BrokerError::engine_unavailable(msg.clone()));
        }
        Ok(EngineInfo {
            version: RECORDING_ENGINE_VERSION.to_string(),
        })
    }

    fn attach_current_thread(&self) -> BrokerResult<()> {
        self.state.lock().attaches += 1;
        if self.script.fail_attach {
            return Err(BrokerError::engine_unavailable("attach refused"));
        }
        Ok(())
    }

    fn invoke(&self, source: &str, options: &FormatOptions) -> BrokerResult<Vec<u8>> {
        {
            let mut st = self.state.lock();
            if st.halted {
                return Err(BrokerError::engine_unavailable("engine was force-terminated"));
            }
            st.entered += 1;
            st.sources.push(source.to_string());
            st.options.push(*options);
            self.cond.notify_all();

            if self.script.block_invocations {
                while !st.released && !st.halted {
                    self.cond.wait(&mut st);
                }
            }
            if st.halted {
                st.completed += 1;
                return Err(BrokerError::engine_unavailable(
                    "engine was force-terminated during render",
                ));
            }
        }

        let out = if let Some(msg) = &self.script.fail_invoke {
            Err(BrokerError::render(msg.clone()))
        } else if self.script.empty_output {
            Ok(Vec::new())
        } else {
            Self::produce(source, options)
        };
        self.state.lock().completed += 1;
        out
    }

    fn shutdown(&self) -> BrokerResult<()> {
        self.state.lock().shutdowns += 1;
        Ok(())
    }

    fn force_terminate(&self) {
        let mut st = self.state.lock();
        st.force_terminations += 1;
        st.halted = true;
        self.cond.notify_all();
    }
}

#[cfg(test)]
#[path = "../../tests/unit/engine/recording.rs"]
mod tests;
