use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::foundation::cancel::CancellationToken;
use crate::foundation::config::BrokerConfig;
use crate::foundation::error::{BrokerError, BrokerResult};
use crate::preview::detect::{SkipReason, classify};
use crate::render::broker::RenderBroker;
use crate::render::result::RenderResult;
use crate::request::model::{Format, RenderRequest};

/// Default quiescence window before an edit triggers a render.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(500);

/// Options for a [`LivePreview`] stream.
#[derive(Clone, Debug, PartialEq)]
pub struct PreviewOpts {
    pub format: Format,
    pub dpi: Option<u32>,
    pub scale: Option<f64>,
    pub debounce: Duration,
}

impl PreviewOpts {
    pub fn new(format: Format) -> Self {
        Self {
            format,
            dpi: None,
            scale: None,
            debounce: DEFAULT_DEBOUNCE,
        }
    }

    pub fn from_config(cfg: &BrokerConfig, format: Format) -> Self {
        Self {
            debounce: cfg.debounce(),
            ..Self::new(format)
        }
    }
}

/// Outcome of one preview trigger.
#[derive(Debug)]
pub enum PreviewEvent {
    /// The text was not sent to the engine.
    Skipped(SkipReason),
    Rendered(RenderResult),
    /// The render failed; the message is meant to be shown to the user as is.
    Failed(BrokerError),
}

enum Msg {
    Edit(String),
    RenderNow,
    Reconfigure {
        format: Format,
        dpi: Option<u32>,
        scale: Option<f64>,
    },
    Done {
        text: String,
        outcome: BrokerResult<RenderResult>,
    },
    Close,
}

/// Debounced preview stream with at most one render in flight.
///
/// Edits restart the debounce window. When it expires while a render is still running the
/// trigger is dropped, not queued; once that render completes, a single re-trigger renders the
/// latest text and options.
pub struct LivePreview {
    tx: Sender<Msg>,
    scheduler: Option<JoinHandle<()>>,
}

impl LivePreview {
    /// Start the scheduler thread. Outcomes arrive on the returned receiver.
    pub fn spawn(
        broker: Arc<RenderBroker>,
        opts: PreviewOpts,
    ) -> BrokerResult<(Self, Receiver<PreviewEvent>)> {
        let (tx, rx) = mpsc::channel();
        let (events_tx, events_rx) = mpsc::channel();
        let scheduler = Scheduler {
            broker,
            opts,
            events: events_tx,
            self_tx: tx.clone(),
            latest: None,
            due: None,
            job: None,
            missed: false,
        };
        let handle = std::thread::Builder::new()
            .name("umlbroker-preview".to_string())
            .spawn(move || scheduler.run(rx))
            .map_err(|e| BrokerError::Other(anyhow::Error::new(e)))?;
        Ok((
            Self {
                tx,
                scheduler: Some(handle),
            },
            events_rx,
        ))
    }

    /// Record an edit; rendering waits for the debounce window to pass without further edits.
    pub fn submit(&self, text: impl Into<String>) {
        let _ = self.tx.send(Msg::Edit(text.into()));
    }

    /// Trigger a render of the latest text now, skipping the debounce window.
    pub fn render_now(&self) {
        let _ = self.tx.send(Msg::RenderNow);
    }

    /// Change output options and re-render the latest text.
    pub fn reconfigure(&self, format: Format, dpi: Option<u32>, scale: Option<f64>) {
        let _ = self.tx.send(Msg::Reconfigure { format, dpi, scale });
    }

    /// Stop the debounce timer, withdraw interest in the running render and join the
    /// scheduler. The render itself is not waited for.
    pub fn close(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        let _ = self.tx.send(Msg::Close);
        if let Some(h) = self.scheduler.take()
            && h.join().is_err()
        {
            tracing::warn!("preview scheduler panicked");
        }
    }
}

impl Drop for LivePreview {
    fn drop(&mut self) {
        self.stop();
    }
}

struct Job {
    token: CancellationToken,
    text: String,
}

struct Scheduler {
    broker: Arc<RenderBroker>,
    opts: PreviewOpts,
    events: Sender<PreviewEvent>,
    self_tx: Sender<Msg>,
    latest: Option<String>,
    due: Option<Instant>,
    job: Option<Job>,
    missed: bool,
}

impl Scheduler {
    fn run(mut self, rx: Receiver<Msg>) {
        loop {
            let msg = match self.due {
                Some(due) => match rx.recv_timeout(due.saturating_duration_since(Instant::now())) {
                    Ok(m) => Some(m),
                    Err(RecvTimeoutError::Timeout) => None,
                    Err(RecvTimeoutError::Disconnected) => break,
                },
                None => match rx.recv() {
                    Ok(m) => Some(m),
                    Err(_) => break,
                },
            };

            match msg {
                None => {
                    self.due = None;
                    self.fire();
                }
                Some(Msg::Edit(text)) => {
                    self.latest = Some(text);
                    self.due = Some(Instant::now() + self.opts.debounce);
                }
                Some(Msg::RenderNow) => self.due = Some(Instant::now()),
                Some(Msg::Reconfigure { format, dpi, scale }) => {
                    self.opts.format = format;
                    self.opts.dpi = dpi;
                    self.opts.scale = scale;
                    self.due = Some(Instant::now());
                }
                Some(Msg::Done { text, outcome }) => self.finish(text, outcome),
                Some(Msg::Close) => break,
            }
        }

        if let Some(job) = self.job.take() {
            job.token.cancel();
        }
    }

    fn fire(&mut self) {
        let Some(text) = self.latest.clone() else {
            return;
        };
        if self.job.is_some() {
            tracing::debug!("render already in flight; dropping trigger");
            self.missed = true;
            return;
        }

        let source = match classify(&text) {
            Ok(t) => t.to_string(),
            Err(reason) => {
                let _ = self.events.send(PreviewEvent::Skipped(reason));
                return;
            }
        };

        let request = RenderRequest {
            source_text: source,
            format: self.opts.format,
            dpi: self.opts.dpi,
            scale: self.opts.scale,
        };
        let broker = Arc::clone(&self.broker);
        let tx = self.self_tx.clone();
        let token = CancellationToken::new();
        let worker_token = token.clone();
        let job_text = text.clone();
        let spawned = std::thread::Builder::new()
            .name("umlbroker-preview-render".to_string())
            .spawn(move || {
                if worker_token.is_cancelled() {
                    return;
                }
                let outcome = broker.render(&request);
                if worker_token.is_cancelled() {
                    tracing::debug!("preview closed while rendering; discarding result");
                    return;
                }
                let _ = tx.send(Msg::Done {
                    text: job_text,
                    outcome,
                });
            });

        match spawned {
            Ok(_) => self.job = Some(Job { token, text }),
            Err(e) => {
                let _ = self
                    .events
                    .send(PreviewEvent::Failed(BrokerError::Other(anyhow::Error::new(e))));
            }
        }
    }

    fn finish(&mut self, text: String, outcome: BrokerResult<RenderResult>) {
        let Some(job) = self.job.take() else {
            return;
        };
        if job.token.is_cancelled() {
            return;
        }
        debug_assert_eq!(job.text, text);

        let event = match outcome {
            Ok(res) => PreviewEvent::Rendered(res),
            Err(e) => PreviewEvent::Failed(e),
        };
        let _ = self.events.send(event);

        // A trigger dropped while the job ran is replayed once, with the latest text.
        if std::mem::take(&mut self.missed) && self.due.is_none() {
            self.due = Some(Instant::now());
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/preview/scheduler.rs"]
mod tests;
