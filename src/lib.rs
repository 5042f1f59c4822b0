//! umlbroker renders PlantUML diagram source to PNG or SVG by driving the PlantUML engine.
//!
//! The engine is slow to start, lives once per process and repeats identical work happily, so
//! every call goes through a [`RenderBroker`]:
//!
//! - the engine is started lazily and exactly once ([`EngineHost`])
//! - requests are normalized and fingerprinted ([`request`])
//! - results are kept in a bounded LRU keyed by fingerprint ([`ContentCache`])
//! - shutdown drains in-flight renders and falls back to halting the engine
//!
//! [`LivePreview`] adds editor-style scheduling on top: debounced edits and a single render in
//! flight per stream.
#![forbid(unsafe_code)]

mod foundation;

pub mod cache;
pub mod engine;
pub mod preview;
pub mod render;
pub mod request;

pub use crate::foundation::cancel::CancellationToken;
pub use crate::foundation::config::{BrokerConfig, QualityPreset};
pub use crate::foundation::error::{BrokerError, BrokerResult};

pub use crate::cache::{CacheEntry, ContentCache};
pub use crate::engine::{
    Engine, EngineHandle, EngineHost, EngineInfo, EngineState, FormatOptions, PlantUmlEngine,
    PlantUmlEngineOpts, RecordingEngine,
};
pub use crate::preview::{LivePreview, PreviewEvent, PreviewOpts, SkipReason};
pub use crate::render::{
    BrokerState, BrokerStats, RenderBroker, RenderBrokerOpts, RenderResult, ShutdownOutcome,
};
pub use crate::request::{Fingerprint, Format, NormalizedRequest, RenderRequest, normalize};
