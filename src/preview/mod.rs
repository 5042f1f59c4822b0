//! Live preview scheduling on top of the broker: edit debounce, a single render in flight per
//! stream, and interest-only cancellation on close.

pub mod detect;
pub mod scheduler;

pub use detect::{SkipReason, looks_like_diagram};
pub use scheduler::{DEFAULT_DEBOUNCE, LivePreview, PreviewEvent, PreviewOpts};
