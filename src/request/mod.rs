//! Request model, normalization and content fingerprinting.
//!
//! Normalization is pure: the same [`RenderRequest`] always yields the same
//! [`NormalizedRequest`] and therefore the same [`Fingerprint`].

pub mod fingerprint;
pub mod model;
pub mod normalize;

pub use fingerprint::Fingerprint;
pub use model::{Format, RenderRequest};
pub use normalize::{END_MARKER, NormalizedRequest, START_MARKER, is_usable_scale, normalize};
