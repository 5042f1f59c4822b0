use std::path::PathBuf;

use crate::request::fingerprint::Fingerprint;
use crate::request::model::Format;

/// Outcome of a successful render.
///
/// `bytes` is owned by the result; callers take it with [`RenderResult::into_bytes`].
#[derive(Clone, Debug, PartialEq)]
pub struct RenderResult {
    pub format: Format,
    pub fingerprint: Fingerprint,
    /// Convenience copy on disk. May be missing when `degraded` is set.
    pub artifact_path: PathBuf,
    pub bytes: Vec<u8>,
    /// SVG text, vector output only and only when the bytes are valid UTF-8.
    pub vector_text: Option<String>,
    /// Served from the content cache without invoking the engine.
    pub cache_hit: bool,
    /// Best-effort step that failed without failing the render (artifact write).
    pub degraded: Option<String>,
}

impl RenderResult {
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// Pixel size of a raster result; `None` for vector output or undecodable bytes.
    pub fn raster_size(&self) -> Option<(u32, u32)> {
        if self.format != Format::Raster {
            return None;
        }
        image::load_from_memory_with_format(&self.bytes, image::ImageFormat::Png)
            .ok()
            .map(|img| (img.width(), img.height()))
    }
}

/// Best-effort text view of vector output.
pub(crate) fn decode_vector_text(format: Format, bytes: &[u8]) -> Option<String> {
    match format {
        Format::Vector => std::str::from_utf8(bytes).ok().map(str::to_string),
        Format::Raster => None,
    }
}
