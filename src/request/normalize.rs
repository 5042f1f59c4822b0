use crate::request::fingerprint::{Fingerprint, fingerprint_request};
use crate::request::model::{Format, RenderRequest};

/// Opening marker of a PlantUML diagram.
pub const START_MARKER: &str = "@startuml";
/// Closing marker of a PlantUML diagram.
pub const END_MARKER: &str = "@enduml";

/// Engine-ready request: directives injected and the source well delimited.
#[derive(Clone, Debug, PartialEq)]
pub struct NormalizedRequest {
    pub source: String,
    pub format: Format,
    pub dpi: Option<u32>,
    pub scale: Option<f64>,
}

impl NormalizedRequest {
    pub fn fingerprint(&self) -> Fingerprint {
        fingerprint_request(self)
    }

    /// Resolution hint forwarded to the engine; only raster output carries one.
    pub fn dpi_hint(&self) -> Option<u32> {
        match self.format {
            Format::Raster => self.dpi,
            Format::Vector => None,
        }
    }
}

/// Inject quality directives after the first opening marker, or wrap the whole text in
/// synthetic markers when it has none.
///
/// A scale that is not a finite positive number is dropped rather than injected.
pub fn normalize(request: &RenderRequest) -> NormalizedRequest {
    let scale = request.scale.filter(|s| is_usable_scale(*s));
    let directives = quality_directives(request.format, request.dpi, scale);
    let text = request.source_text.as_str();

    let source = match text.find(START_MARKER) {
        Some(_) if directives.is_empty() => text.to_string(),
        Some(idx) => {
            let end = idx + START_MARKER.len();
            let mut out = String::with_capacity(text.len() + 64);
            out.push_str(&text[..end]);
            out.push('\n');
            out.push_str(&directives.join("\n"));
            out.push('\n');
            out.push_str(&text[end..]);
            out
        }
        None => {
            let mut out = String::with_capacity(text.len() + 64);
            out.push_str(START_MARKER);
            out.push('\n');
            for d in &directives {
                out.push_str(d);
                out.push('\n');
            }
            out.push_str(text);
            out.push('\n');
            out.push_str(END_MARKER);
            out
        }
    };

    NormalizedRequest {
        source,
        format: request.format,
        dpi: request.dpi,
        scale,
    }
}

/// Whether `scale` can be written as a `scale` directive.
pub fn is_usable_scale(scale: f64) -> bool {
    scale.is_finite() && scale > 0.0
}

fn quality_directives(format: Format, dpi: Option<u32>, scale: Option<f64>) -> Vec<String> {
    let mut lines = Vec::with_capacity(2);
    if let (Format::Raster, Some(dpi)) = (format, dpi) {
        lines.push(format!("skinparam dpi {dpi}"));
    }
    if let Some(scale) = scale {
        // Whole numbers keep a trailing `.0` (`scale 2.0`); plain `Display` never uses
        // exponent notation.
        if scale.fract() == 0.0 {
            lines.push(format!("scale {scale:.1}"));
        } else {
            lines.push(format!("scale {scale}"));
        }
    }
    lines
}

#[cfg(test)]
#[path = "../../tests/unit/request/normalize.rs"]
mod tests;
