use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::foundation::error::{BrokerError, BrokerResult};
use crate::request::normalize::is_usable_scale;

/// Output format understood by the engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Format {
    /// PNG raster output. The only format where `dpi` applies.
    #[serde(rename = "png")]
    Raster,
    /// SVG vector output.
    #[serde(rename = "svg")]
    Vector,
}

impl Format {
    /// File extension used for artifacts, also the engine's format name.
    pub fn extension(self) -> &'static str {
        match self {
            Self::Raster => "png",
            Self::Vector => "svg",
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for Format {
    type Err = BrokerError;

    fn from_str(s: &str) -> BrokerResult<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "png" | "raster" => Ok(Self::Raster),
            "svg" | "vector" => Ok(Self::Vector),
            other => Err(BrokerError::unsupported_format(other.to_string())),
        }
    }
}

/// One caller request: diagram source plus quality options.
#[derive(Clone, Debug, PartialEq)]
pub struct RenderRequest {
    pub source_text: String,
    pub format: Format,
    pub dpi: Option<u32>,
    pub scale: Option<f64>,
}

impl RenderRequest {
    pub fn new(source_text: impl Into<String>, format: Format) -> Self {
        Self {
            source_text: source_text.into(),
            format,
            dpi: None,
            scale: None,
        }
    }

    /// Build a request from a format name, failing with `UnsupportedFormat` for anything
    /// other than `png`/`svg` and with `InvalidRequest` for a bad scale.
    pub fn parse(
        source_text: impl Into<String>,
        format: &str,
        dpi: Option<u32>,
        scale: Option<f64>,
    ) -> BrokerResult<Self> {
        let format = format.parse::<Format>()?;
        let request = Self {
            source_text: source_text.into(),
            format,
            dpi,
            scale,
        };
        request.validate()?;
        Ok(request)
    }

    /// Reject a scale that is not a finite positive number.
    pub fn validate(&self) -> BrokerResult<()> {
        match self.scale {
            Some(s) if !is_usable_scale(s) => Err(BrokerError::invalid_request(format!(
                "scale must be a finite positive number, got {s}"
            ))),
            _ => Ok(()),
        }
    }

    pub fn with_dpi(mut self, dpi: u32) -> Self {
        self.dpi = Some(dpi);
        self
    }

    pub fn with_scale(mut self, scale: f64) -> Self {
        self.scale = Some(scale);
        self
    }
}
