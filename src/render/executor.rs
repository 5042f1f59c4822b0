use crate::engine::{EngineHandle, FormatOptions};
use crate::foundation::error::{BrokerError, BrokerResult};
use crate::render::artifact::ScratchDir;
use crate::render::result::{RenderResult, decode_vector_text};
use crate::request::fingerprint::Fingerprint;
use crate::request::normalize::NormalizedRequest;

/// Runs the engine for cache misses and materializes the output.
///
/// The executor does not own the cache; the broker inserts what it returns.
#[derive(Debug)]
pub struct RenderExecutor {
    engine: EngineHandle,
    scratch: ScratchDir,
}

impl RenderExecutor {
    pub fn new(engine: EngineHandle, scratch: ScratchDir) -> Self {
        Self { engine, scratch }
    }

    pub fn scratch(&self) -> &ScratchDir {
        &self.scratch
    }

    pub fn execute(
        &self,
        req: &NormalizedRequest,
        fingerprint: Fingerprint,
    ) -> BrokerResult<RenderResult> {
        let options = FormatOptions::for_request(req);
        let bytes = self
            .engine
            .invoke(&req.source, &options)
            .map_err(|e| match e {
                BrokerError::EngineUnavailable(_) | BrokerError::Render(_) => e,
                other => BrokerError::render(other.to_string()),
            })?;

        // The engine usually draws an error image instead of failing, so no output at all
        // means it could not make sense of the diagram.
        if bytes.is_empty() {
            return Err(BrokerError::render(
                "engine produced no output; check the diagram for syntax errors or unsupported directives",
            ));
        }

        let (artifact_path, degraded) = match self.scratch.write(&fingerprint, req.format, &bytes) {
            Ok(p) => (p, None),
            Err(e) => {
                tracing::warn!(error = %e, "artifact write failed; returning in-memory bytes");
                (
                    self.scratch.path_for(&fingerprint, req.format),
                    Some(e.to_string()),
                )
            }
        };

        let vector_text = decode_vector_text(req.format, &bytes);
        Ok(RenderResult {
            format: req.format,
            fingerprint,
            artifact_path,
            bytes,
            vector_text,
            cache_hit: false,
            degraded,
        })
    }
}

#[cfg(test)]
#[path = "../../tests/unit/render/executor.rs"]
mod tests;
