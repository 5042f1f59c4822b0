use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::Context as _;

use crate::foundation::error::{BrokerError, BrokerResult};
use crate::request::fingerprint::Fingerprint;
use crate::request::model::Format;

/// Directory holding convenience copies of rendered artifacts.
///
/// Files are named `diagram_<fingerprint>.<ext>`, so re-rendering a fingerprint overwrites its
/// file. Stale files from earlier runs are left alone. The bytes returned to callers stay
/// authoritative; these copies are not.
#[derive(Debug)]
pub struct ScratchDir {
    root: PathBuf,
    tmp_seq: AtomicU64,
}

impl ScratchDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            tmp_seq: AtomicU64::new(0),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, fingerprint: &Fingerprint, format: Format) -> PathBuf {
        self.root.join(fingerprint.artifact_name(format))
    }

    /// Write `bytes` to the artifact path for `fingerprint`.
    ///
    /// The write goes through a unique temp file and a rename, so concurrent writers of the
    /// same fingerprint never leave a torn file behind.
    pub fn write(
        &self,
        fingerprint: &Fingerprint,
        format: Format,
        bytes: &[u8],
    ) -> BrokerResult<PathBuf> {
        let path = self.path_for(fingerprint, format);
        self.write_at(&path, bytes)
            .map_err(|e| BrokerError::cache_io(format!("{}: {e:#}", path.display())))?;
        Ok(path)
    }

    fn write_at(&self, path: &Path, bytes: &[u8]) -> anyhow::Result<()> {
        std::fs::create_dir_all(&self.root).with_context(|| {
            format!("failed to create scratch directory '{}'", self.root.display())
        })?;
        let seq = self.tmp_seq.fetch_add(1, Ordering::Relaxed);
        let tmp = path.with_extension(format!("tmp-{}-{seq}", std::process::id()));
        std::fs::write(&tmp, bytes).context("failed to write artifact")?;
        if let Err(e) = std::fs::rename(&tmp, path) {
            let _ = std::fs::remove_file(&tmp);
            return Err(e).context("failed to move artifact into place");
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/render/artifact.rs"]
mod tests;
