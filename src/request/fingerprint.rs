use std::fmt;

use sha2::{Digest as _, Sha256};

use crate::request::model::Format;
use crate::request::normalize::NormalizedRequest;

/// Number of digest bytes kept; rendered as 16 hex characters.
pub const FINGERPRINT_LEN: usize = 8;

/// Content address of a normalized request.
///
/// Used as the cache key and as the artifact file name component. Collisions at this length are
/// not detected and behave like cache hits.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint([u8; FINGERPRINT_LEN]);

impl Fingerprint {
    pub fn from_bytes(bytes: [u8; FINGERPRINT_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; FINGERPRINT_LEN] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        let mut out = String::with_capacity(FINGERPRINT_LEN * 2);
        for b in self.0 {
            out.push_str(&format!("{b:02x}"));
        }
        out
    }

    /// Deterministic artifact file name, e.g. `diagram_0123456789abcdef.png`.
    pub fn artifact_name(&self, format: Format) -> String {
        format!("diagram_{}.{}", self.to_hex(), format.extension())
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Digest over `format || dpi || scale || normalized source`.
pub fn fingerprint_request(req: &NormalizedRequest) -> Fingerprint {
    let mut h = StableHasher::new();
    h.write_str(req.format.extension());
    match req.dpi {
        Some(dpi) => {
            h.write_u8(1);
            h.write_u32(dpi);
        }
        None => h.write_u8(0),
    }
    match req.scale {
        Some(scale) => {
            h.write_u8(1);
            h.write_u64(scale.to_bits());
        }
        None => h.write_u8(0),
    }
    h.write_str(&req.source);
    h.finish()
}

struct StableHasher {
    inner: Sha256,
}

impl StableHasher {
    fn new() -> Self {
        Self {
            inner: Sha256::new(),
        }
    }

    fn write_bytes(&mut self, b: &[u8]) {
        self.inner.update(b);
    }

    fn write_u8(&mut self, v: u8) {
        self.write_bytes(&[v]);
    }

    fn write_u32(&mut self, v: u32) {
        self.write_bytes(&v.to_le_bytes());
    }

    fn write_u64(&mut self, v: u64) {
        self.write_bytes(&v.to_le_bytes());
    }

    // Length prefix keeps adjacent fields from running into each other.
    fn write_str(&mut self, s: &str) {
        self.write_u64(s.len() as u64);
        self.write_bytes(s.as_bytes());
    }

    fn finish(self) -> Fingerprint {
        let digest = self.inner.finalize();
        let mut out = [0u8; FINGERPRINT_LEN];
        out.copy_from_slice(&digest[..FINGERPRINT_LEN]);
        Fingerprint(out)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/request/fingerprint.rs"]
mod tests;
