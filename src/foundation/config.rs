use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context as _;
use serde::{Deserialize, Serialize};

use crate::foundation::error::{BrokerError, BrokerResult};

/// Environment variable overriding [`BrokerConfig::jar_path`].
pub const ENV_JAR: &str = "UMLBROKER_JAR";
/// Environment variable overriding [`BrokerConfig::java_path`].
pub const ENV_JAVA: &str = "UMLBROKER_JAVA";

/// Name of the scratch directory created under the system temp dir.
pub const SCRATCH_DIR_NAME: &str = "PlanUmlUtil";

/// Broker and engine settings.
///
/// Every field has a default, so a JSON config file only needs the keys it overrides.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    /// Location of the packaged PlantUML jar.
    pub jar_path: PathBuf,
    /// Explicit java binary. `None` falls back to `$JAVA_HOME/bin/java`, then `java` on PATH.
    pub java_path: Option<PathBuf>,
    /// Extra JVM arguments placed before `-jar`.
    pub jvm_args: Vec<String>,
    /// Maximum number of cached artifacts.
    pub cache_capacity: usize,
    /// Where artifact copies are written. `None` uses `<temp>/PlanUmlUtil`.
    pub scratch_dir: Option<PathBuf>,
    /// How long shutdown waits for in-flight renders before forcing the engine down.
    pub shutdown_grace_ms: u64,
    /// Quiescence window before a live preview render is triggered.
    pub debounce_ms: u64,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            jar_path: PathBuf::from("jar").join("plantuml.jar"),
            java_path: None,
            jvm_args: vec!["-Djava.awt.headless=true".to_string()],
            cache_capacity: 32,
            scratch_dir: None,
            shutdown_grace_ms: 2000,
            debounce_ms: 500,
        }
    }
}

impl BrokerConfig {
    /// Load a config from a JSON file. Missing keys take their defaults.
    pub fn from_json_file(path: &Path) -> BrokerResult<Self> {
        let f = File::open(path).with_context(|| format!("open config '{}'", path.display()))?;
        let cfg: Self = serde_json::from_reader(BufReader::new(f))
            .map_err(|e| BrokerError::config(format!("parse '{}': {e}", path.display())))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Apply `UMLBROKER_JAR` / `UMLBROKER_JAVA` overrides from the process environment.
    pub fn apply_env(self) -> Self {
        self.apply_env_from(|k| std::env::var_os(k))
    }

    pub(crate) fn apply_env_from(
        mut self,
        lookup: impl Fn(&str) -> Option<std::ffi::OsString>,
    ) -> Self {
        if let Some(jar) = lookup(ENV_JAR).filter(|v| !v.is_empty()) {
            self.jar_path = PathBuf::from(jar);
        }
        if let Some(java) = lookup(ENV_JAVA).filter(|v| !v.is_empty()) {
            self.java_path = Some(PathBuf::from(java));
        }
        self
    }

    pub fn validate(&self) -> BrokerResult<()> {
        if self.cache_capacity == 0 {
            return Err(BrokerError::config("cache_capacity must be non-zero"));
        }
        Ok(())
    }

    pub fn scratch_dir(&self) -> PathBuf {
        self.scratch_dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join(SCRATCH_DIR_NAME))
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

/// Quality presets offered by the editor (dpi, scale).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityPreset {
    /// Caller picks dpi/scale by hand.
    Custom,
    /// 96 dpi, 1x.
    Screen,
    /// 150 dpi, 1x.
    Standard,
    /// 300 dpi, 2x.
    High,
    /// 600 dpi, 2x.
    Print,
}

impl QualityPreset {
    /// Preset `(dpi, scale)`, or `None` for [`QualityPreset::Custom`].
    pub fn dpi_scale(self) -> Option<(u32, f64)> {
        match self {
            Self::Custom => None,
            Self::Screen => Some((96, 1.0)),
            Self::Standard => Some((150, 1.0)),
            Self::High => Some((300, 2.0)),
            Self::Print => Some((600, 2.0)),
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/config.rs"]
mod tests;
