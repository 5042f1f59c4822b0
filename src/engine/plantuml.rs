use std::collections::HashMap;
use std::io::{Read, Write as _};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::Mutex;

use crate::engine::{Engine, EngineInfo, FormatOptions};
use crate::foundation::config::BrokerConfig;
use crate::foundation::error::{BrokerError, BrokerResult};
use crate::request::model::Format;

const CHILD_POLL: Duration = Duration::from_millis(10);

struct ChildOutput {
    status: ExitStatus,
    stdout: Vec<u8>,
    stderr: Vec<u8>,
}

/// Options for [`PlantUmlEngine`].
#[derive(Clone, Debug)]
pub struct PlantUmlEngineOpts {
    /// Packaged PlantUML jar.
    pub jar_path: PathBuf,
    /// Explicit java binary; see [`resolve_java`].
    pub java_path: Option<PathBuf>,
    /// JVM arguments placed before `-jar`.
    pub jvm_args: Vec<String>,
}

impl PlantUmlEngineOpts {
    pub fn new(jar_path: impl Into<PathBuf>) -> Self {
        Self {
            jar_path: jar_path.into(),
            java_path: None,
            jvm_args: vec!["-Djava.awt.headless=true".to_string()],
        }
    }

    pub fn from_config(cfg: &BrokerConfig) -> Self {
        Self {
            jar_path: cfg.jar_path.clone(),
            java_path: cfg.java_path.clone(),
            jvm_args: cfg.jvm_args.clone(),
        }
    }
}

/// Engine that runs the PlantUML jar on a JVM child process per invocation.
///
/// `start` verifies the jar and boots the JVM once with `-version`; invocations stream the
/// diagram through `-pipe`. Live children, the boot probe included, are tracked so
/// `force_terminate` can kill them.
pub struct PlantUmlEngine {
    opts: PlantUmlEngineOpts,
    java: Mutex<Option<PathBuf>>,
    children: Mutex<HashMap<u64, Child>>,
    next_child: AtomicU64,
    halted: AtomicBool,
}

impl PlantUmlEngine {
    pub fn new(opts: PlantUmlEngineOpts) -> Self {
        Self {
            opts,
            java: Mutex::new(None),
            children: Mutex::new(HashMap::new()),
            next_child: AtomicU64::new(0),
            halted: AtomicBool::new(false),
        }
    }

    fn java(&self) -> BrokerResult<PathBuf> {
        if self.halted.load(Ordering::Acquire) {
            return Err(BrokerError::engine_unavailable(
                "engine was force-terminated",
            ));
        }
        self.java
            .lock()
            .clone()
            .ok_or_else(|| BrokerError::engine_unavailable("engine not started"))
    }

    fn base_command(&self, java: &Path) -> Command {
        let mut cmd = Command::new(java);
        cmd.args(&self.opts.jvm_args)
            .arg("-jar")
            .arg(&self.opts.jar_path);
        cmd
    }

    fn render_args(cmd: &mut Command, options: &FormatOptions) {
        cmd.args(["-pipe", "-charset", "UTF-8"]);
        cmd.arg(match options.format {
            Format::Raster => "-tpng",
            Format::Vector => "-tsvg",
        });
        if let Some(dpi) = options.dpi {
            cmd.arg(format!("-Sdpi={dpi}"));
        }
        if options.scale.is_some() {
            // No command-line equivalent; the injected `scale` directive carries it.
            tracing::trace!("scale hint not applicable on the command line");
        }
    }

    /// Register a spawned child so `force_terminate` can kill it, feed `input` to its stdin and
    /// collect its output once it exits.
    fn run_tracked(&self, mut child: Child, input: Option<&[u8]>) -> BrokerResult<ChildOutput> {
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| BrokerError::render("failed to open plantuml stdout (unexpected)"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| BrokerError::render("failed to open plantuml stderr (unexpected)"))?;
        let stdin = child.stdin.take();
        let stdout_drain = drain(stdout);
        let stderr_drain = drain(stderr);

        let id = self.next_child.fetch_add(1, Ordering::Relaxed);
        self.children.lock().insert(id, child);
        if self.halted.load(Ordering::Acquire) {
            if let Some(mut c) = self.children.lock().remove(&id) {
                let _ = c.kill();
                let _ = c.wait();
            }
            return Err(BrokerError::engine_unavailable(
                "engine was force-terminated",
            ));
        }

        if let (Some(mut stdin), Some(input)) = (stdin, input) {
            // A closed pipe here means the child died early; its exit status tells the story.
            if let Err(e) = stdin.write_all(input) {
                tracing::debug!(error = %e, "plantuml closed stdin early");
            }
        }

        let status = self.wait_tracked(id);
        let stdout = join_drain(stdout_drain, "stdout")?;
        let stderr = join_drain(stderr_drain, "stderr")?;
        Ok(ChildOutput {
            status: status?,
            stdout,
            stderr,
        })
    }

    /// Wait for a tracked child, releasing the registry lock between polls so
    /// `force_terminate` can reach it.
    fn wait_tracked(&self, id: u64) -> BrokerResult<ExitStatus> {
        loop {
            {
                let mut children = self.children.lock();
                let Some(child) = children.get_mut(&id) else {
                    return Err(BrokerError::engine_unavailable(
                        "engine was force-terminated during render",
                    ));
                };
                match child.try_wait() {
                    Ok(Some(status)) => {
                        children.remove(&id);
                        return Ok(status);
                    }
                    Ok(None) => {}
                    Err(e) => {
                        if let Some(mut c) = children.remove(&id) {
                            let _ = c.kill();
                        }
                        return Err(BrokerError::render(format!(
                            "failed to wait for plantuml: {e}"
                        )));
                    }
                }
            }
            std::thread::sleep(CHILD_POLL);
        }
    }
}

impl Engine for PlantUmlEngine {
    #[tracing::instrument(skip(self), fields(jar = %self.opts.jar_path.display()))]
    fn start(&self) -> BrokerResult<EngineInfo> {
        if self.halted.load(Ordering::Acquire) {
            return Err(BrokerError::engine_unavailable(
                "engine was force-terminated and cannot be restarted",
            ));
        }
        if !self.opts.jar_path.is_file() {
            return Err(BrokerError::engine_unavailable(format!(
                "PlantUML jar not found: {}",
                self.opts.jar_path.display()
            )));
        }

        let java = resolve_java(self.opts.java_path.as_deref());
        tracing::info!(java = %java.display(), "starting JVM");

        let child = self
            .base_command(&java)
            .arg("-version")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                BrokerError::engine_unavailable(format!(
                    "failed to launch '{}' (is a JRE installed?): {e}",
                    java.display()
                ))
            })?;
        let output = self.run_tracked(child, None)?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(BrokerError::engine_unavailable(format!(
                "JVM exited with status {} while loading the jar: {}",
                output.status,
                stderr.trim()
            )));
        }

        let version = parse_version(&output.stdout).ok_or_else(|| {
            BrokerError::engine_unavailable("failed to resolve PlantUML version from the jar")
        })?;

        let mut resolved = self.java.lock();
        if self.halted.load(Ordering::Acquire) {
            return Err(BrokerError::engine_unavailable(
                "engine was force-terminated while starting",
            ));
        }
        *resolved = Some(java);
        Ok(EngineInfo { version })
    }

    fn invoke(&self, source: &str, options: &FormatOptions) -> BrokerResult<Vec<u8>> {
        let java = self.java()?;
        let mut cmd = self.base_command(&java);
        Self::render_args(&mut cmd, options);
        let child = cmd
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| BrokerError::render(format!("failed to spawn plantuml: {e}")))?;

        let output = self.run_tracked(child, Some(source.as_bytes()))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if output.stdout.is_empty() {
                return Err(BrokerError::render(format!(
                    "plantuml exited with status {}: {}",
                    output.status,
                    stderr.trim()
                )));
            }
            // PlantUML reports syntax errors with a non-zero status but still draws an error
            // image; hand that image to the caller.
            tracing::warn!(
                status = %output.status,
                stderr = %stderr.trim(),
                "plantuml reported a diagram error"
            );
        }
        Ok(output.stdout)
    }

    fn shutdown(&self) -> BrokerResult<()> {
        *self.java.lock() = None;
        let leftover = self.children.lock().len();
        if leftover > 0 {
            tracing::warn!(leftover, "shutdown with plantuml children still running");
        }
        Ok(())
    }

    fn force_terminate(&self) {
        self.halted.store(true, Ordering::Release);
        *self.java.lock() = None;
        let children = std::mem::take(&mut *self.children.lock());
        for (_, mut child) in children {
            if let Err(e) = child.kill() {
                tracing::debug!(error = %e, "plantuml child already gone");
            }
            let _ = child.wait();
        }
    }
}

impl std::fmt::Debug for PlantUmlEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlantUmlEngine")
            .field("opts", &self.opts)
            .field("halted", &self.halted.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

/// Pick the java binary: explicit path, then `$JAVA_HOME/bin/java`, then `java` on PATH.
pub fn resolve_java(explicit: Option<&Path>) -> PathBuf {
    resolve_java_from(explicit, std::env::var_os("JAVA_HOME").map(PathBuf::from))
}

pub(crate) fn resolve_java_from(explicit: Option<&Path>, java_home: Option<PathBuf>) -> PathBuf {
    if let Some(p) = explicit {
        return p.to_path_buf();
    }
    if let Some(home) = java_home {
        let bin = home
            .join("bin")
            .join(if cfg!(windows) { "java.exe" } else { "java" });
        if bin.is_file() {
            return bin;
        }
    }
    PathBuf::from("java")
}

/// First non-empty line of `-version` output, e.g. `PlantUML version 1.2024.7 (...)`.
pub(crate) fn parse_version(stdout: &[u8]) -> Option<String> {
    String::from_utf8_lossy(stdout)
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .map(str::to_string)
}

fn drain(mut r: impl Read + Send + 'static) -> JoinHandle<std::io::Result<Vec<u8>>> {
    std::thread::spawn(move || {
        let mut buf = Vec::new();
        r.read_to_end(&mut buf)?;
        Ok(buf)
    })
}

fn join_drain(h: JoinHandle<std::io::Result<Vec<u8>>>, what: &str) -> BrokerResult<Vec<u8>> {
    h.join()
        .map_err(|_| BrokerError::render(format!("plantuml {what} drain thread panicked")))?
        .map_err(|e| BrokerError::render(format!("plantuml {what} read failed: {e}")))
}

#[cfg(test)]
#[path = "../../tests/unit/engine/plantuml.rs"]
mod tests;
