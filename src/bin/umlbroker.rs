use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use anyhow::Context as _;
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;
use umlbroker::request::is_usable_scale;
use umlbroker::{
    BrokerConfig, Format, LivePreview, PreviewEvent, PreviewOpts, QualityPreset, RenderBroker,
    RenderRequest,
};

const WATCH_POLL: Duration = Duration::from_millis(200);

#[derive(Parser, Debug)]
#[command(name = "umlbroker", version)]
struct Cli {
    /// JSON config file; missing keys use defaults.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// PlantUML jar (overrides config and UMLBROKER_JAR).
    #[arg(long, global = true)]
    jar: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Render a diagram file once.
    Render(RenderArgs),
    /// Re-render a diagram file whenever it changes.
    Watch(WatchArgs),
    /// Start the engine and print its version.
    Check,
}

#[derive(Parser, Debug)]
struct QualityArgs {
    /// Output format.
    #[arg(long, value_enum, default_value_t = FormatChoice::Png)]
    format: FormatChoice,

    /// Raster resolution (png only).
    #[arg(long)]
    dpi: Option<u32>,

    /// Diagram scale factor.
    #[arg(long)]
    scale: Option<f64>,

    /// Quality preset; explicit --dpi/--scale win over it.
    #[arg(long, value_enum)]
    preset: Option<PresetChoice>,
}

#[derive(Parser, Debug)]
struct RenderArgs {
    /// Input PlantUML file.
    #[arg(long = "in")]
    in_path: PathBuf,

    /// Output file.
    #[arg(long)]
    out: PathBuf,

    #[command(flatten)]
    quality: QualityArgs,
}

#[derive(Parser, Debug)]
struct WatchArgs {
    /// Input PlantUML file.
    #[arg(long = "in")]
    in_path: PathBuf,

    /// Stop after this many outcomes.
    #[arg(long)]
    max_renders: Option<usize>,

    #[command(flatten)]
    quality: QualityArgs,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum FormatChoice {
    Png,
    Svg,
}

impl From<FormatChoice> for Format {
    fn from(c: FormatChoice) -> Self {
        match c {
            FormatChoice::Png => Format::Raster,
            FormatChoice::Svg => Format::Vector,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum PresetChoice {
    Screen,
    Standard,
    High,
    Print,
}

impl From<PresetChoice> for QualityPreset {
    fn from(c: PresetChoice) -> Self {
        match c {
            PresetChoice::Screen => QualityPreset::Screen,
            PresetChoice::Standard => QualityPreset::Standard,
            PresetChoice::High => QualityPreset::High,
            PresetChoice::Print => QualityPreset::Print,
        }
    }
}

impl QualityArgs {
    fn resolve(&self) -> anyhow::Result<(Format, Option<u32>, Option<f64>)> {
        let preset = self
            .preset
            .and_then(|p| QualityPreset::from(p).dpi_scale());
        let format = Format::from(self.format);
        let dpi = self.dpi.or(preset.map(|(d, _)| d));
        let scale = self.scale.or(preset.map(|(_, s)| s));
        let dpi = match format {
            Format::Raster => dpi,
            Format::Vector => None,
        };
        if let Some(s) = scale
            && !is_usable_scale(s)
        {
            anyhow::bail!("--scale must be a finite positive number, got {s}");
        }
        Ok((format, dpi, scale))
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = load_config(cli.config.as_deref(), cli.jar)?;
    let broker = Arc::new(RenderBroker::from_config(&cfg)?);

    let res = match cli.cmd {
        Command::Render(args) => cmd_render(&broker, args),
        Command::Watch(args) => cmd_watch(&broker, &cfg, args),
        Command::Check => cmd_check(&broker),
    };

    broker.shutdown(cfg.shutdown_grace());
    res
}

fn load_config(path: Option<&Path>, jar: Option<PathBuf>) -> anyhow::Result<BrokerConfig> {
    let mut cfg = match path {
        Some(p) => BrokerConfig::from_json_file(p)?,
        None => BrokerConfig::default(),
    }
    .apply_env();
    if let Some(jar) = jar {
        cfg.jar_path = jar;
    }
    Ok(cfg)
}

fn read_source(path: &Path) -> anyhow::Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("read diagram '{}'", path.display()))
}

fn cmd_render(broker: &RenderBroker, args: RenderArgs) -> anyhow::Result<()> {
    let source = read_source(&args.in_path)?;
    let (format, dpi, scale) = args.quality.resolve()?;
    let req = RenderRequest {
        source_text: source,
        format,
        dpi,
        scale,
    };

    let res = broker.render(&req)?;
    if let Some(parent) = args.out.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create output directory '{}'", parent.display()))?;
    }
    std::fs::write(&args.out, &res.bytes)
        .with_context(|| format!("write output '{}'", args.out.display()))?;

    eprintln!("wrote {} ({} bytes)", args.out.display(), res.bytes.len());
    if let Some((w, h)) = res.raster_size() {
        eprintln!("  size:      {w}x{h}");
    }
    eprintln!("  artifact:  {}", res.artifact_path.display());
    if let Some(note) = &res.degraded {
        eprintln!("  note:      {note}");
    }
    Ok(())
}

fn cmd_watch(broker: &Arc<RenderBroker>, cfg: &BrokerConfig, args: WatchArgs) -> anyhow::Result<()> {
    let (format, dpi, scale) = args.quality.resolve()?;
    let opts = PreviewOpts {
        format,
        dpi,
        scale,
        ..PreviewOpts::from_config(cfg, format)
    };
    let (preview, events) = LivePreview::spawn(Arc::clone(broker), opts)?;

    let mut last_seen: Option<SystemTime> = None;
    let mut outcomes = 0usize;
    loop {
        let modified = match std::fs::metadata(&args.in_path).and_then(|m| m.modified()) {
            Ok(t) => t,
            Err(_) => {
                eprintln!("{} is gone; stopping", args.in_path.display());
                break;
            }
        };
        if last_seen != Some(modified) {
            last_seen = Some(modified);
            preview.submit(read_source(&args.in_path)?);
        }

        while let Ok(ev) = events.try_recv() {
            outcomes += 1;
            match ev {
                PreviewEvent::Rendered(res) => println!(
                    "rendered {} ({} bytes{})",
                    res.artifact_path.display(),
                    res.bytes.len(),
                    if res.cache_hit { ", cached" } else { "" }
                ),
                PreviewEvent::Failed(e) => println!("error: {e}"),
                PreviewEvent::Skipped(reason) => println!("skipped: {reason:?}"),
            }
        }
        if args.max_renders.is_some_and(|max| outcomes >= max) {
            break;
        }
        std::thread::sleep(WATCH_POLL);
    }

    preview.close();
    Ok(())
}

fn cmd_check(broker: &RenderBroker) -> anyhow::Result<()> {
    broker.warm_up()?;
    let info = broker.engine().info().unwrap_or_default();
    println!("{}", info.version);
    Ok(())
}
