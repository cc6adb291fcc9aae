use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use clap::{Parser, Subcommand};
use hyperview_core::{
    bus::{CHANGE_EXCLUSION_COLOR, TOGGLE_GUIDE},
    AppConfig, AssetLoader, AssetManifest, ControlBus, FrameClock, FsLoader, HyperviewError,
    Orchestrator, ProceduralLoader, Rgb, StartupBarrier, SystemClock, Ticker,
};
use tracing_subscriber::EnvFilter;

fn main() -> hyperview_core::Result<()> {
    init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run(args) => run(args),
        Commands::Manifest { output } => write_manifest(&output),
    }
}

fn run(args: RunArgs) -> hyperview_core::Result<()> {
    let config = match &args.config {
        Some(path) => AppConfig::load(path)?,
        None => AppConfig::default(),
    };
    let manifest = match &args.manifest {
        Some(path) => AssetManifest::load(path)?,
        None => AssetManifest::standard(),
    };
    let loader: Box<dyn AssetLoader> = match &args.assets {
        Some(root) => Box::new(FsLoader::new(root, ProceduralLoader::default())),
        None => Box::new(ProceduralLoader::default()),
    };
    tracing::info!(assets = manifest.len(), frames = args.frames, fps = args.fps, "starting");

    let mut clock = SystemClock::new();
    let mut bus = ControlBus::new();
    let mut ticker = Ticker::new(&config.ticker);
    let orchestrator = futures::executor::block_on(Orchestrator::launch(
        &config,
        StartupBarrier::new(manifest),
        &*loader,
        &mut bus,
        &mut ticker,
        clock.now(),
    ))?;

    if let Some(color) = args.exclusion_color {
        let report = bus.emit(CHANGE_EXCLUSION_COLOR, color);
        if report.faulted > 0 {
            return Err(HyperviewError::invalid_target(
                CHANGE_EXCLUSION_COLOR,
                format!("{color:?} was rejected"),
            ));
        }
    }
    if args.toggle_guide {
        bus.emit(TOGGLE_GUIDE, true);
    }

    let frame_time = Duration::from_secs_f64(1.0 / args.fps.max(1.0));
    let mut faulted = 0;
    for _ in 0..args.frames {
        if let Some(report) = ticker.frame(clock.now()) {
            faulted += report.faulted;
        }
        std::thread::sleep(frame_time);
    }
    ticker.stop();

    let orchestrator = orchestrator.borrow();
    let exclusion = orchestrator.exclusion().current()?;
    tracing::info!(
        presented = orchestrator.surface().presents(),
        faulted,
        guide = orchestrator.guide_visible(),
        exclusion = ?exclusion,
        "run finished"
    );
    Ok(())
}

fn write_manifest(output: &Path) -> hyperview_core::Result<()> {
    tracing::info!(?output, "writing standard asset manifest");
    AssetManifest::standard().save(output)
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}

/// Parses `R,G,B` with components in `[0, 1]`.
fn parse_rgb(value: &str) -> Result<Rgb, String> {
    let components = value
        .split(',')
        .map(|part| part.trim().parse::<f32>().map_err(|err| format!("`{part}`: {err}")))
        .collect::<Result<Vec<_>, _>>()?;
    match components.as_slice() {
        &[r, g, b] => {
            let color = Rgb::new(r, g, b);
            if color.is_normalized() {
                Ok(color)
            } else {
                Err(format!("components must lie in [0, 1], got {value}"))
            }
        }
        _ => Err(format!("expected three components, got {}", components.len())),
    }
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Real-time 4D visualisation", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Load assets and drive the frame loop headlessly.
    Run(RunArgs),
    /// Write the standard asset manifest as JSON.
    Manifest {
        /// Destination of the manifest file.
        output: PathBuf,
    },
}

#[derive(clap::Args, Debug)]
struct RunArgs {
    /// JSON configuration file; defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// JSON asset manifest; the standard manifest when omitted.
    #[arg(short, long)]
    manifest: Option<PathBuf>,
    /// Directory data assets are read from. Other kinds are synthesised.
    #[arg(long)]
    assets: Option<PathBuf>,
    /// Number of frames to run.
    #[arg(long, default_value_t = 120)]
    frames: u64,
    /// Target frame rate.
    #[arg(long, default_value_t = 60.0)]
    fps: f64,
    /// Exclusion colour target emitted after startup, as `R,G,B`.
    #[arg(long, value_parser = parse_rgb)]
    exclusion_color: Option<Rgb>,
    /// Emit `toggleGuide` after startup.
    #[arg(long)]
    toggle_guide: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_rgb_triples() {
        assert_eq!(parse_rgb("1, 0, 0.5").unwrap(), Rgb::new(1.0, 0.0, 0.5));
        assert!(parse_rgb("1,0").is_err());
        assert!(parse_rgb("red,0,0").is_err());
    }

    #[test]
    fn rejects_out_of_range_components() {
        assert!(parse_rgb("2,0,0").is_err());
        assert!(parse_rgb("0,-0.1,0").is_err());
        assert!(parse_rgb("NaN,0,0").is_err());
        assert!(Cli::try_parse_from(["hyperview-app", "run", "--exclusion-color", "1,1,1.5"]).is_err());
    }

    #[test]
    fn run_flags_parse() {
        let cli = Cli::try_parse_from([
            "hyperview-app",
            "run",
            "--frames",
            "3",
            "--exclusion-color",
            "1,0,0",
            "--toggle-guide",
        ])
        .unwrap();
        let Commands::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.frames, 3);
        assert_eq!(args.exclusion_color, Some(Rgb::new(1.0, 0.0, 0.0)));
        assert!(args.toggle_guide);
    }
}
