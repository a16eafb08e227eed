use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, Subcommand};
use futures::executor::block_on;
use sonicflow_core::audio::native::NativePlatform;
use sonicflow_core::{
    AppConfig, FileRef, FrameClock, Palette, Pixmap, RenderEngine, RenderLoop, SourceController,
    VisualConfig, VisualMode, VisualizerError,
};
use tracing_subscriber::EnvFilter;

fn main() -> sonicflow_core::Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => AppConfig::load(path)?,
        None => AppConfig::default(),
    };

    run(&cli, &config)
}

fn run(cli: &Cli, config: &AppConfig) -> sonicflow_core::Result<()> {
    let controller = SourceController::new(NativePlatform::new(), config);

    let connected = match &cli.command {
        Commands::Mic => block_on(controller.connect_microphone()),
        Commands::System => block_on(controller.connect_system_audio()),
        Commands::File { path } => block_on(controller.connect_file(FileRef::new(path))),
    };
    if let Err(err) = connected {
        tracing::error!(%err, "unable to start the selected source");
        return Err(err);
    }
    if let Some(volume) = cli.volume {
        controller.set_volume(volume);
    }

    let state = controller.state();
    tracing::info!(
        source = state.source_kind.label(),
        playing = state.is_playing,
        mode = ?cli.mode,
        palette = ?cli.palette,
        "visualising"
    );

    let visual = VisualConfig {
        mode: cli.mode,
        palette: cli.palette,
    };
    let mut surface = Pixmap::new(cli.width, cli.height);
    let mut render = RenderLoop::new(RenderEngine::new(config.render.clone()));
    let mut clock = FrameClock::for_rate(config.render.frame_rate);
    if let Some(seconds) = cli.seconds {
        clock = clock.with_limit(Duration::from_secs_f64(seconds.max(0.0)));
    }

    let frames = render.run(&controller, &mut surface, &visual, &mut clock);
    tracing::info!(
        frames,
        elapsed_ms = clock.elapsed().as_millis() as u64,
        "render loop finished"
    );

    if let Some(path) = &cli.snapshot {
        if render.is_drawing() {
            save_snapshot(&surface, path)?;
        } else {
            tracing::warn!(path = %path.display(), "playback stopped before the snapshot; nothing saved");
        }
    }

    render.teardown(&mut surface);
    controller.shutdown();
    Ok(())
}

fn save_snapshot(surface: &Pixmap, path: &Path) -> sonicflow_core::Result<()> {
    let image = image::RgbaImage::from_raw(surface.width(), surface.height(), surface.to_rgba8())
        .ok_or_else(|| VisualizerError::msg("surface buffer does not match its dimensions"))?;
    image
        .save(path)
        .map_err(|err| VisualizerError::msg(format!("failed to write {}: {err}", path.display())))?;
    tracing::info!(path = %path.display(), "snapshot written");
    Ok(())
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Real-time audio spectrum visualiser", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Visual style: bars, wave or sphere.
    #[arg(short, long, default_value = "bars", global = true)]
    mode: VisualMode,

    /// Colour palette: violet, fire, neon or ocean.
    #[arg(short, long, default_value = "violet", global = true)]
    palette: Palette,

    /// JSON configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[arg(long, default_value_t = 800, global = true)]
    width: u32,

    #[arg(long, default_value_t = 400, global = true)]
    height: u32,

    /// Stop after this many seconds. Live sources otherwise run until killed.
    #[arg(short, long, global = true)]
    seconds: Option<f64>,

    /// Write the last rendered frame to this PNG file.
    #[arg(long, global = true)]
    snapshot: Option<PathBuf>,

    /// Playback volume for files, between 0 and 1.
    #[arg(long, global = true)]
    volume: Option<f32>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Visualise the default microphone.
    Mic,
    /// Visualise what the system is playing through a loopback device.
    System,
    /// Play and visualise a local audio file.
    File {
        /// Path to the audio file.
        path: PathBuf,
    },
}
