use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, level_filters::LevelFilter, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use legato_server::config;
use legato_server::server::{metrics, run_server, RequestsLoggingLevel};
use legato_server::synthesis::{SynthesisPipeline, Synthesizer, SOUNDFONT_DOWNLOAD_URL};

fn parse_path(s: &str) -> Result<PathBuf, String> {
    let path_buf = PathBuf::from(s);
    let original_path = match path_buf.canonicalize() {
        Ok(path) => path,
        Err(msg) => {
            if msg.kind() == std::io::ErrorKind::NotFound {
                path_buf
            } else {
                return Err(format!("Error resolving path '{}': {}", s, msg));
            }
        }
    };
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir().map_err(|e| format!("Failed to get current dir: {}", e))?;
    Ok(cwd.join(original_path))
}

#[derive(Parser, Debug)]
#[clap(version, about = "Turns ABC notation into audio over HTTP")]
struct CliArgs {
    /// Path to TOML configuration file. Values in the file override CLI arguments.
    #[clap(long, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// Directory searched for SoundFont (.sf2) files.
    #[clap(long, value_parser = parse_path, default_value = "soundfonts")]
    pub soundfont_dir: PathBuf,

    /// The address to bind to.
    #[clap(long, default_value = "0.0.0.0")]
    pub host: String,

    /// The port to listen on.
    #[clap(short, long, default_value_t = 8000)]
    pub port: u16,

    /// The port for the metrics server (Prometheus scraping).
    #[clap(long, default_value_t = 9091)]
    pub metrics_port: u16,

    /// The level of logging to perform on each request.
    #[clap(long, default_value = "path")]
    pub logging_level: RequestsLoggingLevel,

    /// The browser origin allowed to call the API.
    #[clap(long, default_value = "http://localhost:3000")]
    pub cors_origin: String,

    /// Directory for intermediate files. Defaults to the system temp directory.
    #[clap(long, value_parser = parse_path)]
    pub temp_dir: Option<PathBuf>,

    /// The abc2midi binary, looked up on PATH when not a path.
    #[clap(long, default_value = "abc2midi")]
    pub abc2midi_path: PathBuf,

    /// The fluidsynth binary, looked up on PATH when not a path.
    #[clap(long, default_value = "fluidsynth")]
    pub fluidsynth_path: PathBuf,

    /// The ffmpeg binary, only used for MP3 output.
    #[clap(long, default_value = "ffmpeg")]
    pub ffmpeg_path: PathBuf,
}

/// Convert CLI args to CliConfig for config resolution
impl From<&CliArgs> for config::CliConfig {
    fn from(args: &CliArgs) -> Self {
        config::CliConfig {
            soundfont_dir: args.soundfont_dir.clone(),
            host: args.host.clone(),
            port: args.port,
            metrics_port: args.metrics_port,
            logging_level: args.logging_level.clone(),
            cors_origin: args.cors_origin.clone(),
            temp_dir: args.temp_dir.clone(),
            abc2midi_path: args.abc2midi_path.clone(),
            fluidsynth_path: args.fluidsynth_path.clone(),
            ffmpeg_path: args.ffmpeg_path.clone(),
        }
    }
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl+C, initiating graceful shutdown"),
        Err(err) => error!("Failed to listen for Ctrl+C: {}", err),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()?;

    // Load TOML config if provided
    let file_config = match &cli_args.config {
        Some(path) => {
            info!("Loading configuration from {:?}", path);
            Some(config::FileConfig::load(path)?)
        }
        None => None,
    };

    // Resolve final configuration (TOML overrides CLI)
    let cli_config: config::CliConfig = (&cli_args).into();
    let app_config = config::AppConfig::resolve(&cli_config, file_config)?;

    info!("Configuration:");
    info!("  soundfont_dir: {:?}", app_config.soundfont_dir);
    info!("  listen: {}:{}", app_config.host, app_config.port);
    info!("  metrics_port: {}", app_config.metrics_port);
    info!("  cors_origin: {}", app_config.cors_origin);
    info!("  logging_level: {}", app_config.logging_level);
    info!("  temp_dir: {:?}", app_config.temp_dir);
    info!(
        "  tools: abc2midi={:?} fluidsynth={:?} ffmpeg={:?}",
        app_config.synthesis.abc2midi_path,
        app_config.synthesis.fluidsynth_path,
        app_config.synthesis.ffmpeg_path
    );

    info!("Initializing metrics...");
    metrics::init_metrics();

    let pipeline = SynthesisPipeline::new(app_config.pipeline_config());

    // A missing SoundFont is not fatal, it can be dropped in while running
    match pipeline.soundfont().await {
        Some(soundfont) => {
            info!("Using SoundFont {:?}", soundfont.path());
            metrics::set_soundfont_available(true);
        }
        None => {
            warn!(
                "No SoundFont (.sf2) found in {:?}, synthesis will fail until one is added. Download one from {}",
                app_config.soundfont_dir, SOUNDFONT_DOWNLOAD_URL
            );
            metrics::set_soundfont_available(false);
        }
    }

    run_server(
        app_config.server_config(),
        Arc::new(pipeline),
        app_config.metrics_port,
        shutdown_signal(),
    )
    .await
}
