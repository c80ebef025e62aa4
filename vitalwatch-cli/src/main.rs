// VitalWatch command line interface
// Runs the monitoring pipeline on a live source or a recorded observation file

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use vitalwatch_core::{ConfigError, SourceId, VitalWatchConfig};
use vitalwatch_eye::{
    default_backend, read_observations, AlertManager, JsonlEventStore, MonitorPipeline,
    MonitorPipelineBuilder, MonitorStatus, StopSignal, StreamOptions, VideoStream,
};

#[derive(Parser)]
#[command(name = "vitalwatch")]
#[command(about = "VitalWatch - real-time patient monitoring", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (error, warn, info, debug, trace); RUST_LOG takes precedence
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    /// Configuration file path
    #[arg(long, short, default_value = "config.yaml", global = true)]
    config: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Monitor a camera index, stream URL or video file
    Monitor {
        /// Source: device index (0), URL (rtsp://...) or file path
        source: SourceId,

        /// Append accepted events to this JSON-lines file
        #[arg(long)]
        events_out: Option<PathBuf>,

        /// Stop after this many seconds
        #[arg(long)]
        duration: Option<u64>,
    },

    /// Run the event pipeline over recorded observations (JSON lines)
    Replay {
        /// Observation file
        file: PathBuf,

        /// Source identifier written to event records
        #[arg(long, default_value = "replay")]
        source_id: SourceId,

        /// Append accepted events to this JSON-lines file
        #[arg(long)]
        events_out: Option<PathBuf>,
    },

    /// Configuration management
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show the effective configuration (file, then environment overrides)
    Show,

    /// Validate a configuration file
    Validate {
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level, cli.json_logs)?;

    match cli.command {
        Commands::Monitor { source, events_out, duration } => {
            let config = load_config(&cli.config)?;
            monitor(source, config, events_out, duration).await?;
        }
        Commands::Replay { file, source_id, events_out } => {
            let config = load_config(&cli.config)?;
            replay(&file, source_id, config, events_out)?;
        }
        Commands::Config(cmd) => {
            handle_config_command(&cli.config, cmd)?;
        }
    }

    Ok(())
}

fn init_logging(level: &str, json: bool) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .with_context(|| format!("invalid log level: {}", level))?;

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
    Ok(())
}

/// Load, overlay environment variables and validate.
///
/// A missing file falls back to defaults; a malformed one is an error.
fn load_config(path: &Path) -> anyhow::Result<VitalWatchConfig> {
    let mut config = match VitalWatchConfig::from_file(path) {
        Ok(config) => {
            info!(path = %path.display(), "Loaded configuration");
            config
        }
        Err(ConfigError::Io(reason)) if !path.exists() => {
            warn!(path = %path.display(), %reason, "Config file not found, using defaults");
            VitalWatchConfig::default()
        }
        Err(e) => {
            return Err(e).with_context(|| format!("failed to load {}", path.display()));
        }
    };

    config.apply_env();
    config.validate().context("invalid configuration")?;
    Ok(config)
}

fn pipeline_builder(
    source: SourceId,
    config: VitalWatchConfig,
    alerts: Arc<AlertManager>,
    events_out: Option<&Path>,
) -> anyhow::Result<MonitorPipelineBuilder> {
    let mut builder = MonitorPipeline::builder(source, config).alert_sink(alerts);
    if let Some(path) = events_out {
        let store = JsonlEventStore::open(path)
            .with_context(|| format!("cannot open event log {}", path.display()))?;
        info!(path = %path.display(), "Persisting events");
        builder = builder.event_store(Arc::new(store));
    }
    Ok(builder)
}

async fn monitor(
    source: SourceId,
    config: VitalWatchConfig,
    events_out: Option<PathBuf>,
    duration: Option<u64>,
) -> anyhow::Result<()> {
    let alerts = Arc::new(AlertManager::new(true));
    let options = StreamOptions::from_config(&config);
    let mut pipeline =
        pipeline_builder(source.clone(), config, alerts.clone(), events_out.as_deref())?.build()?;

    let stop = StopSignal::new();

    let on_ctrl_c = stop.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Interrupt received, shutting down");
                on_ctrl_c.stop();
            }
            Err(e) => error!("Failed to listen for Ctrl-C: {}", e),
        }
    });

    if let Some(seconds) = duration {
        let on_timeout = stop.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(seconds)).await;
            info!(seconds, "Monitoring duration reached");
            on_timeout.stop();
        });
    }

    let status = tokio::task::spawn_blocking(move || -> anyhow::Result<MonitorStatus> {
        let backend = default_backend();
        let mut stream = VideoStream::new(source.clone(), options);
        if !stream.start(backend.as_ref()) {
            bail!("could not open video source {}", source);
        }
        Ok(pipeline.run(&mut stream, &stop))
    })
    .await
    .context("monitoring task failed")??;

    print_summary(&status, &alerts)
}

fn replay(
    file: &Path,
    source: SourceId,
    config: VitalWatchConfig,
    events_out: Option<PathBuf>,
) -> anyhow::Result<()> {
    let reader = BufReader::new(
        File::open(file).with_context(|| format!("cannot open {}", file.display()))?,
    );
    let observations = read_observations(reader)?;
    info!(path = %file.display(), count = observations.len(), "Replaying observations");

    let alerts = Arc::new(AlertManager::new(false));
    let mut pipeline =
        pipeline_builder(source, config, alerts.clone(), events_out.as_deref())?.build()?;
    let shared = pipeline.shared_state();

    for observation in &observations {
        let report = pipeline.process_observation(observation);
        for (event, severity) in &report.accepted {
            let line = serde_json::json!({
                "event": event.event_type,
                "confidence": event.confidence,
                "severity": severity.severity_level,
                "score": severity.severity_score,
                "time": event.timestamp,
                "metadata": event.metadata,
            });
            println!("{}", line);
        }
    }

    print_summary(&shared.status(), &alerts)
}

fn print_summary(status: &MonitorStatus, alerts: &AlertManager) -> anyhow::Result<()> {
    eprintln!("{}", serde_json::to_string_pretty(status)?);
    for alert in alerts.recent(10) {
        eprintln!("[{}] {} score={} at {}", alert.severity, alert.event, alert.score, alert.time);
    }
    Ok(())
}

fn handle_config_command(config_path: &Path, cmd: ConfigCommands) -> anyhow::Result<()> {
    match cmd {
        ConfigCommands::Show => {
            let config = load_config(config_path)?;
            print!("{}", serde_yaml::to_string(&config)?);
        }
        ConfigCommands::Validate { file } => {
            let config = VitalWatchConfig::from_file(&file)
                .with_context(|| format!("failed to load {}", file.display()))?;
            config.validate().context("invalid configuration")?;
            println!("{}: ok", file.display());
        }
    }
    Ok(())
}
