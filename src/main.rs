use anyhow::{Context, Result};
use clap::Parser;
use env_logger::Env;
use log::{debug, error, info};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use mirrorplay::engine::{EngineEvent, RecordingEngineFactory, StreamSource};
use mirrorplay::gesture::{TouchSample, Viewport};
use mirrorplay::resume::{storage_key, ContentInfo, JsonFileStore, KeyValueStore, MemoryStore, ResumeRecord};
use mirrorplay::utils::{format_seconds, unix_timestamp};
use mirrorplay::{Config, PlayerEvent, PlayerEventHandler, PlayerSession, SessionDriver, SessionHandle};

/// mirrorplay - replays a simulated playback session against an in-process engine
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Stable key of the content being played
    #[arg(long, default_value = "demo-episode")]
    content_key: String,

    /// Title stored in the watch history
    #[arg(long, default_value = "Demo Episode")]
    title: String,

    /// Duration reported by the simulated engine, in seconds
    #[arg(long, default_value = "120")]
    duration: f64,

    /// Store this resume position before starting
    #[arg(long, value_name = "SECONDS")]
    resume_at: Option<f64>,

    /// Progress store file (defaults to the data directory)
    #[arg(long, value_name = "FILE")]
    store: Option<PathBuf>,

    /// Keep progress in memory only
    #[arg(long, conflicts_with = "store")]
    memory: bool,

    /// Configuration file to use instead of the system and user files
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Number of progress ticks to simulate
    #[arg(long, default_value = "20")]
    ticks: u32,

    /// Wall-clock time between ticks, in milliseconds
    #[arg(long, default_value = "250")]
    tick_ms: u64,

    /// Write the effective configuration to the user config file and exit
    #[arg(long)]
    write_config: bool,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => mirrorplay::utils::load_config()?,
    };

    // Initialize logging
    let log_level = if args.debug {
        "debug"
    } else {
        config.general.log_level.as_str()
    };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level))
        .format_timestamp_millis()
        .init();

    info!("Starting mirrorplay v{}", env!("CARGO_PKG_VERSION"));

    if args.write_config {
        config.save()?;
        info!("Configuration written to {:?}", Config::user_config_path());
        return Ok(());
    }

    let store: Arc<dyn KeyValueStore> = if args.memory {
        Arc::new(MemoryStore::new())
    } else {
        let path = args.store.clone().unwrap_or_else(|| config.store_path());
        info!("Using progress store {:?}", path);
        Arc::new(JsonFileStore::open(&path).with_context(|| format!("Failed to open {:?}", path))?)
    };

    if let Some(position) = args.resume_at {
        let record = ResumeRecord {
            content_key: args.content_key.clone(),
            position_seconds: position,
            saved_at_epoch: unix_timestamp(),
        };
        store.set(&storage_key(&args.content_key), &serde_json::to_string(&record)?)?;
        info!("Stored resume position {}", format_seconds(position));
    }

    let factory = RecordingEngineFactory::new();
    let log = factory.log();

    let content = ContentInfo {
        content_key: args.content_key.clone(),
        title: args.title.clone(),
        image_url: None,
        provider: Some("demo".to_string()),
    };
    let stream = StreamSource {
        primary_uri: format!("demo://{}/master.m3u8", args.content_key),
        ..Default::default()
    };

    let session = PlayerSession::builder(content, stream)
        .with_config(config)
        .with_engine_factory(Box::new(factory))
        .with_store(store)
        .with_event_handler(Box::new(LoggingEventHandler))
        .build()?;

    let handle = SessionDriver::spawn(session);
    handle
        .engine_event(EngineEvent::Loaded {
            duration_seconds: args.duration,
            detected_tracks: Vec::new(),
        })
        .await?;

    if let Err(e) = simulate(&handle, &log, &args).await {
        error!("Simulation stopped: {}", e);
    }

    let session = handle.close().await?;
    info!(
        "Closed at {} of {}",
        format_seconds(session.authoritative_position()),
        format_seconds(session.state().duration_seconds)
    );
    Ok(())
}

/// Report progress like a real engine would, following the seeks it gets
async fn simulate(handle: &SessionHandle, log: &mirrorplay::engine::CommandLog, args: &Args) -> Result<()> {
    let tick = Duration::from_millis(args.tick_ms);
    let mut position = 0.0;
    let mut seen_seeks = 0;

    for n in 0..args.ticks {
        tokio::time::sleep(tick).await;

        let seeks = log.seeks();
        if let Some(&target) = seeks.get(seen_seeks..).and_then(|s| s.last()) {
            debug!("Engine jumped to {}", format_seconds(target));
            position = target;
            seen_seeks = seeks.len();
        }

        position += 1.0;
        if position >= args.duration {
            handle.engine_event(EngineEvent::Ended).await?;
            return Ok(());
        }
        handle
            .engine_event(EngineEvent::Progress {
                position_seconds: position,
            })
            .await?;

        // Halfway through, double tap the right half to skip ahead
        if n == args.ticks / 2 {
            double_tap_right(handle).await?;
        }
    }

    Ok(())
}

async fn double_tap_right(handle: &SessionHandle) -> Result<()> {
    let viewport = Viewport::default();
    let x = viewport.width * 0.75;
    let y = viewport.height / 2.0;
    let start = tokio::time::Instant::now().into_std();

    for (offset, down) in [(0, true), (60, false), (160, true), (220, false)] {
        let at = start + Duration::from_millis(offset);
        let sample = if down {
            TouchSample::down(x, y, at)
        } else {
            TouchSample::up(x, y, at)
        };
        handle.touch(sample).await?;
    }
    Ok(())
}

/// Event handler that logs events
struct LoggingEventHandler;

impl PlayerEventHandler for LoggingEventHandler {
    fn handle_event(&mut self, event: PlayerEvent) {
        match event {
            PlayerEvent::PositionChanged { position_seconds } => {
                // Log position changes at debug level to avoid spam
                debug!("Position: {}", format_seconds(position_seconds));
            }
            PlayerEvent::MediaLoaded { duration_seconds } => {
                info!("Media loaded ({})", format_seconds(duration_seconds));
            }
            PlayerEvent::SeekIssued { target_seconds } => {
                info!("Seek to {}", format_seconds(target_seconds));
            }
            PlayerEvent::ControlsChanged { state } => info!("Controls: {:?}", state),
            PlayerEvent::VolumeChanged { volume } => {
                info!("Volume: {:.0}%", volume * 100.0);
            }
            PlayerEvent::RateChanged { rate } => {
                info!("Playback speed: {:.1}x", rate);
            }
            PlayerEvent::Error { message, .. } => error!("Player error: {}", message),
            PlayerEvent::Ended => info!("End of media reached"),
            _ => {
                // Everything else is visible at debug level in the session
            }
        }
    }
}
