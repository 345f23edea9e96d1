//! EDL Audio Engine
//!
//! Headless playback process: reads line-delimited JSON commands on stdin,
//! plays a single audio file through an EDL-defined edited timeline, and
//! reports state/position events on stdout.

use std::io::BufRead;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use edl_engine::audio::output::AudioOutput;
use edl_engine::config::Config;
use edl_engine::events::EventEmitter;
use edl_engine::playback::controller::{Controller, TICK_INTERVAL_MS};
use edl_engine::playback::shared::EngineShared;
use edl_engine::playback::stitcher::EdlStitcher;
use edl_engine::protocol;

/// Line buffer size for stdin; EDL payloads can be large
const STDIN_BUFFER_BYTES: usize = 1024 * 1024;

/// EDL Audio Engine - headless EDL-driven audio playback
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Output device name (default: system default device)
    #[arg(long, value_name = "NAME")]
    device: Option<String>,

    /// Directory for the diagnostic log file (overrides JUCE_DEBUG_DIR)
    #[arg(long, value_name = "DIR")]
    debug_dir: Option<std::path::PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn init_tracing(config: &Config) {
    let default_filter = if config.verbose { "edl_engine=debug" } else { "edl_engine=info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter.into());

    // Append-only diagnostic file; logging must not be fatal if the
    // directory is unwritable
    let file_layer = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(config.debug_log_path())
        .ok()
        .map(|file| {
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(Arc::new(file))
        });

    let registry = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr));

    if let Some(file_layer) = file_layer {
        registry.with(file_layer).init();
    } else {
        registry.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = Config::resolve(args.debug_dir, args.verbose, args.device);

    init_tracing(&config);
    info!("EDL audio engine starting");

    // Engine core shared with the audio callback
    let shared = EngineShared::new();
    let emitter = Arc::new(EventEmitter::stdout());

    // Device open failure at startup is unrecoverable
    let mut output = AudioOutput::open(config.device.as_deref()).map_err(|e| {
        error!("failed to open audio device: {}", e);
        anyhow::anyhow!(e)
    })?;
    info!(
        "audio device ready: {}Hz, {} channels",
        output.sample_rate(),
        output.channels()
    );

    let controller = Arc::new(Controller::new(
        Arc::clone(&shared),
        Arc::clone(&emitter),
        output.sample_rate(),
    ));

    // The stream runs for the whole session; play/pause are flags the
    // stitcher observes
    output.start(EdlStitcher::new(Arc::clone(&shared)))?;
    let device_error = output.error_flag();

    // Reporter: ~30 Hz position/boundary reconciliation
    let reporter = {
        let controller = Arc::clone(&controller);
        let shared = Arc::clone(&shared);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_millis(TICK_INTERVAL_MS));
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            while shared.running() {
                interval.tick().await;
                if device_error.swap(false, Ordering::SeqCst) {
                    controller.device_failed();
                }
                controller.tick();
            }
            debug!("reporter stopped");
        })
    };

    // Blocking stdin reader with a large line buffer for EDL payloads
    let (line_tx, mut line_rx) = tokio::sync::mpsc::channel::<String>(64);
    let stdin_thread = std::thread::spawn(move || {
        let stdin = std::io::stdin();
        let reader = std::io::BufReader::with_capacity(STDIN_BUFFER_BYTES, stdin.lock());
        for line in reader.lines() {
            match line {
                Ok(line) => {
                    if line.is_empty() {
                        continue;
                    }
                    if line_tx.blocking_send(line).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    warn!("stdin read error: {}", e);
                    break;
                }
            }
        }
        // Channel drop signals EOF to the command loop
    });

    // Command loop: one command at a time, in arrival order
    while let Some(line) = line_rx.recv().await {
        match protocol::parse_line(&line) {
            Ok(command) => controller.handle_command(command),
            Err(e) => emitter.emit_error(e.to_string()),
        }
    }

    info!("stdin closed, shutting down");

    // Shutdown order: reporter first, then detach the audio callback by
    // stopping the stream, and only then let the source buffer drop
    shared.shutdown();
    let _ = reporter.await;
    output.stop();
    let _ = stdin_thread.join();

    Ok(())
}
