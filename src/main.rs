use netmon::config::{self, Config};
use netmon::events::Event;
use netmon::monitoring::{start_reconstruction_engine, EventStore, Reconstructor, SharedReconstructors};
use parking_lot::RwLock;
use simplelog::*;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::sync::Arc;
use std::sync::Once;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

// Global shutdown flag set by Ctrl+C
static RUNNING: AtomicBool = AtomicBool::new(true);
static SHUTDOWN_ONCE: Once = Once::new();

const STATUS_INTERVAL: Duration = Duration::from_secs(5);

fn main() -> anyhow::Result<()> {
    let config = config::load_config();

    CombinedLogger::init(vec![TermLogger::new(
        config.level_filter(),
        simplelog::Config::default(),
        TerminalMode::Stderr,
        ColorChoice::Auto,
    )])?;

    // netmon [EVENT_FILE|-] [FOCUS_ADDRESS...]
    let mut args = std::env::args().skip(1);
    let input = args.next().unwrap_or_else(|| "-".to_string());
    let focuses = resolve_focuses(args.collect(), &config)?;

    log::info!("Reconstructing connections for: {}", focuses.join(", "));

    let (event_tx, event_rx) = match config.channel_capacity {
        Some(capacity) => crossbeam_channel::bounded(capacity),
        None => crossbeam_channel::unbounded(),
    };

    let state: SharedReconstructors = Arc::new(RwLock::new(
        focuses.iter().map(|focus| Reconstructor::new(focus)).collect(),
    ));
    let engine_running = Arc::new(AtomicBool::new(true));
    let reader_running = Arc::new(AtomicBool::new(true));

    let engine_handle = start_reconstruction_engine(event_rx, Arc::clone(&state), Arc::clone(&engine_running));
    let reader_handle = start_reader(input, event_tx, &config, Arc::clone(&reader_running))?;

    ctrlc::set_handler(move || {
        SHUTDOWN_ONCE.call_once(|| {
            log::info!("Received shutdown signal");
            RUNNING.store(false, Ordering::Relaxed);
        });
    })?;

    let mut last_status = Instant::now();
    while RUNNING.load(Ordering::Relaxed) && !reader_handle.is_finished() {
        std::thread::sleep(Duration::from_millis(50));

        if last_status.elapsed() >= STATUS_INTERVAL {
            log_status(&state);
            last_status = Instant::now();
        }
    }

    // A reader blocked on stdin cannot be interrupted, so it only gets a grace period.
    reader_running.store(false, Ordering::Relaxed);
    let store = match join_with_timeout(reader_handle, Duration::from_secs(2)) {
        Ok(Ok(store)) => Some(store),
        Ok(Err(e)) => {
            log::error!("Event reader failed: {:#}", e);
            None
        }
        Err(JoinError::Timeout) => {
            log::warn!("Event reader still blocked on input, continuing without it");
            None
        }
        Err(JoinError::Panic(e)) => {
            log::error!("Event reader panicked: {:?}", e);
            None
        }
    };

    // With the reader gone the channel disconnects and the engine drains it.
    if store.is_none() {
        engine_running.store(false, Ordering::Relaxed);
    }
    match join_with_timeout(engine_handle, Duration::from_secs(5)) {
        Ok(()) => {}
        Err(JoinError::Timeout) => {
            engine_running.store(false, Ordering::Relaxed);
            log::warn!("Reconstruction engine didn't stop in time, reporting current state");
        }
        Err(JoinError::Panic(e)) => log::error!("Reconstruction engine panicked: {:?}", e),
    }

    report(&state, store.as_ref())
}

fn start_reader(
    input: String,
    event_tx: crossbeam_channel::Sender<Event>,
    config: &Config,
    running: Arc<AtomicBool>,
) -> anyhow::Result<std::thread::JoinHandle<anyhow::Result<EventStore>>> {
    let source: Box<dyn BufRead + Send> = if input == "-" {
        log::info!("Reading events from stdin");
        Box::new(BufReader::new(io::stdin()))
    } else {
        log::info!("Reading events from {}", input);
        Box::new(BufReader::new(File::open(&input)?))
    };
    let ports = config.service_ports();

    Ok(std::thread::spawn(move || {
        let mut store = EventStore::new(ports);

        for (lineno, line) in source.split(b'\n').enumerate() {
            if !running.load(Ordering::Relaxed) {
                break;
            }

            let line = line?;
            if let Some(event) = store.ingest_line(lineno + 1, &line) {
                if event_tx.send(event.clone()).is_err() {
                    log::warn!("Reconstruction engine is gone, stopping reader");
                    break;
                }
            }
        }

        let report = store.report();
        log::info!(
            "Reader finished: {} events, {} skipped, {} of unknown type",
            report.parsed,
            report.skipped,
            report.unknown
        );
        Ok(store)
    }))
}

/// Focus addresses from the command line, else from the configuration.
fn resolve_focuses(args: Vec<String>, config: &Config) -> anyhow::Result<Vec<String>> {
    let focuses = if args.is_empty() {
        config.focus_addresses.clone()
    } else {
        args
    };
    if focuses.is_empty() {
        anyhow::bail!(
            "no focus address given on the command line or in {}\nusage: netmon [EVENT_FILE|-] FOCUS_ADDRESS...",
            config::settings::DEFAULT_CONFIG_PATH
        );
    }
    Ok(focuses)
}

fn log_status(state: &SharedReconstructors) {
    for reconstructor in state.read().iter() {
        log::info!(
            "{}: {} active, {} terminated, {} events seen",
            reconstructor.focus(),
            reconstructor.active_count(),
            reconstructor.terminated_count(),
            reconstructor.stats().processed
        );
    }
}

fn report(state: &SharedReconstructors, store: Option<&EventStore>) -> anyhow::Result<()> {
    let reconstructors = state.read();

    for reconstructor in reconstructors.iter() {
        let connections: Vec<_> = reconstructor.snapshot().iter().map(|c| c.summary()).collect();
        log::info!(
            "{}: {} connections ({:?})",
            reconstructor.focus(),
            connections.len(),
            reconstructor.stats()
        );

        let line = serde_json::json!({
            "focus": reconstructor.focus(),
            "connections": connections,
        });
        println!("{}", serde_json::to_string(&line)?);
    }

    if let Some(store) = store {
        let line = serde_json::json!({ "indices": store.indices().to_sets() });
        println!("{}", serde_json::to_string(&line)?);
    }

    Ok(())
}

// Helper function to join threads with timeout
fn join_with_timeout<T>(handle: std::thread::JoinHandle<T>, timeout: Duration) -> Result<T, JoinError> {
    let start = Instant::now();

    while start.elapsed() < timeout {
        if handle.is_finished() {
            return handle.join().map_err(JoinError::Panic);
        }
        std::thread::sleep(Duration::from_millis(20));
    }

    Err(JoinError::Timeout)
}

#[derive(Debug)]
enum JoinError {
    Timeout,
    Panic(Box<dyn std::any::Any + Send + 'static>),
}
