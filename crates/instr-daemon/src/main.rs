//! Instrument daemon entry point.
//!
//! Serves the register protocol to hosts over TCP and keeps the device
//! clock on the timing broadcast arriving over UDP, with signal handling
//! for clean shutdown.

mod signals;
mod transport;

use anyhow::{Context, Result};
use clap::Parser;
use std::io::ErrorKind;
use std::net::TcpListener;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use instr_common::DeviceConfig;
use instr_core::{
    service_link, DeviceCore, FreeRunningTimer, InstrumentTimer, RegisterBank,
};
use instr_sync::Synchronizer;

use crate::signals::SignalHandler;
use crate::transport::{TcpHostLink, UdpSyncLine};

/// Instrument daemon command-line arguments.
#[derive(Parser, Debug)]
#[command(
    name = "instr-daemon",
    about = "Virtual instrument daemon - host register protocol and clock synchronization",
    version,
    long_about = None
)]
struct Args {
    /// Path to a device configuration file (TOML).
    #[arg(long, short = 'c', value_name = "FILE")]
    config: Option<PathBuf>,

    /// TCP listen address for host connections (overrides config file).
    #[arg(long, value_name = "ADDR")]
    listen: Option<String>,

    /// Disable the clock synchronizer.
    #[arg(long)]
    no_sync: bool,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, short = 'l', default_value = "info")]
    log_level: String,
}

fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args.log_level);

    info!(version = env!("CARGO_PKG_VERSION"), "Starting instrument daemon");

    let mut config = load_config(&args)?;
    if let Some(listen) = &args.listen {
        config.transport.listen_addr = listen.clone();
    }
    if args.no_sync {
        config.sync.enabled = false;
    }
    config
        .validate()
        .context("Invalid device configuration")?;

    info!(
        who_am_i = config.identity.who_am_i,
        listen = %config.transport.listen_addr,
        sync_enabled = config.sync.enabled,
        "Configuration loaded"
    );

    let signal_handler = SignalHandler::new().context("Failed to set up signal handlers")?;

    run_daemon(&config, &signal_handler)
}

/// Initialize logging with the specified log level.
fn init_logging(level: &str) {
    let filter = format!(
        "instr_daemon={level},instr_core={level},instr_sync={level},instr_proto={level},instr_common={level}"
    );

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&filter)),
        )
        .with_target(true)
        .with_thread_ids(true)
        .init();
}

/// Load configuration from file or use defaults.
///
/// Resolution priority (first existing file wins):
/// 1. Command-line `--config` argument
/// 2. `INSTR_CONFIG_PATH` environment variable
/// 3. `/etc/instrument/config.toml` (system path)
/// 4. `config/default.toml` (local development)
/// 5. Built-in defaults
fn load_config(args: &Args) -> Result<DeviceConfig> {
    if let Some(config_path) = &args.config {
        info!(?config_path, "Loading config from command-line argument");
        return DeviceConfig::from_file(config_path)
            .with_context(|| format!("Failed to load config from {config_path:?}"));
    }

    if let Ok(env_path) = std::env::var("INSTR_CONFIG_PATH") {
        let config_path = PathBuf::from(&env_path);
        if config_path.exists() {
            info!(?config_path, "Loading config from INSTR_CONFIG_PATH");
            return DeviceConfig::from_file(&config_path).with_context(|| {
                format!("Failed to load config from INSTR_CONFIG_PATH={env_path:?}")
            });
        }
        warn!(
            path = %env_path,
            "INSTR_CONFIG_PATH set but file does not exist, checking other locations"
        );
    }

    let system_path = PathBuf::from("/etc/instrument/config.toml");
    if system_path.exists() {
        info!(?system_path, "Loading config from system path");
        return DeviceConfig::from_file(&system_path)
            .with_context(|| format!("Failed to load config from {system_path:?}"));
    }

    let local_path = PathBuf::from("config/default.toml");
    if local_path.exists() {
        info!(?local_path, "Loading config from local path");
        return DeviceConfig::from_file(&local_path)
            .with_context(|| format!("Failed to load config from {local_path:?}"));
    }

    info!("No config file found, using built-in defaults");
    Ok(DeviceConfig::default())
}

/// Build the device and serve until shutdown.
fn run_daemon(config: &DeviceConfig, signal_handler: &SignalHandler) -> Result<()> {
    let timer: Arc<dyn InstrumentTimer> = Arc::new(FreeRunningTimer::new());

    let bank = RegisterBank::new(config.identity.clone(), Arc::clone(&timer))
        .context("Failed to build register bank")?;
    let mut core = DeviceCore::new(bank);

    let sync_thread = if config.sync.enabled {
        Some(spawn_sync_thread(config, Arc::clone(&timer), signal_handler)?)
    } else {
        info!("Clock synchronizer disabled, timer free-runs from zero");
        None
    };

    serve_hosts(config, &mut core, signal_handler)?;

    info!("Shutting down...");
    if let Some(handle) = sync_thread {
        if handle.join().is_err() {
            warn!("Sync thread panicked during shutdown");
        }
    }

    let counters = core.counters();
    info!(
        messages = counters.messages,
        replies = counters.replies,
        malformed = counters.malformed,
        unknown_register = counters.unknown_register,
        read_only_violations = counters.read_only_violations,
        signals = signal_handler.state().signal_count(),
        "Daemon shutdown complete"
    );

    Ok(())
}

/// Start the synchronizer on its own thread, fed from the UDP line.
fn spawn_sync_thread(
    config: &DeviceConfig,
    timer: Arc<dyn InstrumentTimer>,
    signal_handler: &SignalHandler,
) -> Result<std::thread::JoinHandle<()>> {
    let mut line = UdpSyncLine::bind(&config.sync.listen_addr)
        .with_context(|| format!("Failed to bind sync line on {}", config.sync.listen_addr))?;
    let mut synchronizer = Synchronizer::new(config.sync.offset_us);
    let handler = signal_handler.clone();

    info!(
        listen = %config.sync.listen_addr,
        offset_us = config.sync.offset_us,
        "Clock synchronizer listening"
    );

    let handle = std::thread::Builder::new()
        .name("instr-sync".into())
        .spawn(move || {
            while !handler.shutdown_requested() {
                match synchronizer.pump(&mut line, timer.as_ref()) {
                    Ok(Some(_)) => {}
                    Ok(None) => std::thread::sleep(Duration::from_millis(2)),
                    // Line faults never reach the host protocol; the clock
                    // free-runs until the next good broadcast.
                    Err(e) => {
                        warn!(error = %e, "sync line fault");
                        std::thread::sleep(Duration::from_millis(100));
                    }
                }
            }

            let stats = synchronizer.stats();
            info!(
                frames_applied = stats.frames_applied,
                bytes_consumed = stats.bytes_consumed,
                line_errors = stats.line_errors,
                last_seconds = stats.last_seconds,
                "Synchronizer stopped"
            );
        })
        .context("Failed to spawn sync thread")?;

    Ok(handle)
}

/// Accept host connections and serve them one at a time.
fn serve_hosts(
    config: &DeviceConfig,
    core: &mut DeviceCore,
    signal_handler: &SignalHandler,
) -> Result<()> {
    let listener = TcpListener::bind(&config.transport.listen_addr).with_context(|| {
        format!(
            "Failed to bind host listener on {}",
            config.transport.listen_addr
        )
    })?;
    listener
        .set_nonblocking(true)
        .context("Failed to set listener non-blocking")?;
    info!(listen = %config.transport.listen_addr, "Host listener ready");

    while !signal_handler.shutdown_requested() {
        if signal_handler.take_reload_request() {
            info!("Reload signal received (config reload not yet implemented)");
        }

        match listener.accept() {
            Ok((stream, peer)) => {
                info!(%peer, "Host connected");
                match TcpHostLink::new(stream, config.transport.read_timeout) {
                    Ok(mut link) => serve_connection(core, &mut link, signal_handler),
                    Err(e) => warn!(%peer, error = %e, "Failed to set up host connection"),
                }
                info!(%peer, "Host disconnected");
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => {
                std::thread::sleep(Duration::from_millis(50));
            }
            Err(e) => {
                error!(error = %e, "Accept failed");
                std::thread::sleep(Duration::from_millis(100));
            }
        }
    }

    Ok(())
}

/// Service one host connection until it closes or shutdown is requested.
fn serve_connection(core: &mut DeviceCore, link: &mut TcpHostLink, signal_handler: &SignalHandler) {
    while !signal_handler.shutdown_requested() && !link.is_closed() {
        if let Err(e) = service_link(core, link) {
            warn!(error = %e, "Host connection failed");
            break;
        }
    }
}
