//! Entry point for the **splitwm** daemon.
//!
//! Without arguments it runs the daemon: event source and control socket on
//! background threads, events handled on the main thread.  With
//! `--message` it acts as a client that sends one command to a running
//! daemon and prints the reply.

use clap::Parser;
use log::{error, info, warn};
use splitwm::config::{default_config_path, ConfigError, ConfigSource, JsonFileSource};
use splitwm::dispatcher::Dispatcher;
use splitwm::hyprland::events::HyprlandEventSource;
use splitwm::hyprland::wm::HyprlandWm;
use splitwm::ipc::listener::{default_socket_path, send_command, Response, UnixSocketListener};
use splitwm::registry::{Registry, SharedRegistry};
use splitwm::shutdown::ShutdownFlag;
use splitwm::traits::{CommandSink, ControlChannel, EventSource};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::time::Duration;

/// Upper bound for cleanup once shutdown is requested.
const CLEANUP_BUDGET: Duration = Duration::from_secs(2);

/// How often the primary loop looks at the shutdown flag.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Parser)]
#[command(name = "splitwm", version, about = "Binary space partitioning tiler for Hyprland")]
struct Cli {
    /// Configuration file (default: $XDG_CONFIG_HOME/splitwm/config.json)
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Send one command to the running daemon and print the reply
    #[arg(short, long, value_name = "CMD")]
    message: Option<String>,
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    if let Some(message) = cli.message {
        std::process::exit(send_message(&message));
    }

    let config = cli
        .config
        .or_else(default_config_path)
        .unwrap_or_else(|| PathBuf::from("config.json"));
    run_daemon(config);
}

//  Client mode

fn send_message(command: &str) -> i32 {
    match send_command(default_socket_path(), command) {
        Ok(Response::Ok(None)) => 0,
        Ok(Response::Ok(Some(output))) => {
            println!("{}", output);
            0
        }
        Ok(Response::Error(e)) => {
            eprintln!("{}: {}", e.kind, e.message);
            1
        }
        Err(e) => {
            eprintln!("splitwm: {}", e);
            1
        }
    }
}

//  Daemon mode

/// Load the configuration, falling back to defaults.
fn load_registry(source: &JsonFileSource) -> Registry {
    match source.load() {
        Ok(registry) => {
            info!("loaded config from {}", source.describe());
            registry
        }
        Err(ConfigError::Read { .. }) => {
            info!("no config file at {}, using defaults", source.describe());
            Registry::default()
        }
        Err(e) => {
            warn!("{}, using defaults", e);
            Registry::default()
        }
    }
}

fn fatal(message: impl std::fmt::Display) -> ! {
    error!("{}", message);
    std::process::exit(1);
}

fn run_daemon(config_path: PathBuf) {
    let shutdown = ShutdownFlag::new();
    if let Err(e) = shutdown.install_signal_handler() {
        fatal(format!("cannot install signal handler: {}", e));
    }

    let source = JsonFileSource::new(&config_path);
    let registry = Arc::new(SharedRegistry::new(load_registry(&source)));

    let wm = HyprlandWm::new().unwrap_or_else(|e| fatal(format!("cannot reach Hyprland: {}", e)));
    let mut events = HyprlandEventSource::new(wm.clone())
        .unwrap_or_else(|e| fatal(format!("cannot reach Hyprland: {}", e)));

    let dispatcher = Arc::new(Dispatcher::new(
        wm,
        registry,
        Box::new(source),
        shutdown.clone(),
    ));
    if let Err(e) = dispatcher.bootstrap() {
        fatal(format!("cannot query the window service: {}", e));
    }

    let mut listener = UnixSocketListener::bind(default_socket_path())
        .unwrap_or_else(|e| fatal(format!("cannot bind control socket: {}", e)));
    let socket_path = listener.path().to_path_buf();
    {
        let sink: Arc<dyn CommandSink> = dispatcher.clone();
        std::thread::spawn(move || {
            if let Err(e) = listener.run(sink) {
                error!("control socket error: {}", e);
            }
        });
    }

    let (event_tx, event_rx) = mpsc::channel();
    std::thread::spawn(move || {
        if let Err(e) = events.run(event_tx) {
            error!("event source error: {}", e);
        }
    });

    if let Some(dir) = config_path.parent() {
        run_init_script(dir);
    }

    info!("splitwm running");
    while !shutdown.is_requested() {
        match event_rx.recv_timeout(POLL_INTERVAL) {
            Ok(event) => dispatcher.handle_event(event),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                warn!("event source closed");
                shutdown.request();
            }
        }
    }

    info!("shutting down");
    if !dispatcher.cleanup(CLEANUP_BUDGET) {
        warn!("cleanup incomplete");
    }
    let _ = std::fs::remove_file(&socket_path);
    // The listener thread is still blocked in accept.
    std::process::exit(0);
}

/// Run `<config dir>/init` once if it exists and is executable.
fn run_init_script(dir: &Path) {
    use std::os::unix::fs::PermissionsExt;

    let script = dir.join("init");
    let executable = std::fs::metadata(&script)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false);
    if !executable {
        return;
    }
    match std::process::Command::new(&script).spawn() {
        Ok(_) => info!("started {}", script.display()),
        Err(e) => warn!("cannot run {}: {}", script.display(), e),
    }
}
