//! Entry point for the **glasspane** daemon and its command-line client.
//!
//! ```text
//! glasspane [--socket PATH]                  run the daemon
//! glasspane [--socket PATH] fire <id>        forward a fired hotkey
//! glasspane [--socket PATH] ctl '<json>'     send any control command
//! ```
//!
//! SIGINT and SIGTERM stop the daemon cleanly, releasing its Hyprland binds.
//!
//! The daemon spawns its [`CommandSource`](glasspane::traits::CommandSource)
//! on a background thread and processes incoming commands on the main
//! thread.  Engine events are handled on a second background thread.

use clap::{Parser, Subcommand};
use glasspane::command::Command;
use glasspane::config::{config_dir, default_socket_path, Settings};
use glasspane::engine::{Collaborators, Engine};
use glasspane::hyprland::{HyprlandBinds, HyprlandWm, SysProcesses};
use glasspane::ipc::{daemon_running, send_command, UnixSocketListener};
use glasspane::persist::JsonConfigStore;
use glasspane::traits::{CommandSource, EngineEvent};
use log::{debug, error, info};
use std::path::PathBuf;
use std::sync::{mpsc, Arc};

/// Try to load settings from `$XDG_CONFIG_HOME/glasspane/config.json`,
/// falling back to compiled-in defaults.
fn load_settings() -> Settings {
    let path = config_dir().join("config.json");
    match Settings::load(&path) {
        Ok(settings) => {
            info!("loaded settings from {}", path.display());
            settings
        }
        Err(e) => {
            info!("no settings file ({}), using defaults", e);
            Settings::default()
        }
    }
}

/// Pin windows to numbered desktops and jump back to them with a hotkey.
#[derive(Parser, Debug)]
#[command(name = "glasspane")]
#[command(about = "Pin windows to numbered desktops and jump back to them with a hotkey")]
struct Cli {
    /// Control socket path
    #[arg(long, value_name = "PATH", global = true)]
    socket: Option<PathBuf>,

    /// Talk to a running daemon instead of starting one
    #[command(subcommand)]
    client: Option<ClientCommand>,
}

#[derive(Subcommand, Debug)]
enum ClientCommand {
    /// Forward a fired hotkey id to the daemon
    Fire { id: u32 },

    /// Send a JSON control command, e.g. '{"Switch":3}' or '"Reload"'
    Ctl {
        #[arg(value_parser = parse_command)]
        command: Command,
    },
}

fn parse_command(json: &str) -> Result<Command, String> {
    serde_json::from_str(json).map_err(|e| e.to_string())
}

//  Main

fn main() {
    env_logger::init();

    let cli = Cli::parse();
    match cli.client {
        None => run_daemon(cli.socket),
        Some(ClientCommand::Fire { id }) => run_client(cli.socket, Command::Fire(id)),
        Some(ClientCommand::Ctl { command }) => run_client(cli.socket, command),
    }
}

/// Send one command to a running daemon.
fn run_client(socket: Option<PathBuf>, cmd: Command) {
    let path = socket.unwrap_or_else(|| load_settings().socket_path.unwrap_or_else(default_socket_path));
    if let Err(e) = send_command(&path, &cmd) {
        eprintln!("glasspane: cannot reach daemon at {}: {}", path.display(), e);
        std::process::exit(1);
    }
}

/// Normal daemon mode.
fn run_daemon(socket_override: Option<PathBuf>) {
    let settings = load_settings();
    let custom_socket = socket_override.or_else(|| settings.socket_path.clone());
    let socket = custom_socket.clone().unwrap_or_else(default_socket_path);

    // A second daemon would take over the first one's binds.
    if daemon_running(&socket) {
        error!("glasspane is already running on {}", socket.display());
        std::process::exit(1);
    }

    let exe = match std::env::current_exe() {
        Ok(exe) => exe,
        Err(e) => {
            error!("cannot locate own executable: {}", e);
            std::process::exit(1);
        }
    };

    let processes = Arc::new(SysProcesses::new());
    let wm = Arc::new(HyprlandWm::new(Arc::clone(&processes)));
    let (engine, events) = Engine::new(
        Collaborators {
            windows: Arc::clone(&wm),
            processes,
            desktops: wm,
            config_store: Arc::new(JsonConfigStore::in_config_dir()),
            hotkeys: HyprlandBinds::new(exe, custom_socket),
        },
        settings,
    );
    let engine = Arc::new(engine);

    let (cmd_tx, cmd_rx) = mpsc::channel::<Command>();

    let stop_tx = cmd_tx.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        let _ = stop_tx.send(Command::Shutdown);
    }) {
        error!("cannot install signal handler: {}", e);
    }

    spawn_command_sources(cmd_tx, socket.clone());
    spawn_event_loop(Arc::clone(&engine), events);

    for failure in engine.start() {
        error!("{}", failure);
    }

    info!("glasspane running");
    engine.run(cmd_rx);
    let _ = std::fs::remove_file(&socket);
    info!("glasspane stopped");
}

//  Helpers

fn spawn_command_sources(tx: mpsc::Sender<Command>, socket: PathBuf) {
    std::thread::spawn(move || {
        let mut source = UnixSocketListener::new(&socket);
        if let Err(e) = source.run(tx) {
            error!("socket listener error: {}", e);
        }
    });
}

/// Apply engine policy to events and log every change to the assignment
/// table.
fn spawn_event_loop<W, P, D, C, H>(engine: Arc<Engine<W, P, D, C, H>>, events: mpsc::Receiver<EngineEvent>)
where
    W: glasspane::traits::WindowSystem + 'static,
    P: glasspane::traits::ProcessInspector + 'static,
    D: glasspane::traits::DesktopDriver + 'static,
    C: glasspane::traits::ConfigStore + 'static,
    H: glasspane::traits::HotkeyInputSource + 'static,
{
    let changes = engine.store().subscribe();
    let store = Arc::clone(engine.store());
    std::thread::spawn(move || {
        for change in changes {
            debug!("assignment table v{}", change.version);
            for assignment in store.get_all() {
                debug!("  {}", assignment);
            }
        }
    });

    std::thread::spawn(move || {
        for event in events {
            engine.on_event(&event);
        }
    });
}
