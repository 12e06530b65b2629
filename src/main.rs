//! golem-build CLI
//!
//! Entry point for the `golem-build` command-line tool.

use clap::{Args, Parser, Subcommand};
use golem_build::delivery::{self, DeliveryServer};
use golem_build::signal::{self, SignalState, EXIT_CODE_INTERRUPTED};
use golem_build::{
    BuildService, BuildTaskStatus, CompilationTask, ConfigOverrides, HttpHub, HubApi, PackageCache,
    ServiceConfig,
};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

const EXIT_BUILD_FAILED: u8 = 1;
const EXIT_STARTUP: u8 = 2;

#[derive(Parser)]
#[command(name = "golem-build")]
#[command(about = "Distributed C/C++ compilation over a Golem peer grid", version)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct GlobalArgs {
    /// Path to config file (default: ~/.config/golem-build/config.toml)
    #[arg(long, short = 'c', global = true)]
    config: Option<PathBuf>,

    /// Hub REST endpoint, e.g. http://127.0.0.1:6162
    #[arg(long, global = true)]
    hub_url: Option<String>,

    /// Delivery endpoint port (0 picks a free port)
    #[arg(long, short = 'p', global = true)]
    port: Option<u16>,

    /// Directory receiving uploaded result archives
    #[arg(long, global = true)]
    build_path: Option<PathBuf>,

    /// Host peers use to reach this machine (default: detected)
    #[arg(long, global = true)]
    advertise_host: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a task list on the peer grid
    Build {
        /// JSON array of compilation tasks
        #[arg(long, short = 't')]
        tasks: PathBuf,
    },

    /// List peers known to the hub with their core counts
    Peers {
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Show hub node information
    HubInfo {
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Run only the delivery endpoint until interrupted
    Serve,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = match load_config(&cli.global) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return ExitCode::from(EXIT_STARTUP);
        }
    };

    match cli.command {
        Commands::Build { tasks } => run_build(config, tasks).await,
        Commands::Peers { json } => run_peers(config, json).await,
        Commands::HubInfo { json } => run_hub_info(config, json).await,
        Commands::Serve => run_serve(config).await,
    }
}

fn load_config(args: &GlobalArgs) -> Result<ServiceConfig, golem_build::ConfigError> {
    let config = ServiceConfig::load_or_default(args.config.as_deref())?;
    let overrides = ConfigOverrides {
        hub_url: args.hub_url.clone(),
        server_port: args.port,
        build_path: args.build_path.clone(),
        advertise_host: args.advertise_host.clone(),
    };
    overrides.apply(config)
}

fn connect_hub(config: &ServiceConfig) -> Option<HttpHub> {
    match HttpHub::new(&config.hub_url, &config.app_name) {
        Ok(hub) => Some(hub),
        Err(e) => {
            eprintln!("Hub client error: {}", e);
            None
        }
    }
}

/// Root token for the service plus one cancelled on a second interrupt
fn install_signals() -> (CancellationToken, CancellationToken) {
    let shutdown = CancellationToken::new();
    let abort = CancellationToken::new();
    signal::install(Arc::new(SignalState::new()), shutdown.clone(), abort.clone());
    (shutdown, abort)
}

async fn run_build(config: ServiceConfig, tasks_path: PathBuf) -> ExitCode {
    let tasks = match CompilationTask::load_list(&tasks_path) {
        Ok(tasks) => tasks,
        Err(e) => {
            eprintln!("Error loading task list: {}", e);
            return ExitCode::from(EXIT_STARTUP);
        }
    };
    let Some(hub) = connect_hub(&config) else {
        return ExitCode::from(EXIT_STARTUP);
    };

    let service = match BuildService::bind(&config, Arc::new(hub)).await {
        Ok(service) => service,
        Err(e) => {
            eprintln!("Startup error: {}", e);
            return ExitCode::from(EXIT_STARTUP);
        }
    };

    let (shutdown, abort) = install_signals();
    if let Err(e) = service.start(&shutdown) {
        eprintln!("Startup error: {}", e);
        return ExitCode::from(EXIT_STARTUP);
    }

    let mut events = service.subscribe();
    let progress = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            if event.status.is_terminal() {
                let node = event.node_id.as_deref().unwrap_or("-");
                match event.status {
                    BuildTaskStatus::Succeeded => info!(file = %event.file.display(), node_id = node, "Compiled"),
                    _ => warn!(file = %event.file.display(), node_id = node, message = ?event.message, "Failed"),
                }
            }
        }
    });

    let total = tasks.len();
    for task in tasks {
        service.add_task(task);
    }
    info!(tasks = total, "Queued build");

    let result = tokio::select! {
        ok = service.wait_until_drained() => Some(ok),
        _ = shutdown.cancelled() => None,
    };

    tokio::select! {
        _ = service.stop() => {}
        _ = abort.cancelled() => {
            progress.abort();
            return ExitCode::from(EXIT_CODE_INTERRUPTED);
        }
    }
    progress.abort();

    match result {
        Some(true) => {
            info!(tasks = total, "Build succeeded");
            ExitCode::SUCCESS
        }
        Some(false) => {
            error!("Build failed");
            ExitCode::from(EXIT_BUILD_FAILED)
        }
        None => ExitCode::from(EXIT_CODE_INTERRUPTED),
    }
}

async fn run_peers(config: ServiceConfig, json: bool) -> ExitCode {
    let Some(hub) = connect_hub(&config) else {
        return ExitCode::from(EXIT_STARTUP);
    };
    let peers = match hub.list_peers().await {
        Ok(peers) => peers,
        Err(e) => {
            eprintln!("Error listing peers: {}", e);
            return ExitCode::from(EXIT_STARTUP);
        }
    };

    let mut rows = Vec::with_capacity(peers.len());
    for peer in peers {
        let hardware = match hub.peer_hardware(&peer.node_id).await {
            Ok(hw) => Some(hw),
            Err(e) => {
                warn!(node_id = %peer.node_id, error = %e, "Hardware query failed");
                None
            }
        };
        rows.push((peer, hardware));
    }

    if json {
        let value: Vec<_> = rows
            .iter()
            .map(|(peer, hw)| serde_json::json!({ "peer": peer, "hardware": hw }))
            .collect();
        match serde_json::to_string_pretty(&value) {
            Ok(text) => println!("{}", text),
            Err(e) => {
                eprintln!("Error serializing output: {}", e);
                return ExitCode::from(EXIT_STARTUP);
            }
        }
        return ExitCode::SUCCESS;
    }

    if rows.is_empty() {
        println!("No peers connected to the hub.");
        return ExitCode::SUCCESS;
    }
    println!("Connected peers ({} total):\n", rows.len());
    for (peer, hardware) in &rows {
        println!("  {} ({})", peer.node_id, peer.peer_addr);
        if let Some(name) = &peer.node_name {
            println!("    Name: {}", name);
        }
        match hardware {
            Some(hw) => println!("    Cores: {}", hw.core_count),
            None => println!("    Cores: unknown"),
        }
    }
    ExitCode::SUCCESS
}

async fn run_hub_info(config: ServiceConfig, json: bool) -> ExitCode {
    let Some(hub) = connect_hub(&config) else {
        return ExitCode::from(EXIT_STARTUP);
    };
    let info = match hub.hub_info().await {
        Ok(info) => info,
        Err(e) => {
            eprintln!("Error querying hub: {}", e);
            return ExitCode::from(EXIT_STARTUP);
        }
    };

    if json {
        match serde_json::to_string_pretty(&info) {
            Ok(text) => println!("{}", text),
            Err(e) => {
                eprintln!("Error serializing output: {}", e);
                return ExitCode::from(EXIT_STARTUP);
            }
        }
    } else {
        println!("Hub {} (version {})", info.node_id, info.version);
        if let Some(description) = &info.description {
            println!("  {}", description);
        }
    }
    ExitCode::SUCCESS
}

async fn run_serve(config: ServiceConfig) -> ExitCode {
    let addr = match config.bind_addr() {
        Ok(addr) => addr,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return ExitCode::from(EXIT_STARTUP);
        }
    };
    let router = delivery::router(Arc::new(PackageCache::new()), &config.delivery_settings());
    let server = match DeliveryServer::bind(addr, router).await {
        Ok(server) => server,
        Err(e) => {
            eprintln!("Startup error: {}", e);
            return ExitCode::from(EXIT_STARTUP);
        }
    };

    let (shutdown, abort) = install_signals();
    tokio::select! {
        result = server.run(shutdown) => match result {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                eprintln!("Delivery endpoint error: {}", e);
                ExitCode::from(EXIT_STARTUP)
            }
        },
        _ = abort.cancelled() => ExitCode::from(EXIT_CODE_INTERRUPTED),
    }
}
