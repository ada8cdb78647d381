//! Perimeter Node binary
//!
//! Runs the node loop and dashboard, replays capture files through the
//! ingestion pipeline, or prints the effective configuration.

use clap::{Args, Parser, Subcommand};
use perimeter_node::{
    collab, spawn_reader, start_web_server, ByteSource, ConfigHandle, MonotonicClock, Node,
    NodeConfig, NodeSnapshot, DEFAULT_CONFIG_PATH,
};
use std::path::{Path, PathBuf};
use tokio::sync::watch;
use tracing::{error, info, warn, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser)]
#[command(name = "perimeter_node")]
#[command(about = "Perimeter Node - companion-board ingestion, history and alerting")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(author = "Austin Couch")]
#[command(
    long_about = "Ingests distance frames from a companion board, keeps a bounded reading history and raises alerts, with a web dashboard"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Configuration file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Web server bind address (overrides the configuration file)
    #[arg(long)]
    host: Option<String>,

    /// Web server port (overrides the configuration file)
    #[arg(short, long)]
    port: Option<u16>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the node loop and web server (default)
    Serve(ServeArgs),

    /// Feed a capture file through the parser and print the resulting state
    Replay(ReplayArgs),

    /// Print the effective configuration as TOML
    Config,
}

#[derive(Args, Default)]
struct ServeArgs {
    /// Companion source: stdin, a device/file path, or tcp://host:port
    #[arg(short, long)]
    source: Option<String>,

    /// Static files directory (optional)
    #[arg(long)]
    static_dir: Option<String>,

    /// Disable CORS headers
    #[arg(long)]
    no_cors: bool,

    /// Maximum WebSocket connections
    #[arg(long)]
    max_connections: Option<usize>,

    /// Run without the web server
    #[arg(long)]
    no_web: bool,
}

#[derive(Args)]
struct ReplayArgs {
    /// Capture file with newline-framed companion output
    file: PathBuf,

    /// Output format: json or pretty
    #[arg(short, long, default_value = "pretty")]
    format: String,

    /// Detection threshold in cm (overrides the configuration file)
    #[arg(short, long)]
    threshold: Option<f32>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing/logging
    init_logging(&cli)?;

    match &cli.command {
        Some(Commands::Serve(args)) => {
            print_banner();
            serve_command(&cli, args).await?;
        }
        Some(Commands::Replay(args)) => {
            replay_command(&cli, args).await?;
        }
        Some(Commands::Config) => {
            config_command(&cli)?;
        }
        None => {
            // Default to serve command
            print_banner();
            serve_command(&cli, &ServeArgs::default()).await?;
        }
    }

    Ok(())
}

fn init_logging(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    let level = if cli.debug {
        Level::DEBUG
    } else if cli.verbose {
        Level::INFO
    } else {
        Level::WARN
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    Ok(())
}

fn print_banner() {
    println!("Perimeter Node");
    println!("   Version: {}", env!("CARGO_PKG_VERSION"));
    println!("   Companion ingestion, history and alerting");
    println!();
}

/// The file configuration is read from and persisted to, if any.
///
/// An explicit `--config` always counts; the default path only when present.
fn config_path(cli: &Cli) -> Option<PathBuf> {
    match &cli.config {
        Some(path) => Some(path.clone()),
        None => {
            let default = PathBuf::from(DEFAULT_CONFIG_PATH);
            default.exists().then_some(default)
        }
    }
}

fn load_config(cli: &Cli) -> Result<NodeConfig, Box<dyn std::error::Error>> {
    let path = config_path(cli);
    let mut config = NodeConfig::load_or_default(path.as_deref())?;
    config.web = config.web.with_bind(cli.host.clone(), cli.port);
    Ok(config)
}

async fn serve_command(cli: &Cli, args: &ServeArgs) -> Result<(), Box<dyn std::error::Error>> {
    info!("Starting perimeter node...");

    let mut config = load_config(cli)?;
    if let Some(source) = &args.source {
        config.peer.source = source.clone();
    }

    let mut web_config = config.web.clone().with_cors(config.web.enable_cors && !args.no_cors);
    if let Some(static_dir) = &args.static_dir {
        web_config = web_config.with_static_path(Some(static_dir.clone()));
        info!("Using static files from: {}", static_dir);
    }
    if let Some(max) = args.max_connections {
        web_config = web_config.with_max_websocket_connections(max);
    }
    config.web = web_config.clone();
    config.validate()?;

    let source: ByteSource = config.peer.source.parse()?;
    let channel_capacity = config.peer.channel_capacity;

    info!("Node configuration:");
    info!("  - Source: {}", source);
    info!("  - Threshold: {:.1}cm", config.system.distance_threshold_cm);
    info!("  - Alert cooldown: {}ms", config.system.alert_cooldown_ms);
    info!("  - History capacity: {}", config.system.history_capacity);
    info!("  - Loop interval: {}ms", config.system.loop_interval_ms);

    #[cfg(feature = "gpio")]
    info!("GPIO status LED support enabled");

    #[cfg(not(feature = "gpio"))]
    info!("GPIO status LED not available (feature not compiled)");

    let handle = ConfigHandle::new(config, config_path(cli));
    let (outbox, outbound) = collab::outbox(collab::OUTBOX_CAPACITY);
    let outbox_task = collab::spawn_outbox_logger(outbound);

    let node = Node::new(handle, MonotonicClock::shared(), outbox).await;
    let (inbound, reader) = spawn_reader(source, channel_capacity);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for shutdown signal: {}", e);
            return;
        }
        info!("Shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    let web_task = if web_config.enabled && !args.no_web {
        info!("Web server configuration:");
        info!("  - Bind address: {}", web_config.bind_address());
        info!("  - CORS enabled: {}", web_config.enable_cors);
        info!(
            "  - Max WebSocket connections: {}",
            web_config.max_websocket_connections
        );

        let app_state = node.app_state();
        let shutdown = wait_for_shutdown(shutdown_rx.clone());
        Some(tokio::spawn(async move {
            if let Err(e) = start_web_server(web_config, app_state, shutdown).await {
                error!("Web server stopped: {}", e);
            }
        }))
    } else {
        info!("Web server disabled");
        None
    };

    node.run(inbound, wait_for_shutdown(shutdown_rx)).await;

    reader.abort();
    if let Some(web_task) = web_task {
        if let Err(e) = web_task.await {
            warn!("Web server task ended abnormally: {}", e);
        }
    }
    outbox_task.abort();

    Ok(())
}

async fn wait_for_shutdown(mut rx: watch::Receiver<bool>) {
    if rx.wait_for(|stop| *stop).await.is_err() {
        // sender gone without a signal; keep running
        std::future::pending::<()>().await;
    }
}

async fn replay_command(cli: &Cli, args: &ReplayArgs) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = load_config(cli)?;
    if let Some(threshold) = args.threshold {
        config.system.distance_threshold_cm = threshold;
    }
    config.validate()?;

    let bytes = tokio::fs::read(&args.file).await?;
    let (outbox, _outbound) = collab::outbox(collab::OUTBOX_CAPACITY);
    let mut node = Node::new(
        ConfigHandle::new(config, None),
        MonotonicClock::shared(),
        outbox,
    )
    .await;

    let mut outcomes = node.ingest_bytes(&bytes).await;
    outcomes.extend(node.finish_ingest().await);
    let snapshot = node.snapshot().await;
    let history = node.state().read().await.history_entries();
    let stats = node.stats();

    match args.format.as_str() {
        "json" => {
            let json = serde_json::to_string_pretty(&serde_json::json!({
                "snapshot": snapshot,
                "history": history,
                "stats": stats,
            }))?;
            println!("{}", json);
        }
        "pretty" => {
            print_pretty_snapshot(&args.file, outcomes.len(), &snapshot);
            println!("Ingest:");
            println!("  JSON frames: {}", stats.json_frames);
            println!("  Legacy readings: {}", stats.legacy_readings);
            println!("  Heartbeats: {}", stats.heartbeats);
            println!("  Alerts: {}", stats.alerts);
            println!("  Malformed: {}", stats.malformed);
            println!("  Console noise: {}", stats.console_noise);
        }
        _ => {
            error!(
                "Unsupported format: {}. Use 'json' or 'pretty'",
                args.format
            );
            std::process::exit(1);
        }
    }

    Ok(())
}

fn config_command(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(cli)?;
    match config_path(cli) {
        Some(path) => println!("# effective configuration ({})", path.display()),
        None => println!("# effective configuration (defaults)"),
    }
    print!("{}", config.to_toml()?);
    Ok(())
}

fn print_pretty_snapshot(file: &Path, events: usize, snapshot: &NodeSnapshot) {
    println!("Replay of {} ({} events)", file.display(), events);
    println!("==========================================");
    println!();

    println!("Current reading:");
    println!("  Distance: {:.1} cm", snapshot.distance);
    println!("  Status: {}", snapshot.status);
    println!(
        "  Detected: {}",
        if snapshot.object_detected { "yes" } else { "no" }
    );
    println!(
        "  Companion alert: {}",
        if snapshot.alert_active { "asserted" } else { "clear" }
    );
    println!("  Mode: {:?}", snapshot.mode);
    println!("  Companion history: {:?}", snapshot.companion_history);
    println!();

    println!("History:");
    println!("  Stored readings: {}", snapshot.history_count);
    println!("  Average (last 10): {:.1} cm", snapshot.average_distance);
    println!(
        "  Detections (last 60s): {}",
        snapshot.detections_last_minute
    );
    println!("  Threshold: {:.1} cm", snapshot.threshold);
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parsing() {
        let cli = Cli::try_parse_from(["perimeter_node", "--port", "9090"]).unwrap();
        assert_eq!(cli.port, Some(9090));
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_default_values() {
        let cli = Cli::try_parse_from(["perimeter_node"]).unwrap();
        assert_eq!(cli.port, None);
        assert_eq!(cli.host, None);
        assert!(cli.config.is_none());
        assert!(!cli.verbose);
    }

    #[test]
    fn test_serve_source() {
        let cli =
            Cli::try_parse_from(["perimeter_node", "serve", "--source", "tcp://pi:9000"]).unwrap();
        match cli.command {
            Some(Commands::Serve(args)) => {
                assert_eq!(args.source.as_deref(), Some("tcp://pi:9000"));
                assert!(!args.no_web);
            }
            _ => panic!("expected serve"),
        }
    }

    #[test]
    fn test_replay_args() {
        let cli = Cli::try_parse_from([
            "perimeter_node",
            "replay",
            "capture.log",
            "--format",
            "json",
            "--threshold",
            "25",
        ])
        .unwrap();
        match cli.command {
            Some(Commands::Replay(args)) => {
                assert_eq!(args.file, PathBuf::from("capture.log"));
                assert_eq!(args.format, "json");
                assert_eq!(args.threshold, Some(25.0));
            }
            _ => panic!("expected replay"),
        }
    }
}
