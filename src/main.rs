//! Display client - Main Entry Point
//!
//! Runs the device-side broker session for a display endpoint and offers a
//! few maintenance commands for the persisted identity and broker endpoint.

use clap::{Parser, Subcommand};
use display_client::callbacks::ClientCallbacks;
use display_client::client::DeviceClient;
use display_client::config::ClientConfig;
use display_client::observability::{init_default_logging, metrics};
use display_client::platform::HostPlatform;
use display_client::protocol::{Command, ContentPush, DeviceIdentity, TopicSet};
use display_client::session::stored_endpoint;
use display_client::store::{ConfigStore, FileConfigStore};
use display_client::transport::{BrokerEndpoint, RumqttcTransport};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};

/// Device-side MQTT client for networked displays
#[derive(Parser)]
#[command(name = "display-client")]
#[command(about = "Device-side MQTT session client for networked display endpoints")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE", env = "DISPLAY_CLIENT_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect to the broker and run until interrupted
    Run,
    /// Print the device identity and topic namespace
    Identity,
    /// Validate configuration
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Persist a new broker endpoint for subsequent runs
    SetBroker {
        #[arg(long)]
        host: String,
        #[arg(long)]
        port: u16,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_default_logging();

    let config = match load_configuration(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Run => run_client(config).await,
        Commands::Identity => show_identity(&config),
        Commands::Config { show } => handle_config_command(&config, show),
        Commands::SetBroker { host, port } => set_broker(&config, &host, port),
    };

    if let Err(e) = result {
        error!("Command failed: {}", e);
        process::exit(1);
    }
}

fn load_configuration(
    config_path: &Option<PathBuf>,
) -> Result<ClientConfig, Box<dyn std::error::Error>> {
    match config_path {
        Some(path) => {
            info!("Loading configuration from: {}", path.display());
            Ok(ClientConfig::load_from_file(path)?)
        }
        None => {
            for path_str in ["display-client.toml", "config/display-client.toml"] {
                let path = PathBuf::from(path_str);
                if path.exists() {
                    info!("Loading configuration from: {}", path.display());
                    return Ok(ClientConfig::load_from_file(&path)?);
                }
            }

            info!("No configuration file found, using defaults");
            let config = ClientConfig::default();
            config.validate()?;
            Ok(config)
        }
    }
}

fn open_store(config: &ClientConfig) -> Result<Arc<dyn ConfigStore>, Box<dyn std::error::Error>> {
    Ok(Arc::new(FileConfigStore::open(&config.device.state_file)?))
}

/// Logs every notification the client produces
struct LoggingCallbacks;

impl ClientCallbacks for LoggingCallbacks {
    fn on_connected(&self) {
        info!("Connected to broker");
    }

    fn on_disconnected(&self) {
        warn!("Disconnected from broker");
    }

    fn on_content_received(&self, content: ContentPush) {
        info!(
            content_id = %content.content.id,
            content_type = %content.content.content_type,
            title = %content.content.title,
            "Content received"
        );
    }

    fn on_command_received(&self, command: Command) {
        info!(command = %command.command, params = %command.params, "Command received");
    }

    fn on_broadcast_received(&self, message: String) {
        info!(message = %message, "Broadcast received");
    }

    fn on_error(&self, message: String) {
        error!(message = %message, "Client error");
    }
}

async fn run_client(config: ClientConfig) -> Result<(), Box<dyn std::error::Error>> {
    let store = open_store(&config)?;
    let platform = Arc::new(HostPlatform::from_config(&config.device));
    let client = DeviceClient::new(&config, RumqttcTransport::new(), store, platform)?;
    client.set_callbacks(Arc::new(LoggingCallbacks));

    info!(
        device_id = %client.device_id(),
        broker = %client.broker_info(),
        "Starting display client v{}",
        env!("CARGO_PKG_VERSION")
    );
    client.start();

    let mut sigint = signal::unix::signal(signal::unix::SignalKind::interrupt())?;
    let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;

    tokio::select! {
        _ = sigint.recv() => {
            info!("Received SIGINT, shutting down gracefully...");
        }
        _ = sigterm.recv() => {
            info!("Received SIGTERM, shutting down gracefully...");
        }
    }

    client.stop().await;

    let snapshot = metrics().snapshot();
    info!(
        connects = snapshot.connection.connections_established,
        published = snapshot.messages.messages_published,
        received = snapshot.messages.messages_received,
        "Application shutdown complete"
    );
    Ok(())
}

fn show_identity(config: &ClientConfig) -> Result<(), Box<dyn std::error::Error>> {
    let store = open_store(config)?;
    let identity = DeviceIdentity::load_or_create(store.as_ref())?;
    let topics = TopicSet::for_identity(&config.session.topic_prefix, &identity);
    let endpoint = stored_endpoint(
        store.as_ref(),
        &BrokerEndpoint::new(config.broker.host.clone(), config.broker.port),
    );

    println!("Device ID:    {}", identity.device_id());
    println!("Client ID:    {}", identity.client_id());
    println!("Display name: {}", identity.display_name());
    println!("Broker:       {endpoint}");
    println!("Topics:");
    for topic in topics.all() {
        println!("  {topic}");
    }
    Ok(())
}

fn handle_config_command(
    config: &ClientConfig,
    show: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    config.validate()?;
    if show {
        println!("Current configuration:");
        println!("{}", toml::to_string_pretty(config)?);
    }

    info!("Configuration validation complete");
    Ok(())
}

fn set_broker(config: &ClientConfig, host: &str, port: u16) -> Result<(), Box<dyn std::error::Error>> {
    let endpoint = BrokerEndpoint::parse(&format!("{}:{port}", host.trim()))?;
    let store = open_store(config)?;
    store.set_broker_host(&endpoint.host)?;
    store.set_broker_port(endpoint.port)?;
    println!("Broker endpoint set to {endpoint}");
    Ok(())
}
