//! Linkhub CLI - provision and maintain link nodes

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use linkhub_hub::{HubConfig, HubService, RouteTable};
use linkhub_keys::WgKeygen;
use linkhub_runtime::DockerRuntime;
use linkhub_store::LinkConfigStore;

/// Linkhub - tunnel endpoints in managed containers, routed by domain
#[derive(Parser, Debug)]
#[command(name = "linkhub")]
#[command(about = "Provision and maintain link tunnel nodes", long_about = None)]
#[command(version = env!("GIT_TAG"))]
#[command(long_version = concat!(env!("GIT_TAG"), "\nCommit: ", env!("GIT_HASH"), "\nBuilt: ", env!("BUILD_TIME")))]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Public hostname or address of this hub, used in link endpoints
    #[arg(long, env = "LINKHUB_PUBLIC_HOST", global = true, default_value = "localhost")]
    public_host: String,

    /// Image reference for link containers
    #[arg(long, env = "LINKHUB_IMAGE", global = true, default_value = "linkhub/link:latest")]
    image: String,

    /// Docker network link containers attach to
    #[arg(long, env = "LINKHUB_NETWORK", global = true, default_value = "linkhub")]
    network: String,

    /// Directory holding link config records (default: ~/.linkhub/links)
    #[arg(long, env = "LINKHUB_LINK_DIR", global = true)]
    link_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "info")]
    log_level: String,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Bootstrap on first run, or restore all persisted links after a
    /// host restart (stable ports and keys)
    Start,

    /// Provision a link node (idempotent: converges an existing link)
    Provision {
        /// Link name; also the container name
        name: String,

        /// Domain routed to this link (repeatable, order matters)
        #[arg(long = "domain", required = true)]
        domains: Vec<String>,

        /// Public key of the remote tunnel peer
        #[arg(long)]
        remote_pubkey: String,
    },

    /// List persisted links and their port bindings
    List,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level)?;

    let link_dir = match &cli.link_dir {
        Some(dir) => dir.clone(),
        None => dirs::home_dir()
            .context("Failed to get home directory")?
            .join(".linkhub")
            .join("links"),
    };

    match cli.command {
        Commands::Start => {
            let service = build_service(&cli, &link_dir)?;
            let report = service.start_or_restore().await?;

            for name in &report.restored {
                println!("restored: {}", name);
            }
            for (name, err) in &report.failed {
                eprintln!("failed: {}: {}", name, err);
            }
            if !report.failed.is_empty() {
                anyhow::bail!("{} link(s) failed to restore", report.failed.len());
            }
        }

        Commands::Provision {
            ref name,
            ref domains,
            ref remote_pubkey,
        } => {
            let service = build_service(&cli, &link_dir)?;
            service
                .store()
                .ensure_created()
                .context("Failed to create link record directory")?;

            info!("Provisioning link '{}'", name);
            let endpoints = service.provision_link(name, domains, remote_pubkey).await?;
            println!("{}", serde_json::to_string_pretty(&endpoints)?);
        }

        Commands::List => {
            let store = LinkConfigStore::new(&link_dir);
            let names = store
                .list_names()
                .with_context(|| format!("Failed to read link record directory {:?}", link_dir))?;
            for name in names {
                match store.read(&name) {
                    Ok(record) => println!(
                        "{}  wg={}  udp={}/{}  {}",
                        record.name,
                        display_port(record.wg_port),
                        display_port(record.udp_proxy_port),
                        display_port(record.udp_proxy_port_2),
                        record.domain_regex,
                    ),
                    Err(e) => eprintln!("{}  <unreadable: {}>", name, e),
                }
            }
        }
    }

    Ok(())
}

fn build_service(cli: &Cli, link_dir: &PathBuf) -> Result<HubService> {
    let runtime = DockerRuntime::connect().context("Failed to connect to Docker")?;
    let config = HubConfig::new(&cli.public_host, &cli.image, &cli.network, link_dir);

    Ok(HubService::new(
        config,
        Arc::new(runtime),
        Arc::new(WgKeygen::new()),
        Arc::new(RouteTable::new()),
    ))
}

fn display_port(port: Option<u16>) -> String {
    port.map(|p| p.to_string()).unwrap_or_else(|| "-".to_string())
}

fn init_logging(log_level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(log_level))
        .context("Failed to initialize logging filter")?;

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    Ok(())
}
