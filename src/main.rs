mod config;
mod controller;
mod error;
mod identity;
mod processor;
mod records;
mod resolver;
mod routes;
mod storage;

#[cfg(test)]
mod tests;

#[macro_use]
extern crate tracing;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use mimalloc::MiMalloc;
use poem::listener::TcpListener;
use poem::Server;
use tokio::sync::Semaphore;
use tracing_subscriber::EnvFilter;

use crate::controller::UploadCoordinator;
use crate::identity::TokenTable;
use crate::processor::{ImageTransformer, TransformSettings};
use crate::resolver::FileResolver;
use crate::routes::StowageApi;
use crate::storage::BlobStore;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[derive(Debug, Parser)]
#[clap(name = "stowage", version, about = "Owner-scoped file uploads with on-demand image variants.")]
struct Args {
    #[clap(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Runs the server with the given configuration.
    Run {
        /// The path to the YAML config file.
        #[clap(short, long, env = "STOWAGE_CONFIG", default_value = "config.yaml")]
        config: PathBuf,
    },

    /// Writes an example configuration file.
    Init {
        /// Where to write the config file.
        #[clap(short, long, default_value = "config.yaml")]
        out: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args: Args = Args::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("stowage=info,poem=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match args.command {
        Command::Run { config } => run_server(config).await,
        Command::Init { out } => run_init(out).await,
    }
}

async fn run_init(out: PathBuf) -> Result<()> {
    if tokio::fs::metadata(&out).await.is_ok() {
        return Err(anyhow::anyhow!("refusing to overwrite existing file {:?}", out));
    }

    tokio::fs::write(&out, config::EXAMPLE_CONFIG).await?;
    info!("wrote example config to {:?}", out);

    Ok(())
}

async fn run_server(config_path: PathBuf) -> Result<()> {
    config::init(&config_path).await?;
    let cfg = config::config();

    let records = cfg.records.connect().await?;

    let blobs = BlobStore::new(&cfg.storage_root);
    tokio::fs::create_dir_all(blobs.root()).await?;

    let limiter = cfg.max_concurrency.map(Semaphore::new).map(Arc::new);
    let settings = TransformSettings {
        filter: cfg.resize_filter,
        avif_speed: cfg.avif_speed,
    };
    let transformer = ImageTransformer::new(
        FileResolver::new(records.clone()),
        blobs.clone(),
        settings,
        limiter,
    );

    let coordinator = UploadCoordinator::new(blobs, records, transformer)
        .with_max_upload_size(cfg.max_upload_size);

    let identity = TokenTable::new(cfg.identity.tokens.clone());
    if cfg.identity.tokens.is_empty() {
        warn!("no access tokens configured, every request will be rejected");
    }

    let api = StowageApi::new(Arc::new(coordinator), Arc::new(identity));
    let app = routes::build(api, &cfg.base_path, cfg.max_upload_size);

    let addr = format!("{}:{}", &cfg.host, cfg.port);
    info!("serving on http://{}{}", addr, cfg.base_path);
    Server::new(TcpListener::bind(addr)).run(app).await?;

    Ok(())
}
