//! studio-uploader - Upload client for studio-relay

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use studio_uploader::client::http_client;
use studio_uploader::config::UploaderConfig;
use studio_uploader::{chunked, direct, presigned, ProgressFn, UploadClient};

/// Command-line arguments for studio-uploader
#[derive(Parser, Debug)]
#[command(name = "studio-uploader")]
#[command(about = "Upload media files through studio-relay")]
#[command(version)]
struct Args {
    /// Path to uploader.toml
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Relay base URL
    #[arg(long, env = "STUDIO_BASE_URL", global = true)]
    base_url: Option<String>,

    /// Bearer token
    #[arg(long, env = "STUDIO_TOKEN", global = true, hide_env_values = true)]
    token: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Upload the whole file in one request
    Direct {
        file: PathBuf,
        /// Destination key instead of the relay-derived one
        #[arg(long)]
        key: Option<String>,
    },
    /// Upload the file in chunks
    Chunked {
        file: PathBuf,
        /// Chunk size in bytes
        #[arg(long)]
        chunk_size: Option<usize>,
        #[arg(long)]
        content_type: Option<String>,
    },
    /// PUT the file to a pre-signed vendor URL
    Presigned {
        file: PathBuf,
        url: String,
        #[arg(long)]
        content_type: Option<String>,
    },
}

/// Logs every tenth percent
fn log_progress() -> ProgressFn {
    Arc::new(|percent| {
        if percent % 10 == 0 {
            info!("Upload progress: {}%", percent);
        }
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    info!(
        "studio-uploader v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    let args = Args::parse();

    let mut config =
        UploaderConfig::load(args.config.as_deref()).context("Failed to load uploader configuration")?;
    if args.base_url.is_some() {
        config.base_url = args.base_url;
    }
    if args.token.is_some() {
        config.token = args.token;
    }
    if let Command::Chunked {
        chunk_size: Some(size),
        ..
    } = &args.command
    {
        config.chunk_size = *size;
    }

    match args.command {
        Command::Direct { file, key } => {
            let client = UploadClient::new(&config)?;
            let receipt =
                direct::upload_file(&client, &file, &client.upload_url(), key.as_deref(), log_progress())
                    .await
                    .with_context(|| format!("Direct upload of {} failed", file.display()))?;
            println!("{}", receipt.url.unwrap_or_default());
        }
        Command::Chunked {
            file, content_type, ..
        } => {
            let client = UploadClient::new(&config)?;
            let receipt = chunked::upload_chunked(&client, &file, content_type.as_deref(), log_progress())
                .await
                .with_context(|| format!("Chunked upload of {} failed", file.display()))?;
            println!("{}", receipt.url.unwrap_or_default());
        }
        Command::Presigned {
            file,
            url,
            content_type,
        } => {
            let http = http_client(&config)?;
            presigned::upload_presigned(
                &http,
                &config.retry_policy(),
                &file,
                &url,
                content_type.as_deref(),
                log_progress(),
            )
            .await
            .with_context(|| format!("Pre-signed upload of {} failed", file.display()))?;
            println!("uploaded");
        }
    }

    Ok(())
}
