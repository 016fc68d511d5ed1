use anyhow::{Context, Result};
use clap::Parser;
use screenapp_upload::{Config, UploadClient, UploadMode, config};
use std::{process::ExitCode, time::Instant};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

mod ui;

#[derive(Parser)]
#[command(name = "screenapp-upload")]
#[command(version)]
#[command(about = "Upload a file to ScreenApp")]
#[command(long_about = "Upload a file to ScreenApp.

All settings come from the environment (a .env file in the working directory is
loaded first). Required: AUTHENTICATION_TOKEN, TEAM_ID, FOLDER_ID, FILE_PATH.
Optional: API_BASE_URL, CONTENT_TYPE, UPLOAD_MODE (multipart, simple, auto),
CHUNK_SIZE, UPLOAD_CONCURRENCY, PART_ATTEMPTS, PART_RETRY_BACKOFF, DESCRIPTION,
RECORDER_NAME, RECORDER_EMAIL, NEEDS_CONVERSION.")]
struct Cli {}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let _cli = Cli::parse();

    let result = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")
        .and_then(|rt| rt.block_on(run()));

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            ui::print_error(&e);
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<()> {
    let config = config::read_config()?;
    let client = UploadClient::from_config(&config)?;

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupted, stopping after the current part");
                cancel.cancel();
            }
        }
    });

    let started = Instant::now();
    let object = match resolve_mode(&config)? {
        UploadMode::Simple => {
            println!("Uploading {} in a single request...", config.file_path.display());
            client
                .simple_upload(&config.file_path, &config.content_type, &config.metadata)
                .await?
        }
        _ => {
            client
                .multipart_upload_with(
                    &config.file_path,
                    &config.content_type,
                    &config.upload,
                    cancel,
                    ui::print_event,
                )
                .await?
        }
    };

    ui::print_success(&object, started.elapsed());
    Ok(())
}

fn resolve_mode(config: &Config) -> Result<UploadMode> {
    if config.upload_mode != UploadMode::Auto {
        return Ok(config.upload_mode);
    }

    let file_size = std::fs::metadata(&config.file_path)
        .with_context(|| format!("Failed to read {}", config.file_path.display()))?
        .len();

    if file_size > config.upload.chunk_size {
        Ok(UploadMode::Multipart)
    } else {
        Ok(UploadMode::Simple)
    }
}
