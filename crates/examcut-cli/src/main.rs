//! Command-line interface for examcut.

mod commands;

use clap::Parser;
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(name = "examcut", version, about = "Extract individual exam problems from a multi-column test-paper PDF")]
struct Cli {
    /// Path to the input PDF.
    #[arg(long)]
    pdf: std::path::PathBuf,

    /// Output directory for the extracted problem images and manifest.
    #[arg(long)]
    out: std::path::PathBuf,

    /// OCR strategy.
    #[arg(long, value_enum, default_value = "local-then-remote")]
    strategy: commands::StrategyArg,

    /// Rasterization DPI.
    #[arg(long, default_value_t = examcut::JobConfig::DEFAULT_DPI)]
    dpi: u32,

    /// Maximum retries for a transient OCR failure.
    #[arg(long, default_value_t = examcut::JobConfig::DEFAULT_MAX_RETRIES)]
    max_retries: u32,

    /// Path to a JSON file with `{"app_id": ..., "app_key": ...}`, overriding
    /// `REMOTE_OCR_APP_ID` / `REMOTE_OCR_APP_KEY`.
    #[arg(long)]
    remote_credentials_file: Option<std::path::PathBuf>,

    /// Directory containing Tesseract's `tessdata` trained-data files, used
    /// by the local OCR backend. Falls back to `TESSDATA_PREFIX` if unset.
    #[arg(long, env = "TESSDATA_PREFIX")]
    tessdata_path: Option<std::path::PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();
    match commands::run(
        cli.pdf,
        cli.out,
        cli.strategy,
        cli.dpi,
        cli.max_retries,
        cli.remote_credentials_file,
        cli.tessdata_path,
    )
    .await
    {
        Ok(exit_code) => exit_code,
        Err(err) => {
            tracing::error!(error = %err, "examcut failed");
            eprintln!("examcut: {err:#}");
            ExitCode::from(20)
        }
    }
}
