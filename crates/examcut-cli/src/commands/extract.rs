//! The (only, for now) CLI command: run one extraction job against a PDF and
//! report its outcome via a process exit code.

use anyhow::{Context, Result};
use examcut::core::config::{apply_overrides, credentials_from_env, ConfigOverrides};
use examcut::crop::DefaultImageCropper;
use examcut::ocr::{LocalOcrEngine, OcrEngine};
use examcut::package::DefaultZipPackager;
use examcut::raster::PdfiumRasterizer;
use examcut::{Collaborators, JobConfig, JobStatus, RemoteCredentials, Strategy};
use serde::Deserialize;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
pub enum StrategyArg {
    LocalOnly,
    LocalThenRemote,
    ManualFallback,
}

impl From<StrategyArg> for Strategy {
    fn from(value: StrategyArg) -> Self {
        match value {
            StrategyArg::LocalOnly => Strategy::LocalOnly,
            StrategyArg::LocalThenRemote => Strategy::LocalThenRemote,
            StrategyArg::ManualFallback => Strategy::ManualFallback,
        }
    }
}

#[derive(Deserialize)]
struct CredentialsFile {
    app_id: String,
    app_key: String,
}

fn load_credentials(path: Option<PathBuf>) -> Result<Option<RemoteCredentials>> {
    if let Some(path) = path {
        let body = std::fs::read_to_string(&path).with_context(|| format!("failed to read {}", path.display()))?;
        let parsed: CredentialsFile =
            serde_json::from_str(&body).with_context(|| format!("failed to parse {} as JSON", path.display()))?;
        return Ok(Some(RemoteCredentials { app_id: parsed.app_id, app_key: parsed.app_key }));
    }
    Ok(credentials_from_env())
}

/// Maps job outcomes to the CLI's exit code contract: `0` full success,
/// `10` partial success, `20` failed, `30` invalid input.
pub async fn run(
    pdf: PathBuf,
    out: PathBuf,
    strategy: StrategyArg,
    dpi: u32,
    max_retries: u32,
    remote_credentials_file: Option<PathBuf>,
    tessdata_path: Option<PathBuf>,
) -> Result<ExitCode> {
    if !pdf.exists() {
        eprintln!("examcut: input PDF does not exist: {}", pdf.display());
        return Ok(ExitCode::from(30));
    }

    let remote_credentials = load_credentials(remote_credentials_file)?;

    let config = apply_overrides(
        JobConfig::default(),
        ConfigOverrides {
            strategy: Some(strategy.into()),
            dpi: Some(dpi),
            max_retries: Some(max_retries),
            remote_credentials,
        },
    );

    let rasterizer = PdfiumRasterizer::new().context("failed to initialize PDF rasterizer")?;

    #[cfg(feature = "tesseract-ocr")]
    let local_recognizer: Arc<dyn examcut::ocr::local::LocalRecognizer> = {
        let datapath = tessdata_path.as_deref().and_then(|p| p.to_str()).unwrap_or("");
        Arc::new(examcut::ocr::TesseractRecognizer::new(datapath).context("failed to initialize local OCR backend")?)
    };
    #[cfg(not(feature = "tesseract-ocr"))]
    let _ = tessdata_path;
    #[cfg(not(feature = "tesseract-ocr"))]
    let local_recognizer: Arc<dyn examcut::ocr::local::LocalRecognizer> = Arc::new(examcut::ocr::local::NullRecognizer);

    let local_engine = LocalOcrEngine::new(local_recognizer);

    #[cfg(feature = "remote-ocr")]
    let remote_engine_holder = config
        .remote_credentials
        .clone()
        .map(|creds| examcut::ocr::RemoteOcrEngine::new("https://ocr.example.com/v1/recognize", creds));
    #[cfg(feature = "remote-ocr")]
    let remote_engine_ref: Option<&dyn OcrEngine> = remote_engine_holder.as_ref().map(|e| e as &dyn OcrEngine);

    #[cfg(not(feature = "remote-ocr"))]
    let remote_engine_ref: Option<&dyn OcrEngine> = None;

    let cropper = DefaultImageCropper;
    let packager = DefaultZipPackager;

    let collaborators = Collaborators {
        rasterizer: &rasterizer,
        local_engine: &local_engine,
        remote_engine: remote_engine_ref,
        cropper: &cropper,
        packager: Some(&packager),
    };

    let outcome = examcut::submit(&pdf, &out, config, collaborators, None, None)
        .await
        .context("extraction job failed")?;

    println!(
        "{}",
        serde_json::to_string_pretty(&outcome.manifest).context("failed to serialize manifest for stdout")?
    );

    Ok(match outcome.status {
        JobStatus::Ok => ExitCode::from(0),
        JobStatus::Partial => ExitCode::from(10),
        JobStatus::Failed => ExitCode::from(20),
    })
}
