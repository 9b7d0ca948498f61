use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{Context, Result};
use clap::Parser;
use client_core::{
    config::{apply_settings_file, load_settings},
    ControllerSnapshot, HttpPredictionEndpoint, UploadPredictionController,
};
use shared::domain::{CropRect, CroppedImage, SubmissionStatus};
use storage::Storage;
use tracing_subscriber::EnvFilter;

/// Upload a crop photo to the disease prediction service and print the result.
#[derive(Parser, Debug)]
struct Args {
    /// Image to classify.
    #[arg(long)]
    image: Option<PathBuf>,
    /// Prediction endpoint, overriding settings.
    #[arg(long)]
    endpoint: Option<String>,
    /// Extra settings file layered over client.toml and the environment.
    #[arg(long)]
    settings: Option<PathBuf>,
    /// Crop rectangle as x,y,width,height in preview pixels.
    #[arg(long, value_parser = parse_crop)]
    crop: Option<CropRect>,
    /// Flip and persist the dark-mode preference before doing anything else.
    #[arg(long)]
    toggle_dark_mode: bool,
}

fn parse_crop(raw: &str) -> Result<CropRect, String> {
    let parts = raw
        .split(',')
        .map(|part| part.trim().parse::<u32>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| format!("invalid crop '{raw}': {e}"))?;
    match parts.as_slice() {
        [x, y, width, height] => Ok(CropRect {
            x: *x,
            y: *y,
            width: *width,
            height: *height,
        }),
        _ => Err(format!("crop '{raw}' must be x,y,width,height")),
    }
}

fn render(snapshot: &ControllerSnapshot) {
    let theme = if snapshot.dark_mode { "dark" } else { "light" };
    println!("Crop Disease Detection [{theme} mode]");

    match &snapshot.selection {
        Some(selection) => {
            println!(
                "Selected: {} ({} bytes) preview={}",
                selection.file_name, selection.size_bytes, selection.preview_uri
            );
            if let Some(cropped) = &selection.cropped {
                let rect = cropped.rect;
                println!(
                    "Crop: {}x{} at ({}, {})",
                    rect.width, rect.height, rect.x, rect.y
                );
            }
        }
        None => println!("Upload an image of your crop"),
    }

    if snapshot.status == SubmissionStatus::Submitting {
        println!("Predicting...");
    }
    if let Some(error) = snapshot.visible_error() {
        println!("Error: {error}");
    }
    if let Some(prediction) = &snapshot.last_prediction {
        println!("Prediction Results:");
        for line in prediction.summary_lines() {
            println!("  {line}");
        }
    }
}

/// Selects, crops and submits. Nothing is uploaded unless the image was accepted.
async fn run_session(
    controller: &Arc<UploadPredictionController>,
    image: Option<&Path>,
    crop: Option<CropRect>,
) {
    let selected = match image {
        Some(path) => match controller.select_path(path).await {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(error = %err, path = %path.display(), "image not selected");
                false
            }
        },
        None => false,
    };
    if let Some(rect) = crop {
        controller.update_crop(CroppedImage::from_rect(rect)).await;
    }
    if selected {
        if let Err(err) = controller.submit().await {
            tracing::warn!(kind = ?err.kind(), "prediction failed");
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();
    let args = Args::parse();

    let mut settings = load_settings();
    if let Some(path) = &args.settings {
        apply_settings_file(&mut settings, path)?;
    }
    if let Some(endpoint) = args.endpoint {
        settings.endpoint_url = endpoint;
    }

    let preferences = Storage::new(&settings.preferences_database_url)
        .await
        .with_context(|| {
            format!(
                "failed to open preference store at '{}'",
                settings.preferences_database_url
            )
        })?;
    let controller = UploadPredictionController::new(
        settings.controller_options(),
        Arc::new(HttpPredictionEndpoint::new(settings.endpoint_url.clone())),
        Arc::new(preferences),
    )
    .await;

    if args.toggle_dark_mode {
        let dark_mode = controller.toggle_display_preference().await?;
        tracing::info!(dark_mode, "display preference saved");
    }

    run_session(&controller, args.image.as_deref(), args.crop).await;
    render(&controller.snapshot().await);
    Ok(())
}
