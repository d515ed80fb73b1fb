use std::path::PathBuf;
use std::sync::Arc;

use abrdl_engine::{
    DownloadCoordinator, DownloadRequest, EngineConfig, TrackPreference, TrackStatus, TrackType,
};
use indicatif::MultiProgress;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::print_details;
use crate::error::AppError;
use crate::utils::format_bytes;
use crate::utils::progress::ProgressManager;

pub struct DownloadOptions {
    pub url: String,
    pub preference: TrackPreference,
    pub output_dir: PathBuf,
    pub show_progress: bool,
}

pub async fn run(
    config: EngineConfig,
    provider_url: &str,
    options: DownloadOptions,
) -> Result<(), AppError> {
    let multi = MultiProgress::new();
    let progress_manager = if options.show_progress {
        ProgressManager::new(multi)
    } else {
        ProgressManager::new_disabled(multi)
    };

    let handler = progress_manager.clone();
    let coordinator = DownloadCoordinator::with_reference_collaborators(config, provider_url)?
        .with_progress(Arc::new(move |event| handler.handle_event(event)));

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling download");
            interrupt.cancel();
        }
    });

    info!(
        url = %options.url,
        output_dir = %options.output_dir.display(),
        quality = %options.preference.video_quality,
        container = %options.preference.container,
        mode = ?options.preference.mode,
        "Starting download"
    );

    let request = DownloadRequest {
        identifier: options.url,
        preference: options.preference,
        output_dir: options.output_dir,
    };
    let outcome = coordinator.start_download(request, &cancel).await?;

    print_details(&outcome.details);

    for track in &outcome.tracks {
        let label = match track.track {
            TrackType::Audio => "Audio",
            TrackType::Video => "Video",
        };
        match &track.status {
            TrackStatus::Completed => println!(
                "{label} Saved As: {} ({})",
                track.path.display(),
                format_bytes(track.bytes_written)
            ),
            TrackStatus::Failed(reason) => println!("{label} failed: {reason}"),
            TrackStatus::Aborted => println!("{label} aborted"),
            TrackStatus::Cancelled => println!("{label} cancelled"),
        }
    }

    outcome.into_result()?;
    Ok(())
}
