use abrdl_engine::{ProgressEvent, TrackType};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use parking_lot::Mutex;
use std::{collections::HashMap, sync::Arc, time::Duration};

use super::format_mb;

fn download_style() -> Option<ProgressStyle> {
    ProgressStyle::default_bar()
        .template("{prefix:>5} [{bar:40.green/white}] {percent:>3}% | {msg}")
        .ok()
        .map(|style| style.progress_chars("=> "))
}

fn unknown_size_style() -> Option<ProgressStyle> {
    ProgressStyle::default_spinner()
        .template("{prefix:>5} {spinner:.green} {msg}")
        .ok()
}

#[derive(Clone)]
pub struct ProgressManager {
    multi: MultiProgress,
    bars: Arc<Mutex<HashMap<TrackType, ProgressBar>>>,
    disabled: bool,
}

impl ProgressManager {
    pub fn new(multi: MultiProgress) -> Self {
        Self {
            multi,
            bars: Arc::new(Mutex::new(HashMap::new())),
            disabled: false,
        }
    }

    pub fn new_disabled(multi: MultiProgress) -> Self {
        Self {
            multi,
            bars: Arc::new(Mutex::new(HashMap::new())),
            disabled: true,
        }
    }

    pub fn handle_event(&self, event: ProgressEvent) {
        if self.disabled {
            return;
        }

        let mut bars = self.bars.lock();
        match event {
            ProgressEvent::TrackOpened {
                track, total_bytes, ..
            } => {
                let bar = match total_bytes {
                    Some(total) => {
                        let bar = self.multi.add(ProgressBar::new(total));
                        if let Some(style) = download_style() {
                            bar.set_style(style);
                        }
                        bar.set_message(format!("0.00/{} MB", format_mb(total)));
                        bar
                    }
                    None => {
                        let bar = self.multi.add(ProgressBar::new_spinner());
                        if let Some(style) = unknown_size_style() {
                            bar.set_style(style);
                        }
                        bar.enable_steady_tick(Duration::from_millis(200));
                        bar
                    }
                };
                bar.set_prefix(track.to_string());
                bars.insert(track, bar);
            }
            ProgressEvent::Progress { track, progress } => {
                if let Some(bar) = bars.get(&track) {
                    bar.set_position(progress.bytes_written.min(progress.total_bytes));
                    bar.set_message(format!(
                        "{}/{} MB",
                        format_mb(progress.bytes_written),
                        format_mb(progress.total_bytes)
                    ));
                }
            }
            ProgressEvent::TrackClosed {
                track,
                path,
                bytes_written,
            } => {
                if let Some(bar) = bars.remove(&track) {
                    let location = path
                        .map(|p| p.display().to_string())
                        .unwrap_or_else(|| track.to_string());
                    bar.finish_with_message(format!(
                        "{} MB -> {}",
                        format_mb(bytes_written),
                        location
                    ));
                }
            }
        }
    }
}
