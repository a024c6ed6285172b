use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Mutex;
use std::time::Duration;

use crate::transfer::TransferProgress;

/// Byte progress bar for the upload in flight.
#[derive(Default)]
pub struct UploadProgressBar {
    bar: Mutex<Option<ProgressBar>>,
}

fn style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("{spinner:.green} [{bar:40.cyan/blue}] {bytes}/{total_bytes} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("━╸━")
}

impl TransferProgress for UploadProgressBar {
    fn start(&self, label: &str, total: u64) {
        let pb = ProgressBar::new(total);
        pb.set_style(style());
        pb.set_message(label.to_string());
        pb.enable_steady_tick(Duration::from_millis(100));
        if let Ok(mut slot) = self.bar.lock() {
            *slot = Some(pb);
        }
    }

    fn update(&self, sent: u64) {
        if let Ok(slot) = self.bar.lock() {
            if let Some(pb) = slot.as_ref() {
                pb.set_position(sent);
            }
        }
    }

    fn finish(&self) {
        if let Ok(mut slot) = self.bar.lock() {
            if let Some(pb) = slot.take() {
                pb.finish_and_clear();
            }
        }
    }
}
