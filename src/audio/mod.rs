//! Audio gate for video recordings.
//!
//! Zoom happily records an hour of screen share with nobody talking. Those
//! uploads are skipped by running ffmpeg's `volumedetect` filter and looking
//! at what it reports.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use regex::Regex;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::debug;
use which::which;

#[derive(Debug, Clone, PartialEq)]
pub enum AudioVerdict {
    /// The container has no audio stream at all
    NoAudioTrack,
    /// There is an audio stream but its peak is `-inf` dB
    Silent,
    HasAudio { max_volume_db: f64 },
}

impl AudioVerdict {
    /// Reason for skipping, if the file should be skipped.
    pub fn skip_reason(&self) -> Option<&'static str> {
        match self {
            Self::NoAudioTrack => Some("no audio track"),
            Self::Silent => Some("silent audio"),
            Self::HasAudio { .. } => None,
        }
    }
}

#[async_trait]
pub trait AudioProbe: Send + Sync {
    async fn probe(&self, path: &Path) -> Result<AudioVerdict>;
}

/// Runs `ffmpeg -af volumedetect` and parses its stderr.
pub struct FfmpegProbe {
    ffmpeg: PathBuf,
    max_volume_regex: Regex,
}

impl FfmpegProbe {
    pub fn new() -> Result<Self> {
        let ffmpeg = which("ffmpeg").context(
            "ffmpeg is required for the audio check but was not found in PATH",
        )?;
        Ok(Self {
            ffmpeg,
            max_volume_regex: max_volume_regex()?,
        })
    }
}

fn max_volume_regex() -> Result<Regex> {
    Ok(Regex::new(r"max_volume:\s*(-?inf|-?\d+(?:\.\d+)?)\s*dB")?)
}

#[async_trait]
impl AudioProbe for FfmpegProbe {
    async fn probe(&self, path: &Path) -> Result<AudioVerdict> {
        // -vn -sn -dn: only decode audio
        let output = Command::new(&self.ffmpeg)
            .arg("-hide_banner")
            .arg("-i")
            .arg(path)
            .args(["-af", "volumedetect", "-vn", "-sn", "-dn", "-f", "null", "-"])
            .output()
            .await
            .context("Failed to run ffmpeg")?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        let verdict =
            interpret_ffmpeg(&self.max_volume_regex, output.status.success(), &stderr)?;
        debug!("Audio check for {:?}: {:?}", path, verdict);
        Ok(verdict)
    }
}

/// Verdict from an ffmpeg run. The output is classified before the exit
/// status is looked at, since a file without audio leaves ffmpeg nothing to
/// write and it exits with an error.
pub fn interpret_ffmpeg(max_volume: &Regex, succeeded: bool, stderr: &str) -> Result<AudioVerdict> {
    match analyze_volumedetect(max_volume, stderr) {
        Ok(verdict) => Ok(verdict),
        Err(_) if !succeeded => bail!("ffmpeg failed: {}", last_line(stderr)),
        Err(err) => Err(err),
    }
}

/// Classify ffmpeg `volumedetect` output.
///
/// A missing audio stream shows up either as `audio:0kB` in the final stats
/// line or, when `-vn -sn -dn` leave no stream at all, as "does not contain
/// any stream".
pub fn analyze_volumedetect(max_volume: &Regex, output: &str) -> Result<AudioVerdict> {
    let lowered = output.to_lowercase();
    if lowered.contains("does not contain any stream") || lowered.contains("audio:0kib") {
        return Ok(AudioVerdict::NoAudioTrack);
    }

    let Some(captures) = max_volume.captures(output) else {
        bail!("ffmpeg output has no max_volume line");
    };
    match &captures[1] {
        "-inf" | "inf" => Ok(AudioVerdict::Silent),
        value => Ok(AudioVerdict::HasAudio {
            max_volume_db: value.parse().context("Invalid max_volume value")?,
        }),
    }
}

fn last_line(text: &str) -> &str {
    text.lines().rev().find(|l| !l.trim().is_empty()).unwrap_or("").trim()
}
