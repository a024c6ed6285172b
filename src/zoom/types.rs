//! Zoom cloud recording data model.
//!
//! Mirrors the subset of `GET /users/{id}/recordings` and
//! `GET /past_meetings/{uuid}/participants` that the sync pipeline reads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Zoom gives us file extensions, not media types.
pub fn mime_type_for_extension(extension: &str) -> &'static str {
    match extension.to_lowercase().as_str() {
        "m4a" => "audio/mp4",
        "mp4" => "video/mp4",
        "txt" => "text/plain",
        "vtt" => "text/vtt",
        "json" => "application/json",
        _ => "application/octet-stream",
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Video,
    Audio,
    Chat,
    Transcript,
    Other,
}

impl FileKind {
    pub fn from_zoom_type(file_type: &str) -> Self {
        match file_type.to_uppercase().as_str() {
            "MP4" => Self::Video,
            "M4A" => Self::Audio,
            "CHAT" => Self::Chat,
            "TRANSCRIPT" | "CC" => Self::Transcript,
            _ => Self::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Video => "video",
            Self::Audio => "audio",
            Self::Chat => "chat",
            Self::Transcript => "transcript",
            Self::Other => "other",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordingFile {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub meeting_id: String,
    #[serde(default)]
    pub recording_start: String,
    #[serde(default)]
    pub recording_end: String,
    #[serde(default)]
    pub file_type: String,
    #[serde(default)]
    pub file_extension: String,
    #[serde(default)]
    pub file_size: u64,
    #[serde(default)]
    pub download_url: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub recording_type: String,
}

impl RecordingFile {
    pub fn kind(&self) -> FileKind {
        FileKind::from_zoom_type(&self.file_type)
    }

    pub fn is_video(&self) -> bool {
        self.kind() == FileKind::Video
    }

    pub fn extension(&self) -> String {
        if self.file_extension.is_empty() {
            self.file_type.to_lowercase()
        } else {
            self.file_extension.to_lowercase()
        }
    }

    pub fn mime_type(&self) -> &'static str {
        mime_type_for_extension(&self.extension())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Participant {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub user_email: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Meeting {
    /// Per-occurrence UUID, used for recording and participant endpoints
    pub uuid: String,
    /// Numeric meeting id shared by recurring occurrences
    #[serde(default)]
    pub id: u64,
    #[serde(default)]
    pub topic: String,
    pub start_time: DateTime<Utc>,
    /// Minutes
    #[serde(default)]
    pub duration: u32,
    #[serde(default)]
    pub recording_files: Vec<RecordingFile>,
    #[serde(default, skip_deserializing)]
    pub participants: Vec<Participant>,
}

/// Server-side processing state of a meeting's recording.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Readiness {
    /// At least one file has not finished recording
    Ongoing,
    /// Recording has ended but Zoom is still processing files
    Processing,
    Ready,
}

impl Readiness {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ongoing => "ongoing",
            Self::Processing => "processing",
            Self::Ready => "ready",
        }
    }
}

pub const STATUS_COMPLETED: &str = "completed";

impl Meeting {
    pub fn readiness(&self) -> Readiness {
        readiness_of(&self.recording_files)
    }

    pub fn video_files(&self) -> impl Iterator<Item = &RecordingFile> {
        self.recording_files.iter().filter(|f| f.is_video())
    }
}

/// A recording is ready only when every file has an end time, reports
/// `completed`, and has a non-zero size.
pub fn readiness_of(files: &[RecordingFile]) -> Readiness {
    if files.iter().any(|f| f.recording_end.trim().is_empty()) {
        return Readiness::Ongoing;
    }
    if files
        .iter()
        .any(|f| !f.status.eq_ignore_ascii_case(STATUS_COMPLETED) || f.file_size == 0)
    {
        return Readiness::Processing;
    }
    Readiness::Ready
}

#[derive(Debug, Deserialize)]
pub(crate) struct RecordingsPage {
    #[serde(default)]
    pub meetings: Vec<Meeting>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ParticipantsPage {
    #[serde(default)]
    pub participants: Vec<Participant>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ErrorBody {
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub message: String,
}
