//! The recording sync pipeline.
//!
//! Each run looks at the recordings in a time window and walks every meeting
//! through the same gates: eligibility, readiness, participation. Surviving
//! files are downloaded, checked for audio, uploaded to the destination and
//! optionally trashed at the source. Nothing is persisted between runs;
//! duplicates are detected by asking the destination.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::audio::AudioProbe;
use crate::classify::Classifier;
use crate::config::Config;
use crate::destination::{Archive, DestinationKind, UploadMetadata};
use crate::error::ApiResult;
use crate::retry::{log_retry, retry, RetryPolicy};
use crate::window::SyncWindow;
use crate::zoom::{local_file_name, Meeting, Participant, Readiness, RecordingFile, RecordingSource};

/// Settings for video uploads.
#[derive(Debug, Clone)]
pub struct VideoSettings {
    /// Every video goes here
    pub default_playlist: String,
    pub category_id: String,
    pub license: String,
    pub privacy: String,
}

#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub window: SyncWindow,
    pub min_duration_minutes: u32,
    pub filter_allow_list: bool,
    pub allow_list: Vec<String>,
    pub ignore_participants: Vec<String>,
    pub delete_after_upload: bool,
    pub dry_run: bool,
    pub policy: RetryPolicy,
    pub video: VideoSettings,
    /// Drive folder holding the category folders
    pub drive_root: String,
}

impl SyncOptions {
    pub fn from_config(config: &Config, window: SyncWindow, dry_run: bool) -> Self {
        Self {
            window,
            min_duration_minutes: config.sync.min_duration_minutes,
            filter_allow_list: config.sync.filter_allow_list,
            allow_list: config.sync.allow_list.clone(),
            ignore_participants: config.sync.ignore_participants.clone(),
            delete_after_upload: config.sync.delete_after_upload,
            dry_run: dry_run || config.sync.dry_run,
            policy: RetryPolicy::new(config.sync.max_retries),
            video: VideoSettings {
                default_playlist: config.youtube.default_playlist.clone(),
                category_id: config.youtube.category_id.clone(),
                license: config.youtube.license.clone(),
                privacy: config.youtube.privacy.clone(),
            },
            drive_root: config.gdrive.root_folder_id.clone(),
        }
    }
}

/// What happened to a source file after a successful upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceDeletion {
    Trashed,
    /// Dry run
    WouldTrash,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileStatus {
    Uploaded { id: String },
    /// No audio track, or only silence
    SkippedSilent(String),
    SkippedDuplicate { existing_id: String },
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct FileOutcome {
    pub file_id: String,
    /// Title or file name at the destination
    pub name: String,
    pub status: FileStatus,
    pub deletion: Option<SourceDeletion>,
    pub notes: Vec<String>,
}

impl FileOutcome {
    fn new(file: &RecordingFile, name: &str, status: FileStatus) -> Self {
        Self {
            file_id: file.id.clone(),
            name: name.to_string(),
            status,
            deletion: None,
            notes: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MeetingStatus {
    FilteredOut(String),
    NotReady(Readiness),
    /// Nobody but ignored participants joined; the recording was trashed
    Unattended(SourceDeletion),
    Processed,
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct MeetingOutcome {
    pub uuid: String,
    pub topic: String,
    pub start_time: DateTime<Utc>,
    pub destination: Option<String>,
    pub status: MeetingStatus,
    pub files: Vec<FileOutcome>,
    pub notes: Vec<String>,
}

#[derive(Debug, Default)]
pub struct SyncReport {
    pub meetings: Vec<MeetingOutcome>,
}

impl SyncReport {
    pub fn files(&self) -> impl Iterator<Item = &FileOutcome> {
        self.meetings.iter().flat_map(|m| m.files.iter())
    }

    pub fn uploaded(&self) -> usize {
        self.files()
            .filter(|f| matches!(f.status, FileStatus::Uploaded { .. }))
            .count()
    }

    pub fn skipped(&self) -> usize {
        self.files()
            .filter(|f| {
                matches!(
                    f.status,
                    FileStatus::SkippedSilent(_) | FileStatus::SkippedDuplicate { .. }
                )
            })
            .count()
    }

    pub fn failed(&self) -> usize {
        let files = self
            .files()
            .filter(|f| matches!(f.status, FileStatus::Failed(_)))
            .count();
        let meetings = self
            .meetings
            .iter()
            .filter(|m| matches!(m.status, MeetingStatus::Failed(_)))
            .count();
        files + meetings
    }
}

pub struct SyncPipeline {
    source: Arc<dyn RecordingSource>,
    archive: Archive,
    classifier: Classifier,
    probe: Arc<dyn AudioProbe>,
    options: SyncOptions,
}

impl SyncPipeline {
    pub fn new(
        source: Arc<dyn RecordingSource>,
        archive: Archive,
        classifier: Classifier,
        probe: Arc<dyn AudioProbe>,
        options: SyncOptions,
    ) -> Self {
        Self {
            source,
            archive,
            classifier,
            probe,
            options,
        }
    }

    pub async fn run(&self) -> ApiResult<SyncReport> {
        let window = self.options.window;
        let source = self.source.as_ref();
        let mut meetings = retry(
            self.options.policy,
            || source.list_meetings(window.from, window.to),
            log_retry("Listing recordings"),
        )
        .await?;

        // The listing works in whole days.
        meetings.retain(|m| window.contains(m.start_time));
        meetings.sort_by_key(|m| m.start_time);
        info!(
            "Found {} recorded meetings between {} and {}",
            meetings.len(),
            window.from,
            window.to
        );

        let workspace = tempfile::Builder::new()
            .prefix("zoom-archive-")
            .tempdir()?;
        debug!("Downloading into {:?}", workspace.path());

        let mut report = SyncReport::default();
        for meeting in meetings {
            let outcome = self.process_meeting(meeting, workspace.path()).await;
            report.meetings.push(outcome);
        }
        Ok(report)
    }

    async fn process_meeting(&self, mut meeting: Meeting, workspace: &Path) -> MeetingOutcome {
        info!(
            "Processing meeting: {} from {}",
            meeting.topic, meeting.start_time
        );
        let mut outcome = MeetingOutcome {
            uuid: meeting.uuid.clone(),
            topic: meeting.topic.clone(),
            start_time: meeting.start_time,
            destination: None,
            status: MeetingStatus::Processed,
            files: Vec::new(),
            notes: Vec::new(),
        };

        if let Some(reason) = self.ineligible(&meeting) {
            info!("  Skipping: {}", reason);
            outcome.status = MeetingStatus::FilteredOut(reason);
            return outcome;
        }

        let readiness = meeting.readiness();
        if readiness != Readiness::Ready {
            info!("  Recording is {}, will retry next run", readiness.as_str());
            outcome.status = MeetingStatus::NotReady(readiness);
            return outcome;
        }

        let source = self.source.as_ref();
        let lookup = retry(
            self.options.policy,
            || source.list_participants(&meeting),
            log_retry("Participant lookup"),
        )
        .await;
        match lookup {
            Ok(participants) => {
                let unattended = is_unattended(&participants, &self.options.ignore_participants);
                meeting.participants = participants;
                if unattended {
                    info!("  Nobody attended, trashing the recording");
                    outcome.status = MeetingStatus::Unattended(self.trash_recording(&meeting).await);
                    return outcome;
                }
            }
            Err(err) => {
                warn!("  Could not check participants, uploading anyway: {}", err);
                outcome
                    .notes
                    .push(format!("participants not checked: {err}"));
            }
        }

        let destination = self.classifier.classify(&meeting.topic).to_string();
        debug!("  Classified as '{}'", destination);
        outcome.destination = Some(destination.clone());

        let result = match self.archive.kind() {
            DestinationKind::YouTube => {
                self.sync_to_youtube(&meeting, &destination, workspace)
                    .await
            }
            DestinationKind::GoogleDrive => {
                self.sync_to_drive(&meeting, &destination, workspace)
                    .await
            }
        };
        match result {
            Ok(files) => outcome.files = files,
            Err(err) => {
                warn!("  Meeting failed: {}", err);
                outcome.status = MeetingStatus::Failed(err.to_string());
            }
        }
        outcome
    }

    fn ineligible(&self, meeting: &Meeting) -> Option<String> {
        if meeting.duration <= self.options.min_duration_minutes {
            return Some(format!(
                "shorter than {} minutes",
                self.options.min_duration_minutes + 1
            ));
        }
        if self.options.filter_allow_list && !self.options.allow_list.contains(&meeting.topic) {
            return Some("topic is not in the allow list".to_string());
        }
        None
    }

    async fn sync_to_youtube(
        &self,
        meeting: &Meeting,
        destination: &str,
        workspace: &Path,
    ) -> ApiResult<Vec<FileOutcome>> {
        let videos: Vec<&RecordingFile> = meeting.video_files().collect();
        if videos.is_empty() {
            info!("  No videos to upload");
            return Ok(Vec::new());
        }

        let settings = &self.options.video;
        let default_playlist = self
            .archive
            .ensure_container(None, &settings.default_playlist)
            .await?;

        let mut outcomes = Vec::new();
        for (index, file) in videos.into_iter().enumerate() {
            let title = video_title(meeting, index);
            let status = self
                .upload_video(meeting, file, &title, &default_playlist, workspace)
                .await
                .unwrap_or_else(|err| failed(&title, err));
            let mut outcome = FileOutcome::new(file, &title, status);

            if let FileStatus::Uploaded { id } = &outcome.status {
                let id = id.clone();
                self.add_to_playlists(&id, &default_playlist, destination, &mut outcome)
                    .await;
            }
            self.delete_if_uploaded(meeting, file, &mut outcome).await;
            outcomes.push(outcome);
        }
        Ok(outcomes)
    }

    async fn upload_video(
        &self,
        meeting: &Meeting,
        file: &RecordingFile,
        title: &str,
        default_playlist: &str,
        workspace: &Path,
    ) -> Result<FileStatus> {
        if let Some(existing_id) = self.existing_video(default_playlist, title).await? {
            info!("  Already uploaded as {}: {}", existing_id, title);
            return Ok(FileStatus::SkippedDuplicate { existing_id });
        }

        let scratch = tempfile::tempdir_in(workspace)?;
        let path = self.download(file, scratch.path()).await?;
        if let Some(reason) = self.audio_gate(&path).await? {
            info!("  Skipping {}: {}", title, reason);
            return Ok(FileStatus::SkippedSilent(reason));
        }

        let settings = &self.options.video;
        let metadata = UploadMetadata {
            title: title.to_string(),
            description: None,
            category_id: Some(settings.category_id.clone()),
            license: Some(settings.license.clone()),
            privacy: Some(settings.privacy.clone()),
            recording_date: Some(meeting.start_time),
            mime_type: file.mime_type().to_string(),
        };
        let id = self
            .archive
            .place_file(None, &path, &metadata)
            .await
            .context("Upload failed")?;
        Ok(FileStatus::Uploaded { id })
    }

    /// A video with this title on the channel. The uploads playlist has every
    /// video, even one whose playlist inserts failed on an earlier run.
    async fn existing_video(&self, default_playlist: &str, title: &str) -> Result<Option<String>> {
        if let Some(uploads) = self.archive.uploads_container().await? {
            if let Some(id) = self.archive.find_item(&uploads, title).await? {
                return Ok(Some(id));
            }
        }
        Ok(self.archive.find_item(default_playlist, title).await?)
    }

    /// Playlist failures leave the video uploaded; they are noted, not fatal.
    async fn add_to_playlists(
        &self,
        video_id: &str,
        default_playlist: &str,
        destination: &str,
        outcome: &mut FileOutcome,
    ) {
        info!("  Adding to main playlist: {}", self.options.video.default_playlist);
        if let Err(err) = self.archive.add_to_playlist(default_playlist, video_id).await {
            warn!("  Could not add to main playlist: {}", err);
            outcome.notes.push(format!("not added to main playlist: {err}"));
        }

        if destination == self.options.video.default_playlist {
            return;
        }
        info!("  Adding to call playlist: {}", destination);
        let added = match self.archive.ensure_container(None, destination).await {
            Ok(playlist) => self.archive.add_to_playlist(&playlist, video_id).await,
            Err(err) => Err(err),
        };
        if let Err(err) = added {
            warn!("  Could not add to playlist '{}': {}", destination, err);
            outcome
                .notes
                .push(format!("not added to playlist '{destination}': {err}"));
        }
    }

    async fn sync_to_drive(
        &self,
        meeting: &Meeting,
        destination: &str,
        workspace: &Path,
    ) -> ApiResult<Vec<FileOutcome>> {
        let files: Vec<&RecordingFile> = meeting
            .recording_files
            .iter()
            .filter(|f| !f.download_url.is_empty())
            .collect();
        if files.is_empty() {
            info!("  No files to upload");
            return Ok(Vec::new());
        }

        let category = self
            .archive
            .ensure_container(Some(&self.options.drive_root), destination)
            .await?;
        let folder = self
            .archive
            .ensure_container(Some(&category), &meeting_folder_name(meeting))
            .await?;

        let mut outcomes = Vec::new();
        for file in files {
            let name = drive_file_name(file);
            let status = self
                .upload_to_folder(meeting, file, &name, &folder, workspace)
                .await
                .unwrap_or_else(|err| failed(&name, err));
            let mut outcome = FileOutcome::new(file, &name, status);
            self.delete_if_uploaded(meeting, file, &mut outcome).await;
            outcomes.push(outcome);
        }
        Ok(outcomes)
    }

    async fn upload_to_folder(
        &self,
        meeting: &Meeting,
        file: &RecordingFile,
        name: &str,
        folder: &str,
        workspace: &Path,
    ) -> Result<FileStatus> {
        if let Some(existing_id) = self.archive.find_item(folder, name).await? {
            info!("  Already uploaded as {}: {}", existing_id, name);
            return Ok(FileStatus::SkippedDuplicate { existing_id });
        }

        let scratch = tempfile::tempdir_in(workspace)?;
        let path = self.download(file, scratch.path()).await?;
        if file.is_video() {
            if let Some(reason) = self.audio_gate(&path).await? {
                info!("  Skipping {}: {}", name, reason);
                return Ok(FileStatus::SkippedSilent(reason));
            }
        }

        let metadata = UploadMetadata {
            title: name.to_string(),
            recording_date: Some(meeting.start_time),
            mime_type: file.mime_type().to_string(),
            ..Default::default()
        };
        let id = self
            .archive
            .place_file(Some(folder), &path, &metadata)
            .await
            .context("Upload failed")?;
        Ok(FileStatus::Uploaded { id })
    }

    async fn download(&self, file: &RecordingFile, directory: &Path) -> Result<PathBuf> {
        info!("  Downloading {} ({} bytes)", file.id, file.file_size);
        let source = self.source.as_ref();
        let path = retry(
            self.options.policy,
            || source.download_file(file, directory),
            log_retry("Download"),
        )
        .await
        .context("Download failed")?;
        Ok(path)
    }

    /// Reason to skip the file, if it has nothing audible.
    async fn audio_gate(&self, path: &Path) -> Result<Option<String>> {
        let verdict = self.probe.probe(path).await.context("Audio check failed")?;
        Ok(verdict.skip_reason().map(str::to_string))
    }

    async fn delete_if_uploaded(
        &self,
        meeting: &Meeting,
        file: &RecordingFile,
        outcome: &mut FileOutcome,
    ) {
        if !self.options.delete_after_upload {
            return;
        }
        if !matches!(outcome.status, FileStatus::Uploaded { .. }) {
            return;
        }

        outcome.deletion = Some(if self.options.dry_run {
            info!("  [dry-run] Would trash {} at the source", file.id);
            SourceDeletion::WouldTrash
        } else {
            let source = self.source.as_ref();
            let trashed = retry(
                self.options.policy,
                || source.trash_file(meeting, file),
                log_retry("Source delete"),
            )
            .await;
            match trashed {
                Ok(()) => {
                    info!("  Deleted {} file from Zoom", file.file_type);
                    SourceDeletion::Trashed
                }
                Err(err) => {
                    warn!("  The file could not be deleted: {}", err);
                    SourceDeletion::Failed(err.to_string())
                }
            }
        });
    }

    async fn trash_recording(&self, meeting: &Meeting) -> SourceDeletion {
        if self.options.dry_run {
            info!("  [dry-run] Would trash recording {}", meeting.uuid);
            return SourceDeletion::WouldTrash;
        }
        let source = self.source.as_ref();
        let trashed = retry(
            self.options.policy,
            || source.trash_recording(meeting),
            log_retry("Recording delete"),
        )
        .await;
        match trashed {
            Ok(()) => SourceDeletion::Trashed,
            Err(err) => {
                warn!("  The recording could not be deleted: {}", err);
                SourceDeletion::Failed(err.to_string())
            }
        }
    }
}

fn failed(name: &str, err: anyhow::Error) -> FileStatus {
    warn!("  {} failed: {:#}", name, err);
    FileStatus::Failed(format!("{err:#}"))
}

/// True when nobody but ignored participants (bots, note takers) joined.
/// An empty list counts as unattended.
pub fn is_unattended(participants: &[Participant], ignore: &[String]) -> bool {
    let ignore: Vec<String> = ignore
        .iter()
        .map(|p| p.trim().to_lowercase())
        .filter(|p| !p.is_empty())
        .collect();
    participants.iter().all(|participant| {
        let name = participant.name.to_lowercase();
        ignore.iter().any(|pattern| name.contains(pattern))
    })
}

/// `"<topic> - <Mon D, YYYY>"` without `<` or `>`. Extra videos of the same
/// meeting get a part number so their titles stay distinct.
pub fn video_title(meeting: &Meeting, index: usize) -> String {
    let mut title = format!(
        "{} - {}",
        meeting.topic.trim(),
        meeting.start_time.format("%b %-d, %Y")
    );
    if index > 0 {
        title.push_str(&format!(" (part {})", index + 1));
    }
    title.retain(|c| c != '<' && c != '>');
    title
}

/// `"YYYY-MM-DD <topic>"`
pub fn meeting_folder_name(meeting: &Meeting) -> String {
    format!(
        "{} {}",
        meeting.start_time.format("%Y-%m-%d"),
        meeting.topic.trim()
    )
}

/// Stable per-file name, so reruns find earlier uploads.
pub fn drive_file_name(file: &RecordingFile) -> String {
    let label = if file.recording_type.is_empty() {
        file.kind().as_str().to_string()
    } else {
        file.recording_type.clone()
    };
    format!("{} {}", label, local_file_name(file))
}
