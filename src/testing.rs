//! In-memory fakes for the source, destination and audio probe traits.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::json;
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::audio::{AudioProbe, AudioVerdict};
use crate::destination::{DestinationApi, DestinationKind, UploadMetadata};
use crate::error::{ApiError, ApiResult};
use crate::transfer::{ChunkOutcome, ChunkedUpload};
use crate::zoom::{Meeting, Participant, RecordingFile, RecordingSource};

const MUTATING: [&str; 3] = ["create_container", "begin_upload", "insert_playlist_item"];

/// Uploads playlist of the fake YouTube channel.
pub const UPLOADS_PLAYLIST: &str = "UU-channel";

#[derive(Default)]
struct DestinationState {
    calls: Vec<String>,
    containers: HashMap<(Option<String>, String), String>,
    trashed: HashSet<String>,
    items: HashMap<(String, String), String>,
    titles: HashMap<String, String>,
    uploads: Vec<(Option<String>, String)>,
    playlist_inserts: Vec<(String, String, Option<u32>)>,
    playlist_errors: VecDeque<ApiError>,
    fail_create_after_commit: bool,
    upload_error_status: Option<u16>,
    next_id: u32,
}

pub struct FakeDestination {
    kind: DestinationKind,
    state: Mutex<DestinationState>,
}

impl FakeDestination {
    pub fn youtube() -> Self {
        Self::new(DestinationKind::YouTube)
    }

    pub fn drive() -> Self {
        Self::new(DestinationKind::GoogleDrive)
    }

    fn new(kind: DestinationKind) -> Self {
        Self {
            kind,
            state: Mutex::new(DestinationState::default()),
        }
    }

    fn record(&self, call: &str) {
        self.state.lock().unwrap().calls.push(call.to_string());
    }

    pub fn add_container(&self, parent: Option<&str>, name: &str, id: &str) {
        self.state
            .lock()
            .unwrap()
            .containers
            .insert((parent.map(str::to_string), name.to_string()), id.to_string());
    }

    pub fn add_item(&self, container: &str, name: &str, id: &str) {
        self.state
            .lock()
            .unwrap()
            .items
            .insert((container.to_string(), name.to_string()), id.to_string());
    }

    pub fn trash(&self, id: &str) {
        self.state.lock().unwrap().trashed.insert(id.to_string());
    }

    /// The next create succeeds on the server but reports a 503.
    pub fn fail_next_create_after_commit(&self) {
        self.state.lock().unwrap().fail_create_after_commit = true;
    }

    pub fn fail_next_playlist_insert(&self, error: ApiError) {
        self.state.lock().unwrap().playlist_errors.push_back(error);
    }

    /// Every upload is rejected with `status`.
    pub fn fail_uploads(&self, status: u16) {
        self.state.lock().unwrap().upload_error_status = Some(status);
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn count_calls(&self, name: &str) -> usize {
        self.calls().iter().filter(|c| c.as_str() == name).count()
    }

    pub fn mutating_calls(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| MUTATING.contains(&c.as_str()))
            .collect()
    }

    pub fn container_count(&self) -> usize {
        self.state.lock().unwrap().containers.len()
    }

    pub fn container_id(&self, parent: Option<&str>, name: &str) -> Option<String> {
        self.state
            .lock()
            .unwrap()
            .containers
            .get(&(parent.map(str::to_string), name.to_string()))
            .cloned()
    }

    pub fn uploads(&self) -> Vec<(Option<String>, String)> {
        self.state.lock().unwrap().uploads.clone()
    }

    pub fn uploaded_titles(&self) -> Vec<String> {
        self.uploads().into_iter().map(|(_, title)| title).collect()
    }

    pub fn playlist_inserts(&self) -> Vec<(String, String, Option<u32>)> {
        self.state.lock().unwrap().playlist_inserts.clone()
    }
}

#[async_trait]
impl DestinationApi for FakeDestination {
    fn kind(&self) -> DestinationKind {
        self.kind
    }

    async fn validate_credentials(&self) -> ApiResult<()> {
        self.record("validate_credentials");
        Ok(())
    }

    async fn find_container(&self, parent: Option<&str>, name: &str) -> ApiResult<Option<String>> {
        self.record("find_container");
        Ok(self.container_id(parent, name))
    }

    async fn create_container(&self, parent: Option<&str>, name: &str) -> ApiResult<String> {
        self.record("create_container");
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let id = format!("container-{}", state.next_id);
        state
            .containers
            .insert((parent.map(str::to_string), name.to_string()), id.clone());
        if std::mem::take(&mut state.fail_create_after_commit) {
            return Err(ApiError::http("fake", 503, "response lost"));
        }
        Ok(id)
    }

    async fn is_trashed(&self, container_id: &str) -> ApiResult<bool> {
        self.record("is_trashed");
        Ok(self.state.lock().unwrap().trashed.contains(container_id))
    }

    async fn list_items(&self, container_id: &str) -> ApiResult<HashMap<String, String>> {
        self.record("list_items");
        Ok(self
            .state
            .lock()
            .unwrap()
            .items
            .iter()
            .filter(|((container, _), _)| container == container_id)
            .map(|((_, name), id)| (name.clone(), id.clone()))
            .collect())
    }

    async fn uploads_container(&self) -> ApiResult<Option<String>> {
        self.record("uploads_container");
        Ok(match self.kind {
            DestinationKind::YouTube => Some(UPLOADS_PLAYLIST.to_string()),
            DestinationKind::GoogleDrive => None,
        })
    }

    async fn begin_upload(
        &self,
        container_id: Option<&str>,
        path: &Path,
        metadata: &UploadMetadata,
    ) -> ApiResult<Box<dyn ChunkedUpload>> {
        self.record("begin_upload");
        let total = tokio::fs::metadata(path).await?.len();
        let mut state = self.state.lock().unwrap();
        if let Some(status) = state.upload_error_status {
            return Ok(Box::new(FakeUpload {
                total,
                result: Some(Err(status)),
            }));
        }

        state.next_id += 1;
        let id = format!("item-{}", state.next_id);
        state
            .uploads
            .push((container_id.map(str::to_string), metadata.title.clone()));
        state.titles.insert(id.clone(), metadata.title.clone());
        let container = match (container_id, self.kind) {
            (Some(container), _) => Some(container),
            (None, DestinationKind::YouTube) => Some(UPLOADS_PLAYLIST),
            (None, DestinationKind::GoogleDrive) => None,
        };
        if let Some(container) = container {
            state
                .items
                .insert((container.to_string(), metadata.title.clone()), id.clone());
        }
        Ok(Box::new(FakeUpload {
            total,
            result: Some(Ok(id)),
        }))
    }

    async fn insert_playlist_item(
        &self,
        playlist_id: &str,
        item_id: &str,
        position: Option<u32>,
    ) -> ApiResult<()> {
        self.record("insert_playlist_item");
        let mut state = self.state.lock().unwrap();
        state
            .playlist_inserts
            .push((playlist_id.to_string(), item_id.to_string(), position));
        if let Some(err) = state.playlist_errors.pop_front() {
            return Err(err);
        }
        if let Some(title) = state.titles.get(item_id).cloned() {
            state
                .items
                .insert((playlist_id.to_string(), title), item_id.to_string());
        }
        Ok(())
    }
}

struct FakeUpload {
    total: u64,
    result: Option<Result<String, u16>>,
}

#[async_trait]
impl ChunkedUpload for FakeUpload {
    fn total_bytes(&self) -> u64 {
        self.total
    }

    async fn next_chunk(&mut self) -> ApiResult<ChunkOutcome> {
        match self.result.take() {
            Some(Ok(id)) => Ok(ChunkOutcome::Complete(json!({ "id": id }))),
            Some(Err(status)) => {
                self.result = Some(Err(status));
                Err(ApiError::http("fake", status, "upload rejected"))
            }
            None => Err(ApiError::UnexpectedResponse("upload already finished".into())),
        }
    }
}

#[derive(Default)]
struct SourceState {
    calls: Vec<String>,
    participants: HashMap<String, Vec<Participant>>,
    participant_failures: HashSet<String>,
    download_failures: HashSet<String>,
    fail_trash: bool,
}

pub struct FakeSource {
    meetings: Vec<Meeting>,
    state: Mutex<SourceState>,
}

impl FakeSource {
    /// Meetings without explicit participants report one attendee.
    pub fn new(meetings: Vec<Meeting>) -> Self {
        Self {
            meetings,
            state: Mutex::new(SourceState::default()),
        }
    }

    pub fn set_participants(&self, uuid: &str, names: &[&str]) {
        self.state.lock().unwrap().participants.insert(
            uuid.to_string(),
            names.iter().map(|name| participant(name)).collect(),
        );
    }

    pub fn fail_participants(&self, uuid: &str) {
        self.state
            .lock()
            .unwrap()
            .participant_failures
            .insert(uuid.to_string());
    }

    pub fn fail_download(&self, file_id: &str) {
        self.state
            .lock()
            .unwrap()
            .download_failures
            .insert(file_id.to_string());
    }

    pub fn fail_trash(&self) {
        self.state.lock().unwrap().fail_trash = true;
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Calls that delete anything at the source.
    pub fn trash_calls(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| c.starts_with("trash"))
            .collect()
    }

    fn record(&self, call: String) {
        self.state.lock().unwrap().calls.push(call);
    }
}

#[async_trait]
impl RecordingSource for FakeSource {
    async fn list_meetings(
        &self,
        _from: DateTime<Utc>,
        _to: DateTime<Utc>,
    ) -> ApiResult<Vec<Meeting>> {
        self.record("list_meetings".to_string());
        Ok(self.meetings.clone())
    }

    async fn list_participants(&self, meeting: &Meeting) -> ApiResult<Vec<Participant>> {
        self.record(format!("list_participants:{}", meeting.uuid));
        let state = self.state.lock().unwrap();
        if state.participant_failures.contains(&meeting.uuid) {
            return Err(ApiError::http("Zoom", 404, "Meeting does not exist"));
        }
        Ok(state
            .participants
            .get(&meeting.uuid)
            .cloned()
            .unwrap_or_else(|| vec![participant("Attendee")]))
    }

    async fn download_file(&self, file: &RecordingFile, directory: &Path) -> ApiResult<PathBuf> {
        self.record(format!("download:{}", file.id));
        if self.state.lock().unwrap().download_failures.contains(&file.id) {
            return Err(ApiError::http("Zoom", 404, "File does not exist"));
        }
        let path = directory.join(format!("{}.{}", file.id, file.extension()));
        tokio::fs::write(&path, b"fake recording bytes").await?;
        Ok(path)
    }

    async fn trash_recording(&self, meeting: &Meeting) -> ApiResult<()> {
        self.record(format!("trash_recording:{}", meeting.uuid));
        if self.state.lock().unwrap().fail_trash {
            return Err(ApiError::http("Zoom", 403, "No permission"));
        }
        Ok(())
    }

    async fn trash_file(&self, _meeting: &Meeting, file: &RecordingFile) -> ApiResult<()> {
        self.record(format!("trash_file:{}", file.id));
        if self.state.lock().unwrap().fail_trash {
            return Err(ApiError::http("Zoom", 403, "No permission"));
        }
        Ok(())
    }
}

/// Probe keyed by file stem, which the fake source sets to the file id.
#[derive(Default)]
pub struct FakeProbe {
    verdicts: Mutex<HashMap<String, AudioVerdict>>,
    failures: Mutex<HashSet<String>>,
    probed: Mutex<Vec<String>>,
}

impl FakeProbe {
    pub fn set(&self, file_id: &str, verdict: AudioVerdict) {
        self.verdicts
            .lock()
            .unwrap()
            .insert(file_id.to_string(), verdict);
    }

    pub fn fail(&self, file_id: &str) {
        self.failures.lock().unwrap().insert(file_id.to_string());
    }

    pub fn probed(&self) -> Vec<String> {
        self.probed.lock().unwrap().clone()
    }
}

#[async_trait]
impl AudioProbe for FakeProbe {
    async fn probe(&self, path: &Path) -> Result<AudioVerdict> {
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_string();
        self.probed.lock().unwrap().push(stem.clone());
        if self.failures.lock().unwrap().contains(&stem) {
            return Err(anyhow!("ffmpeg exited with status 1"));
        }
        Ok(self
            .verdicts
            .lock()
            .unwrap()
            .get(&stem)
            .cloned()
            .unwrap_or(AudioVerdict::HasAudio { max_volume_db: -3.0 }))
    }
}

pub fn participant(name: &str) -> Participant {
    Participant {
        name: name.to_string(),
        user_email: None,
    }
}

/// A finished, fully processed recording file.
pub fn recording_file(id: &str, file_type: &str, extension: &str) -> RecordingFile {
    RecordingFile {
        id: id.to_string(),
        meeting_id: "mtg".to_string(),
        recording_start: "2024-03-01T17:00:00Z".to_string(),
        recording_end: "2024-03-01T18:00:00Z".to_string(),
        file_type: file_type.to_string(),
        file_extension: extension.to_string(),
        file_size: 1024,
        download_url: format!("https://zoom.us/rec/download/{id}"),
        status: "completed".to_string(),
        recording_type: String::new(),
    }
}

pub fn video_file(id: &str) -> RecordingFile {
    recording_file(id, "MP4", "MP4")
}

pub fn meeting(uuid: &str, topic: &str, start: &str, files: Vec<RecordingFile>) -> Meeting {
    Meeting {
        uuid: uuid.to_string(),
        id: 85012345678,
        topic: topic.to_string(),
        start_time: start.parse().unwrap(),
        duration: 60,
        recording_files: files,
        participants: Vec::new(),
    }
}
