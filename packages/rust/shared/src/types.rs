//! Core domain types for the LessonVault ingestion pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Current format version for the persisted catalog document.
pub const CATALOG_FORMAT_VERSION: u32 = 1;

/// Catalog key for an entry: `"{source_id}:{content_id}"`.
pub fn entry_key(source_id: &str, content_id: &str) -> String {
    format!("{source_id}:{content_id}")
}

// ---------------------------------------------------------------------------
// ItemStatus
// ---------------------------------------------------------------------------

/// Pipeline status of one catalog entry.
///
/// Statuses advance forward only; the single allowed regression is
/// `Failed -> Fetching` when an item is retried on a later run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    Discovered,
    Fetching,
    Fetched,
    Processing,
    Processed,
    Uploading,
    Uploaded,
    /// No caption track existed and no media was requested; terminal but
    /// distinct from `Failed` so audits can tell the two apart.
    NoTranscript,
    Failed,
}

impl ItemStatus {
    /// Position in the forward order. `Failed` and `NoTranscript` sit outside
    /// the linear chain and are handled explicitly in [`can_advance`].
    fn rank(self) -> u8 {
        match self {
            Self::Discovered => 0,
            Self::Fetching => 1,
            Self::Fetched => 2,
            Self::Processing => 3,
            Self::Processed => 4,
            Self::Uploading => 5,
            Self::Uploaded => 6,
            Self::NoTranscript => 6,
            Self::Failed => u8::MAX,
        }
    }

    /// Whether this status means the entry needs no further work.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Uploaded | Self::NoTranscript)
    }
}

impl std::fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Discovered => "discovered",
            Self::Fetching => "fetching",
            Self::Fetched => "fetched",
            Self::Processing => "processing",
            Self::Processed => "processed",
            Self::Uploading => "uploading",
            Self::Uploaded => "uploaded",
            Self::NoTranscript => "no_transcript",
            Self::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

/// Pure transition predicate for the per-item state machine.
///
/// Any status may move to `Failed`. `Failed` may move back to `Fetching`
/// (retry). Otherwise transitions must advance strictly forward.
pub fn can_advance(from: ItemStatus, to: ItemStatus) -> bool {
    use ItemStatus::*;
    match (from, to) {
        (_, Failed) => !from.is_terminal(),
        (Failed, Fetching) => true,
        (Failed, _) => false,
        (a, b) => !a.is_terminal() && b.rank() > a.rank(),
    }
}

// ---------------------------------------------------------------------------
// FailureReason
// ---------------------------------------------------------------------------

/// Why an entry was marked `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureReason {
    /// Transient I/O failure persisted through every retry.
    TransientExhausted,
    /// Permanent source error (not found, removed, permission denied).
    Permanent,
    /// Remote artifact existence/size could not be confirmed after upload.
    UploadUnverified,
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::TransientExhausted => "transient-exhausted",
            Self::Permanent => "permanent",
            Self::UploadUnverified => "upload-unverified",
        };
        write!(f, "{s}")
    }
}

// ---------------------------------------------------------------------------
// CatalogEntry
// ---------------------------------------------------------------------------

/// Kind of caption track offered by the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackKind {
    /// Manually authored captions.
    Manual,
    /// Auto-generated captions (speech recognition).
    Auto,
}

/// Reference to one caption track on the source side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptionTrackRef {
    pub kind: TrackKind,
    /// BCP-47-ish language tag, e.g. "en".
    #[serde(default = "default_lang")]
    pub lang: String,
    /// URL the raw caption body can be fetched from.
    pub url: String,
}

fn default_lang() -> String {
    "en".into()
}

/// One discoverable content item and its pipeline progress.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    /// Identifier of the origin tree (provider/channel).
    pub source_id: String,
    /// Provider-native identifier, unique within `source_id`.
    pub content_id: String,
    /// Display title.
    pub title: String,
    /// Ordered ancestor node titles, root first.
    pub topic_path: Vec<String>,
    /// Media duration if the source reports one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<f64>,
    /// URL the media file can be fetched from, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_url: Option<String>,
    /// Available caption tracks.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub captions: Vec<CaptionTrackRef>,
    /// Pipeline status.
    pub status: ItemStatus,
    /// Number of orchestrator passes that have attempted this entry.
    #[serde(default)]
    pub attempt_count: u32,
    /// Most recent error message, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl CatalogEntry {
    /// Catalog key for this entry.
    pub fn key(&self) -> String {
        entry_key(&self.source_id, &self.content_id)
    }

    /// Refresh descriptive fields from a rediscovered entry without touching
    /// pipeline progress (`status`, `attempt_count`, `last_error`).
    pub fn refresh_from(&mut self, other: &CatalogEntry) {
        self.title = other.title.clone();
        self.topic_path = other.topic_path.clone();
        self.duration_seconds = other.duration_seconds;
        self.media_url = other.media_url.clone();
        self.captions = other.captions.clone();
    }
}

// ---------------------------------------------------------------------------
// TranscriptSegment
// ---------------------------------------------------------------------------

/// One timestamped unit of a processed transcript.
///
/// Invariants: `index` is 0-based and strictly increasing, `end_time >
/// start_time`, `text` non-empty after normalization, and chronological and
/// index order agree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptSegment {
    pub index: usize,
    /// Seconds from the start of the media.
    pub start_time: f64,
    pub end_time: f64,
    pub text: String,
}

// ---------------------------------------------------------------------------
// RunSummary
// ---------------------------------------------------------------------------

/// One failed item within a run, with its recorded reason.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailedItem {
    pub source_id: String,
    pub content_id: String,
    pub reason: String,
}

/// Write-once report of one pipeline invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    /// Unique run identifier.
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Entries newly discovered during this run (0 when discovery skipped).
    pub discovered: usize,
    /// Entries selected for processing.
    pub selected: usize,
    pub fetched: usize,
    pub processed: usize,
    pub uploaded: usize,
    pub no_transcript: usize,
    pub failed: usize,
    /// Every failed `(source_id, content_id)` with its reason.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<FailedItem>,
}
