//! Concurrent per-item orchestration: fetch, process, upload, verify, clean.
//!
//! Each selected catalog entry runs through a small state machine on a
//! worker; status transitions are applied against the shared catalog and the
//! document is saved after every item reaches a terminal state for this run,
//! so an interrupted run resumes from the last completed item.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, info, instrument, warn};

use lessonvault_catalog::Catalog;
use lessonvault_shared::{
    CaptionTrackRef, CatalogEntry, ErrorClass, FailedItem, FailureReason, IngestOptions,
    ItemStatus, LessonVaultError, Result, TrackKind, can_advance,
};
use lessonvault_source::SourceClient;
use lessonvault_store::{ObjectStore, layout};
use lessonvault_transcript::{CaptionSet, CaptionTrack, TranscriptArtifact, plain_text, process};

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// Terminal outcome of one item for this run.
#[derive(Debug)]
enum ItemOutcome {
    Uploaded,
    NoTranscript,
    Failed {
        reason: FailureReason,
        message: String,
    },
}

#[derive(Debug)]
struct ItemResult {
    source_id: String,
    content_id: String,
    outcome: ItemOutcome,
    fetched: bool,
    processed: bool,
}

/// Aggregate counts for one orchestrator pass.
#[derive(Debug, Default, Clone)]
pub struct RunTally {
    pub selected: usize,
    pub fetched: usize,
    pub processed: usize,
    pub uploaded: usize,
    pub no_transcript: usize,
    pub failed: usize,
    pub failures: Vec<FailedItem>,
}

impl RunTally {
    fn absorb(&mut self, result: ItemResult) {
        if result.fetched {
            self.fetched += 1;
        }
        if result.processed {
            self.processed += 1;
        }
        match result.outcome {
            ItemOutcome::Uploaded => self.uploaded += 1,
            ItemOutcome::NoTranscript => self.no_transcript += 1,
            ItemOutcome::Failed { reason, .. } => {
                self.failed += 1;
                self.failures.push(FailedItem {
                    source_id: result.source_id,
                    content_id: result.content_id,
                    reason: reason.to_string(),
                });
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Worker-pool driver for the fetch/process/upload stages.
pub struct Orchestrator {
    client: Arc<SourceClient>,
    store: Arc<dyn ObjectStore>,
    options: IngestOptions,
    stop: Arc<AtomicBool>,
}

impl Orchestrator {
    pub fn new(
        client: Arc<SourceClient>,
        store: Arc<dyn ObjectStore>,
        options: IngestOptions,
        stop: Arc<AtomicBool>,
    ) -> Self {
        Self {
            client,
            store,
            options,
            stop,
        }
    }

    /// Process the selected entries with a bounded worker pool.
    ///
    /// The catalog is saved after each item reaches a terminal state for the
    /// run. Per-item failures are tallied, never propagated.
    #[instrument(skip_all, fields(items = keys.len(), concurrency = self.options.concurrency))]
    pub async fn run(
        &self,
        catalog: Arc<Mutex<Catalog>>,
        catalog_path: &Path,
        keys: Vec<String>,
    ) -> RunTally {
        let mut tally = RunTally {
            selected: keys.len(),
            ..Default::default()
        };

        let semaphore = Arc::new(Semaphore::new(self.options.concurrency.max(1)));
        let mut workers: JoinSet<Option<ItemResult>> = JoinSet::new();

        for key in keys {
            workers.spawn(worker(
                key,
                Arc::clone(&self.client),
                Arc::clone(&self.store),
                Arc::clone(&catalog),
                catalog_path.to_path_buf(),
                self.options.clone(),
                Arc::clone(&self.stop),
                Arc::clone(&semaphore),
            ));
        }

        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok(Some(result)) => tally.absorb(result),
                Ok(None) => {}
                Err(e) => warn!(error = %e, "worker task aborted"),
            }
        }

        info!(
            uploaded = tally.uploaded,
            no_transcript = tally.no_transcript,
            failed = tally.failed,
            "orchestration complete"
        );
        tally
    }
}

// ---------------------------------------------------------------------------
// Worker
// ---------------------------------------------------------------------------

#[allow(clippy::too_many_arguments)]
async fn worker(
    key: String,
    client: Arc<SourceClient>,
    store: Arc<dyn ObjectStore>,
    catalog: Arc<Mutex<Catalog>>,
    catalog_path: PathBuf,
    options: IngestOptions,
    stop: Arc<AtomicBool>,
    semaphore: Arc<Semaphore>,
) -> Option<ItemResult> {
    let Ok(_permit) = semaphore.acquire_owned().await else {
        return None;
    };
    if stop.load(Ordering::Relaxed) {
        debug!(key, "stop requested, leaving item untouched");
        return None;
    }

    // Claim the entry: bump the attempt count and move into Fetching.
    let entry = {
        let mut cat = catalog.lock().await;
        let entry = cat.entries.get_mut(&key)?;
        entry.attempt_count += 1;
        entry.last_error = None;
        if can_advance(entry.status, ItemStatus::Fetching) {
            entry.status = ItemStatus::Fetching;
        }
        entry.clone()
    };

    let result = process_item(&client, store.as_ref(), &catalog, &options, entry).await;

    // Record the terminal state and persist, so a crash after this point
    // never repeats the item.
    {
        let mut cat = catalog.lock().await;
        if let Some(entry) = cat.entries.get_mut(&key) {
            match &result.outcome {
                ItemOutcome::Uploaded => {
                    if can_advance(entry.status, ItemStatus::Uploaded) {
                        entry.status = ItemStatus::Uploaded;
                    }
                    entry.last_error = None;
                }
                ItemOutcome::NoTranscript => {
                    if can_advance(entry.status, ItemStatus::NoTranscript) {
                        entry.status = ItemStatus::NoTranscript;
                    }
                    entry.last_error = None;
                }
                ItemOutcome::Failed { reason, message } => {
                    if can_advance(entry.status, ItemStatus::Failed) {
                        entry.status = ItemStatus::Failed;
                    }
                    entry.last_error = Some(format!("{reason}: {message}"));
                }
            }
        }
        if let Err(e) = cat.save(&catalog_path) {
            warn!(error = %e, "catalog save failed, stopping run");
            stop.store(true, Ordering::Relaxed);
        }
    }

    Some(result)
}

// ---------------------------------------------------------------------------
// Per-item state machine
// ---------------------------------------------------------------------------

/// Locally staged inputs for one item.
struct StagedItem {
    media: Option<StagedFile>,
    caption: Option<StagedCaption>,
}

struct StagedFile {
    path: PathBuf,
    size: u64,
}

struct StagedCaption {
    kind: TrackKind,
    lang: String,
    body: String,
}

/// Serialized transcript artifacts ready for upload.
struct ProcessedArtifacts {
    json: Vec<u8>,
    text: Vec<u8>,
}

enum UploadError {
    /// Remote existence/size could not be confirmed after the upload.
    Unverified(String),
    Other(LessonVaultError),
}

#[instrument(skip_all, fields(source_id = %entry.source_id, content_id = %entry.content_id))]
async fn process_item(
    client: &SourceClient,
    store: &dyn ObjectStore,
    catalog: &Mutex<Catalog>,
    options: &IngestOptions,
    entry: CatalogEntry,
) -> ItemResult {
    let key = entry.key();
    let staging = options
        .staging_dir
        .join(&entry.source_id)
        .join(&entry.content_id);

    // ---- Fetch ----
    let staged = match fetch_stage(client, options, &entry, &staging).await {
        Ok(staged) => staged,
        Err(e) => return failed(&entry, e, false, false),
    };
    advance(catalog, &key, ItemStatus::Fetched).await;

    if staged.media.is_none() && staged.caption.is_none() {
        // Nothing fetchable for this item: terminal, but not a failure.
        debug!("no caption track and no media requested");
        let _ = tokio::fs::remove_dir_all(&staging).await;
        return ItemResult {
            source_id: entry.source_id,
            content_id: entry.content_id,
            outcome: ItemOutcome::NoTranscript,
            fetched: true,
            processed: false,
        };
    }

    // ---- Process ----
    let mut artifacts: Option<ProcessedArtifacts> = None;
    if !options.skip_transcript {
        if let Some(caption) = &staged.caption {
            advance(catalog, &key, ItemStatus::Processing).await;
            match process_stage(&entry, caption) {
                Ok(produced) => {
                    artifacts = Some(produced);
                    advance(catalog, &key, ItemStatus::Processed).await;
                }
                Err(e) => return failed(&entry, e, true, false),
            }
        }
    }
    let processed = artifacts.is_some();

    // ---- Upload + verify ----
    advance(catalog, &key, ItemStatus::Uploading).await;
    match upload_stage(store, &entry, &staged, artifacts.as_ref()).await {
        Ok(()) => {}
        Err(UploadError::Unverified(message)) => {
            // Local files are the only confirmed copy; keep them.
            warn!(message, "upload could not be verified, retaining staging files");
            return ItemResult {
                source_id: entry.source_id,
                content_id: entry.content_id,
                outcome: ItemOutcome::Failed {
                    reason: FailureReason::UploadUnverified,
                    message,
                },
                fetched: true,
                processed,
            };
        }
        Err(UploadError::Other(e)) => return failed(&entry, e, true, processed),
    }

    // Verified remote copy exists; local staging is now disposable.
    if !options.keep_local {
        if let Err(e) = tokio::fs::remove_dir_all(&staging).await {
            warn!(staging = %staging.display(), error = %e, "staging cleanup failed");
        }
    }

    ItemResult {
        source_id: entry.source_id,
        content_id: entry.content_id,
        outcome: ItemOutcome::Uploaded,
        fetched: true,
        processed,
    }
}

/// Apply a forward status transition against the shared catalog.
async fn advance(catalog: &Mutex<Catalog>, key: &str, to: ItemStatus) {
    let mut cat = catalog.lock().await;
    if let Some(entry) = cat.entries.get_mut(key) {
        if can_advance(entry.status, to) {
            entry.status = to;
        }
    }
}

fn failed(entry: &CatalogEntry, e: LessonVaultError, fetched: bool, processed: bool) -> ItemResult {
    let reason = match e.class() {
        ErrorClass::Transient => FailureReason::TransientExhausted,
        _ => FailureReason::Permanent,
    };
    warn!(reason = %reason, error = %e, "item failed");
    ItemResult {
        source_id: entry.source_id.clone(),
        content_id: entry.content_id.clone(),
        outcome: ItemOutcome::Failed {
            reason,
            message: e.to_string(),
        },
        fetched,
        processed,
    }
}

// ---- Fetch stage ----

/// Pick the caption track to ingest: manual wins over auto-generated.
fn best_caption(tracks: &[CaptionTrackRef]) -> Option<&CaptionTrackRef> {
    tracks
        .iter()
        .find(|t| t.kind == TrackKind::Manual)
        .or_else(|| tracks.first())
}

/// Download the item's media and caption track into the staging directory.
///
/// Files already staged from an interrupted run are reused instead of being
/// fetched again. Staging writes are temp-then-rename, so only completed
/// downloads ever carry the final names; an interrupted transfer leaves a
/// `.part` file that is ignored and overwritten here.
async fn fetch_stage(
    client: &SourceClient,
    options: &IngestOptions,
    entry: &CatalogEntry,
    staging: &Path,
) -> Result<StagedItem> {
    let mut media = None;
    if !options.skip_media {
        if let Some(url) = &entry.media_url {
            let dest = staging.join("media.bin");
            let size = match tokio::fs::metadata(&dest).await {
                Ok(meta) if meta.len() > 0 => {
                    debug!(dest = %dest.display(), "media already staged");
                    meta.len()
                }
                _ => client.download_to_file(url, &dest).await?,
            };
            media = Some(StagedFile { path: dest, size });
        }
    }

    let mut caption = None;
    if let Some(track) = best_caption(&entry.captions) {
        let dest = staging.join("caption.vtt");
        let body = match tokio::fs::read_to_string(&dest).await {
            Ok(body) if !body.is_empty() => {
                debug!(dest = %dest.display(), "caption already staged");
                body
            }
            _ => {
                let body = client.get_text(&track.url).await?;
                tokio::fs::create_dir_all(staging)
                    .await
                    .map_err(|e| LessonVaultError::io(staging, e))?;
                // Temp-then-rename so a crash never leaves a partial caption
                // that a later run would trust.
                let tmp = dest.with_extension("part");
                tokio::fs::write(&tmp, &body)
                    .await
                    .map_err(|e| LessonVaultError::io(&tmp, e))?;
                tokio::fs::rename(&tmp, &dest)
                    .await
                    .map_err(|e| LessonVaultError::io(&dest, e))?;
                body
            }
        };
        caption = Some(StagedCaption {
            kind: track.kind,
            lang: track.lang.clone(),
            body,
        });
    }

    Ok(StagedItem { media, caption })
}

// ---- Process stage ----

fn process_stage(entry: &CatalogEntry, caption: &StagedCaption) -> Result<ProcessedArtifacts> {
    let set = CaptionSet {
        tracks: vec![CaptionTrack {
            kind: caption.kind,
            lang: caption.lang.clone(),
            body: caption.body.clone(),
        }],
    };
    let processed = process(&set)?;
    let artifact = TranscriptArtifact::new(&entry.source_id, &entry.content_id, &processed);
    let json = serde_json::to_vec_pretty(&artifact)
        .map_err(|e| LessonVaultError::validation(format!("transcript serialize: {e}")))?;
    Ok(ProcessedArtifacts {
        json,
        text: plain_text(&processed).into_bytes(),
    })
}

// ---- Upload stage ----

async fn upload_stage(
    store: &dyn ObjectStore,
    entry: &CatalogEntry,
    staged: &StagedItem,
    artifacts: Option<&ProcessedArtifacts>,
) -> std::result::Result<(), UploadError> {
    let id = &entry.content_id;

    if let Some(media) = &staged.media {
        put_file_verified(store, &layout::media(id), &media.path, media.size).await?;
    }
    if let Some(caption) = &staged.caption {
        put_bytes_verified(store, &layout::raw_caption(id), caption.body.as_bytes()).await?;
    }
    if let Some(artifacts) = artifacts {
        put_bytes_verified(store, &layout::processed_json(id), &artifacts.json).await?;
        put_bytes_verified(store, &layout::processed_text(id), &artifacts.text).await?;
    }
    Ok(())
}

/// Upload `bytes` unless a same-sized object is already present, then confirm
/// the remote copy by size.
async fn put_bytes_verified(
    store: &dyn ObjectStore,
    path: &str,
    bytes: &[u8],
) -> std::result::Result<(), UploadError> {
    let expected = bytes.len() as u64;
    if already_present(store, path, expected).await? {
        return Ok(());
    }
    store.put(path, bytes).await.map_err(UploadError::Other)?;
    verify_remote(store, path, expected).await
}

async fn put_file_verified(
    store: &dyn ObjectStore,
    path: &str,
    local: &Path,
    expected: u64,
) -> std::result::Result<(), UploadError> {
    if already_present(store, path, expected).await? {
        return Ok(());
    }
    store
        .put_file(path, local)
        .await
        .map_err(UploadError::Other)?;
    verify_remote(store, path, expected).await
}

async fn already_present(
    store: &dyn ObjectStore,
    path: &str,
    expected: u64,
) -> std::result::Result<bool, UploadError> {
    match store.head(path).await.map_err(UploadError::Other)? {
        Some(meta) if meta.size == expected => {
            debug!(path, "object already stored, skipping upload");
            Ok(true)
        }
        _ => Ok(false),
    }
}

async fn verify_remote(
    store: &dyn ObjectStore,
    path: &str,
    expected: u64,
) -> std::result::Result<(), UploadError> {
    match store.head(path).await.map_err(UploadError::Other)? {
        Some(meta) if meta.size == expected => Ok(()),
        Some(meta) => Err(UploadError::Unverified(format!(
            "{path}: remote size {} does not match local {expected}",
            meta.size
        ))),
        None => Err(UploadError::Unverified(format!(
            "{path}: object missing after upload"
        ))),
    }
}
