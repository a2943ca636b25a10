//! The end-to-end ingest pipeline: discovery refresh, selection,
//! orchestration, and metadata publication.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use lessonvault_catalog::Catalog;
use lessonvault_shared::{IngestOptions, LessonVaultError, Result, RunSummary};
use lessonvault_source::{DiscoveryReport, SourceClient, SourceProvider, discover};
use lessonvault_store::{ObjectStore, layout};

use crate::orchestrator::Orchestrator;

/// One configured pipeline instance, bound to a catalog document, a source
/// client and an object store.
pub struct Pipeline {
    catalog_path: PathBuf,
    client: Arc<SourceClient>,
    store: Arc<dyn ObjectStore>,
    options: IngestOptions,
    stop: Arc<AtomicBool>,
}

impl Pipeline {
    pub fn new(
        catalog_path: impl Into<PathBuf>,
        client: Arc<SourceClient>,
        store: Arc<dyn ObjectStore>,
        options: IngestOptions,
    ) -> Self {
        Self {
            catalog_path: catalog_path.into(),
            client,
            store,
            options,
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Cooperative stop flag. Once set, workers finish their current item
    /// and no further items are started.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    /// Walk the provider's tree and merge the result into the catalog.
    ///
    /// Returns the number of newly inserted entries and the traversal report.
    #[instrument(skip_all, fields(source_id = provider.source_id()))]
    pub async fn discover_into_catalog(
        &self,
        provider: &dyn SourceProvider,
    ) -> Result<(usize, DiscoveryReport)> {
        let mut catalog = Catalog::load(&self.catalog_path)?;
        let (entries, report) = discover(provider, &self.client).await?;
        let inserted = catalog.upsert(entries);
        catalog.save(&self.catalog_path)?;
        Ok((inserted, report))
    }

    /// Run one full ingest pass.
    ///
    /// An unreadable catalog or an unreachable store aborts before any item
    /// is touched. Per-item failures are recorded in the catalog and in the
    /// returned summary; they never fail the run.
    #[instrument(skip_all)]
    pub async fn ingest(&self, provider: Option<&dyn SourceProvider>) -> Result<RunSummary> {
        let run_id = Uuid::now_v7().to_string();
        let started_at = Utc::now();
        info!(run_id, "ingest run starting");

        let mut catalog = Catalog::load(&self.catalog_path)?;

        // Fail fast before any item work if the store is unreachable.
        self.store.ping().await?;

        let mut discovered = 0;
        if let Some(provider) = provider {
            let (entries, report) = discover(provider, &self.client).await?;
            discovered = catalog.upsert(entries);
            info!(
                discovered,
                leaves = report.leaves_found,
                skipped = report.branches_skipped,
                "discovery refresh merged"
            );
            catalog.save(&self.catalog_path)?;
        }

        let keys = catalog.select(self.options.max_items, self.options.max_attempts);
        info!(selected = keys.len(), "entries selected for this run");

        let shared = Arc::new(Mutex::new(catalog));
        let orchestrator = Orchestrator::new(
            Arc::clone(&self.client),
            Arc::clone(&self.store),
            self.options.clone(),
            Arc::clone(&self.stop),
        );
        let tally = orchestrator
            .run(Arc::clone(&shared), &self.catalog_path, keys)
            .await;

        let mut catalog = Arc::try_unwrap(shared)
            .map_err(|_| LessonVaultError::catalog("catalog still borrowed after run"))?
            .into_inner();
        catalog.save(&self.catalog_path)?;

        let summary = RunSummary {
            run_id,
            started_at,
            finished_at: Utc::now(),
            discovered,
            selected: tally.selected,
            fetched: tally.fetched,
            processed: tally.processed,
            uploaded: tally.uploaded,
            no_transcript: tally.no_transcript,
            failed: tally.failed,
            failures: tally.failures,
        };

        self.publish_metadata(&catalog, &summary).await;

        info!(
            run_id = %summary.run_id,
            uploaded = summary.uploaded,
            failed = summary.failed,
            "ingest run finished"
        );
        Ok(summary)
    }

    /// Push the catalog copy and the run summary into the store.
    ///
    /// Best effort: the authoritative catalog already sits on local disk, so
    /// a failure here is logged rather than failing a completed run.
    async fn publish_metadata(&self, catalog: &Catalog, summary: &RunSummary) {
        match serde_json::to_vec_pretty(catalog) {
            Ok(bytes) => {
                if let Err(e) = self.store.put(layout::CATALOG, &bytes).await {
                    warn!(error = %e, "catalog copy upload failed");
                }
            }
            Err(e) => warn!(error = %e, "catalog copy serialize failed"),
        }

        let stamp = summary.finished_at.format("%Y%m%dT%H%M%SZ").to_string();
        match serde_json::to_vec_pretty(summary) {
            Ok(bytes) => {
                if let Err(e) = self.store.put(&layout::run_summary(&stamp), &bytes).await {
                    warn!(error = %e, "run summary upload failed");
                }
            }
            Err(e) => warn!(error = %e, "run summary serialize failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use lessonvault_shared::{CatalogEntry, ItemStatus, entry_key};
    use lessonvault_source::{SourceClientConfig, TopicTreeProvider};
    use lessonvault_store::FsObjectStore;

    const VTT: &str = "WEBVTT\n\n00:00.000 --> 00:02.000\nhello class\n";

    struct Fixture {
        dir: PathBuf,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                dir: std::env::temp_dir().join(format!("lv-pipeline-{}", uuid::Uuid::now_v7())),
            }
        }

        fn catalog_path(&self) -> PathBuf {
            self.dir.join("catalog.json")
        }

        fn pipeline(&self, max_items: usize) -> Pipeline {
            let client = Arc::new(
                SourceClient::new(SourceClientConfig {
                    rate_limit: std::time::Duration::ZERO,
                    max_retries: 0,
                    ..Default::default()
                })
                .unwrap(),
            );
            let store = Arc::new(FsObjectStore::new(self.dir.join("store")));
            let options = IngestOptions {
                max_items,
                concurrency: 2,
                skip_media: false,
                skip_transcript: false,
                keep_local: false,
                staging_dir: self.dir.join("staging"),
                max_attempts: 3,
            };
            Pipeline::new(self.catalog_path(), client, store, options)
        }
    }

    impl Drop for Fixture {
        fn drop(&mut self) {
            let _ = std::fs::remove_dir_all(&self.dir);
        }
    }

    fn bare_entry(content_id: &str) -> CatalogEntry {
        CatalogEntry {
            source_id: "khan".into(),
            content_id: content_id.into(),
            title: format!("Video {content_id}"),
            topic_path: vec!["Math".into()],
            duration_seconds: None,
            media_url: None,
            captions: vec![],
            status: ItemStatus::Discovered,
            attempt_count: 0,
            last_error: None,
        }
    }

    fn seed_catalog(fixture: &Fixture, entries: Vec<CatalogEntry>) {
        let mut catalog = Catalog::new();
        catalog.upsert(entries);
        catalog.save(&fixture.catalog_path()).unwrap();
    }

    #[tokio::test]
    async fn ingest_caps_items_per_run() {
        let fixture = Fixture::new();
        seed_catalog(
            &fixture,
            (0..100).map(|i| bare_entry(&format!("v{i:03}"))).collect(),
        );

        let summary = fixture.pipeline(10).ingest(None).await.unwrap();
        assert_eq!(summary.selected, 10);
        assert_eq!(summary.no_transcript, 10);

        let catalog = Catalog::load(&fixture.catalog_path()).unwrap();
        let untouched = catalog
            .entries
            .values()
            .filter(|e| e.status == ItemStatus::Discovered)
            .count();
        assert_eq!(untouched, 90);
        // Catalog order: the first ten keys were the ones processed.
        assert_eq!(
            catalog.entries[&entry_key("khan", "v009")].status,
            ItemStatus::NoTranscript
        );
        assert_eq!(
            catalog.entries[&entry_key("khan", "v010")].status,
            ItemStatus::Discovered
        );
    }

    #[tokio::test]
    async fn rerun_after_completion_selects_nothing() {
        let fixture = Fixture::new();
        seed_catalog(&fixture, vec![bare_entry("v1"), bare_entry("v2")]);

        let pipeline = fixture.pipeline(0);
        let first = pipeline.ingest(None).await.unwrap();
        assert_eq!(first.selected, 2);

        let second = pipeline.ingest(None).await.unwrap();
        assert_eq!(second.selected, 0);
        assert_eq!(second.no_transcript, 0);
        assert_eq!(second.failed, 0);
    }

    #[tokio::test]
    async fn corrupt_catalog_aborts_run() {
        let fixture = Fixture::new();
        std::fs::create_dir_all(&fixture.dir).unwrap();
        std::fs::write(fixture.catalog_path(), "{not json").unwrap();

        let err = fixture.pipeline(0).ingest(None).await.unwrap_err();
        assert!(matches!(err, LessonVaultError::Catalog { .. }));

        // The corrupt document was not overwritten.
        assert_eq!(
            std::fs::read_to_string(fixture.catalog_path()).unwrap(),
            "{not json"
        );
    }

    #[tokio::test]
    async fn discovery_and_ingest_end_to_end() {
        let server = MockServer::start().await;
        let tree = serde_json::json!({
            "id": "root",
            "title": "Root",
            "kind": "Topic",
            "children": [{
                "id": "v1",
                "title": "Variables",
                "kind": "Video",
                "media_url": format!("{}/media/v1.mp4", server.uri()),
                "captions": [
                    {"kind": "manual", "lang": "en", "url": format!("{}/captions/v1.vtt", server.uri())}
                ]
            }]
        });
        Mock::given(method("GET"))
            .and(path("/topictree"))
            .respond_with(ResponseTemplate::new(200).set_body_json(tree))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/media/v1.mp4"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![9u8; 32]))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/captions/v1.vtt"))
            .respond_with(ResponseTemplate::new(200).set_body_string(VTT))
            .mount(&server)
            .await;

        let fixture = Fixture::new();
        let pipeline = fixture.pipeline(0);
        let provider = TopicTreeProvider::new("khan", server.uri());
        let summary = pipeline.ingest(Some(&provider)).await.unwrap();

        assert_eq!(summary.discovered, 1);
        assert_eq!(summary.selected, 1);
        assert_eq!(summary.fetched, 1);
        assert_eq!(summary.processed, 1);
        assert_eq!(summary.uploaded, 1);
        assert!(summary.failures.is_empty());

        // Catalog copy and run summary were published to the store.
        let store_root = fixture.dir.join("store");
        assert!(store_root.join("metadata/catalog.json").exists());
        let summaries: Vec<_> = std::fs::read_dir(store_root.join("metadata"))
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| {
                e.file_name()
                    .to_string_lossy()
                    .starts_with("run_summary_")
            })
            .collect();
        assert_eq!(summaries.len(), 1);
    }

    #[tokio::test]
    async fn failed_items_do_not_fail_the_run() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/captions/bad.vtt"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let fixture = Fixture::new();
        let mut failing = bare_entry("bad");
        failing.captions = vec![lessonvault_shared::CaptionTrackRef {
            kind: lessonvault_shared::TrackKind::Manual,
            lang: "en".into(),
            url: format!("{}/captions/bad.vtt", server.uri()),
        }];
        seed_catalog(&fixture, vec![failing, bare_entry("v1")]);

        let summary = fixture.pipeline(0).ingest(None).await.unwrap();
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.no_transcript, 1);
        assert_eq!(summary.failures[0].content_id, "bad");
        assert_eq!(summary.failures[0].reason, "permanent");
    }
}
