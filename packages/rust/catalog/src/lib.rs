//! The persisted catalog: a single versioned JSON document mapping
//! `"{source_id}:{content_id}"` keys to [`CatalogEntry`] records.
//!
//! The document is the pipeline's source of truth across runs. Saves are
//! atomic (write-to-temp-then-rename), so a reader never observes a partial
//! catalog. Re-discovery merges via [`Catalog::upsert`], which refreshes
//! descriptive fields but preserves pipeline progress.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use lessonvault_shared::{
    CATALOG_FORMAT_VERSION, CatalogEntry, ItemStatus, LessonVaultError, Result,
};

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

/// The persisted registry of all known content items.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Catalog {
    /// Document format version.
    pub version: u32,
    /// When the document was last saved.
    pub last_updated: DateTime<Utc>,
    /// Entries keyed by `"{source_id}:{content_id}"`, in key order.
    pub entries: BTreeMap<String, CatalogEntry>,
}

impl Default for Catalog {
    fn default() -> Self {
        Self::new()
    }
}

impl Catalog {
    /// Create an empty catalog.
    pub fn new() -> Self {
        Self {
            version: CATALOG_FORMAT_VERSION,
            last_updated: Utc::now(),
            entries: BTreeMap::new(),
        }
    }

    /// Load a catalog document from disk.
    ///
    /// A missing file yields an empty catalog; an unreadable or corrupt file
    /// is a pipeline-fatal error (the run must not proceed and overwrite it).
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(?path, "catalog not found, starting empty");
            return Ok(Self::new());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| LessonVaultError::catalog(format!("{}: {e}", path.display())))?;

        let catalog: Catalog = serde_json::from_str(&content).map_err(|e| {
            LessonVaultError::catalog(format!("{}: corrupt document: {e}", path.display()))
        })?;

        if catalog.version != CATALOG_FORMAT_VERSION {
            return Err(LessonVaultError::catalog(format!(
                "{}: unsupported catalog version {}",
                path.display(),
                catalog.version
            )));
        }

        Ok(catalog)
    }

    /// Save the catalog atomically: serialize to a sibling temp file, then
    /// rename over the target so no partial write is ever visible.
    pub fn save(&mut self, path: &Path) -> Result<()> {
        self.last_updated = Utc::now();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| LessonVaultError::io(parent, e))?;
        }

        let json = serde_json::to_string_pretty(self)
            .map_err(|e| LessonVaultError::catalog(format!("serialize: {e}")))?;

        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json).map_err(|e| LessonVaultError::io(&tmp, e))?;
        std::fs::rename(&tmp, path).map_err(|e| LessonVaultError::io(path, e))?;

        debug!(?path, entries = self.entries.len(), "catalog saved");
        Ok(())
    }

    /// Merge discovered entries into the catalog.
    ///
    /// New keys are inserted as-is. Existing keys keep their `status`,
    /// `attempt_count` and `last_error`; only descriptive fields (title,
    /// topic path, duration, media/caption references) are refreshed.
    /// Returns the number of newly inserted entries.
    pub fn upsert(&mut self, discovered: impl IntoIterator<Item = CatalogEntry>) -> usize {
        let mut inserted = 0;
        for entry in discovered {
            let key = entry.key();
            match self.entries.get_mut(&key) {
                Some(existing) => existing.refresh_from(&entry),
                None => {
                    self.entries.insert(key, entry);
                    inserted += 1;
                }
            }
        }
        if inserted > 0 {
            info!(inserted, total = self.entries.len(), "catalog merged");
        }
        inserted
    }

    /// Select up to `limit` entry keys that still need work, in catalog
    /// order: any non-terminal status, and `Failed` only while the entry's
    /// attempt count is below `max_attempts`. `limit == 0` means unlimited.
    pub fn select(&self, limit: usize, max_attempts: u32) -> Vec<String> {
        let mut keys = Vec::new();
        for (key, entry) in &self.entries {
            if entry.status.is_terminal() {
                continue;
            }
            if entry.status == ItemStatus::Failed && entry.attempt_count >= max_attempts {
                continue;
            }
            keys.push(key.clone());
            if limit > 0 && keys.len() == limit {
                break;
            }
        }
        keys
    }

    /// Entries that exhausted their retry budget, for run reporting.
    pub fn permanently_failed(&self, max_attempts: u32) -> Vec<&CatalogEntry> {
        self.entries
            .values()
            .filter(|e| e.status == ItemStatus::Failed && e.attempt_count >= max_attempts)
            .collect()
    }

    /// Per-status counts, in a stable order for display.
    pub fn status_counts(&self) -> Vec<(ItemStatus, usize)> {
        use ItemStatus::*;
        [
            Discovered, Fetching, Fetched, Processing, Processed, Uploading, Uploaded,
            NoTranscript, Failed,
        ]
        .into_iter()
        .map(|status| {
            let count = self.entries.values().filter(|e| e.status == status).count();
            (status, count)
        })
        .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lessonvault_shared::entry_key;

    fn entry(content_id: &str, status: ItemStatus) -> CatalogEntry {
        CatalogEntry {
            source_id: "khan".into(),
            content_id: content_id.into(),
            title: format!("Video {content_id}"),
            topic_path: vec!["Math".into()],
            duration_seconds: None,
            media_url: None,
            captions: vec![],
            status,
            attempt_count: 0,
            last_error: None,
        }
    }

    fn temp_catalog_path() -> std::path::PathBuf {
        std::env::temp_dir()
            .join(format!("lv-catalog-test-{}", uuid::Uuid::now_v7()))
            .join("catalog.json")
    }

    #[test]
    fn save_and_load_roundtrip() {
        let path = temp_catalog_path();

        let mut catalog = Catalog::new();
        catalog.upsert([entry("v1", ItemStatus::Discovered)]);
        catalog.save(&path).unwrap();

        let loaded = Catalog::load(&path).unwrap();
        assert_eq!(loaded.version, CATALOG_FORMAT_VERSION);
        assert_eq!(loaded.entries.len(), 1);
        assert!(loaded.entries.contains_key(&entry_key("khan", "v1")));

        // No stray temp file left behind.
        assert!(!path.with_extension("json.tmp").exists());
        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn missing_file_loads_empty() {
        let path = temp_catalog_path();
        let catalog = Catalog::load(&path).unwrap();
        assert!(catalog.entries.is_empty());
    }

    #[test]
    fn corrupt_document_is_fatal() {
        let path = temp_catalog_path();
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "{not json").unwrap();

        let err = Catalog::load(&path).unwrap_err();
        assert!(matches!(err, LessonVaultError::Catalog { .. }));
        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn upsert_preserves_progress_and_refreshes_description() {
        let mut catalog = Catalog::new();
        catalog.upsert([entry("v1", ItemStatus::Discovered)]);

        {
            let e = catalog
                .entries
                .get_mut(&entry_key("khan", "v1"))
                .unwrap();
            e.status = ItemStatus::Uploaded;
            e.attempt_count = 2;
        }

        let mut rediscovered = entry("v1", ItemStatus::Discovered);
        rediscovered.title = "Video v1 (renamed)".into();
        let inserted = catalog.upsert([rediscovered, entry("v2", ItemStatus::Discovered)]);

        assert_eq!(inserted, 1);
        let e = &catalog.entries[&entry_key("khan", "v1")];
        assert_eq!(e.title, "Video v1 (renamed)");
        assert_eq!(e.status, ItemStatus::Uploaded);
        assert_eq!(e.attempt_count, 2);
    }

    #[test]
    fn repeated_upsert_is_idempotent() {
        let discovered = vec![
            entry("v1", ItemStatus::Discovered),
            entry("v2", ItemStatus::Discovered),
        ];

        let mut catalog = Catalog::new();
        catalog.upsert(discovered.clone());
        let keys: Vec<_> = catalog.entries.keys().cloned().collect();
        let statuses: Vec<_> = catalog.entries.values().map(|e| e.status).collect();

        let inserted = catalog.upsert(discovered);
        assert_eq!(inserted, 0);
        assert_eq!(catalog.entries.keys().cloned().collect::<Vec<_>>(), keys);
        assert_eq!(
            catalog.entries.values().map(|e| e.status).collect::<Vec<_>>(),
            statuses
        );
    }

    #[test]
    fn select_skips_terminal_and_exhausted_entries() {
        let mut catalog = Catalog::new();
        catalog.upsert([
            entry("v1", ItemStatus::Discovered),
            entry("v2", ItemStatus::Uploaded),
            entry("v3", ItemStatus::NoTranscript),
            entry("v4", ItemStatus::Failed),
        ]);
        catalog
            .entries
            .get_mut(&entry_key("khan", "v4"))
            .unwrap()
            .attempt_count = 3;
        // A failed entry still under the attempt bound remains eligible.
        let mut retryable = entry("v5", ItemStatus::Failed);
        retryable.attempt_count = 1;
        catalog.entries.insert(retryable.key(), retryable);

        let selected = catalog.select(0, 3);
        assert_eq!(
            selected,
            vec![entry_key("khan", "v1"), entry_key("khan", "v5")]
        );
        assert_eq!(catalog.permanently_failed(3).len(), 1);
    }

    #[test]
    fn select_honors_limit_in_catalog_order() {
        let mut catalog = Catalog::new();
        for i in 0..100 {
            catalog.upsert([entry(&format!("v{i:03}"), ItemStatus::Discovered)]);
        }

        let selected = catalog.select(10, 3);
        assert_eq!(selected.len(), 10);
        assert_eq!(selected[0], entry_key("khan", "v000"));
        assert_eq!(selected[9], entry_key("khan", "v009"));
    }

    #[test]
    fn status_counts_cover_all_entries() {
        let mut catalog = Catalog::new();
        catalog.upsert([
            entry("v1", ItemStatus::Discovered),
            entry("v2", ItemStatus::Uploaded),
            entry("v3", ItemStatus::Uploaded),
        ]);

        let counts = catalog.status_counts();
        let total: usize = counts.iter().map(|(_, n)| n).sum();
        assert_eq!(total, 3);
        assert!(counts.contains(&(ItemStatus::Uploaded, 2)));
    }
}
