//! Durable artifact storage for LessonVault.
//!
//! [`ObjectStore`] is the seam the orchestrator uploads through and verifies
//! against; implementations are thin wrappers around an HTTP bucket
//! ([`HttpObjectStore`]) or a local directory ([`FsObjectStore`]).

mod fs;
mod http;

use std::path::Path;

use async_trait::async_trait;

use lessonvault_shared::Result;

pub use fs::FsObjectStore;
pub use http::HttpObjectStore;

// ---------------------------------------------------------------------------
// ObjectStore
// ---------------------------------------------------------------------------

/// Metadata for a stored object, as reported by the store itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectMeta {
    /// Object size in bytes.
    pub size: u64,
}

/// A remote (or remote-like) blob store.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Write `bytes` at `path`, replacing any existing object.
    async fn put(&self, path: &str, bytes: &[u8]) -> Result<()>;

    /// Upload a local file to `path`. Returns the number of bytes written.
    async fn put_file(&self, path: &str, local: &Path) -> Result<u64>;

    /// Read the object at `path`.
    async fn get(&self, path: &str) -> Result<Vec<u8>>;

    /// Metadata for `path`, or `None` if no such object exists.
    async fn head(&self, path: &str) -> Result<Option<ObjectMeta>>;

    /// Cheap reachability check, run once at pipeline startup.
    async fn ping(&self) -> Result<()>;
}

// ---------------------------------------------------------------------------
// Remote layout
// ---------------------------------------------------------------------------

/// Canonical object paths for all pipeline artifacts.
pub mod layout {
    /// Media file for one item.
    pub fn media(content_id: &str) -> String {
        format!("media/{content_id}")
    }

    /// Raw caption body as fetched from the source.
    pub fn raw_caption(content_id: &str) -> String {
        format!("captions/raw/{content_id}")
    }

    /// Processed transcript JSON artifact.
    pub fn processed_json(content_id: &str) -> String {
        format!("captions/processed/{content_id}.json")
    }

    /// Processed transcript plain-text artifact.
    pub fn processed_text(content_id: &str) -> String {
        format!("captions/processed/{content_id}.txt")
    }

    /// The catalog document copy.
    pub const CATALOG: &str = "metadata/catalog.json";

    /// Run summary for one invocation, keyed by timestamp.
    pub fn run_summary(timestamp: &str) -> String {
        format!("metadata/run_summary_{timestamp}.json")
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn artifact_paths() {
            assert_eq!(media("v1"), "media/v1");
            assert_eq!(raw_caption("v1"), "captions/raw/v1");
            assert_eq!(processed_json("v1"), "captions/processed/v1.json");
            assert_eq!(processed_text("v1"), "captions/processed/v1.txt");
            assert_eq!(run_summary("20250101T000000Z"), "metadata/run_summary_20250101T000000Z.json");
        }
    }
}
