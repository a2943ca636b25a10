//! Shared types, error model, and configuration for LessonVault.
//!
//! This crate is the foundation depended on by all other LessonVault crates.
//! It provides:
//! - [`LessonVaultError`] — the unified error type
//! - Domain types ([`CatalogEntry`], [`ItemStatus`], [`TranscriptSegment`], [`RunSummary`])
//! - Configuration ([`AppConfig`], [`IngestOptions`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, DefaultsConfig, IngestOptions, SourceConfig, StorageConfig, config_dir,
    config_file_path, init_config, load_config, load_config_from,
};
pub use error::{ErrorClass, LessonVaultError, Result};
pub use types::{
    CATALOG_FORMAT_VERSION, CaptionTrackRef, CatalogEntry, FailedItem, FailureReason, ItemStatus,
    RunSummary, TrackKind, TranscriptSegment, can_advance, entry_key,
};
