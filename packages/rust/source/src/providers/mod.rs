//! Provider adapters for the content trees LessonVault can ingest from.
//!
//! The discovery source is polymorphic: one provider exposes a nested topic
//! tree in a single document, another a paginated channel API. Providers
//! implement the small [`SourceProvider`] capability interface instead of the
//! discoverer branching on provider names.

mod channel;
mod topic_tree;

use async_trait::async_trait;

use lessonvault_shared::{CatalogEntry, Result};

use crate::SourceClient;

pub use channel::ChannelProvider;
pub use topic_tree::TopicTreeProvider;

// ---------------------------------------------------------------------------
// SourceNode
// ---------------------------------------------------------------------------

/// One node of a provider's content tree.
///
/// `raw` carries the provider-native JSON so each provider can read its own
/// fields back out in [`SourceProvider::children`] / `to_entry`.
#[derive(Debug, Clone)]
pub struct SourceNode {
    pub id: String,
    pub title: String,
    pub raw: serde_json::Value,
}

// ---------------------------------------------------------------------------
// SourceProvider
// ---------------------------------------------------------------------------

/// Capability interface for walking one provider's content tree.
///
/// All network access goes through the shared [`SourceClient`], keeping the
/// rate limit global across providers and workers.
#[async_trait]
pub trait SourceProvider: Send + Sync {
    /// Identifier of the origin tree; becomes `CatalogEntry::source_id`.
    fn source_id(&self) -> &str;

    /// Fetch the root node of the tree.
    async fn root(&self, client: &SourceClient) -> Result<SourceNode>;

    /// List the direct children of a non-leaf node.
    async fn children(&self, client: &SourceClient, node: &SourceNode)
    -> Result<Vec<SourceNode>>;

    /// Whether this node is a content leaf (a video) rather than a topic.
    fn is_leaf(&self, node: &SourceNode) -> bool;

    /// Convert a leaf node into a catalog entry with status `Discovered`.
    fn to_entry(&self, node: &SourceNode, topic_path: &[String]) -> Result<CatalogEntry>;
}
