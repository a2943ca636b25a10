//! Provider for channel-style sources with a paginated content-node API
//! (`/contentnode?parent=<id>&page=<n>` returning `{results, next}`).

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use lessonvault_shared::{
    CaptionTrackRef, CatalogEntry, ItemStatus, LessonVaultError, Result, TrackKind,
};

use super::{SourceNode, SourceProvider};
use crate::SourceClient;

/// One page of the content-node listing.
#[derive(Debug, Deserialize)]
struct NodePage {
    results: Vec<serde_json::Value>,
    /// URL of the next page, if any.
    #[serde(default)]
    next: Option<String>,
}

/// A file attached to a content node.
#[derive(Debug, Deserialize)]
struct NodeFile {
    preset: String,
    #[serde(default)]
    lang: Option<String>,
    storage_url: String,
}

/// Provider for a paginated channel API.
pub struct ChannelProvider {
    source_id: String,
    base_url: String,
    channel_id: String,
}

impl ChannelProvider {
    pub fn new(
        source_id: impl Into<String>,
        base_url: impl Into<String>,
        channel_id: impl Into<String>,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            channel_id: channel_id.into(),
        }
    }

    fn node_from_value(value: &serde_json::Value) -> Result<SourceNode> {
        let id = value
            .get("id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| LessonVaultError::validation("content node missing 'id'"))?
            .to_string();
        let title = value
            .get("title")
            .and_then(|v| v.as_str())
            .unwrap_or(&id)
            .to_string();
        Ok(SourceNode {
            id,
            title,
            raw: value.clone(),
        })
    }
}

#[async_trait]
impl SourceProvider for ChannelProvider {
    fn source_id(&self) -> &str {
        &self.source_id
    }

    async fn root(&self, client: &SourceClient) -> Result<SourceNode> {
        let url = format!("{}/channel/{}", self.base_url, self.channel_id);
        debug!(url, "fetching channel root");
        let channel: serde_json::Value = client.get_json(&url).await?;
        Self::node_from_value(&channel)
    }

    async fn children(
        &self,
        client: &SourceClient,
        node: &SourceNode,
    ) -> Result<Vec<SourceNode>> {
        let mut url = format!("{}/contentnode?parent={}", self.base_url, node.id);
        let mut nodes = Vec::new();

        // Follow `next` links until the listing is exhausted.
        loop {
            let page: NodePage = client.get_json(&url).await?;
            for value in &page.results {
                nodes.push(Self::node_from_value(value)?);
            }
            match page.next {
                Some(next) => url = next,
                None => break,
            }
        }

        Ok(nodes)
    }

    fn is_leaf(&self, node: &SourceNode) -> bool {
        node.raw.get("kind").and_then(|v| v.as_str()) == Some("video")
    }

    fn to_entry(&self, node: &SourceNode, topic_path: &[String]) -> Result<CatalogEntry> {
        let files: Vec<NodeFile> = node
            .raw
            .get("files")
            .map(|v| serde_json::from_value(v.clone()))
            .transpose()
            .map_err(|e| {
                LessonVaultError::validation(format!("content node '{}' files: {e}", node.id))
            })?
            .unwrap_or_default();

        let media_url = files
            .iter()
            .find(|f| f.preset == "video")
            .map(|f| f.storage_url.clone());

        let captions = files
            .iter()
            .filter_map(|f| {
                let kind = match f.preset.as_str() {
                    "subtitle" => TrackKind::Manual,
                    "auto_subtitle" => TrackKind::Auto,
                    _ => return None,
                };
                Some(CaptionTrackRef {
                    kind,
                    lang: f.lang.clone().unwrap_or_else(|| "en".into()),
                    url: f.storage_url.clone(),
                })
            })
            .collect();

        Ok(CatalogEntry {
            source_id: self.source_id.clone(),
            content_id: node.id.clone(),
            title: node.title.clone(),
            topic_path: topic_path.to_vec(),
            duration_seconds: node.raw.get("duration").and_then(|v| v.as_f64()),
            media_url,
            captions,
            status: ItemStatus::Discovered,
            attempt_count: 0,
            last_error: None,
        })
    }
}
