//! Provider for sources exposing their whole content tree as one nested
//! `topictree` JSON document (topic → sub-topic → video leaves).

use async_trait::async_trait;
use tracing::debug;

use lessonvault_shared::{
    CaptionTrackRef, CatalogEntry, ItemStatus, LessonVaultError, Result, TrackKind,
};

use super::{SourceNode, SourceProvider};
use crate::SourceClient;

/// Provider for a nested topic-tree API.
///
/// The entire tree is fetched once at `root`; `children` then reads embedded
/// `children` arrays without further network calls.
pub struct TopicTreeProvider {
    source_id: String,
    base_url: String,
}

impl TopicTreeProvider {
    pub fn new(source_id: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn node_from_value(value: &serde_json::Value) -> Result<SourceNode> {
        let id = value
            .get("id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| LessonVaultError::validation("topic tree node missing 'id'"))?
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
impl SourceProvider for TopicTreeProvider {
    fn source_id(&self) -> &str {
        &self.source_id
    }

    async fn root(&self, client: &SourceClient) -> Result<SourceNode> {
        let url = format!("{}/topictree", self.base_url);
        debug!(url, "fetching topic tree");
        let tree: serde_json::Value = client.get_json(&url).await?;
        Self::node_from_value(&tree)
    }

    async fn children(
        &self,
        _client: &SourceClient,
        node: &SourceNode,
    ) -> Result<Vec<SourceNode>> {
        let Some(children) = node.raw.get("children").and_then(|v| v.as_array()) else {
            return Ok(vec![]);
        };
        children.iter().map(Self::node_from_value).collect()
    }

    fn is_leaf(&self, node: &SourceNode) -> bool {
        node.raw.get("kind").and_then(|v| v.as_str()) == Some("Video")
    }

    fn to_entry(&self, node: &SourceNode, topic_path: &[String]) -> Result<CatalogEntry> {
        let captions = node
            .raw
            .get("captions")
            .and_then(|v| v.as_array())
            .map(|tracks| {
                tracks
                    .iter()
                    .filter_map(|t| {
                        let url = t.get("url")?.as_str()?.to_string();
                        let kind = match t.get("kind").and_then(|k| k.as_str()) {
                            Some("manual") => TrackKind::Manual,
                            _ => TrackKind::Auto,
                        };
                        let lang = t
                            .get("lang")
                            .and_then(|l| l.as_str())
                            .unwrap_or("en")
                            .to_string();
                        Some(CaptionTrackRef { kind, lang, url })
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(CatalogEntry {
            source_id: self.source_id.clone(),
            content_id: node.id.clone(),
            title: node.title.clone(),
            topic_path: topic_path.to_vec(),
            duration_seconds: node.raw.get("duration").and_then(|v| v.as_f64()),
            media_url: node
                .raw
                .get("media_url")
                .and_then(|v| v.as_str())
                .map(String::from),
            captions,
            status: ItemStatus::Discovered,
            attempt_count: 0,
            last_error: None,
        })
    }
}
