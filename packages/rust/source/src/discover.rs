//! Catalog discovery: depth-first traversal of a provider's content tree.

use tracing::{info, instrument, warn};

use lessonvault_shared::{CatalogEntry, Result};

use crate::providers::{SourceNode, SourceProvider};
use crate::SourceClient;

// ---------------------------------------------------------------------------
// DiscoveryReport
// ---------------------------------------------------------------------------

/// Traversal statistics for one discovery pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscoveryReport {
    /// Nodes visited, including topics and leaves.
    pub nodes_visited: usize,
    /// Leaves converted into catalog entries.
    pub leaves_found: usize,
    /// Branches skipped because listing or conversion failed.
    pub branches_skipped: usize,
}

// ---------------------------------------------------------------------------
// discover
// ---------------------------------------------------------------------------

/// Walk the provider's tree depth-first and produce one `Discovered` entry
/// per leaf.
///
/// A failing branch (children listing or leaf conversion) is logged and
/// skipped; the rest of the tree is still discovered. Only a failure to
/// fetch the root aborts discovery.
#[instrument(skip_all, fields(source_id = provider.source_id()))]
pub async fn discover(
    provider: &dyn SourceProvider,
    client: &SourceClient,
) -> Result<(Vec<CatalogEntry>, DiscoveryReport)> {
    let root = provider.root(client).await?;

    let mut report = DiscoveryReport::default();
    let mut entries = Vec::new();

    // Explicit stack; children pushed in reverse to preserve depth-first
    // left-to-right order.
    let mut stack: Vec<(SourceNode, Vec<String>)> = vec![(root, Vec::new())];

    while let Some((node, topic_path)) = stack.pop() {
        report.nodes_visited += 1;

        if provider.is_leaf(&node) {
            match provider.to_entry(&node, &topic_path) {
                Ok(entry) => {
                    report.leaves_found += 1;
                    entries.push(entry);
                }
                Err(e) => {
                    warn!(node_id = %node.id, error = %e, "leaf conversion failed, skipping");
                    report.branches_skipped += 1;
                }
            }
            continue;
        }

        match provider.children(client, &node).await {
            Ok(children) => {
                let mut child_path = topic_path.clone();
                child_path.push(node.title.clone());
                for child in children.into_iter().rev() {
                    stack.push((child, child_path.clone()));
                }
            }
            Err(e) => {
                warn!(node_id = %node.id, error = %e, "branch listing failed, skipping");
                report.branches_skipped += 1;
            }
        }
    }

    info!(
        nodes_visited = report.nodes_visited,
        leaves_found = report.leaves_found,
        branches_skipped = report.branches_skipped,
        "discovery complete"
    );

    Ok((entries, report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use crate::providers::TopicTreeProvider;
    use crate::SourceClientConfig;

    fn test_client() -> SourceClient {
        SourceClient::new(SourceClientConfig {
            rate_limit: std::time::Duration::ZERO,
            max_retries: 0,
            ..Default::default()
        })
        .unwrap()
    }

    fn video(id: &str, title: &str) -> serde_json::Value {
        serde_json::json!({
            "id": id,
            "title": title,
            "kind": "Video",
            "media_url": format!("https://cdn.example.com/{id}.mp4")
        })
    }

    /// 1 root, 2 topics, 3 leaves under one topic and 1 under the other.
    fn three_level_tree() -> serde_json::Value {
        serde_json::json!({
            "id": "root",
            "title": "Root",
            "kind": "Topic",
            "children": [
                {
                    "id": "t-algebra",
                    "title": "Algebra",
                    "kind": "Topic",
                    "children": [
                        video("v1", "Variables"),
                        video("v2", "Equations"),
                        video("v3", "Inequalities")
                    ]
                },
                {
                    "id": "t-geometry",
                    "title": "Geometry",
                    "kind": "Topic",
                    "children": [video("v4", "Angles")]
                }
            ]
        })
    }

    #[tokio::test]
    async fn discovers_all_leaves_with_topic_paths() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/topictree"))
            .respond_with(ResponseTemplate::new(200).set_body_json(three_level_tree()))
            .mount(&server)
            .await;

        let provider = TopicTreeProvider::new("khan", server.uri());
        let client = test_client();
        let (entries, report) = discover(&provider, &client).await.unwrap();

        assert_eq!(entries.len(), 4);
        assert_eq!(report.leaves_found, 4);
        assert_eq!(report.branches_skipped, 0);
        // root + 2 topics + 4 leaves
        assert_eq!(report.nodes_visited, 7);

        // Depth-first order, and each entry carries the ancestor titles.
        assert_eq!(entries[0].content_id, "v1");
        assert_eq!(entries[0].topic_path, vec!["Root", "Algebra"]);
        assert_eq!(entries[3].content_id, "v4");
        assert_eq!(entries[3].topic_path, vec!["Root", "Geometry"]);
    }

    #[tokio::test]
    async fn broken_branch_does_not_abort_discovery() {
        let server = MockServer::start().await;
        let tree = serde_json::json!({
            "id": "root",
            "title": "Root",
            "kind": "Topic",
            "children": [
                // Missing "id": the root's child listing fails.
                {"title": "broken", "kind": "Video"},
                video("v1", "Survivor")
            ]
        });
        Mock::given(method("GET"))
            .and(path("/topictree"))
            .respond_with(ResponseTemplate::new(200).set_body_json(tree))
            .mount(&server)
            .await;

        let provider = TopicTreeProvider::new("khan", server.uri());
        let client = test_client();
        // The malformed child makes the root's children() call fail; that
        // branch is skipped but discovery itself still succeeds.
        let (entries, report) = discover(&provider, &client).await.unwrap();
        assert_eq!(entries.len(), 0);
        assert_eq!(report.branches_skipped, 1);
    }

    #[tokio::test]
    async fn root_failure_aborts() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/topictree"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let provider = TopicTreeProvider::new("khan", server.uri());
        let client = test_client();
        assert!(discover(&provider, &client).await.is_err());
    }
}
