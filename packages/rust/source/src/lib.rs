//! Source-side access for LessonVault: the rate-limited HTTP client,
//! provider adapters for the content trees we ingest from, and the
//! catalog discoverer that walks them.
//!
//! Every request to a discovery/caption source goes through one
//! [`SourceClient`] instance, which enforces the inter-request delay and
//! retry policy for the whole pipeline regardless of worker concurrency.

mod client;
mod discover;
pub mod providers;

pub use client::{SourceClient, SourceClientConfig};
pub use discover::{DiscoveryReport, discover};
pub use providers::{ChannelProvider, SourceNode, SourceProvider, TopicTreeProvider};
