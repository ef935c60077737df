use crate::config::AliasConfig;
use crate::normalize::Normalizer;
use crate::stores::memory::MemoryCollection;
use crate::traits::{CapabilitySet, Collection, HostEnvironment};
use crate::{CollectionKind, SearchError};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

/// On-disk export of a vault's collections.
///
/// ```json
/// { "sources": [{"key": "a.md", "content": "..."}],
///   "blocks": [{"key": "a.md#h", "text": "..."}],
///   "capabilities": {"blocks": ["lookup_by_hypothetical"]} }
/// ```
///
/// A missing collection array means that collection is unavailable; missing
/// capabilities default to the full set.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Snapshot {
    pub sources: Option<Vec<Value>>,
    pub blocks: Option<Vec<Value>>,
    pub capabilities: SnapshotCapabilities,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SnapshotCapabilities {
    pub sources: Option<CapabilitySet>,
    pub blocks: Option<CapabilitySet>,
}

#[derive(Default)]
struct Loaded {
    sources: Option<Arc<MemoryCollection>>,
    blocks: Option<Arc<MemoryCollection>>,
}

/// Host environment backed by a JSON snapshot file; `refresh` re-reads it.
pub struct SnapshotEnvironment {
    path: PathBuf,
    normalizer: Normalizer,
    state: RwLock<Option<Loaded>>,
}

impl SnapshotEnvironment {
    /// Creates an environment that stays not-ready until the first refresh.
    pub fn new(path: impl Into<PathBuf>, aliases: AliasConfig) -> Self {
        Self {
            path: path.into(),
            normalizer: Normalizer::new(aliases),
            state: RwLock::new(None),
        }
    }

    pub async fn load(
        path: impl Into<PathBuf>,
        aliases: AliasConfig,
    ) -> Result<Self, SearchError> {
        let environment = Self::new(path, aliases);
        environment.refresh().await?;
        Ok(environment)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn build(&self, snapshot: Snapshot) -> Loaded {
        Loaded {
            sources: self.collection_of(
                CollectionKind::Sources,
                snapshot.sources,
                snapshot.capabilities.sources,
            ),
            blocks: self.collection_of(
                CollectionKind::Blocks,
                snapshot.blocks,
                snapshot.capabilities.blocks,
            ),
        }
    }

    fn collection_of(
        &self,
        kind: CollectionKind,
        records: Option<Vec<Value>>,
        capabilities: Option<CapabilitySet>,
    ) -> Option<Arc<MemoryCollection>> {
        records.map(|records| {
            Arc::new(MemoryCollection::new(
                kind,
                capabilities.unwrap_or_else(CapabilitySet::all),
                records,
                &self.normalizer,
            ))
        })
    }
}

#[async_trait]
impl HostEnvironment for SnapshotEnvironment {
    async fn is_ready(&self) -> bool {
        self.state.read().await.is_some()
    }

    async fn collection(&self, kind: CollectionKind) -> Option<Arc<dyn Collection>> {
        let state = self.state.read().await;
        let loaded = state.as_ref()?;
        let collection = match kind {
            CollectionKind::Sources => loaded.sources.clone(),
            CollectionKind::Blocks => loaded.blocks.clone(),
        };
        collection.map(|collection| collection as Arc<dyn Collection>)
    }

    async fn refresh(&self) -> Result<(), SearchError> {
        let raw = tokio::fs::read_to_string(&self.path).await?;
        let snapshot: Snapshot = serde_json::from_str(&raw)?;
        let loaded = self.build(snapshot);
        info!(
            path = %self.path.display(),
            sources = loaded.sources.as_ref().map_or(0, |collection| collection.len()),
            blocks = loaded.blocks.as_ref().map_or(0, |collection| collection.len()),
            "snapshot loaded"
        );
        *self.state.write().await = Some(loaded);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheTracker;
    use crate::config::SearchConfig;
    use crate::orchestrator::QueryDispatcher;
    use crate::traits::Capability;
    use crate::{CollectionScope, ModeHint, ResultType, SearchFilter, SearchPayload};
    use std::io::Write;

    fn write_snapshot(body: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(body.as_bytes()).unwrap();
        file
    }

    #[tokio::test]
    async fn environment_is_not_ready_before_first_load() {
        let environment =
            SnapshotEnvironment::new("/nonexistent/snapshot.json", AliasConfig::default());
        assert!(!environment.is_ready().await);
        assert!(environment.collection(CollectionKind::Sources).await.is_none());
        assert!(environment.refresh().await.is_err());
        assert!(!environment.is_ready().await);
    }

    #[tokio::test]
    async fn loads_collections_and_capabilities() {
        let file = write_snapshot(
            r#"{
                "sources": [{"key": "a.md", "content": "alpha"}],
                "capabilities": {"sources": ["lookup_by_hypothetical"]}
            }"#,
        );
        let environment = SnapshotEnvironment::load(file.path(), AliasConfig::default())
            .await
            .unwrap();

        assert!(environment.is_ready().await);
        let sources = environment.collection(CollectionKind::Sources).await.unwrap();
        assert_eq!(sources.len(), 1);
        assert!(sources.capabilities().contains(Capability::LookupByHypothetical));
        assert!(!sources.capabilities().contains(Capability::SearchByKeyword));
        assert!(environment.collection(CollectionKind::Blocks).await.is_none());
    }

    #[tokio::test]
    async fn refresh_picks_up_file_changes() {
        let file = write_snapshot(r#"{"blocks": [{"key": "a.md#x", "text": "one"}]}"#);
        let environment = SnapshotEnvironment::load(file.path(), AliasConfig::default())
            .await
            .unwrap();

        std::fs::write(
            file.path(),
            r#"{"blocks": [{"key": "a.md#x", "text": "one"}, {"key": "b.md#y", "text": "two"}]}"#,
        )
        .unwrap();
        environment.refresh().await.unwrap();

        let blocks = environment.collection(CollectionKind::Blocks).await.unwrap();
        assert_eq!(blocks.len(), 2);
    }

    #[tokio::test]
    async fn dispatcher_returns_nested_block_content() {
        let file = write_snapshot(
            r#"{
                "sources": [{"key": "Garden.md", "content": "Garden overview"}],
                "blocks": [
                    {"key": "Garden.md#Irrigation", "content": "", "data": {"content": "Drip irrigation at dawn."}},
                    {"key": "Garden.md#Soil", "text": "Loam with compost."}
                ]
            }"#,
        );
        let dispatcher = QueryDispatcher::new(
            SnapshotEnvironment::new(file.path(), AliasConfig::default()),
            Arc::new(CacheTracker::new(300)),
            SearchConfig::default(),
            "garden",
        );
        let payload = SearchPayload {
            mode: Some(ModeHint::Lexical),
            keywords: vec!["irrigation".to_string()],
            filter: SearchFilter {
                collection_scope: CollectionScope::Blocks,
                ..SearchFilter::default()
            },
            ..SearchPayload::default()
        };

        let response = dispatcher.execute_search(&payload).await.unwrap();

        assert_eq!(response.count, 1);
        let result = &response.results[0];
        assert_eq!(result.key, "Garden.md#Irrigation");
        assert_eq!(result.content, "Drip irrigation at dawn.");
        assert!(!result.content_missing);
        assert_eq!(result.result_type, ResultType::Block);
        assert_eq!(response.environment.sources.count, 1);
        assert_eq!(response.environment.blocks.count, 2);
    }
}
