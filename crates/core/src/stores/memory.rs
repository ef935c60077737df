use crate::adapter::entity_vector;
use crate::embeddings::{cosine_similarity, CharacterNgramEmbedder, Embedder};
use crate::normalize::Normalizer;
use crate::traits::{CapabilitySet, Collection};
use crate::{CollectionKind, RawResult, SearchError, SearchFilter, MAX_LIMIT};
use async_trait::async_trait;
use serde_json::{Map, Value};

const STRIPPED_FIELDS: [&str; 3] = ["vec", "embedding", "vector"];

struct MemoryEntity {
    key: String,
    text: String,
    vector: Vec<f32>,
    raw: Map<String, Value>,
}

/// Collection held entirely in process memory.
///
/// Entities without a stored embedding are embedded from their content with
/// the character n-gram embedder when the collection is built.
pub struct MemoryCollection {
    name: String,
    capabilities: CapabilitySet,
    embedder: CharacterNgramEmbedder,
    entities: Vec<MemoryEntity>,
}

impl MemoryCollection {
    pub fn new(
        kind: CollectionKind,
        capabilities: CapabilitySet,
        records: Vec<Value>,
        normalizer: &Normalizer,
    ) -> Self {
        let embedder = CharacterNgramEmbedder::default();
        let entities = records
            .into_iter()
            .filter_map(|record| {
                let canonical = normalizer.normalize(&record, kind);
                if canonical.key.is_empty() {
                    return None;
                }
                let vector = entity_vector(&record)
                    .unwrap_or_else(|| embedder.embed(&canonical.content));
                let Value::Object(raw) = record else {
                    return None;
                };
                Some(MemoryEntity {
                    key: canonical.key,
                    text: canonical.content,
                    vector,
                    raw,
                })
            })
            .collect();

        Self {
            name: kind.as_str().to_string(),
            capabilities,
            embedder,
            entities,
        }
    }

    fn ranked(
        &self,
        filter: &SearchFilter,
        mut score: impl FnMut(&MemoryEntity) -> Option<f64>,
    ) -> Vec<RawResult> {
        let mut scored: Vec<(f64, &MemoryEntity)> = self
            .entities
            .iter()
            .filter(|entity| filter.admits(&entity.key))
            .filter_map(|entity| score(entity).map(|value| (value, entity)))
            .collect();
        scored.sort_by(|left, right| right.0.total_cmp(&left.0));
        scored
            .into_iter()
            .take(MAX_LIMIT)
            .map(|(value, entity)| entity.as_result(value))
            .collect()
    }
}

impl MemoryEntity {
    fn as_result(&self, score: f64) -> RawResult {
        let mut record = self.raw.clone();
        for field in STRIPPED_FIELDS {
            record.remove(field);
        }
        record.insert("score".to_string(), Value::from(score));
        Value::Object(record)
    }

    fn keyword_hits(&self, keywords: &[String]) -> usize {
        let haystack = format!("{} {}", self.key, self.text).to_lowercase();
        keywords
            .iter()
            .map(|keyword| haystack.matches(&keyword.to_lowercase()).count())
            .sum()
    }
}

#[async_trait]
impl Collection for MemoryCollection {
    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> CapabilitySet {
        self.capabilities
    }

    fn len(&self) -> usize {
        self.entities.len()
    }

    async fn lookup(
        &self,
        hypotheticals: &[String],
        filter: &SearchFilter,
    ) -> Result<Vec<RawResult>, SearchError> {
        let queries: Vec<Vec<f32>> = hypotheticals
            .iter()
            .map(|hypothetical| self.embedder.embed(hypothetical))
            .collect();
        Ok(self.ranked(filter, |entity| {
            queries
                .iter()
                .filter_map(|query| cosine_similarity(query, &entity.vector))
                .filter(|similarity| *similarity > 0.0)
                .reduce(f64::max)
        }))
    }

    async fn search(
        &self,
        keywords: &[String],
        filter: &SearchFilter,
    ) -> Result<Vec<RawResult>, SearchError> {
        Ok(self.ranked(filter, |entity| {
            let hits = entity.keyword_hits(keywords);
            (hits > 0).then_some(hits as f64)
        }))
    }

    async fn nearest(
        &self,
        vector: &[f32],
        filter: &SearchFilter,
    ) -> Result<Vec<RawResult>, SearchError> {
        self.check_dimensions(vector)?;
        Ok(self.ranked(filter, |entity| cosine_similarity(vector, &entity.vector)))
    }

    /// Scores are distances (`1 - similarity`) so the furthest entity ranks first.
    async fn furthest(
        &self,
        vector: &[f32],
        filter: &SearchFilter,
    ) -> Result<Vec<RawResult>, SearchError> {
        self.check_dimensions(vector)?;
        Ok(self.ranked(filter, |entity| {
            cosine_similarity(vector, &entity.vector).map(|similarity| 1.0 - similarity)
        }))
    }

    async fn get(&self, key: &str) -> Result<Option<RawResult>, SearchError> {
        Ok(self
            .entities
            .iter()
            .find(|entity| entity.key == key)
            .map(|entity| Value::Object(entity.raw.clone())))
    }
}

impl MemoryCollection {
    fn check_dimensions(&self, vector: &[f32]) -> Result<(), SearchError> {
        let comparable = self
            .entities
            .iter()
            .any(|entity| entity.vector.len() == vector.len());
        if !comparable && !self.entities.is_empty() {
            return Err(SearchError::Request(format!(
                "{} holds no embeddings with {} dimensions",
                self.name,
                vector.len()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn blocks() -> MemoryCollection {
        MemoryCollection::new(
            CollectionKind::Blocks,
            CapabilitySet::all(),
            vec![
                json!({ "key": "Garden.md#Irrigation", "text": "Water the raised beds every morning." }),
                json!({ "key": "Garden.md#Compost", "text": "Turn the compost pile weekly." }),
                json!({ "key": "Taxes.md#Deadlines", "text": "Quarterly estimated payments are due." }),
                json!({ "key": "Vectors.md", "text": "stored", "vec": [1.0, 0.0] }),
                json!({ "text": "no key, dropped" }),
            ],
            &Normalizer::default(),
        )
    }

    #[tokio::test]
    async fn records_without_keys_are_skipped() {
        assert_eq!(blocks().len(), 4);
    }

    #[tokio::test]
    async fn keyword_search_ranks_by_occurrences_and_respects_prefix() {
        let collection = blocks();
        let filter = SearchFilter {
            key_starts_with: Some("Garden.md".to_string()),
            ..SearchFilter::default()
        };
        let hits = collection
            .search(&["compost".to_string()], &filter)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0]["key"], "Garden.md#Compost");
        assert_eq!(hits[0]["score"], 2.0);
    }

    #[tokio::test]
    async fn lookup_prefers_semantically_close_entities() {
        let collection = blocks();
        let hits = collection
            .lookup(&["watering the raised beds".to_string()], &SearchFilter::default())
            .await
            .unwrap();
        assert_eq!(hits[0]["key"], "Garden.md#Irrigation");
    }

    #[tokio::test]
    async fn furthest_reverses_nearest_and_strips_embeddings() {
        let collection = MemoryCollection::new(
            CollectionKind::Sources,
            CapabilitySet::all(),
            vec![
                json!({ "key": "a", "vec": [1.0, 0.0] }),
                json!({ "key": "b", "vec": [0.6, 0.8] }),
                json!({ "key": "c", "vec": [0.0, 1.0] }),
            ],
            &Normalizer::default(),
        );
        let filter = SearchFilter::default();
        let nearest = collection.nearest(&[1.0, 0.0], &filter).await.unwrap();
        let furthest = collection.furthest(&[1.0, 0.0], &filter).await.unwrap();
        assert_eq!(nearest[0]["key"], "a");
        assert_eq!(furthest[0]["key"], "c");
        assert!(nearest[0].get("vec").is_none());
        assert!(collection.get("b").await.unwrap().unwrap().get("vec").is_some());
    }

    #[tokio::test]
    async fn mismatched_vector_dimensions_fail() {
        let collection = MemoryCollection::new(
            CollectionKind::Sources,
            CapabilitySet::all(),
            vec![json!({ "key": "a", "vec": [1.0, 0.0] })],
            &Normalizer::default(),
        );
        let error = collection
            .nearest(&[1.0, 0.0, 0.0], &SearchFilter::default())
            .await
            .unwrap_err();
        assert!(matches!(error, SearchError::Request(_)));
    }
}
