use crate::traits::{Capability, CapabilitySet, Collection};
use crate::{CollectionKind, RawResult, SearchError, SearchFilter};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

const ENTITY_VECTOR_POINTERS: [&str; 3] = ["/vec", "/embedding", "/vector"];

/// Result of one capability-checked call into a collection.
#[derive(Debug)]
pub enum AdapterOutcome {
    Hits(Vec<RawResult>),
    Unsupported(Capability),
    Failed(SearchError),
}

impl AdapterOutcome {
    pub fn hit_count(&self) -> usize {
        match self {
            Self::Hits(hits) => hits.len(),
            Self::Unsupported(_) | Self::Failed(_) => 0,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }

    pub fn into_hits(self) -> Vec<RawResult> {
        match self {
            Self::Hits(hits) => hits,
            Self::Unsupported(_) | Self::Failed(_) => Vec::new(),
        }
    }
}

#[derive(Debug)]
pub enum Resolution {
    Found(RawResult),
    Missing,
    Unsupported,
    Failed(SearchError),
}

/// Capability-checked facade over one collection.
///
/// Unsupported capabilities contribute nothing and backend errors are caught
/// here, so a failing collection never aborts the surrounding request.
#[derive(Clone)]
pub struct CollectionAdapter {
    kind: CollectionKind,
    collection: Arc<dyn Collection>,
}

impl CollectionAdapter {
    pub fn new(kind: CollectionKind, collection: Arc<dyn Collection>) -> Self {
        Self { kind, collection }
    }

    pub fn kind(&self) -> CollectionKind {
        self.kind
    }

    pub fn name(&self) -> &str {
        self.collection.name()
    }

    pub fn len(&self) -> usize {
        self.collection.len()
    }

    pub fn is_empty(&self) -> bool {
        self.collection.is_empty()
    }

    pub fn capabilities(&self) -> CapabilitySet {
        self.collection.capabilities()
    }

    pub fn supports(&self, capability: Capability) -> bool {
        self.capabilities().contains(capability)
    }

    pub async fn lookup_by_hypothetical(
        &self,
        hypotheticals: &[String],
        filter: &SearchFilter,
    ) -> AdapterOutcome {
        if !self.supports(Capability::LookupByHypothetical) {
            return self.unsupported(Capability::LookupByHypothetical);
        }
        let result = self.collection.lookup(hypotheticals, filter).await;
        self.settle(Capability::LookupByHypothetical, result)
    }

    pub async fn search_by_keyword(
        &self,
        keywords: &[String],
        filter: &SearchFilter,
    ) -> AdapterOutcome {
        if !self.supports(Capability::SearchByKeyword) {
            return self.unsupported(Capability::SearchByKeyword);
        }
        let result = self.collection.search(keywords, filter).await;
        self.settle(Capability::SearchByKeyword, result)
    }

    pub async fn nearest_by_vector(&self, vector: &[f32], filter: &SearchFilter) -> AdapterOutcome {
        if !self.supports(Capability::NearestByVector) {
            return self.unsupported(Capability::NearestByVector);
        }
        let result = self.collection.nearest(vector, filter).await;
        self.settle(Capability::NearestByVector, result)
    }

    pub async fn furthest_by_vector(
        &self,
        vector: &[f32],
        filter: &SearchFilter,
    ) -> AdapterOutcome {
        if !self.supports(Capability::FurthestByVector) {
            return self.unsupported(Capability::FurthestByVector);
        }
        let result = self.collection.furthest(vector, filter).await;
        self.settle(Capability::FurthestByVector, result)
    }

    pub async fn resolve(&self, key: &str) -> Resolution {
        if !self.supports(Capability::ResolveByKey) {
            return Resolution::Unsupported;
        }
        match self.collection.get(key).await {
            Ok(Some(entity)) => Resolution::Found(entity),
            Ok(None) => Resolution::Missing,
            Err(error) => {
                warn!(collection = self.name(), key, %error, "entity lookup failed");
                Resolution::Failed(error)
            }
        }
    }

    fn unsupported(&self, capability: Capability) -> AdapterOutcome {
        debug!(collection = self.name(), %capability, "capability not available");
        AdapterOutcome::Unsupported(capability)
    }

    fn settle(
        &self,
        capability: Capability,
        result: Result<Vec<RawResult>, SearchError>,
    ) -> AdapterOutcome {
        match result {
            Ok(hits) => {
                debug!(
                    collection = self.name(),
                    %capability,
                    hits = hits.len(),
                    "collection call finished"
                );
                AdapterOutcome::Hits(hits)
            }
            Err(error) => {
                warn!(
                    collection = self.name(),
                    %capability,
                    %error,
                    "collection call failed, treating as empty"
                );
                AdapterOutcome::Failed(error)
            }
        }
    }
}

/// Embedding stored on a resolved entity, if any.
pub fn entity_vector(entity: &RawResult) -> Option<Vec<f32>> {
    ENTITY_VECTOR_POINTERS.iter().find_map(|pointer| {
        let values = entity.pointer(pointer)?.as_array()?;
        let vector = values
            .iter()
            .map(|value| value.as_f64().map(|number| number as f32))
            .collect::<Option<Vec<f32>>>()?;
        (!vector.is_empty()).then_some(vector)
    })
}

pub fn entity_key(entity: &RawResult) -> Option<&str> {
    entity
        .get("key")
        .or_else(|| entity.get("id"))
        .and_then(Value::as_str)
}
