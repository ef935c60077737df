use crate::traits::Capability;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const DEFAULT_LIMIT: usize = 10;
pub const MAX_LIMIT: usize = 50;

/// Untyped record as handed back by a backing collection.
pub type RawResult = Value;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum CollectionKind {
    Sources,
    Blocks,
}

impl CollectionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sources => "sources",
            Self::Blocks => "blocks",
        }
    }

    pub fn result_type(self) -> ResultType {
        match self {
            Self::Sources => ResultType::Source,
            Self::Blocks => ResultType::Block,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum CollectionScope {
    Sources,
    Blocks,
    #[default]
    Both,
}

impl CollectionScope {
    /// Collections queried for fan-out modes (vector, lexical).
    pub fn kinds(self) -> &'static [CollectionKind] {
        match self {
            Self::Sources => &[CollectionKind::Sources],
            Self::Blocks => &[CollectionKind::Blocks],
            Self::Both => &[CollectionKind::Sources, CollectionKind::Blocks],
        }
    }

    /// Collection targeted by single-collection operations (direct vector).
    pub fn single_target(self) -> CollectionKind {
        match self {
            Self::Blocks => CollectionKind::Blocks,
            Self::Sources | Self::Both => CollectionKind::Sources,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(default)]
pub struct SearchFilter {
    pub limit: usize,
    pub collection_scope: CollectionScope,
    pub key_starts_with: Option<String>,
    pub exclude_key_starts_with: Option<String>,
}

impl Default for SearchFilter {
    fn default() -> Self {
        Self {
            limit: DEFAULT_LIMIT,
            collection_scope: CollectionScope::Both,
            key_starts_with: None,
            exclude_key_starts_with: None,
        }
    }
}

impl SearchFilter {
    pub fn admits(&self, key: &str) -> bool {
        if let Some(prefix) = self.key_starts_with.as_deref() {
            if !key.starts_with(prefix) {
                return false;
            }
        }
        if let Some(prefix) = self.exclude_key_starts_with.as_deref() {
            if !prefix.is_empty() && key.starts_with(prefix) {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SearchMode {
    Vector,
    Lexical,
    DirectVector,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum VectorOperation {
    #[default]
    Nearest,
    Furthest,
    NearestTo,
}

/// Caller-side hint; the effective mode is still derived from the payload.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ModeHint {
    #[serde(alias = "keyword", alias = "keywords")]
    Lexical,
    #[serde(alias = "semantic")]
    Vector,
    #[serde(alias = "direct")]
    DirectVector,
}

/// Raw caller payload, before mode selection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct SearchPayload {
    pub mode: Option<ModeHint>,
    pub hypotheticals: Vec<String>,
    pub keywords: Vec<String>,
    pub direct_vector: Option<Vec<f32>>,
    pub vector_operation: Option<VectorOperation>,
    pub entity_key: Option<String>,
    pub filter: SearchFilter,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Query {
    Vector {
        hypotheticals: Vec<String>,
    },
    Lexical {
        keywords: Vec<String>,
    },
    DirectVector {
        vector: Vec<f32>,
        operation: VectorOperation,
        entity_key: Option<String>,
    },
}

impl Query {
    pub fn mode(&self) -> SearchMode {
        match self {
            Self::Vector { .. } => SearchMode::Vector,
            Self::Lexical { .. } => SearchMode::Lexical,
            Self::DirectVector { .. } => SearchMode::DirectVector,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchRequest {
    pub query: Query,
    pub filter: SearchFilter,
}

impl SearchRequest {
    pub fn mode(&self) -> SearchMode {
        self.query.mode()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ResultType {
    Source,
    Block,
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CanonicalResult {
    pub key: String,
    pub score: f64,
    pub content: String,
    pub content_missing: bool,
    pub path: String,
    #[serde(rename = "type")]
    pub result_type: ResultType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub breadcrumbs: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchParamsEcho {
    pub selected_mode: Option<SearchMode>,
    pub effective_mode: Option<SearchMode>,
    pub hypotheticals: Vec<String>,
    pub keywords: Vec<String>,
    pub vector_dimensions: Option<usize>,
    pub vector_operation: Option<VectorOperation>,
    pub entity_key: Option<String>,
    pub filter: SearchFilter,
    pub fallbacks: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CollectionSummary {
    pub available: bool,
    pub count: usize,
    pub capabilities: Vec<Capability>,
}

impl CollectionSummary {
    pub fn unavailable() -> Self {
        Self {
            available: false,
            count: 0,
            capabilities: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EnvironmentSummary {
    pub ready: bool,
    pub sources: CollectionSummary,
    pub blocks: CollectionSummary,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchResponse {
    pub results: Vec<CanonicalResult>,
    pub count: usize,
    /// Results surviving the cutoff filter, before `limit` was applied.
    pub total_before_limit: usize,
    /// Results returned by the collections, before the cutoff filter.
    pub total_candidates: usize,
    pub search_params: SearchParamsEcho,
    pub environment: EnvironmentSummary,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_defaults_when_fields_are_omitted() {
        let filter: SearchFilter =
            serde_json::from_str(r#"{"key_starts_with": "Notes/"}"#).unwrap();
        assert_eq!(filter.limit, DEFAULT_LIMIT);
        assert_eq!(filter.collection_scope, CollectionScope::Both);
        assert!(filter.admits("Notes/a.md"));
        assert!(!filter.admits("Archive/a.md"));
    }

    #[test]
    fn exclude_prefix_rejects_matching_keys() {
        let filter = SearchFilter {
            exclude_key_starts_with: Some("Templates/".to_string()),
            ..SearchFilter::default()
        };
        assert!(!filter.admits("Templates/daily.md"));
        assert!(filter.admits("Daily/2024-01-01.md"));
    }

    #[test]
    fn direct_vector_targets_sources_when_scope_is_both() {
        assert_eq!(CollectionScope::Both.single_target(), CollectionKind::Sources);
        assert_eq!(CollectionScope::Blocks.single_target(), CollectionKind::Blocks);
        assert_eq!(CollectionScope::Both.kinds().len(), 2);
    }

    #[test]
    fn payload_accepts_mode_aliases() {
        let payload: SearchPayload =
            serde_json::from_str(r#"{"mode": "keyword", "keywords": ["pump"]}"#).unwrap();
        assert_eq!(payload.mode, Some(ModeHint::Lexical));
        assert_eq!(payload.filter, SearchFilter::default());

        let payload: SearchPayload =
            serde_json::from_str(r#"{"direct_vector": [0.1, 0.2], "vector_operation": "furthest"}"#)
                .unwrap();
        assert_eq!(payload.vector_operation, Some(VectorOperation::Furthest));
    }

    #[test]
    fn canonical_result_serializes_type_tag() {
        let result = CanonicalResult {
            key: "a.md".to_string(),
            score: 0.5,
            content: "x".to_string(),
            content_missing: false,
            path: "a.md".to_string(),
            result_type: ResultType::Block,
            breadcrumbs: None,
            size: None,
            last_modified: None,
        };
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["type"], "block");
        assert!(value.get("breadcrumbs").is_none());
    }
}
