//! Tunables for the dispatcher and the result normalizer.
//!
//! Field aliases are JSON pointers evaluated in order against each raw result,
//! so they can be adjusted to whatever shapes a backing collection returns
//! without touching the normalizer.

use crate::{SearchError, MAX_LIMIT};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const DEFAULT_CACHE_TTL_SECONDS: u64 = 300;
pub const DEFAULT_CUTOFF_FALLBACK_LEN: usize = 10;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SearchConfig {
    pub max_limit: usize,
    pub cache_ttl_seconds: u64,
    pub cutoff_fallback_len: usize,
    pub aliases: AliasConfig,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            max_limit: MAX_LIMIT,
            cache_ttl_seconds: DEFAULT_CACHE_TTL_SECONDS,
            cutoff_fallback_len: DEFAULT_CUTOFF_FALLBACK_LEN,
            aliases: AliasConfig::default(),
        }
    }
}

impl SearchConfig {
    pub fn from_json_str(raw: &str) -> Result<Self, SearchError> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: &Path) -> Result<Self, SearchError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    pub fn validate(&self) -> Result<(), SearchError> {
        if self.max_limit == 0 || self.max_limit > MAX_LIMIT {
            return Err(SearchError::Validation(format!(
                "max_limit must be within 1..={MAX_LIMIT}"
            )));
        }
        if self.aliases.content.is_empty() {
            return Err(SearchError::Validation(
                "at least one content alias is required".to_string(),
            ));
        }
        for pointer in self.aliases.all() {
            if !pointer.starts_with('/') {
                return Err(SearchError::Validation(format!(
                    "alias `{pointer}` is not a JSON pointer"
                )));
            }
        }
        Ok(())
    }
}

/// Ordered JSON pointers tried per canonical field; first usable value wins.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AliasConfig {
    pub key: Vec<String>,
    pub score: Vec<String>,
    pub content: Vec<String>,
    pub path: Vec<String>,
    pub breadcrumbs: Vec<String>,
    pub size: Vec<String>,
    pub last_modified: Vec<String>,
}

impl Default for AliasConfig {
    fn default() -> Self {
        Self {
            key: pointers(&["/key", "/id", "/item/key"]),
            score: pointers(&["/score", "/sim"]),
            content: pointers(&[
                "/content",
                "/data/content",
                "/text",
                "/item/content",
                "/item/data/content",
                "/raw_content",
                "/source_content",
                "/block_content",
                "/_content",
            ]),
            path: pointers(&["/path", "/data/path", "/item/path", "/key"]),
            breadcrumbs: pointers(&["/breadcrumbs", "/data/breadcrumbs"]),
            size: pointers(&["/size", "/data/size"]),
            last_modified: pointers(&["/last_modified", "/mtime", "/data/mtime"]),
        }
    }
}

impl AliasConfig {
    fn all(&self) -> impl Iterator<Item = &String> {
        self.key
            .iter()
            .chain(&self.score)
            .chain(&self.content)
            .chain(&self.path)
            .chain(&self.breadcrumbs)
            .chain(&self.size)
            .chain(&self.last_modified)
    }
}

fn pointers(items: &[&str]) -> Vec<String> {
    items.iter().map(|item| item.to_string()).collect()
}
