use crate::config::AliasConfig;
use crate::{CanonicalResult, CollectionKind, RawResult};
use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;

/// Maps adapter-specific records onto [`CanonicalResult`].
#[derive(Debug, Clone, Default)]
pub struct Normalizer {
    aliases: AliasConfig,
}

impl Normalizer {
    pub fn new(aliases: AliasConfig) -> Self {
        Self { aliases }
    }

    pub fn aliases(&self) -> &AliasConfig {
        &self.aliases
    }

    pub fn normalize(&self, raw: &RawResult, kind: CollectionKind) -> CanonicalResult {
        let key = first_non_empty_str(raw, &self.aliases.key).unwrap_or_default();
        let score = first_number(raw, &self.aliases.score).unwrap_or(0.0);
        let content = self.content(raw);
        let path = first_non_empty_str(raw, &self.aliases.path).unwrap_or_else(|| key.clone());

        CanonicalResult {
            key,
            score,
            content_missing: content.is_none(),
            content: content.unwrap_or_default(),
            path,
            result_type: kind.result_type(),
            breadcrumbs: first_non_empty_str(raw, &self.aliases.breadcrumbs),
            size: first_u64(raw, &self.aliases.size),
            last_modified: first_timestamp(raw, &self.aliases.last_modified),
        }
    }

    /// First non-empty content alias, verbatim. Whitespace counts as content.
    pub fn content(&self, raw: &RawResult) -> Option<String> {
        first_non_empty_str(raw, &self.aliases.content)
    }
}

fn first_non_empty_str(raw: &Value, pointers: &[String]) -> Option<String> {
    pointers.iter().find_map(|pointer| match raw.pointer(pointer)? {
        Value::String(text) if !text.is_empty() => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    })
}

fn first_number(raw: &Value, pointers: &[String]) -> Option<f64> {
    pointers.iter().find_map(|pointer| {
        let value = raw.pointer(pointer)?;
        value
            .as_f64()
            .or_else(|| value.as_str().and_then(|text| text.trim().parse().ok()))
            .filter(|score: &f64| score.is_finite())
    })
}

fn first_u64(raw: &Value, pointers: &[String]) -> Option<u64> {
    pointers
        .iter()
        .find_map(|pointer| raw.pointer(pointer)?.as_u64())
}

/// Accepts RFC 3339 strings or epoch milliseconds.
fn first_timestamp(raw: &Value, pointers: &[String]) -> Option<DateTime<Utc>> {
    pointers.iter().find_map(|pointer| match raw.pointer(pointer)? {
        Value::String(text) => DateTime::parse_from_rfc3339(text)
            .ok()
            .map(|parsed| parsed.with_timezone(&Utc)),
        Value::Number(number) => number
            .as_i64()
            .and_then(|millis| Utc.timestamp_millis_opt(millis).single()),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ResultType;
    use serde_json::json;

    #[test]
    fn nested_content_wins_over_empty_top_level_field() {
        let raw = json!({
            "key": "Notes/pump.md#Maintenance",
            "score": 0.72,
            "content": "",
            "data": { "content": "Replace the seal every 500 hours." }
        });
        let result = Normalizer::default().normalize(&raw, CollectionKind::Blocks);
        assert_eq!(result.content, "Replace the seal every 500 hours.");
        assert!(!result.content_missing);
        assert_eq!(result.result_type, ResultType::Block);
        assert_eq!(result.path, "Notes/pump.md#Maintenance");
    }

    #[test]
    fn missing_content_is_flagged() {
        let raw = json!({ "id": "Notes/empty.md", "sim": 0.4, "content": "" });
        let result = Normalizer::default().normalize(&raw, CollectionKind::Sources);
        assert_eq!(result.content, "");
        assert!(result.content_missing);
        assert_eq!(result.key, "Notes/empty.md");
        assert_eq!(result.score, 0.4);
        assert_eq!(result.result_type, ResultType::Source);
    }

    #[test]
    fn whitespace_content_is_kept_verbatim() {
        let raw = json!({ "key": "Notes/spacer.md", "content": "   ", "text": "fallback" });
        let result = Normalizer::default().normalize(&raw, CollectionKind::Blocks);
        assert_eq!(result.content, "   ");
        assert!(!result.content_missing);
    }

    #[test]
    fn every_default_content_alias_is_recognized() {
        let normalizer = Normalizer::default();
        for pointer in &normalizer.aliases().content {
            let mut raw = json!({ "key": "k" });
            let segments: Vec<&str> = pointer.trim_start_matches('/').split('/').collect();
            let mut slot = &mut raw;
            for segment in &segments[..segments.len() - 1] {
                slot = slot
                    .as_object_mut()
                    .unwrap()
                    .entry(segment.to_string())
                    .or_insert_with(|| json!({}));
            }
            slot[segments[segments.len() - 1]] = json!("body");
            let result = normalizer.normalize(&raw, CollectionKind::Sources);
            assert_eq!(result.content, "body", "alias {pointer} was ignored");
            assert!(!result.content_missing);
        }
    }

    #[test]
    fn score_defaults_to_zero_and_path_prefers_explicit_path() {
        let raw = json!({ "key": "a.md#h", "path": "a.md", "text": "hello" });
        let result = Normalizer::default().normalize(&raw, CollectionKind::Blocks);
        assert_eq!(result.score, 0.0);
        assert_eq!(result.path, "a.md");
        assert_eq!(result.content, "hello");
    }

    #[test]
    fn passes_through_optional_metadata() {
        let raw = json!({
            "key": "a.md",
            "breadcrumbs": "a > Setup",
            "size": 2048,
            "mtime": 1_700_000_000_000_i64,
            "content": "x"
        });
        let result = Normalizer::default().normalize(&raw, CollectionKind::Sources);
        assert_eq!(result.breadcrumbs.as_deref(), Some("a > Setup"));
        assert_eq!(result.size, Some(2048));
        assert_eq!(
            result.last_modified.map(|at| at.timestamp_millis()),
            Some(1_700_000_000_000)
        );
    }

    #[test]
    fn configured_alias_list_is_honoured() {
        let aliases = AliasConfig {
            content: vec!["/payload/body".to_string()],
            ..AliasConfig::default()
        };
        let raw = json!({ "key": "k", "content": "ignored", "payload": { "body": "used" } });
        let result = Normalizer::new(aliases).normalize(&raw, CollectionKind::Sources);
        assert_eq!(result.content, "used");
    }
}
