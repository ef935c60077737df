use crate::{CollectionKind, RawResult, SearchError, SearchFilter};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    LookupByHypothetical,
    SearchByKeyword,
    NearestByVector,
    FurthestByVector,
    ResolveByKey,
}

impl Capability {
    pub const ALL: [Capability; 5] = [
        Capability::LookupByHypothetical,
        Capability::SearchByKeyword,
        Capability::NearestByVector,
        Capability::FurthestByVector,
        Capability::ResolveByKey,
    ];

    const fn bit(self) -> u8 {
        1 << (self as u8)
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::LookupByHypothetical => "lookup",
            Self::SearchByKeyword => "keyword search",
            Self::NearestByVector => "nearest",
            Self::FurthestByVector => "furthest",
            Self::ResolveByKey => "get",
        };
        f.write_str(name)
    }
}

/// Explicit set of query primitives a collection supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct CapabilitySet {
    bits: u8,
}

impl CapabilitySet {
    pub const fn empty() -> Self {
        Self { bits: 0 }
    }

    pub fn all() -> Self {
        Self::from_iter(Capability::ALL)
    }

    pub const fn with(self, capability: Capability) -> Self {
        Self {
            bits: self.bits | capability.bit(),
        }
    }

    pub const fn without(self, capability: Capability) -> Self {
        Self {
            bits: self.bits & !capability.bit(),
        }
    }

    pub const fn contains(self, capability: Capability) -> bool {
        self.bits & capability.bit() != 0
    }

    pub fn iter(self) -> impl Iterator<Item = Capability> {
        Capability::ALL
            .into_iter()
            .filter(move |capability| self.contains(*capability))
    }
}

impl FromIterator<Capability> for CapabilitySet {
    fn from_iter<I: IntoIterator<Item = Capability>>(iter: I) -> Self {
        iter.into_iter()
            .fold(Self::empty(), |set, capability| set.with(capability))
    }
}

impl Serialize for CapabilitySet {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.iter())
    }
}

impl<'de> Deserialize<'de> for CapabilitySet {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let items = Vec::<Capability>::deserialize(deserializer)?;
        Ok(items.into_iter().collect())
    }
}

/// One backing collection of the host environment.
///
/// Every query method defaults to [`SearchError::Unsupported`]; implementors
/// override the ones listed in [`Collection::capabilities`]. Callers are
/// expected to probe the capability set instead of relying on that error.
#[async_trait]
pub trait Collection: Send + Sync {
    fn name(&self) -> &str;

    fn capabilities(&self) -> CapabilitySet;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    async fn lookup(
        &self,
        _hypotheticals: &[String],
        _filter: &SearchFilter,
    ) -> Result<Vec<RawResult>, SearchError> {
        Err(unsupported(self.name(), Capability::LookupByHypothetical))
    }

    async fn search(
        &self,
        _keywords: &[String],
        _filter: &SearchFilter,
    ) -> Result<Vec<RawResult>, SearchError> {
        Err(unsupported(self.name(), Capability::SearchByKeyword))
    }

    async fn nearest(
        &self,
        _vector: &[f32],
        _filter: &SearchFilter,
    ) -> Result<Vec<RawResult>, SearchError> {
        Err(unsupported(self.name(), Capability::NearestByVector))
    }

    async fn furthest(
        &self,
        _vector: &[f32],
        _filter: &SearchFilter,
    ) -> Result<Vec<RawResult>, SearchError> {
        Err(unsupported(self.name(), Capability::FurthestByVector))
    }

    async fn get(&self, _key: &str) -> Result<Option<RawResult>, SearchError> {
        Err(unsupported(self.name(), Capability::ResolveByKey))
    }
}

/// Host that owns the collections and knows how to refresh them.
#[async_trait]
pub trait HostEnvironment: Send + Sync {
    async fn is_ready(&self) -> bool;

    async fn collection(&self, kind: CollectionKind) -> Option<Arc<dyn Collection>>;

    /// Re-read backing data. Called only when the cache tracker reports the
    /// vault as stale.
    async fn refresh(&self) -> Result<(), SearchError>;
}

fn unsupported(collection: &str, capability: Capability) -> SearchError {
    SearchError::Unsupported {
        collection: collection.to_string(),
        capability: capability.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capability_set_tracks_membership() {
        let set = CapabilitySet::empty()
            .with(Capability::LookupByHypothetical)
            .with(Capability::NearestByVector);
        assert!(set.contains(Capability::LookupByHypothetical));
        assert!(!set.contains(Capability::SearchByKeyword));
        assert_eq!(set.without(Capability::NearestByVector).iter().count(), 1);
        assert_eq!(CapabilitySet::all().iter().count(), Capability::ALL.len());
    }

    #[test]
    fn capability_set_round_trips_through_json_list() {
        let set: CapabilitySet =
            serde_json::from_str(r#"["lookup_by_hypothetical", "search_by_keyword"]"#).unwrap();
        assert!(set.contains(Capability::SearchByKeyword));
        assert_eq!(
            serde_json::to_string(&set).unwrap(),
            r#"["lookup_by_hypothetical","search_by_keyword"]"#
        );
    }
}
