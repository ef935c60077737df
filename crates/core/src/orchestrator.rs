use crate::adapter::{entity_key, entity_vector, AdapterOutcome, CollectionAdapter, Resolution};
use crate::cache::{CacheStats, CacheTracker};
use crate::config::SearchConfig;
use crate::cutoff::{apply_cutoff, sort_by_score_desc};
use crate::normalize::Normalizer;
use crate::traits::{Capability, HostEnvironment};
use crate::{
    CanonicalResult, CollectionKind, CollectionSummary, EnvironmentSummary, ModeHint, Query,
    SearchError, SearchFilter, SearchMode, SearchParamsEcho, SearchPayload, SearchRequest,
    SearchResponse, VectorOperation, MAX_LIMIT,
};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Derives the request from a raw payload; `None` means there is nothing to
/// search for, which is a valid empty request.
pub fn select_request(payload: &SearchPayload) -> Option<SearchRequest> {
    let keywords = non_blank(&payload.keywords);
    let hypotheticals = non_blank(&payload.hypotheticals);

    let query = if payload.mode == Some(ModeHint::Lexical) && !keywords.is_empty() {
        Query::Lexical { keywords }
    } else if let Some(vector) = &payload.direct_vector {
        Query::DirectVector {
            vector: vector.clone(),
            operation: payload.vector_operation.unwrap_or_default(),
            entity_key: payload.entity_key.clone(),
        }
    } else if !hypotheticals.is_empty() {
        Query::Vector { hypotheticals }
    } else {
        return None;
    };

    Some(SearchRequest {
        query,
        filter: payload.filter.clone(),
    })
}

fn non_blank(items: &[String]) -> Vec<String> {
    items
        .iter()
        .map(|item| item.trim())
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

/// Fans queries out to the sources and blocks collections, then ranks,
/// truncates and normalizes the merged results.
pub struct QueryDispatcher<E>
where
    E: HostEnvironment,
{
    environment: E,
    cache: Arc<CacheTracker>,
    normalizer: Normalizer,
    config: SearchConfig,
    vault_key: String,
}

impl<E> QueryDispatcher<E>
where
    E: HostEnvironment,
{
    pub fn new(
        environment: E,
        cache: Arc<CacheTracker>,
        config: SearchConfig,
        vault_key: impl Into<String>,
    ) -> Self {
        Self {
            environment,
            cache,
            normalizer: Normalizer::new(config.aliases.clone()),
            config,
            vault_key: vault_key.into(),
        }
    }

    pub fn environment(&self) -> &E {
        &self.environment
    }

    pub fn vault_key(&self) -> &str {
        &self.vault_key
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.cache_stats(&self.vault_key)
    }

    pub async fn execute_search(
        &self,
        payload: &SearchPayload,
    ) -> Result<SearchResponse, SearchError> {
        let request = select_request(payload);
        self.validate(payload, request.as_ref())?;
        self.refresh_if_stale().await;

        let adapters = self.adapters().await?;
        let environment = adapters.summary();
        let mut params = echo(payload, request.as_ref());

        let Some(request) = request else {
            debug!("no query terms supplied, returning empty result set");
            return Ok(SearchResponse {
                results: Vec::new(),
                count: 0,
                total_before_limit: 0,
                total_candidates: 0,
                search_params: params,
                environment,
            });
        };

        debug!(
            mode = ?request.mode(),
            scope = ?request.filter.collection_scope,
            "dispatching search"
        );
        let execution = self.run_chain(&adapters, &request).await;
        params.effective_mode = execution.effective_mode;
        params.fallbacks = execution.fallbacks;

        let mut ranked = execution.results;
        let total_candidates = ranked.len();
        sort_by_score_desc(&mut ranked);
        let mut results = apply_cutoff(ranked, self.config.cutoff_fallback_len);
        let total_before_limit = results.len();
        results.truncate(request.filter.limit);

        Ok(SearchResponse {
            count: results.len(),
            results,
            total_before_limit,
            total_candidates,
            search_params: params,
            environment,
        })
    }

    pub async fn environment_summary(&self) -> EnvironmentSummary {
        match self.adapters().await {
            Ok(adapters) => adapters.summary(),
            Err(_) => EnvironmentSummary {
                ready: false,
                sources: CollectionSummary::unavailable(),
                blocks: CollectionSummary::unavailable(),
            },
        }
    }

    /// The vector is only checked when it drives the search.
    fn validate(
        &self,
        payload: &SearchPayload,
        request: Option<&SearchRequest>,
    ) -> Result<(), SearchError> {
        let limit = payload.filter.limit;
        let max_limit = self.config.max_limit.min(MAX_LIMIT);
        if limit == 0 || limit > max_limit {
            return Err(SearchError::Validation(format!(
                "limit {limit} must be within 1..={max_limit}"
            )));
        }
        if let Some(Query::DirectVector { vector, .. }) = request.map(|request| &request.query) {
            if vector.is_empty() {
                return Err(SearchError::Validation("direct_vector is empty".to_string()));
            }
            if vector.iter().any(|value| !value.is_finite()) {
                return Err(SearchError::Validation(
                    "direct_vector contains non-finite values".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Asks the environment to reload when the vault's cache entry is stale.
    ///
    /// Every caller passes through the vault's reload gate, so requests that
    /// arrive during an in-flight reload wait for it instead of searching a
    /// half-loaded environment.
    pub async fn refresh_if_stale(&self) {
        let gate = self.cache.reload_gate(&self.vault_key);
        let _reloading = gate.lock().await;

        let previous = self.cache.last_loaded(&self.vault_key);
        if !self.cache.claim_reload(&self.vault_key) {
            return;
        }
        match self.environment.refresh().await {
            Ok(()) => {
                self.cache.update_cache(&self.vault_key);
                info!(vault = %self.vault_key, "environment refreshed");
            }
            Err(error) => {
                self.cache.release_claim(&self.vault_key, previous);
                warn!(
                    vault = %self.vault_key,
                    %error,
                    "environment refresh failed, searching existing data"
                );
            }
        }
    }

    async fn adapters(&self) -> Result<Adapters, SearchError> {
        if !self.environment.is_ready().await {
            return Err(SearchError::EnvironmentNotReady(
                "host environment has not finished loading".to_string(),
            ));
        }
        let sources = self
            .environment
            .collection(CollectionKind::Sources)
            .await
            .map(|collection| CollectionAdapter::new(CollectionKind::Sources, collection));
        let blocks = self
            .environment
            .collection(CollectionKind::Blocks)
            .await
            .map(|collection| CollectionAdapter::new(CollectionKind::Blocks, collection));
        if sources.is_none() && blocks.is_none() {
            return Err(SearchError::EnvironmentNotReady(
                "no collections are available".to_string(),
            ));
        }
        Ok(Adapters { sources, blocks })
    }

    async fn run_chain(&self, adapters: &Adapters, request: &SearchRequest) -> Execution {
        let mut fallbacks = Vec::new();
        for strategy in Strategy::chain(&request.query) {
            match self.attempt(adapters, &strategy, &request.filter).await {
                Attempt::Settled(results) => {
                    return Execution {
                        results,
                        effective_mode: Some(strategy.mode()),
                        fallbacks,
                    };
                }
                Attempt::Exhausted(reason) => {
                    warn!(
                        strategy = strategy.label(),
                        %reason,
                        "search degraded, trying next strategy"
                    );
                    fallbacks.push(format!("{}: {reason}", strategy.label()));
                }
            }
        }
        warn!("every search strategy was exhausted, returning empty results");
        Execution {
            results: Vec::new(),
            effective_mode: None,
            fallbacks,
        }
    }

    async fn attempt(
        &self,
        adapters: &Adapters,
        strategy: &Strategy,
        filter: &SearchFilter,
    ) -> Attempt {
        match strategy {
            Strategy::Semantic { hypotheticals } => {
                let targets = adapters.for_scope(filter);
                let outcomes = fan_out(&targets, FanOut::Lookup(hypotheticals, filter)).await;
                Attempt::Settled(self.normalize_all(outcomes))
            }
            Strategy::Lexical { keywords } => {
                let targets = adapters.for_scope(filter);
                let outcomes = fan_out(&targets, FanOut::Keyword(keywords, filter)).await;
                let results = self.normalize_all(outcomes);
                if results.is_empty() {
                    Attempt::Exhausted("keyword search produced no results".to_string())
                } else {
                    Attempt::Settled(results)
                }
            }
            Strategy::Direct { operation, vector } => {
                let target = filter.collection_scope.single_target();
                let Some(adapter) = adapters.get(target) else {
                    return Attempt::Exhausted(unavailable(target));
                };
                let outcome = match operation {
                    VectorOperation::Furthest => adapter.furthest_by_vector(vector, filter).await,
                    VectorOperation::Nearest | VectorOperation::NearestTo => {
                        adapter.nearest_by_vector(vector, filter).await
                    }
                };
                match outcome {
                    AdapterOutcome::Hits(hits) => {
                        Attempt::Settled(self.normalize_hits(hits, adapter.kind()))
                    }
                    AdapterOutcome::Unsupported(capability) => {
                        Attempt::Exhausted(unsupported(adapter, capability))
                    }
                    AdapterOutcome::Failed(error) => Attempt::Exhausted(error.to_string()),
                }
            }
            Strategy::NearestEntity { key } => {
                let target = filter.collection_scope.single_target();
                let Some(adapter) = adapters.get(target) else {
                    return Attempt::Exhausted(unavailable(target));
                };
                let Some(key) = key else {
                    return Attempt::Exhausted("no entity key supplied".to_string());
                };
                let entity = match adapter.resolve(key).await {
                    Resolution::Found(entity) => entity,
                    Resolution::Missing => {
                        return Attempt::Exhausted(format!("entity `{key}` not found"));
                    }
                    Resolution::Unsupported => {
                        let reason = format!("{} cannot resolve entities", adapter.name());
                        return Attempt::Exhausted(reason);
                    }
                    Resolution::Failed(error) => return Attempt::Exhausted(error.to_string()),
                };
                let Some(vector) = entity_vector(&entity) else {
                    return Attempt::Exhausted(format!("entity `{key}` has no embedding"));
                };
                let resolved_key = entity_key(&entity).unwrap_or(key.as_str()).to_string();
                match adapter.nearest_by_vector(&vector, filter).await {
                    AdapterOutcome::Hits(hits) => {
                        let results = self
                            .normalize_hits(hits, adapter.kind())
                            .into_iter()
                            .filter(|result| result.key != resolved_key)
                            .collect();
                        Attempt::Settled(results)
                    }
                    AdapterOutcome::Unsupported(capability) => {
                        Attempt::Exhausted(unsupported(adapter, capability))
                    }
                    AdapterOutcome::Failed(error) => Attempt::Exhausted(error.to_string()),
                }
            }
        }
    }

    fn normalize_all(
        &self,
        outcomes: Vec<(CollectionKind, AdapterOutcome)>,
    ) -> Vec<CanonicalResult> {
        outcomes
            .into_iter()
            .flat_map(|(kind, outcome)| self.normalize_hits(outcome.into_hits(), kind))
            .collect()
    }

    fn normalize_hits(
        &self,
        hits: Vec<crate::RawResult>,
        kind: CollectionKind,
    ) -> Vec<CanonicalResult> {
        hits.iter()
            .map(|raw| self.normalizer.normalize(raw, kind))
            .collect()
    }
}

struct Adapters {
    sources: Option<CollectionAdapter>,
    blocks: Option<CollectionAdapter>,
}

impl Adapters {
    fn get(&self, kind: CollectionKind) -> Option<&CollectionAdapter> {
        match kind {
            CollectionKind::Sources => self.sources.as_ref(),
            CollectionKind::Blocks => self.blocks.as_ref(),
        }
    }

    fn for_scope(&self, filter: &SearchFilter) -> Vec<CollectionAdapter> {
        filter
            .collection_scope
            .kinds()
            .iter()
            .filter_map(|kind| {
                let adapter = self.get(*kind).cloned();
                if adapter.is_none() {
                    warn!(
                        collection = kind.as_str(),
                        "collection unavailable, contributing no results"
                    );
                }
                adapter
            })
            .collect()
    }

    fn summary(&self) -> EnvironmentSummary {
        EnvironmentSummary {
            ready: true,
            sources: summarize(self.sources.as_ref()),
            blocks: summarize(self.blocks.as_ref()),
        }
    }
}

fn summarize(adapter: Option<&CollectionAdapter>) -> CollectionSummary {
    match adapter {
        Some(adapter) => CollectionSummary {
            available: true,
            count: adapter.len(),
            capabilities: adapter.capabilities().iter().collect(),
        },
        None => CollectionSummary::unavailable(),
    }
}

#[derive(Debug, Clone)]
enum Strategy {
    Semantic { hypotheticals: Vec<String> },
    Lexical { keywords: Vec<String> },
    Direct { operation: VectorOperation, vector: Vec<f32> },
    NearestEntity { key: Option<String> },
}

impl Strategy {
    /// Ordered attempts for a query; the first one that settles wins.
    fn chain(query: &Query) -> Vec<Strategy> {
        match query {
            Query::Vector { hypotheticals } => vec![Strategy::Semantic {
                hypotheticals: hypotheticals.clone(),
            }],
            Query::Lexical { keywords } => vec![
                Strategy::Lexical {
                    keywords: keywords.clone(),
                },
                Strategy::Semantic {
                    hypotheticals: keywords.clone(),
                },
            ],
            Query::DirectVector {
                vector,
                operation,
                entity_key,
            } => {
                let mut chain = Vec::with_capacity(3);
                if *operation == VectorOperation::NearestTo {
                    chain.push(Strategy::NearestEntity {
                        key: entity_key.clone(),
                    });
                }
                let direct = match operation {
                    VectorOperation::Furthest => VectorOperation::Furthest,
                    VectorOperation::Nearest | VectorOperation::NearestTo => {
                        VectorOperation::Nearest
                    }
                };
                chain.push(Strategy::Direct {
                    operation: direct,
                    vector: vector.clone(),
                });
                chain.push(Strategy::Semantic {
                    hypotheticals: vec![describe_vector(vector)],
                });
                chain
            }
        }
    }

    fn mode(&self) -> SearchMode {
        match self {
            Self::Semantic { .. } => SearchMode::Vector,
            Self::Lexical { .. } => SearchMode::Lexical,
            Self::Direct { .. } | Self::NearestEntity { .. } => SearchMode::DirectVector,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            Self::Semantic { .. } => "vector",
            Self::Lexical { .. } => "lexical",
            Self::Direct {
                operation: VectorOperation::Furthest,
                ..
            } => "direct_vector:furthest",
            Self::Direct { .. } => "direct_vector:nearest",
            Self::NearestEntity { .. } => "direct_vector:nearest_to",
        }
    }
}

fn unavailable(kind: CollectionKind) -> String {
    format!("{} collection unavailable", kind.as_str())
}

fn unsupported(adapter: &CollectionAdapter, capability: Capability) -> String {
    format!("{} does not support {capability}", adapter.name())
}

fn describe_vector(vector: &[f32]) -> String {
    format!("semantic search for a {}-dimensional query vector", vector.len())
}

enum Attempt {
    Settled(Vec<CanonicalResult>),
    Exhausted(String),
}

struct Execution {
    results: Vec<CanonicalResult>,
    effective_mode: Option<SearchMode>,
    fallbacks: Vec<String>,
}

enum FanOut<'a> {
    Lookup(&'a [String], &'a SearchFilter),
    Keyword(&'a [String], &'a SearchFilter),
}

impl FanOut<'_> {
    async fn run(&self, adapter: &CollectionAdapter) -> AdapterOutcome {
        match self {
            Self::Lookup(hypotheticals, filter) => {
                adapter.lookup_by_hypothetical(hypotheticals, filter).await
            }
            Self::Keyword(keywords, filter) => adapter.search_by_keyword(keywords, filter).await,
        }
    }
}

/// Queries every target concurrently and waits for all of them.
async fn fan_out(
    targets: &[CollectionAdapter],
    operation: FanOut<'_>,
) -> Vec<(CollectionKind, AdapterOutcome)> {
    match targets {
        [] => Vec::new(),
        [only] => vec![(only.kind(), operation.run(only).await)],
        [first, second, rest @ ..] => {
            let (left, right) = tokio::join!(operation.run(first), operation.run(second));
            let mut outcomes = vec![(first.kind(), left), (second.kind(), right)];
            for adapter in rest {
                outcomes.push((adapter.kind(), operation.run(adapter).await));
            }
            outcomes
        }
    }
}

fn echo(payload: &SearchPayload, request: Option<&SearchRequest>) -> SearchParamsEcho {
    let (hypotheticals, keywords, vector_dimensions, vector_operation, entity_key) = match request
        .map(|request| &request.query)
    {
        Some(Query::Vector { hypotheticals }) => {
            (hypotheticals.clone(), Vec::new(), None, None, None)
        }
        Some(Query::Lexical { keywords }) => (Vec::new(), keywords.clone(), None, None, None),
        Some(Query::DirectVector {
            vector,
            operation,
            entity_key,
        }) => (
            Vec::new(),
            Vec::new(),
            Some(vector.len()),
            Some(*operation),
            entity_key.clone(),
        ),
        None => (
            payload.hypotheticals.clone(),
            payload.keywords.clone(),
            None,
            None,
            None,
        ),
    };

    SearchParamsEcho {
        selected_mode: request.map(SearchRequest::mode),
        effective_mode: None,
        hypotheticals,
        keywords,
        vector_dimensions,
        vector_operation,
        entity_key,
        filter: payload.filter.clone(),
        fallbacks: Vec::new(),
    }
}
