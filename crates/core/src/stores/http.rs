use crate::traits::{CapabilitySet, Collection, HostEnvironment};
use crate::{CollectionKind, RawResult, SearchError, SearchFilter};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;
use url::Url;

const BACKEND: &str = "host";

/// `GET /status` body reported by the host bridge.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct HostStatus {
    pub ready: bool,
    pub collections: HashMap<String, CollectionDescriptor>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CollectionDescriptor {
    pub count: usize,
    pub capabilities: CapabilitySet,
}

/// One collection exposed by the host bridge over HTTP.
pub struct HttpCollection {
    client: Client,
    base: Url,
    name: String,
    descriptor: CollectionDescriptor,
}

impl HttpCollection {
    pub fn new(
        client: Client,
        base: Url,
        kind: CollectionKind,
        descriptor: CollectionDescriptor,
    ) -> Self {
        Self {
            client,
            base,
            name: kind.as_str().to_string(),
            descriptor,
        }
    }

    async fn post(&self, operation: &str, body: Value) -> Result<Vec<RawResult>, SearchError> {
        let url = endpoint(&self.base, &["collections", &self.name, operation])?;
        let response = self.client.post(url).json(&body).send().await?;

        if !response.status().is_success() {
            return Err(SearchError::BackendResponse {
                backend: BACKEND.to_string(),
                details: format!("{} {}: {}", self.name, operation, response.status()),
            });
        }

        let parsed: Value = response.json().await?;
        parse_results(parsed)
    }
}

#[async_trait]
impl Collection for HttpCollection {
    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> CapabilitySet {
        self.descriptor.capabilities
    }

    fn len(&self) -> usize {
        self.descriptor.count
    }

    async fn lookup(
        &self,
        hypotheticals: &[String],
        filter: &SearchFilter,
    ) -> Result<Vec<RawResult>, SearchError> {
        self.post("lookup", json!({ "hypotheticals": hypotheticals, "filter": filter }))
            .await
    }

    async fn search(
        &self,
        keywords: &[String],
        filter: &SearchFilter,
    ) -> Result<Vec<RawResult>, SearchError> {
        self.post("search", json!({ "keywords": keywords, "filter": filter }))
            .await
    }

    async fn nearest(
        &self,
        vector: &[f32],
        filter: &SearchFilter,
    ) -> Result<Vec<RawResult>, SearchError> {
        self.post("nearest", json!({ "vector": vector, "filter": filter }))
            .await
    }

    async fn furthest(
        &self,
        vector: &[f32],
        filter: &SearchFilter,
    ) -> Result<Vec<RawResult>, SearchError> {
        self.post("furthest", json!({ "vector": vector, "filter": filter }))
            .await
    }

    async fn get(&self, key: &str) -> Result<Option<RawResult>, SearchError> {
        let url = endpoint(&self.base, &["collections", &self.name, "entities", key])?;
        let response = self.client.get(url).send().await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(SearchError::BackendResponse {
                backend: BACKEND.to_string(),
                details: format!("{} get: {}", self.name, response.status()),
            });
        }

        let entity: Value = response.json().await?;
        Ok((!entity.is_null()).then_some(entity))
    }
}

#[derive(Default)]
struct Connected {
    ready: bool,
    sources: Option<Arc<HttpCollection>>,
    blocks: Option<Arc<HttpCollection>>,
}

/// Host environment reached through an HTTP bridge; `refresh` re-reads
/// `/status` and rebuilds the collection handles.
pub struct HttpEnvironment {
    client: Client,
    base: Url,
    state: RwLock<Connected>,
}

impl HttpEnvironment {
    pub fn new(base_url: &str) -> Result<Self, SearchError> {
        Ok(Self {
            client: Client::new(),
            base: Url::parse(base_url)?,
            state: RwLock::new(Connected::default()),
        })
    }

    pub async fn status(&self) -> Result<HostStatus, SearchError> {
        let url = endpoint(&self.base, &["status"])?;
        let response = self.client.get(url).send().await?;

        if !response.status().is_success() {
            return Err(SearchError::BackendResponse {
                backend: BACKEND.to_string(),
                details: format!("status: {}", response.status()),
            });
        }

        Ok(response.json().await?)
    }

    fn connect(&self, status: HostStatus) -> Connected {
        let mut collections = status.collections;
        let mut handle = |kind: CollectionKind| {
            collections.remove(kind.as_str()).map(|descriptor| {
                Arc::new(HttpCollection::new(
                    self.client.clone(),
                    self.base.clone(),
                    kind,
                    descriptor,
                ))
            })
        };
        Connected {
            ready: status.ready,
            sources: handle(CollectionKind::Sources),
            blocks: handle(CollectionKind::Blocks),
        }
    }
}

#[async_trait]
impl HostEnvironment for HttpEnvironment {
    async fn is_ready(&self) -> bool {
        self.state.read().await.ready
    }

    async fn collection(&self, kind: CollectionKind) -> Option<Arc<dyn Collection>> {
        let state = self.state.read().await;
        let collection = match kind {
            CollectionKind::Sources => state.sources.clone(),
            CollectionKind::Blocks => state.blocks.clone(),
        };
        collection.map(|collection| collection as Arc<dyn Collection>)
    }

    async fn refresh(&self) -> Result<(), SearchError> {
        let status = self.status().await?;
        let connected = self.connect(status);
        info!(
            url = %self.base,
            ready = connected.ready,
            sources = connected.sources.is_some(),
            blocks = connected.blocks.is_some(),
            "host status refreshed"
        );
        *self.state.write().await = connected;
        Ok(())
    }
}

fn endpoint(base: &Url, segments: &[&str]) -> Result<Url, SearchError> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| SearchError::Request(format!("{base} cannot be used as a base url")))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

/// Accepts either a bare array or `{"results": [...]}`.
fn parse_results(body: Value) -> Result<Vec<RawResult>, SearchError> {
    match body {
        Value::Array(items) => Ok(items),
        Value::Object(mut object) => match object.remove("results") {
            Some(Value::Array(items)) => Ok(items),
            Some(Value::Null) | None => Ok(Vec::new()),
            Some(other) => Err(SearchError::BackendResponse {
                backend: BACKEND.to_string(),
                details: format!("results is not an array: {other}"),
            }),
        },
        other => Err(SearchError::BackendResponse {
            backend: BACKEND.to_string(),
            details: format!("unexpected body: {other}"),
        }),
    }
}
