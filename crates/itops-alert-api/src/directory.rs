// Async HTTP client for the ontology (object directory) service.
//
// Manager API: object type catalogue of a knowledge network.
// Query API:   paged object instances and 1-hop subgraphs.
// Auth:        `Authorization` header resolved per request.

use std::collections::HashMap;

use futures::Stream;
use reqwest::Method;
use reqwest::header::AUTHORIZATION;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;
use url::Url;

use crate::auth::AuthProvider;
use crate::transport::TransportConfig;
use crate::Error;

/// Page size used when walking every instance of an object type.
pub const DEFAULT_PAGE_SIZE: u32 = 1000;

// ── Wire types ───────────────────────────────────────────────────────

/// An object type registered in the knowledge network.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ObjectType {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub comment: String,
}

#[derive(Debug, Deserialize)]
struct ObjectTypesResponse {
    #[serde(default)]
    entries: Vec<ObjectType>,
}

#[derive(Debug, Serialize)]
struct ObjectDataRequest<'a> {
    need_total: bool,
    limit: u32,
    #[serde(skip_serializing_if = "cursor_is_empty")]
    search_after: &'a [Value],
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn cursor_is_empty(cursor: &&[Value]) -> bool {
    cursor.is_empty()
}

/// One page of object instances. Instances are free-form property maps.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ObjectDataPage {
    #[serde(default)]
    pub datas: Vec<Map<String, Value>>,
    #[serde(default)]
    pub total_count: u64,
    #[serde(default)]
    pub search_after: Vec<Value>,
}

/// Simple `field op value` condition for subgraph queries.
#[derive(Debug, Clone, Serialize)]
pub struct Condition {
    pub field: String,
    pub operation: String,
    pub value: Value,
}

/// Subgraph query anchored on one object.
#[derive(Debug, Clone, Serialize)]
pub struct SubgraphRequest {
    pub source_object_type_id: String,
    pub condition: Condition,
    pub direction: String,
    pub path_length: u32,
}

impl SubgraphRequest {
    /// Bidirectional 1-hop neighbourhood of the object whose `s_id` matches.
    pub fn one_hop(object_type_id: &str, s_id: &str) -> Self {
        Self {
            source_object_type_id: object_type_id.to_owned(),
            condition: Condition {
                field: "s_id".into(),
                operation: "==".into(),
                value: Value::String(s_id.to_owned()),
            },
            direction: "bidirectional".into(),
            path_length: 1,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SubgraphProperties {
    #[serde(default)]
    pub s_id: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SubgraphObject {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub object_type_id: String,
    #[serde(default)]
    pub object_type_name: String,
    #[serde(default)]
    pub display: String,
    #[serde(default)]
    pub properties: SubgraphProperties,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SubgraphRelation {
    #[serde(default)]
    pub relation_type_id: String,
    #[serde(default)]
    pub relation_type_name: String,
    #[serde(default)]
    pub source_object_id: String,
    #[serde(default)]
    pub target_object_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RelationPath {
    #[serde(default)]
    pub relations: Vec<SubgraphRelation>,
    #[serde(default)]
    pub length: u32,
}

/// Objects keyed by their directory id (e.g. `"pod-pod_001"`), plus paths.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubgraphResponse {
    #[serde(default)]
    pub objects: HashMap<String, SubgraphObject>,
    #[serde(default)]
    pub relation_paths: Vec<RelationPath>,
}

#[derive(Deserialize)]
struct ErrorResponse {
    #[serde(default, alias = "description", alias = "error")]
    message: Option<String>,
}

// ── Client ───────────────────────────────────────────────────────────

/// Async client for one knowledge network in the object directory.
#[derive(Debug, Clone)]
pub struct DirectoryClient {
    http: reqwest::Client,
    base_url: Url,
    knowledge_id: String,
    auth: AuthProvider,
}

impl DirectoryClient {
    pub fn new(
        base_url: &str,
        knowledge_id: impl Into<String>,
        auth: AuthProvider,
        transport: &TransportConfig,
    ) -> Result<Self, Error> {
        Ok(Self::with_client(
            transport.build_client()?,
            Url::parse(base_url)?,
            knowledge_id,
            auth,
        ))
    }

    /// Wrap an existing `reqwest::Client`.
    pub fn with_client(
        http: reqwest::Client,
        base_url: Url,
        knowledge_id: impl Into<String>,
        auth: AuthProvider,
    ) -> Self {
        Self {
            http,
            base_url,
            knowledge_id: knowledge_id.into(),
            auth,
        }
    }

    pub fn knowledge_id(&self) -> &str {
        &self.knowledge_id
    }

    // ── URL builder ──────────────────────────────────────────────────

    fn url(&self, segments: &[&str]) -> Result<Url, Error> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| Error::InvalidUrl(url::ParseError::RelativeUrlWithCannotBeABaseBase))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> Result<reqwest::RequestBuilder, Error> {
        let builder = self.http.request(method, url);
        Ok(match self.auth.header_value()? {
            Some(value) => builder.header(AUTHORIZATION, value),
            None => builder,
        })
    }

    // ── Object types ─────────────────────────────────────────────────

    /// List every object type of the knowledge network.
    pub async fn object_types(&self) -> Result<Vec<ObjectType>, Error> {
        let url = self.url(&[
            "api",
            "ontology-manager",
            "v1",
            "knowledge-networks",
            &self.knowledge_id,
            "object-types",
        ])?;
        debug!("GET {url}");

        let resp = self.request(Method::GET, url)?.send().await?;
        let parsed: ObjectTypesResponse = handle_response(resp).await?;
        Ok(parsed.entries)
    }

    // ── Object instances ─────────────────────────────────────────────

    /// Fetch one page of instances of `object_type_id`.
    ///
    /// The query API takes its parameters as a POST body with
    /// `X-HTTP-Method-Override: GET`.
    pub async fn object_page(
        &self,
        object_type_id: &str,
        limit: u32,
        search_after: &[Value],
    ) -> Result<ObjectDataPage, Error> {
        let url = self.url(&[
            "api",
            "ontology-query",
            "v1",
            "knowledge-networks",
            &self.knowledge_id,
            "object-types",
            object_type_id,
        ])?;
        debug!("POST {url} limit={limit} cursor={}", !search_after.is_empty());

        let body = ObjectDataRequest {
            need_total: true,
            limit,
            search_after,
        };
        let resp = self
            .request(Method::POST, url)?
            .header("X-HTTP-Method-Override", "GET")
            .json(&body)
            .send()
            .await?;
        handle_response(resp).await
    }

    /// Stream every instance of `object_type_id`, following the
    /// `search_after` cursor until a page comes back empty.
    pub fn objects(
        &self,
        object_type_id: &str,
        page_size: u32,
    ) -> impl Stream<Item = Result<Map<String, Value>, Error>> + '_ {
        let object_type_id = object_type_id.to_owned();
        async_stream::try_stream! {
            let mut cursor: Vec<Value> = Vec::new();
            loop {
                let page = self.object_page(&object_type_id, page_size, &cursor).await?;
                let exhausted = page.datas.is_empty() || page.search_after.is_empty();
                for item in page.datas {
                    yield item;
                }
                if exhausted {
                    break;
                }
                cursor = page.search_after;
            }
        }
    }

    // ── Subgraph ─────────────────────────────────────────────────────

    /// Run a subgraph query.
    pub async fn subgraph(&self, request: &SubgraphRequest) -> Result<SubgraphResponse, Error> {
        let url = self.url(&[
            "api",
            "ontology-query",
            "v1",
            "knowledge-networks",
            &self.knowledge_id,
            "subgraph",
        ])?;
        debug!(
            "POST {url} source_type={} path_length={}",
            request.source_object_type_id, request.path_length
        );

        let resp = self.request(Method::POST, url)?.json(request).send().await?;
        handle_response(resp).await
    }
}

// ── Response handling ────────────────────────────────────────────────

async fn handle_response<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, Error> {
    let status = resp.status();
    let body = resp.text().await?;
    if !status.is_success() {
        let message = serde_json::from_str::<ErrorResponse>(&body)
            .ok()
            .and_then(|e| e.message)
            .unwrap_or_else(|| {
                if body.is_empty() {
                    status.to_string()
                } else {
                    body.clone()
                }
            });
        return Err(Error::Directory {
            status: status.as_u16(),
            message,
        });
    }
    serde_json::from_str(&body).map_err(|e| {
        let preview: String = body.chars().take(200).collect();
        Error::Deserialization {
            message: format!("{e} (body preview: {preview:?})"),
            body,
        }
    })
}
