// Async HTTP client for the OpenSearch REST API.
//
// Only the handful of endpoints the repositories need:
// `_doc` (index), `_update`, `_bulk` (partial updates), `_mget`, `_search`.
// Every write uses `refresh=wait_for` so a subsequent read observes it.

use std::fmt::Write as _;

use reqwest::Method;
use reqwest::header::CONTENT_TYPE;
use secrecy::ExposeSecret;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::auth::BasicAuth;
use crate::transport::TransportConfig;
use crate::Error;

// ── Response shapes ──────────────────────────────────────────────────

#[derive(Deserialize)]
struct MgetResponse<T> {
    #[serde(default = "Vec::new")]
    docs: Vec<MgetDoc<T>>,
}

#[derive(Deserialize)]
struct MgetDoc<T> {
    #[serde(default)]
    found: bool,
    #[serde(rename = "_source")]
    source: Option<T>,
}

#[derive(Deserialize)]
struct SearchResponse<T> {
    hits: SearchHits<T>,
}

#[derive(Deserialize)]
struct SearchHits<T> {
    #[serde(default = "Vec::new")]
    hits: Vec<SearchHit<T>>,
}

#[derive(Deserialize)]
struct SearchHit<T> {
    #[serde(rename = "_source")]
    source: T,
}

#[derive(Deserialize)]
struct BulkResponse {
    #[serde(default)]
    errors: bool,
    #[serde(default)]
    items: Vec<Value>,
}

// ── Client ───────────────────────────────────────────────────────────

/// Async client for a single OpenSearch endpoint.
#[derive(Debug, Clone)]
pub struct SearchClient {
    http: reqwest::Client,
    base_url: Url,
    auth: Option<BasicAuth>,
}

impl SearchClient {
    /// Build a client; `auth` is sent as basic auth on every request.
    pub fn new(
        base_url: &str,
        auth: Option<BasicAuth>,
        transport: &TransportConfig,
    ) -> Result<Self, Error> {
        Ok(Self {
            http: transport.build_client()?,
            base_url: Url::parse(base_url)?,
            auth,
        })
    }

    /// Wrap an existing `reqwest::Client`.
    pub fn with_client(http: reqwest::Client, base_url: Url, auth: Option<BasicAuth>) -> Self {
        Self {
            http,
            base_url,
            auth,
        }
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

    fn request(&self, method: Method, url: Url) -> reqwest::RequestBuilder {
        let builder = self.http.request(method, url);
        match &self.auth {
            Some(auth) => builder.basic_auth(&auth.username, Some(auth.password.expose_secret())),
            None => builder,
        }
    }

    // ── Document operations ──────────────────────────────────────────

    /// Create or replace a document by id.
    pub async fn index_document<T: Serialize + Sync>(
        &self,
        index: &str,
        id: &str,
        doc: &T,
    ) -> Result<(), Error> {
        let url = self.url(&[index, "_doc", id])?;
        debug!("PUT {url}");

        let resp = self
            .request(Method::PUT, url)
            .query(&[("refresh", "wait_for")])
            .json(doc)
            .send()
            .await?;
        self.handle_empty(resp).await
    }

    /// Apply a partial document to an existing id.
    pub async fn update_document(
        &self,
        index: &str,
        id: &str,
        partial: &Value,
    ) -> Result<(), Error> {
        let url = self.url(&[index, "_update", id])?;
        debug!("POST {url}");

        let body = serde_json::json!({ "doc": partial });
        let resp = self
            .request(Method::POST, url)
            .query(&[("refresh", "wait_for")])
            .json(&body)
            .send()
            .await?;
        self.handle_empty(resp).await
    }

    /// Apply partial documents to many ids in one `_bulk` round trip.
    ///
    /// Missing documents are reported as failures by the store.
    pub async fn bulk_update(&self, index: &str, updates: &[(String, Value)]) -> Result<(), Error> {
        if updates.is_empty() {
            return Ok(());
        }
        let url = self.url(&[index, "_bulk"])?;
        debug!("POST {url} items={}", updates.len());

        let mut body = String::new();
        for (id, partial) in updates {
            let action = serde_json::json!({ "update": { "_id": id } });
            let doc = serde_json::json!({ "doc": partial });
            let _ = writeln!(body, "{action}");
            let _ = writeln!(body, "{doc}");
        }

        let resp = self
            .request(Method::POST, url)
            .query(&[("refresh", "wait_for")])
            .header(CONTENT_TYPE, "application/x-ndjson")
            .body(body)
            .send()
            .await?;
        let bulk: BulkResponse = self.handle_response(resp).await?;
        if !bulk.errors {
            return Ok(());
        }

        let failures: Vec<&Value> = bulk
            .items
            .iter()
            .filter_map(|item| item.get("update"))
            .filter(|update| update.get("error").is_some())
            .collect();
        let first_reason = failures
            .first()
            .and_then(|f| f.pointer("/error/reason"))
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_owned();
        Err(Error::PartialFailure {
            failed: failures.len(),
            total: updates.len(),
            first_reason,
        })
    }

    /// Fetch documents by id. Missing ids are omitted; order follows `ids`.
    pub async fn mget<T: DeserializeOwned>(
        &self,
        index: &str,
        ids: &[String],
    ) -> Result<Vec<T>, Error> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let url = self.url(&[index, "_mget"])?;
        debug!("POST {url} ids={}", ids.len());

        let body = serde_json::json!({ "ids": ids });
        let resp = self.request(Method::POST, url).json(&body).send().await?;
        let parsed: MgetResponse<T> = self.handle_response(resp).await?;
        Ok(parsed
            .docs
            .into_iter()
            .filter(|d| d.found)
            .filter_map(|d| d.source)
            .collect())
    }

    /// Run a `_search` with a caller-built body and return the sources.
    pub async fn search<T: DeserializeOwned>(
        &self,
        index: &str,
        body: &Value,
    ) -> Result<Vec<T>, Error> {
        let url = self.url(&[index, "_search"])?;
        debug!("POST {url} body={body}");

        let resp = self.request(Method::POST, url).json(body).send().await?;
        let parsed: SearchResponse<T> = self.handle_response(resp).await?;
        Ok(parsed.hits.hits.into_iter().map(|h| h.source).collect())
    }

    // ── Response handling ────────────────────────────────────────────

    async fn handle_response<T: DeserializeOwned>(
        &self,
        resp: reqwest::Response,
    ) -> Result<T, Error> {
        let status = resp.status();
        if status.is_success() {
            let body = resp.text().await?;
            serde_json::from_str(&body).map_err(|e| {
                let preview: String = body.chars().take(200).collect();
                Error::Deserialization {
                    message: format!("{e} (body preview: {preview:?})"),
                    body,
                }
            })
        } else {
            Err(self.parse_error(status, resp).await)
        }
    }

    async fn handle_empty(&self, resp: reqwest::Response) -> Result<(), Error> {
        let status = resp.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(self.parse_error(status, resp).await)
        }
    }

    async fn parse_error(&self, status: reqwest::StatusCode, resp: reqwest::Response) -> Error {
        let raw = resp.text().await.unwrap_or_default();
        parse_error_body(status.as_u16(), &raw)
    }
}

/// Decode the store's error envelope. `error` is either an object
/// `{type, reason}` or a bare string depending on the failure.
fn parse_error_body(status: u16, raw: &str) -> Error {
    let parsed: Option<Value> = serde_json::from_str(raw).ok();
    let error = parsed.as_ref().and_then(|v| v.get("error"));

    let (kind, reason) = match error {
        Some(Value::Object(obj)) => (
            obj.get("type").and_then(Value::as_str).unwrap_or("unknown").to_owned(),
            obj.get("reason").and_then(Value::as_str).unwrap_or_default().to_owned(),
        ),
        Some(Value::String(s)) => ("error".to_owned(), s.clone()),
        _ => (
            "http".to_owned(),
            if raw.is_empty() {
                format!("HTTP {status}")
            } else {
                raw.to_owned()
            },
        ),
    };
    Error::Search { status, kind, reason }
}
