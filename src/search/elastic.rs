use crate::config::Config;
use crate::corpus::{Paragraph, ParagraphId};
use crate::error::{EvalError, Result};
use crate::search::{index_definition, Credentials, IndexConfig, SearchBackend};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, Instant};

/// Which error a non-transient failure maps to.
#[derive(Debug, Clone, Copy)]
enum Stage {
    Indexing,
    Query,
}

impl Stage {
    fn error(self, message: String) -> EvalError {
        match self {
            Stage::Indexing => EvalError::Indexing(message),
            Stage::Query => EvalError::Query(message),
        }
    }
}

/// A failed attempt that is worth retrying.
enum Transient {
    Transport(String),
    Status(StatusCode, String),
}

impl fmt::Display for Transient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transient::Transport(msg) => write!(f, "network error: {}", msg),
            Transient::Status(status, body) => write!(f, "HTTP {}: {}", status, body),
        }
    }
}

/// Rate limiting and gateway/availability failures; everything else is final.
fn is_transient_status(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::TOO_MANY_REQUESTS
            | StatusCode::BAD_GATEWAY
            | StatusCode::SERVICE_UNAVAILABLE
            | StatusCode::GATEWAY_TIMEOUT
    )
}

/// `id:key` pairs are sent base64-encoded; anything else is assumed encoded.
fn encode_api_key(key: &str) -> String {
    if key.contains(':') {
        STANDARD.encode(key)
    } else {
        key.to_string()
    }
}

#[derive(Serialize)]
struct DocumentSource<'a> {
    ru_wiki_pageid: u64,
    text: &'a str,
}

/// NDJSON body for `POST /_bulk`: one `index` action + source per paragraph.
fn bulk_payload(index: &str, paragraphs: &[Paragraph]) -> Result<String> {
    let mut payload = String::new();
    for paragraph in paragraphs {
        let action = json!({ "index": { "_index": index, "_id": paragraph.id.to_string() } });
        payload.push_str(&action.to_string());
        payload.push('\n');
        payload.push_str(&serde_json::to_string(&DocumentSource {
            ru_wiki_pageid: paragraph.page_id,
            text: &paragraph.text,
        })?);
        payload.push('\n');
    }
    Ok(payload)
}

#[derive(Deserialize)]
struct BulkResponse {
    errors: bool,
    items: Vec<HashMap<String, BulkItem>>,
}

#[derive(Deserialize)]
struct BulkItem {
    #[serde(rename = "_id", default)]
    id: Option<String>,
    status: u16,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

impl BulkItem {
    fn failed(&self) -> bool {
        self.error.is_some() || self.status >= 300
    }
}

#[derive(Deserialize)]
struct CountResponse {
    count: u64,
}

#[derive(Deserialize)]
struct SearchResponse {
    hits: SearchHits,
}

#[derive(Deserialize)]
struct SearchHits {
    hits: Vec<SearchHit>,
}

#[derive(Deserialize)]
struct SearchHit {
    #[serde(rename = "_id")]
    id: String,
}

/// Elasticsearch REST client
///
/// Every request goes through a bounded retry loop with exponential backoff
/// for connection failures and 429/502/503/504 responses.
pub struct ElasticClient {
    client: Client,
    base_url: String,
    credentials: Option<Credentials>,
    max_retries: usize,
    retry_base_delay: Duration,
    bulk_batch_size: usize,
}

impl ElasticClient {
    /// Create a client for the cluster at `base_url`
    ///
    /// # Arguments
    ///
    /// * `base_url` - Cluster address, e.g. "http://localhost:9200"
    /// * `timeout` - Per-request timeout
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| EvalError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            credentials: None,
            max_retries: 3,
            retry_base_delay: Duration::from_millis(500),
            bulk_batch_size: 500,
        })
    }

    /// Build a client from the `[elasticsearch]` config section
    pub fn from_config(config: &Config) -> Result<Self> {
        let es = &config.elasticsearch;
        let credentials = config
            .credentials()
            .map_err(|e| EvalError::Config(format!("{:#}", e)))?;

        Ok(Self::new(&es.url, Duration::from_secs(es.timeout_secs))?
            .with_credentials(credentials)
            .with_retry(es.max_retries, Duration::from_millis(es.retry_base_delay_ms))
            .with_bulk_batch_size(es.bulk_batch_size))
    }

    pub fn with_credentials(mut self, credentials: Option<Credentials>) -> Self {
        self.credentials = credentials;
        self
    }

    pub fn with_retry(mut self, max_retries: usize, base_delay: Duration) -> Self {
        self.max_retries = max_retries;
        self.retry_base_delay = base_delay;
        self
    }

    pub fn with_bulk_batch_size(mut self, bulk_batch_size: usize) -> Self {
        self.bulk_batch_size = bulk_batch_size.max(1);
        self
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.credentials {
            Some(Credentials::Basic { username, password }) => {
                request.basic_auth(username, Some(password))
            }
            Some(Credentials::ApiKey(key)) => {
                request.header(AUTHORIZATION, format!("ApiKey {}", encode_api_key(key)))
            }
            None => request,
        }
    }

    /// Send a request, retrying transient failures.
    ///
    /// Returns the response for any non-transient status; callers decide
    /// what a 404 or 400 means for their operation.
    async fn send<F>(&self, stage: Stage, what: &str, build: F) -> Result<Response>
    where
        F: Fn(&Client) -> RequestBuilder,
    {
        let mut attempt = 0;
        let mut delay = self.retry_base_delay;

        loop {
            let start = Instant::now();
            let failure = match self.authorize(build(&self.client)).send().await {
                Ok(response) if is_transient_status(response.status()) => {
                    let status = response.status();
                    let body = response.text().await.unwrap_or_default();
                    Transient::Status(status, body)
                }
                Ok(response) => {
                    log::debug!("{} took {:?} (attempt {})", what, start.elapsed(), attempt + 1);
                    return Ok(response);
                }
                Err(e) if e.is_builder() => {
                    return Err(stage.error(format!("{}: invalid request: {}", what, e)));
                }
                Err(e) => Transient::Transport(e.to_string()),
            };

            if attempt < self.max_retries {
                log::warn!(
                    "{} failed, retry {}/{} in {:?}: {}",
                    what,
                    attempt + 1,
                    self.max_retries,
                    delay,
                    failure
                );
                tokio::time::sleep(delay).await;
                delay *= 2;
                attempt += 1;
                continue;
            }

            return Err(match failure {
                Transient::Transport(msg) => EvalError::Connectivity(format!(
                    "{}: {} (after {} attempts)",
                    what,
                    msg,
                    attempt + 1
                )),
                status @ Transient::Status(..) => stage.error(format!(
                    "{}: {} (after {} attempts)",
                    what,
                    status,
                    attempt + 1
                )),
            });
        }
    }

    /// Decode a successful JSON response, mapping anything else to the stage error.
    async fn decode<T: DeserializeOwned>(response: Response, stage: Stage, what: &str) -> Result<T> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error response".to_string());
            return Err(stage.error(format!("{}: HTTP {}: {}", what, status, body)));
        }
        response
            .json::<T>()
            .await
            .map_err(|e| stage.error(format!("{}: failed to parse response: {}", what, e)))
    }

    /// Make recently indexed documents visible to count and search.
    pub async fn refresh(&self, index: &IndexConfig) -> Result<()> {
        let url = self.endpoint(&format!("{}/_refresh", index.name));
        let what = format!("refresh {}", index.name);
        let response = self.send(Stage::Indexing, &what, |c| c.post(&url)).await?;
        Self::decode::<serde_json::Value>(response, Stage::Indexing, &what).await?;
        Ok(())
    }
}

impl SearchBackend for ElasticClient {
    async fn ensure_index(&self, index: &IndexConfig) -> Result<bool> {
        let url = self.endpoint(&index.name);
        let what = format!("check index {}", index.name);
        let response = self.send(Stage::Indexing, &what, |c| c.head(&url)).await?;
        match response.status() {
            status if status.is_success() => {
                log::info!("Index {} already exists", index.name);
                return Ok(false);
            }
            StatusCode::NOT_FOUND => {}
            status => {
                return Err(EvalError::Indexing(format!("{}: HTTP {}", what, status)));
            }
        }

        let body = index_definition(index);
        let what = format!("create index {}", index.name);
        let response = self.send(Stage::Indexing, &what, |c| c.put(&url).json(&body)).await?;
        let status = response.status();
        if status.is_success() {
            log::info!("Index {} created ({} analysis)", index.name, index.mode());
            return Ok(true);
        }

        let text = response.text().await.unwrap_or_default();
        // Lost a creation race: someone else made it between HEAD and PUT
        if status == StatusCode::BAD_REQUEST && text.contains("resource_already_exists_exception") {
            log::info!("Index {} already exists", index.name);
            return Ok(false);
        }
        Err(EvalError::Indexing(format!("{}: HTTP {}: {}", what, status, text)))
    }

    async fn bulk_index(&self, index: &IndexConfig, paragraphs: &[Paragraph]) -> Result<usize> {
        if paragraphs.is_empty() {
            log::warn!("No paragraphs to index into {}", index.name);
            return Ok(0);
        }

        let url = self.endpoint("_bulk");
        let batches = paragraphs.len().div_ceil(self.bulk_batch_size);
        let mut indexed = 0;

        for (batch_no, batch) in paragraphs.chunks(self.bulk_batch_size).enumerate() {
            let payload = bulk_payload(&index.name, batch)?;
            let what = format!("bulk batch {}/{} into {}", batch_no + 1, batches, index.name);
            let response = self
                .send(Stage::Indexing, &what, |c| {
                    c.post(&url)
                        .header(CONTENT_TYPE, "application/x-ndjson")
                        .body(payload.clone())
                })
                .await?;
            let result: BulkResponse = Self::decode(response, Stage::Indexing, &what).await?;

            let failures: Vec<&BulkItem> = result
                .items
                .iter()
                .flat_map(|item| item.values())
                .filter(|item| item.failed())
                .collect();
            if result.errors || !failures.is_empty() {
                let first = failures
                    .first()
                    .map(|item| {
                        format!(
                            "id {}: {}",
                            item.id.as_deref().unwrap_or("?"),
                            item.error
                                .as_ref()
                                .map(|e| e.to_string())
                                .unwrap_or_else(|| format!("status {}", item.status))
                        )
                    })
                    .unwrap_or_else(|| "no item details".to_string());
                return Err(EvalError::Indexing(format!(
                    "{}: {} of {} documents rejected (first: {})",
                    what,
                    failures.len(),
                    batch.len(),
                    first
                )));
            }

            indexed += result.items.len();
            log::info!("{}: {} documents", what, result.items.len());
        }

        self.refresh(index).await?;
        log::info!("Index {} populated with {} documents", index.name, indexed);
        Ok(indexed)
    }

    async fn count(&self, index: &IndexConfig) -> Result<u64> {
        let url = self.endpoint(&format!("{}/_count", index.name));
        let what = format!("count {}", index.name);
        let response = self.send(Stage::Query, &what, |c| c.get(&url)).await?;
        let result: CountResponse = Self::decode(response, Stage::Query, &what).await?;
        Ok(result.count)
    }

    async fn search(&self, index: &IndexConfig, text: &str, k: usize) -> Result<Vec<ParagraphId>> {
        let url = self.endpoint(&format!("{}/_search", index.name));
        let what = format!("search {}", index.name);
        let body = json!({
            "query": { "match": { "text": text } },
            "size": k,
            "_source": false
        });
        let response = self.send(Stage::Query, &what, |c| c.post(&url).json(&body)).await?;
        let result: SearchResponse = Self::decode(response, Stage::Query, &what).await?;

        result
            .hits
            .hits
            .iter()
            .map(|hit| {
                ParagraphId::parse(&hit.id).ok_or_else(|| {
                    EvalError::Query(format!(
                        "{}: document id {:?} is not an integer paragraph id",
                        what, hit.id
                    ))
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::Analysis;

    fn paragraph(id: u64, text: &str) -> Paragraph {
        Paragraph {
            id: ParagraphId(id),
            page_id: id * 10,
            text: text.to_string(),
        }
    }

    #[test]
    fn test_bulk_payload_format() {
        let payload = bulk_payload("wiki", &[paragraph(1, "один"), paragraph(2, "два \"кавычки\"")]).unwrap();
        let lines: Vec<&str> = payload.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(payload.ends_with('\n'));

        let action: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(action["index"]["_index"], "wiki");
        assert_eq!(action["index"]["_id"], "1");

        let source: serde_json::Value = serde_json::from_str(lines[3]).unwrap();
        assert_eq!(source["ru_wiki_pageid"], 20);
        assert_eq!(source["text"], "два \"кавычки\"");
    }

    #[test]
    fn test_transient_statuses() {
        assert!(is_transient_status(StatusCode::TOO_MANY_REQUESTS));
        assert!(is_transient_status(StatusCode::SERVICE_UNAVAILABLE));
        assert!(is_transient_status(StatusCode::BAD_GATEWAY));
        assert!(is_transient_status(StatusCode::GATEWAY_TIMEOUT));
        assert!(!is_transient_status(StatusCode::BAD_REQUEST));
        assert!(!is_transient_status(StatusCode::NOT_FOUND));
        assert!(!is_transient_status(StatusCode::INTERNAL_SERVER_ERROR));
    }

    #[test]
    fn test_encode_api_key() {
        assert_eq!(encode_api_key("id:secret"), STANDARD.encode("id:secret"));
        assert_eq!(encode_api_key("aWQ6c2VjcmV0"), "aWQ6c2VjcmV0");
    }

    #[test]
    fn test_bulk_item_failure_detection() {
        let body = r#"{"errors": true, "items": [
            {"index": {"_id": "1", "status": 201}},
            {"index": {"_id": "2", "status": 400, "error": {"type": "mapper_parsing_exception"}}}
        ]}"#;
        let response: BulkResponse = serde_json::from_str(body).unwrap();
        assert!(response.errors);
        let failed: Vec<_> = response
            .items
            .iter()
            .flat_map(|i| i.values())
            .filter(|i| i.failed())
            .collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].id.as_deref(), Some("2"));
    }

    #[test]
    fn test_endpoint_trims_trailing_slash() {
        let client = ElasticClient::new("http://localhost:9200/", Duration::from_secs(1)).unwrap();
        assert_eq!(client.endpoint("wiki/_count"), "http://localhost:9200/wiki/_count");
    }

    #[test]
    fn test_bulk_batch_size_floor() {
        let client = ElasticClient::new("http://localhost:9200", Duration::from_secs(1))
            .unwrap()
            .with_bulk_batch_size(0);
        assert_eq!(client.bulk_batch_size, 1);
    }

    #[tokio::test]
    async fn test_unreachable_cluster_is_connectivity_error() {
        // Reserve a free port, then close it so connections are refused
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let client = ElasticClient::new(&format!("http://127.0.0.1:{}", port), Duration::from_secs(2))
            .unwrap()
            .with_retry(1, Duration::from_millis(1));
        let index = IndexConfig {
            name: "wiki".to_string(),
            analysis: Analysis::Standard,
        };
        let err = client.count(&index).await.unwrap_err();
        assert!(matches!(err, EvalError::Connectivity(ref msg) if msg.contains("after 2 attempts")));
    }
}
