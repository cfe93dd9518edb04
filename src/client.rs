//! HTTP transport and the signed API client.
//!
//! The client only ever issues GET requests. Every call is signed afresh, sent
//! through a [`Transport`], and decoded from the `{code, message, data}` envelope.

use std::{collections::BTreeMap, sync::Arc, time::Duration};

use async_trait::async_trait;
use log::{debug, info, warn};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::{Config, FileDescriptor, FlomoError, Note, Recommendation, RequestSigner, Result};

/// Endpoint listing notes by most recent update; also serves search.
pub const NOTES_ENDPOINT: &str = "/memo/updated/";

/// Endpoint listing tags.
pub const TAGS_ENDPOINT: &str = "/tag/updated/";

/// Endpoint resolving file ids to file details.
pub const FILES_ENDPOINT: &str = "/file/";

/// A GET request as handed to the transport.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub url: String,
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
}

impl HttpRequest {
    /// Value of a query parameter, if present.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Status code and raw body of a response.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

/// Sends a GET and returns whatever the server answered.
///
/// Implementations report connection-level failures as
/// [`FlomoError::Transport`]; status interpretation is left to the caller.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, request: &HttpRequest) -> Result<HttpResponse>;
}

/// [`Transport`] backed by `reqwest`.
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn get(&self, request: &HttpRequest) -> Result<HttpResponse> {
        let mut builder = self.client.get(&request.url).query(&request.query);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let body = response.bytes().await?.to_vec();

        Ok(HttpResponse { status, body })
    }
}

/// Signed client for the flomo API.
#[derive(Clone)]
pub struct ApiClient {
    pub(crate) config: Config,
    transport: Arc<dyn Transport>,
    signer: RequestSigner,
}

impl ApiClient {
    /// Client over HTTP, configured from `config`.
    pub fn new(config: Config) -> Result<Self> {
        info!("Initializing API client: base_url={}", config.base_url);
        let transport = ReqwestTransport::new(Duration::from_secs(config.timeout_secs))?;
        Ok(Self::with_transport(config, Arc::new(transport)))
    }

    /// Client over an arbitrary transport.
    pub fn with_transport(config: Config, transport: Arc<dyn Transport>) -> Self {
        let signer = RequestSigner::new(&config);
        Self {
            config,
            transport,
            signer,
        }
    }

    /// Replaces the signer, e.g. to inject a different digest.
    pub fn with_signer(mut self, signer: RequestSigner) -> Self {
        self.signer = signer;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Issues one signed GET against `path` and decodes the envelope's `data`.
    ///
    /// A missing or null `data` decodes as `T::default()`.
    pub async fn get_json<T, I, K, V>(&self, path: &str, params: I) -> Result<T>
    where
        T: DeserializeOwned + Default,
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let signed = self.signer.sign(params);
        let request = self.build_request(path, signed);
        debug!("GET {} ({} params)", request.url, request.query.len());

        let response = self.transport.get(&request).await?;
        if response.status != 200 {
            warn!("GET {} returned HTTP {}", request.url, response.status);
            return Err(FlomoError::Http {
                status: response.status,
            });
        }

        decode_envelope(&response.body)
    }

    fn build_request(&self, path: &str, signed: BTreeMap<String, String>) -> HttpRequest {
        let mut headers = Vec::new();
        match self.config.get_token() {
            Ok(token) => headers.push(("Authorization".to_string(), token)),
            Err(_) => debug!("No authorization token configured, sending unauthenticated"),
        }

        HttpRequest {
            url: format!("{}{}", self.config.base_url.trim_end_matches('/'), path),
            query: signed.into_iter().collect(),
            headers,
        }
    }

    /// Single search call returning at most one page of hits.
    ///
    /// A blank query returns nothing without touching the network.
    pub async fn search_page(&self, query: &str, limit: usize) -> Result<Vec<Note>> {
        if query.trim().is_empty() {
            return Ok(Vec::new());
        }

        info!("Searching for '{}'", query);
        let hits: Vec<Note> = self
            .get_json(
                NOTES_ENDPOINT,
                [("q", query.to_string()), ("limit", limit.to_string())],
            )
            .await?;
        info!("Search returned {} hits", hits.len());
        Ok(hits)
    }

    /// Recommendation list of one note.
    pub async fn recommendations(
        &self,
        slug: &str,
        rec_type: u32,
        no_same_tag: bool,
    ) -> Result<Vec<Recommendation>> {
        debug!("Fetching recommendations for {}", slug);
        self.get_json(
            &format!("/memo/{}/recommended", slug),
            [
                ("type", rec_type.to_string()),
                ("no_same_tag", u8::from(no_same_tag).to_string()),
            ],
        )
        .await
    }

    /// Resolves file ids to their details, sent as `ids[0]`, `ids[1]`, ...
    pub async fn file_details<S: ToString>(&self, ids: &[S]) -> Result<Vec<FileDescriptor>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let params = ids
            .iter()
            .enumerate()
            .map(|(i, id)| (format!("ids[{}]", i), id.to_string()));
        self.get_json(FILES_ENDPOINT, params).await
    }
}

/// Decodes a `{code, message, data}` envelope.
pub fn decode_envelope<T>(body: &[u8]) -> Result<T>
where
    T: DeserializeOwned + Default,
{
    let envelope: Value =
        serde_json::from_slice(body).map_err(|e| FlomoError::MalformedResponse {
            message: format!("body is not JSON: {}", e),
        })?;

    let code = envelope
        .get("code")
        .and_then(Value::as_i64)
        .ok_or_else(|| FlomoError::MalformedResponse {
            message: "envelope has no integer `code`".to_string(),
        })?;

    if code != 0 {
        let message = envelope
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("unknown error")
            .to_string();
        return Err(FlomoError::Api { code, message });
    }

    match envelope.get("data") {
        None | Some(Value::Null) => Ok(T::default()),
        Some(data) => {
            serde_json::from_value(data.clone()).map_err(|e| FlomoError::MalformedResponse {
                message: format!("unexpected `data` shape: {}", e),
            })
        }
    }
}


#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::testing::*;
    use super::*;

    #[test]
    fn test_missing_data_decodes_as_empty() {
        let notes: Vec<Note> = decode_envelope(br#"{"code": 0}"#).unwrap();
        assert!(notes.is_empty());
    }

    #[test]
    fn test_non_json_body_is_malformed() {
        let err = decode_envelope::<Vec<Note>>(b"<html>502</html>").unwrap_err();
        assert!(matches!(err, FlomoError::MalformedResponse { .. }));
    }

    #[test]
    fn test_nonzero_code_surfaces_message() {
        let err =
            decode_envelope::<Vec<Note>>(br#"{"code": -10, "message": "sign error"}"#)
                .unwrap_err();
        match err {
            FlomoError::Api { code, message } => {
                assert_eq!(code, -10);
                assert_eq!(message, "sign error");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_request_is_signed_and_authorized() {
        let transport = ScriptedTransport::new();
        transport.push_data(json!([]));
        let client = ApiClient::with_transport(test_config(), transport.clone());

        let _: Vec<Note> = client
            .get_json(NOTES_ENDPOINT, [("limit", "10")])
            .await
            .unwrap();

        let request = &transport.requests()[0];
        assert_eq!(request.url, "https://api.test/v1/memo/updated/");
        assert_eq!(
            request.headers,
            vec![("Authorization".to_string(), "Bearer test".to_string())]
        );
        for key in ["timestamp", "api_key", "app_version", "platform", "webp", "sign"] {
            assert!(request.param(key).is_some(), "missing {}", key);
        }
        assert_eq!(request.param("limit"), Some("10"));
    }

    #[tokio::test]
    async fn test_non_200_is_http_error() {
        let transport = ScriptedTransport::new();
        transport.push(Ok(HttpResponse {
            status: 401,
            body: Vec::new(),
        }));
        let client = ApiClient::with_transport(test_config(), transport);

        let err = client
            .get_json::<Vec<Note>, _, _, _>(NOTES_ENDPOINT, [("limit", "1")])
            .await
            .unwrap_err();
        assert!(matches!(err, FlomoError::Http { status: 401 }));
    }

    #[tokio::test]
    async fn test_recommendation_parameters() {
        let transport = ScriptedTransport::new();
        transport.push_data(json!([{"similarity": 0.9, "memo": {"slug": "b"}}]));
        let client = ApiClient::with_transport(test_config(), transport.clone());

        let recs = client.recommendations("a", 1, true).await.unwrap();
        assert_eq!(recs.len(), 1);

        let request = &transport.requests()[0];
        assert_eq!(request.url, "https://api.test/v1/memo/a/recommended");
        assert_eq!(request.param("type"), Some("1"));
        assert_eq!(request.param("no_same_tag"), Some("1"));
    }

    #[tokio::test]
    async fn test_file_details_indexes_ids() {
        let transport = ScriptedTransport::new();
        transport.push_data(json!([
            {"id": 7, "name": "a.png", "size": 10, "url": "https://cdn/a.png"}
        ]));
        let client = ApiClient::with_transport(test_config(), transport.clone());

        let files = client.file_details(&[7, 9]).await.unwrap();
        assert_eq!(files[0].url.as_deref(), Some("https://cdn/a.png"));

        let request = &transport.requests()[0];
        assert_eq!(request.param("ids[0]"), Some("7"));
        assert_eq!(request.param("ids[1]"), Some("9"));

        let none = client.file_details::<u64>(&[]).await.unwrap();
        assert!(none.is_empty());
        assert_eq!(transport.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_blank_search_skips_network() {
        let transport = ScriptedTransport::new();
        let client = ApiClient::with_transport(test_config(), transport.clone());

        assert!(client.search_page("   ", 10).await.unwrap().is_empty());
        assert!(transport.requests().is_empty());
    }
}
