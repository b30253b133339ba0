use std::time::Duration;

use reqwest::Response;
use serde::de::DeserializeOwned;

use democrm_api::*;
use democrm_core::record::today;
use democrm_core::report::{DashboardSummary, summarize};
use democrm_runtime_config::ClientConfig;

use crate::error::ClientError;
use crate::retry::{RetryConfig, retry_read};

/// Typed HTTP client for the democrm API.
///
/// Read-only calls (`GET`) go through [`retry_read`]; writes are sent once.
/// Protected calls use the stored bearer token and fail with
/// [`ClientError::NotAuthenticated`] without touching the network when none
/// is set.
pub struct ApiClient {
    client: reqwest::Client,
    base_url: String,
    auth_token: Option<String>,
    retry: RetryConfig,
}

impl ApiClient {
    /// Create a new client with the given base URL and timeout.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ClientError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(client, base_url))
    }

    /// Build from `[server]` and `[retry]` of a loaded config.
    pub fn from_config(config: &ClientConfig) -> Result<Self, ClientError> {
        let mut api = Self::new(
            &config.server.url,
            Duration::from_secs(config.server.request_timeout_secs),
        )?;
        api.retry = RetryConfig::from(&config.retry);
        Ok(api)
    }

    /// Create from an existing `reqwest::Client` (e.g. shared in tests).
    pub fn with_client(client: reqwest::Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            auth_token: None,
            retry: RetryConfig::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn set_auth(&mut self, token: String) {
        self.auth_token = Some(token);
    }

    pub fn clear_auth(&mut self) {
        self.auth_token = None;
    }

    pub fn auth_token(&self) -> Option<&str> {
        self.auth_token.as_deref()
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn retry(&self) -> &RetryConfig {
        &self.retry
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api{}", self.base_url, path)
    }

    fn token_or_bail(&self) -> Result<&str, ClientError> {
        self.auth_token.as_deref().ok_or(ClientError::NotAuthenticated)
    }

    // ── Health ────────────────────────────────────────────────────────────

    pub async fn health(&self) -> Result<HealthResponse, ClientError> {
        retry_read(&self.retry, "GET /health", || async move {
            let resp = self.client.get(self.url("/health")).send().await?;
            parse_response(resp).await
        })
        .await
    }

    // ── Auth ──────────────────────────────────────────────────────────────

    /// Exchange credentials for a token. Does not store it; call
    /// [`Self::set_auth`] with the returned token.
    pub async fn login(&self, req: &LoginRequest) -> Result<LoginResponse, ClientError> {
        let resp = self
            .client
            .post(self.url("/login"))
            .json(req)
            .send()
            .await?;
        parse_response(resp).await
    }

    pub async fn verify(&self) -> Result<VerifyResponse, ClientError> {
        let token = self.token_or_bail()?;
        retry_read(&self.retry, "GET /auth/verify", || async move {
            let resp = self
                .client
                .get(self.url("/auth/verify"))
                .bearer_auth(token)
                .send()
                .await?;
            parse_response(resp).await
        })
        .await
    }

    // ── Clients ───────────────────────────────────────────────────────────

    /// One page of the filtered, name-sorted collection.
    pub async fn list_clients(&self, req: &PageRequest) -> Result<PageResult, ClientError> {
        let token = self.token_or_bail()?;
        let query = &ClientListQuery::from(req);
        retry_read(&self.retry, "GET /clients", || async move {
            let resp = self
                .client
                .get(self.url("/clients"))
                .bearer_auth(token)
                .query(query)
                .send()
                .await?;
            let resp = check_status(resp).await?;
            let total_matches = total_count(&resp)?;
            let items = decode(resp).await?;
            Ok(PageResult {
                items,
                total_matches,
            })
        })
        .await
    }

    /// The full collection, unfiltered and unpaginated.
    pub async fn all_clients(&self) -> Result<Vec<Record>, ClientError> {
        let token = self.token_or_bail()?;
        retry_read(&self.retry, "GET /clients/all", || async move {
            let resp = self
                .client
                .get(self.url("/clients/all"))
                .bearer_auth(token)
                .send()
                .await?;
            parse_response(resp).await
        })
        .await
    }

    pub async fn get_client(&self, id: &str) -> Result<Record, ClientError> {
        let token = self.token_or_bail()?;
        let path = &format!("/clients/{id}");
        retry_read(&self.retry, "GET /clients/{id}", || async move {
            let resp = self
                .client
                .get(self.url(path))
                .bearer_auth(token)
                .send()
                .await?;
            parse_response(resp).await
        })
        .await
    }

    pub async fn create_client(&self, record: &Record) -> Result<Record, ClientError> {
        let token = self.token_or_bail()?;
        let resp = self
            .client
            .post(self.url("/clients"))
            .bearer_auth(token)
            .json(record)
            .send()
            .await?;
        parse_response(resp).await
    }

    pub async fn update_client(&self, id: &str, record: &Record) -> Result<Record, ClientError> {
        let token = self.token_or_bail()?;
        let resp = self
            .client
            .put(self.url(&format!("/clients/{id}")))
            .bearer_auth(token)
            .json(record)
            .send()
            .await?;
        parse_response(resp).await
    }

    pub async fn delete_client(&self, id: &str) -> Result<OkResponse, ClientError> {
        let token = self.token_or_bail()?;
        let resp = self
            .client
            .delete(self.url(&format!("/clients/{id}")))
            .bearer_auth(token)
            .send()
            .await?;
        parse_response(resp).await
    }

    // ── Dashboard ─────────────────────────────────────────────────────────

    /// Fetch the whole collection and aggregate it for the dashboard.
    pub async fn dashboard(&self) -> Result<DashboardSummary, ClientError> {
        let records = self.all_clients().await?;
        Ok(summarize(&records, today()))
    }
}

/// Turn a non-2xx response into [`ClientError::Api`].
async fn check_status(resp: Response) -> Result<Response, ClientError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let bytes = resp.bytes().await.unwrap_or_default();
    let body = serde_json::from_slice::<ApiError>(&bytes).unwrap_or_else(|_| ApiError {
        error: ErrorCode::Unknown,
        message: String::from_utf8_lossy(&bytes).into_owned(),
        fields: Vec::new(),
        duplicate: None,
    });
    Err(ClientError::Api {
        status: status.as_u16(),
        code: body.error,
        message: body.message,
        fields: body.fields,
        duplicate: body.duplicate,
    })
}

async fn decode<T: DeserializeOwned>(resp: Response) -> Result<T, ClientError> {
    let bytes = resp.bytes().await?;
    serde_json::from_slice(&bytes).map_err(|e| ClientError::Decode(e.to_string()))
}

async fn parse_response<T: DeserializeOwned>(resp: Response) -> Result<T, ClientError> {
    decode(check_status(resp).await?).await
}

fn total_count(resp: &Response) -> Result<u64, ClientError> {
    resp.headers()
        .get(TOTAL_COUNT_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
        .ok_or_else(|| ClientError::Decode(format!("missing or invalid {TOTAL_COUNT_HEADER} header")))
}
