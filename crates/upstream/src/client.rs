//! HTTP client for the upstream dataset catalog.

use crate::error::{UpstreamError, UpstreamResult};
use crate::options::QueryOptions;
use crate::stream;
use curator_core::config::UpstreamConfig;
use curator_core::{get_string, User};
use reqwest::header::CONTENT_TYPE;
use reqwest::{Method, Response, StatusCode, Url};
use serde_json::Value;
use std::time::Duration;
use tokio::sync::mpsc;

/// User-Agent sent on every upstream request.
const USER_AGENT: &str = concat!("curator/", env!("CARGO_PKG_VERSION"));

/// Connect timeout; full-request deadlines are the caller's business.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Response header carrying the server's claimed record count at stream start.
const COUNT_HEADER: &str = "x-count";

/// Capacity of the record channel. The producer blocks on the network and the
/// consumer on the datastore, so one slot is enough.
const STREAM_CHANNEL_DEPTH: usize = 1;

/// An open dataset stream.
#[derive(Debug)]
pub struct ReadStream {
    /// The server's claimed total at stream start. Only a hint; used to decide
    /// whether loading local sync state is worth it.
    pub total_hint: u64,
    pub records: mpsc::Receiver<Value>,
    pub errors: mpsc::Receiver<UpstreamError>,
}

/// Client for the upstream's dataset REST and RPC endpoints.
///
/// One instance is shared process-wide; reqwest's connection pool is
/// thread-safe.
#[derive(Clone)]
pub struct UpstreamClient {
    http: reqwest::Client,
    base_url: Url,
    username: String,
    password: String,
}

impl UpstreamClient {
    pub fn new(config: &UpstreamConfig) -> UpstreamResult<Self> {
        let base_url = Url::parse(&config.url)
            .map_err(|e| UpstreamError::InvalidRequest(format!("invalid upstream url: {e}")))?;
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(CONNECT_TIMEOUT)
            .danger_accept_invalid_certs(config.insecure_certificates)
            .build()?;
        Ok(Self {
            http,
            base_url,
            username: config.username.clone(),
            password: config.password.clone(),
        })
    }

    fn url(&self, path: &str) -> UpstreamResult<Url> {
        self.base_url
            .join(path)
            .map_err(|e| UpstreamError::InvalidRequest(format!("failed to build url: {e}")))
    }

    fn request(&self, method: Method, url: Url) -> reqwest::RequestBuilder {
        self.http
            .request(method, url)
            .basic_auth(&self.username, Some(&self.password))
    }

    /// Turn a non-2xx response into an API error carrying the body verbatim.
    async fn check_status(response: Response) -> UpstreamResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.bytes().await.unwrap_or_default().to_vec();
        Err(UpstreamError::Api {
            status: status.as_u16(),
            message: status
                .canonical_reason()
                .unwrap_or("upstream error")
                .to_string(),
            body,
        })
    }

    /// Decode a JSON body, requiring the right content type.
    async fn decode_json(response: Response) -> UpstreamResult<Value> {
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        if !content_type.starts_with("application/json") {
            return Err(UpstreamError::MalformedResponse(format!(
                "unexpected content type: {content_type}"
            )));
        }
        let body = response.bytes().await?;
        serde_json::from_slice(&body)
            .map_err(|e| UpstreamError::MalformedResponse(e.to_string()))
    }

    async fn get_dataset(&self, id: &str, removed: bool) -> UpstreamResult<Value> {
        let mut url = self.url(&format!("datasets/{id}"))?;
        if removed {
            url.set_query(Some("removed=true"));
        }
        let response = self.request(Method::GET, url).send().await?;
        Self::decode_json(Self::check_status(response).await?).await
    }

    /// Fetch one dataset by its upstream identifier.
    pub async fn get(&self, id: &str) -> UpstreamResult<Value> {
        self.get_dataset(id, false).await
    }

    /// Fetch one removed dataset.
    pub async fn get_removed(&self, id: &str) -> UpstreamResult<Value> {
        self.get_dataset(id, true).await
    }

    /// Create a dataset upstream. The owner's projects scope the write.
    pub async fn create(&self, blob: &Value, owner: &User) -> UpstreamResult<Value> {
        let mut url = self.url("datasets/")?;
        // literal commas; form-encoding would escape them
        url.set_query(Some(&format!(
            "allowed_projects={}",
            owner.allowed_projects()
        )));
        let response = self.request(Method::POST, url).json(blob).send().await?;
        Self::decode_json(Self::check_status(response).await?).await
    }

    /// Patch an existing dataset upstream.
    pub async fn update(&self, id: &str, blob: &Value, owner: &User) -> UpstreamResult<Value> {
        let mut url = self.url(&format!("datasets/{id}"))?;
        url.set_query(Some(&format!(
            "allowed_projects={}",
            owner.allowed_projects()
        )));
        let response = self.request(Method::PATCH, url).json(blob).send().await?;
        Self::decode_json(Self::check_status(response).await?).await
    }

    /// Soft-delete a dataset upstream; the identifier is taken from the blob.
    pub async fn delete(&self, blob: &Value) -> UpstreamResult<()> {
        let id = get_string(blob, "identifier").ok_or_else(|| {
            UpstreamError::InvalidRequest("dataset has no upstream identifier".to_string())
        })?;
        let url = self.url(&format!("datasets/{id}/delete"))?;
        let response = self.request(Method::POST, url).send().await?;
        Self::check_status(response).await?;
        Ok(())
    }

    /// RPC: change a dataset's cumulative state. Returns the identifier of a
    /// derived version when the upstream created one.
    pub async fn change_cumulative_state(
        &self,
        id: &str,
        state: &str,
    ) -> UpstreamResult<Option<String>> {
        let mut url = self.url("rpc/datasets/change_cumulative_state")?;
        url.query_pairs_mut()
            .append_pair("identifier", id)
            .append_pair("cumulative_state", state);
        let response = self.request(Method::POST, url).send().await?;
        Self::rpc_new_version(Self::check_status(response).await?).await
    }

    /// RPC: refresh the content of one directory inside a dataset. Returns the
    /// identifier of a derived version when the upstream created one.
    pub async fn refresh_directory_content(
        &self,
        id: &str,
        directory_id: &str,
    ) -> UpstreamResult<Option<String>> {
        let mut url = self.url("rpc/datasets/refresh_directory_content")?;
        url.query_pairs_mut()
            .append_pair("cr_identifier", id)
            .append_pair("dir_identifier", directory_id);
        let response = self.request(Method::POST, url).send().await?;
        Self::rpc_new_version(Self::check_status(response).await?).await
    }

    async fn rpc_new_version(response: Response) -> UpstreamResult<Option<String>> {
        if response.status() == StatusCode::NO_CONTENT {
            return Ok(None);
        }
        let body = response.bytes().await?;
        if body.is_empty() {
            return Ok(None);
        }
        let value: Value = serde_json::from_slice(&body)
            .map_err(|e| UpstreamError::MalformedResponse(e.to_string()))?;
        Ok(get_string(&value, "new_version_created.identifier").map(str::to_string))
    }

    /// Open a dataset stream.
    ///
    /// One upstream connection; records arrive on a bounded channel one at a
    /// time, stream-level failures on the error channel. Dropping the record
    /// receiver stops the producer. The stream is finite and not restartable.
    pub async fn read_stream(&self, options: QueryOptions) -> UpstreamResult<ReadStream> {
        let mut url = self.url("datasets/")?;
        url.set_query(Some(&options.to_query()));

        let response = self.request(Method::GET, url).send().await?;
        let response = Self::check_status(response).await?;

        let total_hint = response
            .headers()
            .get(COUNT_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(0);

        tracing::debug!(total_hint, "opened dataset stream");
        let (record_tx, record_rx) = mpsc::channel(STREAM_CHANNEL_DEPTH);
        let (error_tx, error_rx) = mpsc::channel(1);
        tokio::spawn(stream::produce(response, record_tx, error_tx));

        Ok(ReadStream {
            total_hint,
            records: record_rx,
            errors: error_rx,
        })
    }
}
