//! HTTP implementation of [`Fetcher`] on top of `reqwest`.

use std::path::Path;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use gadfly_api_types::{HealthStatus, SummarizeRequest, SummarizeResponse, UploadResponse};
use metrics::histogram;
use reqwest::{Client, RequestBuilder, Url, multipart};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::application::fetch::{FetchError, Fetcher, Mutation, MutationResponse, UploadFile};
use crate::cache::{CacheKey, Endpoint, Payload};
use crate::config::ApiSettings;

use super::error::InfraError;
use super::telemetry::METRIC_MUTATION_MS;

/// Client for the document-processing API.
#[derive(Clone, Debug)]
pub struct ApiClient {
    client: Client,
    base: Url,
    timeout: Duration,
}

impl ApiClient {
    pub fn new(settings: &ApiSettings) -> Result<Self, InfraError> {
        let client = Client::builder()
            .user_agent(Self::user_agent())
            .build()
            .map_err(|err| InfraError::http_client(err.to_string()))?;
        Ok(Self {
            client,
            base: directory_url(settings.base_url.clone()),
            timeout: settings.timeout,
        })
    }

    pub fn user_agent() -> &'static str {
        concat!("gadfly/", env!("CARGO_PKG_VERSION"))
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    pub async fn health(&self) -> Result<HealthStatus, FetchError> {
        let url = self.url("api/health", std::iter::empty())?;
        self.send(self.client.get(url)).await
    }

    fn url<'a>(
        &self,
        path: &str,
        query: impl Iterator<Item = (&'a str, &'a str)>,
    ) -> Result<Url, FetchError> {
        let mut url = self
            .base
            .join(path)
            .map_err(|err| FetchError::Transport(format!("invalid request url: {err}")))?;
        let mut query = query.peekable();
        if query.peek().is_some() {
            url.query_pairs_mut().extend_pairs(query);
        }
        Ok(url)
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, FetchError> {
        let started_at = Instant::now();
        let response = request
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|err| self.transport_error(err))?;

        let status = response.status();
        let url = response.url().clone();
        let body = response
            .bytes()
            .await
            .map_err(|err| self.transport_error(err))?;
        debug!(
            url = %url,
            status = status.as_u16(),
            bytes = body.len(),
            elapsed_ms = started_at.elapsed().as_millis() as u64,
            "API response received"
        );

        if !status.is_success() {
            return Err(FetchError::server(
                status.as_u16(),
                String::from_utf8_lossy(&body).into_owned(),
            ));
        }
        serde_json::from_slice(&body).map_err(|err| FetchError::malformed(err.to_string()))
    }

    fn transport_error(&self, err: reqwest::Error) -> FetchError {
        if err.is_timeout() {
            FetchError::Timeout(self.timeout)
        } else {
            FetchError::Transport(err.to_string())
        }
    }

    async fn summarize(&self, meeting_id: &str, force: bool) -> Result<SummarizeResponse, FetchError> {
        let url = self.url("api/summarize", std::iter::empty())?;
        let body = SummarizeRequest {
            meeting_id: meeting_id.to_string(),
            force,
        };
        self.send(self.client.post(url).json(&body)).await
    }

    async fn upload(&self, file: &UploadFile) -> Result<UploadResponse, FetchError> {
        let url = self.url("api/upload", std::iter::empty())?;
        let mime = mime_guess::from_path(Path::new(&file.file_name)).first_or_octet_stream();
        let part = multipart::Part::bytes(file.contents.clone())
            .file_name(file.file_name.clone())
            .mime_str(mime.essence_str())
            .map_err(|err| FetchError::Transport(format!("invalid upload part: {err}")))?;
        let form = multipart::Form::new()
            .part("file", part)
            .text("jurisdiction", file.jurisdiction.clone());
        self.send(self.client.post(url).multipart(form)).await
    }
}

#[async_trait]
impl Fetcher for ApiClient {
    async fn fetch(&self, key: &CacheKey) -> Result<Payload, FetchError> {
        let url = self.url(key.endpoint().path(), key.params())?;
        let request = self.client.get(url);
        Ok(match key.endpoint() {
            Endpoint::Jurisdictions => Payload::Jurisdictions(self.send(request).await?),
            Endpoint::Meetings => Payload::Meetings(self.send(request).await?),
            Endpoint::Summaries => Payload::Summaries(self.send(request).await?),
        })
    }

    async fn execute(&self, mutation: &Mutation) -> Result<MutationResponse, FetchError> {
        let started_at = Instant::now();
        let result = match mutation {
            Mutation::Summarize { meeting_id, force } => self
                .summarize(meeting_id, *force)
                .await
                .map(MutationResponse::Summarized),
            Mutation::Upload(file) => self.upload(file).await.map(MutationResponse::Uploaded),
        };
        histogram!(METRIC_MUTATION_MS, "mutation" => mutation.name())
            .record(started_at.elapsed().as_secs_f64() * 1000.0);
        result
    }
}

/// Ensure the URL path ends with `/` so relative joins keep any path prefix.
fn directory_url(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}
