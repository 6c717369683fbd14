//! HTTP sink for a remote LCA data service.
//!
//! | Method | Path                      | Body                              |
//! |--------|---------------------------|-----------------------------------|
//! | PUT    | `/databases/{key}/flows`  | `{ name, flows }`                 |
//! | GET    | `/methods/{key}`          | answers `{ factors, .. }` or 404  |
//! | PUT    | `/methods/{key}`          | `{ name, unit, factors }`         |
//!
//! `{key}` is [`super::storage_key`] of the database or method name.
//! Transport errors and 5xx answers are retried.

use std::time::Duration;

use reqwest::{Method, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};

use super::{storage_key, RecordSink};
use crate::config::Settings;
use crate::error::{SinkError, SinkResult};
use crate::models::{CharacterizationEntry, FlowRecord, MethodName};

/// Default number of attempts per request
const DEFAULT_MAX_RETRIES: u32 = 3;

/// Delay between retries in milliseconds
const RETRY_DELAY_MS: u64 = 1000;

#[derive(Debug, Deserialize)]
struct MethodBody {
    #[serde(default)]
    factors: Vec<CharacterizationEntry>,
}

/// Outcome of one attempt.
enum Attempt {
    Done(StatusCode, String),
    Retry(SinkError),
}

/// Sink writing to a remote service over JSON/HTTP.
#[derive(Debug, Clone)]
pub struct RemoteSink {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
    max_retries: u32,
    retry_delay: Duration,
}

impl RemoteSink {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: None,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay: Duration::from_millis(RETRY_DELAY_MS),
        }
    }

    /// Sink for `CFLOAD_REMOTE_URL`, if set.
    pub fn from_settings(settings: &Settings) -> Option<Self> {
        let sink = Self::new(settings.remote_url.as_deref()?);
        Some(match &settings.remote_token {
            Some(token) => sink.with_token(token),
            None => sink,
        })
    }

    /// Send `Authorization: Bearer <token>` with every request.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Attempts per request (at least one) and the pause between them.
    pub fn with_retries(mut self, max_retries: u32, delay: Duration) -> Self {
        self.max_retries = max_retries.max(1);
        self.retry_delay = delay;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Send a request, retrying transport errors and server errors.
    ///
    /// Returns the final status and body; 4xx answers are returned, not retried.
    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> SinkResult<(StatusCode, String)> {
        let url = format!("{}{}", self.base_url, path);
        let mut last_error = None;

        for attempt in 1..=self.max_retries {
            match self.try_send(method.clone(), &url, body).await {
                Attempt::Done(status, body) => return Ok((status, body)),
                Attempt::Retry(e) => {
                    tracing::warn!(
                        "{method} {url}: attempt {attempt}/{} failed: {e}",
                        self.max_retries
                    );
                    last_error = Some(e);
                    if attempt < self.max_retries {
                        tokio::time::sleep(self.retry_delay).await;
                    }
                }
            }
        }

        Err(last_error.unwrap_or_else(|| SinkError::Http("no attempt made".to_string())))
    }

    async fn try_send(&self, method: Method, url: &str, body: Option<&Value>) -> Attempt {
        let mut request = self.client.request(method, url);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => return Attempt::Retry(SinkError::Http(e.to_string())),
        };

        let status = response.status();
        let text = match response.text().await {
            Ok(text) => text,
            Err(e) => return Attempt::Retry(SinkError::Http(e.to_string())),
        };

        if status.is_server_error() {
            Attempt::Retry(SinkError::Remote {
                status: status.as_u16(),
                body: text,
            })
        } else {
            Attempt::Done(status, text)
        }
    }
}

fn expect_success(status: StatusCode, body: String) -> SinkResult<String> {
    if status.is_success() {
        Ok(body)
    } else {
        Err(SinkError::Remote {
            status: status.as_u16(),
            body,
        })
    }
}

impl RecordSink for RemoteSink {
    async fn write_database(&mut self, database: &str, flows: &[FlowRecord]) -> SinkResult<()> {
        let path = format!("/databases/{}/flows", storage_key(database));
        let body = json!({ "name": database, "flows": flows });

        let (status, text) = self.send(Method::PUT, &path, Some(&body)).await?;
        expect_success(status, text)?;
        tracing::debug!("wrote {} flows to remote database '{database}'", flows.len());
        Ok(())
    }

    async fn load_method(&mut self, method: &MethodName) -> SinkResult<Vec<CharacterizationEntry>> {
        let path = format!("/methods/{}", storage_key(&method.to_string()));

        let (status, text) = self.send(Method::GET, &path, None).await?;
        if status == StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        let text = expect_success(status, text)?;
        let body: MethodBody = serde_json::from_str(&text)?;
        Ok(body.factors)
    }

    async fn write_method(
        &mut self,
        method: &MethodName,
        factors: &[CharacterizationEntry],
        unit: Option<&str>,
    ) -> SinkResult<()> {
        let path = format!("/methods/{}", storage_key(&method.to_string()));
        let body = json!({ "name": method, "unit": unit, "factors": factors });

        let (status, text) = self.send(Method::PUT, &path, Some(&body)).await?;
        expect_success(status, text)?;
        Ok(())
    }
}
