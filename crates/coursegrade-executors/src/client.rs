//! HTTP client for a remote interpreter service.
//!
//! Services accept `POST {base_url}{path}` with `{"code": ...}` and answer
//! `{"output": ...}` or `{"error": ...}`.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::instrument;

use coursegrade_core::model::Language;
use coursegrade_core::traits::ExecutionOutcome;

use crate::error::ExecutionError;

/// Wait bound applied to every call unless configured otherwise.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(7);

#[derive(Serialize)]
struct ExecuteRequest<'a> {
    code: &'a str,
}

#[derive(Deserialize, Default)]
struct ExecuteResponse {
    #[serde(default)]
    output: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Client for one language's execution service.
#[derive(Debug, Clone)]
pub struct RemoteInterpreter {
    language: Language,
    base_url: String,
    path: &'static str,
    timeout: Duration,
    prepare: fn(&str) -> String,
    client: reqwest::Client,
}

impl RemoteInterpreter {
    pub fn new(language: Language, base_url: &str, path: &'static str) -> Self {
        Self {
            language,
            base_url: base_url.trim_end_matches('/').to_string(),
            path,
            timeout: DEFAULT_TIMEOUT,
            prepare: str::to_string,
            client: reqwest::Client::new(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Rewrite the source before it is sent.
    pub fn with_preprocessor(mut self, prepare: fn(&str) -> String) -> Self {
        self.prepare = prepare;
        self
    }

    pub fn language(&self) -> Language {
        self.language
    }

    pub fn endpoint(&self) -> String {
        format!("{}{}", self.base_url, self.path)
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run `source` once. The call is dropped when the wait bound expires.
    #[instrument(skip(self, source), fields(language = %self.language, bytes = source.len()))]
    pub async fn run(&self, source: &str) -> ExecutionOutcome {
        let code = (self.prepare)(source);
        let result = match tokio::time::timeout(self.timeout, self.send(&code)).await {
            Ok(result) => result,
            Err(_) => Err(ExecutionError::Timeout(self.timeout)),
        };

        match result {
            Ok(output) => {
                tracing::debug!(bytes = output.len(), "execution finished");
                ExecutionOutcome::Output(output)
            }
            Err(e) => {
                tracing::warn!(endpoint = %self.endpoint(), "{e}");
                e.into()
            }
        }
    }

    async fn send(&self, code: &str) -> Result<String, ExecutionError> {
        tracing::debug!(endpoint = %self.endpoint(), "sending source to execution service");

        let response = self
            .client
            .post(self.endpoint())
            .json(&ExecuteRequest { code })
            .send()
            .await
            .map_err(|e| ExecutionError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.ok();
            return Err(remote_failure(status, body.as_deref()));
        }
        let body = response
            .text()
            .await
            .map_err(|e| ExecutionError::Network(e.to_string()))?;

        let parsed: ExecuteResponse =
            serde_json::from_str(&body).map_err(|e| ExecutionError::Remote {
                status: None,
                message: format!("invalid response from execution service: {e}"),
            })?;

        match parsed.error {
            Some(message) => Err(ExecutionError::Remote {
                status: None,
                message,
            }),
            None => Ok(parsed.output.unwrap_or_default()),
        }
    }
}

/// Error for a non-success status. The body's `error` field is preferred
/// over the generic status message, including when no body could be read.
fn remote_failure(status: reqwest::StatusCode, body: Option<&str>) -> ExecutionError {
    let message = body
        .and_then(|b| serde_json::from_str::<ExecuteResponse>(b).ok())
        .and_then(|r| r.error)
        .unwrap_or_else(|| {
            format!(
                "execution service returned HTTP {} {}",
                status.as_u16(),
                status.canonical_reason().unwrap_or("")
            )
            .trim_end()
            .to_string()
        });
    ExecutionError::Remote {
        status: Some(status.as_u16()),
        message,
    }
}
