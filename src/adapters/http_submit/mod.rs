// HTTP submit adapter - Triggers transcodes by POSTing rendered configurations

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info};

use crate::domain::errors::*;
use crate::ports::*;

/// Default request timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Longest response excerpt carried into error messages
const BODY_EXCERPT: usize = 200;

/// Submits configurations to the transcoding service as JSON
pub struct HttpSubmitAdapter {
    client: reqwest::Client,
    url: String,
    /// Dotted path of the submission id inside the response body
    id_field: Option<String>,
}

impl HttpSubmitAdapter {
    pub fn new(
        url: impl Into<String>,
        timeout: Duration,
        id_field: Option<String>,
    ) -> Result<Self, DomainError> {
        let url = url.into();
        reqwest::Url::parse(&url)
            .map_err(|e| DomainError::Configuration(format!("Invalid api_url '{}': {}", url, e)))?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("transcode-tune/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| DomainError::Configuration(format!("HTTP client setup failed: {}", e)))?;
        Ok(Self {
            client,
            url,
            id_field,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

/// Look up a dotted field and render it as an id; strings and numbers are accepted
pub fn extract_id(body: &Value, field: &str) -> Option<String> {
    let mut current = body;
    for segment in field.split('.') {
        current = current.as_object()?.get(segment)?;
    }
    match current {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn excerpt(body: &str) -> String {
    let trimmed = body.trim();
    match trimmed.char_indices().nth(BODY_EXCERPT) {
        Some((cut, _)) => format!("{}...", &trimmed[..cut]),
        None => trimmed.to_string(),
    }
}

#[async_trait]
impl SubmitPort for HttpSubmitAdapter {
    async fn submit(&self, request: &SubmissionRequest) -> Result<String, DomainError> {
        debug!(iteration = request.index, "POST {}", self.url);
        let response = self
            .client
            .post(&self.url)
            .json(&request.configuration)
            .send()
            .await
            .map_err(|e| DomainError::Submission(format!("POST {} failed: {}", self.url, e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| DomainError::Submission(format!("Unable to read response: {}", e)))?;
        if !status.is_success() {
            return Err(DomainError::Submission(format!(
                "Service answered HTTP {}: {}",
                status.as_u16(),
                excerpt(&body)
            )));
        }

        let id = match &self.id_field {
            Some(field) => {
                let parsed: Value = serde_json::from_str(&body).map_err(|e| {
                    DomainError::Submission(format!(
                        "Response is not JSON ({}): {}",
                        e,
                        excerpt(&body)
                    ))
                })?;
                extract_id(&parsed, field).ok_or_else(|| {
                    DomainError::Submission(format!(
                        "Response has no submission id at '{}': {}",
                        field,
                        excerpt(&body)
                    ))
                })?
            }
            None => format!("{}-{:03}", request.run_id, request.index),
        };

        info!(iteration = request.index, submission_id = %id, "Transcode submitted");
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extract_id_from_nested_field() {
        let body = json!({"data": {"job": {"id": "abc-123"}}});
        assert_eq!(extract_id(&body, "data.job.id"), Some("abc-123".to_string()));
    }

    #[test]
    fn test_extract_numeric_id() {
        assert_eq!(extract_id(&json!({"task_id": 42}), "task_id"), Some("42".to_string()));
    }

    #[test]
    fn test_extract_id_rejects_missing_or_blank() {
        assert_eq!(extract_id(&json!({"id": ""}), "id"), None);
        assert_eq!(extract_id(&json!({"id": {"nested": 1}}), "id"), None);
        assert_eq!(extract_id(&json!({"other": "x"}), "id"), None);
        assert_eq!(extract_id(&json!([1, 2]), "id"), None);
    }

    #[test]
    fn test_invalid_url_is_configuration_error() {
        let err = HttpSubmitAdapter::new("not a url", DEFAULT_TIMEOUT, None).err().unwrap();
        assert!(matches!(err, DomainError::Configuration(_)));
    }

    #[test]
    fn test_excerpt_truncates() {
        let long = "x".repeat(500);
        assert_eq!(excerpt(&long).len(), BODY_EXCERPT + 3);
        assert_eq!(excerpt("  short  "), "short");
    }
}
