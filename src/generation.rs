use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::GenerationConfig;
use crate::error::{AnalysisError, GenerationError};

/// Backend that turns prompt text into response text. Each call is independent.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, GenerationError>;
}

/// Bounds a generator call with a timeout and classifies empty answers.
#[derive(Clone)]
pub struct SqlGenerationAdapter {
    generator: Arc<dyn TextGenerator>,
    timeout: Duration,
}

impl SqlGenerationAdapter {
    pub fn new(generator: Arc<dyn TextGenerator>, timeout: Duration) -> Self {
        Self { generator, timeout }
    }

    pub async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        let start_time = Instant::now();

        let text = match tokio::time::timeout(self.timeout, self.generator.complete(prompt)).await
        {
            Ok(result) => result?,
            Err(_) => {
                warn!("SQL generation timed out after {:?}", self.timeout);
                return Err(GenerationError::GenerationFailed {
                    message: format!("no response within {}s", self.timeout.as_secs_f64()),
                });
            }
        };

        if text.trim().is_empty() {
            return Err(GenerationError::EmptyGeneration);
        }

        info!(
            "SQL generation returned {} characters in {}ms",
            text.len(),
            start_time.elapsed().as_millis()
        );
        Ok(text)
    }
}

#[derive(Debug, Serialize)]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    parts: Vec<RequestPart<'a>>,
}

#[derive(Debug, Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
}

impl GenerateContentResponse {
    fn text(self) -> String {
        self.candidates
            .into_iter()
            .next()
            .and_then(|candidate| candidate.content)
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .filter_map(|part| part.text)
                    .collect::<String>()
            })
            .unwrap_or_default()
    }
}

/// Gemini `generateContent` client. Credentials and endpoint come from `GenerationConfig`.
pub struct GeminiClient {
    http: reqwest::Client,
    config: GenerationConfig,
}

impl GeminiClient {
    pub fn new(config: GenerationConfig) -> Result<Self, AnalysisError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| AnalysisError::ConfigError {
                message: format!("Failed to build HTTP client: {}", e),
            })?;

        Ok(Self { http, config })
    }

    fn request_url(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.config.endpoint.as_str().trim_end_matches('/'),
            self.config.model
        )
    }
}

fn failed(message: impl Into<String>) -> GenerationError {
    GenerationError::GenerationFailed {
        message: message.into(),
    }
}

#[async_trait]
impl TextGenerator for GeminiClient {
    async fn complete(&self, prompt: &str) -> Result<String, GenerationError> {
        info!("Requesting SQL from model {}", self.config.model);

        let body = GenerateContentRequest {
            contents: vec![Content {
                parts: vec![RequestPart { text: prompt }],
            }],
        };

        let response = self
            .http
            .post(self.request_url())
            .header("x-goog-api-key", &self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| failed(format!("request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(failed(format!("service returned {}: {}", status, detail)));
        }

        let payload: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| failed(format!("malformed response: {}", e)))?;

        Ok(payload.text())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    struct Fixed(&'static str);

    #[async_trait]
    impl TextGenerator for Fixed {
        async fn complete(&self, _prompt: &str) -> Result<String, GenerationError> {
            Ok(self.0.to_string())
        }
    }

    struct Stalled(AtomicUsize);

    #[async_trait]
    impl TextGenerator for Stalled {
        async fn complete(&self, _prompt: &str) -> Result<String, GenerationError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok("SELECT 1".to_string())
        }
    }

    #[tokio::test]
    async fn passes_text_through() {
        let adapter = SqlGenerationAdapter::new(Arc::new(Fixed("SELECT 1")), Duration::from_secs(1));
        assert_eq!(adapter.generate("p").await.unwrap(), "SELECT 1");
    }

    #[tokio::test]
    async fn whitespace_response_is_empty_generation() {
        let adapter = SqlGenerationAdapter::new(Arc::new(Fixed(" \n\t ")), Duration::from_secs(1));
        assert!(matches!(
            adapter.generate("p").await,
            Err(GenerationError::EmptyGeneration)
        ));
    }

    #[tokio::test]
    async fn stalled_backend_times_out_as_generation_failed() {
        let backend = Arc::new(Stalled(AtomicUsize::new(0)));
        let adapter = SqlGenerationAdapter::new(backend.clone(), Duration::from_millis(50));

        let result = adapter.generate("p").await;

        assert!(matches!(result, Err(GenerationError::GenerationFailed { .. })));
        assert_eq!(backend.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn joins_parts_of_first_candidate() {
        let payload: GenerateContentResponse = serde_json::from_str(
            r#"{"candidates":[{"content":{"parts":[{"text":"```sql\nSELECT"},{"text":" 1\n```"}],"role":"model"}},
                {"content":{"parts":[{"text":"ignored"}]}}]}"#,
        )
        .unwrap();
        assert_eq!(payload.text(), "```sql\nSELECT 1\n```");
    }

    #[test]
    fn missing_candidates_yield_empty_text() {
        let payload: GenerateContentResponse =
            serde_json::from_str(r#"{"promptFeedback":{"blockReason":"SAFETY"}}"#).unwrap();
        assert_eq!(payload.text(), "");
    }

    #[test]
    fn builds_generate_content_url() {
        let client = GeminiClient::new(GenerationConfig {
            api_key: "k".to_string(),
            endpoint: url::Url::parse("https://generativelanguage.googleapis.com/v1beta/").unwrap(),
            model: "gemini-2.5-flash".to_string(),
            timeout: Duration::from_secs(5),
        })
        .unwrap();
        assert_eq!(
            client.request_url(),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.5-flash:generateContent"
        );
    }
}
