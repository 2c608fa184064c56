//! Direct variant: one Messages API request per image.

use std::path::Path;
use std::time::Instant;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::{json, Value};
use tracing::{debug, warn};

use super::prompt::direct_prompt;
use super::{ClassificationOutcome, ClassificationRequest, ClassifierAdapter};
use crate::config::DirectConfig;
use crate::domain::{FailureKind, ItemDiagnostics, Variant};
use crate::error::{BenchError, Result};
use crate::extract::extract_prediction;

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Media type for an image path, by extension. Unknown extensions default to JPEG.
pub fn media_type(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        _ => "image/jpeg",
    }
}

/// Single-shot multimodal classifier with no auxiliary knowledge.
pub struct DirectClassifier {
    config: DirectConfig,
    api_key: String,
    http_client: reqwest::Client,
}

impl DirectClassifier {
    /// Build the classifier; the API key must be configured.
    pub fn new(config: DirectConfig) -> Result<Self> {
        let api_key = config.api_key.clone().ok_or_else(|| {
            BenchError::InvalidConfig("ANTHROPIC_API_KEY is not set".to_string())
        })?;
        let http_client = reqwest::Client::builder()
            .user_agent(concat!("classbench/", env!("CARGO_PKG_VERSION")))
            .timeout(config.timeout())
            .build()
            .map_err(|e| BenchError::InvalidConfig(format!("http client: {e}")))?;

        Ok(Self {
            config,
            api_key,
            http_client,
        })
    }

    fn request_body(&self, image_b64: String, media_type: &str, classes: &[String]) -> Value {
        json!({
            "model": self.config.model,
            "max_tokens": self.config.max_tokens,
            "messages": [
                {
                    "role": "user",
                    "content": [
                        {
                            "type": "image",
                            "source": {
                                "type": "base64",
                                "media_type": media_type,
                                "data": image_b64,
                            }
                        },
                        {
                            "type": "text",
                            "text": direct_prompt(classes),
                        }
                    ]
                }
            ]
        })
    }
}

fn transport_failure(err: &reqwest::Error) -> FailureKind {
    if err.is_timeout() {
        FailureKind::Timeout
    } else {
        FailureKind::TransportError
    }
}

/// First text block of a Messages API response.
fn response_text(body: &Value) -> Option<&str> {
    body.get("content")?
        .as_array()?
        .iter()
        .find(|block| block.get("type").and_then(Value::as_str) == Some("text"))?
        .get("text")?
        .as_str()
}

#[async_trait]
impl ClassifierAdapter for DirectClassifier {
    fn variant(&self) -> Variant {
        Variant::Direct
    }

    async fn classify(&self, request: &ClassificationRequest<'_>) -> ClassificationOutcome {
        let start = Instant::now();
        let elapsed = |start: Instant| start.elapsed().as_millis() as u64;

        let image = match tokio::fs::read(request.image_path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(image = %request.image_path.display(), error = %e, "Failed to read image");
                return ClassificationOutcome::failed(
                    FailureKind::TransportError,
                    format!("read {}: {e}", request.image_path.display()),
                    elapsed(start),
                );
            }
        };
        let body = self.request_body(
            STANDARD.encode(image),
            media_type(request.image_path),
            request.classes,
        );

        let response = match self
            .http_client
            .post(format!("{}/messages", self.config.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "Classification request failed");
                return ClassificationOutcome::failed(
                    transport_failure(&e),
                    e.to_string(),
                    elapsed(start),
                );
            }
        };

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            warn!(status = %status, "Classification service returned an error status");
            return ClassificationOutcome::failed(
                FailureKind::TransportError,
                format!("status {status}: {detail}"),
                elapsed(start),
            );
        }

        let payload: Value = match response.json().await {
            Ok(v) => v,
            Err(e) => {
                let kind = if e.is_timeout() {
                    FailureKind::Timeout
                } else {
                    FailureKind::MalformedOutput
                };
                return ClassificationOutcome::failed(kind, e.to_string(), elapsed(start));
            }
        };

        let Some(text) = response_text(&payload) else {
            return ClassificationOutcome::failed(
                FailureKind::MalformedOutput,
                "response has no text content block",
                elapsed(start),
            );
        };
        let prediction = extract_prediction(text, None);
        debug!(prediction = %prediction, "Direct classification finished");

        let usage = &payload["usage"];
        ClassificationOutcome {
            prediction,
            raw_text: text.to_string(),
            structured: None,
            diagnostics: ItemDiagnostics {
                latency_ms: Some(elapsed(start)),
                input_tokens: usage["input_tokens"].as_u64(),
                output_tokens: usage["output_tokens"].as_u64(),
                reasoning: text.to_string(),
                ..ItemDiagnostics::default()
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Prediction;

    fn classes() -> Vec<String> {
        vec!["Anthracnose".to_string(), "Die_Back".to_string()]
    }

    fn config(base_url: String) -> DirectConfig {
        DirectConfig {
            api_key: Some("sk-test".to_string()),
            base_url,
            timeout_secs: 5,
            ..DirectConfig::default()
        }
    }

    fn image() -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("item_001.jpg");
        std::fs::write(&path, b"not really a jpeg").expect("write image");
        (dir, path)
    }

    #[test]
    fn media_types_by_extension() {
        assert_eq!(media_type(Path::new("a.PNG")), "image/png");
        assert_eq!(media_type(Path::new("a.jpeg")), "image/jpeg");
        assert_eq!(media_type(Path::new("a.webp")), "image/webp");
        assert_eq!(media_type(Path::new("a.bmp")), "image/jpeg");
    }

    #[test]
    fn missing_api_key_is_rejected() {
        let err = DirectClassifier::new(DirectConfig::default()).err().expect("error");
        assert!(err.to_string().contains("ANTHROPIC_API_KEY"));
    }

    #[tokio::test]
    async fn parses_prediction_from_response() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/messages")
            .match_header("x-api-key", "sk-test")
            .match_header("anthropic-version", ANTHROPIC_VERSION)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "content": [{"type": "text", "text": "{\"prediction\": \"Die_Back\"}"}],
                    "usage": {"input_tokens": 1200, "output_tokens": 9}
                })
                .to_string(),
            )
            .create_async()
            .await;

        let (_dir, path) = image();
        let classifier = DirectClassifier::new(config(server.url())).expect("classifier");
        let classes = classes();
        let outcome = classifier
            .classify(&ClassificationRequest {
                image_path: &path,
                classes: &classes,
                description: "Mango Leaf Diseases",
                knowledge_path: None,
            })
            .await;

        mock.assert_async().await;
        assert_eq!(outcome.prediction, Prediction::label("Die_Back"));
        assert_eq!(outcome.diagnostics.input_tokens, Some(1200));
        assert_eq!(outcome.diagnostics.output_tokens, Some(9));
        assert!(outcome.diagnostics.latency_ms.is_some());
    }

    #[tokio::test]
    async fn prose_without_json_is_unknown() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/messages")
            .with_status(200)
            .with_body(json!({"content": [{"type": "text", "text": "Probably Die_Back."}]}).to_string())
            .create_async()
            .await;

        let (_dir, path) = image();
        let classifier = DirectClassifier::new(config(server.url())).expect("classifier");
        let classes = classes();
        let outcome = classifier
            .classify(&ClassificationRequest {
                image_path: &path,
                classes: &classes,
                description: "d",
                knowledge_path: None,
            })
            .await;
        assert_eq!(outcome.prediction, Prediction::Failure(FailureKind::Unknown));
        assert_eq!(outcome.raw_text, "Probably Die_Back.");
    }

    #[tokio::test]
    async fn error_status_fails_closed() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/messages")
            .with_status(529)
            .with_body("overloaded")
            .create_async()
            .await;

        let (_dir, path) = image();
        let classifier = DirectClassifier::new(config(server.url())).expect("classifier");
        let classes = classes();
        let outcome = classifier
            .classify(&ClassificationRequest {
                image_path: &path,
                classes: &classes,
                description: "d",
                knowledge_path: None,
            })
            .await;
        assert_eq!(
            outcome.prediction,
            Prediction::Failure(FailureKind::TransportError)
        );
        assert_eq!(outcome.prediction.as_str(), "ERROR");
        assert!(outcome.diagnostics.error.unwrap().contains("overloaded"));
    }

    #[tokio::test]
    async fn undecodable_body_is_malformed() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/messages")
            .with_status(200)
            .with_body("<html>gateway</html>")
            .create_async()
            .await;

        let (_dir, path) = image();
        let classifier = DirectClassifier::new(config(server.url())).expect("classifier");
        let classes = classes();
        let outcome = classifier
            .classify(&ClassificationRequest {
                image_path: &path,
                classes: &classes,
                description: "d",
                knowledge_path: None,
            })
            .await;
        assert_eq!(
            outcome.prediction,
            Prediction::Failure(FailureKind::MalformedOutput)
        );
    }

    #[tokio::test]
    async fn unreachable_service_is_transport_error() {
        let (_dir, path) = image();
        let classifier =
            DirectClassifier::new(config("http://127.0.0.1:1".to_string())).expect("classifier");
        let classes = classes();
        let outcome = classifier
            .classify(&ClassificationRequest {
                image_path: &path,
                classes: &classes,
                description: "d",
                knowledge_path: None,
            })
            .await;
        assert_eq!(
            outcome.prediction,
            Prediction::Failure(FailureKind::TransportError)
        );
    }

    #[tokio::test]
    async fn unreadable_image_fails_closed() {
        let classifier =
            DirectClassifier::new(config("http://127.0.0.1:1".to_string())).expect("classifier");
        let classes = classes();
        let outcome = classifier
            .classify(&ClassificationRequest {
                image_path: Path::new("/nonexistent/item_999.jpg"),
                classes: &classes,
                description: "d",
                knowledge_path: None,
            })
            .await;
        assert_eq!(outcome.prediction.as_str(), "ERROR");
    }
}
