//! OpenRouter-compatible vision extractor.
//!
//! Sends the screenshot as a base64 data URL to an OpenAI-style
//! `/chat/completions` endpoint and parses the JSON document out of the
//! model's reply.

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use chrono::Utc;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::path::Path;
use std::sync::LazyLock;
use tracing::{debug, warn};

use super::VisionExtractor;
use crate::config::{ConfigValidationError, VisionConfig};
use crate::error::ExtractionError;

/// Prompt sent with every image.
pub const EXTRACTION_PROMPT: &str = "Extract all content from this screenshot with perfect accuracy.
Return ONLY a JSON object with these exact fields:
- extracted_text: All text exactly as seen
- layout_description: Spatial arrangement of elements
- ui_components: List of UI elements identified
- content_type: Type of content (document/dashboard/app/website/code)
- key_points: List of important information
- full_summary: Concise summary preserving all context

No other text, only JSON.";

/// Confidence recorded for a reply that parsed as JSON.
const PARSED_CONFIDENCE: f64 = 0.95;
/// Confidence recorded when the reply had to be taken as raw text.
const FALLBACK_CONFIDENCE: f64 = 0.5;
/// Characters of a non-JSON reply kept as `extracted_text`.
const FALLBACK_TEXT_CHARS: usize = 500;

const TITLE: &str = "Visual Memory Engine";

static JSON_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```json\s*(.*?)\s*```").expect("valid json fence pattern"));

static ANY_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```\s*(.*?)\s*```").expect("valid fence pattern"));

static OUTER_BRACES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\{.*\}").expect("valid brace pattern"));

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
}

#[derive(Serialize)]
struct ChatMessage {
    role: &'static str,
    content: Vec<ContentPart>,
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ReplyMessage,
}

#[derive(Deserialize)]
struct ReplyMessage {
    #[serde(default)]
    content: Option<String>,
}

/// HTTP extractor for OpenRouter and other OpenAI-compatible APIs.
pub struct OpenRouterExtractor {
    base_url: String,
    model: String,
    fallback_model: Option<String>,
    api_key: String,
    http_client: reqwest::Client,
}

impl OpenRouterExtractor {
    /// Build an extractor; fails without an API key.
    pub fn new(config: &VisionConfig) -> Result<Self, ConfigValidationError> {
        let api_key = config
            .api_key
            .clone()
            .filter(|key| !key.trim().is_empty())
            .ok_or(ConfigValidationError::MissingApiKey)?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            fallback_model: config.fallback_model.clone(),
            api_key,
            http_client: reqwest::Client::new(),
        })
    }

    fn build_request_body<'a>(model: &'a str, data_url: String) -> ChatRequest<'a> {
        ChatRequest {
            model,
            messages: vec![ChatMessage {
                role: "user",
                content: vec![
                    ContentPart::Text {
                        text: EXTRACTION_PROMPT.to_string(),
                    },
                    ContentPart::ImageUrl {
                        image_url: ImageUrl { url: data_url },
                    },
                ],
            }],
        }
    }

    async fn request(&self, model: &str, data_url: String) -> Result<Value, ExtractionError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = Self::build_request_body(model, data_url);

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(&self.api_key)
            .header("X-Title", TITLE)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ExtractionError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let reply: ChatResponse = response.json().await?;
        let content = reply
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| ExtractionError::EmptyResponse {
                model: model.to_string(),
            })?;

        debug!(model, reply_chars = content.len(), "Received extraction reply");
        Ok(parse_extraction(&content))
    }
}

#[async_trait]
impl VisionExtractor for OpenRouterExtractor {
    async fn extract(&self, image_path: &Path) -> Result<Value, ExtractionError> {
        let bytes = tokio::fs::read(image_path).await?;
        let data_url = format!("data:{};base64,{}", mime_type(image_path), STANDARD.encode(&bytes));

        match self.request(&self.model, data_url.clone()).await {
            Ok(document) => Ok(document),
            Err(error) => match &self.fallback_model {
                Some(fallback) => {
                    warn!(
                        model = %self.model,
                        fallback = %fallback,
                        error = %error,
                        "Primary model failed, trying fallback"
                    );
                    self.request(fallback, data_url).await
                }
                None => Err(error),
            },
        }
    }

    fn name(&self) -> &str {
        &self.model
    }
}

fn mime_type(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match extension.as_deref() {
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("bmp") => "image/bmp",
        _ => "image/jpeg",
    }
}

/// Turn a model reply into a normalised structured document.
///
/// Tries the whole reply as JSON, then a ```` ```json ```` block, then any
/// fenced block, then the outermost braces. A reply with no JSON object in it
/// is kept as raw text with low confidence.
pub fn parse_extraction(reply: &str) -> Value {
    match find_json_object(reply) {
        Some(data) => normalise(&data),
        None => {
            warn!("Extraction reply contained no JSON object, keeping raw text");
            let text: String = reply.chars().take(FALLBACK_TEXT_CHARS).collect();
            json!({
                "extracted_text": text,
                "layout_description": "",
                "ui_components": [],
                "content_type": "unknown",
                "key_points": [],
                "full_summary": "Extracted via raw-text fallback",
                "confidence": FALLBACK_CONFIDENCE,
                "_extracted_at": Utc::now().to_rfc3339(),
            })
        }
    }
}

fn find_json_object(reply: &str) -> Option<Map<String, Value>> {
    if let Ok(Value::Object(map)) = serde_json::from_str(reply.trim()) {
        return Some(map);
    }

    let patterns: [(&Regex, usize); 3] = [(&*JSON_FENCE, 1), (&*ANY_FENCE, 1), (&*OUTER_BRACES, 0)];
    for (regex, group) in patterns {
        let candidate = regex
            .captures(reply)
            .and_then(|captures| captures.get(group))
            .map(|m| m.as_str().trim());
        if let Some(Ok(Value::Object(map))) = candidate.map(serde_json::from_str::<Value>) {
            return Some(map);
        }
    }
    None
}

fn normalise(data: &Map<String, Value>) -> Value {
    let text = |key: &str| data.get(key).and_then(Value::as_str).unwrap_or("").to_string();
    let list = |key: &str| match data.get(key) {
        Some(Value::Array(items)) => Value::Array(items.clone()),
        _ => Value::Array(Vec::new()),
    };

    json!({
        "extracted_text": text("extracted_text"),
        "layout_description": text("layout_description"),
        "ui_components": list("ui_components"),
        "content_type": data.get("content_type").and_then(Value::as_str).unwrap_or("unknown"),
        "key_points": list("key_points"),
        "full_summary": text("full_summary"),
        "confidence": PARSED_CONFIDENCE,
        "_extracted_at": Utc::now().to_rfc3339(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    const DOCUMENT: &str = r#"{"extracted_text": "Status: Green", "layout_description": "Single column", "ui_components": ["button"], "content_type": "dashboard", "key_points": ["all good"], "full_summary": "A status dashboard"}"#;

    #[test]
    fn test_parse_plain_json() {
        let doc = parse_extraction(DOCUMENT);
        assert_eq!(doc["extracted_text"], "Status: Green");
        assert_eq!(doc["ui_components"], json!(["button"]));
        assert_eq!(doc["confidence"], PARSED_CONFIDENCE);
        assert!(doc["_extracted_at"].is_string());
    }

    #[test]
    fn test_parse_fenced_json() {
        let reply = format!("Here you go:\n```json\n{}\n```\nAnything else?", DOCUMENT);
        assert_eq!(parse_extraction(&reply)["content_type"], "dashboard");

        let reply = format!("```\n{}\n```", DOCUMENT);
        assert_eq!(parse_extraction(&reply)["full_summary"], "A status dashboard");
    }

    #[test]
    fn test_reply_patterns() {
        assert!(JSON_FENCE.is_match("```json\n{}\n```"));
        assert!(!JSON_FENCE.is_match("```\n{}\n```"));
        assert!(ANY_FENCE.is_match("```\n{}\n```"));
        assert_eq!(
            OUTER_BRACES.find("a {\"x\": {\"y\": 1}} b").map(|m| m.as_str()),
            Some("{\"x\": {\"y\": 1}}")
        );
    }

    #[test]
    fn test_parse_braces_in_prose() {
        let reply = format!("The result is {} as requested.", DOCUMENT);
        assert_eq!(parse_extraction(&reply)["key_points"], json!(["all good"]));
    }

    #[test]
    fn test_missing_fields_get_defaults() {
        let doc = parse_extraction(r#"{"extracted_text": "hi", "ui_components": "not a list"}"#);
        assert_eq!(doc["layout_description"], "");
        assert_eq!(doc["ui_components"], json!([]));
        assert_eq!(doc["key_points"], json!([]));
        assert_eq!(doc["content_type"], "unknown");
    }

    #[test]
    fn test_unparseable_reply_falls_back_to_text() {
        let reply = "no json here ".repeat(60);
        let doc = parse_extraction(&reply);
        assert_eq!(doc["confidence"], FALLBACK_CONFIDENCE);
        assert_eq!(
            doc["extracted_text"].as_str().unwrap().chars().count(),
            FALLBACK_TEXT_CHARS
        );
    }

    #[test]
    fn test_request_body_shape() {
        let body = OpenRouterExtractor::build_request_body("m", "data:image/png;base64,AAAA".into());
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["model"], "m");
        let content = &json["messages"][0]["content"];
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(content[0]["type"], "text");
        assert_eq!(content[1]["type"], "image_url");
        assert_eq!(content[1]["image_url"]["url"], "data:image/png;base64,AAAA");
    }

    #[test]
    fn test_requires_api_key() {
        assert!(matches!(
            OpenRouterExtractor::new(&VisionConfig::default()),
            Err(ConfigValidationError::MissingApiKey)
        ));
        let config = VisionConfig {
            api_key: Some("sk-test".into()),
            base_url: "http://localhost:9/".into(),
            ..Default::default()
        };
        let extractor = OpenRouterExtractor::new(&config).unwrap();
        assert_eq!(extractor.base_url, "http://localhost:9");
    }

    #[test]
    fn test_mime_type() {
        assert_eq!(mime_type(Path::new("a.PNG")), "image/png");
        assert_eq!(mime_type(Path::new("a.jpg")), "image/jpeg");
        assert_eq!(mime_type(Path::new("noext")), "image/jpeg");
    }

    async fn read_request(stream: &mut TcpStream) -> String {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 8192];
        loop {
            let n = stream.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
            if let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                let headers = String::from_utf8_lossy(&buf[..end]).to_lowercase();
                let length = headers
                    .lines()
                    .find_map(|line| line.strip_prefix("content-length:"))
                    .and_then(|value| value.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                if buf.len() >= end + 4 + length {
                    break;
                }
            }
        }
        String::from_utf8_lossy(&buf).to_string()
    }

    /// Serves chat completions; requests naming `failing_model` get a 503.
    async fn serve(failing_model: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();

        tokio::spawn(async move {
            loop {
                let Ok((mut stream, _)) = listener.accept().await else {
                    return;
                };
                let request = read_request(&mut stream).await;
                assert!(request.starts_with("POST /chat/completions"));
                assert!(request.to_lowercase().contains("authorization: bearer sk-test"));

                let (status, body) = if request.contains(failing_model) {
                    ("503 Service Unavailable", "overloaded".to_string())
                } else {
                    let reply = format!("```json\n{}\n```", DOCUMENT);
                    ("200 OK", json!({"choices": [{"message": {"content": reply}}]}).to_string())
                };
                let response = format!(
                    "HTTP/1.1 {}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                    status,
                    body.len(),
                    body
                );
                stream.write_all(response.as_bytes()).await.unwrap();
                stream.shutdown().await.ok();
            }
        });

        format!("http://{}", address)
    }

    #[tokio::test]
    async fn test_extract_over_http_with_fallback() {
        let base_url = serve("primary-model").await;
        let dir = tempfile::tempdir().unwrap();
        let image = dir.path().join("shot.png");
        std::fs::write(&image, b"fake image bytes").unwrap();

        let config = VisionConfig {
            api_key: Some("sk-test".into()),
            base_url: base_url.clone(),
            model: "primary-model".into(),
            fallback_model: Some("backup-model".into()),
            timeout_secs: 5,
        };
        let doc = OpenRouterExtractor::new(&config).unwrap().extract(&image).await.unwrap();
        assert_eq!(doc["extracted_text"], "Status: Green");

        let config = VisionConfig {
            fallback_model: None,
            ..config
        };
        let err = OpenRouterExtractor::new(&config).unwrap().extract(&image).await.unwrap_err();
        assert!(matches!(err, ExtractionError::Api { status: 503, .. }));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_missing_image_is_io_error() {
        let config = VisionConfig {
            api_key: Some("sk-test".into()),
            ..Default::default()
        };
        let err = OpenRouterExtractor::new(&config)
            .unwrap()
            .extract(Path::new("/nonexistent/shot.png"))
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractionError::Io(_)));
    }
}
