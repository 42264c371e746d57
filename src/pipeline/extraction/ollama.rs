//! Local Ollama vision client over `/api/chat`.
//!
//! Chat-template vision models (MedGemma, LLaVA, Gemma) expect images on a
//! user message rather than through `/api/generate`.

use serde::{Deserialize, Serialize};

use super::request::ExtractionRequest;
use super::vision::{check_status, VisionClient, VisionError};

pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

/// Upper bound on reply tokens; a full JSON object fits comfortably.
const MAX_REPLY_TOKENS: i32 = 1024;

pub struct OllamaVisionClient {
    base_url: String,
    model: String,
    client: reqwest::blocking::Client,
}

impl OllamaVisionClient {
    pub fn new(base_url: &str, model: &str) -> Result<Self, VisionError> {
        let client = reqwest::blocking::Client::builder()
            .build()
            .map_err(|e| VisionError::Transport(e.to_string()))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            client,
        })
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    stream: bool,
    options: GenerationOptions,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
    /// Base64-encoded images, attachment order.
    images: Vec<&'a str>,
}

#[derive(Debug, Serialize)]
struct GenerationOptions {
    temperature: f32,
    num_predict: i32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    message: Option<ChatReply>,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: String,
}

fn build_body<'a>(model: &'a str, request: &'a ExtractionRequest) -> ChatRequest<'a> {
    ChatRequest {
        model,
        messages: vec![ChatMessage {
            role: "user",
            content: &request.instruction,
            images: request.images.iter().map(|i| i.data.as_str()).collect(),
        }],
        stream: false,
        options: GenerationOptions {
            temperature: 0.0,
            num_predict: MAX_REPLY_TOKENS,
        },
    }
}

fn reply_text(response: ChatResponse) -> Result<String, VisionError> {
    match response.message {
        Some(reply) if !reply.content.trim().is_empty() => Ok(reply.content),
        _ => Err(VisionError::EmptyReply),
    }
}

impl VisionClient for OllamaVisionClient {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn extract(&self, request: &ExtractionRequest) -> Result<String, VisionError> {
        let _span = tracing::info_span!("ollama_extract", model = %self.model).entered();
        tracing::info!(images = request.images.len(), "Sending extraction request");

        let url = format!("{}/api/chat", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&build_body(&self.model, request))
            .send()
            .map_err(|e| VisionError::from_reqwest(e, &self.base_url))?;

        let parsed: ChatResponse = check_status(response)?
            .json()
            .map_err(|e| VisionError::Decode(e.to_string()))?;

        reply_text(parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ReportKind;
    use crate::pipeline::extraction::vision::tests::{serve_once, unbound_url};
    use crate::pipeline::extraction::EncodedImage;
    use serde_json::json;

    #[test]
    fn body_is_single_user_message_with_images() {
        let request = ExtractionRequest {
            instruction: "extract".into(),
            images: vec![EncodedImage {
                kind: ReportKind::Hemogram,
                mime_type: "image/png",
                data: "QUJD".into(),
            }],
        };
        let body = serde_json::to_value(build_body("medgemma:4b", &request)).unwrap();
        assert_eq!(body["model"], "medgemma:4b");
        assert_eq!(body["stream"], false);
        assert_eq!(body["options"]["temperature"], 0.0);
        assert_eq!(
            body["messages"],
            json!([{"role": "user", "content": "extract", "images": ["QUJD"]}])
        );
    }

    #[test]
    fn reply_is_message_content() {
        let response: ChatResponse = serde_json::from_value(json!({
            "model": "medgemma:4b",
            "message": {"role": "assistant", "content": "{\"CRP\": 3.1}"},
            "done": true
        }))
        .unwrap();
        assert_eq!(reply_text(response).unwrap(), "{\"CRP\": 3.1}");
    }

    #[test]
    fn blank_content_is_empty_reply() {
        let response: ChatResponse =
            serde_json::from_value(json!({"message": {"role": "assistant", "content": ""}}))
                .unwrap();
        assert!(matches!(reply_text(response), Err(VisionError::EmptyReply)));

        let response: ChatResponse = serde_json::from_value(json!({"done": true})).unwrap();
        assert!(matches!(reply_text(response), Err(VisionError::EmptyReply)));
    }

    #[test]
    fn missing_model_status_and_unreachable_server() {
        let request = ExtractionRequest {
            instruction: "extract".into(),
            images: vec![],
        };
        let body = r#"{"error":"model 'medgemma:4b' not found"}"#;
        let url = serve_once("404 Not Found", body);
        let client = OllamaVisionClient::new(&url, "medgemma:4b").unwrap();
        match client.extract(&request) {
            Err(VisionError::Api { status, body: got }) => {
                assert_eq!(status, 404);
                assert_eq!(got, body);
            }
            other => panic!("expected Api error, got {other:?}"),
        }

        let client = OllamaVisionClient::new(&unbound_url(), "medgemma:4b").unwrap();
        assert!(matches!(client.extract(&request), Err(VisionError::Connection(_))));
    }
}
