//! Gemini `generateContent` client.
//!
//! One user turn carries the instruction as a text part followed by every
//! report image as an `inline_data` part, in attachment order.

use serde::{Deserialize, Serialize};

use super::request::ExtractionRequest;
use super::vision::{check_status, VisionClient, VisionError};

pub const DEFAULT_GEMINI_URL: &str = "https://generativelanguage.googleapis.com";

const API_KEY_HEADER: &str = "x-goog-api-key";

pub struct GeminiClient {
    base_url: String,
    api_key: String,
    model: String,
    client: reqwest::blocking::Client,
}

impl GeminiClient {
    pub fn new(base_url: &str, api_key: &str, model: &str) -> Result<Self, VisionError> {
        let client = reqwest::blocking::Client::builder()
            .build()
            .map_err(|e| VisionError::Transport(e.to_string()))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
            client,
        })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        )
    }
}

#[derive(Debug, Serialize)]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum Part<'a> {
    Text { text: &'a str },
    Inline { inline_data: InlineData<'a> },
}

#[derive(Debug, Serialize)]
struct InlineData<'a> {
    mime_type: &'a str,
    data: &'a str,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    temperature: f32,
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
    parts: Vec<ReplyPart>,
}

#[derive(Debug, Deserialize)]
struct ReplyPart {
    text: Option<String>,
}

fn build_body(request: &ExtractionRequest) -> GenerateContentRequest<'_> {
    let mut parts = Vec::with_capacity(request.images.len() + 1);
    parts.push(Part::Text {
        text: &request.instruction,
    });
    parts.extend(request.images.iter().map(|image| Part::Inline {
        inline_data: InlineData {
            mime_type: image.mime_type,
            data: &image.data,
        },
    }));

    GenerateContentRequest {
        contents: vec![Content {
            role: "user",
            parts,
        }],
        generation_config: GenerationConfig { temperature: 0.0 },
    }
}

/// Concatenate the text parts of the first candidate.
fn reply_text(response: GenerateContentResponse) -> Result<String, VisionError> {
    let text: String = response
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|content| content.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();

    if text.trim().is_empty() {
        return Err(VisionError::EmptyReply);
    }
    Ok(text)
}

impl VisionClient for GeminiClient {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn extract(&self, request: &ExtractionRequest) -> Result<String, VisionError> {
        let _span = tracing::info_span!("gemini_extract", model = %self.model).entered();
        tracing::info!(images = request.images.len(), "Sending extraction request");

        let response = self
            .client
            .post(self.endpoint())
            .header(API_KEY_HEADER, &self.api_key)
            .json(&build_body(request))
            .send()
            .map_err(|e| VisionError::from_reqwest(e, &self.base_url))?;

        let parsed: GenerateContentResponse = check_status(response)?
            .json()
            .map_err(|e| VisionError::Decode(e.to_string()))?;

        let text = reply_text(parsed)?;
        tracing::debug!(chars = text.len(), "Received reply");
        Ok(text)
    }
}
