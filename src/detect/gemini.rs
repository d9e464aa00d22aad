//! Structure inference backed by the Gemini `generateContent` API.
//!
//! Blocking reqwest client with a hard request timeout; no async runtime is
//! required by the pipeline.

use std::env;
use std::time::Duration;

use serde::Deserialize;
use serde_json::json;
use tracing::{debug, instrument};

use crate::config::InferenceSettings;
use crate::detect::inference::{InferenceError, InferredStructure, SheetExcerpt, StructureInference};

/// Environment variables consulted for the API key, in order.
pub const API_KEY_VARIABLES: [&str; 2] = ["GOOGLE_GEMINI_API_KEY", "GEMINI_API_KEY"];

const PROMPT: &str = "You are given the top rows of a building-services room schedule \
exported from a spreadsheet (heating/cooling or ventilation). Rows are tab separated and \
prefixed with their zero-based row index. Identify the row that holds the column headers and \
assign each header label one role out of RoomNumber, RoomName, Floor, Area, RoomTypeCode, Other. \
Answer with JSON only: {\"headerRowIndex\": <int>, \"columnRoles\": {\"<label>\": \"<role>\"}}.";

/// Gemini-backed [`StructureInference`].
pub struct GeminiStructureInference {
    http: reqwest::blocking::Client,
    endpoint: String,
    model: String,
    api_key: String,
    timeout_secs: u64,
}

impl GeminiStructureInference {
    /// Creates a client with an explicit API key.
    pub fn new(settings: &InferenceSettings, api_key: String) -> Result<Self, InferenceError> {
        let http = reqwest::blocking::Client::builder()
            .user_agent(format!("roomplan-tools/{}", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|err| InferenceError::Unavailable(err.to_string()))?;

        Ok(Self {
            http,
            endpoint: settings.endpoint.trim_end_matches('/').to_string(),
            model: settings.model.clone(),
            api_key,
            timeout_secs: settings.timeout_secs,
        })
    }

    /// Creates a client using the first API key found in the environment.
    pub fn from_env(settings: &InferenceSettings) -> Result<Self, InferenceError> {
        let api_key = API_KEY_VARIABLES
            .iter()
            .filter_map(|name| env::var(name).ok())
            .find(|key| !key.trim().is_empty())
            .ok_or_else(|| {
                InferenceError::Unavailable(format!(
                    "set {} or {}",
                    API_KEY_VARIABLES[0], API_KEY_VARIABLES[1]
                ))
            })?;
        Self::new(settings, api_key)
    }

    fn map_transport_error(&self, err: reqwest::Error) -> InferenceError {
        if err.is_timeout() {
            InferenceError::Timeout(self.timeout_secs)
        } else {
            InferenceError::Network(err.to_string())
        }
    }
}

impl StructureInference for GeminiStructureInference {
    #[instrument(level = "info", skip_all, fields(source = %excerpt.source, model = %self.model))]
    fn detect_structure(&self, excerpt: &SheetExcerpt) -> Result<InferredStructure, InferenceError> {
        let url = format!("{}/models/{}:generateContent", self.endpoint, self.model);
        let body = json!({
            "contents": [{
                "parts": [{ "text": format!("{PROMPT}\n\n{}", excerpt.to_text()) }]
            }],
            "generationConfig": {
                "responseMimeType": "application/json",
                "temperature": 0.0
            }
        });

        let response = self
            .http
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .map_err(|err| self.map_transport_error(err))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(InferenceError::Http {
                status: status.as_u16(),
                body: body.chars().take(500).collect(),
            });
        }

        let payload: GenerateContentResponse = response
            .json()
            .map_err(|err| InferenceError::Malformed(err.to_string()))?;
        let text = payload
            .candidates
            .into_iter()
            .flat_map(|candidate| candidate.content.parts)
            .find_map(|part| part.text)
            .ok_or_else(|| InferenceError::Malformed("response contains no text part".into()))?;
        debug!(answer_len = text.len(), "received structure answer");

        parse_answer(&text)
    }
}

/// Parses the model's JSON answer, tolerating a surrounding Markdown fence.
pub fn parse_answer(text: &str) -> Result<InferredStructure, InferenceError> {
    let trimmed = text.trim();
    let unfenced = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|inner| inner.strip_suffix("```"))
        .unwrap_or(trimmed)
        .trim();
    serde_json::from_str(unfenced).map_err(|err| InferenceError::Malformed(err.to_string()))
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Content,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    text: Option<String>,
}
