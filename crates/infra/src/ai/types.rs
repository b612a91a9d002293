//! Wire types for the chat-completions and transcription endpoints.

use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u32,
    pub temperature: f32,
    pub response_format: ResponseFormat,
}

#[derive(Debug, Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Serialize)]
pub struct ResponseFormat {
    #[serde(rename = "type")]
    pub format_type: String,
}

#[derive(Debug, Deserialize)]
pub struct ChatCompletionResponse {
    pub choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
pub struct ChatChoice {
    pub message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
pub struct ChatChoiceMessage {
    pub content: String,
}

/// The JSON document the model is instructed to emit.
#[derive(Debug, Deserialize)]
pub struct ExtractedContent {
    pub content_type: String,
    pub title: Option<String>,
    pub start_datetime: Option<String>,
    pub end_datetime: Option<String>,
    pub duration_minutes: Option<u32>,
    pub location: Option<String>,
    #[serde(default)]
    pub participants: Vec<String>,
    pub note_content: Option<String>,
    #[serde(default)]
    pub clarification_needed: bool,
    pub clarification_prompt: Option<String>,
    pub confidence: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct TranscriptionResponse {
    pub text: String,
}
