//! Chat-completions client implementing the AI parse and transcription
//! collaborator ports.
//!
//! The model is pinned to JSON-object output and its reply is parsed
//! strictly; anything that does not deserialize becomes an `Unclear`
//! outcome upstream via the router's degradation path, never a raw error to
//! the end user.

use async_trait::async_trait;
use calbridge_core::ports::{AiParser, Transcriber};
use calbridge_domain::constants::DEFAULT_EVENT_DURATION_MINUTES;
use calbridge_domain::{
    AiConfig, CalbridgeError, EventDraft, NoteDraft, ParseOutcome, Result,
};
use chrono::{DateTime, Utc};
use reqwest::multipart::{Form, Part};
use reqwest::Method;
use tracing::{debug, info};

use super::types::{
    ChatCompletionRequest, ChatCompletionResponse, ChatMessage, ExtractedContent, ResponseFormat,
    TranscriptionResponse,
};
use crate::http::HttpClient;

/// OpenAI-compatible API client for parsing and transcription.
pub struct OpenAiClient {
    http: HttpClient,
    api_url: String,
    transcription_url: String,
    api_key: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
}

impl OpenAiClient {
    pub fn from_config(http: HttpClient, config: &AiConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| CalbridgeError::Config("AI API key is not configured".into()))?;
        Ok(Self {
            http,
            api_url: config.api_url.clone(),
            transcription_url: config.transcription_url.clone(),
            api_key,
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        })
    }

    fn system_prompt(timezone: &str, context: Option<&str>) -> String {
        let now = Utc::now().to_rfc3339();
        let mut prompt = format!(
            "You extract calendar events and notes from chat messages. \
             The current UTC time is {now}; the user's timezone is {timezone}. \
             Reply with a single JSON object with the fields: \
             content_type (\"event\", \"note\" or \"unclear\"), title, \
             start_datetime (RFC3339, UTC), end_datetime (RFC3339, UTC), \
             duration_minutes, location, participants (array of names), \
             note_content, clarification_needed (boolean), \
             clarification_prompt, confidence (0..1). \
             Resolve relative dates against the current time and prefer \
             future interpretations."
        );
        if let Some(forwarded_from) = context {
            prompt.push_str(&format!(
                " The message was forwarded from {forwarded_from}; it may describe \
                 someone else's plans."
            ));
        }
        prompt
    }

    fn to_outcome(extracted: ExtractedContent, source_text: &str) -> ParseOutcome {
        let confidence = extracted.confidence.unwrap_or(0.8).clamp(0.0, 1.0);

        match extracted.content_type.as_str() {
            "event" => {
                let Some(start) = extracted
                    .start_datetime
                    .as_deref()
                    .and_then(|value| DateTime::parse_from_rfc3339(value).ok())
                    .map(|dt| dt.with_timezone(&Utc))
                else {
                    return ParseOutcome::Unclear {
                        prompt: extracted
                            .clarification_prompt
                            .unwrap_or_else(|| "What time should I schedule that for?".into()),
                        partial: None,
                    };
                };
                let end = extracted
                    .end_datetime
                    .as_deref()
                    .and_then(|value| DateTime::parse_from_rfc3339(value).ok())
                    .map(|dt| dt.with_timezone(&Utc));

                let draft = EventDraft {
                    title: extracted.title.unwrap_or_else(|| "Event".into()),
                    start,
                    end,
                    duration_minutes: extracted
                        .duration_minutes
                        .unwrap_or(DEFAULT_EVENT_DURATION_MINUTES),
                    location: extracted.location,
                    participants: extracted.participants,
                    confidence,
                    source_text: source_text.to_string(),
                };

                if extracted.clarification_needed {
                    ParseOutcome::Unclear {
                        prompt: extracted
                            .clarification_prompt
                            .unwrap_or_else(|| "Could you confirm the details?".into()),
                        partial: Some(draft),
                    }
                } else {
                    ParseOutcome::Event(draft)
                }
            }
            "note" => ParseOutcome::Note(NoteDraft {
                title: extracted.title.unwrap_or_else(|| "Note".into()),
                content: extracted
                    .note_content
                    .unwrap_or_else(|| source_text.to_string()),
                confidence,
                source_text: source_text.to_string(),
            }),
            _ => ParseOutcome::Unclear {
                prompt: extracted
                    .clarification_prompt
                    .unwrap_or_else(|| {
                        "I couldn't tell what to schedule. Could you rephrase?".into()
                    }),
                partial: None,
            },
        }
    }
}

#[async_trait]
impl AiParser for OpenAiClient {
    async fn parse(
        &self,
        text: &str,
        timezone: &str,
        context: Option<&str>,
    ) -> Result<ParseOutcome> {
        debug!(chars = text.len(), "AI parse requested");

        let request = ChatCompletionRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".into(),
                    content: Self::system_prompt(timezone, context),
                },
                ChatMessage { role: "user".into(), content: text.to_string() },
            ],
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            response_format: ResponseFormat { format_type: "json_object".into() },
        };

        let response = self
            .http
            .send(
                self.http
                    .request(Method::POST, &self.api_url)
                    .bearer_auth(&self.api_key)
                    .json(&request),
            )
            .await?;

        if !response.status().is_success() {
            return Err(crate::connectors::response_failure(response).await);
        }

        let completion: ChatCompletionResponse =
            response.json().await.map_err(|e| CalbridgeError::Serialization(e.to_string()))?;
        let content = completion
            .choices
            .first()
            .map(|choice| choice.message.content.as_str())
            .ok_or_else(|| CalbridgeError::Serialization("empty completion".into()))?;

        let extracted: ExtractedContent = serde_json::from_str(content)
            .map_err(|e| CalbridgeError::Serialization(format!("model reply not JSON: {e}")))?;

        info!(content_type = %extracted.content_type, "AI parse complete");
        Ok(Self::to_outcome(extracted, text))
    }
}

#[async_trait]
impl Transcriber for OpenAiClient {
    async fn transcribe(&self, audio: &[u8], filename: &str) -> Result<String> {
        let form = Form::new()
            .text("model", "whisper-1")
            .part(
                "file",
                Part::bytes(audio.to_vec())
                    .file_name(filename.to_string())
                    .mime_str("application/octet-stream")
                    .map_err(|e| CalbridgeError::InvalidInput(e.to_string()))?,
            );

        // Multipart bodies cannot be replayed, so this call skips the retry
        // loop.
        let response = self
            .http
            .send_once(
                self.http
                    .request(Method::POST, &self.transcription_url)
                    .bearer_auth(&self.api_key)
                    .multipart(form),
            )
            .await?;

        if !response.status().is_success() {
            return Err(crate::connectors::response_failure(response).await);
        }

        let transcription: TranscriptionResponse =
            response.json().await.map_err(|e| CalbridgeError::Serialization(e.to_string()))?;
        info!(chars = transcription.text.len(), "transcription complete");
        Ok(transcription.text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extracted(content_type: &str) -> ExtractedContent {
        ExtractedContent {
            content_type: content_type.into(),
            title: Some("Planning".into()),
            start_datetime: Some("2026-08-08T15:00:00Z".into()),
            end_datetime: Some("2026-08-08T16:00:00Z".into()),
            duration_minutes: Some(60),
            location: None,
            participants: vec!["Anna".into()],
            note_content: None,
            clarification_needed: false,
            clarification_prompt: None,
            confidence: Some(0.9),
        }
    }

    #[test]
    fn event_reply_becomes_draft() {
        let outcome = OpenAiClient::to_outcome(extracted("event"), "planning tomorrow at 3");
        match outcome {
            ParseOutcome::Event(draft) => {
                assert_eq!(draft.title, "Planning");
                assert_eq!(draft.participants, vec!["Anna".to_string()]);
                assert!(draft.end.is_some());
            }
            other => panic!("expected event, got {other:?}"),
        }
    }

    #[test]
    fn event_without_start_degrades_to_unclear() {
        let mut reply = extracted("event");
        reply.start_datetime = None;
        let outcome = OpenAiClient::to_outcome(reply, "planning soon");
        assert!(outcome.is_unclear());
    }

    #[test]
    fn unknown_content_type_is_unclear() {
        let outcome = OpenAiClient::to_outcome(extracted("recipe"), "text");
        assert!(outcome.is_unclear());
    }

    #[test]
    fn clarification_flag_keeps_partial_draft() {
        let mut reply = extracted("event");
        reply.clarification_needed = true;
        reply.clarification_prompt = Some("Which Anna?".into());
        match OpenAiClient::to_outcome(reply, "text") {
            ParseOutcome::Unclear { prompt, partial } => {
                assert_eq!(prompt, "Which Anna?");
                assert!(partial.is_some());
            }
            other => panic!("expected unclear, got {other:?}"),
        }
    }
}
