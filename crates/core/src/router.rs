//! Request router/classifier.
//!
//! Chooses between the deterministic local parser and the AI collaborator.
//! Local parsing always runs first; escalation is gated by message shape and
//! by the per-user AI quota. A denied quota or a failed AI call degrades to
//! the local result with a clarification flag; the user flow never fails
//! outright because parsing got expensive.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use tracing::{debug, warn};

use calbridge_domain::constants::LOCAL_CONFIDENCE_THRESHOLD;
use calbridge_domain::{LimitedOperation, ParseOutcome};

use crate::parser::local_parse;
use crate::ports::AiParser;
use crate::ratelimit::RateLimiter;

/// One inbound, already-normalized message to parse.
#[derive(Debug, Clone)]
pub struct ParseRequest {
    pub user_id: String,
    pub text: String,
    /// IANA timezone name; falls back to UTC when unknown.
    pub timezone: String,
    /// Original sender, when the message was forwarded.
    pub forwarded_from: Option<String>,
}

/// Message-shape classification steering escalation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Complexity {
    Simple,
    Medium,
    Complex,
}

const COMPLEX_INDICATORS: [&str; 12] = [
    "if ",
    "when ",
    "as soon as",
    "depending",
    "reschedule",
    "move ",
    "postpone",
    "every ",
    "weekly",
    "monthly",
    "remind",
    "an hour before",
];

static SIMPLE_PATTERNS: once_cell::sync::Lazy<Vec<regex::Regex>> =
    once_cell::sync::Lazy::new(|| {
        [
            r"tomorrow at \d{1,2}",
            r"today at \d{1,2}",
            r"at \d{1,2}(:\d{2})?",
            r"\d{1,2}:\d{2}",
            r"(meeting|call|sync) with \w+",
        ]
        .iter()
        .map(|p| regex::Regex::new(p).unwrap())
        .collect()
    });

/// Analyze message complexity (vocabulary and length heuristics).
pub fn complexity(text: &str) -> Complexity {
    let lower = text.to_lowercase();

    let indicator_count =
        COMPLEX_INDICATORS.iter().filter(|ind| lower.contains(*ind)).count();

    if SIMPLE_PATTERNS.iter().any(|p| p.is_match(&lower)) && indicator_count == 0 {
        return if text.chars().count() > 200 { Complexity::Medium } else { Complexity::Simple };
    }

    if indicator_count >= 2 {
        Complexity::Complex
    } else if indicator_count == 1 || text.chars().count() > 150 {
        Complexity::Medium
    } else {
        Complexity::Simple
    }
}

/// Routed parse result.
#[derive(Debug, Clone)]
pub struct RoutedParse {
    pub outcome: ParseOutcome,
    pub used_ai: bool,
    /// The AI quota was exhausted and the local result was used instead.
    pub quota_denied: bool,
    /// The result is below the confidence bar; the caller should ask the
    /// user to clarify rather than act on it silently.
    pub needs_clarification: bool,
}

/// Router over the local parser and the AI collaborator.
pub struct RouterService {
    limiter: Arc<RateLimiter>,
    ai: Arc<dyn AiParser>,
}

impl RouterService {
    pub fn new(limiter: Arc<RateLimiter>, ai: Arc<dyn AiParser>) -> Self {
        Self { limiter, ai }
    }

    /// Route one message through local parsing with gated AI fallback.
    pub async fn route(&self, request: &ParseRequest) -> RoutedParse {
        self.route_at(request, Utc::now()).await
    }

    /// Clock-injectable variant for deterministic tests.
    pub async fn route_at(&self, request: &ParseRequest, now: DateTime<Utc>) -> RoutedParse {
        let tz: Tz = request.timezone.parse().unwrap_or(Tz::UTC);
        let local = local_parse(&request.text, tz, now);
        let local_confidence = local.outcome.confidence();
        let shape = complexity(&request.text);

        let wants_ai = local.needs_ai
            || local_confidence < LOCAL_CONFIDENCE_THRESHOLD
            || request.forwarded_from.is_some()
            || shape == Complexity::Complex;

        // Simple shapes never escalate; the local parser owns them.
        if !wants_ai || (shape == Complexity::Simple && !local.needs_ai) {
            debug!(user = %request.user_id, confidence = local_confidence, "local parse accepted");
            return RoutedParse {
                outcome: local.outcome,
                used_ai: false,
                quota_denied: false,
                needs_clarification: false,
            };
        }

        let acquisition =
            self.limiter.try_acquire(&request.user_id, LimitedOperation::AiParse).await;
        if !acquisition.allowed {
            debug!(user = %request.user_id, "AI quota exhausted; returning local result");
            return RoutedParse {
                outcome: local.outcome,
                used_ai: false,
                quota_denied: true,
                needs_clarification: local_confidence < LOCAL_CONFIDENCE_THRESHOLD,
            };
        }

        let context = request.forwarded_from.as_deref();
        match self.ai.parse(&request.text, &request.timezone, context).await {
            Ok(outcome) => {
                debug!(user = %request.user_id, "AI parse succeeded");
                RoutedParse {
                    outcome,
                    used_ai: true,
                    quota_denied: false,
                    needs_clarification: false,
                }
            }
            Err(err) => {
                // AI failures degrade to the local result, never to an error.
                warn!(user = %request.user_id, error = %err, "AI parse failed; using local result");
                RoutedParse {
                    outcome: local.outcome,
                    used_ai: false,
                    quota_denied: false,
                    needs_clarification: local_confidence < LOCAL_CONFIDENCE_THRESHOLD,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_times_are_simple() {
        assert_eq!(complexity("meeting tomorrow at 15:00"), Complexity::Simple);
        assert_eq!(complexity("call with Bob at 3pm"), Complexity::Simple);
    }

    #[test]
    fn conditional_and_recurring_language_is_complex() {
        assert_eq!(
            complexity("every monday remind me to file the report"),
            Complexity::Complex
        );
        assert_eq!(
            complexity("if the client agrees, reschedule the kickoff"),
            Complexity::Complex
        );
    }

    #[test]
    fn single_indicator_is_medium() {
        assert_eq!(complexity("postpone the dentist visit please"), Complexity::Medium);
    }

    #[test]
    fn long_messages_are_at_least_medium() {
        let long = "let me think about what we should plan ".repeat(5);
        assert_ne!(complexity(&long), Complexity::Simple);
    }
}
