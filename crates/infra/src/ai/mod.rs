//! AI collaborator client: chat-completions parsing and audio
//! transcription behind the core `AiParser`/`Transcriber` ports.

mod client;
mod types;

pub use client::OpenAiClient;
