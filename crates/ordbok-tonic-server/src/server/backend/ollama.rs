//! Ollama chat backend.
//!
//! Each generation is a single non-streaming `POST {host}/api/chat` call with
//! temperature 0 and a JSON schema in `format`, so the model is constrained to
//! answer with `{word, synonyms, explanation}`. The answer arrives as a JSON
//! string inside `message.content` and is decoded a second time.
//!
//! When a reference URL is configured, the synonym page for the word
//! (`{reference_url}/{word}`, synonymer.se by default) is fetched first and
//! handed to the model as a second system message to ground its answer. A
//! failed lookup is logged and the generation continues without it.

use async_trait::async_trait;
use core::time::Duration;
use ordbok_tonic_core::ordbok::{BackendError, GenerationBackend, GenerationEntry};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

const SYSTEM_PROMPT: &str = "You are an AI that is role playing a language teacher. \
Your job is to give synonyms and explain words and sentences to the user. \
Your answer MUST be in SWEDISH, no other language is allowed. \
DO NOT HALLUCINATE.";

/// Reference lookups get their own, shorter deadline.
const REFERENCE_TIMEOUT: Duration = Duration::from_secs(10);

/// Longest reference page, in characters, passed to the model.
const MAX_REFERENCE_CHARS: usize = 32_000;

#[derive(Debug, Clone)]
pub struct OllamaConfig {
    /// Base URL without a trailing slash, e.g. `http://localhost:11434`.
    pub host: String,
    pub model: String,
    pub timeout: Duration,
    /// Base of the synonym page lookup; `None` disables it.
    pub reference_url: Option<Url>,
}

pub struct OllamaBackend {
    http: reqwest::Client,
    chat_url: String,
    model: String,
    reference_url: Option<Url>,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    format: Value,
    stream: bool,
    options: ChatOptions,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
struct ChatMessage {
    role: String,
    content: String,
}

impl ChatMessage {
    fn new(role: &str, content: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatOptions {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    message: ChatMessage,
}

/// The shape the model is asked to produce.
#[derive(Debug, Deserialize)]
struct Answer {
    #[serde(default)]
    synonyms: Vec<String>,
    explanation: String,
}

impl OllamaBackend {
    /// Builds a backend with its own HTTP client.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::Request`] if the HTTP client cannot be built.
    pub fn new(config: &OllamaConfig) -> Result<Self, BackendError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| BackendError::Request(e.to_string()))?;

        Ok(Self {
            http,
            chat_url: format!("{}/api/chat", config.host),
            model: config.model.clone(),
            reference_url: config.reference_url.clone(),
        })
    }

    fn request<'a>(
        &'a self,
        key: &str,
        prior: &[GenerationEntry],
        reference: Option<&str>,
    ) -> ChatRequest<'a> {
        ChatRequest {
            model: &self.model,
            messages: messages(key, prior, reference),
            format: answer_schema(),
            stream: false,
            options: ChatOptions { temperature: 0.0 },
        }
    }

    /// `{reference_url}/{key}` with the word percent-encoded as one segment.
    fn reference_url(&self, key: &str) -> Option<Url> {
        let mut url = self.reference_url.clone()?;
        url.path_segments_mut().ok()?.pop_if_empty().push(key);
        Some(url)
    }

    /// Fetches the reference page for `key`. Failures degrade to no context.
    async fn fetch_reference(&self, key: &str) -> Option<String> {
        let url = self.reference_url(key)?;
        match self.get_text(url.clone()).await {
            Ok(page) => {
                tracing::debug!(%url, bytes = page.len(), "Fetched reference page");
                Some(truncate_chars(page, MAX_REFERENCE_CHARS))
            }
            Err(e) => {
                tracing::warn!(%url, "Reference lookup failed, generating without it: {e}");
                None
            }
        }
    }

    async fn get_text(&self, url: Url) -> reqwest::Result<String> {
        self.http
            .get(url)
            .timeout(REFERENCE_TIMEOUT)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await
    }
}

#[async_trait]
impl GenerationBackend for OllamaBackend {
    #[tracing::instrument(skip_all, fields(key = %key, prior = prior.len()))]
    async fn generate(
        &self,
        key: &str,
        prior: &[GenerationEntry],
    ) -> Result<GenerationEntry, BackendError> {
        let reference = self.fetch_reference(key).await;
        let response = self
            .http
            .post(&self.chat_url)
            .json(&self.request(key, prior, reference.as_deref()))
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| BackendError::Request(e.to_string()))?;

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| BackendError::Malformed(format!("unreadable chat response: {e}")))?;

        tracing::trace!(content = %chat.message.content, "Model answered");
        parse_answer(key, &chat.message.content)
    }
}

fn messages(key: &str, prior: &[GenerationEntry], reference: Option<&str>) -> Vec<ChatMessage> {
    let mut messages = vec![ChatMessage::new("system", SYSTEM_PROMPT)];
    if let Some(reference) = reference {
        messages.push(ChatMessage::new("system", reference));
    }
    messages.push(ChatMessage::new(
        "user",
        format!("Vad har '{key}' för synonymer och vad betyder det? Var god och förklara ordet."),
    ));

    if !prior.is_empty() {
        let previous = prior
            .iter()
            .map(|entry| format!("- {}", entry.explanation))
            .collect::<Vec<_>>()
            .join("\n");
        messages.push(ChatMessage::new(
            "user",
            format!(
                "Du har redan gett följande förklaringar. Ge en ny förklaring som skiljer sig från dem:\n{previous}"
            ),
        ));
    }

    messages
}

fn answer_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "word": { "type": "string" },
            "synonyms": { "type": "array", "items": { "type": "string" } },
            "explanation": { "type": "string" }
        },
        "required": ["word", "synonyms", "explanation"]
    })
}

fn truncate_chars(mut text: String, max: usize) -> String {
    if let Some((end, _)) = text.char_indices().nth(max) {
        text.truncate(end);
    }
    text
}

fn parse_answer(key: &str, content: &str) -> Result<GenerationEntry, BackendError> {
    let answer: Answer = serde_json::from_str(content)
        .map_err(|e| BackendError::Malformed(format!("answer is not valid JSON: {e}")))?;

    let explanation = answer.explanation.trim();
    if explanation.is_empty() {
        return Err(BackendError::Malformed(format!(
            "empty explanation for '{key}'"
        )));
    }

    let key = key.to_lowercase();
    let mut synonyms: Vec<String> = Vec::with_capacity(answer.synonyms.len());
    for synonym in answer.synonyms {
        let synonym = synonym.trim();
        if synonym.is_empty() || synonym.to_lowercase() == key {
            continue;
        }
        if !synonyms.iter().any(|s| s == synonym) {
            synonyms.push(synonym.to_string());
        }
    }

    Ok(GenerationEntry::new(explanation, synonyms))
}
