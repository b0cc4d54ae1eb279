//! Provider Adapter (C1): a uniform streaming interface over one
//! OpenAI-compatible LLM backend (LMStudio, Ollama, llama.cpp, vLLM, or a
//! remote host), addressed by a discovered instance value rather than a
//! fixed enum of known providers.
//!
//! Tool calls are never parsed here: every chunk is handed upstream as plain
//! text — tool calls are textual XML, not OpenAI native tool-call objects —
//! so there is no JSON tool-call delta aggregation in this module.

use std::collections::HashMap;
use std::pin::Pin;

use eventsource_stream::Eventsource;
use futures::stream::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::agent::{Message, MessageRole};
use crate::constants::KNOWN_OLLAMA_OPTIONS;
use crate::error::ExceptionKind;
use crate::Result;

/// Number of transport-layer retries the adapter performs internally before
/// surfacing an `Error` event — a fixed, small class (timeouts, connection
/// resets, generic 5xx, 429). Distinct from the cycle-level retry budget the
/// next-step scheduler manages.
const PROVIDER_INTERNAL_RETRIES: u32 = 2;

/// One event out of a provider stream.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// Incremental assistant text.
    Chunk(String),
    /// Informational event (e.g. finish reason, stream-done marker).
    Status(String),
    /// Terminal for the stream; carries the classification downstream uses
    /// to decide retry vs key-rotate vs failover.
    Error { kind: ExceptionKind, message: String },
}

pub type EventStream = Pin<Box<dyn Stream<Item = StreamEvent> + Send>>;

#[derive(Debug, Clone, Serialize)]
struct WireMessage {
    role: String,
    content: String,
}

#[derive(Debug, Clone, Serialize)]
struct WireRequest {
    model: String,
    messages: Vec<WireMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    temperature: f32,
    #[serde(flatten)]
    extra: HashMap<String, Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct WireDelta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct WireChoice {
    #[serde(default)]
    delta: WireDelta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct WireChunk {
    #[serde(default)]
    choices: Vec<WireChoice>,
}

fn role_str(role: MessageRole) -> &'static str {
    match role {
        MessageRole::System
        | MessageRole::SystemFrameworkNotification
        | MessageRole::SystemIntervention => "system",
        MessageRole::User => "user",
        MessageRole::Assistant => "assistant",
        MessageRole::Tool => "tool",
    }
}

/// Drops any `provider_options` key Ollama doesn't recognize, so stray keys
/// meant for a different backend don't reach the local server.
fn filter_known_ollama_options(options: &HashMap<String, Value>) -> HashMap<String, Value> {
    options
        .iter()
        .filter(|(key, _)| KNOWN_OLLAMA_OPTIONS.contains(&key.as_str()))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

fn classify_transport_error(err: &reqwest::Error) -> ExceptionKind {
    if err.is_timeout() {
        ExceptionKind::Timeout
    } else if err.is_connect() {
        ExceptionKind::ConnectionReset
    } else {
        ExceptionKind::ProviderUnreachable
    }
}

/// One connection to one provider instance (local endpoint or remote host).
pub struct ProviderAdapter {
    http: reqwest::Client,
    /// Discovered/fixed instance name (e.g. `ollama`, `openrouter`).
    provider_base: String,
    base_url: String,
    api_key: Option<String>,
    is_local: bool,
}

impl ProviderAdapter {
    pub fn new(
        provider_base: impl Into<String>,
        base_url: impl Into<String>,
        api_key: Option<String>,
        is_local: bool,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            provider_base: provider_base.into(),
            base_url: base_url.into(),
            api_key,
            is_local,
        }
    }

    pub fn provider_base(&self) -> &str {
        &self.provider_base
    }

    fn is_ollama(&self) -> bool {
        self.is_local && self.provider_base.eq_ignore_ascii_case("ollama")
    }

    async fn send_with_internal_retry(
        &self,
        request: &WireRequest,
    ) -> std::result::Result<reqwest::Response, (ExceptionKind, String)> {
        let url = format!("{}/chat/completions", self.base_url);
        let mut last_err: Option<(ExceptionKind, String)> = None;

        for attempt in 0..=PROVIDER_INTERNAL_RETRIES {
            let mut req = self.http.post(&url).json(request);
            if let Some(key) = &self.api_key {
                req = req.header("Authorization", format!("Bearer {key}"));
            }

            match req.send().await {
                Ok(resp) if resp.status().is_success() => return Ok(resp),
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    let kind = ExceptionKind::from_status_code(status);
                    let body = resp.text().await.unwrap_or_default();
                    let message = format!("provider returned {status}: {body}");

                    if kind.is_provider_internal_retry() && attempt < PROVIDER_INTERNAL_RETRIES {
                        log::warn!(
                            "{} attempt {}/{} failed ({}), retrying",
                            self.provider_base,
                            attempt + 1,
                            PROVIDER_INTERNAL_RETRIES + 1,
                            status
                        );
                        last_err = Some((kind, message));
                        continue;
                    }
                    return Err((kind, message));
                }
                Err(err) => {
                    let kind = classify_transport_error(&err);
                    let message = err.to_string();
                    if attempt < PROVIDER_INTERNAL_RETRIES {
                        log::warn!(
                            "{} transport error on attempt {}/{}: {}",
                            self.provider_base,
                            attempt + 1,
                            PROVIDER_INTERNAL_RETRIES + 1,
                            message
                        );
                        last_err = Some((kind, message));
                        continue;
                    }
                    return Err((kind, message));
                }
            }
        }

        Err(last_err.unwrap_or((ExceptionKind::Unknown, "exhausted internal retries".into())))
    }

    /// Streams a completion. `messages` is read-only — the adapter never
    /// mutates its caller's history.
    pub async fn stream_completion(
        &self,
        messages: &[Message],
        model: &str,
        temperature: f32,
        max_tokens: Option<u32>,
        provider_options: &HashMap<String, Value>,
    ) -> Result<EventStream> {
        let wire_messages = messages
            .iter()
            .map(|m| WireMessage {
                role: role_str(m.role).to_string(),
                content: m.content.clone(),
            })
            .collect();

        let extra = if self.is_ollama() {
            filter_known_ollama_options(provider_options)
        } else {
            provider_options.clone()
        };

        let request = WireRequest {
            model: model.to_string(),
            messages: wire_messages,
            stream: true,
            max_tokens,
            temperature,
            extra,
        };

        let response = match self.send_with_internal_retry(&request).await {
            Ok(resp) => resp,
            Err((kind, message)) => {
                log::warn!("{} stream_completion failed: {}", self.provider_base, message);
                return Ok(Box::pin(futures::stream::once(async move {
                    StreamEvent::Error { kind, message }
                })));
            }
        };

        let provider_base = self.provider_base.clone();
        let events = response.bytes_stream().eventsource().filter_map(move |item| {
            let provider_base = provider_base.clone();
            async move {
                match item {
                    Ok(event) => {
                        if event.data == "[DONE]" {
                            return Some(StreamEvent::Status("done".to_string()));
                        }
                        match serde_json::from_str::<WireChunk>(&event.data) {
                            Ok(chunk) => {
                                let choice = chunk.choices.into_iter().next()?;
                                if let Some(reason) = choice.finish_reason {
                                    return Some(StreamEvent::Status(reason));
                                }
                                choice.delta.content.map(StreamEvent::Chunk)
                            }
                            Err(e) => Some(StreamEvent::Error {
                                kind: ExceptionKind::Unknown,
                                message: format!("malformed chunk from {provider_base}: {e}"),
                            }),
                        }
                    }
                    Err(e) => Some(StreamEvent::Error {
                        kind: ExceptionKind::ConnectionReset,
                        message: format!("stream error from {provider_base}: {e}"),
                    }),
                }
            }
        });

        Ok(Box::pin(events))
    }
}
