//! HTTP implementation of [`RemoteGateway`].

use std::path::Path;
use std::time::Duration;

use base64::Engine;
use parking_lot::RwLock;
use reqwest::{multipart, Client, Method, RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use super::{ChatParams, RemoteGateway, RetryPolicy};
use crate::cache::{CacheLayer, Ttl};
use crate::config::ApiConfig;
use crate::error::{CompanionError, CompanionResult};
use crate::types::{DiaryEntry, Message};

const CHAT_COMPLETIONS: &str = "api/v1/chat/completions";
const AUDIO: &str = "api/v1/audio";
const PING: &str = "api/v1/ping";
const DIARY: &str = "api/v1/diary";

/// How long a chat reply is served from the cache
pub const REPLY_CACHE_TTL: Duration = Duration::from_secs(10 * 60);

struct Endpoint {
    base_url: Url,
    token: Option<String>,
}

/// Gateway talking to the companion server over HTTPS.
///
/// The base URL and bearer token can be changed at runtime; requests already
/// in flight keep the values they started with.
pub struct HttpGateway {
    client: Client,
    endpoint: RwLock<Endpoint>,
    cache: CacheLayer,
    retry: RetryPolicy,
}

impl HttpGateway {
    pub fn new(api: &ApiConfig, cache: CacheLayer) -> CompanionResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(api.timeout_secs.max(1)))
            .build()
            .map_err(|e| CompanionError::Config(format!("HTTP client: {}", e)))?;

        let retry = RetryPolicy {
            max_retries: api.max_retries,
            ..RetryPolicy::default()
        };

        let gateway = Self {
            client,
            endpoint: RwLock::new(Endpoint {
                base_url: parse_base_url(&api.base_url)?,
                token: None,
            }),
            cache,
            retry,
        };
        gateway.set_api_token(api.api_token.as_deref());
        info!(base_url = %api.base_url, "HTTP gateway initialized");
        Ok(gateway)
    }

    /// Replace the retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn base_url(&self) -> String {
        self.endpoint.read().base_url.to_string()
    }

    pub fn set_base_url(&self, base_url: &str) -> CompanionResult<()> {
        let url = parse_base_url(base_url)?;
        info!(base_url = %url, "Base URL updated");
        self.endpoint.write().base_url = url;
        Ok(())
    }

    /// Set or clear the bearer token.
    pub fn set_api_token(&self, token: Option<&str>) {
        let token = token.map(str::trim).filter(|t| !t.is_empty());
        match token {
            Some(t) => {
                let visible: String = t.chars().take(4).collect();
                info!(token = %format!("{}...", visible), "API token set");
            }
            None => warn!("API token is empty"),
        }
        self.endpoint.write().token = token.map(str::to_string);
    }

    fn request(&self, method: Method, path: &str) -> CompanionResult<RequestBuilder> {
        let url = self
            .endpoint
            .read()
            .base_url
            .join(path)
            .map_err(|e| CompanionError::InvalidInput(format!("bad request path {}: {}", path, e)))?;
        Ok(self.request_url(method, url))
    }

    fn request_url(&self, method: Method, url: Url) -> RequestBuilder {
        let endpoint = self.endpoint.read();
        let mut request = self.client.request(method, url);
        if let Some(token) = &endpoint.token {
            request = request.bearer_auth(token);
        }
        request
    }

    async fn execute_json<T: DeserializeOwned>(
        &self,
        action: &str,
        build: impl Fn() -> CompanionResult<RequestBuilder>,
    ) -> CompanionResult<T> {
        let build = &build;
        self.retry
            .run(action, move || async move {
                let body = read_body(build()?.send().await?).await?;
                if body.trim().is_empty() {
                    return Err(CompanionError::Serialization("empty response from server".into()));
                }
                serde_json::from_str(&body).map_err(|e| CompanionError::Serialization(e.to_string()))
            })
            .await
    }
}

impl RemoteGateway for HttpGateway {
    async fn send_message(
        &self,
        user_id: &str,
        text: &str,
        history: &[Message],
        params: &ChatParams,
    ) -> CompanionResult<String> {
        if user_id.trim().is_empty() {
            return Err(CompanionError::InvalidInput("user id is not set".into()));
        }

        let cache_key = reply_cache_key(user_id, text);
        match self.cache.get::<String>(&cache_key).await {
            Ok(Some(reply)) => {
                debug!(user_id, "Returning cached reply");
                return Ok(reply);
            }
            Ok(None) => {}
            Err(e) => warn!(user_id, error = %e, "Reply cache unreadable"),
        }

        let payload = ChatCompletionRequest::new(user_id, text, history, params);
        let response: ChatCompletionResponse = self
            .execute_json("send_message", || {
                Ok(self.request(Method::POST, CHAT_COMPLETIONS)?.json(&payload))
            })
            .await?;

        let reply = response.into_reply();
        if let Err(e) = self.cache.put(&cache_key, &reply, Ttl::For(REPLY_CACHE_TTL)).await {
            warn!(user_id, error = %e, "Failed to cache reply");
        }
        Ok(reply)
    }

    async fn send_audio(&self, user_id: &str, file_path: &Path) -> CompanionResult<String> {
        let bytes = tokio::fs::read(file_path).await?;
        let file_name = file_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "audio.wav".to_string());
        debug!(user_id, file = %file_path.display(), bytes = bytes.len(), "Uploading audio");

        let response: AudioResponse = self
            .execute_json("send_audio", || {
                let form = multipart::Form::new()
                    .text("user_id", user_id.to_string())
                    .part(
                        "file",
                        multipart::Part::bytes(bytes.clone()).file_name(file_name.clone()),
                    );
                Ok(self.request(Method::POST, AUDIO)?.multipart(form))
            })
            .await?;
        Ok(response.reply)
    }

    async fn create_diary_entry(&self, user_id: &str, entry: &DiaryEntry) -> CompanionResult<()> {
        let url = diary_entries_url(&self.endpoint.read().base_url, user_id)?;
        let url = &url;
        self.retry
            .run("create_diary_entry", move || async move {
                let request = self.request_url(Method::POST, url.clone()).json(entry);
                read_body(request.send().await?).await?;
                Ok(())
            })
            .await?;
        info!(user_id, title = %entry.title, "Diary entry sent");
        Ok(())
    }

    async fn ping(&self) -> bool {
        let request = match self.request(Method::GET, PING) {
            Ok(request) => request,
            Err(_) => return false,
        };
        match request.send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                debug!(error = %e, "Ping failed");
                false
            }
        }
    }
}

fn parse_base_url(raw: &str) -> CompanionResult<Url> {
    let trimmed = raw.trim().trim_end_matches('/');
    // Url::join drops the last path segment unless the base ends with '/'
    Url::parse(&format!("{}/", trimmed))
        .map_err(|e| CompanionError::Config(format!("invalid base URL '{}': {}", raw, e)))
}

/// `<base>/api/v1/diary/<user_id>/entries`, with `user_id` as one encoded segment.
fn diary_entries_url(base: &Url, user_id: &str) -> CompanionResult<Url> {
    let mut url = base
        .join(DIARY)
        .map_err(|e| CompanionError::InvalidInput(format!("bad request path {}: {}", DIARY, e)))?;
    url.path_segments_mut()
        .map_err(|_| CompanionError::Config(format!("base URL '{}' cannot carry a path", base)))?
        .push(user_id)
        .push("entries");
    Ok(url)
}

/// Cache key of the reply to `text`.
pub fn reply_cache_key(user_id: &str, text: &str) -> String {
    let digest = Sha256::digest(text.as_bytes());
    format!(
        "message_{}_{}",
        user_id,
        base64::engine::general_purpose::STANDARD.encode(digest)
    )
}

async fn read_body(response: Response) -> CompanionResult<String> {
    let status = response.status();
    let body = response.text().await?;
    check_status(status, body)
}

fn check_status(status: StatusCode, body: String) -> CompanionResult<String> {
    if status.is_success() {
        return Ok(body);
    }
    warn!(%status, body = %body, "Request failed");
    if status.is_client_error() {
        Err(CompanionError::RemoteRejected {
            status: status.as_u16(),
            body,
        })
    } else {
        Err(CompanionError::Network(format!("server returned {}: {}", status, body)))
    }
}

#[derive(Debug, Serialize)]
struct ChatTurn<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatTurn<'a>>,
    temperature: f64,
    top_p: f64,
    max_tokens: u32,
}

impl<'a> ChatCompletionRequest<'a> {
    fn new(user_id: &str, text: &'a str, history: &'a [Message], params: &'a ChatParams) -> Self {
        let mut messages = Vec::with_capacity(history.len() + 2);
        if !params.custom_prompt.trim().is_empty() {
            messages.push(ChatTurn {
                role: "system",
                content: &params.custom_prompt,
            });
        }
        for message in history {
            let role = if message.author == user_id { "user" } else { "assistant" };
            messages.push(ChatTurn {
                role,
                content: &message.text,
            });
        }
        messages.push(ChatTurn {
            role: "user",
            content: text,
        });

        Self {
            model: &params.model,
            messages,
            temperature: params.temperature,
            top_p: params.top_p,
            max_tokens: params.max_response_length,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: String,
}

impl ChatCompletionResponse {
    fn into_reply(self) -> String {
        self.choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .unwrap_or_default()
    }
}

#[derive(Debug, Deserialize)]
struct AudioResponse {
    #[serde(default)]
    reply: String,
}
