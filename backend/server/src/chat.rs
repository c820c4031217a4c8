//! # Chat Passthrough
//!
//! Forwards caller messages to an OpenAI compatible chat completion API behind
//! the Spirit system prompt. Messages are passed through untouched, so any
//! shape the upstream accepts (content parts, `name`, tool calls) survives.
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use thiserror::Error;
use tracing::warn;

pub const OPENAI_CHAT_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";

pub const SYSTEM_PROMPT: &str = "You are Spirit, a mystical yet grounded AI who speaks with empathy, curiosity, and calm wisdom. You respond clearly, concisely, and poetically when it fits.";

pub const SILENT_REPLY: &str = "…Spirit is silent right now.";

const TEMPERATURE: f64 = 0.8;

#[derive(Error, Debug)]
pub enum ChatError {
    #[error("Chat API request failed: {0}")]
    Request(#[from] reqwest::Error),
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    temperature: f64,
    messages: Vec<Value>,
}

#[derive(Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: Option<ChoiceMessage>,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

impl CompletionResponse {
    fn into_reply(self) -> String {
        self.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message)
            .and_then(|message| message.content)
            .unwrap_or_else(|| SILENT_REPLY.to_string())
    }
}

pub struct ChatClient {
    http: Client,
    endpoint: String,
    api_key: String,
    model: String,
}

impl ChatClient {
    pub fn new(http: Client, endpoint: &str, api_key: &str, model: &str) -> Self {
        Self {
            http,
            endpoint: endpoint.to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
        }
    }

    /// Non-2xx answers are still parsed, an upstream error object yields [`SILENT_REPLY`].
    pub async fn reply(&self, messages: Vec<Value>) -> Result<String, ChatError> {
        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&self.request(messages))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            warn!("Chat API responded with {status}");
        }

        let completion: CompletionResponse = response.json().await?;

        Ok(completion.into_reply())
    }

    fn request(&self, messages: Vec<Value>) -> CompletionRequest<'_> {
        let mut prompt = Vec::with_capacity(messages.len() + 1);
        prompt.push(json!({ "role": "system", "content": SYSTEM_PROMPT }));
        prompt.extend(messages);

        CompletionRequest {
            model: &self.model,
            temperature: TEMPERATURE,
            messages: prompt,
        }
    }
}

#[cfg(test)]
mod tests {
    use axum::{
        Json, Router,
        http::{HeaderMap, StatusCode, header::AUTHORIZATION},
        routing::post,
    };
    use tokio::net::TcpListener;

    use super::*;

    const PATH: &str = "/v1/chat/completions";

    fn client(endpoint: &str) -> ChatClient {
        ChatClient::new(Client::new(), endpoint, "sk-test", "gpt-5")
    }

    async fn upstream(app: Router) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

        format!("http://{address}{PATH}")
    }

    /// Answers with the received request serialized as the reply text.
    async fn echo(headers: HeaderMap, Json(body): Json<Value>) -> Json<Value> {
        let received = json!({
            "authorization": headers[AUTHORIZATION].to_str().unwrap(),
            "body": body,
        });

        Json(json!({
            "choices": [{ "message": { "role": "assistant", "content": received.to_string() } }]
        }))
    }

    #[test]
    fn test_request_prepends_system_prompt() {
        let client = client(OPENAI_CHAT_ENDPOINT);
        let request = client.request(vec![json!({ "role": "user", "content": "hello" })]);
        let body = serde_json::to_value(&request).unwrap();

        assert_eq!(body["model"], "gpt-5");
        assert_eq!(body["temperature"], 0.8);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][0]["content"], SYSTEM_PROMPT);
        assert_eq!(body["messages"][1], json!({ "role": "user", "content": "hello" }));
    }

    #[test]
    fn test_reply_extraction() {
        let completion: CompletionResponse = serde_json::from_value(json!({
            "choices": [{ "message": { "role": "assistant", "content": "be still" } }]
        }))
        .unwrap();
        assert_eq!(completion.into_reply(), "be still");

        let upstream_error: CompletionResponse = serde_json::from_value(json!({
            "error": { "message": "quota exceeded" }
        }))
        .unwrap();
        assert_eq!(upstream_error.into_reply(), SILENT_REPLY);
    }

    #[tokio::test]
    async fn test_messages_forwarded_untouched() {
        let endpoint = upstream(Router::new().route(PATH, post(echo))).await;
        let message = json!({
            "role": "user",
            "name": "river",
            "content": [{ "type": "text", "text": "hi" }],
        });

        let reply = client(&endpoint).reply(vec![message.clone()]).await.unwrap();
        let received: Value = serde_json::from_str(&reply).unwrap();

        assert_eq!(received["authorization"], "Bearer sk-test");
        assert_eq!(received["body"]["messages"].as_array().unwrap().len(), 2);
        assert_eq!(received["body"]["messages"][0]["role"], "system");
        assert_eq!(received["body"]["messages"][1], message);
    }

    #[tokio::test]
    async fn test_upstream_error_body_is_silent() {
        let app = Router::new().route(
            PATH,
            post(|| async {
                (
                    StatusCode::TOO_MANY_REQUESTS,
                    Json(json!({ "error": { "message": "quota exceeded" } })),
                )
            }),
        );
        let endpoint = upstream(app).await;

        let reply = client(&endpoint).reply(Vec::new()).await.unwrap();

        assert_eq!(reply, SILENT_REPLY);
    }

    #[tokio::test]
    async fn test_non_json_body_fails() {
        let app = Router::new().route(
            PATH,
            post(|| async { (StatusCode::BAD_GATEWAY, "<html>bad gateway</html>") }),
        );
        let endpoint = upstream(app).await;

        let result = client(&endpoint).reply(Vec::new()).await;

        assert!(matches!(result, Err(ChatError::Request(_))));
    }

    #[tokio::test]
    async fn test_unreachable_upstream_fails() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        drop(listener);

        let result = client(&format!("http://{address}{PATH}")).reply(Vec::new()).await;

        assert!(matches!(result, Err(ChatError::Request(_))));
    }
}
