/// LLM Client: the single point of entry for all text-generation calls in the pipeline.
///
/// ARCHITECTURAL RULE: stages never talk to the provider directly. They receive an
/// `Arc<dyn TextGenerationService>` through the stage context, so tests can swap in
/// scripted fakes and `main` can wrap the real client in the `Retrying` decorator.
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::engine::{PartialResult, Schema};
use crate::errors::{BatchError, ParseError, ServiceError};

pub mod prompts;
pub mod retry;

pub use retry::Retrying;

/// Model used for every analysis call.
pub const ANALYSIS_MODEL: &str = "gpt-4";
/// Cheaper model used to summarise oversized stage outputs chunk by chunk.
pub const SUMMARY_MODEL: &str = "gpt-3.5-turbo";
pub const EMBEDDING_MODEL: &str = "text-embedding-3-small";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

// ────────────────────────────────────────────────────────────────────────────
// Messages and the service trait
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Anything that turns a conversation into a completion.
#[async_trait]
pub trait TextGenerationService: Send + Sync {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, ServiceError>;
}

// ────────────────────────────────────────────────────────────────────────────
// OpenAI wire types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct OpenAiError {
    error: OpenAiErrorBody,
}

#[derive(Debug, Deserialize)]
struct OpenAiErrorBody {
    message: String,
}

// ────────────────────────────────────────────────────────────────────────────
// OpenAiClient
// ────────────────────────────────────────────────────────────────────────────

/// Chat Completions and Embeddings client. One instance per model.
/// Makes exactly one HTTP attempt per call; retries belong to `Retrying`.
#[derive(Clone)]
pub struct OpenAiClient {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl OpenAiClient {
    pub fn new(api_key: String, base_url: &str, model: &str) -> Self {
        Self {
            client: Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .build()
                .expect("Failed to build HTTP client"),
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
        }
    }

    /// Same credentials and endpoint, different model.
    pub fn with_model(&self, model: &str) -> Self {
        Self {
            model: model.to_string(),
            ..self.clone()
        }
    }

    async fn post_json<B: Serialize>(&self, endpoint: &str, body: &B) -> Result<reqwest::Response, ServiceError> {
        let response = self
            .client
            .post(format!("{}/{}", self.base_url, endpoint))
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        // Prefer the provider's error message over the raw body
        let message = serde_json::from_str::<OpenAiError>(&body)
            .map(|e| e.error.message)
            .unwrap_or(body);
        Err(ServiceError::Api {
            status: status.as_u16(),
            message,
        })
    }

    /// Embeds each input, returning vectors in input order.
    pub async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, ServiceError> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }

        let request = EmbeddingRequest {
            model: &self.model,
            input: inputs,
        };
        let response: EmbeddingResponse = self.post_json("embeddings", &request).await?.json().await?;

        if response.data.len() != inputs.len() {
            return Err(ServiceError::UnexpectedPayload(format!(
                "expected {} embeddings, got {}",
                inputs.len(),
                response.data.len()
            )));
        }

        let mut data = response.data;
        data.sort_by_key(|d| d.index);
        Ok(data.into_iter().map(|d| d.embedding).collect())
    }
}

#[async_trait]
impl TextGenerationService for OpenAiClient {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, ServiceError> {
        let request = ChatRequest {
            model: &self.model,
            messages,
            temperature: 0.0,
        };

        let response: ChatResponse = self
            .post_json("chat/completions", &request)
            .await?
            .json()
            .await?;

        if let Some(usage) = &response.usage {
            debug!(
                "Completion succeeded: model={}, prompt_tokens={}, completion_tokens={}",
                self.model, usage.prompt_tokens, usage.completion_tokens
            );
        }

        response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|text| !text.trim().is_empty())
            .ok_or(ServiceError::EmptyContent)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Structured output helpers
// ────────────────────────────────────────────────────────────────────────────

/// Calls the service and parses the reply as JSON.
/// The prompt must instruct the model to return valid JSON.
pub async fn complete_json(
    service: &dyn TextGenerationService,
    messages: &[ChatMessage],
) -> Result<Value, BatchError> {
    let text = service.complete(messages).await?;

    // Strip markdown code fences if the model wraps JSON in them
    let text = strip_json_fences(&text);

    serde_json::from_str(text).map_err(|e| BatchError::Parse(ParseError::Json(e)))
}

/// Calls the service and validates the reply against `schema`.
pub async fn complete_structured(
    service: &dyn TextGenerationService,
    messages: &[ChatMessage],
    schema: &Schema,
) -> Result<PartialResult, BatchError> {
    let value = complete_json(service, messages).await?;
    Ok(schema.parse(&value)?)
}

/// Strips ```json ... ``` or ``` ... ``` code fences from LLM output.
pub fn strip_json_fences(text: &str) -> &str {
    let text = text.trim();
    let inner = text
        .strip_prefix("```json")
        .or_else(|| text.strip_prefix("```"));
    match inner {
        Some(stripped) => stripped
            .trim_start()
            .strip_suffix("```")
            .map(|s| s.trim())
            .unwrap_or(stripped.trim_start()),
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct Canned(&'static str);

    #[async_trait]
    impl TextGenerationService for Canned {
        async fn complete(&self, _messages: &[ChatMessage]) -> Result<String, ServiceError> {
            Ok(self.0.to_string())
        }
    }

    fn client(server: &MockServer) -> OpenAiClient {
        OpenAiClient::new("sk-test".to_string(), &server.uri(), ANALYSIS_MODEL)
    }

    #[test]
    fn test_strip_json_fences_with_json_tag() {
        let input = "```json\n{\"key\": \"value\"}\n```";
        assert_eq!(strip_json_fences(input), "{\"key\": \"value\"}");
    }

    #[test]
    fn test_strip_json_fences_without_tag() {
        let input = "```\n{\"key\": \"value\"}\n```";
        assert_eq!(strip_json_fences(input), "{\"key\": \"value\"}");
    }

    #[test]
    fn test_strip_json_fences_no_fences() {
        let input = "{\"key\": \"value\"}";
        assert_eq!(strip_json_fences(input), "{\"key\": \"value\"}");
    }

    #[test]
    fn test_messages_serialize_with_lowercase_roles() {
        let value = serde_json::to_value(ChatMessage::system("be terse")).unwrap();
        assert_eq!(value, json!({"role": "system", "content": "be terse"}));
    }

    #[tokio::test]
    async fn test_complete_returns_first_choice() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(json!({"model": "gpt-4", "temperature": 0.0})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"role": "assistant", "content": "{\"ok\": true}"}}],
                "usage": {"prompt_tokens": 12, "completion_tokens": 4}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let text = client(&server)
            .complete(&[ChatMessage::user("hello")])
            .await
            .expect("completion should succeed");
        assert_eq!(text, "{\"ok\": true}");
    }

    #[tokio::test]
    async fn test_error_status_carries_provider_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "error": {"message": "Incorrect API key provided"}
            })))
            .mount(&server)
            .await;

        let err = client(&server)
            .complete(&[ChatMessage::user("hello")])
            .await
            .unwrap_err();
        match err {
            ServiceError::Api { status, message } => {
                assert_eq!(status, 401);
                assert_eq!(message, "Incorrect API key provided");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_empty_choice_is_empty_content() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
            .mount(&server)
            .await;

        let err = client(&server)
            .complete(&[ChatMessage::user("hello")])
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::EmptyContent));
    }

    #[tokio::test]
    async fn test_embed_orders_by_index() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [
                    {"index": 1, "embedding": [0.0, 1.0]},
                    {"index": 0, "embedding": [1.0, 0.0]}
                ]
            })))
            .mount(&server)
            .await;

        let vectors = client(&server)
            .with_model(EMBEDDING_MODEL)
            .embed(&["first".to_string(), "second".to_string()])
            .await
            .unwrap();
        assert_eq!(vectors, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
    }

    #[tokio::test]
    async fn test_complete_json_strips_fences() {
        let service = Canned("```json\n{\"emerging_trends\": [\"rag\"]}\n```");
        let value = complete_json(&service, &[]).await.unwrap();
        assert_eq!(value, json!({"emerging_trends": ["rag"]}));
    }

    #[tokio::test]
    async fn test_prose_reply_is_parse_error() {
        let service = Canned("I'm sorry, I cannot help with that.");
        let err = complete_json(&service, &[]).await.unwrap_err();
        assert!(matches!(err, BatchError::Parse(_)));
    }

    #[tokio::test]
    async fn test_complete_structured_validates_schema() {
        let schema = Schema::new().counter("technical_skills");
        let service = Canned("{\"technical_skills\": [\"python\"]}");
        let err = complete_structured(&service, &[], &schema).await.unwrap_err();
        assert!(matches!(err, BatchError::Parse(ParseError::WrongShape { .. })));
    }
}
