//! Grounded answers: retrieved chunks plus a system instruction sent to a chat model

use crate::retrieval::{DEFAULT_TOP_K, RetrievalError, RetrievedChunk, Retriever};
use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error};

pub const DEFAULT_SYSTEM_PROMPT: &str = "Ты ассистент, который отвечает на вопросы пользователя \
по документам. Отвечай только на основе переданного контекста. Если в контексте нет ответа, \
честно скажи об этом. В конце ответа укажи источники: название документа, ссылку и страницы \
из метаданных.";

pub const EMPTY_CONTEXT_MESSAGE: &str =
    "Извините, не удалось найти релевантный контекст для ответа.";
pub const GENERATION_ERROR_MESSAGE: &str = "Произошла ошибка при генерации ответа.";

#[derive(thiserror::Error, Debug)]
pub enum ChatError {
    #[error("no relevant context found for the query")]
    EmptyContext,

    #[error("Network error: {0}")]
    Network(#[source] reqwest::Error),

    #[error("Chat provider error: {0}")]
    Provider(String),

    #[error("Retrieval error: {0}")]
    Retrieval(#[source] RetrievalError),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

pub type Result<T> = std::result::Result<T, ChatError>;

impl ChatError {
    pub fn provider<S: Into<String>>(msg: S) -> Self {
        Self::Provider(msg.into())
    }

    /// Text shown to the end user in place of an answer
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::EmptyContext => EMPTY_CONTEXT_MESSAGE,
            _ => GENERATION_ERROR_MESSAGE,
        }
    }
}

impl From<reqwest::Error> for ChatError {
    fn from(e: reqwest::Error) -> Self {
        Self::Network(e)
    }
}

impl From<RetrievalError> for ChatError {
    fn from(e: RetrievalError) -> Self {
        match e {
            RetrievalError::Network(e) => Self::Network(e),
            other => Self::Retrieval(other),
        }
    }
}

/// Selectable chat models and the provider model id behind each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ChatModel {
    #[default]
    Lite,
    Pro,
    Max,
}

impl ChatModel {
    pub const ALL: [ChatModel; 3] = [ChatModel::Lite, ChatModel::Pro, ChatModel::Max];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Lite => "gigachat-lite",
            Self::Pro => "gigachat-pro",
            Self::Max => "gigachat-max",
        }
    }

    pub fn model_id(&self) -> &'static str {
        match self {
            Self::Lite => "GigaChat",
            Self::Pro => "GigaChat-Pro",
            Self::Max => "GigaChat-Max",
        }
    }
}

impl fmt::Display for ChatModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ChatModel {
    type Err = ChatError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        Self::ALL
            .into_iter()
            .find(|m| m.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| ChatError::Configuration(format!("Неподдерживаемый провайдер: {s}")))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
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

/// Render retrieved chunks as the context block of the user turn.
pub fn format_context(context: &[RetrievedChunk]) -> String {
    context
        .iter()
        .map(|item| {
            let m = &item.metadata;
            format!(
                "Текст: {}\nМетаданные:\ntitle: {}\nurl: {}\npage: {}\nid: {}\n",
                item.text, m.title, m.url, m.page, m.id
            )
        })
        .collect::<Vec<_>>()
        .join("\n---\n")
}

pub fn user_prompt(query: &str, formatted_context: &str) -> String {
    format!("Вопрос: {query}\nКонтекст: {formatted_context}")
}

/// A chat completion backend.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    async fn complete(&self, model: ChatModel, messages: &[ChatMessage]) -> Result<String>;
}

/// Client for OpenAI-compatible `/chat/completions` endpoints.
pub struct HttpChatProvider {
    client: reqwest::Client,
    endpoint: String,
    temperature: Option<f32>,
    max_tokens: Option<usize>,
}

impl HttpChatProvider {
    pub fn new(api_key: Option<&str>, base_url: &str, timeout: Duration) -> Result<Self> {
        let mut headers = HeaderMap::new();
        if let Some(key) = api_key.map(str::trim).filter(|k| !k.is_empty()) {
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&format!("Bearer {key}"))
                    .map_err(|_| ChatError::Configuration("invalid API key".to_string()))?,
            );
        }
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()?;
        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            temperature: None,
            max_tokens: None,
        })
    }

    pub fn with_temperature(self, temperature: f32) -> Self {
        Self {
            temperature: Some(temperature),
            ..self
        }
    }

    pub fn with_max_tokens(self, max_tokens: usize) -> Self {
        Self {
            max_tokens: Some(max_tokens),
            ..self
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl ChatProvider for HttpChatProvider {
    async fn complete(&self, model: ChatModel, messages: &[ChatMessage]) -> Result<String> {
        let body = ChatRequest {
            model: model.model_id(),
            messages,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };
        let resp = self.client.post(&self.endpoint).json(&body).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            return Err(ChatError::provider(format!(
                "chat provider returned {status}: {text}"
            )));
        }
        let parsed: ChatResponse = resp
            .json()
            .await
            .map_err(|e| ChatError::provider(format!("failed to parse chat response: {e}")))?;
        parsed.into_content()
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: AssistantMessage,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    content: String,
}

impl ChatResponse {
    fn into_content(self) -> Result<String> {
        self.choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| ChatError::provider("chat response has no choices"))
    }
}

/// Answers questions from retrieved context with one chat model.
pub struct Assistant {
    retriever: Arc<Retriever>,
    provider: Arc<dyn ChatProvider>,
    model: ChatModel,
    system_prompt: String,
    top_k: usize,
}

impl Assistant {
    pub fn new(retriever: Arc<Retriever>, provider: Arc<dyn ChatProvider>, model: ChatModel) -> Self {
        Self {
            retriever,
            provider,
            model,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            top_k: DEFAULT_TOP_K,
        }
    }

    pub fn with_system_prompt(self, system_prompt: impl Into<String>) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            ..self
        }
    }

    pub fn with_top_k(self, top_k: usize) -> Self {
        Self { top_k, ..self }
    }

    pub fn model(&self) -> ChatModel {
        self.model
    }

    pub fn set_model(&mut self, model: ChatModel) {
        self.model = model;
    }

    /// System instruction followed by one user turn carrying the question and its context.
    pub fn build_messages(&self, query: &str, context: &[RetrievedChunk]) -> Vec<ChatMessage> {
        vec![
            ChatMessage::system(self.system_prompt.as_str()),
            ChatMessage::user(user_prompt(query, &format_context(context))),
        ]
    }

    pub async fn generate_response(&self, query: &str) -> Result<String> {
        let context = self
            .retriever
            .get_relevant_context(query, self.top_k)
            .await?;
        if context.is_empty() {
            return Err(ChatError::EmptyContext);
        }
        let messages = self.build_messages(query, &context);
        debug!(
            "asking {} with {} context chunks",
            self.model.model_id(),
            context.len()
        );
        self.provider.complete(self.model, &messages).await
    }

    /// Like [`Self::generate_response`], with failures logged and replaced by the user-facing fallback text.
    pub async fn respond(&self, query: &str) -> String {
        match self.generate_response(query).await {
            Ok(answer) => answer,
            Err(e) => {
                error!("failed to generate response: {:?}", e);
                e.user_message().to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retrieval::tests::{KeywordEmbedder, sample_chunks};
    use crate::retrieval::{ChunkMetadata, LocalVectorIndex, build_index};
    use crate::text::chunking::PageSpan;
    use std::sync::Mutex;
    use uuid::Uuid;

    #[derive(Default)]
    struct RecordingProvider {
        calls: Mutex<Vec<(ChatModel, Vec<ChatMessage>)>>,
    }

    #[async_trait]
    impl ChatProvider for RecordingProvider {
        async fn complete(&self, model: ChatModel, messages: &[ChatMessage]) -> Result<String> {
            self.calls.lock().unwrap().push((model, messages.to_vec()));
            Ok("Ответ по документу".to_string())
        }
    }

    struct FailingProvider;

    #[async_trait]
    impl ChatProvider for FailingProvider {
        async fn complete(&self, _model: ChatModel, _messages: &[ChatMessage]) -> Result<String> {
            Err(ChatError::provider("503 Service Unavailable"))
        }
    }

    async fn retriever(with_chunks: bool) -> Arc<Retriever> {
        let embedder = Arc::new(KeywordEmbedder::default());
        let dir = tempfile::tempdir().unwrap();
        let mut index = LocalVectorIndex::new(dir.path());
        if with_chunks {
            build_index(&sample_chunks(), embedder.as_ref(), &mut index, 8)
                .await
                .unwrap();
        }
        Arc::new(Retriever::new(embedder, Arc::new(index)))
    }

    fn retrieved(text: &str, page: PageSpan) -> RetrievedChunk {
        RetrievedChunk {
            text: text.to_string(),
            metadata: ChunkMetadata {
                title: "Doc".to_string(),
                url: "https://example.com/doc.pdf".to_string(),
                page,
                id: Uuid::nil(),
            },
            score: 0.5,
        }
    }

    #[test]
    fn test_chat_model_selection() {
        assert_eq!("gigachat-lite".parse::<ChatModel>().unwrap().model_id(), "GigaChat");
        assert_eq!("gigachat-pro".parse::<ChatModel>().unwrap().model_id(), "GigaChat-Pro");
        assert_eq!("GigaChat-Max".parse::<ChatModel>().unwrap(), ChatModel::Max);
        assert!(matches!(
            "gpt-4".parse::<ChatModel>(),
            Err(ChatError::Configuration(_))
        ));
        assert_eq!(ChatModel::default().to_string(), "gigachat-lite");
    }

    #[test]
    fn test_format_context() {
        let context = vec![
            retrieved("первый", PageSpan { first: 1, last: 2 }),
            retrieved("второй", PageSpan::single(3)),
        ];
        let nil = Uuid::nil();
        assert_eq!(
            format_context(&context),
            format!(
                "Текст: первый\nМетаданные:\ntitle: Doc\nurl: https://example.com/doc.pdf\npage: 1-2\nid: {nil}\n\
                 \n---\n\
                 Текст: второй\nМетаданные:\ntitle: Doc\nurl: https://example.com/doc.pdf\npage: 3\nid: {nil}\n"
            )
        );
        assert_eq!(format_context(&[]), "");
    }

    #[test]
    fn test_chat_response_parsing() {
        let parsed: ChatResponse =
            serde_json::from_str(r#"{"choices": [{"message": {"role": "assistant", "content": "Да"}}]}"#)
                .unwrap();
        assert_eq!(parsed.into_content().unwrap(), "Да");
        let parsed: ChatResponse = serde_json::from_str(r#"{"choices": []}"#).unwrap();
        assert!(matches!(parsed.into_content(), Err(ChatError::Provider(_))));
    }

    #[test]
    fn test_request_serialization() {
        let messages = vec![ChatMessage::system("s"), ChatMessage::user("u")];
        let body = ChatRequest {
            model: ChatModel::Pro.model_id(),
            messages: &messages,
            temperature: None,
            max_tokens: Some(512),
        };
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["model"], "GigaChat-Pro");
        assert_eq!(value["messages"][0]["role"], "system");
        assert_eq!(value["messages"][1]["content"], "u");
        assert_eq!(value["max_tokens"], 512);
        assert!(value.get("temperature").is_none());
    }

    #[test]
    fn test_http_chat_provider_endpoint() {
        let provider =
            HttpChatProvider::new(Some("key"), "https://llm.example.com/api/v1/", Duration::from_secs(5))
                .unwrap()
                .with_temperature(0.7)
                .with_max_tokens(512);
        assert_eq!(provider.endpoint(), "https://llm.example.com/api/v1/chat/completions");
        assert_eq!(provider.temperature, Some(0.7));
    }

    #[tokio::test]
    async fn test_generate_response() {
        let provider = Arc::new(RecordingProvider::default());
        let assistant = Assistant::new(retriever(true).await, provider.clone(), ChatModel::Pro)
            .with_system_prompt("system")
            .with_top_k(2);

        let answer = assistant.generate_response("Когда платить налог?").await.unwrap();
        assert_eq!(answer, "Ответ по документу");

        let calls = provider.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        let (model, messages) = &calls[0];
        assert_eq!(*model, ChatModel::Pro);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0], ChatMessage::system("system"));
        assert_eq!(messages[1].role, Role::User);
        assert!(messages[1].content.starts_with("Вопрос: Когда платить налог?\nКонтекст: Текст: Налог"));
        assert_eq!(messages[1].content.matches("\n---\n").count(), 1);
    }

    #[tokio::test]
    async fn test_empty_context() {
        let provider = Arc::new(RecordingProvider::default());
        let assistant = Assistant::new(retriever(false).await, provider.clone(), ChatModel::Lite);

        let err = assistant.generate_response("налог").await.unwrap_err();
        assert!(matches!(err, ChatError::EmptyContext));
        assert_eq!(assistant.respond("налог").await, EMPTY_CONTEXT_MESSAGE);
        assert!(provider.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_provider_failure_fallback() {
        let assistant = Assistant::new(retriever(true).await, Arc::new(FailingProvider), ChatModel::Max);
        let err = assistant.generate_response("срок").await.unwrap_err();
        assert!(matches!(err, ChatError::Provider(_)));
        assert_eq!(assistant.respond("срок").await, GENERATION_ERROR_MESSAGE);
    }

    #[test]
    fn test_retrieval_error_mapping() {
        let err: ChatError = RetrievalError::DimensionMismatch {
            expected: 2,
            actual: 3,
        }
        .into();
        assert!(matches!(err, ChatError::Retrieval(_)));
        assert_eq!(err.user_message(), GENERATION_ERROR_MESSAGE);
        assert_eq!(ChatError::EmptyContext.user_message(), EMPTY_CONTEXT_MESSAGE);
    }
}
