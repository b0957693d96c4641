use anyhow::{Result, anyhow};
use async_openai::{Client, config::OpenAIConfig, error::OpenAIError};
use async_trait::async_trait;
use futures::Stream;
use serde::Deserialize;
use serde_json::{Value, json};
use std::pin::Pin;

/// A tool call requested by the LLM, with its arguments still JSON-encoded.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub function: FunctionCall,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    #[serde(default)]
    pub arguments: String,
}

impl ToolCall {
    /// The call as it appears in an assistant message of the follow-up request.
    pub fn to_message_json(&self) -> Value {
        json!({
            "id": self.id,
            "type": "function",
            "function": {
                "name": self.function.name,
                "arguments": self.function.arguments,
            },
        })
    }

    /// Decoded arguments; malformed JSON yields an empty object.
    pub fn parsed_arguments(&self) -> Value {
        serde_json::from_str(&self.function.arguments)
            .ok()
            .filter(Value::is_object)
            .unwrap_or_else(|| json!({}))
    }
}

/// A stream of raw `chat.completion.chunk` objects, forwarded to the caller as-is.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<Value, OpenAIError>> + Send>>;

/// Represents the two possible outcomes of the LLM's initial decision-making turn.
#[derive(Debug, Clone, PartialEq)]
pub enum LLMAction {
    /// The LLM decided to respond directly with text.
    TextResponse(String),
    /// The LLM decided to call one or more tools.
    ToolCall(Vec<ToolCall>),
}

#[derive(Deserialize)]
struct DecisionResponse {
    choices: Vec<DecisionChoice>,
}

#[derive(Deserialize)]
struct DecisionChoice {
    message: DecisionMessage,
}

#[derive(Deserialize)]
struct DecisionMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ToolCall>>,
}

/// A generic client for interacting with an LLM.
///
/// Messages and tools are passed through as OpenAI-format JSON so requests
/// relayed from the voice platform keep fields this service does not model.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LLMClient: Send + Sync {
    /// Makes a single, non-streaming call to the LLM to decide on the next action.
    async fn decide_action(
        &self,
        model: String,
        messages: Vec<Value>,
        tools: Vec<Value>,
    ) -> Result<LLMAction>;

    /// Makes a streaming call to the LLM without tools.
    async fn stream_completion(&self, model: String, messages: Vec<Value>)
    -> Result<ChunkStream>;
}

/// An implementation of `LLMClient` for any OpenAI-compatible API.
pub struct OpenAICompatibleClient {
    client: Client<OpenAIConfig>,
}

impl OpenAICompatibleClient {
    /// Creates a new client for an OpenAI-compatible service.
    ///
    /// # Arguments
    ///
    /// * `config` - The configuration for the OpenAI client, including API key and base URL.
    pub fn new(config: OpenAIConfig) -> Self {
        Self {
            client: Client::with_config(config),
        }
    }
}

fn parse_decision(response: DecisionResponse) -> Result<LLMAction> {
    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("LLM response contained no choices."))?;

    match (choice.message.tool_calls, choice.message.content) {
        (Some(tool_calls), _) if !tool_calls.is_empty() => Ok(LLMAction::ToolCall(tool_calls)),
        (_, Some(content)) => Ok(LLMAction::TextResponse(content)),
        _ => Err(anyhow!(
            "LLM response had neither text content nor tool calls."
        )),
    }
}

#[async_trait]
impl LLMClient for OpenAICompatibleClient {
    async fn decide_action(
        &self,
        model: String,
        messages: Vec<Value>,
        tools: Vec<Value>,
    ) -> Result<LLMAction> {
        let request = json!({
            "model": model,
            "messages": messages,
            "tools": tools,
            "tool_choice": "auto",
            "stream": false,
        });

        let response: DecisionResponse = self.client.chat().create_byot(request).await?;
        parse_decision(response)
    }

    async fn stream_completion(
        &self,
        model: String,
        messages: Vec<Value>,
    ) -> Result<ChunkStream> {
        let request = json!({
            "model": model,
            "messages": messages,
            "stream": true,
        });

        let stream = self
            .client
            .chat()
            .create_stream_byot::<Value, Value>(request)
            .await?;
        Ok(stream)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decision(body: Value) -> Result<LLMAction> {
        parse_decision(serde_json::from_value(body).unwrap())
    }

    #[test]
    fn test_tool_calls_take_precedence_over_content() {
        let action = decision(json!({"choices": [{"message": {
            "content": "",
            "tool_calls": [{"id": "call_1", "type": "function",
                "function": {"name": "check_availability", "arguments": "{\"date\":\"2025-03-10\"}"}}]
        }}]}))
        .unwrap();

        let LLMAction::ToolCall(calls) = action else {
            panic!("expected tool call");
        };
        assert_eq!(calls[0].function.name, "check_availability");
        assert_eq!(calls[0].parsed_arguments()["date"], "2025-03-10");
    }

    #[test]
    fn test_text_response_and_empty_choice() {
        let action = decision(json!({"choices": [{"message": {"content": "Hi there", "tool_calls": []}}]}));
        assert_eq!(action.unwrap(), LLMAction::TextResponse("Hi there".to_string()));

        assert!(decision(json!({"choices": []})).is_err());
        assert!(decision(json!({"choices": [{"message": {}}]})).is_err());
    }

    #[test]
    fn test_malformed_arguments_become_empty_object() {
        let call = ToolCall {
            id: "c".to_string(),
            function: FunctionCall {
                name: "book_appointment".to_string(),
                arguments: "{not json".to_string(),
            },
        };
        assert_eq!(call.parsed_arguments(), json!({}));
        assert_eq!(call.to_message_json()["function"]["arguments"], "{not json");
    }
}
