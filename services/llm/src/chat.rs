//! `POST /chat/completions`: the voice agent's LLM endpoint.
//!
//! A non-streaming decision call runs first, before anything is written to the
//! response. If the model answers directly, a fresh streaming call is relayed.
//! If it asks for calendar tools, the caller first hears a short waiting phrase,
//! the tools run, and a follow-up completion over the tool results is relayed.

use axum::{
    body::Body,
    extract::{State, rejection::JsonRejection},
    http::{StatusCode, header},
    response::{IntoResponse, Json, Response},
};
use chrono::Utc;
use futures::StreamExt;
use serde_json::{Value, json};
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{error, info, warn};
use workky_core::{
    agent_log::{AgentLogPayload, TOOL_ERROR, TOOL_START},
    llm_client::{LLMAction, ToolCall},
    tools::{calendar_tools, classify_outcome, tool_label, waiting_message},
};

use crate::{
    models::{ChatCompletionRequest, ErrorResponse, without_nulls},
    sse::{SSE_DONE, SSE_HEARTBEAT, sse_data, waiting_chunk},
    state::AppState,
};

/// Frames buffered between the completion task and the response body.
const FRAME_BUFFER: usize = 32;

pub enum ApiError {
    BadRequest(String),
    InternalServerError(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::BadRequest(message) => {
                (StatusCode::BAD_REQUEST, Json(ErrorResponse::new(message))).into_response()
            }
            ApiError::InternalServerError(err) => {
                error!("Internal Server Error: {:?}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ErrorResponse::new("An internal server error occurred.")),
                )
                    .into_response()
            }
        }
    }
}

impl<E> From<E> for ApiError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self::InternalServerError(err.into())
    }
}

#[derive(Debug, thiserror::Error)]
enum ReplyError {
    #[error("client disconnected")]
    Disconnected,
    #[error(transparent)]
    Llm(#[from] anyhow::Error),
}

type Frames = mpsc::Sender<String>;

async fn emit(tx: &Frames, frame: String) -> Result<(), ReplyError> {
    tx.send(frame).await.map_err(|_| ReplyError::Disconnected)
}

pub async fn chat_completions(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ChatCompletionRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(request) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    if !request.stream {
        return Err(ApiError::BadRequest(
            "chat completions require streaming".to_string(),
        ));
    }

    let model = request
        .model
        .unwrap_or_else(|| state.default_model.clone());
    let messages: Vec<Value> = request.messages.into_iter().map(without_nulls).collect();
    let mut tools = calendar_tools();
    tools.extend(request.tools.unwrap_or_default());

    info!(%model, messages = messages.len(), tools = tools.len(), "Received chat completion request");

    // Decided before the first byte is sent so the waiting phrase, when
    // needed, is the first thing the caller hears.
    let action = state
        .llm
        .decide_action(model.clone(), messages.clone(), tools)
        .await?;

    let (tx, rx) = mpsc::channel(FRAME_BUFFER);
    tokio::spawn(async move {
        let result = match action {
            LLMAction::TextResponse(_) => relay_completion(&state, &model, messages, &tx).await,
            LLMAction::ToolCall(calls) => answer_with_tools(&state, &model, messages, calls, &tx).await,
        };
        match result {
            Ok(()) => {}
            Err(ReplyError::Disconnected) => info!("Client disconnected before the reply finished"),
            Err(ReplyError::Llm(e)) => error!(error = ?e, "Completion stream failed"),
        }
    });

    let body = Body::from_stream(ReceiverStream::new(rx).map(Ok::<_, Infallible>));
    Ok((
        [
            (header::CONTENT_TYPE, "text/event-stream"),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        body,
    )
        .into_response())
}

/// Streams a completion over `messages` to the client, then `[DONE]`.
async fn relay_completion(
    state: &AppState,
    model: &str,
    messages: Vec<Value>,
    tx: &Frames,
) -> Result<(), ReplyError> {
    let mut stream = state
        .llm
        .stream_completion(model.to_string(), messages)
        .await?;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(anyhow::Error::from)?;
        emit(tx, sse_data(&chunk)).await?;
    }
    emit(tx, SSE_DONE.to_string()).await
}

async fn answer_with_tools(
    state: &AppState,
    model: &str,
    messages: Vec<Value>,
    calls: Vec<ToolCall>,
    tx: &Frames,
) -> Result<(), ReplyError> {
    let first_tool = calls
        .first()
        .map(|call| call.function.name.as_str())
        .unwrap_or_default();

    emit(tx, sse_data(&waiting_chunk(model, waiting_message(first_tool), Utc::now()))).await?;
    emit(tx, SSE_HEARTBEAT.to_string()).await?;
    tokio::time::sleep(state.waiting_delay).await;

    if tx.is_closed() {
        return Err(ReplyError::Disconnected);
    }

    let mut tool_messages = Vec::with_capacity(calls.len());
    for call in &calls {
        let name = call.function.name.as_str();
        let args = call.parsed_arguments();

        state
            .agent_log
            .report(AgentLogPayload::new(TOOL_START, name, tool_label(name)).with_args(args.clone()))
            .await;

        let result = state.tools.execute(name, &args).await;
        let outcome = classify_outcome(&result);
        if outcome.kind == TOOL_ERROR {
            warn!(tool = name, %result, "Tool reported an error");
        }

        state
            .agent_log
            .report(AgentLogPayload::new(outcome.kind, name, outcome.label))
            .await;

        tool_messages.push(json!({
            "role": "tool",
            "tool_call_id": call.id,
            "content": result.to_string(),
        }));
    }

    let mut follow_up = messages;
    follow_up.push(json!({
        "role": "assistant",
        "content": null,
        "tool_calls": calls.iter().map(ToolCall::to_message_json).collect::<Vec<_>>(),
    }));
    follow_up.extend(tool_messages);

    relay_completion(state, model, follow_up, tx).await
}
