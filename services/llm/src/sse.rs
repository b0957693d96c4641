//! Server-sent event framing for `chat.completion.chunk` streams.

use chrono::{DateTime, Utc};
use serde_json::{Value, json};
use uuid::Uuid;

/// Terminates a completion stream.
pub const SSE_DONE: &str = "data: [DONE]\n\n";

/// Comment frame; ignored by SSE parsers but flushes buffered chunks.
pub const SSE_HEARTBEAT: &str = ": heartbeat\n\n";

pub fn sse_data(value: &Value) -> String {
    format!("data: {value}\n\n")
}

fn chunk_id() -> String {
    let id = Uuid::new_v4().simple().to_string();
    format!("chatcmpl-{}", &id[..8])
}

/// A `chat.completion.chunk` carrying `message` as ordinary assistant text.
/// It leaves `finish_reason` unset so the turn stays open for the answer
/// that follows.
pub fn waiting_chunk(model: &str, message: &str, created: DateTime<Utc>) -> Value {
    json!({
        "id": chunk_id(),
        "object": "chat.completion.chunk",
        "created": created.timestamp(),
        "model": model,
        "choices": [{
            "index": 0,
            "delta": { "content": message },
            "finish_reason": null,
        }],
    })
}
