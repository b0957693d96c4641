//! Workky Custom LLM Library Crate
//!
//! An OpenAI-compatible `chat/completions` endpoint that the hosted voice
//! agent calls instead of a plain LLM. It runs the merchant's calendar tools
//! between the model's decision and its spoken answer.

pub mod chat;
pub mod config;
pub mod models;
pub mod reporter;
pub mod router;
pub mod sse;
pub mod state;
