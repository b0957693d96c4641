//! Workky Core
//!
//! Domain logic shared by the Workky API and custom LLM services: the merchant
//! business configuration, the voice-agent prompt builder, appointment
//! availability math, the calendar tool catalog, and the clients used to reach
//! Google and the upstream LLM.

pub mod agent_log;
pub mod availability;
pub mod business;
pub mod calendar;
pub mod google;
pub mod llm_client;
pub mod prompt;
pub mod storage;
pub mod tools;
