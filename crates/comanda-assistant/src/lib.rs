//! Downstream assistant layer for Comanda.
//!
//! # Architecture
//!
//! - [`traits::AssistantClient`] — trait the coalescer calls with a combined query
//! - [`http_assistant::HttpAssistant`] — `reqwest` client for the chatbot HTTP API

pub mod http_assistant;
pub mod traits;

pub use http_assistant::HttpAssistant;
pub use traits::{AssistantClient, AssistantError};
