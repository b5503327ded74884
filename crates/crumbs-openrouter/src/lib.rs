//! Crumbs OpenRouter: chat-completions transport for the analysis engine
//!
//! Implements `crumbs_core::CompletionClient` over the OpenRouter HTTP API.
//! Authentication, endpoint selection and response decoding live here so
//! the core engine stays free of network code.
//!
//! ## Key Components
//!
//! - `OpenRouterConfig`: API key, model and endpoint, usually from the environment
//! - `OpenRouterClient`: one POST to `/chat/completions` per request

pub mod client;
pub mod config;
pub mod error;

pub use client::{completion_text, OpenRouterClient};
pub use config::{OpenRouterConfig, DEFAULT_BASE_URL, DEFAULT_TIMEOUT_SECS};
pub use error::{OpenRouterError, Result};
