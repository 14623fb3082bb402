//! Model clients
//!
//! Provides a unified trait for answering multiple-choice questions and the
//! OpenAI-compatible HTTP implementation used for every configured model:
//! - gpt4mini / gpt4o (OpenAI, function-calling output)
//! - llama (local server, JSON-in-markdown output)

pub mod openai_compat;
pub mod traits;

pub use openai_compat::OpenAiCompatClient;
pub use traits::{AnswerModel, ModelRegistry};

use std::sync::Arc;

use crate::config::Config;
use crate::errors::ModelError;

/// Build one client per `[[models]]` entry.
///
/// Fails on the first entry whose API key variable is unset.
pub fn registry_from_config(config: &Config) -> Result<ModelRegistry, ModelError> {
    let mut registry = ModelRegistry::new();
    for model in &config.models {
        let client = OpenAiCompatClient::from_config(model, &config.eval)?;
        registry.register(model.id, Arc::new(client));
    }
    Ok(registry)
}
