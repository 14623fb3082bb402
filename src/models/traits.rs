//! Answer model trait abstraction
//!
//! Defines the capability the evaluation pipeline consumes: given a question
//! (with its options already in presentation order) and the option prefixes,
//! return the text of exactly one presented option.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::config::ModelId;
use crate::errors::ModelError;
use crate::questions::Question;

/// Unified trait for model clients
///
/// Implementations must only return `Ok` with a string that equals one of
/// `question.options`; anything else is an error so the caller can retry.
#[async_trait]
pub trait AnswerModel: Send + Sync {
    /// Ask the model to pick one of `question.options`.
    ///
    /// `prefixes[i]` labels `question.options[i]` in the prompt.
    async fn answer(&self, question: &Question, prefixes: &[String]) -> Result<String, ModelError>;

    /// Provider model name, for logs
    fn model_name(&self) -> &str;
}

/// Model clients keyed by model id
///
/// Built once from configuration and handed to the answer collector.
#[derive(Clone, Default)]
pub struct ModelRegistry {
    clients: BTreeMap<ModelId, Arc<dyn AnswerModel>>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the client for `id`
    pub fn register(&mut self, id: ModelId, client: Arc<dyn AnswerModel>) {
        self.clients.insert(id, client);
    }

    /// Builder-style [`register`](Self::register)
    pub fn with(mut self, id: ModelId, client: Arc<dyn AnswerModel>) -> Self {
        self.register(id, client);
        self
    }

    /// Client for `id`, or `ModelError::NotConfigured`
    pub fn get(&self, id: ModelId) -> Result<Arc<dyn AnswerModel>, ModelError> {
        self.clients
            .get(&id)
            .cloned()
            .ok_or_else(|| ModelError::NotConfigured(id.to_string()))
    }

    /// Configured ids in stable order
    pub fn ids(&self) -> Vec<ModelId> {
        self.clients.keys().copied().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }
}

impl std::fmt::Debug for ModelRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map()
            .entries(self.clients.iter().map(|(id, c)| (id, c.model_name())))
            .finish()
    }
}
