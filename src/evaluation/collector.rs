//! Answer collection
//!
//! Runs `n_evals` independent trials of one question variant against one
//! model. Trials are dispatched together and joined in index order, so slot
//! `i` of the result always belongs to trial `i`. Each trial retries
//! immediately on any client error until its attempt budget is spent, then
//! records `None`.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use backon::{ConstantBuilder, Retryable};
use futures_util::future::join_all;
use tracing::{debug, warn};

use crate::config::ModelId;
use crate::errors::ModelError;
use crate::models::{AnswerModel, ModelRegistry};
use crate::questions::Question;

/// Collects repeated answers from the configured model clients
#[derive(Debug, Clone)]
pub struct AnswerCollector {
    registry: ModelRegistry,
}

impl AnswerCollector {
    pub fn new(registry: ModelRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    /// Ask `model` the question `n_evals` times, concurrently.
    ///
    /// Returns exactly `n_evals` slots. The only error is a model id with no
    /// configured client; trial failures show up as `None` slots.
    pub async fn collect(
        &self,
        question: &Question,
        prefixes: &[String],
        model: ModelId,
        n_evals: usize,
        max_retries: usize,
    ) -> Result<Vec<Option<String>>, ModelError> {
        let client = self.registry.get(model)?;
        Ok(collect_with(client.as_ref(), question, prefixes, n_evals, max_retries).await)
    }
}

/// [`AnswerCollector::collect`] against an already-resolved client.
pub async fn collect_with(
    client: &dyn AnswerModel,
    question: &Question,
    prefixes: &[String],
    n_evals: usize,
    max_retries: usize,
) -> Vec<Option<String>> {
    let trials = (0..n_evals).map(|trial_index| {
        run_trial(client, question, prefixes, trial_index, max_retries)
    });
    join_all(trials).await
}

/// One trial: up to `max_retries` attempts (at least one), no delay between them.
async fn run_trial(
    client: &dyn AnswerModel,
    question: &Question,
    prefixes: &[String],
    trial_index: usize,
    max_retries: usize,
) -> Option<String> {
    let max_attempts = max_retries.max(1);
    let attempts = AtomicUsize::new(0);
    let attempts_ref = &attempts;

    let backoff = ConstantBuilder::default()
        .with_delay(Duration::ZERO)
        .with_max_times(max_attempts - 1);

    let result = (move || async move {
        let attempt = attempts_ref.fetch_add(1, Ordering::Relaxed) + 1;
        debug!(
            "trial {} attempt {}/{}: question='{}' model={}",
            trial_index,
            attempt,
            max_attempts,
            question.name,
            client.model_name()
        );
        client.answer(question, prefixes).await
    })
    .retry(backoff)
    .sleep(tokio::time::sleep)
    .notify(|err: &ModelError, _| {
        warn!(
            "Attempt {} of trial {} failed for '{}' ({}), retrying: {}",
            attempts_ref.load(Ordering::Relaxed),
            trial_index,
            question.name,
            client.model_name(),
            err
        );
    })
    .await;

    match result {
        Ok(answer) => Some(answer),
        Err(err) => {
            warn!(
                question = %question.name,
                model = %client.model_name(),
                trial = trial_index,
                attempts = attempts.load(Ordering::Relaxed),
                "Trial failed permanently, no answer recorded: {}",
                err
            );
            None
        }
    }
}
