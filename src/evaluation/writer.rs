//! Result writer
//!
//! Turns collected trial slots into stored answers. Absent slots are
//! skipped without writing anything. Writes for one rotation are issued
//! concurrently and a failed write is reported on its own without
//! cancelling the others.

use std::sync::Arc;

use futures_util::future::join_all;
use tracing::{debug, warn};

use crate::config::ModelId;
use crate::errors::StoreError;
use crate::questions::Question;
use crate::store::{AnswerKey, AnswerStore};

/// What happened to one trial slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistOutcome {
    Written,
    /// The trial produced no answer
    Skipped,
}

/// Outcome of persisting every slot of one rotation
#[derive(Debug, Default)]
pub struct WriteReport {
    pub written: usize,
    pub skipped: usize,
    /// Trial index and the error its write returned
    pub failed: Vec<(usize, StoreError)>,
}

impl WriteReport {
    pub fn failed_count(&self) -> usize {
        self.failed.len()
    }
}

#[derive(Clone)]
pub struct ResultWriter {
    store: Arc<dyn AnswerStore>,
}

impl ResultWriter {
    pub fn new(store: Arc<dyn AnswerStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn AnswerStore> {
        &self.store
    }

    /// Store one trial's answer under its composite key.
    ///
    /// `text == None` performs no write. No retries at this layer.
    #[allow(clippy::too_many_arguments)]
    pub async fn persist(
        &self,
        question: &Question,
        model: ModelId,
        style_name: &str,
        options: &[String],
        rotation: usize,
        trial_index: usize,
        text: Option<&str>,
    ) -> Result<PersistOutcome, StoreError> {
        let Some(text) = text else {
            debug!(
                "Skipping absent answer: question='{}' model={} style='{}' trial={}",
                question.name, model, style_name, trial_index
            );
            return Ok(PersistOutcome::Skipped);
        };

        let key = AnswerKey {
            question_name: question.name.clone(),
            model_name: model.name().to_string(),
            option_style: style_name.to_string(),
            options: options.to_vec(),
            trial_index,
        };
        self.store.upsert_answer(&key, rotation, text).await?;
        Ok(PersistOutcome::Written)
    }

    /// Persist every slot of one rotation; slot `i` is trial `i`.
    pub async fn persist_all(
        &self,
        question: &Question,
        model: ModelId,
        style_name: &str,
        options: &[String],
        rotation: usize,
        slots: &[Option<String>],
    ) -> WriteReport {
        let writes = slots.iter().enumerate().map(|(trial_index, text)| async move {
            let outcome = self
                .persist(
                    question,
                    model,
                    style_name,
                    options,
                    rotation,
                    trial_index,
                    text.as_deref(),
                )
                .await;
            (trial_index, outcome)
        });

        let mut report = WriteReport::default();
        for (trial_index, outcome) in join_all(writes).await {
            match outcome {
                Ok(PersistOutcome::Written) => report.written += 1,
                Ok(PersistOutcome::Skipped) => report.skipped += 1,
                Err(e) => {
                    warn!(
                        question = %question.name,
                        model = %model,
                        style = style_name,
                        rotation,
                        trial = trial_index,
                        "Failed to store answer: {}",
                        e
                    );
                    report.failed.push((trial_index, e));
                }
            }
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tracing::{Event, Level, Subscriber};
    use tracing_subscriber::layer::{Context, SubscriberExt};
    use tracing_subscriber::Layer;

    use crate::questions::builtin_questions;
    use crate::store::MemoryStore;

    /// Records the level of every event emitted on the current thread
    #[derive(Clone, Default)]
    struct LevelRecorder(Arc<Mutex<Vec<Level>>>);

    impl<S: Subscriber> Layer<S> for LevelRecorder {
        fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
            self.0.lock().unwrap().push(*event.metadata().level());
        }
    }

    fn planet() -> Question {
        builtin_questions()
            .into_iter()
            .find(|q| q.name == "Largest Planet")
            .unwrap()
    }

    #[tokio::test]
    async fn test_absent_text_writes_nothing() {
        let store = Arc::new(MemoryStore::with_questions(builtin_questions()));
        let writer = ResultWriter::new(store.clone());
        let q = planet();

        let outcome = writer
            .persist(&q, ModelId::Gpt4o, "Lettered Options", &q.options, 0, 0, None)
            .await
            .unwrap();
        assert_eq!(outcome, PersistOutcome::Skipped);
        assert_eq!(store.write_count(), 0);
        assert_eq!(store.answer_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_persist_uses_composite_key() {
        let store = Arc::new(MemoryStore::with_questions(builtin_questions()));
        let writer = ResultWriter::new(store.clone());
        let q = planet();

        writer
            .persist(&q, ModelId::Gpt4mini, "Numbered Options", &q.options, 0, 3, Some("Jupiter"))
            .await
            .unwrap();

        let answers = store.answers().await.unwrap();
        assert_eq!(answers.len(), 1);
        assert_eq!(answers[0].key.model_name, "gpt4mini");
        assert_eq!(answers[0].key.option_style, "Numbered Options");
        assert_eq!(answers[0].key.trial_index, 3);
        assert_eq!(answers[0].key.options, q.options);
        assert_eq!(answers[0].text, "Jupiter");
    }

    #[tokio::test]
    async fn test_persist_all_counts_outcomes() {
        let store = Arc::new(MemoryStore::with_questions(builtin_questions()));
        let writer = ResultWriter::new(store.clone());
        let q = planet();
        let slots = vec![
            Some("Jupiter".to_string()),
            None,
            Some("Saturn".to_string()),
            None,
            Some("Jupiter".to_string()),
        ];

        let report = writer
            .persist_all(&q, ModelId::Llama, "Bullet Points", &q.options, 0, &slots)
            .await;
        assert_eq!(report.written, 3);
        assert_eq!(report.skipped, 2);
        assert_eq!(report.failed_count(), 0);
        assert_eq!(store.answer_count().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_unknown_question_reported_per_write() {
        let store = Arc::new(MemoryStore::new());
        let writer = ResultWriter::new(store.clone());
        let q = planet();
        let slots = vec![Some("Jupiter".to_string()), None];

        let report = writer
            .persist_all(&q, ModelId::Gpt4o, "Lettered Options", &q.options, 1, &slots)
            .await;
        assert_eq!(report.written, 0);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, 0);
        assert!(matches!(report.failed[0].1, StoreError::UnknownQuestion(_)));
    }

    #[tokio::test]
    async fn test_failed_write_logged_as_warning() {
        let recorder = LevelRecorder::default();
        let subscriber = tracing_subscriber::registry().with(recorder.clone());
        let _guard = tracing::subscriber::set_default(subscriber);

        let writer = ResultWriter::new(Arc::new(MemoryStore::new()));
        let q = planet();
        let slots = vec![Some("Jupiter".to_string())];
        let report = writer
            .persist_all(&q, ModelId::Gpt4o, "Lettered Options", &q.options, 0, &slots)
            .await;
        assert_eq!(report.failed_count(), 1);

        let levels = recorder.0.lock().unwrap();
        assert!(levels.contains(&Level::WARN));
        assert!(!levels.contains(&Level::ERROR));
    }
}
