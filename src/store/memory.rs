//! In-memory answer store.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;

use super::{now_rfc3339, AnswerKey, AnswerRecord, AnswerStore};
use crate::errors::StoreError;
use crate::questions::Question;

#[derive(Default)]
struct MemoryState {
    questions: BTreeMap<String, Question>,
    /// Keyed by `AnswerKey::digest`
    answers: HashMap<String, AnswerRecord>,
    writes: usize,
}

/// Answer store held in a hash map.
///
/// Same semantics as [`super::SqliteStore`]; also counts successful answer
/// writes so tests can assert that nothing was written.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-seeded with `questions`
    pub fn with_questions(questions: impl IntoIterator<Item = Question>) -> Self {
        let store = Self::new();
        if let Ok(mut state) = store.state.lock() {
            for q in questions {
                state.questions.entry(q.name.clone()).or_insert(q);
            }
        }
        store
    }

    /// Number of successful `upsert_answer` calls (overwrites included)
    pub fn write_count(&self) -> usize {
        self.state.lock().map(|s| s.writes).unwrap_or(0)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, MemoryState>, StoreError> {
        self.state.lock().map_err(|_| StoreError::LockPoisoned)
    }
}

#[async_trait]
impl AnswerStore for MemoryStore {
    async fn upsert_question(&self, question: &Question) -> Result<bool, StoreError> {
        let mut state = self.lock()?;
        if state.questions.contains_key(&question.name) {
            return Ok(false);
        }
        state
            .questions
            .insert(question.name.clone(), question.clone());
        Ok(true)
    }

    async fn questions(&self) -> Result<Vec<Question>, StoreError> {
        Ok(self.lock()?.questions.values().cloned().collect())
    }

    async fn upsert_answer(
        &self,
        key: &AnswerKey,
        rotation: usize,
        text: &str,
    ) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        if !state.questions.contains_key(&key.question_name) {
            return Err(StoreError::UnknownQuestion(key.question_name.clone()));
        }

        let now = now_rfc3339();
        state
            .answers
            .entry(key.digest())
            .and_modify(|record| {
                record.text = text.to_string();
                record.rotation = rotation;
                record.updated_at = now.clone();
            })
            .or_insert_with(|| AnswerRecord {
                key: key.clone(),
                rotation,
                text: text.to_string(),
                created_at: now.clone(),
                updated_at: now.clone(),
            });
        state.writes += 1;
        Ok(())
    }

    async fn answers(&self) -> Result<Vec<AnswerRecord>, StoreError> {
        let mut answers: Vec<AnswerRecord> = self.lock()?.answers.values().cloned().collect();
        answers.sort_by(|a, b| {
            (
                &a.key.question_name,
                &a.key.model_name,
                &a.key.option_style,
                a.rotation,
                a.key.trial_index,
            )
                .cmp(&(
                    &b.key.question_name,
                    &b.key.model_name,
                    &b.key.option_style,
                    b.rotation,
                    b.key.trial_index,
                ))
        });
        Ok(answers)
    }

    async fn answer_count(&self) -> Result<usize, StoreError> {
        Ok(self.lock()?.answers.len())
    }
}
