//! Answer storage
//!
//! Answers are keyed by the tuple that fully describes what the model was
//! shown: question, model, option style, the exact option list in presented
//! order, and the trial index. Writing the same key twice overwrites the
//! stored text; any difference in the key makes a separate record.
//!
//! Two backends implement [`AnswerStore`]:
//! - [`SqliteStore`]: durable, used by the CLI
//! - [`MemoryStore`]: hash map keyed by [`AnswerKey::digest`], used in tests

pub mod memory;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::errors::StoreError;
use crate::questions::Question;

/// Composite identity of one answer record
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AnswerKey {
    pub question_name: String,
    pub model_name: String,
    /// Option style name
    pub option_style: String,
    /// Options exactly as presented (rotated)
    pub options: Vec<String>,
    pub trial_index: usize,
}

impl AnswerKey {
    /// Stable hex digest of the key.
    ///
    /// Every field is length-prefixed so no two distinct keys serialize to
    /// the same byte stream.
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        let mut field = |bytes: &[u8]| {
            hasher.update((bytes.len() as u64).to_le_bytes());
            hasher.update(bytes);
        };
        field(self.question_name.as_bytes());
        field(self.model_name.as_bytes());
        field(self.option_style.as_bytes());
        field(&(self.options.len() as u64).to_le_bytes());
        for option in &self.options {
            field(option.as_bytes());
        }
        field(&(self.trial_index as u64).to_le_bytes());
        format!("{:x}", hasher.finalize())
    }
}

/// A stored answer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerRecord {
    #[serde(flatten)]
    pub key: AnswerKey,
    /// Rotation that produced `key.options`
    pub rotation: usize,
    /// The option text the model chose
    pub text: String,
    pub created_at: String,
    pub updated_at: String,
}

/// Storage capability used by the result writer and the report
#[async_trait]
pub trait AnswerStore: Send + Sync {
    /// Insert the question unless one with the same name exists.
    ///
    /// Returns `true` when a new row was created. Existing questions are
    /// never modified.
    async fn upsert_question(&self, question: &Question) -> Result<bool, StoreError>;

    /// All known questions, ordered by name
    async fn questions(&self) -> Result<Vec<Question>, StoreError>;

    /// Create or overwrite the answer for `key`.
    ///
    /// Fails with `StoreError::UnknownQuestion` when `key.question_name` has
    /// not been stored.
    async fn upsert_answer(&self, key: &AnswerKey, rotation: usize, text: &str)
        -> Result<(), StoreError>;

    /// All answers ordered by question, model, style, rotation, trial
    async fn answers(&self) -> Result<Vec<AnswerRecord>, StoreError>;

    async fn answer_count(&self) -> Result<usize, StoreError>;
}

pub(crate) fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}
