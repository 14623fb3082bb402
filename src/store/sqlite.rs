//! SQLite-backed answer store.
//!
//! Option lists are stored as JSON arrays; the answers table carries a
//! UNIQUE constraint over the composite key so re-runs update in place.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};

use super::{now_rfc3339, AnswerKey, AnswerRecord, AnswerStore};
use crate::errors::StoreError;
use crate::questions::{Question, QuestionKind};

/// Thread-safe SQLite store.
///
/// rusqlite's `Connection` is synchronous, so every call runs on the
/// blocking pool behind a mutex.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open (or create) the database at `path` and run migrations.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;",
        )?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.busy_timeout(Duration::from_millis(3000))?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Self::migrate(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run schema migrations (idempotent).
    fn migrate(conn: &Connection) -> Result<(), StoreError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS questions (
                 name TEXT PRIMARY KEY,
                 prompt TEXT NOT NULL,
                 options TEXT NOT NULL,
                 kind TEXT NOT NULL DEFAULT 'factual',
                 correct_answer TEXT
             );

             CREATE TABLE IF NOT EXISTS answers (
                 id INTEGER PRIMARY KEY AUTOINCREMENT,
                 question_name TEXT NOT NULL REFERENCES questions(name),
                 model_name TEXT NOT NULL,
                 option_type TEXT NOT NULL,
                 options TEXT NOT NULL,
                 rotation INTEGER NOT NULL,
                 trial_index INTEGER NOT NULL,
                 text TEXT NOT NULL,
                 created_at TEXT NOT NULL,
                 updated_at TEXT NOT NULL,
                 UNIQUE (question_name, model_name, option_type, options, trial_index)
             );

             CREATE INDEX IF NOT EXISTS idx_answers_model_style
                 ON answers(model_name, option_type);",
        )?;
        Ok(())
    }

    /// Run `f` against the connection on the blocking pool.
    async fn with_conn<F, T>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Connection) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = conn.lock().map_err(|_| StoreError::LockPoisoned)?;
            f(&guard)
        })
        .await
        .map_err(|e| StoreError::TaskJoin(e.to_string()))?
    }
}

fn kind_from_column(kind: &str) -> QuestionKind {
    QuestionKind::from_str(kind).unwrap_or_default()
}

#[async_trait]
impl AnswerStore for SqliteStore {
    async fn upsert_question(&self, question: &Question) -> Result<bool, StoreError> {
        let question = question.clone();
        let options = serde_json::to_string(&question.options)?;
        self.with_conn(move |conn| {
            let inserted = conn.execute(
                "INSERT INTO questions (name, prompt, options, kind, correct_answer)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(name) DO NOTHING",
                params![
                    question.name,
                    question.prompt,
                    options,
                    question.kind.name(),
                    question.correct_answer,
                ],
            )?;
            Ok(inserted == 1)
        })
        .await
    }

    async fn questions(&self) -> Result<Vec<Question>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT name, prompt, options, kind, correct_answer
                 FROM questions ORDER BY name",
            )?;
            let rows = stmt
                .query_map([], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, Option<String>>(4)?,
                    ))
                })?
                .collect::<Result<Vec<_>, _>>()?;

            rows.into_iter()
                .map(|(name, prompt, options, kind, correct_answer)| {
                    let options: Vec<String> = serde_json::from_str(&options)?;
                    Ok::<_, StoreError>(Question {
                        name,
                        prompt,
                        options,
                        kind: kind_from_column(&kind),
                        correct_answer,
                    })
                })
                .collect()
        })
        .await
    }

    async fn upsert_answer(
        &self,
        key: &AnswerKey,
        rotation: usize,
        text: &str,
    ) -> Result<(), StoreError> {
        let key = key.clone();
        let text = text.to_string();
        let options = serde_json::to_string(&key.options)?;
        self.with_conn(move |conn| {
            let known: Option<i64> = conn
                .query_row(
                    "SELECT 1 FROM questions WHERE name = ?1",
                    params![key.question_name],
                    |row| row.get(0),
                )
                .optional()?;
            if known.is_none() {
                return Err(StoreError::UnknownQuestion(key.question_name));
            }

            let now = now_rfc3339();
            conn.execute(
                "INSERT INTO answers
                     (question_name, model_name, option_type, options, rotation,
                      trial_index, text, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)
                 ON CONFLICT (question_name, model_name, option_type, options, trial_index)
                 DO UPDATE SET text = excluded.text,
                               rotation = excluded.rotation,
                               updated_at = excluded.updated_at",
                params![
                    key.question_name,
                    key.model_name,
                    key.option_style,
                    options,
                    rotation as i64,
                    key.trial_index as i64,
                    text,
                    now,
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn answers(&self) -> Result<Vec<AnswerRecord>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT question_name, model_name, option_type, options, rotation,
                        trial_index, text, created_at, updated_at
                 FROM answers
                 ORDER BY question_name, model_name, option_type, rotation, trial_index",
            )?;
            // Options are stored as JSON text and decoded outside the row callback
            let rows = stmt
                .query_map([], |row| {
                    let record = AnswerRecord {
                        key: AnswerKey {
                            question_name: row.get(0)?,
                            model_name: row.get(1)?,
                            option_style: row.get(2)?,
                            options: Vec::new(),
                            trial_index: row.get::<_, i64>(5)? as usize,
                        },
                        rotation: row.get::<_, i64>(4)? as usize,
                        text: row.get(6)?,
                        created_at: row.get(7)?,
                        updated_at: row.get(8)?,
                    };
                    Ok((row.get::<_, String>(3)?, record))
                })?
                .collect::<Result<Vec<_>, _>>()?;

            rows.into_iter()
                .map(|(options, mut record)| -> Result<AnswerRecord, StoreError> {
                    record.key.options = serde_json::from_str(&options)?;
                    Ok(record)
                })
                .collect()
        })
        .await
    }

    async fn answer_count(&self) -> Result<usize, StoreError> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row("SELECT COUNT(*) FROM answers", [], |row| row.get(0))?;
            Ok(count as usize)
        })
        .await
    }
}
