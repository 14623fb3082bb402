//! Multiple-choice questions
//!
//! Questions are the read-only input of an evaluation run. Each question has a
//! unique name, a prompt, and its options in canonical order. Factual
//! questions carry a correct answer so accuracy can be measured by the
//! position that answer was shown in; opinion questions have none and are
//! used to measure which slot a model prefers.
//!
//! ## Question File Format (JSON)
//!
//! ```json
//! {
//!   "metadata": {
//!     "name": "general-knowledge",
//!     "description": "Planets and acronyms",
//!     "version": "1.0"
//!   },
//!   "questions": [
//!     {
//!       "name": "Largest Planet",
//!       "prompt": "What is the largest planet in our solar system?",
//!       "options": ["Earth", "Mars", "Jupiter", "Saturn"],
//!       "kind": "factual",
//!       "correct_answer": "Jupiter"
//!     }
//!   ]
//! }
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// Whether a question has a right answer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuestionKind {
    /// Has a designated correct answer
    #[default]
    Factual,
    /// No correct answer; only the chosen position matters
    Opinion,
    /// Has a defensible answer but none is designated as correct
    Reasoning,
}

impl QuestionKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Factual => "factual",
            Self::Opinion => "opinion",
            Self::Reasoning => "reasoning",
        }
    }

    /// Parse from string (case-insensitive)
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "factual" | "fact" => Some(Self::Factual),
            "opinion" => Some(Self::Opinion),
            "reasoning" => Some(Self::Reasoning),
            _ => None,
        }
    }
}

/// A multiple-choice question
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    /// Unique identifier
    pub name: String,
    /// Question text shown to the model
    pub prompt: String,
    /// Options in canonical order
    pub options: Vec<String>,
    /// Factual, opinion or reasoning
    #[serde(default)]
    pub kind: QuestionKind,
    /// The correct option text, for factual questions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correct_answer: Option<String>,
}

impl Question {
    /// Create a factual question with a correct answer
    pub fn factual(
        name: impl Into<String>,
        prompt: impl Into<String>,
        options: Vec<&str>,
        correct_answer: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            prompt: prompt.into(),
            options: options.into_iter().map(String::from).collect(),
            kind: QuestionKind::Factual,
            correct_answer: Some(correct_answer.into()),
        }
    }

    /// Create an opinion question
    pub fn opinion(name: impl Into<String>, prompt: impl Into<String>, options: Vec<&str>) -> Self {
        Self {
            name: name.into(),
            prompt: prompt.into(),
            options: options.into_iter().map(String::from).collect(),
            kind: QuestionKind::Opinion,
            correct_answer: None,
        }
    }

    /// Create a reasoning question, scored for stability but not accuracy
    pub fn reasoning(
        name: impl Into<String>,
        prompt: impl Into<String>,
        options: Vec<&str>,
    ) -> Self {
        Self {
            name: name.into(),
            prompt: prompt.into(),
            options: options.into_iter().map(String::from).collect(),
            kind: QuestionKind::Reasoning,
            correct_answer: None,
        }
    }

    /// Copy of this question presenting `options` instead of the canonical order
    pub fn with_options(&self, options: Vec<String>) -> Self {
        Self {
            options,
            ..self.clone()
        }
    }

    /// Check the question is usable for an evaluation run
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            anyhow::bail!("Question has an empty name");
        }
        if self.prompt.trim().is_empty() {
            anyhow::bail!("Question '{}' has empty prompt text", self.name);
        }
        if self.options.len() < 2 {
            anyhow::bail!("Question '{}' needs at least 2 options", self.name);
        }
        let unique: HashSet<&String> = self.options.iter().collect();
        if unique.len() != self.options.len() {
            anyhow::bail!("Question '{}' has duplicate options", self.name);
        }
        if let Some(correct) = &self.correct_answer {
            if !self.options.contains(correct) {
                anyhow::bail!(
                    "Question '{}' has correct answer '{}' which is not an option",
                    self.name,
                    correct
                );
            }
        }
        Ok(())
    }
}

/// Metadata about a question file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionFileMetadata {
    /// Name of the question set
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub version: String,
}

/// A complete question file that can be loaded from JSON
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionFile {
    pub metadata: QuestionFileMetadata,
    pub questions: Vec<Question>,
}

impl QuestionFile {
    /// Load and validate questions from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read question file: {}", path.display()))?;

        let file: QuestionFile = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse question file: {}", path.display()))?;

        file.validate()?;
        Ok(file)
    }

    /// Validate every question and name uniqueness
    pub fn validate(&self) -> Result<()> {
        let mut names = HashSet::new();
        for q in &self.questions {
            q.validate()?;
            if !names.insert(q.name.as_str()) {
                anyhow::bail!("Duplicate question name '{}'", q.name);
            }
        }
        Ok(())
    }

    /// Save questions to a JSON file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content =
            serde_json::to_string_pretty(self).context("Failed to serialize question file")?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(path, content)
            .with_context(|| format!("Failed to write question file: {}", path.display()))?;

        Ok(())
    }

    /// The built-in seed set
    pub fn builtin() -> Self {
        Self {
            metadata: QuestionFileMetadata {
                name: "builtin".to_string(),
                description: "Default order-dependency question set".to_string(),
                version: "1.0".to_string(),
            },
            questions: builtin_questions(),
        }
    }
}

/// Default questions seeded by `populate`
pub fn builtin_questions() -> Vec<Question> {
    vec![
        Question::opinion(
            "Favorite Movie",
            "Which of these is the best movie of all time?",
            vec![
                "The Shawshank Redemption",
                "The Godfather",
                "The Dark Knight",
                "Pulp Fiction",
            ],
        ),
        Question::factual(
            "Largest Planet",
            "What is the largest planet in our solar system?",
            vec!["Earth", "Mars", "Jupiter", "Saturn"],
            "Jupiter",
        ),
        Question::opinion(
            "Most Beneficial Policy",
            "Which policy is most beneficial for society?",
            vec![
                "Universal healthcare",
                "Universal basic income",
                "Improved public education",
                "Climate change mitigation",
            ],
        ),
        Question::factual(
            "AI Term",
            "What does the term 'AI' most commonly refer to?",
            vec![
                "Artificial Intelligence",
                "Adobe Illustrator",
                "Allen Iverson",
                "Air India",
            ],
            "Artificial Intelligence",
        ),
        Question::reasoning(
            "Cat/Dog/Mammal",
            "If all dogs are mammals and some mammals are cats, which of the following is true?",
            vec![
                "All cats are mammals",
                "Some dogs are cats",
                "All mammals are dogs",
                "Some cats are reptiles",
            ],
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_builtin_questions_are_valid() {
        let file = QuestionFile::builtin();
        file.validate().unwrap();
        assert_eq!(file.questions.len(), 5);
        assert!(file.questions.iter().all(|q| q.options.len() == 4));

        let planet = file
            .questions
            .iter()
            .find(|q| q.name == "Largest Planet")
            .unwrap();
        assert_eq!(planet.correct_answer.as_deref(), Some("Jupiter"));
        assert_eq!(planet.kind, QuestionKind::Factual);
    }

    #[test]
    fn test_only_two_builtins_have_correct_answer() {
        let questions = builtin_questions();
        let mut scored: Vec<&str> = questions
            .iter()
            .filter(|q| q.correct_answer.is_some())
            .map(|q| q.name.as_str())
            .collect();
        scored.sort();
        assert_eq!(scored, vec!["AI Term", "Largest Planet"]);

        let syllogism = questions
            .iter()
            .find(|q| q.name == "Cat/Dog/Mammal")
            .unwrap();
        assert_eq!(syllogism.kind, QuestionKind::Reasoning);
        assert!(syllogism.correct_answer.is_none());
    }

    #[test]
    fn test_validate_rejects_bad_questions() {
        let mut q = Question::factual("Q", "Pick one", vec!["a", "b"], "a");
        assert!(q.validate().is_ok());

        q.correct_answer = Some("c".to_string());
        assert!(q.validate().is_err());

        let dup = Question::opinion("Q", "Pick one", vec!["a", "a"]);
        assert!(dup.validate().is_err());

        let single = Question::opinion("Q", "Pick one", vec!["a"]);
        assert!(single.validate().is_err());

        let blank = Question::opinion("Q", "  ", vec!["a", "b"]);
        assert!(blank.validate().is_err());
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let mut file = QuestionFile::builtin();
        let first = file.questions[0].clone();
        file.questions.push(first);
        let err = file.validate().unwrap_err();
        assert!(err.to_string().contains("Duplicate question name"));
    }

    #[test]
    fn test_question_file_json() {
        let json = r#"{
            "metadata": { "name": "planets" },
            "questions": [
                {
                    "name": "Largest Planet",
                    "prompt": "What is the largest planet?",
                    "options": ["Earth", "Mars", "Jupiter", "Saturn"],
                    "correct_answer": "Jupiter"
                },
                {
                    "name": "Best Planet",
                    "prompt": "Which planet is the best?",
                    "options": ["Earth", "Mars"],
                    "kind": "opinion"
                }
            ]
        }"#;
        let file: QuestionFile = serde_json::from_str(json).unwrap();
        file.validate().unwrap();
        assert_eq!(file.questions[0].kind, QuestionKind::Factual);
        assert_eq!(file.questions[1].kind, QuestionKind::Opinion);
        assert!(file.questions[1].correct_answer.is_none());
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("questions.json");
        let file = QuestionFile::builtin();
        file.save(&path).unwrap();

        let loaded = QuestionFile::load(&path).unwrap();
        assert_eq!(loaded.questions, file.questions);
    }

    #[test]
    fn test_with_options_keeps_identity() {
        let q = &builtin_questions()[1];
        let shifted = q.with_options(vec!["Mars".into(), "Earth".into()]);
        assert_eq!(shifted.name, q.name);
        assert_eq!(shifted.prompt, q.prompt);
        assert_eq!(shifted.options, vec!["Mars", "Earth"]);
    }

    #[test]
    fn test_kind_from_str() {
        assert_eq!(QuestionKind::from_str("Opinion"), Some(QuestionKind::Opinion));
        assert_eq!(QuestionKind::from_str("fact"), Some(QuestionKind::Factual));
        assert_eq!(QuestionKind::from_str("REASONING"), Some(QuestionKind::Reasoning));
        assert_eq!(QuestionKind::from_str("poll"), None);
    }
}
