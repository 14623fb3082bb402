//! Order-dependency metrics
//!
//! Pure aggregations over stored answers:
//!
//! - **Accuracy by position**: where the correct answer sat in the presented
//!   options, and how often the model picked it from that slot
//! - **Choice distribution**: for opinion questions, which slot the chosen
//!   answer occupied
//! - **Stability**: agreement between repeated trials of one variant
//! - **Consistency**: agreement of the modal answer across rotations
//!
//! Position metrics are reported per (model, style) plus the roll-ups where
//! model, style, or both are replaced by [`ALL`].

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::questions::{Question, QuestionKind};
use crate::store::AnswerRecord;

/// Wildcard model / style name used in roll-up rows
pub const ALL: &str = "all";

// =============================================================================
// ACCURACY BY POSITION
// =============================================================================

/// Accuracy for answers whose correct option sat at `position`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionAccuracy {
    /// 0-based slot of the correct answer in the presented options
    pub position: usize,
    pub model_name: String,
    pub option_style: String,
    /// Answers with the correct option at this position
    pub total_count: usize,
    /// Of those, answers that chose the correct option
    pub correct_count: usize,
    /// Share of this scope's answers with the correct option here (%)
    pub position_percentage: f64,
    /// correct_count / total_count (%)
    pub correct_percentage: f64,
}

// =============================================================================
// CHOICE DISTRIBUTION
// =============================================================================

/// How often opinion answers came from `position`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChoiceDistribution {
    pub model_name: String,
    pub option_style: String,
    pub position: usize,
    pub match_count: usize,
}

// =============================================================================
// STABILITY / CONSISTENCY
// =============================================================================

/// Modal answer of one rotation's trials
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RotationMode {
    pub rotation: usize,
    pub mode: String,
    /// Fraction of trials that gave `mode`
    pub stability: f64,
    pub trials: usize,
}

/// Cross-rotation agreement for one (question, model, style)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionConsistency {
    pub question_name: String,
    pub model_name: String,
    pub option_style: String,
    pub rotations: Vec<RotationMode>,
    /// Fraction of rotations whose mode equals the most common mode
    pub consistency: f64,
}

/// Means over every question for one (model, style)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StabilityMetrics {
    pub model_name: String,
    pub option_style: String,
    pub question_count: usize,
    /// Number of (question, rotation) variants averaged
    pub variant_count: usize,
    pub mean_stability: f64,
    pub mean_consistency: f64,
}

// =============================================================================
// REPORT
// =============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricsReport {
    pub answer_count: usize,
    pub accuracy_by_position: Vec<PositionAccuracy>,
    pub choice_distribution: Vec<ChoiceDistribution>,
    pub consistency: Vec<QuestionConsistency>,
    pub stability: Vec<StabilityMetrics>,
}

impl MetricsReport {
    /// Compute every metric from the stored questions and answers.
    ///
    /// Answers referring to a question not in `questions` are ignored.
    pub fn compute(questions: &[Question], answers: &[AnswerRecord]) -> Self {
        let by_name: HashMap<&str, &Question> =
            questions.iter().map(|q| (q.name.as_str(), q)).collect();
        let known: Vec<(&Question, &AnswerRecord)> = answers
            .iter()
            .filter_map(|a| by_name.get(a.key.question_name.as_str()).map(|q| (*q, a)))
            .collect();

        let consistency = question_consistency(&known);
        let stability = stability_metrics(&consistency);

        Self {
            answer_count: known.len(),
            accuracy_by_position: accuracy_by_position(&known),
            choice_distribution: choice_distribution(&known),
            consistency,
            stability,
        }
    }

    /// Save report as JSON
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self).context("Failed to serialize report")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write report: {:?}", path))?;
        Ok(())
    }

    /// Format as a summary string
    pub fn format_summary(&self) -> String {
        let mean = |f: fn(&StabilityMetrics) -> f64| {
            if self.stability.is_empty() {
                0.0
            } else {
                self.stability.iter().map(f).sum::<f64>() / self.stability.len() as f64
            }
        };
        format!(
            "Answers: {} | Questions x models x styles: {} | Stability: {:.1}% | Consistency: {:.1}%",
            self.answer_count,
            self.consistency.len(),
            mean(|s| s.mean_stability) * 100.0,
            mean(|s| s.mean_consistency) * 100.0
        )
    }
}

/// The four scopes an answer contributes to, with their sort rank
fn scopes<'a>(model: &'a str, style: &'a str) -> [(u8, &'a str, &'a str); 4] {
    [
        (0, model, style),
        (1, model, ALL),
        (2, ALL, style),
        (3, ALL, ALL),
    ]
}

fn percentage(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    round2(part as f64 / whole as f64 * 100.0)
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn accuracy_by_position(answers: &[(&Question, &AnswerRecord)]) -> Vec<PositionAccuracy> {
    // (rank, model, style) -> answers in scope
    let mut scope_totals: HashMap<(u8, &str, &str), usize> = HashMap::new();
    // (position, rank, model, style) -> (total, correct)
    let mut cells: BTreeMap<(usize, u8, &str, &str), (usize, usize)> = BTreeMap::new();

    for (question, answer) in answers {
        let Some(correct) = question.correct_answer.as_deref() else {
            continue;
        };
        let position = answer.key.options.iter().position(|o| o == correct);
        let is_correct = answer.text == correct;

        for scope in scopes(&answer.key.model_name, &answer.key.option_style) {
            *scope_totals.entry(scope).or_default() += 1;
            if let Some(position) = position {
                let cell = cells.entry((position, scope.0, scope.1, scope.2)).or_default();
                cell.0 += 1;
                if is_correct {
                    cell.1 += 1;
                }
            }
        }
    }

    cells
        .into_iter()
        .map(|((position, rank, model, style), (total, correct))| {
            let scope_total = scope_totals.get(&(rank, model, style)).copied().unwrap_or(0);
            PositionAccuracy {
                position,
                model_name: model.to_string(),
                option_style: style.to_string(),
                total_count: total,
                correct_count: correct,
                position_percentage: percentage(total, scope_total),
                correct_percentage: percentage(correct, total),
            }
        })
        .collect()
}

fn choice_distribution(answers: &[(&Question, &AnswerRecord)]) -> Vec<ChoiceDistribution> {
    let opinions: Vec<&AnswerRecord> = answers
        .iter()
        .filter(|(q, _)| q.kind == QuestionKind::Opinion)
        .map(|(_, a)| *a)
        .collect();
    let slots = opinions.iter().map(|a| a.key.options.len()).max().unwrap_or(0);

    let mut counts: BTreeMap<(&str, &str), Vec<usize>> = BTreeMap::new();
    for answer in &opinions {
        let position = answer.key.options.iter().position(|o| *o == answer.text);
        for (_, model, style) in scopes(&answer.key.model_name, &answer.key.option_style) {
            let row = counts.entry((model, style)).or_insert_with(|| vec![0; slots]);
            if let Some(position) = position {
                row[position] += 1;
            }
        }
    }

    counts
        .into_iter()
        .flat_map(|((model, style), row)| {
            row.into_iter()
                .enumerate()
                .map(move |(position, match_count)| ChoiceDistribution {
                    model_name: model.to_string(),
                    option_style: style.to_string(),
                    position,
                    match_count,
                })
        })
        .collect()
}

/// Most frequent text; ties go to the lexicographically smallest
fn mode<'a>(texts: impl IntoIterator<Item = &'a str>) -> Option<(&'a str, usize)> {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for text in texts {
        *counts.entry(text).or_default() += 1;
    }
    // BTreeMap iterates in ascending key order and max_by_key keeps the last
    // maximum, so iterate in reverse to keep the smallest key on ties
    counts.into_iter().rev().max_by_key(|(_, count)| *count)
}

fn question_consistency(answers: &[(&Question, &AnswerRecord)]) -> Vec<QuestionConsistency> {
    // (question, model, style) -> rotation -> texts
    let mut groups: BTreeMap<(&str, &str, &str), BTreeMap<usize, Vec<&str>>> = BTreeMap::new();
    for (_, answer) in answers {
        groups
            .entry((
                answer.key.question_name.as_str(),
                answer.key.model_name.as_str(),
                answer.key.option_style.as_str(),
            ))
            .or_default()
            .entry(answer.rotation)
            .or_default()
            .push(answer.text.as_str());
    }

    groups
        .into_iter()
        .map(|((question, model, style), by_rotation)| {
            let rotations: Vec<RotationMode> = by_rotation
                .into_iter()
                .filter_map(|(rotation, texts)| {
                    let trials = texts.len();
                    mode(texts).map(|(mode, count)| RotationMode {
                        rotation,
                        mode: mode.to_string(),
                        stability: count as f64 / trials as f64,
                        trials,
                    })
                })
                .collect();

            let consistency = match mode(rotations.iter().map(|r| r.mode.as_str())) {
                Some((_, count)) => count as f64 / rotations.len() as f64,
                None => 0.0,
            };

            QuestionConsistency {
                question_name: question.to_string(),
                model_name: model.to_string(),
                option_style: style.to_string(),
                rotations,
                consistency,
            }
        })
        .collect()
}

fn stability_metrics(consistency: &[QuestionConsistency]) -> Vec<StabilityMetrics> {
    let mut groups: BTreeMap<(&str, &str), Vec<&QuestionConsistency>> = BTreeMap::new();
    for entry in consistency {
        groups
            .entry((entry.model_name.as_str(), entry.option_style.as_str()))
            .or_default()
            .push(entry);
    }

    groups
        .into_iter()
        .map(|((model, style), entries)| {
            let variants: Vec<f64> = entries
                .iter()
                .flat_map(|e| e.rotations.iter().map(|r| r.stability))
                .collect();
            let mean_stability = if variants.is_empty() {
                0.0
            } else {
                variants.iter().sum::<f64>() / variants.len() as f64
            };
            let mean_consistency =
                entries.iter().map(|e| e.consistency).sum::<f64>() / entries.len() as f64;

            StabilityMetrics {
                model_name: model.to_string(),
                option_style: style.to_string(),
                question_count: entries.len(),
                variant_count: variants.len(),
                mean_stability,
                mean_consistency,
            }
        })
        .collect()
}
