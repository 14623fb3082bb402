//! Evaluation orchestrator
//!
//! Drives one (question, model, option style) run: every rotation of the
//! options in turn, `n_evals` concurrent trials per rotation, then the
//! collected answers go to the result writer. Trial and write failures are
//! counted in the returned [`RunSummary`]; only configuration problems found
//! before the first model call are errors.

use serde::Serialize;
use tracing::info;

use super::collector::AnswerCollector;
use super::writer::ResultWriter;
use crate::config::{ModelId, OptionStyle};
use crate::errors::EvalError;
use crate::questions::Question;
use crate::rotation::rotation_series;

/// Per-rotation outcome
#[derive(Debug, Clone, Serialize)]
pub struct RotationSummary {
    pub rotation: usize,
    /// Options as presented in this rotation
    pub options: Vec<String>,
    /// Trials that produced an answer
    pub answered: usize,
    /// Trials that exhausted their attempts
    pub failed_trials: usize,
    pub written: usize,
    pub failed_writes: usize,
}

/// Outcome of [`Evaluator::run`]
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub question: String,
    pub model: ModelId,
    pub option_style: String,
    pub n_evals: usize,
    pub rotations: Vec<RotationSummary>,
}

impl RunSummary {
    /// Trial slots across all rotations
    pub fn total_slots(&self) -> usize {
        self.rotations.len() * self.n_evals
    }

    pub fn answered(&self) -> usize {
        self.rotations.iter().map(|r| r.answered).sum()
    }

    pub fn failed_trials(&self) -> usize {
        self.rotations.iter().map(|r| r.failed_trials).sum()
    }

    pub fn written(&self) -> usize {
        self.rotations.iter().map(|r| r.written).sum()
    }

    pub fn failed_writes(&self) -> usize {
        self.rotations.iter().map(|r| r.failed_writes).sum()
    }

    /// True when every slot was answered and stored
    pub fn is_complete(&self) -> bool {
        self.failed_trials() == 0 && self.failed_writes() == 0
    }

    /// Format as a summary string
    pub fn format_summary(&self) -> String {
        format!(
            "Rotations: {} | Answered: {}/{} | Stored: {} | Failed trials: {} | Failed writes: {}",
            self.rotations.len(),
            self.answered(),
            self.total_slots(),
            self.written(),
            self.failed_trials(),
            self.failed_writes()
        )
    }
}

/// Check that `style` can label every option of `question`
pub fn check_variant(question: &Question, style: &OptionStyle) -> Result<(), EvalError> {
    if question.options.is_empty() {
        return Err(EvalError::NoOptions(question.name.clone()));
    }
    if style.prefixes.len() < question.options.len() {
        return Err(EvalError::PrefixMismatch {
            style: style.name.clone(),
            question: question.name.clone(),
            prefixes: style.prefixes.len(),
            options: question.options.len(),
        });
    }
    Ok(())
}

/// [`check_variant`] over every (question, style) pair, before any run starts
pub fn check_plan(questions: &[&Question], styles: &[&OptionStyle]) -> Result<(), EvalError> {
    for question in questions {
        for style in styles {
            check_variant(question, style)?;
        }
    }
    Ok(())
}

/// Runs the rotate → collect → persist loop for one question variant
pub struct Evaluator {
    collector: AnswerCollector,
    writer: ResultWriter,
    max_retries: usize,
}

impl Evaluator {
    pub fn new(collector: AnswerCollector, writer: ResultWriter, max_retries: usize) -> Self {
        Self {
            collector,
            writer,
            max_retries,
        }
    }

    pub fn collector(&self) -> &AnswerCollector {
        &self.collector
    }

    pub fn writer(&self) -> &ResultWriter {
        &self.writer
    }

    /// Evaluate `question` under every rotation of its options.
    ///
    /// Rotations run one after another; trials inside a rotation run
    /// concurrently.
    pub async fn run(
        &self,
        question: &Question,
        n_evals: usize,
        style: &OptionStyle,
        model: ModelId,
    ) -> Result<RunSummary, EvalError> {
        if n_evals == 0 {
            return Err(EvalError::NoTrials);
        }
        check_variant(question, style)?;
        // Resolve the client before the first rotation so a missing model
        // fails without any call being made
        self.collector.registry().get(model)?;

        info!(
            "Evaluating '{}' with {} using '{}' ({} rotations x {} trials)",
            question.name,
            model,
            style.name,
            question.options.len(),
            n_evals
        );

        let mut rotations = Vec::with_capacity(question.options.len());
        for (rotation, options) in rotation_series(&question.options) {
            let presented = question.with_options(options);
            let slots = self
                .collector
                .collect(&presented, &style.prefixes, model, n_evals, self.max_retries)
                .await?;

            let report = self
                .writer
                .persist_all(&presented, model, &style.name, &presented.options, rotation, &slots)
                .await;

            let answered = slots.iter().filter(|s| s.is_some()).count();
            info!(
                "Rotation {} of '{}' ({}, '{}'): {}/{} answered, {} stored",
                rotation,
                question.name,
                model,
                style.name,
                answered,
                n_evals,
                report.written
            );

            rotations.push(RotationSummary {
                rotation,
                options: presented.options,
                answered,
                failed_trials: n_evals - answered,
                written: report.written,
                failed_writes: report.failed_count(),
            });
        }

        Ok(RunSummary {
            question: question.name.clone(),
            model,
            option_style: style.name.clone(),
            n_evals,
            rotations,
        })
    }
}
