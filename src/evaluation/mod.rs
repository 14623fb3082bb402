//! Order-dependency evaluation pipeline
//!
//! - [`collector`]: concurrent trials with per-trial retry
//! - [`writer`]: persists collected answers, skipping absent trials
//! - [`orchestrator`]: rotation loop for one (question, model, style)
//! - [`metrics`]: aggregate reports over stored answers

pub mod collector;
pub mod metrics;
pub mod orchestrator;
pub mod writer;


pub use collector::AnswerCollector;
pub use metrics::{ChoiceDistribution, MetricsReport, PositionAccuracy, StabilityMetrics, ALL};
pub use orchestrator::{check_plan, check_variant, Evaluator, RotationSummary, RunSummary};
pub use writer::{PersistOutcome, ResultWriter, WriteReport};
