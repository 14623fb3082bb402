//! Order-Dependency CLI
//!
//! Asks LLMs the same multiple-choice questions under every rotation of the
//! options and records how the answers move.
//!
//! ## Quick Start
//!
//! ```bash
//! # Write the default config (models, option styles, trial counts)
//! ./order-dependency init-config
//!
//! # Seed the built-in questions into the database
//! ./order-dependency populate
//!
//! # Run every question x model x option style
//! ./order-dependency evaluate
//!
//! # Only the local model, fewer trials
//! ./order-dependency evaluate --model llama --n-evals 2
//!
//! # Position-bias and consistency tables
//! ./order-dependency report --output results/report.json
//! ```
//!
//! ## Configuration
//!
//! Models and option styles are read from `order-dependency.toml` (or
//! `--config`). API keys come from the environment variable named by each
//! model's `api_key_env`.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use order_dependency::config::{Config, ModelId, OptionStyle, DEFAULT_CONFIG_FILE};
use order_dependency::evaluation::{
    check_plan, AnswerCollector, Evaluator, MetricsReport, ResultWriter, RunSummary, ALL,
};
use order_dependency::models::registry_from_config;
use order_dependency::questions::{Question, QuestionFile, QuestionKind};
use order_dependency::store::{AnswerStore, SqliteStore};

#[derive(Parser)]
#[command(name = "order-dependency")]
#[command(about = "Measure how option order changes LLM multiple-choice answers")]
#[command(version)]
struct Cli {
    /// Path to config file (TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Seed questions into the database
    ///
    /// Existing questions with the same name are left untouched.
    Populate {
        /// Question JSON file (defaults to the built-in set)
        #[arg(short, long)]
        questions: Option<PathBuf>,
    },

    /// Ask every stored question under every rotation of its options
    ///
    /// Runs the cross-product of questions, models and option styles.
    /// Re-running overwrites earlier answers for the same trial.
    Evaluate {
        /// Only these questions (comma-separated names)
        #[arg(long, value_delimiter = ',')]
        question: Option<Vec<String>>,

        /// Only these models (comma-separated: llama, gpt4mini, gpt4o)
        #[arg(short, long, value_delimiter = ',')]
        model: Option<Vec<String>>,

        /// Only these option styles (comma-separated names)
        #[arg(short, long, value_delimiter = ',')]
        style: Option<Vec<String>>,

        /// Trials per rotation (overrides config)
        #[arg(short, long)]
        n_evals: Option<usize>,
    },

    /// Print position-bias and consistency metrics for stored answers
    Report {
        /// Also save the full report as JSON
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// List configured models and option styles
    List,

    /// Validate a question file
    ValidateQuestions {
        /// Path to the question JSON file
        #[arg(short, long)]
        questions: PathBuf,
    },

    /// Write the default config file
    InitConfig {
        /// Destination path
        #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
        output: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Populate { questions } => {
            let config = load_config(cli.config.as_deref())?;
            populate(&config, questions.as_deref()).await?;
        }

        Commands::Evaluate {
            question,
            model,
            style,
            n_evals,
        } => {
            let mut config = load_config(cli.config.as_deref())?;
            if let Some(n) = n_evals {
                config.eval.n_evals = n;
            }
            config.validate()?;
            evaluate(&config, question, model, style).await?;
        }

        Commands::Report { output } => {
            let config = load_config(cli.config.as_deref())?;
            report(&config, output.as_deref()).await?;
        }

        Commands::List => {
            let config = load_config(cli.config.as_deref())?;
            list(&config);
        }

        Commands::ValidateQuestions { questions } => {
            validate_questions(&questions)?;
        }

        Commands::InitConfig { output, force } => {
            init_config(&output, force)?;
        }
    }

    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => Config::load(path),
        None => Config::load_default(),
    }
}

fn open_store(config: &Config) -> Result<SqliteStore> {
    SqliteStore::open(&config.eval.database)
        .with_context(|| format!("Failed to open database: {:?}", config.eval.database))
}

async fn populate(config: &Config, questions_path: Option<&Path>) -> Result<()> {
    let question_file = match questions_path {
        Some(path) => {
            println!("Loading questions from {:?}...", path);
            QuestionFile::load(path)?
        }
        None => QuestionFile::builtin(),
    };

    let store = open_store(config)?;
    let mut inserted = 0;
    for question in &question_file.questions {
        if store.upsert_question(question).await? {
            inserted += 1;
            println!("  + {}", question.name);
        } else {
            println!("  = {} (already stored)", question.name);
        }
    }

    println!(
        "\n✓ {} new, {} existing questions in {:?}",
        inserted,
        question_file.questions.len() - inserted,
        config.eval.database
    );
    Ok(())
}

/// Keep only the items whose name is in `wanted`, failing on unknown names
fn select<'a, T>(
    items: &'a [T],
    wanted: Option<&[String]>,
    name: impl Fn(&T) -> &str,
    what: &str,
) -> Result<Vec<&'a T>> {
    let Some(wanted) = wanted else {
        return Ok(items.iter().collect());
    };
    for w in wanted {
        if !items.iter().any(|item| name(item) == w.as_str()) {
            anyhow::bail!("Unknown {} '{}'", what, w);
        }
    }
    Ok(items
        .iter()
        .filter(|&item| wanted.iter().any(|w| w.as_str() == name(item)))
        .collect())
}

async fn evaluate(
    config: &Config,
    question_filter: Option<Vec<String>>,
    model_filter: Option<Vec<String>>,
    style_filter: Option<Vec<String>>,
) -> Result<()> {
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║              ORDER DEPENDENCY EVALUATION                     ║");
    println!("╚══════════════════════════════════════════════════════════════╝\n");

    let store = Arc::new(open_store(config)?);
    let stored = store.questions().await?;
    if stored.is_empty() {
        anyhow::bail!(
            "No questions in {:?}. Run `order-dependency populate` first",
            config.eval.database
        );
    }
    let questions: Vec<&Question> =
        select(&stored, question_filter.as_deref(), |q| q.name.as_str(), "question")?;

    let model_ids = match model_filter {
        Some(names) => names
            .iter()
            .map(|n| ModelId::from_str(n).with_context(|| format!("Unknown model '{}'", n)))
            .collect::<Result<Vec<_>>>()?,
        None => config.models.iter().map(|m| m.id).collect(),
    };
    for id in &model_ids {
        if !config.models.iter().any(|m| m.id == *id) {
            anyhow::bail!("Model '{}' has no [[models]] entry in the config", id);
        }
    }

    // Only build clients for the selected models, so a missing OpenAI key
    // does not block a local-only run
    let mut client_config = config.clone();
    client_config.models.retain(|m| model_ids.contains(&m.id));
    let registry = registry_from_config(&client_config)?;

    let styles: Vec<&OptionStyle> = select(
        &config.option_styles,
        style_filter.as_deref(),
        |s| s.name.as_str(),
        "option style",
    )?;
    // Reject unusable (question, style) pairs before any answer is stored
    check_plan(&questions, &styles)?;

    println!(
        "  {} questions x {} models x {} option styles, {} trials per rotation",
        questions.len(),
        model_ids.len(),
        styles.len(),
        config.eval.n_evals
    );
    println!("  Database: {:?}\n", config.eval.database);

    let evaluator = Evaluator::new(
        AnswerCollector::new(registry),
        ResultWriter::new(store.clone()),
        config.eval.max_retries,
    );

    let mut summaries: Vec<RunSummary> = Vec::new();
    for question in &questions {
        for model in &model_ids {
            for style in &styles {
                println!("▶ {} | {} | {}", question.name, model, style.name);
                let summary = evaluator
                    .run(question, config.eval.n_evals, style, *model)
                    .await
                    .with_context(|| {
                        format!("Evaluation of '{}' with {} failed", question.name, model)
                    })?;
                println!("  {}", summary.format_summary());
                summaries.push(summary);
            }
        }
    }

    print_run_table(&summaries);
    println!("\n✓ {} answers stored in {:?}", store.answer_count().await?, config.eval.database);
    Ok(())
}

fn print_run_table(summaries: &[RunSummary]) {
    println!("\n╔══════════════════════════════════════════════════════════════════════════╗");
    println!("║                      EVALUATION SUMMARY                                  ║");
    println!("╚══════════════════════════════════════════════════════════════════════════╝\n");

    println!(
        "{:30} {:10} {:18} {:>9} {:>7} {:>7}",
        "Question", "Model", "Style", "Answered", "Stored", "Failed"
    );
    println!("{}", "─".repeat(86));
    for s in summaries {
        println!(
            "{:30} {:10} {:18} {:>4}/{:<4} {:>7} {:>7}",
            truncate(&s.question, 30),
            s.model.name(),
            truncate(&s.option_style, 18),
            s.answered(),
            s.total_slots(),
            s.written(),
            s.failed_trials() + s.failed_writes()
        );
    }

    let incomplete = summaries.iter().filter(|s| !s.is_complete()).count();
    if incomplete > 0 {
        eprintln!("\n┌─────────────────────────────────────────────────────────────┐");
        eprintln!("│ ⚠ {} runs had failed trials or writes (see warnings above)", incomplete);
        eprintln!("└─────────────────────────────────────────────────────────────┘");
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

async fn report(config: &Config, output: Option<&Path>) -> Result<()> {
    let store = open_store(config)?;
    let questions = store.questions().await?;
    let answers = store.answers().await?;
    let report = MetricsReport::compute(&questions, &answers);

    println!("\n╔══════════════════════════════════════════════════════════════════════════╗");
    println!("║                      ORDER DEPENDENCY REPORT                             ║");
    println!("╚══════════════════════════════════════════════════════════════════════════╝\n");
    println!("  {}\n", report.format_summary());

    println!("┌─ ACCURACY BY CORRECT-ANSWER POSITION ──────────────────────────────────┐");
    println!(
        "{:>4} {:10} {:18} {:>8} {:>8} {:>10} {:>10}",
        "Pos", "Model", "Style", "Total", "Correct", "Position%", "Correct%"
    );
    println!("{}", "─".repeat(75));
    for row in &report.accuracy_by_position {
        println!(
            "{:>4} {:10} {:18} {:>8} {:>8} {:>9.2}% {:>9.2}%",
            row.position + 1,
            row.model_name,
            truncate(&row.option_style, 18),
            row.total_count,
            row.correct_count,
            row.position_percentage,
            row.correct_percentage
        );
    }

    println!("\n┌─ OPINION CHOICES BY POSITION ──────────────────────────────────────────┐");
    println!("{:10} {:18} {:>4} {:>8}", "Model", "Style", "Pos", "Chosen");
    println!("{}", "─".repeat(75));
    for row in report
        .choice_distribution
        .iter()
        .filter(|r| r.model_name == ALL || r.option_style == ALL)
    {
        println!(
            "{:10} {:18} {:>4} {:>8}",
            row.model_name,
            truncate(&row.option_style, 18),
            row.position + 1,
            row.match_count
        );
    }

    println!("\n┌─ STABILITY / CONSISTENCY ──────────────────────────────────────────────┐");
    println!(
        "{:10} {:18} {:>10} {:>10} {:>12} {:>12}",
        "Model", "Style", "Questions", "Variants", "Stability", "Consistency"
    );
    println!("{}", "─".repeat(75));
    for row in &report.stability {
        println!(
            "{:10} {:18} {:>10} {:>10} {:>11.1}% {:>11.1}%",
            row.model_name,
            truncate(&row.option_style, 18),
            row.question_count,
            row.variant_count,
            row.mean_stability * 100.0,
            row.mean_consistency * 100.0
        );
    }

    if let Some(path) = output {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        report.save(path)?;
        println!("\n✓ Report saved to {:?}", path);
    }
    Ok(())
}

fn list(config: &Config) {
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║              CONFIGURED MODELS AND STYLES                    ║");
    println!("╚══════════════════════════════════════════════════════════════╝\n");

    println!("MODELS:");
    println!("─────────────────────────────────────────────────────────────────");
    for model in &config.models {
        println!(
            "  {:10} {:24} {:8} {}  (key: {})",
            model.id.name(),
            model.model,
            model.mode.name(),
            model.api_base,
            model.api_key_env.as_deref().unwrap_or("none")
        );
    }

    println!("\nOPTION STYLES:");
    println!("─────────────────────────────────────────────────────────────────");
    for style in &config.option_styles {
        let prefixes: Vec<String> = style.prefixes.iter().map(|p| format!("{:?}", p)).collect();
        println!("  {:20} {}", style.name, prefixes.join(" "));
    }

    println!("\nEVALUATION:");
    println!("─────────────────────────────────────────────────────────────────");
    println!("  Trials per rotation: {}", config.eval.n_evals);
    println!("  Attempts per trial:  {}", config.eval.max_retries);
    println!("  Temperature:         {}", config.eval.temperature);
    println!("  Database:            {:?}", config.eval.database);
}

fn validate_questions(path: &Path) -> Result<()> {
    println!("Validating {:?}...", path);

    let question_file = QuestionFile::load(path)?;

    println!("✓ Valid question file");
    println!("  Name: {}", question_file.metadata.name);
    println!("  Description: {}", question_file.metadata.description);
    println!("  Questions: {}", question_file.questions.len());

    println!("  Kinds:");
    for kind in [QuestionKind::Factual, QuestionKind::Opinion, QuestionKind::Reasoning] {
        let count = question_file
            .questions
            .iter()
            .filter(|q| q.kind == kind)
            .count();
        println!("    {}: {}", kind.name(), count);
    }

    Ok(())
}

fn init_config(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        anyhow::bail!("{:?} already exists (use --force to overwrite)", path);
    }
    Config::default().save(path)?;
    println!("✓ Wrote default config to {:?}", path);
    Ok(())
}
