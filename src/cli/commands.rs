//! CLI command definitions for reason-forge.
//!
//! The binary is a thin wrapper: it loads [`EngineConfig`] from the
//! environment, builds the sandbox, generator and case log once, and hands
//! them to the search controller or evaluator.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use serde::Serialize;
use tracing::{info, warn};

use crate::config::{ConfigError, EngineConfig};
use crate::evaluator::{EvaluationResult, TieredEvaluator};
use crate::execution::{connect_sandbox, SandboxStrategy};
use crate::history::{CaseLog, JsonlRetriever};
use crate::llm::{
    CacheStats, CachedGenerator, CandidateCache, CandidateGenerator, LiteLlmClient, LlmGenerator,
    ModelRouter,
};
use crate::search::{MctsController, RunStats};

/// Automated repair of Python functions by tree search over LLM candidates.
#[derive(Parser)]
#[command(name = "reason-forge")]
#[command(about = "Repair Python functions with MCTS over verified LLM candidates")]
#[command(version)]
#[command(
    long_about = "reason-forge searches for a corrected version of a buggy Python function.\n\nCandidates are generated by an OpenAI-compatible model, checked for syntax and shape, and run against a test harness in a Docker sandbox.\n\nExample usage:\n  LLM_API_BASE=http://localhost:4000/v1 reason-forge repair --code buggy.py --harness tests.py"
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Search for a repaired version of a function.
    Repair(RepairArgs),

    /// Evaluate one candidate against a harness without searching.
    Check(CheckArgs),
}

/// Arguments for `reason-forge repair`.
#[derive(Parser, Debug)]
pub struct RepairArgs {
    /// File containing the buggy code.
    #[arg(short, long)]
    pub code: String,

    /// File containing the test harness, indented for the main guard.
    #[arg(short = 't', long)]
    pub harness: String,

    /// Override the number of simulations (MCTS_SIMULATIONS).
    #[arg(short = 'n', long)]
    pub simulations: Option<u32>,

    /// Override candidates per expansion (MCTS_CANDIDATES).
    #[arg(long)]
    pub candidates: Option<usize>,

    /// Override the sandbox strategy (SANDBOX_STRATEGY).
    #[arg(long)]
    pub strategy: Option<SandboxStrategy>,

    /// Output JSON summary.
    #[arg(short = 'j', long)]
    pub json: bool,
}

/// Arguments for `reason-forge check`.
#[derive(Parser, Debug)]
pub struct CheckArgs {
    /// File containing the candidate code.
    #[arg(short, long)]
    pub code: String,

    /// File containing the test harness, indented for the main guard.
    #[arg(short = 't', long)]
    pub harness: String,

    /// Override the sandbox strategy (SANDBOX_STRATEGY).
    #[arg(long)]
    pub strategy: Option<SandboxStrategy>,

    /// Output JSON summary.
    #[arg(short = 'j', long)]
    pub json: bool,
}

/// Parse CLI arguments.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Run the CLI by parsing arguments and executing the command.
///
/// For more control over logging initialization, use `parse_cli()` and
/// `run_with_cli()`.
pub async fn run() -> anyhow::Result<()> {
    run_with_cli(parse_cli()).await
}

/// Run the CLI with the parsed arguments.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Repair(args) => run_repair_command(args).await,
        Commands::Check(args) => run_check_command(args).await,
    }
}

#[derive(Debug, Serialize)]
struct RepairOutput {
    fixed: bool,
    code: String,
    evaluation: Option<EvaluationResult>,
    stats: RunStats,
    cache: CacheStats,
}

async fn run_repair_command(args: RepairArgs) -> anyhow::Result<()> {
    let code = read_input(&args.code, "code")?;
    let harness = read_input(&args.harness, "harness")?;

    let mut config = EngineConfig::from_env()?;
    if let Some(simulations) = args.simulations {
        config.search.simulations = simulations;
    }
    if let Some(candidates) = args.candidates {
        config.search.candidates = candidates;
    }
    if let Some(strategy) = args.strategy {
        config.sandbox.strategy = strategy;
    }
    config.validate()?;

    let cache = Arc::new(CandidateCache::new(config.cache_size).with_ttl(config.cache_ttl));
    let generator: Arc<dyn CandidateGenerator> =
        Arc::new(CachedGenerator::new(build_generator(&config)?, cache.clone()));

    let case_log = Arc::new(CaseLog::new(&config.case_log_dir));
    let retriever = Arc::new(JsonlRetriever::new(case_log.failure_path()));

    let sandbox = connect_sandbox(config.sandbox.clone())
        .context("Docker sandbox is unavailable; is the Docker daemon running?")?;
    let evaluator = TieredEvaluator::new(sandbox.clone()).with_case_log(case_log);

    info!(
        code_file = %args.code,
        strategy = %config.sandbox.strategy,
        simulations = config.search.simulations,
        "Starting repair"
    );

    let mut controller = MctsController::new(code, evaluator, generator, config.search.clone())
        .with_retriever(retriever);
    let result = controller.run(&harness).await;
    sandbox.shutdown().await;
    let outcome = result?;

    let cache_stats = cache.stats();
    info!(
        cache_hits = cache_stats.hits,
        cache_misses = cache_stats.misses,
        hit_rate = cache_stats.hit_rate(),
        "Candidate cache"
    );

    let output = RepairOutput {
        fixed: outcome.is_fixed(),
        code: outcome.code,
        evaluation: outcome.evaluation,
        stats: outcome.stats,
        cache: cache_stats,
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    if !output.fixed {
        warn!("No candidate passed the harness; printing the best one found");
    }
    println!("{}", output.code);
    println!();
    print_evaluation(output.evaluation.as_ref());
    println!(
        "Simulations: {}  LLM calls: {}  Early rejects: {:.1}%",
        output.stats.simulations,
        output.stats.llm_calls,
        output.stats.early_reject_rate() * 100.0
    );
    Ok(())
}

async fn run_check_command(args: CheckArgs) -> anyhow::Result<()> {
    let code = read_input(&args.code, "code")?;
    let harness = read_input(&args.harness, "harness")?;

    let mut config = EngineConfig::from_env()?;
    if let Some(strategy) = args.strategy {
        config.sandbox.strategy = strategy;
    }

    let sandbox = connect_sandbox(config.sandbox.clone())
        .context("Docker sandbox is unavailable; is the Docker daemon running?")?;
    let evaluator = TieredEvaluator::new(sandbox.clone());
    let evaluation = evaluator.evaluate(&code, &harness).await;
    sandbox.shutdown().await;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&evaluation)?);
    } else {
        print_evaluation(Some(&evaluation));
    }
    Ok(())
}

/// Builds the generation oracle from the configured endpoints: a router
/// when both a local and a remote model are available, otherwise whichever
/// one is.
fn build_generator(config: &EngineConfig) -> anyhow::Result<Arc<dyn CandidateGenerator>> {
    let llm = &config.llm;

    let remote = match &llm.api_base {
        Some(api_base) => {
            info!(api_base = %api_base, model = %llm.model, "Using remote model");
            let client =
                LiteLlmClient::new(api_base, llm.api_key.clone(), &llm.model, llm.timeout)?;
            let generator = LlmGenerator::new("remote", Arc::new(client), &llm.model)
                .with_temperature(llm.temperature)
                .with_max_concurrent(llm.max_concurrent);
            Some(Arc::new(generator) as Arc<dyn CandidateGenerator>)
        }
        None => None,
    };

    let local = match &llm.local_api_base {
        Some(api_base) => {
            info!(api_base = %api_base, model = %llm.local_model, "Using local model");
            let client = LiteLlmClient::new(api_base, None, &llm.local_model, llm.timeout)?;
            let generator = LlmGenerator::new("local", Arc::new(client), &llm.local_model)
                .with_temperature(llm.temperature)
                .with_max_concurrent(llm.max_concurrent);
            Some(Arc::new(generator) as Arc<dyn CandidateGenerator>)
        }
        None => None,
    };

    match (local, remote) {
        (Some(local), Some(remote)) => Ok(Arc::new(ModelRouter::new(Some(local), Some(remote)))),
        (Some(only), None) | (None, Some(only)) => Ok(only),
        (None, None) => Err(ConfigError::MissingEnvVar(
            "LLM_API_BASE or LOCAL_LLM_API_BASE".to_string(),
        )
        .into()),
    }
}

fn read_input(path: &str, what: &str) -> anyhow::Result<String> {
    if !Path::new(path).exists() {
        return Err(anyhow::anyhow!("{} file does not exist: {}", what, path));
    }
    fs::read_to_string(path).with_context(|| format!("Failed to read {} file {}", what, path))
}

fn print_evaluation(evaluation: Option<&EvaluationResult>) {
    let Some(evaluation) = evaluation else {
        println!("Result: no candidate was generated");
        return;
    };

    match evaluation.failed_at {
        None => println!("Result: PASS (reward {:.1})", evaluation.reward),
        Some(level) => println!(
            "Result: FAIL at {} (reward {:.1}): {}",
            level,
            evaluation.reward,
            evaluation.failure_message().unwrap_or_default()
        ),
    }
}
