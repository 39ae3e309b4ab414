mod config;
mod config_cmd;

use clap::{ArgAction, Args, Parser, Subcommand};
use coder_core::dictionary::{install_dictionary, load_dictionary};
use coder_core::infer::{InferenceStrategy, infer_dictionary_columns, score_columns};
use coder_core::llm::{LlmClassifier, create_classifier};
use coder_core::matcher::KeywordTable;
use coder_core::pipeline::{Dispatcher, Strategy};
use coder_core::processor::process;
use coder_core::summary::{summarize_frequencies, write_summary};
use coder_core::table::Table;
use coder_core::{
    DictionaryError, InferenceError, LlmError, MatchError, ProcessError, TableError,
};
use config::{Config, ConfigError, ConfigPaths, validate_threshold};
use std::fs;
use std::path::PathBuf;
use thiserror::Error;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "coder", version, about = "behavioral coding for transcript lines")]
struct Cli {
    /// Raise log verbosity (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Code transcript files or a directory of CSV transcripts
    Process(ProcessArgs),
    /// Count primary labels across coded files
    Summary(SummaryArgs),
    /// Install or inspect the keyword dictionary
    #[command(subcommand)]
    Dictionary(DictionaryCommand),
    /// Report which columns of a table hold keywords and codes
    Infer(InferArgs),
    Config(config_cmd::ConfigArgs),
}

#[derive(Args, Debug, Clone)]
struct ProcessArgs {
    /// Transcript files, or a single directory
    #[arg(required = true, value_name = "INPUT")]
    inputs: Vec<PathBuf>,

    /// Output files (one per input) or a single output directory
    #[arg(short, long = "output", value_name = "OUTPUT")]
    outputs: Vec<PathBuf>,

    #[arg(long, value_parser = config::STRATEGIES)]
    strategy: Option<String>,

    /// Dictionary CSV; defaults to the installed dictionary
    #[arg(long, value_name = "PATH")]
    dictionary: Option<PathBuf>,

    /// Minimum confidence for scored candidates
    #[arg(long, value_name = "F")]
    threshold: Option<f64>,

    /// Ask the LLM for a verdict on every line (scored strategy)
    #[arg(long)]
    llm: bool,
}

#[derive(Args, Debug, Clone)]
struct SummaryArgs {
    #[arg(required = true, value_name = "FILE")]
    files: Vec<PathBuf>,

    #[arg(short, long, value_name = "PATH")]
    output: PathBuf,
}

#[derive(Subcommand, Debug, Clone)]
enum DictionaryCommand {
    /// Replace the active dictionary, keeping a timestamped backup
    Install {
        #[arg(value_name = "PATH")]
        path: PathBuf,
    },
    /// Print the active dictionary
    Show,
}

#[derive(Args, Debug, Clone)]
struct InferArgs {
    #[arg(value_name = "PATH")]
    path: PathBuf,

    /// Use name-based fallback instead of scored inference
    #[arg(long)]
    fallback: bool,
}

#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Dictionary(#[from] DictionaryError),
    #[error(transparent)]
    Inference(#[from] InferenceError),
    #[error(transparent)]
    Match(#[from] MatchError),
    #[error(transparent)]
    Llm(#[from] LlmError),
    #[error(transparent)]
    Process(#[from] ProcessError),
    #[error(transparent)]
    Table(#[from] TableError),
    #[error("{failed} of {total} files failed")]
    FilesFailed { failed: usize, total: usize },
}

/// Settings for one `process` run after flags, config and env are merged.
#[derive(Debug, Clone, PartialEq)]
struct ProcessSettings {
    strategy: String,
    threshold: f64,
    dictionary: PathBuf,
    llm: bool,
    outputs: Vec<PathBuf>,
}

impl ProcessArgs {
    fn resolve(&self, config: &Config, paths: &ConfigPaths) -> Result<ProcessSettings, ConfigError> {
        let strategy = self
            .strategy
            .clone()
            .unwrap_or_else(|| config.classify.strategy.clone());
        let threshold = self.threshold.unwrap_or(config.classify.threshold);
        validate_threshold("--threshold", threshold)?;

        let scored = strategy == "scored";
        if self.llm && !scored {
            return Err(ConfigError::Validation(
                "--llm requires --strategy scored".into(),
            ));
        }
        if config.llm.enabled && !scored {
            warn!(strategy = %strategy, "llm.enabled is ignored outside the scored strategy");
        }

        let dictionary = self
            .dictionary
            .clone()
            .unwrap_or_else(|| config.dictionary_path(paths));

        let outputs = if self.outputs.is_empty() && !config.output.dir.trim().is_empty() {
            vec![PathBuf::from(config.output.dir.trim())]
        } else {
            self.outputs.clone()
        };

        Ok(ProcessSettings {
            strategy,
            threshold,
            dictionary,
            llm: scored && (self.llm || config.llm.enabled),
            outputs,
        })
    }
}

fn env_override(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn apply_env_overrides(config: &mut Config) {
    if let Some(value) = env_override("CODER_LLM_MODEL") {
        config.llm.model = value;
    }
    if let Some(value) = env_override("CODER_LLM_API_KEY") {
        config.llm.api_key = value;
    }
    if config.llm.api_key.trim().is_empty()
        && let Some(value) = env_override("OPENROUTER_API_KEY")
    {
        config.llm.api_key = value;
    }
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let paths = match ConfigPaths::from_home() {
        Ok(paths) => paths,
        Err(err) => {
            eprintln!("config paths error: {err}");
            std::process::exit(1);
        }
    };

    if let Command::Config(args) = &cli.command {
        if let Err(e) = config_cmd::run(args, &paths) {
            eprintln!("config failed: {e}");
            std::process::exit(1);
        }
        return;
    }

    let mut config = match Config::load_or_create(&paths) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("config load failed: {err}");
            std::process::exit(1);
        }
    };
    apply_env_overrides(&mut config);

    let (label, result) = match cli.command {
        Command::Process(args) => ("process", run_process(&args, &config, &paths)),
        Command::Summary(args) => ("summary", run_summary(&args)),
        Command::Dictionary(command) => ("dictionary", run_dictionary(&command, &config, &paths)),
        Command::Infer(args) => ("infer", run_infer(&args)),
        Command::Config(_) => return,
    };
    if let Err(e) = result {
        eprintln!("{label} failed: {e}");
        std::process::exit(1);
    }
}

fn run_process(args: &ProcessArgs, config: &Config, paths: &ConfigPaths) -> Result<(), CliError> {
    config.validate()?;
    let settings = args.resolve(config, paths)?;
    // Only output.dir is created up front; a user -o must already exist to act as a directory.
    if let [dir] = settings.outputs.as_slice()
        && args.outputs.is_empty()
    {
        fs::create_dir_all(dir).map_err(ConfigError::Io)?;
    }

    let strategy = build_strategy(&settings, config)?;
    let dispatcher = Dispatcher::new(strategy)?;
    let report = process(&dispatcher, &args.inputs, &settings.outputs)?;

    for file in &report.files {
        match &file.outcome {
            Ok(stats) => {
                let mut line = format!(
                    "{} -> {} ({} rows",
                    file.input.display(),
                    file.output.display(),
                    stats.classified
                );
                if stats.skipped > 0 {
                    line.push_str(&format!(", {} skipped", stats.skipped));
                }
                if stats.llm_fallbacks > 0 {
                    line.push_str(&format!(", {} keyword-only", stats.llm_fallbacks));
                }
                line.push(')');
                println!("{line}");
            }
            Err(err) => eprintln!("{}: {err}", file.input.display()),
        }
    }

    if report.is_success() {
        Ok(())
    } else {
        Err(CliError::FilesFailed {
            failed: report.failed(),
            total: report.files.len(),
        })
    }
}

fn build_strategy(settings: &ProcessSettings, config: &Config) -> Result<Strategy, CliError> {
    match settings.strategy.as_str() {
        "dictionary" => Ok(Strategy::Dictionary(load_dictionary(&settings.dictionary)?)),
        "scored" => {
            let dictionary = load_dictionary(&settings.dictionary)?;
            let keywords = KeywordTable::from_dictionary(&dictionary);
            let llm: Option<Box<dyn LlmClassifier>> = if settings.llm {
                let classifier = create_classifier(
                    &config.llm.provider,
                    Some(&config.llm.model),
                    Some(&config.llm.api_key),
                )?;
                info!(provider = classifier.name(), model = %config.llm.model, "llm enabled");
                Some(classifier)
            } else {
                None
            };
            Ok(Strategy::Scored {
                keywords,
                llm,
                threshold: settings.threshold,
            })
        }
        _ => Ok(Strategy::Rules),
    }
}

fn run_summary(args: &SummaryArgs) -> Result<(), CliError> {
    let summary = summarize_frequencies(&args.files)?;
    write_summary(&summary, &args.output)?;
    for skipped in &summary.skipped {
        eprintln!("{}: no label column, skipped", skipped.display());
    }
    println!(
        "wrote {} codes ({} lines) to {}",
        summary.counts.len(),
        summary.total(),
        args.output.display()
    );
    Ok(())
}

fn run_dictionary(
    command: &DictionaryCommand,
    config: &Config,
    paths: &ConfigPaths,
) -> Result<(), CliError> {
    let dest = config.dictionary_path(paths);
    match command {
        DictionaryCommand::Install { path } => {
            let backup = install_dictionary(path, &dest)?;
            println!("installed {} -> {}", path.display(), dest.display());
            if let Some(backup) = backup {
                println!("previous dictionary saved as {}", backup.display());
            }
        }
        DictionaryCommand::Show => {
            let dictionary = load_dictionary(&dest)?;
            println!("dictionary: {}", dest.display());
            println!("version: {}", dictionary.version());
            println!("codes: {}", dictionary.len());
            for entry in dictionary.entries() {
                println!("- {}: {}", entry.code, entry.keywords.join(", "));
            }
        }
    }
    Ok(())
}

fn run_infer(args: &InferArgs) -> Result<(), CliError> {
    let table = Table::read_csv(&args.path)?;
    let strategy = if args.fallback {
        InferenceStrategy::Fallback
    } else {
        InferenceStrategy::Scored
    };
    if strategy == InferenceStrategy::Scored {
        for score in score_columns(&table) {
            println!(
                "{}: keyword {:.2}, code {:.2}",
                score.column, score.keyword_score, score.code_score
            );
        }
    }
    let roles = infer_dictionary_columns(&table, strategy)?;
    println!("keyword column: {}", roles.keyword);
    println!("code column: {}", roles.code);
    Ok(())
}
