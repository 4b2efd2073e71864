//! tagtally CLI
//!
//! Commands:
//!   analyze - Count hashtags across exported chat history
//!   plan - Show how records would be chunked, without calling the model
//!   tokens - Count tokens with the configured tokenizer
//!   config - Show or write the config file

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::*;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use tagtally::record::parse_instant;
use tagtally::{
    counter_for, AnalysisRequest, AnalysisSettings, Analyzer, Config, JsonFileSource, LlmError,
    OpenAiCompatClient, ProgressTracker, RecordSource, TimeRange,
};

#[derive(Parser)]
#[command(name = "tagtally")]
#[command(about = "Hashtag analysis of chat history with a language model")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Count hashtags across exported chat history
    Analyze {
        #[command(flatten)]
        input: InputArgs,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,

        /// Suppress progress output
        #[arg(short, long)]
        quiet: bool,
    },

    /// Show how records would be chunked, without calling the model
    Plan {
        #[command(flatten)]
        input: InputArgs,
    },

    /// Count tokens with the configured tokenizer
    Tokens {
        /// Text to count, or @FILE to read it from a file
        text: String,
    },

    /// Show the config file
    Config {
        /// Write a config file with default values
        #[arg(long)]
        init: bool,
    },
}

#[derive(Args)]
struct InputArgs {
    /// Exported records (JSON array or JSON Lines)
    #[arg(short, long)]
    records: PathBuf,

    /// Analysis prompt, or @FILE to read it from a file
    #[arg(short, long)]
    prompt: String,

    /// Known hashtag (repeatable)
    #[arg(long = "hint")]
    hints: Vec<String>,

    /// Only records of this source (repeatable)
    #[arg(short, long = "source")]
    sources: Vec<i64>,

    /// Only records at or after this time
    #[arg(long)]
    since: Option<String>,

    /// Only records at or before this time
    #[arg(long)]
    until: Option<String>,

    /// Lower the input token ceiling for this run
    #[arg(long)]
    max_input_tokens: Option<usize>,

    /// Keep only the newest N records of each source
    #[arg(long)]
    max_per_source: Option<usize>,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("TAGTALLY_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Read `@path` arguments from disk; anything else is taken literally.
fn read_arg(value: &str) -> Result<String> {
    match value.strip_prefix('@') {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path)),
        None => Ok(value.to_string()),
    }
}

fn parse_time(value: Option<&str>, flag: &str) -> Result<Option<chrono::DateTime<chrono::FixedOffset>>> {
    value
        .map(|v| parse_instant(v).with_context(|| format!("Invalid {} time: {}", flag, v)))
        .transpose()
}

async fn load_request(input: &InputArgs) -> Result<AnalysisRequest> {
    let range = TimeRange::new(
        parse_time(input.since.as_deref(), "--since")?,
        parse_time(input.until.as_deref(), "--until")?,
    )?;
    let source = JsonFileSource::new(&input.records);
    let records = source
        .fetch(&input.sources, range, input.max_per_source)
        .await
        .with_context(|| format!("Failed to load records from {}", source.path().display()))?;

    Ok(AnalysisRequest {
        prompt: read_arg(&input.prompt)?,
        hint_tags: input.hints.clone(),
        records,
        max_input_tokens: input.max_input_tokens,
        max_messages_per_source: input.max_per_source,
    })
}

fn build_analyzer(config: &Config, require_key: bool) -> Result<Analyzer> {
    let api_key = match config.model.api_key.clone() {
        Some(key) => key,
        None if require_key => return Err(LlmError::MissingApiKey.into()),
        None => String::new(),
    };
    let client = OpenAiCompatClient::new(api_key, config.model.base_url.clone());
    let counter = counter_for(config.tokenizer, &config.model.name);
    Ok(Analyzer::new(
        Arc::new(client),
        counter,
        AnalysisSettings::from_config(config),
    ))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();

    match cli.command {
        Commands::Analyze { input, json, quiet } => {
            let config = Config::resolve()?;
            let analyzer = build_analyzer(&config, true)?;
            let request = load_request(&input).await?;

            if !quiet && !json {
                println!(
                    "Analyzing {} records with {}...",
                    request.records.len(),
                    config.model.name.cyan()
                );
            }

            let mut progress = if quiet {
                ProgressTracker::quiet()
            } else {
                ProgressTracker::new()
            };
            let report = analyzer.analyze_with_progress(request, &mut progress).await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
                return Ok(());
            }

            println!(
                "\n{} records, {} requests, {} tags\n",
                report.total_records_considered,
                report.chunks,
                report.tags_ranked.len()
            );
            if report.tags_ranked.is_empty() {
                println!("{}", "No hashtags found.".dimmed());
            }
            for (i, tag) in report.tags_ranked.iter().enumerate() {
                let marker = if tag.already_known {
                    "known".dimmed().to_string()
                } else {
                    "new".green().to_string()
                };
                println!(
                    "{:>4}. {} {:>6}  {}",
                    i + 1,
                    format!("{:<32}", tag.tag).bold(),
                    tag.count,
                    marker
                );
            }
        }

        Commands::Plan { input } => {
            let config = Config::resolve()?;
            let analyzer = build_analyzer(&config, false)?;
            let request = load_request(&input).await?;
            let prepared = analyzer.prepare(&request)?;

            println!(
                "Model: {} ({} tokenizer)",
                analyzer.settings().model.cyan(),
                config.tokenizer.name()
            );
            println!("Records: {}", prepared.total_records);
            println!("Input ceiling: {} tokens", prepared.budget.max_input_tokens);
            println!(
                "User content budget: {} tokens (prefix {})",
                prepared.budget.user_content_tokens, prepared.prefix_tokens
            );
            println!("Chunks: {}\n", prepared.chunks.len().to_string().bold());
            for (i, chunk) in prepared.chunks.iter().enumerate() {
                let span = chunk
                    .block_span()
                    .map(|(first, last)| format!("records {}-{}", first + 1, last + 1))
                    .unwrap_or_default();
                println!(
                    "  {:>3}. {:>7} tokens  {:>3} parts  {}",
                    i + 1,
                    chunk.tokens,
                    chunk.parts.len(),
                    span.dimmed()
                );
            }
        }

        Commands::Tokens { text } => {
            let config = Config::resolve()?;
            let counter = counter_for(config.tokenizer, &config.model.name);
            let text = read_arg(&text)?;
            println!("{} ({})", counter.count(&text), counter.name().dimmed());
        }

        Commands::Config { init } => {
            let path = Config::path()?;
            if init {
                if Config::exists() {
                    println!("Config already exists at {}", path.display());
                } else {
                    Config::default().save()?;
                    println!("{} Wrote {}", "✓".green(), path.display());
                }
                return Ok(());
            }

            let mut shown = Config::resolve()?;
            if shown.model.api_key.is_some() {
                shown.model.api_key = Some("********".to_string());
            }
            let source = if Config::exists() {
                path.display().to_string()
            } else {
                "defaults".to_string()
            };
            println!("{} {}\n", "Config:".bold(), source.dimmed());
            println!("{}", toml::to_string_pretty(&shown)?);
        }
    }

    Ok(())
}
