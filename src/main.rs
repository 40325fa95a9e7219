//! seqflow CLI
//!
//! Line-oriented record processing with ordered, bounded-concurrency workers.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use seqflow::io::{open_input, open_output, LineSink, LineSource};
use seqflow::transform::{ExactMatchFilter, RegexFilter, RegexReplace};
use seqflow::{build_runtime, run_to_completion, Config, OrderedPipeline, Transform};

#[derive(Parser)]
#[command(name = "seqflow")]
#[command(about = "Process line records with ordered parallel workers", long_about = None)]
struct Cli {
    /// Path to configuration file (defaults apply when omitted)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Override number of concurrent workers
    #[arg(short = 'j', long, global = true)]
    threads: Option<usize>,

    /// Override records per chunk
    #[arg(long, global = true)]
    chunk_size: Option<usize>,

    /// Input file ("-" for stdin)
    #[arg(short, long, global = true)]
    input: Option<PathBuf>,

    /// Output file ("-" for stdout)
    #[arg(short, long, global = true)]
    output: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Keep lines matching patterns
    Grep {
        /// Regular expression to match (repeatable)
        #[arg(short, long = "pattern")]
        patterns: Vec<String>,

        /// File of exact whole-line patterns, one per line
        #[arg(short = 'f', long, conflicts_with = "patterns")]
        pattern_file: Option<PathBuf>,

        /// Keep lines that do not match
        #[arg(short = 'v', long)]
        invert: bool,

        /// Stop matching a pattern after its first hit (single worker only)
        #[arg(long, requires = "pattern_file")]
        delete_matched: bool,
    },

    /// Replace regex matches in every line
    Replace {
        /// Regular expression to replace
        #[arg(short, long)]
        pattern: String,

        /// Replacement text; `$1` / `${name}` refer to capture groups
        #[arg(short, long)]
        replacement: String,
    },

    /// Validate configuration
    Validate,

    /// Generate a sample configuration file
    GenerateConfig {
        /// Output path for configuration file
        #[arg(long = "to", default_value = "config.yaml")]
        path: PathBuf,
    },
}

fn main() {
    // Logs go to stderr; stdout may carry records.
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let cli = Cli::parse();

    if let Err(e) = dispatch(cli) {
        tracing::error!("{:#}", e);
        std::process::exit(1);
    }
}

fn dispatch(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::GenerateConfig { ref path } => generate_config_command(path),
        Commands::Validate => validate_command(&cli),
        Commands::Grep {
            ref patterns,
            ref pattern_file,
            invert,
            delete_matched,
        } => {
            let config = load_config(&cli)?;
            match pattern_file {
                Some(file) => {
                    let patterns = read_patterns(file)?;
                    tracing::info!("Loaded {} exact patterns from {}", patterns.len(), file.display());
                    let filter = ExactMatchFilter::new(
                        patterns,
                        invert,
                        delete_matched,
                        config.processing.concurrency,
                    );
                    run_command(config, filter)
                }
                None => {
                    if patterns.is_empty() {
                        anyhow::bail!("grep needs at least one --pattern or a --pattern-file");
                    }
                    run_command(config, RegexFilter::new(patterns, invert)?)
                }
            }
        }
        Commands::Replace {
            ref pattern,
            ref replacement,
        } => {
            let config = load_config(&cli)?;
            run_command(config, RegexReplace::new(pattern, replacement.as_str())?)
        }
    }
}

/// Load the config file (or defaults) and apply command-line overrides.
fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => Config::default(),
    };

    // Apply overrides
    if let Some(threads) = cli.threads {
        config.processing.concurrency = threads;
    }
    if let Some(size) = cli.chunk_size {
        config.processing.chunk_size = size;
    }
    if cli.input.is_some() {
        config.input.path = cli.input.clone();
    }
    if cli.output.is_some() {
        config.output.path = cli.output.clone();
    }

    config.validate()?;
    Ok(config)
}

fn read_patterns(path: &PathBuf) -> Result<Vec<String>> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read pattern file {}", path.display()))?;
    Ok(contents
        .lines()
        .map(|line| line.trim_end_matches('\r'))
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect())
}

fn run_command<T>(config: Config, transform: T) -> Result<()>
where
    T: Transform<String, String> + 'static,
{
    let runtime = build_runtime(config.processing.worker_threads)?;

    run_to_completion(runtime, async {
        let reader = open_input(config.input.path.as_deref())?;
        let writer = open_output(config.output.path.as_deref())?;

        let source = LineSource::new(reader, config.processing.chunk_size);
        let mut sink = LineSink::new(writer);

        let pipeline = OrderedPipeline::new(transform, config.processing.to_pipeline_config());

        let cancel = pipeline.cancel_token();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupted, stopping");
                cancel.cancel();
            }
            // A second interrupt exits without waiting for the pipeline
            if tokio::signal::ctrl_c().await.is_ok() {
                std::process::exit(130);
            }
        });

        let result = pipeline.run(source, &mut sink).await;

        if let Some(path) = &config.processing.metrics_output_path {
            pipeline.metrics().snapshot().save_to_file(path)?;
        }

        let stats = result?;
        tracing::info!("{}", stats);
        Ok(())
    })
}

fn validate_command(cli: &Cli) -> Result<()> {
    load_config(cli)?;
    println!("Configuration is valid");
    Ok(())
}

fn generate_config_command(path: &PathBuf) -> Result<()> {
    // Generate a commented YAML config
    let yaml = r#"# seqflow configuration

# === INPUT: Where to read records from ===
input:
  # File with one record per line (null or "-" = stdin)
  path: null

# === OUTPUT: Where to write records to ===
output:
  # File to write (null or "-" = stdout)
  path: null

# === PROCESSING: Performance tuning ===
processing:
  # Number of chunks transformed concurrently
  # 1 processes chunks strictly in sequence
  concurrency: 4

  # Records per chunk
  chunk_size: 1000

  # Completion channel capacity (null = concurrency)
  # completion_buffer: 16

  # Tokio worker threads (null = num CPUs)
  # worker_threads: 8

  # Log throughput while processing
  enable_metrics: false

  # Metrics reporting interval in seconds
  metrics_interval_secs: 10

  # Save a JSON metrics snapshot after the run
  # metrics_output_path: "metrics.json"
"#;

    std::fs::write(path, yaml)?;
    println!("Generated sample configuration at: {}", path.display());

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse_grep() {
        let cli = Cli::try_parse_from(["seqflow", "grep", "-p", "^>chr1", "-p", "ACGT", "-j", "8"])
            .unwrap();
        assert_eq!(cli.threads, Some(8));
        match cli.command {
            Commands::Grep { patterns, invert, .. } => {
                assert_eq!(patterns, vec!["^>chr1", "ACGT"]);
                assert!(!invert);
            }
            _ => panic!("expected grep"),
        }
    }

    #[test]
    fn test_cli_delete_matched_requires_pattern_file() {
        assert!(Cli::try_parse_from(["seqflow", "grep", "-p", "x", "--delete-matched"]).is_err());
        assert!(Cli::try_parse_from([
            "seqflow",
            "grep",
            "-f",
            "ids.txt",
            "--delete-matched"
        ])
        .is_ok());
    }

    #[test]
    fn test_cli_parse_replace() {
        let cli = Cli::try_parse_from(["seqflow", "replace", "-p", "^chr", "-r", "Chr"]);
        assert!(cli.is_ok());
    }

    #[test]
    fn test_cli_parse_validate_with_config() {
        let cli = Cli::try_parse_from(["seqflow", "validate", "-c", "test.json"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("test.json")));
    }

    #[test]
    fn test_overrides_applied() {
        let cli = Cli::try_parse_from([
            "seqflow",
            "--chunk-size",
            "50",
            "-j",
            "3",
            "-o",
            "out.txt",
            "replace",
            "-p",
            "a",
            "-r",
            "b",
        ])
        .unwrap();
        let config = load_config(&cli).unwrap();
        assert_eq!(config.processing.chunk_size, 50);
        assert_eq!(config.processing.concurrency, 3);
        assert_eq!(config.output.path, Some(PathBuf::from("out.txt")));
    }

    #[test]
    fn test_zero_threads_rejected() {
        let cli = Cli::try_parse_from(["seqflow", "-j", "0", "validate"]).unwrap();
        assert!(load_config(&cli).is_err());
    }

    #[test]
    fn test_generated_config_is_valid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        generate_config_command(&path).unwrap();

        let config = Config::from_file(&path).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.processing.concurrency, 4);
    }

    #[test]
    fn test_read_patterns_skips_blank_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ids.txt");
        std::fs::write(&path, "read1\r\n\nread2\n").unwrap();
        assert_eq!(read_patterns(&path).unwrap(), vec!["read1", "read2"]);
    }
}
