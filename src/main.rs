use aider_all::{
    Bound, EditFormatMode, FileConfig, Pipeline, RunConfig, ScanLogic, SelectionMode, TokenizerKind,
};
use anyhow::Context;
use clap::Parser;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

const DEFAULT_CONFIG_FILE: &str = "aider-all.toml";

#[derive(Parser, Debug)]
#[command(
    name = "aider-all",
    version,
    author,
    about = "Batch source files by token budget and run aider on each batch",
    long_about = "Walks a project, groups files into token-bounded batches (optionally keeping \
    every file together with its dependencies) and runs the aider coding assistant once per batch.\n\n\
    Settings come from a TOML file (--config, $AIDER_ALL_CONFIG or ./aider-all.toml) and are \
    overridden by the flags below.\n\n\
    USAGE EXAMPLES:\n  \
      # Preview the batches without running aider\n  \
      aider-all --dir ./my-app --dry-run\n\n  \
      # Keep dependency closures together, 8k tokens per batch\n  \
      aider-all --dir ./my-app --scan-logic standard-dependencies --token-limit 8000\n\n  \
      # Rotate models and send a custom instruction\n  \
      aider-all --model-selection turn-based --models gpt-4o,claude-3-5-sonnet-20240620 \\\n    \
        --message 'Add JSDoc comments to {{ file_list }}'"
)]
struct Cli {
    /// Configuration file
    #[arg(short, long, env = "AIDER_ALL_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Project directory; aider and the dependency tool run here
    #[arg(short, long, value_name = "PATH")]
    dir: Option<PathBuf>,

    /// Subdirectory of the project to start scanning from
    #[arg(long, value_name = "PATH")]
    scan_start: Option<PathBuf>,

    /// Directory levels to descend below the scan root, or "unbounded"
    #[arg(long, value_name = "N", value_parser = parse_depth)]
    scan_depth: Option<Bounded>,

    /// Allowed file extensions (comma-separated)
    #[arg(short, long = "ext", value_delimiter = ',', value_name = "EXT")]
    extensions: Vec<String>,

    /// Ignore glob patterns, replacing the defaults (repeatable)
    #[arg(long, value_name = "GLOB")]
    ignore: Vec<String>,

    /// Read-only context file patterns (repeatable)
    #[arg(long, value_name = "GLOB")]
    read_only: Vec<String>,

    /// Honor .gitignore files
    #[arg(long)]
    respect_gitignore: bool,

    /// Planning mode
    #[arg(short = 'l', long, value_enum)]
    scan_logic: Option<CliScanLogic>,

    /// Token budget per batch, or "unbounded"
    #[arg(short, long, value_name = "N", value_parser = parse_limit, allow_negative_numbers = true)]
    token_limit: Option<Bounded>,

    /// Tokenizer used for estimates
    #[arg(long, value_enum)]
    tokenizer: Option<CliTokenizer>,

    /// Model selection policy
    #[arg(long, value_enum)]
    model_selection: Option<CliSelection>,

    /// Model for fixed selection
    #[arg(short, long)]
    model: Option<String>,

    /// Models for random and turn-based selection (comma-separated)
    #[arg(long, value_delimiter = ',', value_name = "MODEL")]
    models: Vec<String>,

    /// Edit format policy
    #[arg(long, value_enum)]
    edit_format: Option<CliEditFormat>,

    /// Message template (repeatable)
    #[arg(long = "message", value_name = "TEMPLATE")]
    messages: Vec<String>,

    /// Message selection policy
    #[arg(long, value_enum)]
    message_selection: Option<CliSelection>,

    /// Assistant program
    #[arg(long, value_name = "PROGRAM")]
    assistant: Option<String>,

    /// Extra argument passed to the assistant (repeatable)
    #[arg(long = "assistant-arg", value_name = "ARG", allow_hyphen_values = true)]
    assistant_args: Vec<String>,

    /// Assistant timeout per batch in seconds
    #[arg(long, value_name = "SECS")]
    timeout: Option<u64>,

    /// Dependency tool timeout per file in seconds
    #[arg(long, value_name = "SECS")]
    dependency_timeout: Option<u64>,

    /// Concurrent assistant invocations (0 = number of CPUs)
    #[arg(short, long)]
    jobs: Option<usize>,

    /// Seed for random selection
    #[arg(long)]
    seed: Option<u64>,

    /// Log the planned invocations instead of running the assistant
    #[arg(long)]
    dry_run: bool,

    /// Dry-run log file
    #[arg(long, value_name = "FILE")]
    dry_run_log: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Same as -v
    #[arg(long)]
    debug: bool,

    /// Print the run summary as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum CliScanLogic {
    /// One batch per file
    Basic,
    /// Files packed up to the token limit
    Standard,
    /// One batch per dependency group
    BasicDependencies,
    /// Dependency groups packed up to the token limit
    StandardDependencies,
}

impl From<CliScanLogic> for ScanLogic {
    fn from(s: CliScanLogic) -> Self {
        match s {
            CliScanLogic::Basic => Self::Basic,
            CliScanLogic::Standard => Self::Standard,
            CliScanLogic::BasicDependencies => Self::BasicDependencies,
            CliScanLogic::StandardDependencies => Self::StandardDependencies,
        }
    }
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum CliTokenizer {
    Cl100k,
    O200k,
    Simple,
}

impl From<CliTokenizer> for TokenizerKind {
    fn from(t: CliTokenizer) -> Self {
        match t {
            CliTokenizer::Cl100k => Self::Cl100k,
            CliTokenizer::O200k => Self::O200k,
            CliTokenizer::Simple => Self::Simple,
        }
    }
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum CliSelection {
    #[value(alias = "default")]
    Fixed,
    Random,
    #[value(alias = "round-robin")]
    TurnBased,
}

impl From<CliSelection> for SelectionMode {
    fn from(s: CliSelection) -> Self {
        match s {
            CliSelection::Fixed => Self::Fixed,
            CliSelection::Random => Self::Random,
            CliSelection::TurnBased => Self::TurnBased,
        }
    }
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum CliEditFormat {
    Diff,
    #[value(alias = "unified-diff")]
    Udiff,
    Random,
    #[value(alias = "round-robin")]
    TurnBased,
    #[value(name = "none")]
    Off,
}

impl From<CliEditFormat> for EditFormatMode {
    fn from(f: CliEditFormat) -> Self {
        match f {
            CliEditFormat::Diff => Self::Diff,
            CliEditFormat::Udiff => Self::Udiff,
            CliEditFormat::Random => Self::Random,
            CliEditFormat::TurnBased => Self::TurnBased,
            CliEditFormat::Off => Self::None,
        }
    }
}

/// A count or "unbounded" (`None`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Bounded(Option<usize>);

fn parse_limit(s: &str) -> Result<Bounded, String> {
    Bound::from(s).limit().map(Bounded).map_err(|e| e.to_string())
}

fn parse_depth(s: &str) -> Result<Bounded, String> {
    Bound::from(s).depth().map(Bounded).map_err(|e| e.to_string())
}

fn config_file(cli: &Cli) -> Option<PathBuf> {
    cli.config.clone().or_else(|| {
        let local = Path::new(DEFAULT_CONFIG_FILE);
        local.is_file().then(|| local.to_path_buf())
    })
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let file = config_file(&cli)
        .map(|path| {
            FileConfig::load(&path)
                .with_context(|| format!("Failed to load configuration file {}", path.display()))
        })
        .transpose()?;

    let file_debug = file.as_ref().and_then(|f| f.debug).unwrap_or(false);
    let verbosity = cli.verbose.max(u8::from(cli.debug || file_debug));
    setup_tracing(verbosity)?;

    let mut builder = RunConfig::builder();
    if let Some(file) = file {
        builder = builder
            .merge_file(file)
            .context("Invalid value in configuration file")?;
    }

    if let Some(dir) = cli.dir {
        builder = builder.project_dir(dir);
    }
    if let Some(start) = cli.scan_start {
        builder = builder.scan_start(start);
    }
    if let Some(Bounded(depth)) = cli.scan_depth {
        builder = builder.scan_depth(depth);
    }
    if !cli.extensions.is_empty() {
        builder = builder.extensions(cli.extensions);
    }
    if !cli.ignore.is_empty() {
        builder = builder.ignore(cli.ignore);
    }
    if !cli.read_only.is_empty() {
        builder = builder.read_only(cli.read_only);
    }
    if cli.respect_gitignore {
        builder = builder.respect_gitignore(true);
    }
    if let Some(logic) = cli.scan_logic {
        builder = builder.scan_logic(logic.into());
    }
    if let Some(Bounded(limit)) = cli.token_limit {
        builder = builder.token_limit(limit);
    }
    if let Some(tokenizer) = cli.tokenizer {
        builder = builder.tokenizer(tokenizer.into());
    }
    if let Some(mode) = cli.model_selection {
        builder = builder.model_selection(mode.into());
    }
    if let Some(model) = cli.model {
        builder = builder.model(model);
    }
    if !cli.models.is_empty() {
        builder = builder.models(cli.models);
    }
    if let Some(format) = cli.edit_format {
        builder = builder.edit_format(format.into());
    }
    if !cli.messages.is_empty() {
        builder = builder.messages(cli.messages);
    }
    if let Some(mode) = cli.message_selection {
        builder = builder.message_selection(mode.into());
    }
    if let Some(assistant) = cli.assistant {
        builder = builder.assistant(assistant);
    }
    if !cli.assistant_args.is_empty() {
        builder = builder.assistant_args(cli.assistant_args);
    }
    if let Some(secs) = cli.timeout {
        builder = builder.timeout(Duration::from_secs(secs));
    }
    if let Some(secs) = cli.dependency_timeout {
        builder = builder.dependency_timeout(Duration::from_secs(secs));
    }
    if let Some(jobs) = cli.jobs {
        builder = builder.jobs(jobs);
    }
    if let Some(seed) = cli.seed {
        builder = builder.seed(seed);
    }
    if cli.dry_run {
        builder = builder.dry_run(true);
    }
    if let Some(log) = cli.dry_run_log {
        builder = builder.dry_run_log(log);
    }
    if cli.debug {
        builder = builder.debug(true);
    }

    let config = builder.build().context("Failed to build configuration")?;

    let summary = Pipeline::new(config)
        .context("Failed to create pipeline")?
        .run()
        .context("Run failed")?;

    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&summary).context("Failed to serialize summary")?
        );
    } else {
        summary.print_summary();
    }

    Ok(())
}

fn setup_tracing(verbosity: u8) -> anyhow::Result<()> {
    let filter = match verbosity {
        0 => EnvFilter::new("aider_all=info"),
        1 => EnvFilter::new("aider_all=debug"),
        _ => EnvFilter::new("aider_all=trace"),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_thread_ids(false))
        .init();

    Ok(())
}
