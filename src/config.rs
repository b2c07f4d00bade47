use crate::deps::DependencyCruiser;
use crate::error::{Error, Result};
use crate::filter::{DEFAULT_IGNORE, PathFilter, build_globset};
use crate::planner::Grouping;
use crate::select::{EditFormatMode, SelectionMode};
use crate::template::{DEFAULT_MESSAGES, MessageRenderer};
use crate::token::TokenizerKind;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

const DEFAULT_TOKEN_LIMIT: usize = 4096;
const DEFAULT_TIMEOUT_SECS: u64 = 1800;
const DEFAULT_DEPENDENCY_TIMEOUT_SECS: u64 = 120;
const DEFAULT_ASSISTANT: &str = "aider";
const DEFAULT_DRY_RUN_LOG: &str = "aider_all_dry_run.log";
const DEFAULT_EXTENSIONS: &[&str] = &[".js", ".vue", ".scss"];
const DEFAULT_READ_ONLY: &[&str] = &["README.md"];
const DEFAULT_MODELS: &[&str] = &[
    "gpt-4o-2024-08-06",
    "claude-3-5-sonnet-20240620",
    "chatgpt-4o-latest",
];

/// How files are turned into planning units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScanLogic {
    /// One batch per file
    Basic,
    /// Files packed greedily up to the token limit
    #[default]
    Standard,
    /// One batch per dependency closure group
    #[serde(
        alias = "basic_dependency-cruiser",
        alias = "basic-dependency-cruiser",
        alias = "basic_dependencies"
    )]
    BasicDependencies,
    /// Closure groups packed greedily up to the token limit
    #[serde(
        alias = "standard_dependency-cruiser",
        alias = "standard-dependency-cruiser",
        alias = "standard_dependencies"
    )]
    StandardDependencies,
}

impl ScanLogic {
    /// Grouping policy handed to the planner.
    #[must_use]
    pub const fn grouping(self) -> Grouping {
        match self {
            Self::Basic | Self::BasicDependencies => Grouping::Basic,
            Self::Standard | Self::StandardDependencies => Grouping::Standard,
        }
    }

    /// Returns true if dependencies are resolved and grouped.
    #[must_use]
    pub const fn expands_dependencies(self) -> bool {
        matches!(self, Self::BasicDependencies | Self::StandardDependencies)
    }
}

impl fmt::Display for ScanLogic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Basic => "basic",
            Self::Standard => "standard",
            Self::BasicDependencies => "basic-dependencies",
            Self::StandardDependencies => "standard-dependencies",
        })
    }
}

/// Resolved settings for one run.
///
/// Use [`RunConfig::builder()`] to construct a new configuration.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct RunConfig {
    /// Absolute project directory; assistant and dependency tool run here
    pub project_dir: PathBuf,

    /// Subdirectory of `project_dir` the walk starts from
    pub scan_start: Option<PathBuf>,

    /// Directory levels below the scan root to descend (`None` = unbounded)
    pub scan_depth: Option<usize>,

    /// Extension allow-list, each with a leading dot
    pub extensions: Vec<String>,

    /// Ignore globs matched against project-relative paths
    pub ignore: Vec<String>,

    /// Read-only context patterns, relative to `project_dir`
    pub read_only: Vec<String>,

    /// Honor `.gitignore` files during the walk
    pub respect_gitignore: bool,

    /// Planning mode
    pub scan_logic: ScanLogic,

    /// Token budget per batch (`None` = unbounded)
    pub token_limit: Option<usize>,

    /// Tokenizer used for estimates
    pub tokenizer: TokenizerKind,

    /// Model selection policy
    pub model_selection: SelectionMode,

    /// Model used by fixed selection; `None` leaves the assistant default
    pub model: Option<String>,

    /// Models rotated by random and turn-based selection
    pub models: Vec<String>,

    /// Edit format policy
    pub edit_format: EditFormatMode,

    /// Message templates
    pub messages: Vec<String>,

    /// Message selection policy
    pub message_selection: SelectionMode,

    /// Assistant program
    pub assistant: String,

    /// Arguments placed before the generated flags
    pub assistant_args: Vec<String>,

    /// Per-batch assistant timeout
    pub timeout: Duration,

    /// Dependency tool command line; the queried file is appended
    pub dependency_command: Vec<String>,

    /// Extensions the dependency tool is asked about
    pub dependency_extensions: Vec<String>,

    /// Per-file dependency tool timeout
    pub dependency_timeout: Duration,

    /// Maximum concurrent invocations
    pub jobs: usize,

    /// Seed for random selection
    pub seed: Option<u64>,

    /// Log invocations instead of running the assistant
    pub dry_run: bool,

    /// Dry-run log location
    pub dry_run_log: PathBuf,

    /// Verbose logging requested by configuration
    pub debug: bool,
}

impl RunConfig {
    /// Creates a new configuration builder.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use aider_all::{RunConfig, ScanLogic};
    ///
    /// let config = RunConfig::builder()
    ///     .project_dir("./my-app")
    ///     .scan_logic(ScanLogic::StandardDependencies)
    ///     .token_limit(Some(8_000))
    ///     .build()
    ///     .expect("valid configuration");
    /// ```
    #[must_use]
    pub fn builder() -> RunConfigBuilder {
        RunConfigBuilder::default()
    }

    /// Directory the walk starts from.
    #[must_use]
    pub fn scan_root(&self) -> PathBuf {
        match &self.scan_start {
            Some(start) => self.project_dir.join(start),
            None => self.project_dir.clone(),
        }
    }

    /// Compiles the extension and ignore filter.
    ///
    /// # Errors
    ///
    /// Returns an error if an ignore pattern does not parse.
    pub fn path_filter(&self) -> Result<PathFilter> {
        PathFilter::new(&self.extensions, &self.ignore)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The project directory or scan root is missing
    /// - A glob or message template is invalid
    /// - Random or turn-based model selection has no models
    /// - A timeout is zero or the dependency command is empty
    pub fn validate(&self) -> Result<()> {
        if !self.project_dir.is_dir() {
            return Err(Error::config(format!(
                "Project directory does not exist or is not a directory: {}",
                self.project_dir.display()
            )));
        }

        if let Some(start) = &self.scan_start {
            if start.is_absolute() {
                return Err(Error::config(format!(
                    "scan_start must be relative to the project directory: {}",
                    start.display()
                )));
            }
        }

        let root = self.scan_root();
        if !root.is_dir() {
            return Err(Error::ScanRoot { path: root });
        }

        self.path_filter()?;
        build_globset(&self.read_only)?;

        if self.model_selection != SelectionMode::Fixed && self.models.is_empty() {
            return Err(Error::config(format!(
                "model_selection '{}' needs at least one entry in models",
                self.model_selection
            )));
        }

        MessageRenderer::new(&self.messages)?;

        if self.assistant.trim().is_empty() {
            return Err(Error::config("assistant program must not be empty"));
        }

        if self.timeout.is_zero() || self.dependency_timeout.is_zero() {
            return Err(Error::config("timeouts must be greater than 0"));
        }

        if self.scan_logic.expands_dependencies() && self.dependency_command.is_empty() {
            return Err(Error::config("dependency_command must not be empty"));
        }

        Ok(())
    }
}

/// Builder for creating a [`RunConfig`].
#[derive(Debug, Default)]
pub struct RunConfigBuilder {
    project_dir: Option<PathBuf>,
    scan_start: Option<PathBuf>,
    scan_depth: Option<Option<usize>>,
    extensions: Option<Vec<String>>,
    ignore: Option<Vec<String>>,
    read_only: Option<Vec<String>>,
    respect_gitignore: Option<bool>,
    scan_logic: Option<ScanLogic>,
    token_limit: Option<Option<usize>>,
    tokenizer: Option<TokenizerKind>,
    model_selection: Option<SelectionMode>,
    model: Option<String>,
    models: Option<Vec<String>>,
    edit_format: Option<EditFormatMode>,
    messages: Option<Vec<String>>,
    message_selection: Option<SelectionMode>,
    assistant: Option<String>,
    assistant_args: Option<Vec<String>>,
    timeout: Option<Duration>,
    dependency_command: Option<Vec<String>>,
    dependency_extensions: Option<Vec<String>>,
    dependency_timeout: Option<Duration>,
    jobs: Option<usize>,
    seed: Option<u64>,
    dry_run: Option<bool>,
    dry_run_log: Option<PathBuf>,
    debug: Option<bool>,
}

impl RunConfigBuilder {
    /// Sets the project directory.
    #[must_use]
    pub fn project_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.project_dir = Some(path.into());
        self
    }

    /// Sets the subdirectory the walk starts from. Empty means the project root.
    #[must_use]
    pub fn scan_start(mut self, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        self.scan_start = (!path.as_os_str().is_empty()).then_some(path);
        self
    }

    /// Sets the depth limit; `None` walks the whole tree.
    #[must_use]
    pub fn scan_depth(mut self, depth: Option<usize>) -> Self {
        self.scan_depth = Some(depth);
        self
    }

    /// Sets the extension allow-list.
    #[must_use]
    pub fn extensions(mut self, extensions: Vec<String>) -> Self {
        self.extensions = Some(extensions);
        self
    }

    /// Sets the ignore globs, replacing the defaults.
    #[must_use]
    pub fn ignore(mut self, patterns: Vec<String>) -> Self {
        self.ignore = Some(patterns);
        self
    }

    /// Sets the read-only context patterns.
    #[must_use]
    pub fn read_only(mut self, patterns: Vec<String>) -> Self {
        self.read_only = Some(patterns);
        self
    }

    /// Enables or disables `.gitignore` handling.
    #[must_use]
    pub fn respect_gitignore(mut self, enabled: bool) -> Self {
        self.respect_gitignore = Some(enabled);
        self
    }

    /// Sets the planning mode.
    #[must_use]
    pub fn scan_logic(mut self, logic: ScanLogic) -> Self {
        self.scan_logic = Some(logic);
        self
    }

    /// Sets the token budget; `None` disables the limit.
    #[must_use]
    pub fn token_limit(mut self, limit: Option<usize>) -> Self {
        self.token_limit = Some(limit);
        self
    }

    /// Sets the tokenizer implementation.
    #[must_use]
    pub fn tokenizer(mut self, kind: TokenizerKind) -> Self {
        self.tokenizer = Some(kind);
        self
    }

    /// Sets the model selection policy.
    #[must_use]
    pub fn model_selection(mut self, mode: SelectionMode) -> Self {
        self.model_selection = Some(mode);
        self
    }

    /// Sets the model used by fixed selection.
    #[must_use]
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Sets the models rotated by random and turn-based selection.
    #[must_use]
    pub fn models(mut self, models: Vec<String>) -> Self {
        self.models = Some(models);
        self
    }

    /// Sets the edit format policy.
    #[must_use]
    pub fn edit_format(mut self, mode: EditFormatMode) -> Self {
        self.edit_format = Some(mode);
        self
    }

    /// Sets the message templates.
    #[must_use]
    pub fn messages(mut self, messages: Vec<String>) -> Self {
        self.messages = Some(messages);
        self
    }

    /// Sets the message selection policy.
    #[must_use]
    pub fn message_selection(mut self, mode: SelectionMode) -> Self {
        self.message_selection = Some(mode);
        self
    }

    /// Sets the assistant program.
    #[must_use]
    pub fn assistant(mut self, program: impl Into<String>) -> Self {
        self.assistant = Some(program.into());
        self
    }

    /// Sets extra assistant arguments.
    #[must_use]
    pub fn assistant_args(mut self, args: Vec<String>) -> Self {
        self.assistant_args = Some(args);
        self
    }

    /// Sets the per-batch assistant timeout.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets the dependency tool command line.
    #[must_use]
    pub fn dependency_command(mut self, command: Vec<String>) -> Self {
        self.dependency_command = Some(command);
        self
    }

    /// Sets the extensions the dependency tool is asked about.
    #[must_use]
    pub fn dependency_extensions(mut self, extensions: Vec<String>) -> Self {
        self.dependency_extensions = Some(extensions);
        self
    }

    /// Sets the dependency tool timeout.
    #[must_use]
    pub fn dependency_timeout(mut self, timeout: Duration) -> Self {
        self.dependency_timeout = Some(timeout);
        self
    }

    /// Sets the number of concurrent invocations; 0 uses the CPU count.
    #[must_use]
    pub fn jobs(mut self, jobs: usize) -> Self {
        self.jobs = Some(jobs);
        self
    }

    /// Sets the random selection seed.
    #[must_use]
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Enables dry-run mode.
    #[must_use]
    pub fn dry_run(mut self, enabled: bool) -> Self {
        self.dry_run = Some(enabled);
        self
    }

    /// Sets the dry-run log path; relative paths resolve against the project.
    #[must_use]
    pub fn dry_run_log(mut self, path: impl Into<PathBuf>) -> Self {
        self.dry_run_log = Some(path.into());
        self
    }

    /// Enables verbose logging from configuration.
    #[must_use]
    pub fn debug(mut self, enabled: bool) -> Self {
        self.debug = Some(enabled);
        self
    }

    /// Fills every value not set yet from a configuration file.
    ///
    /// Values already on the builder win over the file, so command-line
    /// overrides may be applied before or after the merge.
    ///
    /// # Errors
    ///
    /// Returns an error if a bounded value in the file is invalid.
    pub fn merge_file(mut self, file: FileConfig) -> Result<Self> {
        macro_rules! take {
            ($($field:ident),* $(,)?) => {
                $(if self.$field.is_none() {
                    self.$field = file.$field.map(Into::into);
                })*
            };
        }

        take!(
            project_dir,
            scan_start,
            extensions,
            ignore,
            read_only,
            respect_gitignore,
            scan_logic,
            tokenizer,
            model_selection,
            model,
            models,
            edit_format,
            messages,
            message_selection,
            assistant,
            assistant_args,
            dependency_command,
            dependency_extensions,
            jobs,
            seed,
            dry_run,
            dry_run_log,
            debug,
        );

        if let Some(depth) = file.scan_depth {
            let depth = depth.depth()?;
            self.scan_depth.get_or_insert(depth);
        }
        if let Some(limit) = file.token_limit {
            let limit = limit.limit()?;
            self.token_limit.get_or_insert(limit);
        }
        if let Some(secs) = file.timeout_secs {
            self.timeout.get_or_insert(Duration::from_secs(secs));
        }
        if let Some(secs) = file.dependency_timeout_secs {
            self.dependency_timeout
                .get_or_insert(Duration::from_secs(secs));
        }

        Ok(self)
    }

    /// Builds the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if validation fails.
    pub fn build(self) -> Result<RunConfig> {
        let project_dir = self.project_dir.unwrap_or_else(|| PathBuf::from("."));
        let project_dir =
            std::path::absolute(&project_dir).map_err(|e| Error::io(&project_dir, e))?;

        let dry_run_log = self
            .dry_run_log
            .map_or_else(|| project_dir.join(DEFAULT_DRY_RUN_LOG), |p| project_dir.join(p));

        let jobs = match self.jobs {
            Some(0) => num_cpus::get(),
            Some(n) => n,
            None => 1,
        };

        let config = RunConfig {
            scan_start: self.scan_start,
            scan_depth: self.scan_depth.flatten(),
            extensions: self.extensions.unwrap_or_else(|| strings(DEFAULT_EXTENSIONS)),
            ignore: self.ignore.unwrap_or_else(|| strings(DEFAULT_IGNORE)),
            read_only: self.read_only.unwrap_or_else(|| strings(DEFAULT_READ_ONLY)),
            respect_gitignore: self.respect_gitignore.unwrap_or(false),
            scan_logic: self.scan_logic.unwrap_or_default(),
            token_limit: self.token_limit.unwrap_or(Some(DEFAULT_TOKEN_LIMIT)),
            tokenizer: self.tokenizer.unwrap_or_default(),
            model_selection: self.model_selection.unwrap_or(SelectionMode::Fixed),
            model: self.model.filter(|m| !m.trim().is_empty()),
            models: self.models.unwrap_or_else(|| strings(DEFAULT_MODELS)),
            edit_format: self.edit_format.unwrap_or_default(),
            messages: self.messages.unwrap_or_else(|| strings(DEFAULT_MESSAGES)),
            message_selection: self.message_selection.unwrap_or_default(),
            assistant: self
                .assistant
                .unwrap_or_else(|| DEFAULT_ASSISTANT.to_string()),
            assistant_args: self.assistant_args.unwrap_or_default(),
            timeout: self
                .timeout
                .unwrap_or(Duration::from_secs(DEFAULT_TIMEOUT_SECS)),
            dependency_command: self
                .dependency_command
                .unwrap_or_else(DependencyCruiser::default_command),
            dependency_extensions: self
                .dependency_extensions
                .unwrap_or_else(DependencyCruiser::default_extensions),
            dependency_timeout: self
                .dependency_timeout
                .unwrap_or(Duration::from_secs(DEFAULT_DEPENDENCY_TIMEOUT_SECS)),
            jobs,
            seed: self.seed,
            dry_run: self.dry_run.unwrap_or(false),
            dry_run_log,
            debug: self.debug.unwrap_or(false),
            project_dir,
        };

        config.validate()?;
        debug!(
            "Configuration: project={}, scan_logic={}, token_limit={:?}, jobs={}",
            config.project_dir.display(),
            config.scan_logic,
            config.token_limit,
            config.jobs
        );
        Ok(config)
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| (*s).to_string()).collect()
}

/// An integer or the word `"unbounded"`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum Bound {
    /// A concrete value
    Count(i64),
    /// A named value; only `"unbounded"` is accepted
    Named(String),
}

impl Bound {
    fn is_unbounded(name: &str) -> bool {
        matches!(name.trim().to_ascii_lowercase().as_str(), "unbounded" | "none" | "unlimited")
    }

    /// Token limit: negative values clamp to 0.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for a name other than `"unbounded"`.
    pub fn limit(self) -> Result<Option<usize>> {
        match self {
            Self::Count(n) => Ok(Some(usize::try_from(n.max(0)).unwrap_or(usize::MAX))),
            Self::Named(name) if Self::is_unbounded(&name) => Ok(None),
            Self::Named(name) => Err(Error::config(format!(
                "token_limit must be an integer or \"unbounded\", got \"{name}\""
            ))),
        }
    }

    /// Scan depth: negative values are rejected.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for a negative count or an unknown name.
    pub fn depth(self) -> Result<Option<usize>> {
        match self {
            Self::Count(n) => usize::try_from(n)
                .map(Some)
                .map_err(|_| Error::config(format!("scan_depth must not be negative, got {n}"))),
            Self::Named(name) if Self::is_unbounded(&name) => Ok(None),
            Self::Named(name) => Err(Error::config(format!(
                "scan_depth must be an integer or \"unbounded\", got \"{name}\""
            ))),
        }
    }
}

impl From<&str> for Bound {
    fn from(s: &str) -> Self {
        let s = s.trim();
        s.parse().map_or_else(|_| Self::Named(s.to_string()), Self::Count)
    }
}

/// Settings read from a TOML file. Every key is optional.
///
/// # Example
///
/// ```toml
/// project_dir = ".."
/// scan_start = "src"
/// scan_depth = "unbounded"
/// extensions = [".js", ".vue"]
/// scan_logic = "standard-dependencies"
/// token_limit = 8000
/// model_selection = "turn-based"
/// models = ["gpt-4o", "claude-3-5-sonnet-20240620"]
/// messages = ["Add JSDoc comments to {{ file_list }}."]
/// ```
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    /// Project directory; relative paths resolve against the file's directory
    pub project_dir: Option<PathBuf>,
    /// Subdirectory to start scanning from
    pub scan_start: Option<PathBuf>,
    /// Depth limit or `"unbounded"`
    pub scan_depth: Option<Bound>,
    /// Extension allow-list
    pub extensions: Option<Vec<String>>,
    /// Ignore globs
    pub ignore: Option<Vec<String>>,
    /// Read-only context patterns
    pub read_only: Option<Vec<String>>,
    /// Honor `.gitignore`
    pub respect_gitignore: Option<bool>,
    /// Planning mode
    pub scan_logic: Option<ScanLogic>,
    /// Token limit or `"unbounded"`
    pub token_limit: Option<Bound>,
    /// Tokenizer
    pub tokenizer: Option<TokenizerKind>,
    /// Model selection policy
    pub model_selection: Option<SelectionMode>,
    /// Fixed model
    pub model: Option<String>,
    /// Rotated models
    pub models: Option<Vec<String>>,
    /// Edit format policy
    pub edit_format: Option<EditFormatMode>,
    /// Message templates
    pub messages: Option<Vec<String>>,
    /// Message selection policy
    pub message_selection: Option<SelectionMode>,
    /// Assistant program
    pub assistant: Option<String>,
    /// Extra assistant arguments
    pub assistant_args: Option<Vec<String>>,
    /// Assistant timeout in seconds
    pub timeout_secs: Option<u64>,
    /// Dependency tool command line
    pub dependency_command: Option<Vec<String>>,
    /// Extensions the dependency tool is asked about
    pub dependency_extensions: Option<Vec<String>>,
    /// Dependency tool timeout in seconds
    pub dependency_timeout_secs: Option<u64>,
    /// Concurrent invocations
    pub jobs: Option<usize>,
    /// Random selection seed
    pub seed: Option<u64>,
    /// Dry-run mode
    pub dry_run: Option<bool>,
    /// Dry-run log path
    pub dry_run_log: Option<PathBuf>,
    /// Verbose logging
    pub debug: Option<bool>,
}

impl FileConfig {
    /// Reads and parses a configuration file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, is not valid TOML or
    /// contains unknown keys.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        let mut config: Self = toml::from_str(&content)
            .map_err(|e| Error::config(format!("{}: {e}", path.display())))?;

        let base = path.parent().unwrap_or_else(|| Path::new("."));
        config.project_dir = Some(match config.project_dir.take() {
            Some(dir) if dir.is_relative() => base.join(dir),
            Some(dir) => dir,
            None => base.to_path_buf(),
        });

        debug!("Loaded configuration file {}", path.display());
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_fs::TempDir;
    use assert_fs::prelude::*;

    #[test]
    fn test_default_config() {
        let temp = TempDir::new().unwrap();
        let config = RunConfig::builder().project_dir(temp.path()).build().unwrap();

        assert_eq!(config.token_limit, Some(DEFAULT_TOKEN_LIMIT));
        assert_eq!(config.scan_logic, ScanLogic::Standard);
        assert_eq!(config.model_selection, SelectionMode::Fixed);
        assert_eq!(config.model, None);
        assert!(!config.models.is_empty());
        assert_eq!(config.edit_format, EditFormatMode::Diff);
        assert_eq!(config.messages.len(), DEFAULT_MESSAGES.len());
        assert_eq!(config.jobs, 1);
        assert_eq!(config.scan_depth, None);
        assert!(!config.dry_run);
        assert!(config.project_dir.is_absolute());
        assert_eq!(config.dry_run_log, config.project_dir.join(DEFAULT_DRY_RUN_LOG));
        assert_eq!(config.scan_root(), config.project_dir);
    }

    #[test]
    fn test_missing_project_dir() {
        let result = RunConfig::builder()
            .project_dir("/nonexistent/path/that/should/not/exist")
            .build();
        assert!(matches!(result, Err(Error::Config { .. })));
    }

    #[test]
    fn test_missing_scan_root() {
        let temp = TempDir::new().unwrap();
        let result = RunConfig::builder()
            .project_dir(temp.path())
            .scan_start("no/such/dir")
            .build();
        assert!(matches!(result, Err(Error::ScanRoot { .. })));
    }

    #[test]
    fn test_scan_root_joins_start() {
        let temp = TempDir::new().unwrap();
        temp.child("src/app").create_dir_all().unwrap();
        let config = RunConfig::builder()
            .project_dir(temp.path())
            .scan_start("src/app")
            .build()
            .unwrap();
        assert!(config.scan_root().ends_with("src/app"));

        let empty = RunConfig::builder()
            .project_dir(temp.path())
            .scan_start("")
            .build()
            .unwrap();
        assert_eq!(empty.scan_start, None);
    }

    #[test]
    fn test_invalid_glob() {
        let temp = TempDir::new().unwrap();
        let result = RunConfig::builder()
            .project_dir(temp.path())
            .ignore(vec!["src/[".to_string()])
            .build();
        assert!(matches!(result, Err(Error::InvalidPattern { .. })));

        let result = RunConfig::builder()
            .project_dir(temp.path())
            .read_only(vec!["docs/{a".to_string()])
            .build();
        assert!(matches!(result, Err(Error::InvalidPattern { .. })));
    }

    #[test]
    fn test_invalid_template() {
        let temp = TempDir::new().unwrap();
        let result = RunConfig::builder()
            .project_dir(temp.path())
            .messages(vec!["Fix {{ file_list".to_string()])
            .build();
        assert!(matches!(result, Err(Error::Template { .. })));

        let result = RunConfig::builder()
            .project_dir(temp.path())
            .messages(Vec::new())
            .build();
        assert!(matches!(result, Err(Error::Config { .. })));
    }

    #[test]
    fn test_rotation_needs_models() {
        let temp = TempDir::new().unwrap();
        let result = RunConfig::builder()
            .project_dir(temp.path())
            .model_selection(SelectionMode::Random)
            .models(Vec::new())
            .build();
        assert!(matches!(result, Err(Error::Config { .. })));
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let temp = TempDir::new().unwrap();
        let result = RunConfig::builder()
            .project_dir(temp.path())
            .timeout(Duration::ZERO)
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_zero_jobs_uses_cpu_count() {
        let temp = TempDir::new().unwrap();
        let config = RunConfig::builder()
            .project_dir(temp.path())
            .jobs(0)
            .build()
            .unwrap();
        assert_eq!(config.jobs, num_cpus::get());
    }

    #[test]
    fn test_scan_logic_aliases() {
        #[derive(Deserialize)]
        struct LogicOnly {
            logic: ScanLogic,
        }

        let cases = [
            ("basic", ScanLogic::Basic),
            ("standard", ScanLogic::Standard),
            ("basic-dependencies", ScanLogic::BasicDependencies),
            ("basic_dependency-cruiser", ScanLogic::BasicDependencies),
            ("standard_dependency-cruiser", ScanLogic::StandardDependencies),
        ];
        for (text, expected) in cases {
            let parsed: LogicOnly = toml::from_str(&format!("logic = \"{text}\"")).unwrap();
            assert_eq!(parsed.logic, expected, "{text}");
        }

        assert!(ScanLogic::StandardDependencies.expands_dependencies());
        assert_eq!(ScanLogic::BasicDependencies.grouping(), Grouping::Basic);
        assert!(!ScanLogic::Standard.expands_dependencies());
    }

    #[test]
    fn test_file_config_layering() {
        let temp = TempDir::new().unwrap();
        temp.child("app/src").create_dir_all().unwrap();
        temp.child("conf").create_dir_all().unwrap();
        let file = temp.child("conf/aider-all.toml");
        file.write_str(
            r#"
project_dir = "../app"
scan_start = "src"
scan_depth = "unbounded"
token_limit = -5
scan_logic = "standard_dependency-cruiser"
model_selection = "round-robin"
models = ["m1", "m2"]
timeout_secs = 60
"#,
        )
        .unwrap();

        let loaded = FileConfig::load(file.path()).unwrap();
        let config = RunConfig::builder()
            .merge_file(loaded)
            .unwrap()
            .timeout(Duration::from_secs(5))
            .build()
            .unwrap();

        assert!(config.project_dir.ends_with("conf/../app"));
        assert!(config.scan_root().is_dir());
        assert_eq!(config.scan_depth, None);
        assert_eq!(config.token_limit, Some(0));
        assert_eq!(config.scan_logic, ScanLogic::StandardDependencies);
        assert_eq!(config.model_selection, SelectionMode::TurnBased);
        assert_eq!(config.models, vec!["m1".to_string(), "m2".to_string()]);
        assert_eq!(config.timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_builder_values_win_over_file() {
        let temp = TempDir::new().unwrap();
        let file = temp.child("aider-all.toml");
        file.write_str("token_limit = 100\ntimeout_secs = 60\nmodel = \"from-file\"\njobs = 4\n")
            .unwrap();

        let config = RunConfig::builder()
            .token_limit(Some(500))
            .model("from-flag")
            .merge_file(FileConfig::load(file.path()).unwrap())
            .unwrap()
            .build()
            .unwrap();

        assert_eq!(config.token_limit, Some(500));
        assert_eq!(config.model.as_deref(), Some("from-flag"));
        assert_eq!(config.timeout, Duration::from_secs(60));
        assert_eq!(config.jobs, 4);
    }

    #[test]
    fn test_file_config_unbounded_limit() {
        let temp = TempDir::new().unwrap();
        let file = temp.child("aider-all.toml");
        file.write_str("token_limit = \"unbounded\"\nscan_depth = 2\n").unwrap();

        let config = RunConfig::builder()
            .merge_file(FileConfig::load(file.path()).unwrap())
            .unwrap()
            .build()
            .unwrap();
        assert_eq!(config.token_limit, None);
        assert_eq!(config.scan_depth, Some(2));
        assert_eq!(config.project_dir, std::path::absolute(temp.path()).unwrap());
    }

    #[test]
    fn test_file_config_rejects_unknown_keys() {
        let temp = TempDir::new().unwrap();
        let file = temp.child("aider-all.toml");
        file.write_str("token_limt = 10\n").unwrap();
        assert!(matches!(FileConfig::load(file.path()), Err(Error::Config { .. })));
    }

    #[test]
    fn test_file_config_rejects_bad_bounds() {
        let temp = TempDir::new().unwrap();
        let file = temp.child("aider-all.toml");
        file.write_str("scan_depth = -1\n").unwrap();
        let loaded = FileConfig::load(file.path()).unwrap();
        assert!(RunConfig::builder().merge_file(loaded).is_err());

        file.write_str("token_limit = \"lots\"\n").unwrap();
        let loaded = FileConfig::load(file.path()).unwrap();
        assert!(RunConfig::builder().merge_file(loaded).is_err());
    }
}
