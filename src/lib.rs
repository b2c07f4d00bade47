//! # aider-all
//!
//! Batch a project's source files by token budget and feed each batch to a
//! command-line AI coding assistant (`aider` by default).
//!
//! ## Features
//!
//! - Deterministic, depth-limited discovery with extension and glob filters
//! - Optional dependency grouping through `dependency-cruiser`; a file and
//!   everything it depends on always travel in the same batch
//! - Greedy token-bounded packing with tiktoken estimates
//! - Fixed, random (seedable) or turn-based model, edit format and message
//!   selection
//! - Tera message templates
//! - Dry-run mode writing JSON Lines instead of starting the assistant
//!
//! ## Quick Start
//!
//! ```no_run
//! use aider_all::{RunConfig, ScanLogic};
//!
//! # fn main() -> anyhow::Result<()> {
//! let config = RunConfig::builder()
//!     .project_dir("./my-app")
//!     .scan_start("src")
//!     .scan_logic(ScanLogic::StandardDependencies)
//!     .token_limit(Some(8_000))
//!     .dry_run(true)
//!     .build()?;
//!
//! let summary = aider_all::run(config)?;
//! summary.print_summary();
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! 1. **Scanner**: walks the scan root in a stable order
//! 2. **Dependencies**: resolves and groups dependency closures
//! 3. **Tokenizer**: estimates token counts
//! 4. **Planner**: packs units into token-bounded batches
//! 5. **Executor**: selects, renders and invokes the assistant per batch

#![warn(
    missing_docs,
    rust_2018_idioms,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::nursery
)]
#![allow(clippy::module_name_repetitions)]

mod assistant;
mod config;
mod deps;
mod dry_run;
mod error;
mod executor;
mod file;
mod filter;
mod pipeline;
mod planner;
mod process;
mod scanner;
mod select;
mod template;
mod token;

pub use assistant::{AiderProcess, Assistant, Invocation, InvocationError};
pub use config::{Bound, FileConfig, RunConfig, RunConfigBuilder, ScanLogic};
pub use deps::{
    Closure, DependencyCruiser, DependencyResolver, DependencySet, Resolution, ResolveError,
    parse_text_output,
};
pub use dry_run::{DryRunLog, Record};
pub use error::{Diagnostics, Error, Result, Warning};
pub use executor::{BatchFailure, ExecutionReport, Executor};
pub use file::{FileEntry, Origin, relative_path};
pub use filter::{DEFAULT_IGNORE, PathFilter, expand_patterns};
pub use pipeline::{Pipeline, Prepared, RunSummary, WarningCounts};
pub use planner::{Batch, BatchPlan, Grouping, Planner, Unit};
pub use select::{
    Choice, EditFormat, EditFormatMode, FirstPick, Pick, SelectionMode, Selector, TurnPick,
    UniformPick,
};
pub use template::{DEFAULT_MESSAGES, MessageContext, MessageRenderer};
pub use token::{TokenEstimator, TokenizerKind};

/// Plans and executes a run with the given configuration.
///
/// This is the main entry point for the library.
///
/// # Errors
///
/// Returns an error if:
/// - Configuration is invalid
/// - The scan root doesn't exist
/// - The dry-run log cannot be opened
///
/// Failed batches do not make the run fail; they are listed in the summary.
///
/// # Examples
///
/// ```no_run
/// use aider_all::{RunConfig, run};
///
/// # fn main() -> anyhow::Result<()> {
/// let config = RunConfig::builder()
///     .project_dir(".")
///     .dry_run(true)
///     .build()?;
///
/// let summary = run(config)?;
/// println!("{} batches", summary.batches);
/// # Ok(())
/// # }
/// ```
pub fn run(config: RunConfig) -> Result<RunSummary> {
    Pipeline::new(config)?.run()
}
