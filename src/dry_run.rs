//! Append-only JSON Lines log written instead of running the assistant.

use crate::{
    assistant::{Assistant, Invocation, InvocationError},
    config::{RunConfig, ScanLogic},
    deps::Resolution,
    error::{Error, Result},
    planner::BatchPlan,
    select::{EditFormat, EditFormatMode, SelectionMode},
};
use serde::Serialize;
use std::{
    collections::BTreeMap,
    fs::{File, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
    sync::Mutex,
};
use tracing::{debug, info};

/// One line of the dry-run log.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Record {
    /// Written once before the first batch
    RunStart {
        /// RFC 3339 time the record was written
        timestamp: String,
        /// Project directory
        project_dir: String,
        /// Directory the walk started from
        scan_root: String,
        /// Depth limit, `None` = unbounded
        scan_depth: Option<usize>,
        /// Planning mode
        scan_logic: ScanLogic,
        /// Model selection policy
        model_selection: SelectionMode,
        /// Edit format policy
        edit_format: EditFormatMode,
        /// Token limit, `None` = unbounded
        token_limit: Option<usize>,
        /// Number of planned batches
        batches: usize,
    },

    /// Written for every file the dependency tool was asked about
    Dependencies {
        /// RFC 3339 time the record was written
        timestamp: String,
        /// Queried file
        file: String,
        /// Paths the tool reported
        reported: Vec<String>,
        /// Paths kept after filtering
        dependencies: Vec<String>,
        /// Tool failure, if any
        error: Option<String>,
    },

    /// Written for every planned batch
    Batch {
        /// RFC 3339 time the record was written
        timestamp: String,
        /// 1-based batch number
        batch: usize,
        /// Files to edit
        files: Vec<String>,
        /// Read-only context files
        read_only: Vec<String>,
        /// Selected model
        model: Option<String>,
        /// Selected edit format
        edit_format: Option<EditFormat>,
        /// Rendered message
        message: String,
        /// Estimated tokens of `files`
        estimated_tokens: usize,
        /// Estimated tokens of `read_only`
        read_only_tokens: usize,
        /// Token limit
        token_limit: Option<usize>,
        /// Limit minus files and read-only tokens; negative when over
        remaining_tokens: Option<i64>,
        /// True when the batch exceeds the limit on its own
        oversized: bool,
        /// Command that would have been run
        command: String,
    },

    /// Written once after the last batch
    Summary {
        /// RFC 3339 time the record was written
        timestamp: String,
        /// Files across all batches
        files_planned: usize,
        /// Read-only context files
        read_only_files: usize,
        /// Tokens across all batches
        total_tokens: usize,
        /// Planned files per configured extension
        per_extension: BTreeMap<String, usize>,
    },
}

impl Record {
    /// Header record for a run over `plan`.
    #[must_use]
    pub fn run_start(config: &RunConfig, plan: &BatchPlan) -> Self {
        Self::RunStart {
            timestamp: timestamp(),
            project_dir: config.project_dir.display().to_string(),
            scan_root: config.scan_root().display().to_string(),
            scan_depth: config.scan_depth,
            scan_logic: config.scan_logic,
            model_selection: config.model_selection,
            edit_format: config.edit_format,
            token_limit: config.token_limit,
            batches: plan.len(),
        }
    }

    /// Dependency tool answer for one file.
    #[must_use]
    pub fn dependencies(resolution: &Resolution) -> Self {
        Self::Dependencies {
            timestamp: timestamp(),
            file: resolution.path.clone(),
            reported: resolution.reported.clone(),
            dependencies: resolution.dependencies.clone(),
            error: resolution.error.clone(),
        }
    }

    /// Trailing record with per-extension counts for `extensions`.
    #[must_use]
    pub fn summary(plan: &BatchPlan, read_only_files: usize, extensions: &[String]) -> Self {
        let mut per_extension: BTreeMap<String, usize> =
            extensions.iter().map(|ext| (ext.clone(), 0)).collect();
        for file in plan.files() {
            if let Some(ext) = extensions.iter().find(|ext| file.path.ends_with(ext.as_str())) {
                *per_extension.entry(ext.clone()).or_default() += 1;
            }
        }

        Self::Summary {
            timestamp: timestamp(),
            files_planned: plan.files().count(),
            read_only_files,
            total_tokens: plan.total_tokens(),
            per_extension,
        }
    }
}

fn timestamp() -> String {
    chrono::Local::now().to_rfc3339()
}

/// Dry-run sink: records each invocation instead of starting a process.
pub struct DryRunLog {
    path: PathBuf,
    file: Mutex<File>,
    program: String,
    extra_args: Vec<String>,
}

impl DryRunLog {
    /// Opens `path` for appending, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file cannot be opened.
    pub fn open(path: &Path, program: impl Into<String>, extra_args: Vec<String>) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| Error::io(path, e))?;

        info!("Dry run: logging invocations to {}", path.display());

        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(file),
            program: program.into(),
            extra_args,
        })
    }

    /// Log file location.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends one record as a single line.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails.
    pub fn write_record(&self, record: &Record) -> Result<()> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');

        let mut guard = self
            .file
            .lock()
            .map_err(|_| Error::config("dry-run log lock poisoned"))?;
        guard
            .write_all(&line)
            .and_then(|()| guard.flush())
            .map_err(|e| Error::io(&self.path, e))
    }
}

impl Assistant for DryRunLog {
    fn invoke(&self, invocation: &Invocation) -> std::result::Result<(), InvocationError> {
        let command = invocation.command_line(&self.program, &self.extra_args);
        debug!("Dry run batch {}: {}", invocation.number(), command);

        let record = Record::Batch {
            timestamp: timestamp(),
            batch: invocation.number(),
            files: invocation.files.clone(),
            read_only: invocation.read_only.clone(),
            model: invocation.model.clone(),
            edit_format: invocation.edit_format,
            message: invocation.message.clone(),
            estimated_tokens: invocation.estimated_tokens,
            read_only_tokens: invocation.read_only_tokens,
            token_limit: invocation.token_limit,
            remaining_tokens: invocation.remaining_tokens(),
            oversized: invocation.oversized,
            command,
        };

        self.write_record(&record)
            .map_err(|e| InvocationError::Log(e.to_string()))
    }
}
