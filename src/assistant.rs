use crate::process::run_with_timeout;
use crate::select::EditFormat;
use serde::Serialize;
use std::io;
use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Why one batch's invocation failed. The run continues with the next batch.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum InvocationError {
    /// The assistant could not be started.
    #[error("failed to start '{program}': {message}")]
    Spawn {
        /// Program that failed to start
        program: String,
        /// OS error text
        message: String,
    },

    /// The assistant exited unsuccessfully.
    #[error("assistant exited with {}: {stderr}", code.map_or_else(|| "a signal".to_string(), |c| format!("code {c}")))]
    Exit {
        /// Exit code, `None` if killed by a signal
        code: Option<i32>,
        /// Captured stderr, trimmed
        stderr: String,
    },

    /// The assistant ran past its timeout and was killed.
    #[error("assistant timed out after {secs}s and was killed")]
    TimedOut {
        /// Timeout that was exceeded
        secs: u64,
    },

    /// The message template failed to render for this batch.
    #[error("message could not be rendered: {0}")]
    Render(String),

    /// The dry-run log could not be written.
    #[error("dry-run log write failed: {0}")]
    Log(String),
}

/// Everything needed to call the assistant for one batch.
#[derive(Debug, Clone, Serialize)]
pub struct Invocation {
    /// Batch index (0-based)
    pub batch_index: usize,
    /// Number of batches in the plan
    pub batch_count: usize,
    /// Files to edit
    pub files: Vec<String>,
    /// Context files passed with `--read`
    pub read_only: Vec<String>,
    /// Model flag value
    pub model: Option<String>,
    /// Edit format flag value
    pub edit_format: Option<EditFormat>,
    /// Rendered instruction
    pub message: String,
    /// Estimated tokens of `files`
    pub estimated_tokens: usize,
    /// Estimated tokens of `read_only`
    pub read_only_tokens: usize,
    /// Limit the batch was planned against
    pub token_limit: Option<usize>,
    /// True when the batch exceeds the limit on its own
    pub oversized: bool,
}

impl Invocation {
    /// Assistant arguments in their fixed order:
    /// extra args, `--model`, `--edit-format`, `--read`..., `--file`..., `--message`.
    #[must_use]
    pub fn args(&self, extra: &[String]) -> Vec<String> {
        let mut args: Vec<String> = extra.to_vec();

        if let Some(model) = &self.model {
            args.push("--model".to_string());
            args.push(model.clone());
        }
        if let Some(format) = self.edit_format {
            args.push("--edit-format".to_string());
            args.push(format.as_str().to_string());
        }
        for path in &self.read_only {
            args.push("--read".to_string());
            args.push(path.clone());
        }
        for path in &self.files {
            args.push("--file".to_string());
            args.push(path.clone());
        }
        args.push("--message".to_string());
        args.push(self.message.clone());

        args
    }

    /// Human-readable command line for logs.
    #[must_use]
    pub fn command_line(&self, program: &str, extra: &[String]) -> String {
        std::iter::once(program.to_string())
            .chain(self.args(extra))
            .map(|arg| quote(&arg))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Tokens left under the limit after files and read-only context.
    #[must_use]
    pub fn remaining_tokens(&self) -> Option<i64> {
        let used = i64::try_from(self.estimated_tokens + self.read_only_tokens).unwrap_or(i64::MAX);
        self.token_limit
            .map(|limit| i64::try_from(limit).unwrap_or(i64::MAX).saturating_sub(used))
    }

    /// 1-based batch number for messages and logs.
    #[must_use]
    pub const fn number(&self) -> usize {
        self.batch_index + 1
    }
}

fn quote(arg: &str) -> String {
    let plain = !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:,@+".contains(c));
    if plain {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', "'\\''"))
    }
}

/// Executes one batch.
pub trait Assistant: Send + Sync {
    /// Runs the invocation to completion.
    ///
    /// # Errors
    ///
    /// Returns an [`InvocationError`] describing why the batch failed.
    fn invoke(&self, invocation: &Invocation) -> Result<(), InvocationError>;
}

/// Runs the `aider` command-line assistant as a child process.
#[derive(Debug, Clone)]
pub struct AiderProcess {
    program: String,
    extra_args: Vec<String>,
    working_dir: PathBuf,
    timeout: Duration,
}

impl AiderProcess {
    /// Creates a runner for `program` started in `working_dir`.
    #[must_use]
    pub fn new(
        program: impl Into<String>,
        extra_args: Vec<String>,
        working_dir: impl Into<PathBuf>,
        timeout: Duration,
    ) -> Self {
        Self {
            program: program.into(),
            extra_args,
            working_dir: working_dir.into(),
            timeout,
        }
    }
}

impl Assistant for AiderProcess {
    fn invoke(&self, invocation: &Invocation) -> Result<(), InvocationError> {
        let batch = invocation.number();
        info!(
            "Batch {}/{}: {}",
            batch,
            invocation.batch_count,
            invocation.command_line(&self.program, &self.extra_args)
        );

        let mut cmd = Command::new(&self.program);
        cmd.args(invocation.args(&self.extra_args))
            .current_dir(&self.working_dir);

        let forward = |line: &str| {
            if !line.trim().is_empty() {
                info!("[batch {}] {}", batch, line.trim_end());
            }
        };

        let output = run_with_timeout(&mut cmd, self.timeout, Some(&forward)).map_err(|e| {
            InvocationError::Spawn {
                program: self.program.clone(),
                message: if e.kind() == io::ErrorKind::NotFound {
                    "not found on PATH".to_string()
                } else {
                    e.to_string()
                },
            }
        })?;

        if output.timed_out {
            return Err(InvocationError::TimedOut {
                secs: self.timeout.as_secs(),
            });
        }

        if output.success() {
            debug!("Batch {} finished in {:.1}s", batch, output.elapsed.as_secs_f64());
            Ok(())
        } else {
            let stderr = output.stderr.trim().to_string();
            if !stderr.is_empty() {
                warn!("[batch {}] stderr: {}", batch, stderr);
            }
            Err(InvocationError::Exit {
                code: output.status.and_then(|s| s.code()),
                stderr,
            })
        }
    }
}
