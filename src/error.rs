use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using the library's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Fatal errors that stop a run before any batch executes.
#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum Error {
    /// IO error with context about the file path.
    #[error("IO error accessing '{path}': {message}")]
    Io {
        /// Path where the error occurred
        path: PathBuf,
        /// Error message
        message: String,
    },

    /// Configuration validation error.
    #[error("Invalid configuration: {message}")]
    Config {
        /// Detailed error message
        message: String,
    },

    /// The directory to scan is missing or not a directory.
    #[error("Scan root '{path}' does not exist or is not a directory")]
    ScanRoot {
        /// Resolved scan root
        path: PathBuf,
    },

    /// Message template failed to compile or render.
    #[error("Invalid message template '{template}': {message}")]
    Template {
        /// Template name
        template: String,
        /// Error message
        message: String,
    },

    /// Invalid glob pattern.
    #[error("Invalid glob pattern '{pattern}': {reason}")]
    InvalidPattern {
        /// The invalid pattern
        pattern: String,
        /// Reason why it's invalid
        reason: String,
    },

    /// Invalid UTF-8 or binary content encountered in a file.
    #[error("File '{path}' is binary or not valid UTF-8")]
    InvalidUtf8 {
        /// Path to file with encoding issues
        path: PathBuf,
    },

    /// JSON or TOML (de)serialization error.
    #[error("Serialization error: {message}")]
    Serialization {
        /// Error message
        message: String,
    },
}

impl Error {
    /// Creates an IO error with path context.
    #[must_use]
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            message: source.to_string(),
        }
    }

    /// Creates a configuration error.
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a template error.
    #[must_use]
    pub fn template(template: impl Into<String>, source: &tera::Error) -> Self {
        // tera keeps the useful part of the message in the source chain
        let mut message = source.to_string();
        let mut cause = std::error::Error::source(source);
        while let Some(inner) = cause {
            message.push_str(": ");
            message.push_str(&inner.to_string());
            cause = std::error::Error::source(inner);
        }
        Self::Template {
            template: template.into(),
            message,
        }
    }

    /// Creates an invalid UTF-8 error.
    #[must_use]
    pub fn invalid_utf8(path: impl Into<PathBuf>) -> Self {
        Self::InvalidUtf8 { path: path.into() }
    }

    /// Creates an invalid pattern error.
    #[must_use]
    pub fn invalid_pattern(pattern: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidPattern {
            pattern: pattern.into(),
            reason: reason.into(),
        }
    }

    /// Returns true if this is an IO error.
    #[must_use]
    pub const fn is_io(&self) -> bool {
        matches!(self, Self::Io { .. })
    }

    /// Returns true if this is a configuration error.
    #[must_use]
    pub const fn is_config(&self) -> bool {
        matches!(self, Self::Config { .. } | Self::ScanRoot { .. })
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization {
            message: e.to_string(),
        }
    }
}

/// Non-fatal problem recovered during planning.
///
/// Each variant is logged where it happens and collected into
/// [`Diagnostics`] for the end-of-run summary.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Warning {
    /// A directory or file could not be read while walking.
    #[error("skipped '{path}' during discovery: {message}")]
    Discovery {
        /// Offending path (may be empty when the walker did not report one)
        path: String,
        /// What went wrong
        message: String,
    },

    /// The dependency tool failed or produced unusable output for a file.
    #[error("no dependencies for '{path}': {message}")]
    Dependency {
        /// File whose dependencies were requested
        path: String,
        /// What went wrong
        message: String,
    },

    /// A file could not be tokenized and counts as zero tokens.
    #[error("counting '{path}' as 0 tokens: {message}")]
    Estimation {
        /// File that could not be estimated
        path: String,
        /// What went wrong
        message: String,
    },
}

/// Collects warnings raised while discovering and planning.
#[derive(Debug, Default, Clone)]
pub struct Diagnostics {
    warnings: Vec<Warning>,
}

impl Diagnostics {
    /// Creates an empty collector.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a warning.
    pub fn push(&mut self, warning: Warning) {
        self.warnings.push(warning);
    }

    /// Returns every recorded warning in the order it was raised.
    #[must_use]
    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    /// Number of discovery warnings.
    #[must_use]
    pub fn discovery_count(&self) -> usize {
        self.count(|w| matches!(w, Warning::Discovery { .. }))
    }

    /// Number of dependency warnings.
    #[must_use]
    pub fn dependency_count(&self) -> usize {
        self.count(|w| matches!(w, Warning::Dependency { .. }))
    }

    /// Number of estimation warnings.
    #[must_use]
    pub fn estimation_count(&self) -> usize {
        self.count(|w| matches!(w, Warning::Estimation { .. }))
    }

    /// Returns true if nothing was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.warnings.is_empty()
    }

    fn count(&self, pred: impl Fn(&Warning) -> bool) -> usize {
        self.warnings.iter().filter(|w| pred(w)).count()
    }
}
