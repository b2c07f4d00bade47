use crate::error::{Diagnostics, Error, Result, Warning};
use crate::token::TokenEstimator;
use once_cell::sync::{Lazy, OnceCell};
use serde::Serialize;
use std::collections::HashSet;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use tracing::{trace, warn};

static BINARY_EXTENSIONS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "exe", "dll", "so", "dylib", "a", "o", "obj", "png", "jpg", "jpeg", "gif", "bmp", "ico",
        "webp", "mp3", "mp4", "avi", "mkv", "mov", "wav", "flac", "pdf", "doc", "docx", "xls",
        "xlsx", "ppt", "pptx", "zip", "tar", "gz", "bz2", "xz", "7z", "rar", "wasm", "pyc",
        "class", "woff", "woff2", "ttf", "eot",
    ]
    .into_iter()
    .collect()
});

/// How a file entered the plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    /// Found by walking the scan root
    Discovered,
    /// Reached only through the dependency graph
    Dependency,
}

/// A candidate file with its lazily estimated token count.
#[derive(Debug, Clone)]
pub struct FileEntry {
    /// Project-relative path with `/` separators
    pub path: String,

    /// Absolute path to the file
    pub absolute_path: PathBuf,

    /// File extension without the leading dot (may be empty)
    pub extension: String,

    /// How the file was found
    pub origin: Origin,

    token_count: OnceCell<usize>,
}

impl FileEntry {
    /// Creates an entry for `absolute_path`, relative to `project_dir`.
    #[must_use]
    pub fn new(project_dir: &Path, absolute_path: PathBuf, origin: Origin) -> Self {
        let path = relative_path(project_dir, &absolute_path);
        let extension = absolute_path
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or_default()
            .to_string();

        Self {
            path,
            absolute_path,
            extension,
            origin,
            token_count: OnceCell::new(),
        }
    }

    /// Creates an entry whose token count is already known.
    #[must_use]
    pub fn with_tokens(path: impl Into<String>, token_count: usize) -> Self {
        let path = path.into();
        let absolute_path = PathBuf::from(&path);
        let extension = absolute_path
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or_default()
            .to_string();

        Self {
            path,
            absolute_path,
            extension,
            origin: Origin::Discovered,
            token_count: OnceCell::with_value(token_count),
        }
    }

    /// Returns the token count, or 0 if it has not been estimated yet.
    #[must_use]
    pub fn token_count(&self) -> usize {
        self.token_count.get().copied().unwrap_or(0)
    }

    /// Returns true once the token count has been resolved.
    #[must_use]
    pub fn is_estimated(&self) -> bool {
        self.token_count.get().is_some()
    }

    /// Estimates the token count on first call and caches it.
    ///
    /// Unreadable or binary files count as zero tokens and record an
    /// estimation warning.
    pub fn estimate(&self, estimator: &dyn TokenEstimator, diag: &mut Diagnostics) -> usize {
        *self.token_count.get_or_init(|| match read_text(&self.absolute_path) {
            Ok(content) => {
                let tokens = estimator.estimate(&content);
                trace!("{}: {} tokens ({})", self.path, tokens, estimator.name());
                tokens
            }
            Err(e) => {
                warn!("Counting '{}' as 0 tokens: {}", self.path, e);
                diag.push(Warning::Estimation {
                    path: self.path.clone(),
                    message: e.to_string(),
                });
                0
            }
        })
    }
}

/// Converts `path` into a project-relative string with `/` separators.
#[must_use]
pub fn relative_path(project_dir: &Path, path: &Path) -> String {
    let relative = pathdiff::diff_paths(path, project_dir).unwrap_or_else(|| path.to_path_buf());
    normalize_separators(&relative.to_string_lossy())
}

/// Normalizes a path string reported by tools or users: `/` separators,
/// no leading `./`.
#[must_use]
pub(crate) fn normalize_separators(path: &str) -> String {
    let unified = path.replace('\\', "/");
    let mut trimmed = unified.as_str();
    while let Some(rest) = trimmed.strip_prefix("./") {
        trimmed = rest;
    }
    trimmed.to_string()
}

/// Reads a file as text, refusing binary content.
///
/// # Errors
///
/// Returns an error if the file cannot be read, looks binary, or is not
/// valid UTF-8.
pub(crate) fn read_text(path: &Path) -> Result<String> {
    if has_binary_extension(path) || is_likely_binary(path)? {
        return Err(Error::invalid_utf8(path));
    }

    std::fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::InvalidData {
            Error::invalid_utf8(path)
        } else {
            Error::io(path, e)
        }
    })
}

/// Determines if a file is likely binary by sniffing its first 8KB.
///
/// A sample with a NUL byte, or one that is not UTF-8, is binary. A
/// multi-byte character cut off at the end of the sample does not count.
///
/// # Errors
///
/// Returns an error if the file cannot be opened or read.
pub(crate) fn is_likely_binary(path: &Path) -> Result<bool> {
    const BUFFER_SIZE: usize = 8192;

    let file = File::open(path).map_err(|e| Error::io(path, e))?;
    let mut reader = BufReader::with_capacity(BUFFER_SIZE, file);
    let mut buffer = [0u8; BUFFER_SIZE];

    let bytes_read = reader.read(&mut buffer).map_err(|e| Error::io(path, e))?;

    if bytes_read == 0 {
        return Ok(false);
    }

    let sample = &buffer[..bytes_read];

    if memchr::memchr(0, sample).is_some() {
        return Ok(true);
    }

    match std::str::from_utf8(sample) {
        Ok(_) => Ok(false),
        Err(e) => Ok(e.error_len().is_some()),
    }
}

/// Checks if a file extension suggests a binary file.
#[must_use]
pub(crate) fn has_binary_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| BINARY_EXTENSIONS.contains(ext.to_ascii_lowercase().as_str()))
}
