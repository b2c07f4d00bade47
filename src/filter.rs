//! Path filtering for discovery.
//!
//! Holds the extension allow-list and the compiled ignore patterns, and
//! expands the read-only context patterns into concrete files.

use crate::error::{Error, Result};
use crate::file::relative_path;
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Ignore patterns applied when none are configured.
pub const DEFAULT_IGNORE: &[&str] = &[
    "**/node_modules/**",
    "node_modules",
    "**/.venv/**",
    "**/venv/**",
    ".git",
    ".gitignore",
];

/// Decides which project-relative paths take part in a run.
#[derive(Debug, Clone)]
pub struct PathFilter {
    extensions: Vec<String>,
    ignore: GlobSet,
}

impl PathFilter {
    /// Compiles a filter from an extension allow-list and ignore globs.
    ///
    /// Extensions may be given with or without the leading dot. An empty
    /// list accepts every extension.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPattern`] if an ignore pattern does not parse.
    pub fn new(extensions: &[String], ignore: &[String]) -> Result<Self> {
        let extensions = extensions
            .iter()
            .map(|ext| ext.trim())
            .filter(|ext| !ext.is_empty())
            .map(|ext| {
                if ext.starts_with('.') {
                    ext.to_string()
                } else {
                    format!(".{ext}")
                }
            })
            .collect();

        Ok(Self {
            extensions,
            ignore: build_globset(ignore)?,
        })
    }

    /// Returns true if the path, one of its ancestors or its file name
    /// matches an ignore pattern.
    #[must_use]
    pub fn is_ignored(&self, relative: &str) -> bool {
        if relative.is_empty() {
            return false;
        }

        let path = Path::new(relative);
        if path
            .ancestors()
            .filter(|a| !a.as_os_str().is_empty())
            .any(|a| self.ignore.is_match(a))
        {
            return true;
        }

        path.file_name()
            .is_some_and(|name| self.ignore.is_match(Path::new(name)))
    }

    /// Returns true if the path ends with an allowed extension.
    #[must_use]
    pub fn has_allowed_extension(&self, relative: &str) -> bool {
        self.extensions.is_empty() || self.extensions.iter().any(|ext| relative.ends_with(ext))
    }

    /// Returns true if a file at `relative` should be planned.
    #[must_use]
    pub fn accepts(&self, relative: &str) -> bool {
        self.has_allowed_extension(relative) && !self.is_ignored(relative)
    }

    /// The normalized allow-list, each entry starting with a dot.
    #[must_use]
    pub fn extensions(&self) -> &[String] {
        &self.extensions
    }
}

/// Compiles glob patterns into a single set.
///
/// # Errors
///
/// Returns [`Error::InvalidPattern`] for the first pattern that fails to
/// parse.
pub(crate) fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();

    for pattern in patterns {
        let glob = Glob::new(pattern).map_err(|e| Error::invalid_pattern(pattern, e.to_string()))?;
        builder.add(glob);
    }

    builder
        .build()
        .map_err(|e| Error::invalid_pattern(patterns.join(", "), e.to_string()))
}

/// Expands read-only context patterns relative to `project_dir`.
///
/// Only regular files that are not ignored are returned, sorted by path
/// and without duplicates.
///
/// # Errors
///
/// Returns [`Error::InvalidPattern`] if a pattern does not parse.
pub fn expand_patterns(
    project_dir: &Path,
    patterns: &[String],
    filter: &PathFilter,
) -> Result<Vec<PathBuf>> {
    if patterns.is_empty() {
        return Ok(Vec::new());
    }

    let set = build_globset(patterns)?;
    let mut hits = vec![false; patterns.len()];
    let mut matched = Vec::new();

    let walker = WalkDir::new(project_dir)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            entry.depth() == 0 || !filter.is_ignored(&relative_path(project_dir, entry.path()))
        });

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Skipping unreadable entry while expanding read-only files: {}", e);
                continue;
            }
        };

        if !entry.file_type().is_file() {
            continue;
        }

        let relative = relative_path(project_dir, entry.path());
        let indices = set.matches(&relative);
        if !indices.is_empty() {
            for i in indices {
                hits[i] = true;
            }
            debug!("Read-only context file: {}", relative);
            matched.push(entry.into_path());
        }
    }

    for (pattern, hit) in patterns.iter().zip(hits) {
        if !hit {
            warn!("Read-only pattern '{}' matched no files", pattern);
        }
    }

    Ok(matched)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_fs::prelude::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn test_extension_normalization() {
        let filter = PathFilter::new(&strings(&["js", ".vue", " .scss "]), &[]).unwrap();
        assert_eq!(filter.extensions(), &[".js", ".vue", ".scss"]);
        assert!(filter.has_allowed_extension("src/app.js"));
        assert!(filter.has_allowed_extension("src/App.vue"));
        assert!(!filter.has_allowed_extension("src/app.ts"));
        assert!(!filter.has_allowed_extension("src/json"));
    }

    #[test]
    fn test_empty_extension_list_accepts_everything() {
        let filter = PathFilter::new(&[], &[]).unwrap();
        assert!(filter.accepts("Makefile"));
        assert!(filter.accepts("src/a.rs"));
    }

    #[test]
    fn test_compound_extension() {
        let filter = PathFilter::new(&strings(&[".d.ts"]), &[]).unwrap();
        assert!(filter.accepts("types/index.d.ts"));
        assert!(!filter.accepts("src/index.ts"));
    }

    #[test]
    fn test_ignore_matches_ancestors() {
        let filter = PathFilter::new(&[], &strings(&["node_modules", "dist/*"])).unwrap();
        assert!(filter.is_ignored("node_modules/pkg/index.js"));
        assert!(filter.is_ignored("node_modules"));
        assert!(filter.is_ignored("dist/bundle.js"));
        assert!(!filter.is_ignored("src/index.js"));
    }

    #[test]
    fn test_ignore_matches_file_name() {
        let filter = PathFilter::new(&[], &strings(&["*.min.js", ".gitignore"])).unwrap();
        assert!(filter.is_ignored("public/vendor/jquery.min.js"));
        assert!(filter.is_ignored("sub/.gitignore"));
        assert!(!filter.is_ignored("public/app.js"));
    }

    #[test]
    fn test_default_ignore_patterns() {
        let filter = PathFilter::new(&[], &strings(DEFAULT_IGNORE)).unwrap();
        assert!(filter.is_ignored("web/node_modules/vue/index.js"));
        assert!(filter.is_ignored("node_modules/vue/index.js"));
        assert!(filter.is_ignored("tools/.venv/lib/site.py"));
        assert!(!filter.is_ignored("src/main.js"));
    }

    #[test]
    fn test_invalid_pattern() {
        let result = PathFilter::new(&[], &strings(&["src/[unclosed"]));
        assert!(matches!(result, Err(Error::InvalidPattern { .. })));
    }

    #[test]
    fn test_expand_patterns() {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child("README.md").write_str("# readme").unwrap();
        temp.child("docs/guide.md").write_str("guide").unwrap();
        temp.child("docs/api.md").write_str("api").unwrap();
        temp.child("node_modules/pkg/README.md").write_str("vendored").unwrap();
        temp.child("src/a.js").write_str("a").unwrap();

        let filter = PathFilter::new(&[], &strings(&["node_modules"])).unwrap();
        let files = expand_patterns(
            temp.path(),
            &strings(&["README.md", "docs/*.md", "**/README.md"]),
            &filter,
        )
        .unwrap();

        let rel: Vec<String> = files.iter().map(|p| relative_path(temp.path(), p)).collect();
        assert_eq!(rel, vec!["README.md", "docs/api.md", "docs/guide.md"]);
    }

    #[test]
    fn test_expand_patterns_empty() {
        let temp = assert_fs::TempDir::new().unwrap();
        let filter = PathFilter::new(&[], &[]).unwrap();
        assert!(expand_patterns(temp.path(), &[], &filter).unwrap().is_empty());
    }
}
