use crate::{
    error::{Diagnostics, Error, Result, Warning},
    file::{FileEntry, Origin, relative_path},
    filter::PathFilter,
};
use ignore::{DirEntry, WalkBuilder};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Walks the scan root and yields candidate files.
pub(crate) struct Discoverer {
    project_dir: PathBuf,
    scan_root: PathBuf,
    scan_depth: Option<usize>,
    respect_gitignore: bool,
    filter: Arc<PathFilter>,
}

impl Discoverer {
    /// Creates a discoverer rooted at `scan_root`.
    ///
    /// `scan_depth` counts directories below the scan root: files directly
    /// inside it are at depth 0. `None` walks the whole tree.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ScanRoot`] if `scan_root` is not a directory.
    pub(crate) fn new(
        project_dir: &Path,
        scan_root: &Path,
        scan_depth: Option<usize>,
        respect_gitignore: bool,
        filter: Arc<PathFilter>,
    ) -> Result<Self> {
        if !scan_root.is_dir() {
            return Err(Error::ScanRoot {
                path: scan_root.to_path_buf(),
            });
        }

        Ok(Self {
            project_dir: project_dir.to_path_buf(),
            scan_root: scan_root.to_path_buf(),
            scan_depth,
            respect_gitignore,
            filter,
        })
    }

    /// Lazily walks the tree in a stable order.
    ///
    /// Entries are sorted by file name within each directory. Ignored
    /// directories are pruned, symlinks and other non-regular entries are
    /// skipped, and unreadable entries come out as discovery warnings.
    pub(crate) fn walk(&self) -> impl Iterator<Item = std::result::Result<FileEntry, Warning>> {
        let mut builder = WalkBuilder::new(&self.scan_root);
        builder
            .standard_filters(self.respect_gitignore)
            .require_git(false)
            .hidden(false)
            .follow_links(false)
            .max_depth(self.scan_depth.map(|d| d.saturating_add(1)))
            .sort_by_file_name(|a, b| a.cmp(b));

        let project_dir = self.project_dir.clone();
        let prune_filter = Arc::clone(&self.filter);
        let prune_root = self.project_dir.clone();
        builder.filter_entry(move |entry: &DirEntry| {
            if entry.depth() == 0 {
                return true;
            }
            let relative = relative_path(&prune_root, entry.path());
            let keep = !prune_filter.is_ignored(&relative);
            if !keep {
                trace!("Pruned ignored path: {}", relative);
            }
            keep
        });

        let filter = Arc::clone(&self.filter);
        builder.build().filter_map(move |result| match result {
            Ok(entry) => {
                if entry.depth() == 0 {
                    return None;
                }
                let is_file = entry.file_type().is_some_and(|ft| ft.is_file());
                if !is_file {
                    return None;
                }

                let relative = relative_path(&project_dir, entry.path());
                if !filter.has_allowed_extension(&relative) {
                    return None;
                }

                trace!("Discovered {}", relative);
                Some(Ok(FileEntry::new(
                    &project_dir,
                    entry.into_path(),
                    Origin::Discovered,
                )))
            }
            Err(e) => {
                let path = error_path(&e)
                    .map(|p| relative_path(&project_dir, p))
                    .unwrap_or_default();
                Some(Err(Warning::Discovery {
                    path,
                    message: e.to_string(),
                }))
            }
        })
    }

    /// Collects every candidate, recording walk problems in `diag`.
    pub(crate) fn discover(&self, diag: &mut Diagnostics) -> Vec<FileEntry> {
        debug!(
            "Scanning {} (depth {})",
            self.scan_root.display(),
            self.scan_depth
                .map_or_else(|| "unbounded".to_string(), |d| d.to_string())
        );

        let mut files = Vec::new();
        for item in self.walk() {
            match item {
                Ok(file) => files.push(file),
                Err(warning) => {
                    warn!("{}", warning);
                    diag.push(warning);
                }
            }
        }

        debug!("Discovered {} candidate files", files.len());
        files
    }
}

fn error_path(error: &ignore::Error) -> Option<&Path> {
    match error {
        ignore::Error::WithPath { path, .. } => Some(path.as_path()),
        ignore::Error::WithDepth { err, .. } | ignore::Error::WithLineNumber { err, .. } => {
            error_path(err)
        }
        ignore::Error::Loop { child, .. } => Some(child.as_path()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_fs::prelude::*;

    fn filter(extensions: &[&str], ignore: &[&str]) -> Arc<PathFilter> {
        let extensions: Vec<String> = extensions.iter().map(|s| (*s).to_string()).collect();
        let ignore: Vec<String> = ignore.iter().map(|s| (*s).to_string()).collect();
        Arc::new(PathFilter::new(&extensions, &ignore).unwrap())
    }

    fn paths(discoverer: &Discoverer) -> Vec<String> {
        let mut diag = Diagnostics::new();
        discoverer
            .discover(&mut diag)
            .into_iter()
            .map(|f| f.path)
            .collect()
    }

    #[test]
    fn test_discover_filters_by_extension() {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child("a.js").write_str("a").unwrap();
        temp.child("b.vue").write_str("b").unwrap();
        temp.child("c.py").write_str("c").unwrap();

        let d = Discoverer::new(temp.path(), temp.path(), None, false, filter(&[".js", ".vue"], &[]))
            .unwrap();

        assert_eq!(paths(&d), vec!["a.js", "b.vue"]);
    }

    #[test]
    fn test_discover_is_sorted_and_deterministic() {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child("src/z.js").write_str("z").unwrap();
        temp.child("src/a.js").write_str("a").unwrap();
        temp.child("lib/m.js").write_str("m").unwrap();
        temp.child("b.js").write_str("b").unwrap();

        let d = Discoverer::new(temp.path(), temp.path(), None, false, filter(&["js"], &[])).unwrap();

        let first = paths(&d);
        assert_eq!(first, vec!["b.js", "lib/m.js", "src/a.js", "src/z.js"]);
        assert_eq!(first, paths(&d));
    }

    #[test]
    fn test_depth_zero_is_scan_root_only() {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child("top.js").write_str("t").unwrap();
        temp.child("one/mid.js").write_str("m").unwrap();
        temp.child("one/two/deep.js").write_str("d").unwrap();

        let flat = Discoverer::new(temp.path(), temp.path(), Some(0), false, filter(&["js"], &[]))
            .unwrap();
        assert_eq!(paths(&flat), vec!["top.js"]);

        let one = Discoverer::new(temp.path(), temp.path(), Some(1), false, filter(&["js"], &[]))
            .unwrap();
        assert_eq!(paths(&one), vec!["one/mid.js", "top.js"]);
    }

    #[test]
    fn test_scan_start_paths_stay_project_relative() {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child("src/app/main.js").write_str("m").unwrap();
        temp.child("other.js").write_str("o").unwrap();

        let d = Discoverer::new(
            temp.path(),
            &temp.path().join("src"),
            None,
            false,
            filter(&["js"], &[]),
        )
        .unwrap();

        assert_eq!(paths(&d), vec!["src/app/main.js"]);
    }

    #[test]
    fn test_ignored_directories_are_pruned() {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child("node_modules/vue/index.js").write_str("v").unwrap();
        temp.child("src/main.js").write_str("m").unwrap();
        temp.child("src/main.min.js").write_str("m").unwrap();

        let d = Discoverer::new(
            temp.path(),
            temp.path(),
            None,
            false,
            filter(&["js"], &["node_modules", "*.min.js"]),
        )
        .unwrap();

        assert_eq!(paths(&d), vec!["src/main.js"]);
    }

    #[test]
    fn test_hidden_files_are_not_skipped() {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child(".config/settings.js").write_str("s").unwrap();

        let d = Discoverer::new(temp.path(), temp.path(), None, false, filter(&["js"], &[])).unwrap();
        assert_eq!(paths(&d), vec![".config/settings.js"]);
    }

    #[test]
    fn test_gitignore_only_when_enabled() {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child(".gitignore").write_str("generated.js\n").unwrap();
        temp.child("generated.js").write_str("g").unwrap();
        temp.child("main.js").write_str("m").unwrap();

        let plain = Discoverer::new(temp.path(), temp.path(), None, false, filter(&["js"], &[]))
            .unwrap();
        assert_eq!(paths(&plain), vec!["generated.js", "main.js"]);

        let git = Discoverer::new(temp.path(), temp.path(), None, true, filter(&["js"], &[]))
            .unwrap();
        assert_eq!(paths(&git), vec!["main.js"]);
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinks_are_skipped() {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child("real.js").write_str("r").unwrap();
        std::os::unix::fs::symlink(temp.path().join("real.js"), temp.path().join("link.js"))
            .unwrap();

        let d = Discoverer::new(temp.path(), temp.path(), None, false, filter(&["js"], &[])).unwrap();
        assert_eq!(paths(&d), vec!["real.js"]);
    }

    #[test]
    fn test_missing_scan_root() {
        let temp = assert_fs::TempDir::new().unwrap();
        let result = Discoverer::new(
            temp.path(),
            &temp.path().join("missing"),
            None,
            false,
            filter(&[], &[]),
        );
        assert!(matches!(result, Err(Error::ScanRoot { .. })));
    }

    #[test]
    fn test_empty_directory_is_not_an_error() {
        let temp = assert_fs::TempDir::new().unwrap();
        let d = Discoverer::new(temp.path(), temp.path(), None, false, filter(&[], &[])).unwrap();
        assert!(paths(&d).is_empty());
    }
}
