//! Dependency resolution through an external graph tool.
//!
//! A [`DependencyResolver`] answers "what does this file depend on". The
//! [`DependencySet`] queries it transitively from the discovered files and
//! turns the resulting graph into closure groups that the planner treats
//! as atomic units.

use crate::error::{Diagnostics, Warning};
use crate::file::normalize_separators;
use crate::process::run_with_timeout;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, trace, warn};

const ARROWS: [&str; 2] = [" → ", " â†’ "];

/// Why a single resolve call produced no usable answer.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ResolveError {
    /// The tool could not be started.
    #[error("could not start '{program}': {message}")]
    ToolMissing {
        /// Program that failed to start
        program: String,
        /// OS error text
        message: String,
    },

    /// The tool exited unsuccessfully.
    #[error("tool exited with {status}: {stderr}")]
    Failed {
        /// Exit status description
        status: String,
        /// Captured stderr, trimmed
        stderr: String,
    },

    /// The tool ran past its timeout and was killed.
    #[error("tool timed out after {secs}s")]
    TimedOut {
        /// Timeout that was exceeded
        secs: u64,
    },

    /// The output had lines but no recognizable edge.
    #[error("unrecognized output: {0}")]
    Malformed(String),
}

/// Answers the direct and indirect dependencies of one file.
pub trait DependencyResolver: Send + Sync {
    /// Returns project-relative paths `path` depends on.
    ///
    /// # Errors
    ///
    /// Returns a [`ResolveError`] when the answer is unavailable; callers
    /// degrade the file to "no dependencies".
    fn resolve(&self, path: &str) -> Result<Vec<String>, ResolveError>;
}

/// Resolver backed by `dependency-cruiser`'s text reporter.
#[derive(Debug, Clone)]
pub struct DependencyCruiser {
    command: Vec<String>,
    project_dir: PathBuf,
    extensions: Vec<String>,
    timeout: Duration,
}

impl DependencyCruiser {
    /// Default command line; the queried file is appended.
    #[must_use]
    pub fn default_command() -> Vec<String> {
        let npx = if cfg!(windows) { "npx.cmd" } else { "npx" };
        [
            npx,
            "dependency-cruiser",
            "--no-config",
            "--exclude",
            "node_modules",
            "-T",
            "text",
        ]
        .into_iter()
        .map(String::from)
        .collect()
    }

    /// Extensions the tool understands by default.
    #[must_use]
    pub fn default_extensions() -> Vec<String> {
        [".js", ".ts", ".jsx", ".vue"]
            .into_iter()
            .map(String::from)
            .collect()
    }

    /// Creates a resolver running `command` inside `project_dir`.
    #[must_use]
    pub fn new(
        command: Vec<String>,
        project_dir: impl Into<PathBuf>,
        extensions: Vec<String>,
        timeout: Duration,
    ) -> Self {
        let extensions = extensions
            .into_iter()
            .map(|ext| {
                let ext = ext.trim().to_ascii_lowercase();
                if ext.starts_with('.') { ext } else { format!(".{ext}") }
            })
            .collect();

        Self {
            command,
            project_dir: project_dir.into(),
            extensions,
            timeout,
        }
    }

    /// Returns true if the tool should be asked about `path`.
    #[must_use]
    pub fn handles(&self, path: &str) -> bool {
        let lower = path.to_ascii_lowercase();
        self.extensions.iter().any(|ext| lower.ends_with(ext.as_str()))
    }

    fn program(&self) -> &str {
        self.command.first().map_or("npx", String::as_str)
    }
}

impl DependencyResolver for DependencyCruiser {
    fn resolve(&self, path: &str) -> Result<Vec<String>, ResolveError> {
        if !self.handles(path) {
            trace!("Not asking the dependency tool about {}", path);
            return Ok(Vec::new());
        }

        let program = self.program().to_string();
        let mut cmd = Command::new(&program);
        cmd.args(self.command.iter().skip(1))
            .arg(path)
            .current_dir(&self.project_dir);

        debug!("Resolving dependencies of {}", path);
        let output = run_with_timeout(&mut cmd, self.timeout, None).map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                ResolveError::ToolMissing {
                    program: program.clone(),
                    message: "not found on PATH".to_string(),
                }
            } else {
                ResolveError::ToolMissing {
                    program: program.clone(),
                    message: e.to_string(),
                }
            }
        })?;

        if output.timed_out {
            return Err(ResolveError::TimedOut {
                secs: self.timeout.as_secs(),
            });
        }

        if !output.success() {
            let status = output
                .status
                .map_or_else(|| "no status".to_string(), |s| s.to_string());
            return Err(ResolveError::Failed {
                status,
                stderr: output.stderr.trim().to_string(),
            });
        }

        parse_text_output(&output.stdout, path)
    }
}

/// Extracts dependency paths from `dependency-cruiser -T text` output.
///
/// Each line reads `source → target`. Every node on a well-formed line
/// except `queried` is returned once, sorted.
///
/// # Errors
///
/// Returns [`ResolveError::Malformed`] if the output has lines but none of
/// them is an edge.
pub fn parse_text_output(output: &str, queried: &str) -> Result<Vec<String>, ResolveError> {
    let queried = normalize_separators(queried);
    let mut nodes = std::collections::BTreeSet::new();
    let mut lines = 0usize;
    let mut edges = 0usize;
    let mut first_bad = None;

    for line in output.lines().map(str::trim).filter(|l| !l.is_empty()) {
        lines += 1;
        match split_edge(line) {
            Some((source, target)) => {
                edges += 1;
                trace!("Edge: {} -> {}", source, target);
                for node in [source, target] {
                    let node = normalize_separators(node);
                    if node != queried {
                        nodes.insert(node);
                    }
                }
            }
            None => {
                warn!("Skipping unrecognized dependency line: {}", line);
                first_bad.get_or_insert_with(|| line.to_string());
            }
        }
    }

    if lines > 0 && edges == 0 {
        return Err(ResolveError::Malformed(first_bad.unwrap_or_default()));
    }

    Ok(nodes.into_iter().collect())
}

fn split_edge(line: &str) -> Option<(&str, &str)> {
    let arrow = *ARROWS.iter().find(|a| line.contains(**a))?;
    let (source, target) = line.rsplit_once(arrow)?;
    let (source, target) = (source.trim(), target.trim());
    (!source.is_empty() && !target.is_empty()).then_some((source, target))
}

/// What to do with a path reached through the graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Admission {
    /// Plan the file
    Accept,
    /// Drop silently (ignored or read-only)
    Skip,
    /// Drop with a dependency warning
    Reject(String),
}

/// A file's closure: itself plus everything reachable from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Closure {
    /// Root first, then dependencies in depth-first order
    pub members: Vec<String>,
    /// True if a cycle was found while walking
    pub cyclic: bool,
}

/// The resolver's answer for one file, kept for the dry-run log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Resolution {
    /// Queried file
    pub path: String,
    /// Paths the tool reported, before admission
    pub reported: Vec<String>,
    /// Paths that joined the graph
    pub dependencies: Vec<String>,
    /// Failure that degraded the file to no dependencies
    pub error: Option<String>,
}

/// Resolved dependency graph of a run.
#[derive(Debug, Clone, Default)]
pub struct DependencySet {
    edges: BTreeMap<String, Vec<String>>,
    resolutions: Vec<Resolution>,
}

impl DependencySet {
    /// Queries `resolver` transitively starting from `roots`.
    ///
    /// Each file is asked about once. Failures degrade the file to no
    /// dependencies with a warning; reached paths are passed through
    /// `admit` before they join the graph.
    pub(crate) fn build(
        roots: &[String],
        resolver: &dyn DependencyResolver,
        admit: impl Fn(&str) -> Admission,
        diag: &mut Diagnostics,
    ) -> Self {
        let mut edges: BTreeMap<String, Vec<String>> = BTreeMap::new();
        let mut queued: HashSet<String> = roots.iter().cloned().collect();
        let mut queue: VecDeque<String> = roots.iter().cloned().collect();
        let mut rejected: HashSet<String> = HashSet::new();
        let mut resolutions = Vec::new();

        while let Some(path) = queue.pop_front() {
            let (reported, error) = match resolver.resolve(&path) {
                Ok(deps) => (deps, None),
                Err(e) => {
                    let warning = Warning::Dependency {
                        path: path.clone(),
                        message: e.to_string(),
                    };
                    warn!("{}", warning);
                    diag.push(warning);
                    (Vec::new(), Some(e.to_string()))
                }
            };

            let mut deps = Vec::new();
            for dep in reported.iter().map(|d| normalize_separators(d)) {
                if dep == path || deps.contains(&dep) {
                    continue;
                }
                if !queued.contains(&dep) {
                    if rejected.contains(&dep) {
                        continue;
                    }
                    match admit(&dep) {
                        Admission::Accept => {}
                        Admission::Skip => {
                            debug!("Dropping dependency {} of {}", dep, path);
                            rejected.insert(dep);
                            continue;
                        }
                        Admission::Reject(message) => {
                            let warning = Warning::Dependency {
                                path: dep.clone(),
                                message,
                            };
                            warn!("{}", warning);
                            diag.push(warning);
                            rejected.insert(dep);
                            continue;
                        }
                    }
                    queued.insert(dep.clone());
                    queue.push_back(dep.clone());
                }
                deps.push(dep);
            }

            deps.sort();
            if !deps.is_empty() {
                debug!("{} depends on {} file(s)", path, deps.len());
            }
            resolutions.push(Resolution {
                path: path.clone(),
                reported,
                dependencies: deps.clone(),
                error,
            });
            edges.insert(path, deps);
        }

        Self { edges, resolutions }
    }

    /// Resolver answers in query order.
    #[must_use]
    pub fn resolutions(&self) -> &[Resolution] {
        &self.resolutions
    }

    /// Direct dependencies of `path`, sorted.
    #[must_use]
    pub fn dependencies(&self, path: &str) -> &[String] {
        self.edges.get(path).map_or(&[], Vec::as_slice)
    }

    /// Number of files in the graph.
    #[must_use]
    pub fn len(&self) -> usize {
        self.edges.len()
    }

    /// Returns true if no file was resolved.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// Walks the closure of `root` depth first.
    #[must_use]
    pub fn closure(&self, root: &str) -> Closure {
        let mut members = vec![root.to_string()];
        let mut seen: HashSet<&str> = HashSet::from([root]);
        let mut on_stack: HashSet<&str> = HashSet::from([root]);
        let mut stack: Vec<(&str, usize)> = vec![(root, 0)];
        let mut cyclic = false;

        while let Some(&(node, next)) = stack.last() {
            let deps = self.dependencies(node);
            let Some(dep) = deps.get(next) else {
                on_stack.remove(node);
                stack.pop();
                continue;
            };

            if let Some(top) = stack.last_mut() {
                top.1 += 1;
            }

            let dep = dep.as_str();
            if on_stack.contains(dep) {
                cyclic = true;
            } else if seen.insert(dep) {
                members.push(dep.to_string());
                on_stack.insert(dep);
                stack.push((dep, 0));
            }
        }

        Closure { members, cyclic }
    }

    /// Partitions the closures of `roots` into disjoint groups.
    ///
    /// Overlapping closures merge. A cyclic closure is reported and its
    /// files stay single unless an acyclic closure pulls them in. Groups
    /// follow their earliest root; members follow first appearance.
    pub(crate) fn groups(&self, roots: &[String], diag: &mut Diagnostics) -> Vec<Vec<String>> {
        let mut order: Vec<String> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();
        let mut sets = DisjointSets::default();

        for root in roots {
            let closure = self.closure(root);
            let ids: Vec<usize> = closure
                .members
                .iter()
                .map(|m| {
                    *index.entry(m.clone()).or_insert_with(|| {
                        order.push(m.clone());
                        sets.add()
                    })
                })
                .collect();

            if closure.cyclic {
                let warning = Warning::Dependency {
                    path: root.clone(),
                    message: "dependency cycle detected; files planned without grouping"
                        .to_string(),
                };
                warn!("{}", warning);
                diag.push(warning);
                continue;
            }

            if let Some((&first, rest)) = ids.split_first() {
                for &id in rest {
                    sets.union(first, id);
                }
            }
        }

        let mut group_of: HashMap<usize, usize> = HashMap::new();
        let mut groups: Vec<Vec<String>> = Vec::new();
        for (id, path) in order.into_iter().enumerate() {
            let rep = sets.find(id);
            let slot = *group_of.entry(rep).or_insert_with(|| {
                groups.push(Vec::new());
                groups.len() - 1
            });
            groups[slot].push(path);
        }

        groups
    }
}

#[derive(Debug, Default)]
struct DisjointSets {
    parent: Vec<usize>,
}

impl DisjointSets {
    fn add(&mut self) -> usize {
        self.parent.push(self.parent.len());
        self.parent.len() - 1
    }

    fn find(&mut self, mut id: usize) -> usize {
        while self.parent[id] != id {
            self.parent[id] = self.parent[self.parent[id]];
            id = self.parent[id];
        }
        id
    }

    // The smaller id wins so a group is represented by its first member.
    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra != rb {
            let (keep, merge) = if ra < rb { (ra, rb) } else { (rb, ra) };
            self.parent[merge] = keep;
        }
    }
}

/// Checks that a reached path is a regular file inside `project_dir`.
pub(crate) fn existing_file(project_dir: &Path, relative: &str) -> Result<(), String> {
    if relative.starts_with("../") || Path::new(relative).is_absolute() {
        return Err("outside the project directory".to_string());
    }
    match std::fs::symlink_metadata(project_dir.join(relative)) {
        Ok(meta) if meta.is_file() => Ok(()),
        Ok(_) => Err("not a regular file".to_string()),
        Err(_) => Err("does not exist in the project".to_string()),
    }
}

/// Resolver answering from a fixed table.
#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct MapResolver {
    pub(crate) edges: HashMap<String, Vec<String>>,
    pub(crate) failing: HashSet<String>,
    pub(crate) calls: std::sync::Mutex<Vec<String>>,
}

#[cfg(test)]
impl MapResolver {
    pub(crate) fn with(edges: &[(&str, &[&str])]) -> Self {
        Self {
            edges: edges
                .iter()
                .map(|(k, v)| ((*k).to_string(), v.iter().map(|s| (*s).to_string()).collect()))
                .collect(),
            ..Self::default()
        }
    }
}

#[cfg(test)]
impl DependencyResolver for MapResolver {
    fn resolve(&self, path: &str) -> Result<Vec<String>, ResolveError> {
        self.calls.lock().unwrap().push(path.to_string());
        if self.failing.contains(path) {
            return Err(ResolveError::ToolMissing {
                program: "npx".into(),
                message: "not found on PATH".into(),
            });
        }
        Ok(self.edges.get(path).cloned().unwrap_or_default())
    }
}
