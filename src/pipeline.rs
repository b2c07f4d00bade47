use crate::{
    assistant::{AiderProcess, Assistant, Invocation, InvocationError},
    config::RunConfig,
    deps::{
        Admission, DependencyCruiser, DependencyResolver, DependencySet, Resolution,
        existing_file,
    },
    dry_run::{DryRunLog, Record},
    error::{Diagnostics, Result, Warning},
    executor::{BatchFailure, ExecutionReport, Executor},
    file::{FileEntry, Origin},
    filter::{PathFilter, expand_patterns},
    planner::{BatchPlan, Planner, Unit},
    scanner::Discoverer,
    select::Selector,
    template::{MessageContext, MessageRenderer},
    token::TokenEstimator,
};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

/// Everything planning produced before any batch runs.
#[derive(Debug, Clone)]
pub struct Prepared {
    /// Batches to execute
    pub plan: BatchPlan,
    /// Read-only context files, project-relative
    pub read_only: Vec<String>,
    /// Estimated tokens of the read-only files
    pub read_only_tokens: usize,
    /// Files found by the walk (read-only files excluded)
    pub discovered: usize,
    /// Files added through the dependency graph
    pub dependency_files: usize,
    /// Dependency tool answers, empty without dependency expansion
    pub resolutions: Vec<Resolution>,
}

/// Warning tallies by kind.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct WarningCounts {
    /// Unreadable entries during the walk
    pub discovery: usize,
    /// Dependency tool failures, missing targets, cycles
    pub dependency: usize,
    /// Files counted as zero tokens
    pub estimation: usize,
}

impl From<&Diagnostics> for WarningCounts {
    fn from(diag: &Diagnostics) -> Self {
        Self {
            discovery: diag.discovery_count(),
            dependency: diag.dependency_count(),
            estimation: diag.estimation_count(),
        }
    }
}

/// End-of-run report.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    /// Files found by the walk
    pub files_discovered: usize,

    /// Files added as dependencies
    pub dependency_files: usize,

    /// Read-only context files
    pub read_only_files: usize,

    /// Planned batches
    pub batches: usize,

    /// Batches over the limit on their own
    pub oversized_batches: usize,

    /// Tokens across all batches
    pub total_tokens: usize,

    /// Tokens of the read-only context
    pub read_only_tokens: usize,

    /// Limit the plan was built against
    pub token_limit: Option<usize>,

    /// Batches attempted
    pub attempted: usize,

    /// Batches that succeeded
    pub succeeded: usize,

    /// Failed batches in order
    pub failures: Vec<BatchFailure>,

    /// Warning tallies
    pub warning_counts: WarningCounts,

    /// Every recovered warning
    pub warnings: Vec<Warning>,

    /// True if invocations were only logged
    pub dry_run: bool,

    /// Dry-run log location
    pub dry_run_log: Option<String>,

    /// Seconds spent discovering, resolving and planning
    pub planning_secs: f64,

    /// Seconds spent executing batches
    pub execution_secs: f64,

    /// Total seconds
    pub total_secs: f64,
}

impl RunSummary {
    /// Number of failed batches.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.failures.len()
    }

    /// Prints a human-readable summary to stdout.
    pub fn print_summary(&self) {
        let limit = self
            .token_limit
            .map_or_else(|| "unbounded".to_string(), |l| l.to_string());

        println!("\n╔═══════════════════════════════════════════════════════╗");
        println!("║                aider-all Run Summary                  ║");
        println!("╠═══════════════════════════════════════════════════════╣");
        println!("║ Files Discovered:     {:>8}                        ║", self.files_discovered);
        println!("║   - Dependencies:     {:>8}                        ║", self.dependency_files);
        println!("║   - Read-only:        {:>8}                        ║", self.read_only_files);
        println!("║                                                       ║");
        println!("║ Batches Planned:      {:>8}                        ║", self.batches);
        println!("║   - Oversized:        {:>8}                        ║", self.oversized_batches);
        println!("║ Total Tokens:         {:>8}                        ║", self.total_tokens);
        println!("║ Token Limit:          {:>8}                        ║", limit);
        println!("║                                                       ║");
        println!("║ Batches Succeeded:    {:>8}                        ║", self.succeeded);
        println!("║ Batches Failed:       {:>8}                        ║", self.failed());
        println!(
            "║ Warnings:             {:>8}                        ║",
            self.warnings.len()
        );
        println!("║                                                       ║");
        println!("║ Timing Breakdown:                                     ║");
        println!("║   - Planning:         {:>8.2}s                     ║", self.planning_secs);
        println!("║   - Execution:        {:>8.2}s                     ║", self.execution_secs);
        println!("║   - Total:            {:>8.2}s                     ║", self.total_secs);
        if let Some(log) = &self.dry_run_log {
            println!("║                                                       ║");
            println!("║ ⚠ Dry run: nothing was executed                       ║");
            println!("║   Log: {log}");
        }
        println!("╚═══════════════════════════════════════════════════════╝\n");

        for failure in &self.failures {
            println!(
                "  batch {} failed ({}): {}",
                failure.batch_index + 1,
                failure.files.join(", "),
                failure.error
            );
        }
    }
}

/// Wires discovery, dependency grouping, estimation, planning and
/// execution together.
pub struct Pipeline {
    config: RunConfig,
    filter: Arc<PathFilter>,
    renderer: MessageRenderer,
    estimator: Arc<dyn TokenEstimator>,
    resolver: Option<Box<dyn DependencyResolver>>,
    assistant: Option<Box<dyn Assistant>>,
}

impl Pipeline {
    /// Creates a new pipeline with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(config: RunConfig) -> Result<Self> {
        config.validate()?;

        let filter = Arc::new(config.path_filter()?);
        let renderer = MessageRenderer::new(&config.messages)?;
        let estimator = config.tokenizer.create();

        Ok(Self {
            config,
            filter,
            renderer,
            estimator,
            resolver: None,
            assistant: None,
        })
    }

    /// Replaces the dependency tool.
    #[must_use]
    pub fn with_resolver(mut self, resolver: Box<dyn DependencyResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Replaces the assistant process (and the dry-run log).
    #[must_use]
    pub fn with_assistant(mut self, assistant: Box<dyn Assistant>) -> Self {
        self.assistant = Some(assistant);
        self
    }

    /// Replaces the token estimator.
    #[must_use]
    pub fn with_estimator(mut self, estimator: Arc<dyn TokenEstimator>) -> Self {
        self.estimator = estimator;
        self
    }

    /// Discovers files, resolves dependencies, estimates tokens and packs
    /// batches. Recovered problems are recorded in `diag`.
    ///
    /// # Errors
    ///
    /// Returns an error if the scan root is missing or a read-only pattern
    /// is invalid.
    pub fn plan(&self, diag: &mut Diagnostics) -> Result<Prepared> {
        let project_dir = &self.config.project_dir;

        let discoverer = Discoverer::new(
            project_dir,
            &self.config.scan_root(),
            self.config.scan_depth,
            self.config.respect_gitignore,
            Arc::clone(&self.filter),
        )?;
        let mut files = discoverer.discover(diag);
        files.retain(|f| f.absolute_path != self.config.dry_run_log);

        let read_only: Vec<FileEntry> =
            expand_patterns(project_dir, &self.config.read_only, &self.filter)?
                .into_iter()
                .map(|path| FileEntry::new(project_dir, path, Origin::Discovered))
                .collect();
        let read_only_paths: HashSet<String> = read_only.iter().map(|f| f.path.clone()).collect();
        files.retain(|f| !read_only_paths.contains(&f.path));

        let read_only_tokens = read_only
            .iter()
            .map(|f| f.estimate(self.estimator.as_ref(), diag))
            .sum();

        let discovered = files.len();
        info!("Discovered {} file(s), {} read-only", discovered, read_only.len());

        let (units, resolutions) = if self.config.scan_logic.expands_dependencies() {
            self.dependency_units(files, &read_only_paths, diag)
        } else {
            (files.into_iter().map(Unit::single).collect(), Vec::new())
        };

        let dependency_files = units
            .iter()
            .flat_map(|u| &u.files)
            .filter(|f| f.origin == Origin::Dependency)
            .count();

        for file in units.iter().flat_map(|u| &u.files) {
            file.estimate(self.estimator.as_ref(), diag);
        }

        let planner = Planner::new(self.config.token_limit, self.config.scan_logic.grouping());
        let plan = planner.plan(units);

        Ok(Prepared {
            plan,
            read_only: read_only.into_iter().map(|f| f.path).collect(),
            read_only_tokens,
            discovered,
            dependency_files,
            resolutions,
        })
    }

    fn dependency_units(
        &self,
        files: Vec<FileEntry>,
        read_only: &HashSet<String>,
        diag: &mut Diagnostics,
    ) -> (Vec<Unit>, Vec<Resolution>) {
        let project_dir = &self.config.project_dir;
        let default_resolver;
        let resolver: &dyn DependencyResolver = match &self.resolver {
            Some(resolver) => resolver.as_ref(),
            None => {
                default_resolver = DependencyCruiser::new(
                    self.config.dependency_command.clone(),
                    project_dir,
                    self.config.dependency_extensions.clone(),
                    self.config.dependency_timeout,
                );
                &default_resolver
            }
        };

        let admit = |path: &str| {
            if read_only.contains(path) || self.filter.is_ignored(path) {
                return Admission::Skip;
            }
            match existing_file(project_dir, path) {
                Ok(()) => Admission::Accept,
                Err(reason) => Admission::Reject(reason),
            }
        };

        let roots: Vec<String> = files.iter().map(|f| f.path.clone()).collect();
        let graph = DependencySet::build(&roots, resolver, admit, diag);
        let groups = graph.groups(&roots, diag);

        let mut entries: HashMap<String, FileEntry> =
            files.into_iter().map(|f| (f.path.clone(), f)).collect();

        let units: Vec<Unit> = groups
            .into_iter()
            .map(|group| {
                let members = group
                    .into_iter()
                    .map(|path| {
                        entries.remove(&path).unwrap_or_else(|| {
                            FileEntry::new(project_dir, project_dir.join(&path), Origin::Dependency)
                        })
                    })
                    .collect();
                Unit::group(members)
            })
            .collect();

        debug!(
            "Dependency graph: {} file(s), {} unit(s)",
            graph.len(),
            units.len()
        );
        (units, graph.resolutions().to_vec())
    }

    /// Executes the complete pipeline and returns the run summary.
    ///
    /// # Process
    ///
    /// 1. **Plan**: discover, group by dependencies, estimate and pack
    /// 2. **Select**: pick model, edit format and message per batch
    /// 3. **Execute**: run the assistant per batch, or log in dry-run mode
    ///
    /// # Errors
    ///
    /// Returns an error only for setup problems; batch failures are
    /// reported in the summary.
    #[instrument(skip(self), fields(project_dir = %self.config.project_dir.display()))]
    pub fn run(self) -> Result<RunSummary> {
        let start_time = Instant::now();
        info!("Starting run");

        let dry_log = if self.config.dry_run && self.assistant.is_none() {
            Some(DryRunLog::open(
                &self.config.dry_run_log,
                self.config.assistant.clone(),
                self.config.assistant_args.clone(),
            )?)
        } else {
            None
        };

        let mut diag = Diagnostics::new();
        info!("Stage 1/2: Planning batches...");
        let prepared = self.plan(&mut diag)?;
        let planning = start_time.elapsed();
        info!(
            "✓ Planned {} batch(es) from {} file(s) in {:.2}s",
            prepared.plan.len(),
            prepared.plan.files().count(),
            planning.as_secs_f64()
        );

        if let Some(log) = &dry_log {
            log.write_record(&Record::run_start(&self.config, &prepared.plan))?;
            for resolution in &prepared.resolutions {
                log.write_record(&Record::dependencies(resolution))?;
            }
        }

        let (invocations, render_failures) = self.invocations(&prepared);

        let process;
        let assistant: &dyn Assistant = if let Some(assistant) = &self.assistant {
            assistant.as_ref()
        } else if let Some(log) = &dry_log {
            log
        } else {
            process = AiderProcess::new(
                self.config.assistant.clone(),
                self.config.assistant_args.clone(),
                self.config.project_dir.clone(),
                self.config.timeout,
            );
            &process
        };

        info!("Stage 2/2: Running {} batch(es)...", invocations.len());
        let execute_start = Instant::now();
        let mut report = Executor::new(assistant, self.config.jobs).run(invocations);
        for failure in render_failures {
            report.push_failure(failure);
        }
        let execution = execute_start.elapsed();

        if let Some(log) = &dry_log {
            let record = Record::summary(
                &prepared.plan,
                prepared.read_only.len(),
                self.filter.extensions(),
            );
            if let Err(e) = log.write_record(&record) {
                warn!("Could not write the dry-run summary: {}", e);
            }
        }

        let summary = self.summarize(&prepared, report, diag, dry_log.as_ref(), planning, execution);
        info!(
            "✓ Run finished in {:.2}s: {} succeeded, {} failed",
            summary.total_secs,
            summary.succeeded,
            summary.failed()
        );
        Ok(summary)
    }

    /// Renders messages and selects per-batch values in batch order.
    fn invocations(&self, prepared: &Prepared) -> (Vec<Invocation>, Vec<BatchFailure>) {
        let plan = &prepared.plan;
        let mut selector = Selector::from_config(&self.config, self.renderer.len());
        let mut invocations = Vec::with_capacity(plan.len());
        let mut failures = Vec::new();

        for batch in &plan.batches {
            let choice = selector.next_choice();
            let files = batch.paths();

            let mut context = MessageContext::new(&files, &prepared.read_only);
            context.batch_index = batch.index + 1;
            context.batch_count = plan.len();
            context.model = choice.model.as_deref();
            context.edit_format = choice.edit_format.map(|f| f.as_str());
            context.total_tokens = batch.total_tokens;

            match self.renderer.render(choice.message_index, &context) {
                Ok(message) => invocations.push(Invocation {
                    batch_index: batch.index,
                    batch_count: plan.len(),
                    files,
                    read_only: prepared.read_only.clone(),
                    model: choice.model,
                    edit_format: choice.edit_format,
                    message,
                    estimated_tokens: batch.total_tokens,
                    read_only_tokens: prepared.read_only_tokens,
                    token_limit: plan.token_limit,
                    oversized: batch.oversized,
                }),
                Err(e) => {
                    let error = InvocationError::Render(e.to_string());
                    warn!("Batch {} skipped: {}", batch.index + 1, error);
                    failures.push(BatchFailure::new(batch.index, files, &error));
                }
            }
        }

        (invocations, failures)
    }

    fn summarize(
        &self,
        prepared: &Prepared,
        report: ExecutionReport,
        diag: Diagnostics,
        dry_log: Option<&DryRunLog>,
        planning: std::time::Duration,
        execution: std::time::Duration,
    ) -> RunSummary {
        RunSummary {
            files_discovered: prepared.discovered,
            dependency_files: prepared.dependency_files,
            read_only_files: prepared.read_only.len(),
            batches: prepared.plan.len(),
            oversized_batches: prepared.plan.oversized_count(),
            total_tokens: prepared.plan.total_tokens(),
            read_only_tokens: prepared.read_only_tokens,
            token_limit: prepared.plan.token_limit,
            attempted: report.attempted,
            succeeded: report.succeeded,
            failures: report.failures,
            warning_counts: WarningCounts::from(&diag),
            warnings: diag.warnings().to_vec(),
            dry_run: self.config.dry_run,
            dry_run_log: dry_log.map(|log| log.path().display().to_string()),
            planning_secs: planning.as_secs_f64(),
            execution_secs: execution.as_secs_f64(),
            total_secs: (planning + execution).as_secs_f64(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScanLogic;
    use crate::deps::MapResolver;
    use crate::token::TokenizerKind;
    use assert_fs::TempDir;
    use assert_fs::prelude::*;
    use std::sync::Mutex;

    /// Records every invocation; fails the listed batches.
    #[derive(Clone, Default)]
    struct Recorder {
        calls: Arc<Mutex<Vec<Invocation>>>,
        failing: Vec<usize>,
    }

    impl Assistant for Recorder {
        fn invoke(&self, invocation: &Invocation) -> std::result::Result<(), InvocationError> {
            self.calls.lock().unwrap().push(invocation.clone());
            if self.failing.contains(&invocation.batch_index) {
                Err(InvocationError::Exit {
                    code: Some(1),
                    stderr: "model refused".into(),
                })
            } else {
                Ok(())
            }
        }
    }

    /// Writes a file of `tokens` simple-tokenizer tokens.
    fn file(temp: &TempDir, path: &str, tokens: usize) {
        temp.child(path).write_str(&"x".repeat(tokens * 4)).unwrap();
    }

    fn builder(temp: &TempDir) -> crate::config::RunConfigBuilder {
        RunConfig::builder()
            .project_dir(temp.path())
            .tokenizer(TokenizerKind::Simple)
            .extensions(vec![".js".to_string()])
    }

    fn shape(plan: &BatchPlan) -> Vec<(Vec<String>, bool)> {
        plan.batches.iter().map(|b| (b.paths(), b.oversized)).collect()
    }

    fn names(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn test_standard_plan() {
        let temp = TempDir::new().unwrap();
        file(&temp, "a.js", 100);
        file(&temp, "b.js", 150);
        file(&temp, "c.js", 300);
        file(&temp, "notes.txt", 10);

        let config = builder(&temp).token_limit(Some(250)).build().unwrap();
        let mut diag = Diagnostics::new();
        let prepared = Pipeline::new(config).unwrap().plan(&mut diag).unwrap();

        assert_eq!(shape(&prepared.plan), vec![
            (names(&["a.js", "b.js"]), false),
            (names(&["c.js"]), true),
        ]);
        assert_eq!(prepared.discovered, 3);
        assert_eq!(prepared.dependency_files, 0);
    }

    #[test]
    fn test_zero_limit_plans_every_file_alone() {
        let temp = TempDir::new().unwrap();
        file(&temp, "a.js", 1);
        file(&temp, "b.js", 2);

        let config = builder(&temp).token_limit(Some(0)).build().unwrap();
        let prepared = Pipeline::new(config)
            .unwrap()
            .plan(&mut Diagnostics::new())
            .unwrap();

        assert_eq!(shape(&prepared.plan), vec![
            (names(&["a.js"]), true),
            (names(&["b.js"]), true),
        ]);
    }

    #[test]
    fn test_dependency_closure_is_not_split() {
        let temp = TempDir::new().unwrap();
        file(&temp, "src/a.js", 100);
        file(&temp, "lib/b.js", 150);

        let config = builder(&temp)
            .scan_start("src")
            .scan_logic(ScanLogic::StandardDependencies)
            .token_limit(Some(200))
            .build()
            .unwrap();
        let resolver = MapResolver::with(&[("src/a.js", &["lib/b.js"])]);

        let prepared = Pipeline::new(config)
            .unwrap()
            .with_resolver(Box::new(resolver))
            .plan(&mut Diagnostics::new())
            .unwrap();

        assert_eq!(shape(&prepared.plan), vec![(names(&["src/a.js", "lib/b.js"]), true)]);
        assert_eq!(prepared.plan.total_tokens(), 250);
        assert_eq!(prepared.discovered, 1);
        assert_eq!(prepared.dependency_files, 1);
        let origins: Vec<Origin> = prepared.plan.files().map(|f| f.origin).collect();
        assert_eq!(origins, vec![Origin::Discovered, Origin::Dependency]);
    }

    #[test]
    fn test_dependencies_filtered_before_planning() {
        let temp = TempDir::new().unwrap();
        file(&temp, "a.js", 10);
        file(&temp, "node_modules/vue/index.js", 10);
        file(&temp, "README.md", 10);

        let config = builder(&temp)
            .scan_logic(ScanLogic::BasicDependencies)
            .build()
            .unwrap();
        let resolver = MapResolver::with(&[(
            "a.js",
            &["node_modules/vue/index.js", "README.md", "gone.js"],
        )]);

        let mut diag = Diagnostics::new();
        let prepared = Pipeline::new(config)
            .unwrap()
            .with_resolver(Box::new(resolver))
            .plan(&mut diag)
            .unwrap();

        assert_eq!(shape(&prepared.plan), vec![(names(&["a.js"]), false)]);
        assert_eq!(prepared.read_only, names(&["README.md"]));
        assert_eq!(diag.dependency_count(), 1);
    }

    #[test]
    fn test_missing_dependency_tool_degrades() {
        let temp = TempDir::new().unwrap();
        file(&temp, "a.js", 10);
        file(&temp, "b.js", 10);

        let config = builder(&temp)
            .scan_logic(ScanLogic::StandardDependencies)
            .dependency_command(vec!["definitely-missing-aider-all-tool".to_string()])
            .build()
            .unwrap();

        let mut diag = Diagnostics::new();
        let prepared = Pipeline::new(config).unwrap().plan(&mut diag).unwrap();

        assert_eq!(shape(&prepared.plan), vec![(names(&["a.js", "b.js"]), false)]);
        assert_eq!(diag.dependency_count(), 2);
    }

    #[test]
    fn test_read_only_files_are_not_planned() {
        let temp = TempDir::new().unwrap();
        file(&temp, "src/app.js", 10);
        file(&temp, "docs/guide.js", 20);

        let config = builder(&temp)
            .read_only(vec!["docs/*.js".to_string()])
            .build()
            .unwrap();
        let prepared = Pipeline::new(config)
            .unwrap()
            .plan(&mut Diagnostics::new())
            .unwrap();

        assert_eq!(shape(&prepared.plan), vec![(names(&["src/app.js"]), false)]);
        assert_eq!(prepared.read_only, names(&["docs/guide.js"]));
        assert_eq!(prepared.read_only_tokens, 20);
    }

    #[test]
    fn test_run_continues_after_failed_batch() {
        let temp = TempDir::new().unwrap();
        file(&temp, "a.js", 10);
        file(&temp, "b.js", 10);
        file(&temp, "c.js", 10);

        let config = builder(&temp)
            .scan_logic(ScanLogic::Basic)
            .messages(vec!["Document {{ file_list }} ({{ batch_index }}/{{ batch_count }})".into()])
            .build()
            .unwrap();
        let recorder = Recorder {
            failing: vec![1],
            ..Recorder::default()
        };
        let calls = Arc::clone(&recorder.calls);

        let summary = Pipeline::new(config)
            .unwrap()
            .with_assistant(Box::new(recorder))
            .run()
            .unwrap();

        assert_eq!(summary.batches, 3);
        assert_eq!(summary.attempted, 3);
        assert_eq!(summary.succeeded, 2);
        assert_eq!(summary.failed(), 1);
        assert_eq!(summary.failures[0].files, names(&["b.js"]));

        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[0].message, "Document a.js (1/3)");
        assert_eq!(calls[2].message, "Document c.js (3/3)");
        assert_eq!(calls[0].model, None);
    }

    #[test]
    fn test_render_failure_fails_only_that_batch() {
        let temp = TempDir::new().unwrap();
        file(&temp, "a.js", 10);

        let config = builder(&temp)
            .messages(vec!["Use {{ model | upper }}".into()])
            .build()
            .unwrap();
        let recorder = Recorder::default();
        let calls = Arc::clone(&recorder.calls);

        let summary = Pipeline::new(config)
            .unwrap()
            .with_assistant(Box::new(recorder))
            .run()
            .unwrap();

        assert_eq!(summary.attempted, 1);
        assert_eq!(summary.failed(), 1);
        assert!(summary.failures[0].error.contains("rendered"));
        assert!(calls.lock().unwrap().is_empty());
    }

    #[test]
    fn test_dry_run_logs_without_starting_a_process() {
        let temp = TempDir::new().unwrap();
        file(&temp, "a.js", 100);
        file(&temp, "b.js", 100);

        let config = builder(&temp)
            .scan_logic(ScanLogic::Basic)
            .assistant("definitely-missing-aider-binary")
            .dry_run(true)
            .build()
            .unwrap();
        let log_path = config.dry_run_log.clone();

        let summary = Pipeline::new(config).unwrap().run().unwrap();
        assert_eq!(summary.succeeded, 2);
        assert!(summary.failures.is_empty());
        assert!(summary.dry_run);

        let kinds: Vec<String> = std::fs::read_to_string(&log_path)
            .unwrap()
            .lines()
            .map(|line| {
                let value: serde_json::Value = serde_json::from_str(line).unwrap();
                value["kind"].as_str().unwrap().to_string()
            })
            .collect();
        assert_eq!(kinds, names(&["run_start", "batch", "batch", "summary"]));
    }

    #[test]
    fn test_dry_run_logs_dependency_answers() {
        let temp = TempDir::new().unwrap();
        file(&temp, "src/a.js", 10);
        file(&temp, "lib/b.js", 10);

        let config = builder(&temp)
            .scan_start("src")
            .scan_logic(ScanLogic::StandardDependencies)
            .dry_run(true)
            .build()
            .unwrap();
        let log_path = config.dry_run_log.clone();
        let resolver = MapResolver::with(&[("src/a.js", &["lib/b.js"])]);

        Pipeline::new(config)
            .unwrap()
            .with_resolver(Box::new(resolver))
            .run()
            .unwrap();

        let records: Vec<serde_json::Value> = std::fs::read_to_string(&log_path)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        let kinds: Vec<&str> = records.iter().map(|r| r["kind"].as_str().unwrap()).collect();
        assert_eq!(kinds, vec!["run_start", "dependencies", "dependencies", "batch", "summary"]);
        assert_eq!(records[1]["file"], "src/a.js");
        assert_eq!(records[1]["dependencies"], serde_json::json!(["lib/b.js"]));
        assert_eq!(records[2]["file"], "lib/b.js");
        assert!(records[2]["error"].is_null());
    }

    #[test]
    fn test_empty_project() {
        let temp = TempDir::new().unwrap();
        let config = builder(&temp).build().unwrap();

        let summary = Pipeline::new(config)
            .unwrap()
            .with_assistant(Box::new(Recorder::default()))
            .run()
            .unwrap();

        assert_eq!(summary.batches, 0);
        assert_eq!(summary.attempted, 0);
    }
}
