use crate::file::FileEntry;
use tracing::{debug, trace, warn};

/// How units are combined into batches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Grouping {
    /// Every unit is its own batch
    Basic,
    /// Units are packed greedily up to the token limit
    #[default]
    Standard,
}

/// Smallest piece the planner places: one file or a whole closure group.
#[derive(Debug, Clone)]
pub struct Unit {
    /// Member files; never split across batches
    pub files: Vec<FileEntry>,
}

impl Unit {
    /// A unit holding a single file.
    #[must_use]
    pub fn single(file: FileEntry) -> Self {
        Self { files: vec![file] }
    }

    /// A unit holding an atomic group of files.
    #[must_use]
    pub fn group(files: Vec<FileEntry>) -> Self {
        Self { files }
    }

    /// Sum of the members' token counts.
    #[must_use]
    pub fn tokens(&self) -> usize {
        self.files.iter().map(FileEntry::token_count).sum()
    }
}

/// Files sent together in one assistant invocation.
#[derive(Debug, Clone)]
pub struct Batch {
    /// Sequential batch index (0-based)
    pub index: usize,

    /// Files in planning order
    pub files: Vec<FileEntry>,

    /// Total token count across all files
    pub total_tokens: usize,

    /// True when a single unit alone exceeds the limit
    pub oversized: bool,

    /// Number of units packed into this batch
    pub units: usize,
}

impl Batch {
    /// Returns the number of files in this batch.
    #[must_use]
    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    /// Project-relative paths of the files.
    #[must_use]
    pub fn paths(&self) -> Vec<String> {
        self.files.iter().map(|f| f.path.clone()).collect()
    }

    /// Returns the utilization percentage (0.0 to 1.0).
    #[must_use]
    pub fn utilization(&self, limit: Option<usize>) -> f64 {
        match limit {
            Some(max) if max > 0 => self.total_tokens as f64 / max as f64,
            _ => 0.0,
        }
    }
}

/// Ordered batches covering every planned file exactly once.
#[derive(Debug, Clone, Default)]
pub struct BatchPlan {
    /// Batches in execution order
    pub batches: Vec<Batch>,

    /// Limit the plan was built against (`None` = unbounded)
    pub token_limit: Option<usize>,
}

impl BatchPlan {
    /// Number of batches.
    #[must_use]
    pub fn len(&self) -> usize {
        self.batches.len()
    }

    /// Returns true if nothing was planned.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }

    /// Tokens across all batches.
    #[must_use]
    pub fn total_tokens(&self) -> usize {
        self.batches.iter().map(|b| b.total_tokens).sum()
    }

    /// Number of batches flagged oversized.
    #[must_use]
    pub fn oversized_count(&self) -> usize {
        self.batches.iter().filter(|b| b.oversized).count()
    }

    /// Every planned file in order.
    pub fn files(&self) -> impl Iterator<Item = &FileEntry> {
        self.batches.iter().flat_map(|b| b.files.iter())
    }
}

/// Packs units into token-bounded batches.
#[derive(Debug, Clone, Copy)]
pub struct Planner {
    limit: Option<usize>,
    grouping: Grouping,
}

impl Planner {
    /// Creates a planner. `None` means no token limit.
    #[must_use]
    pub const fn new(limit: Option<usize>, grouping: Grouping) -> Self {
        Self { limit, grouping }
    }

    /// Plans `units` in order.
    ///
    /// # Algorithm
    ///
    /// 1. Units keep their order and are never split
    /// 2. A unit joins the open batch if the sum stays within the limit
    /// 3. Otherwise the open batch is closed and a new one starts
    /// 4. A unit over the limit on its own closes the open batch and is
    ///    placed alone in a batch flagged oversized
    ///
    /// In basic grouping every unit is closed into its own batch.
    #[must_use]
    pub fn plan(&self, units: Vec<Unit>) -> BatchPlan {
        let mut batches = Vec::new();
        let mut current = BatchBuilder::new(0, self.limit);

        for unit in units {
            if unit.files.is_empty() {
                continue;
            }
            let tokens = unit.tokens();

            if self.exceeds(tokens) {
                warn!(
                    "{} exceeds the token limit on its own ({} tokens), planning it as an oversized batch",
                    describe(&unit),
                    tokens
                );
                Self::close(&mut current, &mut batches, self.limit);
                let mut alone = BatchBuilder::new(batches.len(), self.limit);
                alone.add_unit(unit, tokens);
                if let Some(batch) = alone.build(true) {
                    batches.push(batch);
                }
                current = BatchBuilder::new(batches.len(), self.limit);
                continue;
            }

            if self.grouping == Grouping::Basic || !current.can_fit(tokens) {
                Self::close(&mut current, &mut batches, self.limit);
            }

            trace!("Adding {} ({} tokens) to batch {}", describe(&unit), tokens, current.index);
            current.add_unit(unit, tokens);
        }

        Self::close(&mut current, &mut batches, self.limit);

        let plan = BatchPlan {
            batches,
            token_limit: self.limit,
        };
        self.log_plan(&plan);
        plan
    }

    fn exceeds(&self, tokens: usize) -> bool {
        self.limit.is_some_and(|limit| tokens > limit || limit == 0)
    }

    fn close(current: &mut BatchBuilder, batches: &mut Vec<Batch>, limit: Option<usize>) {
        let old = std::mem::replace(current, BatchBuilder::new(batches.len(), limit));
        if let Some(batch) = old.build(false) {
            batches.push(batch);
            *current = BatchBuilder::new(batches.len(), limit);
        }
    }

    fn log_plan(&self, plan: &BatchPlan) {
        if plan.is_empty() {
            debug!("Nothing to plan");
            return;
        }

        let files: usize = plan.batches.iter().map(Batch::file_count).sum();
        let avg_utilization = plan
            .batches
            .iter()
            .map(|b| b.utilization(self.limit))
            .sum::<f64>()
            / plan.len() as f64;

        debug!(
            "Planned {} batches from {} files ({} oversized, avg utilization: {:.1}%)",
            plan.len(),
            files,
            plan.oversized_count(),
            avg_utilization * 100.0
        );
    }
}

fn describe(unit: &Unit) -> String {
    match unit.files.as_slice() {
        [single] => format!("'{}'", single.path),
        [first, rest @ ..] => format!("group '{}' (+{} files)", first.path, rest.len()),
        [] => "empty unit".to_string(),
    }
}

/// Builder for constructing batches incrementally.
struct BatchBuilder {
    index: usize,
    files: Vec<FileEntry>,
    current_tokens: usize,
    units: usize,
    limit: Option<usize>,
}

impl BatchBuilder {
    fn new(index: usize, limit: Option<usize>) -> Self {
        Self {
            index,
            files: Vec::new(),
            current_tokens: 0,
            units: 0,
            limit,
        }
    }

    /// Checks if a unit can join the open batch.
    fn can_fit(&self, tokens: usize) -> bool {
        self.limit
            .is_none_or(|limit| self.current_tokens.saturating_add(tokens) <= limit)
    }

    fn add_unit(&mut self, unit: Unit, tokens: usize) {
        self.current_tokens += tokens;
        self.units += 1;
        self.files.extend(unit.files);
    }

    /// Builds the final batch if not empty.
    fn build(self, oversized: bool) -> Option<Batch> {
        if self.files.is_empty() {
            None
        } else {
            Some(Batch {
                index: self.index,
                files: self.files,
                total_tokens: self.current_tokens,
                oversized,
                units: self.units,
            })
        }
    }
}
