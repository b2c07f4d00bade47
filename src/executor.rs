use crate::assistant::{Assistant, Invocation, InvocationError};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::thread;
use tracing::{debug, info, warn};

/// A batch whose invocation failed.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct BatchFailure {
    /// Batch index (0-based)
    pub batch_index: usize,
    /// Files of the failed batch
    pub files: Vec<String>,
    /// Failure description
    pub error: String,
}

impl BatchFailure {
    /// Failure of `invocation` with `error`.
    #[must_use]
    pub fn new(batch_index: usize, files: Vec<String>, error: &InvocationError) -> Self {
        Self {
            batch_index,
            files,
            error: error.to_string(),
        }
    }
}

/// Outcome of executing every batch.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ExecutionReport {
    /// Batches attempted
    pub attempted: usize,
    /// Batches that completed successfully
    pub succeeded: usize,
    /// Failures in batch order
    pub failures: Vec<BatchFailure>,
}

impl ExecutionReport {
    /// Records a failure that happened before dispatch.
    pub fn push_failure(&mut self, failure: BatchFailure) {
        self.attempted += 1;
        let at = self
            .failures
            .partition_point(|f| f.batch_index < failure.batch_index);
        self.failures.insert(at, failure);
    }

    /// Number of failed batches.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.failures.len()
    }
}

/// Dispatches invocations to an assistant, sequentially or on a bounded
/// pool of scoped worker threads.
pub struct Executor<'a> {
    assistant: &'a dyn Assistant,
    jobs: usize,
}

impl<'a> Executor<'a> {
    /// `jobs` is the maximum number of invocations in flight (at least 1).
    #[must_use]
    pub fn new(assistant: &'a dyn Assistant, jobs: usize) -> Self {
        Self {
            assistant,
            jobs: jobs.max(1),
        }
    }

    /// Runs every invocation. Failures are recorded, never fatal.
    #[must_use]
    pub fn run(&self, invocations: Vec<Invocation>) -> ExecutionReport {
        let workers = self.jobs.min(invocations.len());
        let outcomes = if workers <= 1 {
            invocations.into_iter().map(|inv| self.execute(inv)).collect()
        } else {
            debug!("Running {} batches on {} workers", invocations.len(), workers);
            self.run_parallel(invocations, workers)
        };

        let mut report = ExecutionReport::default();
        for (index, files, outcome) in outcomes {
            match outcome {
                Ok(()) => {
                    report.attempted += 1;
                    report.succeeded += 1;
                }
                Err(e) => report.push_failure(BatchFailure::new(index, files, &e)),
            }
        }
        report
    }

    fn run_parallel(&self, invocations: Vec<Invocation>, workers: usize) -> Vec<Outcome> {
        let queue = Mutex::new(invocations.into_iter().collect::<VecDeque<_>>());
        let results = Mutex::new(Vec::new());

        thread::scope(|scope| {
            for _ in 0..workers {
                scope.spawn(|| {
                    loop {
                        let next = match queue.lock() {
                            Ok(mut q) => q.pop_front(),
                            Err(_) => None,
                        };
                        let Some(invocation) = next else { break };
                        let outcome = self.execute(invocation);
                        if let Ok(mut r) = results.lock() {
                            r.push(outcome);
                        }
                    }
                });
            }
        });

        let mut outcomes = results.into_inner().unwrap_or_default();
        outcomes.sort_by_key(|(index, _, _)| *index);
        outcomes
    }

    fn execute(&self, invocation: Invocation) -> Outcome {
        let outcome = self.assistant.invoke(&invocation);
        match &outcome {
            Ok(()) => info!(
                "Batch {}/{} done ({} files)",
                invocation.number(),
                invocation.batch_count,
                invocation.files.len()
            ),
            Err(e) => warn!(
                "Batch {}/{} failed: {}",
                invocation.number(),
                invocation.batch_count,
                e
            ),
        }
        (invocation.batch_index, invocation.files, outcome)
    }
}

type Outcome = (usize, Vec<String>, Result<(), InvocationError>);

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Fails every batch whose index is listed; counts concurrency.
    struct FakeAssistant {
        failing: Vec<usize>,
        calls: Mutex<Vec<usize>>,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    impl FakeAssistant {
        fn new(failing: &[usize]) -> Self {
            Self {
                failing: failing.to_vec(),
                calls: Mutex::new(Vec::new()),
                in_flight: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            }
        }
    }

    impl Assistant for FakeAssistant {
        fn invoke(&self, invocation: &Invocation) -> Result<(), InvocationError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            thread::sleep(std::time::Duration::from_millis(20));
            self.calls.lock().unwrap().push(invocation.batch_index);
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if self.failing.contains(&invocation.batch_index) {
                Err(InvocationError::Exit {
                    code: Some(1),
                    stderr: "boom".into(),
                })
            } else {
                Ok(())
            }
        }
    }

    fn invocations(count: usize) -> Vec<Invocation> {
        (0..count)
            .map(|i| Invocation {
                batch_index: i,
                batch_count: count,
                files: vec![format!("f{i}.js")],
                read_only: Vec::new(),
                model: None,
                edit_format: None,
                message: "m".into(),
                estimated_tokens: 1,
                read_only_tokens: 0,
                token_limit: None,
                oversized: false,
            })
            .collect()
    }

    #[test]
    fn test_sequential_runs_in_order_and_continues_after_failure() {
        let assistant = FakeAssistant::new(&[1]);
        let report = Executor::new(&assistant, 1).run(invocations(3));

        assert_eq!(*assistant.calls.lock().unwrap(), vec![0, 1, 2]);
        assert_eq!(report.attempted, 3);
        assert_eq!(report.succeeded, 2);
        assert_eq!(report.failed(), 1);
        assert_eq!(report.failures[0].batch_index, 1);
        assert_eq!(report.failures[0].files, vec!["f1.js".to_string()]);
        assert!(report.failures[0].error.contains("boom"));
        assert_eq!(assistant.peak.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_parallel_is_bounded_and_reports_in_order() {
        let assistant = FakeAssistant::new(&[4, 1]);
        let report = Executor::new(&assistant, 3).run(invocations(8));

        assert_eq!(report.attempted, 8);
        assert_eq!(report.succeeded, 6);
        let failed: Vec<usize> = report.failures.iter().map(|f| f.batch_index).collect();
        assert_eq!(failed, vec![1, 4]);
        assert!(assistant.peak.load(Ordering::SeqCst) <= 3);
        assert_eq!(assistant.calls.lock().unwrap().len(), 8);
    }

    #[test]
    fn test_empty_run() {
        let assistant = FakeAssistant::new(&[]);
        let report = Executor::new(&assistant, 4).run(Vec::new());
        assert_eq!(report.attempted, 0);
        assert!(report.failures.is_empty());
    }

    #[test]
    fn test_push_failure_keeps_order() {
        let mut report = ExecutionReport::default();
        let err = InvocationError::Render("bad".into());
        report.push_failure(BatchFailure::new(3, Vec::new(), &err));
        report.push_failure(BatchFailure::new(0, Vec::new(), &err));
        assert_eq!(report.attempted, 2);
        assert_eq!(report.failures[0].batch_index, 0);
    }
}
