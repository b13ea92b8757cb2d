use thiserror::Error;
use tracing::{Instrument, info, info_span, instrument, warn};
use tracing_error::{ExtractSpanTrace, SpanTrace};

use super::shutdown::Shutdown;
use crate::manifest::RunContext;
use crate::operator::{ScheduledTask, SparkOperatorError};

#[derive(Error, Debug)]
pub enum SequentialRunError {
    #[error("Task '{task_id}' failed: {source}")]
    Task {
        task_id: String,
        source: SparkOperatorError,
    },

    #[error("Shutdown requested before task '{next}'; {remaining} task(s) not started")]
    Cancelled { next: String, remaining: usize },
}

impl ExtractSpanTrace for SequentialRunError {
    fn span_trace(&self) -> Option<&SpanTrace> {
        match self {
            SequentialRunError::Task { source, .. } => source.span_trace(),
            SequentialRunError::Cancelled { .. } => None,
        }
    }
}

/// Runs tasks one after another, each starting only after the previous one succeeded.
pub struct SequentialRunner {
    tasks: Vec<Box<dyn ScheduledTask>>,
    shutdown: Shutdown,
}

impl SequentialRunner {
    pub fn new(tasks: Vec<Box<dyn ScheduledTask>>, shutdown: Shutdown) -> Self {
        Self { tasks, shutdown }
    }

    #[instrument("sequential_run", skip_all, fields(tasks = self.tasks.len()))]
    pub async fn run(&mut self, run: &RunContext) -> Result<(), SequentialRunError> {
        let total = self.tasks.len();
        for (index, task) in self.tasks.iter_mut().enumerate() {
            let task_id = task.task_id().to_string();
            if self.shutdown.requested() {
                warn!("Shutdown requested. Skipping remaining tasks.");
                return Err(SequentialRunError::Cancelled {
                    next: task_id,
                    remaining: total - index,
                });
            }

            info!("Starting task '{}' ({}/{}).", task_id, index + 1, total);
            task.execute(run)
                .instrument(info_span!("task", task_id = %task_id))
                .await
                .map_err(|source| SequentialRunError::Task {
                    task_id: task_id.clone(),
                    source,
                })?;
            info!("Task '{}' finished.", task_id);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};

    struct RecordingTask {
        id: String,
        fail: bool,
        log: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl ScheduledTask for RecordingTask {
        fn task_id(&self) -> &str {
            &self.id
        }

        async fn execute(&mut self, run: &RunContext) -> Result<(), SparkOperatorError> {
            self.log
                .lock()
                .unwrap()
                .push(format!("{}:{}", self.id, run.args.join(" ")));
            if self.fail {
                return Err(SparkOperatorError::ApplicationFailed {
                    name: self.id.clone(),
                    state: "FAILED".to_string(),
                });
            }
            Ok(())
        }
    }

    fn tasks(spec: &[(&str, bool)], log: &Arc<Mutex<Vec<String>>>) -> Vec<Box<dyn ScheduledTask>> {
        spec.iter()
            .map(|(id, fail)| {
                Box::new(RecordingTask {
                    id: id.to_string(),
                    fail: *fail,
                    log: log.clone(),
                }) as Box<dyn ScheduledTask>
            })
            .collect()
    }

    #[tokio::test]
    async fn test_runs_in_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let (_tx, shutdown) = Shutdown::channel();
        let mut runner =
            SequentialRunner::new(tasks(&[("extract", false), ("load", false)], &log), shutdown);

        let run = RunContext {
            args: vec!["--date=2024-01-01".to_string()],
            ..Default::default()
        };
        runner.run(&run).await.unwrap();

        assert_eq!(
            *log.lock().unwrap(),
            vec!["extract:--date=2024-01-01", "load:--date=2024-01-01"]
        );
    }

    #[tokio::test]
    async fn test_stops_at_first_failure() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let (_tx, shutdown) = Shutdown::channel();
        let mut runner = SequentialRunner::new(
            tasks(&[("extract", true), ("load", false)], &log),
            shutdown,
        );

        let err = runner.run(&RunContext::default()).await.unwrap_err();

        assert!(matches!(err, SequentialRunError::Task { ref task_id, .. } if task_id == "extract"));
        assert_eq!(log.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_skips_remaining_after_shutdown() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let (tx, shutdown) = Shutdown::channel();
        tx.send(Some("SIGTERM")).unwrap();
        let mut runner = SequentialRunner::new(tasks(&[("extract", false)], &log), shutdown);

        let err = runner.run(&RunContext::default()).await.unwrap_err();

        assert!(matches!(err, SequentialRunError::Cancelled { remaining: 1, .. }));
        assert!(log.lock().unwrap().is_empty());
    }
}
