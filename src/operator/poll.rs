use std::sync::Arc;

use derive_debug::Dbg;
use serde_json::Value;
use tokio::time::Instant;
use tracing::{Level, debug, error, info, instrument, warn};

use super::error::SparkOperatorError;
use crate::config::Config;
use crate::config::polling::PollingConfig;
use crate::error::{SpannedErr, SpannedExt};
use crate::kubernetes_objects::spark_application::{ClusterApiError, SparkApplicationApi};
use crate::scheduler::Shutdown;

/// Coarse lifecycle of a SparkApplication as reported by the operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceState {
    Pending,
    Running,
    Completed,
    Failed,
}

impl ResourceState {
    /// Every state string the operator may invent later falls into `Running`.
    pub fn classify(state: &str) -> Self {
        match state {
            "COMPLETED" => Self::Completed,
            "FAILED" | "UNKNOWN" => Self::Failed,
            "PENDING" | "SUBMITTED" => Self::Pending,
            _ => Self::Running,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollResult {
    Succeeded,
    Failed { state: String },
    Continue,
}

/// Final outcome of a SparkApplication, as returned by `poll_until_terminal`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminalState {
    Succeeded,
    Failed { state: String },
}

fn application_state(object: &Value) -> Option<&str> {
    object
        .pointer("/status/applicationState/state")
        .and_then(Value::as_str)
}

fn driver_pod_name(object: &Value) -> Option<&str> {
    object
        .pointer("/status/driverInfo/podName")
        .and_then(Value::as_str)
}

/// Watches one SparkApplication until it reaches a terminal state.
#[derive(Dbg, Clone)]
pub struct StatusPoller {
    #[dbg(skip)]
    api: Arc<dyn SparkApplicationApi>,
    polling: PollingConfig,
    driver_container: String,
    log_tail_lines: i64,
    #[dbg(skip)]
    shutdown: Shutdown,
}

impl StatusPoller {
    pub fn new(api: Arc<dyn SparkApplicationApi>, config: &Config, shutdown: Shutdown) -> Self {
        Self {
            api,
            polling: config.polling.clone(),
            driver_container: config.driver_container.clone(),
            log_tail_lines: config.log_tail_lines,
            shutdown,
        }
    }

    /// Reads the status once. Unrecognized states stream the driver log tail and continue.
    #[instrument("poll/tick", level = Level::TRACE, skip(self))]
    pub async fn poll_once(
        &self,
        name: &str,
        namespace: &str,
    ) -> Result<PollResult, SpannedErr<ClusterApiError>> {
        let object = self.api.get(namespace, name).await.with_span_trace()?;

        let Some(state) = application_state(&object) else {
            debug!("SparkApplication '{}' has no state yet.", name);
            return Ok(PollResult::Continue);
        };

        match ResourceState::classify(state) {
            ResourceState::Completed => Ok(PollResult::Succeeded),
            ResourceState::Failed => Ok(PollResult::Failed {
                state: state.to_string(),
            }),
            ResourceState::Pending => {
                info!("SparkApplication '{}' is {}.", name, state);
                Ok(PollResult::Continue)
            }
            ResourceState::Running => {
                info!("SparkApplication '{}' is in state {}.", name, state);
                if let Some(pod_name) = driver_pod_name(&object) {
                    self.log_driver_tail(namespace, pod_name).await;
                }
                Ok(PollResult::Continue)
            }
        }
    }

    async fn log_driver_tail(&self, namespace: &str, pod_name: &str) {
        match self
            .api
            .driver_log_tail(namespace, pod_name, &self.driver_container, self.log_tail_lines)
            .await
        {
            Ok(lines) => {
                for line in lines {
                    info!(pod = %pod_name, "{}", line);
                }
            }
            Err(e) => warn!("Failed to read driver log of pod '{}': {}", pod_name, e),
        }
    }

    /// Polls until `Succeeded` or `Failed`, honoring shutdown, `max_wait` and `max_errors`.
    #[instrument("poll_until_terminal", skip(self), level = "trace")]
    pub async fn poll_until_terminal(
        &self,
        name: &str,
        namespace: &str,
    ) -> Result<TerminalState, SparkOperatorError> {
        let mut shutdown = self.shutdown.clone();
        let cancelled = |shutdown: &Shutdown| SparkOperatorError::Cancelled {
            name: name.to_string(),
            signal: shutdown.reason().unwrap_or("shutdown"),
        };

        info!(
            "Waiting for SparkApplication '{}' in namespace '{}' to finish...",
            name, namespace
        );
        if !shutdown.sleep_or_shutdown(self.polling.initial_wait).await {
            return Err(cancelled(&shutdown));
        }

        let started = Instant::now();
        let mut errors_count = 0u64;
        loop {
            let wait = match self.poll_once(name, namespace).await {
                Ok(PollResult::Continue) => {
                    errors_count = 0;
                    self.polling.poll_interval
                }
                Ok(PollResult::Succeeded) => {
                    info!(
                        "SparkApplication '{}' succeeded after {} seconds.",
                        name,
                        started.elapsed().as_secs()
                    );
                    break Ok(TerminalState::Succeeded);
                }
                Ok(PollResult::Failed { state }) => {
                    info!(
                        "SparkApplication '{}' ended in state {} after {} seconds.",
                        name,
                        state,
                        started.elapsed().as_secs()
                    );
                    break Ok(TerminalState::Failed { state });
                }
                Err(e) => {
                    errors_count += 1;
                    warn!("Error while checking SparkApplication '{}': {}", name, e);
                    if errors_count >= self.polling.max_errors {
                        error!(
                            "Failed to check SparkApplication '{}' status {} times. Aborting wait.",
                            name, errors_count
                        );
                        break Err(SparkOperatorError::KubeClient(e));
                    }
                    self.polling.error_wait
                }
            };

            if let Some(max_wait) = self.polling.max_wait
                && started.elapsed() >= max_wait
            {
                error!(
                    "Waited more than {} seconds for SparkApplication '{}' to finish.",
                    max_wait.as_secs(),
                    name
                );
                break Err(SparkOperatorError::PollTimeout {
                    name: name.to_string(),
                    waited_secs: started.elapsed().as_secs(),
                });
            }

            if !shutdown.sleep_or_shutdown(wait).await {
                warn!("Stopped waiting for SparkApplication '{}'; it keeps running.", name);
                break Err(cancelled(&shutdown));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kubernetes_objects::spark_application::MockSparkApplicationApi;
    use mockall::Sequence;
    use mockall::predicate::eq;
    use serde_json::json;
    use std::time::Duration;

    fn with_state(state: &str) -> Value {
        json!({"metadata": {"name": "job-prod"}, "status": {"applicationState": {"state": state}}})
    }

    fn poller(api: MockSparkApplicationApi, shutdown: Shutdown) -> StatusPoller {
        StatusPoller::new(Arc::new(api), &Config::for_tests(), shutdown)
    }

    #[test]
    fn test_classify_states() {
        assert_eq!(ResourceState::classify("COMPLETED"), ResourceState::Completed);
        assert_eq!(ResourceState::classify("FAILED"), ResourceState::Failed);
        assert_eq!(ResourceState::classify("UNKNOWN"), ResourceState::Failed);
        assert_eq!(ResourceState::classify("SUBMITTED"), ResourceState::Pending);
        assert_eq!(ResourceState::classify("PENDING"), ResourceState::Pending);
        assert_eq!(ResourceState::classify("RUNNING"), ResourceState::Running);
        assert_eq!(ResourceState::classify("SUBMISSION_FAILED"), ResourceState::Running);
    }

    #[tokio::test]
    async fn test_poll_once_terminal_and_pending() {
        let mut api = MockSparkApplicationApi::new();
        let mut seq = Sequence::new();
        for state in ["COMPLETED", "FAILED", "SUBMITTED"] {
            api.expect_get()
                .times(1)
                .in_sequence(&mut seq)
                .returning(move |_, _| Ok(with_state(state)));
        }
        api.expect_driver_log_tail().times(0);
        let (_tx, shutdown) = Shutdown::channel();
        let poller = poller(api, shutdown);

        assert_eq!(poller.poll_once("job-prod", "spark").await.unwrap(), PollResult::Succeeded);
        assert_eq!(
            poller.poll_once("job-prod", "spark").await.unwrap(),
            PollResult::Failed {
                state: "FAILED".to_string()
            }
        );
        assert_eq!(poller.poll_once("job-prod", "spark").await.unwrap(), PollResult::Continue);
    }

    #[tokio::test]
    async fn test_poll_once_missing_status() {
        let mut api = MockSparkApplicationApi::new();
        api.expect_get()
            .returning(|_, _| Ok(json!({"metadata": {"name": "job-prod"}})));
        let (_tx, shutdown) = Shutdown::channel();

        let result = poller(api, shutdown).poll_once("job-prod", "spark").await.unwrap();
        assert_eq!(result, PollResult::Continue);
    }

    #[tokio::test]
    async fn test_poll_once_running_streams_driver_log() {
        let mut api = MockSparkApplicationApi::new();
        api.expect_get().returning(|_, _| {
            Ok(json!({
                "status": {
                    "applicationState": {"state": "RUNNING"},
                    "driverInfo": {"podName": "job-prod-driver"}
                }
            }))
        });
        api.expect_driver_log_tail()
            .with(
                eq("spark"),
                eq("job-prod-driver"),
                eq("spark-kubernetes-driver"),
                eq(20),
            )
            .times(1)
            .returning(|_, _, _, _| Ok(vec!["Stage 3 finished".to_string()]));
        let (_tx, shutdown) = Shutdown::channel();

        let result = poller(api, shutdown).poll_once("job-prod", "spark").await.unwrap();
        assert_eq!(result, PollResult::Continue);
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_until_terminal_after_pending() {
        let mut api = MockSparkApplicationApi::new();
        let mut seq = Sequence::new();
        api.expect_get()
            .times(3)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(with_state("SUBMITTED")));
        api.expect_get()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(with_state("COMPLETED")));
        let (_tx, shutdown) = Shutdown::channel();

        let result = poller(api, shutdown)
            .poll_until_terminal("job-prod", "spark")
            .await
            .unwrap();
        assert_eq!(result, TerminalState::Succeeded);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_errors_tolerated() {
        let mut api = MockSparkApplicationApi::new();
        let mut seq = Sequence::new();
        api.expect_get()
            .times(2)
            .in_sequence(&mut seq)
            .returning(|_, _| {
                Err(ClusterApiError::LogStream(std::io::Error::other("connection reset")))
            });
        api.expect_get()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(with_state("UNKNOWN")));
        let (_tx, shutdown) = Shutdown::channel();

        let result = poller(api, shutdown)
            .poll_until_terminal("job-prod", "spark")
            .await
            .unwrap();
        assert_eq!(
            result,
            TerminalState::Failed {
                state: "UNKNOWN".to_string()
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_too_many_errors() {
        let mut api = MockSparkApplicationApi::new();
        api.expect_get().times(3).returning(|_, _| {
            Err(ClusterApiError::LogStream(std::io::Error::other("connection reset")))
        });
        let (_tx, shutdown) = Shutdown::channel();

        let err = poller(api, shutdown)
            .poll_until_terminal("job-prod", "spark")
            .await
            .unwrap_err();
        assert!(matches!(err, SparkOperatorError::KubeClient(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_max_wait_exceeded() {
        let mut api = MockSparkApplicationApi::new();
        api.expect_get().returning(|_, _| Ok(with_state("SUBMITTED")));
        let (_tx, shutdown) = Shutdown::channel();
        let mut poller = poller(api, shutdown);
        poller.polling.max_wait = Some(Duration::from_secs(10));

        let err = poller
            .poll_until_terminal("job-prod", "spark")
            .await
            .unwrap_err();
        assert!(matches!(err, SparkOperatorError::PollTimeout { waited_secs, .. } if waited_secs >= 10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_by_shutdown() {
        let mut api = MockSparkApplicationApi::new();
        api.expect_get().returning(|_, _| Ok(with_state("RUNNING")));
        let (tx, shutdown) = Shutdown::channel();
        let poller = poller(api, shutdown);

        let handle = tokio::spawn(async move { poller.poll_until_terminal("job-prod", "spark").await });
        tokio::time::sleep(Duration::from_secs(5)).await;
        tx.send(Some("SIGINT")).unwrap();

        let err = handle.await.unwrap().unwrap_err();
        assert!(matches!(err, SparkOperatorError::Cancelled { signal: "SIGINT", .. }));
    }
}
