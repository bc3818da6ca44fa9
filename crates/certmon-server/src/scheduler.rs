use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::task::JoinHandle;

/// A unit of periodic work driven by a [`LoopScheduler`].
#[async_trait]
pub trait LoopTask: Send + Sync + 'static {
    async fn run(&self) -> anyhow::Result<()>;
}

type StartHook = Arc<dyn Fn() + Send + Sync>;
type FinishHook = Arc<dyn Fn(Duration) + Send + Sync>;
type FailHook = Arc<dyn Fn(&anyhow::Error) + Send + Sync>;

/// What a single [`LoopScheduler::run_once`] call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Finished,
    Failed,
    /// The previous run was still in progress.
    Skipped,
}

struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Runs a task immediately and then `interval` after each completion.
///
/// Runs never overlap. Errors and panics are handed to the failure hook and
/// the loop keeps going.
#[derive(Clone)]
pub struct LoopScheduler {
    name: String,
    interval: Duration,
    task: Arc<dyn LoopTask>,
    running: Arc<AtomicBool>,
    on_start: Option<StartHook>,
    on_finish: Option<FinishHook>,
    on_fail: Option<FailHook>,
}

impl LoopScheduler {
    pub fn new(name: impl Into<String>, interval: Duration, task: Arc<dyn LoopTask>) -> Self {
        Self {
            name: name.into(),
            interval,
            task,
            running: Arc::new(AtomicBool::new(false)),
            on_start: None,
            on_finish: None,
            on_fail: None,
        }
    }

    pub fn on_start(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_start = Some(Arc::new(hook));
        self
    }

    /// Called with the run's wall time after each successful run.
    pub fn on_finish(mut self, hook: impl Fn(Duration) + Send + Sync + 'static) -> Self {
        self.on_finish = Some(Arc::new(hook));
        self
    }

    pub fn on_fail(mut self, hook: impl Fn(&anyhow::Error) + Send + Sync + 'static) -> Self {
        self.on_fail = Some(Arc::new(hook));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Performs one run unless another is still in progress.
    pub async fn run_once(&self) -> RunOutcome {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::debug!(task = %self.name, "Previous run still in progress, skipping");
            return RunOutcome::Skipped;
        }
        let _guard = RunningGuard(&self.running);

        if let Some(hook) = &self.on_start {
            hook();
        }
        let started = Instant::now();

        // Spawned so that a panic surfaces as a JoinError.
        let task = self.task.clone();
        let result = match tokio::spawn(async move { task.run().await }).await {
            Ok(result) => result,
            Err(e) => Err(anyhow::anyhow!("{} task panicked: {e}", self.name)),
        };

        match result {
            Ok(()) => {
                if let Some(hook) = &self.on_finish {
                    hook(started.elapsed());
                }
                RunOutcome::Finished
            }
            Err(e) => {
                match &self.on_fail {
                    Some(hook) => hook(&e),
                    None => tracing::error!(task = %self.name, error = %format!("{e:#}"), "Loop task failed"),
                }
                RunOutcome::Failed
            }
        }
    }

    /// Starts the loop on the runtime. Abort the handle to stop it.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            tracing::info!(task = %self.name, interval_secs = self.interval.as_secs(), "Loop started");
            loop {
                self.run_once().await;
                tokio::time::sleep(self.interval).await;
            }
        })
    }
}
