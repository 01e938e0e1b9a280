//! Sequence execution engine

use crate::astro::ObserverLocation;
use crate::cancellation::CancellationFlag;
use crate::container::{walk, SequenceContainer};
use crate::context::{ExecutionContext, ProgressSink};
use crate::definition::SequenceFile;
use crate::error::SequenceError;
use crate::item::{run, SequenceItem};
use crate::mediator::Equipment;
use crate::{ApplicationStatus, EstimationMode, ItemId, ItemStatus};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Arc, RwLock as StdRwLock};
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// State of the sequence executor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutorState {
    Idle,
    Running,
    Completed,
    Stopped,
    Failed,
}

/// Outcome of one run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub finished: u32,
    pub failed: u32,
    pub skipped: u32,
    /// Items left in `Created`, e.g. after a stop
    pub pending: u32,
    pub exposures_completed: u32,
    pub integration_secs: f64,
    pub elapsed: Duration,
    /// An item failed with `AbortOnError`
    pub aborted: bool,
    pub cancelled: bool,
}

/// Event emitted by the executor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ExecutorEvent {
    StateChanged(ExecutorState),
    ItemStarted {
        id: ItemId,
        name: String,
    },
    ItemCompleted {
        id: ItemId,
        name: String,
        status: ItemStatus,
    },
    Progress(ApplicationStatus),
    TriggerFired {
        trigger_id: ItemId,
        trigger_name: String,
        /// Item the trigger ran ahead of, if any
        before: Option<String>,
    },
    SequenceCompleted(RunSummary),
    SequenceFailed {
        error: String,
    },
}

type RunOutcome = (SequenceContainer, RunSummary);

/// Owns a sequence tree and runs it on the tokio runtime
pub struct SequenceExecutor {
    equipment: Equipment,
    observer: Option<ObserverLocation>,
    progress: Option<ProgressSink>,
    root: Option<SequenceContainer>,
    state: Arc<StdRwLock<ExecutorState>>,
    event_tx: broadcast::Sender<ExecutorEvent>,
    cancel: CancellationFlag,
    task: Option<JoinHandle<RunOutcome>>,
}

impl SequenceExecutor {
    pub fn new(equipment: Equipment) -> Self {
        let (event_tx, _) = broadcast::channel(256);
        Self {
            equipment,
            observer: None,
            progress: None,
            root: None,
            state: Arc::new(StdRwLock::new(ExecutorState::Idle)),
            event_tx,
            cancel: CancellationFlag::new(),
            task: None,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ExecutorEvent> {
        self.event_tx.subscribe()
    }

    pub fn set_observer(&mut self, observer: Option<ObserverLocation>) {
        self.observer = observer;
    }

    /// Forward item progress to the host in addition to the event stream
    pub fn set_progress_sink(&mut self, sink: ProgressSink) {
        self.progress = Some(sink);
    }

    pub fn state(&self) -> ExecutorState {
        read_state(&self.state)
    }

    pub fn is_running(&self) -> bool {
        self.task.is_some()
    }

    /// Replace the loaded sequence
    pub fn load(&mut self, root: SequenceContainer) -> Result<(), SequenceError> {
        if self.is_running() {
            return Err(SequenceError::Executor(
                "cannot load while a sequence is running".to_string(),
            ));
        }
        tracing::info!("Loaded sequence: {}", root.name());
        self.root = Some(root);
        set_state(&self.state, &self.event_tx, ExecutorState::Idle);
        Ok(())
    }

    pub fn load_file(&mut self, path: impl AsRef<Path>) -> Result<(), SequenceError> {
        let root = SequenceFile::load(path)?.build_container()?;
        self.load(root)
    }

    /// The loaded tree; `None` while it is running
    pub fn sequence(&self) -> Option<&SequenceContainer> {
        self.root.as_ref()
    }

    pub fn sequence_mut(&mut self) -> Option<&mut SequenceContainer> {
        self.root.as_mut()
    }

    /// Validate the whole tree against current equipment, collecting issues
    pub fn validate(&mut self) -> Vec<String> {
        let Some(root) = self.root.as_mut() else {
            return vec!["No sequence loaded".to_string()];
        };
        root.validate(&self.equipment);

        let mut issues = Vec::new();
        walk(&*root, &mut |item| {
            if item.status() == ItemStatus::Disabled {
                return;
            }
            for issue in item.issues() {
                issues.push(format!("{}: {}", item.name(), issue));
            }
        });
        issues
    }

    pub fn estimated_remaining(&self, mode: EstimationMode) -> Duration {
        self.root
            .as_ref()
            .map(|root| root.calculate_estimated_runtime(mode))
            .unwrap_or_default()
    }

    /// Start the loaded sequence in a background task
    pub fn start(&mut self) -> Result<(), SequenceError> {
        if self.is_running() {
            return Err(SequenceError::Executor("sequence already running".to_string()));
        }
        let mut root = self
            .root
            .take()
            .ok_or_else(|| SequenceError::Executor("no sequence loaded".to_string()))?;

        self.cancel.reset();
        root.clear_interrupts();

        let event_tx = self.event_tx.clone();
        let forward_tx = self.event_tx.clone();
        let host_sink = self.progress.clone();
        let sink: ProgressSink = Arc::new(move |status: ApplicationStatus| {
            if let Some(host) = &host_sink {
                host(status.clone());
            }
            let _ = forward_tx.send(ExecutorEvent::Progress(status));
        });

        let mut ctx = ExecutionContext::new(self.equipment.clone())
            .with_cancellation(self.cancel.clone())
            .with_observer(self.observer)
            .with_progress(sink)
            .with_events(self.event_tx.clone());
        let state = self.state.clone();

        set_state(&state, &event_tx, ExecutorState::Running);
        tracing::info!("Starting sequence: {}", root.name());

        self.task = Some(tokio::spawn(async move {
            let started = Instant::now();
            let result = run(&mut root, &mut ctx).await;

            let mut summary = summarize(&root, &ctx);
            summary.elapsed = started.elapsed();

            let final_state = match &result {
                Err(SequenceError::Cancelled) => {
                    summary.cancelled = true;
                    tracing::info!("Sequence stopped");
                    ExecutorState::Stopped
                }
                Err(e) => {
                    tracing::error!("Sequence failed: {}", e);
                    let _ = event_tx.send(ExecutorEvent::SequenceFailed {
                        error: e.to_string(),
                    });
                    ExecutorState::Failed
                }
                Ok(()) if summary.aborted => {
                    tracing::warn!("Sequence aborted after an item failure");
                    let _ = event_tx.send(ExecutorEvent::SequenceFailed {
                        error: "sequence aborted after an item failure".to_string(),
                    });
                    ExecutorState::Failed
                }
                Ok(()) => {
                    tracing::info!(
                        "Sequence completed in {:.1}s: {} finished, {} failed, {} skipped",
                        summary.elapsed.as_secs_f64(),
                        summary.finished,
                        summary.failed,
                        summary.skipped
                    );
                    let _ = event_tx.send(ExecutorEvent::SequenceCompleted(summary.clone()));
                    ExecutorState::Completed
                }
            };
            set_state(&state, &event_tx, final_state);
            (root, summary)
        }));
        Ok(())
    }

    /// Request a cooperative stop; running items return to `Created`
    pub fn stop(&self) {
        if self.is_running() {
            tracing::info!("Stopping sequence");
            self.cancel.cancel();
        }
    }

    /// Flag shared with the running tree; cancelling it is the same as [`stop`](Self::stop)
    pub fn cancellation(&self) -> CancellationFlag {
        self.cancel.clone()
    }

    /// Wait for the running sequence and take the tree back
    pub async fn wait(&mut self) -> Result<RunSummary, SequenceError> {
        let task = self
            .task
            .take()
            .ok_or_else(|| SequenceError::Executor("no sequence running".to_string()))?;
        match task.await {
            Ok((root, summary)) => {
                self.root = Some(root);
                Ok(summary)
            }
            Err(e) => {
                set_state(&self.state, &self.event_tx, ExecutorState::Failed);
                Err(SequenceError::Executor(format!("sequence task failed: {}", e)))
            }
        }
    }

    pub async fn run_to_completion(&mut self) -> Result<RunSummary, SequenceError> {
        self.start()?;
        self.wait().await
    }

    /// Put every item back to `Created` so the sequence can run again
    pub fn reset_progress(&mut self) -> Result<(), SequenceError> {
        let root = self
            .root
            .as_mut()
            .ok_or_else(|| SequenceError::Executor("no sequence loaded".to_string()))?;
        root.reset_progress();
        set_state(&self.state, &self.event_tx, ExecutorState::Idle);
        Ok(())
    }
}

fn read_state(state: &StdRwLock<ExecutorState>) -> ExecutorState {
    match state.read() {
        Ok(guard) => *guard,
        Err(poisoned) => *poisoned.into_inner(),
    }
}

fn set_state(
    state: &StdRwLock<ExecutorState>,
    events: &broadcast::Sender<ExecutorEvent>,
    next: ExecutorState,
) {
    match state.write() {
        Ok(mut guard) => *guard = next,
        Err(poisoned) => *poisoned.into_inner() = next,
    }
    let _ = events.send(ExecutorEvent::StateChanged(next));
}

fn summarize(root: &SequenceContainer, ctx: &ExecutionContext) -> RunSummary {
    let mut summary = RunSummary::default();
    walk(root, &mut |item| {
        if item.as_container().is_some() {
            return;
        }
        match item.status() {
            ItemStatus::Finished => summary.finished += 1,
            ItemStatus::Failed => summary.failed += 1,
            ItemStatus::Skipped => summary.skipped += 1,
            ItemStatus::Created | ItemStatus::Running => summary.pending += 1,
            ItemStatus::Disabled => {}
        }
    });
    summary.aborted = root
        .interrupt_handle()
        .map_or(false, |handle| handle.is_interrupted());
    let (exposures, integration) = ctx.run_state(|s| (s.exposures_completed, s.integration_secs));
    summary.exposures_completed = exposures;
    summary.integration_secs = integration;
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instructions::camera::{ExposureConfig, TakeExposure};
    use crate::instructions::utility::{WaitForTimeSpan, WaitForTimeSpanConfig};
    use crate::simulator::SimulatedEquipment;
    use crate::ItemSettings;

    fn exposures(count: usize) -> SequenceContainer {
        let mut root = SequenceContainer::new_root("Test");
        if let Some(area) = root.target_area_mut() {
            for _ in 0..count {
                area.add(Box::new(TakeExposure::new(
                    ItemSettings::default(),
                    ExposureConfig {
                        exposure_time: 10.0,
                        ..Default::default()
                    },
                )));
            }
        }
        root
    }

    #[tokio::test]
    async fn test_run_to_completion_reports_summary() {
        let sim = SimulatedEquipment::default();
        let mut executor = SequenceExecutor::new(sim.equipment());
        let mut events = executor.subscribe();
        executor.load(exposures(3)).unwrap();

        let summary = executor.run_to_completion().await.unwrap();
        assert_eq!(summary.finished, 3);
        assert_eq!(summary.exposures_completed, 3);
        assert_eq!(summary.integration_secs, 30.0);
        assert!(!summary.cancelled);
        assert_eq!(executor.state(), ExecutorState::Completed);

        let mut saw_running = false;
        let mut saw_completed = false;
        while let Ok(event) = events.try_recv() {
            match event {
                ExecutorEvent::StateChanged(ExecutorState::Running) => saw_running = true,
                ExecutorEvent::SequenceCompleted(s) => saw_completed = s.finished == 3,
                _ => {}
            }
        }
        assert!(saw_running);
        assert!(saw_completed);
    }

    #[tokio::test]
    async fn test_stop_cancels_and_returns_tree() {
        let sim = SimulatedEquipment::default();
        let mut executor = SequenceExecutor::new(sim.equipment());
        let mut root = SequenceContainer::new_root("Waiting");
        if let Some(area) = root.target_area_mut() {
            area.add(Box::new(WaitForTimeSpan::new(
                ItemSettings::default(),
                WaitForTimeSpanConfig { seconds: 600.0 },
            )));
        }
        executor.load(root).unwrap();
        executor.start().unwrap();
        assert!(executor.start().is_err());

        tokio::time::sleep(Duration::from_millis(50)).await;
        executor.stop();
        let summary = executor.wait().await.unwrap();

        assert!(summary.cancelled);
        assert_eq!(summary.pending, 1);
        assert_eq!(executor.state(), ExecutorState::Stopped);
        assert!(executor.sequence().is_some());
    }

    #[tokio::test]
    async fn test_reset_allows_second_run() {
        let sim = SimulatedEquipment::default();
        let mut executor = SequenceExecutor::new(sim.equipment());
        executor.load(exposures(1)).unwrap();
        executor.run_to_completion().await.unwrap();

        // finished items are not run again until reset
        let again = executor.run_to_completion().await.unwrap();
        assert_eq!(sim.camera.capture_count(), 1);
        assert_eq!(again.finished, 1);

        executor.reset_progress().unwrap();
        executor.run_to_completion().await.unwrap();
        assert_eq!(sim.camera.capture_count(), 2);
    }

    #[tokio::test]
    async fn test_validate_collects_issues() {
        let sim = SimulatedEquipment::default();
        sim.disconnect_all();
        let mut executor = SequenceExecutor::new(sim.equipment());
        executor.load(exposures(2)).unwrap();
        let issues = executor.validate();
        assert_eq!(issues.len(), 2);
        assert!(issues[0].contains("Camera is not connected"));
    }

    #[test]
    fn test_start_without_sequence_fails() {
        let sim = SimulatedEquipment::default();
        let mut executor = SequenceExecutor::new(sim.equipment());
        assert!(executor.start().is_err());
        assert_eq!(executor.state(), ExecutorState::Idle);
    }
}
