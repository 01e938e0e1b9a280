//! Execution context passed down the item tree during a run

use crate::astro::{Coordinates, ObserverLocation};
use crate::cancellation::CancellationFlag;
use crate::error::SequenceError;
use crate::executor::ExecutorEvent;
use crate::mediator::Equipment;
use crate::{ApplicationStatus, ItemId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, RwLock as StdRwLock};
use tokio::sync::broadcast;

/// Deep sky target attached to a DSO container
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Target {
    pub name: String,
    pub coordinates: Coordinates,
    /// Position angle in degrees
    #[serde(default)]
    pub rotation: f64,
}

/// What a container hands to a child when it is attached
#[derive(Debug, Clone, PartialEq)]
pub struct ParentContext {
    pub container_id: ItemId,
    /// Target inherited from the nearest DSO container
    pub target: Option<Target>,
}

/// Interrupt request shared between a container and the running tree
///
/// Containers check their handle (and their ancestors') between children and
/// stop early once it is set. The counter records how many interrupts were
/// requested, so callers can tell which containers were targeted.
#[derive(Debug, Clone, Default)]
pub struct InterruptHandle {
    flag: Arc<AtomicBool>,
    count: Arc<AtomicU32>,
}

impl InterruptHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn interrupt(&self) {
        self.count.fetch_add(1, Ordering::SeqCst);
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_interrupted(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    pub fn interrupt_count(&self) -> u32 {
        self.count.load(Ordering::SeqCst)
    }

    /// Clear the pending interrupt; the count is kept
    pub fn clear(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }

    pub fn same_as(&self, other: &InterruptHandle) -> bool {
        Arc::ptr_eq(&self.flag, &other.flag)
    }
}

/// Where in the tree the currently running item sits
#[derive(Debug, Clone, Default)]
pub struct ExecutionScope {
    /// Interrupt handles of the enclosing containers, outermost first
    ancestors: Vec<InterruptHandle>,
    /// Handles of the root's direct children (`None` for leaf children)
    top_level: Vec<Option<InterruptHandle>>,
    /// Index of the end-of-sequence container among the root's children
    end_index: Option<usize>,
    /// Index of the top-level child currently running
    top_level_index: Option<usize>,
}

impl ExecutionScope {
    /// Scope for the children of a container
    pub fn enter(&self, handle: InterruptHandle) -> Self {
        let mut scope = self.clone();
        scope.ancestors.push(handle);
        scope
    }

    /// Scope for the children of the root container
    pub fn enter_root(
        &self,
        handle: InterruptHandle,
        top_level: Vec<Option<InterruptHandle>>,
        end_index: Option<usize>,
    ) -> Self {
        let mut scope = self.enter(handle);
        scope.top_level = top_level;
        scope.end_index = end_index;
        scope.top_level_index = None;
        scope
    }

    /// Record which root child is about to run
    pub fn set_top_level_index(&mut self, index: usize) {
        if self.ancestors.len() == 1 && !self.top_level.is_empty() {
            self.top_level_index = Some(index);
        }
    }

    pub fn root(&self) -> Option<&InterruptHandle> {
        self.ancestors.first()
    }

    pub fn parent(&self) -> Option<&InterruptHandle> {
        self.ancestors.last()
    }

    /// True when this container or any enclosing one has been interrupted
    pub fn is_interrupted(&self) -> bool {
        self.ancestors.iter().any(InterruptHandle::is_interrupted)
    }

    /// Handles to interrupt for a skip to the end-of-sequence container
    ///
    /// Covers the top-level containers from the current one up to (not
    /// including) the end container. Returns `None` when there is no root
    /// area layout to skip within.
    pub fn skip_to_end_targets(&self) -> Option<Vec<InterruptHandle>> {
        let current = self.top_level_index?;
        let end = self.end_index.unwrap_or(self.top_level.len());
        if current >= end {
            return Some(Vec::new());
        }
        Some(
            self.top_level[current..end]
                .iter()
                .flatten()
                .cloned()
                .collect(),
        )
    }
}

/// Result of the last autofocus run, kept for the autofocus triggers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutofocusRecord {
    pub completed_at: DateTime<Utc>,
    pub filter: Option<String>,
    pub temperature: Option<f64>,
    pub position: i32,
}

/// Per-run temperature compensation history
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TemperatureCompensationState {
    pub last_temperature: Option<f64>,
    /// Fractional steps carried over from the last relative move
    pub last_roundoff: f64,
}

/// History shared by items and triggers for the duration of one run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunState {
    pub started_at: Option<DateTime<Utc>>,
    pub exposures_completed: u32,
    pub exposures_since_dither: u32,
    pub integration_secs: f64,
    pub last_autofocus: Option<AutofocusRecord>,
    pub temperature_compensation: TemperatureCompensationState,
}

/// Progress sink the host installs to receive [`ApplicationStatus`] updates
pub type ProgressSink = Arc<dyn Fn(ApplicationStatus) + Send + Sync>;

/// Context passed to items during execution
#[derive(Clone)]
pub struct ExecutionContext {
    pub equipment: Equipment,
    pub cancel: CancellationFlag,
    /// Target of the enclosing DSO container
    pub target: Option<Target>,
    pub observer: Option<ObserverLocation>,
    pub scope: ExecutionScope,
    run_state: Arc<StdRwLock<RunState>>,
    progress: Option<ProgressSink>,
    events: Option<broadcast::Sender<ExecutorEvent>>,
}

impl ExecutionContext {
    pub fn new(equipment: Equipment) -> Self {
        Self {
            equipment,
            cancel: CancellationFlag::new(),
            target: None,
            observer: None,
            scope: ExecutionScope::default(),
            run_state: Arc::new(StdRwLock::new(RunState {
                started_at: Some(Utc::now()),
                ..Default::default()
            })),
            progress: None,
            events: None,
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_observer(mut self, observer: Option<ObserverLocation>) -> Self {
        self.observer = observer;
        self
    }

    pub fn with_progress(mut self, sink: ProgressSink) -> Self {
        self.progress = Some(sink);
        self
    }

    pub fn with_events(mut self, events: broadcast::Sender<ExecutorEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn with_run_state(mut self, state: Arc<StdRwLock<RunState>>) -> Self {
        self.run_state = state;
        self
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Return `Err(Cancelled)` once cancellation was requested
    pub fn check_cancelled(&self) -> Result<(), SequenceError> {
        if self.cancel.is_cancelled() {
            Err(SequenceError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Read the run history
    pub fn run_state<R>(&self, f: impl FnOnce(&RunState) -> R) -> R {
        match self.run_state.read() {
            Ok(guard) => f(&guard),
            Err(poisoned) => f(&poisoned.into_inner()),
        }
    }

    /// Update the run history
    pub fn update_run_state<R>(&self, f: impl FnOnce(&mut RunState) -> R) -> R {
        match self.run_state.write() {
            Ok(mut guard) => f(&mut guard),
            Err(poisoned) => f(&mut poisoned.into_inner()),
        }
    }

    pub fn shared_run_state(&self) -> Arc<StdRwLock<RunState>> {
        self.run_state.clone()
    }

    pub fn report(&self, status: ApplicationStatus) {
        if let Some(sink) = &self.progress {
            sink(status);
        }
    }

    pub fn emit(&self, event: ExecutorEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event);
        }
    }
}
