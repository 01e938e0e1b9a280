//! N.I.N.A. style imaging sequencer engine
//!
//! A sequence is a tree of [`SequenceItem`]s. Containers hold ordered children,
//! loop [`conditions`] and corrective [`triggers`]; leaf [`instructions`] drive
//! equipment exclusively through the [`mediator`] traits. The [`executor`]
//! runs a tree on the tokio runtime and broadcasts progress events.

pub mod astro;
pub mod cancellation;
pub mod conditions;
pub mod container;
pub mod context;
pub mod definition;
pub mod error;
pub mod executor;
pub mod instructions;
pub mod item;
pub mod mediator;
pub mod simulator;
pub mod triggers;

use serde::{Deserialize, Serialize};
use std::time::Duration;

pub use cancellation::CancellationFlag;
pub use conditions::SequenceCondition;
pub use container::{ContainerKind, ExecutionStrategy, SequenceContainer};
pub use context::{ExecutionContext, ParentContext, RunState, Target};
pub use definition::{build_item, ItemDefinition, ItemKind, SequenceFile};
pub use error::{EquipmentError, SequenceError};
pub use executor::{ExecutorEvent, ExecutorState, RunSummary, SequenceExecutor};
pub use item::{run, ItemCore, SequenceItem};
pub use mediator::Equipment;
pub use triggers::SequenceTrigger;

/// Unique identifier for items, conditions and triggers
pub type ItemId = String;

/// Generate a fresh identifier
pub fn new_id() -> ItemId {
    uuid::Uuid::new_v4().to_string()
}

/// Longest wait or exposure a single instruction accepts, in seconds (one week)
pub const MAX_INSTRUCTION_SECS: f64 = 7.0 * 24.0 * 3600.0;

/// Seconds from a sequence file as a `Duration`
///
/// NaN and non-positive values give zero. Values past the representable
/// range saturate at `Duration::MAX` instead of panicking.
pub fn duration_from_secs(seconds: f64) -> Duration {
    if seconds.is_nan() || seconds <= 0.0 {
        return Duration::ZERO;
    }
    Duration::try_from_secs_f64(seconds).unwrap_or(Duration::MAX)
}

/// Lifecycle state of a sequence item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ItemStatus {
    /// Not yet run (or reset / cancelled)
    Created,
    Running,
    Finished,
    Failed,
    Skipped,
    /// Excluded from execution by the user
    Disabled,
}

impl ItemStatus {
    /// True for the states an item ends a run in
    pub fn is_terminal(&self) -> bool {
        matches!(self, ItemStatus::Finished | ItemStatus::Failed | ItemStatus::Skipped)
    }
}

impl std::fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ItemStatus::Created => "CREATED",
            ItemStatus::Running => "RUNNING",
            ItemStatus::Finished => "FINISHED",
            ItemStatus::Failed => "FAILED",
            ItemStatus::Skipped => "SKIPPED",
            ItemStatus::Disabled => "DISABLED",
        };
        f.write_str(s)
    }
}

/// What happens to the surrounding sequence once an item has failed for good
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ErrorBehavior {
    /// Record the failure and carry on with the next item
    #[default]
    ContinueOnError,
    /// Stop the whole sequence
    AbortOnError,
    /// Stop the remaining items of the immediate parent container
    SkipInstructionSetOnError,
    /// Skip ahead to the end-of-sequence instructions
    SkipToSequenceEndInstructions,
}

/// How remaining runtime is estimated for looping containers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum EstimationMode {
    /// Children run to completion one after another
    #[default]
    Standard,
    /// Children are visited round-robin, one iteration each per pass
    Rotate,
}

/// Persisted properties common to every item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ItemSettings {
    pub name: String,
    pub category: String,
    pub description: String,
    pub icon: String,
    /// Number of retries after the first failed execution
    pub attempts: u32,
    pub error_behavior: ErrorBehavior,
    pub enabled: bool,
}

impl Default for ItemSettings {
    fn default() -> Self {
        Self {
            name: String::new(),
            category: String::new(),
            description: String::new(),
            icon: String::new(),
            attempts: 0,
            error_behavior: ErrorBehavior::ContinueOnError,
            enabled: true,
        }
    }
}

impl ItemSettings {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }

    pub fn with_error_behavior(mut self, behavior: ErrorBehavior) -> Self {
        self.error_behavior = behavior;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

/// Progress report pushed to the host while items run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationStatus {
    pub source: String,
    pub status: String,
    pub progress: Option<f64>,
    pub max_progress: Option<f64>,
}

impl ApplicationStatus {
    pub fn new(source: impl Into<String>, status: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            status: status.into(),
            progress: None,
            max_progress: None,
        }
    }

    pub fn with_progress(mut self, progress: f64, max_progress: f64) -> Self {
        self.progress = Some(progress);
        self.max_progress = Some(max_progress);
        self
    }
}
