//! Loop conditions controlling how often a container repeats

use crate::astro::{self, Coordinates};
use crate::context::ExecutionContext;
use crate::item::SequenceItem;
use crate::mediator::Equipment;
use crate::{new_id, ItemId};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};

/// A predicate deciding whether a container keeps iterating
///
/// `check` runs before every iteration and after every child. The lifecycle
/// hooks are the only places a condition updates its own progress.
pub trait SequenceCondition: Send + Sync {
    fn id(&self) -> &str;

    fn name(&self) -> &str;

    /// True while the container should keep going
    fn check(
        &self,
        previous: Option<&dyn SequenceItem>,
        next: Option<&dyn SequenceItem>,
        ctx: &ExecutionContext,
    ) -> bool;

    fn initialize(&mut self, _ctx: &ExecutionContext) {}

    fn sequence_block_started(&mut self, _ctx: &ExecutionContext) {}

    fn sequence_block_finished(&mut self, _ctx: &ExecutionContext) {}

    fn reset_progress(&mut self) {}

    /// `(iterations, completed)` for conditions with a fixed iteration count
    fn loop_bounds(&self) -> Option<(u32, u32)> {
        None
    }

    fn validate(&self, _equipment: &Equipment) -> Vec<String> {
        Vec::new()
    }

    fn to_definition(&self) -> ConditionDefinition;
}

/// Persisted form of a condition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "$type")]
pub enum ConditionDefinition {
    Loop(LoopConfig),
    TimeSpan(TimeSpanConfig),
    Time(TimeConfig),
    Altitude(AltitudeConfig),
}

impl ConditionDefinition {
    pub fn build(&self) -> Box<dyn SequenceCondition> {
        match self {
            ConditionDefinition::Loop(c) => {
                Box::new(LoopCondition::with_progress(c.iterations, c.completed_iterations))
            }
            ConditionDefinition::TimeSpan(c) => Box::new(TimeSpanCondition::new(c.seconds)),
            ConditionDefinition::Time(c) => Box::new(TimeCondition::new(c.until)),
            ConditionDefinition::Altitude(c) => {
                Box::new(AltitudeCondition::new(c.min_altitude, c.coordinates))
            }
        }
    }
}

// =========================================================================
// LOOP
// =========================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoopConfig {
    pub iterations: u32,
    pub completed_iterations: u32,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            iterations: 1,
            completed_iterations: 0,
        }
    }
}

/// Repeat a fixed number of times
#[derive(Debug, Clone)]
pub struct LoopCondition {
    id: ItemId,
    pub iterations: u32,
    pub completed_iterations: u32,
}

impl LoopCondition {
    pub fn new(iterations: u32) -> Self {
        Self::with_progress(iterations, 0)
    }

    pub fn with_progress(iterations: u32, completed_iterations: u32) -> Self {
        Self {
            id: new_id(),
            iterations,
            completed_iterations,
        }
    }
}

impl SequenceCondition for LoopCondition {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        "Loop For Iterations"
    }

    fn check(
        &self,
        _previous: Option<&dyn SequenceItem>,
        _next: Option<&dyn SequenceItem>,
        _ctx: &ExecutionContext,
    ) -> bool {
        self.completed_iterations < self.iterations
    }

    fn sequence_block_finished(&mut self, _ctx: &ExecutionContext) {
        self.completed_iterations = self.completed_iterations.saturating_add(1);
    }

    fn reset_progress(&mut self) {
        self.completed_iterations = 0;
    }

    fn loop_bounds(&self) -> Option<(u32, u32)> {
        Some((self.iterations, self.completed_iterations))
    }

    fn to_definition(&self) -> ConditionDefinition {
        ConditionDefinition::Loop(LoopConfig {
            iterations: self.iterations,
            completed_iterations: self.completed_iterations,
        })
    }
}

fn next_item_fits(next: Option<&dyn SequenceItem>, deadline: DateTime<Utc>) -> bool {
    let needed = next.map_or(Ok(ChronoDuration::zero()), |item| {
        ChronoDuration::from_std(item.estimated_duration())
    });
    // an estimate too large for chrono never fits
    needed
        .ok()
        .and_then(|needed| Utc::now().checked_add_signed(needed))
        .map_or(false, |finish| finish < deadline)
}

// =========================================================================
// TIME SPAN
// =========================================================================

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeSpanConfig {
    pub seconds: u64,
}

/// Loop for a fixed span, counted from the first block start
#[derive(Debug, Clone)]
pub struct TimeSpanCondition {
    id: ItemId,
    pub seconds: u64,
    started_at: Option<DateTime<Utc>>,
}

impl TimeSpanCondition {
    pub fn new(seconds: u64) -> Self {
        Self {
            id: new_id(),
            seconds,
            started_at: None,
        }
    }

    fn deadline(&self) -> Option<DateTime<Utc>> {
        let seconds = i64::try_from(self.seconds)
            .unwrap_or(i64::MAX)
            .min(i64::MAX / 1000);
        let span = ChronoDuration::seconds(seconds);
        self.started_at
            .map(|start| start.checked_add_signed(span).unwrap_or(DateTime::<Utc>::MAX_UTC))
    }
}

impl SequenceCondition for TimeSpanCondition {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        "Loop For Time Span"
    }

    fn check(
        &self,
        _previous: Option<&dyn SequenceItem>,
        next: Option<&dyn SequenceItem>,
        _ctx: &ExecutionContext,
    ) -> bool {
        match self.deadline() {
            Some(deadline) => next_item_fits(next, deadline),
            None => self.seconds > 0,
        }
    }

    fn initialize(&mut self, _ctx: &ExecutionContext) {
        if self.started_at.is_none() {
            self.started_at = Some(Utc::now());
        }
    }

    fn reset_progress(&mut self) {
        self.started_at = None;
    }

    fn to_definition(&self) -> ConditionDefinition {
        ConditionDefinition::TimeSpan(TimeSpanConfig {
            seconds: self.seconds,
        })
    }
}

// =========================================================================
// TIME
// =========================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeConfig {
    pub until: DateTime<Utc>,
}

/// Loop until a wall clock time
#[derive(Debug, Clone)]
pub struct TimeCondition {
    id: ItemId,
    pub until: DateTime<Utc>,
}

impl TimeCondition {
    pub fn new(until: DateTime<Utc>) -> Self {
        Self { id: new_id(), until }
    }
}

impl SequenceCondition for TimeCondition {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        "Loop Until Time"
    }

    fn check(
        &self,
        _previous: Option<&dyn SequenceItem>,
        next: Option<&dyn SequenceItem>,
        _ctx: &ExecutionContext,
    ) -> bool {
        next_item_fits(next, self.until)
    }

    fn to_definition(&self) -> ConditionDefinition {
        ConditionDefinition::Time(TimeConfig { until: self.until })
    }
}

// =========================================================================
// ALTITUDE
// =========================================================================

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AltitudeConfig {
    pub min_altitude: f64,
    /// Fixed coordinates; the enclosing target is used when absent
    pub coordinates: Option<Coordinates>,
}

/// Loop while the target stays above an altitude
#[derive(Debug, Clone)]
pub struct AltitudeCondition {
    id: ItemId,
    pub min_altitude: f64,
    pub coordinates: Option<Coordinates>,
}

impl AltitudeCondition {
    pub fn new(min_altitude: f64, coordinates: Option<Coordinates>) -> Self {
        Self {
            id: new_id(),
            min_altitude,
            coordinates,
        }
    }

    /// Current altitude of the tracked coordinates, if it can be computed
    pub fn current_altitude(&self, ctx: &ExecutionContext) -> Option<f64> {
        let coordinates = self
            .coordinates
            .or_else(|| ctx.target.as_ref().map(|t| t.coordinates))?;
        let observer = ctx.observer?;
        Some(astro::to_horizontal(&coordinates, &observer, &Utc::now()).altitude)
    }
}

impl SequenceCondition for AltitudeCondition {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        "Loop While Above Altitude"
    }

    fn check(
        &self,
        _previous: Option<&dyn SequenceItem>,
        _next: Option<&dyn SequenceItem>,
        ctx: &ExecutionContext,
    ) -> bool {
        match self.current_altitude(ctx) {
            Some(altitude) => altitude >= self.min_altitude,
            None => {
                tracing::warn!("Altitude condition has no target or observer location");
                false
            }
        }
    }

    fn validate(&self, _equipment: &Equipment) -> Vec<String> {
        if (-90.0..=90.0).contains(&self.min_altitude) {
            Vec::new()
        } else {
            vec![format!("Minimum altitude {} is out of range", self.min_altitude)]
        }
    }

    fn to_definition(&self) -> ConditionDefinition {
        ConditionDefinition::Altitude(AltitudeConfig {
            min_altitude: self.min_altitude,
            coordinates: self.coordinates,
        })
    }
}
