//! Triggers: corrective actions evaluated between items
//!
//! A container asks each of its triggers `should_trigger(previous, next)`
//! before every child and once more after the last one. The check is a pure
//! read of equipment snapshots and run history; history itself is only
//! refreshed from `initialize`, `sequence_block_started` and the trigger's own
//! `execute`.

use crate::astro;
use crate::context::ExecutionContext;
use crate::error::SequenceError;
use crate::executor::ExecutorEvent;
use crate::instructions::focuser::perform_autofocus;
use crate::item::SequenceItem;
use crate::mediator::Equipment;
use crate::{new_id, ApplicationStatus, ItemId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[async_trait]
pub trait SequenceTrigger: Send + Sync {
    fn id(&self) -> &str;

    fn name(&self) -> &str;

    /// Side-effect free check run between two items
    fn should_trigger(
        &self,
        previous: Option<&dyn SequenceItem>,
        next: Option<&dyn SequenceItem>,
        ctx: &ExecutionContext,
    ) -> bool;

    /// Corrective action
    async fn execute(&mut self, ctx: &mut ExecutionContext) -> Result<(), SequenceError>;

    /// Called when the owning container starts running
    fn initialize(&mut self, _ctx: &ExecutionContext) {}

    /// Called at the start of every iteration of the owning container
    fn sequence_block_started(&mut self, _ctx: &ExecutionContext) {}

    fn reset_progress(&mut self) {}

    fn validate(&self, _equipment: &Equipment) -> Vec<String> {
        Vec::new()
    }

    fn to_definition(&self) -> TriggerDefinition;
}

/// Execute a trigger that reported it should fire
///
/// Trigger failures are logged and swallowed so the scheduled item still
/// runs; cancellation propagates.
pub async fn run_trigger(
    trigger: &mut dyn SequenceTrigger,
    before: Option<&str>,
    ctx: &mut ExecutionContext,
) -> Result<(), SequenceError> {
    tracing::info!(
        "Trigger fired: {} (before {})",
        trigger.name(),
        before.unwrap_or("end of block")
    );
    ctx.emit(ExecutorEvent::TriggerFired {
        trigger_id: trigger.id().to_string(),
        trigger_name: trigger.name().to_string(),
        before: before.map(str::to_string),
    });
    ctx.report(ApplicationStatus::new(trigger.name(), "Triggered"));

    match trigger.execute(ctx).await {
        Ok(()) => Ok(()),
        Err(SequenceError::Cancelled) => Err(SequenceError::Cancelled),
        Err(_) if ctx.is_cancelled() => Err(SequenceError::Cancelled),
        Err(e) => {
            tracing::warn!("Trigger {} failed: {}", trigger.name(), e);
            Ok(())
        }
    }
}

/// Persisted form of a trigger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "$type")]
pub enum TriggerDefinition {
    AutofocusAfterFilterChange,
    AutofocusAfterElapsedTime(ElapsedTimeConfig),
    AutofocusAfterTemperatureChange(TemperatureChangeConfig),
    DitherAfterExposures(DitherAfterExposuresConfig),
    SynchronizeDome(DomeSyncConfig),
}

impl TriggerDefinition {
    pub fn build(&self) -> Box<dyn SequenceTrigger> {
        match self {
            TriggerDefinition::AutofocusAfterFilterChange => {
                Box::new(AutofocusAfterFilterChange::new())
            }
            TriggerDefinition::AutofocusAfterElapsedTime(c) => {
                Box::new(AutofocusAfterElapsedTime::new(c.minutes))
            }
            TriggerDefinition::AutofocusAfterTemperatureChange(c) => {
                Box::new(AutofocusAfterTemperatureChange::new(c.delta))
            }
            TriggerDefinition::DitherAfterExposures(c) => {
                Box::new(DitherAfterExposures::new(c.after_exposures))
            }
            TriggerDefinition::SynchronizeDome(c) => {
                Box::new(SynchronizeDome::new(c.tolerance_degrees))
            }
        }
    }
}

fn next_is_exposure(next: Option<&dyn SequenceItem>) -> bool {
    next.map_or(false, |item| item.is_exposure())
}

fn autofocus_issues(equipment: &Equipment) -> Vec<String> {
    let mut issues = Vec::new();
    if !equipment.focuser.get_info().connected {
        issues.push("Focuser is not connected".to_string());
    }
    if !equipment.camera.get_info().connected {
        issues.push("Camera is not connected".to_string());
    }
    issues
}

// =========================================================================
// AUTOFOCUS AFTER FILTER CHANGE
// =========================================================================

pub struct AutofocusAfterFilterChange {
    id: ItemId,
    /// Filter in place when the container started and no autofocus ran yet
    baseline_filter: Option<String>,
}

impl AutofocusAfterFilterChange {
    pub fn new() -> Self {
        Self {
            id: new_id(),
            baseline_filter: None,
        }
    }

    fn current_filter(ctx: &ExecutionContext) -> Option<String> {
        let info = ctx.equipment.filter_wheel.get_info();
        if info.connected {
            info.selected_filter
        } else {
            None
        }
    }
}

impl Default for AutofocusAfterFilterChange {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SequenceTrigger for AutofocusAfterFilterChange {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        "Autofocus After Filter Change"
    }

    fn should_trigger(
        &self,
        _previous: Option<&dyn SequenceItem>,
        next: Option<&dyn SequenceItem>,
        ctx: &ExecutionContext,
    ) -> bool {
        if !next_is_exposure(next) {
            return false;
        }
        let Some(current) = Self::current_filter(ctx) else {
            return false;
        };
        let reference = ctx
            .run_state(|s| s.last_autofocus.as_ref().map(|af| af.filter.clone()))
            .unwrap_or_else(|| self.baseline_filter.clone());
        reference.as_deref() != Some(current.as_str())
    }

    async fn execute(&mut self, ctx: &mut ExecutionContext) -> Result<(), SequenceError> {
        let report = perform_autofocus(&self.id, ctx).await?;
        self.baseline_filter = report.filter;
        Ok(())
    }

    fn initialize(&mut self, ctx: &ExecutionContext) {
        if self.baseline_filter.is_none() {
            self.baseline_filter = Self::current_filter(ctx);
        }
    }

    fn reset_progress(&mut self) {
        self.baseline_filter = None;
    }

    fn validate(&self, equipment: &Equipment) -> Vec<String> {
        let mut issues = autofocus_issues(equipment);
        if !equipment.filter_wheel.get_info().connected {
            issues.push("Filter wheel is not connected".to_string());
        }
        issues
    }

    fn to_definition(&self) -> TriggerDefinition {
        TriggerDefinition::AutofocusAfterFilterChange
    }
}

// =========================================================================
// AUTOFOCUS AFTER ELAPSED TIME
// =========================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ElapsedTimeConfig {
    pub minutes: f64,
}

impl Default for ElapsedTimeConfig {
    fn default() -> Self {
        Self { minutes: 60.0 }
    }
}

pub struct AutofocusAfterElapsedTime {
    id: ItemId,
    minutes: f64,
    reference: Option<DateTime<Utc>>,
}

impl AutofocusAfterElapsedTime {
    pub fn new(minutes: f64) -> Self {
        Self {
            id: new_id(),
            minutes,
            reference: None,
        }
    }
}

#[async_trait]
impl SequenceTrigger for AutofocusAfterElapsedTime {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        "Autofocus After Time"
    }

    fn should_trigger(
        &self,
        _previous: Option<&dyn SequenceItem>,
        next: Option<&dyn SequenceItem>,
        ctx: &ExecutionContext,
    ) -> bool {
        if !next_is_exposure(next) {
            return false;
        }
        let last = ctx
            .run_state(|s| s.last_autofocus.as_ref().map(|af| af.completed_at))
            .or(self.reference);
        match last {
            Some(last) => {
                let elapsed = (Utc::now() - last).num_milliseconds() as f64 / 60_000.0;
                elapsed >= self.minutes
            }
            None => false,
        }
    }

    async fn execute(&mut self, ctx: &mut ExecutionContext) -> Result<(), SequenceError> {
        let report = perform_autofocus(&self.id, ctx).await?;
        self.reference = Some(report.completed_at);
        Ok(())
    }

    fn initialize(&mut self, _ctx: &ExecutionContext) {
        if self.reference.is_none() {
            self.reference = Some(Utc::now());
        }
    }

    fn reset_progress(&mut self) {
        self.reference = None;
    }

    fn validate(&self, equipment: &Equipment) -> Vec<String> {
        autofocus_issues(equipment)
    }

    fn to_definition(&self) -> TriggerDefinition {
        TriggerDefinition::AutofocusAfterElapsedTime(ElapsedTimeConfig {
            minutes: self.minutes,
        })
    }
}

// =========================================================================
// AUTOFOCUS AFTER TEMPERATURE CHANGE
// =========================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TemperatureChangeConfig {
    /// Change in degrees Celsius that causes a refocus
    pub delta: f64,
}

impl Default for TemperatureChangeConfig {
    fn default() -> Self {
        Self { delta: 1.0 }
    }
}

pub struct AutofocusAfterTemperatureChange {
    id: ItemId,
    delta: f64,
    reference_temperature: Option<f64>,
}

impl AutofocusAfterTemperatureChange {
    pub fn new(delta: f64) -> Self {
        Self {
            id: new_id(),
            delta,
            reference_temperature: None,
        }
    }
}

#[async_trait]
impl SequenceTrigger for AutofocusAfterTemperatureChange {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        "Autofocus After Temperature Change"
    }

    fn should_trigger(
        &self,
        _previous: Option<&dyn SequenceItem>,
        next: Option<&dyn SequenceItem>,
        ctx: &ExecutionContext,
    ) -> bool {
        if !next_is_exposure(next) {
            return false;
        }
        let Some(current) = ctx.equipment.focuser.get_info().temperature else {
            return false;
        };
        let reference = ctx
            .run_state(|s| s.last_autofocus.as_ref().and_then(|af| af.temperature))
            .or(self.reference_temperature);
        reference.map_or(false, |reference| (current - reference).abs() >= self.delta)
    }

    async fn execute(&mut self, ctx: &mut ExecutionContext) -> Result<(), SequenceError> {
        let report = perform_autofocus(&self.id, ctx).await?;
        self.reference_temperature = report.temperature;
        Ok(())
    }

    fn initialize(&mut self, ctx: &ExecutionContext) {
        if self.reference_temperature.is_none() {
            self.reference_temperature = ctx.equipment.focuser.get_info().temperature;
        }
    }

    fn reset_progress(&mut self) {
        self.reference_temperature = None;
    }

    fn validate(&self, equipment: &Equipment) -> Vec<String> {
        let mut issues = autofocus_issues(equipment);
        if equipment.focuser.get_info().connected && equipment.focuser.get_info().temperature.is_none() {
            issues.push("Focuser does not report a temperature".to_string());
        }
        issues
    }

    fn to_definition(&self) -> TriggerDefinition {
        TriggerDefinition::AutofocusAfterTemperatureChange(TemperatureChangeConfig {
            delta: self.delta,
        })
    }
}

// =========================================================================
// DITHER AFTER EXPOSURES
// =========================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DitherAfterExposuresConfig {
    pub after_exposures: u32,
}

impl Default for DitherAfterExposuresConfig {
    fn default() -> Self {
        Self { after_exposures: 1 }
    }
}

pub struct DitherAfterExposures {
    id: ItemId,
    after_exposures: u32,
}

impl DitherAfterExposures {
    pub fn new(after_exposures: u32) -> Self {
        Self {
            id: new_id(),
            after_exposures,
        }
    }
}

#[async_trait]
impl SequenceTrigger for DitherAfterExposures {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        "Dither After Exposures"
    }

    fn should_trigger(
        &self,
        _previous: Option<&dyn SequenceItem>,
        next: Option<&dyn SequenceItem>,
        ctx: &ExecutionContext,
    ) -> bool {
        if self.after_exposures == 0 || !next_is_exposure(next) {
            return false;
        }
        let guider = ctx.equipment.guider.get_info();
        guider.connected
            && guider.is_guiding
            && ctx.run_state(|s| s.exposures_since_dither) >= self.after_exposures
    }

    async fn execute(&mut self, ctx: &mut ExecutionContext) -> Result<(), SequenceError> {
        ctx.equipment.guider.dither(&ctx.cancel).await?;
        ctx.update_run_state(|s| s.exposures_since_dither = 0);
        Ok(())
    }

    fn validate(&self, equipment: &Equipment) -> Vec<String> {
        if equipment.guider.get_info().connected {
            Vec::new()
        } else {
            vec!["Guider is not connected".to_string()]
        }
    }

    fn to_definition(&self) -> TriggerDefinition {
        TriggerDefinition::DitherAfterExposures(DitherAfterExposuresConfig {
            after_exposures: self.after_exposures,
        })
    }
}

// =========================================================================
// SYNCHRONIZE DOME
// =========================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DomeSyncConfig {
    pub tolerance_degrees: f64,
}

impl Default for DomeSyncConfig {
    fn default() -> Self {
        Self {
            tolerance_degrees: 5.0,
        }
    }
}

/// Keep the dome slit in front of the telescope
pub struct SynchronizeDome {
    id: ItemId,
    tolerance_degrees: f64,
}

impl SynchronizeDome {
    pub fn new(tolerance_degrees: f64) -> Self {
        Self {
            id: new_id(),
            tolerance_degrees,
        }
    }
}

#[async_trait]
impl SequenceTrigger for SynchronizeDome {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        "Synchronize Dome"
    }

    fn should_trigger(
        &self,
        _previous: Option<&dyn SequenceItem>,
        next: Option<&dyn SequenceItem>,
        ctx: &ExecutionContext,
    ) -> bool {
        if next.is_none() {
            return false;
        }
        let dome = ctx.equipment.dome.get_info();
        let telescope = ctx.equipment.telescope.get_info();
        if !dome.connected || !dome.can_set_azimuth || dome.slewing || !telescope.connected {
            return false;
        }
        astro::azimuth_difference(dome.azimuth, telescope.azimuth) > self.tolerance_degrees
    }

    async fn execute(&mut self, ctx: &mut ExecutionContext) -> Result<(), SequenceError> {
        let azimuth = ctx.equipment.telescope.get_info().azimuth;
        tracing::info!("Synchronizing dome to azimuth {:.1}", azimuth);
        ctx.equipment.dome.slew_to_azimuth(azimuth, &ctx.cancel).await?;
        Ok(())
    }

    fn validate(&self, equipment: &Equipment) -> Vec<String> {
        let mut issues = Vec::new();
        if !equipment.dome.get_info().connected {
            issues.push("Dome is not connected".to_string());
        }
        if !equipment.telescope.get_info().connected {
            issues.push("Telescope is not connected".to_string());
        }
        issues
    }

    fn to_definition(&self) -> TriggerDefinition {
        TriggerDefinition::SynchronizeDome(DomeSyncConfig {
            tolerance_degrees: self.tolerance_degrees,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instructions::camera::{ExposureConfig, TakeExposure};
    use crate::mediator::{DeviceSession, FilterWheelMediator, GuiderMediator};
    use crate::simulator::SimulatedEquipment;
    use crate::ItemSettings;

    fn exposure() -> TakeExposure {
        TakeExposure::new(ItemSettings::default(), ExposureConfig::default())
    }

    #[tokio::test]
    async fn test_filter_change_triggers_autofocus() {
        let sim = SimulatedEquipment::default();
        let mut ctx = ExecutionContext::new(sim.equipment());
        let mut trigger = AutofocusAfterFilterChange::new();
        let next = exposure();

        trigger.initialize(&ctx);
        assert!(!trigger.should_trigger(None, Some(&next), &ctx));

        sim.filter_wheel.change_filter("Ha", &ctx.cancel).await.unwrap();
        assert!(trigger.should_trigger(None, Some(&next), &ctx));
        // only before exposures
        assert!(!trigger.should_trigger(None, None, &ctx));

        run_trigger(&mut trigger, Some("exposure"), &mut ctx).await.unwrap();
        assert_eq!(sim.focuser.autofocus_runs(), 1);
        assert!(!trigger.should_trigger(None, Some(&next), &ctx));
    }

    #[tokio::test]
    async fn test_temperature_change_trigger() {
        let sim = SimulatedEquipment::default();
        let ctx = ExecutionContext::new(sim.equipment());
        let mut trigger = AutofocusAfterTemperatureChange::new(1.5);
        let next = exposure();

        trigger.initialize(&ctx);
        sim.focuser.set_temperature(Some(13.0));
        assert!(!trigger.should_trigger(None, Some(&next), &ctx));
        sim.focuser.set_temperature(Some(10.0));
        assert!(trigger.should_trigger(None, Some(&next), &ctx));
    }

    #[tokio::test]
    async fn test_dither_counts_exposures() {
        let sim = SimulatedEquipment::default();
        let mut ctx = ExecutionContext::new(sim.equipment());
        sim.guider.start_guiding(false, &ctx.cancel).await.unwrap();
        let mut trigger = DitherAfterExposures::new(2);
        let next = exposure();

        ctx.update_run_state(|s| s.exposures_since_dither = 1);
        assert!(!trigger.should_trigger(None, Some(&next), &ctx));
        ctx.update_run_state(|s| s.exposures_since_dither = 2);
        assert!(trigger.should_trigger(None, Some(&next), &ctx));

        run_trigger(&mut trigger, None, &mut ctx).await.unwrap();
        assert_eq!(sim.guider.dither_count(), 1);
        assert_eq!(ctx.run_state(|s| s.exposures_since_dither), 0);
    }

    #[tokio::test]
    async fn test_failing_trigger_does_not_escalate() {
        let sim = SimulatedEquipment::default();
        let mut ctx = ExecutionContext::new(sim.equipment());
        // not guiding, so dithering fails
        let mut trigger = DitherAfterExposures::new(1);
        assert!(run_trigger(&mut trigger, None, &mut ctx).await.is_ok());
        assert!(!sim.guider.get_info().is_guiding);
    }

    #[tokio::test]
    async fn test_dome_sync_follows_telescope() {
        let sim = SimulatedEquipment::default();
        let mut ctx = ExecutionContext::new(sim.equipment());
        sim.telescope.hub().update(|info| info.azimuth = 120.0);
        let mut trigger = SynchronizeDome::new(5.0);
        let next = exposure();

        assert!(trigger.should_trigger(None, Some(&next), &ctx));
        run_trigger(&mut trigger, None, &mut ctx).await.unwrap();
        assert_eq!(sim.dome.get_info().azimuth, 120.0);
        assert!(!trigger.should_trigger(None, Some(&next), &ctx));
    }
}
