//! Focuser instructions and the shared autofocus routine

use crate::context::{AutofocusRecord, ExecutionContext};
use crate::definition::{ItemDefinition, ItemKind};
use crate::error::SequenceError;
use crate::instructions::require_connected;
use crate::item::{ItemCore, ItemDescriptor, SequenceItem};
use crate::mediator::{AutofocusReport, Equipment};
use crate::{ApplicationStatus, ItemSettings};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Estimated length of one autofocus run
const AUTOFOCUS_ESTIMATE: Duration = Duration::from_secs(180);

/// Run autofocus while holding the camera's capture block
///
/// The result is recorded in the run state so the autofocus triggers can
/// measure filter, time and temperature changes against it.
pub async fn perform_autofocus(
    owner: &str,
    ctx: &ExecutionContext,
) -> Result<AutofocusReport, SequenceError> {
    let camera = ctx.equipment.camera.clone();
    if !camera.is_free_to_capture(owner) {
        return Err(SequenceError::Failed("Camera is busy, cannot run autofocus".to_string()));
    }
    camera.register_capture_block(owner)?;

    let filter_wheel = ctx.equipment.filter_wheel.get_info();
    let filter = if filter_wheel.connected {
        filter_wheel.selected_filter
    } else {
        None
    };
    ctx.report(ApplicationStatus::new("Autofocus", "Running"));
    tracing::info!("Starting autofocus (filter {})", filter.as_deref().unwrap_or("none"));

    let result = ctx
        .equipment
        .focuser
        .auto_focus(filter.as_deref(), &ctx.cancel)
        .await;
    camera.release_capture_block(owner);
    let report = result?;

    tracing::info!(
        "Autofocus finished at position {} (HFR {:.2})",
        report.position,
        report.hfr
    );
    ctx.update_run_state(|state| {
        state.last_autofocus = Some(AutofocusRecord {
            completed_at: report.completed_at,
            filter: report.filter.clone(),
            temperature: report.temperature,
            position: report.position,
        });
    });
    Ok(report)
}

// =========================================================================
// MOVE FOCUSER ABSOLUTE
// =========================================================================

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MoveFocuserAbsoluteConfig {
    pub position: i32,
}

pub struct MoveFocuserAbsolute {
    core: ItemCore,
    pub config: MoveFocuserAbsoluteConfig,
}

impl MoveFocuserAbsolute {
    const DESCRIPTOR: ItemDescriptor = ItemDescriptor {
        name: "Move Focuser",
        category: "Focuser",
        description: "Moves the focuser to an absolute position",
        icon: "MoveFocuserSVG",
    };

    pub fn new(settings: ItemSettings, config: MoveFocuserAbsoluteConfig) -> Self {
        Self {
            core: ItemCore::new(settings, Self::DESCRIPTOR),
            config,
        }
    }
}

#[async_trait]
impl SequenceItem for MoveFocuserAbsolute {
    fn core(&self) -> &ItemCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ItemCore {
        &mut self.core
    }

    fn validate(&mut self, equipment: &Equipment) -> bool {
        let info = equipment.focuser.get_info();
        let mut issues = Vec::new();
        require_connected(&mut issues, info.connected, "Focuser");
        if info.connected && (self.config.position < 0 || self.config.position > info.max_step) {
            issues.push(format!(
                "Position {} is outside the focuser range 0..{}",
                self.config.position, info.max_step
            ));
        }
        self.core.set_issues(issues)
    }

    async fn execute(&mut self, ctx: &mut ExecutionContext) -> Result<(), SequenceError> {
        tracing::info!("Moving focuser to {}", self.config.position);
        ctx.equipment
            .focuser
            .move_to(self.config.position, &ctx.cancel)
            .await?;
        Ok(())
    }

    fn to_definition(&self) -> ItemDefinition {
        ItemDefinition {
            settings: self.core.settings.clone(),
            kind: ItemKind::MoveFocuserAbsolute(self.config.clone()),
        }
    }
}

// =========================================================================
// MOVE FOCUSER RELATIVE
// =========================================================================

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MoveFocuserRelativeConfig {
    pub steps: i32,
}

pub struct MoveFocuserRelative {
    core: ItemCore,
    pub config: MoveFocuserRelativeConfig,
}

impl MoveFocuserRelative {
    const DESCRIPTOR: ItemDescriptor = ItemDescriptor {
        name: "Move Focuser Relative",
        category: "Focuser",
        description: "Moves the focuser by a number of steps",
        icon: "MoveFocuserRelativeSVG",
    };

    pub fn new(settings: ItemSettings, config: MoveFocuserRelativeConfig) -> Self {
        Self {
            core: ItemCore::new(settings, Self::DESCRIPTOR),
            config,
        }
    }
}

#[async_trait]
impl SequenceItem for MoveFocuserRelative {
    fn core(&self) -> &ItemCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ItemCore {
        &mut self.core
    }

    fn validate(&mut self, equipment: &Equipment) -> bool {
        let mut issues = Vec::new();
        require_connected(&mut issues, equipment.focuser.get_info().connected, "Focuser");
        self.core.set_issues(issues)
    }

    async fn execute(&mut self, ctx: &mut ExecutionContext) -> Result<(), SequenceError> {
        let position = ctx
            .equipment
            .focuser
            .move_relative(self.config.steps, &ctx.cancel)
            .await?;
        tracing::info!("Focuser moved {} steps to {}", self.config.steps, position);
        Ok(())
    }

    fn to_definition(&self) -> ItemDefinition {
        ItemDefinition {
            settings: self.core.settings.clone(),
            kind: ItemKind::MoveFocuserRelative(self.config.clone()),
        }
    }
}

// =========================================================================
// MOVE FOCUSER BY TEMPERATURE
// =========================================================================

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TemperatureCompensationConfig {
    /// Steps per degree Celsius
    pub slope: f64,
    /// Position at 0°C, used in absolute mode
    pub intercept: f64,
    /// Absolute mode moves to `slope * T + intercept`; relative mode moves by
    /// `slope * ΔT` since the previous run
    pub absolute: bool,
}

pub struct MoveFocuserByTemperature {
    core: ItemCore,
    pub config: TemperatureCompensationConfig,
}

impl MoveFocuserByTemperature {
    const DESCRIPTOR: ItemDescriptor = ItemDescriptor {
        name: "Move Focuser By Temperature",
        category: "Focuser",
        description: "Compensates focus drift from the focuser temperature",
        icon: "MoveFocuserByTemperatureSVG",
    };

    pub fn new(settings: ItemSettings, config: TemperatureCompensationConfig) -> Self {
        Self {
            core: ItemCore::new(settings, Self::DESCRIPTOR),
            config,
        }
    }
}

#[async_trait]
impl SequenceItem for MoveFocuserByTemperature {
    fn core(&self) -> &ItemCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ItemCore {
        &mut self.core
    }

    fn validate(&mut self, equipment: &Equipment) -> bool {
        let info = equipment.focuser.get_info();
        let mut issues = Vec::new();
        require_connected(&mut issues, info.connected, "Focuser");
        if info.connected && info.temperature.is_none() {
            issues.push("Focuser does not report a temperature".to_string());
        }
        self.core.set_issues(issues)
    }

    async fn execute(&mut self, ctx: &mut ExecutionContext) -> Result<(), SequenceError> {
        let temperature = ctx
            .equipment
            .focuser
            .get_info()
            .temperature
            .ok_or_else(|| SequenceError::Failed("Focuser temperature unavailable".to_string()))?;

        if self.config.absolute {
            let position = (self.config.slope * temperature + self.config.intercept).round() as i32;
            tracing::info!("Temperature {:.2}°C - moving focuser to {}", temperature, position);
            ctx.equipment.focuser.move_to(position, &ctx.cancel).await?;
            return Ok(());
        }

        let (last_temperature, last_roundoff) = ctx.run_state(|s| {
            (
                s.temperature_compensation.last_temperature,
                s.temperature_compensation.last_roundoff,
            )
        });
        let Some(last_temperature) = last_temperature else {
            tracing::info!("Recording reference focuser temperature {:.2}°C", temperature);
            ctx.update_run_state(|s| {
                s.temperature_compensation.last_temperature = Some(temperature);
                s.temperature_compensation.last_roundoff = 0.0;
            });
            return Ok(());
        };

        let delta = self.config.slope * (temperature - last_temperature) + last_roundoff;
        let steps = delta.round();
        tracing::info!(
            "Temperature changed {:.2}°C -> {:.2}°C, moving focuser {} steps",
            last_temperature,
            temperature,
            steps
        );
        if steps != 0.0 {
            ctx.equipment
                .focuser
                .move_relative(steps as i32, &ctx.cancel)
                .await?;
        }
        ctx.update_run_state(|s| {
            s.temperature_compensation.last_temperature = Some(temperature);
            s.temperature_compensation.last_roundoff = delta - steps;
        });
        Ok(())
    }

    fn to_definition(&self) -> ItemDefinition {
        ItemDefinition {
            settings: self.core.settings.clone(),
            kind: ItemKind::MoveFocuserByTemperature(self.config.clone()),
        }
    }
}

// =========================================================================
// RUN AUTOFOCUS
// =========================================================================

pub struct RunAutofocus {
    core: ItemCore,
}

impl RunAutofocus {
    const DESCRIPTOR: ItemDescriptor = ItemDescriptor {
        name: "Run Autofocus",
        category: "Focuser",
        description: "Runs an autofocus routine",
        icon: "AutoFocusSVG",
    };

    pub fn new(settings: ItemSettings) -> Self {
        Self {
            core: ItemCore::new(settings, Self::DESCRIPTOR),
        }
    }
}

#[async_trait]
impl SequenceItem for RunAutofocus {
    fn core(&self) -> &ItemCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ItemCore {
        &mut self.core
    }

    fn validate(&mut self, equipment: &Equipment) -> bool {
        let mut issues = Vec::new();
        require_connected(&mut issues, equipment.focuser.get_info().connected, "Focuser");
        require_connected(&mut issues, equipment.camera.get_info().connected, "Camera");
        self.core.set_issues(issues)
    }

    async fn execute(&mut self, ctx: &mut ExecutionContext) -> Result<(), SequenceError> {
        perform_autofocus(&self.core.id, ctx).await?;
        Ok(())
    }

    fn estimated_duration(&self) -> Duration {
        AUTOFOCUS_ESTIMATE
    }

    fn to_definition(&self) -> ItemDefinition {
        ItemDefinition {
            settings: self.core.settings.clone(),
            kind: ItemKind::RunAutofocus,
        }
    }
}
