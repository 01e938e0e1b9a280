//! Camera instructions: cooling, warming and exposures

use crate::context::ExecutionContext;
use crate::definition::{ItemDefinition, ItemKind};
use crate::error::SequenceError;
use crate::instructions::require_connected;
use crate::item::{ItemCore, ItemDescriptor, SequenceItem};
use crate::mediator::{CaptureRequest, Equipment, ImageType};
use crate::{duration_from_secs, ApplicationStatus, ItemSettings, MAX_INSTRUCTION_SECS};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

fn default_cool_temperature() -> f64 {
    -10.0
}

fn default_exposure_time() -> f64 {
    60.0
}

fn default_binning() -> u16 {
    1
}

fn minutes(value: f64) -> Duration {
    duration_from_secs(value * 60.0)
}

fn check_ramp_minutes(issues: &mut Vec<String>, value: f64) {
    if !value.is_finite() || value * 60.0 > MAX_INSTRUCTION_SECS {
        issues.push(format!("Ramp duration of {} minutes is out of range", value));
    }
}

// =========================================================================
// COOL CAMERA
// =========================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoolCameraConfig {
    #[serde(default = "default_cool_temperature")]
    pub temperature: f64,
    /// Ramp time; zero sets the target immediately
    #[serde(default)]
    pub duration_minutes: f64,
}

impl Default for CoolCameraConfig {
    fn default() -> Self {
        Self {
            temperature: default_cool_temperature(),
            duration_minutes: 0.0,
        }
    }
}

pub struct CoolCamera {
    core: ItemCore,
    pub config: CoolCameraConfig,
}

impl CoolCamera {
    const DESCRIPTOR: ItemDescriptor = ItemDescriptor {
        name: "Cool Camera",
        category: "Camera",
        description: "Cools the camera sensor to a set point",
        icon: "SnowflakeSVG",
    };

    pub fn new(settings: ItemSettings, config: CoolCameraConfig) -> Self {
        Self {
            core: ItemCore::new(settings, Self::DESCRIPTOR),
            config,
        }
    }
}

#[async_trait]
impl SequenceItem for CoolCamera {
    fn core(&self) -> &ItemCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ItemCore {
        &mut self.core
    }

    fn validate(&mut self, equipment: &Equipment) -> bool {
        let info = equipment.camera.get_info();
        let mut issues = Vec::new();
        require_connected(&mut issues, info.connected, "Camera");
        if info.connected && !info.can_set_temperature {
            issues.push("Camera cannot set its temperature".to_string());
        }
        check_ramp_minutes(&mut issues, self.config.duration_minutes);
        self.core.set_issues(issues)
    }

    async fn execute(&mut self, ctx: &mut ExecutionContext) -> Result<(), SequenceError> {
        tracing::info!("Cooling camera to {}°C", self.config.temperature);
        ctx.equipment
            .camera
            .cool(
                self.config.temperature,
                minutes(self.config.duration_minutes),
                &ctx.cancel,
            )
            .await?;
        Ok(())
    }

    fn estimated_duration(&self) -> Duration {
        minutes(self.config.duration_minutes)
    }

    fn to_definition(&self) -> ItemDefinition {
        ItemDefinition {
            settings: self.core.settings.clone(),
            kind: ItemKind::CoolCamera(self.config.clone()),
        }
    }
}

// =========================================================================
// WARM CAMERA
// =========================================================================

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WarmCameraConfig {
    pub duration_minutes: f64,
}

pub struct WarmCamera {
    core: ItemCore,
    pub config: WarmCameraConfig,
}

impl WarmCamera {
    const DESCRIPTOR: ItemDescriptor = ItemDescriptor {
        name: "Warm Camera",
        category: "Camera",
        description: "Warms the camera sensor and turns the cooler off",
        icon: "FireSVG",
    };

    pub fn new(settings: ItemSettings, config: WarmCameraConfig) -> Self {
        Self {
            core: ItemCore::new(settings, Self::DESCRIPTOR),
            config,
        }
    }
}

#[async_trait]
impl SequenceItem for WarmCamera {
    fn core(&self) -> &ItemCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ItemCore {
        &mut self.core
    }

    fn validate(&mut self, equipment: &Equipment) -> bool {
        let mut issues = Vec::new();
        require_connected(&mut issues, equipment.camera.get_info().connected, "Camera");
        check_ramp_minutes(&mut issues, self.config.duration_minutes);
        self.core.set_issues(issues)
    }

    async fn execute(&mut self, ctx: &mut ExecutionContext) -> Result<(), SequenceError> {
        tracing::info!("Warming camera");
        ctx.equipment
            .camera
            .warm(minutes(self.config.duration_minutes), &ctx.cancel)
            .await?;
        Ok(())
    }

    fn estimated_duration(&self) -> Duration {
        minutes(self.config.duration_minutes)
    }

    fn to_definition(&self) -> ItemDefinition {
        ItemDefinition {
            settings: self.core.settings.clone(),
            kind: ItemKind::WarmCamera(self.config.clone()),
        }
    }
}

// =========================================================================
// TAKE EXPOSURE
// =========================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExposureConfig {
    /// Exposure time in seconds
    #[serde(default = "default_exposure_time")]
    pub exposure_time: f64,
    #[serde(default)]
    pub image_type: ImageType,
    #[serde(default)]
    pub gain: Option<i32>,
    #[serde(default)]
    pub offset: Option<i32>,
    #[serde(default = "default_binning")]
    pub binning: u16,
}

impl Default for ExposureConfig {
    fn default() -> Self {
        Self {
            exposure_time: default_exposure_time(),
            image_type: ImageType::Light,
            gain: None,
            offset: None,
            binning: default_binning(),
        }
    }
}

/// Take a single frame
pub struct TakeExposure {
    core: ItemCore,
    pub config: ExposureConfig,
}

impl TakeExposure {
    const DESCRIPTOR: ItemDescriptor = ItemDescriptor {
        name: "Take Exposure",
        category: "Camera",
        description: "Takes a single exposure",
        icon: "CameraSVG",
    };

    pub fn new(settings: ItemSettings, config: ExposureConfig) -> Self {
        Self {
            core: ItemCore::new(settings, Self::DESCRIPTOR),
            config,
        }
    }

    fn request(&self) -> CaptureRequest {
        CaptureRequest {
            exposure_time: self.config.exposure_time,
            image_type: self.config.image_type,
            gain: self.config.gain,
            offset: self.config.offset,
            binning: self.config.binning,
        }
    }
}

#[async_trait]
impl SequenceItem for TakeExposure {
    fn core(&self) -> &ItemCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ItemCore {
        &mut self.core
    }

    fn validate(&mut self, equipment: &Equipment) -> bool {
        let info = equipment.camera.get_info();
        let mut issues = Vec::new();
        require_connected(&mut issues, info.connected, "Camera");
        if self.config.exposure_time < 0.0 {
            issues.push("Exposure time cannot be negative".to_string());
        } else if !self.config.exposure_time.is_finite()
            || self.config.exposure_time > MAX_INSTRUCTION_SECS
        {
            issues.push(format!(
                "Exposure time of {}s exceeds the {}s limit",
                self.config.exposure_time, MAX_INSTRUCTION_SECS
            ));
        }
        if info.connected && (self.config.binning == 0 || self.config.binning > info.max_bin) {
            issues.push(format!("Binning {}x{} is not supported", self.config.binning, self.config.binning));
        }
        self.core.set_issues(issues)
    }

    async fn execute(&mut self, ctx: &mut ExecutionContext) -> Result<(), SequenceError> {
        let owner = self.core.id.clone();
        let camera = ctx.equipment.camera.clone();
        if !camera.is_free_to_capture(&owner) {
            return Err(SequenceError::Failed("Camera is busy with another capture".to_string()));
        }
        camera.register_capture_block(&owner)?;

        ctx.report(
            ApplicationStatus::new(self.core.settings.name.as_str(), "Exposing")
                .with_progress(0.0, self.config.exposure_time),
        );
        let result = camera.capture(&self.request(), &ctx.cancel).await;
        camera.release_capture_block(&owner);
        let frame = result?;

        tracing::info!(
            "Captured {:?} frame: {:.1}s, filter {}",
            frame.image_type,
            frame.exposure_time,
            frame.filter.as_deref().unwrap_or("none")
        );
        if frame.image_type == ImageType::Light {
            ctx.update_run_state(|state| {
                state.exposures_completed += 1;
                state.exposures_since_dither += 1;
                state.integration_secs += frame.exposure_time;
            });
        }
        Ok(())
    }

    fn estimated_duration(&self) -> Duration {
        duration_from_secs(self.config.exposure_time)
    }

    fn is_exposure(&self) -> bool {
        self.config.image_type == ImageType::Light
    }

    fn to_definition(&self) -> ItemDefinition {
        ItemDefinition {
            settings: self.core.settings.clone(),
            kind: ItemKind::TakeExposure(self.config.clone()),
        }
    }
}
