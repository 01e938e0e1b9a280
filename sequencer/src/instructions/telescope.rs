//! Telescope instructions

use crate::astro::Coordinates;
use crate::context::{ExecutionContext, ParentContext};
use crate::definition::{ItemDefinition, ItemKind};
use crate::error::SequenceError;
use crate::instructions::require_connected;
use crate::item::{ItemCore, ItemDescriptor, SequenceItem};
use crate::mediator::{Equipment, TrackingMode};
use crate::ItemSettings;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

// =========================================================================
// SLEW
// =========================================================================

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SlewConfig {
    pub coordinates: Option<Coordinates>,
    /// Take coordinates from the enclosing deep sky object
    pub inherit_coordinates: bool,
}

pub struct SlewScopeToRaDec {
    core: ItemCore,
    pub config: SlewConfig,
    inherited: Option<Coordinates>,
}

impl SlewScopeToRaDec {
    const DESCRIPTOR: ItemDescriptor = ItemDescriptor {
        name: "Slew To Ra/Dec",
        category: "Telescope",
        description: "Slews the telescope to the given coordinates",
        icon: "SlewToRaDecSVG",
    };

    pub fn new(settings: ItemSettings, config: SlewConfig) -> Self {
        Self {
            core: ItemCore::new(settings, Self::DESCRIPTOR),
            config,
            inherited: None,
        }
    }

    /// Coordinates the slew will go to
    pub fn coordinates(&self) -> Option<Coordinates> {
        if self.config.inherit_coordinates {
            self.inherited
        } else {
            self.config.coordinates
        }
    }
}

#[async_trait]
impl SequenceItem for SlewScopeToRaDec {
    fn core(&self) -> &ItemCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ItemCore {
        &mut self.core
    }

    fn validate(&mut self, equipment: &Equipment) -> bool {
        let mut issues = Vec::new();
        require_connected(&mut issues, equipment.telescope.get_info().connected, "Telescope");
        match self.coordinates() {
            None if self.config.inherit_coordinates => {
                issues.push("No target to inherit coordinates from".to_string())
            }
            None => issues.push("No coordinates set".to_string()),
            Some(c) if !c.is_valid() => issues.push("Coordinates are out of range".to_string()),
            Some(_) => {}
        }
        self.core.set_issues(issues)
    }

    async fn execute(&mut self, ctx: &mut ExecutionContext) -> Result<(), SequenceError> {
        let coordinates = self
            .coordinates()
            .or_else(|| {
                self.config
                    .inherit_coordinates
                    .then(|| ctx.target.as_ref().map(|t| t.coordinates))
                    .flatten()
            })
            .ok_or_else(|| SequenceError::Failed("No coordinates to slew to".to_string()))?;

        tracing::info!(
            "Slewing to RA {:.4}h Dec {:.4}",
            coordinates.ra_hours,
            coordinates.dec_degrees
        );
        ctx.equipment
            .telescope
            .slew_to_coordinates(coordinates, &ctx.cancel)
            .await?;
        Ok(())
    }

    fn estimated_duration(&self) -> Duration {
        Duration::from_secs(30)
    }

    fn after_parent_changed(&mut self, parent: Option<&ParentContext>) {
        self.core.parent_id = parent.map(|p| p.container_id.clone());
        self.inherited = parent
            .and_then(|p| p.target.as_ref())
            .map(|target| target.coordinates);
    }

    fn to_definition(&self) -> ItemDefinition {
        ItemDefinition {
            settings: self.core.settings.clone(),
            kind: ItemKind::SlewScopeToRaDec(self.config.clone()),
        }
    }
}

// =========================================================================
// PARK / UNPARK
// =========================================================================

pub struct ParkScope {
    core: ItemCore,
}

impl ParkScope {
    const DESCRIPTOR: ItemDescriptor = ItemDescriptor {
        name: "Park Scope",
        category: "Telescope",
        description: "Parks the telescope",
        icon: "ParkSVG",
    };

    pub fn new(settings: ItemSettings) -> Self {
        Self {
            core: ItemCore::new(settings, Self::DESCRIPTOR),
        }
    }
}

#[async_trait]
impl SequenceItem for ParkScope {
    fn core(&self) -> &ItemCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ItemCore {
        &mut self.core
    }

    fn validate(&mut self, equipment: &Equipment) -> bool {
        let info = equipment.telescope.get_info();
        let mut issues = Vec::new();
        require_connected(&mut issues, info.connected, "Telescope");
        if info.connected && !info.can_park {
            issues.push("Telescope cannot park".to_string());
        }
        self.core.set_issues(issues)
    }

    async fn execute(&mut self, ctx: &mut ExecutionContext) -> Result<(), SequenceError> {
        // guiding on a parked mount makes no sense
        if ctx.equipment.guider.get_info().is_guiding {
            ctx.equipment.guider.stop_guiding(&ctx.cancel).await?;
        }
        tracing::info!("Parking telescope");
        ctx.equipment.telescope.park(&ctx.cancel).await?;
        Ok(())
    }

    fn estimated_duration(&self) -> Duration {
        Duration::from_secs(60)
    }

    fn to_definition(&self) -> ItemDefinition {
        ItemDefinition {
            settings: self.core.settings.clone(),
            kind: ItemKind::ParkScope,
        }
    }
}

pub struct UnparkScope {
    core: ItemCore,
}

impl UnparkScope {
    const DESCRIPTOR: ItemDescriptor = ItemDescriptor {
        name: "Unpark Scope",
        category: "Telescope",
        description: "Unparks the telescope",
        icon: "UnparkSVG",
    };

    pub fn new(settings: ItemSettings) -> Self {
        Self {
            core: ItemCore::new(settings, Self::DESCRIPTOR),
        }
    }
}

#[async_trait]
impl SequenceItem for UnparkScope {
    fn core(&self) -> &ItemCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ItemCore {
        &mut self.core
    }

    fn validate(&mut self, equipment: &Equipment) -> bool {
        let mut issues = Vec::new();
        require_connected(&mut issues, equipment.telescope.get_info().connected, "Telescope");
        self.core.set_issues(issues)
    }

    async fn execute(&mut self, ctx: &mut ExecutionContext) -> Result<(), SequenceError> {
        if !ctx.equipment.telescope.get_info().at_park {
            tracing::debug!("Telescope already unparked");
            return Ok(());
        }
        ctx.equipment.telescope.unpark(&ctx.cancel).await?;
        Ok(())
    }

    fn to_definition(&self) -> ItemDefinition {
        ItemDefinition {
            settings: self.core.settings.clone(),
            kind: ItemKind::UnparkScope,
        }
    }
}

// =========================================================================
// TRACKING
// =========================================================================

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SetTrackingConfig {
    pub mode: TrackingMode,
}

pub struct SetTracking {
    core: ItemCore,
    pub config: SetTrackingConfig,
}

impl SetTracking {
    const DESCRIPTOR: ItemDescriptor = ItemDescriptor {
        name: "Set Tracking",
        category: "Telescope",
        description: "Sets the telescope tracking rate",
        icon: "SpeedometerSVG",
    };

    pub fn new(settings: ItemSettings, config: SetTrackingConfig) -> Self {
        Self {
            core: ItemCore::new(settings, Self::DESCRIPTOR),
            config,
        }
    }
}

#[async_trait]
impl SequenceItem for SetTracking {
    fn core(&self) -> &ItemCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ItemCore {
        &mut self.core
    }

    fn validate(&mut self, equipment: &Equipment) -> bool {
        let info = equipment.telescope.get_info();
        let mut issues = Vec::new();
        require_connected(&mut issues, info.connected, "Telescope");
        if info.connected && !info.can_set_tracking {
            issues.push("Telescope cannot change tracking".to_string());
        }
        self.core.set_issues(issues)
    }

    async fn execute(&mut self, ctx: &mut ExecutionContext) -> Result<(), SequenceError> {
        tracing::info!("Setting tracking to {:?}", self.config.mode);
        ctx.equipment.telescope.set_tracking(self.config.mode).await?;
        Ok(())
    }

    fn to_definition(&self) -> ItemDefinition {
        ItemDefinition {
            settings: self.core.settings.clone(),
            kind: ItemKind::SetTracking(self.config.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instructions::test_support::setup;
    use crate::item::run;
    use crate::mediator::{DeviceSession, GuiderMediator};
    use crate::ItemStatus;

    #[tokio::test]
    async fn test_slew_with_explicit_coordinates() {
        let (sim, mut ctx) = setup();
        let target = Coordinates::new(10.0, 20.0);
        let mut item = SlewScopeToRaDec::new(
            ItemSettings::default(),
            SlewConfig {
                coordinates: Some(target),
                inherit_coordinates: false,
            },
        );
        run(&mut item, &mut ctx).await.unwrap();
        assert_eq!(sim.telescope.get_info().coordinates, Some(target));
    }

    #[tokio::test]
    async fn test_inheriting_slew_without_target_is_skipped() {
        let (_sim, mut ctx) = setup();
        let mut item = SlewScopeToRaDec::new(
            ItemSettings::default(),
            SlewConfig {
                coordinates: None,
                inherit_coordinates: true,
            },
        );
        run(&mut item, &mut ctx).await.unwrap();
        assert_eq!(item.status(), ItemStatus::Skipped);
    }

    #[tokio::test]
    async fn test_park_stops_guiding() {
        let (sim, mut ctx) = setup();
        sim.guider.start_guiding(false, &ctx.cancel).await.unwrap();

        let mut park = ParkScope::new(ItemSettings::default());
        run(&mut park, &mut ctx).await.unwrap();
        assert!(sim.telescope.get_info().at_park);
        assert!(!sim.guider.get_info().is_guiding);

        let mut unpark = UnparkScope::new(ItemSettings::default());
        run(&mut unpark, &mut ctx).await.unwrap();
        assert!(!sim.telescope.get_info().at_park);
    }

    #[tokio::test]
    async fn test_set_tracking() {
        let (sim, mut ctx) = setup();
        let mut item = SetTracking::new(
            ItemSettings::default(),
            SetTrackingConfig {
                mode: TrackingMode::Lunar,
            },
        );
        run(&mut item, &mut ctx).await.unwrap();
        assert_eq!(sim.telescope.get_info().tracking_mode, TrackingMode::Lunar);
    }
}
