//! Dome instructions

use crate::context::ExecutionContext;
use crate::definition::{ItemDefinition, ItemKind};
use crate::error::SequenceError;
use crate::instructions::require_connected;
use crate::item::{ItemCore, ItemDescriptor, SequenceItem};
use crate::mediator::{DomeInfo, Equipment};
use crate::ItemSettings;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

fn dome_issues(
    equipment: &Equipment,
    capable: impl Fn(&DomeInfo) -> bool,
    missing: &str,
) -> Vec<String> {
    let info = equipment.dome.get_info();
    let mut issues = Vec::new();
    require_connected(&mut issues, info.connected, "Dome");
    if info.connected && !capable(&info) {
        issues.push(missing.to_string());
    }
    issues
}

// =========================================================================
// SHUTTER
// =========================================================================

pub struct OpenDomeShutter {
    core: ItemCore,
}

impl OpenDomeShutter {
    const DESCRIPTOR: ItemDescriptor = ItemDescriptor {
        name: "Open Dome Shutter",
        category: "Dome",
        description: "Opens the dome shutter",
        icon: "DomeSVG",
    };

    pub fn new(settings: ItemSettings) -> Self {
        Self {
            core: ItemCore::new(settings, Self::DESCRIPTOR),
        }
    }
}

#[async_trait]
impl SequenceItem for OpenDomeShutter {
    fn core(&self) -> &ItemCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ItemCore {
        &mut self.core
    }

    fn validate(&mut self, equipment: &Equipment) -> bool {
        let issues = dome_issues(equipment, |d| d.can_set_shutter, "Dome shutter cannot be operated");
        self.core.set_issues(issues)
    }

    async fn execute(&mut self, ctx: &mut ExecutionContext) -> Result<(), SequenceError> {
        tracing::info!("Opening dome shutter");
        ctx.equipment.dome.open_shutter(&ctx.cancel).await?;
        Ok(())
    }

    fn estimated_duration(&self) -> Duration {
        Duration::from_secs(60)
    }

    fn to_definition(&self) -> ItemDefinition {
        ItemDefinition {
            settings: self.core.settings.clone(),
            kind: ItemKind::OpenDomeShutter,
        }
    }
}

pub struct CloseDomeShutter {
    core: ItemCore,
}

impl CloseDomeShutter {
    const DESCRIPTOR: ItemDescriptor = ItemDescriptor {
        name: "Close Dome Shutter",
        category: "Dome",
        description: "Closes the dome shutter",
        icon: "DomeSVG",
    };

    pub fn new(settings: ItemSettings) -> Self {
        Self {
            core: ItemCore::new(settings, Self::DESCRIPTOR),
        }
    }
}

#[async_trait]
impl SequenceItem for CloseDomeShutter {
    fn core(&self) -> &ItemCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ItemCore {
        &mut self.core
    }

    fn validate(&mut self, equipment: &Equipment) -> bool {
        let issues = dome_issues(equipment, |d| d.can_set_shutter, "Dome shutter cannot be operated");
        self.core.set_issues(issues)
    }

    async fn execute(&mut self, ctx: &mut ExecutionContext) -> Result<(), SequenceError> {
        tracing::info!("Closing dome shutter");
        ctx.equipment.dome.close_shutter(&ctx.cancel).await?;
        Ok(())
    }

    fn estimated_duration(&self) -> Duration {
        Duration::from_secs(60)
    }

    fn to_definition(&self) -> ItemDefinition {
        ItemDefinition {
            settings: self.core.settings.clone(),
            kind: ItemKind::CloseDomeShutter,
        }
    }
}

// =========================================================================
// PARK / SLEW
// =========================================================================

pub struct ParkDome {
    core: ItemCore,
}

impl ParkDome {
    const DESCRIPTOR: ItemDescriptor = ItemDescriptor {
        name: "Park Dome",
        category: "Dome",
        description: "Parks the dome",
        icon: "ParkSVG",
    };

    pub fn new(settings: ItemSettings) -> Self {
        Self {
            core: ItemCore::new(settings, Self::DESCRIPTOR),
        }
    }
}

#[async_trait]
impl SequenceItem for ParkDome {
    fn core(&self) -> &ItemCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ItemCore {
        &mut self.core
    }

    fn validate(&mut self, equipment: &Equipment) -> bool {
        let issues = dome_issues(equipment, |d| d.can_park, "Dome cannot park");
        self.core.set_issues(issues)
    }

    async fn execute(&mut self, ctx: &mut ExecutionContext) -> Result<(), SequenceError> {
        ctx.equipment.dome.park(&ctx.cancel).await?;
        Ok(())
    }

    fn estimated_duration(&self) -> Duration {
        Duration::from_secs(60)
    }

    fn to_definition(&self) -> ItemDefinition {
        ItemDefinition {
            settings: self.core.settings.clone(),
            kind: ItemKind::ParkDome,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SlewDomeAzimuthConfig {
    pub azimuth: f64,
}

pub struct SlewDomeAzimuth {
    core: ItemCore,
    pub config: SlewDomeAzimuthConfig,
}

impl SlewDomeAzimuth {
    const DESCRIPTOR: ItemDescriptor = ItemDescriptor {
        name: "Slew Dome Azimuth",
        category: "Dome",
        description: "Rotates the dome to an azimuth",
        icon: "DomeSVG",
    };

    pub fn new(settings: ItemSettings, config: SlewDomeAzimuthConfig) -> Self {
        Self {
            core: ItemCore::new(settings, Self::DESCRIPTOR),
            config,
        }
    }
}

#[async_trait]
impl SequenceItem for SlewDomeAzimuth {
    fn core(&self) -> &ItemCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ItemCore {
        &mut self.core
    }

    fn validate(&mut self, equipment: &Equipment) -> bool {
        let mut issues = dome_issues(equipment, |d| d.can_set_azimuth, "Dome cannot rotate");
        if !(0.0..360.0).contains(&self.config.azimuth) {
            issues.push(format!("Azimuth {} is outside 0..360", self.config.azimuth));
        }
        self.core.set_issues(issues)
    }

    async fn execute(&mut self, ctx: &mut ExecutionContext) -> Result<(), SequenceError> {
        ctx.equipment
            .dome
            .slew_to_azimuth(self.config.azimuth, &ctx.cancel)
            .await?;
        Ok(())
    }

    fn to_definition(&self) -> ItemDefinition {
        ItemDefinition {
            settings: self.core.settings.clone(),
            kind: ItemKind::SlewDomeAzimuth(self.config.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instructions::test_support::setup;
    use crate::item::run;
    use crate::mediator::{DeviceSession, ShutterState};
    use crate::ItemStatus;

    #[tokio::test]
    async fn test_open_slew_close_park() {
        let (sim, mut ctx) = setup();

        run(&mut OpenDomeShutter::new(ItemSettings::default()), &mut ctx).await.unwrap();
        assert_eq!(sim.dome.get_info().shutter, ShutterState::Open);

        let mut slew = SlewDomeAzimuth::new(ItemSettings::default(), SlewDomeAzimuthConfig { azimuth: 200.0 });
        run(&mut slew, &mut ctx).await.unwrap();
        assert_eq!(sim.dome.get_info().azimuth, 200.0);

        run(&mut CloseDomeShutter::new(ItemSettings::default()), &mut ctx).await.unwrap();
        run(&mut ParkDome::new(ItemSettings::default()), &mut ctx).await.unwrap();
        let info = sim.dome.get_info();
        assert_eq!(info.shutter, ShutterState::Closed);
        assert!(info.at_park);
    }

    #[tokio::test]
    async fn test_incapable_dome_is_an_issue() {
        let (sim, mut ctx) = setup();
        sim.dome.hub().update(|info| info.can_set_shutter = false);
        let mut open = OpenDomeShutter::new(ItemSettings::default());
        run(&mut open, &mut ctx).await.unwrap();
        assert_eq!(open.status(), ItemStatus::Skipped);
    }
}
