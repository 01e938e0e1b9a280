use crate::context::ExecutionContext;
use crate::definition::{ItemDefinition, ItemKind};
use crate::error::SequenceError;
use crate::instructions::require_connected;
use crate::item::{ItemCore, ItemDescriptor, SequenceItem};
use crate::mediator::Equipment;
use crate::ItemSettings;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

fn guider_issues(equipment: &Equipment) -> Vec<String> {
    let mut issues = Vec::new();
    require_connected(&mut issues, equipment.guider.get_info().connected, "Guider");
    issues
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StartGuidingConfig {
    pub force_calibration: bool,
}

pub struct StartGuiding {
    core: ItemCore,
    pub config: StartGuidingConfig,
}

impl StartGuiding {
    const DESCRIPTOR: ItemDescriptor = ItemDescriptor {
        name: "Start Guiding",
        category: "Guider",
        description: "Starts guiding and waits for it to settle",
        icon: "GuiderSVG",
    };

    pub fn new(settings: ItemSettings, config: StartGuidingConfig) -> Self {
        Self {
            core: ItemCore::new(settings, Self::DESCRIPTOR),
            config,
        }
    }
}

#[async_trait]
impl SequenceItem for StartGuiding {
    fn core(&self) -> &ItemCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ItemCore {
        &mut self.core
    }

    fn validate(&mut self, equipment: &Equipment) -> bool {
        self.core.set_issues(guider_issues(equipment))
    }

    async fn execute(&mut self, ctx: &mut ExecutionContext) -> Result<(), SequenceError> {
        tracing::info!("Starting guiding (force calibration: {})", self.config.force_calibration);
        ctx.equipment
            .guider
            .start_guiding(self.config.force_calibration, &ctx.cancel)
            .await?;
        ctx.update_run_state(|s| s.exposures_since_dither = 0);
        Ok(())
    }

    fn estimated_duration(&self) -> Duration {
        if self.config.force_calibration {
            Duration::from_secs(120)
        } else {
            Duration::from_secs(15)
        }
    }

    fn to_definition(&self) -> ItemDefinition {
        ItemDefinition {
            settings: self.core.settings.clone(),
            kind: ItemKind::StartGuiding(self.config.clone()),
        }
    }
}

pub struct StopGuiding {
    core: ItemCore,
}

impl StopGuiding {
    const DESCRIPTOR: ItemDescriptor = ItemDescriptor {
        name: "Stop Guiding",
        category: "Guider",
        description: "Stops guiding",
        icon: "StopGuiderSVG",
    };

    pub fn new(settings: ItemSettings) -> Self {
        Self {
            core: ItemCore::new(settings, Self::DESCRIPTOR),
        }
    }
}

#[async_trait]
impl SequenceItem for StopGuiding {
    fn core(&self) -> &ItemCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ItemCore {
        &mut self.core
    }

    fn validate(&mut self, equipment: &Equipment) -> bool {
        self.core.set_issues(guider_issues(equipment))
    }

    async fn execute(&mut self, ctx: &mut ExecutionContext) -> Result<(), SequenceError> {
        ctx.equipment.guider.stop_guiding(&ctx.cancel).await?;
        Ok(())
    }

    fn to_definition(&self) -> ItemDefinition {
        ItemDefinition {
            settings: self.core.settings.clone(),
            kind: ItemKind::StopGuiding,
        }
    }
}

pub struct Dither {
    core: ItemCore,
}

impl Dither {
    const DESCRIPTOR: ItemDescriptor = ItemDescriptor {
        name: "Dither",
        category: "Guider",
        description: "Shifts the guide star and waits for guiding to settle",
        icon: "DitherSVG",
    };

    pub fn new(settings: ItemSettings) -> Self {
        Self {
            core: ItemCore::new(settings, Self::DESCRIPTOR),
        }
    }
}

#[async_trait]
impl SequenceItem for Dither {
    fn core(&self) -> &ItemCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ItemCore {
        &mut self.core
    }

    fn validate(&mut self, equipment: &Equipment) -> bool {
        self.core.set_issues(guider_issues(equipment))
    }

    async fn execute(&mut self, ctx: &mut ExecutionContext) -> Result<(), SequenceError> {
        ctx.equipment.guider.dither(&ctx.cancel).await?;
        ctx.update_run_state(|s| s.exposures_since_dither = 0);
        Ok(())
    }

    fn estimated_duration(&self) -> Duration {
        Duration::from_secs(10)
    }

    fn to_definition(&self) -> ItemDefinition {
        ItemDefinition {
            settings: self.core.settings.clone(),
            kind: ItemKind::Dither,
        }
    }
}
