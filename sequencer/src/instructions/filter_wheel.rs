use crate::context::ExecutionContext;
use crate::definition::{ItemDefinition, ItemKind};
use crate::error::SequenceError;
use crate::instructions::require_connected;
use crate::item::{ItemCore, ItemDescriptor, SequenceItem};
use crate::mediator::Equipment;
use crate::ItemSettings;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SwitchFilterConfig {
    pub filter: String,
}

pub struct SwitchFilter {
    core: ItemCore,
    pub config: SwitchFilterConfig,
}

impl SwitchFilter {
    const DESCRIPTOR: ItemDescriptor = ItemDescriptor {
        name: "Switch Filter",
        category: "Filter Wheel",
        description: "Selects a filter",
        icon: "FW_SVG",
    };

    pub fn new(settings: ItemSettings, config: SwitchFilterConfig) -> Self {
        Self {
            core: ItemCore::new(settings, Self::DESCRIPTOR),
            config,
        }
    }
}

#[async_trait]
impl SequenceItem for SwitchFilter {
    fn core(&self) -> &ItemCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ItemCore {
        &mut self.core
    }

    fn validate(&mut self, equipment: &Equipment) -> bool {
        let info = equipment.filter_wheel.get_info();
        let mut issues = Vec::new();
        require_connected(&mut issues, info.connected, "Filter wheel");
        if info.connected && !info.filters.iter().any(|f| f == &self.config.filter) {
            issues.push(format!("Filter {} is not in the filter wheel", self.config.filter));
        }
        self.core.set_issues(issues)
    }

    async fn execute(&mut self, ctx: &mut ExecutionContext) -> Result<(), SequenceError> {
        tracing::info!("Changing to filter: {}", self.config.filter);
        ctx.equipment
            .filter_wheel
            .change_filter(&self.config.filter, &ctx.cancel)
            .await?;
        Ok(())
    }

    fn to_definition(&self) -> ItemDefinition {
        ItemDefinition {
            settings: self.core.settings.clone(),
            kind: ItemKind::SwitchFilter(self.config.clone()),
        }
    }
}
