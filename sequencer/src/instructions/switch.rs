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
pub struct SetSwitchValueConfig {
    pub index: u16,
    pub value: f64,
}

pub struct SetSwitchValue {
    core: ItemCore,
    pub config: SetSwitchValueConfig,
}

impl SetSwitchValue {
    const DESCRIPTOR: ItemDescriptor = ItemDescriptor {
        name: "Set Switch Value",
        category: "Switch",
        description: "Sets the value of a writable switch",
        icon: "ButtonSVG",
    };

    pub fn new(settings: ItemSettings, config: SetSwitchValueConfig) -> Self {
        Self {
            core: ItemCore::new(settings, Self::DESCRIPTOR),
            config,
        }
    }
}

#[async_trait]
impl SequenceItem for SetSwitchValue {
    fn core(&self) -> &ItemCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ItemCore {
        &mut self.core
    }

    fn validate(&mut self, equipment: &Equipment) -> bool {
        let info = equipment.switch.get_info();
        let mut issues = Vec::new();
        require_connected(&mut issues, info.connected, "Switch");
        if info.connected {
            match info.port(self.config.index) {
                None => issues.push(format!("No switch at index {}", self.config.index)),
                Some(port) if !port.writable => {
                    issues.push(format!("Switch {} is read only", port.name))
                }
                Some(port) if self.config.value < port.minimum || self.config.value > port.maximum => {
                    issues.push(format!(
                        "Value {} is outside {}..={} for {}",
                        self.config.value, port.minimum, port.maximum, port.name
                    ))
                }
                Some(_) => {}
            }
        }
        self.core.set_issues(issues)
    }

    async fn execute(&mut self, ctx: &mut ExecutionContext) -> Result<(), SequenceError> {
        tracing::info!(
            "Setting switch {} to {}",
            self.config.index,
            self.config.value
        );
        ctx.equipment
            .switch
            .set_value(self.config.index, self.config.value, &ctx.cancel)
            .await?;
        Ok(())
    }

    fn to_definition(&self) -> ItemDefinition {
        ItemDefinition {
            settings: self.core.settings.clone(),
            kind: ItemKind::SetSwitchValue(self.config.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instructions::test_support::setup;
    use crate::item::run;
    use crate::mediator::DeviceSession;
    use crate::ItemStatus;

    fn set(index: u16, value: f64) -> SetSwitchValue {
        SetSwitchValue::new(ItemSettings::default(), SetSwitchValueConfig { index, value })
    }

    #[tokio::test]
    async fn test_set_writable_switch() {
        let (sim, mut ctx) = setup();
        let mut item = set(0, 40.0);
        run(&mut item, &mut ctx).await.unwrap();
        assert_eq!(item.status(), ItemStatus::Finished);
        assert_eq!(sim.switch.get_info().port(0).map(|p| p.value), Some(40.0));
    }

    #[tokio::test]
    async fn test_read_only_and_out_of_range_are_issues() {
        let (_sim, mut ctx) = setup();

        let mut read_only = set(1, 12.0);
        run(&mut read_only, &mut ctx).await.unwrap();
        assert_eq!(read_only.status(), ItemStatus::Skipped);

        let mut too_high = set(0, 150.0);
        run(&mut too_high, &mut ctx).await.unwrap();
        assert_eq!(too_high.status(), ItemStatus::Skipped);
    }
}
