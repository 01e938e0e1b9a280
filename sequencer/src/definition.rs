//! Persisted form of a sequence tree
//!
//! Every item serializes to an [`ItemDefinition`]: its common settings plus a
//! `$type` discriminated configuration. Containers nest their children,
//! conditions and triggers. [`build_item`] turns a definition back into a
//! live tree with fresh ids and `Created` status.

use crate::container::{ContainerKind, ExecutionStrategy, SequenceContainer};
use crate::error::SequenceError;
use crate::instructions::camera::{
    CoolCamera, CoolCameraConfig, ExposureConfig, TakeExposure, WarmCamera, WarmCameraConfig,
};
use crate::instructions::dome::{
    CloseDomeShutter, OpenDomeShutter, ParkDome, SlewDomeAzimuth, SlewDomeAzimuthConfig,
};
use crate::instructions::filter_wheel::{SwitchFilter, SwitchFilterConfig};
use crate::instructions::focuser::{
    MoveFocuserAbsolute, MoveFocuserAbsoluteConfig, MoveFocuserByTemperature, MoveFocuserRelative,
    MoveFocuserRelativeConfig, RunAutofocus, TemperatureCompensationConfig,
};
use crate::instructions::guider::{Dither, StartGuiding, StartGuidingConfig, StopGuiding};
use crate::instructions::switch::{SetSwitchValue, SetSwitchValueConfig};
use crate::instructions::telescope::{
    ParkScope, SetTracking, SetTrackingConfig, SlewConfig, SlewScopeToRaDec, UnparkScope,
};
use crate::instructions::utility::{
    Annotation, AnnotationConfig, WaitForTime, WaitForTimeConfig, WaitForTimeSpan,
    WaitForTimeSpanConfig,
};
use crate::item::SequenceItem;
use crate::ItemSettings;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub use crate::conditions::ConditionDefinition;
pub use crate::triggers::TriggerDefinition;

/// Current sequence file format
pub const SEQUENCE_FILE_VERSION: u32 = 1;

/// Persisted item: shared settings plus kind-specific configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemDefinition {
    #[serde(flatten)]
    pub settings: ItemSettings,
    #[serde(flatten)]
    pub kind: ItemKind,
}

impl ItemDefinition {
    pub fn new(settings: ItemSettings, kind: ItemKind) -> Self {
        Self { settings, kind }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "$type")]
pub enum ItemKind {
    Container(ContainerConfig),

    // Camera
    TakeExposure(ExposureConfig),
    CoolCamera(CoolCameraConfig),
    WarmCamera(WarmCameraConfig),

    // Filter wheel
    SwitchFilter(SwitchFilterConfig),

    // Focuser
    MoveFocuserAbsolute(MoveFocuserAbsoluteConfig),
    MoveFocuserRelative(MoveFocuserRelativeConfig),
    MoveFocuserByTemperature(TemperatureCompensationConfig),
    RunAutofocus,

    // Telescope
    SlewScopeToRaDec(SlewConfig),
    ParkScope,
    UnparkScope,
    SetTracking(SetTrackingConfig),

    // Guider
    StartGuiding(StartGuidingConfig),
    StopGuiding,
    Dither,

    // Dome
    OpenDomeShutter,
    CloseDomeShutter,
    ParkDome,
    SlewDomeAzimuth(SlewDomeAzimuthConfig),

    // Switch
    SetSwitchValue(SetSwitchValueConfig),

    // Utility
    WaitForTimeSpan(WaitForTimeSpanConfig),
    WaitForTime(WaitForTimeConfig),
    Annotation(AnnotationConfig),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerConfig {
    pub kind: ContainerKind,
    #[serde(default)]
    pub strategy: ExecutionStrategy,
    #[serde(default)]
    pub items: Vec<ItemDefinition>,
    #[serde(default)]
    pub conditions: Vec<ConditionDefinition>,
    #[serde(default)]
    pub triggers: Vec<TriggerDefinition>,
}

/// Build a live item (and its whole subtree) from a definition
pub fn build_item(definition: &ItemDefinition) -> Result<Box<dyn SequenceItem>, SequenceError> {
    let settings = definition.settings.clone();
    let item: Box<dyn SequenceItem> = match &definition.kind {
        ItemKind::Container(config) => Box::new(SequenceContainer::from_config(settings, config)?),
        ItemKind::TakeExposure(c) => Box::new(TakeExposure::new(settings, c.clone())),
        ItemKind::CoolCamera(c) => Box::new(CoolCamera::new(settings, c.clone())),
        ItemKind::WarmCamera(c) => Box::new(WarmCamera::new(settings, c.clone())),
        ItemKind::SwitchFilter(c) => Box::new(SwitchFilter::new(settings, c.clone())),
        ItemKind::MoveFocuserAbsolute(c) => Box::new(MoveFocuserAbsolute::new(settings, c.clone())),
        ItemKind::MoveFocuserRelative(c) => Box::new(MoveFocuserRelative::new(settings, c.clone())),
        ItemKind::MoveFocuserByTemperature(c) => {
            Box::new(MoveFocuserByTemperature::new(settings, c.clone()))
        }
        ItemKind::RunAutofocus => Box::new(RunAutofocus::new(settings)),
        ItemKind::SlewScopeToRaDec(c) => Box::new(SlewScopeToRaDec::new(settings, c.clone())),
        ItemKind::ParkScope => Box::new(ParkScope::new(settings)),
        ItemKind::UnparkScope => Box::new(UnparkScope::new(settings)),
        ItemKind::SetTracking(c) => Box::new(SetTracking::new(settings, c.clone())),
        ItemKind::StartGuiding(c) => Box::new(StartGuiding::new(settings, c.clone())),
        ItemKind::StopGuiding => Box::new(StopGuiding::new(settings)),
        ItemKind::Dither => Box::new(Dither::new(settings)),
        ItemKind::OpenDomeShutter => Box::new(OpenDomeShutter::new(settings)),
        ItemKind::CloseDomeShutter => Box::new(CloseDomeShutter::new(settings)),
        ItemKind::ParkDome => Box::new(ParkDome::new(settings)),
        ItemKind::SlewDomeAzimuth(c) => Box::new(SlewDomeAzimuth::new(settings, c.clone())),
        ItemKind::SetSwitchValue(c) => Box::new(SetSwitchValue::new(settings, c.clone())),
        ItemKind::WaitForTimeSpan(c) => Box::new(WaitForTimeSpan::new(settings, c.clone())),
        ItemKind::WaitForTime(c) => Box::new(WaitForTime::new(settings, c.clone())),
        ItemKind::Annotation(c) => Box::new(Annotation::new(settings, c.clone())),
    };
    Ok(item)
}

/// A sequence as stored on disk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequenceFile {
    #[serde(default = "default_version")]
    pub version: u32,
    pub root: ItemDefinition,
}

fn default_version() -> u32 {
    SEQUENCE_FILE_VERSION
}

impl SequenceFile {
    pub fn from_item(item: &dyn SequenceItem) -> Self {
        Self {
            version: SEQUENCE_FILE_VERSION,
            root: item.to_definition(),
        }
    }

    pub fn to_json(&self) -> Result<String, SequenceError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, SequenceError> {
        let file: SequenceFile = serde_json::from_str(json)?;
        if file.version > SEQUENCE_FILE_VERSION {
            return Err(SequenceError::InvalidDefinition(format!(
                "sequence file version {} is newer than supported version {}",
                file.version, SEQUENCE_FILE_VERSION
            )));
        }
        Ok(file)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, SequenceError> {
        let path = path.as_ref();
        tracing::debug!("Loading sequence from {}", path.display());
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), SequenceError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_json()?)?;
        tracing::info!("Saved sequence to {}", path.display());
        Ok(())
    }

    /// Build the live tree
    pub fn build(&self) -> Result<Box<dyn SequenceItem>, SequenceError> {
        build_item(&self.root)
    }

    /// Build the live tree, requiring a container at the top
    pub fn build_container(&self) -> Result<SequenceContainer, SequenceError> {
        match &self.root.kind {
            ItemKind::Container(config) => {
                SequenceContainer::from_config(self.root.settings.clone(), config)
            }
            _ => Err(SequenceError::InvalidDefinition(
                "the top of a sequence file must be a container".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conditions::LoopCondition;
    use crate::container::walk;
    use crate::triggers::DitherAfterExposures;
    use crate::ItemStatus;

    fn sample() -> SequenceContainer {
        let mut root = SequenceContainer::new_root("Night");
        let target = crate::context::Target {
            name: "M31".to_string(),
            coordinates: crate::astro::Coordinates::new(0.712, 41.27),
            rotation: 0.0,
        };
        let dso = SequenceContainer::deep_sky_object(target)
            .with_condition(Box::new(LoopCondition::new(3)))
            .with_trigger(Box::new(DitherAfterExposures::new(2)))
            .with_item(Box::new(SlewScopeToRaDec::new(
                ItemSettings::default(),
                SlewConfig {
                    coordinates: None,
                    inherit_coordinates: true,
                },
            )))
            .with_item(Box::new(TakeExposure::new(
                ItemSettings::default().with_attempts(2),
                ExposureConfig::default(),
            )));
        if let Some(area) = root.target_area_mut() {
            area.add(Box::new(dso));
        }
        if let Some(area) = root.end_area_mut() {
            area.add(Box::new(ParkScope::new(ItemSettings::default().disabled())));
        }
        root
    }

    #[test]
    fn test_file_round_trip_preserves_structure() {
        let root = sample();
        let file = SequenceFile::from_item(&root);
        let json = file.to_json().unwrap();
        assert!(json.contains("\"$type\": \"TakeExposure\""));

        let loaded = SequenceFile::from_json(&json).unwrap();
        assert_eq!(loaded, file);

        let rebuilt = loaded.build().unwrap();
        assert_eq!(rebuilt.to_definition(), root.to_definition());
        assert_ne!(rebuilt.id(), root.id());
    }

    #[test]
    fn test_disabled_items_load_disabled() {
        let file = SequenceFile::from_item(&sample());
        let rebuilt = file.build().unwrap();
        let mut disabled = Vec::new();
        walk(rebuilt.as_ref(), &mut |item| {
            if item.status() == ItemStatus::Disabled {
                disabled.push(item.name().to_string());
            }
        });
        assert_eq!(disabled, vec!["Park Scope".to_string()]);
    }

    #[test]
    fn test_hand_written_file_uses_defaults() {
        let json = r#"{
            "root": {
                "$type": "Container",
                "name": "Quick",
                "kind": "Sequential",
                "items": [
                    { "$type": "TakeExposure", "exposure_time": 30 },
                    { "$type": "SwitchFilter", "filter": "Ha", "attempts": 1 },
                    { "$type": "RunAutofocus" }
                ],
                "conditions": [ { "$type": "Loop", "iterations": 2 } ]
            }
        }"#;
        let file = SequenceFile::from_json(json).unwrap();
        assert_eq!(file.version, SEQUENCE_FILE_VERSION);

        let container = file.build_container().unwrap();
        assert_eq!(container.items().len(), 3);
        assert_eq!(container.items()[0].name(), "Take Exposure");
        assert_eq!(container.items()[1].settings().attempts, 1);
        assert_eq!(container.loop_bounds(), (2, 0));
    }

    #[test]
    fn test_rejects_unknown_type_and_newer_version() {
        let unknown = r#"{ "root": { "$type": "Teleport" } }"#;
        assert!(matches!(
            SequenceFile::from_json(unknown),
            Err(SequenceError::Serialization(_))
        ));

        let newer = r#"{ "version": 99, "root": { "$type": "Dither" } }"#;
        assert!(matches!(
            SequenceFile::from_json(newer),
            Err(SequenceError::InvalidDefinition(_))
        ));
    }

    #[test]
    fn test_build_container_requires_container() {
        let file = SequenceFile {
            version: SEQUENCE_FILE_VERSION,
            root: ItemDefinition::new(ItemSettings::default(), ItemKind::Dither),
        };
        assert!(file.build_container().is_err());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sequences").join("night.json");
        let file = SequenceFile::from_item(&sample());
        file.save(&path).unwrap();
        assert_eq!(SequenceFile::load(&path).unwrap(), file);
    }
}
