#![allow(dead_code)]

use nina_sequencer::astro::Coordinates;
use nina_sequencer::instructions::camera::{ExposureConfig, TakeExposure};
use nina_sequencer::instructions::utility::{Annotation, AnnotationConfig};
use nina_sequencer::{ErrorBehavior, ItemSettings, SequenceContainer, SequenceItem, Target};

pub fn exposure(secs: f64) -> Box<dyn SequenceItem> {
    exposure_with(ItemSettings::default(), secs)
}

pub fn exposure_with(settings: ItemSettings, secs: f64) -> Box<dyn SequenceItem> {
    Box::new(TakeExposure::new(
        settings,
        ExposureConfig {
            exposure_time: secs,
            ..Default::default()
        },
    ))
}

pub fn failing_exposure(behavior: ErrorBehavior) -> Box<dyn SequenceItem> {
    exposure_with(
        ItemSettings::named("Failing exposure").with_error_behavior(behavior),
        5.0,
    )
}

pub fn note(text: &str) -> Box<dyn SequenceItem> {
    Box::new(Annotation::new(
        ItemSettings::default(),
        AnnotationConfig { text: text.into() },
    ))
}

pub fn target(name: &str) -> Target {
    Target {
        name: name.to_string(),
        coordinates: Coordinates::new(5.588, -5.39),
        rotation: 0.0,
    }
}

/// Root with one item in each of the start, target and end areas
pub fn three_area_root(
    start: Box<dyn SequenceItem>,
    targets: Vec<Box<dyn SequenceItem>>,
    end: Box<dyn SequenceItem>,
) -> SequenceContainer {
    let mut root = SequenceContainer::new_root("Night");
    if let Some(area) = root.start_area_mut() {
        area.add(start);
    }
    if let Some(area) = root.target_area_mut() {
        for item in targets {
            area.add(item);
        }
    }
    if let Some(area) = root.end_area_mut() {
        area.add(end);
    }
    root
}

pub fn area(root: &SequenceContainer, index: usize) -> &SequenceContainer {
    root.items()[index]
        .as_container()
        .expect("root areas are containers")
}
