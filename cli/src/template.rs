//! Starter sequence written by `nina template`

use nina_sequencer::astro::Coordinates;
use nina_sequencer::conditions::LoopCondition;
use nina_sequencer::instructions::camera::{
    CoolCamera, CoolCameraConfig, ExposureConfig, TakeExposure, WarmCamera, WarmCameraConfig,
};
use nina_sequencer::instructions::filter_wheel::{SwitchFilter, SwitchFilterConfig};
use nina_sequencer::instructions::focuser::RunAutofocus;
use nina_sequencer::instructions::guider::{StartGuiding, StartGuidingConfig, StopGuiding};
use nina_sequencer::instructions::telescope::{ParkScope, SlewConfig, SlewScopeToRaDec, UnparkScope};
use nina_sequencer::triggers::{AutofocusAfterFilterChange, DitherAfterExposures};
use nina_sequencer::{ErrorBehavior, ItemSettings, SequenceContainer, SequenceItem, Target};

/// Triggers only see a container's direct children, so they sit beside the exposures
fn filter_block(filter: &str, exposures: u32, seconds: f64) -> Box<dyn SequenceItem> {
    Box::new(
        SequenceContainer::sequential(format!("{} frames", filter))
            .with_condition(Box::new(LoopCondition::new(exposures)))
            .with_trigger(Box::new(AutofocusAfterFilterChange::new()))
            .with_trigger(Box::new(DitherAfterExposures::new(3)))
            .with_item(Box::new(SwitchFilter::new(
                ItemSettings::default(),
                SwitchFilterConfig {
                    filter: filter.to_string(),
                },
            )))
            .with_item(Box::new(TakeExposure::new(
                ItemSettings::default().with_attempts(1),
                ExposureConfig {
                    exposure_time: seconds,
                    ..Default::default()
                },
            ))),
    )
}

/// A single-target LRGB plan with cooling, guiding, dithering and a park at the end
pub fn sample_sequence() -> SequenceContainer {
    let mut root = SequenceContainer::new_root("Sample sequence");

    if let Some(start) = root.start_area_mut() {
        start.add(Box::new(CoolCamera::new(
            ItemSettings::default(),
            CoolCameraConfig {
                temperature: -10.0,
                duration_minutes: 0.0,
            },
        )));
        start.add(Box::new(UnparkScope::new(ItemSettings::default())));
    }

    let m42 = Target {
        name: "M42".to_string(),
        coordinates: Coordinates::new(5.588, -5.39),
        rotation: 0.0,
    };
    let mut target = SequenceContainer::deep_sky_object(m42)
        .with_item(Box::new(SlewScopeToRaDec::new(
            ItemSettings::default()
                .with_attempts(2)
                .with_error_behavior(ErrorBehavior::SkipInstructionSetOnError),
            SlewConfig {
                coordinates: None,
                inherit_coordinates: true,
            },
        )))
        .with_item(Box::new(StartGuiding::new(
            ItemSettings::default().with_attempts(1),
            StartGuidingConfig::default(),
        )))
        .with_item(Box::new(RunAutofocus::new(ItemSettings::default())));
    for filter in ["L", "R", "G", "B"] {
        target.add(filter_block(filter, 10, 120.0));
    }
    target.add(Box::new(StopGuiding::new(ItemSettings::default())));

    if let Some(targets) = root.target_area_mut() {
        targets.add(Box::new(target));
    }

    if let Some(end) = root.end_area_mut() {
        end.add(Box::new(ParkScope::new(
            ItemSettings::default().with_error_behavior(ErrorBehavior::AbortOnError),
        )));
        end.add(Box::new(WarmCamera::new(
            ItemSettings::default(),
            WarmCameraConfig {
                duration_minutes: 0.0,
            },
        )));
    }
    root
}
