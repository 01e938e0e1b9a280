mod common;

use common::{exposure, note, target, three_area_root};
use nina_sequencer::conditions::LoopCondition;
use nina_sequencer::instructions::utility::{WaitForTimeSpan, WaitForTimeSpanConfig};
use nina_sequencer::simulator::SimulatedEquipment;
use nina_sequencer::{
    EstimationMode, ItemSettings, SequenceContainer, SequenceExecutor, SequenceFile, SequenceItem,
};
use std::time::Duration;

fn block(iterations: u32, completed: u32, secs: f64) -> Box<dyn SequenceItem> {
    Box::new(
        SequenceContainer::sequential("Block")
            .with_condition(Box::new(LoopCondition::with_progress(iterations, completed)))
            .with_item(exposure(secs)),
    )
}

fn three_blocks(progress: [u32; 3], outer: Option<(u32, u32)>) -> SequenceContainer {
    let mut outer_container = SequenceContainer::sequential("Outer");
    if let Some((iterations, completed)) = outer {
        outer_container.add_condition(Box::new(LoopCondition::with_progress(iterations, completed)));
    }
    for (completed, secs) in progress.into_iter().zip([60.0, 30.0, 15.0]) {
        outer_container.add(block(10, completed, secs));
    }
    outer_container
}

#[test]
fn standard_mode_skips_completed_blocks() {
    let outer = three_blocks([10, 0, 0], Some((1, 0)));
    assert_eq!(
        outer.calculate_estimated_runtime(EstimationMode::Standard),
        Duration::from_secs(450)
    );
}

#[test]
fn standard_mode_counts_partial_progress() {
    // 4 of 10 left in the second block
    let outer = three_blocks([10, 6, 0], None);
    assert_eq!(
        outer.calculate_estimated_runtime(EstimationMode::Standard),
        Duration::from_secs(4 * 30 + 10 * 15)
    );
}

#[test]
fn rotate_mode_visits_each_block_per_outer_pass() {
    let outer = three_blocks([10, 0, 0], Some((3, 0)));
    assert_eq!(
        outer.calculate_estimated_runtime(EstimationMode::Rotate),
        Duration::from_secs(3 * 30 + 3 * 15)
    );
}

#[test]
fn rotate_mode_with_finished_blocks_still_estimates_one_pass() {
    let outer = three_blocks([10, 10, 10], Some((2, 0)));
    assert_eq!(
        outer.calculate_estimated_runtime(EstimationMode::Rotate),
        Duration::from_secs(60 + 30 + 15)
    );
}

#[test]
fn disabled_items_do_not_count() {
    let mut set = SequenceContainer::sequential("Set");
    set.add(exposure(100.0));
    set.add(common::exposure_with(
        nina_sequencer::ItemSettings::default().disabled(),
        500.0,
    ));
    assert_eq!(set.estimated_duration(), Duration::from_secs(100));
}

#[tokio::test]
async fn nothing_remains_after_a_run() {
    let sim = SimulatedEquipment::default();
    let dso = SequenceContainer::deep_sky_object(target("M42"))
        .with_condition(Box::new(LoopCondition::new(2)))
        .with_item(exposure(120.0));
    let root = three_area_root(note("start"), vec![Box::new(dso)], note("end"));

    let mut executor = SequenceExecutor::new(sim.equipment());
    executor.load(root).unwrap();
    assert_eq!(
        executor.estimated_remaining(EstimationMode::Standard),
        Duration::from_secs(240)
    );

    executor.run_to_completion().await.unwrap();
    assert_eq!(
        executor.estimated_remaining(EstimationMode::Standard),
        Duration::ZERO
    );
}

#[test]
fn nested_maximal_loops_saturate() {
    let mut nested: Box<dyn SequenceItem> = exposure(60.0);
    for depth in 0..3 {
        nested = Box::new(
            SequenceContainer::sequential(format!("Loop {}", depth))
                .with_condition(Box::new(LoopCondition::new(u32::MAX)))
                .with_item(nested),
        );
    }

    assert_eq!(nested.estimated_duration(), Duration::MAX);
    for mode in [EstimationMode::Standard, EstimationMode::Rotate] {
        assert_eq!(nested.remaining_duration(mode), Duration::MAX);
    }
}

#[test]
fn loaded_file_with_huge_wait_estimates_and_reports_issue() {
    let dso = SequenceContainer::deep_sky_object(target("M42"))
        .with_item(Box::new(WaitForTimeSpan::new(
            ItemSettings::default(),
            WaitForTimeSpanConfig { seconds: 1e300 },
        )))
        .with_item(exposure(1e300));
    let root = three_area_root(note("start"), vec![Box::new(dso)], note("end"));
    let json = SequenceFile::from_item(&root).to_json().unwrap();

    let loaded = SequenceFile::from_json(&json)
        .unwrap()
        .build_container()
        .unwrap();
    for mode in [EstimationMode::Standard, EstimationMode::Rotate] {
        assert_eq!(loaded.calculate_estimated_runtime(mode), Duration::MAX);
    }

    let sim = SimulatedEquipment::default();
    let mut executor = SequenceExecutor::new(sim.equipment());
    executor.load(loaded).unwrap();
    assert_eq!(
        executor.estimated_remaining(EstimationMode::Standard),
        Duration::MAX
    );
    let issues = executor.validate();
    assert!(issues.iter().any(|issue| issue.contains("Wait time")));
    assert!(issues.iter().any(|issue| issue.contains("Exposure time")));
}
