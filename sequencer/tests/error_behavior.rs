mod common;

use common::{area, exposure, failing_exposure, note, target, three_area_root};
use nina_sequencer::instructions::telescope::ParkScope;
use nina_sequencer::instructions::utility::{WaitForTimeSpan, WaitForTimeSpanConfig};
use nina_sequencer::mediator::DeviceSession;
use nina_sequencer::simulator::SimulatedEquipment;
use nina_sequencer::{
    run, ErrorBehavior, ExecutionContext, ExecutorState, ItemSettings, ItemStatus,
    SequenceContainer, SequenceExecutor, SequenceItem,
};

fn park() -> Box<dyn SequenceItem> {
    Box::new(ParkScope::new(ItemSettings::default()))
}

#[tokio::test]
async fn retries_recover_from_transient_failures() {
    let sim = SimulatedEquipment::default();
    sim.camera.inject_failures(2);
    let mut ctx = ExecutionContext::new(sim.equipment());

    let mut item = common::exposure_with(ItemSettings::default().with_attempts(2), 1.0);
    run(item.as_mut(), &mut ctx).await.unwrap();

    assert_eq!(item.status(), ItemStatus::Finished);
    assert_eq!(sim.camera.capture_count(), 1);
}

#[tokio::test]
async fn continue_on_error_runs_the_next_item() {
    let sim = SimulatedEquipment::default();
    sim.camera.inject_failures(1);
    let mut ctx = ExecutionContext::new(sim.equipment());

    let mut set = SequenceContainer::sequential("Set")
        .with_item(failing_exposure(ErrorBehavior::ContinueOnError))
        .with_item(exposure(1.0));
    run(&mut set, &mut ctx).await.unwrap();

    assert_eq!(set.items()[0].status(), ItemStatus::Failed);
    assert_eq!(set.items()[1].status(), ItemStatus::Finished);
    assert_eq!(set.aggregate_status(), ItemStatus::Failed);
}

#[tokio::test]
async fn abort_interrupts_the_root_once() {
    let sim = SimulatedEquipment::default();
    sim.camera.inject_failures(1);

    let dso = SequenceContainer::deep_sky_object(target("M42"))
        .with_item(failing_exposure(ErrorBehavior::AbortOnError))
        .with_item(exposure(1.0));
    let root = three_area_root(note("start"), vec![Box::new(dso)], park());
    let root_handle = root.interrupt_handle().unwrap();
    let target_area_handle = area(&root, 1).interrupt_handle().unwrap();

    let mut executor = SequenceExecutor::new(sim.equipment());
    executor.load(root).unwrap();
    let summary = executor.run_to_completion().await.unwrap();

    assert!(summary.aborted);
    assert_eq!(executor.state(), ExecutorState::Failed);
    assert_eq!(root_handle.interrupt_count(), 1);
    assert_eq!(target_area_handle.interrupt_count(), 0);

    let root = executor.sequence().unwrap();
    let dso = area(root, 1).items()[0].as_container().unwrap();
    assert_eq!(dso.items()[0].status(), ItemStatus::Failed);
    assert_eq!(dso.items()[1].status(), ItemStatus::Created);
    // end instructions do not run after an abort
    assert_eq!(area(root, 2).items()[0].status(), ItemStatus::Created);
    assert!(!sim.telescope.get_info().at_park);
}

#[tokio::test]
async fn skip_to_end_still_runs_end_instructions() {
    let sim = SimulatedEquipment::default();
    sim.camera.inject_failures(1);

    let first = SequenceContainer::deep_sky_object(target("M42"))
        .with_item(failing_exposure(ErrorBehavior::SkipToSequenceEndInstructions))
        .with_item(exposure(1.0));
    let second = SequenceContainer::deep_sky_object(target("M31")).with_item(exposure(1.0));
    let root = three_area_root(note("start"), vec![Box::new(first), Box::new(second)], park());
    let root_handle = root.interrupt_handle().unwrap();

    let mut executor = SequenceExecutor::new(sim.equipment());
    executor.load(root).unwrap();
    let summary = executor.run_to_completion().await.unwrap();

    assert!(!summary.aborted);
    assert_eq!(root_handle.interrupt_count(), 0);
    assert_eq!(executor.state(), ExecutorState::Completed);

    let root = executor.sequence().unwrap();
    assert_eq!(area(root, 0).items()[0].status(), ItemStatus::Finished);
    let targets = area(root, 1);
    assert_eq!(targets.status(), ItemStatus::Skipped);
    // nothing else in the target area ran
    let second = targets.items()[1].as_container().unwrap();
    assert_eq!(second.items()[0].status(), ItemStatus::Created);
    assert_eq!(sim.camera.capture_count(), 0);

    assert_eq!(area(root, 2).items()[0].status(), ItemStatus::Finished);
    assert!(sim.telescope.get_info().at_park);
}

/// A target whose parallel block has a slow branch first and a failing exposure second
fn target_with_parallel_failure(behavior: ErrorBehavior) -> SequenceContainer {
    let slow_branch = SequenceContainer::sequential("Slow branch")
        .with_item(Box::new(WaitForTimeSpan::new(
            ItemSettings::default(),
            WaitForTimeSpanConfig { seconds: 0.05 },
        )))
        .with_item(note("after wait"));
    let parallel = SequenceContainer::parallel("Parallel")
        .with_item(Box::new(slow_branch))
        .with_item(failing_exposure(behavior));
    SequenceContainer::deep_sky_object(target("M42"))
        .with_item(Box::new(parallel))
        .with_item(exposure(1.0))
}

#[tokio::test]
async fn skip_to_end_from_a_parallel_branch() {
    let sim = SimulatedEquipment::default();
    sim.camera.inject_failures(1);

    let first = target_with_parallel_failure(ErrorBehavior::SkipToSequenceEndInstructions);
    let second = SequenceContainer::deep_sky_object(target("M31")).with_item(exposure(1.0));
    let root = three_area_root(note("start"), vec![Box::new(first), Box::new(second)], park());

    let mut executor = SequenceExecutor::new(sim.equipment());
    executor.load(root).unwrap();
    let summary = executor.run_to_completion().await.unwrap();

    assert!(!summary.aborted);
    assert_eq!(executor.state(), ExecutorState::Completed);

    let root = executor.sequence().unwrap();
    let targets = area(root, 1);
    assert_eq!(targets.status(), ItemStatus::Skipped);

    let first = targets.items()[0].as_container().unwrap();
    let parallel = first.items()[0].as_container().unwrap();
    assert_eq!(parallel.items()[1].status(), ItemStatus::Failed);
    // the running wait finishes, the rest of its branch never starts
    let slow_branch = parallel.items()[0].as_container().unwrap();
    assert_eq!(slow_branch.status(), ItemStatus::Skipped);
    assert_eq!(slow_branch.items()[0].status(), ItemStatus::Finished);
    assert_eq!(slow_branch.items()[1].status(), ItemStatus::Created);
    assert_eq!(first.items()[1].status(), ItemStatus::Created);

    let second = targets.items()[1].as_container().unwrap();
    assert_eq!(second.items()[0].status(), ItemStatus::Created);
    assert_eq!(sim.camera.capture_count(), 0);

    assert_eq!(area(root, 2).items()[0].status(), ItemStatus::Finished);
    assert!(sim.telescope.get_info().at_park);
}

#[tokio::test]
async fn abort_from_a_parallel_branch_skips_end_instructions() {
    let sim = SimulatedEquipment::default();
    sim.camera.inject_failures(1);

    let first = target_with_parallel_failure(ErrorBehavior::AbortOnError);
    let root = three_area_root(note("start"), vec![Box::new(first)], park());
    let root_handle = root.interrupt_handle().unwrap();

    let mut executor = SequenceExecutor::new(sim.equipment());
    executor.load(root).unwrap();
    let summary = executor.run_to_completion().await.unwrap();

    assert!(summary.aborted);
    assert_eq!(executor.state(), ExecutorState::Failed);
    assert_eq!(root_handle.interrupt_count(), 1);

    let root = executor.sequence().unwrap();
    let first = area(root, 1).items()[0].as_container().unwrap();
    let parallel = first.items()[0].as_container().unwrap();
    let slow_branch = parallel.items()[0].as_container().unwrap();
    assert_eq!(slow_branch.items()[1].status(), ItemStatus::Created);
    assert_eq!(first.items()[1].status(), ItemStatus::Created);

    assert_eq!(area(root, 2).items()[0].status(), ItemStatus::Created);
    assert!(!sim.telescope.get_info().at_park);
}

#[tokio::test]
async fn skip_instruction_set_moves_on_to_the_next_target() {
    let sim = SimulatedEquipment::default();
    sim.camera.inject_failures(1);

    let first = SequenceContainer::deep_sky_object(target("M42"))
        .with_item(failing_exposure(ErrorBehavior::SkipInstructionSetOnError))
        .with_item(exposure(1.0));
    let second = SequenceContainer::deep_sky_object(target("M31")).with_item(exposure(1.0));
    let root = three_area_root(note("start"), vec![Box::new(first), Box::new(second)], park());

    let mut executor = SequenceExecutor::new(sim.equipment());
    executor.load(root).unwrap();
    executor.run_to_completion().await.unwrap();

    let root = executor.sequence().unwrap();
    let targets = area(root, 1);
    let first = targets.items()[0].as_container().unwrap();
    assert_eq!(first.status(), ItemStatus::Skipped);
    assert_eq!(first.items()[1].status(), ItemStatus::Created);

    let second = targets.items()[1].as_container().unwrap();
    assert_eq!(second.items()[0].status(), ItemStatus::Finished);
    assert_eq!(sim.camera.capture_count(), 1);
    assert_eq!(area(root, 2).items()[0].status(), ItemStatus::Finished);
}

#[tokio::test]
async fn validation_issues_skip_without_failing() {
    let sim = SimulatedEquipment::default();
    sim.camera.set_connected(false);
    let mut ctx = ExecutionContext::new(sim.equipment());

    let mut set = SequenceContainer::sequential("Set")
        .with_item(common::exposure_with(
            ItemSettings::default().with_error_behavior(ErrorBehavior::AbortOnError),
            1.0,
        ))
        .with_item(note("after"));
    run(&mut set, &mut ctx).await.unwrap();

    assert_eq!(set.items()[0].status(), ItemStatus::Skipped);
    assert_eq!(
        set.items()[0].issues().to_vec(),
        vec!["Camera is not connected".to_string()]
    );
    assert_eq!(set.items()[1].status(), ItemStatus::Finished);
}
