//! Sequence containers: ordered children, loop conditions and triggers

use crate::conditions::SequenceCondition;
use crate::context::{ExecutionContext, InterruptHandle, ParentContext, Target};
use crate::definition::{ContainerConfig, ItemDefinition, ItemKind};
use crate::error::SequenceError;
use crate::item::{run, ItemCore, ItemDescriptor, IterationProfile, SequenceItem};
use crate::mediator::Equipment;
use crate::triggers::{self, SequenceTrigger};
use crate::{EstimationMode, ItemSettings, ItemStatus};
use async_trait::async_trait;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Role of a container in the tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ContainerKind {
    Sequential,
    Parallel,
    DeepSkyObject(Target),
    Root,
    StartArea,
    TargetArea,
    EndArea,
}

impl ContainerKind {
    fn descriptor(&self) -> ItemDescriptor {
        let (name, description) = match self {
            ContainerKind::Sequential => ("Sequential Instruction Set", "Runs its instructions one after another"),
            ContainerKind::Parallel => ("Parallel Instruction Set", "Runs its instructions at the same time"),
            ContainerKind::DeepSkyObject(_) => ("Deep Sky Object", "Instructions for a single target"),
            ContainerKind::Root => ("Sequence", "Root of a sequence"),
            ContainerKind::StartArea => ("Start", "Instructions run before the targets"),
            ContainerKind::TargetArea => ("Targets", "Target instructions"),
            ContainerKind::EndArea => ("End", "Instructions run at the end of the sequence"),
        };
        ItemDescriptor {
            name,
            category: "Container",
            description,
            icon: "ContainerSVG",
        }
    }
}

/// How a container runs its children
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ExecutionStrategy {
    #[default]
    Sequential,
    Parallel,
}

/// A container of sequence items
pub struct SequenceContainer {
    core: ItemCore,
    kind: ContainerKind,
    strategy: ExecutionStrategy,
    items: Vec<Box<dyn SequenceItem>>,
    conditions: Vec<Box<dyn SequenceCondition>>,
    triggers: Vec<Box<dyn SequenceTrigger>>,
    interrupt: InterruptHandle,
    inherited_target: Option<Target>,
}

impl SequenceContainer {
    pub fn new(kind: ContainerKind, settings: ItemSettings) -> Self {
        let strategy = match kind {
            ContainerKind::Parallel => ExecutionStrategy::Parallel,
            _ => ExecutionStrategy::Sequential,
        };
        Self {
            core: ItemCore::new(settings, kind.descriptor()),
            kind,
            strategy,
            items: Vec::new(),
            conditions: Vec::new(),
            triggers: Vec::new(),
            interrupt: InterruptHandle::new(),
            inherited_target: None,
        }
    }

    pub fn sequential(name: impl Into<String>) -> Self {
        Self::new(ContainerKind::Sequential, ItemSettings::named(name))
    }

    pub fn parallel(name: impl Into<String>) -> Self {
        Self::new(ContainerKind::Parallel, ItemSettings::named(name))
    }

    pub fn deep_sky_object(target: Target) -> Self {
        let settings = ItemSettings::named(target.name.clone());
        Self::new(ContainerKind::DeepSkyObject(target), settings)
    }

    /// A root container with start, target and end areas
    pub fn new_root(name: impl Into<String>) -> Self {
        let mut root = Self::new(ContainerKind::Root, ItemSettings::named(name));
        root.add(Box::new(Self::new(ContainerKind::StartArea, ItemSettings::default())));
        root.add(Box::new(Self::new(ContainerKind::TargetArea, ItemSettings::default())));
        root.add(Box::new(Self::new(ContainerKind::EndArea, ItemSettings::default())));
        root
    }

    pub(crate) fn from_config(settings: ItemSettings, config: &ContainerConfig) -> Result<Self, SequenceError> {
        let mut container = Self::new(config.kind.clone(), settings);
        container.strategy = config.strategy;
        for definition in &config.conditions {
            container.add_condition(definition.build());
        }
        for definition in &config.triggers {
            container.add_trigger(definition.build());
        }
        for definition in &config.items {
            container.add(crate::definition::build_item(definition)?);
        }
        Ok(container)
    }

    pub fn with_strategy(mut self, strategy: ExecutionStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_item(mut self, item: Box<dyn SequenceItem>) -> Self {
        self.add(item);
        self
    }

    pub fn with_condition(mut self, condition: Box<dyn SequenceCondition>) -> Self {
        self.add_condition(condition);
        self
    }

    pub fn with_trigger(mut self, trigger: Box<dyn SequenceTrigger>) -> Self {
        self.add_trigger(trigger);
        self
    }

    pub fn kind(&self) -> &ContainerKind {
        &self.kind
    }

    pub fn strategy(&self) -> ExecutionStrategy {
        self.strategy
    }

    pub fn set_strategy(&mut self, strategy: ExecutionStrategy) {
        self.strategy = strategy;
    }

    pub fn items(&self) -> &[Box<dyn SequenceItem>] {
        &self.items
    }

    pub fn item_mut(&mut self, index: usize) -> Option<&mut Box<dyn SequenceItem>> {
        self.items.get_mut(index)
    }

    pub fn conditions(&self) -> &[Box<dyn SequenceCondition>] {
        &self.conditions
    }

    pub fn triggers(&self) -> &[Box<dyn SequenceTrigger>] {
        &self.triggers
    }

    // =========================================================================
    // COMPOSITION
    // =========================================================================

    pub fn add(&mut self, item: Box<dyn SequenceItem>) {
        let index = self.items.len();
        self.insert(index, item);
    }

    /// Insert at `index`, clamped to the end of the list
    pub fn insert(&mut self, index: usize, mut item: Box<dyn SequenceItem>) {
        item.after_parent_changed(Some(&self.parent_context()));
        let index = index.min(self.items.len());
        self.items.insert(index, item);
    }

    /// Detach the child at `index`
    pub fn remove(&mut self, index: usize) -> Option<Box<dyn SequenceItem>> {
        if index >= self.items.len() {
            return None;
        }
        let mut item = self.items.remove(index);
        item.after_parent_changed(None);
        Some(item)
    }

    /// Move a child to a new position; returns false for out of range indices
    pub fn move_item(&mut self, from: usize, to: usize) -> bool {
        if from >= self.items.len() || to >= self.items.len() {
            return false;
        }
        let item = self.items.remove(from);
        self.items.insert(to, item);
        let parent = self.parent_context();
        self.items[to].after_parent_changed(Some(&parent));
        true
    }

    pub fn clear(&mut self) {
        for mut item in self.items.drain(..) {
            item.after_parent_changed(None);
        }
    }

    pub fn add_condition(&mut self, condition: Box<dyn SequenceCondition>) {
        self.conditions.push(condition);
    }

    pub fn remove_condition(&mut self, index: usize) -> Option<Box<dyn SequenceCondition>> {
        (index < self.conditions.len()).then(|| self.conditions.remove(index))
    }

    pub fn add_trigger(&mut self, trigger: Box<dyn SequenceTrigger>) {
        self.triggers.push(trigger);
    }

    pub fn remove_trigger(&mut self, index: usize) -> Option<Box<dyn SequenceTrigger>> {
        (index < self.triggers.len()).then(|| self.triggers.remove(index))
    }

    /// First child container of the given kind
    pub fn find_child_mut(&mut self, kind: &ContainerKind) -> Option<&mut SequenceContainer> {
        self.items
            .iter_mut()
            .filter_map(|item| item.as_container_mut())
            .find(|container| &container.kind == kind)
    }

    pub fn start_area_mut(&mut self) -> Option<&mut SequenceContainer> {
        self.find_child_mut(&ContainerKind::StartArea)
    }

    pub fn target_area_mut(&mut self) -> Option<&mut SequenceContainer> {
        self.find_child_mut(&ContainerKind::TargetArea)
    }

    pub fn end_area_mut(&mut self) -> Option<&mut SequenceContainer> {
        self.find_child_mut(&ContainerKind::EndArea)
    }

    /// Target of this container or the nearest DSO ancestor
    pub fn effective_target(&self) -> Option<&Target> {
        match &self.kind {
            ContainerKind::DeepSkyObject(target) => Some(target),
            _ => self.inherited_target.as_ref(),
        }
    }

    /// Replace the target of a DSO container and push it to the children
    pub fn set_target(&mut self, target: Target) -> bool {
        match &mut self.kind {
            ContainerKind::DeepSkyObject(current) => {
                *current = target;
                self.propagate_parent();
                true
            }
            _ => false,
        }
    }

    fn parent_context(&self) -> ParentContext {
        ParentContext {
            container_id: self.core.id.clone(),
            target: self.effective_target().cloned(),
        }
    }

    fn propagate_parent(&mut self) {
        let parent = self.parent_context();
        for item in &mut self.items {
            item.after_parent_changed(Some(&parent));
        }
    }

    /// Request that this container stops after its current child
    pub fn interrupt(&self) {
        tracing::info!("Interrupting {}", self.core.settings.name);
        self.interrupt.interrupt();
    }

    /// Clear pending interrupts in this subtree
    pub fn clear_interrupts(&mut self) {
        self.interrupt.clear();
        for item in &mut self.items {
            if let Some(container) = item.as_container_mut() {
                container.clear_interrupts();
            }
        }
    }

    /// Status derived from the enabled children
    pub fn aggregate_status(&self) -> ItemStatus {
        if self.core.status == ItemStatus::Disabled {
            return ItemStatus::Disabled;
        }
        let statuses: Vec<ItemStatus> = self
            .items
            .iter()
            .map(|item| match item.as_container() {
                Some(container) => container.aggregate_status(),
                None => item.status(),
            })
            .filter(|status| *status != ItemStatus::Disabled)
            .collect();

        if statuses.is_empty() {
            return self.core.status;
        }
        if statuses.contains(&ItemStatus::Running) {
            return ItemStatus::Running;
        }
        if statuses.contains(&ItemStatus::Failed) {
            return ItemStatus::Failed;
        }
        if statuses.iter().all(|s| *s == ItemStatus::Created) {
            return ItemStatus::Created;
        }
        if statuses.iter().all(|s| s.is_terminal()) {
            return if statuses.contains(&ItemStatus::Finished) {
                ItemStatus::Finished
            } else {
                ItemStatus::Skipped
            };
        }
        // partially run
        if self.core.status == ItemStatus::Running {
            ItemStatus::Running
        } else {
            ItemStatus::Created
        }
    }

    // =========================================================================
    // ESTIMATION
    // =========================================================================

    /// Estimated time until this container completes
    pub fn calculate_estimated_runtime(&self, mode: EstimationMode) -> Duration {
        self.remaining_duration(mode)
    }

    /// Loop bounds `(iterations, completed)` from the first bounded condition
    pub fn loop_bounds(&self) -> (u32, u32) {
        self.conditions
            .iter()
            .find_map(|condition| condition.loop_bounds())
            .unwrap_or((1, 0))
    }

    fn combine<I>(&self, durations: I) -> Duration
    where
        I: Iterator<Item = Duration>,
    {
        match self.strategy {
            ExecutionStrategy::Sequential => {
                durations.fold(Duration::ZERO, Duration::saturating_add)
            }
            ExecutionStrategy::Parallel => durations.max().unwrap_or_default(),
        }
    }

    fn per_pass_duration(&self) -> Duration {
        self.combine(
            self.items
                .iter()
                .filter(|item| item.status() != ItemStatus::Disabled)
                .map(|item| item.estimated_duration()),
        )
    }

    // =========================================================================
    // EXECUTION
    // =========================================================================

    fn check_interrupt(&self, ctx: &ExecutionContext) -> Result<(), SequenceError> {
        if self.interrupt.is_interrupted() || ctx.scope.is_interrupted() {
            return Err(SequenceError::Skipped(format!(
                "{} was interrupted",
                self.core.settings.name
            )));
        }
        Ok(())
    }

    fn conditions_hold(
        &self,
        previous: Option<usize>,
        next: Option<usize>,
        ctx: &ExecutionContext,
    ) -> bool {
        let previous = previous.and_then(|i| self.items.get(i)).map(|item| item.as_ref());
        let next = next.and_then(|i| self.items.get(i)).map(|item| item.as_ref());
        self.conditions
            .iter()
            .all(|condition| condition.check(previous, next, ctx))
    }

    async fn fire_triggers(
        &mut self,
        previous: Option<usize>,
        next: Option<usize>,
        ctx: &mut ExecutionContext,
    ) -> Result<(), SequenceError> {
        if self.triggers.is_empty() {
            return Ok(());
        }
        let previous_item = previous.and_then(|i| self.items.get(i)).map(|item| item.as_ref());
        let next_item = next.and_then(|i| self.items.get(i)).map(|item| item.as_ref());
        let due: Vec<usize> = self
            .triggers
            .iter()
            .enumerate()
            .filter(|(_, trigger)| trigger.should_trigger(previous_item, next_item, ctx))
            .map(|(index, _)| index)
            .collect();
        let next_name = next_item.map(|item| item.name().to_string());

        for index in due {
            triggers::run_trigger(self.triggers[index].as_mut(), next_name.as_deref(), ctx).await?;
        }
        Ok(())
    }

    async fn run_sequential(&mut self, ctx: &mut ExecutionContext) -> Result<(), SequenceError> {
        let mut previous: Option<usize> = None;
        for index in 0..self.items.len() {
            ctx.check_cancelled()?;
            self.check_interrupt(ctx)?;
            ctx.scope.set_top_level_index(index);

            self.fire_triggers(previous, Some(index), ctx).await?;
            run(self.items[index].as_mut(), ctx).await?;
            if self.items[index].status() != ItemStatus::Disabled {
                previous = Some(index);
            }

            self.check_interrupt(ctx)?;
            let next = (index + 1 < self.items.len()).then_some(index + 1);
            if !self.conditions_hold(previous, next, ctx) {
                tracing::debug!("{}: conditions no longer met", self.core.settings.name);
                return Ok(());
            }
        }
        self.fire_triggers(previous, None, ctx).await
    }

    async fn run_parallel(&mut self, ctx: &mut ExecutionContext) -> Result<(), SequenceError> {
        let mut branches: Vec<ExecutionContext> = self.items.iter().map(|_| ctx.clone()).collect();
        let results = join_all(
            self.items
                .iter_mut()
                .zip(branches.iter_mut())
                .map(|(item, branch)| run(item.as_mut(), branch)),
        )
        .await;

        for result in results {
            result?;
        }
        self.check_interrupt(ctx)
    }

    async fn run_iterations(&mut self, ctx: &mut ExecutionContext) -> Result<(), SequenceError> {
        for condition in &mut self.conditions {
            condition.initialize(ctx);
        }
        for trigger in &mut self.triggers {
            trigger.initialize(ctx);
        }

        let mut iteration = 0u32;
        loop {
            ctx.check_cancelled()?;
            self.check_interrupt(ctx)?;
            if !self.conditions_hold(None, (!self.items.is_empty()).then_some(0), ctx) {
                break;
            }
            if iteration > 0 {
                for item in &mut self.items {
                    item.reset_progress();
                }
            }

            for condition in &mut self.conditions {
                condition.sequence_block_started(ctx);
            }
            for trigger in &mut self.triggers {
                trigger.sequence_block_started(ctx);
            }

            match self.strategy {
                ExecutionStrategy::Sequential => self.run_sequential(ctx).await?,
                ExecutionStrategy::Parallel => self.run_parallel(ctx).await?,
            }

            for condition in &mut self.conditions {
                condition.sequence_block_finished(ctx);
            }
            iteration += 1;

            if self.conditions.is_empty() {
                break;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl SequenceItem for SequenceContainer {
    fn core(&self) -> &ItemCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ItemCore {
        &mut self.core
    }

    fn validate(&mut self, equipment: &Equipment) -> bool {
        let mut issues = Vec::new();
        for condition in &self.conditions {
            issues.extend(condition.validate(equipment));
        }
        for trigger in &self.triggers {
            issues.extend(trigger.validate(equipment));
        }
        let mut children_ok = true;
        for item in &mut self.items {
            if item.status() != ItemStatus::Disabled && !item.validate(equipment) {
                children_ok = false;
            }
        }
        self.core.set_issues(issues) && children_ok
    }

    async fn execute(&mut self, ctx: &mut ExecutionContext) -> Result<(), SequenceError> {
        self.check_interrupt(ctx)?;

        let outer_scope = ctx.scope.clone();
        let outer_target = ctx.target.clone();
        ctx.scope = match self.kind {
            ContainerKind::Root => {
                let top_level = self.items.iter().map(|item| item.interrupt_handle()).collect();
                let end_index = self.items.iter().position(|item| {
                    matches!(
                        item.as_container().map(|c| &c.kind),
                        Some(ContainerKind::EndArea)
                    )
                });
                outer_scope.enter_root(self.interrupt.clone(), top_level, end_index)
            }
            _ => outer_scope.enter(self.interrupt.clone()),
        };
        if let ContainerKind::DeepSkyObject(target) = &self.kind {
            tracing::info!(
                "Target {}: RA {:.4}h Dec {:.4}",
                target.name,
                target.coordinates.ra_hours,
                target.coordinates.dec_degrees
            );
            ctx.target = Some(target.clone());
        }

        let result = self.run_iterations(ctx).await;

        ctx.scope = outer_scope;
        ctx.target = outer_target;
        result
    }

    fn estimated_duration(&self) -> Duration {
        let (iterations, _) = self.loop_bounds();
        saturating_mul(self.per_pass_duration(), iterations)
    }

    fn remaining_duration(&self, mode: EstimationMode) -> Duration {
        if matches!(
            self.core.status,
            ItemStatus::Finished | ItemStatus::Skipped | ItemStatus::Failed | ItemStatus::Disabled
        ) {
            return Duration::ZERO;
        }
        let (iterations, completed) = self.loop_bounds();
        let remaining = iterations.saturating_sub(completed);
        if remaining == 0 {
            return Duration::ZERO;
        }

        let enabled = || {
            self.items
                .iter()
                .filter(|item| item.status() != ItemStatus::Disabled)
        };
        match mode {
            EstimationMode::Standard => {
                let current = self.combine(enabled().map(|item| item.remaining_duration(mode)));
                current.saturating_add(saturating_mul(self.per_pass_duration(), remaining - 1))
            }
            EstimationMode::Rotate => {
                let rotated = self.combine(enabled().map(|item| {
                    let profile = item.iteration_profile();
                    saturating_mul(profile.per_iteration, profile.remaining().min(remaining))
                }));
                if rotated.is_zero() {
                    self.combine(enabled().map(|item| item.iteration_profile().per_iteration))
                } else {
                    rotated
                }
            }
        }
    }

    fn iteration_profile(&self) -> IterationProfile {
        let (iterations, completed) = self.loop_bounds();
        IterationProfile {
            iterations,
            completed,
            per_iteration: self.per_pass_duration(),
        }
    }

    fn reset_progress(&mut self) {
        self.core.reset();
        self.interrupt.clear();
        for item in &mut self.items {
            item.reset_progress();
        }
        for condition in &mut self.conditions {
            condition.reset_progress();
        }
        for trigger in &mut self.triggers {
            trigger.reset_progress();
        }
    }

    fn after_parent_changed(&mut self, parent: Option<&ParentContext>) {
        self.core.parent_id = parent.map(|p| p.container_id.clone());
        self.inherited_target = parent.and_then(|p| p.target.clone());
        self.propagate_parent();
    }

    fn interrupt_handle(&self) -> Option<InterruptHandle> {
        Some(self.interrupt.clone())
    }

    fn as_container(&self) -> Option<&SequenceContainer> {
        Some(self)
    }

    fn as_container_mut(&mut self) -> Option<&mut SequenceContainer> {
        Some(self)
    }

    fn to_definition(&self) -> ItemDefinition {
        ItemDefinition {
            settings: self.core.settings.clone(),
            kind: ItemKind::Container(ContainerConfig {
                kind: self.kind.clone(),
                strategy: self.strategy,
                items: self.items.iter().map(|item| item.to_definition()).collect(),
                conditions: self.conditions.iter().map(|c| c.to_definition()).collect(),
                triggers: self.triggers.iter().map(|t| t.to_definition()).collect(),
            }),
        }
    }
}

fn saturating_mul(duration: Duration, times: u32) -> Duration {
    duration.checked_mul(times).unwrap_or(Duration::MAX)
}

/// Visit every item of a tree, depth first
pub fn walk(item: &dyn SequenceItem, visit: &mut dyn FnMut(&dyn SequenceItem)) {
    visit(item);
    if let Some(container) = item.as_container() {
        for child in container.items() {
            walk(child.as_ref(), visit);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::astro::Coordinates;
    use crate::conditions::LoopCondition;
    use crate::instructions::camera::{ExposureConfig, TakeExposure};
    use crate::instructions::telescope::{SlewConfig, SlewScopeToRaDec};
    use crate::instructions::utility::{Annotation, AnnotationConfig};
    use crate::simulator::SimulatedEquipment;

    fn exposure(secs: f64) -> Box<dyn SequenceItem> {
        Box::new(TakeExposure::new(
            ItemSettings::default(),
            ExposureConfig {
                exposure_time: secs,
                ..Default::default()
            },
        ))
    }

    fn note(text: &str) -> Box<dyn SequenceItem> {
        Box::new(Annotation::new(
            ItemSettings::default(),
            AnnotationConfig { text: text.into() },
        ))
    }

    #[test]
    fn test_root_has_three_areas() {
        let mut root = SequenceContainer::new_root("Night");
        assert_eq!(root.items().len(), 3);
        assert!(root.start_area_mut().is_some());
        assert!(root.target_area_mut().is_some());
        assert!(root.end_area_mut().is_some());
        let root_id = root.id().to_string();
        assert!(root.items().iter().all(|i| i.parent_id() == Some(root_id.as_str())));
    }

    #[test]
    fn test_attach_and_detach_update_parent() {
        let mut container = SequenceContainer::sequential("Set");
        container.add(note("a"));
        container.add(note("b"));
        assert_eq!(container.items()[0].parent_id(), Some(container.id()));

        let removed = container.remove(0).unwrap();
        assert!(removed.parent_id().is_none());
        assert!(container.remove(5).is_none());
        assert!(!container.move_item(0, 3));
    }

    #[test]
    fn test_dso_target_reaches_nested_slew() {
        let target = Target {
            name: "M42".into(),
            coordinates: Coordinates::new(5.588, -5.39),
            rotation: 0.0,
        };
        let slew = SlewScopeToRaDec::new(
            ItemSettings::default(),
            SlewConfig {
                coordinates: None,
                inherit_coordinates: true,
            },
        );
        let block = SequenceContainer::sequential("Block").with_item(Box::new(slew));
        let dso = SequenceContainer::deep_sky_object(target.clone()).with_item(Box::new(block));

        let block = dso.items()[0].as_container().unwrap();
        assert_eq!(block.effective_target(), Some(&target));
    }

    #[test]
    fn test_standard_estimate_skips_completed_blocks() {
        let mut outer = SequenceContainer::sequential("Outer");
        for (completed, secs) in [(10, 60.0), (0, 30.0), (0, 15.0)] {
            let block = SequenceContainer::sequential("Block")
                .with_condition(Box::new(LoopCondition::with_progress(10, completed)))
                .with_item(exposure(secs));
            outer.add(Box::new(block));
        }
        assert_eq!(
            outer.calculate_estimated_runtime(EstimationMode::Standard),
            Duration::from_secs(450)
        );
    }

    #[test]
    fn test_parallel_estimate_takes_longest_branch() {
        let container = SequenceContainer::parallel("Both")
            .with_item(exposure(30.0))
            .with_item(exposure(120.0));
        assert_eq!(container.estimated_duration(), Duration::from_secs(120));
    }

    #[test]
    fn test_aggregate_status() {
        let mut container = SequenceContainer::sequential("Set");
        container.add(note("a"));
        container.add(note("b"));
        assert_eq!(container.aggregate_status(), ItemStatus::Created);

        container.item_mut(0).unwrap().set_status(ItemStatus::Finished);
        container.item_mut(1).unwrap().set_status(ItemStatus::Skipped);
        assert_eq!(container.aggregate_status(), ItemStatus::Finished);

        container.item_mut(1).unwrap().set_status(ItemStatus::Failed);
        assert_eq!(container.aggregate_status(), ItemStatus::Failed);
    }

    #[tokio::test]
    async fn test_loop_runs_children_each_iteration() {
        let sim = SimulatedEquipment::default();
        let mut ctx = ExecutionContext::new(sim.equipment());
        let mut container = SequenceContainer::sequential("Loop")
            .with_condition(Box::new(LoopCondition::new(3)))
            .with_item(exposure(1.0))
            .with_item(exposure(1.0));

        run(&mut container, &mut ctx).await.unwrap();

        assert_eq!(container.status(), ItemStatus::Finished);
        assert_eq!(sim.camera.capture_count(), 6);
        assert_eq!(container.loop_bounds(), (3, 3));
    }

    #[tokio::test]
    async fn test_parallel_children_all_run() {
        let sim = SimulatedEquipment::default();
        let mut ctx = ExecutionContext::new(sim.equipment());
        let mut container = SequenceContainer::parallel("Parallel")
            .with_item(note("a"))
            .with_item(note("b"))
            .with_item(note("c"));

        run(&mut container, &mut ctx).await.unwrap();
        assert!(container
            .items()
            .iter()
            .all(|item| item.status() == ItemStatus::Finished));
    }

    #[tokio::test]
    async fn test_interrupted_container_leaves_rest_created() {
        let sim = SimulatedEquipment::default();
        let mut ctx = ExecutionContext::new(sim.equipment());
        let mut container = SequenceContainer::sequential("Set")
            .with_item(note("a"))
            .with_item(note("b"));
        container.interrupt();

        run(&mut container, &mut ctx).await.unwrap();
        assert_eq!(container.status(), ItemStatus::Skipped);
        assert_eq!(container.items()[0].status(), ItemStatus::Created);

        container.reset_progress();
        run(&mut container, &mut ctx).await.unwrap();
        assert_eq!(container.status(), ItemStatus::Finished);
    }
}
