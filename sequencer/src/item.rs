//! The sequence item abstraction and its run state machine

use crate::container::SequenceContainer;
use crate::context::{ExecutionContext, InterruptHandle, ParentContext};
use crate::definition::{build_item, ItemDefinition};
use crate::error::SequenceError;
use crate::executor::ExecutorEvent;
use crate::mediator::Equipment;
use crate::{new_id, ApplicationStatus, ErrorBehavior, EstimationMode, ItemId, ItemSettings, ItemStatus};
use async_trait::async_trait;
use std::time::Duration;

/// Default presentation of an item kind, applied when settings leave it empty
#[derive(Debug, Clone, Copy)]
pub struct ItemDescriptor {
    pub name: &'static str,
    pub category: &'static str,
    pub description: &'static str,
    pub icon: &'static str,
}

/// State every item carries
#[derive(Debug, Clone)]
pub struct ItemCore {
    pub id: ItemId,
    pub settings: ItemSettings,
    pub status: ItemStatus,
    pub issues: Vec<String>,
    pub parent_id: Option<ItemId>,
}

impl ItemCore {
    pub fn new(mut settings: ItemSettings, descriptor: ItemDescriptor) -> Self {
        if settings.name.is_empty() {
            settings.name = descriptor.name.to_string();
        }
        if settings.category.is_empty() {
            settings.category = descriptor.category.to_string();
        }
        if settings.description.is_empty() {
            settings.description = descriptor.description.to_string();
        }
        if settings.icon.is_empty() {
            settings.icon = descriptor.icon.to_string();
        }
        let status = if settings.enabled {
            ItemStatus::Created
        } else {
            ItemStatus::Disabled
        };
        Self {
            id: new_id(),
            settings,
            status,
            issues: Vec::new(),
            parent_id: None,
        }
    }

    pub fn reset(&mut self) {
        if self.status != ItemStatus::Disabled {
            self.status = ItemStatus::Created;
        }
    }

    /// Replace the issue list; returns true when it is empty
    pub fn set_issues(&mut self, issues: Vec<String>) -> bool {
        self.issues = issues;
        self.issues.is_empty()
    }
}

/// Iteration bookkeeping used by the runtime estimator
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IterationProfile {
    pub iterations: u32,
    pub completed: u32,
    /// Duration of one full iteration
    pub per_iteration: Duration,
}

impl IterationProfile {
    pub fn remaining(&self) -> u32 {
        self.iterations.saturating_sub(self.completed)
    }
}

/// A node of the sequence tree
///
/// Implementors provide [`SequenceItem::core`] and [`SequenceItem::execute`];
/// everything else has defaults built on the shared [`ItemCore`].
/// Hosts run items through [`run`], never by calling `execute` directly.
#[async_trait]
pub trait SequenceItem: Send + Sync {
    fn core(&self) -> &ItemCore;

    fn core_mut(&mut self) -> &mut ItemCore;

    fn id(&self) -> &str {
        &self.core().id
    }

    fn name(&self) -> &str {
        &self.core().settings.name
    }

    fn settings(&self) -> &ItemSettings {
        &self.core().settings
    }

    fn status(&self) -> ItemStatus {
        self.core().status
    }

    fn set_status(&mut self, status: ItemStatus) {
        self.core_mut().status = status;
    }

    fn issues(&self) -> &[String] {
        &self.core().issues
    }

    fn parent_id(&self) -> Option<&str> {
        self.core().parent_id.as_deref()
    }

    /// Refresh the issue list against current equipment state
    fn validate(&mut self, _equipment: &Equipment) -> bool {
        self.core_mut().issues.clear();
        true
    }

    /// Perform the item's work
    async fn execute(&mut self, ctx: &mut ExecutionContext) -> Result<(), SequenceError>;

    /// Duration of one complete execution
    fn estimated_duration(&self) -> Duration {
        Duration::ZERO
    }

    /// Time still needed to complete this item
    fn remaining_duration(&self, _mode: EstimationMode) -> Duration {
        match self.status() {
            ItemStatus::Finished | ItemStatus::Skipped | ItemStatus::Failed | ItemStatus::Disabled => {
                Duration::ZERO
            }
            ItemStatus::Created | ItemStatus::Running => self.estimated_duration(),
        }
    }

    fn iteration_profile(&self) -> IterationProfile {
        let done = matches!(
            self.status(),
            ItemStatus::Finished | ItemStatus::Skipped | ItemStatus::Failed | ItemStatus::Disabled
        );
        IterationProfile {
            iterations: 1,
            completed: u32::from(done),
            per_iteration: self.estimated_duration(),
        }
    }

    /// Return to `Created` so the item runs again
    fn reset_progress(&mut self) {
        self.core_mut().reset();
    }

    /// Called when the item is attached to, moved within or detached from a container
    fn after_parent_changed(&mut self, parent: Option<&ParentContext>) {
        self.core_mut().parent_id = parent.map(|p| p.container_id.clone());
    }

    fn interrupt_handle(&self) -> Option<InterruptHandle> {
        None
    }

    fn as_container(&self) -> Option<&SequenceContainer> {
        None
    }

    fn as_container_mut(&mut self) -> Option<&mut SequenceContainer> {
        None
    }

    /// True for items that take a light frame; triggers key off this
    fn is_exposure(&self) -> bool {
        false
    }

    fn to_definition(&self) -> ItemDefinition;
}

/// Run an item: validate, execute with retries, and apply its error behavior
///
/// Every outcome except cancellation is reported through the item's status and
/// `Ok(())`. Cancellation puts the item back to `Created` and propagates.
pub async fn run(item: &mut dyn SequenceItem, ctx: &mut ExecutionContext) -> Result<(), SequenceError> {
    match item.status() {
        ItemStatus::Disabled => {
            tracing::debug!("Skipping disabled item {}", item.name());
            return Ok(());
        }
        ItemStatus::Finished => {
            tracing::debug!("Item {} already finished", item.name());
            return Ok(());
        }
        _ => {}
    }
    ctx.check_cancelled()?;

    if item.as_container().is_none() && !item.validate(&ctx.equipment) {
        let issues = item.issues().join("; ");
        tracing::warn!("Skipping {}: {}", item.name(), issues);
        item.set_status(ItemStatus::Skipped);
        emit_completed(item, ctx);
        return Ok(());
    }

    item.set_status(ItemStatus::Running);
    ctx.emit(ExecutorEvent::ItemStarted {
        id: item.id().to_string(),
        name: item.name().to_string(),
    });
    ctx.report(ApplicationStatus::new(item.name(), "Running"));
    tracing::info!("Executing: {}", item.name());

    let retries = item.settings().attempts;
    let mut failures = 0u32;
    loop {
        match item.execute(ctx).await {
            Ok(()) => {
                item.set_status(ItemStatus::Finished);
                break;
            }
            Err(SequenceError::Cancelled) => {
                return cancel(item, ctx);
            }
            Err(SequenceError::Skipped(reason)) => {
                tracing::info!("{} skipped: {}", item.name(), reason);
                item.set_status(ItemStatus::Skipped);
                break;
            }
            Err(e) => {
                if ctx.is_cancelled() {
                    return cancel(item, ctx);
                }
                failures += 1;
                if failures <= retries {
                    tracing::warn!(
                        "{} failed (attempt {}/{}): {} - retrying",
                        item.name(),
                        failures,
                        retries + 1,
                        e
                    );
                    continue;
                }
                tracing::error!("{} failed: {}", item.name(), e);
                item.set_status(ItemStatus::Failed);
                ctx.report(ApplicationStatus::new(item.name(), format!("Failed: {}", e)));
                apply_error_behavior(item, ctx);
                break;
            }
        }
    }

    emit_completed(item, ctx);
    Ok(())
}

fn cancel(item: &mut dyn SequenceItem, ctx: &ExecutionContext) -> Result<(), SequenceError> {
    tracing::info!("{} cancelled", item.name());
    item.set_status(ItemStatus::Created);
    emit_completed(item, ctx);
    Err(SequenceError::Cancelled)
}

fn emit_completed(item: &dyn SequenceItem, ctx: &ExecutionContext) {
    ctx.emit(ExecutorEvent::ItemCompleted {
        id: item.id().to_string(),
        name: item.name().to_string(),
        status: item.status(),
    });
}

/// Escalate a final failure according to the item's error behavior
fn apply_error_behavior(item: &dyn SequenceItem, ctx: &ExecutionContext) {
    match item.settings().error_behavior {
        ErrorBehavior::ContinueOnError => {}
        ErrorBehavior::SkipInstructionSetOnError => {
            if let Some(parent) = ctx.scope.parent() {
                tracing::warn!("{} failed - skipping the rest of its instruction set", item.name());
                parent.interrupt();
            }
        }
        ErrorBehavior::AbortOnError => {
            if let Some(root) = ctx.scope.root() {
                tracing::warn!("{} failed - aborting the sequence", item.name());
                root.interrupt();
            }
        }
        ErrorBehavior::SkipToSequenceEndInstructions => match ctx.scope.skip_to_end_targets() {
            Some(targets) => {
                tracing::warn!("{} failed - skipping to the end of the sequence", item.name());
                for handle in targets {
                    handle.interrupt();
                }
            }
            // no area layout to skip within: stop the whole tree
            None => {
                if let Some(root) = ctx.scope.root() {
                    tracing::warn!("{} failed - no end instructions, aborting", item.name());
                    root.interrupt();
                }
            }
        },
    }
}

/// Editor-style copy: same configuration, fresh identity, reset progress
pub fn duplicate(item: &dyn SequenceItem) -> Result<Box<dyn SequenceItem>, SequenceError> {
    let mut copy = build_item(&item.to_definition())?;
    copy.reset_progress();
    Ok(copy)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::ItemKind;
    use crate::simulator::SimulatedEquipment;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    /// Fails a fixed number of times, then succeeds
    struct Flaky {
        core: ItemCore,
        failures_left: u32,
        executions: Arc<AtomicU32>,
    }

    impl Flaky {
        fn new(attempts: u32, failures: u32) -> Self {
            Self {
                core: ItemCore::new(
                    ItemSettings::named("Flaky").with_attempts(attempts),
                    ItemDescriptor {
                        name: "Flaky",
                        category: "Test",
                        description: "",
                        icon: "",
                    },
                ),
                failures_left: failures,
                executions: Arc::new(AtomicU32::new(0)),
            }
        }
    }

    #[async_trait]
    impl SequenceItem for Flaky {
        fn core(&self) -> &ItemCore {
            &self.core
        }

        fn core_mut(&mut self) -> &mut ItemCore {
            &mut self.core
        }

        async fn execute(&mut self, _ctx: &mut ExecutionContext) -> Result<(), SequenceError> {
            self.executions.fetch_add(1, Ordering::SeqCst);
            if self.failures_left > 0 {
                self.failures_left -= 1;
                return Err(SequenceError::Failed("flaky".into()));
            }
            Ok(())
        }

        fn to_definition(&self) -> ItemDefinition {
            ItemDefinition {
                settings: self.core.settings.clone(),
                kind: ItemKind::Annotation(Default::default()),
            }
        }
    }

    fn context() -> ExecutionContext {
        ExecutionContext::new(SimulatedEquipment::default().equipment())
    }

    #[tokio::test]
    async fn test_retries_then_finishes() {
        let mut item = Flaky::new(2, 2);
        let mut ctx = context();
        run(&mut item, &mut ctx).await.unwrap();
        assert_eq!(item.status(), ItemStatus::Finished);
        assert_eq!(item.executions.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_budget_exhausted_fails() {
        let mut item = Flaky::new(2, 3);
        let mut ctx = context();
        run(&mut item, &mut ctx).await.unwrap();
        assert_eq!(item.status(), ItemStatus::Failed);
        assert_eq!(item.executions.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_cancelled_before_run_stays_created() {
        let mut item = Flaky::new(0, 0);
        let mut ctx = context();
        ctx.cancel.cancel();
        let result = run(&mut item, &mut ctx).await;
        assert_eq!(result, Err(SequenceError::Cancelled));
        assert_eq!(item.status(), ItemStatus::Created);
        assert_eq!(item.executions.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_disabled_item_is_not_executed() {
        let mut item = Flaky::new(0, 0);
        item.core.status = ItemStatus::Disabled;
        let mut ctx = context();
        run(&mut item, &mut ctx).await.unwrap();
        assert_eq!(item.executions.load(Ordering::SeqCst), 0);
        item.reset_progress();
        assert_eq!(item.status(), ItemStatus::Disabled);
    }

    #[tokio::test]
    async fn test_duplicate_gets_fresh_identity() {
        use crate::instructions::utility::{Annotation, AnnotationConfig};

        let mut original = Annotation::new(
            ItemSettings::named("Note").with_attempts(3),
            AnnotationConfig { text: "hello".into() },
        );
        let mut ctx = context();
        run(&mut original, &mut ctx).await.unwrap();
        assert_eq!(original.status(), ItemStatus::Finished);

        let copy = duplicate(&original).unwrap();
        assert_ne!(copy.id(), original.id());
        assert_eq!(copy.status(), ItemStatus::Created);
        assert_eq!(copy.settings(), original.settings());
        assert_eq!(copy.to_definition(), original.to_definition());
    }

    #[tokio::test]
    async fn test_abort_interrupts_root_only() {
        let root = InterruptHandle::new();
        let parent = InterruptHandle::new();
        let mut ctx = context();
        ctx.scope = ctx.scope.enter(root.clone()).enter(parent.clone());

        let mut item = Flaky::new(0, 1);
        item.core.settings.error_behavior = ErrorBehavior::AbortOnError;
        run(&mut item, &mut ctx).await.unwrap();

        assert_eq!(item.status(), ItemStatus::Failed);
        assert_eq!(root.interrupt_count(), 1);
        assert_eq!(parent.interrupt_count(), 0);
    }

    #[tokio::test]
    async fn test_skip_instruction_set_interrupts_parent() {
        let root = InterruptHandle::new();
        let parent = InterruptHandle::new();
        let mut ctx = context();
        ctx.scope = ctx.scope.enter(root.clone()).enter(parent.clone());

        let mut item = Flaky::new(0, 1);
        item.core.settings.error_behavior = ErrorBehavior::SkipInstructionSetOnError;
        run(&mut item, &mut ctx).await.unwrap();

        assert_eq!(root.interrupt_count(), 0);
        assert_eq!(parent.interrupt_count(), 1);
    }
}
