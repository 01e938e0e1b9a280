//! Utility instructions: waits and annotations

use crate::context::ExecutionContext;
use crate::definition::{ItemDefinition, ItemKind};
use crate::error::SequenceError;
use crate::item::{ItemCore, ItemDescriptor, SequenceItem};
use crate::mediator::Equipment;
use crate::{duration_from_secs, ApplicationStatus, ItemSettings, MAX_INSTRUCTION_SECS};
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

// =========================================================================
// WAIT FOR TIME SPAN
// =========================================================================

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WaitForTimeSpanConfig {
    pub seconds: f64,
}

pub struct WaitForTimeSpan {
    core: ItemCore,
    pub config: WaitForTimeSpanConfig,
}

impl WaitForTimeSpan {
    const DESCRIPTOR: ItemDescriptor = ItemDescriptor {
        name: "Wait For Time Span",
        category: "Utility",
        description: "Waits for a fixed amount of time",
        icon: "HourglassSVG",
    };

    pub fn new(settings: ItemSettings, config: WaitForTimeSpanConfig) -> Self {
        Self {
            core: ItemCore::new(settings, Self::DESCRIPTOR),
            config,
        }
    }

    fn span(&self) -> Duration {
        duration_from_secs(self.config.seconds)
    }
}

#[async_trait]
impl SequenceItem for WaitForTimeSpan {
    fn core(&self) -> &ItemCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ItemCore {
        &mut self.core
    }

    fn validate(&mut self, _equipment: &Equipment) -> bool {
        let mut issues = Vec::new();
        if !self.config.seconds.is_finite() || self.config.seconds < 0.0 {
            issues.push("Wait time must be a positive number of seconds".to_string());
        } else if self.config.seconds > MAX_INSTRUCTION_SECS {
            issues.push(format!(
                "Wait time of {}s exceeds the {}s limit",
                self.config.seconds, MAX_INSTRUCTION_SECS
            ));
        }
        self.core.set_issues(issues)
    }

    async fn execute(&mut self, ctx: &mut ExecutionContext) -> Result<(), SequenceError> {
        let span = self.span();
        ctx.report(ApplicationStatus::new(
            self.core.settings.name.as_str(),
            format!("Waiting {:.0}s", span.as_secs_f64()),
        ));
        ctx.cancel.sleep(span).await?;
        Ok(())
    }

    fn estimated_duration(&self) -> Duration {
        self.span()
    }

    fn to_definition(&self) -> ItemDefinition {
        ItemDefinition {
            settings: self.core.settings.clone(),
            kind: ItemKind::WaitForTimeSpan(self.config.clone()),
        }
    }
}

// =========================================================================
// WAIT FOR TIME
// =========================================================================

/// Wall clock time of day in UTC
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WaitForTimeConfig {
    pub hours: u32,
    pub minutes: u32,
    pub seconds: u32,
}

impl WaitForTimeConfig {
    /// The next instant after `now` matching the configured time of day
    pub fn next_occurrence(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let today = now
            .date_naive()
            .and_hms_opt(self.hours, self.minutes, self.seconds)?
            .and_utc();
        if today > now {
            Some(today)
        } else {
            today.checked_add_signed(ChronoDuration::days(1))
        }
    }
}

pub struct WaitForTime {
    core: ItemCore,
    pub config: WaitForTimeConfig,
}

impl WaitForTime {
    const DESCRIPTOR: ItemDescriptor = ItemDescriptor {
        name: "Wait For Time",
        category: "Utility",
        description: "Waits until a time of day",
        icon: "ClockSVG",
    };

    pub fn new(settings: ItemSettings, config: WaitForTimeConfig) -> Self {
        Self {
            core: ItemCore::new(settings, Self::DESCRIPTOR),
            config,
        }
    }

    fn remaining(&self, now: DateTime<Utc>) -> Duration {
        self.config
            .next_occurrence(now)
            .and_then(|at| (at - now).to_std().ok())
            .unwrap_or(Duration::ZERO)
    }
}

#[async_trait]
impl SequenceItem for WaitForTime {
    fn core(&self) -> &ItemCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ItemCore {
        &mut self.core
    }

    fn validate(&mut self, _equipment: &Equipment) -> bool {
        let mut issues = Vec::new();
        if self.config.next_occurrence(Utc::now()).is_none() {
            issues.push(format!(
                "{:02}:{:02}:{:02} is not a valid time of day",
                self.config.hours, self.config.minutes, self.config.seconds
            ));
        }
        self.core.set_issues(issues)
    }

    async fn execute(&mut self, ctx: &mut ExecutionContext) -> Result<(), SequenceError> {
        let now = Utc::now();
        let Some(until) = self.config.next_occurrence(now) else {
            return Err(SequenceError::Validation("invalid time of day".to_string()));
        };
        tracing::info!("Waiting until {}", until);
        ctx.report(ApplicationStatus::new(
            self.core.settings.name.as_str(),
            format!("Waiting until {}", until.format("%H:%M:%S")),
        ));
        ctx.cancel.sleep(self.remaining(now)).await?;
        Ok(())
    }

    fn estimated_duration(&self) -> Duration {
        self.remaining(Utc::now())
    }

    fn to_definition(&self) -> ItemDefinition {
        ItemDefinition {
            settings: self.core.settings.clone(),
            kind: ItemKind::WaitForTime(self.config.clone()),
        }
    }
}

// =========================================================================
// ANNOTATION
// =========================================================================

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AnnotationConfig {
    pub text: String,
}

/// A note in the sequence; running it only logs the text
pub struct Annotation {
    core: ItemCore,
    pub config: AnnotationConfig,
}

impl Annotation {
    const DESCRIPTOR: ItemDescriptor = ItemDescriptor {
        name: "Annotation",
        category: "Utility",
        description: "Adds a note to the sequence",
        icon: "TextSVG",
    };

    pub fn new(settings: ItemSettings, config: AnnotationConfig) -> Self {
        Self {
            core: ItemCore::new(settings, Self::DESCRIPTOR),
            config,
        }
    }
}

#[async_trait]
impl SequenceItem for Annotation {
    fn core(&self) -> &ItemCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ItemCore {
        &mut self.core
    }

    async fn execute(&mut self, _ctx: &mut ExecutionContext) -> Result<(), SequenceError> {
        tracing::info!("Annotation: {}", self.config.text);
        Ok(())
    }

    fn to_definition(&self) -> ItemDefinition {
        ItemDefinition {
            settings: self.core.settings.clone(),
            kind: ItemKind::Annotation(self.config.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instructions::test_support::setup;
    use crate::item::run;
    use crate::ItemStatus;
    use chrono::TimeZone;

    #[test]
    fn test_next_occurrence_rolls_over_midnight() {
        let config = WaitForTimeConfig {
            hours: 2,
            minutes: 30,
            seconds: 0,
        };
        let evening = Utc.with_ymd_and_hms(2024, 3, 10, 22, 0, 0).unwrap();
        assert_eq!(
            config.next_occurrence(evening),
            Some(Utc.with_ymd_and_hms(2024, 3, 11, 2, 30, 0).unwrap())
        );

        let night = Utc.with_ymd_and_hms(2024, 3, 11, 1, 0, 0).unwrap();
        assert_eq!(
            config.next_occurrence(night),
            Some(Utc.with_ymd_and_hms(2024, 3, 11, 2, 30, 0).unwrap())
        );
    }

    #[test]
    fn test_invalid_time_of_day() {
        let config = WaitForTimeConfig {
            hours: 25,
            minutes: 0,
            seconds: 0,
        };
        assert!(config.next_occurrence(Utc::now()).is_none());
    }

    #[tokio::test]
    async fn test_wait_is_cancellable() {
        let (_sim, mut ctx) = setup();
        let mut wait = WaitForTimeSpan::new(
            ItemSettings::default(),
            WaitForTimeSpanConfig { seconds: 600.0 },
        );
        assert_eq!(wait.estimated_duration(), Duration::from_secs(600));

        let cancel = ctx.cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            cancel.cancel();
        });

        let result = run(&mut wait, &mut ctx).await;
        assert!(matches!(result, Err(SequenceError::Cancelled)));
        assert_eq!(wait.status(), ItemStatus::Created);
    }

    #[test]
    fn test_oversized_wait_saturates_and_fails_validation() {
        let (sim, _ctx) = setup();
        let mut wait = WaitForTimeSpan::new(
            ItemSettings::default(),
            WaitForTimeSpanConfig { seconds: 1e300 },
        );
        assert_eq!(wait.estimated_duration(), Duration::MAX);
        assert!(!wait.validate(&sim.equipment()));
        assert!(wait.issues()[0].contains("exceeds"));

        wait.config.seconds = f64::NAN;
        assert_eq!(wait.estimated_duration(), Duration::ZERO);
        assert!(!wait.validate(&sim.equipment()));
    }

    #[tokio::test]
    async fn test_annotation_finishes() {
        let (_sim, mut ctx) = setup();
        let mut note = Annotation::new(
            ItemSettings::named("Note"),
            AnnotationConfig {
                text: "Meridian flip around 01:00".to_string(),
            },
        );
        run(&mut note, &mut ctx).await.unwrap();
        assert_eq!(note.status(), ItemStatus::Finished);
        assert_eq!(note.estimated_duration(), Duration::ZERO);
    }
}
