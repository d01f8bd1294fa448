//! Scheduled sync
//!
//! On each cron tick a sync request is added to the manual-sync collection,
//! which the manual handler then serves like any other request. Expressions
//! use the 5-field form `minute hour day-of-month month day-of-week`, UTC.

use crate::trigger::ManualSync;
use chrono::{SecondsFormat, Utc};
use docsync_core::prelude::*;
use docsync_core::ScheduleConfig;
use std::sync::Arc;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info};

const DISABLED: &str = "never";
const DAYS_OF_WEEK: [&str; 7] = [
    "Sunday",
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
];

/// When scheduled syncs fire
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncSchedule {
    Disabled,
    /// Validated 5-field cron expression
    Cron(String),
}

impl SyncSchedule {
    /// Absent, blank or `"never"` disables the schedule
    pub fn parse(expr: Option<&str>) -> Result<Self> {
        let expr = match expr.map(str::trim) {
            None | Some("") | Some(DISABLED) => return Ok(Self::Disabled),
            Some(expr) => expr.split_whitespace().collect::<Vec<_>>().join(" "),
        };

        if expr.split(' ').count() != 5 {
            return Err(SyncError::config(format!(
                "Schedule \"{}\" must have 5 fields (minute hour day month weekday)",
                expr
            )));
        }

        let cron = format!("0 {}", expr);
        Job::new_async(cron.as_str(), |_uuid, _lock| Box::pin(async {}))
            .map_err(|e| SyncError::config(format!("Invalid schedule \"{}\": {}", expr, e)))?;
        Ok(Self::Cron(expr))
    }

    pub fn from_config(config: &ScheduleConfig) -> Result<Self> {
        Self::parse(config.interval.as_deref())
    }

    pub fn is_enabled(&self) -> bool {
        matches!(self, Self::Cron(_))
    }

    pub fn expression(&self) -> Option<&str> {
        match self {
            Self::Disabled => None,
            Self::Cron(expr) => Some(expr),
        }
    }

    /// The expression with a leading seconds field, as the scheduler takes it
    pub fn scheduler_expression(&self) -> Option<String> {
        self.expression().map(|expr| format!("0 {}", expr))
    }

    pub fn describe(&self) -> String {
        describe_cron(self.expression().unwrap_or(DISABLED))
    }
}

/// Human-readable form of a 5-field cron expression
///
/// Only the common shapes are described; anything else comes back as-is.
pub fn describe_cron(expr: &str) -> String {
    let expr = expr.trim();
    if expr.is_empty() || expr == DISABLED {
        return "Never".to_string();
    }

    let parts: Vec<&str> = expr.split_whitespace().collect();
    let (minute, hour, day_of_month, day_of_week) = match parts.as_slice() {
        [minute, hour, day_of_month, _month, day_of_week] => {
            (*minute, *hour, *day_of_month, *day_of_week)
        }
        _ => return expr.to_string(),
    };

    let mut description = String::from("Every ");
    if day_of_week != "*" {
        match day_of_week.parse::<usize>() {
            Ok(n) if n < DAYS_OF_WEEK.len() => description.push_str(DAYS_OF_WEEK[n]),
            _ => {
                description.push_str("day ");
                description.push_str(day_of_week);
            }
        }
    } else if day_of_month != "*" {
        description.push_str(day_of_month);
        description.push_str(ordinal_suffix(day_of_month));
        description.push_str(" of the month");
    } else {
        description.push_str("day");
    }

    if hour != "*" || minute != "*" {
        let (Some(h), Some(m)) = (time_field(hour), time_field(minute)) else {
            return expr.to_string();
        };
        description.push_str(" at ");
        description.push_str(&format_time(h, m));
    }

    description
}

fn time_field(value: &str) -> Option<u32> {
    match value {
        "*" => Some(0),
        other => other.parse().ok(),
    }
}

fn ordinal_suffix(day: &str) -> &'static str {
    let Ok(n) = day.parse::<u32>() else {
        return "";
    };
    match (n % 10, n % 100) {
        (1, k) if k != 11 => "st",
        (2, k) if k != 12 => "nd",
        (3, k) if k != 13 => "rd",
        _ => "th",
    }
}

fn format_time(hour: u32, minute: u32) -> String {
    let meridiem = if hour >= 12 { "PM" } else { "AM" };
    let display = match hour {
        0 => 12,
        h if h > 12 => h - 12,
        h => h,
    };
    format!("{}:{:02} {} UTC", display, minute, meridiem)
}

/// Adds sync requests on a cron schedule
pub struct ScheduledSync {
    store: Arc<dyn SourceStore>,
    collection: String,
    schedule: SyncSchedule,
    manual: Option<Arc<ManualSync>>,
}

impl ScheduledSync {
    pub fn new(
        store: Arc<dyn SourceStore>,
        collection: impl Into<String>,
        schedule: SyncSchedule,
    ) -> Self {
        Self {
            store,
            collection: collection.into(),
            schedule,
            manual: None,
        }
    }

    /// Serve each added request right away
    ///
    /// Without a live trigger on the request collection nothing else would
    /// pick it up.
    pub fn with_manual_sync(mut self, manual: Arc<ManualSync>) -> Self {
        self.manual = Some(manual);
        self
    }

    pub fn schedule(&self) -> &SyncSchedule {
        &self.schedule
    }

    /// One tick: add a request record, returning its id
    pub async fn fire(&self) -> Result<Option<String>> {
        let Some(expr) = self.schedule.expression() else {
            info!("Scheduled sync is disabled");
            return Ok(None);
        };

        let now = Utc::now();
        info!(at = %now.to_rfc3339_opts(SecondsFormat::Millis, true), "Scheduled sync triggered");

        let request = SyncRequest {
            scheduled_sync: true,
            scheduled_sync_cron_interval: Some(expr.to_string()),
            scheduled_sync_interval: Some(self.schedule.describe()),
            created_at: Some(now.to_rfc3339_opts(SecondsFormat::Millis, true)),
            ..Default::default()
        };
        let fields = request.to_fields()?;

        let id = match self.store.add_document(&self.collection, fields.clone()).await {
            Ok(id) => id,
            Err(e) => {
                error!(collection = %self.collection, error = %e, "Failed to create scheduled sync request");
                return Err(e);
            }
        };
        info!(collection = %self.collection, request = %id, "Created scheduled sync request");

        if let Some(ref manual) = self.manual {
            manual.handle(&id, &fields).await?;
        }
        Ok(Some(id))
    }

    /// Register the cron job and start the scheduler
    pub async fn start(self: Arc<Self>) -> Result<JobScheduler> {
        let Some(cron) = self.schedule.scheduler_expression() else {
            return Err(SyncError::Scheduler("Scheduled sync is disabled".into()));
        };

        let scheduler = JobScheduler::new().await.map_err(scheduler_error)?;
        let this = Arc::clone(&self);
        let job = Job::new_async(cron.as_str(), move |_uuid, _lock| {
            let this = Arc::clone(&this);
            Box::pin(async move {
                if let Err(e) = this.fire().await {
                    error!(error = %e, "Scheduled sync failed");
                }
            })
        })
        .map_err(scheduler_error)?;

        let uuid = scheduler.add(job).await.map_err(scheduler_error)?;
        scheduler.start().await.map_err(scheduler_error)?;
        info!(
            job = %uuid,
            cron = %cron,
            every = %self.schedule.describe(),
            "Scheduled sync started"
        );
        Ok(scheduler)
    }
}

fn scheduler_error(e: tokio_cron_scheduler::JobSchedulerError) -> SyncError {
    SyncError::Scheduler(e.to_string())
}
