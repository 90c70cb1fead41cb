//! Periodic runner: one pipeline run per interval plus a daily retention sweep.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::{NaiveDateTime, TimeDelta};
use tracing::{error, info};

use crate::constants::{RETENTION, RUN_TIMEOUT, SCHEDULE_INTERVAL, SWEEP_HOUR};
use crate::persist::sweep_older_than;
use crate::pipeline::{Pipeline, log_events};

/// Cadence settings for [`run_scheduler`].
#[derive(Clone, Copy, Debug)]
pub struct ScheduleOptions {
    /// Time between two runs
    pub interval: Duration,
    /// Upper bound on one run
    pub run_timeout: Duration,
    /// Local hour (0-23) of the daily sweep
    pub sweep_hour: u32,
    /// Files older than this are swept
    pub retention: Duration,
}

impl Default for ScheduleOptions {
    fn default() -> Self {
        Self {
            interval: SCHEDULE_INTERVAL,
            run_timeout: RUN_TIMEOUT,
            sweep_hour: SWEEP_HOUR,
            retention: RETENTION,
        }
    }
}

/// Time from `now` until the next `hour:00:00`, strictly in the future.
pub fn until_next_hour(now: NaiveDateTime, hour: u32) -> Duration {
    let today = now.date().and_hms_opt(hour.min(23), 0, 0).unwrap_or(now);
    let target = if today > now {
        today
    } else {
        today + TimeDelta::days(1)
    };
    (target - now).to_std().unwrap_or(Duration::from_secs(60 * 60 * 24))
}

/// Next due time of the daily retention sweep.
///
/// The deadline only moves after a sweep has run, so a sweep that falls due
/// while a pipeline run is in progress happens late instead of being skipped.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SweepDeadline {
    hour: u32,
    next: NaiveDateTime,
}

impl SweepDeadline {
    /// First sweep at `hour:00` strictly after `now`.
    pub fn after(now: NaiveDateTime, hour: u32) -> Self {
        let mut deadline = Self { hour, next: now };
        deadline.advance(now);
        deadline
    }

    /// When the sweep is due.
    pub fn next(&self) -> NaiveDateTime {
        self.next
    }

    /// True once `now` has reached the deadline.
    pub fn is_due(&self, now: NaiveDateTime) -> bool {
        now >= self.next
    }

    /// Time left until the deadline, zero when overdue.
    pub fn remaining(&self, now: NaiveDateTime) -> Duration {
        (self.next - now).to_std().unwrap_or(Duration::ZERO)
    }

    /// Moves the deadline to the next `hour:00` after `now`.
    pub fn advance(&mut self, now: NaiveDateTime) {
        self.next = now
            + TimeDelta::from_std(until_next_hour(now, self.hour)).unwrap_or(TimeDelta::days(1));
    }
}

fn local_now() -> NaiveDateTime {
    chrono::Local::now().naive_local()
}

/// Runs the pipeline once, bounded by `limit`, and logs how it went.
pub async fn run_once_logged(pipeline: Arc<Pipeline>, limit: Duration) -> bool {
    info!("Starting content generation");
    match pipeline.run_within(limit).await {
        Some(outcome) => {
            log_events(&outcome);
            outcome.succeeded
        }
        None => {
            error!("Content generation timed out");
            false
        }
    }
}

/// Runs once now, then every `options.interval`, sweeping old files daily.
///
/// Failures and timeouts are logged and never stop the loop. Returns when
/// the process receives Ctrl-C.
pub async fn run_scheduler(pipeline: Arc<Pipeline>, options: ScheduleOptions) -> anyhow::Result<()> {
    run_scheduler_until(pipeline, options, async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!("Unable to listen for Ctrl-C: {err}");
            std::future::pending::<()>().await;
        }
    })
    .await
}

/// Like [`run_scheduler`], but stops when `shutdown` completes, even mid-run.
pub async fn run_scheduler_until<F>(
    pipeline: Arc<Pipeline>,
    options: ScheduleOptions,
    shutdown: F,
) -> anyhow::Result<()>
where
    F: Future<Output = ()>,
{
    let output_dir = pipeline.config().output_dir.clone();
    tokio::fs::create_dir_all(&output_dir)
        .await
        .with_context(|| format!("creating output directory {}", output_dir.display()))?;

    info!(
        "Scheduler started: every {}s, sweep daily at {:02}:00",
        options.interval.as_secs(),
        options.sweep_hour
    );
    // first tick completes immediately
    let mut ticker = tokio::time::interval(options.interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let mut sweep = SweepDeadline::after(local_now(), options.sweep_hour);
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                tokio::select! {
                    _ = run_once_logged(pipeline.clone(), options.run_timeout) => {}
                    _ = &mut shutdown => {
                        info!("Scheduler interrupted during a run, shutting down");
                        return Ok(());
                    }
                }
            }
            _ = tokio::time::sleep(sweep.remaining(local_now())) => {}
            _ = &mut shutdown => {
                info!("Scheduler interrupted, shutting down");
                return Ok(());
            }
        }

        let now = local_now();
        if sweep.is_due(now) {
            match sweep_older_than(&output_dir, options.retention).await {
                Ok(removed) => info!("Retention sweep removed {} file(s)", removed.len()),
                Err(err) => error!("Retention sweep failed: {err}"),
            }
            sweep.advance(now);
            info!("Next retention sweep at {}", sweep.next());
        }
    }
}
