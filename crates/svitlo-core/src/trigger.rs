//! Recurring poll triggers.
//!
//! Standard 5-field cron syntax (min hour dom mon dow); each configured
//! schedule runs in its own task and fires the shared [`CycleRunner`], which
//! enforces one cycle in flight across all schedules.

use std::sync::Arc;

use chrono::{DateTime, Datelike, Local, Timelike};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use crate::{
    cycle::{CycleRunner, TriggerResult},
    errors::Error,
    Result,
};

/// One recurring firing rule. Field values are kept as bitmasks; bit `v` set
/// means value `v` fires.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CronRule {
    minutes: u64,
    hours: u64,
    days: u64,
    months: u64,
    weekdays: u64,
    dom_restricted: bool,
    dow_restricted: bool,
}

impl CronRule {
    pub fn parse(expr: &str) -> Result<Self> {
        let fields: Vec<&str> = expr.split_whitespace().collect();
        if fields.len() != 5 {
            return Err(Error::Config(format!(
                "expected 5 cron fields, got {} in {expr:?}",
                fields.len()
            )));
        }

        let (minutes, _) = parse_field(fields[0], 0, 59, false)?;
        let (hours, _) = parse_field(fields[1], 0, 23, false)?;
        let (days, dom_restricted) = parse_field(fields[2], 1, 31, false)?;
        let (months, _) = parse_field(fields[3], 1, 12, false)?;
        let (weekdays, dow_restricted) = parse_field(fields[4], 0, 6, true)?;

        Ok(Self {
            minutes,
            hours,
            days,
            months,
            weekdays,
            dom_restricted,
            dow_restricted,
        })
    }

    fn matches(&self, dt: DateTime<Local>) -> bool {
        if self.minutes & (1 << dt.minute()) == 0 {
            return false;
        }
        if self.hours & (1 << dt.hour()) == 0 {
            return false;
        }
        if self.months & (1 << dt.month()) == 0 {
            return false;
        }

        let dom = self.days & (1 << dt.day()) != 0;
        let dow = self.weekdays & (1 << dt.weekday().num_days_from_sunday()) != 0;

        // Standard cron: when both day fields are restricted, either may
        // satisfy the rule.
        match (self.dom_restricted, self.dow_restricted) {
            (false, false) => true,
            (true, false) => dom,
            (false, true) => dow,
            (true, true) => dom || dow,
        }
    }

    /// First firing time strictly after `now`, scanned minute by minute with
    /// a one-year cap against impossible rules (e.g. Feb 30).
    pub fn next_after(&self, now: DateTime<Local>) -> Option<DateTime<Local>> {
        let mut t = (now + chrono::Duration::minutes(1))
            .with_second(0)?
            .with_nanosecond(0)?;

        let max_iters = 366usize * 24 * 60;
        for _ in 0..max_iters {
            if self.matches(t) {
                return Some(t);
            }
            t += chrono::Duration::minutes(1);
        }
        None
    }
}

/// Parse one cron field into its bitmask. Returns the mask and whether the
/// field restricts anything (`*` does not).
fn parse_field(raw: &str, min: u32, max: u32, sunday_alias: bool) -> Result<(u64, bool)> {
    let raw = raw.trim();
    if raw == "*" {
        return Ok((range_mask(min, max, 1), false));
    }

    let mut mask = 0u64;
    for part in raw.split(',') {
        let part = part.trim();
        if part.is_empty() {
            return Err(Error::Config(format!("empty list item in cron field {raw:?}")));
        }

        let (base, step) = match part.split_once('/') {
            Some((base, step)) => {
                let step: u32 = step
                    .trim()
                    .parse()
                    .map_err(|_| Error::Config(format!("invalid cron step in {part:?}")))?;
                if step == 0 {
                    return Err(Error::Config(format!("cron step must be > 0 in {part:?}")));
                }
                (base.trim(), step)
            }
            None => (part, 1),
        };

        let (start, end) = if base == "*" {
            (min, max)
        } else if let Some((a, b)) = base.split_once('-') {
            (field_value(a, sunday_alias)?, field_value(b, sunday_alias)?)
        } else {
            let v = field_value(base, sunday_alias)?;
            // A bare value with a step opens a range up to the field max.
            if step > 1 {
                (v, max)
            } else {
                (v, v)
            }
        };

        if start < min || end > max || start > end {
            return Err(Error::Config(format!(
                "cron value out of range {min}..={max} in {part:?}"
            )));
        }

        mask |= range_mask(start, end, step);
    }

    Ok((mask, true))
}

fn field_value(s: &str, sunday_alias: bool) -> Result<u32> {
    let v: u32 = s
        .trim()
        .parse()
        .map_err(|_| Error::Config(format!("invalid cron value {s:?}")))?;
    // Both 0 and 7 mean Sunday in the day-of-week field.
    Ok(if sunday_alias && v == 7 { 0 } else { v })
}

fn range_mask(start: u32, end: u32, step: u32) -> u64 {
    let mut mask = 0u64;
    let mut v = start;
    while v <= end {
        mask |= 1 << v;
        // Saturate: a step near u32::MAX must end the scan, not wrap.
        v = v.saturating_add(step);
    }
    mask
}

// ============== Scheduler ==============

/// Owns one job loop per configured schedule expression.
pub struct PollScheduler {
    cancel: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

impl PollScheduler {
    /// Parse `exprs` and spawn one loop per schedule. A malformed expression
    /// fails the whole startup rather than silently dropping a schedule.
    pub fn start(exprs: &[String], runner: Arc<CycleRunner>) -> Result<Self> {
        let cancel = CancellationToken::new();
        let mut handles = Vec::with_capacity(exprs.len());

        for expr in exprs {
            let rule = CronRule::parse(expr)?;
            tracing::info!(schedule = %expr, "starting poll schedule");

            let runner = runner.clone();
            let token = cancel.clone();
            let expr = expr.clone();
            handles.push(tokio::spawn(async move {
                job_loop(rule, expr, runner, token).await;
            }));
        }

        Ok(Self { cancel, handles })
    }

    /// Cancel all loops and wait for them to wind down.
    pub async fn stop(self) {
        self.cancel.cancel();
        for handle in self.handles {
            let _ = handle.await;
        }
    }
}

async fn job_loop(
    rule: CronRule,
    expr: String,
    runner: Arc<CycleRunner>,
    cancel: CancellationToken,
) {
    loop {
        let Some(next) = rule.next_after(Local::now()) else {
            tracing::warn!(schedule = %expr, "no next firing time, stopping this schedule");
            return;
        };

        let wait = (next - Local::now()).to_std().unwrap_or_default();
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = sleep(wait) => {
                tracing::info!(schedule = %expr, "poll trigger fired");
                // The cycle boundary: failures are logged here and retried
                // at the next firing, never rethrown.
                match runner.trigger().await {
                    Ok(TriggerResult::Ran(outcome)) => {
                        tracing::info!(?outcome, "cycle finished");
                    }
                    Ok(TriggerResult::Skipped) => {}
                    Err(e) => tracing::error!("cycle failed: {e}"),
                }
            }
        }
    }
}
