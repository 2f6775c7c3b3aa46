use std::sync::Arc;

use chrono::{DateTime, Local, NaiveDate, Timelike};
use tracing::{info, warn};

use crate::{
    domain::{ChatRef, PostId, SchedulePattern, SchedulePost},
    locator::{self, HISTORY_WINDOW},
    ports::ChannelHistory,
    transfer::MediaTransfer,
    watermark::WatermarkStore,
    Result,
};

/// From this local hour on, a cycle looks for tomorrow's schedule first.
/// The channel publishes the next day's charts in the evening.
pub const EVENING_CUTOVER_HOUR: u32 = 20;

/// Terminal state of one poll cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CycleOutcome {
    /// No matching post in the window for any target date. The steady state
    /// between publications.
    NotFound,
    /// The located post sits at or below the watermark.
    AlreadyForwarded,
    /// A new schedule went out and the watermark moved.
    Forwarded { id: PostId, images: usize },
}

/// One poll-match-forward pass, from history scan to watermark commit.
pub struct PollCycle {
    source: Arc<dyn ChannelHistory>,
    transfer: MediaTransfer,
    store: Arc<dyn WatermarkStore>,
    chat: ChatRef,
    fallback_keywords: Vec<String>,
}

impl PollCycle {
    pub fn new(
        source: Arc<dyn ChannelHistory>,
        transfer: MediaTransfer,
        store: Arc<dyn WatermarkStore>,
        chat: ChatRef,
        fallback_keywords: Vec<String>,
    ) -> Self {
        Self {
            source,
            transfer,
            store,
            chat,
            fallback_keywords,
        }
    }

    /// Run one cycle against the current wall clock.
    pub async fn run(&self) -> Result<CycleOutcome> {
        self.run_at(Local::now()).await
    }

    /// Run one cycle as of `now` (injectable for tests).
    ///
    /// The watermark is re-read from the store on every call. Nothing is
    /// cached across cycles, so cold starts and warm restarts behave the
    /// same.
    pub async fn run_at(&self, now: DateTime<Local>) -> Result<CycleOutcome> {
        let watermark = match self.store.read().await {
            Ok(id) => id,
            Err(e) => {
                // Prefer a duplicate forward over silently skipping a post.
                warn!("watermark read failed, assuming 0: {e}");
                PostId(0)
            }
        };

        let Some(post) = self.locate_for(now).await? else {
            info!("no schedule post in the window yet");
            return Ok(CycleOutcome::NotFound);
        };

        if post.id <= watermark {
            info!(
                id = post.id.0,
                watermark = watermark.0,
                "schedule already forwarded"
            );
            return Ok(CycleOutcome::AlreadyForwarded);
        }

        info!(id = post.id.0, images = post.images.len(), "forwarding schedule");
        self.transfer.forward(&self.chat, &post).await?;

        // Only a confirmed forward moves the watermark. If this write fails,
        // the next cycle re-discovers the post and forwards it again.
        self.store.write(post.id).await?;

        Ok(CycleOutcome::Forwarded {
            id: post.id,
            images: post.images.len(),
        })
    }

    /// Evening cycles try tomorrow's date first and fall back to today
    /// within the same cycle; earlier cycles only look for today's post.
    async fn locate_for(&self, now: DateTime<Local>) -> Result<Option<SchedulePost>> {
        for date in target_dates(now) {
            let pattern = SchedulePattern::for_date(date);
            info!(date = %date, search = %pattern.search_text, "scanning channel history");
            let posts = self.source.recent_posts(HISTORY_WINDOW).await?;
            if let Some(post) = locator::find_schedule(&posts, &pattern, &self.fallback_keywords)
            {
                return Ok(Some(post));
            }
        }
        Ok(None)
    }
}

/// Dates to attempt, in order.
fn target_dates(now: DateTime<Local>) -> Vec<NaiveDate> {
    let today = now.date_naive();
    if now.hour() >= EVENING_CUTOVER_HOUR {
        let mut dates = Vec::with_capacity(2);
        if let Some(tomorrow) = today.succ_opt() {
            dates.push(tomorrow);
        }
        dates.push(today);
        dates
    } else {
        vec![today]
    }
}

// ============== Overlap guard ==============

/// What a trigger firing did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TriggerResult {
    Ran(CycleOutcome),
    Skipped,
}

/// Serializes cycles. A trigger firing while a cycle is in flight is
/// skipped, so two cycles can never both observe the pre-forward watermark.
pub struct CycleRunner {
    cycle: PollCycle,
    busy: tokio::sync::Mutex<()>,
}

impl CycleRunner {
    pub fn new(cycle: PollCycle) -> Self {
        Self {
            cycle,
            busy: tokio::sync::Mutex::new(()),
        }
    }

    /// Run one cycle unless another is already in flight.
    pub async fn trigger(&self) -> Result<TriggerResult> {
        let Ok(_guard) = self.busy.try_lock() else {
            info!("cycle already in flight, skipping this trigger");
            return Ok(TriggerResult::Skipped);
        };
        let outcome = self.cycle.run().await?;
        Ok(TriggerResult::Ran(outcome))
    }

    /// Wait for any in-flight cycle to finish. Used on shutdown so the
    /// process never exits between a forward and its watermark commit.
    pub async fn wait_idle(&self) {
        let _ = self.busy.lock().await;
    }
}
