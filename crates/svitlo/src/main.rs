use std::sync::Arc;

use teloxide::Bot;
use tracing::{error, info};

use svitlo_core::{
    config::Config,
    cycle::{CycleRunner, PollCycle},
    ports::{ChannelHistory, SchedulePublisher},
    transfer::MediaTransfer,
    trigger::PollScheduler,
    watermark::{FileWatermarkStore, RedisWatermarkStore, WatermarkStore},
};
use svitlo_telegram::{ChannelPreviewClient, TelegramPublisher};

mod health;

#[tokio::main]
async fn main() -> Result<(), svitlo_core::Error> {
    svitlo_core::logging::init("svitlo")?;

    let cfg = Config::load()?;
    info!(channel = %cfg.source_channel, "watching source channel");

    let store: Arc<dyn WatermarkStore> = match &cfg.redis_url {
        Some(url) => {
            info!(key = %cfg.watermark_redis_key, "watermark backend: redis");
            Arc::new(RedisWatermarkStore::connect(url, cfg.watermark_redis_key.clone()).await?)
        }
        None => {
            info!(file = %cfg.watermark_file.display(), "watermark backend: file");
            Arc::new(FileWatermarkStore::new(cfg.watermark_file.clone()))
        }
    };

    let source: Arc<dyn ChannelHistory> =
        Arc::new(ChannelPreviewClient::new(cfg.source_channel.clone())?);
    let publisher: Arc<dyn SchedulePublisher> =
        Arc::new(TelegramPublisher::new(Bot::new(cfg.telegram_bot_token.clone())));

    let transfer = MediaTransfer::new(source.clone(), publisher, cfg.temp_dir.clone());
    let cycle = PollCycle::new(
        source,
        transfer,
        store,
        cfg.target_chat.clone(),
        cfg.fallback_keywords.clone(),
    );
    let runner = Arc::new(CycleRunner::new(cycle));

    tokio::spawn(health::serve(cfg.health_addr));

    let scheduler = PollScheduler::start(&cfg.poll_schedules, runner.clone())?;
    info!(schedules = cfg.poll_schedules.len(), "poll schedules started");

    // One immediate cycle, so a restart shortly after publication time does
    // not sit idle until the next trigger.
    match runner.trigger().await {
        Ok(outcome) => info!(?outcome, "startup cycle finished"),
        Err(e) => error!("startup cycle failed: {e}"),
    }

    tokio::signal::ctrl_c().await?;

    info!("shutting down, letting any in-flight cycle finish");
    scheduler.stop().await;
    runner.wait_idle().await;

    Ok(())
}
