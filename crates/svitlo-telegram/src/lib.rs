//! Telegram adapters.
//!
//! The destination side implements the `svitlo-core` publisher port over the
//! Bot API (teloxide); the source side reads the channel's public web preview
//! (see [`preview`]).

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use teloxide::{
    prelude::*,
    types::{InputFile, InputMedia, InputMediaPhoto, Recipient},
};
use tokio::time::sleep;

pub mod preview;

pub use preview::ChannelPreviewClient;

use svitlo_core::{domain::ChatRef, errors::Error, ports::SchedulePublisher, Result};

#[derive(Clone)]
pub struct TelegramPublisher {
    bot: Bot,
}

impl TelegramPublisher {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }

    /// Invalid token and missing-permission responses become [`Error::Auth`];
    /// everything else is a plain forward failure.
    fn map_err(e: teloxide::RequestError) -> Error {
        let msg = e.to_string();
        if msg.contains("Unauthorized")
            || msg.contains("Forbidden")
            || msg.contains("administrator rights")
            || msg.contains("have no rights")
        {
            Error::Auth(format!("telegram: {msg}"))
        } else {
            Error::Forward(format!("telegram: {msg}"))
        }
    }

    async fn with_retry<T, Fut>(&self, mut op: impl FnMut() -> Fut) -> Result<T>
    where
        Fut: std::future::IntoFuture<Output = std::result::Result<T, teloxide::RequestError>>,
        Fut::IntoFuture: Send,
    {
        const MAX_RETRIES: usize = 1;
        let mut attempts = 0usize;
        loop {
            match op().await {
                Ok(v) => return Ok(v),
                Err(e) => match e {
                    // Flood control: wait out the platform's own backoff once.
                    teloxide::RequestError::RetryAfter(d) if attempts < MAX_RETRIES => {
                        attempts += 1;
                        sleep(d).await;
                        continue;
                    }
                    other => return Err(Self::map_err(other)),
                },
            }
        }
    }
}

#[async_trait]
impl SchedulePublisher for TelegramPublisher {
    async fn send_photo(&self, chat: &ChatRef, file: &Path, caption: &str) -> Result<()> {
        let recipient = parse_recipient(&chat.0)?;
        self.with_retry(|| {
            self.bot
                .send_photo(recipient.clone(), InputFile::file(file.to_path_buf()))
                .caption(caption.to_string())
        })
        .await?;
        Ok(())
    }

    async fn send_album(&self, chat: &ChatRef, files: &[PathBuf], caption: &str) -> Result<()> {
        let recipient = parse_recipient(&chat.0)?;
        self.with_retry(|| {
            let media: Vec<InputMedia> = files
                .iter()
                .enumerate()
                .map(|(i, path)| {
                    let mut photo = InputMediaPhoto::new(InputFile::file(path.clone()));
                    if i == 0 {
                        photo = photo.caption(caption.to_string());
                    }
                    InputMedia::Photo(photo)
                })
                .collect();
            self.bot.send_media_group(recipient.clone(), media)
        })
        .await?;
        Ok(())
    }
}

/// `@channelusername` or a bare numeric chat id (channels are negative).
fn parse_recipient(raw: &str) -> Result<Recipient> {
    let raw = raw.trim();
    if let Some(name) = raw.strip_prefix('@') {
        if name.is_empty() {
            return Err(Error::Config("destination channel username is empty".to_string()));
        }
        return Ok(Recipient::ChannelUsername(format!("@{name}")));
    }
    raw.parse::<i64>()
        .map(|id| Recipient::Id(ChatId(id)))
        .map_err(|_| {
            Error::Config(format!(
                "destination chat is neither @username nor a numeric id: {raw:?}"
            ))
        })
}
