use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::{
    domain::{ChannelPost, ChatRef, ImageRef},
    Result,
};

/// Read side of the relay: the source channel's recent history.
///
/// The Telegram web-preview client is the first implementation; the trait
/// stays transport-agnostic so an MTProto client could sit behind it
/// unchanged.
#[async_trait]
pub trait ChannelHistory: Send + Sync {
    /// Fetch up to `limit` most recent posts, newest first.
    async fn recent_posts(&self, limit: usize) -> Result<Vec<ChannelPost>>;

    /// Fetch the binary content behind an image reference.
    async fn fetch_image(&self, image: &ImageRef) -> Result<Vec<u8>>;
}

/// Write side of the relay: publishing photos to the destination chat.
#[async_trait]
pub trait SchedulePublisher: Send + Sync {
    /// Send one photo with a caption.
    async fn send_photo(&self, chat: &ChatRef, file: &Path, caption: &str) -> Result<()>;

    /// Send a grouped album. The caption goes on the first item only.
    async fn send_album(&self, chat: &ChatRef, files: &[PathBuf], caption: &str) -> Result<()>;
}
