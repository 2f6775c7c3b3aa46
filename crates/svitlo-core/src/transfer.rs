use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::{SystemTime, UNIX_EPOCH},
};

use tracing::debug;

use crate::{
    domain::{ChatRef, ImageRef, SchedulePost},
    errors::Error,
    ports::{ChannelHistory, SchedulePublisher},
    Result,
};

/// A downloaded image in transient storage, owned by the current cycle.
///
/// Removal is tied to `Drop`, so every exit path of the pipeline (success,
/// download abort, forward failure) leaves the temp directory clean.
struct TempImage {
    path: PathBuf,
}

impl TempImage {
    fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TempImage {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

/// Downloads a located post's images and forwards them downstream.
pub struct MediaTransfer {
    source: Arc<dyn ChannelHistory>,
    publisher: Arc<dyn SchedulePublisher>,
    temp_dir: PathBuf,
}

impl MediaTransfer {
    pub fn new(
        source: Arc<dyn ChannelHistory>,
        publisher: Arc<dyn SchedulePublisher>,
        temp_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            source,
            publisher,
            temp_dir: temp_dir.into(),
        }
    }

    /// Download every image of `post`, then send them as a single photo or
    /// one grouped album. Transient files are gone by the time this returns,
    /// whatever the outcome.
    pub async fn forward(&self, chat: &ChatRef, post: &SchedulePost) -> Result<()> {
        let files = self.download_all(&post.images).await?;

        let paths: Vec<PathBuf> = files.iter().map(|f| f.path().to_path_buf()).collect();
        match paths.as_slice() {
            [] => Err(Error::Forward("post has no images to forward".to_string())),
            [single] => self.publisher.send_photo(chat, single, &post.caption).await,
            many => self.publisher.send_album(chat, many, &post.caption).await,
        }
    }

    /// Sequential downloads; the first failure aborts the rest so a partial
    /// album is never forwarded.
    async fn download_all(&self, images: &[ImageRef]) -> Result<Vec<TempImage>> {
        tokio::fs::create_dir_all(&self.temp_dir).await?;

        let ts = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();

        let mut files = Vec::with_capacity(images.len());
        for (n, image) in images.iter().enumerate() {
            debug!(n = n + 1, total = images.len(), "downloading image");
            let bytes = self.source.fetch_image(image).await?;
            let path = self.temp_dir.join(format!("schedule_{ts}_{}.jpg", n + 1));
            tokio::fs::write(&path, &bytes)
                .await
                .map_err(|e| Error::Download(format!("write {}: {e}", path.display())))?;
            files.push(TempImage { path });
        }
        Ok(files)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ChannelPost, PostId};
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct StaticSource {
        fail_after: Option<usize>,
        fetched: Mutex<usize>,
    }

    impl StaticSource {
        fn ok() -> Self {
            Self { fail_after: None, fetched: Mutex::new(0) }
        }

        fn failing_after(n: usize) -> Self {
            Self { fail_after: Some(n), fetched: Mutex::new(0) }
        }
    }

    #[async_trait]
    impl ChannelHistory for StaticSource {
        async fn recent_posts(&self, _limit: usize) -> Result<Vec<ChannelPost>> {
            Ok(Vec::new())
        }

        async fn fetch_image(&self, image: &ImageRef) -> Result<Vec<u8>> {
            let mut n = self.fetched.lock().unwrap();
            *n += 1;
            if let Some(limit) = self.fail_after {
                if *n > limit {
                    return Err(Error::Download(format!("boom on {}", image.0)));
                }
            }
            Ok(format!("bytes:{}", image.0).into_bytes())
        }
    }

    #[derive(Clone, Debug, PartialEq, Eq)]
    enum Sent {
        Photo(String),
        Album(usize, String),
    }

    struct RecordingPublisher {
        fail: bool,
        sent: Mutex<Vec<Sent>>,
        files_present: Mutex<Vec<bool>>,
    }

    impl RecordingPublisher {
        fn ok() -> Self {
            Self { fail: false, sent: Mutex::new(Vec::new()), files_present: Mutex::new(Vec::new()) }
        }

        fn failing() -> Self {
            Self { fail: true, sent: Mutex::new(Vec::new()), files_present: Mutex::new(Vec::new()) }
        }
    }

    #[async_trait]
    impl SchedulePublisher for RecordingPublisher {
        async fn send_photo(&self, _chat: &ChatRef, file: &Path, caption: &str) -> Result<()> {
            self.files_present.lock().unwrap().push(file.exists());
            if self.fail {
                return Err(Error::Forward("send failed".to_string()));
            }
            self.sent.lock().unwrap().push(Sent::Photo(caption.to_string()));
            Ok(())
        }

        async fn send_album(&self, _chat: &ChatRef, files: &[PathBuf], caption: &str) -> Result<()> {
            self.files_present
                .lock()
                .unwrap()
                .push(files.iter().all(|f| f.exists()));
            if self.fail {
                return Err(Error::Forward("send failed".to_string()));
            }
            self.sent
                .lock()
                .unwrap()
                .push(Sent::Album(files.len(), caption.to_string()));
            Ok(())
        }
    }

    fn tmp_dir(prefix: &str) -> PathBuf {
        std::env::temp_dir().join(format!(
            "{}-{}-{}",
            prefix,
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .as_nanos()
        ))
    }

    fn leftovers(dir: &Path) -> usize {
        std::fs::read_dir(dir).map(|rd| rd.count()).unwrap_or(0)
    }

    fn schedule_post(images: &[&str]) -> SchedulePost {
        SchedulePost {
            id: PostId(100),
            text: "⚡️ Київщина: графіки відключень на 1 травня".to_string(),
            images: images.iter().map(|i| ImageRef(i.to_string())).collect(),
            caption: "⚡️ Графіки відключень на 1 травня по Київщині".to_string(),
        }
    }

    fn chat() -> ChatRef {
        ChatRef("@dest".to_string())
    }

    #[tokio::test]
    async fn single_image_goes_out_as_photo_with_caption() {
        let dir = tmp_dir("svitlo-tx-single");
        let publisher = Arc::new(RecordingPublisher::ok());
        let transfer = MediaTransfer::new(
            Arc::new(StaticSource::ok()),
            publisher.clone(),
            dir.clone(),
        );

        transfer.forward(&chat(), &schedule_post(&["img-1"])).await.unwrap();

        assert_eq!(
            *publisher.sent.lock().unwrap(),
            vec![Sent::Photo(
                "⚡️ Графіки відключень на 1 травня по Київщині".to_string()
            )]
        );
        assert_eq!(*publisher.files_present.lock().unwrap(), vec![true]);
        assert_eq!(leftovers(&dir), 0);
    }

    #[tokio::test]
    async fn two_images_go_out_as_an_album() {
        let dir = tmp_dir("svitlo-tx-album");
        let publisher = Arc::new(RecordingPublisher::ok());
        let transfer = MediaTransfer::new(
            Arc::new(StaticSource::ok()),
            publisher.clone(),
            dir.clone(),
        );

        transfer
            .forward(&chat(), &schedule_post(&["img-1", "img-2"]))
            .await
            .unwrap();

        assert_eq!(
            *publisher.sent.lock().unwrap(),
            vec![Sent::Album(
                2,
                "⚡️ Графіки відключень на 1 травня по Київщині".to_string()
            )]
        );
        assert_eq!(leftovers(&dir), 0);
    }

    #[tokio::test]
    async fn download_failure_aborts_remaining_and_cleans_up() {
        let dir = tmp_dir("svitlo-tx-dlfail");
        let source = Arc::new(StaticSource::failing_after(1));
        let publisher = Arc::new(RecordingPublisher::ok());
        let transfer = MediaTransfer::new(source.clone(), publisher.clone(), dir.clone());

        let err = transfer
            .forward(&chat(), &schedule_post(&["img-1", "img-2", "img-3"]))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Download(_)));
        // Second fetch failed; the third was never attempted.
        assert_eq!(*source.fetched.lock().unwrap(), 2);
        assert!(publisher.sent.lock().unwrap().is_empty());
        assert_eq!(leftovers(&dir), 0);
    }

    #[tokio::test]
    async fn forward_failure_still_cleans_up() {
        let dir = tmp_dir("svitlo-tx-fwdfail");
        let publisher = Arc::new(RecordingPublisher::failing());
        let transfer = MediaTransfer::new(
            Arc::new(StaticSource::ok()),
            publisher.clone(),
            dir.clone(),
        );

        let err = transfer
            .forward(&chat(), &schedule_post(&["img-1", "img-2"]))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Forward(_)));
        // The publisher saw the files on disk, and they are gone now.
        assert_eq!(*publisher.files_present.lock().unwrap(), vec![true]);
        assert_eq!(leftovers(&dir), 0);
    }
}
