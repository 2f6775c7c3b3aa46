use std::path::PathBuf;

use async_trait::async_trait;
use redis::AsyncCommands;

use crate::{domain::PostId, errors::Error, Result};

/// Persisted high-water mark: the id of the last successfully forwarded post.
///
/// "Nothing stored yet" reads as 0 so a fresh deployment forwards the first
/// schedule it finds instead of erroring out.
#[async_trait]
pub trait WatermarkStore: Send + Sync {
    async fn read(&self) -> Result<PostId>;
    async fn write(&self, id: PostId) -> Result<()>;
}

/// File backend: a UTF-8 text file holding a single decimal integer.
pub struct FileWatermarkStore {
    path: PathBuf,
}

impl FileWatermarkStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl WatermarkStore for FileWatermarkStore {
    async fn read(&self) -> Result<PostId> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(PostId(0)),
            Err(e) => {
                return Err(Error::Storage(format!("read {}: {e}", self.path.display())))
            }
        };
        parse_watermark(&raw)
    }

    async fn write(&self, id: PostId) -> Result<()> {
        // Write-then-rename keeps a concurrent reader from ever seeing a
        // partially written value.
        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, id.0.to_string())
            .await
            .map_err(|e| Error::Storage(format!("write {}: {e}", tmp.display())))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| Error::Storage(format!("rename {}: {e}", self.path.display())))?;
        Ok(())
    }
}

/// Redis backend: a single namespaced string key.
pub struct RedisWatermarkStore {
    conn: redis::aio::ConnectionManager,
    key: String,
}

impl RedisWatermarkStore {
    /// Connect eagerly so a bad URL fails at startup, not on the first cycle.
    /// The connection manager reconnects by itself after transient drops.
    pub async fn connect(url: &str, key: impl Into<String>) -> Result<Self> {
        let client =
            redis::Client::open(url).map_err(|e| Error::Config(format!("redis url: {e}")))?;
        let conn = redis::aio::ConnectionManager::new(client)
            .await
            .map_err(|e| Error::Storage(format!("redis connect: {e}")))?;
        Ok(Self { conn, key: key.into() })
    }
}

#[async_trait]
impl WatermarkStore for RedisWatermarkStore {
    async fn read(&self) -> Result<PostId> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn
            .get(&self.key)
            .await
            .map_err(|e| Error::Storage(format!("redis get {}: {e}", self.key)))?;
        match raw {
            Some(raw) => parse_watermark(&raw),
            None => Ok(PostId(0)),
        }
    }

    async fn write(&self, id: PostId) -> Result<()> {
        let mut conn = self.conn.clone();
        conn.set::<_, _, ()>(&self.key, id.0.to_string())
            .await
            .map_err(|e| Error::Storage(format!("redis set {}: {e}", self.key)))?;
        Ok(())
    }
}

fn parse_watermark(raw: &str) -> Result<PostId> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(PostId(0));
    }
    trimmed
        .parse::<i64>()
        .map(PostId)
        .map_err(|_| Error::Storage(format!("malformed watermark value: {trimmed:?}")))
}
