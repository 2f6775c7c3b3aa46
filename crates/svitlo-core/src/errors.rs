/// Core error type for the relay.
///
/// Adapter crates should map their specific errors into this type at the port
/// boundary so the cycle controller can classify failures consistently
/// (fatal at startup vs logged and retried on the next poll).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("not authorized: {0}")]
    Auth(String),

    #[error("history lookup failed: {0}")]
    Lookup(String),

    #[error("image download failed: {0}")]
    Download(String),

    #[error("forward failed: {0}")]
    Forward(String),

    #[error("watermark storage error: {0}")]
    Storage(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
