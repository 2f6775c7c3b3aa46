use std::{
    env, fs,
    net::SocketAddr,
    path::{Path, PathBuf},
};

use crate::{domain::ChatRef, errors::Error, Result};

/// Default poll schedules, mirroring the channel's publication habits:
/// every half hour through the evening and overnight windows, plus one fixed
/// morning check.
pub const DEFAULT_POLL_SCHEDULES: [&str; 3] =
    ["*/30 20-23 * * *", "*/30 0-7 * * *", "20 7 * * *"];

/// Default fallback keywords for the loose match. All must be present for a
/// hit; an empty `FALLBACK_KEYWORDS` value disables the fallback entirely.
const DEFAULT_FALLBACK_KEYWORDS: [&str; 2] = ["київщина", "графік"];

/// Typed configuration, resolved once at startup.
#[derive(Clone, Debug)]
pub struct Config {
    /// Bot token used for publishing to the destination chat.
    pub telegram_bot_token: String,
    /// Destination chat: `@channelusername` or a numeric chat id.
    pub target_chat: ChatRef,
    /// Source channel username, without the leading `@`.
    pub source_channel: String,

    /// Key-value watermark backend; `None` selects the file backend.
    pub redis_url: Option<String>,
    pub watermark_file: PathBuf,
    pub watermark_redis_key: String,

    pub temp_dir: PathBuf,
    pub poll_schedules: Vec<String>,
    pub fallback_keywords: Vec<String>,
    pub health_addr: SocketAddr,
}

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));

        // Required env vars
        let telegram_bot_token = require_env("TELEGRAM_BOT_TOKEN")?;
        let target_chat = ChatRef(require_env("TARGET_CHAT_ID")?);
        let source_channel = require_env("SOURCE_CHANNEL")?
            .trim_start_matches('@')
            .to_string();

        // Watermark backend
        let redis_url = env_str("REDIS_URL").and_then(non_empty);
        let watermark_file = env_path("WATERMARK_FILE")
            .unwrap_or_else(|| PathBuf::from("last_message_id.txt"));
        let watermark_redis_key = env_str("WATERMARK_REDIS_KEY")
            .and_then(non_empty)
            .unwrap_or_else(|| "svitlo:last_message_id".to_string());

        // Transient image storage
        let temp_dir = env_path("TEMP_DIR").unwrap_or_else(|| PathBuf::from("/tmp/svitlo"));
        fs::create_dir_all(&temp_dir)?;

        // Poll schedules (semicolon-separated cron expressions)
        let poll_schedules: Vec<String> = match env_str("POLL_SCHEDULES").and_then(non_empty) {
            Some(raw) => split_schedules(&raw),
            None => DEFAULT_POLL_SCHEDULES.iter().map(|s| s.to_string()).collect(),
        };
        if poll_schedules.is_empty() {
            return Err(Error::Config(
                "POLL_SCHEDULES must contain at least one schedule".to_string(),
            ));
        }

        // Matching fallback: an explicitly empty value disables it.
        let fallback_keywords = match env_str("FALLBACK_KEYWORDS") {
            Some(raw) => parse_csv_lower(raw),
            None => DEFAULT_FALLBACK_KEYWORDS.iter().map(|s| s.to_string()).collect(),
        };

        let port = env_u16("PORT").unwrap_or(8080);
        let health_addr = SocketAddr::from(([0, 0, 0, 0], port));

        Ok(Self {
            telegram_bot_token,
            target_chat,
            source_channel,
            redis_url,
            watermark_file,
            watermark_redis_key,
            temp_dir,
            poll_schedules,
            fallback_keywords,
            health_addr,
        })
    }
}

fn require_env(key: &str) -> Result<String> {
    env_str(key)
        .and_then(non_empty)
        .ok_or_else(|| Error::Config(format!("{key} environment variable is required")))
}

fn env_str(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn env_path(key: &str) -> Option<PathBuf> {
    env::var_os(key).map(PathBuf::from)
}

fn env_u16(key: &str) -> Option<u16> {
    env_str(key).and_then(|s| s.trim().parse::<u16>().ok())
}

fn parse_csv_lower(v: String) -> Vec<String> {
    v.split(',')
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

fn split_schedules(raw: &str) -> Vec<String> {
    raw.split(';')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() {
            continue;
        }
        if env::var_os(key).is_some() {
            continue; // do not override existing env
        }

        let mut val = v.trim().to_string();
        // Strip optional surrounding quotes.
        if val.len() >= 2
            && ((val.starts_with('"') && val.ends_with('"'))
                || (val.starts_with('\'') && val.ends_with('\'')))
        {
            val = val[1..val.len() - 1].to_string();
        }

        env::set_var(key, val);
    }
}
