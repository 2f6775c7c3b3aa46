//! Source-channel history via the public web preview (`t.me/s/<channel>`).
//!
//! Public broadcast channels render their recent posts as server-side HTML,
//! which needs no Bot API membership or MTProto session to read. Albums
//! render as one bubble; this module reshapes them into one post per message
//! sharing an album id, so the locator sees ordinary history.
//!
//! Emoji inside message text is occasionally wrapped in markup the tag strip
//! removes; the keyword fallback still matches those posts.

use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use tracing::debug;

use svitlo_core::{
    domain::{AlbumId, ChannelPost, ImageRef, PostId},
    errors::Error,
    ports::ChannelHistory,
    Result,
};

const BASE_URL: &str = "https://t.me";
const USER_AGENT: &str = "Mozilla/5.0 (compatible; svitlo/0.1)";

/// Each preview page carries about 20 posts; a handful covers the window.
const MAX_PREVIEW_PAGES: usize = 5;

pub struct ChannelPreviewClient {
    http: reqwest::Client,
    channel: String,
}

impl ChannelPreviewClient {
    pub fn new(channel: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| Error::Config(format!("http client: {e}")))?;
        Ok(Self {
            http,
            channel: channel.into(),
        })
    }

    async fn fetch_page(&self, before: Option<i64>) -> Result<String> {
        let mut url = format!("{BASE_URL}/s/{}", self.channel);
        if let Some(before) = before {
            url.push_str(&format!("?before={before}"));
        }

        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::Lookup(format!("GET {url}: {e}")))?;
        if !resp.status().is_success() {
            return Err(Error::Lookup(format!("GET {url}: status {}", resp.status())));
        }
        resp.text()
            .await
            .map_err(|e| Error::Lookup(format!("read {url}: {e}")))
    }
}

#[async_trait]
impl ChannelHistory for ChannelPreviewClient {
    async fn recent_posts(&self, limit: usize) -> Result<Vec<ChannelPost>> {
        let mut posts: Vec<ChannelPost> = Vec::new();
        let mut before: Option<i64> = None;

        // Pages run oldest-to-newest; `?before` walks further into the past.
        for _ in 0..MAX_PREVIEW_PAGES {
            let html = self.fetch_page(before).await?;
            let page = parse_preview_page(&html);

            let Some(oldest) = page.iter().map(|p| p.id.0).min() else {
                break;
            };

            posts.extend(page);
            posts = dedup_newest_first(posts);

            if posts.len() >= limit || before == Some(oldest) {
                break;
            }
            before = Some(oldest);
        }

        posts.truncate(limit);
        debug!(channel = %self.channel, count = posts.len(), "fetched history window");
        Ok(posts)
    }

    async fn fetch_image(&self, image: &ImageRef) -> Result<Vec<u8>> {
        let resp = self
            .http
            .get(&image.0)
            .send()
            .await
            .map_err(|e| Error::Download(format!("GET {}: {e}", image.0)))?;
        if !resp.status().is_success() {
            return Err(Error::Download(format!(
                "GET {}: status {}",
                image.0,
                resp.status()
            )));
        }
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| Error::Download(format!("read {}: {e}", image.0)))?;
        Ok(bytes.to_vec())
    }
}

// ============== Page parsing ==============

fn post_id_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"data-post="[^"]*/(\d+)""#).expect("valid regex"))
}

fn text_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?s)<div class="tgme_widget_message_text[^"]*"[^>]*>(.*?)</div>"#)
            .expect("valid regex")
    })
}

fn photo_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r#"tgme_widget_message_photo_wrap[^>]*?href="https://t\.me/[^"/]+/(\d+)[^"]*"[^>]*?background-image:url\('([^']+)'\)"#,
        )
        .expect("valid regex")
    })
}

fn br_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)<br\s*/?>").expect("valid regex"))
}

fn tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<[^>]+>").expect("valid regex"))
}

/// Parse one preview page into posts, document order preserved.
fn parse_preview_page(html: &str) -> Vec<ChannelPost> {
    let ids: Vec<(usize, i64)> = post_id_re()
        .captures_iter(html)
        .filter_map(|c| {
            let m = c.get(0)?;
            let id = c.get(1)?.as_str().parse::<i64>().ok()?;
            Some((m.start(), id))
        })
        .collect();

    let mut posts = Vec::new();
    for (i, (start, id)) in ids.iter().enumerate() {
        let end = ids.get(i + 1).map(|(s, _)| *s).unwrap_or(html.len());
        parse_message_chunk(*id, &html[*start..end], &mut posts);
    }
    posts
}

fn parse_message_chunk(post_id: i64, chunk: &str, out: &mut Vec<ChannelPost>) {
    let text = text_re()
        .captures(chunk)
        .and_then(|c| c.get(1))
        .map(|m| clean_text(m.as_str()))
        .unwrap_or_default();

    let photos: Vec<(i64, String)> = photo_re()
        .captures_iter(chunk)
        .filter_map(|c| {
            let id = c.get(1)?.as_str().parse::<i64>().ok()?;
            let url = decode_entities(c.get(2)?.as_str());
            Some((id, url))
        })
        .collect();

    if chunk.contains("tgme_widget_message_grouped") && !photos.is_empty() {
        let album = AlbumId(post_id.to_string());

        // The caption may sit on a message that carries no photo of its own.
        if !photos.iter().any(|(id, _)| *id == post_id) && !text.is_empty() {
            out.push(ChannelPost {
                id: PostId(post_id),
                text: text.clone(),
                album_id: Some(album.clone()),
                images: Vec::new(),
            });
        }

        for (id, url) in photos {
            let own_text = if id == post_id { text.clone() } else { String::new() };
            out.push(ChannelPost {
                id: PostId(id),
                text: own_text,
                album_id: Some(album.clone()),
                images: vec![ImageRef(url)],
            });
        }
        return;
    }

    out.push(ChannelPost {
        id: PostId(post_id),
        text,
        album_id: None,
        images: photos.into_iter().map(|(_, url)| ImageRef(url)).collect(),
    });
}

/// Newest first, pagination overlap removed.
fn dedup_newest_first(mut posts: Vec<ChannelPost>) -> Vec<ChannelPost> {
    posts.sort_by(|a, b| b.id.0.cmp(&a.id.0));
    posts.dedup_by_key(|p| p.id.0);
    posts
}

fn clean_text(raw: &str) -> String {
    let with_breaks = br_re().replace_all(raw, "\n");
    let stripped = tag_re().replace_all(&with_breaks, "");
    decode_entities(stripped.trim())
}

/// The handful of entities the preview markup actually emits. `&amp;` goes
/// last so sequences like `&amp;lt;` survive a single decode pass.
fn decode_entities(s: &str) -> String {
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
}
