/// Message id inside the source channel (numeric, monotonically increasing).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PostId(pub i64);

/// Identifier shared by all posts of one multi-photo album.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct AlbumId(pub String);

/// Opaque handle to a photo attached to a post. The Telegram preview adapter
/// stores the CDN URL of the image here.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ImageRef(pub String);

/// Destination chat, unparsed: `@channelusername` or a numeric chat id.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChatRef(pub String);

/// One post of the source channel's recent history, as the history port
/// reports it. An album surfaces as several posts sharing an `album_id`.
#[derive(Clone, Debug)]
pub struct ChannelPost {
    pub id: PostId,
    pub text: String,
    pub album_id: Option<AlbumId>,
    pub images: Vec<ImageRef>,
}

/// A located schedule post with its album assembled, ready to forward.
#[derive(Clone, Debug)]
pub struct SchedulePost {
    pub id: PostId,
    pub text: String,
    /// Discovery order, at most [`crate::locator::ALBUM_IMAGE_CAP`] entries.
    pub images: Vec<ImageRef>,
    pub caption: String,
}

/// Locale texts derived from a calendar date: the phrase the locator searches
/// for and the caption attached to the outgoing post.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SchedulePattern {
    pub search_text: String,
    pub caption_text: String,
}
