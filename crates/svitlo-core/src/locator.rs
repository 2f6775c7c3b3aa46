use tracing::debug;

use crate::domain::{ChannelPost, ImageRef, SchedulePattern, SchedulePost};

/// How many recent posts one poll inspects.
pub const HISTORY_WINDOW: usize = 50;

/// Hard cap on images per forwarded post. A schedule is one or two charts;
/// anything beyond that in the album is promo material and gets dropped.
pub const ALBUM_IMAGE_CAP: usize = 2;

/// Scan `posts` (window order, newest first) for the first schedule post
/// matching `pattern`.
///
/// A post qualifies when its text matches and it carries at least one image
/// once album siblings are folded in. A text match with no images does not
/// stop the scan; a later post may satisfy both conditions.
pub fn find_schedule(
    posts: &[ChannelPost],
    pattern: &SchedulePattern,
    fallback_keywords: &[String],
) -> Option<SchedulePost> {
    let search = pattern.search_text.to_lowercase();

    for post in posts {
        if post.text.is_empty() {
            continue;
        }
        let text = post.text.to_lowercase();
        if !text.contains(&search) && !matches_fallback(&text, fallback_keywords) {
            continue;
        }

        let images = assemble_album(posts, post);
        if images.is_empty() {
            debug!(id = post.id.0, "text matched but carries no images, scanning on");
            continue;
        }

        return Some(SchedulePost {
            id: post.id,
            text: post.text.clone(),
            images,
            caption: pattern.caption_text.clone(),
        });
    }

    None
}

/// Loose match: every keyword independently present as a substring,
/// case-insensitive. Disabled when the keyword list is empty.
fn matches_fallback(lowercase_text: &str, keywords: &[String]) -> bool {
    !keywords.is_empty()
        && keywords
            .iter()
            .all(|k| lowercase_text.contains(&k.to_lowercase()))
}

/// Fold album siblings into the matched post's own images.
///
/// Siblings are the other window posts sharing the matched post's album id.
/// Their images are appended in window-traversal order after the matched
/// post's own, then the sequence is truncated to [`ALBUM_IMAGE_CAP`].
fn assemble_album(posts: &[ChannelPost], matched: &ChannelPost) -> Vec<ImageRef> {
    let mut images = matched.images.clone();

    if let Some(album) = &matched.album_id {
        for other in posts {
            if other.id == matched.id {
                continue;
            }
            if other.album_id.as_ref() == Some(album) {
                images.extend(other.images.iter().cloned());
            }
        }
    }

    images.truncate(ALBUM_IMAGE_CAP);
    images
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AlbumId, PostId};
    use chrono::NaiveDate;

    fn pattern_for(y: i32, m: u32, d: u32) -> SchedulePattern {
        SchedulePattern::for_date(NaiveDate::from_ymd_opt(y, m, d).unwrap())
    }

    fn keywords() -> Vec<String> {
        vec!["київщина".to_string(), "графік".to_string()]
    }

    fn post(id: i64, text: &str, album: Option<&str>, images: &[&str]) -> ChannelPost {
        ChannelPost {
            id: PostId(id),
            text: text.to_string(),
            album_id: album.map(|a| AlbumId(a.to_string())),
            images: images.iter().map(|i| ImageRef(i.to_string())).collect(),
        }
    }

    #[test]
    fn matches_exact_phrase_for_the_date() {
        let posts = vec![post(
            10,
            "⚡️ Київщина: графіки відключень на 3 травня",
            None,
            &["img-a"],
        )];
        let found = find_schedule(&posts, &pattern_for(2026, 5, 3), &[]).unwrap();
        assert_eq!(found.id, PostId(10));
        assert_eq!(found.images, vec![ImageRef("img-a".to_string())]);
    }

    #[test]
    fn matching_is_case_insensitive() {
        let posts = vec![post(
            11,
            "⚡️ КИЇВЩИНА: ГРАФІКИ ВІДКЛЮЧЕНЬ НА 3 ТРАВНЯ, оновлено",
            None,
            &["img-a"],
        )];
        assert!(find_schedule(&posts, &pattern_for(2026, 5, 3), &[]).is_some());
    }

    #[test]
    fn wrong_date_does_not_match() {
        let posts = vec![post(
            12,
            "⚡️ Київщина: графіки відключень на 3 травня",
            None,
            &["img-a"],
        )];
        assert!(find_schedule(&posts, &pattern_for(2026, 5, 4), &[]).is_none());
    }

    #[test]
    fn fallback_requires_every_keyword() {
        let posts = vec![post(20, "Київщина: графік на сьогодні", None, &["img-a"])];
        assert!(find_schedule(&posts, &pattern_for(2026, 5, 3), &keywords()).is_some());

        // Inflected form: "київщина" is not a substring of "київщину".
        let posts = vec![post(21, "графік на Київщину цього тижня", None, &["img-a"])];
        assert!(find_schedule(&posts, &pattern_for(2026, 5, 3), &keywords()).is_none());
    }

    #[test]
    fn empty_keyword_list_disables_fallback() {
        let posts = vec![post(22, "Київщина: графік на сьогодні", None, &["img-a"])];
        assert!(find_schedule(&posts, &pattern_for(2026, 5, 3), &[]).is_none());
    }

    #[test]
    fn text_match_without_images_keeps_scanning() {
        let posts = vec![
            post(31, "⚡️ Київщина: графіки відключень на 3 травня", None, &[]),
            post(30, "⚡️ Київщина: графіки відключень на 3 травня", None, &["img-b"]),
        ];
        let found = find_schedule(&posts, &pattern_for(2026, 5, 3), &[]).unwrap();
        assert_eq!(found.id, PostId(30));
    }

    #[test]
    fn posts_without_text_are_skipped() {
        let posts = vec![
            post(41, "", None, &["img-x"]),
            post(40, "⚡️ Київщина: графіки відключень на 3 травня", None, &["img-y"]),
        ];
        let found = find_schedule(&posts, &pattern_for(2026, 5, 3), &[]).unwrap();
        assert_eq!(found.id, PostId(40));
    }

    #[test]
    fn album_siblings_are_folded_in_and_capped() {
        // Five album posts with one image each; the matched one sits in the
        // middle of the window.
        let posts = vec![
            post(55, "", Some("G1"), &["img-55"]),
            post(54, "", Some("G1"), &["img-54"]),
            post(53, "", Some("G1"), &["img-53"]),
            post(52, "⚡️ Київщина: графіки відключень на 3 травня", Some("G1"), &["img-52"]),
            post(51, "", Some("G1"), &["img-51"]),
        ];
        let found = find_schedule(&posts, &pattern_for(2026, 5, 3), &[]).unwrap();
        assert_eq!(found.id, PostId(52));
        // Own image first, then siblings in window order, capped at two.
        assert_eq!(
            found.images,
            vec![ImageRef("img-52".to_string()), ImageRef("img-55".to_string())]
        );
    }

    #[test]
    fn captionless_sibling_carries_the_album_for_a_text_only_match() {
        // The text post itself has no photo; its sibling does.
        let posts = vec![
            post(61, "", Some("G2"), &["img-61"]),
            post(60, "⚡️ Київщина: графіки відключень на 3 травня", Some("G2"), &[]),
        ];
        let found = find_schedule(&posts, &pattern_for(2026, 5, 3), &[]).unwrap();
        assert_eq!(found.id, PostId(60));
        assert_eq!(found.images, vec![ImageRef("img-61".to_string())]);
    }

    #[test]
    fn other_albums_do_not_leak_in() {
        let posts = vec![
            post(72, "", Some("G9"), &["img-other"]),
            post(71, "⚡️ Київщина: графіки відключень на 3 травня", Some("G3"), &["img-71"]),
        ];
        let found = find_schedule(&posts, &pattern_for(2026, 5, 3), &[]).unwrap();
        assert_eq!(found.images, vec![ImageRef("img-71".to_string())]);
    }

    #[test]
    fn caption_comes_from_the_pattern() {
        let posts = vec![post(
            80,
            "⚡️ Київщина: графіки відключень на 1 травня",
            None,
            &["img-a"],
        )];
        let found = find_schedule(&posts, &pattern_for(2026, 5, 1), &[]).unwrap();
        assert_eq!(found.caption, "⚡️ Графіки відключень на 1 травня по Київщині");
    }
}
