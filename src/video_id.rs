#![forbid(unsafe_code)]

use std::borrow::Cow;
use std::sync::LazyLock;

use regex::Regex;
use url::{Url, form_urlencoded};

/// Path-based patterns, checked in order after the `v` query parameter.
static PATH_PATTERNS: LazyLock<[Regex; 4]> = LazyLock::new(|| {
    [
        Regex::new(r"/shorts/([A-Za-z0-9_-]{6,})").unwrap(),
        Regex::new(r"youtu\.be/([A-Za-z0-9_-]{6,})").unwrap(),
        Regex::new(r"/embed/([A-Za-z0-9_-]{6,})").unwrap(),
        Regex::new(r"/videos/([A-Za-z0-9_-]{6,})").unwrap(),
    ]
});

/// Resolves the video id behind a feed entry.
///
/// A non-blank `feed_video_id` (the feed's own `yt:videoId`) wins outright.
/// Otherwise the link is inspected: `watch?v=`, `/shorts/`, `youtu.be/`,
/// `/embed/`, `/videos/`. `None` means the entry has no usable id and should
/// be skipped.
pub fn extract_video_id(link: &str, feed_video_id: Option<&str>) -> Option<String> {
    if let Some(tagged) = feed_video_id.map(str::trim).filter(|id| !id.is_empty()) {
        return Some(tagged.to_string());
    }

    let link = link.trim();
    if link.is_empty() {
        return None;
    }

    if let Some(id) = query_video_id(link) {
        return Some(id);
    }

    PATH_PATTERNS
        .iter()
        .find_map(|pattern| pattern.captures(link))
        .map(|captures| captures[1].to_string())
}

/// The `v` query parameter. Links without a scheme (`www.youtube.com/watch?v=`
/// or `//www.youtube.com/watch?v=`) are not valid URLs, so their query string
/// is split off by hand.
fn query_video_id(link: &str) -> Option<String> {
    if let Ok(parsed) = Url::parse(link) {
        return parsed
            .query_pairs()
            .find(is_video_param)
            .map(|(_, value)| value.into_owned());
    }

    let (_, query) = link.split_once('?')?;
    let query = query.split_once('#').map_or(query, |(query, _)| query);
    form_urlencoded::parse(query.as_bytes())
        .find(is_video_param)
        .map(|(_, value)| value.into_owned())
}

fn is_video_param((key, value): &(Cow<'_, str>, Cow<'_, str>)) -> bool {
    key == "v" && !value.is_empty()
}

/// Thumbnail YouTube serves for every public video.
pub fn thumbnail_url(video_id: &str) -> String {
    format!("https://i.ytimg.com/vi/{video_id}/hqdefault.jpg")
}
