#![forbid(unsafe_code)]

//! Channel identifier cleanup and feed URL construction.
//!
//! YouTube exposes a public Atom feed for every channel. Canonical `UC…` ids
//! go through `channel_id=`, while `@handles` use the `channel=` variant which
//! redirects to the canonical feed.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

pub const FEED_ENDPOINT: &str = "https://www.youtube.com/feeds/videos.xml";

static HANDLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^@[A-Za-z0-9_.-]{2,}$").unwrap());
static CHANNEL_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^UC[0-9A-Za-z_-]{20,}$").unwrap());

static SCRIPT_STYLE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<script[^>]*?>.*?</script>|<style[^>]*?>.*?</style>").unwrap()
});
static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").unwrap());
static OCTET_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"%[a-fA-F0-9]{2}").unwrap());
static WHITESPACE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[\r\n\t ]+").unwrap());

/// A channel value as typed by an admin or passed to the template tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelIdentifier {
    /// `@SomeHandle`
    Handle(String),
    /// `UC` followed by the opaque channel token.
    ChannelId(String),
    /// Anything else, already stripped of markup. May be empty.
    Other(String),
}

impl ChannelIdentifier {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Handle(value) | Self::ChannelId(value) | Self::Other(value) => value,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.as_str().is_empty()
    }
}

impl fmt::Display for ChannelIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classifies `raw` as a handle or canonical id. Input matching neither form
/// is not rejected: it is sanitized and passed through as [`ChannelIdentifier::Other`].
pub fn normalize(raw: &str) -> ChannelIdentifier {
    let value = raw.trim();
    if HANDLE_RE.is_match(value) {
        return ChannelIdentifier::Handle(value.to_string());
    }
    if CHANNEL_ID_RE.is_match(value) {
        return ChannelIdentifier::ChannelId(value.to_string());
    }
    ChannelIdentifier::Other(sanitize_text(value))
}

/// Reduces free-form text to a single plain line: no markup, no
/// percent-encoded octets, no runs of whitespace.
pub fn sanitize_text(raw: &str) -> String {
    let without_blocks = SCRIPT_STYLE_RE.replace_all(raw, "");
    let without_tags = TAG_RE.replace_all(&without_blocks, "");
    let escaped = without_tags.replace('<', "&lt;");

    let mut stripped = escaped;
    while OCTET_RE.is_match(&stripped) {
        stripped = OCTET_RE.replace_all(&stripped, "").into_owned();
    }

    WHITESPACE_RE.replace_all(&stripped, " ").trim().to_string()
}

/// Maps an identifier to its public feed URL. An empty identifier resolves to
/// `default_channel`.
pub fn build_feed_url(identifier: &ChannelIdentifier, default_channel: &str) -> String {
    let mut value = identifier.as_str().trim();
    if value.is_empty() {
        value = default_channel.trim();
    }

    if value.starts_with('@') {
        format!("{FEED_ENDPOINT}?channel={}", urlencoding::encode(value))
    } else {
        format!("{FEED_ENDPOINT}?channel_id={}", urlencoding::encode(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CANONICAL: &str = "UCuAXFkgsw1L7xaCfnd5JJOw";

    #[test]
    fn normalize_accepts_handles() {
        assert_eq!(
            normalize("  @Some.Handle_1-x  "),
            ChannelIdentifier::Handle("@Some.Handle_1-x".into())
        );
    }

    #[test]
    fn normalize_accepts_canonical_ids() {
        assert_eq!(
            normalize(CANONICAL),
            ChannelIdentifier::ChannelId(CANONICAL.into())
        );
    }

    #[test]
    fn normalize_rejects_short_forms() {
        assert!(matches!(normalize("@a"), ChannelIdentifier::Other(_)));
        assert!(matches!(normalize("UCshort"), ChannelIdentifier::Other(_)));
    }

    #[test]
    fn normalize_sanitizes_everything_else() {
        assert_eq!(
            normalize("  <b>My</b>\tChannel\n<script>alert(1)</script> "),
            ChannelIdentifier::Other("My Channel".into())
        );
        assert_eq!(normalize("   "), ChannelIdentifier::Other(String::new()));
    }

    #[test]
    fn sanitize_text_strips_octets_and_lone_brackets() {
        assert_eq!(sanitize_text("a%20b %2"), "ab %2");
        assert_eq!(sanitize_text("1 < 2"), "1 &lt; 2");
        assert_eq!(sanitize_text("%2%41F"), "");
    }

    #[test]
    fn canonical_ids_use_channel_id_query() {
        let id = format!("UC{}", "a1B2c3D4e5F6g7H8i9J0k_");
        let url = build_feed_url(&normalize(&id), CANONICAL);
        assert_eq!(
            url,
            format!("https://www.youtube.com/feeds/videos.xml?channel_id={id}")
        );
    }

    #[test]
    fn handles_use_channel_query() {
        let url = build_feed_url(&normalize("@SomeHandle"), CANONICAL);
        assert_eq!(
            url,
            "https://www.youtube.com/feeds/videos.xml?channel=%40SomeHandle"
        );
    }

    #[test]
    fn empty_identifier_uses_default() {
        let url = build_feed_url(&normalize(""), CANONICAL);
        assert_eq!(
            url,
            format!("https://www.youtube.com/feeds/videos.xml?channel_id={CANONICAL}")
        );
        let url = build_feed_url(&ChannelIdentifier::Other(String::new()), "@Fallback");
        assert!(url.ends_with("?channel=%40Fallback"));
    }

    #[test]
    fn other_values_are_encoded_as_channel_ids() {
        let url = build_feed_url(&normalize("some channel"), CANONICAL);
        assert!(url.ends_with("?channel_id=some%20channel"));
    }
}
