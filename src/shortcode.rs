#![forbid(unsafe_code)]

//! The `[youtube_uploads]` template tag.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::channel::normalize;
use crate::render::{instance_id, render_uploads};
use crate::uploads::UploadsFetcher;

pub const SHORTCODE_TAG: &str = "youtube_uploads";

// `open`/`close` catch the `[[youtube_uploads]]` escape. A trailing `/` before
// the closing bracket belongs to the tag, not to the last attribute.
static SHORTCODE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"\[(?P<open>\[?){SHORTCODE_TAG}(?P<attrs>(?:\s[^\]]*?)?)\s*/?\](?P<close>\]?)"
    ))
    .unwrap()
});
static ATTR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?P<name>[A-Za-z_][A-Za-z0-9_-]*)\s*=\s*(?:"(?P<dq>[^"]*)"|'(?P<sq>[^']*)'|(?P<bare>[^\s"']+))"#)
        .unwrap()
});

/// Attributes understood by the tag. Anything else is ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadsShortcode {
    /// `Some` when the tag carries `channel=…`, even if the value is empty.
    pub channel: Option<String>,
}

impl UploadsShortcode {
    pub fn parse_attrs(raw: &str) -> Self {
        let attrs = parse_attributes(raw);
        Self {
            channel: attrs.get("channel").cloned(),
        }
    }

    /// The channel to render: the tag's own value when present, otherwise the
    /// saved setting.
    pub fn effective_channel<'a>(&'a self, saved: &'a str) -> &'a str {
        self.channel.as_deref().unwrap_or(saved)
    }
}

fn parse_attributes(raw: &str) -> HashMap<String, String> {
    ATTR_RE
        .captures_iter(raw)
        .map(|caps| {
            let value = caps
                .name("dq")
                .or_else(|| caps.name("sq"))
                .or_else(|| caps.name("bare"))
                .map_or("", |m| m.as_str());
            (caps["name"].to_ascii_lowercase(), value.to_string())
        })
        .collect()
}

fn is_escaped(caps: &Captures<'_>) -> bool {
    !caps["open"].is_empty() && !caps["close"].is_empty()
}

/// Every tag in `content`, in document order. Escaped `[[…]]` tags are
/// skipped.
pub fn find_shortcodes(content: &str) -> Vec<UploadsShortcode> {
    SHORTCODE_RE
        .captures_iter(content)
        .filter(|caps| !is_escaped(caps))
        .map(|caps| UploadsShortcode::parse_attrs(&caps["attrs"]))
        .collect()
}

/// Renders one tag against the fetcher.
pub fn render_shortcode(
    shortcode: &UploadsShortcode,
    saved_channel: &str,
    fetcher: &UploadsFetcher,
    instance: &str,
) -> String {
    let identifier = normalize(shortcode.effective_channel(saved_channel));
    let result = fetcher.latest(&identifier);
    render_uploads(&result, fetcher.display().column_count, instance)
}

/// Replaces every `[youtube_uploads …]` tag in `content` with its rendered
/// grid. Grids are numbered from 1 in document order; the rest of the content
/// is left as is. `[[youtube_uploads]]` prints the tag itself, one bracket pair
/// removed.
pub fn expand_shortcodes(content: &str, saved_channel: &str, fetcher: &UploadsFetcher) -> String {
    let mut counter = 0;
    SHORTCODE_RE
        .replace_all(content, |caps: &Captures<'_>| {
            let whole = &caps[0];
            if is_escaped(caps) {
                return whole[1..whole.len() - 1].to_string();
            }
            counter += 1;
            let shortcode = UploadsShortcode::parse_attrs(&caps["attrs"]);
            format!(
                "{}{}{}",
                &caps["open"],
                render_shortcode(&shortcode, saved_channel, fetcher, &instance_id(counter)),
                &caps["close"],
            )
        })
        .into_owned()
}
