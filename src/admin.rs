#![forbid(unsafe_code)]

//! Admin settings page for the channel option.

use html_escape::{encode_double_quoted_attribute, encode_text};

use crate::render::render_page;

pub const SETTINGS_FIELD: &str = "channel_id";
pub const SETTINGS_SAVED_NOTICE: &str = "Settings saved.";

/// Renders the settings form. `feed_url` is what the saved value resolves to,
/// shown so admins can check it before publishing.
pub fn render_settings_page(saved: &str, feed_url: &str, notice: Option<&str>) -> String {
    let mut body = String::from("<div class=\"wrap\">\n<h1>YouTube Uploads Grid</h1>\n");
    if let Some(notice) = notice {
        body.push_str(&format!(
            "<div class=\"notice\" role=\"status\"><p>{}</p></div>\n",
            encode_text(notice)
        ));
    }
    body.push_str(&format!(
        concat!(
            "<form method=\"post\" action=\"/admin/settings\">\n",
            "<table class=\"form-table\" role=\"presentation\">\n",
            "<tr>\n",
            "<th scope=\"row\"><label for=\"{field}\">YouTube Channel ID or Handle</label></th>\n",
            "<td>\n",
            "<input name=\"{field}\" id=\"{field}\" type=\"text\" class=\"regular-text\" value=\"{value}\" ",
            "placeholder=\"UCxxxxxxxxxxxxxxxxxxxxxx or @channelhandle\" />\n",
            "<p class=\"description\">Enter your YouTube channel ID that starts with UC, ",
            "or your channel handle that starts with @.</p>\n",
            "<p class=\"description\">Example feed URL that will be used: <code>{feed}</code></p>\n",
            "</td>\n",
            "</tr>\n",
            "</table>\n",
            "<p><button type=\"submit\">Save Changes</button></p>\n",
            "</form>\n",
            "<h2>Shortcode</h2>\n",
            "<p><code>[youtube_uploads]</code></p>\n",
            "<p class=\"description\">The shortcode reads the saved channel from these settings. ",
            "Add <code>channel=@handle</code> to override it for one grid. Caching uses the channel ",
            "value, so switching channels shows fresh results.</p>\n",
            "</div>\n",
        ),
        field = SETTINGS_FIELD,
        value = encode_double_quoted_attribute(saved),
        feed = encode_text(feed_url),
    ));
    render_page("YouTube Uploads Grid", &body)
}
