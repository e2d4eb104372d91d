#![forbid(unsafe_code)]

//! HTML output: the responsive uploads grid and its modal player.
//!
//! Each grid is wrapped in an element with its own `id` and the inline script
//! only wires cards, overlay and player found inside that wrapper. Several
//! grids on one page therefore work independently.

use std::fmt::Write as _;

use html_escape::{encode_double_quoted_attribute, encode_text};
use url::Url;

use crate::config::MAX_COLUMN_COUNT;
use crate::uploads::{FeedItem, UploadsError};

pub const NO_VIDEOS_MESSAGE: &str = "No videos found.";
pub const FETCH_FAILED_MESSAGE: &str = "Could not load YouTube feed right now.";
pub const EMBED_URL_PREFIX: &str = "https://www.youtube.com/embed/";
pub const EMBED_URL_PARAMS: &str = "?autoplay=1&modestbranding=1&rel=0";

const GRID_STYLES: &str = r#"<style>
  .uploads-grid { display: grid; gap: 16px; }
  .uploads-col-1 { grid-template-columns: 1fr; }
  .uploads-col-2 { grid-template-columns: repeat(2, 1fr); }
  .uploads-col-3 { grid-template-columns: repeat(3, 1fr); }
  .uploads-col-4 { grid-template-columns: repeat(4, 1fr); }

  .uploads-card { display: flex; flex-direction: column; }
  .uploads-item { position: relative; cursor: pointer; background: #000; border-radius: 8px; overflow: hidden; }
  .uploads-thumb { width: 100%; height: auto; display: block; aspect-ratio: 16/9; object-fit: cover; }
  .uploads-title { font-size: 14px; margin-top: 6px; line-height: 1.3; }

  .uploads-modal-backdrop { position: fixed; inset: 0; background: rgba(0,0,0,.85); display: none; align-items: center; justify-content: center; z-index: 9999; padding: 20px; }
  .uploads-modal { width: min(100%, 960px); aspect-ratio: 16/9; background: #000; position: relative; }
  .uploads-close { position: absolute; top: 10px; right: 14px; color: #fff; font-size: 28px; cursor: pointer; }

  @media (max-width: 768px) {
    .uploads-grid { gap: 12px; }
    .uploads-col-3 { grid-template-columns: repeat(2, 1fr); }
  }
  @media (max-width: 480px) {
    .uploads-col-3, .uploads-col-2 { grid-template-columns: 1fr; }
  }
</style>
"#;

const MODAL_MARKUP: &str = r#"<div class="uploads-modal-backdrop" data-uploads-modal>
  <div class="uploads-modal">
    <div class="uploads-close" data-uploads-close role="button" aria-label="Close">&times;</div>
    <iframe data-uploads-player width="100%" height="100%" src="" title="YouTube video"
            frameborder="0"
            allow="accelerometer; autoplay; clipboard-write; encrypted-media; gyroscope; picture-in-picture"
            allowfullscreen
            referrerpolicy="strict-origin-when-cross-origin"></iframe>
  </div>
</div>
"#;

// `__INSTANCE__` and `__EMBED__` are substituted at render time.
const PLAYER_SCRIPT: &str = r#"<script>
(function () {
  var root = document.getElementById('__INSTANCE__');
  if (!root) return;
  var backdrop = root.querySelector('[data-uploads-modal]');
  var player = root.querySelector('[data-uploads-player]');
  var closeBtn = root.querySelector('[data-uploads-close]');
  if (!backdrop || !player) return;

  function openModal(id) {
    player.src = '__EMBED__'.replace('{id}', encodeURIComponent(id));
    backdrop.style.display = 'flex';
  }
  function closeModal() {
    backdrop.style.display = 'none';
    player.src = '';
  }

  root.querySelectorAll('.uploads-item').forEach(function (el) {
    el.addEventListener('click', function () {
      var id = el.getAttribute('data-video');
      if (id) openModal(id);
    });
  });

  if (closeBtn) closeBtn.addEventListener('click', closeModal);
  backdrop.addEventListener('click', function (e) { if (e.target === backdrop) closeModal(); });
  document.addEventListener('keydown', function (e) {
    if (e.key === 'Escape' && backdrop.style.display === 'flex') closeModal();
  });
})();
</script>
"#;

/// Element id for the `n`-th grid on a page.
pub fn instance_id(n: usize) -> String {
    format!("uploads-grid-{n}")
}

/// Embed URL the player loads for a clicked card.
pub fn embed_url(video_id: &str) -> String {
    format!("{EMBED_URL_PREFIX}{video_id}{EMBED_URL_PARAMS}")
}

pub fn render_message(message: &str) -> String {
    format!("<p>{}</p>", encode_text(message))
}

pub fn render_fetch_failed() -> String {
    render_message(FETCH_FAILED_MESSAGE)
}

/// Renders whatever the fetcher produced: a grid, the empty-feed message or
/// the fetch failure message.
pub fn render_uploads(
    result: &Result<Vec<FeedItem>, UploadsError>,
    column_count: u8,
    instance: &str,
) -> String {
    match result {
        Ok(items) => render_grid(items, column_count, instance),
        Err(_) => render_fetch_failed(),
    }
}

/// Renders one card per item, in the order given, plus the styles, overlay and
/// player script for this grid instance.
pub fn render_grid(items: &[FeedItem], column_count: u8, instance: &str) -> String {
    if items.is_empty() {
        return render_message(NO_VIDEOS_MESSAGE);
    }

    let instance = sanitize_instance(instance);
    let columns = column_count.clamp(1, MAX_COLUMN_COUNT);

    let mut html = String::with_capacity(4096 + items.len() * 320);
    html.push_str(GRID_STYLES);
    let _ = writeln!(html, r#"<div class="uploads-grid-instance" id="{instance}">"#);
    let _ = writeln!(html, r#"<div class="uploads-grid uploads-col-{columns}">"#);
    for item in items {
        push_card(&mut html, item);
    }
    html.push_str("</div>\n");
    html.push_str(MODAL_MARKUP);
    html.push_str(
        &PLAYER_SCRIPT
            .replace("__INSTANCE__", &instance)
            .replace("__EMBED__", &embed_url("{id}")),
    );
    html.push_str("</div>\n");
    html
}

fn push_card(html: &mut String, item: &FeedItem) {
    let title_attr = encode_double_quoted_attribute(&item.title);
    let _ = write!(
        html,
        concat!(
            "  <div class=\"uploads-card\">\n",
            "    <div class=\"uploads-item\" data-video=\"{id}\">\n",
            "      <img class=\"uploads-thumb\" loading=\"lazy\" src=\"{src}\" alt=\"{alt}\">\n",
            "    </div>\n",
            "    <div class=\"uploads-title\">{title}</div>\n",
            "  </div>\n",
        ),
        id = encode_double_quoted_attribute(&item.video_id),
        src = escape_url(&item.thumbnail_url),
        alt = title_attr,
        title = encode_text(&item.title),
    );
}

/// Attribute-safe URL, or an empty string for anything that is not http(s).
pub fn escape_url(raw: &str) -> String {
    match Url::parse(raw.trim()) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => {
            encode_double_quoted_attribute(url.as_str()).into_owned()
        }
        _ => String::new(),
    }
}

fn sanitize_instance(instance: &str) -> String {
    let cleaned: String = instance
        .chars()
        .filter(|ch| ch.is_ascii_alphanumeric() || *ch == '-' || *ch == '_')
        .collect();
    if cleaned.is_empty() {
        instance_id(1)
    } else {
        cleaned
    }
}

/// Minimal standalone HTML document around rendered content.
pub fn render_page(title: &str, body: &str) -> String {
    format!(
        concat!(
            "<!DOCTYPE html>\n",
            "<html lang=\"en\">\n",
            "<head>\n",
            "<meta charset=\"utf-8\">\n",
            "<meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n",
            "<title>{title}</title>\n",
            "</head>\n",
            "<body>\n",
            "{body}",
            "</body>\n",
            "</html>\n",
        ),
        title = encode_text(title),
        body = body,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn items(count: usize) -> Vec<FeedItem> {
        (0..count)
            .map(|n| {
                FeedItem::new(
                    format!("vid{n:03}abc"),
                    format!("Title {n}"),
                    format!("https://www.youtube.com/watch?v=vid{n:03}abc"),
                )
            })
            .collect()
    }

    #[test]
    fn empty_items_render_only_the_message() {
        assert_eq!(render_grid(&[], 3, "uploads-grid-1"), "<p>No videos found.</p>");
    }

    #[test]
    fn fetch_failure_renders_generic_message() {
        let result = Err(UploadsError::FetchFailed {
            url: "https://example.com".into(),
            reason: "timeout".into(),
        });
        let html = render_uploads(&result, 3, "uploads-grid-1");
        assert_eq!(html, "<p>Could not load YouTube feed right now.</p>");
        assert!(!html.contains("timeout"));
    }

    #[test]
    fn one_card_per_item_in_order() {
        let html = render_grid(&items(12), 3, "uploads-grid-1");
        assert_eq!(html.matches("class=\"uploads-card\"").count(), 12);
        let positions: Vec<usize> = (0..12)
            .map(|n| html.find(&format!("data-video=\"vid{n:03}abc\"")).unwrap())
            .collect();
        assert!(positions.windows(2).all(|pair| pair[0] < pair[1]));
        assert!(html.contains("loading=\"lazy\""));
        assert!(html.contains("src=\"https://i.ytimg.com/vi/vid000abc/hqdefault.jpg\""));
    }

    #[test]
    fn column_count_selects_grid_class() {
        assert!(render_grid(&items(1), 2, "g").contains("uploads-grid uploads-col-2"));
        assert!(render_grid(&items(1), 9, "g").contains("uploads-grid uploads-col-4"));
        assert!(render_grid(&items(1), 0, "g").contains("uploads-grid uploads-col-1"));
    }

    #[test]
    fn styles_include_breakpoints() {
        let html = render_grid(&items(1), 3, "g");
        assert!(html.contains("@media (max-width: 768px)"));
        assert!(html.contains(".uploads-col-3 { grid-template-columns: repeat(2, 1fr); }"));
        assert!(html.contains("@media (max-width: 480px)"));
        assert!(html.contains(".uploads-col-3, .uploads-col-2 { grid-template-columns: 1fr; }"));
    }

    #[test]
    fn titles_and_ids_are_escaped() {
        let item = FeedItem::new(
            "abc\"def",
            "<script>alert('x')</script> & \"quotes\"",
            "https://youtu.be/abcdef",
        );
        let html = render_grid(&[item], 3, "g");
        assert!(!html.contains("<script>alert"));
        assert!(html.contains("&lt;script&gt;alert('x')&lt;/script&gt; &amp; \"quotes\""));
        assert!(html.contains("alt=\"&lt;script&gt;alert('x')&lt;/script&gt; &amp; &quot;quotes&quot;\""));
        assert!(html.contains("data-video=\"abc&quot;def\""));
    }

    #[test]
    fn player_script_is_scoped_to_instance() {
        let html = render_grid(&items(2), 3, "uploads-grid-7");
        assert!(html.contains("id=\"uploads-grid-7\""));
        assert!(html.contains("document.getElementById('uploads-grid-7')"));
        assert!(html.contains(
            "'https://www.youtube.com/embed/{id}?autoplay=1&modestbranding=1&rel=0'"
        ));
        assert!(html.contains("e.key === 'Escape'"));
        assert!(html.contains("player.src = '';"));
    }

    #[test]
    fn hostile_instance_ids_are_cleaned() {
        let html = render_grid(&items(1), 3, "x');alert(1);//");
        assert!(html.contains("getElementById('xalert1')"));
        assert!(render_grid(&items(1), 3, "'\"").contains("id=\"uploads-grid-1\""));
    }

    #[test]
    fn escape_url_drops_foreign_schemes() {
        assert_eq!(escape_url("javascript:alert(1)"), "");
        assert_eq!(escape_url("not a url"), "");
        assert_eq!(
            escape_url("https://i.ytimg.com/vi/a\"b/hqdefault.jpg"),
            "https://i.ytimg.com/vi/a%22b/hqdefault.jpg"
        );
    }

    #[test]
    fn embed_url_matches_player_contract() {
        assert_eq!(
            embed_url("abc123"),
            "https://www.youtube.com/embed/abc123?autoplay=1&modestbranding=1&rel=0"
        );
    }

    #[test]
    fn page_wraps_body() {
        let page = render_page("A & B", "<p>hi</p>\n");
        assert!(page.starts_with("<!DOCTYPE html>"));
        assert!(page.contains("<title>A &amp; B</title>"));
        assert!(page.contains("<p>hi</p>"));
    }
}
