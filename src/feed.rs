#![forbid(unsafe_code)]

//! Feed retrieval and parsing.
//!
//! Everything above this module only sees [`FeedSource`], an ordered list of
//! entries with their title, link and raw child tags. The HTTP implementation
//! is blocking (ureq); async callers run it on a blocking thread.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use tracing::{debug, info};

use crate::uploads::UploadsError;

/// Key under which an entry's `yt:videoId` lands in [`RawFeedEntry::tags`]
/// (`yt` is bound to `http://www.youtube.com/xml/schemas/2015`).
pub const VIDEO_ID_TAG: &str = "{http://www.youtube.com/xml/schemas/2015}videoId";

const MAX_REDIRECTS: u32 = 5;
const USER_AGENT: &str = concat!("uploads-grid/", env!("CARGO_PKG_VERSION"));

/// One `<entry>` (Atom) or `<item>` (RSS), in feed order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawFeedEntry {
    pub title: String,
    pub link: String,
    /// First text value of every element inside the entry. Prefixed names are
    /// stored as `{namespace-uri}local`, unprefixed ones by local name.
    pub tags: BTreeMap<String, String>,
}

impl RawFeedEntry {
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }
}

pub trait FeedSource: Send + Sync {
    fn fetch_feed(&self, url: &str) -> Result<Vec<RawFeedEntry>, UploadsError>;
}

/// Fetches feeds over HTTPS with a bounded timeout and redirect support
/// (handle-based feed URLs redirect to the canonical one).
pub struct HttpFeedSource {
    agent: ureq::Agent,
}

impl HttpFeedSource {
    pub fn new(timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(timeout)
            .redirects(MAX_REDIRECTS)
            .user_agent(USER_AGENT)
            .build();
        Self { agent }
    }

    fn download(&self, url: &str) -> Result<String> {
        let response = match self.agent.get(url).call() {
            Ok(response) => response,
            Err(ureq::Error::Status(code, _)) => bail!("feed endpoint answered HTTP {code}"),
            Err(err) => return Err(anyhow!(err).context("requesting feed")),
        };
        response.into_string().context("reading feed body")
    }
}

impl FeedSource for HttpFeedSource {
    fn fetch_feed(&self, url: &str) -> Result<Vec<RawFeedEntry>, UploadsError> {
        info!(%url, "fetching channel feed");
        let entries = self
            .download(url)
            .and_then(|body| parse_feed(&body))
            .map_err(|err| UploadsError::fetch_failed(url, &err))?;
        debug!(%url, entries = entries.len(), "parsed channel feed");
        Ok(entries)
    }
}

/// Parses an Atom or RSS document into its entries. Documents that are not
/// well-formed XML, or that contain no feed root, are errors; a valid feed
/// with no entries is an empty list.
pub fn parse_feed(xml: &str) -> Result<Vec<RawFeedEntry>> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    // Prefix declarations of every open element, innermost last.
    let mut scopes: Vec<HashMap<String, String>> = Vec::new();
    let mut entries = Vec::new();
    let mut current: Option<RawFeedEntry> = None;
    // Qualified names of the open elements below the current entry.
    let mut open_tags: Vec<String> = Vec::new();
    let mut saw_root = false;
    let mut buffer = Vec::new();

    loop {
        match reader
            .read_event_into(&mut buffer)
            .with_context(|| format!("malformed feed XML near byte {}", reader.buffer_position()))?
        {
            Event::Start(ref element) => {
                let name = qualified_name(element);
                if !saw_root {
                    saw_root = true;
                    ensure_feed_root(&name)?;
                }
                scopes.push(declared_namespaces(element)?);
                match current.as_mut() {
                    Some(entry) => {
                        if open_tags.is_empty() {
                            take_link_href(entry, &name, element)?;
                        }
                        open_tags.push(name);
                    }
                    None if is_entry(&name) => current = Some(RawFeedEntry::default()),
                    None => {}
                }
            }
            Event::Empty(ref element) => {
                let name = qualified_name(element);
                if !saw_root {
                    saw_root = true;
                    ensure_feed_root(&name)?;
                }
                if let Some(entry) = current.as_mut()
                    && open_tags.is_empty()
                {
                    take_link_href(entry, &name, element)?;
                }
            }
            Event::Text(ref text) => {
                if let (Some(entry), Some(tag)) = (current.as_mut(), open_tags.last()) {
                    let value = text.unescape().context("decoding feed text")?;
                    record_text(entry, tag, &value, open_tags.len(), &scopes);
                }
            }
            Event::CData(ref data) => {
                if let (Some(entry), Some(tag)) = (current.as_mut(), open_tags.last()) {
                    let value = String::from_utf8_lossy(data);
                    record_text(entry, tag, &value, open_tags.len(), &scopes);
                }
            }
            Event::End(_) => {
                scopes.pop();
                if open_tags.pop().is_none()
                    && let Some(entry) = current.take()
                {
                    entries.push(entry);
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buffer.clear();
    }

    if !saw_root {
        bail!("feed document is empty");
    }
    Ok(entries)
}

fn qualified_name(element: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(element.name().as_ref()).into_owned()
}

fn local_name(qualified: &str) -> &str {
    qualified
        .split_once(':')
        .map_or(qualified, |(_, local)| local)
}

fn is_entry(name: &str) -> bool {
    matches!(local_name(name), "entry" | "item")
}

fn ensure_feed_root(name: &str) -> Result<()> {
    match local_name(name) {
        "feed" | "rss" | "RDF" => Ok(()),
        other => bail!("unexpected feed root element <{other}>"),
    }
}

fn declared_namespaces(element: &BytesStart<'_>) -> Result<HashMap<String, String>> {
    let mut namespaces = HashMap::new();
    for attribute in element.attributes() {
        let attribute = attribute.context("reading element attributes")?;
        let key = String::from_utf8_lossy(attribute.key.as_ref()).into_owned();
        if let Some(prefix) = key.strip_prefix("xmlns:") {
            let uri = attribute
                .unescape_value()
                .context("decoding namespace declaration")?;
            namespaces.insert(prefix.to_string(), uri.into_owned());
        }
    }
    Ok(namespaces)
}

/// Atom entries carry their link as `<link rel="alternate" href="…"/>`.
fn take_link_href(entry: &mut RawFeedEntry, name: &str, element: &BytesStart<'_>) -> Result<()> {
    if name != "link" || !entry.link.is_empty() {
        return Ok(());
    }
    let mut href = None;
    let mut alternate = true;
    for attribute in element.attributes() {
        let attribute = attribute.context("reading link attributes")?;
        let value = attribute
            .unescape_value()
            .context("decoding link attribute")?;
        match attribute.key.as_ref() {
            b"href" => href = Some(value.into_owned()),
            b"rel" => alternate = value == "alternate",
            _ => {}
        }
    }
    if let Some(href) = href
        && alternate
    {
        entry.link = href.trim().to_string();
    }
    Ok(())
}

fn record_text(
    entry: &mut RawFeedEntry,
    tag: &str,
    value: &str,
    depth: usize,
    scopes: &[HashMap<String, String>],
) {
    if depth == 1 {
        match tag {
            "title" if entry.title.is_empty() => entry.title = value.to_string(),
            "link" if entry.link.is_empty() => entry.link = value.trim().to_string(),
            _ => {}
        }
    }

    let key = match tag.split_once(':') {
        Some((prefix, local)) => match scopes.iter().rev().find_map(|scope| scope.get(prefix)) {
            Some(uri) => format!("{{{uri}}}{local}"),
            None => tag.to_string(),
        },
        None => tag.to_string(),
    };
    entry.tags.entry(key).or_insert_with(|| value.to_string());
}
