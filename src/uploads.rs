#![forbid(unsafe_code)]

//! Latest uploads for a channel: feed URL → cache → feed → resolved items.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::cache::{CacheStore, FileCache, MemoryCache};
use crate::channel::{ChannelIdentifier, build_feed_url};
use crate::config::{CacheBackend, DisplaySettings, RuntimeSettings};
use crate::feed::{FeedSource, HttpFeedSource, RawFeedEntry, VIDEO_ID_TAG};
use crate::video_id::{extract_video_id, thumbnail_url};

/// Bumped whenever the cached item shape changes so old entries are ignored.
pub const CACHE_FORMAT_VERSION: &str = "v120";
const CACHE_KEY_PREFIX: &str = "uploads_feed_";
pub const CACHE_SUBDIR: &str = "feed-cache";

/// One playable upload as shown in the grid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedItem {
    pub video_id: String,
    pub title: String,
    pub link: String,
    pub thumbnail_url: String,
}

impl FeedItem {
    pub fn new(video_id: impl Into<String>, title: impl Into<String>, link: impl Into<String>) -> Self {
        let video_id = video_id.into();
        let thumbnail_url = thumbnail_url(&video_id);
        Self {
            video_id,
            title: title.into(),
            link: link.into(),
            thumbnail_url,
        }
    }

    /// Builds an item from a raw entry, `None` when no video id resolves.
    pub fn from_entry(entry: RawFeedEntry) -> Option<Self> {
        let video_id = extract_video_id(&entry.link, entry.tag(VIDEO_ID_TAG))?;
        Some(Self::new(video_id, entry.title, entry.link))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum UploadsError {
    /// Network, HTTP status or parse failure while retrieving the feed.
    #[error("could not load feed {url}: {reason}")]
    FetchFailed { url: String, reason: String },
}

impl UploadsError {
    pub fn fetch_failed(url: &str, err: &anyhow::Error) -> Self {
        Self::FetchFailed {
            url: url.to_string(),
            reason: format!("{err:#}"),
        }
    }
}

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Stable cache key for a feed URL and item count.
pub fn cache_key(feed_url: &str, count: usize) -> String {
    let material = format!("{feed_url}_{count}_{CACHE_FORMAT_VERSION}");
    format!("{CACHE_KEY_PREFIX}{}", blake3::hash(material.as_bytes()).to_hex())
}

#[derive(Clone)]
pub struct UploadsFetcher {
    source: Arc<dyn FeedSource>,
    cache: Arc<dyn CacheStore>,
    clock: Arc<dyn Clock>,
    display: DisplaySettings,
    default_channel: String,
}

impl UploadsFetcher {
    pub fn new(
        source: Arc<dyn FeedSource>,
        cache: Arc<dyn CacheStore>,
        display: DisplaySettings,
        default_channel: impl Into<String>,
    ) -> Self {
        Self {
            source,
            cache,
            clock: Arc::new(SystemClock),
            display,
            default_channel: default_channel.into(),
        }
    }

    /// Production wiring: HTTP feed source and the configured cache backend.
    pub fn from_runtime(settings: &RuntimeSettings) -> Self {
        let cache: Arc<dyn CacheStore> = match settings.cache_backend {
            CacheBackend::Memory => Arc::new(MemoryCache::new()),
            CacheBackend::File => Arc::new(FileCache::new(settings.data_root.join(CACHE_SUBDIR))),
        };
        Self::new(
            Arc::new(HttpFeedSource::new(settings.fetch_timeout)),
            cache,
            settings.display,
            settings.default_channel.clone(),
        )
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn display(&self) -> &DisplaySettings {
        &self.display
    }

    pub fn default_channel(&self) -> &str {
        &self.default_channel
    }

    pub fn feed_url(&self, identifier: &ChannelIdentifier) -> String {
        build_feed_url(identifier, &self.default_channel)
    }

    /// Latest uploads using the configured item count.
    pub fn latest(&self, identifier: &ChannelIdentifier) -> Result<Vec<FeedItem>, UploadsError> {
        self.get_items(identifier, self.display.item_count)
    }

    /// Returns at most `count` items in feed order.
    ///
    /// A live cache entry is returned without touching the network. On a miss
    /// the feed is fetched, truncated, resolved and stored, empty results
    /// included. Fetch failures are returned and leave the cache untouched.
    pub fn get_items(
        &self,
        identifier: &ChannelIdentifier,
        count: usize,
    ) -> Result<Vec<FeedItem>, UploadsError> {
        let feed_url = self.feed_url(identifier);
        let key = cache_key(&feed_url, count);

        let now = self.clock.now();
        if let Some(items) = self.cache.get(&key, now) {
            debug!(%feed_url, items = items.len(), "serving uploads from cache");
            return Ok(items);
        }
        debug!(%feed_url, "uploads cache miss");

        let entries = match self.source.fetch_feed(&feed_url) {
            Ok(entries) => entries,
            Err(err) => {
                warn!(%feed_url, error = %err, "feed fetch failed");
                return Err(err);
            }
        };

        let items: Vec<FeedItem> = entries
            .into_iter()
            .take(count)
            .filter_map(FeedItem::from_entry)
            .collect();

        let expires_at = self
            .clock
            .now()
            .checked_add_signed(Duration::seconds(self.display.cache_ttl_secs()))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        if let Err(err) = self.cache.put(&key, &items, expires_at) {
            warn!(%feed_url, error = %format!("{err:#}"), "could not store uploads in cache");
        }

        Ok(items)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Serves canned entries and counts requests.
    #[derive(Default)]
    pub struct StubFeed {
        pub entries: Mutex<Vec<RawFeedEntry>>,
        pub fail: Mutex<bool>,
        pub calls: AtomicUsize,
        pub urls: Mutex<Vec<String>>,
    }

    impl StubFeed {
        pub fn with_entries(entries: Vec<RawFeedEntry>) -> Arc<Self> {
            Arc::new(Self {
                entries: Mutex::new(entries),
                ..Self::default()
            })
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl FeedSource for StubFeed {
        fn fetch_feed(&self, url: &str) -> Result<Vec<RawFeedEntry>, UploadsError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.urls.lock().push(url.to_string());
            if *self.fail.lock() {
                return Err(UploadsError::FetchFailed {
                    url: url.to_string(),
                    reason: "connection refused".into(),
                });
            }
            Ok(self.entries.lock().clone())
        }
    }

    pub struct ManualClock(pub Mutex<DateTime<Utc>>);

    impl ManualClock {
        pub fn starting_at(now: DateTime<Utc>) -> Arc<Self> {
            Arc::new(Self(Mutex::new(now)))
        }

        pub fn advance(&self, by: Duration) {
            *self.0.lock() += by;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.0.lock()
        }
    }

    pub fn tagged_entry(id: &str) -> RawFeedEntry {
        let mut tags = BTreeMap::new();
        tags.insert(VIDEO_ID_TAG.to_string(), id.to_string());
        RawFeedEntry {
            title: format!("Video {id}"),
            link: format!("https://www.youtube.com/watch?v={id}"),
            tags,
        }
    }

    pub fn numbered_entries(count: usize) -> Vec<RawFeedEntry> {
        (0..count).map(|n| tagged_entry(&format!("video{n:04}"))).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use crate::cache::MemoryCache;
    use crate::channel::normalize;
    use chrono::TimeZone;

    const DEFAULT_CHANNEL: &str = "UCuAXFkgsw1L7xaCfnd5JJOw";

    struct Harness {
        feed: Arc<StubFeed>,
        cache: Arc<MemoryCache>,
        clock: Arc<ManualClock>,
        fetcher: UploadsFetcher,
    }

    fn harness(entries: Vec<RawFeedEntry>) -> Harness {
        let feed = StubFeed::with_entries(entries);
        let cache = Arc::new(MemoryCache::new());
        let clock = ManualClock::starting_at(Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap());
        let fetcher = UploadsFetcher::new(
            feed.clone(),
            cache.clone(),
            DisplaySettings::default(),
            DEFAULT_CHANNEL,
        )
        .with_clock(clock.clone());
        Harness {
            feed,
            cache,
            clock,
            fetcher,
        }
    }

    #[test]
    fn cache_key_depends_on_url_and_count() {
        let a = cache_key("https://example.com/feed", 12);
        assert!(a.starts_with("uploads_feed_"));
        assert_eq!(a, cache_key("https://example.com/feed", 12));
        assert_ne!(a, cache_key("https://example.com/feed", 6));
        assert_ne!(a, cache_key("https://example.com/other", 12));
    }

    #[test]
    fn truncates_to_count_in_feed_order() {
        let h = harness(numbered_entries(15));
        let items = h.fetcher.latest(&normalize("@SomeHandle")).unwrap();
        assert_eq!(items.len(), 12);
        let ids: Vec<_> = items.iter().map(|item| item.video_id.as_str()).collect();
        let expected: Vec<String> = (0..12).map(|n| format!("video{n:04}")).collect();
        assert_eq!(ids, expected);
        assert_eq!(
            items[0].thumbnail_url,
            "https://i.ytimg.com/vi/video0000/hqdefault.jpg"
        );
    }

    #[test]
    fn handle_requests_hit_handle_feed_url() {
        let h = harness(Vec::new());
        h.fetcher.latest(&normalize("@SomeHandle")).unwrap();
        assert_eq!(
            h.feed.urls.lock().as_slice(),
            ["https://www.youtube.com/feeds/videos.xml?channel=%40SomeHandle"]
        );
    }

    #[test]
    fn unresolvable_entries_are_dropped_after_truncation() {
        let mut entries = vec![
            RawFeedEntry {
                title: "no id".into(),
                link: "https://example.com/nothing".into(),
                ..RawFeedEntry::default()
            },
            RawFeedEntry {
                title: "short".into(),
                link: "https://www.youtube.com/shorts/shortid123".into(),
                ..RawFeedEntry::default()
            },
        ];
        entries.extend(numbered_entries(3));
        let h = harness(entries);
        let items = h.fetcher.get_items(&normalize(DEFAULT_CHANNEL), 3).unwrap();
        let ids: Vec<_> = items.iter().map(|item| item.video_id.as_str()).collect();
        assert_eq!(ids, ["shortid123", "video0000"]);
    }

    #[test]
    fn second_call_is_served_from_cache() {
        let h = harness(numbered_entries(3));
        let id = normalize(DEFAULT_CHANNEL);
        let first = h.fetcher.latest(&id).unwrap();
        let second = h.fetcher.latest(&id).unwrap();
        assert_eq!(first, second);
        assert_eq!(h.feed.calls(), 1);
    }

    #[test]
    fn expiry_triggers_exactly_one_refetch_and_overwrites() {
        let h = harness(numbered_entries(2));
        let id = normalize(DEFAULT_CHANNEL);
        h.fetcher.latest(&id).unwrap();

        h.clock.advance(Duration::hours(2) - Duration::seconds(1));
        h.fetcher.latest(&id).unwrap();
        assert_eq!(h.feed.calls(), 1);

        *h.feed.entries.lock() = numbered_entries(1);
        h.clock.advance(Duration::seconds(1));
        let refreshed = h.fetcher.latest(&id).unwrap();
        let again = h.fetcher.latest(&id).unwrap();
        assert_eq!(h.feed.calls(), 2);
        assert_eq!(refreshed.len(), 1);
        assert_eq!(again, refreshed);
        assert_eq!(h.cache.len(), 1);
    }

    #[test]
    fn oversized_cache_lifetime_saturates() {
        let feed = StubFeed::with_entries(numbered_entries(2));
        let display = DisplaySettings {
            cache_hours: u32::MAX,
            ..DisplaySettings::default()
        };
        let clock = ManualClock::starting_at(DateTime::<Utc>::MAX_UTC - Duration::days(1));
        let fetcher = UploadsFetcher::new(
            feed.clone(),
            Arc::new(MemoryCache::new()),
            display,
            DEFAULT_CHANNEL,
        )
        .with_clock(clock);
        let id = normalize("@SomeHandle");

        assert_eq!(fetcher.latest(&id).unwrap().len(), 2);
        assert_eq!(fetcher.latest(&id).unwrap().len(), 2);
        assert_eq!(feed.calls(), 1);
    }

    #[test]
    fn failures_are_not_cached() {
        let h = harness(numbered_entries(2));
        *h.feed.fail.lock() = true;
        let id = normalize(DEFAULT_CHANNEL);

        let err = h.fetcher.latest(&id).unwrap_err();
        assert!(matches!(err, UploadsError::FetchFailed { .. }));
        assert!(h.cache.is_empty());

        *h.feed.fail.lock() = false;
        assert_eq!(h.fetcher.latest(&id).unwrap().len(), 2);
        assert_eq!(h.feed.calls(), 2);
    }

    #[test]
    fn empty_results_are_cached() {
        let h = harness(Vec::new());
        let id = normalize(DEFAULT_CHANNEL);
        assert!(h.fetcher.latest(&id).unwrap().is_empty());
        assert!(h.fetcher.latest(&id).unwrap().is_empty());
        assert_eq!(h.feed.calls(), 1);
    }

    #[test]
    fn empty_identifier_uses_default_channel_key() {
        let h = harness(numbered_entries(1));
        h.fetcher.latest(&normalize("")).unwrap();
        h.fetcher.latest(&normalize(DEFAULT_CHANNEL)).unwrap();
        assert_eq!(h.feed.calls(), 1);
    }
}
