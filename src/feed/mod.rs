/// Photo feed client
///
/// Issues one request to the public feed endpoint and parses the JSON body
/// into at most `max_items` photo records. Parsing is all-or-nothing: a
/// malformed document yields an error, never a partial list. Extra feed
/// entries beyond the grid capacity are silently dropped.
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::GameConfig;
use crate::error::FeedError;
use crate::transport::Transport;

/// One grid tile's photo, parsed from a feed entry.
///
/// Identity is `resource_url`; everything but `revealed` is immutable once
/// parsed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhotoRecord {
    pub title: String,
    /// Link to the photo's page (not the image itself)
    pub page_link: String,
    /// URL of the image bytes; doubles as the cache key
    pub resource_url: String,
    /// Whether the tile currently shows its photo during the quiz
    pub revealed: bool,
}

/// Shape of the feed document: `{"items": [{"title", "link", "media": {"m"}}]}`
#[derive(Debug, Deserialize)]
struct FeedDocument {
    items: Vec<FeedItem>,
}

#[derive(Debug, Deserialize)]
struct FeedItem {
    #[serde(default)]
    title: String,
    #[serde(default)]
    link: String,
    media: FeedMedia,
}

#[derive(Debug, Deserialize)]
struct FeedMedia {
    m: String,
}

pub struct FeedClient {
    transport: Arc<dyn Transport>,
    endpoint: String,
    max_items: usize,
}

impl FeedClient {
    pub fn new(transport: Arc<dyn Transport>, endpoint: impl Into<String>, max_items: usize) -> Self {
        Self {
            transport,
            endpoint: endpoint.into(),
            max_items,
        }
    }

    /// Build a client for the round shape in `config`: its feed endpoint and
    /// a list capped at the grid capacity
    pub fn from_config(transport: Arc<dyn Transport>, config: &GameConfig) -> Self {
        Self::new(transport, config.feed_url.clone(), config.tile_count)
    }

    /// Fetch and parse a fresh photo list, truncated to the grid capacity
    pub async fn fetch_photo_list(&self) -> Result<Vec<PhotoRecord>, FeedError> {
        let bytes = self.transport.fetch_bytes(&self.endpoint).await?;
        let records = parse_feed(&bytes, self.max_items)?;
        log::info!("feed returned {} photos", records.len());
        Ok(records)
    }
}

fn parse_feed(bytes: &[u8], max_items: usize) -> Result<Vec<PhotoRecord>, FeedError> {
    let document: FeedDocument =
        serde_json::from_slice(bytes).map_err(|e| FeedError::Parse(e.to_string()))?;

    Ok(document
        .items
        .into_iter()
        .take(max_items)
        .map(|item| PhotoRecord {
            title: item.title,
            page_link: item.link,
            resource_url: item.media.m,
            revealed: false,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use async_trait::async_trait;

    fn feed_json(count: usize) -> Vec<u8> {
        let items: Vec<String> = (0..count)
            .map(|i| {
                format!(
                    r#"{{"title": "photo {i}", "link": "https://flickr.com/p/{i}",
                        "media": {{"m": "https://live.staticflickr.com/{i}_m.jpg"}}}}"#
                )
            })
            .collect();
        format!(r#"{{"items": [{}]}}"#, items.join(",")).into_bytes()
    }

    struct StaticTransport {
        body: Result<Vec<u8>, TransportError>,
    }

    #[async_trait]
    impl Transport for StaticTransport {
        async fn fetch_bytes(&self, _url: &str) -> Result<Vec<u8>, TransportError> {
            self.body.clone()
        }
    }

    #[test]
    fn test_parse_maps_fields() {
        let records = parse_feed(&feed_json(2), 9).unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].title, "photo 0");
        assert_eq!(records[0].page_link, "https://flickr.com/p/0");
        assert_eq!(records[0].resource_url, "https://live.staticflickr.com/0_m.jpg");
        assert!(!records[0].revealed);
    }

    #[test]
    fn test_excess_entries_are_dropped_silently() {
        let records = parse_feed(&feed_json(20), 9).unwrap();
        assert_eq!(records.len(), 9);
    }

    #[test]
    fn test_malformed_document_is_a_parse_error() {
        assert!(matches!(
            parse_feed(b"{\"items\": 42}", 9),
            Err(FeedError::Parse(_))
        ));
        assert!(matches!(
            parse_feed(b"not json at all", 9),
            Err(FeedError::Parse(_))
        ));
    }

    #[test]
    fn test_missing_media_is_a_parse_error() {
        let body = br#"{"items": [{"title": "no media", "link": "x"}]}"#;
        assert!(matches!(parse_feed(body, 9), Err(FeedError::Parse(_))));
    }

    #[tokio::test]
    async fn test_transport_failure_surfaces_with_no_records() {
        let transport = Arc::new(StaticTransport {
            body: Err(TransportError::Status {
                url: "feed".to_string(),
                status: 500,
            }),
        });
        let client = FeedClient::new(transport, "https://example.com/feed", 9);

        assert!(matches!(
            client.fetch_photo_list().await,
            Err(FeedError::Transport(_))
        ));
    }

    /// Serves a canned body while remembering which URL was requested
    struct RecordingTransport {
        body: Vec<u8>,
        requested: std::sync::Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Transport for RecordingTransport {
        async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, TransportError> {
            self.requested.lock().unwrap().push(url.to_string());
            Ok(self.body.clone())
        }
    }

    #[tokio::test]
    async fn test_from_config_queries_the_configured_endpoint() {
        let transport = Arc::new(RecordingTransport {
            body: feed_json(12),
            requested: std::sync::Mutex::new(Vec::new()),
        });
        let config = GameConfig {
            feed_url: "https://example.com/custom-feed".to_string(),
            tile_count: 9,
            ..GameConfig::default()
        };
        let client = FeedClient::from_config(transport.clone(), &config);

        let records = client.fetch_photo_list().await.unwrap();

        assert_eq!(
            transport.requested.lock().unwrap().as_slice(),
            ["https://example.com/custom-feed"]
        );
        // Grid capacity from the config caps the list too
        assert_eq!(records.len(), 9);
    }

    #[tokio::test]
    async fn test_fetch_parses_full_document() {
        let transport = Arc::new(StaticTransport {
            body: Ok(feed_json(9)),
        });
        let client = FeedClient::new(transport, "https://example.com/feed", 9);

        let records = client.fetch_photo_list().await.unwrap();
        assert_eq!(records.len(), 9);
    }
}
