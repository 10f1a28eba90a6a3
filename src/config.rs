/// Tunables for the cache and the game session
///
/// Defaults mirror the shipped game: a 3x3 grid, a 15 second reveal countdown
/// with one tick per second, and a memory store sized at a quarter of the
/// decoded-image working budget.
use std::path::PathBuf;
use std::time::Duration;

/// Public photo feed queried for a fresh board
pub const FLICKR_FEED_URL: &str =
    "https://api.flickr.com/services/feeds/photos_public.gne?format=json&nojsoncallback=1";

/// Cache sizing and placement
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Total decoded-image working budget in bytes.
    /// The in-memory store gets a quarter of this; exceeding it triggers eviction.
    pub image_budget_bytes: usize,
    /// Smallest edge length the downsampled decode must preserve
    pub min_decode_edge: u32,
    /// Directory holding the on-disk byte cache
    pub cache_dir: PathBuf,
}

impl CacheConfig {
    /// Byte capacity of the in-memory LRU store
    pub fn memory_store_capacity(&self) -> usize {
        self.image_budget_bytes / 4
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            image_budget_bytes: 64 * 1024 * 1024,
            min_decode_edge: 256,
            cache_dir: default_cache_dir(),
        }
    }
}

/// Get the photo cache directory
/// Returns ~/.cache/photo-recall/photos on Linux
fn default_cache_dir() -> PathBuf {
    let mut path = dirs_next::cache_dir()
        .or_else(dirs_next::home_dir)
        .unwrap_or_else(std::env::temp_dir);

    path.push("photo-recall");
    path.push("photos");
    path
}

/// Round shape and timing
#[derive(Debug, Clone)]
pub struct GameConfig {
    /// Number of tiles on the board (grid capacity; the feed is truncated to this)
    pub tile_count: usize,
    /// How long the photos stay revealed before the quiz starts
    pub countdown: Duration,
    /// Granularity of countdown display updates
    pub tick_interval: Duration,
    /// Feed endpoint queried on every new game
    pub feed_url: String,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            tile_count: 9,
            countdown: Duration::from_secs(15),
            tick_interval: Duration::from_secs(1),
            feed_url: FLICKR_FEED_URL.to_string(),
        }
    }
}
