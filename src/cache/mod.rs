/// Photo cache: memory store, disk store and single-flight fetching
///
/// Resolution order for a photo URL:
/// 1. in-memory LRU store of decoded photos,
/// 2. on-disk byte cache (decode, promote to memory),
/// 3. network fetch (persist best-effort, decode, promote to memory).
///
/// Concurrent requests for the same URL never trigger duplicate downloads or
/// decodes: the first caller does the work, every other caller subscribes to
/// the same outcome.

mod decode;
mod disk;
mod lru;

pub use disk::DiskStore;
pub use lru::{LruStore, Photo};

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::broadcast;

use crate::config::CacheConfig;
use crate::error::CacheError;
use crate::transport::Transport;

type FetchResult = Result<Photo, CacheError>;

/// Display sink for resolved photos (grid tiles, the quiz view).
///
/// The cache hands results over unconditionally; if a sink has been recycled
/// for a different tile in the meantime, the identity check and the drop are
/// the sink implementation's job, not the cache's.
pub trait PhotoSink: Send + Sync {
    fn set_photo(&self, photo: Photo);
    fn show_placeholder(&self);
}

pub struct PhotoCache {
    memory: Mutex<LruStore>,
    disk: Option<DiskStore>,
    transport: Arc<dyn Transport>,
    in_flight: Mutex<HashMap<String, broadcast::Sender<FetchResult>>>,
    min_decode_edge: u32,
}

impl PhotoCache {
    /// Construct a cache over the given transport.
    ///
    /// An unusable cache directory degrades the cache to memory-only rather
    /// than failing construction; disk trouble is never fatal.
    pub fn new(config: &CacheConfig, transport: Arc<dyn Transport>) -> Self {
        let disk = match DiskStore::open(&config.cache_dir) {
            Ok(store) => Some(store),
            Err(e) => {
                log::warn!("disk cache unavailable, running memory-only: {e}");
                None
            }
        };

        Self {
            memory: Mutex::new(LruStore::new(config.memory_store_capacity())),
            disk,
            transport,
            in_flight: Mutex::new(HashMap::new()),
            min_decode_edge: config.min_decode_edge,
        }
    }

    /// Memory-only lookup. No disk or network, but refreshes LRU recency.
    pub fn get_cached(&self, url: &str) -> Option<Photo> {
        self.memory.lock().unwrap().get(url)
    }

    /// Resolve a photo, hitting memory, then disk, then the network.
    ///
    /// Single-flight: at most one fetch/decode for a given URL runs at a time,
    /// and every concurrent caller receives that one outcome.
    pub async fn fetch_or_load(self: &Arc<Self>, url: &str) -> FetchResult {
        if let Some(photo) = self.get_cached(url) {
            return Ok(photo);
        }

        // Join an in-flight fetch for this URL, or claim leadership of a new one.
        let waiter = {
            let mut in_flight = self.in_flight.lock().unwrap();
            match in_flight.get(url) {
                Some(tx) => Some(tx.subscribe()),
                None => {
                    let (tx, _) = broadcast::channel(1);
                    in_flight.insert(url.to_string(), tx);
                    None
                }
            }
        };

        if let Some(mut rx) = waiter {
            return match rx.recv().await {
                Ok(result) => result,
                // Leader went away without delivering a result
                Err(_) => Err(CacheError::Unavailable {
                    url: url.to_string(),
                }),
            };
        }

        // Leader path. The guard clears the in-flight slot and broadcasts the
        // outcome even if this future is dropped mid-way, so waiters never hang.
        let mut guard = InFlightGuard {
            cache: self,
            url,
            result: None,
        };

        let result = self.load_slow(url).await;

        // Promote before releasing the slot: a caller racing past the broadcast
        // must find the photo in the memory store.
        if let Ok(photo) = &result {
            self.memory.lock().unwrap().put(url.to_string(), photo.clone());
        }

        guard.result = Some(result.clone());
        drop(guard);
        result
    }

    /// Warm the cache for a list of URLs before display.
    ///
    /// Each URL resolves independently; failures are logged and never abort
    /// the sibling fetches.
    pub async fn prefetch(self: &Arc<Self>, urls: &[String]) {
        let fetches = urls.iter().map(|url| {
            let cache = Arc::clone(self);
            let url = url.clone();
            async move {
                if let Err(e) = cache.fetch_or_load(&url).await {
                    log::warn!("prefetch failed for {url}: {e}");
                }
            }
        });
        futures::future::join_all(fetches).await;
    }

    /// Hand the photo for `url` to a display sink, lazy-loading on a miss.
    ///
    /// A memory-resident photo is applied synchronously; anything slower runs
    /// as a background task that applies the photo (or a placeholder) once
    /// resolved.
    pub fn apply_photo(self: &Arc<Self>, sink: Arc<dyn PhotoSink>, url: &str) {
        if let Some(photo) = self.get_cached(url) {
            sink.set_photo(photo);
            return;
        }

        let cache = Arc::clone(self);
        let url = url.to_string();
        tokio::spawn(async move {
            match cache.fetch_or_load(&url).await {
                Ok(photo) => sink.set_photo(photo),
                Err(e) => {
                    log::warn!("photo unavailable for {url}: {e}");
                    sink.show_placeholder();
                }
            }
        });
    }

    /// The miss path: disk, then network. Memory promotion is the caller's job.
    async fn load_slow(&self, url: &str) -> FetchResult {
        if let Some(disk) = &self.disk {
            match disk.read(url).await {
                Ok(Some(bytes)) => match self.decode(url, bytes).await {
                    Ok(photo) => {
                        log::debug!("disk hit for {url}");
                        return Ok(photo);
                    }
                    Err(e) => {
                        log::warn!("cached bytes for {url} failed to decode, refetching: {e}")
                    }
                },
                Ok(None) => {}
                Err(e) => log::warn!("disk read failed for {url}: {e}"),
            }
        }

        log::info!("fetching {url}");
        let bytes = self.transport.fetch_bytes(url).await?;

        // Best-effort persist; a failed write never fails the fetch
        if let Some(disk) = &self.disk {
            if let Err(e) = disk.write(url, bytes.clone()).await {
                log::warn!("could not persist {url} to disk cache: {e}");
            }
        }

        self.decode(url, bytes).await
    }

    /// Decode off the interaction thread, downsampled to the working size
    async fn decode(&self, url: &str, bytes: Vec<u8>) -> FetchResult {
        let min_edge = self.min_decode_edge;
        let decoded = tokio::task::spawn_blocking(move || decode::decode_scaled(&bytes, min_edge))
            .await
            .map_err(|e| CacheError::Decode {
                url: url.to_string(),
                message: format!("decode task failed: {e}"),
            })?
            .map_err(|e| CacheError::Decode {
                url: url.to_string(),
                message: e.to_string(),
            })?;

        Ok(Photo::new(decoded))
    }
}

/// Clears the leader's in-flight slot on the way out and broadcasts the result
/// to waiters. Dropping without a result (leader cancelled) closes the channel,
/// which waiters observe as `CacheError::Unavailable`.
struct InFlightGuard<'a> {
    cache: &'a PhotoCache,
    url: &'a str,
    result: Option<FetchResult>,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        let sender = self.cache.in_flight.lock().unwrap().remove(self.url);
        if let (Some(tx), Some(result)) = (sender, self.result.take()) {
            // No receivers is fine: the leader itself already has the result
            let _ = tx.send(result);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use async_trait::async_trait;
    use std::io::Cursor;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Serves one PNG for every URL, counting fetches and optionally stalling
    /// so concurrent callers pile up on the same key
    struct CountingTransport {
        bytes: Vec<u8>,
        calls: AtomicUsize,
        delay: Duration,
        fail: bool,
    }

    impl CountingTransport {
        fn new(bytes: Vec<u8>) -> Self {
            Self {
                bytes,
                calls: AtomicUsize::new(0),
                delay: Duration::from_millis(20),
                fail: false,
            }
        }

        fn failing() -> Self {
            Self {
                bytes: Vec::new(),
                calls: AtomicUsize::new(0),
                delay: Duration::ZERO,
                fail: true,
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Transport for CountingTransport {
        async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, TransportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            if self.fail {
                return Err(TransportError::Status {
                    url: url.to_string(),
                    status: 503,
                });
            }
            Ok(self.bytes.clone())
        }
    }

    fn png_bytes() -> Vec<u8> {
        let image = image::DynamicImage::new_rgba8(8, 8);
        let mut bytes = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
            .unwrap();
        bytes
    }

    fn test_config(dir: &std::path::Path) -> CacheConfig {
        CacheConfig {
            image_budget_bytes: 16 * 1024 * 1024,
            min_decode_edge: 256,
            cache_dir: dir.to_path_buf(),
        }
    }

    #[tokio::test]
    async fn test_concurrent_fetches_share_one_download() {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(CountingTransport::new(png_bytes()));
        let cache = Arc::new(PhotoCache::new(&test_config(dir.path()), transport.clone()));

        let fetches = (0..8).map(|_| {
            let cache = Arc::clone(&cache);
            async move { cache.fetch_or_load("https://example.com/p.png").await }
        });
        let results = futures::future::join_all(fetches).await;

        assert!(results.iter().all(|r| r.is_ok()));
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn test_failure_reaches_every_waiter() {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(CountingTransport::failing());
        let cache = Arc::new(PhotoCache::new(&test_config(dir.path()), transport.clone()));

        let fetches = (0..4).map(|_| {
            let cache = Arc::clone(&cache);
            async move { cache.fetch_or_load("https://example.com/p.png").await }
        });
        let results = futures::future::join_all(fetches).await;

        assert!(results.iter().all(|r| r.is_err()));
    }

    #[tokio::test]
    async fn test_second_fetch_hits_memory() {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(CountingTransport::new(png_bytes()));
        let cache = Arc::new(PhotoCache::new(&test_config(dir.path()), transport.clone()));

        cache.fetch_or_load("https://example.com/p.png").await.unwrap();
        cache.fetch_or_load("https://example.com/p.png").await.unwrap();

        assert_eq!(transport.calls(), 1);
        assert!(cache.get_cached("https://example.com/p.png").is_some());
    }

    #[tokio::test]
    async fn test_evicted_photo_reloads_from_disk_not_network() {
        let dir = tempfile::tempdir().unwrap();
        // A four byte budget means the memory store cannot hold any photo
        let config = CacheConfig {
            image_budget_bytes: 4,
            min_decode_edge: 256,
            cache_dir: dir.path().to_path_buf(),
        };
        let transport = Arc::new(CountingTransport::new(png_bytes()));
        let cache = Arc::new(PhotoCache::new(&config, transport.clone()));

        cache.fetch_or_load("https://example.com/p.png").await.unwrap();
        assert!(cache.get_cached("https://example.com/p.png").is_none());

        cache.fetch_or_load("https://example.com/p.png").await.unwrap();
        assert_eq!(transport.calls(), 1, "second load must come from disk");
    }

    #[tokio::test]
    async fn test_undecodable_bytes_surface_as_decode_error() {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(CountingTransport::new(b"not an image".to_vec()));
        let cache = Arc::new(PhotoCache::new(&test_config(dir.path()), transport));

        let result = cache.fetch_or_load("https://example.com/p.png").await;
        assert!(matches!(result, Err(CacheError::Decode { .. })));
    }

    #[tokio::test]
    async fn test_unwritable_cache_dir_degrades_to_memory_only() {
        // Point the cache directory at a path under a regular file
        let file = tempfile::NamedTempFile::new().unwrap();
        let config = CacheConfig {
            image_budget_bytes: 16 * 1024 * 1024,
            min_decode_edge: 256,
            cache_dir: file.path().join("sub"),
        };
        let transport = Arc::new(CountingTransport::new(png_bytes()));
        let cache = Arc::new(PhotoCache::new(&config, transport.clone()));

        cache.fetch_or_load("https://example.com/p.png").await.unwrap();
        cache.fetch_or_load("https://example.com/p.png").await.unwrap();

        // Still served (from memory), no disk involved
        assert_eq!(transport.calls(), 1);
    }

    /// Fails any URL containing "bad", serves a PNG for the rest
    struct FlakyTransport {
        bytes: Vec<u8>,
    }

    #[async_trait]
    impl Transport for FlakyTransport {
        async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, TransportError> {
            if url.contains("bad") {
                return Err(TransportError::Status {
                    url: url.to_string(),
                    status: 404,
                });
            }
            Ok(self.bytes.clone())
        }
    }

    #[tokio::test]
    async fn test_prefetch_survives_partial_failure() {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(FlakyTransport { bytes: png_bytes() });
        let cache = Arc::new(PhotoCache::new(&test_config(dir.path()), transport));

        let urls = vec![
            "https://example.com/a.png".to_string(),
            "https://example.com/bad.png".to_string(),
            "https://example.com/b.png".to_string(),
        ];
        cache.prefetch(&urls).await;

        // The failed key aborts nothing; its siblings are warm
        assert!(cache.get_cached("https://example.com/a.png").is_some());
        assert!(cache.get_cached("https://example.com/bad.png").is_none());
        assert!(cache.get_cached("https://example.com/b.png").is_some());
    }
}
