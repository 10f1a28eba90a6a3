/// Byte-bounded LRU store for decoded photos
///
/// Capacity is measured in bytes of decoded pixel data, not entry count. The
/// invariant after any `put` is `used_bytes <= capacity_bytes`; a put that
/// overflows the budget evicts from the least recently used end until the
/// store fits again. Eviction never touches the disk copy of a photo.
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use image::DynamicImage;

/// A decoded photo plus its eviction weight. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Photo {
    pub image: Arc<DynamicImage>,
    pub size_bytes: usize,
}

impl Photo {
    pub fn new(image: DynamicImage) -> Self {
        let size_bytes = image.as_bytes().len();
        Self {
            image: Arc::new(image),
            size_bytes,
        }
    }
}

pub struct LruStore {
    capacity_bytes: usize,
    used_bytes: usize,
    entries: HashMap<String, Photo>,
    /// Recency order, front = least recently used
    order: VecDeque<String>,
}

impl LruStore {
    pub fn new(capacity_bytes: usize) -> Self {
        Self {
            capacity_bytes,
            used_bytes: 0,
            entries: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    /// Look up a photo, marking it most recently used on a hit
    pub fn get(&mut self, key: &str) -> Option<Photo> {
        let photo = self.entries.get(key)?.clone();
        self.touch(key);
        Some(photo)
    }

    /// Insert a photo, evicting least recently used entries if the budget is
    /// exceeded. Re-inserting an existing key replaces it and refreshes recency.
    pub fn put(&mut self, key: String, photo: Photo) {
        if let Some(old) = self.entries.insert(key.clone(), photo.clone()) {
            self.used_bytes -= old.size_bytes;
            self.order.retain(|k| k != &key);
        }
        self.used_bytes += photo.size_bytes;
        self.order.push_back(key);
        self.evict_to_capacity();
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn used_bytes(&self) -> usize {
        self.used_bytes
    }

    pub fn capacity_bytes(&self) -> usize {
        self.capacity_bytes
    }

    fn touch(&mut self, key: &str) {
        if let Some(pos) = self.order.iter().position(|k| k == key) {
            if let Some(k) = self.order.remove(pos) {
                self.order.push_back(k);
            }
        }
    }

    fn evict_to_capacity(&mut self) {
        while self.used_bytes > self.capacity_bytes {
            let Some(oldest) = self.order.pop_front() else {
                break;
            };
            if let Some(evicted) = self.entries.remove(&oldest) {
                self.used_bytes -= evicted.size_bytes;
                log::debug!(
                    "evicted {} ({} bytes) from memory store",
                    oldest,
                    evicted.size_bytes
                );
            }
        }
    }
}
