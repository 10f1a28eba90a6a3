/// Error taxonomy for the feed, cache and disk layers
///
/// Cache-side errors are `Clone` (string-backed payloads) because a single
/// failure is broadcast to every caller waiting on the same in-flight fetch.
use thiserror::Error;

/// Network-level failure: the bytes for a URL could not be obtained.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// Connection, DNS or timeout failure before a response arrived
    #[error("request for {url} failed: {message}")]
    Connection { url: String, message: String },

    /// The server answered with a non-success status
    #[error("unexpected status {status} for {url}")]
    Status { url: String, status: u16 },
}

/// Failure while loading the photo feed. All-or-nothing: no partial record
/// list is ever surfaced alongside one of these.
#[derive(Debug, Clone, Error)]
pub enum FeedError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The response body was not the expected feed document
    #[error("malformed feed response: {0}")]
    Parse(String),
}

/// Failure resolving a single photo. Local to that photo: sibling fetches and
/// the game session are unaffected, the tile just renders a placeholder.
#[derive(Debug, Clone, Error)]
pub enum CacheError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The downloaded (or disk-cached) bytes were not a decodable image
    #[error("could not decode image for {url}: {message}")]
    Decode { url: String, message: String },

    /// The in-flight fetch this caller was waiting on went away without a result
    #[error("resource unavailable for {url}")]
    Unavailable { url: String },
}

/// Disk cache failure. Always non-fatal: the cache degrades to memory-only or
/// re-fetches on demand, so these are logged rather than propagated to callers.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("cache write task failed: {0}")]
    Background(String),
}
