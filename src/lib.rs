//! Core of a photo memory game.
//!
//! A fixed grid of photos is pulled from a public feed, shown to the player for a
//! short countdown, then hidden. The player has to point out which tile holds a
//! randomly chosen photo. Two subsystems carry the weight here:
//!
//! - [`cache::PhotoCache`]: a bounded in-memory store of decoded photos backed by
//!   a content-addressed disk cache, with single-flight fetching so concurrent
//!   requests for the same URL share one download.
//! - [`game::GameSession`]: the state machine that sequences feed fetch, reveal
//!   countdown, quiz and results, with a serializable snapshot so a session
//!   survives process suspension.
//!
//! Rendering, layout and menus are deliberately outside this crate; the display
//! boundary is the [`cache::PhotoSink`] trait.

pub mod cache;
pub mod config;
pub mod error;
pub mod feed;
pub mod game;
pub mod transport;

pub use cache::{DiskStore, Photo, PhotoCache, PhotoSink};
pub use config::{CacheConfig, GameConfig};
pub use error::{CacheError, FeedError, StorageError, TransportError};
pub use feed::{FeedClient, PhotoRecord};
pub use game::timer::{RoundTimer, TimerEvent};
pub use game::{GameSession, GameState, Phase, Selection, SessionEvent};
pub use transport::{HttpTransport, Transport};
