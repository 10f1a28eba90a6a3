/// Game session state machine
///
/// Round lifecycle: `Idle -> Loading -> Revealed(countdown) -> Quiz -> Results`.
/// Transitions are plain synchronous methods over [`GameState`], processed in
/// arrival order on whichever task drives the session; only the feed fetch,
/// the countdown and the photo loads run in the background. The full state
/// serializes to JSON so a session survives process suspension.

pub mod timer;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use self::timer::{RoundTimer, TimerEvent};
use crate::cache::{PhotoCache, PhotoSink};
use crate::config::GameConfig;
use crate::error::FeedError;
use crate::feed::{FeedClient, PhotoRecord};

/// Where the session currently stands. Derived from the snapshot fields, so a
/// restored state lands back in the same phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Loading,
    Revealed,
    Quiz,
    Results,
}

/// Serializable session snapshot
///
/// Restoring from one resumes exactly where the previous session stood:
/// the countdown is not restarted, a mid-quiz target is preserved, and the
/// results line is reproducible from the stored numbers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameState {
    pub records: Vec<PhotoRecord>,
    /// Grid position currently quizzed; -1 when no quiz is active
    pub quiz_index: i32,
    /// Seconds left on the reveal countdown
    pub countdown_remaining: u64,
    pub wrong_moves: u32,
    /// Time the finished quiz took, in whole seconds
    pub elapsed_seconds: i64,
    /// Millisecond timestamp of quiz start; 0 outside a quiz
    pub quiz_started_at_ms: i64,
    pub results_shown: bool,
    /// Loading indicator visibility
    pub loading: bool,
}

impl Default for GameState {
    fn default() -> Self {
        Self {
            records: Vec::new(),
            quiz_index: -1,
            countdown_remaining: 0,
            wrong_moves: 0,
            elapsed_seconds: 0,
            quiz_started_at_ms: 0,
            results_shown: false,
            loading: false,
        }
    }
}

impl GameState {
    pub fn phase(&self) -> Phase {
        if self.loading {
            Phase::Loading
        } else if self.results_shown {
            Phase::Results
        } else if self.quiz_index >= 0 {
            Phase::Quiz
        } else if self.records.is_empty() {
            Phase::Idle
        } else {
            Phase::Revealed
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    fn hidden_positions(&self) -> Vec<usize> {
        self.records
            .iter()
            .enumerate()
            .filter(|(_, record)| !record.revealed)
            .map(|(position, _)| position)
            .collect()
    }
}

/// Inputs the session processes, strictly in arrival order
#[derive(Debug)]
pub enum SessionEvent {
    /// Feed fetch completed. Results from a superseded fetch carry a stale
    /// generation and are discarded.
    FeedLoaded {
        generation: u64,
        result: Result<Vec<PhotoRecord>, FeedError>,
    },
    /// Countdown display update; no state transition
    TimerTick(u64),
    TimerFinished,
}

/// Outcome of a tile selection during the quiz
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    /// Right tile; the quiz continues with a new hidden target
    Correct { next_target: usize },
    /// Wrong tile; `wrong_moves` incremented, target unchanged
    Wrong,
    /// Right tile and nothing left hidden; the round is over
    Finished {
        elapsed_seconds: i64,
        wrong_moves: u32,
    },
    /// Not in the quiz phase, or the position is out of range
    Ignored,
}

enum Pending {
    Session(Option<SessionEvent>),
    Timer(Option<TimerEvent>),
}

pub struct GameSession {
    state: GameState,
    config: GameConfig,
    cache: Arc<PhotoCache>,
    feed: Arc<FeedClient>,
    timer: Option<RoundTimer>,
    events_tx: mpsc::UnboundedSender<SessionEvent>,
    events_rx: mpsc::UnboundedReceiver<SessionEvent>,
    /// Bumped on every new game; stale feed results are recognized by it
    generation: u64,
    rng: StdRng,
}

impl GameSession {
    pub fn new(config: GameConfig, cache: Arc<PhotoCache>, feed: Arc<FeedClient>) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            state: GameState::default(),
            config,
            cache,
            feed,
            timer: None,
            events_tx,
            events_rx,
            generation: 0,
            rng: StdRng::from_entropy(),
        }
    }

    /// Resume from a persisted snapshot.
    ///
    /// A state suspended mid-countdown picks the countdown up where it stood
    /// rather than restarting it; a state suspended mid-loading gets its feed
    /// fetch re-issued, since the task that produced the snapshot's fetch died
    /// with the old process; mid-quiz and results states need neither.
    /// Must be called from within a tokio runtime.
    pub fn restore(
        state: GameState,
        config: GameConfig,
        cache: Arc<PhotoCache>,
        feed: Arc<FeedClient>,
    ) -> Self {
        let mut session = Self::new(config, cache, feed);
        session.state = state;

        if session.state.loading {
            session.spawn_feed_fetch();
        } else if session.state.phase() == Phase::Revealed && session.state.countdown_remaining > 0
        {
            session.timer = Some(RoundTimer::start(
                Duration::from_secs(session.state.countdown_remaining),
                session.config.tick_interval,
            ));
        }
        session
    }

    /// Fix the RNG seed so the quiz target sequence is reproducible
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn state(&self) -> &GameState {
        &self.state
    }

    pub fn snapshot(&self) -> GameState {
        self.state.clone()
    }

    /// Start (or restart) a game: cancel any running countdown, clear the
    /// board, and kick off a feed fetch whose result arrives as a
    /// [`SessionEvent::FeedLoaded`]. An earlier in-flight fetch is superseded;
    /// its late result will be discarded by the generation guard.
    pub fn start_new_game(&mut self) {
        self.cancel_timer();
        self.generation += 1;
        self.state = GameState {
            loading: true,
            ..GameState::default()
        };
        self.spawn_feed_fetch();
    }

    /// Fetch the photo list in the background, tagged with the current
    /// generation so a superseded result is recognizable
    fn spawn_feed_fetch(&self) {
        let generation = self.generation;
        let feed = Arc::clone(&self.feed);
        let tx = self.events_tx.clone();
        tokio::spawn(async move {
            let result = feed.fetch_photo_list().await;
            let _ = tx.send(SessionEvent::FeedLoaded { generation, result });
        });
    }

    /// Next pending event, countdown included. Intended to be awaited from the
    /// single task that also applies the events.
    pub async fn next_event(&mut self) -> SessionEvent {
        loop {
            let pending = match self.timer.as_mut() {
                Some(timer) => tokio::select! {
                    event = self.events_rx.recv() => Pending::Session(event),
                    event = timer.recv() => Pending::Timer(event),
                },
                None => Pending::Session(self.events_rx.recv().await),
            };

            match pending {
                Pending::Session(Some(event)) => return event,
                // The session holds its own sender, so the channel cannot
                // close; loop for form's sake
                Pending::Session(None) => continue,
                Pending::Timer(Some(TimerEvent::Tick(seconds))) => {
                    return SessionEvent::TimerTick(seconds);
                }
                Pending::Timer(Some(TimerEvent::Finished)) => {
                    self.timer = None;
                    return SessionEvent::TimerFinished;
                }
                Pending::Timer(None) => self.timer = None,
            }
        }
    }

    /// Apply one event. Returns the error to surface when feed loading failed;
    /// everything else is observable through [`Self::state`].
    pub fn apply(&mut self, event: SessionEvent) -> Option<FeedError> {
        match event {
            SessionEvent::FeedLoaded { generation, result } => {
                if generation != self.generation {
                    log::debug!("discarding stale feed result (generation {generation})");
                    return None;
                }
                self.state.loading = false;
                match result {
                    Ok(records) => {
                        self.install_records(records);
                        None
                    }
                    Err(e) => {
                        // Session stays idle; retry is user-initiated
                        log::warn!("feed fetch failed: {e}");
                        Some(e)
                    }
                }
            }
            SessionEvent::TimerTick(seconds) => {
                if self.state.phase() == Phase::Revealed {
                    self.state.countdown_remaining = seconds;
                }
                None
            }
            SessionEvent::TimerFinished => {
                if self.state.phase() == Phase::Revealed {
                    self.state.countdown_remaining = 0;
                    self.begin_quiz();
                }
                None
            }
        }
    }

    /// Player tapped the tile at `position`
    pub fn select_tile(&mut self, position: usize) -> Selection {
        if self.state.phase() != Phase::Quiz || position >= self.state.records.len() {
            return Selection::Ignored;
        }

        if position as i32 != self.state.quiz_index {
            self.state.wrong_moves += 1;
            return Selection::Wrong;
        }

        self.state.records[position].revealed = true;
        if self.state.records.iter().any(|record| !record.revealed) {
            self.pick_quiz_target();
            Selection::Correct {
                next_target: self.state.quiz_index as usize,
            }
        } else {
            self.finish_quiz();
            Selection::Finished {
                elapsed_seconds: self.state.elapsed_seconds,
                wrong_moves: self.state.wrong_moves,
            }
        }
    }

    /// Resolve the current quiz photo into a display sink.
    ///
    /// A target outside the board (possible only through a corrupt snapshot)
    /// is treated the same as no target.
    pub fn show_quiz_photo(&self, sink: Arc<dyn PhotoSink>) {
        if self.state.quiz_index < 0 {
            return;
        }
        let Some(record) = self.state.records.get(self.state.quiz_index as usize) else {
            log::warn!(
                "quiz target {} is outside the {}-tile board, ignoring",
                self.state.quiz_index,
                self.state.records.len()
            );
            return;
        };
        self.cache.apply_photo(sink, &record.resource_url);
    }

    fn install_records(&mut self, records: Vec<PhotoRecord>) {
        let records: Vec<_> = records
            .into_iter()
            .take(self.config.tile_count)
            .collect();

        let urls: Vec<String> = records
            .iter()
            .map(|record| record.resource_url.clone())
            .collect();
        self.state.records = records;

        // Warm the cache while the player studies the board
        let cache = Arc::clone(&self.cache);
        tokio::spawn(async move {
            cache.prefetch(&urls).await;
        });

        self.start_timer();
    }

    fn start_timer(&mut self) {
        self.cancel_timer();
        self.state.countdown_remaining = self.config.countdown.as_secs();
        self.timer = Some(RoundTimer::start(
            self.config.countdown,
            self.config.tick_interval,
        ));
    }

    fn cancel_timer(&mut self) {
        if let Some(mut timer) = self.timer.take() {
            timer.cancel();
        }
    }

    fn begin_quiz(&mut self) {
        for record in &mut self.state.records {
            record.revealed = false;
        }
        self.state.wrong_moves = 0;
        self.state.quiz_started_at_ms = Utc::now().timestamp_millis();
        self.pick_quiz_target();
    }

    /// Choose the next secret uniformly among still-hidden tiles.
    ///
    /// Callers check for remaining hidden tiles first; reaching this with all
    /// tiles revealed is a bug, not a runtime condition.
    fn pick_quiz_target(&mut self) {
        let hidden = self.state.hidden_positions();
        debug_assert!(!hidden.is_empty(), "quiz target requested with no hidden tiles");
        if hidden.is_empty() {
            return;
        }
        let target = hidden[self.rng.gen_range(0..hidden.len())];
        self.state.quiz_index = target as i32;
    }

    fn finish_quiz(&mut self) {
        let now_ms = Utc::now().timestamp_millis();
        self.state.elapsed_seconds = (now_ms - self.state.quiz_started_at_ms) / 1000;
        self.state.quiz_index = -1;
        self.state.quiz_started_at_ms = 0;
        self.state.results_shown = true;
    }
}
