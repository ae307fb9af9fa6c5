// The playback facade
//
// `Player` is the embedding application's entry point: it starts playback
// of a local or remote source, exposes transport controls, and delivers
// lifecycle callbacks through a single dispatch context.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock, Weak};
use std::thread;
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::callback::{CallbackSlots, DispatchTask, SeekDoneFn};
use crate::config::PlayerConfig;
use crate::engine::{
    DispatchMsg, EngineEvent, EngineSession, EventTx, MediaEngine, SymphoniaEngine,
};
use crate::error::PlayerError;
use crate::source::Source;

/// Where the facade is in its playback cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackStatus {
    Idle,
    Preparing,
    Playing,
    Paused,
}

impl std::fmt::Display for PlaybackStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlaybackStatus::Idle => write!(f, "idle"),
            PlaybackStatus::Preparing => write!(f, "preparing"),
            PlaybackStatus::Playing => write!(f, "playing"),
            PlaybackStatus::Paused => write!(f, "paused"),
        }
    }
}

type CallbackExecutor = Box<dyn Fn(DispatchTask) + Send + Sync>;

/// An audio player that delegates decoding and rendering to a
/// [`MediaEngine`] and fans lifecycle events out to registered callbacks.
///
/// `play` never blocks and never fails synchronously; a cycle's outcome
/// arrives at its finish callback. Every callback, of every category, is
/// invoked from one dispatch context (a dedicated thread by default, or
/// an executor supplied through [`PlayerBuilder::callback_executor`]),
/// so deliveries are serialized and ordered.
///
/// Callback registrations live for one playback cycle: when a cycle ends
/// (completion, failure, `stop`, or a superseding `play`) every slot is
/// cleared and callers register again.
///
/// The shared instance suits applications that want a process-wide
/// player; anything else can construct its own with [`Player::new`] or
/// [`Player::builder`] and hand clones around.
#[derive(Clone)]
pub struct Player {
    inner: Arc<Inner>,
}

impl Player {
    /// A player over the built-in engine with the given configuration.
    pub fn new(config: PlayerConfig) -> Player {
        Player::builder().config(config).build()
    }

    /// Process-wide shared player, created on first access.
    pub fn shared() -> &'static Player {
        static SHARED: OnceLock<Player> = OnceLock::new();
        SHARED.get_or_init(|| Player::new(PlayerConfig::default()))
    }

    pub fn builder() -> PlayerBuilder {
        PlayerBuilder::default()
    }

    /// Begin asynchronous playback of `source`, superseding any cycle
    /// already in flight (the superseded finish callback fires
    /// `(false, None)` first).
    ///
    /// `on_finish` fires exactly once, on the cycle's terminal state:
    /// `(true, None)` after natural completion, `(false, Some(_))` on
    /// failure, `(false, None)` after `stop` or supersession.
    pub fn play<S, F>(&self, source: S, on_finish: F) -> &Self
    where
        S: Into<Source>,
        F: FnOnce(bool, Option<PlayerError>) + Send + 'static,
    {
        let source = source.into();
        let inner = &self.inner;

        let generation = inner.end_cycle(false);
        debug!("play {}", source);

        inner.slots.lock().finish = Some(Box::new(on_finish));
        *inner.status.lock() = PlaybackStatus::Preparing;
        *inner.source.lock() = Some(source.clone());

        let events = EventTx::new(generation, inner.events_tx.clone());
        match inner.engine.open(source, events.clone(), &inner.config) {
            Ok(mut session) => {
                session.set_volume(*inner.volume.lock());
                *inner.session.lock() = Some(session);
            }
            Err(e) => {
                // Same path as an asynchronous engine failure
                events.send(EngineEvent::Finished { result: Err(e) });
            }
        }
        self
    }

    /// Pause playback. No-op unless currently playing.
    pub fn pause(&self) -> &Self {
        let mut status = self.inner.status.lock();
        if *status == PlaybackStatus::Playing {
            *status = PlaybackStatus::Paused;
            drop(status);
            if let Some(session) = self.inner.session.lock().as_mut() {
                session.pause();
            }
        }
        self
    }

    /// Resume playback. No-op unless currently paused.
    pub fn resume(&self) -> &Self {
        let mut status = self.inner.status.lock();
        if *status == PlaybackStatus::Paused {
            *status = PlaybackStatus::Playing;
            drop(status);
            if let Some(session) = self.inner.session.lock().as_mut() {
                session.resume();
            }
        }
        self
    }

    /// Stop playback and clear every registered callback.
    ///
    /// The finish callback fires `(false, None)` and a pending seek
    /// completion fires `false`; afterwards no previously registered
    /// callback of any category will be invoked again.
    pub fn stop(&self) -> &Self {
        debug!("stop");
        self.inner.end_cycle(true);
        self
    }

    /// Request a position change.
    pub fn seek(&self, position: Duration) -> &Self {
        self.seek_inner(position, None);
        self
    }

    /// Request a position change and get told when the engine is done.
    ///
    /// `on_done` fires once with `true` when the seek was carried out,
    /// or `false` when the source is unseekable, the request was
    /// superseded by a newer seek, the cycle ended first, or nothing was
    /// playing.
    pub fn seek_with<F>(&self, position: Duration, on_done: F) -> &Self
    where
        F: FnOnce(bool) + Send + 'static,
    {
        self.seek_inner(position, Some(Box::new(on_done)));
        self
    }

    fn seek_inner(&self, position: Duration, on_done: Option<SeekDoneFn>) {
        let inner = &self.inner;

        if *inner.status.lock() == PlaybackStatus::Idle {
            if let Some(cb) = on_done {
                inner.enqueue(Box::new(move || cb(false)));
            }
            return;
        }

        let token = inner.seek_token.fetch_add(1, Ordering::SeqCst) + 1;
        {
            let mut slots = inner.slots.lock();
            if let Some((_, superseded)) = slots.pending_seek.take() {
                inner.enqueue(Box::new(move || superseded(false)));
            }
            if let Some(cb) = on_done {
                slots.pending_seek = Some((token, cb));
            }
        }
        if let Some(session) = inner.session.lock().as_mut() {
            session.seek(position, token);
        }
    }

    /// Called right before the engine starts preparing the source.
    pub fn on_will_play<F>(&self, callback: F) -> &Self
    where
        F: FnMut() + Send + 'static,
    {
        self.inner.slots.lock().will_play = Some(Arc::new(Mutex::new(Box::new(callback))));
        self
    }

    /// Called when the source is probed and playback begins. Receives
    /// the total duration, or `None` for endless streams.
    pub fn on_ready_to_play<F>(&self, callback: F) -> &Self
    where
        F: FnMut(Option<Duration>) + Send + 'static,
    {
        self.inner.slots.lock().ready_to_play = Some(Arc::new(Mutex::new(Box::new(callback))));
        self
    }

    /// Called when the engine confirms a pause.
    pub fn on_paused<F>(&self, callback: F) -> &Self
    where
        F: FnMut() + Send + 'static,
    {
        self.inner.slots.lock().paused = Some(Arc::new(Mutex::new(Box::new(callback))));
        self
    }

    /// Called roughly once per second while playing, with the current
    /// position and the duration when known. Useful for driving a
    /// progress display.
    pub fn on_periodic_time<F>(&self, callback: F) -> &Self
    where
        F: FnMut(Duration, Option<Duration>) + Send + 'static,
    {
        self.inner.slots.lock().periodic_time = Some(Arc::new(Mutex::new(Box::new(callback))));
        self
    }

    pub fn status(&self) -> PlaybackStatus {
        *self.inner.status.lock()
    }

    pub fn is_playing(&self) -> bool {
        self.status() == PlaybackStatus::Playing
    }

    pub fn is_paused(&self) -> bool {
        self.status() == PlaybackStatus::Paused
    }

    /// Current playback position, zero when idle.
    pub fn position(&self) -> Duration {
        self.inner
            .session
            .lock()
            .as_ref()
            .map(|s| s.position())
            .unwrap_or(Duration::ZERO)
    }

    /// Total duration of the current source, once known.
    pub fn duration(&self) -> Option<Duration> {
        *self.inner.duration.lock()
    }

    pub fn current_source(&self) -> Option<Source> {
        self.inner.source.lock().clone()
    }

    pub fn volume(&self) -> f32 {
        *self.inner.volume.lock()
    }

    /// Set the output volume (0.0 to 1.0). Persists across cycles.
    pub fn set_volume(&self, volume: f32) -> &Self {
        let volume = volume.clamp(0.0, 1.0);
        *self.inner.volume.lock() = volume;
        if let Some(session) = self.inner.session.lock().as_mut() {
            session.set_volume(volume);
        }
        self
    }
}

/// Builder for players that need a custom engine, configuration, or
/// callback execution context.
pub struct PlayerBuilder {
    config: PlayerConfig,
    engine: Option<Box<dyn MediaEngine>>,
    executor: Option<CallbackExecutor>,
}

impl Default for PlayerBuilder {
    fn default() -> Self {
        Self {
            config: PlayerConfig::default(),
            engine: None,
            executor: None,
        }
    }
}

impl PlayerBuilder {
    pub fn config(mut self, config: PlayerConfig) -> Self {
        self.config = config;
        self
    }

    /// Use a custom media engine instead of the built-in one.
    pub fn engine<E: MediaEngine + 'static>(mut self, engine: E) -> Self {
        self.engine = Some(Box::new(engine));
        self
    }

    /// Route callback invocations through a caller-supplied executor
    /// instead of the built-in dispatch thread. The executor decides
    /// where (and in what order) callbacks actually run.
    pub fn callback_executor<F>(mut self, executor: F) -> Self
    where
        F: Fn(DispatchTask) + Send + Sync + 'static,
    {
        self.executor = Some(Box::new(executor));
        self
    }

    pub fn build(self) -> Player {
        let (events_tx, events_rx) = unbounded();
        let volume = self.config.volume.clamp(0.0, 1.0);
        let inner = Arc::new(Inner {
            engine: self
                .engine
                .unwrap_or_else(|| Box::new(SymphoniaEngine::new())),
            config: self.config,
            executor: self.executor,
            events_tx,
            generation: AtomicU64::new(0),
            seek_token: AtomicU64::new(0),
            status: Mutex::new(PlaybackStatus::Idle),
            source: Mutex::new(None),
            duration: Mutex::new(None),
            volume: Mutex::new(volume),
            session: Mutex::new(None),
            slots: Mutex::new(CallbackSlots::default()),
        });
        spawn_dispatcher(Arc::downgrade(&inner), events_rx);
        Player { inner }
    }
}

struct Inner {
    engine: Box<dyn MediaEngine>,
    config: PlayerConfig,
    executor: Option<CallbackExecutor>,
    events_tx: Sender<DispatchMsg>,
    /// Current playback cycle; events from older cycles are stale
    generation: AtomicU64,
    seek_token: AtomicU64,
    status: Mutex<PlaybackStatus>,
    source: Mutex<Option<Source>>,
    duration: Mutex<Option<Duration>>,
    volume: Mutex<f32>,
    session: Mutex<Option<Box<dyn EngineSession>>>,
    slots: Mutex<CallbackSlots>,
}

impl Inner {
    /// End any live cycle and move to a fresh generation.
    ///
    /// A live cycle's finish callback fires `(false, None)` and its
    /// pending seek completion fires `false`. With `clear_when_idle`,
    /// registrations are dropped even without a live cycle (`stop`
    /// semantics); otherwise pre-registrations survive for the cycle
    /// about to start.
    fn end_cycle(&self, clear_when_idle: bool) -> u64 {
        let was_active = {
            let mut status = self.status.lock();
            let active = *status != PlaybackStatus::Idle;
            *status = PlaybackStatus::Idle;
            active
        };

        // Dropping the handle stops the engine session
        *self.session.lock() = None;
        *self.source.lock() = None;
        *self.duration.lock() = None;

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        if was_active || clear_when_idle {
            let slots = self.slots.lock().take_all();
            if let Some((_, cb)) = slots.pending_seek {
                self.enqueue(Box::new(move || cb(false)));
            }
            if was_active {
                if let Some(cb) = slots.finish {
                    self.enqueue(Box::new(move || cb(false, None)));
                }
            }
        }

        generation
    }

    fn enqueue(&self, task: DispatchTask) {
        let _ = self.events_tx.send(DispatchMsg::Invoke(task));
    }

    fn execute(&self, task: DispatchTask) {
        match &self.executor {
            Some(executor) => executor(task),
            None => task(),
        }
    }

    fn dispatch(&self, msg: DispatchMsg) {
        match msg {
            DispatchMsg::Invoke(task) => self.execute(task),
            DispatchMsg::Engine { generation, event } => {
                if generation != self.generation.load(Ordering::SeqCst) {
                    return;
                }
                self.handle_event(event);
            }
        }
    }

    fn handle_event(&self, event: EngineEvent) {
        match event {
            EngineEvent::WillPlay => {
                if let Some(cb) = self.slots.lock().will_play.clone() {
                    self.execute(Box::new(move || {
                        let mut callback = cb.lock();
                        (*callback)();
                    }));
                }
            }
            EngineEvent::ReadyToPlay { duration } => {
                *self.duration.lock() = duration;
                {
                    let mut status = self.status.lock();
                    if *status == PlaybackStatus::Preparing {
                        *status = PlaybackStatus::Playing;
                    }
                }
                if let Some(cb) = self.slots.lock().ready_to_play.clone() {
                    self.execute(Box::new(move || {
                        let mut callback = cb.lock();
                        (*callback)(duration);
                    }));
                }
            }
            EngineEvent::Paused => {
                // Status already moved in pause(); this is the engine's
                // confirmation, which is what the callback reports
                if let Some(cb) = self.slots.lock().paused.clone() {
                    self.execute(Box::new(move || {
                        let mut callback = cb.lock();
                        (*callback)();
                    }));
                }
            }
            EngineEvent::Progress { position, duration } => {
                if *self.status.lock() != PlaybackStatus::Playing {
                    return;
                }
                if duration.is_some() {
                    *self.duration.lock() = duration;
                }
                if let Some(cb) = self.slots.lock().periodic_time.clone() {
                    self.execute(Box::new(move || {
                        let mut callback = cb.lock();
                        (*callback)(position, duration);
                    }));
                }
            }
            EngineEvent::SeekComplete { token, finished } => {
                let pending = {
                    let mut slots = self.slots.lock();
                    match slots.pending_seek.take() {
                        Some((t, cb)) if t == token => Some(cb),
                        other => {
                            // A different request is still pending
                            slots.pending_seek = other;
                            None
                        }
                    }
                };
                if let Some(cb) = pending {
                    self.execute(Box::new(move || cb(finished)));
                }
            }
            EngineEvent::Finished { result } => {
                self.generation.fetch_add(1, Ordering::SeqCst);
                *self.session.lock() = None;
                *self.status.lock() = PlaybackStatus::Idle;
                *self.source.lock() = None;
                *self.duration.lock() = None;

                let slots = self.slots.lock().take_all();
                let (success, error) = match result {
                    Ok(()) => (true, None),
                    Err(e) => (false, Some(e)),
                };
                if let Some((_, cb)) = slots.pending_seek {
                    self.execute(Box::new(move || cb(false)));
                }
                if let Some(cb) = slots.finish {
                    self.execute(Box::new(move || cb(success, error)));
                }
            }
        }
    }
}

/// The default dispatch context: one thread draining the event channel.
/// It holds only a weak handle, so dropping the last `Player` clone
/// shuts it down.
fn spawn_dispatcher(inner: Weak<Inner>, events: Receiver<DispatchMsg>) {
    let result = thread::Builder::new()
        .name("tonearm-dispatch".to_string())
        .spawn(move || {
            while let Ok(msg) = events.recv() {
                let Some(inner) = inner.upgrade() else { break };
                inner.dispatch(msg);
            }
        });
    if let Err(e) = result {
        error!("failed to spawn dispatch thread: {}", e);
    }
}
