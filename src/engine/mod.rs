// Engine seam
// The facade drives playback through these traits; the crate ships one
// engine built on Symphonia and cpal

mod decoder;
mod output;
mod playback;

pub use playback::SymphoniaEngine;

use std::time::Duration;

use crossbeam_channel::Sender;

use crate::callback::DispatchTask;
use crate::config::PlayerConfig;
use crate::error::Result;
use crate::source::Source;

/// Events a playback session reports back to the facade.
///
/// Per-session ordering contract: `WillPlay` first, `ReadyToPlay` before
/// any `Progress`, and `Finished` last, at most once.
#[derive(Debug)]
pub enum EngineEvent {
    /// The session is about to start preparing the source
    WillPlay,
    /// The source is probed and playback is starting; `duration` is
    /// `None` for endless or unknown-length streams
    ReadyToPlay { duration: Option<Duration> },
    /// The engine confirmed a pause request
    Paused,
    /// Periodic position report, only emitted while playing
    Progress {
        position: Duration,
        duration: Option<Duration>,
    },
    /// A seek request finished; `finished` is false when the source is
    /// unseekable or the seek could not be carried out
    SeekComplete { token: u64, finished: bool },
    /// Terminal event of the cycle
    Finished { result: Result<()> },
}

/// Commands accepted by the built-in engine's playback thread.
#[derive(Debug)]
pub(crate) enum EngineCommand {
    Pause,
    Resume,
    SetVolume(f32),
    Seek { position: Duration, token: u64 },
    Stop,
}

/// Messages flowing into the dispatch context.
pub(crate) enum DispatchMsg {
    /// Event from an engine session, tagged with the generation of the
    /// cycle it belongs to. Stale generations are dropped.
    Engine { generation: u64, event: EngineEvent },
    /// A facade-originated callback invocation (stop, supersession)
    Invoke(DispatchTask),
}

/// Generation-tagged handle a session uses to report events.
///
/// Events sent after the cycle has been superseded or stopped are
/// silently discarded by the facade.
#[derive(Clone)]
pub struct EventTx {
    generation: u64,
    tx: Sender<DispatchMsg>,
}

impl EventTx {
    pub(crate) fn new(generation: u64, tx: Sender<DispatchMsg>) -> Self {
        Self { generation, tx }
    }

    pub fn send(&self, event: EngineEvent) {
        let _ = self.tx.send(DispatchMsg::Engine {
            generation: self.generation,
            event,
        });
    }
}

/// A media playback backend.
///
/// `open` must not block on I/O or device setup; slow work belongs on the
/// session's own thread, with failures reported through a terminal
/// `Finished` event. Returning `Err` is reserved for immediate refusals
/// (the facade converts those into a failed cycle as well).
pub trait MediaEngine: Send + Sync {
    fn open(
        &self,
        source: Source,
        events: EventTx,
        config: &PlayerConfig,
    ) -> Result<Box<dyn EngineSession>>;
}

/// Control handle for one playback session.
///
/// Dropping the handle stops the session. Commands are fire-and-forget;
/// confirmations come back as [`EngineEvent`]s.
pub trait EngineSession: Send {
    fn pause(&mut self);
    fn resume(&mut self);
    fn seek(&mut self, position: Duration, token: u64);
    fn set_volume(&mut self, volume: f32);
    fn position(&self) -> Duration;
}
