// Callback registration slots
//
// One slot per notification category. Registering replaces the previous
// callback of that category (last one wins), and every slot is cleared
// when a playback cycle ends, so callers re-register for each cycle.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::error::PlayerError;

/// A unit of callback work handed to the dispatch context.
pub type DispatchTask = Box<dyn FnOnce() + Send + 'static>;

// Repeating callbacks are shared with the dispatch context, so they live
// behind their own lock. The slots lock is never held while one runs.
pub(crate) type WillPlayFn = Arc<Mutex<Box<dyn FnMut() + Send>>>;
pub(crate) type ReadyToPlayFn = Arc<Mutex<Box<dyn FnMut(Option<Duration>) + Send>>>;
pub(crate) type PausedFn = Arc<Mutex<Box<dyn FnMut() + Send>>>;
pub(crate) type PeriodicTimeFn = Arc<Mutex<Box<dyn FnMut(Duration, Option<Duration>) + Send>>>;

// One-shot callbacks fire at most once per cycle and are consumed.
pub(crate) type FinishFn = Box<dyn FnOnce(bool, Option<PlayerError>) + Send>;
pub(crate) type SeekDoneFn = Box<dyn FnOnce(bool) + Send>;

#[derive(Default)]
pub(crate) struct CallbackSlots {
    pub will_play: Option<WillPlayFn>,
    pub ready_to_play: Option<ReadyToPlayFn>,
    pub paused: Option<PausedFn>,
    pub periodic_time: Option<PeriodicTimeFn>,
    pub finish: Option<FinishFn>,
    /// The latest seek completion still waiting for the engine, keyed by
    /// its request token. A newer seek supersedes it.
    pub pending_seek: Option<(u64, SeekDoneFn)>,
}

impl CallbackSlots {
    /// Empty every slot, returning the old contents so one-shots can
    /// still be failed over to the caller.
    pub fn take_all(&mut self) -> CallbackSlots {
        std::mem::take(self)
    }
}
