//! Audio playback facade.
//!
//! One [`Player`] plays a local file or an HTTP(S) stream through a
//! media engine and reports lifecycle callbacks (will-play,
//! ready-to-play, paused, periodic time, finish) on a single dispatch
//! context. Decoding and rendering are the engine's problem; the
//! built-in [`engine::SymphoniaEngine`] decodes with Symphonia and
//! renders through cpal.
//!
//! ```no_run
//! use tonearm::Player;
//!
//! Player::shared()
//!     .play("https://example.com/track.flac", |success, error| {
//!         if !success {
//!             eprintln!("playback ended early: {:?}", error);
//!         }
//!     })
//!     .on_ready_to_play(|duration| println!("ready, duration {:?}", duration))
//!     .on_periodic_time(|position, _| println!("at {:?}", position));
//! ```
//!
//! Callback registrations live for one playback cycle: the facade
//! clears every slot when a cycle ends, so register again around each
//! `play`.

mod callback;
mod config;
pub mod engine;
mod error;
mod player;
mod source;

pub use callback::DispatchTask;
pub use config::PlayerConfig;
pub use error::{PlayerError, Result};
pub use player::{PlaybackStatus, Player, PlayerBuilder};
pub use source::Source;
