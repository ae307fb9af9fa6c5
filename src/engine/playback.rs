// Built-in playback engine
// One thread per session: decode with Symphonia, render through cpal

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use tracing::{debug, error, warn};

use crate::config::PlayerConfig;
use crate::engine::decoder::AudioDecoder;
use crate::engine::output::AudioOutput;
use crate::engine::{EngineCommand, EngineEvent, EngineSession, EventTx, MediaEngine};
use crate::error::{PlayerError, Result};
use crate::source::Source;

/// How long the loop waits for commands while it has nothing to write.
const IDLE_POLL: Duration = Duration::from_millis(10);
/// How long the loop waits when the ring buffer is full.
const WRITE_BACKOFF: Duration = Duration::from_millis(5);
/// How long the loop sleeps between command checks while paused.
const PAUSE_POLL: Duration = Duration::from_millis(100);

/// The built-in media engine: Symphonia decode, cpal render.
///
/// Each session runs on its own thread. The cpal stream never leaves
/// that thread; the facade only holds a command handle.
pub struct SymphoniaEngine;

impl SymphoniaEngine {
    pub fn new() -> Self {
        SymphoniaEngine
    }
}

impl Default for SymphoniaEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl MediaEngine for SymphoniaEngine {
    fn open(
        &self,
        source: Source,
        events: EventTx,
        config: &PlayerConfig,
    ) -> Result<Box<dyn EngineSession>> {
        let (cmd_tx, cmd_rx) = unbounded();
        let shared_position = Arc::new(AtomicU64::new(0));

        let position = Arc::clone(&shared_position);
        let config = config.clone();
        thread::Builder::new()
            .name("tonearm-playback".to_string())
            .spawn(move || run_session(source, events, cmd_rx, position, config))
            .map_err(|e| PlayerError::Engine(format!("failed to spawn playback thread: {}", e)))?;

        Ok(Box::new(SessionHandle {
            commands: cmd_tx,
            shared_position,
        }))
    }
}

/// Command handle for one running playback thread.
struct SessionHandle {
    commands: Sender<EngineCommand>,
    shared_position: Arc<AtomicU64>,
}

impl EngineSession for SessionHandle {
    fn pause(&mut self) {
        let _ = self.commands.send(EngineCommand::Pause);
    }

    fn resume(&mut self) {
        let _ = self.commands.send(EngineCommand::Resume);
    }

    fn seek(&mut self, position: Duration, token: u64) {
        let _ = self.commands.send(EngineCommand::Seek { position, token });
    }

    fn set_volume(&mut self, volume: f32) {
        let _ = self.commands.send(EngineCommand::SetVolume(volume));
    }

    fn position(&self) -> Duration {
        Duration::from_millis(self.shared_position.load(Ordering::Relaxed))
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        let _ = self.commands.send(EngineCommand::Stop);
    }
}

/// Playback thread entry point. Emits the session's event sequence and
/// never panics back into the facade.
fn run_session(
    source: Source,
    events: EventTx,
    commands: Receiver<EngineCommand>,
    shared_position: Arc<AtomicU64>,
    config: PlayerConfig,
) {
    events.send(EngineEvent::WillPlay);

    let opened = match source.open(&config) {
        Ok(opened) => opened,
        Err(e) => {
            error!("failed to open {}: {}", source, e);
            events.send(EngineEvent::Finished { result: Err(e) });
            return;
        }
    };
    let seekable = opened.seekable;

    let decoder = match AudioDecoder::open(opened) {
        Ok(decoder) => decoder,
        Err(e) => {
            error!("failed to probe {}: {}", source, e);
            events.send(EngineEvent::Finished { result: Err(e) });
            return;
        }
    };

    let output = match AudioOutput::open(
        decoder.sample_rate(),
        decoder.channels() as u16,
        config.ring_buffer_ms,
    ) {
        Ok(output) => output,
        Err(e) => {
            error!("failed to open audio output: {}", e);
            events.send(EngineEvent::Finished { result: Err(e) });
            return;
        }
    };
    output.set_volume(config.volume);

    let duration = decoder.duration();
    events.send(EngineEvent::ReadyToPlay { duration });
    debug!("playback ready: {} (duration {:?})", source, duration);

    let channels = decoder.channels().max(1);
    let sample_rate = u64::from(decoder.sample_rate().max(1));
    let mut session = PlaybackLoop {
        decoder,
        output,
        events,
        shared_position,
        seekable,
        duration,
        channels,
        sample_rate,
        frames: 0,
        paused: false,
        eof: false,
        pending: Vec::new(),
        last_progress_ms: 0,
        interval_ms: config.progress_interval_ms.max(1),
    };
    session.run(&commands);
}

enum Flow {
    Continue,
    Exit,
}

struct PlaybackLoop {
    decoder: AudioDecoder,
    output: AudioOutput,
    events: EventTx,
    shared_position: Arc<AtomicU64>,
    seekable: bool,
    duration: Option<Duration>,
    channels: usize,
    sample_rate: u64,
    /// Frames handed to the output so far, relative to the last seek
    frames: u64,
    paused: bool,
    eof: bool,
    /// Decoded samples not yet accepted by the ring buffer
    pending: Vec<f32>,
    last_progress_ms: u64,
    interval_ms: u64,
}

impl PlaybackLoop {
    fn run(&mut self, commands: &Receiver<EngineCommand>) {
        loop {
            while let Ok(cmd) = commands.try_recv() {
                if let Flow::Exit = self.handle(cmd) {
                    return;
                }
            }

            if self.paused {
                if let Flow::Exit = self.wait_for_command(commands, PAUSE_POLL) {
                    return;
                }
                continue;
            }

            if self.eof {
                // Let the device drain what is already queued
                if self.output.buffered() == 0 {
                    self.events.send(EngineEvent::Finished { result: Ok(()) });
                    return;
                }
                if let Flow::Exit = self.wait_for_command(commands, IDLE_POLL) {
                    return;
                }
                continue;
            }

            if self.pending.is_empty() {
                match self.decoder.next_chunk() {
                    Ok(Some(samples)) => self.pending = samples,
                    Ok(None) => {
                        self.eof = true;
                        continue;
                    }
                    Err(e) => {
                        error!("playback failed: {}", e);
                        self.events.send(EngineEvent::Finished { result: Err(e) });
                        return;
                    }
                }
            }

            let written = self.output.write(&self.pending);
            if written == 0 {
                // Ring buffer full, stay responsive to commands
                if let Flow::Exit = self.wait_for_command(commands, WRITE_BACKOFF) {
                    return;
                }
                continue;
            }

            self.pending.drain(..written);
            self.frames += (written / self.channels) as u64;
            self.store_position();

            let position_ms = self.position_ms();
            if position_ms.saturating_sub(self.last_progress_ms) >= self.interval_ms {
                self.last_progress_ms = position_ms;
                self.events.send(EngineEvent::Progress {
                    position: Duration::from_millis(position_ms),
                    duration: self.duration,
                });
            }
        }
    }

    fn handle(&mut self, cmd: EngineCommand) -> Flow {
        match cmd {
            EngineCommand::Pause => {
                if !self.paused {
                    self.paused = true;
                    self.output.pause();
                    self.events.send(EngineEvent::Paused);
                }
                Flow::Continue
            }
            EngineCommand::Resume => {
                if self.paused {
                    self.paused = false;
                    self.output.resume();
                }
                Flow::Continue
            }
            EngineCommand::SetVolume(volume) => {
                self.output.set_volume(volume);
                Flow::Continue
            }
            EngineCommand::Seek { position, token } => {
                self.seek(position, token);
                Flow::Continue
            }
            EngineCommand::Stop => Flow::Exit,
        }
    }

    fn seek(&mut self, position: Duration, token: u64) {
        if !self.seekable {
            self.events.send(EngineEvent::SeekComplete {
                token,
                finished: false,
            });
            return;
        }

        let target = match self.duration {
            Some(d) if position > d => d,
            _ => position,
        };

        match self.decoder.seek(target) {
            Ok(actual) => {
                self.output.clear();
                self.pending.clear();
                self.eof = false;
                self.frames = actual.as_millis() as u64 * self.sample_rate / 1000;
                self.store_position();
                self.last_progress_ms = self.position_ms();
                self.events.send(EngineEvent::SeekComplete {
                    token,
                    finished: true,
                });
            }
            Err(e) => {
                warn!("seek failed: {}", e);
                self.events.send(EngineEvent::SeekComplete {
                    token,
                    finished: false,
                });
            }
        }
    }

    fn wait_for_command(&mut self, commands: &Receiver<EngineCommand>, timeout: Duration) -> Flow {
        match commands.recv_timeout(timeout) {
            Ok(cmd) => self.handle(cmd),
            Err(RecvTimeoutError::Timeout) => Flow::Continue,
            Err(RecvTimeoutError::Disconnected) => Flow::Exit,
        }
    }

    fn position_ms(&self) -> u64 {
        self.frames * 1000 / self.sample_rate
    }

    fn store_position(&self) {
        self.shared_position
            .store(self.position_ms(), Ordering::Relaxed);
    }
}
