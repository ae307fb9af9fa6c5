// Audio output using cpal
// Decoded samples cross to the device callback through a ring buffer

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BufferSize, SampleFormat, SampleRate, Stream, StreamConfig};
use parking_lot::Mutex;
use ringbuf::{
    traits::{Consumer, Observer, Producer, Split},
    HeapRb,
};
use tracing::{error, warn};

use crate::error::{PlayerError, Result};

type RingProducer = ringbuf::HeapProd<f32>;
type RingConsumer = ringbuf::HeapCons<f32>;

pub(crate) struct AudioOutput {
    stream: Stream,
    producer: Arc<Mutex<RingProducer>>,
    volume: Arc<Mutex<f32>>,
    clear_flag: Arc<AtomicBool>,
}

impl AudioOutput {
    /// Open the default output device at the decoded stream's rate and
    /// channel count, falling back to the device default when the device
    /// refuses that shape.
    pub fn open(sample_rate: u32, channels: u16, ring_buffer_ms: u32) -> Result<Self> {
        let host = cpal::default_host();

        let device = host
            .default_output_device()
            .ok_or_else(|| PlayerError::Output("no output device available".to_string()))?;

        let default_config = device
            .default_output_config()
            .map_err(|e| PlayerError::Output(format!("no default output config: {}", e)))?;
        let sample_format = default_config.sample_format();

        // Ring buffer sized for the requested depth of audio
        let capacity =
            (sample_rate as usize * channels as usize * ring_buffer_ms as usize / 1000).max(1024);
        let rb = HeapRb::<f32>::new(capacity);
        let (producer, consumer) = rb.split();
        let producer = Arc::new(Mutex::new(producer));
        let consumer = Arc::new(Mutex::new(consumer));

        let volume = Arc::new(Mutex::new(1.0f32));
        let clear_flag = Arc::new(AtomicBool::new(false));

        let preferred = StreamConfig {
            channels,
            sample_rate: SampleRate(sample_rate),
            buffer_size: BufferSize::Default,
        };

        let stream = match Self::build_stream(
            sample_format,
            &device,
            &preferred,
            Arc::clone(&consumer),
            Arc::clone(&volume),
            Arc::clone(&clear_flag),
        ) {
            Ok(stream) => stream,
            Err(e) => {
                warn!(
                    "output device rejected {} Hz x{} ({}); using device default",
                    sample_rate, channels, e
                );
                Self::build_stream(
                    sample_format,
                    &device,
                    &default_config.config(),
                    consumer,
                    Arc::clone(&volume),
                    Arc::clone(&clear_flag),
                )?
            }
        };

        stream
            .play()
            .map_err(|e| PlayerError::Output(format!("failed to start stream: {}", e)))?;

        Ok(Self {
            stream,
            producer,
            volume,
            clear_flag,
        })
    }

    fn build_stream(
        sample_format: SampleFormat,
        device: &cpal::Device,
        config: &StreamConfig,
        consumer: Arc<Mutex<RingConsumer>>,
        volume: Arc<Mutex<f32>>,
        clear_flag: Arc<AtomicBool>,
    ) -> Result<Stream> {
        match sample_format {
            SampleFormat::F32 => Self::build_typed::<f32>(device, config, consumer, volume, clear_flag),
            SampleFormat::I16 => Self::build_typed::<i16>(device, config, consumer, volume, clear_flag),
            SampleFormat::U16 => Self::build_typed::<u16>(device, config, consumer, volume, clear_flag),
            other => Err(PlayerError::Output(format!(
                "unsupported sample format: {:?}",
                other
            ))),
        }
    }

    fn build_typed<T: cpal::SizedSample + cpal::FromSample<f32>>(
        device: &cpal::Device,
        config: &StreamConfig,
        consumer: Arc<Mutex<RingConsumer>>,
        volume: Arc<Mutex<f32>>,
        clear_flag: Arc<AtomicBool>,
    ) -> Result<Stream> {
        let stream = device
            .build_output_stream(
                config,
                move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                    let mut consumer = consumer.lock();
                    let vol = *volume.lock();

                    // A pending clear drains everything before output resumes
                    if clear_flag.swap(false, Ordering::SeqCst) {
                        while consumer.try_pop().is_some() {}
                    }

                    for sample in data.iter_mut() {
                        let value = consumer.try_pop().unwrap_or(0.0) * vol;
                        *sample = T::from_sample(value);
                    }
                },
                move |err| {
                    error!("audio output error: {}", err);
                },
                None,
            )
            .map_err(|e| PlayerError::Output(format!("failed to build output stream: {}", e)))?;

        Ok(stream)
    }

    /// Write samples to the output buffer.
    /// Returns the number of samples actually written.
    pub fn write(&self, samples: &[f32]) -> usize {
        let mut producer = self.producer.lock();
        let mut written = 0;

        for &sample in samples {
            if producer.try_push(sample).is_ok() {
                written += 1;
            } else {
                break;
            }
        }

        written
    }

    /// Samples queued but not yet consumed by the device callback.
    pub fn buffered(&self) -> usize {
        self.producer.lock().occupied_len()
    }

    /// Drop everything queued, used when seeking.
    pub fn clear(&self) {
        self.clear_flag.store(true, Ordering::SeqCst);
    }

    pub fn pause(&self) {
        if let Err(e) = self.stream.pause() {
            warn!("failed to pause output stream: {}", e);
        }
    }

    pub fn resume(&self) {
        if let Err(e) = self.stream.play() {
            warn!("failed to resume output stream: {}", e);
        }
    }

    /// Set the output volume (0.0 to 1.0)
    pub fn set_volume(&self, vol: f32) {
        *self.volume.lock() = vol.clamp(0.0, 1.0);
    }
}
