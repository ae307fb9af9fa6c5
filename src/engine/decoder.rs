// Symphonia-based decoding
// Turns a probed media stream into interleaved f32 samples

use std::time::Duration;

use symphonia::core::audio::{AudioBufferRef, AudioPlanes, Signal};
use symphonia::core::codecs::{Decoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader, SeekMode, SeekTo};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::sample::Sample;
use symphonia::core::units::Time;
use tracing::warn;

use crate::error::{PlayerError, Result};
use crate::source::OpenedSource;

pub(crate) struct AudioDecoder {
    format: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    sample_rate: u32,
    channels: usize,
    duration: Option<Duration>,
}

impl AudioDecoder {
    /// Probe an opened source and prepare the first audio track for
    /// decoding.
    pub fn open(opened: OpenedSource) -> Result<Self> {
        let OpenedSource { stream, hint, .. } = opened;

        let probed = symphonia::default::get_probe()
            .format(
                &hint,
                stream,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(|e| PlayerError::Decode(format!("unrecognized media format: {}", e)))?;

        let format = probed.format;

        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| PlayerError::Decode("no audio track found".to_string()))?;

        let track_id = track.id;
        let sample_rate = track.codec_params.sample_rate.unwrap_or(44100);
        let channels = track.codec_params.channels.map(|c| c.count()).unwrap_or(2);

        // Total length is unknowable for endless streams
        let duration = track
            .codec_params
            .n_frames
            .map(|frames| Duration::from_secs_f64(frames as f64 / sample_rate as f64));

        let decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())
            .map_err(|e| PlayerError::Decode(format!("unsupported codec: {}", e)))?;

        Ok(Self {
            format,
            decoder,
            track_id,
            sample_rate,
            channels,
            duration,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn duration(&self) -> Option<Duration> {
        self.duration
    }

    /// Decode the next packet into interleaved f32 samples.
    /// Returns None at end of stream.
    pub fn next_chunk(&mut self) -> Result<Option<Vec<f32>>> {
        loop {
            let packet = match self.format.next_packet() {
                Ok(p) => p,
                Err(SymphoniaError::IoError(ref e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    return Ok(None);
                }
                Err(SymphoniaError::ResetRequired) => {
                    self.decoder.reset();
                    continue;
                }
                Err(e) => {
                    return Err(PlayerError::Decode(format!("failed to read packet: {}", e)))
                }
            };

            // Skip packets from other tracks
            if packet.track_id() != self.track_id {
                continue;
            }

            match self.decoder.decode(&packet) {
                Ok(decoded) => return Ok(Some(Self::audio_buf_to_f32(&decoded))),
                Err(SymphoniaError::DecodeError(e)) => {
                    // A corrupt packet is not fatal, keep going
                    warn!("decode error (skipping packet): {}", e);
                    continue;
                }
                Err(e) => return Err(PlayerError::Decode(format!("decode failed: {}", e))),
            }
        }
    }

    /// Seek to a position. Returns the position actually reached, which
    /// for coarse seeks may land slightly before the request.
    pub fn seek(&mut self, position: Duration) -> Result<Duration> {
        let seconds = position.as_secs_f64();
        let time = Time::new(seconds as u64, seconds.fract());

        let seeked_to = self
            .format
            .seek(
                SeekMode::Coarse,
                SeekTo::Time {
                    time,
                    track_id: Some(self.track_id),
                },
            )
            .map_err(|e| PlayerError::Decode(format!("seek failed: {}", e)))?;

        // Decoder state is stale after a format-level seek
        self.decoder.reset();

        Ok(Duration::from_secs_f64(
            seeked_to.actual_ts as f64 / self.sample_rate as f64,
        ))
    }

    /// Convert any AudioBufferRef to interleaved f32 samples
    fn audio_buf_to_f32(buf: &AudioBufferRef) -> Vec<f32> {
        match buf {
            AudioBufferRef::F32(b) => Self::interleave_f32(b.planes(), b.frames()),
            AudioBufferRef::F64(b) => {
                Self::interleave_convert(b.planes(), b.frames(), |s: f64| s as f32)
            }
            AudioBufferRef::S8(b) => {
                let scale = 1.0 / 128.0;
                Self::interleave_convert(b.planes(), b.frames(), |s: i8| s as f32 * scale)
            }
            AudioBufferRef::S16(b) => {
                let scale = 1.0 / 32768.0;
                Self::interleave_convert(b.planes(), b.frames(), |s: i16| s as f32 * scale)
            }
            AudioBufferRef::S24(b) => {
                let scale = 1.0 / 8388608.0;
                Self::interleave_convert(b.planes(), b.frames(), |s| s.inner() as f32 * scale)
            }
            AudioBufferRef::S32(b) => {
                let scale = 1.0 / 2147483648.0;
                Self::interleave_convert(b.planes(), b.frames(), |s: i32| s as f32 * scale)
            }
            AudioBufferRef::U8(b) => {
                Self::interleave_convert(b.planes(), b.frames(), |s: u8| (s as f32 - 128.0) / 128.0)
            }
            AudioBufferRef::U16(b) => Self::interleave_convert(b.planes(), b.frames(), |s: u16| {
                (s as f32 - 32768.0) / 32768.0
            }),
            AudioBufferRef::U24(b) => Self::interleave_convert(b.planes(), b.frames(), |s| {
                (s.inner() as f32 - 8388608.0) / 8388608.0
            }),
            AudioBufferRef::U32(b) => Self::interleave_convert(b.planes(), b.frames(), |s: u32| {
                (s as f64 - 2147483648.0) as f32 / 2147483648.0
            }),
        }
    }

    fn interleave_f32(planes: AudioPlanes<f32>, frames: usize) -> Vec<f32> {
        let num_channels = planes.planes().len();
        if num_channels == 0 || frames == 0 {
            return vec![];
        }

        let mut interleaved = Vec::with_capacity(frames * num_channels);
        for frame in 0..frames {
            for ch in 0..num_channels {
                interleaved.push(planes.planes()[ch][frame]);
            }
        }
        interleaved
    }

    fn interleave_convert<T: Sample + Copy, F: Fn(T) -> f32>(
        planes: AudioPlanes<T>,
        frames: usize,
        convert: F,
    ) -> Vec<f32> {
        let num_channels = planes.planes().len();
        if num_channels == 0 || frames == 0 {
            return vec![];
        }

        let mut interleaved = Vec::with_capacity(frames * num_channels);
        for frame in 0..frames {
            for ch in 0..num_channels {
                interleaved.push(convert(planes.planes()[ch][frame]));
            }
        }
        interleaved
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PlayerConfig;
    use crate::source::Source;
    use std::path::Path;

    const RATE: u32 = 44100;

    /// One second of a 440 Hz sine, mono 16-bit PCM.
    fn write_test_wav(path: &Path) {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: RATE,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for i in 0..RATE {
            let t = i as f32 / RATE as f32;
            let sample = (t * 440.0 * std::f32::consts::TAU).sin();
            writer
                .write_sample((sample * i16::MAX as f32 * 0.5) as i16)
                .unwrap();
        }
        writer.finalize().unwrap();
    }

    fn open_fixture(path: &Path) -> AudioDecoder {
        let opened = Source::from(path)
            .open(&PlayerConfig::default())
            .expect("fixture should open");
        AudioDecoder::open(opened).expect("fixture should probe")
    }

    #[test]
    fn test_open_reports_stream_parameters() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        write_test_wav(&path);

        let decoder = open_fixture(&path);
        assert_eq!(decoder.sample_rate(), RATE);
        assert_eq!(decoder.channels(), 1);

        let duration = decoder.duration().expect("wav length is known");
        assert!((duration.as_secs_f64() - 1.0).abs() < 0.01);
    }

    #[test]
    fn test_decodes_every_sample() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        write_test_wav(&path);

        let mut decoder = open_fixture(&path);
        let mut total = 0usize;
        while let Some(chunk) = decoder.next_chunk().unwrap() {
            assert!(chunk.iter().all(|s| s.abs() <= 1.0));
            total += chunk.len();
        }
        assert_eq!(total, RATE as usize);
    }

    #[test]
    fn test_seek_lands_at_or_before_target() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        write_test_wav(&path);

        let mut decoder = open_fixture(&path);
        let actual = decoder.seek(Duration::from_millis(500)).unwrap();
        assert!(actual <= Duration::from_millis(500));

        // Decoding resumes from the new position
        let remaining: usize = std::iter::from_fn(|| decoder.next_chunk().unwrap())
            .map(|chunk| chunk.len())
            .sum();
        let expected = RATE as usize - (actual.as_secs_f64() * RATE as f64) as usize;
        assert!((remaining as i64 - expected as i64).abs() < 64);
    }

    #[test]
    fn test_unrecognized_data_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("not_audio.wav");
        std::fs::write(&path, b"this is not a wav file at all").unwrap();

        let opened = Source::from(path.as_path())
            .open(&PlayerConfig::default())
            .unwrap();
        let err = AudioDecoder::open(opened).unwrap_err();
        assert!(matches!(err, PlayerError::Decode(_)));
    }
}
