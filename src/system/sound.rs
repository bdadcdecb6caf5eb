use std::io::{Cursor, Read};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rodio::{Decoder, Source};
use tracing::debug;

use crate::error::ClipError;

/// Fully decoded clip kept in memory.
pub(crate) struct Sound {
    samples: Arc<[i16]>,
    channels: u16,
    sample_rate: u32,
}

impl Sound {
    /// Reads the whole stream and decodes it. Nothing touches the output device here.
    pub fn decode<R: Read>(mut reader: R) -> Result<Self, ClipError> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        check_wav_body(&bytes)?;
        let decoder = Decoder::new(Cursor::new(bytes))?;
        let channels = decoder.channels();
        let sample_rate = decoder.sample_rate();
        let samples: Vec<i16> = decoder.collect();
        if samples.len() > u32::MAX as usize {
            return Err(ClipError::TooLong(samples.len()));
        }
        debug!(
            channels,
            sample_rate,
            samples = samples.len(),
            "decoded audio clip"
        );
        Ok(Self::from_samples(samples, channels, sample_rate))
    }

    pub fn from_samples(mut samples: Vec<i16>, channels: u16, sample_rate: u32) -> Self {
        // decoders never report zero channels, but frame math divides by it
        let channels = channels.max(1);
        samples.truncate(samples.len() - samples.len() % channels as usize);
        Self {
            samples: samples.into(),
            channels,
            sample_rate: sample_rate.max(1),
        }
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn frame_count(&self) -> usize {
        self.samples.len() / self.channels as usize
    }

    pub fn frames_to_duration(&self, frames: usize) -> Duration {
        Duration::from_secs_f64(frames as f64 / self.sample_rate as f64)
    }

    pub fn duration_to_frames(&self, duration: Duration) -> usize {
        (duration.as_secs_f64() * self.sample_rate as f64) as usize
    }

    /// Creates a source for `generation`, as returned by [`PlaybackState::attach`].
    pub fn source(&self, state: Arc<PlaybackState>, generation: u64) -> SoundSource {
        SoundSource {
            samples: self.samples.clone(),
            channels: self.channels,
            sample_rate: self.sample_rate,
            state,
            generation,
            epoch: None,
            position: 0,
            frame_offset: 0,
        }
    }
}

/// rodio's wav decoder replaces unreadable samples with silence, so a body cut short would
/// still decode. Reads every sample once to catch that. Input that is not a WAV container is
/// left to the decoder probe.
fn check_wav_body(bytes: &[u8]) -> Result<(), ClipError> {
    let reader = match hound::WavReader::new(Cursor::new(bytes)) {
        Ok(reader) => reader,
        Err(_) => return Ok(()),
    };
    match reader.spec().sample_format {
        hound::SampleFormat::Int => reader
            .into_samples::<i32>()
            .try_for_each(|sample| sample.map(|_| ()))?,
        hound::SampleFormat::Float => reader
            .into_samples::<f32>()
            .try_for_each(|sample| sample.map(|_| ()))?,
    }
    Ok(())
}

const LIVE: u64 = 1;
const LOOPING: u64 = 1 << 1;
const GENERATION_SHIFT: u32 = 2;

fn pack(epoch: u32, position: u32) -> u64 {
    (epoch as u64) << 32 | position as u64
}

fn unpack(cursor: u64) -> (u32, u32) {
    ((cursor >> 32) as u32, cursor as u32)
}

/// Playback cursor shared between the handle and the source the output thread pulls from.
///
/// `cursor` holds a seek epoch in the high half and the sample position in the low half. Every
/// seek bumps the epoch, and a source only publishes its position while the epoch it read is
/// still current, so a seek can't be overwritten by a sample pulled concurrently.
///
/// `control` holds the flush generation above the `LIVE` and `LOOPING` bits, so ending,
/// wrapping and queueing a source are decided in one atomic step.
#[derive(Default)]
pub(crate) struct PlaybackState {
    cursor: AtomicU64,
    control: AtomicU64,
}

impl PlaybackState {
    pub fn position(&self) -> usize {
        unpack(self.cursor.load(Ordering::Acquire)).1 as usize
    }

    /// Moves the cursor. Sources pick it up at their next frame boundary.
    pub fn seek(&self, position: usize) {
        // Sound::decode rejects clips longer than u32::MAX samples
        let position = u32::try_from(position).unwrap_or(u32::MAX);
        let _ = self
            .cursor
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |cursor| {
                Some(pack(unpack(cursor).0.wrapping_add(1), position))
            });
    }

    pub fn is_looping(&self) -> bool {
        self.control.load(Ordering::Acquire) & LOOPING != 0
    }

    pub fn set_looping(&self, looping: bool) {
        if looping {
            self.control.fetch_or(LOOPING, Ordering::AcqRel);
        } else {
            self.control.fetch_and(!LOOPING, Ordering::AcqRel);
        }
    }

    /// True while a source of the current generation is queued and not exhausted.
    pub fn is_live(&self) -> bool {
        self.control.load(Ordering::Acquire) & LIVE != 0
    }

    /// Marks a source as live. Returns the generation to create it with, or `None` when one
    /// is live already.
    pub fn attach(&self) -> Option<u64> {
        let previous = self.control.fetch_or(LIVE, Ordering::AcqRel);
        if previous & LIVE == 0 {
            Some(previous >> GENERATION_SHIFT)
        } else {
            None
        }
    }

    /// Invalidates every source handed out so far. They end at their next frame boundary.
    pub fn flush(&self) {
        let _ = self
            .control
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |control| {
                let generation = (control >> GENERATION_SHIFT).wrapping_add(1);
                Some(generation << GENERATION_SHIFT | control & LOOPING)
            });
    }

    fn generation(&self) -> u64 {
        self.control.load(Ordering::Acquire) >> GENERATION_SHIFT
    }

    fn cursor(&self) -> (u32, u32) {
        unpack(self.cursor.load(Ordering::Acquire))
    }

    /// Publishes `position` unless a seek happened since `epoch` was read.
    fn advance(&self, epoch: u32, position: usize) {
        let desired = pack(epoch, position as u32);
        let mut current = self.cursor.load(Ordering::Acquire);
        while unpack(current).0 == epoch {
            match self.cursor.compare_exchange_weak(
                current,
                desired,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return,
                Err(actual) => current = actual,
            }
        }
    }

    /// Called by a source at the end of the clip. Returns true when it should start over;
    /// otherwise the source is done and, if still current, no longer live.
    fn wrap_at_end(&self, generation: u64) -> bool {
        let result = self
            .control
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |control| {
                if control >> GENERATION_SHIFT != generation || control & LOOPING != 0 {
                    None
                } else {
                    Some(control & !LIVE)
                }
            });
        match result {
            Ok(_) => false,
            Err(control) => control >> GENERATION_SHIFT == generation,
        }
    }

    fn finish(&self, generation: u64) {
        let _ = self
            .control
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |control| {
                (control >> GENERATION_SHIFT == generation).then(|| control & !LIVE)
            });
    }
}

pub(crate) struct SoundSource {
    samples: Arc<[i16]>,
    channels: u16,
    sample_rate: u32,
    state: Arc<PlaybackState>,
    generation: u64,
    epoch: Option<u32>,
    position: usize,
    frame_offset: u16,
}

impl Iterator for SoundSource {
    type Item = i16;

    fn next(&mut self) -> Option<Self::Item> {
        // Flushes, seeks and the end of the clip only take effect between frames, so channels
        // never shift and the queue sees the source end on a frame boundary
        if self.frame_offset == 0 {
            // cursor before generation: a rewind that follows a flush is never adopted by the
            // flushed source
            let (epoch, position) = self.state.cursor();
            if self.state.generation() != self.generation {
                return None;
            }
            if self.epoch != Some(epoch) {
                self.epoch = Some(epoch);
                self.position = position as usize;
            }
            if self.position >= self.samples.len() {
                if self.samples.is_empty() {
                    self.state.finish(self.generation);
                    return None;
                }
                if !self.state.wrap_at_end(self.generation) {
                    return None;
                }
                self.position = 0;
            }
        }
        let sample = *self.samples.get(self.position)?;
        self.position += 1;
        self.frame_offset = (self.frame_offset + 1) % self.channels;
        if let Some(epoch) = self.epoch {
            self.state.advance(epoch, self.position);
        }
        Some(sample)
    }
}

impl Source for SoundSource {
    fn current_frame_len(&self) -> Option<usize> {
        None
    }

    fn channels(&self) -> u16 {
        self.channels
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn total_duration(&self) -> Option<Duration> {
        None
    }
}
