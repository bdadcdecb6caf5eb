use std::io::Read;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::config::ClipConfig;
use crate::error::ClipError;
use crate::system::sound::{PlaybackState, Sound};
use crate::system::AudioOutput;

/// A decoded audio clip bound to its own audio output.
///
/// The clip is decoded once when the handle is created and stays in memory. Transport
/// operations move a shared cursor over it and control the sink. After [`close`] every
/// operation fails with [`ClipError::Closed`]. Dropping an open handle releases the output
/// as well.
///
/// [`close`]: AudioClipHandle::close
pub struct AudioClipHandle {
    clip: Option<OpenClip>,
}

struct OpenClip {
    sound: Sound,
    state: Arc<PlaybackState>,
    output: AudioOutput,
}

impl OpenClip {
    /// Queues a source if none is live and unpauses the sink.
    fn start(&mut self) {
        if let Some(generation) = self.state.attach() {
            self.output
                .sink
                .append(self.sound.source(self.state.clone(), generation));
        }
        self.output.sink.play();
    }

    fn halt(&mut self) {
        self.output.sink.pause();
        self.state.flush();
    }
}

impl AudioClipHandle {
    /// Decodes `reader` and opens the default output device.
    pub fn new<R: Read>(reader: R) -> Result<Self, ClipError> {
        Self::with_config(reader, &ClipConfig::default())
    }

    /// Decodes `reader` and opens the output described by `config`. The stream is decoded
    /// before any device is touched.
    pub fn with_config<R: Read>(reader: R, config: &ClipConfig) -> Result<Self, ClipError> {
        let sound = Sound::decode(reader)?;
        let output = AudioOutput::open(config)?;
        Ok(Self::from_parts(sound, output))
    }

    fn from_parts(sound: Sound, output: AudioOutput) -> Self {
        Self {
            clip: Some(OpenClip {
                sound,
                state: Arc::new(PlaybackState::default()),
                output,
            }),
        }
    }

    fn open(&self) -> Result<&OpenClip, ClipError> {
        self.clip.as_ref().ok_or(ClipError::Closed)
    }

    fn open_mut(&mut self) -> Result<&mut OpenClip, ClipError> {
        self.clip.as_mut().ok_or(ClipError::Closed)
    }

    /// Plays from the current position and starts over from the beginning every time the end
    /// is reached.
    pub fn play_loop(&mut self) -> Result<(), ClipError> {
        let clip = self.open_mut()?;
        debug!(position = clip.state.position(), "loop clip");
        clip.state.set_looping(true);
        clip.start();
        Ok(())
    }

    /// Plays once from the current position. Calling it while the clip is already playing
    /// does not restart it; it only turns off looping so the current pass is the last one.
    pub fn play(&mut self) -> Result<(), ClipError> {
        let clip = self.open_mut()?;
        debug!(position = clip.state.position(), "play clip");
        clip.state.set_looping(false);
        clip.start();
        Ok(())
    }

    /// Stops playback and drops any queued audio. The position is kept.
    pub fn stop(&mut self) -> Result<(), ClipError> {
        let clip = self.open_mut()?;
        debug!(position = clip.state.position(), "stop clip");
        clip.halt();
        Ok(())
    }

    /// Stops, rewinds to the first frame and plays again.
    pub fn replay(&mut self) -> Result<(), ClipError> {
        let clip = self.open_mut()?;
        debug!("replay clip");
        clip.halt();
        clip.state.seek(0);
        clip.start();
        Ok(())
    }

    /// Releases the audio output. Fails with [`ClipError::Closed`] when called twice.
    pub fn close(&mut self) -> Result<(), ClipError> {
        let clip = self.clip.take().ok_or(ClipError::Closed)?;
        clip.output.sink.stop();
        debug!("closed clip");
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.clip.is_none()
    }

    pub fn is_playing(&self) -> Result<bool, ClipError> {
        let clip = self.open()?;
        Ok(clip.state.is_live() && !clip.output.sink.is_paused())
    }

    pub fn is_looping(&self) -> Result<bool, ClipError> {
        Ok(self.open()?.state.is_looping())
    }

    /// Frame the output will read next. This runs ahead of what is audible by however much
    /// audio the device has buffered.
    pub fn frame_position(&self) -> Result<usize, ClipError> {
        let clip = self.open()?;
        Ok(clip.state.position() / clip.sound.channels() as usize)
    }

    /// Moves the cursor to `frame`, clamped to the clip length. A playing clip finishes the
    /// frame it is in and continues from the new position.
    pub fn set_frame_position(&mut self, frame: usize) -> Result<(), ClipError> {
        let clip = self.open_mut()?;
        let frame = frame.min(clip.sound.frame_count());
        clip.state.seek(frame * clip.sound.channels() as usize);
        Ok(())
    }

    /// [`frame_position`] as a duration, with the same lead over the audible output.
    ///
    /// [`frame_position`]: AudioClipHandle::frame_position
    pub fn position(&self) -> Result<Duration, ClipError> {
        let frame = self.frame_position()?;
        Ok(self.open()?.sound.frames_to_duration(frame))
    }

    pub fn set_position(&mut self, position: Duration) -> Result<(), ClipError> {
        let frame = self.open()?.sound.duration_to_frames(position);
        self.set_frame_position(frame)
    }

    pub fn frame_count(&self) -> Result<usize, ClipError> {
        Ok(self.open()?.sound.frame_count())
    }

    pub fn duration(&self) -> Result<Duration, ClipError> {
        let sound = &self.open()?.sound;
        Ok(sound.frames_to_duration(sound.frame_count()))
    }

    pub fn channels(&self) -> Result<u16, ClipError> {
        Ok(self.open()?.sound.channels())
    }

    pub fn sample_rate(&self) -> Result<u32, ClipError> {
        Ok(self.open()?.sound.sample_rate())
    }

    pub fn volume(&self) -> Result<f32, ClipError> {
        Ok(self.open()?.output.sink.volume())
    }

    pub fn set_volume(&mut self, volume: f32) -> Result<(), ClipError> {
        self.open_mut()?.output.sink.set_volume(volume);
        Ok(())
    }
}

impl Drop for AudioClipHandle {
    fn drop(&mut self) {
        if let Some(clip) = self.clip.take() {
            warn!("audio clip dropped without close, releasing output");
            clip.output.sink.stop();
        }
    }
}

#[cfg(test)]
mod test {
    use std::io::Cursor;
    use std::time::Duration;

    use rodio::queue::SourcesQueueOutput;
    use rodio::Sink;

    use crate::error::{ClipError, ErrorKind};
    use crate::handle::AudioClipHandle;
    use crate::system::sound::Sound;
    use crate::system::AudioOutput;

    const SAMPLE_RATE: u32 = 8000;
    const LEVEL: i16 = 10_000;

    /// WAV with `frames` frames at a constant non-zero level so every sample that reaches the
    /// output is distinguishable from queue silence. The right channel of a stereo clip is
    /// negated.
    fn wav_bytes(frames: usize, channels: u16) -> Vec<u8> {
        let spec = hound::WavSpec {
            channels,
            sample_rate: SAMPLE_RATE,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut bytes = Vec::new();
        {
            let mut writer = hound::WavWriter::new(Cursor::new(&mut bytes), spec).unwrap();
            for _ in 0..frames {
                writer.write_sample(LEVEL).unwrap();
                if channels == 2 {
                    writer.write_sample(-LEVEL).unwrap();
                }
            }
            writer.finalize().unwrap();
        }
        bytes
    }

    fn clip_with_channels(
        frames: usize,
        channels: u16,
    ) -> (AudioClipHandle, SourcesQueueOutput<f32>) {
        let sound = Sound::decode(Cursor::new(wav_bytes(frames, channels))).unwrap();
        let (sink, output) = Sink::new_idle();
        let clip = AudioClipHandle::from_parts(sound, AudioOutput::detached(sink));
        (clip, output)
    }

    fn mock_clip(samples: usize) -> (AudioClipHandle, SourcesQueueOutput<f32>) {
        clip_with_channels(samples, 1)
    }

    /// Asserts the next `frames` frames come out left (positive) then right (negative).
    fn assert_frames_aligned(output: &mut SourcesQueueOutput<f32>, frames: usize) {
        for frame in 0..frames {
            assert!(output.next().unwrap() > 0.0, "left channel of frame {}", frame);
            assert!(output.next().unwrap() < 0.0, "right channel of frame {}", frame);
        }
    }

    /// Pulls `count` samples the way a device would and returns how many were audible.
    fn audible(output: &mut SourcesQueueOutput<f32>, count: usize) -> usize {
        output
            .by_ref()
            .take(count)
            .filter(|sample| *sample != 0.0)
            .count()
    }

    #[test]
    fn open_then_close_is_silent() {
        let (mut clip, mut output) = mock_clip(1000);
        assert_eq!(audible(&mut output, 4000), 0);
        clip.close().unwrap();
        assert!(clip.is_closed());
    }

    #[test]
    fn second_close_is_invalid_state() {
        let (mut clip, _output) = mock_clip(100);
        clip.close().unwrap();
        assert_eq!(clip.close().unwrap_err().kind(), ErrorKind::InvalidState);
    }

    #[test]
    fn transport_after_close() {
        let (mut clip, _output) = mock_clip(100);
        clip.close().unwrap();
        assert!(matches!(clip.play(), Err(ClipError::Closed)));
        assert!(matches!(clip.play_loop(), Err(ClipError::Closed)));
        assert!(matches!(clip.stop(), Err(ClipError::Closed)));
        assert!(matches!(clip.replay(), Err(ClipError::Closed)));
        assert!(matches!(clip.position(), Err(ClipError::Closed)));
        assert!(matches!(clip.set_volume(0.5), Err(ClipError::Closed)));
    }

    #[test]
    fn malformed_stream() {
        let mut truncated = wav_bytes(100, 1);
        truncated.truncate(10);
        let err = AudioClipHandle::new(Cursor::new(truncated)).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::Decode);
    }

    #[test]
    fn truncated_body() {
        let mut truncated = wav_bytes(1000, 1);
        truncated.truncate(44 + 200);
        let err = AudioClipHandle::new(Cursor::new(truncated)).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::Decode);
    }

    #[test]
    fn stereo_seek_keeps_channels() {
        let (mut clip, mut output) = clip_with_channels(100, 2);
        clip.play().unwrap();
        assert!(output.next().unwrap() > 0.0);
        assert!(output.next().unwrap() < 0.0);
        assert!(output.next().unwrap() > 0.0);
        clip.set_frame_position(10).unwrap();
        // right channel of the frame already started
        assert!(output.next().unwrap() < 0.0);
        assert_frames_aligned(&mut output, 20);
        assert_eq!(clip.frame_position().unwrap(), 30);
    }

    #[test]
    fn stereo_stop_and_replay_keep_channels() {
        let (mut clip, mut output) = clip_with_channels(100, 2);
        clip.play().unwrap();
        assert!(output.next().unwrap() > 0.0);
        clip.stop().unwrap();
        clip.play().unwrap();
        assert!(output.next().unwrap() < 0.0);
        assert_frames_aligned(&mut output, 10);
        assert_eq!(clip.frame_position().unwrap(), 11);

        assert!(output.next().unwrap() > 0.0);
        clip.replay().unwrap();
        assert!(output.next().unwrap() < 0.0);
        assert_eq!(clip.frame_position().unwrap(), 0);
        assert_frames_aligned(&mut output, 100);
        assert_eq!(clip.frame_position().unwrap(), 100);
    }

    #[test]
    fn play_produces_output() {
        let (mut clip, mut output) = mock_clip(4000);
        clip.play().unwrap();
        assert!(clip.is_playing().unwrap());
        assert_eq!(audible(&mut output, 1000), 1000);
        assert_eq!(clip.frame_position().unwrap(), 1000);
    }

    #[test]
    fn stop_halts_and_keeps_position() {
        let (mut clip, mut output) = mock_clip(4000);
        clip.play().unwrap();
        assert_eq!(audible(&mut output, 500), 500);
        clip.stop().unwrap();
        assert!(!clip.is_playing().unwrap());
        assert_eq!(audible(&mut output, 2000), 0);
        assert_eq!(clip.frame_position().unwrap(), 500);

        // the queue may finish a chunk of silence before the new source starts
        clip.play().unwrap();
        assert_eq!(audible(&mut output, 10_000), 3500);
        assert_eq!(clip.frame_position().unwrap(), 4000);
    }

    #[test]
    fn ends_naturally() {
        let (mut clip, mut output) = mock_clip(1000);
        clip.play().unwrap();
        assert_eq!(audible(&mut output, 5000), 1000);
        assert!(!clip.is_playing().unwrap());
        assert_eq!(clip.frame_position().unwrap(), clip.frame_count().unwrap());
    }

    #[test]
    fn play_at_end_is_silent() {
        let (mut clip, mut output) = mock_clip(200);
        clip.play().unwrap();
        assert_eq!(audible(&mut output, 1000), 200);
        clip.play().unwrap();
        assert_eq!(audible(&mut output, 1000), 0);
    }

    #[test]
    fn play_while_playing_does_not_restart() {
        let (mut clip, mut output) = mock_clip(1000);
        clip.play().unwrap();
        assert_eq!(audible(&mut output, 600), 600);
        clip.play().unwrap();
        assert_eq!(audible(&mut output, 2000), 400);
    }

    #[test]
    fn replay_resets_position() {
        let (mut clip, mut output) = mock_clip(1000);
        clip.play().unwrap();
        assert_eq!(audible(&mut output, 700), 700);
        clip.replay().unwrap();
        assert_eq!(clip.frame_position().unwrap(), 0);
        assert_eq!(audible(&mut output, 3000), 1000);

        // from the end as well
        clip.replay().unwrap();
        assert_eq!(clip.frame_position().unwrap(), 0);
        assert_eq!(audible(&mut output, 3000), 1000);
    }

    #[test]
    fn loop_wraps_around() {
        let (mut clip, mut output) = mock_clip(300);
        clip.play_loop().unwrap();
        assert!(clip.is_looping().unwrap());
        assert_eq!(audible(&mut output, 1000), 1000);
        assert!(clip.is_playing().unwrap());

        // play() ends the loop after the current pass
        clip.play().unwrap();
        assert!(!clip.is_looping().unwrap());
        assert_eq!(audible(&mut output, 1000), 200);
    }

    #[test]
    fn seek_clamps() {
        let (mut clip, _output) = mock_clip(SAMPLE_RATE as usize);
        assert_eq!(clip.duration().unwrap(), Duration::from_secs(1));
        clip.set_position(Duration::from_millis(250)).unwrap();
        assert_eq!(clip.frame_position().unwrap(), 2000);
        assert_eq!(clip.position().unwrap(), Duration::from_millis(250));
        clip.set_frame_position(usize::MAX).unwrap();
        assert_eq!(clip.frame_position().unwrap(), SAMPLE_RATE as usize);
    }

    #[test]
    fn volume() {
        let (mut clip, _output) = mock_clip(100);
        assert_eq!(clip.volume().unwrap(), 1.0);
        clip.set_volume(0.5).unwrap();
        assert_eq!(clip.volume().unwrap(), 0.5);
    }

    #[test]
    fn format_is_reported() {
        let (clip, _output) = mock_clip(100);
        assert_eq!(clip.channels().unwrap(), 1);
        assert_eq!(clip.sample_rate().unwrap(), SAMPLE_RATE);
        assert_eq!(clip.frame_count().unwrap(), 100);
    }
}
