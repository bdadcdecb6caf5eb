use std::f32::consts::PI;
use std::io::Cursor;
use std::thread;
use std::time::Duration;

use sound_clip::AudioClipHandle;
use tracing_subscriber::EnvFilter;

/// One second of a 440Hz tone as WAV bytes.
fn tone() -> Vec<u8> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: 44100,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut bytes = Vec::new();
    {
        let mut writer = hound::WavWriter::new(Cursor::new(&mut bytes), spec).unwrap();
        for t in 0..spec.sample_rate {
            let phase = t as f32 * 440.0 * 2.0 * PI / spec.sample_rate as f32;
            writer
                .write_sample((phase.sin() * i16::MAX as f32 * 0.3) as i16)
                .unwrap();
        }
        writer.finalize().unwrap();
    }
    bytes
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // try open clip on default device
    let mut clip = AudioClipHandle::new(Cursor::new(tone())).unwrap();
    clip.play().unwrap();
    thread::sleep(Duration::from_millis(500));
    // stop halfway
    clip.stop().unwrap();
    thread::sleep(Duration::from_millis(500));
    // resume the second half
    clip.play().unwrap();
    thread::sleep(Duration::from_millis(700));
    // start over, then loop
    clip.replay().unwrap();
    thread::sleep(Duration::from_millis(300));
    clip.set_volume(0.5).unwrap();
    clip.play_loop().unwrap();
    thread::sleep(Duration::from_secs(3));
    clip.close().unwrap();
}
