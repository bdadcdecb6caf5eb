use rodio::cpal::traits::{DeviceTrait, HostTrait};
use rodio::{cpal, OutputStream, Sink};
use tracing::{debug, info};

use crate::config::ClipConfig;
use crate::error::ClipError;

pub(crate) mod sound;

/// Audio output owned by a single clip: the sink sources are appended to and the stream that
/// keeps the device open.
pub(crate) struct AudioOutput {
    pub sink: Sink,
    _output_stream: Option<OutputStream>,
}

impl AudioOutput {
    /// Opens the configured output device, or the system default when none is named.
    pub fn open(config: &ClipConfig) -> Result<Self, ClipError> {
        let (stream, stream_handle) = match config.device.as_deref() {
            Some(name) => {
                let device = find_device(name)?;
                OutputStream::try_from_device(&device)?
            }
            None => OutputStream::try_default()?,
        };
        let sink = Sink::try_new(&stream_handle)?;
        sink.set_volume(config.volume);
        info!(
            device = config.device.as_deref().unwrap_or("default"),
            "opened audio output"
        );
        Ok(Self {
            sink,
            _output_stream: Some(stream),
        })
    }

    /// Wraps a sink that is not connected to any device.
    #[cfg(test)]
    pub fn detached(sink: Sink) -> Self {
        Self {
            sink,
            _output_stream: None,
        }
    }
}

fn find_device(name: &str) -> Result<cpal::Device, ClipError> {
    let host = cpal::default_host();
    for device in host.output_devices()? {
        match device.name() {
            Ok(device_name) if device_name == name => return Ok(device),
            Ok(_) => {}
            Err(e) => debug!("skipping output device without a name: {}", e),
        }
    }
    Err(ClipError::DeviceNotFound(name.to_string()))
}
