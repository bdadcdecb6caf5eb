/// Output settings applied when a clip is opened.
///
/// ```
/// use sound_clip::ClipConfig;
///
/// let config = ClipConfig::default().with_volume(0.5);
/// assert_eq!(config.volume, 0.5);
/// assert!(config.device.is_none());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ClipConfig {
    /// Name of the output device. `None` selects the system default.
    pub device: Option<String>,
    /// Initial sink volume, 1.0 being unchanged.
    pub volume: f32,
}

impl ClipConfig {
    pub fn with_device(mut self, name: impl Into<String>) -> Self {
        self.device = Some(name.into());
        self
    }

    pub fn with_volume(mut self, volume: f32) -> Self {
        self.volume = volume;
        self
    }
}

impl Default for ClipConfig {
    fn default() -> Self {
        Self {
            device: None,
            volume: 1.0,
        }
    }
}
