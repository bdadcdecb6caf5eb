//! Load a single audio clip from a byte stream and control its playback.
//!
//! ```no_run
//! use std::fs::File;
//!
//! use sound_clip::AudioClipHandle;
//!
//! let mut clip = AudioClipHandle::new(File::open("sounds/test.wav")?)?;
//! clip.play()?;
//! clip.replay()?;
//! clip.close()?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod config;
mod error;
mod handle;
mod system;

pub use crate::config::ClipConfig;
pub use crate::error::{ClipError, ErrorKind};
pub use crate::handle::AudioClipHandle;
