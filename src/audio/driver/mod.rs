//! Audio output boundary.
//!
//! A driver opens one interleaved stereo `f32` stream and invokes the render
//! callback at the stream's cadence. [`CpalDriver`] talks to the sound card,
//! [`OfflineDriver`] is pumped by the caller.

mod cpal_backend;
mod offline;

pub use cpal_backend::{CpalDriver, CpalStream};
pub use offline::{OfflineDriver, OfflineStream};

use std::fmt;

/// Output channel count. Fixed.
pub const CHANNELS: usize = 2;

/// What the driver reports alongside each buffer request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamStatus {
    Ok,
    /// The driver missed a deadline (overrun or underrun) since the last call.
    Xrun,
}

/// Fills one interleaved stereo buffer of `2 * frame_size` samples.
pub type RenderCallback = Box<dyn FnMut(&mut [f32], StreamStatus) + Send>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamParams {
    /// Output device by index or name; `None` picks the default device.
    pub device: Option<String>,
    pub sample_rate: u32,
    /// Frames per callback.
    pub frame_size: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioDevice {
    pub index: usize,
    pub name: String,
    pub is_default: bool,
}

impl fmt::Display for AudioDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.index, self.name)?;
        if self.is_default {
            write!(f, " (default)")?;
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    #[error("No output device available")]
    NoDevice,
    #[error("Output device '{0}' not found")]
    DeviceNotFound(String),
    #[error("Device does not support {channels} channels of f32 at {sample_rate} Hz")]
    UnsupportedConfig { sample_rate: u32, channels: usize },
    #[error("Invalid frame size: {0}")]
    InvalidFrameSize(usize),
    #[error("Stream is not open")]
    NotOpen,
    #[error("Stream is already open")]
    AlreadyOpen,
    #[error("Failed to enumerate devices: {0}")]
    Devices(#[from] cpal::DevicesError),
    #[error("Failed to query device configs: {0}")]
    QueryConfigs(#[from] cpal::SupportedStreamConfigsError),
    #[error("Failed to build stream: {0}")]
    BuildStream(#[from] cpal::BuildStreamError),
    #[error("Failed to start stream: {0}")]
    PlayStream(#[from] cpal::PlayStreamError),
    #[error("Failed to stop stream: {0}")]
    PauseStream(#[from] cpal::PauseStreamError),
}

/// Opens output streams.
pub trait AudioDriver {
    type Stream: DriverStream;

    fn output_devices(&self) -> Result<Vec<AudioDevice>, DriverError>;

    /// Open a stopped stream that will call `callback` once started.
    fn open_stream(
        &self,
        params: &StreamParams,
        callback: RenderCallback,
    ) -> Result<Self::Stream, DriverError>;
}

/// An open stream. Dropping it closes the stream.
pub trait DriverStream {
    fn start(&mut self) -> Result<(), DriverError>;

    /// No callback runs after this returns.
    fn stop(&mut self) -> Result<(), DriverError>;
}
