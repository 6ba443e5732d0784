use super::{
    AudioDevice, AudioDriver, DriverError, DriverStream, RenderCallback, StreamParams,
    StreamStatus, CHANNELS,
};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BufferSize, SampleFormat, SampleRate, StreamConfig, SupportedBufferSize};
use log::{debug, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Output through the default cpal host.
pub struct CpalDriver {
    host: cpal::Host,
}

impl CpalDriver {
    pub fn new() -> Self {
        Self {
            host: cpal::default_host(),
        }
    }

    fn default_name(&self) -> Option<String> {
        self.host
            .default_output_device()
            .and_then(|device| device.name().ok())
    }

    /// Resolve `selector` as a device index first, then as a device name.
    fn find_device(&self, selector: Option<&str>) -> Result<cpal::Device, DriverError> {
        let Some(selector) = selector.filter(|s| !s.is_empty()) else {
            return self
                .host
                .default_output_device()
                .ok_or(DriverError::NoDevice);
        };

        let mut devices: Vec<cpal::Device> = self.host.output_devices()?.collect();
        let position = match selector.parse::<usize>() {
            Ok(index) if index < devices.len() => Some(index),
            _ => devices
                .iter()
                .position(|d| d.name().ok().as_deref() == Some(selector)),
        };
        match position {
            Some(index) => Ok(devices.swap_remove(index)),
            None => Err(DriverError::DeviceNotFound(selector.to_string())),
        }
    }
}

impl Default for CpalDriver {
    fn default() -> Self {
        Self::new()
    }
}

/// Buffer size to request: the frame size when the device accepts it.
fn negotiate(
    device: &cpal::Device,
    params: &StreamParams,
) -> Result<StreamConfig, DriverError> {
    let rate = params.sample_rate;
    let supported = device
        .supported_output_configs()?
        .find(|c| {
            c.channels() as usize == CHANNELS
                && c.sample_format() == SampleFormat::F32
                && c.min_sample_rate().0 <= rate
                && c.max_sample_rate().0 >= rate
        })
        .ok_or(DriverError::UnsupportedConfig {
            sample_rate: rate,
            channels: CHANNELS,
        })?;

    let frames = params.frame_size as u32;
    let buffer_size = match supported.buffer_size() {
        SupportedBufferSize::Range { min, max } if (*min..=*max).contains(&frames) => {
            BufferSize::Fixed(frames)
        }
        SupportedBufferSize::Range { min, max } => {
            warn!(
                "Device buffer range {}..={} excludes {} frames; using the device default",
                min, max, frames
            );
            BufferSize::Default
        }
        SupportedBufferSize::Unknown => BufferSize::Fixed(frames),
    };

    Ok(StreamConfig {
        channels: CHANNELS as u16,
        sample_rate: SampleRate(rate),
        buffer_size,
    })
}

/// Hands the render callback blocks of exactly `2 * frame_size` samples
/// whatever buffer sizes the backend asks for.
struct BlockAdapter {
    callback: RenderCallback,
    block: Vec<f32>,
    // Samples of `block` already delivered.
    consumed: usize,
    xrun: Arc<AtomicBool>,
}

impl BlockAdapter {
    fn new(callback: RenderCallback, frame_size: usize, xrun: Arc<AtomicBool>) -> Self {
        let len = frame_size * CHANNELS;
        Self {
            callback,
            block: vec![0.0; len],
            consumed: len,
            xrun,
        }
    }

    fn fill(&mut self, data: &mut [f32]) {
        let mut written = 0;
        while written < data.len() {
            if self.consumed == self.block.len() {
                let status = if self.xrun.swap(false, Ordering::AcqRel) {
                    StreamStatus::Xrun
                } else {
                    StreamStatus::Ok
                };
                (self.callback)(&mut self.block, status);
                self.consumed = 0;
            }
            let n = (data.len() - written).min(self.block.len() - self.consumed);
            data[written..written + n]
                .copy_from_slice(&self.block[self.consumed..self.consumed + n]);
            written += n;
            self.consumed += n;
        }
    }
}

impl AudioDriver for CpalDriver {
    type Stream = CpalStream;

    fn output_devices(&self) -> Result<Vec<AudioDevice>, DriverError> {
        let default_name = self.default_name();
        let devices = self
            .host
            .output_devices()?
            .enumerate()
            .map(|(index, device)| {
                let name = device.name().unwrap_or_else(|_| "Unknown".to_string());
                let is_default = default_name.as_deref() == Some(name.as_str());
                AudioDevice {
                    index,
                    name,
                    is_default,
                }
            })
            .collect();
        Ok(devices)
    }

    fn open_stream(
        &self,
        params: &StreamParams,
        callback: RenderCallback,
    ) -> Result<CpalStream, DriverError> {
        if params.frame_size == 0 {
            return Err(DriverError::InvalidFrameSize(0));
        }

        let device = self.find_device(params.device.as_deref())?;
        let name = device.name().unwrap_or_else(|_| "Unknown".to_string());
        let config = negotiate(&device, params)?;
        debug!(
            "Stream config: sample_rate={}, channels={}, buffer_size={:?}",
            config.sample_rate.0, config.channels, config.buffer_size
        );

        let xrun = Arc::new(AtomicBool::new(false));
        let error_flag = Arc::clone(&xrun);
        let mut adapter = BlockAdapter::new(callback, params.frame_size, Arc::clone(&xrun));

        let stream = device.build_output_stream(
            &config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| adapter.fill(data),
            move |err| {
                warn!("Audio stream error: {}", err);
                error_flag.store(true, Ordering::Release);
            },
            None,
        )?;
        // Some backends start playing on build.
        stream.pause()?;

        info!(
            "Opened output stream on '{}' ({} Hz, {} frames)",
            name, params.sample_rate, params.frame_size
        );
        Ok(CpalStream { stream })
    }
}

pub struct CpalStream {
    stream: cpal::Stream,
}

impl DriverStream for CpalStream {
    fn start(&mut self) -> Result<(), DriverError> {
        self.stream.play()?;
        Ok(())
    }

    fn stop(&mut self) -> Result<(), DriverError> {
        self.stream.pause()?;
        Ok(())
    }
}
