//! WAV input for source material and WAV output for offline renders.

use super::driver::CHANNELS;
use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use log::debug;
use rand::Rng;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum WavError {
    #[error("Failed to open WAV '{path}': {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: hound::Error,
    },
    #[error("WAV '{0}' has no channels")]
    NoChannels(PathBuf),
    #[error("WAV error: {0}")]
    Hound(#[from] hound::Error),
}

/// Decoded mono recording.
#[derive(Debug, Clone, PartialEq)]
pub struct Recording {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

/// Load a WAV file as mono `f32`. Integer samples are scaled by the largest
/// positive value of their bit depth (`i16::MAX` for 16-bit files); channels
/// are averaged.
pub fn load_mono(path: &Path) -> Result<Recording, WavError> {
    let reader = WavReader::open(path).map_err(|source| WavError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    let spec = reader.spec();
    let channels = spec.channels as usize;
    if channels == 0 {
        return Err(WavError::NoChannels(path.to_path_buf()));
    }

    let interleaved: Vec<f32> = match spec.sample_format {
        SampleFormat::Float => reader.into_samples::<f32>().collect::<Result<_, _>>()?,
        SampleFormat::Int => {
            let scale = ((1i64 << (spec.bits_per_sample - 1)) - 1) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|s| s as f32 / scale))
                .collect::<Result<_, _>>()?
        }
    };

    let samples = if channels == 1 {
        interleaved
    } else {
        interleaved
            .chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
            .collect()
    };

    debug!(
        "Loaded '{}': {} samples at {} Hz from {} channel(s)",
        path.display(),
        samples.len(),
        spec.sample_rate,
        channels
    );
    Ok(Recording {
        samples,
        sample_rate: spec.sample_rate,
    })
}

/// Uniform white noise in `[-0.5, 0.5)`.
pub fn white_noise(seconds: f32, sample_rate: u32) -> Vec<f32> {
    let len = (seconds.max(0.0) * sample_rate as f32) as usize;
    let mut rng = rand::thread_rng();
    (0..len).map(|_| rng.gen_range(-0.5..0.5)).collect()
}

/// Incremental 32-bit float stereo WAV output.
pub struct StereoWriter {
    writer: WavWriter<BufWriter<File>>,
}

impl StereoWriter {
    pub fn create(path: &Path, sample_rate: u32) -> Result<Self, WavError> {
        let spec = WavSpec {
            channels: CHANNELS as u16,
            sample_rate,
            bits_per_sample: 32,
            sample_format: SampleFormat::Float,
        };
        Ok(Self {
            writer: WavWriter::create(path, spec)?,
        })
    }

    /// Append interleaved samples.
    pub fn write(&mut self, interleaved: &[f32]) -> Result<(), WavError> {
        for &sample in interleaved {
            self.writer.write_sample(sample)?;
        }
        Ok(())
    }

    pub fn finalize(self) -> Result<(), WavError> {
        self.writer.finalize()?;
        Ok(())
    }
}
