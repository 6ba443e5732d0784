use super::hrtf::{HrtfDataset, HrtfError, HrtfReader};
use sofar::reader::{Filter, OpenOptions, Sofar};
use std::path::Path;

/// Reads measured HRTFs from SOFA files through libmysofa.
///
/// libmysofa resamples the filters to the session rate while opening, so
/// [`HrtfReader::sample_rate`] reports the session rate for every file that
/// opens and the rate check in `HrtfSet::load` never rejects one.
#[derive(Debug, Clone)]
pub struct SofaReader {
    sample_rate: u32,
}

impl SofaReader {
    pub fn new(sample_rate: u32) -> Self {
        Self { sample_rate }
    }

    fn open(&self, path: &Path) -> Result<Sofar, HrtfError> {
        OpenOptions::new()
            .sample_rate(self.sample_rate as f32)
            .open(path)
            .map_err(|e| HrtfError::Read {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })
    }
}

impl HrtfReader for SofaReader {
    fn sample_rate(&self, path: &Path) -> Result<u32, HrtfError> {
        self.open(path).map(|_| self.sample_rate)
    }

    fn read(&self, path: &Path, step: f32) -> Result<HrtfDataset, HrtfError> {
        let sofa = self.open(path)?;
        let ir_len = sofa.filter_len();
        let mut filter = Filter::new(ir_len);

        HrtfDataset::from_fn(
            path.display().to_string(),
            self.sample_rate,
            step,
            ir_len,
            |azimuth, elevation, left, right| {
                let (az, el) = (azimuth.to_radians(), elevation.to_radians());
                // SOFA cartesian: x front, y left, z up.
                let (x, y, z) = (az.cos() * el.cos(), az.sin() * el.cos(), el.sin());
                sofa.filter(x, y, z, &mut filter);
                left.copy_from_slice(&filter.left[..ir_len]);
                right.copy_from_slice(&filter.right[..ir_len]);
            },
        )
    }
}
