//! HRTF datasets resampled onto a regular azimuth/elevation grid, and the
//! append-only set the listener picks its active dataset from.

use arc_swap::ArcSwapOption;
use log::{debug, info};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Active dataset as seen by the audio thread.
pub type SharedHrtf = Arc<ArcSwapOption<HrtfDataset>>;

#[derive(Debug, thiserror::Error)]
pub enum HrtfError {
    #[error("Failed to read HRTF file {path}: {reason}")]
    Read { path: PathBuf, reason: String },

    #[error("HRTF file {path} is sampled at {file_rate} Hz but the session runs at {session_rate} Hz")]
    SampleRateMismatch {
        path: PathBuf,
        file_rate: u32,
        session_rate: u32,
    },

    #[error("Invalid resampling step: {0} degrees")]
    InvalidStep(f32),

    #[error("No HRTF dataset with index {0}")]
    UnknownDataset(usize),
}

/// Loader boundary for HRTF files.
#[cfg_attr(test, mockall::automock)]
pub trait HrtfReader: Send + Sync {
    /// Sample rate the file's impulse responses are stored at.
    fn sample_rate(&self, path: &Path) -> Result<u32, HrtfError>;

    /// Read the file and resample it onto a grid with `step` degrees spacing.
    fn read(&self, path: &Path, step: f32) -> Result<HrtfDataset, HrtfError>;
}

/// Head-related impulse responses on a regular grid.
///
/// Azimuths cover `[0, 360)`, elevations `[-90, 90]` inclusive. Points are
/// stored elevation-major.
#[derive(Debug, Clone, PartialEq)]
pub struct HrtfDataset {
    name: String,
    sample_rate: u32,
    step: f32,
    ir_len: usize,
    azimuth_count: usize,
    elevation_count: usize,
    left: Vec<f32>,
    right: Vec<f32>,
}

impl HrtfDataset {
    /// Build a dataset by asking `fill` for the left/right response at every
    /// grid direction (azimuth, elevation in degrees).
    pub fn from_fn<F>(
        name: impl Into<String>,
        sample_rate: u32,
        step: f32,
        ir_len: usize,
        mut fill: F,
    ) -> Result<Self, HrtfError>
    where
        F: FnMut(f32, f32, &mut [f32], &mut [f32]),
    {
        if !step.is_finite() || step <= 0.0 || step > 90.0 {
            return Err(HrtfError::InvalidStep(step));
        }
        let ir_len = ir_len.max(1);
        let azimuth_count = ((360.0 / step).round() as usize).max(1);
        let elevation_count = ((180.0 / step).round() as usize + 1).max(2);
        let points = azimuth_count * elevation_count;

        let mut dataset = Self {
            name: name.into(),
            sample_rate,
            step,
            ir_len,
            azimuth_count,
            elevation_count,
            left: vec![0.0; points * ir_len],
            right: vec![0.0; points * ir_len],
        };

        for el_i in 0..elevation_count {
            for az_i in 0..azimuth_count {
                let (az, el) = dataset.grid_direction(az_i, el_i);
                let range = dataset.range(az_i, el_i);
                fill(
                    az,
                    el,
                    &mut dataset.left[range.clone()],
                    &mut dataset.right[range],
                );
            }
        }

        debug!(
            "Built HRTF grid '{}': {} x {} points, {} taps",
            dataset.name, azimuth_count, elevation_count, ir_len
        );
        Ok(dataset)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Requested resampling step in degrees.
    pub fn step(&self) -> f32 {
        self.step
    }

    pub fn ir_len(&self) -> usize {
        self.ir_len
    }

    pub fn point_count(&self) -> usize {
        self.azimuth_count * self.elevation_count
    }

    fn azimuth_spacing(&self) -> f32 {
        360.0 / self.azimuth_count as f32
    }

    fn elevation_spacing(&self) -> f32 {
        180.0 / (self.elevation_count - 1) as f32
    }

    fn grid_direction(&self, az_i: usize, el_i: usize) -> (f32, f32) {
        (
            az_i as f32 * self.azimuth_spacing(),
            el_i as f32 * self.elevation_spacing() - 90.0,
        )
    }

    fn range(&self, az_i: usize, el_i: usize) -> std::ops::Range<usize> {
        let start = (el_i * self.azimuth_count + az_i) * self.ir_len;
        start..start + self.ir_len
    }

    /// Grid directions in storage order.
    pub fn grid_points(&self) -> impl Iterator<Item = (f32, f32)> + '_ {
        (0..self.elevation_count).flat_map(move |el_i| {
            (0..self.azimuth_count).map(move |az_i| self.grid_direction(az_i, el_i))
        })
    }

    /// Responses of the grid point closest to the direction.
    pub fn nearest(&self, azimuth: f32, elevation: f32) -> (&[f32], &[f32]) {
        let a = azimuth.rem_euclid(360.0) / self.azimuth_spacing();
        let az_i = (a.round() as usize) % self.azimuth_count;
        let e = (elevation.clamp(-90.0, 90.0) + 90.0) / self.elevation_spacing();
        let el_i = (e.round() as usize).min(self.elevation_count - 1);
        let range = self.range(az_i, el_i);
        (&self.left[range.clone()], &self.right[range])
    }

    /// Bilinear blend of the four grid points around the direction.
    pub fn interpolated(&self, azimuth: f32, elevation: f32, left: &mut [f32], right: &mut [f32]) {
        let a = azimuth.rem_euclid(360.0) / self.azimuth_spacing();
        let a_floor = a.floor();
        let fa = a - a_floor;
        let az0 = (a_floor as usize) % self.azimuth_count;
        let az1 = (az0 + 1) % self.azimuth_count;

        let e = (elevation.clamp(-90.0, 90.0) + 90.0) / self.elevation_spacing();
        let el0 = (e.floor() as usize).min(self.elevation_count - 2);
        let fe = (e - el0 as f32).clamp(0.0, 1.0);
        let el1 = el0 + 1;

        let corners = [
            (self.range(az0, el0), (1.0 - fa) * (1.0 - fe)),
            (self.range(az1, el0), fa * (1.0 - fe)),
            (self.range(az0, el1), (1.0 - fa) * fe),
            (self.range(az1, el1), fa * fe),
        ];

        left.fill(0.0);
        right.fill(0.0);
        for (range, weight) in corners {
            if weight == 0.0 {
                continue;
            }
            for (out, ir) in left.iter_mut().zip(&self.left[range.clone()]) {
                *out += weight * ir;
            }
            for (out, ir) in right.iter_mut().zip(&self.right[range]) {
                *out += weight * ir;
            }
        }
    }

    /// Write the grid as `azimuth,elevation` rows. Returns the number of rows.
    pub fn write_grid_csv<W: Write>(&self, mut writer: W) -> io::Result<usize> {
        writeln!(writer, "azimuth,elevation")?;
        let mut rows = 0;
        for (az, el) in self.grid_points() {
            writeln!(writer, "{az},{el}")?;
            rows += 1;
        }
        writer.flush()?;
        Ok(rows)
    }
}

/// Datasets loaded during the session. Append-only; one of them is active.
pub struct HrtfSet {
    sample_rate: u32,
    datasets: Vec<Arc<HrtfDataset>>,
    active: SharedHrtf,
    active_index: Option<usize>,
}

impl HrtfSet {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            datasets: Vec::new(),
            active: Arc::new(ArcSwapOption::empty()),
            active_index: None,
        }
    }

    /// Handle the spatializer reads the active dataset through.
    pub fn shared(&self) -> SharedHrtf {
        Arc::clone(&self.active)
    }

    /// Load a file and append it. The active dataset is left alone; on error
    /// nothing changes.
    pub fn load(
        &mut self,
        reader: &dyn HrtfReader,
        path: &Path,
        step: f32,
    ) -> Result<usize, HrtfError> {
        let file_rate = reader.sample_rate(path)?;
        if file_rate != self.sample_rate {
            return Err(HrtfError::SampleRateMismatch {
                path: path.to_path_buf(),
                file_rate,
                session_rate: self.sample_rate,
            });
        }

        let dataset = reader.read(path, step)?;
        if dataset.sample_rate() != self.sample_rate {
            return Err(HrtfError::SampleRateMismatch {
                path: path.to_path_buf(),
                file_rate: dataset.sample_rate(),
                session_rate: self.sample_rate,
            });
        }

        info!(
            "HRTF '{}' loaded with a {} degree grid ({} points)",
            dataset.name(),
            step,
            dataset.point_count()
        );
        self.datasets.push(Arc::new(dataset));
        Ok(self.datasets.len() - 1)
    }

    /// Make a loaded dataset the listener's HRTF.
    pub fn activate(&mut self, index: usize) -> Result<(), HrtfError> {
        let dataset = self
            .datasets
            .get(index)
            .cloned()
            .ok_or(HrtfError::UnknownDataset(index))?;
        self.active.store(Some(dataset));
        self.active_index = Some(index);
        Ok(())
    }

    pub fn active(&self) -> Option<Arc<HrtfDataset>> {
        self.active.load_full()
    }

    pub fn active_index(&self) -> Option<usize> {
        self.active_index
    }

    pub fn get(&self, index: usize) -> Option<&Arc<HrtfDataset>> {
        self.datasets.get(index)
    }

    pub fn len(&self) -> usize {
        self.datasets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.datasets.is_empty()
    }
}
