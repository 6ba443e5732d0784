//! Rigid-sphere head model used when no measured HRTF is available.

use super::hrtf::{HrtfDataset, HrtfError, HrtfReader};
use std::path::Path;

const SPEED_OF_SOUND: f32 = 343.0;
const DEFAULT_HEAD_RADIUS: f32 = 0.0875;
// Taps before the earliest arrival.
const ONSET: usize = 2;

/// Synthesises responses on the requested grid: Woodworth interaural time
/// difference, plus level loss and low-pass filtering on the shadowed ear.
///
/// The path only names the dataset; nothing is read from disk.
#[derive(Debug, Clone)]
pub struct SphericalHeadReader {
    sample_rate: u32,
    head_radius: f32,
}

impl SphericalHeadReader {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            head_radius: DEFAULT_HEAD_RADIUS,
        }
    }

    pub fn with_head_radius(mut self, radius: f32) -> Self {
        self.head_radius = radius;
        self
    }

    fn max_delay_samples(&self) -> f32 {
        let max_itd = self.head_radius / SPEED_OF_SOUND * (std::f32::consts::FRAC_PI_2 + 1.0);
        max_itd * self.sample_rate as f32
    }

    fn ir_len(&self) -> usize {
        (ONSET + self.max_delay_samples().ceil() as usize + 8).next_power_of_two()
    }

    fn render(&self, azimuth: f32, elevation: f32, left: &mut [f32], right: &mut [f32]) {
        let (az, el) = (azimuth.to_radians(), elevation.to_radians());
        // Positive towards the left ear.
        let lateral = (az.sin() * el.cos()).clamp(-1.0, 1.0).asin();
        let theta = lateral.abs();
        let itd = self.head_radius / SPEED_OF_SOUND * (theta + theta.sin());
        let delay = itd * self.sample_rate as f32;
        let shadow = theta.sin();

        let (near, far) = if lateral >= 0.0 {
            (left, right)
        } else {
            (right, left)
        };

        near.fill(0.0);
        near[ONSET.min(near.len() - 1)] = 1.0;

        far.fill(0.0);
        place_fractional(far, ONSET as f32 + delay, 1.0 - 0.5 * shadow);
        one_pole_lowpass(far, 0.6 * shadow);
    }
}

/// Linear-interpolated impulse at a fractional position.
fn place_fractional(ir: &mut [f32], position: f32, gain: f32) {
    let index = position.floor() as usize;
    let frac = position - position.floor();
    if let Some(tap) = ir.get_mut(index) {
        *tap += gain * (1.0 - frac);
    }
    if let Some(tap) = ir.get_mut(index + 1) {
        *tap += gain * frac;
    }
}

fn one_pole_lowpass(ir: &mut [f32], pole: f32) {
    let mut state = 0.0;
    for sample in ir.iter_mut() {
        state = (1.0 - pole) * *sample + pole * state;
        *sample = state;
    }
}

impl HrtfReader for SphericalHeadReader {
    fn sample_rate(&self, _path: &Path) -> Result<u32, HrtfError> {
        Ok(self.sample_rate)
    }

    fn read(&self, path: &Path, step: f32) -> Result<HrtfDataset, HrtfError> {
        HrtfDataset::from_fn(
            path.display().to_string(),
            self.sample_rate,
            step,
            self.ir_len(),
            |az, el, left, right| self.render(az, el, left, right),
        )
    }
}
