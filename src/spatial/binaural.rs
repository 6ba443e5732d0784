use super::hrtf::SharedHrtf;
use super::{SourceId, SourceSlot, Spatializer, Transform};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Closer than this the near-field level boost applies.
const NEAR_FIELD_DISTANCE: f32 = 1.0;
const MIN_DISTANCE: f32 = 0.1;

/// Per-source convolution state.
struct BinauralSource {
    slot: SourceSlot,
    hrir_left: Vec<f32>,
    hrir_right: Vec<f32>,
    // Last `ir_len - 1` input samples followed by the current frame.
    history: Vec<f32>,
}

impl BinauralSource {
    fn new(transform: Transform, frame_size: usize, ir_len: usize) -> Self {
        let mut source = Self {
            slot: SourceSlot::new(transform, frame_size),
            hrir_left: Vec::new(),
            hrir_right: Vec::new(),
            history: Vec::new(),
        };
        source.fit(ir_len);
        source
    }

    /// Resize for responses of `ir_len` taps. Allocates; never called from
    /// `process`.
    fn fit(&mut self, ir_len: usize) {
        let frame_size = self.slot.frame.len();
        let history_len = ir_len.saturating_sub(1) + frame_size;
        if self.hrir_left.len() == ir_len && self.history.len() == history_len {
            return;
        }
        self.hrir_left.resize(ir_len, 0.0);
        self.hrir_right.resize(ir_len, 0.0);
        self.history.clear();
        self.history.resize(history_len, 0.0);
    }

    fn fits(&self, ir_len: usize) -> bool {
        ir_len > 0 && self.hrir_left.len() == ir_len
    }
}

/// HRTF listener model: convolves every source with the response for its
/// direction relative to the listener.
///
/// With interpolation disabled the nearest grid point is used; enabled, the
/// four surrounding points are blended. Without an active dataset the model
/// renders silence.
pub struct HrtfSpatializer {
    frame_size: usize,
    listener: Transform,
    hrtf: SharedHrtf,
    interpolation: Arc<AtomicBool>,
    near_field: bool,
    sources: Vec<BinauralSource>,
    left: Vec<f32>,
    right: Vec<f32>,
}

impl HrtfSpatializer {
    pub fn new(frame_size: usize, hrtf: SharedHrtf, interpolation: Arc<AtomicBool>) -> Self {
        Self {
            frame_size,
            listener: Transform::new(),
            hrtf,
            interpolation,
            near_field: false,
            sources: Vec::new(),
            left: vec![0.0; frame_size],
            right: vec![0.0; frame_size],
        }
    }

    pub fn with_near_field(mut self, enabled: bool) -> Self {
        self.near_field = enabled;
        self
    }

    pub fn near_field(&self) -> bool {
        self.near_field
    }

    fn active_ir_len(&self) -> usize {
        self.hrtf.load().as_ref().map_or(0, |dataset| dataset.ir_len())
    }
}

/// Level boost for the near and far ear of a close source.
fn near_field_gains(lateral: f32, distance: f32) -> (f32, f32) {
    if distance >= NEAR_FIELD_DISTANCE {
        return (1.0, 1.0);
    }
    let proximity = (NEAR_FIELD_DISTANCE - distance.max(MIN_DISTANCE)) / NEAR_FIELD_DISTANCE;
    let boost = proximity * lateral.abs();
    let (near, far) = (1.0 + boost, 1.0 - 0.5 * boost);
    if lateral >= 0.0 {
        (near, far)
    } else {
        (far, near)
    }
}

fn convolve_add(history: &[f32], ir: &[f32], gain: f32, out: &mut [f32]) {
    let taps = ir.len();
    for (n, y) in out.iter_mut().enumerate() {
        // history[n + taps - 1] is the current input sample.
        let window = &history[n..n + taps];
        let acc: f32 = window.iter().rev().zip(ir).map(|(x, h)| x * h).sum();
        *y += gain * acc;
    }
}

impl Spatializer for HrtfSpatializer {
    fn add_source(&mut self, transform: Transform) -> SourceId {
        let ir_len = self.active_ir_len();
        self.sources
            .push(BinauralSource::new(transform, self.frame_size, ir_len));
        SourceId(self.sources.len() - 1)
    }

    fn prepare(&mut self) {
        let ir_len = self.active_ir_len();
        for source in &mut self.sources {
            source.fit(ir_len);
        }
    }

    fn listener_transform(&self) -> Transform {
        self.listener
    }

    fn set_listener_transform(&mut self, transform: Transform) {
        self.listener = transform;
    }

    fn source_transform(&self, source: SourceId) -> Option<Transform> {
        self.sources.get(source.0).map(|s| s.slot.transform)
    }

    fn set_source_transform(&mut self, source: SourceId, transform: Transform) {
        if let Some(s) = self.sources.get_mut(source.0) {
            s.slot.transform = transform;
        }
    }

    fn set_source_frame(&mut self, source: SourceId, frame: &[f32]) {
        if let Some(s) = self.sources.get_mut(source.0) {
            s.slot.load_frame(frame);
        }
    }

    fn process(&mut self) {
        self.left.fill(0.0);
        self.right.fill(0.0);

        let guard = self.hrtf.load();
        let Some(dataset) = guard.as_ref() else {
            return;
        };
        let interpolate = self.interpolation.load(Ordering::Acquire);
        let ir_len = dataset.ir_len();
        let listener = self.listener.position();

        for source in &mut self.sources {
            // Sized for another dataset; silent until the next `prepare`.
            if !source.fits(ir_len) {
                continue;
            }

            let offset = source.slot.transform.position() - listener;
            let (azimuth, elevation) = offset.direction_degrees();
            if interpolate {
                dataset.interpolated(
                    azimuth,
                    elevation,
                    &mut source.hrir_left,
                    &mut source.hrir_right,
                );
            } else {
                let (l, r) = dataset.nearest(azimuth, elevation);
                source.hrir_left.copy_from_slice(l);
                source.hrir_right.copy_from_slice(r);
            }

            let (gain_left, gain_right) = if self.near_field {
                let lateral = (azimuth.to_radians().sin() * elevation.to_radians().cos())
                    .clamp(-1.0, 1.0);
                near_field_gains(lateral, offset.length())
            } else {
                (1.0, 1.0)
            };

            let tail = ir_len - 1;
            source.history[tail..].copy_from_slice(&source.slot.frame);
            convolve_add(&source.history, &source.hrir_left, gain_left, &mut self.left);
            convolve_add(&source.history, &source.hrir_right, gain_right, &mut self.right);
            // Keep the last `tail` inputs for the next frame.
            let len = source.history.len();
            source.history.copy_within(len - tail..len, 0);
        }
    }

    fn processed_buffers(&self, left: &mut [f32], right: &mut [f32]) {
        for (out, s) in left.iter_mut().zip(&self.left) {
            *out = *s;
        }
        for (out, s) in right.iter_mut().zip(&self.right) {
            *out = *s;
        }
    }
}
