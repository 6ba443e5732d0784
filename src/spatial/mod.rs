//! Spatialization boundary.
//!
//! The render pipeline only talks to a [`Spatializer`]; concrete models are
//! picked once when the session is built.

mod binaural;
mod head_model;
pub mod hrtf;
mod panning;
#[cfg(feature = "sofa")]
mod sofa;

pub use binaural::HrtfSpatializer;
pub use head_model::SphericalHeadReader;
pub use hrtf::{HrtfDataset, HrtfError, HrtfReader, HrtfSet, SharedHrtf};
pub use panning::PanningSpatializer;
#[cfg(feature = "sofa")]
pub use sofa::SofaReader;

use std::ops::{Add, Sub};

/// Position in world space, in metres. `x` points forward, `y` to the
/// listener's left and `z` up.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vector3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vector3 {
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn length(&self) -> f32 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    /// Azimuth (counter-clockwise from the front) and elevation in degrees.
    pub fn direction_degrees(&self) -> (f32, f32) {
        let distance = self.length();
        if distance <= f32::EPSILON {
            return (0.0, 0.0);
        }
        let azimuth = self.y.atan2(self.x).to_degrees().rem_euclid(360.0);
        let elevation = (self.z / distance).clamp(-1.0, 1.0).asin().to_degrees();
        (azimuth, elevation)
    }
}

impl Add for Vector3 {
    type Output = Vector3;

    fn add(self, rhs: Vector3) -> Vector3 {
        Vector3::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Sub for Vector3 {
    type Output = Vector3;

    fn sub(self, rhs: Vector3) -> Vector3 {
        Vector3::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

/// Placement of a listener or a source. Listeners always face `+x`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Transform {
    position: Vector3,
}

impl Transform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_position(mut self, position: Vector3) -> Self {
        self.position = position;
        self
    }

    pub fn position(&self) -> Vector3 {
        self.position
    }

    pub fn set_position(&mut self, position: Vector3) {
        self.position = position;
    }
}

/// Handle of a source registered with a [`Spatializer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceId(pub(crate) usize);

/// Capability interface of a listener-side rendering model.
///
/// Sources are registered at setup time. On every callback the pipeline hands
/// each source its mono frame, runs one processing pass and copies the mixed
/// stereo result out with [`Spatializer::processed_buffers`].
#[cfg_attr(test, mockall::automock)]
pub trait Spatializer: Send {
    /// Register a source. Not called from the audio thread.
    fn add_source(&mut self, transform: Transform) -> SourceId;

    /// Resize per-source state for the current configuration, e.g. after a
    /// new HRTF became active. Only called while the stream is stopped.
    fn prepare(&mut self) {}

    fn listener_transform(&self) -> Transform;

    fn set_listener_transform(&mut self, transform: Transform);

    fn source_transform(&self, source: SourceId) -> Option<Transform>;

    fn set_source_transform(&mut self, source: SourceId, transform: Transform);

    /// Queue the next mono frame of a source.
    fn set_source_frame(&mut self, source: SourceId, frame: &[f32]);

    /// Render every source into the listener's ear buffers.
    fn process(&mut self);

    /// Copy the most recent ear buffers out.
    fn processed_buffers(&self, left: &mut [f32], right: &mut [f32]);
}

/// State every model keeps for a registered source.
#[derive(Debug, Clone)]
pub(crate) struct SourceSlot {
    pub(crate) transform: Transform,
    pub(crate) frame: Vec<f32>,
}

impl SourceSlot {
    pub(crate) fn new(transform: Transform, frame_size: usize) -> Self {
        Self {
            transform,
            frame: vec![0.0; frame_size],
        }
    }

    /// Copy a frame in, zero-padding when the caller hands over fewer samples.
    pub(crate) fn load_frame(&mut self, frame: &[f32]) {
        let n = frame.len().min(self.frame.len());
        self.frame[..n].copy_from_slice(&frame[..n]);
        self.frame[n..].fill(0.0);
    }
}
