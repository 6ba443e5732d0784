//! Circular source trajectories around the listener.
//!
//! The source first circles the listener twice in the horizontal (transverse)
//! plane, then once through the vertical (sagittal) plane along the front
//! and rear meridians, and starts over.

use crate::spatial::Vector3;
use std::fmt;

// Tolerance for comparing accumulated angles against their bounds.
const EPS: f64 = 1e-6;

const TRANSVERSE_REVOLUTIONS: u32 = 2;
// The counter keeps the transverse revolutions, so one sagittal sweep ends at 3.
const CYCLE_END: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrajectoryPhase {
    Transverse,
    Sagittal,
}

impl fmt::Display for TrajectoryPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrajectoryPhase::Transverse => write!(f, "Transverse"),
            TrajectoryPhase::Sagittal => write!(f, "Sagittal"),
        }
    }
}

/// Source direction and distance relative to the listener, in degrees and
/// metres.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SourcePose {
    pub azimuth: f64,
    pub elevation: f64,
    pub distance: f64,
}

impl SourcePose {
    /// Azimuth is wrapped into `[0, 360)`, elevation clamped to `[-90, 90]`.
    pub fn new(azimuth: f64, elevation: f64, distance: f64) -> Self {
        let mut azimuth = azimuth.rem_euclid(360.0);
        if azimuth >= 360.0 {
            azimuth = 0.0;
        }
        Self {
            azimuth,
            elevation: elevation.clamp(-90.0, 90.0),
            distance,
        }
    }

    /// Offset from the listener: x forward, y left, z up.
    pub fn to_cartesian(&self) -> Vector3 {
        let (az, el) = (self.azimuth.to_radians(), self.elevation.to_radians());
        let r = self.distance;
        Vector3::new(
            (r * az.cos() * el.cos()) as f32,
            (r * az.sin() * el.cos()) as f32,
            (r * el.sin()) as f32,
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrajectoryGenerator {
    initial: SourcePose,
    step: f64,
    pose: SourcePose,
    phase: TrajectoryPhase,
    loop_counter: u32,
    announced: Option<TrajectoryPhase>,
}

impl TrajectoryGenerator {
    /// `step` is the angular speed in degrees per tick.
    pub fn new(initial: SourcePose, step: f64) -> Self {
        Self {
            initial,
            step,
            pose: initial,
            phase: TrajectoryPhase::Transverse,
            loop_counter: 0,
            announced: None,
        }
    }

    /// Advance one tick. Returns the phase when this tick is the first one
    /// spent in it.
    pub fn tick(&mut self) -> Option<TrajectoryPhase> {
        let phase = self.phase;
        let entered = if self.announced != Some(phase) {
            self.announced = Some(phase);
            Some(phase)
        } else {
            None
        };

        match phase {
            TrajectoryPhase::Transverse => self.tick_transverse(),
            TrajectoryPhase::Sagittal => self.tick_sagittal(),
        }
        entered
    }

    fn tick_transverse(&mut self) {
        self.pose.azimuth += self.step;
        if self.pose.azimuth >= 360.0 - EPS {
            self.pose.azimuth = 0.0;
            self.loop_counter += 1;
        }
        if self.loop_counter >= TRANSVERSE_REVOLUTIONS {
            self.phase = TrajectoryPhase::Sagittal;
        }
    }

    fn tick_sagittal(&mut self) {
        let pose = &mut self.pose;
        if pose.azimuth < 90.0 {
            // Front meridian, climbing.
            let previous = pose.elevation;
            pose.elevation += self.step;
            // The horizon is crossed even when the tick overshoots the pole.
            if previous < -EPS && pose.elevation >= -EPS {
                self.loop_counter += 1;
            }
            if pose.elevation > 90.0 + EPS {
                pose.azimuth = 180.0;
                pose.elevation = 90.0;
            } else {
                pose.elevation = pose.elevation.min(90.0);
            }
        } else {
            // Rear meridian, descending.
            pose.elevation -= self.step;
            if pose.elevation < -90.0 - EPS {
                pose.azimuth = 0.0;
                pose.elevation = -90.0;
            } else {
                pose.elevation = pose.elevation.max(-90.0);
            }
        }

        if self.loop_counter >= CYCLE_END {
            self.loop_counter = 0;
            // The sweep ends on the front meridian.
            self.pose.azimuth = 0.0;
            self.pose.elevation = self.initial.elevation;
            self.phase = TrajectoryPhase::Transverse;
        }
    }

    /// Back to the initial pose in the transverse phase.
    pub fn reset(&mut self) {
        self.pose = self.initial;
        self.phase = TrajectoryPhase::Transverse;
        self.loop_counter = 0;
        self.announced = None;
    }

    pub fn pose(&self) -> SourcePose {
        self.pose
    }

    pub fn initial_pose(&self) -> SourcePose {
        self.initial
    }

    /// Phase the next tick runs in.
    pub fn phase(&self) -> TrajectoryPhase {
        self.phase
    }

    pub fn loop_counter(&self) -> u32 {
        self.loop_counter
    }

    pub fn step(&self) -> f64 {
        self.step
    }
}
