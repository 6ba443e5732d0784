//! The real-time render path.
//!
//! Each callback pulls one mono frame per source, lets the spatializer mix
//! them into the listener's ears, interleaves the result for the device and
//! then moves the animated source one trajectory step.

use super::driver::{RenderCallback, StreamStatus, CHANNELS};
use super::reservoir::SampleReservoir;
use super::trajectory::{TrajectoryGenerator, TrajectoryPhase};
use crate::spatial::{SourceId, Spatializer, Transform};
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, PoisonError, TryLockError};

const NO_PHASE: u8 = 0;

fn phase_code(phase: TrajectoryPhase) -> u8 {
    match phase {
        TrajectoryPhase::Transverse => 1,
        TrajectoryPhase::Sagittal => 2,
    }
}

fn phase_from_code(code: u8) -> Option<TrajectoryPhase> {
    match code {
        1 => Some(TrajectoryPhase::Transverse),
        2 => Some(TrajectoryPhase::Sagittal),
        _ => None,
    }
}

/// Counters the callback updates and the status monitor reads.
///
/// Lock-free; the audio thread only performs atomic stores and increments.
#[derive(Debug, Default)]
pub struct PipelineStatus {
    callbacks: AtomicU64,
    xruns: AtomicU64,
    lock_misses: AtomicU64,
    phase: AtomicU8,
    loop_counter: AtomicU32,
    entered_phase: AtomicU8,
}

/// Point-in-time copy of [`PipelineStatus`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatusSnapshot {
    pub callbacks: u64,
    pub xruns: u64,
    pub lock_misses: u64,
    pub phase: Option<TrajectoryPhase>,
    pub loop_counter: u32,
}

impl PipelineStatus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        StatusSnapshot {
            callbacks: self.callbacks.load(Ordering::Relaxed),
            xruns: self.xruns.load(Ordering::Relaxed),
            lock_misses: self.lock_misses.load(Ordering::Relaxed),
            phase: phase_from_code(self.phase.load(Ordering::Relaxed)),
            loop_counter: self.loop_counter.load(Ordering::Relaxed),
        }
    }

    /// Phase entered since the last call, if any.
    pub fn take_entered_phase(&self) -> Option<TrajectoryPhase> {
        phase_from_code(self.entered_phase.swap(NO_PHASE, Ordering::AcqRel))
    }

    fn record_callback(&self, status: StreamStatus) {
        self.callbacks.fetch_add(1, Ordering::Relaxed);
        if status == StreamStatus::Xrun {
            self.xruns.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn record_lock_miss(&self) {
        self.lock_misses.fetch_add(1, Ordering::Relaxed);
    }

    fn record_trajectory(&self, trajectory: &TrajectoryGenerator, entered: Option<TrajectoryPhase>) {
        self.phase.store(phase_code(trajectory.phase()), Ordering::Relaxed);
        self.loop_counter
            .store(trajectory.loop_counter(), Ordering::Relaxed);
        if let Some(phase) = entered {
            self.entered_phase.store(phase_code(phase), Ordering::Release);
        }
    }
}

/// Interleave two channels: `out[2i] = left[i]`, `out[2i + 1] = right[i]`.
/// Output positions without a matching input sample are zeroed.
pub fn interlace(left: &[f32], right: &[f32], out: &mut [f32]) {
    for (i, frame) in out.chunks_mut(CHANNELS).enumerate() {
        frame[0] = left.get(i).copied().unwrap_or(0.0);
        if let Some(r) = frame.get_mut(1) {
            *r = right.get(i).copied().unwrap_or(0.0);
        }
    }
}

struct PipelineSource {
    id: SourceId,
    reservoir: SampleReservoir,
}

/// Everything the render callback touches. Buffers are sized once at
/// construction.
pub struct RenderPipeline {
    frame_size: usize,
    spatializer: Box<dyn Spatializer>,
    sources: Vec<PipelineSource>,
    moving: Option<SourceId>,
    trajectory: TrajectoryGenerator,
    mono: Vec<f32>,
    processed_left: Vec<f32>,
    processed_right: Vec<f32>,
    left: Vec<f32>,
    right: Vec<f32>,
    status: Arc<PipelineStatus>,
}

impl RenderPipeline {
    pub fn new(
        frame_size: usize,
        spatializer: Box<dyn Spatializer>,
        trajectory: TrajectoryGenerator,
        status: Arc<PipelineStatus>,
    ) -> Self {
        Self {
            frame_size,
            spatializer,
            sources: Vec::new(),
            moving: None,
            trajectory,
            mono: vec![0.0; frame_size],
            processed_left: vec![0.0; frame_size],
            processed_right: vec![0.0; frame_size],
            left: vec![0.0; frame_size],
            right: vec![0.0; frame_size],
            status,
        }
    }

    /// Add a source at a fixed transform.
    pub fn add_source(&mut self, reservoir: SampleReservoir, transform: Transform) -> SourceId {
        let id = self.spatializer.add_source(transform);
        self.sources.push(PipelineSource { id, reservoir });
        id
    }

    /// Add the source that follows the trajectory, placed at its current pose.
    pub fn add_moving_source(&mut self, reservoir: SampleReservoir) -> SourceId {
        let transform = self.pose_transform();
        let id = self.add_source(reservoir, transform);
        self.moving = Some(id);
        id
    }

    fn pose_transform(&self) -> Transform {
        let listener = self.spatializer.listener_transform().position();
        Transform::new().with_position(listener + self.trajectory.pose().to_cartesian())
    }

    fn push_pose(&mut self) {
        if let Some(id) = self.moving {
            let transform = self.pose_transform();
            self.spatializer.set_source_transform(id, transform);
        }
    }

    /// Fill one interleaved stereo buffer.
    pub fn render(&mut self, output: &mut [f32], status: StreamStatus) {
        self.left.fill(0.0);
        self.right.fill(0.0);

        for source in &mut self.sources {
            source.reservoir.next_frame(&mut self.mono);
            self.spatializer.set_source_frame(source.id, &self.mono);
        }

        self.spatializer.process();
        self.spatializer
            .processed_buffers(&mut self.processed_left, &mut self.processed_right);
        for (acc, s) in self.left.iter_mut().zip(&self.processed_left) {
            *acc += s;
        }
        for (acc, s) in self.right.iter_mut().zip(&self.processed_right) {
            *acc += s;
        }

        interlace(&self.left, &self.right, output);

        // Takes effect from the next callback.
        let entered = self.trajectory.tick();
        self.push_pose();

        self.status.record_callback(status);
        self.status.record_trajectory(&self.trajectory, entered);
    }

    /// Let the spatializer resize for a newly activated configuration.
    pub fn prepare(&mut self) {
        self.spatializer.prepare();
    }

    /// Return the moving source to its initial pose, transverse phase.
    pub fn reset_trajectory(&mut self) {
        self.trajectory.reset();
        self.push_pose();
        self.status.record_trajectory(&self.trajectory, None);
    }

    pub fn trajectory(&self) -> &TrajectoryGenerator {
        &self.trajectory
    }

    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    pub fn moving_source(&self) -> Option<SourceId> {
        self.moving
    }

    pub fn spatializer(&self) -> &dyn Spatializer {
        self.spatializer.as_ref()
    }

    pub fn status(&self) -> &Arc<PipelineStatus> {
        &self.status
    }
}

/// The pipeline shared between the control side and the render callback.
///
/// The callback never waits for the lock: when the control side holds it the
/// buffer is rendered as silence and counted as a lock miss.
#[derive(Clone)]
pub struct SharedPipeline {
    inner: Arc<Mutex<RenderPipeline>>,
    status: Arc<PipelineStatus>,
}

impl SharedPipeline {
    pub fn new(pipeline: RenderPipeline) -> Self {
        let status = Arc::clone(pipeline.status());
        Self {
            inner: Arc::new(Mutex::new(pipeline)),
            status,
        }
    }

    pub fn status(&self) -> Arc<PipelineStatus> {
        Arc::clone(&self.status)
    }

    /// Render callback to hand to a driver.
    pub fn callback(&self) -> RenderCallback {
        let inner = Arc::clone(&self.inner);
        let status = Arc::clone(&self.status);
        Box::new(move |output, stream_status| match inner.try_lock() {
            Ok(mut pipeline) => pipeline.render(output, stream_status),
            Err(TryLockError::Poisoned(poisoned)) => {
                poisoned.into_inner().render(output, stream_status)
            }
            Err(TryLockError::WouldBlock) => {
                output.fill(0.0);
                status.record_lock_miss();
            }
        })
    }

    /// Run `f` with exclusive access. Only call while the stream is stopped.
    pub fn with<R>(&self, f: impl FnOnce(&mut RenderPipeline) -> R) -> R {
        let mut pipeline = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut pipeline)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::trajectory::SourcePose;
    use crate::spatial::{MockSpatializer, PanningSpatializer, Vector3};
    use mockall::predicate::*;
    use mockall::Sequence;

    const FRAME: usize = 4;

    fn trajectory() -> TrajectoryGenerator {
        TrajectoryGenerator::new(SourcePose::new(0.0, 0.0, 2.0), 0.1)
    }

    #[test]
    fn interlace_alternates_channels() {
        let mut out = [0.0; 4];
        interlace(&[1.0, 2.0], &[3.0, 4.0], &mut out);
        assert_eq!(out, [1.0, 3.0, 2.0, 4.0]);
    }

    #[test]
    fn interlace_zero_fills_missing_samples() {
        let mut out = [9.0; 6];
        interlace(&[1.0, 2.0], &[3.0, 4.0], &mut out);
        assert_eq!(out, [1.0, 3.0, 2.0, 4.0, 0.0, 0.0]);

        let mut short = [9.0; 3];
        interlace(&[1.0, 2.0], &[3.0, 4.0], &mut short);
        assert_eq!(short, [1.0, 3.0, 2.0]);
    }

    #[test]
    fn render_feeds_spatializer_then_moves_source() {
        let mut spatializer = MockSpatializer::new();
        let mut seq = Sequence::new();

        spatializer
            .expect_listener_transform()
            .returning(Transform::new);
        spatializer
            .expect_add_source()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| SourceId(0));
        spatializer
            .expect_set_source_frame()
            .withf(|id, frame| *id == SourceId(0) && *frame == [1.0, 2.0, 3.0, 0.0])
            .times(1)
            .in_sequence(&mut seq)
            .return_const(());
        spatializer
            .expect_process()
            .times(1)
            .in_sequence(&mut seq)
            .return_const(());
        spatializer
            .expect_processed_buffers()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|left, right| {
                left.copy_from_slice(&[0.1, 0.2, 0.3, 0.4]);
                right.copy_from_slice(&[0.5, 0.6, 0.7, 0.8]);
            });
        spatializer
            .expect_set_source_transform()
            .with(eq(SourceId(0)), always())
            .times(1)
            .in_sequence(&mut seq)
            .return_const(());

        let status = Arc::new(PipelineStatus::new());
        let mut pipeline =
            RenderPipeline::new(FRAME, Box::new(spatializer), trajectory(), Arc::clone(&status));
        pipeline.add_moving_source(SampleReservoir::new(vec![1.0, 2.0, 3.0]));

        let mut out = [0.0; FRAME * 2];
        pipeline.render(&mut out, StreamStatus::Ok);
        assert_eq!(out, [0.1, 0.5, 0.2, 0.6, 0.3, 0.7, 0.4, 0.8]);
        assert!((pipeline.trajectory().pose().azimuth - 0.1).abs() < 1e-9);
        assert_eq!(status.snapshot().callbacks, 1);
    }

    #[test]
    fn every_source_advances_once_per_callback() {
        let mut spatializer = MockSpatializer::new();
        let mut next_id = 0;
        spatializer
            .expect_listener_transform()
            .returning(Transform::new);
        spatializer.expect_add_source().times(2).returning(move |_| {
            next_id += 1;
            SourceId(next_id - 1)
        });
        for (id, frame) in [
            (0, [1.0, 2.0, 3.0, 4.0]),
            (0, [5.0, 6.0, 7.0, 8.0]),
            (1, [-1.0, -2.0, -3.0, -4.0]),
            (1, [-5.0, -6.0, 0.0, 0.0]),
        ] {
            spatializer
                .expect_set_source_frame()
                .withf(move |i, f| *i == SourceId(id) && *f == frame)
                .times(1)
                .return_const(());
        }
        spatializer.expect_process().times(2).return_const(());
        spatializer
            .expect_processed_buffers()
            .times(2)
            .returning(|left, right| {
                left.fill(0.0);
                right.fill(0.0);
            });
        spatializer
            .expect_set_source_transform()
            .with(eq(SourceId(1)), always())
            .times(2)
            .return_const(());

        let mut pipeline = RenderPipeline::new(
            FRAME,
            Box::new(spatializer),
            trajectory(),
            Arc::new(PipelineStatus::new()),
        );
        let fixed = Transform::new().with_position(Vector3::new(0.0, 2.0, 0.0));
        pipeline.add_source(SampleReservoir::new((1..=8).map(|x| x as f32).collect()), fixed);
        pipeline.add_moving_source(SampleReservoir::new(
            (1..=6).map(|x| -(x as f32)).collect(),
        ));

        let mut out = [0.0; FRAME * 2];
        pipeline.render(&mut out, StreamStatus::Ok);
        pipeline.render(&mut out, StreamStatus::Ok);
    }

    #[test]
    fn static_and_moving_sources_are_summed() {
        let fixed = Transform::new().with_position(Vector3::new(0.0, 2.0, 0.0));
        let still: Vec<f32> = (0..16).map(|x| 0.05 * x as f32).collect();
        let moving: Vec<f32> = (0..16).map(|x| -0.02 * x as f32).collect();

        let render = |with_still: bool, with_moving: bool| {
            let mut pipeline = RenderPipeline::new(
                FRAME,
                Box::new(PanningSpatializer::new(FRAME)),
                trajectory(),
                Arc::new(PipelineStatus::new()),
            );
            let reservoir = |samples: &[f32], enabled: bool| {
                SampleReservoir::new(if enabled { samples.to_vec() } else { Vec::new() })
            };
            pipeline.add_source(reservoir(&still, with_still), fixed);
            pipeline.add_moving_source(reservoir(&moving, with_moving));

            let mut all = Vec::new();
            let mut out = [0.0; FRAME * 2];
            for _ in 0..3 {
                pipeline.render(&mut out, StreamStatus::Ok);
                all.extend_from_slice(&out);
            }
            all
        };

        let both = render(true, true);
        let still_only = render(true, false);
        let moving_only = render(false, true);
        assert!(still_only.iter().any(|&x| x != 0.0));
        assert!(moving_only.iter().any(|&x| x != 0.0));
        for ((b, s), m) in both.iter().zip(&still_only).zip(&moving_only) {
            assert!((b - (s + m)).abs() < 1e-6);
        }
    }

    #[test]
    fn moving_source_follows_trajectory() {
        let status = Arc::new(PipelineStatus::new());
        let mut pipeline = RenderPipeline::new(
            FRAME,
            Box::new(PanningSpatializer::new(FRAME)),
            TrajectoryGenerator::new(SourcePose::new(0.0, 0.0, 2.0), 90.0),
            status,
        );
        let id = pipeline.add_moving_source(SampleReservoir::new(vec![0.5; 16]));
        let start = pipeline.spatializer().source_transform(id).unwrap().position();
        assert!((start.x - 2.0).abs() < 1e-6);

        let mut out = [0.0; FRAME * 2];
        pipeline.render(&mut out, StreamStatus::Ok);
        let moved = pipeline.spatializer().source_transform(id).unwrap().position();
        assert!(moved.x.abs() < 1e-6 && (moved.y - 2.0).abs() < 1e-6);

        pipeline.reset_trajectory();
        let back = pipeline.spatializer().source_transform(id).unwrap().position();
        assert!((back - Vector3::new(2.0, 0.0, 0.0)).length() < 1e-6);
    }

    #[test]
    fn status_counts_xruns_and_phase_entries() {
        let status = Arc::new(PipelineStatus::new());
        let mut pipeline = RenderPipeline::new(
            FRAME,
            Box::new(PanningSpatializer::new(FRAME)),
            trajectory(),
            Arc::clone(&status),
        );
        pipeline.add_moving_source(SampleReservoir::new(vec![0.5; 16]));

        let mut out = [0.0; FRAME * 2];
        pipeline.render(&mut out, StreamStatus::Xrun);
        pipeline.render(&mut out, StreamStatus::Ok);

        let snapshot = status.snapshot();
        assert_eq!(snapshot.callbacks, 2);
        assert_eq!(snapshot.xruns, 1);
        assert_eq!(snapshot.phase, Some(TrajectoryPhase::Transverse));
        assert_eq!(status.take_entered_phase(), Some(TrajectoryPhase::Transverse));
        assert_eq!(status.take_entered_phase(), None);
    }

    #[test]
    fn contended_callback_renders_silence() {
        let status = Arc::new(PipelineStatus::new());
        let shared = SharedPipeline::new(RenderPipeline::new(
            FRAME,
            Box::new(PanningSpatializer::new(FRAME)),
            trajectory(),
            status,
        ));
        shared.with(|p| p.add_moving_source(SampleReservoir::new(vec![1.0; 16])));

        let mut callback = shared.callback();
        let mut out = [9.0; FRAME * 2];
        shared.with(|_| callback(&mut out, StreamStatus::Ok));
        assert_eq!(out, [0.0; FRAME * 2]);
        assert_eq!(shared.status().snapshot().lock_misses, 1);

        callback(&mut out, StreamStatus::Ok);
        assert!(out.iter().any(|&x| x != 0.0));
        assert_eq!(shared.status().snapshot().callbacks, 1);
    }
}
