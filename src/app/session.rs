use log::{info, warn};
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::commands::{ControlCommand, TestMode};
use super::config::{Config, ConfigError, HrtfSettings, HrtfSource, ListenerModel, SourceSettings};
use crate::audio::driver::{AudioDriver, DriverError, StreamParams};
use crate::audio::wav::{self, WavError};
use crate::audio::{
    PipelineStatus, RenderPipeline, SampleReservoir, SharedPipeline, SourcePose,
    StreamController, TrajectoryGenerator,
};
#[cfg(feature = "sofa")]
use crate::spatial::SofaReader;
use crate::spatial::{
    HrtfDataset, HrtfError, HrtfReader, HrtfSet, HrtfSpatializer, PanningSpatializer,
    SphericalHeadReader, Spatializer,
};

/// Error types for session operations
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Audio driver error: {0}")]
    Driver(#[from] DriverError),

    #[error(transparent)]
    Hrtf(#[from] HrtfError),

    #[error(transparent)]
    Wav(#[from] WavError),

    #[error("No HRTF is active")]
    NoActiveHrtf,

    #[error("Render length must be between 0 and {max} s, got {seconds}")]
    InvalidDuration { seconds: f32, max: f32 },

    #[error("SOFA support is not compiled in; rebuild with `--features sofa`")]
    SofaUnavailable,

    #[error("Failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl SessionError {
    /// Without a working stream the harness cannot continue.
    pub fn is_fatal(&self) -> bool {
        matches!(self, SessionError::Driver(_) | SessionError::Config(_))
    }
}

/// Whether the control loop keeps going after a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// HRTF loader matching the configured source.
pub fn reader_for(
    settings: &HrtfSettings,
    sample_rate: u32,
) -> Result<Box<dyn HrtfReader>, SessionError> {
    match settings.reader {
        HrtfSource::HeadModel => Ok(Box::new(SphericalHeadReader::new(sample_rate))),
        #[cfg(feature = "sofa")]
        HrtfSource::Sofa => Ok(Box::new(SofaReader::new(sample_rate))),
        #[cfg(not(feature = "sofa"))]
        HrtfSource::Sofa => Err(SessionError::SofaUnavailable),
    }
}

/// Load every file at `step` and activate the first one that loads.
/// Failures are logged and skipped. Returns how many files loaded.
fn load_hrtf_files(
    set: &mut HrtfSet,
    reader: &dyn HrtfReader,
    files: &[PathBuf],
    step: f32,
) -> usize {
    let mut first = None;
    let mut loaded = 0;
    for path in files {
        match set.load(reader, path, step) {
            Ok(index) => {
                first.get_or_insert(index);
                loaded += 1;
            }
            Err(e) => warn!("{}", e),
        }
    }

    if let Some(index) = first {
        match set.activate(index) {
            Ok(()) => info!("Active HRTF is now #{}", index),
            Err(e) => warn!("{}", e),
        }
    } else {
        warn!("No HRTF loaded at {} degrees; keeping the previous one", step);
    }
    loaded
}

/// Source material: the configured WAV, or white noise when it is unset or
/// unreadable.
fn load_source(settings: &SourceSettings, sample_rate: u32) -> Vec<f32> {
    if let Some(path) = &settings.wav_file {
        match wav::load_mono(path) {
            Ok(recording) => {
                if recording.sample_rate != sample_rate {
                    warn!(
                        "{} is sampled at {} Hz but the stream runs at {} Hz; it will play at the wrong speed",
                        path.display(),
                        recording.sample_rate,
                        sample_rate
                    );
                }
                return recording.samples;
            }
            Err(e) => warn!("{}; using white noise instead", e),
        }
    }
    info!(
        "Using {} s of white noise as source material",
        settings.noise_seconds
    );
    wav::white_noise(settings.noise_seconds, sample_rate)
}

/// One harness run: configuration, HRTFs, render pipeline and output stream.
pub struct Session<D: AudioDriver> {
    config: Config,
    hrtfs: HrtfSet,
    reader: Box<dyn HrtfReader>,
    resampling_step: f32,
    interpolation: Arc<AtomicBool>,
    pipeline: SharedPipeline,
    stream: StreamController<D>,
}

impl<D: AudioDriver> Session<D> {
    /// Build the session and open (but not start) the output stream.
    pub fn new(config: Config, driver: D) -> Result<Self, SessionError> {
        let reader = reader_for(&config.hrtf, config.audio.sample_rate)?;
        Self::with_reader(config, driver, reader)
    }

    pub fn with_reader(
        config: Config,
        driver: D,
        reader: Box<dyn HrtfReader>,
    ) -> Result<Self, SessionError> {
        config.validate()?;
        let sample_rate = config.audio.sample_rate;
        let frame_size = config.audio.buffer_size;
        let resampling_step = config.hrtf.resampling_step;

        let mut hrtfs = HrtfSet::new(sample_rate);
        load_hrtf_files(&mut hrtfs, reader.as_ref(), &config.hrtf.files, resampling_step);

        let interpolation = Arc::new(AtomicBool::new(config.hrtf.interpolation));
        let spatializer: Box<dyn Spatializer> = match config.hrtf.model {
            ListenerModel::Hrtf => {
                if hrtfs.active().is_none() {
                    warn!("No HRTF available; the listener will be silent until one loads");
                }
                Box::new(
                    HrtfSpatializer::new(frame_size, hrtfs.shared(), Arc::clone(&interpolation))
                        .with_near_field(config.hrtf.near_field),
                )
            }
            ListenerModel::Panning => Box::new(PanningSpatializer::new(frame_size)),
        };

        let source = &config.source;
        let trajectory = TrajectoryGenerator::new(
            SourcePose::new(
                source.initial_azimuth,
                source.initial_elevation,
                source.initial_distance,
            ),
            source.step_degrees,
        );
        let mut pipeline = RenderPipeline::new(
            frame_size,
            spatializer,
            trajectory,
            Arc::new(PipelineStatus::new()),
        );
        pipeline.add_moving_source(SampleReservoir::new(load_source(source, sample_rate)));
        let pipeline = SharedPipeline::new(pipeline);

        let device = Some(config.audio.output_device.clone()).filter(|d| !d.is_empty());
        let mut stream = StreamController::new(
            driver,
            StreamParams {
                device,
                sample_rate,
                frame_size,
            },
        );
        stream.open(pipeline.callback())?;

        Ok(Self {
            config,
            hrtfs,
            reader,
            resampling_step,
            interpolation,
            pipeline,
            stream,
        })
    }

    /// Reset the trajectory and start rendering. The offline test runs with
    /// interpolation off; the online test starts from the configured setting.
    pub fn start_test(&mut self, mode: TestMode) -> Result<(), SessionError> {
        self.stream.stop()?;
        self.pipeline.with(|p| p.reset_trajectory());
        let interpolation = match mode {
            TestMode::Offline => false,
            TestMode::Online => self.config.hrtf.interpolation,
        };
        self.interpolation.store(interpolation, Ordering::Release);
        self.stream.start()?;
        info!(
            "Started {} test (interpolation {})",
            mode,
            if interpolation { "on" } else { "off" }
        );
        Ok(())
    }

    pub fn stop_test(&mut self) -> Result<(), SessionError> {
        self.stream.stop()?;
        Ok(())
    }

    /// Switch run-time interpolation without stopping the stream.
    pub fn set_interpolation(&self, enabled: bool) {
        self.interpolation.store(enabled, Ordering::Release);
        info!(
            "Online interpolation {}",
            if enabled { "enabled" } else { "disabled" }
        );
    }

    /// Reload the HRTF files on a new grid while the stream is stopped, then
    /// restart the trajectory. Returns how many files loaded.
    pub fn change_resampling_step(&mut self, step: f32) -> Result<usize, SessionError> {
        if !step.is_finite() || step <= 0.0 || step > 90.0 {
            return Err(HrtfError::InvalidStep(step).into());
        }

        let Self {
            config,
            hrtfs,
            reader,
            pipeline,
            stream,
            ..
        } = self;
        let loaded = stream.with_stopped(|| {
            let loaded = load_hrtf_files(hrtfs, reader.as_ref(), &config.hrtf.files, step);
            pipeline.with(|p| {
                p.prepare();
                p.reset_trajectory();
            });
            loaded
        })?;

        self.resampling_step = step;
        info!("Resampling step set to {}", step);
        Ok(loaded)
    }

    /// Write the active dataset's grid as CSV. Returns the number of rows.
    pub fn export_grid(&self, path: &Path) -> Result<usize, SessionError> {
        let dataset = self.hrtfs.active().ok_or(SessionError::NoActiveHrtf)?;
        let io_error = |source| SessionError::Io {
            path: path.to_path_buf(),
            source,
        };
        let file = File::create(path).map_err(io_error)?;
        let rows = dataset
            .write_grid_csv(BufWriter::new(file))
            .map_err(io_error)?;
        info!(
            "Wrote {} grid orientations of '{}' to {}",
            rows,
            dataset.name(),
            path.display()
        );
        Ok(rows)
    }

    pub fn apply(&mut self, command: ControlCommand) -> Result<Flow, SessionError> {
        match command {
            ControlCommand::ExportGrid => {
                let path = self.config.hrtf.grid_csv.clone();
                self.export_grid(&path)?;
            }
            ControlCommand::StartTest(mode) => self.start_test(mode)?,
            ControlCommand::StopTest => self.stop_test()?,
            ControlCommand::SetInterpolation(enabled) => self.set_interpolation(enabled),
            ControlCommand::ChangeResamplingStep(step) => {
                self.change_resampling_step(step)?;
            }
            ControlCommand::Quit => return Ok(Flow::Quit),
        }
        Ok(Flow::Continue)
    }

    pub fn close(&mut self) {
        self.stream.close();
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn status(&self) -> Arc<PipelineStatus> {
        self.pipeline.status()
    }

    pub fn pipeline(&self) -> &SharedPipeline {
        &self.pipeline
    }

    pub fn hrtfs(&self) -> &HrtfSet {
        &self.hrtfs
    }

    pub fn active_hrtf(&self) -> Option<Arc<HrtfDataset>> {
        self.hrtfs.active()
    }

    pub fn resampling_step(&self) -> f32 {
        self.resampling_step
    }

    pub fn interpolation_enabled(&self) -> bool {
        self.interpolation.load(Ordering::Acquire)
    }

    pub fn is_running(&self) -> bool {
        self.stream.is_running()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{OfflineDriver, TrajectoryPhase};
    use crate::spatial::hrtf::MockHrtfReader;
    use mockall::predicate::*;
    use tempfile::tempdir;

    fn config() -> Config {
        let mut config = Config::default();
        config.audio.buffer_size = 64;
        config.source.noise_seconds = 0.1;
        config
    }

    fn session() -> (Session<OfflineDriver>, OfflineDriver) {
        let driver = OfflineDriver::new();
        let session = Session::new(config(), driver.clone()).unwrap();
        (session, driver)
    }

    fn pump(driver: &OfflineDriver, blocks: usize) -> Vec<f32> {
        let mut block = vec![0.0; 128];
        let mut all = Vec::new();
        for _ in 0..blocks {
            driver.render_block(&mut block);
            all.extend_from_slice(&block);
        }
        all
    }

    #[test]
    fn stream_opens_stopped_with_the_head_model_active() {
        let (session, driver) = session();
        assert!(!session.is_running());
        assert_eq!(session.hrtfs().len(), 1);
        assert_eq!(session.active_hrtf().unwrap().name(), "spherical-head");
        assert!(pump(&driver, 2).iter().all(|&x| x == 0.0));
    }

    #[test]
    fn offline_test_disables_interpolation_and_renders() {
        let (mut session, driver) = session();
        session.start_test(TestMode::Offline).unwrap();
        assert!(session.is_running());
        assert!(!session.interpolation_enabled());

        let output = pump(&driver, 8);
        assert!(output.iter().any(|&x| x != 0.0));
        assert_eq!(session.status().snapshot().callbacks, 8);

        session.apply(ControlCommand::StopTest).unwrap();
        assert!(!session.is_running());
        assert!(!driver.render_block(&mut [0.0; 128]));
    }

    #[test]
    fn online_test_restores_configured_interpolation() {
        let (mut session, _driver) = session();
        session.start_test(TestMode::Offline).unwrap();
        session.stop_test().unwrap();

        session.start_test(TestMode::Online).unwrap();
        assert!(session.interpolation_enabled());
        session.apply(ControlCommand::SetInterpolation(false)).unwrap();
        assert!(!session.interpolation_enabled());
    }

    #[test]
    fn starting_a_test_resets_the_trajectory() {
        let (mut session, driver) = session();
        session.start_test(TestMode::Online).unwrap();
        pump(&driver, 10);
        session.stop_test().unwrap();
        assert!(session.pipeline().with(|p| p.trajectory().pose().azimuth) > 0.5);

        session.start_test(TestMode::Online).unwrap();
        session.stop_test().unwrap();
        let (pose, phase) = session
            .pipeline()
            .with(|p| (p.trajectory().pose(), p.trajectory().phase()));
        assert_eq!(pose.azimuth, 0.0);
        assert_eq!(phase, TrajectoryPhase::Transverse);
    }

    #[test]
    fn resampling_step_change_appends_and_restarts() {
        let (mut session, driver) = session();
        session.start_test(TestMode::Online).unwrap();
        pump(&driver, 5);

        session
            .apply(ControlCommand::ChangeResamplingStep(30.0))
            .unwrap();
        assert_eq!(session.hrtfs().len(), 2);
        assert_eq!(session.resampling_step(), 30.0);
        assert_eq!(session.hrtfs().active_index(), Some(1));
        assert_eq!(session.active_hrtf().unwrap().step(), 30.0);
        assert!(session.is_running());
        assert_eq!(
            session.pipeline().with(|p| p.trajectory().pose().azimuth),
            0.0
        );
    }

    #[test]
    fn invalid_step_changes_nothing() {
        let (mut session, _driver) = session();
        let err = session.change_resampling_step(-2.0).unwrap_err();
        assert!(matches!(err, SessionError::Hrtf(HrtfError::InvalidStep(_))));
        assert!(!err.is_fatal());
        assert_eq!(session.hrtfs().len(), 1);
        assert_eq!(session.resampling_step(), 15.0);
    }

    #[test]
    fn mismatched_hrtf_is_skipped_without_failing() {
        let mut reader = MockHrtfReader::new();
        reader.expect_sample_rate().returning(|_| Ok(44100));
        reader.expect_read().never();

        let session =
            Session::with_reader(config(), OfflineDriver::new(), Box::new(reader)).unwrap();
        assert!(session.hrtfs().is_empty());
        assert!(session.active_hrtf().is_none());
        assert!(matches!(
            session.export_grid(Path::new("unused.csv")),
            Err(SessionError::NoActiveHrtf)
        ));
    }

    #[test]
    fn failed_reload_keeps_previous_dataset() {
        let mut reader = MockHrtfReader::new();
        reader.expect_sample_rate().returning(|_| Ok(48000));
        reader
            .expect_read()
            .with(always(), eq(15.0))
            .times(1)
            .returning(|_, step| SphericalHeadReader::new(48000).read(Path::new("first"), step));
        reader.expect_read().with(always(), eq(30.0)).returning(|path, _| {
            Err(HrtfError::Read {
                path: path.to_path_buf(),
                reason: "gone".to_string(),
            })
        });

        let mut session =
            Session::with_reader(config(), OfflineDriver::new(), Box::new(reader)).unwrap();
        assert_eq!(session.change_resampling_step(30.0).unwrap(), 0);
        assert_eq!(session.hrtfs().len(), 1);
        assert_eq!(session.active_hrtf().unwrap().name(), "first");
    }

    fn impulse_dataset(step: f32, ir_len: usize) -> Result<HrtfDataset, HrtfError> {
        HrtfDataset::from_fn("impulse", 48000, step, ir_len, |_, _, l, r| {
            l.fill(0.0);
            r.fill(0.0);
            l[ir_len - 1] = 1.0;
            r[ir_len - 1] = 1.0;
        })
    }

    #[test]
    fn reload_with_longer_responses_keeps_rendering() {
        let mut reader = MockHrtfReader::new();
        reader.expect_sample_rate().returning(|_| Ok(48000));
        reader
            .expect_read()
            .with(always(), eq(15.0))
            .returning(|_, step| impulse_dataset(step, 4));
        reader
            .expect_read()
            .with(always(), eq(30.0))
            .returning(|_, step| impulse_dataset(step, 32));

        let driver = OfflineDriver::new();
        let mut session =
            Session::with_reader(config(), driver.clone(), Box::new(reader)).unwrap();
        session.start_test(TestMode::Offline).unwrap();
        assert!(pump(&driver, 2).iter().any(|&x| x != 0.0));

        session.change_resampling_step(30.0).unwrap();
        assert_eq!(session.active_hrtf().unwrap().ir_len(), 32);
        assert!(session.is_running());
        assert!(pump(&driver, 2).iter().any(|&x| x != 0.0));
    }

    #[test]
    fn grid_export_writes_csv() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("grid.csv");
        let (session, _driver) = session();

        let rows = session.export_grid(&path).unwrap();
        assert_eq!(rows, 24 * 13);
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().next(), Some("azimuth,elevation"));
        assert_eq!(text.lines().count(), rows + 1);
    }

    #[test]
    fn quit_ends_the_loop() {
        let (mut session, _driver) = session();
        assert_eq!(session.apply(ControlCommand::Quit).unwrap(), Flow::Quit);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let mut config = config();
        config.audio.buffer_size = 0;
        let result = Session::new(config, OfflineDriver::new());
        assert!(matches!(result, Err(SessionError::Config(_))));
    }

    #[cfg(not(feature = "sofa"))]
    #[test]
    fn sofa_needs_the_feature() {
        let mut config = config();
        config.hrtf.reader = HrtfSource::Sofa;
        assert!(matches!(
            Session::new(config, OfflineDriver::new()),
            Err(SessionError::SofaUnavailable)
        ));
    }
}
