//! Render the trajectory to a WAV file instead of the sound card.

use super::commands::TestMode;
use super::config::Config;
use super::session::{Session, SessionError};
use crate::audio::driver::CHANNELS;
use crate::audio::wav::StereoWriter;
use crate::audio::{OfflineDriver, StatusSnapshot};
use log::info;
use std::path::Path;

/// Longest render accepted, in seconds.
pub const MAX_RENDER_SECONDS: f32 = 3600.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderSummary {
    pub blocks: usize,
    pub frames: usize,
    pub status: StatusSnapshot,
}

/// Run the online-interpolation test for `seconds` through the offline
/// driver and write the stereo output to `path`. Blocks go to the file as
/// they are rendered.
pub fn render_to_wav(
    config: Config,
    path: &Path,
    seconds: f32,
) -> Result<RenderSummary, SessionError> {
    if !(seconds.is_finite() && (0.0..=MAX_RENDER_SECONDS).contains(&seconds)) {
        return Err(SessionError::InvalidDuration {
            seconds,
            max: MAX_RENDER_SECONDS,
        });
    }

    let sample_rate = config.audio.sample_rate;
    let frame_size = config.audio.buffer_size;
    let driver = OfflineDriver::new();
    let mut session = Session::new(config, driver.clone())?;

    let total_frames = (seconds * sample_rate as f32).ceil() as usize;
    let blocks = total_frames.div_ceil(frame_size);
    let mut block = vec![0.0; frame_size * CHANNELS];
    let mut writer = StereoWriter::create(path, sample_rate)?;

    session.start_test(TestMode::Online)?;
    for _ in 0..blocks {
        driver.render_block(&mut block);
        writer.write(&block)?;
    }
    session.stop_test()?;
    session.close();
    writer.finalize()?;

    let frames = blocks * frame_size;
    let status = session.status().snapshot();
    info!(
        "Rendered {} frames to {} ({} callbacks)",
        frames,
        path.display(),
        status.callbacks
    );

    Ok(RenderSummary {
        blocks,
        frames,
        status,
    })
}
