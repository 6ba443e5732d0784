use super::{
    AudioDevice, AudioDriver, DriverError, DriverStream, RenderCallback, StreamParams,
    StreamStatus,
};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Default)]
struct OfflineState {
    callback: Option<RenderCallback>,
    running: bool,
    xrun: bool,
}

/// Driver without hardware: the caller pulls each buffer with
/// [`OfflineDriver::render_block`]. Clones share the same stream.
#[derive(Clone, Default)]
pub struct OfflineDriver {
    state: Arc<Mutex<OfflineState>>,
}

impl OfflineDriver {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, OfflineState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run one callback into `out` if the stream is started. A stopped or
    /// closed stream leaves silence and returns `false`.
    pub fn render_block(&self, out: &mut [f32]) -> bool {
        let mut state = self.lock();
        if !state.running {
            out.fill(0.0);
            return false;
        }
        let status = if std::mem::take(&mut state.xrun) {
            StreamStatus::Xrun
        } else {
            StreamStatus::Ok
        };
        match state.callback.as_mut() {
            Some(callback) => {
                callback(out, status);
                true
            }
            None => {
                out.fill(0.0);
                false
            }
        }
    }

    /// Flag an overrun/underrun for the next callback.
    pub fn inject_xrun(&self) {
        self.lock().xrun = true;
    }

    pub fn is_running(&self) -> bool {
        self.lock().running
    }
}

impl AudioDriver for OfflineDriver {
    type Stream = OfflineStream;

    fn output_devices(&self) -> Result<Vec<AudioDevice>, DriverError> {
        Ok(vec![AudioDevice {
            index: 0,
            name: "offline".to_string(),
            is_default: true,
        }])
    }

    fn open_stream(
        &self,
        params: &StreamParams,
        callback: RenderCallback,
    ) -> Result<OfflineStream, DriverError> {
        if params.frame_size == 0 {
            return Err(DriverError::InvalidFrameSize(0));
        }
        let mut state = self.lock();
        if state.callback.is_some() {
            return Err(DriverError::AlreadyOpen);
        }
        state.callback = Some(callback);
        state.running = false;
        Ok(OfflineStream {
            driver: self.clone(),
        })
    }
}

pub struct OfflineStream {
    driver: OfflineDriver,
}

impl DriverStream for OfflineStream {
    fn start(&mut self) -> Result<(), DriverError> {
        self.driver.lock().running = true;
        Ok(())
    }

    fn stop(&mut self) -> Result<(), DriverError> {
        // Waits for a callback in progress.
        self.driver.lock().running = false;
        Ok(())
    }
}

impl Drop for OfflineStream {
    fn drop(&mut self) {
        let mut state = self.driver.lock();
        state.running = false;
        state.callback = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> StreamParams {
        StreamParams {
            device: None,
            sample_rate: 48000,
            frame_size: 2,
        }
    }

    fn counting_callback() -> RenderCallback {
        let mut calls = 0.0;
        Box::new(move |out, status| {
            calls += 1.0;
            let value = if status == StreamStatus::Xrun { -calls } else { calls };
            out.fill(value);
        })
    }

    #[test]
    fn only_started_streams_render() {
        let driver = OfflineDriver::new();
        let mut stream = driver.open_stream(&params(), counting_callback()).unwrap();
        let mut out = [9.0; 4];

        assert!(!driver.render_block(&mut out));
        assert_eq!(out, [0.0; 4]);

        stream.start().unwrap();
        assert!(driver.render_block(&mut out));
        assert_eq!(out, [1.0; 4]);

        stream.stop().unwrap();
        assert!(!driver.render_block(&mut out));

        drop(stream);
        assert!(!driver.is_running());
        assert!(driver.open_stream(&params(), counting_callback()).is_ok());
    }

    #[test]
    fn second_open_is_rejected() {
        let driver = OfflineDriver::new();
        let _stream = driver.open_stream(&params(), counting_callback()).unwrap();
        assert!(matches!(
            driver.open_stream(&params(), counting_callback()),
            Err(DriverError::AlreadyOpen)
        ));
    }

    #[test]
    fn injected_xrun_reaches_one_callback() {
        let driver = OfflineDriver::new();
        let mut stream = driver.open_stream(&params(), counting_callback()).unwrap();
        stream.start().unwrap();

        let mut out = [0.0; 4];
        driver.inject_xrun();
        driver.render_block(&mut out);
        assert_eq!(out[0], -1.0);
        driver.render_block(&mut out);
        assert_eq!(out[0], 2.0);
    }
}
