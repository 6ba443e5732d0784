use super::driver::{AudioDriver, DriverError, DriverStream, RenderCallback, StreamParams};
use log::{debug, info};

/// Owns the output stream: opened once, then started and stopped around
/// each test run.
pub struct StreamController<D: AudioDriver> {
    driver: D,
    params: StreamParams,
    stream: Option<D::Stream>,
    running: bool,
}

impl<D: AudioDriver> StreamController<D> {
    pub fn new(driver: D, params: StreamParams) -> Self {
        Self {
            driver,
            params,
            stream: None,
            running: false,
        }
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub fn params(&self) -> &StreamParams {
        &self.params
    }

    pub fn open(&mut self, callback: RenderCallback) -> Result<(), DriverError> {
        if self.stream.is_some() {
            return Err(DriverError::AlreadyOpen);
        }
        self.stream = Some(self.driver.open_stream(&self.params, callback)?);
        self.running = false;
        debug!("Stream opened");
        Ok(())
    }

    pub fn start(&mut self) -> Result<(), DriverError> {
        let stream = self.stream.as_mut().ok_or(DriverError::NotOpen)?;
        if !self.running {
            stream.start()?;
            self.running = true;
            info!("Audio stream started");
        }
        Ok(())
    }

    pub fn stop(&mut self) -> Result<(), DriverError> {
        let stream = self.stream.as_mut().ok_or(DriverError::NotOpen)?;
        if self.running {
            stream.stop()?;
            self.running = false;
            info!("Audio stream stopped");
        }
        Ok(())
    }

    /// Stop the stream, run `f`, and restart it if it was running.
    pub fn with_stopped<R>(&mut self, f: impl FnOnce() -> R) -> Result<R, DriverError> {
        let was_running = self.running;
        self.stop()?;
        let result = f();
        if was_running {
            self.start()?;
        }
        Ok(result)
    }

    pub fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            if self.running {
                let _ = stream.stop();
            }
            self.running = false;
            debug!("Stream closed");
        }
    }

    pub fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    pub fn is_running(&self) -> bool {
        self.running
    }
}

impl<D: AudioDriver> Drop for StreamController<D> {
    fn drop(&mut self) {
        self.close();
    }
}
