use log::warn;

/// A decoded mono recording handed out one fixed-size frame at a time.
///
/// Frames follow each other without gaps. A frame that runs past the end is
/// padded with silence and the next one starts again at sample 0.
#[derive(Debug, Clone)]
pub struct SampleReservoir {
    samples: Vec<f32>,
    // Where the next frame starts, before wrapping.
    next_start: usize,
    read_cursor: usize,
    frame_end: usize,
}

impl SampleReservoir {
    pub fn new(samples: Vec<f32>) -> Self {
        if samples.is_empty() {
            warn!("Source recording is empty; it will play silence");
        }
        Self {
            samples,
            next_start: 0,
            read_cursor: 0,
            frame_end: 0,
        }
    }

    /// Fill `out` with the next frame.
    pub fn next_frame(&mut self, out: &mut [f32]) {
        if out.is_empty() {
            return;
        }

        let start = if self.next_start >= self.samples.len() {
            0
        } else {
            self.next_start
        };

        let available = self.samples.len().saturating_sub(start).min(out.len());
        out[..available].copy_from_slice(&self.samples[start..start + available]);
        out[available..].fill(0.0);

        self.read_cursor = start;
        self.frame_end = start + out.len() - 1;
        self.next_start = self.frame_end + 1;
    }

    /// First sample position of the last frame.
    pub fn read_cursor(&self) -> usize {
        self.read_cursor
    }

    /// Last sample position of the last frame. May lie past the recording.
    pub fn frame_end(&self) -> usize {
        self.frame_end
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}
