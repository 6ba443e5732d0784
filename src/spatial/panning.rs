use super::{SourceId, SourceSlot, Spatializer, Transform};

/// Equal-power stereo panning with inverse-distance attenuation.
///
/// Needs no HRTF data, so it is the fallback listener model.
pub struct PanningSpatializer {
    frame_size: usize,
    listener: Transform,
    sources: Vec<SourceSlot>,
    left: Vec<f32>,
    right: Vec<f32>,
}

impl PanningSpatializer {
    pub fn new(frame_size: usize) -> Self {
        Self {
            frame_size,
            listener: Transform::new(),
            sources: Vec::new(),
            left: vec![0.0; frame_size],
            right: vec![0.0; frame_size],
        }
    }
}

/// Left/right gains for a pan value between -1.0 (full left) and 1.0 (full right).
fn pan_gains(pan: f32) -> (f32, f32) {
    let angle = (pan.clamp(-1.0, 1.0) + 1.0) * std::f32::consts::FRAC_PI_4;
    (angle.cos(), angle.sin())
}

impl Spatializer for PanningSpatializer {
    fn add_source(&mut self, transform: Transform) -> SourceId {
        self.sources.push(SourceSlot::new(transform, self.frame_size));
        SourceId(self.sources.len() - 1)
    }

    fn listener_transform(&self) -> Transform {
        self.listener
    }

    fn set_listener_transform(&mut self, transform: Transform) {
        self.listener = transform;
    }

    fn source_transform(&self, source: SourceId) -> Option<Transform> {
        self.sources.get(source.0).map(|s| s.transform)
    }

    fn set_source_transform(&mut self, source: SourceId, transform: Transform) {
        if let Some(s) = self.sources.get_mut(source.0) {
            s.transform = transform;
        }
    }

    fn set_source_frame(&mut self, source: SourceId, frame: &[f32]) {
        if let Some(s) = self.sources.get_mut(source.0) {
            s.load_frame(frame);
        }
    }

    fn process(&mut self) {
        self.left.fill(0.0);
        self.right.fill(0.0);

        for source in &self.sources {
            let offset = source.transform.position() - self.listener.position();
            let distance = offset.length();
            // +y is the listener's left.
            let pan = if distance > f32::EPSILON {
                -offset.y / distance
            } else {
                0.0
            };
            let attenuation = 1.0 / distance.max(1.0);
            let (gain_left, gain_right) = pan_gains(pan);

            for ((l, r), s) in self
                .left
                .iter_mut()
                .zip(self.right.iter_mut())
                .zip(&source.frame)
            {
                *l += s * gain_left * attenuation;
                *r += s * gain_right * attenuation;
            }
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spatial::Vector3;

    fn levels(s: &mut PanningSpatializer, id: SourceId, position: Vector3) -> (f32, f32) {
        s.set_source_transform(id, Transform::new().with_position(position));
        s.set_source_frame(id, &[0.5; 16]);
        s.process();
        let mut left = [0.0; 16];
        let mut right = [0.0; 16];
        s.processed_buffers(&mut left, &mut right);
        (
            left.iter().map(|x| x.abs()).sum(),
            right.iter().map(|x| x.abs()).sum(),
        )
    }

    #[test]
    fn test_spatial_positioning() {
        let mut s = PanningSpatializer::new(16);
        let id = s.add_source(Transform::new());

        let (left, right) = levels(&mut s, id, Vector3::new(0.0, -1.0, 0.0));
        assert!(right > left);

        let (left, right) = levels(&mut s, id, Vector3::new(0.0, 1.0, 0.0));
        assert!(left > right);

        let (left, right) = levels(&mut s, id, Vector3::new(1.0, 0.0, 0.0));
        assert!((left - right).abs() < 1e-4);
    }

    #[test]
    fn farther_sources_are_quieter() {
        let mut s = PanningSpatializer::new(16);
        let id = s.add_source(Transform::new());
        let (near, _) = levels(&mut s, id, Vector3::new(1.0, 0.0, 0.0));
        let (far, _) = levels(&mut s, id, Vector3::new(4.0, 0.0, 0.0));
        assert!((near / far - 4.0).abs() < 1e-3);
    }
}
