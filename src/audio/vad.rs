/// Energy-based voice activity detection.
///
/// Classifies a frame of 16-bit little-endian PCM as speech when its RMS
/// level crosses a normalized threshold. Stateless; per-connection state
/// (buffering, silence tracking) lives in `EndpointDetector`.
#[derive(Debug, Clone)]
pub struct EnergyVad {
    threshold: f32,
}

impl EnergyVad {
    pub fn new(threshold: f32) -> Self {
        Self { threshold }
    }

    /// True when the frame's RMS level reaches the speech threshold.
    pub fn is_speech(&self, frame: &[u8]) -> bool {
        Self::level(frame) >= self.threshold
    }

    /// RMS level of a frame, normalized to 0.0..=1.0.
    pub fn level(frame: &[u8]) -> f32 {
        let mut sum = 0.0f64;
        let mut count = 0usize;

        for pair in frame.chunks_exact(2) {
            let sample = i16::from_le_bytes([pair[0], pair[1]]) as f64 / 32768.0;
            sum += sample * sample;
            count += 1;
        }

        if count == 0 {
            return 0.0;
        }
        (sum / count as f64).sqrt() as f32
    }
}
