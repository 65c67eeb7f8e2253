use super::vad::EnergyVad;
use tracing::debug;

/// Configuration for the endpoint detector.
#[derive(Debug, Clone)]
pub struct EndpointConfig {
    /// Sample rate of incoming PCM audio.
    pub sample_rate: u32,
    /// VAD frame duration in milliseconds.
    pub frame_ms: u32,
    /// Normalized RMS speech threshold.
    pub vad_threshold: f32,
    /// Hard bound on the internal frame buffer.
    pub max_buffer_bytes: usize,
    /// Silence duration (ms) that ends an utterance.
    pub endpointing_ms: f64,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16000,
            frame_ms: 20,
            vad_threshold: 0.01,
            max_buffer_bytes: 32 * 1024,
            endpointing_ms: 300.0,
        }
    }
}

/// Utterance boundary detection for one streaming connection.
///
/// Accumulates incoming audio in a bounded buffer until a full VAD frame is
/// available, classifies the most recent complete frame, and tracks how long
/// the stream has been silent. Once accumulated silence reaches the
/// endpointing threshold, `should_finalize` stays true until the caller
/// consumes the boundary and calls `reset`.
#[derive(Debug)]
pub struct EndpointDetector {
    vad: EnergyVad,
    frame_bytes: usize,
    max_buffer_bytes: usize,
    endpointing_ms: f64,
    buffer: Vec<u8>,
    silence_ms: f64,
    speech_bytes: u64,
}

impl EndpointDetector {
    pub fn new(config: &EndpointConfig) -> Self {
        // 16-bit samples: 2 bytes each
        let samples_per_frame = config.sample_rate * config.frame_ms / 1000;
        let frame_bytes = samples_per_frame as usize * 2;

        Self {
            vad: EnergyVad::new(config.vad_threshold),
            frame_bytes,
            max_buffer_bytes: config.max_buffer_bytes.max(frame_bytes),
            endpointing_ms: config.endpointing_ms,
            buffer: Vec::new(),
            silence_ms: 0.0,
            speech_bytes: 0,
        }
    }

    /// Consume one chunk of audio and classify it as speech or silence.
    ///
    /// With less than one full frame buffered the chunk is assumed to be
    /// speech rather than dropped. A speech classification zeroes the
    /// accumulated silence duration.
    pub fn accept(&mut self, chunk: &[u8]) -> bool {
        if self.buffer.len() + chunk.len() > self.max_buffer_bytes {
            // Overloaded: keep only the most recent half of capacity. Lossy
            // on purpose; old audio is useless for classifying the present.
            let keep = self.max_buffer_bytes / 2;
            if self.buffer.len() > keep {
                let dropped = self.buffer.len() - keep;
                self.buffer.drain(..dropped);
                debug!("detector buffer over capacity, dropped oldest {dropped} bytes");
            }
        }
        self.buffer.extend_from_slice(chunk);
        // A single chunk larger than the bound still lands here oversized.
        if self.buffer.len() > self.max_buffer_bytes {
            let excess = self.buffer.len() - self.max_buffer_bytes;
            self.buffer.drain(..excess);
        }

        if self.buffer.len() < self.frame_bytes {
            self.speech_bytes += chunk.len() as u64;
            self.silence_ms = 0.0;
            return true;
        }

        let frame = &self.buffer[self.buffer.len() - self.frame_bytes..];
        let speech = self.vad.is_speech(frame);
        if speech {
            self.speech_bytes += chunk.len() as u64;
            self.silence_ms = 0.0;
        }
        speech
    }

    /// Accumulate silence duration since the last speech frame.
    pub fn silence_elapsed(&mut self, ms: f64) {
        self.silence_ms += ms;
    }

    /// True once accumulated silence reaches the endpointing threshold.
    /// Remains true until `reset` is called.
    pub fn should_finalize(&self) -> bool {
        self.silence_ms >= self.endpointing_ms
    }

    /// Clear the buffer and all duration counters. Called after every
    /// finalized utterance and on session close.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.silence_ms = 0.0;
        self.speech_bytes = 0;
    }

    pub fn buffer_len(&self) -> usize {
        self.buffer.len()
    }

    pub fn frame_bytes(&self) -> usize {
        self.frame_bytes
    }

    pub fn silence_ms(&self) -> f64 {
        self.silence_ms
    }

    /// Bytes of speech audio accepted since the last reset.
    pub fn speech_bytes(&self) -> u64 {
        self.speech_bytes
    }
}
