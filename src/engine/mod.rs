//! Speech engine abstraction
//!
//! The gateway treats transcription as a replaceable, stateless black box
//! behind the `SpeechEngine` trait. One implementation ships in this crate
//! (`MockEngine`); a real model plugs in at the same seam, performing any
//! CPU-bound offloading (`spawn_blocking` etc.) inside its own impl.

mod mock;

use anyhow::Result;
use async_trait::async_trait;

pub use mock::{MockEngine, TextGenerator};

/// A pluggable function from audio to text.
#[async_trait]
pub trait SpeechEngine: Send + Sync {
    /// Transcribe one chunk of speech audio.
    async fn transcribe_chunk(&self, audio: &[u8]) -> Result<String>;

    /// Produce any remaining text at an utterance boundary.
    async fn finalize(&self) -> Result<String>;
}
