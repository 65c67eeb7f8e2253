//! Speech/silence classification and utterance endpointing
//!
//! This module provides the per-connection audio path:
//! - `EnergyVad`: stateless RMS-based speech classification
//! - `EndpointDetector`: bounded frame buffering and silence-duration
//!   tracking that signals utterance boundaries

mod endpoint;
mod vad;

pub use endpoint::{EndpointConfig, EndpointDetector};
pub use vad::EnergyVad;
