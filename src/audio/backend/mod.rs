//! Playback backend: voices that accept queued PCM buffers.
//!
//! Streams and the SE emitter only see the [`AudioBackend`] / [`Voice`]
//! traits. The bundled implementation is the in-process [`SoftBackend`]
//! mixer, driven either by [`HeadlessOutput`] or, with the `device` feature,
//! by a `cpal` output stream.

pub mod headless;
pub mod pcm;
pub mod soft;

#[cfg(feature = "device")]
pub mod device;

use std::sync::Arc;

#[cfg(feature = "device")]
pub use device::DeviceOutput;
pub use headless::HeadlessOutput;
pub use pcm::{PcmBuffer, PcmData, PcmFormat, SampleFormat, VoiceState};
pub use soft::SoftBackend;

use crate::common::errors::AudioResult;

/// Factory for playback voices.
pub trait AudioBackend: Send + Sync {
    /// Allocate a new voice; fails with `VoiceExhausted` when none is left.
    fn create_voice(&self) -> AudioResult<Arc<dyn Voice>>;

    /// Whether buffers of `format` can be queued on a voice as-is.
    fn supports(&self, format: &PcmFormat) -> bool;
}

/// A single playback voice with a FIFO buffer queue.
///
/// A playing voice whose queue runs dry moves to [`VoiceState::Stopped`] on
/// its own. Buffers it has finished with are handed back through
/// [`Voice::unqueue_processed`].
pub trait Voice: Send + Sync {
    fn queue_buffer(&self, buf: PcmBuffer);

    fn unqueue_processed(&self) -> Option<PcmBuffer>;

    /// Drop everything queued (processed or not) and return the buffers.
    fn clear_queue(&self) -> Vec<PcmBuffer>;

    fn play(&self);

    fn pause(&self);

    fn stop(&self);

    fn state(&self) -> VoiceState;

    fn set_gain(&self, gain: f32);

    /// Playback-rate multiplier, `1.0` is native speed.
    fn set_pitch(&self, pitch: f32);

    /// Seconds played since the first buffer still attached to the voice.
    fn sec_offset(&self) -> f64;
}
