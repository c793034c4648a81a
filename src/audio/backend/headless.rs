//! Real-time renderer with no audio device.
//!
//! Pulls blocks from the [`SoftBackend`] at wall-clock pace and discards them,
//! so voices drain exactly as they would on hardware.

use std::{
    sync::Arc,
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use tracing::{debug, info};

use super::SoftBackend;
use crate::{
    audio::constants::{HEADLESS_BLOCK_MS, MIXER_CHANNELS},
    common::{
        errors::{AudioError, AudioResult},
        flag::AtomicFlag,
    },
};

pub struct HeadlessOutput {
    stop: Arc<AtomicFlag>,
    thread: Option<JoinHandle<()>>,
}

impl HeadlessOutput {
    pub fn start(backend: Arc<SoftBackend>) -> AudioResult<Self> {
        let stop = Arc::new(AtomicFlag::new());
        let frames = (backend.output_rate() as u64 * HEADLESS_BLOCK_MS / 1000).max(1) as usize;
        let block = Duration::from_millis(HEADLESS_BLOCK_MS);

        let thread = thread::Builder::new()
            .name("audio-headless".into())
            .spawn({
                let stop = stop.clone();
                move || {
                    let mut out = vec![0.0f32; frames * MIXER_CHANNELS];
                    let mut next = Instant::now();
                    while !stop.is_set() {
                        backend.render(&mut out);
                        next += block;
                        let now = Instant::now();
                        if next > now {
                            thread::sleep(next - now);
                        } else {
                            next = now;
                        }
                    }
                    debug!("headless renderer exited");
                }
            })
            .map_err(|source| AudioError::Thread {
                name: "audio-headless".into(),
                source,
            })?;

        info!(
            "headless output running ({} frames per {}ms block)",
            frames, HEADLESS_BLOCK_MS
        );

        Ok(Self {
            stop,
            thread: Some(thread),
        })
    }
}

impl Drop for HeadlessOutput {
    fn drop(&mut self) {
        self.stop.set();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::backend::{AudioBackend, PcmBuffer, PcmData, PcmFormat, SampleFormat, VoiceState};

    #[test]
    fn short_buffer_drains_in_real_time() {
        let backend = Arc::new(SoftBackend::new(8_000, 4));
        let voice = backend.create_voice().unwrap();
        voice.queue_buffer(PcmBuffer {
            id: 0,
            format: PcmFormat::new(SampleFormat::I16, 1, 8_000),
            data: PcmData::I16(vec![0; 400]),
        });
        voice.play();

        let _output = HeadlessOutput::start(backend.clone()).unwrap();
        let deadline = Instant::now() + Duration::from_secs(2);
        while voice.state() == VoiceState::Playing && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(voice.state(), VoiceState::Stopped);
    }
}
