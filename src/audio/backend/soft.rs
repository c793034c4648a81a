//! In-process software mixer.
//!
//! Each voice keeps a queue of PCM buffers and a fractional read cursor into
//! the head buffer. [`SoftBackend::render`] resamples every playing voice to
//! the output rate (nearest sample, pitch multiplies the step), spreads mono
//! to stereo, applies the gain and sums the result.

use std::{
    collections::VecDeque,
    sync::{Arc, Weak},
};

use parking_lot::Mutex;
use tracing::{trace, warn};

use super::{AudioBackend, PcmBuffer, PcmFormat, SampleFormat, Voice, VoiceState};
use crate::{
    audio::constants::MIXER_CHANNELS,
    common::errors::{AudioError, AudioResult},
};

pub struct SoftBackend {
    output_rate: u32,
    max_voices: usize,
    voices: Mutex<Vec<Weak<SoftVoice>>>,
}

impl SoftBackend {
    pub fn new(output_rate: u32, max_voices: usize) -> Self {
        Self {
            output_rate,
            max_voices,
            voices: Mutex::new(Vec::new()),
        }
    }

    pub fn output_rate(&self) -> u32 {
        self.output_rate
    }

    /// Number of voices currently alive.
    pub fn voice_count(&self) -> usize {
        let mut voices = self.voices.lock();
        voices.retain(|v| v.strong_count() > 0);
        voices.len()
    }

    /// Mix every playing voice into `out` (interleaved stereo, overwritten).
    pub fn render(&self, out: &mut [f32]) {
        out.fill(0.0);

        let live: Vec<Arc<SoftVoice>> = {
            let mut voices = self.voices.lock();
            voices.retain(|v| v.strong_count() > 0);
            voices.iter().filter_map(Weak::upgrade).collect()
        };

        for voice in live {
            voice.mix_into(out, self.output_rate);
        }

        for s in out.iter_mut() {
            *s = s.clamp(-1.0, 1.0);
        }
    }
}

impl AudioBackend for SoftBackend {
    fn create_voice(&self) -> AudioResult<Arc<dyn Voice>> {
        let mut voices = self.voices.lock();
        voices.retain(|v| v.strong_count() > 0);
        if voices.len() >= self.max_voices {
            warn!("voice limit reached ({} voices)", voices.len());
            return Err(AudioError::VoiceExhausted(voices.len()));
        }

        let voice = Arc::new(SoftVoice::default());
        voices.push(Arc::downgrade(&voice));
        trace!("voice allocated ({} live)", voices.len());
        Ok(voice)
    }

    fn supports(&self, format: &PcmFormat) -> bool {
        matches!(format.sample, SampleFormat::I16 | SampleFormat::F32)
            && (1..=MIXER_CHANNELS).contains(&format.channels)
            && format.rate > 0
    }
}

#[derive(Default)]
struct SoftVoice {
    inner: Mutex<VoiceInner>,
}

struct VoiceInner {
    state: VoiceState,
    queued: VecDeque<PcmBuffer>,
    processed: VecDeque<PcmBuffer>,
    /// Read position in frames into `queued.front()`.
    cursor: f64,
    gain: f32,
    pitch: f32,
}

impl Default for VoiceInner {
    fn default() -> Self {
        Self {
            state: VoiceState::Initial,
            queued: VecDeque::new(),
            processed: VecDeque::new(),
            cursor: 0.0,
            gain: 1.0,
            pitch: 1.0,
        }
    }
}

impl VoiceInner {
    /// Retire head buffers the cursor has run past.
    fn retire_exhausted(&mut self) {
        while let Some(head) = self.queued.front() {
            let frames = head.frames() as f64;
            if self.cursor < frames {
                break;
            }
            self.cursor -= frames;
            if let Some(done) = self.queued.pop_front() {
                self.processed.push_back(done);
            }
        }
        if self.queued.is_empty() {
            self.cursor = 0.0;
        }
    }
}

impl SoftVoice {
    fn mix_into(&self, out: &mut [f32], output_rate: u32) {
        let mut inner = self.inner.lock();
        if inner.state != VoiceState::Playing {
            return;
        }

        for frame in out.chunks_exact_mut(MIXER_CHANNELS) {
            inner.retire_exhausted();
            let gain = inner.gain;
            let pitch = inner.pitch;
            let cursor = inner.cursor;

            let Some(head) = inner.queued.front() else {
                break;
            };

            let channels = head.format.channels.max(1);
            let idx = cursor as usize * channels;
            let left = head.data.sample_f32(idx);
            let right = if channels > 1 {
                head.data.sample_f32(idx + 1)
            } else {
                left
            };
            let step = head.format.rate as f64 / output_rate as f64 * pitch as f64;

            frame[0] += left * gain;
            frame[1] += right * gain;
            inner.cursor += step;
        }

        inner.retire_exhausted();
        if inner.queued.is_empty() {
            inner.state = VoiceState::Stopped;
        }
    }
}

impl Voice for SoftVoice {
    fn queue_buffer(&self, buf: PcmBuffer) {
        self.inner.lock().queued.push_back(buf);
    }

    fn unqueue_processed(&self) -> Option<PcmBuffer> {
        self.inner.lock().processed.pop_front()
    }

    fn clear_queue(&self) -> Vec<PcmBuffer> {
        let mut inner = self.inner.lock();
        inner.cursor = 0.0;
        let mut all: Vec<PcmBuffer> = inner.processed.drain(..).collect();
        all.extend(inner.queued.drain(..));
        all
    }

    fn play(&self) {
        let mut inner = self.inner.lock();
        inner.retire_exhausted();
        inner.state = if inner.queued.is_empty() {
            VoiceState::Stopped
        } else {
            VoiceState::Playing
        };
    }

    fn pause(&self) {
        let mut inner = self.inner.lock();
        if inner.state == VoiceState::Playing {
            inner.state = VoiceState::Paused;
        }
    }

    fn stop(&self) {
        let mut inner = self.inner.lock();
        inner.state = VoiceState::Stopped;
        inner.cursor = 0.0;
        let pending: Vec<PcmBuffer> = inner.queued.drain(..).collect();
        inner.processed.extend(pending);
    }

    fn state(&self) -> VoiceState {
        self.inner.lock().state
    }

    fn set_gain(&self, gain: f32) {
        self.inner.lock().gain = gain.max(0.0);
    }

    fn set_pitch(&self, pitch: f32) {
        if pitch > 0.0 {
            self.inner.lock().pitch = pitch;
        }
    }

    fn sec_offset(&self) -> f64 {
        let inner = self.inner.lock();
        let processed: f64 = inner.processed.iter().map(PcmBuffer::duration_secs).sum();
        let current = inner
            .queued
            .front()
            .map(|head| inner.cursor / head.format.rate.max(1) as f64)
            .unwrap_or(0.0);
        processed + current
    }
}
