//! Fire-and-forget sound effects.
//!
//! A fixed pool of voices plays whole decoded files. Decoded PCM is kept in
//! a byte-bounded LRU cache so repeated effects skip the decoder.

use std::{collections::HashMap, sync::Arc};

use parking_lot::Mutex;
use tracing::{debug, trace};

use super::{
    AudioContext,
    backend::{PcmBuffer, Voice, VoiceState},
    constants::{PITCH_MAX, PITCH_MIN, STREAM_BUF_SIZE, VOLUME_CEILING, VOLUME_MAX, VOLUME_MIN},
    source,
};
use crate::common::errors::AudioResult;

struct CacheEntry {
    buffer: PcmBuffer,
    last_use: u64,
}

/// Decoded sound effects, least recently used evicted first.
struct SoundCache {
    entries: HashMap<String, CacheEntry>,
    bytes: usize,
    budget: usize,
    clock: u64,
}

impl SoundCache {
    fn new(budget: usize) -> Self {
        Self {
            entries: HashMap::new(),
            bytes: 0,
            budget,
            clock: 0,
        }
    }

    fn get(&mut self, name: &str) -> Option<PcmBuffer> {
        self.clock += 1;
        let clock = self.clock;
        self.entries.get_mut(name).map(|entry| {
            entry.last_use = clock;
            entry.buffer.clone()
        })
    }

    fn insert(&mut self, name: &str, buffer: PcmBuffer) {
        let size = buffer.data.byte_len();
        if size > self.budget {
            trace!("'{}' ({} bytes) exceeds the SE cache", name, size);
            return;
        }

        while self.bytes + size > self.budget {
            let Some(oldest) = self
                .entries
                .iter()
                .min_by_key(|(_, e)| e.last_use)
                .map(|(k, _)| k.clone())
            else {
                break;
            };
            if let Some(evicted) = self.entries.remove(&oldest) {
                self.bytes -= evicted.buffer.data.byte_len();
                debug!("SE cache evicted '{}'", oldest);
            }
        }

        self.clock += 1;
        self.bytes += size;
        if let Some(old) = self.entries.insert(
            name.to_string(),
            CacheEntry {
                buffer,
                last_use: self.clock,
            },
        ) {
            self.bytes -= old.buffer.data.byte_len();
        }
    }
}

struct Slots {
    voices: Vec<Arc<dyn Voice>>,
    /// Play sequence number per voice, 0 when never used.
    started: Vec<u64>,
    seq: u64,
}

impl Slots {
    /// A voice that isn't playing, else the one started longest ago.
    fn pick(&self) -> usize {
        self.voices
            .iter()
            .position(|v| v.state() != VoiceState::Playing)
            .unwrap_or_else(|| {
                self.started
                    .iter()
                    .enumerate()
                    .min_by_key(|(_, seq)| **seq)
                    .map_or(0, |(i, _)| i)
            })
    }
}

pub struct SoundEmitter {
    ctx: AudioContext,
    slots: Mutex<Slots>,
    cache: Mutex<SoundCache>,
}

impl SoundEmitter {
    pub fn new(ctx: AudioContext, source_count: usize, cache_bytes: usize) -> AudioResult<Self> {
        let voices = (0..source_count.max(1))
            .map(|_| ctx.backend.create_voice())
            .collect::<AudioResult<Vec<_>>>()?;

        debug!(
            "SE emitter ready ({} voices, {} KiB cache)",
            voices.len(),
            cache_bytes / 1024
        );

        Ok(Self {
            slots: Mutex::new(Slots {
                started: vec![0; voices.len()],
                voices,
                seq: 0,
            }),
            cache: Mutex::new(SoundCache::new(cache_bytes)),
            ctx,
        })
    }

    /// Play `filename` at `volume` (0–100) and `pitch` (50–150).
    pub fn play(&self, filename: &str, volume: i32, pitch: i32) -> AudioResult<()> {
        let volume = volume.clamp(VOLUME_MIN, VOLUME_MAX) as f32 / 100.0;
        let pitch = pitch.clamp(PITCH_MIN, PITCH_MAX) as f32 / 100.0;

        let buffer = self.load(filename)?;

        let mut slots = self.slots.lock();
        let idx = slots.pick();
        let voice = slots.voices[idx].clone();

        voice.stop();
        voice.clear_queue();
        voice.queue_buffer(buffer);
        voice.set_gain(VOLUME_CEILING * volume);
        voice.set_pitch(pitch);
        voice.play();

        slots.seq += 1;
        slots.started[idx] = slots.seq;
        trace!("SE '{}' on voice {}", filename, idx);
        Ok(())
    }

    pub fn stop(&self) {
        let slots = self.slots.lock();
        for voice in &slots.voices {
            voice.stop();
            voice.clear_queue();
        }
    }

    pub fn playing_count(&self) -> usize {
        self.slots
            .lock()
            .voices
            .iter()
            .filter(|v| v.state() == VoiceState::Playing)
            .count()
    }

    pub fn cached_bytes(&self) -> usize {
        self.cache.lock().bytes
    }

    fn load(&self, filename: &str) -> AudioResult<PcmBuffer> {
        if let Some(hit) = self.cache.lock().get(filename) {
            return Ok(hit);
        }

        let buffer = source::decode_to_end(
            self.ctx.fs.as_ref(),
            self.ctx.backend.as_ref(),
            filename,
            STREAM_BUF_SIZE,
        )?;
        self.cache.lock().insert(filename, buffer.clone());
        Ok(buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::test_support::Fixture;

    #[test]
    fn plays_on_a_free_voice() {
        let fx = Fixture::new(&[("click", 800)]);
        let se = SoundEmitter::new(fx.context(), 2, 1 << 20).unwrap();

        se.play("click", 100, 100).unwrap();
        se.play("click", 100, 100).unwrap();
        assert_eq!(se.playing_count(), 2);

        // pool exhausted: the oldest voice is recycled
        se.play("click", 100, 100).unwrap();
        assert_eq!(se.playing_count(), 2);

        se.stop();
        assert_eq!(se.playing_count(), 0);
    }

    #[test]
    fn repeated_effect_comes_from_cache() {
        let fx = Fixture::new(&[("click", 800)]);
        let se = SoundEmitter::new(fx.context(), 2, 1 << 20).unwrap();

        se.play("click", 100, 100).unwrap();
        assert_eq!(se.cached_bytes(), 1_600);

        std::fs::remove_file(fx.dir.path().join("click.wav")).unwrap();
        se.play("click", 100, 100).unwrap();
    }

    #[test]
    fn least_recently_used_is_evicted() {
        let fx = Fixture::new(&[("a", 800), ("b", 800), ("c", 800)]);
        let se = SoundEmitter::new(fx.context(), 2, 3_500).unwrap();

        se.play("a", 100, 100).unwrap();
        se.play("b", 100, 100).unwrap();
        se.play("a", 100, 100).unwrap();
        se.play("c", 100, 100).unwrap();
        assert_eq!(se.cached_bytes(), 3_200);

        std::fs::remove_file(fx.dir.path().join("a.wav")).unwrap();
        std::fs::remove_file(fx.dir.path().join("b.wav")).unwrap();
        assert!(se.play("a", 100, 100).is_ok());
        assert!(se.play("b", 100, 100).is_err());
    }

    #[test]
    fn missing_effect_is_an_error() {
        let fx = Fixture::new(&[]);
        let se = SoundEmitter::new(fx.context(), 1, 1 << 20).unwrap();
        assert!(se.play("nothing", 100, 100).is_err());
    }
}
