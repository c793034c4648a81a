//! Central constants for the audio runtime.
//!
//! Timing and sizing numbers shared by streams, channels, the watcher and the
//! software mixer live here so they stay consistent.

use std::time::Duration;

// ── Polling ──────────────────────────────────────────────────────────────────

/// Polling interval of every audio worker (stream, fades, watcher), in ms.
pub const AUDIO_SLEEP_MS: u64 = 10;

pub const AUDIO_SLEEP: Duration = Duration::from_millis(AUDIO_SLEEP_MS);

// ── Streams ──────────────────────────────────────────────────────────────────

/// Staging buffers kept in flight per stream.
pub const STREAM_BUFS: usize = 3;

/// Size of one staging buffer in bytes of decoded PCM.
pub const STREAM_BUF_SIZE: usize = 32_768;

// ── Channel volume model ─────────────────────────────────────────────────────

/// Ceiling applied on top of the product of a channel's volume factors.
pub const VOLUME_CEILING: f32 = 0.8;

/// Fade-in length used when playback starts at a non-zero position.
pub const FADE_IN_MS: u64 = 1_000;

// ── Script-facing ranges ─────────────────────────────────────────────────────

pub const VOLUME_MIN: i32 = 0;
pub const VOLUME_MAX: i32 = 100;
pub const PITCH_MIN: i32 = 50;
pub const PITCH_MAX: i32 = 150;

/// Script track value meaning "every BGM track".
pub const TRACK_ALL: i32 = -127;

// ── ME ducking ───────────────────────────────────────────────────────────────

/// Time the watcher takes to duck BGM once an ME starts.
pub const ME_DUCK_FADE_OUT_MS: u64 = 200;

/// Time the watcher takes to bring BGM back after an ME ends.
pub const ME_DUCK_FADE_IN_MS: u64 = 1_000;

/// Per-tick change of the External factor while ducking.
pub const ME_FADE_OUT_STEP: f32 = 1.0 / (ME_DUCK_FADE_OUT_MS / AUDIO_SLEEP_MS) as f32;

/// Per-tick change of the External factor while restoring.
pub const ME_FADE_IN_STEP: f32 = 1.0 / (ME_DUCK_FADE_IN_MS / AUDIO_SLEEP_MS) as f32;

// ── Software mixer ───────────────────────────────────────────────────────────

/// Output channel count of the software mixer (interleaved stereo).
pub const MIXER_CHANNELS: usize = 2;

/// Frames rendered per headless tick.
pub const HEADLESS_BLOCK_MS: u64 = 10;
