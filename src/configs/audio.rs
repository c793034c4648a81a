use serde::{Deserialize, Serialize};

use crate::common::errors::AudioError;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AudioConfig {
    /// Number of simultaneous BGM tracks. Track 0 is the primary one.
    #[serde(default = "default_bgm_track_count")]
    pub bgm_track_count: usize,
    /// Voices reserved for sound effects.
    #[serde(default = "default_se_source_count")]
    pub se_source_count: usize,
    /// Upper bound for decoded sound effects kept in memory.
    #[serde(default = "default_se_cache_mb")]
    pub se_cache_mb: usize,
    #[serde(default = "default_global_volume")]
    pub bgm_volume: i32,
    #[serde(default = "default_global_volume")]
    pub sfx_volume: i32,
    #[serde(default = "default_output_rate")]
    pub output_rate: u32,
    #[serde(default = "default_max_voices")]
    pub max_voices: usize,
}

impl AudioConfig {
    pub fn validate(&self) -> Result<(), AudioError> {
        if self.bgm_track_count == 0 {
            return Err(AudioError::Config(
                "audio.bgm_track_count must be at least 1".into(),
            ));
        }
        if self.output_rate < 8_000 {
            return Err(AudioError::Config(format!(
                "audio.output_rate {} is too low",
                self.output_rate
            )));
        }
        // one voice per BGM track, BGS and ME, plus the SE pool
        let needed = self.bgm_track_count + 2 + self.se_source_count;
        if self.max_voices < needed {
            return Err(AudioError::Config(format!(
                "audio.max_voices {} is below the {} voices the mixer needs",
                self.max_voices, needed
            )));
        }
        Ok(())
    }

    pub fn se_cache_bytes(&self) -> usize {
        self.se_cache_mb * 1024 * 1024
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            bgm_track_count: default_bgm_track_count(),
            se_source_count: default_se_source_count(),
            se_cache_mb: default_se_cache_mb(),
            bgm_volume: default_global_volume(),
            sfx_volume: default_global_volume(),
            output_rate: default_output_rate(),
            max_voices: default_max_voices(),
        }
    }
}

fn default_bgm_track_count() -> usize {
    1
}

fn default_se_source_count() -> usize {
    6
}

fn default_se_cache_mb() -> usize {
    10
}

fn default_global_volume() -> i32 {
    100
}

fn default_output_rate() -> u32 {
    44_100
}

fn default_max_voices() -> usize {
    64
}
