//! Script-facing audio API.
//!
//! [`Audio`] takes the raw integers a game script passes (volume and pitch
//! in percent, fade time in milliseconds, track `-127` for "all") and maps
//! them onto the [`Mixer`].

pub mod command;

use std::{fmt::Write as _, sync::Arc};

use thiserror::Error;
use tracing::{debug, info};

pub use command::Command;

use crate::{
    audio::{Mixer, Track},
    common::errors::AudioError,
};

#[derive(Debug, Error)]
pub enum ScriptError {
    #[error(transparent)]
    Audio(#[from] AudioError),

    #[error("unknown command '{0}'")]
    UnknownCommand(String),

    #[error("{command}: {reason}")]
    BadArgument { command: String, reason: String },

    /// Audio threads are halted; only `resume`, `status` and `quit` run.
    #[error("audio is suspended")]
    Suspended,
}

pub type ScriptResult<T> = Result<T, ScriptError>;

fn fade_ms(time: i32) -> u64 {
    time.max(0) as u64
}

#[derive(Clone)]
pub struct Audio {
    mixer: Arc<Mixer>,
}

impl Audio {
    pub fn new(mixer: Arc<Mixer>) -> Self {
        Self { mixer }
    }

    pub fn mixer(&self) -> &Arc<Mixer> {
        &self.mixer
    }

    pub fn bgm_play(
        &self,
        filename: &str,
        volume: i32,
        pitch: i32,
        pos: f64,
        track: i32,
    ) -> ScriptResult<()> {
        Ok(self
            .mixer
            .bgm_play(filename, volume, pitch, pos, Track::from_raw(track))?)
    }

    pub fn bgm_stop(&self, track: i32) -> ScriptResult<()> {
        Ok(self.mixer.bgm_stop(Track::from_raw(track))?)
    }

    pub fn bgm_fade(&self, time: i32, track: i32) -> ScriptResult<()> {
        Ok(self.mixer.bgm_fade(fade_ms(time), Track::from_raw(track))?)
    }

    pub fn bgm_volume(&self, track: i32) -> ScriptResult<i32> {
        Ok(self.mixer.bgm_volume(Track::from_raw(track))?)
    }

    pub fn bgm_set_volume(&self, volume: i32, track: i32) -> ScriptResult<()> {
        Ok(self.mixer.bgm_set_volume(volume, Track::from_raw(track))?)
    }

    /// Playback position in seconds; "all tracks" reads the primary one.
    pub fn bgm_pos(&self, track: i32) -> ScriptResult<f64> {
        let index = match Track::from_raw(track) {
            Track::Index(index) => index,
            Track::All => 0,
        };
        Ok(self.mixer.bgm_pos(index)?)
    }

    pub fn bgs_play(&self, filename: &str, volume: i32, pitch: i32, pos: f64) -> ScriptResult<()> {
        Ok(self.mixer.bgs_play(filename, volume, pitch, pos)?)
    }

    pub fn bgs_stop(&self) {
        self.mixer.bgs_stop();
    }

    pub fn bgs_fade(&self, time: i32) {
        self.mixer.bgs_fade(fade_ms(time));
    }

    pub fn bgs_pos(&self) -> f64 {
        self.mixer.bgs_pos()
    }

    pub fn me_play(&self, filename: &str, volume: i32, pitch: i32) -> ScriptResult<()> {
        Ok(self.mixer.me_play(filename, volume, pitch)?)
    }

    pub fn me_stop(&self) {
        self.mixer.me_stop();
    }

    pub fn me_fade(&self, time: i32) {
        self.mixer.me_fade(fade_ms(time));
    }

    pub fn se_play(&self, filename: &str, volume: i32, pitch: i32) -> ScriptResult<()> {
        Ok(self.mixer.se_play(filename, volume, pitch)?)
    }

    pub fn se_stop(&self) {
        self.mixer.se_stop();
    }

    pub fn reset(&self) {
        self.mixer.reset();
    }

    pub fn suspend(&self) {
        if !self.is_suspended() {
            info!("Suspending audio threads");
            self.mixer.sync_point().halt_threads();
        }
    }

    pub fn resume(&self) {
        if self.is_suspended() {
            info!("Resuming audio threads");
            self.mixer.sync_point().resume_threads();
        }
    }

    pub fn is_suspended(&self) -> bool {
        self.mixer.sync_point().is_halted()
    }

    /// One line per channel plus the ME watcher state.
    pub fn status(&self) -> String {
        let mut out = format!("watch: {:?}", self.mixer.watch_state());
        for i in 0..self.mixer.bgm_track_count() {
            if let Some(channel) = self.mixer.bgm_channel(i) {
                let _ = write!(out, "\n{}: {:?}", channel.name(), channel.state());
            }
        }
        let _ = write!(out, "\nbgs: {:?}", self.mixer.bgs_channel().state());
        let _ = write!(out, "\nme: {:?}", self.mixer.me_channel().state());
        let _ = write!(out, "\nse: {} playing", self.mixer.se().playing_count());
        out
    }

    /// Run one command. Queries return their value as text.
    ///
    /// While suspended, commands that would stop a stream are refused: the
    /// stream workers are parked and could not be joined.
    pub fn execute(&self, cmd: Command) -> ScriptResult<Option<String>> {
        if self.is_suspended()
            && !matches!(cmd, Command::Resume | Command::Status | Command::Quit)
        {
            return Err(ScriptError::Suspended);
        }
        debug!("execute {:?}", cmd);

        let reply = match cmd {
            Command::BgmPlay {
                name,
                volume,
                pitch,
                pos,
                track,
            } => {
                self.bgm_play(&name, volume, pitch, pos, track)?;
                None
            }
            Command::BgmStop { track } => {
                self.bgm_stop(track)?;
                None
            }
            Command::BgmFade { time, track } => {
                self.bgm_fade(time, track)?;
                None
            }
            Command::BgmVolume { track } => Some(self.bgm_volume(track)?.to_string()),
            Command::BgmSetVolume { volume, track } => {
                self.bgm_set_volume(volume, track)?;
                None
            }
            Command::BgmPos { track } => Some(format!("{:.3}", self.bgm_pos(track)?)),
            Command::BgsPlay {
                name,
                volume,
                pitch,
                pos,
            } => {
                self.bgs_play(&name, volume, pitch, pos)?;
                None
            }
            Command::BgsStop => {
                self.bgs_stop();
                None
            }
            Command::BgsFade { time } => {
                self.bgs_fade(time);
                None
            }
            Command::BgsPos => Some(format!("{:.3}", self.bgs_pos())),
            Command::MePlay {
                name,
                volume,
                pitch,
            } => {
                self.me_play(&name, volume, pitch)?;
                None
            }
            Command::MeStop => {
                self.me_stop();
                None
            }
            Command::MeFade { time } => {
                self.me_fade(time);
                None
            }
            Command::SePlay {
                name,
                volume,
                pitch,
            } => {
                self.se_play(&name, volume, pitch)?;
                None
            }
            Command::SeStop => {
                self.se_stop();
                None
            }
            Command::BgmGlobal(None) => Some(self.mixer.global_bgm_volume().to_string()),
            Command::BgmGlobal(Some(value)) => {
                self.mixer.set_global_bgm_volume(value);
                None
            }
            Command::SfxGlobal(None) => Some(self.mixer.global_sfx_volume().to_string()),
            Command::SfxGlobal(Some(value)) => {
                self.mixer.set_global_sfx_volume(value);
                None
            }
            Command::Reset => {
                self.reset();
                None
            }
            Command::Status => Some(self.status()),
            Command::Suspend => {
                self.suspend();
                None
            }
            Command::Resume => {
                self.resume();
                None
            }
            Command::Quit => None,
        };
        Ok(reply)
    }
}

impl std::fmt::Debug for Audio {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Audio")
            .field("bgm_tracks", &self.mixer.bgm_track_count())
            .field("suspended", &self.is_suspended())
            .finish()
    }
}
