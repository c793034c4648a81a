//! ME watcher: ducks every BGM track while a music effect plays.
//!
//! ```text
//!  MeNotPlaying ──ME starts──▶ BgmFadingOut ──all BGM at 0──▶ MePlaying
//!       ▲                        │      ▲                        │
//!       │                  ME ends      ME restarts          ME ends
//!       │                        ▼      │                        │
//!       └──────faded in / BGM stopped── BgmFadingIn ◀────────────┘
//! ```
//!
//! Every state locks the ME channel first, then the BGM channels in index
//! order.

use std::{
    sync::{
        Arc,
        atomic::{AtomicU8, Ordering},
    },
    thread::{self, JoinHandle},
};

use parking_lot::MutexGuard;
use tracing::{debug, trace};

use super::{
    channel::{Channel, ChannelState, VolumeType},
    constants::{AUDIO_SLEEP, ME_FADE_IN_STEP, ME_FADE_OUT_STEP},
    mixer::ChannelSet,
    stream::StreamState,
    sync::SyncPoint,
};
use crate::common::{
    errors::{AudioError, AudioResult},
    flag::AtomicFlag,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum WatchState {
    MeNotPlaying = 0,
    BgmFadingOut = 1,
    MePlaying = 2,
    BgmFadingIn = 3,
}

impl WatchState {
    pub fn from_u8(v: u8) -> Self {
        match v {
            1 => Self::BgmFadingOut,
            2 => Self::MePlaying,
            3 => Self::BgmFadingIn,
            _ => Self::MeNotPlaying,
        }
    }
}

fn lock_all(tracks: &[Channel]) -> Vec<MutexGuard<'_, ChannelState>> {
    tracks.iter().map(Channel::lock).collect()
}

/// Run one polling cycle of the state machine and return the next state.
pub fn step(state: WatchState, channels: &ChannelSet) -> WatchState {
    match state {
        WatchState::MeNotPlaying => {
            let mut me = channels.me.lock();
            if me.stream_state() != StreamState::Playing {
                return WatchState::MeNotPlaying;
            }

            for mut track in lock_all(&channels.bgm) {
                track.ext_paused = true;
            }
            WatchState::BgmFadingOut
        }

        WatchState::BgmFadingOut => {
            let mut me = channels.me.lock();
            let mut tracks = lock_all(&channels.bgm);

            if me.stream_state() != StreamState::Playing {
                // ME ended before the BGM was fully ducked; tracks that
                // already reached silence were paused and need to come back
                for track in tracks.iter_mut() {
                    track.ext_paused = false;
                    if track.stream_state() == StreamState::Paused {
                        track.stream().play(0.0);
                    }
                }
                return WatchState::BgmFadingIn;
            }

            let mut any_silenced = false;
            for track in tracks.iter_mut() {
                let vol = track.volume(VolumeType::External) - ME_FADE_OUT_STEP;

                if vol < 0.0 || track.stream_state() != StreamState::Playing {
                    track.set_volume(VolumeType::External, 0.0);
                    track.stream().pause();
                    any_silenced = true;
                    continue;
                }

                track.set_volume(VolumeType::External, vol);
            }

            let none_playing = tracks
                .iter_mut()
                .all(|t| t.stream_state() != StreamState::Playing);

            if any_silenced && none_playing {
                WatchState::MePlaying
            } else {
                WatchState::BgmFadingOut
            }
        }

        WatchState::MePlaying => {
            let mut me = channels.me.lock();
            if me.stream_state() == StreamState::Playing {
                return WatchState::MePlaying;
            }

            let mut resumed = false;
            for mut track in lock_all(&channels.bgm) {
                track.ext_paused = false;

                if track.stream_state() == StreamState::Paused {
                    track.stream().play(0.0);
                    resumed = true;
                } else {
                    track.set_volume(VolumeType::External, 1.0);
                    if !track.no_resume_stop {
                        track.stream().play(0.0);
                    }
                }
            }

            if resumed {
                WatchState::BgmFadingIn
            } else {
                WatchState::MeNotPlaying
            }
        }

        WatchState::BgmFadingIn => {
            let mut me = channels.me.lock();
            let mut tracks = lock_all(&channels.bgm);

            let Some(primary) = tracks.first_mut() else {
                return WatchState::MeNotPlaying;
            };

            if primary.stream_state() == StreamState::Stopped {
                for track in tracks.iter_mut() {
                    track.set_volume(VolumeType::External, 1.0);
                }
                return WatchState::MeNotPlaying;
            }

            if me.stream_state() == StreamState::Playing {
                // duck again from wherever the fade-in got to
                for track in tracks.iter_mut() {
                    track.ext_paused = true;
                }
                return WatchState::BgmFadingOut;
            }

            let mut vol = primary.volume(VolumeType::External) + ME_FADE_IN_STEP;
            let mut next = WatchState::BgmFadingIn;
            if vol >= 1.0 {
                vol = 1.0;
                next = WatchState::MeNotPlaying;
            }

            for track in tracks.iter_mut() {
                track.set_volume(VolumeType::External, vol);
            }
            next
        }
    }
}

/// The watcher thread.
pub struct MeWatch {
    state: Arc<AtomicU8>,
    term_req: Arc<AtomicFlag>,
    sync: Arc<SyncPoint>,
    thread: Option<JoinHandle<()>>,
}

impl MeWatch {
    pub fn start(channels: Arc<ChannelSet>, sync: Arc<SyncPoint>) -> AudioResult<Self> {
        let state = Arc::new(AtomicU8::new(WatchState::MeNotPlaying as u8));
        let term_req = Arc::new(AtomicFlag::new());

        let thread = thread::Builder::new()
            .name("audio-mewatch".into())
            .spawn({
                let state = state.clone();
                let term_req = term_req.clone();
                let sync = sync.clone();
                move || watch_loop(&channels, &sync, &state, &term_req)
            })
            .map_err(|source| AudioError::Thread {
                name: "audio-mewatch".into(),
                source,
            })?;

        Ok(Self {
            state,
            term_req,
            sync,
            thread: Some(thread),
        })
    }

    pub fn state(&self) -> WatchState {
        WatchState::from_u8(self.state.load(Ordering::Acquire))
    }
}

impl Drop for MeWatch {
    fn drop(&mut self) {
        self.term_req.set();
        self.sync.wake();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

fn watch_loop(channels: &ChannelSet, sync: &SyncPoint, state: &AtomicU8, term_req: &AtomicFlag) {
    debug!("ME watcher running ({} BGM tracks)", channels.bgm.len());

    loop {
        sync.pass_secondary_sync_unless(term_req);
        if term_req.is_set() {
            break;
        }

        let current = WatchState::from_u8(state.load(Ordering::Acquire));
        let next = step(current, channels);
        if next != current {
            trace!("ME watcher: {:?} -> {:?}", current, next);
            state.store(next as u8, Ordering::Release);
        }

        thread::sleep(AUDIO_SLEEP);
    }

    debug!("ME watcher stopped");
}
