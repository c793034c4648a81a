//! Mixer coordinator: owns every channel, the SE emitter, global volumes
//! and the ME watcher.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info};

use super::{
    AudioContext,
    channel::{Channel, VolumeType},
    constants::{TRACK_ALL, VOLUME_MAX, VOLUME_MIN},
    emitter::SoundEmitter,
    stream::LoopMode,
    sync::SyncPoint,
    watcher::{MeWatch, WatchState},
};
use crate::{
    common::errors::{AudioError, AudioResult},
    configs::AudioConfig,
};

/// BGM track selector.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Track {
    Index(usize),
    /// Every track for stop/fade/volume; for play, track 0 with every other
    /// track stopped.
    All,
}

impl Track {
    pub const PRIMARY: Track = Track::Index(0);

    /// Map a raw script value: the sentinel selects all tracks, negative
    /// values select the primary one.
    pub fn from_raw(raw: i32) -> Self {
        if raw == TRACK_ALL {
            Track::All
        } else {
            Track::Index(raw.max(0) as usize)
        }
    }
}

/// The streamed channels. Shared with the watcher thread.
pub struct ChannelSet {
    pub bgm: Vec<Channel>,
    pub bgs: Channel,
    pub me: Channel,
}

impl ChannelSet {
    pub fn new(bgm_tracks: usize, ctx: &AudioContext) -> Self {
        Self {
            bgm: (0..bgm_tracks.max(1))
                .map(|i| Channel::new(LoopMode::Looped, format!("bgm{}", i), ctx.clone()))
                .collect(),
            bgs: Channel::new(LoopMode::Looped, "bgs", ctx.clone()),
            me: Channel::new(LoopMode::NotLooped, "me", ctx.clone()),
        }
    }
}

/// Volume percentages as last set by scripts.
struct Volumes {
    bgm: i32,
    sfx: i32,
    bgm_tracks_current: Vec<i32>,
    bgs_current: i32,
    me_current: i32,
}

fn clamp_volume(v: i32) -> i32 {
    v.clamp(VOLUME_MIN, VOLUME_MAX)
}

fn scaled(volume: i32, global: i32) -> i32 {
    volume * global / 100
}

fn base_factor(volume: i32, global: i32) -> f32 {
    (volume * global) as f32 / 10_000.0
}

pub struct Mixer {
    watch: MeWatch,
    channels: Arc<ChannelSet>,
    se: SoundEmitter,
    volumes: Mutex<Volumes>,
    sync: Arc<SyncPoint>,
}

impl Mixer {
    pub fn new(ctx: AudioContext, config: &AudioConfig) -> AudioResult<Self> {
        let channels = Arc::new(ChannelSet::new(config.bgm_track_count, &ctx));
        let track_count = channels.bgm.len();

        let se = SoundEmitter::new(ctx.clone(), config.se_source_count, config.se_cache_bytes())?;
        let watch = MeWatch::start(channels.clone(), ctx.sync.clone())?;

        info!(
            "mixer ready: {} BGM track(s), {} SE voices",
            track_count, config.se_source_count
        );

        Ok(Self {
            watch,
            channels,
            se,
            volumes: Mutex::new(Volumes {
                bgm: clamp_volume(config.bgm_volume),
                sfx: clamp_volume(config.sfx_volume),
                bgm_tracks_current: vec![100; track_count],
                bgs_current: 100,
                me_current: 100,
            }),
            sync: ctx.sync,
        })
    }

    pub fn bgm_track_count(&self) -> usize {
        self.channels.bgm.len()
    }

    fn track(&self, index: usize) -> AudioResult<&Channel> {
        self.channels
            .bgm
            .get(index)
            .ok_or(AudioError::TrackOutOfRange {
                index,
                max: self.channels.bgm.len() - 1,
            })
    }

    pub fn bgm_play(
        &self,
        filename: &str,
        volume: i32,
        pitch: i32,
        pos: f64,
        track: Track,
    ) -> AudioResult<()> {
        let volume = clamp_volume(volume);

        let index = match track {
            Track::Index(index) => index,
            Track::All => {
                for channel in self.channels.bgm.iter().skip(1) {
                    channel.stop();
                }
                0
            }
        };
        let channel = self.track(index)?;

        let effective = {
            let mut v = self.volumes.lock();
            v.bgm_tracks_current[index] = volume;
            scaled(volume, v.bgm)
        };
        channel.play(filename, effective, pitch, pos)
    }

    pub fn bgm_stop(&self, track: Track) -> AudioResult<()> {
        match track {
            Track::All => self.channels.bgm.iter().for_each(Channel::stop),
            Track::Index(index) => self.track(index)?.stop(),
        }
        Ok(())
    }

    pub fn bgm_fade(&self, duration_ms: u64, track: Track) -> AudioResult<()> {
        match track {
            Track::All => {
                for channel in &self.channels.bgm {
                    channel.fade_out(duration_ms);
                }
            }
            Track::Index(index) => self.track(index)?.fade_out(duration_ms),
        }
        Ok(())
    }

    /// Base factor of the track as a percentage; `All` reports track 0.
    pub fn bgm_volume(&self, track: Track) -> AudioResult<i32> {
        let channel = match track {
            Track::All => self.track(0)?,
            Track::Index(index) => self.track(index)?,
        };
        Ok((channel.volume(VolumeType::Base) * 100.0).round() as i32)
    }

    pub fn bgm_set_volume(&self, volume: i32, track: Track) -> AudioResult<()> {
        let volume = clamp_volume(volume);

        match track {
            Track::All => {
                let global = {
                    let mut v = self.volumes.lock();
                    v.bgm_tracks_current.fill(volume);
                    v.bgm
                };
                for channel in &self.channels.bgm {
                    channel.set_volume(VolumeType::Base, base_factor(volume, global));
                }
            }
            Track::Index(index) => {
                let channel = self.track(index)?;
                let global = {
                    let mut v = self.volumes.lock();
                    v.bgm_tracks_current[index] = volume;
                    v.bgm
                };
                channel.set_volume(VolumeType::Base, base_factor(volume, global));
            }
        }
        Ok(())
    }

    pub fn bgm_pos(&self, track: usize) -> AudioResult<f64> {
        Ok(self.track(track)?.playing_offset())
    }

    pub fn bgs_play(&self, filename: &str, volume: i32, pitch: i32, pos: f64) -> AudioResult<()> {
        let volume = clamp_volume(volume);
        let effective = {
            let mut v = self.volumes.lock();
            v.bgs_current = volume;
            scaled(volume, v.sfx)
        };
        self.channels.bgs.play(filename, effective, pitch, pos)
    }

    pub fn bgs_stop(&self) {
        self.channels.bgs.stop();
    }

    pub fn bgs_fade(&self, duration_ms: u64) {
        self.channels.bgs.fade_out(duration_ms);
    }

    pub fn bgs_pos(&self) -> f64 {
        self.channels.bgs.playing_offset()
    }

    pub fn me_play(&self, filename: &str, volume: i32, pitch: i32) -> AudioResult<()> {
        let volume = clamp_volume(volume);
        let effective = {
            let mut v = self.volumes.lock();
            v.me_current = volume;
            scaled(volume, v.bgm)
        };
        self.channels.me.play(filename, effective, pitch, 0.0)
    }

    pub fn me_stop(&self) {
        self.channels.me.stop();
    }

    pub fn me_fade(&self, duration_ms: u64) {
        self.channels.me.fade_out(duration_ms);
    }

    pub fn se_play(&self, filename: &str, volume: i32, pitch: i32) -> AudioResult<()> {
        let volume = clamp_volume(volume);
        let sfx = self.volumes.lock().sfx;
        self.se.play(filename, scaled(volume, sfx), pitch)
    }

    pub fn se_stop(&self) {
        self.se.stop();
    }

    /// Stop everything.
    pub fn reset(&self) {
        for channel in &self.channels.bgm {
            channel.stop();
        }
        self.channels.bgs.stop();
        self.channels.me.stop();
        self.se.stop();
        debug!("audio reset");
    }

    pub fn global_bgm_volume(&self) -> i32 {
        self.volumes.lock().bgm
    }

    pub fn global_sfx_volume(&self) -> i32 {
        self.volumes.lock().sfx
    }

    pub fn set_global_bgm_volume(&self, value: i32) {
        let (global, tracks, me) = {
            let mut v = self.volumes.lock();
            v.bgm = clamp_volume(value);
            (v.bgm, v.bgm_tracks_current.clone(), v.me_current)
        };

        for (channel, current) in self.channels.bgm.iter().zip(tracks) {
            channel.set_volume(VolumeType::Base, base_factor(current, global));
        }
        self.channels
            .me
            .set_volume(VolumeType::Base, base_factor(me, global));
    }

    pub fn set_global_sfx_volume(&self, value: i32) {
        let (global, bgs) = {
            let mut v = self.volumes.lock();
            v.sfx = clamp_volume(value);
            (v.sfx, v.bgs_current)
        };
        self.channels
            .bgs
            .set_volume(VolumeType::Base, base_factor(bgs, global));
    }

    pub fn watch_state(&self) -> WatchState {
        self.watch.state()
    }

    pub fn sync_point(&self) -> &Arc<SyncPoint> {
        &self.sync
    }

    pub fn bgm_channel(&self, index: usize) -> Option<&Channel> {
        self.channels.bgm.get(index)
    }

    pub fn bgs_channel(&self) -> &Channel {
        &self.channels.bgs
    }

    pub fn me_channel(&self) -> &Channel {
        &self.channels.me
    }

    pub fn se(&self) -> &SoundEmitter {
        &self.se
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{stream::StreamState, test_support::Fixture};

    fn mixer(fx: &Fixture, tracks: usize) -> Mixer {
        let config = AudioConfig {
            bgm_track_count: tracks,
            se_source_count: 2,
            ..AudioConfig::default()
        };
        Mixer::new(fx.context(), &config).unwrap()
    }

    #[test]
    fn raw_track_values() {
        assert_eq!(Track::from_raw(TRACK_ALL), Track::All);
        assert_eq!(Track::from_raw(-1), Track::PRIMARY);
        assert_eq!(Track::from_raw(3), Track::Index(3));
    }

    #[test]
    fn out_of_range_track_is_rejected_without_side_effects() {
        let fx = Fixture::new(&[("town", 8_000)]);
        let mixer = mixer(&fx, 2);

        let err = mixer
            .bgm_play("town", 50, 100, 0.0, Track::Index(5))
            .unwrap_err();
        assert_eq!(err.to_string(), "requested BGM track 5 out of range (max: 1)");
        assert!(mixer.bgm_set_volume(10, Track::Index(2)).is_err());
        assert!(mixer.bgm_pos(2).is_err());

        assert_eq!(mixer.volumes.lock().bgm_tracks_current, vec![100, 100]);
        assert_eq!(mixer.bgm_channel(0).unwrap().state(), StreamState::Closed);
    }

    #[test]
    fn replaying_same_bgm_keeps_the_stream() {
        let fx = Fixture::new(&[("town", 8_000)]);
        let mixer = mixer(&fx, 1);
        mixer.bgm_play("town", 80, 100, 0.0, Track::PRIMARY).unwrap();

        std::fs::remove_file(fx.dir.path().join("town.wav")).unwrap();
        mixer.bgm_play("town", 80, 100, 0.0, Track::PRIMARY).unwrap();

        let channel = mixer.bgm_channel(0).unwrap();
        assert_eq!(channel.state(), StreamState::Playing);
        assert_eq!(mixer.bgm_volume(Track::PRIMARY).unwrap(), 80);
    }

    #[test]
    fn global_bgm_volume_rescales_tracks() {
        let fx = Fixture::new(&[("town", 8_000)]);
        let mixer = mixer(&fx, 1);
        mixer.bgm_play("town", 100, 100, 0.0, Track::PRIMARY).unwrap();

        mixer.bgm_set_volume(50, Track::PRIMARY).unwrap();
        assert_eq!(mixer.bgm_channel(0).unwrap().volume(VolumeType::Base), 0.5);

        mixer.set_global_bgm_volume(50);
        assert_eq!(mixer.bgm_channel(0).unwrap().volume(VolumeType::Base), 0.25);
        assert_eq!(mixer.bgm_volume(Track::All).unwrap(), 25);
        assert_eq!(mixer.global_bgm_volume(), 50);
    }

    #[test]
    fn global_volumes_are_clamped() {
        let fx = Fixture::new(&[]);
        let mixer = mixer(&fx, 1);
        mixer.set_global_bgm_volume(180);
        mixer.set_global_sfx_volume(-4);
        assert_eq!(mixer.global_bgm_volume(), 100);
        assert_eq!(mixer.global_sfx_volume(), 0);
    }

    #[test]
    fn bgs_follows_the_sfx_global() {
        let fx = Fixture::new(&[("rain", 8_000)]);
        let mixer = mixer(&fx, 1);
        mixer.set_global_sfx_volume(50);
        mixer.bgs_play("rain", 80, 100, 0.0).unwrap();
        assert_eq!(mixer.bgs_channel().volume(VolumeType::Base), 0.4);

        mixer.set_global_sfx_volume(100);
        assert_eq!(mixer.bgs_channel().volume(VolumeType::Base), 0.8);
    }

    #[test]
    fn play_all_uses_primary_and_stops_the_rest() {
        let fx = Fixture::new(&[("town", 8_000), ("drums", 8_000)]);
        let mixer = mixer(&fx, 3);
        mixer.bgm_play("drums", 100, 100, 0.0, Track::Index(1)).unwrap();
        mixer.bgm_play("drums", 100, 100, 0.0, Track::Index(2)).unwrap();

        mixer.bgm_play("town", 100, 100, 0.0, Track::All).unwrap();
        assert_eq!(mixer.bgm_channel(0).unwrap().state(), StreamState::Playing);
        assert_eq!(mixer.bgm_channel(1).unwrap().state(), StreamState::Stopped);
        assert_eq!(mixer.bgm_channel(2).unwrap().state(), StreamState::Stopped);

        mixer.bgm_stop(Track::All).unwrap();
        assert_eq!(mixer.bgm_channel(0).unwrap().state(), StreamState::Stopped);
    }

    #[test]
    fn reset_stops_everything() {
        let fx = Fixture::new(&[("town", 8_000), ("rain", 8_000), ("click", 800)]);
        let mixer = mixer(&fx, 1);
        mixer.bgm_play("town", 100, 100, 0.0, Track::PRIMARY).unwrap();
        mixer.bgs_play("rain", 100, 100, 0.0).unwrap();
        mixer.se_play("click", 100, 100).unwrap();

        mixer.reset();
        assert_eq!(mixer.bgm_channel(0).unwrap().state(), StreamState::Stopped);
        assert_eq!(mixer.bgs_channel().state(), StreamState::Stopped);
        assert_eq!(mixer.se().playing_count(), 0);
    }
}
