//! `Channel`: one logical audio role (a BGM track, BGS or ME).
//!
//! Wraps a [`Stream`] with the layered volume model, fade workers and the
//! flags the ME watcher uses for ducking. The stream is only reachable
//! through [`Channel::lock`], so every query or mutation happens under the
//! channel mutex.
//!
//! Lock order: the fade-worker lock is always taken before the state lock.
//! Fade threads and the watcher only ever take the state lock.

use std::{
    sync::Arc,
    thread::{self, JoinHandle},
    time::Instant,
};

use parking_lot::{Mutex, MutexGuard};
use tracing::{debug, error, trace};

use super::{
    AudioContext,
    constants::{
        AUDIO_SLEEP, FADE_IN_MS, PITCH_MAX, PITCH_MIN, VOLUME_CEILING, VOLUME_MAX, VOLUME_MIN,
    },
    stream::{LoopMode, Stream, StreamState},
};
use crate::common::{errors::AudioResult, flag::AtomicFlag};

/// Independent factors multiplied into a channel's effective volume.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VolumeType {
    Base = 0,
    FadeIn = 1,
    FadeOut = 2,
    External = 3,
}

const VOLUME_TYPE_COUNT: usize = 4;

/// What the channel was last asked to play.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CurrentTrack {
    pub filename: String,
    /// 0.0 – 1.0
    pub volume: f32,
    /// 0.5 – 1.5
    pub pitch: f32,
}

/// Everything guarded by the channel mutex.
pub struct ChannelState {
    stream: Stream,
    volumes: [f32; VOLUME_TYPE_COUNT],
    current: CurrentTrack,
    /// Set by the watcher while BGM is ducked for an ME.
    pub ext_paused: bool,
    /// Set by an explicit stop so the watcher doesn't restart the track.
    pub no_resume_stop: bool,
}

impl ChannelState {
    pub fn stream(&mut self) -> &mut Stream {
        &mut self.stream
    }

    pub fn stream_state(&mut self) -> StreamState {
        self.stream.query_state()
    }

    pub fn current(&self) -> &CurrentTrack {
        &self.current
    }

    pub fn volume(&self, ty: VolumeType) -> f32 {
        self.volumes[ty as usize]
    }

    pub fn set_volume(&mut self, ty: VolumeType, value: f32) {
        self.volumes[ty as usize] = value;
        let effective = self.effective_volume();
        self.stream.set_volume(effective);
    }

    /// Product of all factors under the global ceiling.
    pub fn effective_volume(&self) -> f32 {
        self.volumes.iter().fold(VOLUME_CEILING, |acc, v| acc * v)
    }
}

struct ChannelShared {
    name: String,
    state: Mutex<ChannelState>,
    fade_active: AtomicFlag,
}

/// A fade thread with separate finish and terminate requests.
#[derive(Default)]
struct FadeWorker {
    thread: Option<JoinHandle<()>>,
    req_fini: Arc<AtomicFlag>,
    req_term: Arc<AtomicFlag>,
}

impl FadeWorker {
    /// Spawn `body` on `builder`. `false` if no thread could be started.
    fn start<F>(&mut self, builder: thread::Builder, body: F) -> bool
    where
        F: FnOnce(&AtomicFlag, &AtomicFlag) + Send + 'static,
    {
        self.req_fini.clear();
        self.req_term.clear();
        let fini = self.req_fini.clone();
        let term = self.req_term.clone();

        match builder.spawn(move || body(&fini, &term)) {
            Ok(handle) => {
                self.thread = Some(handle);
                true
            }
            Err(e) => {
                error!("failed to spawn fade thread: {}", e);
                false
            }
        }
    }

    /// Ask the fade to wrap up normally and wait for it.
    fn finish(&mut self) {
        if let Some(thread) = self.thread.take() {
            self.req_fini.set();
            let _ = thread.join();
        }
    }

    /// Abort the fade without its final bookkeeping and wait for it.
    fn terminate(&mut self) {
        if let Some(thread) = self.thread.take() {
            self.req_term.set();
            let _ = thread.join();
        }
    }
}

#[derive(Default)]
struct Fades {
    fade_out: FadeWorker,
    fade_in: FadeWorker,
}

impl Fades {
    fn finish_all(&mut self) {
        self.fade_out.finish();
        self.fade_in.finish();
    }
}

pub struct Channel {
    shared: Arc<ChannelShared>,
    fades: Mutex<Fades>,
}

impl Channel {
    pub fn new(loop_mode: LoopMode, name: impl Into<String>, ctx: AudioContext) -> Self {
        let name = name.into();
        let state = ChannelState {
            stream: Stream::new(loop_mode, name.clone(), ctx),
            volumes: [1.0; VOLUME_TYPE_COUNT],
            current: CurrentTrack {
                filename: String::new(),
                volume: 1.0,
                pitch: 1.0,
            },
            ext_paused: false,
            no_resume_stop: false,
        };

        Self {
            shared: Arc::new(ChannelShared {
                name,
                state: Mutex::new(state),
                fade_active: AtomicFlag::new(),
            }),
            fades: Mutex::new(Fades::default()),
        }
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Exclusive access to the stream and volume state.
    pub fn lock(&self) -> MutexGuard<'_, ChannelState> {
        self.shared.state.lock()
    }

    pub fn state(&self) -> StreamState {
        self.lock().stream_state()
    }

    /// Play `filename` at `volume` (0–100) and `pitch` (50–150) starting at
    /// `offset` seconds. Replaying what is already playing is a no-op; the
    /// same file with new volume/pitch keeps its decode position.
    pub fn play(&self, filename: &str, volume: i32, pitch: i32, offset: f64) -> AudioResult<()> {
        let volume = volume.clamp(VOLUME_MIN, VOLUME_MAX) as f32 / 100.0;
        let pitch = pitch.clamp(PITCH_MIN, PITCH_MAX) as f32 / 100.0;

        {
            let mut st = self.lock();
            let active = matches!(
                st.stream_state(),
                StreamState::Playing | StreamState::Paused
            );

            if active && st.current.filename == filename {
                if st.current.volume == volume && st.current.pitch == pitch {
                    return Ok(());
                }
                st.set_volume(VolumeType::Base, volume);
                st.stream.set_pitch(pitch);
                st.current.volume = volume;
                st.current.pitch = pitch;
                return Ok(());
            }
        }

        let mut fades = self.fades.lock();
        fades.finish_all();

        let mut st = self.lock();
        let sstate = st.stream_state();
        let diff_file = st.current.filename != filename || sstate == StreamState::Closed;

        if matches!(sstate, StreamState::Playing | StreamState::Paused) {
            st.stream.stop();
        }

        if diff_file {
            st.stream.close();
            if let Err(e) = st.stream.open(filename) {
                st.current.filename.clear();
                return Err(e);
            }
        }

        st.set_volume(VolumeType::Base, volume);
        st.stream.set_pitch(pitch);

        if offset > 0.0 {
            st.set_volume(VolumeType::FadeIn, 0.0);
            if !self.start_fade_in(&mut fades) {
                st.set_volume(VolumeType::FadeIn, 1.0);
            }
        }

        st.current = CurrentTrack {
            filename: filename.to_string(),
            volume,
            pitch,
        };

        if !st.ext_paused {
            st.stream.play(offset);
        } else {
            // ducked: the watcher starts it once the ME is over
            st.no_resume_stop = false;
        }

        debug!(
            "{}: play '{}' vol={:.2} pitch={:.2} pos={:.2}",
            self.shared.name, filename, volume, pitch, offset
        );
        Ok(())
    }

    pub fn stop(&self) {
        let mut fades = self.fades.lock();
        fades.finish_all();

        let mut st = self.lock();
        st.no_resume_stop = true;
        st.stream.stop();
    }

    /// Fade out linearly over `duration_ms`, then stop.
    pub fn fade_out(&self, duration_ms: u64) {
        let mut fades = self.fades.lock();

        {
            let mut st = self.lock();
            let sstate = st.stream_state();
            st.no_resume_stop = true;

            if self.shared.fade_active.is_set() {
                return;
            }

            if sstate == StreamState::Paused {
                st.stream.stop();
                return;
            }

            if sstate != StreamState::Playing {
                return;
            }
        }

        // a previous fade has ended on its own but was never joined
        fades.fade_out.finish();

        let builder = thread::Builder::new().name(format!("fadeout-{}", self.shared.name));
        self.spawn_fade_out(&mut fades, duration_ms, builder);
    }

    fn spawn_fade_out(&self, fades: &mut Fades, duration_ms: u64, builder: thread::Builder) {
        // set before spawning: the thread clears it when done
        self.shared.fade_active.set();
        let shared = self.shared.clone();
        let ms_step = 1.0 / duration_ms.max(1) as f32;
        let started = Instant::now();

        trace!("{}: fading out over {}ms", self.shared.name, duration_ms);
        let spawned = fades.fade_out.start(builder, move |fini, term| {
            fade_out_loop(&shared, ms_step, started, fini, term)
        });
        if !spawned {
            self.shared.fade_active.clear();
        }
    }

    /// Restart the stream at `offset` seconds.
    pub fn seek(&self, offset: f64) {
        self.lock().stream.play(offset);
    }

    pub fn playing_offset(&self) -> f64 {
        self.lock().stream.query_offset()
    }

    pub fn volume(&self, ty: VolumeType) -> f32 {
        self.lock().volume(ty)
    }

    pub fn set_volume(&self, ty: VolumeType, value: f32) {
        self.lock().set_volume(ty, value);
    }

    pub fn is_fading_out(&self) -> bool {
        self.shared.fade_active.is_set()
    }

    fn start_fade_in(&self, fades: &mut Fades) -> bool {
        let shared = self.shared.clone();
        let started = Instant::now();

        let builder = thread::Builder::new().name(format!("fadein-{}", self.shared.name));
        fades.fade_in.start(builder, move |fini, term| {
            fade_in_loop(&shared, started, fini, term)
        })
    }
}

impl Drop for Channel {
    fn drop(&mut self) {
        {
            let fades = self.fades.get_mut();
            fades.fade_out.terminate();
            fades.fade_in.terminate();
        }

        let mut st = self.lock();
        st.stream.stop();
        st.stream.close();
    }
}

fn fade_out_loop(
    shared: &ChannelShared,
    ms_step: f32,
    started: Instant,
    fini: &AtomicFlag,
    term: &AtomicFlag,
) {
    loop {
        if term.is_set() {
            break;
        }

        let mut st = shared.state.lock();
        let elapsed = started.elapsed().as_millis() as f32;
        let res_vol = 1.0 - elapsed * ms_step;
        let sstate = st.stream_state();

        if sstate != StreamState::Playing || res_vol < 0.0 || fini.is_set() {
            if sstate != StreamState::Paused {
                st.stream.stop();
            }
            st.set_volume(VolumeType::FadeOut, 1.0);
            break;
        }

        st.set_volume(VolumeType::FadeOut, res_vol);
        drop(st);

        thread::sleep(AUDIO_SLEEP);
    }

    shared.fade_active.clear();
    trace!("{}: fade-out done", shared.name);
}

fn fade_in_loop(shared: &ChannelShared, started: Instant, fini: &AtomicFlag, term: &AtomicFlag) {
    loop {
        if term.is_set() {
            break;
        }

        let mut st = shared.state.lock();
        let prog = started.elapsed().as_millis() as f32 / FADE_IN_MS as f32;
        let sstate = st.stream_state();

        if sstate != StreamState::Playing || prog >= 1.0 || fini.is_set() {
            st.set_volume(VolumeType::FadeIn, 1.0);
            break;
        }

        // quadratic ramp
        st.set_volume(VolumeType::FadeIn, prog * prog);
        drop(st);

        thread::sleep(AUDIO_SLEEP);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::test_support::{Fixture, wait_until};
    use std::time::Duration;

    fn bgm(fx: &Fixture) -> Channel {
        Channel::new(LoopMode::Looped, "bgm0", fx.context())
    }

    #[test]
    fn identical_replay_does_not_reopen() {
        let fx = Fixture::new(&[("town", 16_000)]);
        let ch = bgm(&fx);
        ch.play("town", 80, 100, 0.0).unwrap();

        // reopening would fail now
        std::fs::remove_file(fx.dir.path().join("town.wav")).unwrap();

        ch.play("town", 80, 100, 0.0).unwrap();
        assert_eq!(ch.state(), StreamState::Playing);
        assert_eq!(ch.lock().current().filename, "town");
    }

    #[test]
    fn same_file_updates_volume_and_pitch_in_place() {
        let fx = Fixture::new(&[("town", 16_000)]);
        let ch = bgm(&fx);
        ch.play("town", 80, 100, 0.0).unwrap();
        std::fs::remove_file(fx.dir.path().join("town.wav")).unwrap();

        ch.play("town", 40, 120, 0.0).unwrap();
        let st = ch.lock();
        assert_eq!(st.volume(VolumeType::Base), 0.4);
        assert_eq!(st.current().pitch, 1.2);
    }

    #[test]
    fn inputs_are_clamped() {
        let fx = Fixture::new(&[("town", 16_000)]);
        let ch = bgm(&fx);
        ch.play("town", 250, 10, 0.0).unwrap();

        let st = ch.lock();
        assert_eq!(st.current().volume, 1.0);
        assert_eq!(st.current().pitch, 0.5);
    }

    #[test]
    fn effective_volume_is_product_of_factors() {
        let fx = Fixture::new(&[]);
        let ch = bgm(&fx);
        ch.set_volume(VolumeType::Base, 0.5);
        ch.set_volume(VolumeType::External, 0.4);
        ch.set_volume(VolumeType::FadeOut, 0.9);

        assert_eq!(ch.volume(VolumeType::Base), 0.5);
        assert_eq!(ch.volume(VolumeType::External), 0.4);
        let expected = VOLUME_CEILING * 0.5 * 0.4 * 0.9;
        assert!((ch.lock().effective_volume() - expected).abs() < 1e-6);
    }

    #[test]
    fn failed_open_leaves_channel_closed() {
        let fx = Fixture::new(&[("town", 8_000)]);
        let ch = bgm(&fx);
        ch.play("town", 100, 100, 0.0).unwrap();

        assert!(ch.play("missing", 100, 100, 0.0).is_err());
        assert_eq!(ch.state(), StreamState::Closed);
        assert!(ch.lock().current().filename.is_empty());

        ch.play("town", 100, 100, 0.0).unwrap();
        assert_eq!(ch.state(), StreamState::Playing);
    }

    #[test]
    fn ducked_channel_defers_playback() {
        let fx = Fixture::new(&[("town", 8_000)]);
        let ch = bgm(&fx);
        {
            let mut st = ch.lock();
            st.ext_paused = true;
            st.no_resume_stop = true;
        }

        ch.play("town", 100, 100, 0.0).unwrap();
        let mut st = ch.lock();
        assert_eq!(st.stream_state(), StreamState::Stopped);
        assert!(!st.no_resume_stop);
    }

    #[test]
    fn stop_marks_no_resume() {
        let fx = Fixture::new(&[("town", 8_000)]);
        let ch = bgm(&fx);
        ch.play("town", 100, 100, 0.0).unwrap();
        ch.stop();

        let mut st = ch.lock();
        assert_eq!(st.stream_state(), StreamState::Stopped);
        assert!(st.no_resume_stop);
    }

    #[test]
    fn fade_out_of_paused_channel_stops_at_once() {
        let fx = Fixture::new(&[("town", 8_000)]);
        let ch = bgm(&fx);
        ch.play("town", 100, 100, 0.0).unwrap();
        ch.lock().stream().pause();

        ch.fade_out(1_000);
        assert_eq!(ch.state(), StreamState::Stopped);
        assert!(!ch.is_fading_out());
    }

    #[test]
    fn fade_out_stops_within_duration() {
        let fx = Fixture::new(&[("town", 80_000)]);
        let ch = bgm(&fx);
        ch.play("town", 100, 100, 0.0).unwrap();

        let started = Instant::now();
        ch.fade_out(200);
        assert!(ch.is_fading_out());

        assert!(wait_until(Duration::from_secs(2), || ch.state() == StreamState::Stopped));
        assert!(started.elapsed() < Duration::from_millis(200 + 150));
        assert!(wait_until(Duration::from_millis(200), || !ch.is_fading_out()));
        assert_eq!(ch.volume(VolumeType::FadeOut), 1.0);
    }

    #[test]
    fn play_with_offset_fades_in() {
        let fx = Fixture::new(&[("town", 80_000)]);
        let ch = bgm(&fx);
        ch.play("town", 100, 100, 2.0).unwrap();

        assert!(ch.volume(VolumeType::FadeIn) < 1.0);
        assert!(wait_until(Duration::from_secs(3), || {
            ch.volume(VolumeType::FadeIn) == 1.0
        }));
        assert_eq!(ch.state(), StreamState::Playing);
    }

    #[test]
    fn seek_restarts_at_offset() {
        let fx = Fixture::new(&[("town", 80_000)]);
        let ch = bgm(&fx);
        ch.play("town", 100, 100, 0.0).unwrap();

        ch.seek(3.0);
        assert!((ch.playing_offset() - 3.0).abs() < 1e-6);
    }

    #[test]
    fn failed_fade_spawn_leaves_fades_available() {
        let fx = Fixture::new(&[("town", 80_000)]);
        let ch = bgm(&fx);
        ch.play("town", 100, 100, 0.0).unwrap();

        {
            let mut fades = ch.fades.lock();
            // no address space for this stack
            let builder = thread::Builder::new().stack_size(usize::MAX / 2);
            ch.spawn_fade_out(&mut fades, 100, builder);
        }
        assert!(!ch.is_fading_out());
        assert_eq!(ch.state(), StreamState::Playing);

        ch.fade_out(50);
        assert!(ch.is_fading_out());
        assert!(wait_until(Duration::from_secs(2), || ch.state() == StreamState::Stopped));
    }

    #[test]
    fn fade_ending_while_suspended_stops_the_stream() {
        let fx = Fixture::with_output(&[("town", 80_000)]);
        let ch = Arc::new(bgm(&fx));
        ch.play("town", 100, 100, 0.0).unwrap();

        fx.sync.halt_threads();
        ch.fade_out(50);

        let (tx, rx) = flume::bounded(1);
        let watched = ch.clone();
        thread::spawn(move || {
            let stopped = wait_until(Duration::from_secs(2), || {
                watched.state() == StreamState::Stopped
            });
            let _ = tx.send(stopped);
        });
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)), Ok(true));

        fx.sync.resume_threads();
    }
}
