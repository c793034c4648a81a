mod common;

use std::time::Duration;

use common::{Harness, wait_until};
use rgss_audio::audio::{StreamState, VolumeType, WatchState};

const LONG: Duration = Duration::from_secs(5);

#[test]
fn me_ducks_and_restores_bgm() {
    let h = Harness::new(&[("town", 2.0), ("fanfare", 0.6)], 1);
    let mixer = h.mixer();
    let bgm = mixer.bgm_channel(0).unwrap();

    h.audio.bgm_play("Audio/town", 100, 100, 0.0, 0).unwrap();
    assert!(wait_until(LONG, || bgm.state() == StreamState::Playing));

    h.audio.me_play("Audio/fanfare", 100, 100).unwrap();

    assert!(wait_until(LONG, || mixer.watch_state() == WatchState::MePlaying));
    assert_eq!(bgm.state(), StreamState::Paused);
    assert_eq!(bgm.volume(VolumeType::External), 0.0);

    // the ME runs out, the BGM resumes and fades back in
    assert!(wait_until(LONG, || mixer.watch_state() == WatchState::MeNotPlaying));
    assert_eq!(bgm.state(), StreamState::Playing);
    assert_eq!(bgm.volume(VolumeType::External), 1.0);
    assert_eq!(mixer.me_channel().state(), StreamState::Stopped);

    h.audio.reset();
}

#[test]
fn bgm_started_during_me_waits_for_it() {
    let h = Harness::new(&[("town", 2.0), ("fanfare", 1.0)], 1);
    let mixer = h.mixer();
    let bgm = mixer.bgm_channel(0).unwrap();

    h.audio.me_play("Audio/fanfare", 100, 100).unwrap();
    assert!(wait_until(LONG, || mixer.watch_state() == WatchState::MePlaying));

    // the track is held back while the ME is audible
    h.audio.bgm_play("Audio/town", 100, 100, 0.0, 0).unwrap();
    assert_ne!(bgm.state(), StreamState::Playing);

    assert!(wait_until(LONG, || bgm.state() == StreamState::Playing));
    h.audio.reset();
}

#[test]
fn stopped_bgm_stays_stopped_after_me() {
    let h = Harness::new(&[("town", 2.0), ("fanfare", 0.6)], 1);
    let mixer = h.mixer();
    let bgm = mixer.bgm_channel(0).unwrap();

    h.audio.bgm_play("Audio/town", 100, 100, 0.0, 0).unwrap();
    h.audio.me_play("Audio/fanfare", 100, 100).unwrap();
    assert!(wait_until(LONG, || mixer.watch_state() == WatchState::MePlaying));

    h.audio.bgm_stop(0).unwrap();
    assert!(wait_until(LONG, || mixer.watch_state() == WatchState::MeNotPlaying));
    assert_eq!(bgm.state(), StreamState::Stopped);
}
