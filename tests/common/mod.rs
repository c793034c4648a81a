#![allow(dead_code)]

use std::{
    path::Path,
    sync::Arc,
    thread,
    time::{Duration, Instant},
};

use rgss_audio::{
    audio::{AudioContext, HeadlessOutput, LocalFileSystem, Mixer, SoftBackend, SyncPoint},
    configs::AudioConfig,
    script::Audio,
};
use tempfile::TempDir;

pub const RATE: u32 = 8_000;

/// Write a mono 16-bit tone of `secs` seconds.
pub fn write_tone(path: &Path, secs: f32) {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec).unwrap();
    let frames = (secs * RATE as f32) as u32;
    for i in 0..frames {
        let t = i as f32 / RATE as f32;
        let s = (t * 440.0 * std::f32::consts::TAU).sin() * 8_000.0;
        writer.write_sample(s as i16).unwrap();
    }
    writer.finalize().unwrap();
}

/// A mixer over a temp directory of tones, rendered in real time.
pub struct Harness {
    pub dir: TempDir,
    pub audio: Audio,
    _output: HeadlessOutput,
}

impl Harness {
    pub fn new(tones: &[(&str, f32)], bgm_tracks: usize) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let audio_dir = dir.path().join("Audio");
        std::fs::create_dir_all(&audio_dir).unwrap();
        for (name, secs) in tones {
            write_tone(&audio_dir.join(format!("{}.wav", name)), *secs);
        }

        let backend = Arc::new(SoftBackend::new(RATE, 64));
        let output = HeadlessOutput::start(backend.clone()).unwrap();

        let ctx = AudioContext {
            backend,
            fs: Arc::new(LocalFileSystem::new(
                vec![dir.path().to_path_buf()],
                vec!["ogg".into(), "wav".into()],
            )),
            sync: Arc::new(SyncPoint::new()),
        };
        let config = AudioConfig {
            bgm_track_count: bgm_tracks,
            ..AudioConfig::default()
        };
        let mixer = Mixer::new(ctx, &config).unwrap();

        Self {
            dir,
            audio: Audio::new(Arc::new(mixer)),
            _output: output,
        }
    }

    pub fn mixer(&self) -> &Mixer {
        self.audio.mixer()
    }
}

pub fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    cond()
}
