//! Fixtures shared by the audio unit tests.

use std::{
    path::Path,
    sync::Arc,
    thread,
    time::{Duration, Instant},
};

use tempfile::TempDir;

use super::{
    AudioContext,
    backend::{HeadlessOutput, SoftBackend},
    source::LocalFileSystem,
    sync::SyncPoint,
};

pub const CLIP_RATE: u32 = 8_000;

/// Mono 16-bit sawtooth at [`CLIP_RATE`].
pub fn write_clip(path: &Path, frames: u32) {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: CLIP_RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec).unwrap();
    for i in 0..frames {
        writer.write_sample((((i % 80) as i32 - 40) * 200) as i16).unwrap();
    }
    writer.finalize().unwrap();
}

pub struct Fixture {
    pub dir: TempDir,
    pub backend: Arc<SoftBackend>,
    pub fs: Arc<LocalFileSystem>,
    pub sync: Arc<SyncPoint>,
    output: Option<HeadlessOutput>,
}

impl Fixture {
    /// Clips on a backend nobody renders: voices never drain.
    pub fn new(clips: &[(&str, u32)]) -> Self {
        let dir = tempfile::tempdir().unwrap();
        for (name, frames) in clips {
            write_clip(&dir.path().join(format!("{}.wav", name)), *frames);
        }
        let fs = LocalFileSystem::new(vec![dir.path().to_path_buf()], vec!["wav".into()]);

        Self {
            dir,
            backend: Arc::new(SoftBackend::new(CLIP_RATE, 32)),
            fs: Arc::new(fs),
            sync: Arc::new(SyncPoint::new()),
            output: None,
        }
    }

    /// Same, rendered in real time by a headless output.
    pub fn with_output(clips: &[(&str, u32)]) -> Self {
        let mut fx = Self::new(clips);
        fx.output = Some(HeadlessOutput::start(fx.backend.clone()).unwrap());
        fx
    }

    pub fn context(&self) -> AudioContext {
        AudioContext {
            backend: self.backend.clone(),
            fs: self.fs.clone(),
            sync: self.sync.clone(),
        }
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
