//! `Stream`: state machine around one decodable source and its worker.
//!
//! The worker thread keeps [`STREAM_BUFS`] buffers cycling through the voice:
//! it refills every buffer the voice has finished with and restarts the
//! voice after an underrun. `Stream` itself is not thread safe; a
//! [`Channel`](super::channel::Channel) serializes access to it.

use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    thread::{self, JoinHandle},
};

use parking_lot::Mutex;
use tracing::{debug, error, trace, warn};

use super::{
    AudioContext,
    backend::{PcmBuffer, Voice, VoiceState},
    constants::{AUDIO_SLEEP, STREAM_BUF_SIZE, STREAM_BUFS},
    source::{self, DataSource, FillStatus},
    sync::SyncPoint,
};
use crate::common::{errors::AudioResult, flag::AtomicFlag};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StreamState {
    Closed,
    Stopped,
    Playing,
    Paused,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoopMode {
    Looped,
    NotLooped,
}

/// State shared between a stream and its worker thread.
#[derive(Default)]
struct StreamShared {
    source: Mutex<Option<Box<dyn DataSource>>>,
    /// Held while pausing/resuming so the worker's first `play` cannot race
    /// a pause that arrived before any buffer was queued.
    preempt_pause: Mutex<bool>,
    /// Unset while the voice is stopped only because nothing was queued yet.
    stream_inited: AtomicFlag,
    source_exhausted: AtomicFlag,
    thread_term_req: AtomicFlag,
    needs_rewind: AtomicFlag,
    decode_error: AtomicFlag,
    proc_frames: AtomicU64,
}

pub struct Stream {
    name: String,
    loop_mode: LoopMode,
    state: StreamState,
    ctx: AudioContext,
    voice: Option<Arc<dyn Voice>>,
    shared: Arc<StreamShared>,
    worker: Option<JoinHandle<()>>,
    gain: f32,
    pitch: f32,
    /// The source applies `pitch` itself; the voice runs at 1.0.
    native_pitch: bool,
    sample_rate: u32,
}

impl Stream {
    pub fn new(loop_mode: LoopMode, name: impl Into<String>, ctx: AudioContext) -> Self {
        Self {
            name: name.into(),
            loop_mode,
            state: StreamState::Closed,
            ctx,
            voice: None,
            shared: Arc::new(StreamShared::default()),
            worker: None,
            gain: 1.0,
            pitch: 1.0,
            native_pitch: false,
            sample_rate: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn loop_mode(&self) -> LoopMode {
        self.loop_mode
    }

    pub fn open(&mut self, filename: &str) -> AudioResult<()> {
        self.check_stopped();

        match self.state {
            StreamState::Playing | StreamState::Paused => {
                self.stop_stream();
                self.close_source();
            }
            StreamState::Stopped => self.close_source(),
            StreamState::Closed => {}
        }
        self.state = StreamState::Closed;

        self.open_source(filename)?;
        self.state = StreamState::Stopped;
        Ok(())
    }

    /// Open on an already constructed source instead of a file.
    #[cfg(test)]
    pub(crate) fn open_with_source(&mut self, src: Box<dyn DataSource>) -> AudioResult<()> {
        self.close();
        self.ensure_voice()?;
        self.install_source(src);
        self.state = StreamState::Stopped;
        Ok(())
    }

    pub fn close(&mut self) {
        self.check_stopped();

        match self.state {
            StreamState::Playing | StreamState::Paused => {
                self.stop_stream();
                self.close_source();
            }
            StreamState::Stopped => self.close_source(),
            StreamState::Closed => return,
        }
        self.state = StreamState::Closed;
    }

    /// Start or resume playback. A positive `offset` (seconds) always
    /// restarts from that position, even while playing.
    pub fn play(&mut self, offset: f64) {
        self.check_stopped();

        match self.state {
            StreamState::Closed => return,
            StreamState::Playing if offset <= 0.0 => return,
            StreamState::Playing => {
                self.stop_stream();
                self.start_stream(offset);
            }
            StreamState::Stopped => self.start_stream(offset),
            StreamState::Paused if offset > 0.0 => {
                self.stop_stream();
                self.start_stream(offset);
            }
            StreamState::Paused => self.resume_stream(),
        }
        self.state = StreamState::Playing;
    }

    pub fn stop(&mut self) {
        self.check_stopped();

        match self.state {
            StreamState::Closed | StreamState::Stopped => return,
            StreamState::Playing | StreamState::Paused => self.stop_stream(),
        }
        self.state = StreamState::Stopped;
    }

    pub fn pause(&mut self) {
        self.check_stopped();

        match self.state {
            StreamState::Closed | StreamState::Stopped | StreamState::Paused => return,
            StreamState::Playing => self.pause_stream(),
        }
        self.state = StreamState::Paused;
    }

    pub fn set_volume(&mut self, value: f32) {
        self.gain = value;
        if let Some(voice) = &self.voice {
            voice.set_gain(value);
        }
    }

    pub fn set_pitch(&mut self, value: f32) {
        self.pitch = value;
        self.native_pitch = self
            .shared
            .source
            .lock()
            .as_mut()
            .is_some_and(|s| s.set_pitch(value));

        if let Some(voice) = &self.voice {
            voice.set_pitch(if self.native_pitch { 1.0 } else { value });
        }
    }

    pub fn query_state(&mut self) -> StreamState {
        self.check_stopped();
        self.state
    }

    /// Playback position in seconds since the start (or loop point).
    pub fn query_offset(&self) -> f64 {
        if self.state == StreamState::Closed || self.sample_rate == 0 {
            return 0.0;
        }
        let proc = self.shared.proc_frames.load(Ordering::Acquire) as f64 / self.sample_rate as f64;
        proc + self.voice.as_ref().map_or(0.0, |v| v.sec_offset())
    }

    /// Whether the decoder shifts pitch itself instead of the playback rate.
    pub fn query_native_pitch(&self) -> bool {
        self.native_pitch
    }

    /// Set when the last playback ended because the source failed to decode.
    pub fn had_decode_error(&self) -> bool {
        self.shared.decode_error.is_set()
    }

    fn ensure_voice(&mut self) -> AudioResult<()> {
        if self.voice.is_none() {
            self.voice = Some(self.ctx.backend.create_voice()?);
        }
        Ok(())
    }

    fn open_source(&mut self, filename: &str) -> AudioResult<()> {
        self.ensure_voice()?;

        let src = source::open_source(
            self.ctx.fs.as_ref(),
            self.ctx.backend.as_ref(),
            filename,
            STREAM_BUF_SIZE,
            self.loop_mode == LoopMode::Looped,
        )
        .inspect_err(|e| warn!("{}: unable to decode audio stream: {}", self.name, e))?;

        self.install_source(src);
        debug!("{}: opened '{}'", self.name, filename);
        Ok(())
    }

    fn install_source(&mut self, src: Box<dyn DataSource>) {
        self.sample_rate = src.sample_rate();
        *self.shared.source.lock() = Some(src);
        self.shared.needs_rewind.clear();
        self.shared.decode_error.clear();

        let (gain, pitch) = (self.gain, self.pitch);
        self.set_volume(gain);
        self.set_pitch(pitch);
    }

    fn close_source(&mut self) {
        if self.shared.source.lock().take().is_some() {
            debug!("{}: source closed", self.name);
        }
        self.sample_rate = 0;
        self.native_pitch = false;
    }

    /// Catches a stream that is still `Playing` although its data has ended
    /// on its own (end of stream or decode error) and the voice drained.
    fn check_stopped(&mut self) {
        if self.state != StreamState::Playing {
            return;
        }
        // nothing queued yet, the voice hasn't started
        if !self.shared.stream_inited.is_set() {
            return;
        }
        // voice stopped with data left: just an underrun
        if !self.shared.source_exhausted.is_set() {
            return;
        }
        if self
            .voice
            .as_ref()
            .is_some_and(|v| v.state() == VoiceState::Playing)
        {
            return;
        }

        self.stop_stream();
        self.state = StreamState::Stopped;
        trace!("{}: drained", self.name);
    }

    fn stop_stream(&mut self) {
        self.shared.thread_term_req.set();
        // a worker parked on a halted sync point must still see the request
        self.ctx.sync.wake();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                error!("{}: stream worker panicked", self.name);
            }
            self.shared.needs_rewind.set();
        }

        // the worker may have restarted the voice right before exiting
        if let Some(voice) = &self.voice {
            voice.stop();
            voice.clear_queue();
        }
        self.shared.proc_frames.store(0, Ordering::Release);
    }

    fn start_stream(&mut self, offset: f64) {
        let Some(voice) = self.voice.clone() else {
            return;
        };
        voice.clear_queue();

        *self.shared.preempt_pause.lock() = false;
        self.shared.stream_inited.clear();
        self.shared.source_exhausted.clear();
        self.shared.thread_term_req.clear();
        self.shared.decode_error.clear();
        if offset > 0.0 {
            self.shared.needs_rewind.set();
        }
        self.shared
            .proc_frames
            .store((offset.max(0.0) * self.sample_rate as f64) as u64, Ordering::Release);

        let worker = StreamWorker {
            name: self.name.clone(),
            shared: self.shared.clone(),
            voice,
            sync: self.ctx.sync.clone(),
            start_offset: offset,
        };

        match thread::Builder::new()
            .name(format!("stream-{}", self.name))
            .spawn(move || worker.run())
        {
            Ok(handle) => self.worker = Some(handle),
            Err(e) => {
                error!("{}: failed to spawn stream worker: {}", self.name, e);
                self.shared.stream_inited.set();
                self.shared.source_exhausted.set();
            }
        }
    }

    fn pause_stream(&mut self) {
        let Some(voice) = &self.voice else {
            return;
        };
        let mut preempt = self.shared.preempt_pause.lock();
        if voice.state() != VoiceState::Playing {
            *preempt = true;
        } else {
            voice.pause();
        }
    }

    fn resume_stream(&mut self) {
        if let Some(voice) = &self.voice {
            resume_voice(&self.shared, voice.as_ref());
        }
    }
}

impl Drop for Stream {
    fn drop(&mut self) {
        self.close();
    }
}

fn resume_voice(shared: &StreamShared, voice: &dyn Voice) {
    let mut preempt = shared.preempt_pause.lock();
    if *preempt {
        *preempt = false;
    } else {
        voice.play();
    }
}

struct StreamWorker {
    name: String,
    shared: Arc<StreamShared>,
    voice: Arc<dyn Voice>,
    sync: Arc<SyncPoint>,
    start_offset: f64,
}

impl StreamWorker {
    fn run(self) {
        trace!("{}: worker started", self.name);
        self.stream_data();
        trace!("{}: worker exited", self.name);
    }

    fn fill(&self, buf: &mut PcmBuffer) -> FillStatus {
        match self.shared.source.lock().as_mut() {
            Some(source) => source.fill_buffer(buf),
            None => FillStatus::Error,
        }
    }

    fn fail(&self) {
        warn!("{}: decode error, stopping stream", self.name);
        self.shared.decode_error.set();
        self.shared.source_exhausted.set();
        self.shared.stream_inited.set();
    }

    fn stream_data(&self) {
        let shared = &self.shared;
        if shared.thread_term_req.is_set() {
            return;
        }

        let format = {
            let mut source = shared.source.lock();
            let Some(source) = source.as_mut() else {
                return;
            };
            if shared.needs_rewind.is_set() {
                source.seek_to_offset(self.start_offset);
            }
            source.format()
        };

        // buffers holding the last samples before a loop wrap
        let mut wrapped = [false; STREAM_BUFS];
        let mut first = true;

        for id in 0..STREAM_BUFS {
            if shared.thread_term_req.is_set() {
                return;
            }

            let mut buf = PcmBuffer::new(id, format);
            let status = self.fill(&mut buf);
            if status == FillStatus::Error {
                self.fail();
                return;
            }

            self.voice.queue_buffer(buf);

            if first {
                resume_voice(shared, self.voice.as_ref());
                first = false;
                shared.stream_inited.set();
            }

            if shared.thread_term_req.is_set() {
                return;
            }

            match status {
                FillStatus::WrapAround => wrapped[id] = true,
                FillStatus::EndOfStream => {
                    shared.source_exhausted.set();
                    break;
                }
                _ => {}
            }
        }

        loop {
            self.sync.pass_secondary_sync_unless(&shared.thread_term_req);
            if shared.thread_term_req.is_set() {
                break;
            }

            while let Some(mut buf) = self.voice.unqueue_processed() {
                if shared.thread_term_req.is_set() {
                    break;
                }

                if std::mem::take(&mut wrapped[buf.id]) {
                    // looped back: offsets restart at the loop point
                    let loop_start = shared
                        .source
                        .lock()
                        .as_ref()
                        .map_or(0, |s| s.loop_start_frames());
                    shared.proc_frames.store(loop_start, Ordering::Release);
                } else {
                    shared
                        .proc_frames
                        .fetch_add(buf.frames() as u64, Ordering::AcqRel);
                }

                if shared.source_exhausted.is_set() {
                    continue;
                }

                let status = self.fill(&mut buf);
                if status == FillStatus::Error {
                    self.fail();
                    return;
                }

                let id = buf.id;
                self.voice.queue_buffer(buf);

                match status {
                    FillStatus::WrapAround => wrapped[id] = true,
                    FillStatus::EndOfStream => shared.source_exhausted.set(),
                    _ => {}
                }
            }

            // restart after an underrun, unless a pause is pending
            if !shared.source_exhausted.is_set() {
                let preempt = shared.preempt_pause.lock();
                if !*preempt && self.voice.state() == VoiceState::Stopped {
                    trace!("{}: buffer underrun, restarting voice", self.name);
                    self.voice.play();
                }
            }

            if shared.thread_term_req.is_set() {
                break;
            }
            thread::sleep(AUDIO_SLEEP);
        }
    }
}
