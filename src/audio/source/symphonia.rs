//! Decodable source backed by symphonia.
//!
//! Decodes packet by packet into an interleaved scratch buffer and hands out
//! fixed-size chunks. End of file either rewinds (looped) or ends the stream.

use std::io::ErrorKind;

use symphonia::core::{
    audio::{AudioBufferRef, SampleBuffer},
    codecs::{CODEC_TYPE_NULL, CodecParameters, Decoder, DecoderOptions},
    errors::Error,
    formats::{FormatOptions, FormatReader, SeekMode, SeekTo},
    io::MediaSourceStream,
    meta::MetadataOptions,
    probe::Hint,
    sample::SampleFormat as CodecSampleFormat,
    units::Time,
};
use tracing::{debug, error, trace, warn};

use super::{DecodeMode, FillStatus, traits::DataSource};
use crate::{
    audio::{
        backend::{PcmBuffer, PcmData, PcmFormat, SampleFormat},
        constants::MIXER_CHANNELS,
    },
    common::errors::{AudioError, AudioResult},
};

pub struct SymphoniaSource {
    name: String,
    reader: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    pcm: PcmFormat,
    looped: bool,
    max_frames: usize,
    pending: PcmData,
    pending_pos: usize,
    /// Frames still to drop after a seek landed before the requested time.
    skip_frames: u64,
    decoded_since_rewind: bool,
}

impl SymphoniaSource {
    pub fn new(
        name: String,
        mss: MediaSourceStream,
        hint: &Hint,
        max_buf_size: usize,
        looped: bool,
        mode: DecodeMode,
    ) -> AudioResult<Self> {
        let detected = symphonia::default::get_probe()
            .format(
                hint,
                mss,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(|e| AudioError::decode(&name, e))?;

        let reader = detected.format;
        let track = reader
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| AudioError::decode(&name, "no audio track found"))?;

        let track_id = track.id;
        let params = track.codec_params.clone();
        let rate = params
            .sample_rate
            .ok_or_else(|| AudioError::decode(&name, "unknown sample rate"))?;
        let channels = params
            .channels
            .map(|c| c.count())
            .unwrap_or(MIXER_CHANNELS);

        let pcm = match mode {
            DecodeMode::Native => {
                let sample = native_sample_format(&params).ok_or_else(|| {
                    AudioError::UnsupportedFormat(format!(
                        "{}: {:?} / {:?} bits",
                        name, params.sample_format, params.bits_per_sample
                    ))
                })?;
                if channels > MIXER_CHANNELS {
                    return Err(AudioError::UnsupportedFormat(format!(
                        "{}: {} channels",
                        name, channels
                    )));
                }
                PcmFormat::new(sample, channels, rate)
            }
            DecodeMode::Fallback => {
                PcmFormat::new(SampleFormat::F32, channels.min(MIXER_CHANNELS), rate)
            }
        };

        let decoder = symphonia::default::get_codecs()
            .make(&params, &DecoderOptions::default())
            .map_err(|e| AudioError::decode(&name, e))?;

        debug!(
            "{}: {:?} {}ch {}Hz ({:?} mode, looped: {})",
            name, pcm.sample, pcm.channels, pcm.rate, mode, looped
        );

        Ok(Self {
            name,
            reader,
            decoder,
            track_id,
            pcm,
            looped,
            max_frames: pcm.frames_in(max_buf_size),
            pending: PcmData::empty(pcm.sample),
            pending_pos: 0,
            skip_frames: 0,
            decoded_since_rewind: false,
        })
    }

    /// Decode one packet of our track into `pending`. `Ok(false)` at EOF.
    fn decode_next(&mut self) -> Result<bool, Error> {
        loop {
            let packet = match self.reader.next_packet() {
                Ok(packet) => packet,
                Err(Error::IoError(e)) if e.kind() == ErrorKind::UnexpectedEof => return Ok(false),
                Err(Error::ResetRequired) => {
                    self.decoder.reset();
                    continue;
                }
                Err(e) => return Err(e),
            };

            if packet.track_id() != self.track_id {
                continue;
            }

            let sample = self.pcm.sample;
            let channels = self.pcm.channels;
            let decoded = self.decoder.decode(&packet)?;
            self.pending = interleave(decoded, sample, channels);
            self.pending_pos = 0;
            self.decoded_since_rewind = true;

            if self.skip_frames > 0 {
                let frames = (self.pending.len() / channels.max(1)) as u64;
                let dropped = self.skip_frames.min(frames);
                self.pending_pos = dropped as usize * channels;
                self.skip_frames -= dropped;
            }
            return Ok(true);
        }
    }

    fn drain_pending(&mut self, out: &mut PcmData, want: usize) {
        let n = (self.pending.len() - self.pending_pos).min(want.saturating_sub(out.len()));
        let range = self.pending_pos..self.pending_pos + n;
        match (out, &self.pending) {
            (PcmData::I16(o), PcmData::I16(p)) => o.extend_from_slice(&p[range]),
            (PcmData::F32(o), PcmData::F32(p)) => o.extend_from_slice(&p[range]),
            _ => {}
        }
        self.pending_pos += n;
    }

    fn end_of_file(&mut self) -> FillStatus {
        if !self.looped {
            return FillStatus::EndOfStream;
        }
        // an empty loop would wrap forever without producing audio
        if !self.decoded_since_rewind || !self.rewind() {
            return FillStatus::EndOfStream;
        }
        FillStatus::WrapAround
    }

    fn rewind(&mut self) -> bool {
        self.seek_time(0.0)
    }

    fn seek_time(&mut self, secs: f64) -> bool {
        self.pending.clear();
        self.pending_pos = 0;
        self.skip_frames = 0;
        self.decoded_since_rewind = false;

        let res = self.reader.seek(
            SeekMode::Accurate,
            SeekTo::Time {
                time: Time::from(secs.max(0.0)),
                track_id: Some(self.track_id),
            },
        );

        match res {
            Ok(seeked) => {
                self.skip_frames = seeked.required_ts.saturating_sub(seeked.actual_ts);
                self.decoder.reset();
                true
            }
            Err(e) => {
                warn!("{}: seek to {:.3}s failed: {}", self.name, secs, e);
                false
            }
        }
    }
}

impl DataSource for SymphoniaSource {
    fn fill_buffer(&mut self, buf: &mut PcmBuffer) -> FillStatus {
        if buf.format.sample != self.pcm.sample {
            buf.data = PcmData::empty(self.pcm.sample);
        } else {
            buf.data.clear();
        }
        buf.format = self.pcm;

        let want = self.max_frames * self.pcm.channels;
        let mut soft_errors = 0;

        while buf.data.len() < want {
            if self.pending_pos < self.pending.len() {
                self.drain_pending(&mut buf.data, want);
                continue;
            }

            match self.decode_next() {
                Ok(true) => soft_errors = 0,
                Ok(false) => return self.end_of_file(),
                Err(Error::DecodeError(e)) => {
                    soft_errors += 1;
                    if soft_errors > 1 {
                        error!("{}: decode failed twice: {}", self.name, e);
                        return FillStatus::Error;
                    }
                    warn!("{}: decode error, retrying: {}", self.name, e);
                }
                Err(e) => {
                    error!("{}: {}", self.name, e);
                    return FillStatus::Error;
                }
            }
        }

        trace!("{}: filled buffer {} ({} frames)", self.name, buf.id, buf.frames());
        FillStatus::NoError
    }

    fn format(&self) -> PcmFormat {
        self.pcm
    }

    fn seek_to_offset(&mut self, secs: f64) {
        self.seek_time(secs);
    }
}

/// Sample layout the backend gets when the codec's own format is kept.
fn native_sample_format(params: &CodecParameters) -> Option<SampleFormat> {
    match params.sample_format {
        Some(
            CodecSampleFormat::U8
            | CodecSampleFormat::S8
            | CodecSampleFormat::U16
            | CodecSampleFormat::S16,
        ) => Some(SampleFormat::I16),
        Some(CodecSampleFormat::F32) => Some(SampleFormat::F32),
        Some(_) => None,
        None => match params.bits_per_sample {
            Some(bits) if bits <= 16 => Some(SampleFormat::I16),
            Some(_) => None,
            // lossy codecs decode to float
            None => Some(SampleFormat::F32),
        },
    }
}

fn interleave(decoded: AudioBufferRef<'_>, sample: SampleFormat, channels: usize) -> PcmData {
    let spec = *decoded.spec();
    let src_channels = spec.channels.count();
    let duration = decoded.capacity() as u64;

    match sample {
        SampleFormat::I16 => {
            let mut buf = SampleBuffer::<i16>::new(duration, spec);
            buf.copy_interleaved_ref(decoded);
            PcmData::I16(remix(buf.samples(), src_channels, channels))
        }
        SampleFormat::F32 => {
            let mut buf = SampleBuffer::<f32>::new(duration, spec);
            buf.copy_interleaved_ref(decoded);
            PcmData::F32(remix(buf.samples(), src_channels, channels))
        }
    }
}

/// Map `src`-channel frames onto `out` channels, keeping the front pair and
/// repeating the last channel when upmixing.
fn remix<T: Copy>(samples: &[T], src: usize, out: usize) -> Vec<T> {
    if src == out || src == 0 {
        return samples.to_vec();
    }
    let mut v = Vec::with_capacity(samples.len() / src * out);
    for frame in samples.chunks_exact(src) {
        for ch in 0..out {
            v.push(frame[ch.min(src - 1)]);
        }
    }
    v
}
