//! PCM buffer types exchanged between streams and the playback backend.

/// Sample encoding of a staging buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleFormat {
    I16,
    F32,
}

impl SampleFormat {
    pub fn bytes_per_sample(self) -> usize {
        match self {
            Self::I16 => 2,
            Self::F32 => 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PcmFormat {
    pub sample: SampleFormat,
    pub channels: usize,
    pub rate: u32,
}

impl PcmFormat {
    pub fn new(sample: SampleFormat, channels: usize, rate: u32) -> Self {
        Self {
            sample,
            channels,
            rate,
        }
    }

    pub fn frame_bytes(&self) -> usize {
        self.sample.bytes_per_sample() * self.channels
    }

    /// Whole frames that fit into `bytes`, never less than one.
    pub fn frames_in(&self, bytes: usize) -> usize {
        (bytes / self.frame_bytes().max(1)).max(1)
    }
}

/// Interleaved sample storage.
#[derive(Debug, Clone, PartialEq)]
pub enum PcmData {
    I16(Vec<i16>),
    F32(Vec<f32>),
}

impl PcmData {
    pub fn empty(sample: SampleFormat) -> Self {
        match sample {
            SampleFormat::I16 => Self::I16(Vec::new()),
            SampleFormat::F32 => Self::F32(Vec::new()),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::I16(v) => v.len(),
            Self::F32(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&mut self) {
        match self {
            Self::I16(v) => v.clear(),
            Self::F32(v) => v.clear(),
        }
    }

    pub fn byte_len(&self) -> usize {
        match self {
            Self::I16(v) => v.len() * 2,
            Self::F32(v) => v.len() * 4,
        }
    }

    /// Sample `idx` normalized to `[-1.0, 1.0]`.
    #[inline]
    pub fn sample_f32(&self, idx: usize) -> f32 {
        match self {
            Self::I16(v) => v[idx] as f32 / 32768.0,
            Self::F32(v) => v[idx],
        }
    }
}

/// A staging buffer handed to a voice.
///
/// Buffers are recycled: a stream gets them back from
/// [`Voice::unqueue_processed`](super::Voice::unqueue_processed), refills
/// them and queues them again.
#[derive(Debug, Clone)]
pub struct PcmBuffer {
    pub id: usize,
    pub format: PcmFormat,
    pub data: PcmData,
}

impl PcmBuffer {
    pub fn new(id: usize, format: PcmFormat) -> Self {
        Self {
            id,
            format,
            data: PcmData::empty(format.sample),
        }
    }

    pub fn frames(&self) -> usize {
        self.data.len() / self.format.channels.max(1)
    }

    pub fn duration_secs(&self) -> f64 {
        self.frames() as f64 / self.format.rate.max(1) as f64
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VoiceState {
    Initial,
    Playing,
    Paused,
    Stopped,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_follow_channel_count() {
        let mut buf = PcmBuffer::new(0, PcmFormat::new(SampleFormat::I16, 2, 44_100));
        buf.data = PcmData::I16(vec![0; 882]);
        assert_eq!(buf.frames(), 441);
        assert!((buf.duration_secs() - 0.01).abs() < 1e-9);
    }

    #[test]
    fn frames_in_rounds_down_but_keeps_one() {
        let fmt = PcmFormat::new(SampleFormat::F32, 2, 48_000);
        assert_eq!(fmt.frames_in(32_768), 4_096);
        assert_eq!(fmt.frames_in(3), 1);
    }

    #[test]
    fn i16_samples_are_normalized() {
        let data = PcmData::I16(vec![i16::MIN, 0, 16_384]);
        assert_eq!(data.sample_f32(0), -1.0);
        assert_eq!(data.sample_f32(1), 0.0);
        assert_eq!(data.sample_f32(2), 0.5);
        assert_eq!(data.byte_len(), 6);
    }
}
