use crate::audio::backend::{PcmBuffer, PcmFormat};

/// Outcome of one [`DataSource::fill_buffer`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillStatus {
    NoError,
    /// The buffer holds the last samples before the loop point; the source
    /// has already rewound.
    WrapAround,
    /// The buffer holds the last samples of a non-looping source.
    EndOfStream,
    Error,
}

/// A decodable source producing PCM chunks for a stream.
pub trait DataSource: Send {
    /// Decode the next chunk into `buf`, replacing its contents.
    fn fill_buffer(&mut self, buf: &mut PcmBuffer) -> FillStatus;

    fn format(&self) -> PcmFormat;

    fn sample_rate(&self) -> u32 {
        self.format().rate
    }

    /// Reposition to `secs`; anything `<= 0` rewinds to the start.
    fn seek_to_offset(&mut self, secs: f64);

    /// Frame the loop restarts from.
    fn loop_start_frames(&self) -> u64 {
        0
    }

    /// Apply a speed-independent pitch shift. `false` means unsupported and
    /// the caller falls back to changing the playback rate.
    fn set_pitch(&mut self, _pitch: f32) -> bool {
        false
    }
}
