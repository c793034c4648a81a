/// A generic boxed error type.
pub type AnyError = Box<dyn std::error::Error + Send + Sync>;

/// A convenient Result alias returning `AnyError`.
pub type AnyResult<T> = std::result::Result<T, AnyError>;

/// Supported audio containers, keyed by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum AudioFormat {
    Ogg,
    Wav,
    Mp3,
    Flac,
    Mp4,
    Webm,
    Unknown,
}

impl AudioFormat {
    pub fn as_ext(&self) -> &'static str {
        match self {
            Self::Ogg => "ogg",
            Self::Wav => "wav",
            Self::Mp3 => "mp3",
            Self::Flac => "flac",
            Self::Mp4 => "m4a",
            Self::Webm => "webm",
            Self::Unknown => "",
        }
    }

    pub fn from_ext(ext: &str) -> Self {
        match ext.to_lowercase().as_str() {
            "ogg" | "oga" => Self::Ogg,
            "wav" | "wave" => Self::Wav,
            "mp3" => Self::Mp3,
            "flac" => Self::Flac,
            "mp4" | "m4a" => Self::Mp4,
            "webm" | "mka" => Self::Webm,
            _ => Self::Unknown,
        }
    }

    /// Sniff the container from the first bytes of a file.
    ///
    /// Used when a file carries no extension, or a wrong one.
    pub fn sniff(header: &[u8]) -> Self {
        if header.len() < 4 {
            return Self::Unknown;
        }
        if header.starts_with(b"OggS") {
            return Self::Ogg;
        }
        if header.starts_with(b"RIFF") && header.len() >= 12 && &header[8..12] == b"WAVE" {
            return Self::Wav;
        }
        if header.starts_with(b"fLaC") {
            return Self::Flac;
        }
        if header.starts_with(&[0x1A, 0x45, 0xDF, 0xA3]) {
            return Self::Webm;
        }
        if header.len() >= 8 && &header[4..8] == b"ftyp" {
            return Self::Mp4;
        }
        if header.starts_with(b"ID3") || (header[0] == 0xFF && (header[1] & 0xE0) == 0xE0) {
            return Self::Mp3;
        }
        Self::Unknown
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sniff_ogg() {
        assert_eq!(AudioFormat::sniff(b"OggS\x00\x02"), AudioFormat::Ogg);
    }

    #[test]
    fn sniff_wav() {
        assert_eq!(AudioFormat::sniff(b"RIFF\x24\x00\x00\x00WAVEfmt "), AudioFormat::Wav);
    }

    #[test]
    fn sniff_mp3_sync_word() {
        assert_eq!(AudioFormat::sniff(&[0xFF, 0xFB, 0x90, 0x64]), AudioFormat::Mp3);
    }

    #[test]
    fn sniff_short_header_is_unknown() {
        assert_eq!(AudioFormat::sniff(b"Og"), AudioFormat::Unknown);
    }

    #[test]
    fn ext_round_trip_is_case_insensitive() {
        assert_eq!(AudioFormat::from_ext("OGG"), AudioFormat::Ogg);
        assert_eq!(AudioFormat::from_ext("m4a").as_ext(), "m4a");
        assert_eq!(AudioFormat::from_ext("mid"), AudioFormat::Unknown);
    }
}
