//! Decodable sources and the byte streams they read from.
//!
//! ```text
//! src/audio/source/
//! ├── mod.rs         ← DecodeMode, create_source / open_source / decode_to_end
//! ├── traits.rs      ← DataSource + FillStatus
//! ├── symphonia.rs   ← SymphoniaSource (format detection, decode, seek)
//! └── filesystem.rs  ← FileSystem trait + LocalFileSystem overlay
//! ```

pub mod filesystem;
pub mod symphonia;
pub mod traits;

use std::io::{Read, Seek, SeekFrom};

pub use filesystem::{FileSystem, LocalFileSystem, OpenedFile};
pub use symphonia::SymphoniaSource;
pub use traits::{DataSource, FillStatus};

use ::symphonia::core::{io::MediaSourceStream, probe::Hint};
use tracing::{debug, warn};

use crate::{
    audio::backend::{AudioBackend, PcmBuffer, PcmData},
    common::{
        errors::{AudioError, AudioResult},
        types::AudioFormat,
    },
};

/// Which sample layout a source decodes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeMode {
    /// Keep the codec's own layout.
    Native,
    /// Convert to `f32` stereo; used when the native layout is not playable.
    Fallback,
}

/// Detect the format of `file` and build a source for it.
pub fn create_source(
    file: OpenedFile,
    max_buf_size: usize,
    looped: bool,
    mode: DecodeMode,
) -> AudioResult<Box<dyn DataSource>> {
    let name = file.path.display().to_string();
    let mut reader = file.reader;

    let mut hint = Hint::new();
    let known = file
        .extension
        .as_deref()
        .map(AudioFormat::from_ext)
        .filter(|f| *f != AudioFormat::Unknown);

    let format = match known {
        Some(format) => format,
        None => {
            let mut header = [0u8; 16];
            let n = reader.read(&mut header).unwrap_or(0);
            reader
                .seek(SeekFrom::Start(0))
                .map_err(|source| AudioError::Open {
                    name: name.clone(),
                    source,
                })?;
            AudioFormat::sniff(&header[..n])
        }
    };

    if format != AudioFormat::Unknown {
        hint.with_extension(format.as_ext());
    }

    let mss = MediaSourceStream::new(reader, Default::default());
    let source = SymphoniaSource::new(name, mss, &hint, max_buf_size, looped, mode)?;
    Ok(Box::new(source))
}

/// Open `name` through `fs`, retrying in [`DecodeMode::Fallback`] when the
/// native layout is unsupported by the codec path or by `backend`.
pub fn open_source(
    fs: &dyn FileSystem,
    backend: &dyn AudioBackend,
    name: &str,
    max_buf_size: usize,
    looped: bool,
) -> AudioResult<Box<dyn DataSource>> {
    let native = create_source(fs.open_read(name)?, max_buf_size, looped, DecodeMode::Native)
        .and_then(|source| {
            if backend.supports(&source.format()) {
                Ok(source)
            } else {
                Err(AudioError::UnsupportedFormat(format!(
                    "{}: {:?}",
                    name,
                    source.format()
                )))
            }
        });

    match native {
        Err(AudioError::UnsupportedFormat(reason)) => {
            debug!("retrying '{}' in fallback mode ({})", name, reason);
            // the first attempt consumed the byte stream
            let file = fs.open_read(name)?;
            create_source(file, max_buf_size, looped, DecodeMode::Fallback)
        }
        other => other,
    }
}

/// Decode a whole file into one buffer; used for sound effects.
pub fn decode_to_end(
    fs: &dyn FileSystem,
    backend: &dyn AudioBackend,
    name: &str,
    chunk_size: usize,
) -> AudioResult<PcmBuffer> {
    let mut source = open_source(fs, backend, name, chunk_size, false)?;
    let format = source.format();

    let mut whole = PcmBuffer::new(0, format);
    let mut chunk = PcmBuffer::new(0, format);

    loop {
        let status = source.fill_buffer(&mut chunk);
        match (&mut whole.data, &chunk.data) {
            (PcmData::I16(all), PcmData::I16(part)) => all.extend_from_slice(part),
            (PcmData::F32(all), PcmData::F32(part)) => all.extend_from_slice(part),
            _ => {}
        }

        match status {
            FillStatus::NoError => {}
            FillStatus::EndOfStream | FillStatus::WrapAround => break,
            FillStatus::Error => {
                warn!("'{}' decoded partially", name);
                if whole.data.is_empty() {
                    return Err(AudioError::decode(name, "no audio could be decoded"));
                }
                break;
            }
        }
    }

    Ok(whole)
}
