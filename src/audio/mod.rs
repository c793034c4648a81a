//! Streaming audio runtime: BGM tracks, BGS, ME and SE.
//!
//! ```text
//! Mixer ─┬─ Channel (bgm0..N, bgs, me) ── Stream ── worker ── DataSource
//!        ├─ SoundEmitter (SE voice pool + decoded cache)
//!        └─ MeWatch (ducks BGM while an ME plays)
//! ```

pub mod backend;
pub mod channel;
pub mod constants;
pub mod emitter;
pub mod mixer;
pub mod source;
pub mod stream;
pub mod sync;
pub mod watcher;

#[cfg(test)]
pub(crate) mod test_support;

use std::sync::Arc;

pub use backend::{AudioBackend, HeadlessOutput, SoftBackend, Voice};
pub use channel::{Channel, VolumeType};
pub use emitter::SoundEmitter;
pub use mixer::{ChannelSet, Mixer, Track};
pub use source::{FileSystem, LocalFileSystem};
pub use stream::{LoopMode, Stream, StreamState};
pub use sync::SyncPoint;
pub use watcher::WatchState;

/// Collaborators every stream, channel and the SE emitter need.
#[derive(Clone)]
pub struct AudioContext {
    pub backend: Arc<dyn AudioBackend>,
    pub fs: Arc<dyn FileSystem>,
    pub sync: Arc<SyncPoint>,
}
