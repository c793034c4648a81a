pub mod audio;
pub mod base;
pub mod filesystem;
pub mod logging;

pub use audio::*;
pub use base::*;
pub use filesystem::*;
pub use logging::*;
