pub mod banner;
pub mod errors;
pub mod flag;
pub mod logger;
pub mod types;

pub use errors::*;
pub use flag::*;
pub use logger::*;
pub use types::*;
