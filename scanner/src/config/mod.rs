//! Configuration management for the scanner: settings types, loading, and the
//! snapshot provider that re-reads the hot sections on every poll.

mod loader;
mod snapshot;
mod source;
mod types;

pub use loader::*;
pub use snapshot::*;
pub use source::*;
pub use types::*;
