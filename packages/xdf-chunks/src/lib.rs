pub mod types;
pub mod error;
pub mod config;
pub mod loader;
pub mod normalize;
pub mod cursor;
pub mod adapter;
pub mod iter;
pub mod playback;
pub mod writer;
pub mod profiling;
pub mod mmap_utils;

pub use types::*;
pub use error::{Result, XdfError};
pub use config::IterConfig;
pub use loader::{load_xdf, LoadOptions, StreamLoader, XdfLoader};
pub use cursor::{ChunkCursor, ChunkSlices};
pub use adapter::{ChunkContainer, StreamTemplate, TimeAxis};
pub use iter::{MultiStreamChunk, StreamChunk, XdfIterator, XdfMultiIterator, XdfStreamIterator};
pub use playback::PlaybackClock;
pub use writer::{write_streams, XdfWriter};
