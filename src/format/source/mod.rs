//! Packet sources: files, arbitrary async readers and in-memory packet lists.

pub mod memory;
pub mod reader;

pub use memory::MemorySource;
pub use reader::{FileSource, ReaderSource};
