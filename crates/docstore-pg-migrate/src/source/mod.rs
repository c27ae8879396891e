//! Document store implementations.

pub mod json_export;
pub mod memory;

pub use json_export::JsonExportSource;
pub use memory::MemorySource;
