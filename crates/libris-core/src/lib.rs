//! Libris Core — error type, configuration, data paths.

pub mod config;
pub mod error;

pub use config::{ChunkingConfig, DataPaths, LibrisConfig};
pub use error::{Error, Result};
