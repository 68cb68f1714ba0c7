//! Input loading.
//!
//! Reads newline-delimited JSON (optionally compressed) into a `Dataset`.

pub mod reader;

pub use reader::{NdjsonReader, NdjsonReaderConfig};
