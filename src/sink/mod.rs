//! Parquet serialization and staging of serialized parts.

pub mod parquet;
pub mod staging;

pub use parquet::ParquetSerializer;
pub use staging::{MemoryStager, PartStager, StagedPart, TempFileStager, stager_for};
