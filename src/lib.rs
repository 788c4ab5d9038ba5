//! Strata Columnar File Engine
//!
//! A single-file columnar storage format organized as row groups → column
//! chunks → pages, with an optional per-column-chunk page index used for
//! predicate pushdown:
//! - a **ColumnIndex** holding per-page min/max/null statistics,
//! - an **OffsetIndex** holding page byte locations and first-row indices,
//! - **block-split bloom filters** at chunk and (optionally) page granularity.
//!
//! At query time the [`evaluate::PageSkipEvaluator`] combines these structures
//! to skip entire pages that cannot contain a predicate value, falling back to
//! a linear scan when the index is absent.
//!
//! File layout:
//! ```text
//! ┌──────────────────────────────────────────────────┐
//! │ Magic "PAR1"                                     │
//! ├──────────────────────────────────────────────────┤
//! │ Row group payloads (column chunks of pages)      │
//! ├──────────────────────────────────────────────────┤
//! │ Column indexes │ Offset indexes │ Bloom filters  │
//! ├──────────────────────────────────────────────────┤
//! │ File metadata                                    │
//! │ metadata_len: u32 LE │ Magic "PAR1"              │
//! └──────────────────────────────────────────────────┘
//! ```

pub mod bloom;
pub mod column;
pub mod compression;
pub mod encoding;
pub mod evaluate;
pub mod file;
pub mod index;
pub mod metadata;
pub mod page;
pub mod properties;
pub mod record;
pub mod row_group;
pub mod schema;
pub mod statistics;
pub mod types;

#[cfg(test)]
mod tests;

/// Engine error type
#[derive(Debug, thiserror::Error)]
pub enum StrataError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corrupt footer: {0}")]
    CorruptFooter(String),

    #[error("Corrupt index: {0}")]
    CorruptIndex(String),

    #[error("Corrupt page: {0}")]
    CorruptPage(String),

    #[error("Unsupported physical type: {0}")]
    UnsupportedType(String),

    #[error("Compression failure: {0}")]
    CompressionFailure(String),

    #[error("Short read at offset {offset}: wanted {wanted} bytes, got {got}")]
    ShortRead {
        offset: u64,
        wanted: usize,
        got: usize,
    },

    #[error("Capacity error: {0}")]
    CapacityError(String),

    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),

    #[error("Malformed record: {0}")]
    Decode(String),

    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

pub type Result<T> = std::result::Result<T, StrataError>;

pub use bloom::Sbbf;
pub use column::reader::ColumnReader;
pub use column::writer::ColumnWriter;
pub use compression::Compression;
pub use evaluate::{
    CandidatePage, CompareOp, IndexToggles, PageSkipEvaluator, Predicate, ScanMetrics,
    SkipOutcome,
};
pub use file::{scan_file_contents, ChunkSource, FileReader, FileWriter};
pub use index::{BoundaryOrder, ColumnIndex, OffsetIndex, PageLocation};
pub use metadata::{ColumnChunkMetaData, FileMetaData, RowGroupMetaData};
pub use properties::{ReaderProperties, WriterProperties};
pub use row_group::{PageCursor, RowGroupReader, RowGroupWriter};
pub use schema::{ColumnDescriptor, Repetition, Schema};
pub use types::{ByteArray, FixedLenByteArray, Int96, PhysicalType, Value};
