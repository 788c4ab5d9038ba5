//! File-level reader and writer.
//!
//! The writer owns a position-tracked sink: row-group payloads are spliced
//! in as column chunks close, and `close()` lays the trailer sections out in
//! one pass — column indexes, then offset indexes, then bloom filters — with
//! each chunk's metadata back-patched before the footer is serialized.
//!
//! The reader performs only blocking ranged reads through [`ChunkSource`];
//! both a buffered-file and a memory-mapped implementation are provided.
//! Parsed [`FileMetaData`] is immutable and shared by `Arc`.

use std::fs::File;
use std::io::{BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::Arc;

use byteorder::{ByteOrder, LittleEndian};
use log::{debug, info};
use memmap2::Mmap;
use parking_lot::Mutex;

use crate::bloom::Sbbf;
use crate::column::writer::ColumnCloseResult;
use crate::index::{ColumnIndex, OffsetIndex};
use crate::metadata::{
    ColumnChunkMetaData, FileMetaData, RowGroupMetaData, FOOTER_SIZE, FORMAT_VERSION, MAGIC,
};
use crate::properties::{ReaderProperties, WriterProperties};
use crate::row_group::{RowGroupReader, RowGroupWriter};
use crate::schema::Schema;
use crate::{Result, StrataError};

/// Random-access byte source for ranged reads. Implementations must be safe
/// to share across row-group readers.
pub trait ChunkSource: Send + Sync {
    fn len(&self) -> u64;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Read exactly `len` bytes at `offset`; fewer available bytes is a
    /// `ShortRead`.
    fn read_at(&self, offset: u64, len: usize) -> Result<Vec<u8>>;
}

/// Buffered-file source; the handle is serialized behind a mutex so shared
/// readers can issue interleaved ranged reads.
pub struct FileSource {
    file: Mutex<File>,
    len: u64,
}

impl FileSource {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let len = file.metadata()?.len();
        Ok(Self {
            file: Mutex::new(file),
            len,
        })
    }
}

impl ChunkSource for FileSource {
    fn len(&self) -> u64 {
        self.len
    }

    fn read_at(&self, offset: u64, len: usize) -> Result<Vec<u8>> {
        if offset + len as u64 > self.len {
            return Err(StrataError::ShortRead {
                offset,
                wanted: len,
                got: self.len.saturating_sub(offset) as usize,
            });
        }
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(offset))?;
        let mut buf = vec![0u8; len];
        file.read_exact(&mut buf)?;
        Ok(buf)
    }
}

/// Memory-mapped source; ranged reads are plain slice copies.
pub struct MmapSource {
    map: Mmap,
}

impl MmapSource {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        // Safety: the mapping is read-only and the format forbids writers
        // concurrent with reads on the same file.
        let map = unsafe { Mmap::map(&file)? };
        Ok(Self { map })
    }
}

impl ChunkSource for MmapSource {
    fn len(&self) -> u64 {
        self.map.len() as u64
    }

    fn read_at(&self, offset: u64, len: usize) -> Result<Vec<u8>> {
        let end = offset as usize + len;
        if end > self.map.len() {
            return Err(StrataError::ShortRead {
                offset,
                wanted: len,
                got: self.map.len().saturating_sub(offset as usize),
            });
        }
        Ok(self.map[offset as usize..end].to_vec())
    }
}

/// Write adapter that tracks the absolute file position.
pub struct TrackedWrite<W: Write> {
    inner: W,
    pos: u64,
}

impl<W: Write> TrackedWrite<W> {
    fn new(inner: W) -> Self {
        Self { inner, pos: 0 }
    }

    pub fn pos(&self) -> u64 {
        self.pos
    }

    fn write_all_tracked(&mut self, data: &[u8]) -> Result<()> {
        self.inner.write_all(data)?;
        self.pos += data.len() as u64;
        Ok(())
    }
}

/// Index structures a chunk leaves behind for the trailer pass.
pub(crate) struct ChunkTrailer {
    pub rg: usize,
    pub col: usize,
    pub column_index: Option<ColumnIndex>,
    pub offset_index: Option<OffsetIndex>,
    pub chunk_bloom: Option<Sbbf>,
    pub page_blooms: Vec<Option<Sbbf>>,
}

/// Top-level writer. Committed atomically only on a successful `close()`;
/// a partial file on crash is invalid.
pub struct FileWriter<W: Write> {
    sink: TrackedWrite<W>,
    schema: Arc<Schema>,
    props: Arc<WriterProperties>,
    row_groups: Vec<RowGroupMetaData>,
    trailers: Vec<ChunkTrailer>,
    closed: bool,
}

impl FileWriter<BufWriter<File>> {
    pub fn create(path: &Path, schema: Schema, props: WriterProperties) -> Result<Self> {
        let file = File::create(path)?;
        FileWriter::new(BufWriter::with_capacity(256 * 1024, file), schema, props)
    }
}

impl<W: Write> FileWriter<W> {
    pub fn new(sink: W, schema: Schema, props: WriterProperties) -> Result<Self> {
        if schema.num_columns() == 0 {
            return Err(StrataError::Schema("schema has no columns".into()));
        }
        let mut sink = TrackedWrite::new(sink);
        sink.write_all_tracked(MAGIC)?;
        Ok(Self {
            sink,
            schema: Arc::new(schema),
            props: Arc::new(props),
            row_groups: Vec::new(),
            trailers: Vec::new(),
            closed: false,
        })
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn properties(&self) -> &Arc<WriterProperties> {
        &self.props
    }

    pub fn num_row_groups(&self) -> usize {
        self.row_groups.len()
    }

    /// Start a buffered row group: every column chunk stays in memory until
    /// the group closes, enabling size-based rollover.
    pub fn append_row_group(&mut self) -> Result<RowGroupWriter<'_, W>> {
        if self.closed {
            return Err(StrataError::InvalidArgument(
                "append_row_group on a closed file writer".into(),
            ));
        }
        Ok(RowGroupWriter::new(self))
    }

    /// Splice one finished chunk into the file, rebasing its chunk-relative
    /// offsets to absolute positions.
    pub(crate) fn splice_chunk(
        &mut self,
        rg: usize,
        col: usize,
        result: ColumnCloseResult,
    ) -> Result<ColumnChunkMetaData> {
        let base = self.sink.pos() as i64;
        self.sink.write_all_tracked(&result.bytes)?;

        let mut metadata = result.metadata;
        metadata.data_page_offset += base;
        if let Some(rel) = result.dictionary_page_offset {
            metadata.dictionary_page_offset = base + rel;
        }

        let mut offset_index = result.offset_index;
        if let Some(oi) = &mut offset_index {
            for loc in &mut oi.page_locations {
                loc.offset += base;
            }
        }
        self.trailers.push(ChunkTrailer {
            rg,
            col,
            column_index: result.column_index,
            offset_index,
            chunk_bloom: result.chunk_bloom,
            page_blooms: result.page_blooms,
        });
        Ok(metadata)
    }

    pub(crate) fn push_row_group(&mut self, metadata: RowGroupMetaData) {
        self.row_groups.push(metadata);
    }

    pub(crate) fn schema_arc(&self) -> Arc<Schema> {
        Arc::clone(&self.schema)
    }

    pub(crate) fn props_arc(&self) -> Arc<WriterProperties> {
        Arc::clone(&self.props)
    }

    /// Serialize trailers and the footer. Section order: column indexes,
    /// offset indexes, bloom filters, file metadata, `metadata_len`, magic.
    pub fn close(&mut self) -> Result<FileMetaData> {
        if self.closed {
            return Err(StrataError::InvalidArgument(
                "file writer already closed".into(),
            ));
        }
        self.closed = true;

        // Column indexes.
        for trailer in &self.trailers {
            if let Some(ci) = &trailer.column_index {
                let bytes = ci.to_bytes();
                let chunk = &mut self.row_groups[trailer.rg].columns[trailer.col];
                chunk.column_index_offset = self.sink.pos as i64;
                chunk.column_index_length = bytes.len() as i32;
                self.sink.write_all_tracked(&bytes)?;
            }
        }

        // Offset-index sizes are value-independent, so bloom offsets in the
        // section that follows can be assigned before serialization.
        let oi_section_start = self.sink.pos() as i64;
        let oi_total: i64 = self
            .trailers
            .iter()
            .filter_map(|t| t.offset_index.as_ref())
            .map(|oi| oi.serialized_len() as i64)
            .sum();
        let mut bloom_cursor = oi_section_start + oi_total;
        for trailer in &mut self.trailers {
            if let Some(bloom) = &trailer.chunk_bloom {
                let chunk = &mut self.row_groups[trailer.rg].columns[trailer.col];
                chunk.bloom_filter_offset = bloom_cursor;
                bloom_cursor += bloom.serialized_len() as i64;
            }
            if let Some(oi) = &mut trailer.offset_index {
                for (page, slot) in trailer.page_blooms.iter().enumerate() {
                    if let Some(bloom) = slot {
                        oi.page_bloom_filter_offsets[page] = bloom_cursor;
                        bloom_cursor += bloom.serialized_len() as i64;
                    }
                }
            }
        }

        // Offset indexes.
        for trailer in &self.trailers {
            if let Some(oi) = &trailer.offset_index {
                let bytes = oi.to_bytes();
                let chunk = &mut self.row_groups[trailer.rg].columns[trailer.col];
                chunk.offset_index_offset = self.sink.pos as i64;
                chunk.offset_index_length = bytes.len() as i32;
                self.sink.write_all_tracked(&bytes)?;
            }
        }

        // Bloom filters, in assignment order.
        for trailer in &self.trailers {
            if let Some(bloom) = &trailer.chunk_bloom {
                self.sink.write_all_tracked(&bloom.to_bytes())?;
            }
            for bloom in trailer.page_blooms.iter().flatten() {
                self.sink.write_all_tracked(&bloom.to_bytes())?;
            }
        }
        debug_assert_eq!(self.sink.pos() as i64, bloom_cursor.max(oi_section_start + oi_total));

        let metadata = FileMetaData {
            version: FORMAT_VERSION,
            num_rows: self.row_groups.iter().map(|rg| rg.num_rows).sum(),
            created_by: format!("strata {}", env!("CARGO_PKG_VERSION")),
            schema: (*self.schema).clone(),
            row_groups: std::mem::take(&mut self.row_groups),
        };
        let md_bytes = metadata.to_bytes();
        self.sink.write_all_tracked(&md_bytes)?;
        let mut footer = [0u8; FOOTER_SIZE];
        LittleEndian::write_u32(&mut footer[0..4], md_bytes.len() as u32);
        footer[4..8].copy_from_slice(MAGIC);
        self.sink.write_all_tracked(&footer)?;
        self.sink.inner.flush()?;
        info!(
            "closed file: {} rows, {} row groups, {} bytes",
            metadata.num_rows,
            metadata.num_row_groups(),
            self.sink.pos()
        );
        Ok(metadata)
    }
}

/// Top-level reader.
pub struct FileReader {
    source: Arc<dyn ChunkSource>,
    metadata: Arc<FileMetaData>,
    props: ReaderProperties,
}

impl FileReader {
    /// Open from a path, choosing memory-mapped or buffered ranged reads.
    pub fn open_file(path: &Path, memory_map: bool) -> Result<Self> {
        Self::open_file_with_props(path, memory_map, ReaderProperties::default())
    }

    pub fn open_file_with_props(
        path: &Path,
        memory_map: bool,
        props: ReaderProperties,
    ) -> Result<Self> {
        let source: Arc<dyn ChunkSource> = if memory_map {
            Arc::new(MmapSource::open(path)?)
        } else {
            Arc::new(FileSource::open(path)?)
        };
        debug!(
            "opening {} ({} bytes, mmap={memory_map})",
            path.display(),
            source.len()
        );
        Self::open(source, props)
    }

    pub fn open(source: Arc<dyn ChunkSource>, props: ReaderProperties) -> Result<Self> {
        let metadata = Arc::new(parse_footer(source.as_ref(), &props)?);
        Ok(Self {
            source,
            metadata,
            props,
        })
    }

    pub fn metadata(&self) -> &Arc<FileMetaData> {
        &self.metadata
    }

    pub fn num_row_groups(&self) -> usize {
        self.metadata.num_row_groups()
    }

    pub fn row_group(&self, i: usize) -> Result<RowGroupReader> {
        self.metadata.row_group(i)?;
        Ok(RowGroupReader::new(
            Arc::clone(&self.source),
            Arc::clone(&self.metadata),
            self.props.clone(),
            i,
        ))
    }
}

/// Locate and decode the file metadata: probe the tail, validate the magic,
/// and issue one larger ranged read only if the metadata overflows the probe.
pub fn parse_footer(source: &dyn ChunkSource, props: &ReaderProperties) -> Result<FileMetaData> {
    let file_len = source.len();
    if file_len == 0 {
        return Err(StrataError::CorruptFooter("file is empty".into()));
    }
    let minimum = (MAGIC.len() + FOOTER_SIZE) as u64;
    if file_len < minimum {
        return Err(StrataError::CorruptFooter(format!(
            "file of {file_len} bytes is smaller than the fixed framing ({minimum} bytes)"
        )));
    }

    let probe = (props.footer_read_size.max(FOOTER_SIZE) as u64).min(file_len) as usize;
    let tail = source.read_at(file_len - probe as u64, probe)?;
    if &tail[probe - 4..] != MAGIC {
        return Err(StrataError::CorruptFooter("bad trailing magic".into()));
    }
    let metadata_len = LittleEndian::read_u32(&tail[probe - FOOTER_SIZE..probe - 4]) as u64;
    if metadata_len + minimum > file_len {
        return Err(StrataError::CorruptFooter(format!(
            "metadata length {metadata_len} exceeds file size {file_len}"
        )));
    }

    let md_bytes = if probe as u64 >= metadata_len + FOOTER_SIZE as u64 {
        let start = probe - FOOTER_SIZE - metadata_len as usize;
        tail[start..probe - FOOTER_SIZE].to_vec()
    } else {
        debug!("footer probe of {probe} bytes too small for {metadata_len}-byte metadata");
        source.read_at(file_len - FOOTER_SIZE as u64 - metadata_len, metadata_len as usize)?
    };
    FileMetaData::from_bytes(&md_bytes)
}

/// Read every value of the selected columns (all columns when empty),
/// verifying the per-column row counts agree. Returns the row count.
pub fn scan_file_contents(reader: &FileReader, columns: &[usize]) -> Result<i64> {
    let selected: Vec<usize> = if columns.is_empty() {
        (0..reader.metadata.num_columns()).collect()
    } else {
        columns.to_vec()
    };
    let mut totals = vec![0i64; selected.len()];
    for rg_index in 0..reader.num_row_groups() {
        let rg = reader.row_group(rg_index)?;
        for (slot, &col) in selected.iter().enumerate() {
            let mut column_reader = rg.column(col)?;
            totals[slot] += column_reader.count_rows()?;
        }
    }
    if let Some((&first, rest)) = totals.split_first() {
        if rest.iter().any(|&t| t != first) {
            return Err(StrataError::Schema(format!(
                "row totals disagree across columns: {totals:?}"
            )));
        }
        return Ok(first);
    }
    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct MemSource(Vec<u8>);

    impl ChunkSource for MemSource {
        fn len(&self) -> u64 {
            self.0.len() as u64
        }

        fn read_at(&self, offset: u64, len: usize) -> Result<Vec<u8>> {
            let end = offset as usize + len;
            if end > self.0.len() {
                return Err(StrataError::ShortRead {
                    offset,
                    wanted: len,
                    got: self.0.len().saturating_sub(offset as usize),
                });
            }
            Ok(self.0[offset as usize..end].to_vec())
        }
    }

    #[test]
    fn footer_rejects_bad_magic_and_sizes() {
        let props = ReaderProperties::default();
        assert!(matches!(
            parse_footer(&MemSource(Vec::new()), &props),
            Err(StrataError::CorruptFooter(_))
        ));
        assert!(matches!(
            parse_footer(&MemSource(b"PAR1xxxxXXXX".to_vec()), &props),
            Err(StrataError::CorruptFooter(_))
        ));
        // Plausible framing, absurd metadata length.
        let mut bytes = b"PAR1".to_vec();
        bytes.extend_from_slice(&u32::MAX.to_le_bytes());
        bytes.extend_from_slice(MAGIC);
        assert!(matches!(
            parse_footer(&MemSource(bytes), &props),
            Err(StrataError::CorruptFooter(_))
        ));
    }

    #[test]
    fn short_read_reports_offsets() {
        let source = MemSource(vec![0u8; 16]);
        match source.read_at(10, 10) {
            Err(StrataError::ShortRead { offset, wanted, got }) => {
                assert_eq!((offset, wanted, got), (10, 10, 6));
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
