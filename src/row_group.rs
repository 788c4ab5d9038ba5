//! Row-group lifecycle: buffered writing with size-based rollover, and
//! reading with optional page-skip resolution.
//!
//! The writer side keeps one column writer per schema column entirely in
//! memory until `close()`, so the caller can roll the group over once
//! `total_bytes_written + total_compressed_bytes + Σ buffered_values`
//! crosses its target. The reader side hands out plain page streams, or a
//! [`PageCursor`] that positions itself from the page-skip evaluation and
//! exposes a uniform `next()` regardless of whether an index was used.

use std::io::Write;
use std::sync::Arc;

use log::debug;
use once_cell::sync::OnceCell;

use crate::bloom::Sbbf;
use crate::column::reader::{ColumnReader, GenericColumnReader, TypedReaderAccess};
use crate::column::writer::ColumnWriter;
use crate::encoding::PlainCodec;
use crate::evaluate::{
    CandidatePage, IndexToggles, PageSkipEvaluator, Predicate, ScanMetrics, SkipOutcome,
};
use crate::file::{ChunkSource, FileWriter};
use crate::index::{
    validate_parallel, BoundaryOrder, ColumnIndex, OffsetIndex, PageLocation,
};
use crate::metadata::{FileMetaData, RowGroupMetaData};
use crate::page::PageReader;
use crate::properties::ReaderProperties;
use crate::{Result, StrataError};

// ----------------------------------------------------------------------
// Writer

/// Buffered row-group writer obtained from [`FileWriter::append_row_group`].
pub struct RowGroupWriter<'a, W: Write> {
    file: &'a mut FileWriter<W>,
    columns: Vec<Option<ColumnWriter>>,
    rg_index: usize,
    closed: bool,
}

impl<'a, W: Write> RowGroupWriter<'a, W> {
    pub(crate) fn new(file: &'a mut FileWriter<W>) -> Self {
        let schema = file.schema_arc();
        let props = file.props_arc();
        let columns = schema
            .columns()
            .iter()
            .map(|descr| Some(ColumnWriter::new(descr.clone(), Arc::clone(&props))))
            .collect();
        let rg_index = file.num_row_groups();
        Self {
            file,
            columns,
            rg_index,
            closed: false,
        }
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn column(&mut self, i: usize) -> Result<&mut ColumnWriter> {
        self.columns
            .get_mut(i)
            .and_then(Option::as_mut)
            .ok_or_else(|| StrataError::Schema(format!("column {i} out of range")))
    }

    fn live_columns(&self) -> impl Iterator<Item = &ColumnWriter> {
        self.columns.iter().filter_map(Option::as_ref)
    }

    /// Bytes committed to in-memory chunk buffers.
    pub fn total_bytes_written(&self) -> i64 {
        self.live_columns().map(|c| c.total_bytes_written()).sum()
    }

    /// Compressed pages still held back by open dictionaries.
    pub fn total_compressed_bytes(&self) -> i64 {
        self.live_columns().map(|c| c.total_compressed_bytes()).sum()
    }

    /// Encoder-buffered values not yet emitted as pages.
    pub fn estimated_buffered_value_bytes(&self) -> i64 {
        self.live_columns()
            .map(|c| c.estimated_buffered_value_bytes())
            .sum()
    }

    /// The rollover test: all bytes this group would occupy if closed now.
    pub fn should_roll_over(&self, target_bytes: i64) -> bool {
        self.total_bytes_written()
            + self.total_compressed_bytes()
            + self.estimated_buffered_value_bytes()
            >= target_bytes
    }

    /// Flush every column chunk into the file in schema order. All chunks
    /// must have seen the same number of rows.
    pub fn close(mut self) -> Result<i64> {
        if self.closed {
            return Err(StrataError::InvalidArgument(
                "row group writer already closed".into(),
            ));
        }
        self.closed = true;

        let mut num_rows: Option<i64> = None;
        let mut total_byte_size = 0i64;
        let mut chunks = Vec::with_capacity(self.columns.len());
        for (col, slot) in self.columns.iter_mut().enumerate() {
            let writer = slot.take().expect("column writer consumed twice");
            let result = writer.close()?;
            match num_rows {
                None => num_rows = Some(result.rows_written),
                Some(expected) if expected != result.rows_written => {
                    return Err(StrataError::Schema(format!(
                        "column {col} wrote {} rows, expected {expected}",
                        result.rows_written
                    )))
                }
                _ => {}
            }
            total_byte_size += result.metadata.total_uncompressed_size;
            chunks.push(self.file.splice_chunk(self.rg_index, col, result)?);
        }
        let num_rows = num_rows.unwrap_or(0);
        debug!(
            "row group {} closed: {} rows, {} bytes",
            self.rg_index, num_rows, total_byte_size
        );
        self.file.push_row_group(RowGroupMetaData {
            num_rows,
            total_byte_size,
            columns: chunks,
        });
        Ok(num_rows)
    }
}

// ----------------------------------------------------------------------
// Reader

/// A chunk's loaded page-index structures, shared and immutable. The
/// sortedness classification is computed at most once per chunk.
pub struct ChunkIndexes {
    pub column_index: ColumnIndex,
    pub offset_index: OffsetIndex,
    pub chunk_bloom: Option<Sbbf>,
    pub(crate) boundary: OnceCell<BoundaryOrder>,
}

pub struct RowGroupReader {
    source: Arc<dyn ChunkSource>,
    metadata: Arc<FileMetaData>,
    props: ReaderProperties,
    rg_index: usize,
    indexes: Vec<OnceCell<Option<Arc<ChunkIndexes>>>>,
}

impl RowGroupReader {
    pub(crate) fn new(
        source: Arc<dyn ChunkSource>,
        metadata: Arc<FileMetaData>,
        props: ReaderProperties,
        rg_index: usize,
    ) -> Self {
        let num_columns = metadata.num_columns();
        Self {
            source,
            metadata,
            props,
            rg_index,
            indexes: (0..num_columns).map(|_| OnceCell::new()).collect(),
        }
    }

    pub fn metadata(&self) -> &RowGroupMetaData {
        &self.metadata.row_groups[self.rg_index]
    }

    pub fn num_columns(&self) -> usize {
        self.metadata().num_columns()
    }

    pub fn num_rows(&self) -> i64 {
        self.metadata().num_rows
    }

    /// Plain page stream over column `i`.
    pub fn column(&self, i: usize) -> Result<ColumnReader> {
        let chunk = self.metadata().column(i)?.clone();
        let descr = self.metadata.schema.column(i)?.clone();
        let start = chunk.chunk_start();
        let len = chunk.total_compressed_size as usize;
        if start < 0 || start as u64 + len as u64 > self.source.len() {
            return Err(StrataError::CorruptIndex(format!(
                "column chunk [{start}, {}) outside file of {} bytes",
                start + len as i64,
                self.source.len()
            )));
        }
        let bytes = self.source.read_at(start as u64, len)?;
        let page_reader = PageReader::new(
            bytes,
            start,
            chunk.compression,
            chunk.num_values,
            self.props.verify_checksums,
        );
        Ok(ColumnReader::new(descr, page_reader))
    }

    /// Load (once) the chunk's ColumnIndex/OffsetIndex/bloom trailers.
    /// `None` when the chunk was written without an index.
    pub fn page_indexes(&self, i: usize) -> Result<Option<Arc<ChunkIndexes>>> {
        let cell = self
            .indexes
            .get(i)
            .ok_or_else(|| StrataError::Schema(format!("column {i} out of range")))?;
        cell.get_or_try_init(|| {
            let chunk = self.metadata().column(i)?;
            if !chunk.has_page_index() {
                return Ok(None);
            }
            let read_trailer = |offset: i64, len: i32, what: &str| -> Result<Vec<u8>> {
                if offset < 0 || len < 0 || offset as u64 + len as u64 > self.source.len() {
                    return Err(StrataError::CorruptIndex(format!(
                        "{what} at [{offset}, {}) outside file of {} bytes",
                        offset + len as i64,
                        self.source.len()
                    )));
                }
                self.source.read_at(offset as u64, len as usize)
            };
            let ci_bytes = read_trailer(
                chunk.column_index_offset,
                chunk.column_index_length,
                "column index",
            )?;
            let oi_bytes = read_trailer(
                chunk.offset_index_offset,
                chunk.offset_index_length,
                "offset index",
            )?;
            let column_index = ColumnIndex::from_bytes(&ci_bytes)?;
            let offset_index = OffsetIndex::from_bytes(&oi_bytes)?;
            validate_parallel(&column_index, &offset_index)?;
            let chunk_bloom = if chunk.has_bloom_filter() {
                Some(Sbbf::read_from(
                    self.source.as_ref(),
                    chunk.bloom_filter_offset as u64,
                )?)
            } else {
                None
            };
            Ok(Some(Arc::new(ChunkIndexes {
                column_index,
                offset_index,
                chunk_bloom,
                boundary: OnceCell::new(),
            })))
        })
        .map(Clone::clone)
    }

    /// Run the page-skip evaluator for column `i`. `None` when the chunk
    /// carries no index (the caller falls back to a linear scan).
    pub fn evaluate_predicate(
        &self,
        i: usize,
        predicate: &Predicate,
        toggles: IndexToggles,
        metrics: &dyn ScanMetrics,
    ) -> Result<Option<SkipOutcome>> {
        let Some(indexes) = self.page_indexes(i)? else {
            return Ok(None);
        };
        let descr = self.metadata.schema.column(i)?;
        let evaluator = PageSkipEvaluator::new(
            descr.physical_type,
            descr.type_length.max(0) as usize,
            &indexes.column_index,
            &indexes.offset_index,
            indexes.chunk_bloom.as_ref(),
            Some(self.source.as_ref()),
            &indexes.boundary,
            metrics,
        );
        evaluator.evaluate(predicate, toggles).map(Some)
    }

    /// Page stream plus the resolved skip outcome for a predicate query.
    pub fn column_with_index(
        &self,
        i: usize,
        predicate: &Predicate,
        toggles: IndexToggles,
        metrics: &dyn ScanMetrics,
    ) -> Result<(ColumnReader, Option<SkipOutcome>)> {
        let outcome = self.evaluate_predicate(i, predicate, toggles, metrics)?;
        Ok((self.column(i)?, outcome))
    }

    /// Open a typed cursor over column `i`, positioned by the page-skip
    /// evaluation when a predicate is supplied and an index exists.
    pub fn cursor<T: PlainCodec + TypedReaderAccess>(
        &self,
        i: usize,
        predicate: Option<(&Predicate, IndexToggles)>,
        metrics: &dyn ScanMetrics,
    ) -> Result<PageCursor<T>> {
        let reader = self.column(i)?.into_typed::<T>()?;
        let plan = match predicate {
            None => CursorPlan::Scan,
            Some((pred, toggles)) => {
                match self.evaluate_predicate(i, pred, toggles, metrics)? {
                    None => CursorPlan::Scan,
                    Some(SkipOutcome::NonMember) => CursorPlan::Empty,
                    Some(SkipOutcome::Candidates { pages, .. }) => {
                        let indexes = self
                            .page_indexes(i)?
                            .expect("candidates imply a loaded index");
                        CursorPlan::Candidates {
                            pages,
                            locations: indexes.offset_index.page_locations.clone(),
                        }
                    }
                }
            }
        };
        PageCursor::open(reader, plan)
    }
}

// ----------------------------------------------------------------------
// Cursor

enum CursorPlan {
    Scan,
    Candidates {
        pages: Vec<CandidatePage>,
        locations: Vec<PageLocation>,
    },
    Empty,
}

/// Uniform row iterator over one column chunk. With candidates, the cursor
/// seeks straight to each surviving page and stops at its row boundary;
/// without, it scans from the first page. `next()` yields
/// `(row_index, value-or-null)`.
pub struct PageCursor<T: PlainCodec> {
    reader: GenericColumnReader<T>,
    plan: CursorPlan,
    candidate_ix: usize,
    positioned: bool,
    next_row: i64,
}

impl<T: PlainCodec> PageCursor<T> {
    fn open(mut reader: GenericColumnReader<T>, plan: CursorPlan) -> Result<Self> {
        if matches!(plan, CursorPlan::Candidates { .. }) {
            // Seeking jumps over the chunk head, so a leading dictionary
            // page must be decoded up front.
            reader.preload_dictionary()?;
        }
        Ok(Self {
            reader,
            plan,
            candidate_ix: 0,
            positioned: false,
            next_row: 0,
        })
    }

    /// Row offset decoding resumed from (the first candidate's first row).
    pub fn start_row(&self) -> Option<i64> {
        match &self.plan {
            CursorPlan::Candidates { pages, .. } => pages.first().map(|c| c.first_row_index),
            CursorPlan::Scan => Some(0),
            CursorPlan::Empty => None,
        }
    }

    pub fn is_non_member(&self) -> bool {
        matches!(self.plan, CursorPlan::Empty)
    }

    pub fn next(&mut self) -> Result<Option<(i64, Option<T>)>> {
        loop {
            match &self.plan {
                CursorPlan::Empty => return Ok(None),
                CursorPlan::Scan => {
                    let Some((value, rep)) = self.reader.read_one()? else {
                        return Ok(None);
                    };
                    let row = if rep == 0 {
                        let row = self.next_row;
                        self.next_row += 1;
                        row
                    } else {
                        self.next_row - 1
                    };
                    return Ok(Some((row, value)));
                }
                CursorPlan::Candidates { pages, locations } => {
                    let Some(candidate) = pages.get(self.candidate_ix) else {
                        return Ok(None);
                    };
                    if !self.positioned {
                        let location = &locations[candidate.page_index];
                        self.reader.seek_to_page(location.offset)?;
                        // Decode the candidate page now so the drained check
                        // below sees its entries rather than the empty
                        // post-seek state.
                        if !self.reader.has_next()? {
                            return Ok(None);
                        }
                        self.next_row = candidate.first_row_index;
                        self.positioned = true;
                    }
                    // Stop exactly at the page boundary: a row-count check
                    // cannot tell when a page starts mid-row (repeated
                    // columns split rows across pages).
                    if self.reader.page_drained() {
                        self.candidate_ix += 1;
                        self.positioned = false;
                        continue;
                    }
                    let Some((value, rep)) = self.reader.read_one()? else {
                        return Ok(None);
                    };
                    let row = if rep == 0 {
                        let row = self.next_row;
                        self.next_row += 1;
                        row
                    } else {
                        // Continuation entries belong to the row that started
                        // on an earlier page; first_row_index counts rows
                        // *started* before this page.
                        self.next_row - 1
                    };
                    return Ok(Some((row, value)));
                }
            }
        }
    }

    /// Scan forward for the first row whose value satisfies `matches`.
    pub fn find_first(
        &mut self,
        mut matches: impl FnMut(&T) -> bool,
    ) -> Result<Option<(i64, T)>> {
        while let Some((row, value)) = self.next()? {
            if let Some(v) = value {
                if matches(&v) {
                    return Ok(Some((row, v)));
                }
            }
        }
        Ok(None)
    }
}
