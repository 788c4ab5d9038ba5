//! Typed column chunk writer.
//!
//! A [`GenericColumnWriter`] accumulates encoded values into a page buffer,
//! tracks page-scoped statistics and bloom fingerprints, and emits a data
//! page once the encoder crosses the page-size threshold. With the index
//! enabled, every emitted page appends its `(min, max, null_count)` to the
//! chunk's ColumnIndex and its location to the OffsetIndex; the chunk bloom
//! filter (and optionally a per-page filter) receives every value hash.
//!
//! Dictionary-encoded chunks buffer compressed pages in memory until the
//! dictionary page is final; crossing `dictionary_pagesize_limit` emits the
//! dictionary, flushes the buffered pages, and falls back to PLAIN.

use std::sync::Arc;

use log::{debug, warn};

use crate::bloom::Sbbf;
use crate::encoding::{DictEncoder, Encoding, PlainCodec, PlainValueEncoder};
use crate::encoding::encode_levels;
use crate::index::{detect_boundary_order, ColumnIndex, OffsetIndex};
use crate::metadata::ColumnChunkMetaData;
use crate::page::{CompressedPage, FinishedChunk, PageWriter};
use crate::properties::WriterProperties;
use crate::schema::ColumnDescriptor;
use crate::statistics::{
    truncate_down, truncate_up, TypedStatistics, PAGE_INDEX_MAX_STRING_LENGTH,
};
use crate::types::{
    ByteArray, FixedLenByteArray, Int96, PhysicalType,
};
use crate::{Result, StrataError};

/// Everything a finished chunk hands to the row-group writer. Offsets inside
/// `metadata` and `offset_index` are relative to the chunk start and are
/// rebased when the chunk is spliced into the file.
pub struct ColumnCloseResult {
    pub bytes: Vec<u8>,
    pub rows_written: i64,
    pub metadata: ColumnChunkMetaData,
    /// Chunk-relative dictionary page offset, when one was written. Kept
    /// apart from `metadata` because relative offset 0 is a valid position.
    pub dictionary_page_offset: Option<i64>,
    pub column_index: Option<ColumnIndex>,
    pub offset_index: Option<OffsetIndex>,
    pub chunk_bloom: Option<Sbbf>,
    pub page_blooms: Vec<Option<Sbbf>>,
}

pub struct GenericColumnWriter<T: PlainCodec> {
    descr: ColumnDescriptor,
    props: Arc<WriterProperties>,
    pager: PageWriter,

    plain_encoder: PlainValueEncoder<T>,
    dict_encoder: Option<DictEncoder<T>>,
    encoding: Encoding,
    fallback: bool,

    def_levels: Vec<i16>,
    rep_levels: Vec<i16>,
    num_buffered_values: i64,
    num_buffered_rows: i64,

    page_stats: TypedStatistics<T>,
    chunk_stats: TypedStatistics<T>,

    chunk_bloom: Option<Sbbf>,
    current_page_bloom: Option<Sbbf>,

    index_enabled: Option<bool>,
    column_index: ColumnIndex,
    offset_index: OffsetIndex,
    page_blooms: Vec<Option<Sbbf>>,
    page_index_memory: usize,

    buffered_pages: Vec<CompressedPage>,
    total_compressed_bytes: i64,
    rows_written: i64,
    closed: bool,
}

impl<T: PlainCodec> GenericColumnWriter<T> {
    pub fn new(descr: ColumnDescriptor, props: Arc<WriterProperties>) -> Self {
        debug_assert_eq!(descr.physical_type, T::PHYSICAL_TYPE);
        let use_dictionary =
            props.dictionary_enabled && T::PHYSICAL_TYPE != PhysicalType::Boolean;
        let chunk_bloom = if props.bloom_enabled {
            Some(Sbbf::new(Sbbf::optimal_num_of_bytes(
                props.bloom_ndv,
                props.bloom_fpp,
            )))
        } else {
            None
        };
        Self {
            pager: PageWriter::new(props.compression),
            plain_encoder: PlainValueEncoder::default(),
            dict_encoder: use_dictionary.then(DictEncoder::default),
            encoding: if use_dictionary {
                Encoding::Dictionary
            } else {
                Encoding::Plain
            },
            fallback: false,
            def_levels: Vec::new(),
            rep_levels: Vec::new(),
            num_buffered_values: 0,
            num_buffered_rows: 0,
            page_stats: TypedStatistics::default(),
            chunk_stats: TypedStatistics::default(),
            chunk_bloom,
            current_page_bloom: None,
            index_enabled: None,
            column_index: ColumnIndex::default(),
            offset_index: OffsetIndex::default(),
            page_blooms: Vec::new(),
            page_index_memory: 0,
            buffered_pages: Vec::new(),
            total_compressed_bytes: 0,
            rows_written: 0,
            closed: false,
            descr,
            props,
        }
    }

    pub fn descr(&self) -> &ColumnDescriptor {
        &self.descr
    }

    /// Size of the values not yet committed to a page, the caller-visible
    /// input to row-group rollover decisions.
    pub fn estimated_buffered_value_bytes(&self) -> i64 {
        match &self.dict_encoder {
            Some(d) if !self.fallback => d.estimated_data_size() as i64,
            _ => self.plain_encoder.estimated_size() as i64,
        }
    }

    pub fn total_bytes_written(&self) -> i64 {
        self.pager.bytes_written()
    }

    /// Compressed pages buffered while the dictionary is still open.
    pub fn total_compressed_bytes(&self) -> i64 {
        self.total_compressed_bytes
    }

    pub fn rows_written(&self) -> i64 {
        self.rows_written
    }

    /// Bytes held by the in-progress ColumnIndex/OffsetIndex.
    pub fn page_index_memory_consumption(&self) -> usize {
        self.page_index_memory
    }

    /// Append a batch of levels and values.
    ///
    /// For optional/repeated columns `def_levels` (and `rep_levels` when the
    /// column repeats) must cover every entry; `values` holds only the
    /// entries whose definition level reaches the maximum.
    pub fn write_batch(
        &mut self,
        def_levels: Option<&[i16]>,
        rep_levels: Option<&[i16]>,
        values: &[T],
        with_index: bool,
    ) -> Result<usize> {
        if self.closed {
            return Err(StrataError::InvalidArgument(
                "write_batch on a closed column writer".into(),
            ));
        }
        match self.index_enabled {
            None => self.index_enabled = Some(with_index),
            Some(prev) if prev != with_index => {
                return Err(StrataError::InvalidArgument(
                    "with_index must be consistent across write_batch calls".into(),
                ))
            }
            _ => {}
        }

        let max_def = self.descr.max_def_level();
        let max_rep = self.descr.max_rep_level();

        let num_levels = match def_levels {
            Some(d) => d.len(),
            None if max_def > 0 => {
                return Err(StrataError::InvalidArgument(format!(
                    "column {} is optional and requires definition levels",
                    self.descr.name
                )))
            }
            None => values.len(),
        };
        if let Some(r) = rep_levels {
            if r.len() != num_levels {
                return Err(StrataError::InvalidArgument(format!(
                    "definition/repetition level lengths disagree: {} vs {}",
                    num_levels,
                    r.len()
                )));
            }
        } else if max_rep > 0 {
            return Err(StrataError::InvalidArgument(format!(
                "column {} repeats and requires repetition levels",
                self.descr.name
            )));
        }
        let expected_values = match def_levels {
            Some(d) => d.iter().filter(|&&l| l == max_def).count(),
            None => num_levels,
        };
        if values.len() != expected_values {
            return Err(StrataError::InvalidArgument(format!(
                "expected {} values for {} max-definition levels, got {}",
                expected_values,
                num_levels,
                values.len()
            )));
        }
        if T::PHYSICAL_TYPE == PhysicalType::FixedLenByteArray {
            let width = self.descr.type_length as usize;
            if values.iter().any(|v| v.encoded_size_hint() != width) {
                return Err(StrataError::InvalidArgument(format!(
                    "FIXED_LEN_BYTE_ARRAY column {} requires {}-byte values",
                    self.descr.name, width
                )));
            }
        }

        // Mini-batching keeps the page-size check firing at a predictable
        // granularity even for huge input batches.
        let batch = self.props.write_batch_size;
        let mut level_offset = 0;
        let mut value_offset = 0;
        while level_offset < num_levels {
            let this_levels = batch.min(num_levels - level_offset);
            let def_slice = def_levels.map(|d| &d[level_offset..level_offset + this_levels]);
            let rep_slice = rep_levels.map(|r| &r[level_offset..level_offset + this_levels]);
            let this_values = match def_slice {
                Some(d) => d.iter().filter(|&&l| l == max_def).count(),
                None => this_levels,
            };
            self.write_mini_batch(
                def_slice,
                rep_slice,
                &values[value_offset..value_offset + this_values],
            )?;
            level_offset += this_levels;
            value_offset += this_values;
        }
        Ok(value_offset)
    }

    fn write_mini_batch(
        &mut self,
        def_levels: Option<&[i16]>,
        rep_levels: Option<&[i16]>,
        values: &[T],
    ) -> Result<()> {
        let num_levels = def_levels.map_or(values.len(), <[i16]>::len);
        let nulls = num_levels - values.len();

        if let Some(def) = def_levels {
            self.def_levels.extend_from_slice(def);
        }
        let rows = match rep_levels {
            Some(rep) => {
                self.rep_levels.extend_from_slice(rep);
                rep.iter().filter(|&&l| l == 0).count()
            }
            None => num_levels,
        };
        self.rows_written += rows as i64;
        self.num_buffered_rows += rows as i64;
        self.num_buffered_values += num_levels as i64;

        match &mut self.dict_encoder {
            Some(d) if !self.fallback => d.put(values),
            _ => self.plain_encoder.put(values),
        }
        self.page_stats.update(values, nulls as i64);

        if self.index_enabled == Some(true) {
            if self.props.page_bloom_enabled && self.current_page_bloom.is_none() {
                // A page holds at most data_pagesize bytes of values; size the
                // page filter for that many minimum-width entries.
                let per_page_ndv = (self.props.data_pagesize / 4).max(1) as u64;
                self.current_page_bloom = Some(Sbbf::new(Sbbf::optimal_num_of_bytes(
                    per_page_ndv.min(self.props.bloom_ndv),
                    self.props.bloom_fpp,
                )));
            }
            for v in values {
                let hash = v.bloom_hash();
                if let Some(bloom) = &mut self.chunk_bloom {
                    bloom.insert_hash(hash);
                }
                if let Some(bloom) = &mut self.current_page_bloom {
                    bloom.insert_hash(hash);
                }
            }
        } else if let Some(bloom) = &mut self.chunk_bloom {
            for v in values {
                bloom.insert_hash(v.bloom_hash());
            }
        }

        let estimated = match &self.dict_encoder {
            Some(d) if !self.fallback => d.estimated_data_size(),
            _ => self.plain_encoder.estimated_size(),
        };
        if estimated >= self.props.data_pagesize {
            self.add_data_page()?;
        }
        if self.dict_encoder.is_some() && !self.fallback {
            self.check_dictionary_size_limit()?;
        }
        Ok(())
    }

    /// Close out the current page buffer: RLE the levels, concatenate
    /// `[rep | def | values]`, record stats/bloom/index entries, compress,
    /// and either buffer (dictionary still open) or write through.
    fn add_data_page(&mut self) -> Result<()> {
        if self.num_buffered_values == 0 {
            return Ok(());
        }
        let max_def = self.descr.max_def_level();
        let max_rep = self.descr.max_rep_level();

        let mut payload = Vec::new();
        if max_rep > 0 {
            let block = encode_levels(&self.rep_levels, max_rep);
            payload.extend_from_slice(&(block.len() as u32).to_le_bytes());
            payload.extend_from_slice(&block);
        }
        if max_def > 0 {
            let block = encode_levels(&self.def_levels, max_def);
            payload.extend_from_slice(&(block.len() as u32).to_le_bytes());
            payload.extend_from_slice(&block);
        }
        match &mut self.dict_encoder {
            Some(d) if !self.fallback => payload.extend_from_slice(&d.flush_indices()),
            _ => payload.extend_from_slice(&self.plain_encoder.flush()),
        }

        let mut stats = self.page_stats.encode();
        stats.apply_size_limit(self.props.max_statistics_size);

        if self.index_enabled == Some(true) {
            self.add_page_stats_to_column_index(&stats)?;
            self.page_blooms.push(self.current_page_bloom.take());
        }

        let compressed = self.pager.compress(&payload)?;
        let page = CompressedPage {
            uncompressed_size: payload.len(),
            payload: compressed,
            num_values: self.num_buffered_values as i32,
            num_rows: self.num_buffered_rows as i32,
            encoding: self.encoding,
            statistics: stats.is_set().then_some(stats),
        };

        if self.dict_encoder.is_some() && !self.fallback {
            self.total_compressed_bytes += page.buffered_size() as i64;
            self.buffered_pages.push(page);
        } else {
            self.write_page_through(page)?;
        }

        self.chunk_stats.merge(&self.page_stats);
        self.page_stats.reset();
        self.def_levels.clear();
        self.rep_levels.clear();
        self.num_buffered_values = 0;
        self.num_buffered_rows = 0;
        Ok(())
    }

    fn write_page_through(&mut self, page: CompressedPage) -> Result<()> {
        let location = self.pager.write_data_page(&page)?;
        if self.index_enabled == Some(true) {
            self.reserve_page_index_memory(std::mem::size_of::<crate::index::PageLocation>())?;
            self.offset_index.page_locations.push(location);
        }
        Ok(())
    }

    /// Append one page's statistics to the ColumnIndex. Pages without usable
    /// stats (all-null, or an upper bound that cannot truncate) keep the
    /// arrays parallel with empty bounds and `null_pages = true`.
    fn add_page_stats_to_column_index(
        &mut self,
        stats: &crate::statistics::EncodedStatistics,
    ) -> Result<()> {
        let mut min = Vec::new();
        let mut max = Vec::new();
        let mut null_page = true;
        if let (Some(smin), Some(smax)) = (&stats.min, &stats.max) {
            min = truncate_down(smin, PAGE_INDEX_MAX_STRING_LENGTH);
            match truncate_up(smax, PAGE_INDEX_MAX_STRING_LENGTH) {
                Ok(up) => {
                    max = up;
                    null_page = false;
                }
                Err(StrataError::CapacityError(msg)) => {
                    // Demote this page's stats to unset and continue.
                    warn!(
                        "column {}: page stats demoted to unset: {msg}",
                        self.descr.name
                    );
                    min = Vec::new();
                    max = Vec::new();
                }
                Err(e) => return Err(e),
            }
        }
        self.reserve_page_index_memory(min.len() + max.len() + 16)?;
        self.column_index.null_pages.push(null_page);
        self.column_index.min_values.push(min);
        self.column_index.max_values.push(max);
        self.column_index.null_counts.push(stats.null_count);
        Ok(())
    }

    fn reserve_page_index_memory(&mut self, bytes: usize) -> Result<()> {
        self.page_index_memory += bytes;
        if self.page_index_memory > self.props.page_index_memory_cap {
            return Err(StrataError::ResourceExhausted(format!(
                "page index memory for column {} reached {} bytes (cap {})",
                self.descr.name, self.page_index_memory, self.props.page_index_memory_cap
            )));
        }
        Ok(())
    }

    fn write_dictionary_page(&mut self) -> Result<()> {
        let dict = self
            .dict_encoder
            .as_ref()
            .expect("dictionary page requested without a dictionary encoder");
        let payload = dict.dict_payload();
        let num_entries = dict.num_entries() as i32;
        self.pager
            .write_dictionary_page(&payload, num_entries, false)?;
        Ok(())
    }

    /// One dictionary page per chunk; crossing the size limit switches the
    /// remainder of the chunk to PLAIN.
    fn check_dictionary_size_limit(&mut self) -> Result<()> {
        let dict_size = match &self.dict_encoder {
            Some(d) if d.dict_encoded_size() >= self.props.dictionary_pagesize_limit => {
                d.dict_encoded_size()
            }
            _ => return Ok(()),
        };
        debug!(
            "column {}: dictionary reached {dict_size} bytes, falling back to PLAIN",
            self.descr.name
        );
        self.write_dictionary_page()?;
        self.flush_buffered_pages()?;
        self.fallback = true;
        self.encoding = Encoding::Plain;
        Ok(())
    }

    fn flush_buffered_pages(&mut self) -> Result<()> {
        self.add_data_page()?;
        for page in std::mem::take(&mut self.buffered_pages) {
            self.write_page_through(page)?;
        }
        self.total_compressed_bytes = 0;
        Ok(())
    }

    pub fn close(mut self) -> Result<ColumnCloseResult> {
        if self.closed {
            return Err(StrataError::InvalidArgument(
                "column writer already closed".into(),
            ));
        }
        self.closed = true;

        if self.dict_encoder.is_some() && !self.fallback {
            // Flush the outstanding page first so the final dictionary is
            // complete, then emit it ahead of the buffered data pages.
            self.add_data_page()?;
            self.write_dictionary_page()?;
            for page in std::mem::take(&mut self.buffered_pages) {
                self.write_page_through(page)?;
            }
            self.total_compressed_bytes = 0;
        } else {
            self.flush_buffered_pages()?;
        }

        let mut chunk_statistics = self.chunk_stats.encode();
        chunk_statistics.apply_size_limit(self.props.max_statistics_size);

        let index_enabled = self.index_enabled == Some(true) && self.column_index.num_pages() > 0;
        if index_enabled {
            self.column_index.boundary_order =
                Some(detect_boundary_order(&self.column_index, T::PHYSICAL_TYPE)?);
            // Keep the bloom-offset array parallel from the start; offsets
            // are assigned when the trailers hit the file.
            self.offset_index.page_bloom_filter_offsets =
                vec![0; self.offset_index.num_pages()];
        }

        let mut encodings = vec![Encoding::Rle];
        if self.dict_encoder.is_some() {
            encodings.push(Encoding::Dictionary);
        }
        if self.dict_encoder.is_none() || self.fallback {
            encodings.push(Encoding::Plain);
        }

        let FinishedChunk {
            bytes,
            data_page_offset,
            dictionary_page_offset,
            total_compressed_size,
            total_uncompressed_size,
            num_values,
        } = self.pager.finish();

        let metadata = ColumnChunkMetaData {
            data_page_offset,
            dictionary_page_offset: 0,
            total_compressed_size,
            total_uncompressed_size,
            num_values,
            encodings,
            compression: self.props.compression,
            statistics: (self.rows_written > 0 && chunk_statistics.is_set())
                .then_some(chunk_statistics),
            ..Default::default()
        };

        Ok(ColumnCloseResult {
            bytes,
            rows_written: self.rows_written,
            metadata,
            dictionary_page_offset,
            column_index: index_enabled.then_some(self.column_index),
            offset_index: index_enabled.then_some(self.offset_index),
            chunk_bloom: self.chunk_bloom,
            page_blooms: self.page_blooms,
        })
    }
}

/// Uniform dispatch over the eight typed writers.
pub enum ColumnWriter {
    Boolean(GenericColumnWriter<bool>),
    Int32(GenericColumnWriter<i32>),
    Int64(GenericColumnWriter<i64>),
    Int96(GenericColumnWriter<Int96>),
    Float(GenericColumnWriter<f32>),
    Double(GenericColumnWriter<f64>),
    ByteArray(GenericColumnWriter<ByteArray>),
    FixedLenByteArray(GenericColumnWriter<FixedLenByteArray>),
}

macro_rules! dispatch_writer {
    ($self:expr, $w:ident => $body:expr) => {
        match $self {
            ColumnWriter::Boolean($w) => $body,
            ColumnWriter::Int32($w) => $body,
            ColumnWriter::Int64($w) => $body,
            ColumnWriter::Int96($w) => $body,
            ColumnWriter::Float($w) => $body,
            ColumnWriter::Double($w) => $body,
            ColumnWriter::ByteArray($w) => $body,
            ColumnWriter::FixedLenByteArray($w) => $body,
        }
    };
}

impl ColumnWriter {
    pub fn new(descr: ColumnDescriptor, props: Arc<WriterProperties>) -> Self {
        match descr.physical_type {
            PhysicalType::Boolean => {
                ColumnWriter::Boolean(GenericColumnWriter::new(descr, props))
            }
            PhysicalType::Int32 => ColumnWriter::Int32(GenericColumnWriter::new(descr, props)),
            PhysicalType::Int64 => ColumnWriter::Int64(GenericColumnWriter::new(descr, props)),
            PhysicalType::Int96 => ColumnWriter::Int96(GenericColumnWriter::new(descr, props)),
            PhysicalType::Float => ColumnWriter::Float(GenericColumnWriter::new(descr, props)),
            PhysicalType::Double => ColumnWriter::Double(GenericColumnWriter::new(descr, props)),
            PhysicalType::ByteArray => {
                ColumnWriter::ByteArray(GenericColumnWriter::new(descr, props))
            }
            PhysicalType::FixedLenByteArray => {
                ColumnWriter::FixedLenByteArray(GenericColumnWriter::new(descr, props))
            }
        }
    }

    pub fn physical_type(&self) -> PhysicalType {
        dispatch_writer!(self, w => w.descr().physical_type)
    }

    pub fn estimated_buffered_value_bytes(&self) -> i64 {
        dispatch_writer!(self, w => w.estimated_buffered_value_bytes())
    }

    pub fn total_bytes_written(&self) -> i64 {
        dispatch_writer!(self, w => w.total_bytes_written())
    }

    pub fn total_compressed_bytes(&self) -> i64 {
        dispatch_writer!(self, w => w.total_compressed_bytes())
    }

    pub fn rows_written(&self) -> i64 {
        dispatch_writer!(self, w => w.rows_written())
    }

    pub fn page_index_memory_consumption(&self) -> usize {
        dispatch_writer!(self, w => w.page_index_memory_consumption())
    }

    pub fn close(self) -> Result<ColumnCloseResult> {
        dispatch_writer!(self, w => w.close())
    }

    /// Downcast to the typed writer for `T`.
    pub fn typed<T: TypedWriterAccess>(&mut self) -> Result<&mut GenericColumnWriter<T>> {
        let physical = self.physical_type();
        T::from_writer(self).ok_or_else(|| {
            StrataError::UnsupportedType(format!(
                "requested a {} writer but the column is {}",
                T::PHYSICAL_TYPE,
                physical
            ))
        })
    }
}

/// Glue for [`ColumnWriter::typed`].
pub trait TypedWriterAccess: PlainCodec {
    fn from_writer(w: &mut ColumnWriter) -> Option<&mut GenericColumnWriter<Self>>;
}

macro_rules! typed_writer_access {
    ($ty:ty, $variant:ident) => {
        impl TypedWriterAccess for $ty {
            fn from_writer(w: &mut ColumnWriter) -> Option<&mut GenericColumnWriter<Self>> {
                match w {
                    ColumnWriter::$variant(inner) => Some(inner),
                    _ => None,
                }
            }
        }
    };
}

typed_writer_access!(bool, Boolean);
typed_writer_access!(i32, Int32);
typed_writer_access!(i64, Int64);
typed_writer_access!(Int96, Int96);
typed_writer_access!(f32, Float);
typed_writer_access!(f64, Double);
typed_writer_access!(ByteArray, ByteArray);
typed_writer_access!(FixedLenByteArray, FixedLenByteArray);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Repetition;

    fn props_with_pagesize(bytes: usize) -> Arc<WriterProperties> {
        Arc::new(
            WriterProperties::builder()
                .data_pagesize(bytes)
                .write_batch_size(10)
                .build(),
        )
    }

    #[test]
    fn small_pages_produce_parallel_index_arrays() {
        let descr = ColumnDescriptor::new("c", PhysicalType::Int32, Repetition::Required);
        // 40 bytes per page => 10 values per page.
        let mut writer = GenericColumnWriter::<i32>::new(descr, props_with_pagesize(40));
        let values: Vec<i32> = (0..100).collect();
        writer.write_batch(None, None, &values, true).unwrap();
        let result = writer.close().unwrap();

        let ci = result.column_index.unwrap();
        let oi = result.offset_index.unwrap();
        assert_eq!(ci.num_pages(), oi.num_pages());
        assert!(ci.num_pages() >= 2);
        assert_eq!(ci.boundary_order, Some(crate::index::BoundaryOrder::Ascending));
        assert_eq!(oi.page_locations[0].first_row_index, 0);
        for pair in oi.page_locations.windows(2) {
            assert!(pair[0].first_row_index < pair[1].first_row_index);
        }
        assert_eq!(result.metadata.num_values, 100);
        assert_eq!(result.page_blooms.len(), ci.num_pages());
    }

    #[test]
    fn nulls_are_counted_per_page() {
        let descr = ColumnDescriptor::new("c", PhysicalType::Int64, Repetition::Optional);
        let mut writer = GenericColumnWriter::<i64>::new(descr, props_with_pagesize(1 << 20));
        let def_levels: Vec<i16> = (0..20).map(|i| (i % 2 == 0) as i16).collect();
        let values: Vec<i64> = (0..10).collect();
        writer
            .write_batch(Some(&def_levels), None, &values, true)
            .unwrap();
        let result = writer.close().unwrap();
        let ci = result.column_index.unwrap();
        assert_eq!(ci.null_counts, vec![10]);
        assert!(!ci.null_pages[0]);
    }

    #[test]
    fn value_count_mismatch_is_invalid() {
        let descr = ColumnDescriptor::new("c", PhysicalType::Int32, Repetition::Optional);
        let mut writer = GenericColumnWriter::<i32>::new(descr, props_with_pagesize(1 << 20));
        let err = writer
            .write_batch(Some(&[1, 1, 0]), None, &[5], true)
            .unwrap_err();
        assert!(matches!(err, StrataError::InvalidArgument(_)));
    }

    #[test]
    fn memory_cap_rejects_with_resource_exhausted() {
        let descr = ColumnDescriptor::new("c", PhysicalType::Int32, Repetition::Required);
        let props = Arc::new(
            WriterProperties::builder()
                .data_pagesize(8)
                .page_index_memory_cap(32)
                .build(),
        );
        let mut writer = GenericColumnWriter::<i32>::new(descr, props);
        let values: Vec<i32> = (0..10_000).collect();
        let err = writer.write_batch(None, None, &values, true).unwrap_err();
        assert!(matches!(err, StrataError::ResourceExhausted(_)));
    }

    #[test]
    fn dictionary_fallback_switches_to_plain() {
        let descr = ColumnDescriptor::new("c", PhysicalType::ByteArray, Repetition::Required);
        let props = Arc::new(
            WriterProperties::builder()
                .dictionary_enabled(true)
                .dictionary_pagesize_limit(64)
                .data_pagesize(1 << 20)
                .build(),
        );
        let mut writer = GenericColumnWriter::<ByteArray>::new(descr, props);
        let values: Vec<ByteArray> = (0..64)
            .map(|i| ByteArray::from(format!("value-{i:04}").as_str()))
            .collect();
        writer.write_batch(None, None, &values, false).unwrap();
        assert!(writer.fallback);
        let result = writer.close().unwrap();
        assert!(result.metadata.has_dictionary_page());
        assert!(result.metadata.encodings.contains(&Encoding::Plain));
        assert!(result.metadata.encodings.contains(&Encoding::Dictionary));
    }
}
