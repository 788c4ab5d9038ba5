//! File, row-group, and column-chunk metadata.
//!
//! The footer is the last 8 bytes of the file: a u32 LE metadata length
//! followed by the magic. The metadata block immediately precedes it and is
//! one tagged record. All metadata is immutable after parse and shared by
//! `Arc` across readers.

use crate::compression::Compression;
use crate::encoding::Encoding;
use crate::record::{RecordReader, RecordWriter};
use crate::schema::{ColumnDescriptor, Repetition, Schema};
use crate::statistics::EncodedStatistics;
use crate::types::PhysicalType;
use crate::{Result, StrataError};

pub const MAGIC: &[u8; 4] = b"PAR1";
pub const FOOTER_SIZE: usize = 8;
pub const FORMAT_VERSION: i32 = 1;

// ColumnChunkMetaData fields
const CC_DATA_PAGE_OFFSET: u8 = 1;
const CC_DICTIONARY_PAGE_OFFSET: u8 = 2;
const CC_TOTAL_COMPRESSED_SIZE: u8 = 3;
const CC_TOTAL_UNCOMPRESSED_SIZE: u8 = 4;
const CC_NUM_VALUES: u8 = 5;
const CC_ENCODINGS: u8 = 6;
const CC_COMPRESSION: u8 = 7;
const CC_STATISTICS: u8 = 8;
const CC_COLUMN_INDEX_OFFSET: u8 = 9;
const CC_COLUMN_INDEX_LENGTH: u8 = 10;
const CC_OFFSET_INDEX_OFFSET: u8 = 11;
const CC_OFFSET_INDEX_LENGTH: u8 = 12;
const CC_BLOOM_FILTER_OFFSET: u8 = 13;

/// Metadata for one column chunk. Offsets are absolute file positions;
/// zero-valued optional offsets mean "absent".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColumnChunkMetaData {
    pub data_page_offset: i64,
    /// 0 if the chunk has no dictionary page.
    pub dictionary_page_offset: i64,
    pub total_compressed_size: i64,
    pub total_uncompressed_size: i64,
    pub num_values: i64,
    pub encodings: Vec<Encoding>,
    pub compression: Compression,
    pub statistics: Option<EncodedStatistics>,
    pub column_index_offset: i64,
    pub column_index_length: i32,
    pub offset_index_offset: i64,
    pub offset_index_length: i32,
    /// 0 if the chunk has no bloom filter.
    pub bloom_filter_offset: i64,
}

impl ColumnChunkMetaData {
    pub fn has_dictionary_page(&self) -> bool {
        self.dictionary_page_offset > 0
    }

    /// Both index trailers must be present for the page-skip path.
    pub fn has_page_index(&self) -> bool {
        self.column_index_offset > 0
            && self.column_index_length > 0
            && self.offset_index_offset > 0
            && self.offset_index_length > 0
    }

    pub fn has_bloom_filter(&self) -> bool {
        self.bloom_filter_offset > 0
    }

    /// First byte of the chunk's page stream.
    pub fn chunk_start(&self) -> i64 {
        if self.has_dictionary_page() && self.dictionary_page_offset < self.data_page_offset {
            self.dictionary_page_offset
        } else {
            self.data_page_offset
        }
    }

    fn write_record(&self, w: &mut RecordWriter) {
        w.field_i64(CC_DATA_PAGE_OFFSET, self.data_page_offset);
        w.field_i64(CC_DICTIONARY_PAGE_OFFSET, self.dictionary_page_offset);
        w.field_i64(CC_TOTAL_COMPRESSED_SIZE, self.total_compressed_size);
        w.field_i64(CC_TOTAL_UNCOMPRESSED_SIZE, self.total_uncompressed_size);
        w.field_i64(CC_NUM_VALUES, self.num_values);
        let enc: Vec<i64> = self.encodings.iter().map(|e| *e as u8 as i64).collect();
        w.field_list_i64(CC_ENCODINGS, &enc);
        w.field_u8(CC_COMPRESSION, self.compression as u8);
        if let Some(stats) = &self.statistics {
            w.field_record(CC_STATISTICS, |nested| stats.write_record(nested));
        }
        w.field_i64(CC_COLUMN_INDEX_OFFSET, self.column_index_offset);
        w.field_i32(CC_COLUMN_INDEX_LENGTH, self.column_index_length);
        w.field_i64(CC_OFFSET_INDEX_OFFSET, self.offset_index_offset);
        w.field_i32(CC_OFFSET_INDEX_LENGTH, self.offset_index_length);
        w.field_i64(CC_BLOOM_FILTER_OFFSET, self.bloom_filter_offset);
    }

    fn read_record(r: &mut RecordReader<'_>) -> Result<Self> {
        let mut out = ColumnChunkMetaData::default();
        while let Some((id, wire_type)) = r.next_field()? {
            match id {
                CC_DATA_PAGE_OFFSET => out.data_page_offset = r.read_i64()?,
                CC_DICTIONARY_PAGE_OFFSET => out.dictionary_page_offset = r.read_i64()?,
                CC_TOTAL_COMPRESSED_SIZE => out.total_compressed_size = r.read_i64()?,
                CC_TOTAL_UNCOMPRESSED_SIZE => out.total_uncompressed_size = r.read_i64()?,
                CC_NUM_VALUES => out.num_values = r.read_i64()?,
                CC_ENCODINGS => {
                    out.encodings = r
                        .read_list_i64()?
                        .into_iter()
                        .filter_map(|v| Encoding::from_u8(v as u8))
                        .collect();
                }
                CC_COMPRESSION => {
                    let raw = r.read_u8()?;
                    out.compression = Compression::from_u8(raw).ok_or_else(|| {
                        StrataError::Decode(format!("unknown compression tag {raw}"))
                    })?;
                }
                CC_STATISTICS => out.statistics = Some(EncodedStatistics::read_record(r)?),
                CC_COLUMN_INDEX_OFFSET => out.column_index_offset = r.read_i64()?,
                CC_COLUMN_INDEX_LENGTH => out.column_index_length = r.read_i32()?,
                CC_OFFSET_INDEX_OFFSET => out.offset_index_offset = r.read_i64()?,
                CC_OFFSET_INDEX_LENGTH => out.offset_index_length = r.read_i32()?,
                CC_BLOOM_FILTER_OFFSET => out.bloom_filter_offset = r.read_i64()?,
                _ => r.skip_value(wire_type)?,
            }
        }
        Ok(out)
    }
}

const RG_NUM_ROWS: u8 = 1;
const RG_TOTAL_BYTE_SIZE: u8 = 2;
const RG_COLUMNS: u8 = 3;

/// Metadata for one row group; `columns[i]` corresponds to schema column `i`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowGroupMetaData {
    pub num_rows: i64,
    pub total_byte_size: i64,
    pub columns: Vec<ColumnChunkMetaData>,
}

impl RowGroupMetaData {
    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn column(&self, i: usize) -> Result<&ColumnChunkMetaData> {
        self.columns.get(i).ok_or_else(|| {
            StrataError::Schema(format!(
                "column chunk {} out of range ({} chunks)",
                i,
                self.columns.len()
            ))
        })
    }

    fn write_record(&self, w: &mut RecordWriter) {
        w.field_i64(RG_NUM_ROWS, self.num_rows);
        w.field_i64(RG_TOTAL_BYTE_SIZE, self.total_byte_size);
        w.field_list_records(RG_COLUMNS, &self.columns, |nested, col| {
            col.write_record(nested)
        });
    }

    fn read_record(r: &mut RecordReader<'_>) -> Result<Self> {
        let mut out = RowGroupMetaData::default();
        while let Some((id, wire_type)) = r.next_field()? {
            match id {
                RG_NUM_ROWS => out.num_rows = r.read_i64()?,
                RG_TOTAL_BYTE_SIZE => out.total_byte_size = r.read_i64()?,
                RG_COLUMNS => {
                    out.columns = r.read_list_records(ColumnChunkMetaData::read_record)?
                }
                _ => r.skip_value(wire_type)?,
            }
        }
        Ok(out)
    }
}

const COL_NAME: u8 = 1;
const COL_PHYSICAL_TYPE: u8 = 2;
const COL_REPETITION: u8 = 3;
const COL_TYPE_LENGTH: u8 = 4;

const FM_VERSION: u8 = 1;
const FM_NUM_ROWS: u8 = 2;
const FM_CREATED_BY: u8 = 3;
const FM_SCHEMA: u8 = 4;
const FM_ROW_GROUPS: u8 = 5;

/// Top-level file metadata.
#[derive(Debug, Clone)]
pub struct FileMetaData {
    pub version: i32,
    pub num_rows: i64,
    pub created_by: String,
    pub schema: Schema,
    pub row_groups: Vec<RowGroupMetaData>,
}

impl FileMetaData {
    pub fn num_row_groups(&self) -> usize {
        self.row_groups.len()
    }

    pub fn num_columns(&self) -> usize {
        self.schema.num_columns()
    }

    pub fn row_group(&self, i: usize) -> Result<&RowGroupMetaData> {
        self.row_groups.get(i).ok_or_else(|| {
            StrataError::InvalidArgument(format!(
                "row group {} out of range ({} row groups)",
                i,
                self.row_groups.len()
            ))
        })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut w = RecordWriter::new();
        w.field_i32(FM_VERSION, self.version);
        w.field_i64(FM_NUM_ROWS, self.num_rows);
        w.field_str(FM_CREATED_BY, &self.created_by);
        w.field_list_records(FM_SCHEMA, self.schema.columns(), |nested, col| {
            nested.field_str(COL_NAME, &col.name);
            nested.field_u8(COL_PHYSICAL_TYPE, col.physical_type as u8);
            nested.field_u8(COL_REPETITION, col.repetition as u8);
            nested.field_i32(COL_TYPE_LENGTH, col.type_length);
        });
        w.field_list_records(FM_ROW_GROUPS, &self.row_groups, |nested, rg| {
            rg.write_record(nested)
        });
        w.finish()
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let mut r = RecordReader::new(data);
        let mut version = 0;
        let mut num_rows = 0;
        let mut created_by = String::new();
        let mut columns = Vec::new();
        let mut row_groups = Vec::new();
        let map_err = |e: StrataError| StrataError::CorruptFooter(e.to_string());
        loop {
            let field = r.next_field().map_err(map_err)?;
            let Some((id, wire_type)) = field else { break };
            let res: Result<()> = (|| {
                match id {
                    FM_VERSION => version = r.read_i32()?,
                    FM_NUM_ROWS => num_rows = r.read_i64()?,
                    FM_CREATED_BY => created_by = r.read_string()?,
                    FM_SCHEMA => {
                        columns = r.read_list_records(|nested| {
                            let mut name = String::new();
                            let mut physical_type = None;
                            let mut repetition = Repetition::Required;
                            let mut type_length = 0;
                            while let Some((fid, fwire)) = nested.next_field()? {
                                match fid {
                                    COL_NAME => name = nested.read_string()?,
                                    COL_PHYSICAL_TYPE => {
                                        let raw = nested.read_u8()?;
                                        physical_type =
                                            Some(PhysicalType::from_u8(raw).ok_or_else(|| {
                                                StrataError::UnsupportedType(format!(
                                                    "unknown physical type tag {raw}"
                                                ))
                                            })?);
                                    }
                                    COL_REPETITION => {
                                        let raw = nested.read_u8()?;
                                        repetition =
                                            Repetition::from_u8(raw).ok_or_else(|| {
                                                StrataError::Decode(format!(
                                                    "unknown repetition tag {raw}"
                                                ))
                                            })?;
                                    }
                                    COL_TYPE_LENGTH => type_length = nested.read_i32()?,
                                    _ => nested.skip_value(fwire)?,
                                }
                            }
                            let physical_type = physical_type.ok_or_else(|| {
                                StrataError::Decode("column without physical type".into())
                            })?;
                            Ok(ColumnDescriptor {
                                name,
                                physical_type,
                                repetition,
                                type_length,
                            })
                        })?;
                    }
                    FM_ROW_GROUPS => {
                        row_groups = r.read_list_records(RowGroupMetaData::read_record)?
                    }
                    _ => r.skip_value(wire_type)?,
                }
                Ok(())
            })();
            res.map_err(|e| match e {
                err @ StrataError::UnsupportedType(_) => err,
                err => StrataError::CorruptFooter(err.to_string()),
            })?;
        }
        let schema = Schema::new(columns)?;
        Ok(FileMetaData {
            version,
            num_rows,
            created_by,
            schema,
            row_groups,
        })
    }
}
