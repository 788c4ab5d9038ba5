//! Page framing.
//!
//! A column chunk is a stream of pages, each preceded by a tagged-record
//! header carrying the page type, sizes, an optional payload checksum, and a
//! type-specific sub-header. The writer accumulates a whole chunk into an
//! owned buffer (the buffered row-group flow), recording a [`PageLocation`]
//! per data page with offsets relative to the chunk start; the row-group
//! writer rebases them when the chunk is spliced into the file.

use crate::compression::{self, Compression};
use crate::encoding::Encoding;
use crate::index::PageLocation;
use crate::record::{RecordReader, RecordWriter};
use crate::statistics::EncodedStatistics;
use crate::{Result, StrataError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PageType {
    Data = 0,
    Dictionary = 1,
}

impl PageType {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(PageType::Data),
            1 => Some(PageType::Dictionary),
            _ => None,
        }
    }
}

const PH_TYPE: u8 = 1;
const PH_UNCOMPRESSED_SIZE: u8 = 2;
const PH_COMPRESSED_SIZE: u8 = 3;
const PH_CRC: u8 = 4;
const PH_DATA_HEADER: u8 = 5;
const PH_DICT_HEADER: u8 = 6;

const DH_NUM_VALUES: u8 = 1;
const DH_NUM_ROWS: u8 = 2;
const DH_ENCODING: u8 = 3;
const DH_DEF_LEVEL_ENCODING: u8 = 4;
const DH_REP_LEVEL_ENCODING: u8 = 5;
const DH_STATISTICS: u8 = 6;

const XH_NUM_VALUES: u8 = 1;
const XH_ENCODING: u8 = 2;
const XH_IS_SORTED: u8 = 3;

#[derive(Debug, Clone, PartialEq)]
pub struct DataPageHeader {
    pub num_values: i32,
    pub num_rows: i32,
    pub encoding: Encoding,
    pub def_level_encoding: Encoding,
    pub rep_level_encoding: Encoding,
    pub statistics: Option<EncodedStatistics>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DictionaryPageHeader {
    pub num_values: i32,
    pub encoding: Encoding,
    pub is_sorted: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PageHeader {
    pub page_type: PageType,
    pub uncompressed_page_size: i32,
    pub compressed_page_size: i32,
    pub crc: Option<u32>,
    pub data_header: Option<DataPageHeader>,
    pub dictionary_header: Option<DictionaryPageHeader>,
}

fn read_encoding(r: &mut RecordReader<'_>) -> Result<Encoding> {
    let raw = r.read_u8()?;
    Encoding::from_u8(raw)
        .ok_or_else(|| StrataError::CorruptPage(format!("unknown encoding tag {raw}")))
}

impl PageHeader {
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut w = RecordWriter::new();
        w.field_u8(PH_TYPE, self.page_type as u8);
        w.field_i32(PH_UNCOMPRESSED_SIZE, self.uncompressed_page_size);
        w.field_i32(PH_COMPRESSED_SIZE, self.compressed_page_size);
        if let Some(crc) = self.crc {
            w.field_i32(PH_CRC, crc as i32);
        }
        if let Some(h) = &self.data_header {
            w.field_record(PH_DATA_HEADER, |nested| {
                nested.field_i32(DH_NUM_VALUES, h.num_values);
                nested.field_i32(DH_NUM_ROWS, h.num_rows);
                nested.field_u8(DH_ENCODING, h.encoding as u8);
                nested.field_u8(DH_DEF_LEVEL_ENCODING, h.def_level_encoding as u8);
                nested.field_u8(DH_REP_LEVEL_ENCODING, h.rep_level_encoding as u8);
                if let Some(stats) = &h.statistics {
                    nested.field_record(DH_STATISTICS, |s| stats.write_record(s));
                }
            });
        }
        if let Some(h) = &self.dictionary_header {
            w.field_record(PH_DICT_HEADER, |nested| {
                nested.field_i32(XH_NUM_VALUES, h.num_values);
                nested.field_u8(XH_ENCODING, h.encoding as u8);
                nested.field_bool(XH_IS_SORTED, h.is_sorted);
            });
        }
        w.finish()
    }

    /// Parse one header from `data`, returning it and the bytes consumed.
    pub fn from_bytes(data: &[u8]) -> Result<(Self, usize)> {
        let mut r = RecordReader::new(data);
        let mut page_type = None;
        let mut uncompressed_page_size = 0;
        let mut compressed_page_size = 0;
        let mut crc = None;
        let mut data_header = None;
        let mut dictionary_header = None;
        loop {
            let field = r
                .next_field()
                .map_err(|e| StrataError::CorruptPage(e.to_string()))?;
            let Some((id, wire_type)) = field else { break };
            let res: Result<()> = (|| {
                match id {
                    PH_TYPE => {
                        let raw = r.read_u8()?;
                        page_type = Some(PageType::from_u8(raw).ok_or_else(|| {
                            StrataError::CorruptPage(format!("unknown page type {raw}"))
                        })?);
                    }
                    PH_UNCOMPRESSED_SIZE => uncompressed_page_size = r.read_i32()?,
                    PH_COMPRESSED_SIZE => compressed_page_size = r.read_i32()?,
                    PH_CRC => crc = Some(r.read_i32()? as u32),
                    PH_DATA_HEADER => {
                        let mut h = DataPageHeader {
                            num_values: 0,
                            num_rows: 0,
                            encoding: Encoding::Plain,
                            def_level_encoding: Encoding::Rle,
                            rep_level_encoding: Encoding::Rle,
                            statistics: None,
                        };
                        while let Some((fid, fwire)) = r.next_field()? {
                            match fid {
                                DH_NUM_VALUES => h.num_values = r.read_i32()?,
                                DH_NUM_ROWS => h.num_rows = r.read_i32()?,
                                DH_ENCODING => h.encoding = read_encoding(&mut r)?,
                                DH_DEF_LEVEL_ENCODING => {
                                    h.def_level_encoding = read_encoding(&mut r)?
                                }
                                DH_REP_LEVEL_ENCODING => {
                                    h.rep_level_encoding = read_encoding(&mut r)?
                                }
                                DH_STATISTICS => {
                                    h.statistics = Some(EncodedStatistics::read_record(&mut r)?)
                                }
                                _ => r.skip_value(fwire)?,
                            }
                        }
                        data_header = Some(h);
                    }
                    PH_DICT_HEADER => {
                        let mut h = DictionaryPageHeader {
                            num_values: 0,
                            encoding: Encoding::Plain,
                            is_sorted: false,
                        };
                        while let Some((fid, fwire)) = r.next_field()? {
                            match fid {
                                XH_NUM_VALUES => h.num_values = r.read_i32()?,
                                XH_ENCODING => h.encoding = read_encoding(&mut r)?,
                                XH_IS_SORTED => h.is_sorted = r.read_bool()?,
                                _ => r.skip_value(fwire)?,
                            }
                        }
                        dictionary_header = Some(h);
                    }
                    _ => r.skip_value(wire_type)?,
                }
                Ok(())
            })();
            res.map_err(|e| match e {
                err @ StrataError::CorruptPage(_) => err,
                err => StrataError::CorruptPage(err.to_string()),
            })?;
        }
        let page_type = page_type
            .ok_or_else(|| StrataError::CorruptPage("page header without a type".into()))?;
        Ok((
            PageHeader {
                page_type,
                uncompressed_page_size,
                compressed_page_size,
                crc,
                data_header,
                dictionary_header,
            },
            r.position(),
        ))
    }
}

/// A data page after compression, ready to hit a sink. Dictionary-mode chunks
/// buffer these until the dictionary page is final.
#[derive(Debug, Clone)]
pub struct CompressedPage {
    pub payload: Vec<u8>,
    pub uncompressed_size: usize,
    pub num_values: i32,
    pub num_rows: i32,
    pub encoding: Encoding,
    pub statistics: Option<EncodedStatistics>,
}

impl CompressedPage {
    /// Approximate on-stream footprint while buffered.
    pub fn buffered_size(&self) -> usize {
        self.payload.len() + 64
    }
}

/// Serializes a column chunk's page stream into an owned buffer.
pub struct PageWriter {
    compression: Compression,
    buf: Vec<u8>,
    data_page_offset: i64,
    dictionary_page_offset: Option<i64>,
    total_compressed_size: i64,
    total_uncompressed_size: i64,
    num_values: i64,
    next_first_row_index: i64,
}

impl PageWriter {
    pub fn new(compression: Compression) -> Self {
        Self {
            compression,
            buf: Vec::new(),
            data_page_offset: -1,
            dictionary_page_offset: None,
            total_compressed_size: 0,
            total_uncompressed_size: 0,
            num_values: 0,
            next_first_row_index: 0,
        }
    }

    pub fn compression(&self) -> Compression {
        self.compression
    }

    pub fn compress(&self, payload: &[u8]) -> Result<Vec<u8>> {
        compression::compress(self.compression, payload)
    }

    /// Bytes already committed to the chunk buffer.
    pub fn bytes_written(&self) -> i64 {
        self.buf.len() as i64
    }

    pub fn num_values(&self) -> i64 {
        self.num_values
    }

    pub fn write_data_page(&mut self, page: &CompressedPage) -> Result<PageLocation> {
        let start = self.buf.len() as i64;
        if self.data_page_offset < 0 {
            self.data_page_offset = start;
        }
        let header = PageHeader {
            page_type: PageType::Data,
            uncompressed_page_size: page.uncompressed_size as i32,
            compressed_page_size: page.payload.len() as i32,
            crc: Some(crc32fast::hash(&page.payload)),
            data_header: Some(DataPageHeader {
                num_values: page.num_values,
                num_rows: page.num_rows,
                encoding: page.encoding,
                def_level_encoding: Encoding::Rle,
                rep_level_encoding: Encoding::Rle,
                statistics: page.statistics.clone(),
            }),
            dictionary_header: None,
        };
        let header_bytes = header.to_bytes();
        self.buf.extend_from_slice(&header_bytes);
        self.buf.extend_from_slice(&page.payload);

        let written = self.buf.len() as i64 - start;
        self.total_uncompressed_size += page.uncompressed_size as i64 + header_bytes.len() as i64;
        self.total_compressed_size += written;
        self.num_values += page.num_values as i64;

        let location = PageLocation {
            offset: start,
            compressed_page_size: written as i32,
            first_row_index: self.next_first_row_index,
        };
        self.next_first_row_index += page.num_rows as i64;
        Ok(location)
    }

    pub fn write_dictionary_page(
        &mut self,
        payload: &[u8],
        num_values: i32,
        is_sorted: bool,
    ) -> Result<i64> {
        let start = self.buf.len() as i64;
        if self.dictionary_page_offset.is_none() {
            self.dictionary_page_offset = Some(start);
        }
        let compressed = self.compress(payload)?;
        let header = PageHeader {
            page_type: PageType::Dictionary,
            uncompressed_page_size: payload.len() as i32,
            compressed_page_size: compressed.len() as i32,
            crc: Some(crc32fast::hash(&compressed)),
            data_header: None,
            dictionary_header: Some(DictionaryPageHeader {
                num_values,
                encoding: Encoding::Plain,
                is_sorted,
            }),
        };
        let header_bytes = header.to_bytes();
        self.buf.extend_from_slice(&header_bytes);
        self.buf.extend_from_slice(&compressed);
        let written = self.buf.len() as i64 - start;
        self.total_uncompressed_size += payload.len() as i64 + header_bytes.len() as i64;
        self.total_compressed_size += written;
        Ok(written)
    }

    pub fn finish(self) -> FinishedChunk {
        FinishedChunk {
            bytes: self.buf,
            data_page_offset: self.data_page_offset.max(0),
            dictionary_page_offset: self.dictionary_page_offset,
            total_compressed_size: self.total_compressed_size,
            total_uncompressed_size: self.total_uncompressed_size,
            num_values: self.num_values,
        }
    }
}

/// A serialized chunk with its chunk-relative bookkeeping.
pub struct FinishedChunk {
    pub bytes: Vec<u8>,
    pub data_page_offset: i64,
    pub dictionary_page_offset: Option<i64>,
    pub total_compressed_size: i64,
    pub total_uncompressed_size: i64,
    pub num_values: i64,
}

/// One decoded page: header fields plus the decompressed payload.
#[derive(Debug, Clone)]
pub struct Page {
    pub page_type: PageType,
    pub num_values: i32,
    pub num_rows: i32,
    pub encoding: Encoding,
    pub statistics: Option<EncodedStatistics>,
    pub payload: Vec<u8>,
}

/// Streams pages out of one column chunk's byte range.
pub struct PageReader {
    chunk: Vec<u8>,
    base_offset: i64,
    pos: usize,
    compression: Compression,
    total_values: i64,
    values_seen: i64,
    verify_checksums: bool,
}

impl PageReader {
    pub fn new(
        chunk: Vec<u8>,
        base_offset: i64,
        compression: Compression,
        total_values: i64,
        verify_checksums: bool,
    ) -> Self {
        Self {
            chunk,
            base_offset,
            pos: 0,
            compression,
            total_values,
            values_seen: 0,
            verify_checksums,
        }
    }

    /// More data-page values remain in the chunk.
    pub fn has_next(&self) -> bool {
        self.values_seen < self.total_values && self.pos < self.chunk.len()
    }

    /// Type of the next page without consuming it.
    pub fn peek_page_type(&self) -> Result<Option<PageType>> {
        if self.pos >= self.chunk.len() {
            return Ok(None);
        }
        let (header, _) = PageHeader::from_bytes(&self.chunk[self.pos..])?;
        Ok(Some(header.page_type))
    }

    /// Jump to a page boundary taken from an OffsetIndex location.
    pub fn seek_to(&mut self, file_offset: i64) -> Result<()> {
        let rel = file_offset - self.base_offset;
        if rel < 0 || rel as usize >= self.chunk.len() {
            return Err(StrataError::CorruptIndex(format!(
                "page offset {file_offset} outside chunk [{}, {})",
                self.base_offset,
                self.base_offset + self.chunk.len() as i64
            )));
        }
        self.pos = rel as usize;
        Ok(())
    }

    pub fn next_page(&mut self) -> Result<Option<Page>> {
        if !self.has_next() {
            return Ok(None);
        }
        let (header, header_len) = PageHeader::from_bytes(&self.chunk[self.pos..])?;
        let body_start = self.pos + header_len;
        let body_len = header.compressed_page_size as usize;
        if body_start + body_len > self.chunk.len() {
            return Err(StrataError::CorruptPage(format!(
                "page body of {} bytes at {} overruns chunk of {} bytes",
                body_len,
                body_start,
                self.chunk.len()
            )));
        }
        let body = &self.chunk[body_start..body_start + body_len];
        if self.verify_checksums {
            if let Some(expected) = header.crc {
                let actual = crc32fast::hash(body);
                if actual != expected {
                    return Err(StrataError::CorruptPage(format!(
                        "page checksum mismatch at offset {}: {:#010x} != {:#010x}",
                        self.base_offset + self.pos as i64,
                        actual,
                        expected
                    )));
                }
            }
        }
        let payload = compression::decompress(
            self.compression,
            body,
            header.uncompressed_page_size as usize,
        )?;
        self.pos = body_start + body_len;

        let page = match header.page_type {
            PageType::Data => {
                let h = header.data_header.ok_or_else(|| {
                    StrataError::CorruptPage("data page without data header".into())
                })?;
                self.values_seen += h.num_values as i64;
                Page {
                    page_type: PageType::Data,
                    num_values: h.num_values,
                    num_rows: h.num_rows,
                    encoding: h.encoding,
                    statistics: h.statistics,
                    payload,
                }
            }
            PageType::Dictionary => {
                let h = header.dictionary_header.ok_or_else(|| {
                    StrataError::CorruptPage("dictionary page without dictionary header".into())
                })?;
                Page {
                    page_type: PageType::Dictionary,
                    num_values: h.num_values,
                    num_rows: 0,
                    encoding: h.encoding,
                    statistics: None,
                    payload,
                }
            }
        };
        Ok(Some(page))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(values: i32, payload: Vec<u8>) -> CompressedPage {
        CompressedPage {
            uncompressed_size: payload.len(),
            payload,
            num_values: values,
            num_rows: values,
            encoding: Encoding::Plain,
            statistics: None,
        }
    }

    #[test]
    fn header_round_trip() {
        let header = PageHeader {
            page_type: PageType::Data,
            uncompressed_page_size: 100,
            compressed_page_size: 80,
            crc: Some(0xdead_beef),
            data_header: Some(DataPageHeader {
                num_values: 10,
                num_rows: 10,
                encoding: Encoding::Dictionary,
                def_level_encoding: Encoding::Rle,
                rep_level_encoding: Encoding::Rle,
                statistics: Some(EncodedStatistics {
                    min: Some(vec![1]),
                    max: Some(vec![9]),
                    null_count: 0,
                    distinct_count: None,
                }),
            }),
            dictionary_header: None,
        };
        let bytes = header.to_bytes();
        let (restored, consumed) = PageHeader::from_bytes(&bytes).unwrap();
        assert_eq!(consumed, bytes.len());
        assert_eq!(restored, header);
    }

    #[test]
    fn writer_reader_round_trip_with_locations() {
        let mut writer = PageWriter::new(Compression::Snappy);
        let first = page(3, vec![1, 2, 3, 4, 5, 6, 7, 8]);
        let second = page(2, vec![9, 9, 9, 9]);
        let compressed_first = CompressedPage {
            payload: writer.compress(&first.payload).unwrap(),
            ..first.clone()
        };
        let compressed_second = CompressedPage {
            payload: writer.compress(&second.payload).unwrap(),
            ..second.clone()
        };
        let loc1 = writer.write_data_page(&compressed_first).unwrap();
        let loc2 = writer.write_data_page(&compressed_second).unwrap();
        assert_eq!(loc1.first_row_index, 0);
        assert_eq!(loc2.first_row_index, 3);
        assert_eq!(loc2.offset, loc1.offset + loc1.compressed_page_size as i64);

        let finished = writer.finish();
        assert_eq!(finished.num_values, 5);

        let mut reader = PageReader::new(finished.bytes, 0, Compression::Snappy, 5, true);
        let p1 = reader.next_page().unwrap().unwrap();
        assert_eq!(p1.payload, first.payload);
        let p2 = reader.next_page().unwrap().unwrap();
        assert_eq!(p2.payload, second.payload);
        assert!(reader.next_page().unwrap().is_none());
    }

    #[test]
    fn corrupted_payload_fails_checksum() {
        let mut writer = PageWriter::new(Compression::Uncompressed);
        let p = page(1, vec![42; 16]);
        writer.write_data_page(&p).unwrap();
        let mut finished = writer.finish();
        let last = finished.bytes.len() - 1;
        finished.bytes[last] ^= 0xff;
        let mut reader = PageReader::new(finished.bytes, 0, Compression::Uncompressed, 1, true);
        assert!(matches!(
            reader.next_page(),
            Err(StrataError::CorruptPage(_))
        ));
    }

    #[test]
    fn seek_outside_chunk_is_corrupt_index() {
        let mut writer = PageWriter::new(Compression::Uncompressed);
        writer.write_data_page(&page(1, vec![0; 8])).unwrap();
        let finished = writer.finish();
        let len = finished.bytes.len() as i64;
        let mut reader = PageReader::new(finished.bytes, 1000, Compression::Uncompressed, 1, true);
        assert!(reader.seek_to(1000).is_ok());
        assert!(matches!(
            reader.seek_to(1000 + len),
            Err(StrataError::CorruptIndex(_))
        ));
        assert!(matches!(
            reader.seek_to(10),
            Err(StrataError::CorruptIndex(_))
        ));
    }
}
