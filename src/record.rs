//! Tagged binary field protocol.
//!
//! Every structured trailer in the file (page headers, ColumnIndex,
//! OffsetIndex, statistics, file metadata) is a *record*: a sequence of
//! `[field_id: u8][wire_type: u8][payload]` fields terminated by a zero field
//! id. A reader that encounters an unknown field id can skip it from the wire
//! type alone, which is what keeps old readers working against newer files.
//!
//! Primitive payloads are fixed-width little-endian, so the serialized size
//! of a record is computable before late-bound values (bloom-filter offsets)
//! are known.

use crate::{Result, StrataError};

pub const STOP: u8 = 0;

pub mod wire {
    pub const U8: u8 = 0;
    pub const I32: u8 = 1;
    pub const I64: u8 = 2;
    pub const BYTES: u8 = 3;
    pub const LIST: u8 = 4;
    pub const RECORD: u8 = 5;
}

/// Serializer for one record. `finish()` appends the STOP marker.
#[derive(Default)]
pub struct RecordWriter {
    buf: Vec<u8>,
}

impl RecordWriter {
    pub fn new() -> Self {
        Self::default()
    }

    fn header(&mut self, id: u8, wire_type: u8) {
        debug_assert_ne!(id, STOP);
        self.buf.push(id);
        self.buf.push(wire_type);
    }

    pub fn field_u8(&mut self, id: u8, v: u8) {
        self.header(id, wire::U8);
        self.buf.push(v);
    }

    pub fn field_bool(&mut self, id: u8, v: bool) {
        self.field_u8(id, v as u8);
    }

    pub fn field_i32(&mut self, id: u8, v: i32) {
        self.header(id, wire::I32);
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn field_i64(&mut self, id: u8, v: i64) {
        self.header(id, wire::I64);
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn field_bytes(&mut self, id: u8, bytes: &[u8]) {
        self.header(id, wire::BYTES);
        self.buf.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
        self.buf.extend_from_slice(bytes);
    }

    pub fn field_str(&mut self, id: u8, s: &str) {
        self.field_bytes(id, s.as_bytes());
    }

    fn list_header(&mut self, id: u8, elem_wire: u8, count: usize) {
        self.header(id, wire::LIST);
        self.buf.push(elem_wire);
        self.buf.extend_from_slice(&(count as u32).to_le_bytes());
    }

    pub fn field_list_bool(&mut self, id: u8, vals: &[bool]) {
        self.list_header(id, wire::U8, vals.len());
        for &v in vals {
            self.buf.push(v as u8);
        }
    }

    pub fn field_list_i64(&mut self, id: u8, vals: &[i64]) {
        self.list_header(id, wire::I64, vals.len());
        for v in vals {
            self.buf.extend_from_slice(&v.to_le_bytes());
        }
    }

    pub fn field_list_bytes(&mut self, id: u8, vals: &[Vec<u8>]) {
        self.list_header(id, wire::BYTES, vals.len());
        for v in vals {
            self.buf.extend_from_slice(&(v.len() as u32).to_le_bytes());
            self.buf.extend_from_slice(v);
        }
    }

    pub fn field_list_records<T>(
        &mut self,
        id: u8,
        vals: &[T],
        mut write: impl FnMut(&mut RecordWriter, &T),
    ) {
        self.list_header(id, wire::RECORD, vals.len());
        for v in vals {
            let mut nested = RecordWriter::new();
            write(&mut nested, v);
            self.buf.extend_from_slice(&nested.finish());
        }
    }

    pub fn field_record(&mut self, id: u8, write: impl FnOnce(&mut RecordWriter)) {
        self.header(id, wire::RECORD);
        let mut nested = RecordWriter::new();
        write(&mut nested);
        self.buf.extend_from_slice(&nested.finish());
    }

    pub fn finish(mut self) -> Vec<u8> {
        self.buf.push(STOP);
        self.buf
    }
}

/// Fixed sizes for computing trailer layout ahead of serialization.
pub mod sizes {
    /// `[id][wire]`
    pub const FIELD_HEADER: usize = 2;
    /// `[elem_wire][count: u32]`
    pub const LIST_HEADER: usize = 5;
    pub const STOP: usize = 1;

    pub fn field_i32() -> usize {
        FIELD_HEADER + 4
    }

    pub fn field_i64() -> usize {
        FIELD_HEADER + 8
    }

    pub fn field_list_i64(count: usize) -> usize {
        FIELD_HEADER + LIST_HEADER + count * 8
    }
}

/// Cursor over one serialized record.
pub struct RecordReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> RecordReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    fn need(&self, n: usize) -> Result<()> {
        if self.pos + n > self.data.len() {
            return Err(StrataError::Decode(format!(
                "truncated record: need {} bytes at offset {}, have {}",
                n,
                self.pos,
                self.data.len() - self.pos
            )));
        }
        Ok(())
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        self.need(n)?;
        let out = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    /// Advance to the next field of the current record. Returns `None` once
    /// the STOP marker is consumed.
    pub fn next_field(&mut self) -> Result<Option<(u8, u8)>> {
        let id = self.take(1)?[0];
        if id == STOP {
            return Ok(None);
        }
        let wire_type = self.take(1)?[0];
        Ok(Some((id, wire_type)))
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn read_bool(&mut self) -> Result<bool> {
        Ok(self.read_u8()? != 0)
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        Ok(i32::from_le_bytes(self.take(4)?.try_into().unwrap()))
    }

    pub fn read_i64(&mut self) -> Result<i64> {
        Ok(i64::from_le_bytes(self.take(8)?.try_into().unwrap()))
    }

    pub fn read_bytes(&mut self) -> Result<Vec<u8>> {
        let len = u32::from_le_bytes(self.take(4)?.try_into().unwrap()) as usize;
        Ok(self.take(len)?.to_vec())
    }

    pub fn read_string(&mut self) -> Result<String> {
        let bytes = self.read_bytes()?;
        String::from_utf8(bytes).map_err(|e| StrataError::Decode(format!("invalid utf-8: {e}")))
    }

    /// `(element_wire_type, count)`
    pub fn read_list_header(&mut self) -> Result<(u8, usize)> {
        let elem = self.take(1)?[0];
        let count = u32::from_le_bytes(self.take(4)?.try_into().unwrap()) as usize;
        Ok((elem, count))
    }

    pub fn read_list_bool(&mut self) -> Result<Vec<bool>> {
        let (elem, count) = self.read_list_header()?;
        if elem != wire::U8 {
            return Err(StrataError::Decode(format!(
                "expected bool list, got element wire type {elem}"
            )));
        }
        let raw = self.take(count)?;
        Ok(raw.iter().map(|&b| b != 0).collect())
    }

    pub fn read_list_i64(&mut self) -> Result<Vec<i64>> {
        let (elem, count) = self.read_list_header()?;
        if elem != wire::I64 {
            return Err(StrataError::Decode(format!(
                "expected i64 list, got element wire type {elem}"
            )));
        }
        let mut out = Vec::with_capacity(count);
        for _ in 0..count {
            out.push(self.read_i64()?);
        }
        Ok(out)
    }

    pub fn read_list_bytes(&mut self) -> Result<Vec<Vec<u8>>> {
        let (elem, count) = self.read_list_header()?;
        if elem != wire::BYTES {
            return Err(StrataError::Decode(format!(
                "expected bytes list, got element wire type {elem}"
            )));
        }
        let mut out = Vec::with_capacity(count);
        for _ in 0..count {
            out.push(self.read_bytes()?);
        }
        Ok(out)
    }

    pub fn read_list_records<T>(
        &mut self,
        mut read: impl FnMut(&mut RecordReader<'a>) -> Result<T>,
    ) -> Result<Vec<T>> {
        let (elem, count) = self.read_list_header()?;
        if elem != wire::RECORD {
            return Err(StrataError::Decode(format!(
                "expected record list, got element wire type {elem}"
            )));
        }
        let mut out = Vec::with_capacity(count);
        for _ in 0..count {
            out.push(read(self)?);
        }
        Ok(out)
    }

    /// Skip one value of the given wire type; used for unknown field ids.
    pub fn skip_value(&mut self, wire_type: u8) -> Result<()> {
        match wire_type {
            wire::U8 => {
                self.take(1)?;
            }
            wire::I32 => {
                self.take(4)?;
            }
            wire::I64 => {
                self.take(8)?;
            }
            wire::BYTES => {
                let len = u32::from_le_bytes(self.take(4)?.try_into().unwrap()) as usize;
                self.take(len)?;
            }
            wire::LIST => {
                let (elem, count) = self.read_list_header()?;
                for _ in 0..count {
                    self.skip_value(elem)?;
                }
            }
            wire::RECORD => {
                while let Some((_, w)) = self.next_field()? {
                    self.skip_value(w)?;
                }
            }
            other => {
                return Err(StrataError::Decode(format!(
                    "unknown wire type {other}, cannot skip"
                )))
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_all_wire_types() {
        let mut w = RecordWriter::new();
        w.field_u8(1, 7);
        w.field_i32(2, -42);
        w.field_i64(3, 1 << 40);
        w.field_bytes(4, b"hello");
        w.field_list_bool(5, &[true, false, true]);
        w.field_list_i64(6, &[1, 2, 3]);
        w.field_list_bytes(7, &[b"a".to_vec(), b"bc".to_vec()]);
        w.field_record(8, |nested| nested.field_i32(1, 9));
        let bytes = w.finish();

        let mut r = RecordReader::new(&bytes);
        let mut seen = 0;
        while let Some((id, wire_type)) = r.next_field().unwrap() {
            seen += 1;
            match id {
                1 => assert_eq!(r.read_u8().unwrap(), 7),
                2 => assert_eq!(r.read_i32().unwrap(), -42),
                3 => assert_eq!(r.read_i64().unwrap(), 1 << 40),
                4 => assert_eq!(r.read_bytes().unwrap(), b"hello"),
                5 => assert_eq!(r.read_list_bool().unwrap(), vec![true, false, true]),
                6 => assert_eq!(r.read_list_i64().unwrap(), vec![1, 2, 3]),
                7 => assert_eq!(r.read_list_bytes().unwrap().len(), 2),
                8 => r.skip_value(wire_type).unwrap(),
                _ => unreachable!(),
            }
        }
        assert_eq!(seen, 8);
    }

    #[test]
    fn unknown_fields_are_skippable() {
        let mut w = RecordWriter::new();
        w.field_list_bytes(9, &[b"junk".to_vec()]);
        w.field_record(10, |nested| {
            nested.field_i64(1, 5);
            nested.field_bytes(2, b"x");
        });
        w.field_i32(1, 13);
        let bytes = w.finish();

        let mut r = RecordReader::new(&bytes);
        let mut found = None;
        while let Some((id, wire_type)) = r.next_field().unwrap() {
            if id == 1 {
                found = Some(r.read_i32().unwrap());
            } else {
                r.skip_value(wire_type).unwrap();
            }
        }
        assert_eq!(found, Some(13));
    }

    #[test]
    fn truncation_is_an_error() {
        let mut w = RecordWriter::new();
        w.field_i64(1, 99);
        let mut bytes = w.finish();
        bytes.truncate(4);
        let mut r = RecordReader::new(&bytes);
        let _ = r.next_field().unwrap();
        assert!(r.read_i64().is_err());
    }

    #[test]
    fn size_helpers_match_serialization() {
        let mut w = RecordWriter::new();
        w.field_i64(1, 0);
        w.field_list_i64(2, &[0; 5]);
        let bytes = w.finish();
        assert_eq!(
            bytes.len(),
            sizes::field_i64() + sizes::field_list_i64(5) + sizes::STOP
        );
    }
}
