//! Packet channel records
//!
//! The channel is one flat buffer of records, written in the order the
//! generator emitted them. There is no index; every traversal walks offsets.
//!
//! ```text
//! header  { tag: u32, conn: u32, size: u64 }      native endian, packed
//! Data      header + content, padded to 8 bytes
//! Separator header only
//! End       header only, footprint 0 (next of End is End)
//! ```

use crate::error::{DecodeError, DecodeResult};

/// Size of the fixed record header
pub const HEADER_SIZE: usize = 16;

/// Payloads are padded to this alignment
pub const RECORD_ALIGN: usize = 8;

/// Record tag values
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Data = 1,
    Separator = 2,
    End = 3,
}

impl RecordKind {
    pub fn from_tag(tag: u32) -> Option<Self> {
        match tag {
            1 => Some(RecordKind::Data),
            2 => Some(RecordKind::Separator),
            3 => Some(RecordKind::End),
            _ => None,
        }
    }

    #[inline]
    pub fn tag(self) -> u32 {
        self as u32
    }
}

/// One decoded record borrowing its payload from the channel buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Record<'a> {
    Data { conn: u32, payload: &'a [u8] },
    Separator,
    End,
}

/// Round `len` up to the record alignment
#[inline]
pub const fn align8(len: usize) -> usize {
    (len + RECORD_ALIGN - 1) & !(RECORD_ALIGN - 1)
}

#[inline]
fn read_u32(bytes: &[u8]) -> u32 {
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&bytes[..4]);
    u32::from_ne_bytes(raw)
}

#[inline]
fn read_u64(bytes: &[u8]) -> u64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&bytes[..8]);
    u64::from_ne_bytes(raw)
}

fn slice_at(buf: &[u8], offset: usize, len: usize) -> DecodeResult<&[u8]> {
    let truncated = || DecodeError::Truncated {
        offset,
        needed: len,
        available: buf.len().saturating_sub(offset),
    };
    let end = offset.checked_add(len).ok_or_else(truncated)?;
    buf.get(offset..end).ok_or_else(truncated)
}

impl<'a> Record<'a> {
    /// Decode the record starting at `offset`.
    ///
    /// Every length is checked against the buffer before it is used.
    pub fn parse(buf: &'a [u8], offset: usize) -> DecodeResult<Self> {
        let header = slice_at(buf, offset, HEADER_SIZE)?;
        let tag = read_u32(&header[0..4]);

        match RecordKind::from_tag(tag) {
            Some(RecordKind::Data) => {
                let conn = read_u32(&header[4..8]);
                let size = read_u64(&header[8..16]);
                let len = usize::try_from(size)
                    .map_err(|_| DecodeError::Oversized { offset, size })?;
                let payload = slice_at(buf, offset + HEADER_SIZE, len)?;
                Ok(Record::Data { conn, payload })
            }
            Some(RecordKind::Separator) => Ok(Record::Separator),
            Some(RecordKind::End) => Ok(Record::End),
            None => Err(DecodeError::InvalidTag { offset, tag }),
        }
    }

    pub fn kind(&self) -> RecordKind {
        match self {
            Record::Data { .. } => RecordKind::Data,
            Record::Separator => RecordKind::Separator,
            Record::End => RecordKind::End,
        }
    }

    /// Bytes between this record and the next one
    #[inline]
    pub fn footprint(&self) -> usize {
        match self {
            Record::Data { payload, .. } => HEADER_SIZE + align8(payload.len()),
            Record::Separator => HEADER_SIZE,
            Record::End => 0,
        }
    }

    /// Separator or End
    #[inline]
    pub fn is_terminator(&self) -> bool {
        !matches!(self, Record::Data { .. })
    }
}

/// Sequential walk over a channel buffer, yielding `(offset, record)`.
///
/// Stops after yielding `End` or the first decode error.
pub struct RecordIter<'a> {
    buf: &'a [u8],
    offset: usize,
    done: bool,
}

impl<'a> RecordIter<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, offset: 0, done: false }
    }
}

impl<'a> Iterator for RecordIter<'a> {
    type Item = DecodeResult<(usize, Record<'a>)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let offset = self.offset;
        match Record::parse(self.buf, offset) {
            Ok(record) => {
                self.done = record == Record::End;
                self.offset += record.footprint();
                Some(Ok((offset, record)))
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::StreamBuilder;

    fn header(tag: u32, conn: u32, size: u64) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&tag.to_ne_bytes());
        out.extend_from_slice(&conn.to_ne_bytes());
        out.extend_from_slice(&size.to_ne_bytes());
        out
    }

    #[test]
    fn test_align8() {
        assert_eq!(align8(0), 0);
        assert_eq!(align8(1), 8);
        assert_eq!(align8(8), 8);
        assert_eq!(align8(13), 16);
    }

    #[test]
    fn test_parse_data() {
        let mut buf = header(1, 3, 5);
        buf.extend_from_slice(b"Hello\0\0\0");

        let record = Record::parse(&buf, 0).unwrap();
        assert_eq!(record, Record::Data { conn: 3, payload: b"Hello" });
        assert_eq!(record.footprint(), HEADER_SIZE + 8);
        assert!(!record.is_terminator());
    }

    #[test]
    fn test_end_is_self_referential() {
        let buf = header(3, 0, 0);
        let record = Record::parse(&buf, 0).unwrap();
        assert_eq!(record, Record::End);
        assert_eq!(record.footprint(), 0);
    }

    #[test]
    fn test_invalid_tag() {
        let buf = header(0, 0, 0);
        assert_eq!(Record::parse(&buf, 0), Err(DecodeError::InvalidTag { offset: 0, tag: 0 }));

        let buf = header(42, 0, 0);
        assert!(matches!(Record::parse(&buf, 0), Err(DecodeError::InvalidTag { tag: 42, .. })));
    }

    #[test]
    fn test_truncated_header_and_payload() {
        let buf = header(2, 0, 0);
        assert!(matches!(
            Record::parse(&buf[..10], 0),
            Err(DecodeError::Truncated { offset: 0, needed: HEADER_SIZE, available: 10 })
        ));

        let mut buf = header(1, 0, 64);
        buf.extend_from_slice(b"short");
        assert!(matches!(Record::parse(&buf, 0), Err(DecodeError::Truncated { offset: 16, .. })));

        assert!(matches!(Record::parse(&buf, usize::MAX), Err(DecodeError::Truncated { .. })));
    }

    #[test]
    fn test_huge_size_rejected() {
        let buf = header(1, 0, u64::MAX);
        let err = Record::parse(&buf, 0).unwrap_err();
        assert!(matches!(err, DecodeError::Truncated { .. } | DecodeError::Oversized { .. }));
    }

    #[test]
    fn test_record_iter_walks_to_end() {
        let buf = StreamBuilder::new()
            .data(0, b"abc")
            .separator()
            .data(1, b"defghijkl")
            .finish();

        let kinds: Vec<RecordKind> = RecordIter::new(&buf)
            .map(|item| item.unwrap().1.kind())
            .collect();

        assert_eq!(
            kinds,
            vec![
                RecordKind::Separator,
                RecordKind::Data,
                RecordKind::Separator,
                RecordKind::Data,
                RecordKind::End,
            ]
        );
    }

    #[test]
    fn test_record_iter_stops_on_error() {
        let mut buf = header(2, 0, 0);
        buf.extend_from_slice(&header(7, 0, 0));

        let items: Vec<_> = RecordIter::new(&buf).collect();
        assert_eq!(items.len(), 2);
        assert!(items[0].is_ok());
        assert!(matches!(items[1], Err(DecodeError::InvalidTag { offset: 16, tag: 7 })));
    }
}
