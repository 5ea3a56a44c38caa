//! Packet channel writer
//!
//! Serializes packets into the channel layout understood by the decoder.
//! The stream always starts with a Separator (the implicit round start) and
//! ends with End.
//!
//! ```
//! use desock_core::StreamBuilder;
//!
//! let channel = StreamBuilder::new()
//!     .data(0, b"Hello")
//!     .separator()
//!     .data(1, b"x")
//!     .finish();
//! assert_eq!(channel.len() % 8, 0);
//! ```

use crate::record::{align8, RecordKind, HEADER_SIZE};

/// A packet as the generator sees it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    /// Destination connection slot
    pub conn: u32,
    /// Bytes delivered to that connection
    pub payload: Vec<u8>,
    /// Emit a Separator after this packet
    pub ends_round: bool,
}

impl Packet {
    pub fn new(conn: u32, payload: impl Into<Vec<u8>>) -> Self {
        Self { conn, payload: payload.into(), ends_round: false }
    }

    pub fn ending_round(mut self) -> Self {
        self.ends_round = true;
        self
    }
}

/// Builds a channel buffer record by record
#[derive(Debug, Clone)]
pub struct StreamBuilder {
    bytes: Vec<u8>,
}

impl Default for StreamBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamBuilder {
    pub fn new() -> Self {
        let mut builder = Self { bytes: Vec::with_capacity(256) };
        builder.put_header(RecordKind::Separator, 0, 0);
        builder
    }

    fn put_header(&mut self, kind: RecordKind, conn: u32, size: u64) {
        self.bytes.extend_from_slice(&kind.tag().to_ne_bytes());
        self.bytes.extend_from_slice(&conn.to_ne_bytes());
        self.bytes.extend_from_slice(&size.to_ne_bytes());
    }

    /// Append a Data record for `conn`
    pub fn data(mut self, conn: u32, payload: &[u8]) -> Self {
        self.push_data(conn, payload);
        self
    }

    /// Append a round boundary
    pub fn separator(mut self) -> Self {
        self.put_header(RecordKind::Separator, 0, 0);
        self
    }

    /// Append a packet, plus a Separator if it ends its round
    pub fn push(&mut self, packet: &Packet) {
        self.push_data(packet.conn, &packet.payload);
        if packet.ends_round {
            self.put_header(RecordKind::Separator, 0, 0);
        }
    }

    fn push_data(&mut self, conn: u32, payload: &[u8]) {
        self.put_header(RecordKind::Data, conn, payload.len() as u64);
        self.bytes.extend_from_slice(payload);
        let padded = self.bytes.len() - payload.len() + align8(payload.len());
        self.bytes.resize(padded, 0);
    }

    /// Bytes written so far, including the trailing End `finish` adds
    pub fn encoded_len(&self) -> usize {
        self.bytes.len() + HEADER_SIZE
    }

    /// Terminate the stream and return the buffer
    pub fn finish(mut self) -> Vec<u8> {
        self.put_header(RecordKind::End, 0, 0);
        self.bytes
    }

    /// Terminate the stream into a fixed buffer such as a shared segment.
    ///
    /// Returns the written length, or `None` if the stream does not fit.
    pub fn finish_into(self, out: &mut [u8]) -> Option<usize> {
        let bytes = self.finish();
        let dst = out.get_mut(..bytes.len())?;
        dst.copy_from_slice(&bytes);
        Some(bytes.len())
    }
}

/// Serialize a packet sequence into a complete channel buffer
pub fn encode_packets<'a, I>(packets: I) -> Vec<u8>
where
    I: IntoIterator<Item = &'a Packet>,
{
    let mut builder = StreamBuilder::new();
    for packet in packets {
        builder.push(packet);
    }
    builder.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{Record, RecordIter};

    #[test]
    fn test_layout() {
        let buf = StreamBuilder::new().data(2, b"Hello").finish();

        // Separator + Data(16 + 8) + End
        assert_eq!(buf.len(), HEADER_SIZE + HEADER_SIZE + 8 + HEADER_SIZE);
        assert_eq!(&buf[0..4], &2u32.to_ne_bytes());
        assert_eq!(&buf[16..20], &1u32.to_ne_bytes());
        assert_eq!(&buf[20..24], &2u32.to_ne_bytes());
        assert_eq!(&buf[24..32], &5u64.to_ne_bytes());
        assert_eq!(&buf[32..37], b"Hello");
        assert_eq!(&buf[37..40], &[0, 0, 0]);
        assert_eq!(&buf[40..44], &3u32.to_ne_bytes());
    }

    #[test]
    fn test_encode_packets_rounds() {
        let packets = vec![
            Packet::new(0, "USER a\r\n").ending_round(),
            Packet::new(1, "x"),
            Packet::new(0, "PASS b\r\n"),
        ];
        let buf = encode_packets(&packets);

        let records: Vec<Record<'_>> = RecordIter::new(&buf).map(|r| r.unwrap().1).collect();
        assert_eq!(
            records,
            vec![
                Record::Separator,
                Record::Data { conn: 0, payload: b"USER a\r\n" },
                Record::Separator,
                Record::Data { conn: 1, payload: b"x" },
                Record::Data { conn: 0, payload: b"PASS b\r\n" },
                Record::End,
            ]
        );
    }

    #[test]
    fn test_finish_into() {
        let builder = StreamBuilder::new().data(0, b"abc");
        let needed = builder.encoded_len();

        let mut small = vec![0u8; needed - 1];
        assert_eq!(builder.clone().finish_into(&mut small), None);

        let mut shm = vec![0xffu8; 4096];
        assert_eq!(builder.finish_into(&mut shm), Some(needed));
        assert!(matches!(Record::parse(&shm, needed - HEADER_SIZE), Ok(Record::End)));
    }
}
