//! Channel decoder
//!
//! Owns one cursor per connection slot over the packet channel and answers
//! two questions: what does a read on connection N return right now, and
//! which connection should the target see as readable next.
//!
//! # Rounds
//!
//! Records between two markers form a round. Inside a round the data of
//! different connections is interleaved in capture order; readiness only ever
//! exposes the connection owning the earliest unconsumed record, so the target
//! observes the same ordering the capture recorded.
//!
//! Connection 0 is the primary connection. It is the only one whose read may
//! step over a Separator into the next round; secondary connections see
//! end-of-round as a zero-length read.
//!
//! # EOF handshake
//!
//! Once a round is drained, readiness alternates between two phases:
//!
//! 1. announce: every secondary connection is marked ready so it reads the
//!    zero-length end of its round,
//! 2. advance: the owner of the first record of the next round is marked
//!    ready (all connections on End) and every cursor moves into that round.

use crate::error::{DecodeError, DecodeResult};
use crate::readiness::ReadinessMap;
use crate::record::{Record, HEADER_SIZE};

/// Read position of one connection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Cursor {
    /// Offset of the current record, `None` before initialization
    record: Option<usize>,
    /// Payload bytes of the current record already delivered
    consumed: usize,
}

/// Per-connection view of a packet channel
pub struct Decoder<B> {
    buffer: Option<B>,
    cursors: Box<[Cursor]>,
    readiness: ReadinessMap,
    /// Next drained-round readiness check runs the advance phase
    signal_eof: bool,
    /// Rounds entered since `init`
    round: usize,
}

#[inline]
fn channel<B: AsRef<[u8]>>(buffer: &Option<B>) -> Option<&[u8]> {
    buffer.as_ref().map(|b| b.as_ref())
}

/// Walk forward from the record at `from` to the next Data record owned by
/// `conn`, or to the round terminator, whichever comes first.
pub fn advance_past(buf: &[u8], from: usize, conn: usize) -> DecodeResult<usize> {
    let mut at = from;
    let mut record = Record::parse(buf, at)?;

    loop {
        at += record.footprint();
        record = Record::parse(buf, at)?;

        match record {
            Record::Data { conn: owner, .. } if owner as usize != conn => {}
            _ => return Ok(at),
        }
    }
}

/// Point every cursor at its connection's first record in the round that
/// starts at `first`; connections without data get the terminator.
fn scan_round(buf: &[u8], first: usize, cursors: &mut [Cursor]) -> DecodeResult<()> {
    cursors.fill(Cursor::default());
    let max_conns = cursors.len();
    let mut at = first;

    loop {
        let record = Record::parse(buf, at)?;

        match record {
            Record::Data { conn, .. } => {
                let cursor = cursors.get_mut(conn as usize).ok_or(
                    DecodeError::ConnectionOutOfRange { offset: at, conn, max_conns },
                )?;
                if cursor.record.is_none() {
                    cursor.record = Some(at);
                }
                at += record.footprint();
            }
            Record::Separator | Record::End => {
                for cursor in cursors.iter_mut().filter(|c| c.record.is_none()) {
                    cursor.record = Some(at);
                }
                return Ok(());
            }
        }
    }
}

/// Resolve the record a read on `conn` would start from, without moving
/// the cursor.
fn probe<'a>(buf: &'a [u8], cursor: &Cursor, conn: usize) -> DecodeResult<Option<(usize, Record<'a>)>> {
    let Some(at) = cursor.record else {
        return Ok(None);
    };

    let record = Record::parse(buf, at)?;
    match record {
        Record::Data { payload, .. } if cursor.consumed >= payload.len() => {
            let next = advance_past(buf, at, conn)?;
            Ok(Some((next, Record::parse(buf, next)?)))
        }
        _ => Ok(Some((at, record))),
    }
}

impl<B: AsRef<[u8]>> Decoder<B> {
    /// Create a detached decoder with `max_conns` connection slots
    pub fn new(max_conns: usize) -> Self {
        Self {
            buffer: None,
            cursors: vec![Cursor::default(); max_conns].into_boxed_slice(),
            readiness: ReadinessMap::new(max_conns),
            signal_eof: false,
            round: 0,
        }
    }

    /// Create a decoder already positioned on the first round of `buffer`
    pub fn with_channel(max_conns: usize, buffer: B) -> DecodeResult<Self> {
        let mut decoder = Self::new(max_conns);
        decoder.attach(buffer)?;
        Ok(decoder)
    }

    /// Reset all cursors. With a buffer, position every connection on its
    /// first record of the first round; without one, leave them unset.
    ///
    /// The buffer starts at an implicit round start: a leading Separator is
    /// skipped, otherwise the first round begins at offset 0.
    pub fn init(&mut self, buffer: Option<B>) -> DecodeResult<()> {
        self.cursors.fill(Cursor::default());
        self.readiness.clear();
        self.signal_eof = false;
        self.round = 0;
        self.buffer = buffer;

        let Some(buf) = channel(&self.buffer) else {
            return Ok(());
        };

        let first = match Record::parse(buf, 0) {
            Ok(Record::Separator) => HEADER_SIZE,
            Ok(_) => 0,
            Err(e) => {
                self.buffer = None;
                return Err(e);
            }
        };

        if let Err(e) = scan_round(buf, first, &mut self.cursors) {
            self.cursors.fill(Cursor::default());
            self.buffer = None;
            return Err(e);
        }
        Ok(())
    }

    pub fn attach(&mut self, buffer: B) -> DecodeResult<()> {
        self.init(Some(buffer))
    }

    /// Detach the buffer and clear every cursor
    pub fn reset(&mut self) {
        self.cursors.fill(Cursor::default());
        self.readiness.clear();
        self.signal_eof = false;
        self.round = 0;
        self.buffer = None;
    }

    #[inline]
    pub fn max_conns(&self) -> usize {
        self.cursors.len()
    }

    #[inline]
    pub fn is_attached(&self) -> bool {
        self.buffer.is_some()
    }

    pub fn buffer(&self) -> Option<&B> {
        self.buffer.as_ref()
    }

    /// Rounds entered since the last `init`
    #[inline]
    pub fn round(&self) -> usize {
        self.round
    }

    /// Deliver up to `out.len()` bytes of the next record for `conn`.
    ///
    /// Never blocks and never mixes two records in one call. Returns 0 when
    /// there is nothing to deliver: end of round for a secondary connection,
    /// end of stream, an out-of-range connection or an empty `out`.
    pub fn read(&mut self, conn: usize, out: &mut [u8]) -> DecodeResult<usize> {
        if conn >= self.cursors.len() || out.is_empty() {
            return Ok(0);
        }
        let Some(buf) = channel(&self.buffer) else {
            return Ok(0);
        };

        loop {
            let cursor = self.cursors[conn];
            let Some(at) = cursor.record else {
                return Ok(0);
            };

            match Record::parse(buf, at)? {
                Record::Separator => {
                    if conn != 0 {
                        return Ok(0);
                    }
                    scan_round(buf, at + HEADER_SIZE, &mut self.cursors)?;
                    self.round += 1;
                    crate::dtrace!("decoder: connection 0 entered round {}", self.round);
                }
                Record::End => return Ok(0),
                Record::Data { payload, .. } => {
                    if cursor.consumed >= payload.len() {
                        let next = advance_past(buf, at, conn)?;
                        self.cursors[conn] = Cursor { record: Some(next), consumed: 0 };
                        continue;
                    }

                    let remaining = &payload[cursor.consumed..];
                    let n = out.len().min(remaining.len());
                    out[..n].copy_from_slice(&remaining[..n]);
                    self.cursors[conn].consumed += n;
                    return Ok(n);
                }
            }
        }
    }

    /// Rebuild the readiness map.
    ///
    /// While the round still holds data, exactly the connection owning the
    /// earliest unconsumed record is ready. Once drained, the EOF handshake
    /// runs (see module docs).
    pub fn recompute_readiness(&mut self) -> DecodeResult<()> {
        self.readiness.clear();
        let Some(buf) = channel(&self.buffer) else {
            return Ok(());
        };

        let mut have_data = false;
        // (offset, connection, is data)
        let mut earliest: Option<(usize, usize, bool)> = None;

        for (conn, cursor) in self.cursors.iter().enumerate() {
            let Some((at, record)) = probe(buf, cursor, conn)? else {
                continue;
            };
            let is_data = !record.is_terminator();
            have_data |= is_data;

            match earliest {
                Some((best, _, best_is_data)) if best <= at => {
                    debug_assert!(
                        best != at || !(is_data && best_is_data),
                        "two connections own the data record at {:#x}",
                        at
                    );
                }
                _ => earliest = Some((at, conn, is_data)),
            }
        }

        let Some((earliest_at, earliest_conn, _)) = earliest else {
            return Ok(());
        };

        if have_data {
            self.readiness.set(earliest_conn);
            return Ok(());
        }

        if self.signal_eof {
            // Every cursor sits on the same terminator here
            let terminator = Record::parse(buf, earliest_at)?;
            let next_at = earliest_at + terminator.footprint();

            match Record::parse(buf, next_at)? {
                Record::Data { conn, .. } => {
                    let max_conns = self.cursors.len();
                    if conn as usize >= max_conns {
                        return Err(DecodeError::ConnectionOutOfRange { offset: next_at, conn, max_conns });
                    }
                    self.readiness.set(conn as usize);
                }
                Record::End => self.readiness.set_all(),
                // Empty round: let the primary step over it
                Record::Separator => self.readiness.set(0),
            }

            scan_round(buf, next_at, &mut self.cursors)?;
            if terminator == Record::Separator {
                self.round += 1;
                crate::dtrace!("decoder: advanced to round {}", self.round);
            }
        } else {
            self.readiness.set_from(1);
        }

        self.signal_eof = !self.signal_eof;
        Ok(())
    }

    /// Whether `conn` was marked ready by the last `recompute_readiness`
    #[inline]
    pub fn has_data(&self, conn: usize) -> bool {
        self.readiness.is_set(conn)
    }

    pub fn readiness(&self) -> &ReadinessMap {
        &self.readiness
    }

    /// True once every connection's cursor rests on End
    pub fn is_end_of_stream(&self) -> bool {
        let Some(buf) = channel(&self.buffer) else {
            return false;
        };

        self.cursors.iter().all(|cursor| {
            matches!(cursor.record.map(|at| Record::parse(buf, at)), Some(Ok(Record::End)))
        })
    }
}

// ============================================================================
// Tests
// ============================================================================
