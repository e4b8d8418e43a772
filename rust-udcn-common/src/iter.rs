//! Segmented-buffer TLV cursor.
//!
//! Real NDN packets often arrive as a chain of non-contiguous buffers (one
//! segment per received datagram fragment, or one per UDP/QUIC read). This
//! cursor walks such a chain without forcing an up-front copy into one
//! contiguous buffer, matching how the original forwarder parses mbuf
//! chains in place.
//!
//! Callers that need a contiguous slice (e.g. to run a digest over it) ask
//! for one explicitly via [`TlvCursor::linearize_range`]; everything else
//! stays zero-copy.

use crate::error::ParseError;
use bytes::Bytes;

/// A cursor over an ordered chain of byte segments, tracking a logical
/// read position that may span segment boundaries.
#[derive(Debug, Clone)]
pub struct TlvCursor {
    segments: Vec<Bytes>,
    seg_idx: usize,
    seg_off: usize,
    remaining: usize,
}

impl TlvCursor {
    /// Build a cursor over `segments`, in order.
    pub fn new(segments: Vec<Bytes>) -> Self {
        let remaining = segments.iter().map(Bytes::len).sum();
        Self {
            segments,
            seg_idx: 0,
            seg_off: 0,
            remaining,
        }
    }

    pub fn from_single(buf: Bytes) -> Self {
        Self::new(vec![buf])
    }

    /// Bytes left to read.
    pub fn remaining(&self) -> usize {
        self.remaining
    }

    pub fn is_empty(&self) -> bool {
        self.remaining == 0
    }

    fn current_segment(&self) -> Option<&Bytes> {
        self.segments.get(self.seg_idx)
    }

    /// Move the current-segment cursor forward, skipping any segments that
    /// have been fully consumed.
    fn normalize(&mut self) {
        while let Some(seg) = self.segments.get(self.seg_idx) {
            if self.seg_off < seg.len() {
                break;
            }
            self.seg_off = 0;
            self.seg_idx += 1;
        }
    }

    /// Look at the next octet without consuming it.
    pub fn peek_octet(&self) -> Option<u8> {
        self.current_segment()
            .and_then(|seg| seg.get(self.seg_off))
            .copied()
    }

    /// Skip `n` bytes, across segment boundaries if necessary.
    pub fn advance(&mut self, mut n: usize) -> Result<(), ParseError> {
        if n > self.remaining {
            return Err(ParseError::Incomplete);
        }
        while n > 0 {
            self.normalize();
            let seg = self
                .segments
                .get(self.seg_idx)
                .ok_or(ParseError::Incomplete)?;
            let avail = seg.len() - self.seg_off;
            let take = avail.min(n);
            self.seg_off += take;
            self.remaining -= take;
            n -= take;
        }
        self.normalize();
        Ok(())
    }

    /// Read exactly `N` bytes into a fixed-size array, copying across
    /// segment boundaries if the run spans more than one segment.
    pub fn read_fixed<const N: usize>(&mut self) -> Result<[u8; N], ParseError> {
        if N > self.remaining {
            return Err(ParseError::Incomplete);
        }
        let mut out = [0u8; N];
        let mut written = 0;
        while written < N {
            self.normalize();
            let seg = self
                .segments
                .get(self.seg_idx)
                .ok_or(ParseError::Incomplete)?;
            let avail = seg.len() - self.seg_off;
            let take = avail.min(N - written);
            out[written..written + take]
                .copy_from_slice(&seg[self.seg_off..self.seg_off + take]);
            self.seg_off += take;
            self.remaining -= take;
            written += take;
        }
        self.normalize();
        Ok(out)
    }

    fn read_u8(&mut self) -> Result<u8, ParseError> {
        Ok(self.read_fixed::<1>()?[0])
    }

    /// Decode an NDN TLV varnum (the same compressed scheme used for both
    /// TLV-TYPE and TLV-LENGTH): values below 253 are a single octet; `253`
    /// introduces a 2-octet big-endian value; `254` a 4-octet value; `255`
    /// an 8-octet value.
    pub fn read_varnum(&mut self) -> Result<u64, ParseError> {
        let first = self.read_u8()?;
        match first {
            0..=252 => Ok(first as u64),
            253 => Ok(u16::from_be_bytes(self.read_fixed::<2>()?) as u64),
            254 => Ok(u32::from_be_bytes(self.read_fixed::<4>()?) as u64),
            255 => Ok(u64::from_be_bytes(self.read_fixed::<8>()?)),
        }
    }

    /// Read `len` bytes starting at the current position into one
    /// contiguous `Bytes`, consuming them. Copies only when the run spans
    /// more than one segment; a run fully inside one segment is a cheap
    /// `Bytes::slice`.
    pub fn linearize_range(&mut self, len: usize) -> Result<Bytes, ParseError> {
        if len > self.remaining {
            return Err(ParseError::Incomplete);
        }
        self.normalize();
        if let Some(seg) = self.segments.get(self.seg_idx) {
            if seg.len() - self.seg_off >= len {
                let out = seg.slice(self.seg_off..self.seg_off + len);
                self.seg_off += len;
                self.remaining -= len;
                self.normalize();
                return Ok(out);
            }
        }

        let mut out = Vec::with_capacity(len);
        let mut left = len;
        while left > 0 {
            self.normalize();
            let seg = self
                .segments
                .get(self.seg_idx)
                .ok_or(ParseError::Incomplete)?;
            let avail = seg.len() - self.seg_off;
            let take = avail.min(left);
            out.extend_from_slice(&seg[self.seg_off..self.seg_off + take]);
            self.seg_off += take;
            self.remaining -= take;
            left -= take;
        }
        self.normalize();
        Ok(Bytes::from(out))
    }

    /// Return the `len` bytes starting at the current position as a list
    /// of zero-copy segment slices, without consuming them. Used to keep a
    /// large Data payload as a scatter list instead of forcing a copy.
    pub fn make_indirect_range(&self, len: usize) -> Result<Vec<Bytes>, ParseError> {
        if len > self.remaining {
            return Err(ParseError::Incomplete);
        }
        let mut out = Vec::new();
        let mut idx = self.seg_idx;
        let mut off = self.seg_off;
        let mut left = len;
        while left > 0 {
            let seg = self.segments.get(idx).ok_or(ParseError::Incomplete)?;
            if off >= seg.len() {
                idx += 1;
                off = 0;
                continue;
            }
            let avail = seg.len() - off;
            let take = avail.min(left);
            out.push(seg.slice(off..off + take));
            off += take;
            left -= take;
        }
        Ok(out)
    }

    /// Drop `len` bytes at the current position, discarding them (used to
    /// strip a header already parsed out of the logical stream).
    pub fn delete_range(&mut self, len: usize) -> Result<(), ParseError> {
        self.advance(len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cursor(chunks: &[&[u8]]) -> TlvCursor {
        TlvCursor::new(chunks.iter().map(|c| Bytes::copy_from_slice(c)).collect())
    }

    #[test]
    fn read_fixed_spans_segments() {
        let mut c = cursor(&[&[1, 2], &[3, 4, 5]]);
        let buf: [u8; 4] = c.read_fixed().unwrap();
        assert_eq!(buf, [1, 2, 3, 4]);
        assert_eq!(c.remaining(), 1);
        assert_eq!(c.peek_octet(), Some(5));
    }

    #[test]
    fn varnum_roundtrip_all_widths() {
        for &(bytes, expected) in &[
            (&[10u8][..], 10u64),
            (&[253, 0x01, 0x00][..], 256u64),
            (&[254, 0, 1, 0, 0][..], 65536u64),
        ] {
            let mut c = cursor(&[bytes]);
            assert_eq!(c.read_varnum().unwrap(), expected);
        }
    }

    #[test]
    fn linearize_range_copies_only_across_segments() {
        let mut c = cursor(&[&[1, 2, 3], &[4, 5]]);
        let single_seg = c.linearize_range(2).unwrap();
        assert_eq!(&single_seg[..], &[1, 2]);
        let spanning = c.linearize_range(3).unwrap();
        assert_eq!(&spanning[..], &[3, 4, 5]);
        assert!(c.is_empty());
    }

    #[test]
    fn make_indirect_range_does_not_consume() {
        let c = cursor(&[&[1, 2], &[3, 4]]);
        let parts = c.make_indirect_range(3).unwrap();
        let flat: Vec<u8> = parts.iter().flat_map(|b| b.to_vec()).collect();
        assert_eq!(flat, vec![1, 2, 3]);
        assert_eq!(c.remaining(), 4);
    }

    #[test]
    fn advance_past_end_errors() {
        let mut c = cursor(&[&[1, 2]]);
        assert!(c.advance(3).is_err());
    }
}
