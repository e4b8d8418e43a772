//! NDNLPv2 link-layer framing.
//!
//! Every network-layer packet (Interest/Data/Nack) that crosses a face is
//! wrapped in an NDNLPv2 `LpPacket`. This module covers the three pieces
//! of that framing the forwarding core actually touches: the PIT token
//! used to correlate a returning Data with the worker and PCCT entry that
//! is waiting for it, the congestion mark a CoDel queue stamps on egress,
//! and the fragmentation header a reassembler consumes on ingress.
//!
//! Selector/link/NextHopFaceId fields that belong to the higher-level
//! protocol are out of scope here; see the crate-level Non-goals.

use crate::error::ParseError;
use crate::iter::TlvCursor;
use bytes::{BufMut, Bytes, BytesMut};
use smallvec::SmallVec;

/// Maximum length of a PIT token, per NDNLPv2.
pub const MAX_PIT_TOKEN_LENGTH: usize = 32;

const TLV_LP_PACKET: u8 = 0x64;
const TLV_LP_PAYLOAD: u8 = 0x50;
const TLV_LP_SEQUENCE: u8 = 0x51;
const TLV_LP_FRAG_INDEX: u8 = 0x52;
const TLV_LP_FRAG_COUNT: u8 = 0x53;
const TLV_LP_PIT_TOKEN: u8 = 0x62;
const TLV_LP_CONGESTION_MARK: u8 = 0x63;

/// Fragmentation header: this LpPacket is fragment `frag_index` of
/// `frag_count` belonging to the network-layer packet whose first
/// fragment carries sequence number `seq_num_base`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LpFragment {
    pub seq_num_base: u64,
    pub frag_index: u16,
    pub frag_count: u16,
}

impl LpFragment {
    pub fn is_first(&self) -> bool {
        self.frag_index == 0
    }

    pub fn is_last(&self) -> bool {
        self.frag_index + 1 == self.frag_count
    }

    pub fn is_fragmented(&self) -> bool {
        self.frag_count > 1
    }
}

/// Parsed NDNLPv2 header fields, excluding the payload itself.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LpHeader {
    /// Opaque token the receiving face's worker assigned; echoed back by
    /// the far end on the packet it elicits (Data or Nack for an
    /// Interest). Absent on packets that don't need correlation.
    pub pit_token: Option<SmallVec<[u8; 8]>>,
    /// CoDel/ECN-style congestion signal, 0-3 per RFC 3168 codepoints.
    pub congestion_mark: Option<u8>,
    pub fragment: Option<LpFragment>,
}

impl LpHeader {
    pub fn with_pit_token(mut self, token: &[u8]) -> Self {
        self.pit_token = Some(SmallVec::from_slice(token));
        self
    }

    pub fn with_congestion_mark(mut self, mark: u8) -> Self {
        self.congestion_mark = Some(mark);
        self
    }

    pub fn with_fragment(mut self, fragment: LpFragment) -> Self {
        self.fragment = Some(fragment);
        self
    }
}

fn put_tlv(buf: &mut BytesMut, tlv_type: u8, value: &[u8]) {
    crate::tlv::encode_tlv_type(tlv_type, buf);
    crate::tlv::encode_tlv_length(value.len(), buf);
    buf.put_slice(value);
}

/// Encode `payload` (a whole or fragment network-layer packet) wrapped in
/// an LpPacket carrying `header`.
pub fn encode_lp_packet(header: &LpHeader, payload: &[u8]) -> Bytes {
    let mut inner = BytesMut::new();

    if let Some(frag) = &header.fragment {
        if frag.is_fragmented() {
            put_tlv(&mut inner, TLV_LP_SEQUENCE, &frag.seq_num_base.to_be_bytes());
            put_tlv(&mut inner, TLV_LP_FRAG_INDEX, &frag.frag_index.to_be_bytes());
            put_tlv(&mut inner, TLV_LP_FRAG_COUNT, &frag.frag_count.to_be_bytes());
        }
    }
    if let Some(mark) = header.congestion_mark {
        put_tlv(&mut inner, TLV_LP_CONGESTION_MARK, &[mark]);
    }
    if let Some(token) = &header.pit_token {
        put_tlv(&mut inner, TLV_LP_PIT_TOKEN, token);
    }
    put_tlv(&mut inner, TLV_LP_PAYLOAD, payload);

    let mut out = BytesMut::with_capacity(inner.len() + 5);
    put_tlv(&mut out, TLV_LP_PACKET, &inner);
    out.freeze()
}

/// Decode an LpPacket, returning its header and the (possibly fragmented)
/// network-layer payload it carries.
pub fn decode_lp_packet(buf: Bytes) -> Result<(LpHeader, Bytes), ParseError> {
    let mut cursor = TlvCursor::from_single(buf);
    let outer_type = cursor.read_varnum()?;
    if outer_type != TLV_LP_PACKET as u64 {
        return Err(ParseError::BadType);
    }
    let outer_len = cursor.read_varnum()? as usize;
    let body = cursor.linearize_range(outer_len)?;

    let mut header = LpHeader::default();
    let mut payload = Bytes::new();
    let mut seq_num_base = None;
    let mut frag_index = None;
    let mut frag_count = None;

    let mut inner = TlvCursor::from_single(body);
    while !inner.is_empty() {
        let tlv_type = inner.read_varnum()?;
        let len = inner.read_varnum()? as usize;
        let tlv_type = if tlv_type <= u8::MAX as u64 {
            tlv_type as u8
        } else {
            inner.advance(len)?;
            continue;
        };
        match tlv_type {
            TLV_LP_SEQUENCE => {
                if len != 8 {
                    return Err(ParseError::LengthOverflow);
                }
                seq_num_base = Some(u64::from_be_bytes(inner.read_fixed::<8>()?));
            }
            TLV_LP_FRAG_INDEX => {
                if len != 2 {
                    return Err(ParseError::LengthOverflow);
                }
                frag_index = Some(u16::from_be_bytes(inner.read_fixed::<2>()?));
            }
            TLV_LP_FRAG_COUNT => {
                if len != 2 {
                    return Err(ParseError::LengthOverflow);
                }
                frag_count = Some(u16::from_be_bytes(inner.read_fixed::<2>()?));
            }
            TLV_LP_CONGESTION_MARK => {
                if len != 1 {
                    return Err(ParseError::LengthOverflow);
                }
                header.congestion_mark = Some(inner.read_fixed::<1>()?[0]);
            }
            TLV_LP_PIT_TOKEN => {
                if len > MAX_PIT_TOKEN_LENGTH {
                    return Err(ParseError::LengthOverflow);
                }
                let token = inner.linearize_range(len)?;
                header.pit_token = Some(SmallVec::from_slice(&token));
            }
            TLV_LP_PAYLOAD => {
                payload = inner.linearize_range(len)?;
            }
            _ => {
                // Unrecognised TLV-TYPE inside LpPacket: the forwarding
                // core only cares about the fields above, so skip it.
                inner.advance(len)?;
            }
        }
    }

    if let (Some(seq), Some(index), Some(count)) = (seq_num_base, frag_index, frag_count) {
        header.fragment = Some(LpFragment {
            seq_num_base: seq,
            frag_index: index,
            frag_count: count,
        });
    }

    Ok((header, payload))
}

/* ---------------------------------------------------------------- *\
 * FwToken: (worker_id, pcc_token) packed into an 8-octet PIT token
\* ---------------------------------------------------------------- */

/// Width of the PCCT token space; see [`crate::lp::FwToken`].
pub const PCC_TOKEN_BITS: u32 = 48;
/// The 48-bit token space this forwarder assigns PCCT entries from. Public
/// so the PCCT itself can mask its counter the same way [`FwToken`] masks
/// the value it packs into the wire token.
pub const PCC_TOKEN_MASK: u64 = (1u64 << PCC_TOKEN_BITS) - 1;

/// The PIT token a worker stamps on outgoing Interests, packing its own
/// worker id with the 48-bit token the worker's PCCT assigned to the
/// entry. On a returning Data/Nack this lets any receiving thread route
/// the packet to the correct worker without touching that worker's PCCT,
/// and lets that worker find its PCCT entry in O(1) once it arrives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FwToken {
    pub worker_id: u16,
    pcc_token: u64,
}

impl FwToken {
    pub fn new(worker_id: u16, pcc_token: u64) -> Self {
        Self {
            worker_id,
            pcc_token: pcc_token & PCC_TOKEN_MASK,
        }
    }

    pub fn pcc_token(&self) -> u64 {
        self.pcc_token
    }

    pub fn to_bytes(self) -> [u8; 8] {
        let mut out = [0u8; 8];
        out[0..2].copy_from_slice(&self.worker_id.to_be_bytes());
        let token_bytes = self.pcc_token.to_be_bytes();
        out[2..8].copy_from_slice(&token_bytes[2..8]);
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ParseError> {
        if bytes.len() != 8 {
            return Err(ParseError::Incomplete);
        }
        let worker_id = u16::from_be_bytes([bytes[0], bytes[1]]);
        let mut token_bytes = [0u8; 8];
        token_bytes[2..8].copy_from_slice(&bytes[2..8]);
        Ok(Self {
            worker_id,
            pcc_token: u64::from_be_bytes(token_bytes),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lp_packet_round_trips_plain_payload() {
        let header = LpHeader::default()
            .with_pit_token(&[1, 2, 3, 4])
            .with_congestion_mark(1);
        let payload = b"hello ndn";
        let encoded = encode_lp_packet(&header, payload);
        let (decoded_header, decoded_payload) = decode_lp_packet(encoded).unwrap();
        assert_eq!(decoded_header.pit_token.as_deref(), Some(&[1, 2, 3, 4][..]));
        assert_eq!(decoded_header.congestion_mark, Some(1));
        assert_eq!(&decoded_payload[..], payload);
        assert!(decoded_header.fragment.is_none());
    }

    #[test]
    fn lp_packet_round_trips_fragment_header() {
        let frag = LpFragment {
            seq_num_base: 42,
            frag_index: 1,
            frag_count: 3,
        };
        let header = LpHeader::default().with_fragment(frag);
        let encoded = encode_lp_packet(&header, b"chunk");
        let (decoded_header, decoded_payload) = decode_lp_packet(encoded).unwrap();
        assert_eq!(decoded_header.fragment, Some(frag));
        assert_eq!(&decoded_payload[..], b"chunk");
    }

    #[test]
    fn fw_token_packs_and_unpacks() {
        let token = FwToken::new(7, 0x0000_ffff_ffff_ffff);
        let bytes = token.to_bytes();
        let parsed = FwToken::from_bytes(&bytes).unwrap();
        assert_eq!(parsed.worker_id, 7);
        assert_eq!(parsed.pcc_token(), 0x0000_ffff_ffff_ffff);
    }

    #[test]
    fn fw_token_masks_token_to_48_bits() {
        let token = FwToken::new(1, u64::MAX);
        assert_eq!(token.pcc_token(), PCC_TOKEN_MASK);
    }
}
