//! Error types for the μDCN implementation.

use thiserror::Error;

/// Failure kinds produced while decoding a TLV-encoded packet.
///
/// Kept distinct from [`Error::Tlv`]'s free-form string so that callers on
/// the forwarding path can match on kind instead of parsing text.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseError {
    /// Buffer ran out before a TLV element could be fully decoded.
    #[error("incomplete TLV")]
    Incomplete,
    /// A decoded TLV-LENGTH would read past the end of the reassembled packet.
    #[error("TLV length overflow")]
    LengthOverflow,
    /// The TLV-TYPE was not one this parser understands at this position.
    #[error("unexpected TLV type")]
    BadType,
}

/// All possible errors that can occur within the μDCN implementation.
#[derive(Error, Debug)]
pub enum Error {
    /// Error related to TLV encoding/decoding.
    #[error("TLV error: {0}")]
    Tlv(String),

    /// Structured parse failure, as opposed to the free-form [`Error::Tlv`].
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    /// Error related to NDN packet processing.
    #[error("NDN packet error: {0}")]
    NdnPacket(String),

    /// Error related to QUIC transport.
    #[error("QUIC transport error: {0}")]
    QuicTransport(String),

    /// Error related to eBPF/XDP operations.
    #[error("eBPF/XDP error: {0}")]
    Ebpf(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Other errors
    #[error("Other error: {0}")]
    Other(String),
}
