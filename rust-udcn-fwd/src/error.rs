//! Error types for the forwarding core.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum FwdError {
    #[error("PCCT is at capacity ({0} entries)")]
    PcctFull(usize),

    #[error("PCCT token space exhausted after {0} collision retries")]
    TokenExhausted(u32),

    #[error("no FIB entry covers this name")]
    NoRoute,

    #[error("face {0} is closed")]
    FaceClosed(u16),

    #[error("reassembly failed: {0}")]
    Reassembly(String),

    #[error(transparent)]
    Parse(#[from] rust_udcn_common::error::ParseError),

    #[error(transparent)]
    Common(#[from] rust_udcn_common::Error),
}

pub type Result<T> = std::result::Result<T, FwdError>;
