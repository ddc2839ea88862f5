//! # Codec Module
//!
//! Decompression for index artifacts. Every artifact is either stored with the
//! 12-byte `pagefind_dcd` signature in front of its payload, or is a gzip stream
//! whose decompressed output starts with that signature.
//!
//! - [`gzip`] - gzip member header/footer parsing
//! - [`inflate`] - raw DEFLATE decoder

pub mod gzip;
pub mod inflate;

use crate::error::RuntimeError;
use thiserror::Error;

/// Marker at the start of every decompressed artifact
pub const SIGNATURE: &[u8; 12] = b"pagefind_dcd";

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("unexpected end of compressed stream")]
    UnexpectedEof,
    #[error("invalid block type {0}")]
    InvalidBlockType(u8),
    #[error("stored block length does not match its complement")]
    StoredLengthMismatch,
    #[error("invalid Huffman code lengths")]
    InvalidCodeLengths,
    #[error("invalid Huffman code")]
    InvalidCode,
    #[error("distance {distance} reaches before the start of output ({position} bytes)")]
    InvalidDistance { distance: usize, position: usize },
    #[error("invalid gzip stream: {0}")]
    InvalidGzip(&'static str),
}

/// Outcome of unpacking an artifact
struct Unpacked {
    bytes: Vec<u8>,
    problem: Option<String>,
}

fn unpack(data: &[u8]) -> Unpacked {
    if let Some(payload) = data.strip_prefix(SIGNATURE.as_slice()) {
        return Unpacked {
            bytes: payload.to_vec(),
            problem: None,
        };
    }

    let (deflate_stream, size_hint) = if gzip::is_gzip(data) {
        match gzip::GzipMember::parse(data) {
            Ok(member) => (&data[member.payload_start..], Some(member.declared_size)),
            Err(e) => {
                return Unpacked {
                    bytes: data.to_vec(),
                    problem: Some(e.to_string()),
                };
            }
        }
    } else {
        (data, None)
    };

    let mut out = Vec::with_capacity(inflate::initial_capacity(deflate_stream.len(), size_hint));
    let inflate_problem = inflate::inflate_into(deflate_stream, &mut out)
        .err()
        .map(|e| e.to_string());

    match out.strip_prefix(SIGNATURE.as_slice()) {
        Some(payload) => Unpacked {
            bytes: payload.to_vec(),
            problem: inflate_problem,
        },
        None => Unpacked {
            bytes: out,
            problem: Some(inflate_problem.unwrap_or_else(|| "missing signature".to_string())),
        },
    }
}

/// Decompress an artifact, stripping the signature.
///
/// Never fails: when the signature is missing or the stream is damaged the
/// problem is logged and the best-effort bytes are returned, because callers
/// degrade gracefully on bad input.
pub fn decompress(data: &[u8], label: &str) -> Vec<u8> {
    let unpacked = unpack(data);
    if let Some(problem) = unpacked.problem {
        tracing::error!("Decompressing {} appears to have failed: {}", label, problem);
    }
    unpacked.bytes
}

/// Strict variant of [`decompress`] that reports a damaged artifact as
/// [`RuntimeError::CorruptArtifact`].
pub fn check_artifact(data: &[u8], label: &str) -> Result<Vec<u8>, RuntimeError> {
    let unpacked = unpack(data);
    match unpacked.problem {
        None => Ok(unpacked.bytes),
        Some(reason) => Err(RuntimeError::CorruptArtifact {
            artifact: label.to_string(),
            reason,
        }),
    }
}
