//! gzip container (RFC 1952) header and footer handling

use super::CodecError;

const ID1: u8 = 0x1f;
const ID2: u8 = 0x8b;
const CM_DEFLATE: u8 = 8;

const FHCRC: u8 = 0x02;
const FEXTRA: u8 = 0x04;
const FNAME: u8 = 0x08;
const FCOMMENT: u8 = 0x10;

const FIXED_HEADER_LEN: usize = 10;
const FOOTER_LEN: usize = 8;

/// Location of the DEFLATE payload inside a gzip member
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GzipMember {
    /// Offset of the first DEFLATE byte
    pub payload_start: usize,
    /// Uncompressed length declared by the ISIZE footer field (mod 2^32)
    pub declared_size: usize,
}

/// Whether `data` starts with the gzip magic bytes
pub fn is_gzip(data: &[u8]) -> bool {
    data.len() >= 2 && data[0] == ID1 && data[1] == ID2
}

impl GzipMember {
    /// Parse the member header, skipping the optional extra, name, comment and
    /// header CRC fields.
    pub fn parse(data: &[u8]) -> Result<Self, CodecError> {
        if data.len() < FIXED_HEADER_LEN + FOOTER_LEN {
            return Err(CodecError::InvalidGzip("stream shorter than header and footer"));
        }
        if !is_gzip(data) {
            return Err(CodecError::InvalidGzip("missing magic bytes"));
        }
        if data[2] != CM_DEFLATE {
            return Err(CodecError::InvalidGzip("unsupported compression method"));
        }

        let flags = data[3];
        let mut offset = FIXED_HEADER_LEN;

        if flags & FEXTRA != 0 {
            let xlen = data
                .get(offset..offset + 2)
                .map(|b| u16::from_le_bytes([b[0], b[1]]) as usize)
                .ok_or(CodecError::InvalidGzip("truncated extra field"))?;
            offset += 2 + xlen;
        }
        if flags & FNAME != 0 {
            offset = skip_zero_terminated(data, offset)?;
        }
        if flags & FCOMMENT != 0 {
            offset = skip_zero_terminated(data, offset)?;
        }
        if flags & FHCRC != 0 {
            offset += 2;
        }

        if offset > data.len() - FOOTER_LEN {
            return Err(CodecError::InvalidGzip("header overruns payload"));
        }

        Ok(Self {
            payload_start: offset,
            declared_size: declared_size(data),
        })
    }
}

fn skip_zero_terminated(data: &[u8], offset: usize) -> Result<usize, CodecError> {
    let rest = data
        .get(offset..)
        .ok_or(CodecError::InvalidGzip("truncated header"))?;
    let terminator = rest
        .iter()
        .position(|&b| b == 0)
        .ok_or(CodecError::InvalidGzip("unterminated header string"))?;
    Ok(offset + terminator + 1)
}

/// ISIZE: the last four bytes of the footer, little endian
fn declared_size(data: &[u8]) -> usize {
    let len = data.len();
    u32::from_le_bytes([data[len - 4], data[len - 3], data[len - 2], data[len - 1]]) as usize
}
