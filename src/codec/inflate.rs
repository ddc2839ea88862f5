//! Raw DEFLATE (RFC 1951) decoder
//!
//! Handles stored, fixed-Huffman and dynamic-Huffman blocks. Huffman tables are
//! kept in canonical form (code counts per length plus symbols ordered by code)
//! and decoded one bit at a time, which keeps table construction trivial and is
//! fast enough for index artifacts of a few hundred kilobytes.

use super::CodecError;

const MAX_BITS: usize = 15;
const MAX_LITERAL_CODES: usize = 286;
const MAX_DISTANCE_CODES: usize = 30;
const FIXED_LITERAL_CODES: usize = 288;

/// Upper bound on the DEFLATE expansion ratio, used to sanity-check size hints
const MAX_EXPANSION: usize = 1032;

const LENGTH_BASE: [u16; 29] = [
    3, 4, 5, 6, 7, 8, 9, 10, 11, 13, 15, 17, 19, 23, 27, 31, 35, 43, 51, 59, 67, 83, 99, 115, 131,
    163, 195, 227, 258,
];
const LENGTH_EXTRA: [u8; 29] = [
    0, 0, 0, 0, 0, 0, 0, 0, 1, 1, 1, 1, 2, 2, 2, 2, 3, 3, 3, 3, 4, 4, 4, 4, 5, 5, 5, 5, 0,
];
const DIST_BASE: [u16; 30] = [
    1, 2, 3, 4, 5, 7, 9, 13, 17, 25, 33, 49, 65, 97, 129, 193, 257, 385, 513, 769, 1025, 1537,
    2049, 3073, 4097, 6145, 8193, 12289, 16385, 24577,
];
const DIST_EXTRA: [u8; 30] = [
    0, 0, 0, 0, 1, 1, 2, 2, 3, 3, 4, 4, 5, 5, 6, 6, 7, 7, 8, 8, 9, 9, 10, 10, 11, 11, 12, 12, 13,
    13,
];

/// Order in which code length code lengths are transmitted
const CODE_LENGTH_ORDER: [usize; 19] = [
    16, 17, 18, 0, 8, 7, 9, 6, 10, 5, 11, 4, 12, 3, 13, 2, 14, 1, 15,
];

/// LSB-first bit reader over a byte slice
struct BitReader<'a> {
    data: &'a [u8],
    pos: usize,
    bit_buf: u64,
    bit_count: u32,
}

impl<'a> BitReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            bit_buf: 0,
            bit_count: 0,
        }
    }

    fn need(&mut self, n: u32) -> Result<(), CodecError> {
        while self.bit_count < n {
            let byte = *self.data.get(self.pos).ok_or(CodecError::UnexpectedEof)?;
            self.bit_buf |= u64::from(byte) << self.bit_count;
            self.pos += 1;
            self.bit_count += 8;
        }
        Ok(())
    }

    fn bits(&mut self, n: u32) -> Result<u32, CodecError> {
        if n == 0 {
            return Ok(0);
        }
        self.need(n)?;
        let value = (self.bit_buf & ((1u64 << n) - 1)) as u32;
        self.bit_buf >>= n;
        self.bit_count -= n;
        Ok(value)
    }

    /// Discard bits up to the next byte boundary
    fn align_to_byte(&mut self) {
        let drop = self.bit_count % 8;
        self.bit_buf >>= drop;
        self.bit_count -= drop;
    }

    /// Bytes consumed from the input, excluding whole bytes still buffered
    fn consumed(&self) -> usize {
        self.pos - (self.bit_count / 8) as usize
    }
}

/// Canonical Huffman table
struct Huffman {
    counts: [u16; MAX_BITS + 1],
    symbols: Vec<u16>,
}

impl Huffman {
    fn new(lengths: &[u8]) -> Result<Self, CodecError> {
        let mut counts = [0u16; MAX_BITS + 1];
        for &len in lengths {
            counts[len as usize] += 1;
        }
        counts[0] = 0;

        // Over-subscribed sets cannot be decoded; incomplete ones are allowed
        let mut left: i32 = 1;
        for &count in counts.iter().skip(1) {
            left <<= 1;
            left -= i32::from(count);
            if left < 0 {
                return Err(CodecError::InvalidCodeLengths);
            }
        }

        let mut offsets = [0u16; MAX_BITS + 2];
        for len in 1..=MAX_BITS {
            offsets[len + 1] = offsets[len] + counts[len];
        }

        let mut symbols = vec![0u16; lengths.len()];
        for (symbol, &len) in lengths.iter().enumerate() {
            if len != 0 {
                let slot = &mut offsets[len as usize];
                symbols[*slot as usize] = symbol as u16;
                *slot += 1;
            }
        }

        Ok(Self { counts, symbols })
    }

    fn decode(&self, reader: &mut BitReader<'_>) -> Result<u16, CodecError> {
        let mut code: i32 = 0;
        let mut first: i32 = 0;
        let mut index: i32 = 0;
        for len in 1..=MAX_BITS {
            code |= reader.bits(1)? as i32;
            let count = i32::from(self.counts[len]);
            if code - count < first {
                return Ok(self.symbols[(index + (code - first)) as usize]);
            }
            index += count;
            first += count;
            first <<= 1;
            code <<= 1;
        }
        Err(CodecError::InvalidCode)
    }
}

/// Grow `out` so it can take `additional` more bytes, doubling or fitting
fn reserve(out: &mut Vec<u8>, additional: usize) {
    let needed = out.len() + additional;
    if needed > out.capacity() {
        let target = std::cmp::max(out.capacity() * 2, needed);
        out.reserve_exact(target - out.len());
    }
}

fn fixed_tables() -> Result<(Huffman, Huffman), CodecError> {
    let mut lengths = [0u8; FIXED_LITERAL_CODES];
    lengths[..144].fill(8);
    lengths[144..256].fill(9);
    lengths[256..280].fill(7);
    lengths[280..].fill(8);
    let literals = Huffman::new(&lengths)?;
    let distances = Huffman::new(&[5u8; MAX_DISTANCE_CODES])?;
    Ok((literals, distances))
}

fn dynamic_tables(reader: &mut BitReader<'_>) -> Result<(Huffman, Huffman), CodecError> {
    let literal_count = reader.bits(5)? as usize + 257;
    let distance_count = reader.bits(5)? as usize + 1;
    let code_length_count = reader.bits(4)? as usize + 4;
    if literal_count > MAX_LITERAL_CODES || distance_count > MAX_DISTANCE_CODES {
        return Err(CodecError::InvalidCodeLengths);
    }

    let mut code_lengths = [0u8; 19];
    for &slot in CODE_LENGTH_ORDER.iter().take(code_length_count) {
        code_lengths[slot] = reader.bits(3)? as u8;
    }
    let code_length_table = Huffman::new(&code_lengths)?;

    let total = literal_count + distance_count;
    let mut lengths = vec![0u8; total];
    let mut index = 0;
    while index < total {
        let symbol = code_length_table.decode(reader)?;
        if symbol < 16 {
            lengths[index] = symbol as u8;
            index += 1;
            continue;
        }
        let (value, repeat) = match symbol {
            16 => {
                let previous = *index
                    .checked_sub(1)
                    .and_then(|i| lengths.get(i))
                    .ok_or(CodecError::InvalidCodeLengths)?;
                (previous, 3 + reader.bits(2)? as usize)
            }
            17 => (0, 3 + reader.bits(3)? as usize),
            _ => (0, 11 + reader.bits(7)? as usize),
        };
        if index + repeat > total {
            return Err(CodecError::InvalidCodeLengths);
        }
        lengths[index..index + repeat].fill(value);
        index += repeat;
    }

    // A block without an end-of-block code could never terminate
    if lengths[256] == 0 {
        return Err(CodecError::InvalidCodeLengths);
    }

    let literals = Huffman::new(&lengths[..literal_count])?;
    let distances = Huffman::new(&lengths[literal_count..])?;
    Ok((literals, distances))
}

fn stored_block(reader: &mut BitReader<'_>, out: &mut Vec<u8>) -> Result<(), CodecError> {
    reader.align_to_byte();
    let len = reader.bits(16)? as usize;
    let nlen = reader.bits(16)? as usize;
    if len != (!nlen & 0xffff) {
        return Err(CodecError::StoredLengthMismatch);
    }
    reserve(out, len);

    let mut remaining = len;
    while remaining > 0 && reader.bit_count >= 8 {
        out.push(reader.bits(8)? as u8);
        remaining -= 1;
    }
    let available = reader.data.len().saturating_sub(reader.pos);
    let take = remaining.min(available);
    out.extend_from_slice(&reader.data[reader.pos..reader.pos + take]);
    reader.pos += take;
    if take < remaining {
        return Err(CodecError::UnexpectedEof);
    }
    Ok(())
}

fn huffman_block(
    reader: &mut BitReader<'_>,
    out: &mut Vec<u8>,
    literals: &Huffman,
    distances: &Huffman,
) -> Result<(), CodecError> {
    loop {
        let symbol = literals.decode(reader)? as usize;
        if symbol < 256 {
            reserve(out, 1);
            out.push(symbol as u8);
            continue;
        }
        if symbol == 256 {
            return Ok(());
        }

        let length_index = symbol - 257;
        if length_index >= LENGTH_BASE.len() {
            return Err(CodecError::InvalidCode);
        }
        let length = LENGTH_BASE[length_index] as usize
            + reader.bits(u32::from(LENGTH_EXTRA[length_index]))? as usize;

        let distance_index = distances.decode(reader)? as usize;
        if distance_index >= DIST_BASE.len() {
            return Err(CodecError::InvalidCode);
        }
        let distance = DIST_BASE[distance_index] as usize
            + reader.bits(u32::from(DIST_EXTRA[distance_index]))? as usize;
        if distance > out.len() {
            return Err(CodecError::InvalidDistance {
                distance,
                position: out.len(),
            });
        }

        reserve(out, length);
        let start = out.len() - distance;
        // Byte-wise copy: the source may overlap the bytes being written
        for i in 0..length {
            let byte = out[start + i];
            out.push(byte);
        }
    }
}

/// Inflate a raw DEFLATE stream, appending to `out`.
///
/// Returns the number of input bytes consumed. On error, `out` keeps whatever was
/// decoded before the failure.
pub fn inflate_into(data: &[u8], out: &mut Vec<u8>) -> Result<usize, CodecError> {
    let mut reader = BitReader::new(data);
    loop {
        let last = reader.bits(1)? == 1;
        match reader.bits(2)? {
            0 => stored_block(&mut reader, out)?,
            1 => {
                let (literals, distances) = fixed_tables()?;
                huffman_block(&mut reader, out, &literals, &distances)?;
            }
            2 => {
                let (literals, distances) = dynamic_tables(&mut reader)?;
                huffman_block(&mut reader, out, &literals, &distances)?;
            }
            other => return Err(CodecError::InvalidBlockType(other as u8)),
        }
        if last {
            return Ok(reader.consumed());
        }
    }
}

/// Inflate a raw DEFLATE stream into a new buffer.
///
/// `size_hint` is the expected output size (gzip ISIZE); implausible hints are
/// clamped so a corrupt footer cannot trigger a huge allocation.
pub fn inflate(data: &[u8], size_hint: Option<usize>) -> Result<Vec<u8>, CodecError> {
    let mut out = Vec::with_capacity(initial_capacity(data.len(), size_hint));
    inflate_into(data, &mut out)?;
    Ok(out)
}

pub(crate) fn initial_capacity(input_len: usize, size_hint: Option<usize>) -> usize {
    let ceiling = input_len.saturating_mul(MAX_EXPANSION).max(64);
    match size_hint {
        Some(hint) => hint.min(ceiling),
        None => input_len.saturating_mul(3).min(ceiling),
    }
}
