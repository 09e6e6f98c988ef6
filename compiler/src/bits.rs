// bits.rs — MSB-first bit streams for .pch2 section payloads
//
// Section payloads pack their fields at bit granularity, most significant
// bit first, starting on a byte boundary. The reader never panics on short
// input: a read past the end yields `None` and leaves the cursor untouched.

/// Cursor over a byte slice, reading fields of up to 32 bits.
#[derive(Debug, Clone)]
pub struct BitReader<'a> {
    data: &'a [u8],
    bit_pos: usize,
}

impl<'a> BitReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        BitReader { data, bit_pos: 0 }
    }

    /// Read `width` bits (1..=32) as an unsigned integer.
    pub fn read(&mut self, width: u32) -> Option<u32> {
        debug_assert!((1..=32).contains(&width));
        let width = width as usize;
        if self.remaining_bits() < width {
            return None;
        }
        let mut value: u32 = 0;
        for _ in 0..width {
            let byte = self.data[self.bit_pos / 8];
            let bit = (byte >> (7 - self.bit_pos % 8)) & 1;
            value = (value << 1) | u32::from(bit);
            self.bit_pos += 1;
        }
        Some(value)
    }

    /// Advance past `width` bits of fields the decoder does not keep.
    pub fn skip(&mut self, width: usize) -> Option<()> {
        if self.remaining_bits() < width {
            return None;
        }
        self.bit_pos += width;
        Some(())
    }

    pub fn remaining_bits(&self) -> usize {
        self.data.len() * 8 - self.bit_pos
    }

    /// Whole bytes touched so far; a partially read byte counts.
    pub fn bytes_consumed(&self) -> usize {
        self.bit_pos.div_ceil(8)
    }
}

/// Accumulates MSB-first fields into bytes, zero-padding the final byte.
#[derive(Debug, Clone, Default)]
pub struct BitWriter {
    bytes: Vec<u8>,
    bit_pos: usize,
}

impl BitWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append the low `width` bits of `value`. Higher bits are dropped.
    pub fn write(&mut self, value: u32, width: u32) {
        debug_assert!((1..=32).contains(&width));
        for i in (0..width).rev() {
            if self.bit_pos % 8 == 0 {
                self.bytes.push(0);
            }
            let bit = ((value >> i) & 1) as u8;
            if let Some(last) = self.bytes.last_mut() {
                *last |= bit << (7 - self.bit_pos % 8);
            }
            self.bit_pos += 1;
        }
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}
