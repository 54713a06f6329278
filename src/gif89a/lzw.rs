//! Variable-width LZW compression for GIF image data.
//!
//! Codes are packed least-significant-bit first. The code width grows from
//! `min_code_size + 1` up to 12 bits; the dictionary is rebuilt after an
//! explicit Clear whenever it fills. Width bumps track the table a decoder
//! reconstructs: the decoder adds one entry per received code after the first
//! of each segment, so the encoder advances its `next_code` counter on every
//! emitted data code except that first one and widens when the counter reaches
//! the current width's limit.

const MAX_CODE: u16 = 4096;

/// LSB-first bit packer.
struct BitWriter {
    out: Vec<u8>,
    acc: u32,
    nbits: u32,
}

impl BitWriter {
    fn new() -> Self {
        Self {
            out: Vec::new(),
            acc: 0,
            nbits: 0,
        }
    }

    fn write(&mut self, code: u16, width: u32) {
        self.acc |= (code as u32) << self.nbits;
        self.nbits += width;
        while self.nbits >= 8 {
            self.out.push((self.acc & 0xFF) as u8);
            self.acc >>= 8;
            self.nbits -= 8;
        }
    }

    fn finish(mut self) -> Vec<u8> {
        if self.nbits > 0 {
            self.out.push((self.acc & 0xFF) as u8);
        }
        self.out
    }
}

struct Encoder {
    writer: BitWriter,
    table: std::collections::HashMap<(u16, u8), u16>,
    clear_code: u16,
    end_code: u16,
    width: u32,
    min_width: u32,
    next_code: u16,
    emitted_in_segment: bool,
}

impl Encoder {
    fn new(min_code_size: u32) -> Self {
        let clear_code = 1u16 << min_code_size;
        let mut enc = Self {
            writer: BitWriter::new(),
            table: std::collections::HashMap::new(),
            clear_code,
            end_code: clear_code + 1,
            width: min_code_size + 1,
            min_width: min_code_size + 1,
            next_code: clear_code + 2,
            emitted_in_segment: false,
        };
        enc.writer.write(enc.clear_code, enc.width);
        enc
    }

    /// Emit a data code and advance the decoder-mirrored table counter. The
    /// first code after a Clear adds no decoder entry, so it does not advance.
    fn emit(&mut self, code: u16) {
        self.writer.write(code, self.width);
        if !self.emitted_in_segment {
            self.emitted_in_segment = true;
            return;
        }
        if self.next_code < MAX_CODE {
            self.next_code += 1;
            if u32::from(self.next_code) == (1 << self.width) && self.width < 12 {
                self.width += 1;
            }
        }
    }

    fn clear(&mut self) {
        self.writer.write(self.clear_code, self.width);
        self.table.clear();
        self.next_code = self.end_code + 1;
        self.width = self.min_width;
        self.emitted_in_segment = false;
    }
}

/// Compress `indices` into a raw LZW code stream (no sub-block framing).
///
/// Every index must be below `1 << min_code_size`; the caller validates that.
pub(crate) fn compress(indices: &[u8], min_code_size: u32) -> Vec<u8> {
    let mut enc = Encoder::new(min_code_size);

    let mut iter = indices.iter();
    let Some(&first) = iter.next() else {
        enc.emit(enc.end_code);
        return enc.writer.finish();
    };
    let mut prefix = first as u16;

    for &k in iter {
        if let Some(&code) = enc.table.get(&(prefix, k)) {
            prefix = code;
            continue;
        }
        enc.emit(prefix);
        if enc.next_code < MAX_CODE {
            enc.table.insert((prefix, k), enc.next_code);
        } else {
            enc.clear();
        }
        prefix = k as u16;
    }

    enc.emit(prefix);
    let end = enc.end_code;
    enc.writer.write(end, enc.width);
    enc.writer.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Reference decoder used only to check the encoder; follows the GIF89a
    /// appendix directly.
    fn decompress(data: &[u8], min_code_size: u32) -> Vec<u8> {
        let clear: u16 = 1 << min_code_size;
        let end: u16 = clear + 1;

        let mut entries: Vec<Vec<u8>> = Vec::new();
        let reset = |entries: &mut Vec<Vec<u8>>| {
            entries.clear();
            for i in 0..clear {
                entries.push(vec![i as u8]);
            }
            entries.push(Vec::new()); // clear
            entries.push(Vec::new()); // end
        };
        reset(&mut entries);

        let mut out = Vec::new();
        let mut width = min_code_size + 1;
        let mut acc: u32 = 0;
        let mut nbits: u32 = 0;
        let mut bytes = data.iter();
        let mut prev: Option<u16> = None;

        loop {
            while nbits < width {
                let Some(&b) = bytes.next() else {
                    panic!("stream ended without End code");
                };
                acc |= (b as u32) << nbits;
                nbits += 8;
            }
            let code = (acc & ((1 << width) - 1)) as u16;
            acc >>= width;
            nbits -= width;

            if code == clear {
                reset(&mut entries);
                width = min_code_size + 1;
                prev = None;
                continue;
            }
            if code == end {
                return out;
            }

            let entry = if (code as usize) < entries.len() {
                entries[code as usize].clone()
            } else {
                let p = &entries[prev.expect("first code out of range") as usize];
                let mut e = p.clone();
                e.push(p[0]);
                e
            };
            out.extend_from_slice(&entry);

            if let Some(p) = prev {
                if entries.len() < MAX_CODE as usize {
                    let mut n = entries[p as usize].clone();
                    n.push(entry[0]);
                    entries.push(n);
                    if entries.len() == 1 << width && width < 12 {
                        width += 1;
                    }
                }
            }
            prev = Some(code);
        }
    }

    #[test]
    fn single_index_stream() {
        let data = compress(&[3], 2);
        assert_eq!(decompress(&data, 2), vec![3]);
    }

    #[test]
    fn repeated_run_compresses_and_round_trips() {
        let indices = vec![1u8; 5000];
        let data = compress(&indices, 2);
        assert!(data.len() < indices.len() / 4);
        assert_eq!(decompress(&data, 2), indices);
    }

    #[test]
    fn alternating_pattern_round_trips() {
        let indices: Vec<u8> = (0..4096).map(|i| (i % 4) as u8).collect();
        let data = compress(&indices, 2);
        assert_eq!(decompress(&data, 2), indices);
    }

    #[test]
    fn eight_bit_noise_forces_dictionary_clear_and_round_trips() {
        // A long pseudo-random 256-symbol stream overflows the 4096-entry
        // table and exercises the mid-stream Clear path.
        let mut state = 0x2545F491u32;
        let indices: Vec<u8> = (0..40_000)
            .map(|_| {
                state ^= state << 13;
                state ^= state >> 17;
                state ^= state << 5;
                (state >> 8) as u8
            })
            .collect();
        let data = compress(&indices, 8);
        assert_eq!(decompress(&data, 8), indices);
    }

    #[test]
    fn two_color_image_uses_min_code_size_two() {
        // GIF disallows min code size 1; callers pass 2 even for tiny
        // palettes. Indices 0 and 1 must survive.
        let indices = vec![0u8, 1, 0, 1, 1, 0, 0, 0, 1];
        let data = compress(&indices, 2);
        assert_eq!(decompress(&data, 2), indices);
    }

    #[test]
    fn stream_starts_with_clear_code() {
        let data = compress(&[0, 0, 0], 2);
        // width 3, LSB-first: first three bits must be 0b100 (code 4).
        assert_eq!(data[0] & 0b111, 0b100);
    }
}
