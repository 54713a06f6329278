//! GIF89a byte-stream assembly.
//!
//! Writes the full file: signature, logical screen descriptor, global color
//! table, optional NETSCAPE2.0 looping extension, then per frame a graphics
//! control extension, image descriptor, and LZW-compressed pixel data split
//! into 255-byte sub-blocks. There is exactly one (global) color table; local
//! tables and interlacing are never emitted.

mod lzw;

use tracing::debug;

use crate::{
    error::{LoopshotError, LoopshotResult},
    quantize::{IndexedFrame, Palette},
};

const GIF_SIGNATURE: &[u8; 6] = b"GIF89a";
const TRAILER: u8 = 0x3B;
const EXTENSION_INTRODUCER: u8 = 0x21;
const GRAPHIC_CONTROL_LABEL: u8 = 0xF9;
const APPLICATION_LABEL: u8 = 0xFF;
const IMAGE_SEPARATOR: u8 = 0x2C;

#[derive(Clone, Copy, Debug)]
pub struct EncodeOptions {
    /// Per-frame delay in centiseconds.
    pub delay_cs: u16,
    /// Emit a NETSCAPE2.0 extension with loop count 0 (loop forever).
    pub loop_forever: bool,
}

impl Default for EncodeOptions {
    fn default() -> Self {
        Self {
            delay_cs: 4,
            loop_forever: true,
        }
    }
}

/// Bits needed to address `n` values, clamped to GIF's minimum field of 1.
fn bits_for(n: usize) -> u32 {
    let mut bits = 1;
    while (1usize << bits) < n {
        bits += 1;
    }
    bits
}

/// Assemble a complete animated GIF from a shared palette and indexed frames.
///
/// All frames must share one size, every index must fall inside the palette,
/// and the palette must hold 1..=256 entries; violations surface as
/// [`LoopshotError::Encode`] before any bytes are produced.
pub fn encode(
    palette: &Palette,
    frames: &[IndexedFrame],
    options: &EncodeOptions,
) -> LoopshotResult<Vec<u8>> {
    if frames.is_empty() {
        return Err(LoopshotError::encode("no frames to encode"));
    }
    if palette.is_empty() || palette.len() > 256 {
        return Err(LoopshotError::encode(format!(
            "palette size {} outside 1..=256",
            palette.len()
        )));
    }

    let width = frames[0].width();
    let height = frames[0].height();
    if width > u16::MAX as u32 || height > u16::MAX as u32 {
        return Err(LoopshotError::encode("frame dimensions must fit in u16"));
    }
    for (i, f) in frames.iter().enumerate() {
        if f.width() != width || f.height() != height {
            return Err(LoopshotError::encode(format!(
                "frame {i} is {}x{}, batch is {width}x{height}",
                f.width(),
                f.height()
            )));
        }
        if let Some(&bad) = f.indices().iter().find(|&&idx| idx as usize >= palette.len()) {
            return Err(LoopshotError::encode(format!(
                "frame {i} references palette index {bad}, palette has {} entries",
                palette.len()
            )));
        }
    }

    let table_field = bits_for(palette.len()) - 1;
    let min_code_size = (table_field + 1).max(2);

    let mut out = Vec::new();
    out.extend_from_slice(GIF_SIGNATURE);

    // Logical screen descriptor.
    out.extend_from_slice(&(width as u16).to_le_bytes());
    out.extend_from_slice(&(height as u16).to_le_bytes());
    // Global color table present, 8 bits of color resolution, not sorted.
    out.push(0xF0 | table_field as u8);
    out.push(0); // background color index
    out.push(0); // pixel aspect ratio

    // Global color table, zero-padded to the declared power of two.
    let table_len = 1usize << (table_field + 1);
    for c in palette.colors() {
        out.extend_from_slice(c);
    }
    for _ in palette.len()..table_len {
        out.extend_from_slice(&[0, 0, 0]);
    }

    if options.loop_forever {
        write_netscape_loop(&mut out, 0);
    }

    for frame in frames {
        write_frame(&mut out, frame, options.delay_cs, min_code_size);
    }
    out.push(TRAILER);

    debug!(
        frames = frames.len(),
        palette = palette.len(),
        bytes = out.len(),
        "gif assembled"
    );
    Ok(out)
}

fn write_netscape_loop(out: &mut Vec<u8>, loop_count: u16) {
    out.push(EXTENSION_INTRODUCER);
    out.push(APPLICATION_LABEL);
    out.push(11);
    out.extend_from_slice(b"NETSCAPE2.0");
    out.push(3); // sub-block: id + loop count
    out.push(1);
    out.extend_from_slice(&loop_count.to_le_bytes());
    out.push(0);
}

fn write_frame(out: &mut Vec<u8>, frame: &IndexedFrame, delay_cs: u16, min_code_size: u32) {
    // Graphics control extension: disposal 1 (leave in place), no transparency.
    out.push(EXTENSION_INTRODUCER);
    out.push(GRAPHIC_CONTROL_LABEL);
    out.push(4);
    out.push(0x04);
    out.extend_from_slice(&delay_cs.to_le_bytes());
    out.push(0); // transparent color index (unused)
    out.push(0);

    // Image descriptor at the origin, no local color table, not interlaced.
    out.push(IMAGE_SEPARATOR);
    out.extend_from_slice(&0u16.to_le_bytes());
    out.extend_from_slice(&0u16.to_le_bytes());
    out.extend_from_slice(&(frame.width() as u16).to_le_bytes());
    out.extend_from_slice(&(frame.height() as u16).to_le_bytes());
    out.push(0);

    out.push(min_code_size as u8);
    let compressed = lzw::compress(frame.indices(), min_code_size);
    for chunk in compressed.chunks(255) {
        out.push(chunk.len() as u8);
        out.extend_from_slice(chunk);
    }
    out.push(0); // block terminator
}
