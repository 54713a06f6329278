//! Floyd–Steinberg error diffusion over a private working copy.
//!
//! Diffusion runs in raster order on f32 RGB triples; the caller's frame is
//! never written to. Fully transparent pixels take no part: they receive no
//! error, contribute none, and always index 0.

use super::{IndexedFrame, Palette};
use crate::frame::TightFrame;

// (dx, dy, numerator/16)
const KERNEL: [(i64, i64, f32); 4] = [
    (1, 0, 7.0 / 16.0),
    (-1, 1, 3.0 / 16.0),
    (0, 1, 5.0 / 16.0),
    (1, 1, 1.0 / 16.0),
];

pub(crate) fn dither_frame(frame: &TightFrame, palette: &Palette) -> IndexedFrame {
    let width = frame.width() as usize;
    let height = frame.height() as usize;

    let mut work: Vec<[f32; 3]> = Vec::with_capacity(width * height);
    let mut opaque: Vec<bool> = Vec::with_capacity(width * height);
    for px in frame.data().chunks_exact(4) {
        work.push([px[0] as f32, px[1] as f32, px[2] as f32]);
        opaque.push(px[3] != 0);
    }

    let mut indices = vec![0u8; width * height];
    for y in 0..height {
        for x in 0..width {
            let i = y * width + x;
            if !opaque[i] {
                continue;
            }
            let current = work[i];
            let idx = palette.nearest_f32(current);
            indices[i] = idx;

            let chosen = palette.colors()[idx as usize];
            let err = [
                current[0] - chosen[0] as f32,
                current[1] - chosen[1] as f32,
                current[2] - chosen[2] as f32,
            ];
            for (dx, dy, weight) in KERNEL {
                let nx = x as i64 + dx;
                let ny = y as i64 + dy;
                if nx < 0 || nx >= width as i64 || ny >= height as i64 {
                    continue;
                }
                let j = ny as usize * width + nx as usize;
                if !opaque[j] {
                    continue;
                }
                for c in 0..3 {
                    work[j][c] = (work[j][c] + err[c] * weight).clamp(0.0, 255.0);
                }
            }
        }
    }

    IndexedFrame {
        width: frame.width(),
        height: frame.height(),
        indices,
    }
}
