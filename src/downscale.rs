//! Deterministic spatial downscaling of tight RGBA frames.
//!
//! Two filters behind the same contract: bilinear (fast, the default) and
//! Lanczos-3 (slower, sharper). All four channels are resampled identically;
//! alpha gets no special treatment. Identical input always yields identical
//! output: accumulation order is fixed and there is no threading inside a
//! single call.

use serde::{Deserialize, Serialize};

use crate::{
    error::{LoopshotError, LoopshotResult},
    frame::{BYTES_PER_PIXEL, TightFrame},
};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScaleFilter {
    #[default]
    Bilinear,
    Lanczos3,
}

/// Resample `frame` to `target_width x target_height`.
///
/// Output is always exactly `target_width * target_height * 4` bytes; anything
/// else is a [`LoopshotError::SizeMismatch`] bug, not a recoverable condition.
pub fn downscale(
    frame: &TightFrame,
    target_width: u32,
    target_height: u32,
    filter: ScaleFilter,
) -> LoopshotResult<TightFrame> {
    if target_width == 0 || target_height == 0 {
        return Err(LoopshotError::validation(
            "downscale target width/height must be non-zero",
        ));
    }

    let data = match filter {
        ScaleFilter::Bilinear => bilinear(frame, target_width, target_height),
        ScaleFilter::Lanczos3 => lanczos3(frame, target_width, target_height),
    };

    let expected = target_width as usize * target_height as usize * BYTES_PER_PIXEL;
    if data.len() != expected {
        return Err(LoopshotError::size_mismatch(format!(
            "downscale produced {} bytes, expected {expected}",
            data.len()
        )));
    }
    TightFrame::from_rgba(target_width, target_height, data)
}

fn bilinear(frame: &TightFrame, dst_w: u32, dst_h: u32) -> Vec<u8> {
    let src_w = frame.width();
    let src_h = frame.height();
    let x_ratio = src_w as f32 / dst_w as f32;
    let y_ratio = src_h as f32 / dst_h as f32;

    let mut out = Vec::with_capacity(dst_w as usize * dst_h as usize * BYTES_PER_PIXEL);
    for y in 0..dst_h {
        let src_y = y as f32 * y_ratio;
        let y0 = (src_y.floor() as u32).min(src_h - 1);
        let y1 = (y0 + 1).min(src_h - 1);
        let wy = src_y - y0 as f32;

        for x in 0..dst_w {
            let src_x = x as f32 * x_ratio;
            let x0 = (src_x.floor() as u32).min(src_w - 1);
            let x1 = (x0 + 1).min(src_w - 1);
            let wx = src_x - x0 as f32;

            let tl = frame.pixel(x0, y0);
            let tr = frame.pixel(x1, y0);
            let bl = frame.pixel(x0, y1);
            let br = frame.pixel(x1, y1);

            for c in 0..BYTES_PER_PIXEL {
                let top = tl[c] as f32 * (1.0 - wx) + tr[c] as f32 * wx;
                let bottom = bl[c] as f32 * (1.0 - wx) + br[c] as f32 * wx;
                let v = top * (1.0 - wy) + bottom * wy;
                out.push(v.clamp(0.0, 255.0) as u8);
            }
        }
    }
    out
}

/// Separable Lanczos-3: horizontal pass into an f32 intermediate, then a
/// vertical pass. Source coordinates are clamped at the edges, same as the
/// bilinear path.
fn lanczos3(frame: &TightFrame, dst_w: u32, dst_h: u32) -> Vec<u8> {
    const A: f32 = 3.0;
    let src_w = frame.width() as usize;
    let src_h = frame.height() as usize;

    // dst_w x src_h, f32 per channel.
    let mut mid = vec![0f32; dst_w as usize * src_h * BYTES_PER_PIXEL];
    let x_scale = src_w as f32 / dst_w as f32;
    for y in 0..src_h {
        for x in 0..dst_w as usize {
            let center = (x as f32 + 0.5) * x_scale - 0.5;
            let lo = (center - A).ceil() as i64;
            let hi = (center + A).floor() as i64;
            let mut acc = [0f32; BYTES_PER_PIXEL];
            let mut wsum = 0f32;
            for j in lo..=hi {
                let w = lanczos_kernel(center - j as f32, A);
                if w == 0.0 {
                    continue;
                }
                let sx = j.clamp(0, src_w as i64 - 1) as usize;
                let base = (y * src_w + sx) * BYTES_PER_PIXEL;
                for c in 0..BYTES_PER_PIXEL {
                    acc[c] += frame.data()[base + c] as f32 * w;
                }
                wsum += w;
            }
            let base = (y * dst_w as usize + x) * BYTES_PER_PIXEL;
            for c in 0..BYTES_PER_PIXEL {
                mid[base + c] = acc[c] / wsum;
            }
        }
    }

    let mut out = Vec::with_capacity(dst_w as usize * dst_h as usize * BYTES_PER_PIXEL);
    let y_scale = src_h as f32 / dst_h as f32;
    for y in 0..dst_h as usize {
        let center = (y as f32 + 0.5) * y_scale - 0.5;
        let lo = (center - A).ceil() as i64;
        let hi = (center + A).floor() as i64;
        for x in 0..dst_w as usize {
            let mut acc = [0f32; BYTES_PER_PIXEL];
            let mut wsum = 0f32;
            for j in lo..=hi {
                let w = lanczos_kernel(center - j as f32, A);
                if w == 0.0 {
                    continue;
                }
                let sy = j.clamp(0, src_h as i64 - 1) as usize;
                let base = (sy * dst_w as usize + x) * BYTES_PER_PIXEL;
                for c in 0..BYTES_PER_PIXEL {
                    acc[c] += mid[base + c] * w;
                }
                wsum += w;
            }
            for c in 0..BYTES_PER_PIXEL {
                out.push((acc[c] / wsum).clamp(0.0, 255.0) as u8);
            }
        }
    }
    out
}

fn lanczos_kernel(x: f32, a: f32) -> f32 {
    if x.abs() >= a {
        return 0.0;
    }
    if x == 0.0 {
        return 1.0;
    }
    let px = std::f32::consts::PI * x;
    a * px.sin() * (px / a).sin() / (px * px)
}
