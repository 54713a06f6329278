//! Global palette construction and pixel indexing.
//!
//! The palette is computed once over the entire frame batch and reused for
//! every frame's index mapping; per-frame palettes would flicker colors across
//! the animation and are deliberately not supported. Two partition strategies
//! (median-cut and octree) sit behind the same entry point; selection is a
//! configuration value. All working state (histogram, tree) is built fresh per
//! call and dropped on return.

mod dither;
mod median_cut;
mod octree;

use std::collections::{BTreeMap, HashMap};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{
    error::{LoopshotError, LoopshotResult},
    frame::TightFrame,
};

/// Ordered set of at most 256 RGB triples. Index 0 doubles as the
/// background/transparent sentinel in this pipeline. Immutable once built.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Palette {
    colors: Vec<[u8; 3]>,
}

impl Palette {
    pub fn from_colors(colors: Vec<[u8; 3]>) -> LoopshotResult<Self> {
        if colors.is_empty() {
            return Err(LoopshotError::validation("palette must not be empty"));
        }
        if colors.len() > 256 {
            return Err(LoopshotError::validation(format!(
                "palette holds {} colors, maximum is 256",
                colors.len()
            )));
        }
        Ok(Self { colors })
    }

    pub fn len(&self) -> usize {
        self.colors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }

    pub fn colors(&self) -> &[[u8; 3]] {
        &self.colors
    }

    /// Nearest palette entry by squared Euclidean RGB distance; ties resolve
    /// to the lowest index.
    pub fn nearest(&self, rgb: [u8; 3]) -> u8 {
        let mut best = 0usize;
        let mut best_dist = u32::MAX;
        for (i, c) in self.colors.iter().enumerate() {
            let dr = c[0] as i32 - rgb[0] as i32;
            let dg = c[1] as i32 - rgb[1] as i32;
            let db = c[2] as i32 - rgb[2] as i32;
            let dist = (dr * dr + dg * dg + db * db) as u32;
            if dist < best_dist {
                best_dist = dist;
                best = i;
            }
        }
        best as u8
    }

    fn nearest_f32(&self, rgb: [f32; 3]) -> u8 {
        let mut best = 0usize;
        let mut best_dist = f32::INFINITY;
        for (i, c) in self.colors.iter().enumerate() {
            let dr = c[0] as f32 - rgb[0];
            let dg = c[1] as f32 - rgb[1];
            let db = c[2] as f32 - rgb[2];
            let dist = dr * dr + dg * dg + db * db;
            if dist < best_dist {
                best_dist = dist;
                best = i;
            }
        }
        best as u8
    }
}

/// One palette-index byte per pixel. Produced by [`quantize`] and consumed by
/// the GIF encoder.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IndexedFrame {
    width: u32,
    height: u32,
    indices: Vec<u8>,
}

impl IndexedFrame {
    pub fn new(width: u32, height: u32, indices: Vec<u8>) -> LoopshotResult<Self> {
        if indices.len() != width as usize * height as usize {
            return Err(LoopshotError::size_mismatch(format!(
                "indexed frame holds {} indices, expected width*height = {}",
                indices.len(),
                width as usize * height as usize
            )));
        }
        Ok(Self {
            width,
            height,
            indices,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn indices(&self) -> &[u8] {
        &self.indices
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum QuantizerKind {
    #[default]
    MedianCut,
    Octree,
}

#[derive(Clone, Debug)]
pub struct QuantizeOptions {
    pub max_colors: usize,
    pub dither: bool,
    pub kind: QuantizerKind,
}

impl Default for QuantizeOptions {
    fn default() -> Self {
        Self {
            max_colors: 256,
            dither: false,
            kind: QuantizerKind::MedianCut,
        }
    }
}

/// Build a global palette across `frames` and map every pixel to an index.
///
/// Fully transparent pixels (alpha == 0) are excluded from palette
/// construction and always map to index 0. With `dither` enabled, each frame
/// is Floyd–Steinberg dithered on a private working copy; caller-owned pixel
/// buffers are never mutated. Dithering disabled, the same batch always yields
/// the same palette and indices.
#[tracing::instrument(level = "info", skip(frames, options), fields(frames = frames.len()))]
pub fn quantize(
    frames: &[TightFrame],
    options: &QuantizeOptions,
) -> LoopshotResult<(Palette, Vec<IndexedFrame>)> {
    if frames.is_empty() {
        return Err(LoopshotError::validation(
            "quantize requires at least one frame",
        ));
    }
    if options.max_colors == 0 || options.max_colors > 256 {
        return Err(LoopshotError::validation(format!(
            "max_colors must be in 1..=256, got {}",
            options.max_colors
        )));
    }

    let histogram = build_histogram(frames);
    debug!(distinct_colors = histogram.len(), "histogram built");

    let colors = if histogram.is_empty() {
        // Every pixel transparent: a single black entry keeps index 0 valid.
        vec![[0, 0, 0]]
    } else {
        match options.kind {
            QuantizerKind::MedianCut => median_cut::build_palette(&histogram, options.max_colors),
            QuantizerKind::Octree => octree::build_palette(&histogram, options.max_colors),
        }
    };
    let palette = Palette::from_colors(colors)?;

    info!(
        kind = ?options.kind,
        palette_size = palette.len(),
        dither = options.dither,
        "palette built"
    );

    let indexed: Vec<IndexedFrame> = frames
        .par_iter()
        .map(|frame| {
            if options.dither {
                dither::dither_frame(frame, &palette)
            } else {
                map_frame(frame, &palette)
            }
        })
        .collect();

    Ok((palette, indexed))
}

/// Histogram of opaque pixel colors across the whole batch, keyed by packed
/// 0xRRGGBB. BTreeMap so iteration order (and therefore palette order) is
/// independent of hash state.
fn build_histogram(frames: &[TightFrame]) -> Vec<([u8; 3], u64)> {
    let mut map: BTreeMap<u32, u64> = BTreeMap::new();
    for frame in frames {
        for px in frame.data().chunks_exact(4) {
            if px[3] == 0 {
                continue;
            }
            let key = (px[0] as u32) << 16 | (px[1] as u32) << 8 | px[2] as u32;
            *map.entry(key).or_insert(0) += 1;
        }
    }
    map.into_iter()
        .map(|(key, n)| {
            (
                [(key >> 16) as u8, (key >> 8) as u8, key as u8],
                n,
            )
        })
        .collect()
}

fn map_frame(frame: &TightFrame, palette: &Palette) -> IndexedFrame {
    let mut cache: HashMap<u32, u8> = HashMap::new();
    let mut indices = Vec::with_capacity(frame.data().len() / 4);
    for px in frame.data().chunks_exact(4) {
        if px[3] == 0 {
            indices.push(0);
            continue;
        }
        let key = (px[0] as u32) << 16 | (px[1] as u32) << 8 | px[2] as u32;
        let idx = *cache
            .entry(key)
            .or_insert_with(|| palette.nearest([px[0], px[1], px[2]]));
        indices.push(idx);
    }
    IndexedFrame {
        width: frame.width(),
        height: frame.height(),
        indices,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid(width: u32, height: u32, rgba: [u8; 4]) -> TightFrame {
        TightFrame::from_rgba(width, height, rgba.repeat((width * height) as usize)).unwrap()
    }

    fn four_color_frame() -> TightFrame {
        let mut data = Vec::new();
        for color in [[255u8, 0, 0], [0, 255, 0], [0, 0, 255], [255, 255, 0]] {
            for _ in 0..4 {
                data.extend_from_slice(&[color[0], color[1], color[2], 255]);
            }
        }
        TightFrame::from_rgba(4, 4, data).unwrap()
    }

    #[test]
    fn palette_never_exceeds_max_colors() {
        for kind in [QuantizerKind::MedianCut, QuantizerKind::Octree] {
            let frames = vec![four_color_frame()];
            let opts = QuantizeOptions {
                max_colors: 2,
                dither: false,
                kind,
            };
            let (palette, indexed) = quantize(&frames, &opts).unwrap();
            assert!(palette.len() <= 2, "{kind:?}");
            for f in &indexed {
                assert!(f.indices().iter().all(|&i| (i as usize) < palette.len()));
            }
        }
    }

    #[test]
    fn distinct_colors_below_max_are_preserved_exactly() {
        for kind in [QuantizerKind::MedianCut, QuantizerKind::Octree] {
            let frames = vec![four_color_frame()];
            let opts = QuantizeOptions {
                max_colors: 16,
                dither: false,
                kind,
            };
            let (palette, indexed) = quantize(&frames, &opts).unwrap();
            assert_eq!(palette.len(), 4, "{kind:?}");
            // Every source color must round-trip through its index unchanged.
            let frame = &frames[0];
            for (px, &idx) in frame.data().chunks_exact(4).zip(indexed[0].indices()) {
                assert_eq!(palette.colors()[idx as usize], [px[0], px[1], px[2]]);
            }
        }
    }

    #[test]
    fn quantization_is_stable_across_runs() {
        let frames = vec![four_color_frame(), solid(4, 4, [13, 77, 200, 255])];
        for kind in [QuantizerKind::MedianCut, QuantizerKind::Octree] {
            let opts = QuantizeOptions {
                max_colors: 3,
                dither: false,
                kind,
            };
            let (p1, i1) = quantize(&frames, &opts).unwrap();
            let (p2, i2) = quantize(&frames, &opts).unwrap();
            assert_eq!(p1, p2, "{kind:?}");
            assert_eq!(i1, i2, "{kind:?}");
        }
    }

    #[test]
    fn transparent_pixels_map_to_index_zero_and_skip_histogram() {
        let mut data = Vec::new();
        // Two opaque whites, two fully transparent magentas.
        data.extend_from_slice(&[255, 255, 255, 255]);
        data.extend_from_slice(&[255, 255, 255, 255]);
        data.extend_from_slice(&[255, 0, 255, 0]);
        data.extend_from_slice(&[255, 0, 255, 0]);
        let frames = vec![TightFrame::from_rgba(2, 2, data).unwrap()];
        let opts = QuantizeOptions {
            max_colors: 8,
            dither: false,
            kind: QuantizerKind::MedianCut,
        };
        let (palette, indexed) = quantize(&frames, &opts).unwrap();
        // Magenta never entered the histogram.
        assert!(palette.colors().iter().all(|&c| c != [255, 0, 255]));
        assert_eq!(indexed[0].indices()[2], 0);
        assert_eq!(indexed[0].indices()[3], 0);
    }

    #[test]
    fn all_transparent_batch_yields_sentinel_palette() {
        let frames = vec![solid(2, 2, [9, 9, 9, 0])];
        let (palette, indexed) =
            quantize(&frames, &QuantizeOptions::default()).unwrap();
        assert_eq!(palette.colors(), &[[0, 0, 0]]);
        assert!(indexed[0].indices().iter().all(|&i| i == 0));
    }

    #[test]
    fn palette_is_global_across_the_batch() {
        // Frame A is pure red, frame B pure blue; with room for both, each
        // frame indexes into the one shared palette.
        let frames = vec![solid(2, 2, [255, 0, 0, 255]), solid(2, 2, [0, 0, 255, 255])];
        let opts = QuantizeOptions {
            max_colors: 4,
            dither: false,
            kind: QuantizerKind::Octree,
        };
        let (palette, indexed) = quantize(&frames, &opts).unwrap();
        assert_eq!(palette.len(), 2);
        let a = indexed[0].indices()[0];
        let b = indexed[1].indices()[0];
        assert_ne!(a, b);
        assert_eq!(palette.colors()[a as usize], [255, 0, 0]);
        assert_eq!(palette.colors()[b as usize], [0, 0, 255]);
    }

    #[test]
    fn nearest_tie_breaks_to_first_index() {
        let palette = Palette::from_colors(vec![[0, 0, 0], [0, 0, 2]]).unwrap();
        // [0,0,1] is equidistant from both entries.
        assert_eq!(palette.nearest([0, 0, 1]), 0);
    }

    #[test]
    fn zero_max_colors_is_rejected() {
        let frames = vec![solid(1, 1, [1, 2, 3, 255])];
        let opts = QuantizeOptions {
            max_colors: 0,
            dither: false,
            kind: QuantizerKind::MedianCut,
        };
        assert!(matches!(
            quantize(&frames, &opts).unwrap_err(),
            LoopshotError::Validation(_)
        ));
    }
}
