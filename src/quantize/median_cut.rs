//! Median-cut palette construction.
//!
//! Works on distinct colors only; the histogram counts are intentionally not
//! used. Splitting sorts the box along its widest channel with the packed RGB
//! value as a total-order tiebreak, so the partition (and the palette) is the
//! same on every run.

struct ColorBox {
    colors: Vec<[u8; 3]>,
    min: [u8; 3],
    max: [u8; 3],
}

impl ColorBox {
    fn new(colors: Vec<[u8; 3]>) -> Self {
        let mut min = [u8::MAX; 3];
        let mut max = [u8::MIN; 3];
        for c in &colors {
            for ch in 0..3 {
                min[ch] = min[ch].min(c[ch]);
                max[ch] = max[ch].max(c[ch]);
            }
        }
        Self { colors, min, max }
    }

    fn volume(&self) -> u64 {
        (0..3)
            .map(|ch| (self.max[ch] - self.min[ch]) as u64)
            .product()
    }

    fn splittable(&self) -> bool {
        self.colors.len() > 1
    }

    fn longest_axis(&self) -> usize {
        let mut axis = 0;
        let mut span = self.max[0] - self.min[0];
        for ch in 1..3 {
            let s = self.max[ch] - self.min[ch];
            if s > span {
                span = s;
                axis = ch;
            }
        }
        axis
    }

    /// Split at the median distinct color along the longest axis. Both halves
    /// are non-empty for any splittable box.
    fn split(mut self) -> (Self, Self) {
        let axis = self.longest_axis();
        self.colors.sort_unstable_by_key(|c| {
            (
                c[axis],
                (c[0] as u32) << 16 | (c[1] as u32) << 8 | c[2] as u32,
            )
        });
        let upper = self.colors.split_off(self.colors.len() / 2);
        (Self::new(self.colors), Self::new(upper))
    }

    /// Unweighted arithmetic mean of the member colors, rounded.
    fn mean(&self) -> [u8; 3] {
        let n = self.colors.len() as u64;
        let mut sums = [0u64; 3];
        for c in &self.colors {
            for ch in 0..3 {
                sums[ch] += c[ch] as u64;
            }
        }
        [
            ((sums[0] + n / 2) / n) as u8,
            ((sums[1] + n / 2) / n) as u8,
            ((sums[2] + n / 2) / n) as u8,
        ]
    }
}

pub(crate) fn build_palette(histogram: &[([u8; 3], u64)], max_colors: usize) -> Vec<[u8; 3]> {
    let colors: Vec<[u8; 3]> = histogram.iter().map(|&(c, _)| c).collect();
    let mut boxes = vec![ColorBox::new(colors)];

    while boxes.len() < max_colors {
        // Largest-volume splittable box; first wins on equal volume.
        let mut candidate: Option<(usize, u64)> = None;
        for (i, b) in boxes.iter().enumerate() {
            if !b.splittable() {
                continue;
            }
            let v = b.volume();
            match candidate {
                Some((_, best)) if v <= best => {}
                _ => candidate = Some((i, v)),
            }
        }
        let Some((i, _)) = candidate else {
            break;
        };
        let (lo, hi) = boxes.swap_remove(i).split();
        boxes.push(lo);
        boxes.push(hi);
    }

    boxes.iter().map(ColorBox::mean).collect()
}
