use crate::error::{LoopshotError, LoopshotResult};

/// Bytes per pixel for the one pixel format this pipeline handles (RGBA8888).
pub const BYTES_PER_PIXEL: usize = 4;

/// A raw frame as handed over by the capture subsystem.
///
/// `stride` is the row length in bytes including any padding the sensor or
/// graphics stack appended, so it may exceed `width * 4`. The buffer must hold
/// at least `stride * height` bytes.
#[derive(Clone, Debug)]
pub struct RawFrame {
    pub width: u32,
    pub height: u32,
    pub stride: u32,
    pub timestamp_ms: u64,
    pub data: Vec<u8>,
}

impl RawFrame {
    pub fn new(
        width: u32,
        height: u32,
        stride: u32,
        timestamp_ms: u64,
        data: Vec<u8>,
    ) -> LoopshotResult<Self> {
        if width == 0 || height == 0 {
            return Err(LoopshotError::validation(
                "raw frame width/height must be non-zero",
            ));
        }
        if (stride as usize) < width as usize * BYTES_PER_PIXEL {
            return Err(LoopshotError::validation(format!(
                "raw frame stride {} is smaller than width*4 ({})",
                stride,
                width as usize * BYTES_PER_PIXEL
            )));
        }
        if data.len() < stride as usize * height as usize {
            return Err(LoopshotError::size_mismatch(format!(
                "raw frame buffer holds {} bytes, need at least stride*height = {}",
                data.len(),
                stride as usize * height as usize
            )));
        }
        Ok(Self {
            width,
            height,
            stride,
            timestamp_ms,
            data,
        })
    }
}

/// A tightly packed RGBA8 frame: exactly `width * height * 4` bytes, rows
/// contiguous, no padding. This is the only pixel layout the downscaler,
/// quantizer, and codec stages accept.
///
/// Fields are private so the length invariant cannot be broken after
/// construction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TightFrame {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl TightFrame {
    /// Wrap an already tightly packed buffer.
    pub fn from_rgba(width: u32, height: u32, data: Vec<u8>) -> LoopshotResult<Self> {
        if width == 0 || height == 0 {
            return Err(LoopshotError::validation(
                "tight frame width/height must be non-zero",
            ));
        }
        let expected = width as usize * height as usize * BYTES_PER_PIXEL;
        if data.len() != expected {
            return Err(LoopshotError::size_mismatch(format!(
                "tight frame buffer holds {} bytes, expected width*height*4 = {}",
                data.len(),
                expected
            )));
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// Stride-correcting copy out of a raw capture buffer.
    ///
    /// Copies `width * 4` bytes per row, skipping whatever padding the stride
    /// carries. The result owns its pixels independently of the raw frame.
    pub fn from_raw(raw: &RawFrame) -> LoopshotResult<Self> {
        let row_bytes = raw.width as usize * BYTES_PER_PIXEL;
        let stride = raw.stride as usize;

        if stride == row_bytes {
            let len = row_bytes * raw.height as usize;
            return Self::from_rgba(raw.width, raw.height, raw.data[..len].to_vec());
        }

        let mut data = Vec::with_capacity(row_bytes * raw.height as usize);
        for row in 0..raw.height as usize {
            let start = row * stride;
            data.extend_from_slice(&raw.data[start..start + row_bytes]);
        }
        Self::from_rgba(raw.width, raw.height, data)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    /// RGBA bytes of the pixel at (x, y). Callers must stay in bounds.
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let idx = (y as usize * self.width as usize + x as usize) * BYTES_PER_PIXEL;
        [
            self.data[idx],
            self.data[idx + 1],
            self.data[idx + 2],
            self.data[idx + 3],
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient_raw(width: u32, height: u32, pad: u32) -> RawFrame {
        let stride = width * 4 + pad;
        let mut data = vec![0u8; (stride * height) as usize];
        for y in 0..height {
            for x in 0..width {
                let off = (y * stride + x * 4) as usize;
                data[off] = x as u8;
                data[off + 1] = y as u8;
                data[off + 2] = 7;
                data[off + 3] = 255;
            }
        }
        RawFrame::new(width, height, stride, 0, data).unwrap()
    }

    #[test]
    fn from_raw_strips_row_padding() {
        let raw = gradient_raw(5, 3, 12);
        let tight = TightFrame::from_raw(&raw).unwrap();
        assert_eq!(tight.data().len(), 5 * 3 * 4);
        assert_eq!(tight.pixel(4, 2), [4, 2, 7, 255]);
    }

    #[test]
    fn from_raw_without_padding_is_a_plain_copy() {
        let raw = gradient_raw(4, 4, 0);
        let tight = TightFrame::from_raw(&raw).unwrap();
        assert_eq!(tight.data(), &raw.data[..]);
    }

    #[test]
    fn short_raw_buffer_is_rejected() {
        let err = RawFrame::new(4, 4, 16, 0, vec![0u8; 16 * 3]).unwrap_err();
        assert!(matches!(err, LoopshotError::SizeMismatch(_)));
    }

    #[test]
    fn undersized_stride_is_rejected() {
        let err = RawFrame::new(4, 4, 8, 0, vec![0u8; 64]).unwrap_err();
        assert!(matches!(err, LoopshotError::Validation(_)));
    }

    #[test]
    fn tight_frame_rejects_wrong_length() {
        let err = TightFrame::from_rgba(2, 2, vec![0u8; 15]).unwrap_err();
        assert!(matches!(err, LoopshotError::SizeMismatch(_)));
    }
}
