//! The versioned binary frame container (`.lscf`).
//!
//! One file archives one captured frame, losslessly, with an integrity
//! checksum over the pixel payload. Layout (all integers little-endian):
//!
//! ```text
//! magic        [u8;4]  "LSCF"
//! version      u16     0x0200
//! frame_index  u32
//! timestamp_ms u64
//! checksum     u32     crc32 (IEEE) of the pixel payload only
//! width        u16
//! height       u16
//! stride       u32     always width*4 (payload is tightly packed)
//! pixel_format u32     0x01 = RGBA8888
//! payload_len  u32     width*height*4
//! payload      [u8]
//! meta_len     u32     0 when no metadata block follows
//! metadata     [u8]    JSON-encoded CaptureMetadata
//! ```
//!
//! The checksum covers the payload and nothing else, so the metadata block can
//! be rewritten without re-hashing pixels. This module does no I/O; callers
//! own file placement.

use serde::{Deserialize, Serialize};

use crate::{
    error::{LoopshotError, LoopshotResult},
    frame::{BYTES_PER_PIXEL, TightFrame},
};

pub const CONTAINER_MAGIC: [u8; 4] = *b"LSCF";
pub const CONTAINER_VERSION: u16 = 0x0200;
pub const PIXEL_FORMAT_RGBA8888: u32 = 0x01;

/// Fixed header size up to and including `payload_len`.
const HEADER_LEN: usize = 38;

/// Capture metadata recorded by the camera stack. Opaque pass-through for this
/// pipeline: archived and returned verbatim, never computed here.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CaptureMetadata {
    pub exposure_time_ns: u64,
    pub iso_sensitivity: u32,
    pub focal_length_mm: f32,
    pub color_temperature_k: u32,
}

/// A frame decoded back out of its container, with everything the container
/// carried alongside the pixels.
#[derive(Clone, Debug, PartialEq)]
pub struct ArchivedFrame {
    pub frame: TightFrame,
    pub frame_index: u32,
    pub timestamp_ms: u64,
    pub metadata: Option<CaptureMetadata>,
}

/// Serialize a tight frame into container bytes.
pub fn encode_frame(
    frame: &TightFrame,
    frame_index: u32,
    timestamp_ms: u64,
    metadata: Option<&CaptureMetadata>,
) -> LoopshotResult<Vec<u8>> {
    if frame.width() > u16::MAX as u32 || frame.height() > u16::MAX as u32 {
        return Err(LoopshotError::validation(
            "container dimensions must fit in u16",
        ));
    }

    let payload = frame.data();
    let checksum = crc32fast::hash(payload);
    let stride = frame.width() * BYTES_PER_PIXEL as u32;

    let meta_json = match metadata {
        Some(m) => serde_json::to_vec(m)
            .map_err(|e| LoopshotError::validation(format!("metadata serialization: {e}")))?,
        None => Vec::new(),
    };

    let mut out = Vec::with_capacity(HEADER_LEN + payload.len() + 4 + meta_json.len());
    out.extend_from_slice(&CONTAINER_MAGIC);
    out.extend_from_slice(&CONTAINER_VERSION.to_le_bytes());
    out.extend_from_slice(&frame_index.to_le_bytes());
    out.extend_from_slice(&timestamp_ms.to_le_bytes());
    out.extend_from_slice(&checksum.to_le_bytes());
    out.extend_from_slice(&(frame.width() as u16).to_le_bytes());
    out.extend_from_slice(&(frame.height() as u16).to_le_bytes());
    out.extend_from_slice(&stride.to_le_bytes());
    out.extend_from_slice(&PIXEL_FORMAT_RGBA8888.to_le_bytes());
    out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    out.extend_from_slice(payload);
    out.extend_from_slice(&(meta_json.len() as u32).to_le_bytes());
    out.extend_from_slice(&meta_json);
    Ok(out)
}

/// Parse and validate container bytes.
///
/// Validation order: magic, version (hard [`LoopshotError::FormatVersion`]
/// before anything else is trusted), header sanity, then the payload checksum
/// ([`LoopshotError::Integrity`] on mismatch). A frame whose checksum does not
/// validate is never returned.
pub fn decode_frame(bytes: &[u8]) -> LoopshotResult<ArchivedFrame> {
    if bytes.len() < HEADER_LEN {
        return Err(LoopshotError::validation(format!(
            "container truncated: {} bytes, header needs {HEADER_LEN}",
            bytes.len()
        )));
    }
    if bytes[0..4] != CONTAINER_MAGIC {
        return Err(LoopshotError::validation("container magic mismatch"));
    }

    let version = read_u16(bytes, 4);
    if version != CONTAINER_VERSION {
        return Err(LoopshotError::FormatVersion {
            found: version,
            expected: CONTAINER_VERSION,
        });
    }

    let frame_index = read_u32(bytes, 6);
    let timestamp_ms = read_u64(bytes, 10);
    let checksum = read_u32(bytes, 18);
    let width = read_u16(bytes, 22) as u32;
    let height = read_u16(bytes, 24) as u32;
    let stride = read_u32(bytes, 26);
    let pixel_format = read_u32(bytes, 30);
    let payload_len = read_u32(bytes, 34) as usize;

    if pixel_format != PIXEL_FORMAT_RGBA8888 {
        return Err(LoopshotError::validation(format!(
            "unsupported pixel format tag {pixel_format:#x}"
        )));
    }
    if stride != width * BYTES_PER_PIXEL as u32 {
        return Err(LoopshotError::validation(format!(
            "container stride {stride} is not tight for width {width}"
        )));
    }
    if payload_len != width as usize * height as usize * BYTES_PER_PIXEL {
        return Err(LoopshotError::size_mismatch(format!(
            "container payload length {payload_len} disagrees with {width}x{height} RGBA"
        )));
    }
    if bytes.len() < HEADER_LEN + payload_len + 4 {
        return Err(LoopshotError::validation(
            "container truncated inside payload",
        ));
    }

    let payload = &bytes[HEADER_LEN..HEADER_LEN + payload_len];
    let actual = crc32fast::hash(payload);
    if actual != checksum {
        return Err(LoopshotError::Integrity {
            expected: checksum,
            actual,
        });
    }

    let meta_off = HEADER_LEN + payload_len;
    let meta_len = read_u32(bytes, meta_off) as usize;
    let metadata = if meta_len == 0 {
        None
    } else {
        if bytes.len() < meta_off + 4 + meta_len {
            return Err(LoopshotError::validation(
                "container truncated inside metadata block",
            ));
        }
        let meta: CaptureMetadata = serde_json::from_slice(&bytes[meta_off + 4..meta_off + 4 + meta_len])
            .map_err(|e| LoopshotError::validation(format!("metadata parse: {e}")))?;
        Some(meta)
    };

    Ok(ArchivedFrame {
        frame: TightFrame::from_rgba(width, height, payload.to_vec())?,
        frame_index,
        timestamp_ms,
        metadata,
    })
}

/// Replace the metadata block of an existing container without touching the
/// pixel payload or its checksum.
pub fn patch_metadata(
    container: &[u8],
    metadata: Option<&CaptureMetadata>,
) -> LoopshotResult<Vec<u8>> {
    // Reuse the decode path for full validation before patching.
    let decoded = decode_frame(container)?;
    let payload_len = decoded.frame.data().len();
    let mut out = container[..HEADER_LEN + payload_len].to_vec();

    let meta_json = match metadata {
        Some(m) => serde_json::to_vec(m)
            .map_err(|e| LoopshotError::validation(format!("metadata serialization: {e}")))?,
        None => Vec::new(),
    };
    out.extend_from_slice(&(meta_json.len() as u32).to_le_bytes());
    out.extend_from_slice(&meta_json);
    Ok(out)
}

/// Byte offset of the pixel payload within a container. Exposed for tests that
/// need to corrupt payload bits deliberately.
pub fn payload_offset() -> usize {
    HEADER_LEN
}

fn read_u16(b: &[u8], off: usize) -> u16 {
    u16::from_le_bytes([b[off], b[off + 1]])
}

fn read_u32(b: &[u8], off: usize) -> u32 {
    u32::from_le_bytes([b[off], b[off + 1], b[off + 2], b[off + 3]])
}

fn read_u64(b: &[u8], off: usize) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&b[off..off + 8]);
    u64::from_le_bytes(buf)
}
