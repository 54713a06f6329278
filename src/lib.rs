#![forbid(unsafe_code)]

pub mod config;
pub mod container;
pub mod downscale;
pub mod error;
pub mod frame;
pub mod gif89a;
pub mod pipeline;
pub mod quantize;

pub use config::PipelineConfig;
pub use container::{ArchivedFrame, CaptureMetadata, decode_frame, encode_frame, patch_metadata};
pub use downscale::{ScaleFilter, downscale};
pub use error::{LoopshotError, LoopshotResult};
pub use frame::{RawFrame, TightFrame};
pub use gif89a::EncodeOptions;
pub use pipeline::{Pipeline, PipelineOutput, PipelineReport, PipelineStage, Progress};
pub use quantize::{IndexedFrame, Palette, QuantizeOptions, QuantizerKind, quantize};
