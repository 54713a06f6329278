//! The capture-to-GIF orchestrator.
//!
//! Runs the fixed stage sequence: archive every raw frame into its container
//! (decoding it straight back so corrupt pixels are caught before any work is
//! spent on them), downscale, build the global palette, assemble the GIF.
//! Per-frame stages fan out over the rayon pool; frame order is preserved by
//! collecting in input order. The first error aborts the run and parks the
//! pipeline in [`PipelineStage::Failed`].

use std::{
    path::{Path, PathBuf},
    sync::atomic::{AtomicUsize, Ordering},
    time::{Duration, Instant},
};

use anyhow::Context;
use rayon::prelude::*;
use tracing::{info, info_span};

use crate::{
    config::PipelineConfig,
    container::{CaptureMetadata, decode_frame, encode_frame},
    downscale::downscale,
    error::{LoopshotError, LoopshotResult},
    frame::{RawFrame, TightFrame},
    gif89a::{self, EncodeOptions},
    quantize::{QuantizeOptions, quantize},
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PipelineStage {
    Idle,
    Capturing,
    Downscaling,
    Quantizing,
    Encoding,
    Complete,
    Failed(String),
}

/// Snapshot handed to the progress callback. `completed` counts frames for
/// the per-frame stages and is zero at the start of whole-batch stages.
#[derive(Clone, Debug)]
pub struct Progress {
    pub stage: PipelineStage,
    pub completed: usize,
    pub total: usize,
}

pub type ProgressFn = Box<dyn Fn(Progress) + Send + Sync>;

/// Timings and output statistics for one completed run.
#[derive(Clone, Debug)]
pub struct PipelineReport {
    pub frame_count: usize,
    pub capture: Duration,
    pub downscale: Duration,
    pub quantize: Duration,
    pub encode: Duration,
    pub palette_size: usize,
    pub gif_bytes: usize,
    /// Uncompressed RGB bytes of the output frames divided by GIF size.
    pub compression_ratio: f64,
}

#[derive(Debug)]
pub struct PipelineOutput {
    pub gif: Vec<u8>,
    pub report: PipelineReport,
}

pub struct Pipeline {
    config: PipelineConfig,
    stage: PipelineStage,
    archive_dir: Option<PathBuf>,
    progress: Option<ProgressFn>,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> LoopshotResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            stage: PipelineStage::Idle,
            archive_dir: None,
            progress: None,
        })
    }

    /// Persist every frame container under `dir` during the capture stage.
    pub fn with_archive_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.archive_dir = Some(dir.into());
        self
    }

    pub fn with_progress(mut self, callback: ProgressFn) -> Self {
        self.progress = Some(callback);
        self
    }

    pub fn stage(&self) -> &PipelineStage {
        &self.stage
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run the whole pipeline over one batch of raw frames.
    ///
    /// The batch must hold exactly `config.frame_count` frames; that is
    /// checked before any other work, so an empty or short batch costs
    /// nothing. On error the pipeline ends in `Failed` and the error is
    /// returned; a fresh `run` may be attempted afterwards.
    pub fn run(
        &mut self,
        frames: &[RawFrame],
        metadata: Option<&CaptureMetadata>,
    ) -> LoopshotResult<PipelineOutput> {
        match self.run_stages(frames, metadata) {
            Ok(output) => {
                self.stage = PipelineStage::Complete;
                Ok(output)
            }
            Err(err) => {
                self.stage = PipelineStage::Failed(err.to_string());
                Err(err)
            }
        }
    }

    fn run_stages(
        &mut self,
        frames: &[RawFrame],
        metadata: Option<&CaptureMetadata>,
    ) -> LoopshotResult<PipelineOutput> {
        let span = info_span!("pipeline", frames = frames.len());
        let _guard = span.enter();

        if frames.len() != self.config.frame_count {
            return Err(LoopshotError::BatchCount {
                expected: self.config.frame_count,
                actual: frames.len(),
            });
        }
        let total = frames.len();

        self.stage = PipelineStage::Capturing;
        self.emit(PipelineStage::Capturing, 0, total);
        let start = Instant::now();
        let captured = self.capture_stage(frames, metadata)?;
        let capture_time = start.elapsed();
        info!(stage = "capture", elapsed_ms = capture_time.as_millis() as u64, "stage done");

        self.stage = PipelineStage::Downscaling;
        self.emit(PipelineStage::Downscaling, 0, total);
        let start = Instant::now();
        let counter = AtomicUsize::new(0);
        let small: Vec<TightFrame> = captured
            .par_iter()
            .map(|frame| {
                let out = downscale(
                    frame,
                    self.config.target_width,
                    self.config.target_height,
                    self.config.filter,
                )?;
                let done = counter.fetch_add(1, Ordering::Relaxed) + 1;
                self.emit(PipelineStage::Downscaling, done, total);
                Ok(out)
            })
            .collect::<LoopshotResult<_>>()?;
        let downscale_time = start.elapsed();
        info!(stage = "downscale", elapsed_ms = downscale_time.as_millis() as u64, "stage done");

        self.stage = PipelineStage::Quantizing;
        self.emit(PipelineStage::Quantizing, 0, total);
        let start = Instant::now();
        let options = QuantizeOptions {
            max_colors: self.config.max_colors,
            dither: self.config.dither,
            kind: self.config.quantizer,
        };
        let (palette, indexed) = quantize(&small, &options)?;
        let quantize_time = start.elapsed();
        info!(
            stage = "quantize",
            palette_size = palette.len(),
            elapsed_ms = quantize_time.as_millis() as u64,
            "stage done"
        );

        self.stage = PipelineStage::Encoding;
        self.emit(PipelineStage::Encoding, 0, total);
        let start = Instant::now();
        let gif = gif89a::encode(
            &palette,
            &indexed,
            &EncodeOptions {
                delay_cs: self.config.delay_cs,
                loop_forever: self.config.loop_forever,
            },
        )?;
        let encode_time = start.elapsed();

        let raw_rgb = total as f64
            * self.config.target_width as f64
            * self.config.target_height as f64
            * 3.0;
        let report = PipelineReport {
            frame_count: total,
            capture: capture_time,
            downscale: downscale_time,
            quantize: quantize_time,
            encode: encode_time,
            palette_size: palette.len(),
            gif_bytes: gif.len(),
            compression_ratio: raw_rgb / gif.len() as f64,
        };
        info!(
            gif_bytes = report.gif_bytes,
            compression_ratio = report.compression_ratio,
            "pipeline complete"
        );

        Ok(PipelineOutput { gif, report })
    }

    /// Archive each raw frame and hand back the frames as decoded from their
    /// own containers, so anything the archive would lose never reaches the
    /// later stages.
    fn capture_stage(
        &self,
        frames: &[RawFrame],
        metadata: Option<&CaptureMetadata>,
    ) -> LoopshotResult<Vec<TightFrame>> {
        if let Some(dir) = &self.archive_dir {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("create archive dir {}", dir.display()))?;
        }

        let total = frames.len();
        let counter = AtomicUsize::new(0);
        frames
            .par_iter()
            .enumerate()
            .map(|(index, raw)| {
                let tight = TightFrame::from_raw(raw)?;
                let container = encode_frame(&tight, index as u32, raw.timestamp_ms, metadata)?;
                let decoded = decode_frame(&container)?;
                if let Some(dir) = &self.archive_dir {
                    persist_container(dir, index, &container)?;
                }
                let done = counter.fetch_add(1, Ordering::Relaxed) + 1;
                self.emit(PipelineStage::Capturing, done, total);
                Ok(decoded.frame)
            })
            .collect()
    }

    fn emit(&self, stage: PipelineStage, completed: usize, total: usize) {
        if let Some(callback) = &self.progress {
            callback(Progress {
                stage,
                completed,
                total,
            });
        }
    }
}

/// Write one container file atomically: temp file in the same directory, then
/// rename over the final name.
fn persist_container(dir: &Path, index: usize, bytes: &[u8]) -> LoopshotResult<()> {
    let final_path = dir.join(format!("frame_{index:04}.lscf"));
    let tmp_path = dir.join(format!(".frame_{index:04}.lscf.tmp"));
    std::fs::write(&tmp_path, bytes)
        .with_context(|| format!("write {}", tmp_path.display()))?;
    std::fs::rename(&tmp_path, &final_path)
        .with_context(|| format!("rename into {}", final_path.display()))?;
    Ok(())
}
