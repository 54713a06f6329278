use std::path::{Path, PathBuf};

use anyhow::{Context as _, bail};
use clap::{Parser, Subcommand};
use tracing::info;

use loopshot::{
    CaptureMetadata, Pipeline, PipelineConfig, Progress, QuantizerKind, RawFrame, ScaleFilter,
    TightFrame, decode_frame, encode_frame,
};

#[derive(Parser, Debug)]
#[command(name = "loopshot", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Archive a PNG frame sequence as .lscf containers.
    Pack(PackArgs),
    /// Validate every container in an archive directory.
    Verify(VerifyArgs),
    /// Run the full pipeline and write an animated GIF.
    Encode(EncodeArgs),
}

#[derive(Parser, Debug)]
struct PackArgs {
    /// Directory of input PNGs, consumed in filename order.
    #[arg(long = "in")]
    in_dir: PathBuf,

    /// Output archive directory.
    #[arg(long)]
    out: PathBuf,

    /// Optional capture metadata JSON to embed in every container.
    #[arg(long)]
    metadata: Option<PathBuf>,
}

#[derive(Parser, Debug)]
struct VerifyArgs {
    /// Archive directory of .lscf containers.
    #[arg(long = "in")]
    in_dir: PathBuf,
}

#[derive(Parser, Debug)]
struct EncodeArgs {
    /// Directory of input PNGs or .lscf containers, consumed in filename order.
    #[arg(long = "in")]
    in_dir: PathBuf,

    /// Output GIF path.
    #[arg(long)]
    out: PathBuf,

    /// Pipeline configuration JSON. Defaults match the standard capture
    /// profile except frame-count, which follows the input when no file is
    /// given.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Also archive every frame container under this directory.
    #[arg(long)]
    archive: Option<PathBuf>,

    /// Override the configured target width.
    #[arg(long)]
    width: Option<u32>,

    /// Override the configured target height.
    #[arg(long)]
    height: Option<u32>,

    /// Override the configured palette size (1..=256).
    #[arg(long)]
    max_colors: Option<usize>,

    /// Enable Floyd-Steinberg dithering.
    #[arg(long)]
    dither: bool,

    /// Override the palette strategy.
    #[arg(long, value_parser = parse_quantizer)]
    quantizer: Option<QuantizerKind>,

    /// Override the scale filter.
    #[arg(long, value_parser = parse_filter)]
    filter: Option<ScaleFilter>,

    /// Override the per-frame delay in centiseconds.
    #[arg(long)]
    delay_cs: Option<u16>,

    /// Play the animation once instead of looping forever.
    #[arg(long)]
    no_loop: bool,
}

fn parse_quantizer(s: &str) -> Result<QuantizerKind, String> {
    match s {
        "median-cut" => Ok(QuantizerKind::MedianCut),
        "octree" => Ok(QuantizerKind::Octree),
        other => Err(format!("unknown quantizer '{other}' (median-cut, octree)")),
    }
}

fn parse_filter(s: &str) -> Result<ScaleFilter, String> {
    match s {
        "bilinear" => Ok(ScaleFilter::Bilinear),
        "lanczos3" => Ok(ScaleFilter::Lanczos3),
        other => Err(format!("unknown filter '{other}' (bilinear, lanczos3)")),
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();
    match cli.cmd {
        Command::Pack(args) => cmd_pack(args),
        Command::Verify(args) => cmd_verify(args),
        Command::Encode(args) => cmd_encode(args),
    }
}

/// Paths under `dir` with the given extension, sorted by filename.
fn sorted_inputs(dir: &Path, ext: &str) -> anyhow::Result<Vec<PathBuf>> {
    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)
        .with_context(|| format!("read input dir '{}'", dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.extension().is_some_and(|e| e.eq_ignore_ascii_case(ext)))
        .collect();
    paths.sort();
    Ok(paths)
}

fn load_png_frames(dir: &Path) -> anyhow::Result<Vec<RawFrame>> {
    let paths = sorted_inputs(dir, "png")?;
    if paths.is_empty() {
        bail!("no .png files in '{}'", dir.display());
    }
    let mut frames = Vec::with_capacity(paths.len());
    for (index, path) in paths.iter().enumerate() {
        let img = image::open(path)
            .with_context(|| format!("decode '{}'", path.display()))?
            .to_rgba8();
        let (width, height) = img.dimensions();
        frames.push(RawFrame::new(
            width,
            height,
            width * 4,
            index as u64 * 40,
            img.into_raw(),
        )?);
    }
    Ok(frames)
}

fn load_archived_frames(dir: &Path) -> anyhow::Result<Vec<RawFrame>> {
    let paths = sorted_inputs(dir, "lscf")?;
    let mut frames = Vec::with_capacity(paths.len());
    for path in &paths {
        let bytes =
            std::fs::read(path).with_context(|| format!("read '{}'", path.display()))?;
        let archived =
            decode_frame(&bytes).with_context(|| format!("decode '{}'", path.display()))?;
        let timestamp_ms = archived.timestamp_ms;
        let frame = archived.frame;
        frames.push(RawFrame::new(
            frame.width(),
            frame.height(),
            frame.width() * 4,
            timestamp_ms,
            frame.into_data(),
        )?);
    }
    Ok(frames)
}

fn cmd_pack(args: PackArgs) -> anyhow::Result<()> {
    let metadata: Option<CaptureMetadata> = match &args.metadata {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("read metadata '{}'", path.display()))?;
            Some(serde_json::from_str(&text).context("parse capture metadata JSON")?)
        }
        None => None,
    };

    let frames = load_png_frames(&args.in_dir)?;
    std::fs::create_dir_all(&args.out)
        .with_context(|| format!("create '{}'", args.out.display()))?;

    for (index, raw) in frames.iter().enumerate() {
        let tight = TightFrame::from_raw(raw)?;
        let container = encode_frame(&tight, index as u32, raw.timestamp_ms, metadata.as_ref())?;
        let path = args.out.join(format!("frame_{index:04}.lscf"));
        std::fs::write(&path, &container)
            .with_context(|| format!("write '{}'", path.display()))?;
    }
    info!(frames = frames.len(), out = %args.out.display(), "packed");
    Ok(())
}

fn cmd_verify(args: VerifyArgs) -> anyhow::Result<()> {
    let paths = sorted_inputs(&args.in_dir, "lscf")?;
    if paths.is_empty() {
        bail!("no .lscf files in '{}'", args.in_dir.display());
    }

    let mut failures = 0usize;
    for path in &paths {
        let bytes =
            std::fs::read(path).with_context(|| format!("read '{}'", path.display()))?;
        match decode_frame(&bytes) {
            Ok(archived) => info!(
                file = %path.display(),
                index = archived.frame_index,
                width = archived.frame.width(),
                height = archived.frame.height(),
                "ok"
            ),
            Err(err) => {
                tracing::error!(file = %path.display(), %err, "invalid container");
                failures += 1;
            }
        }
    }
    if failures > 0 {
        bail!("{failures} of {} containers failed verification", paths.len());
    }
    info!(containers = paths.len(), "all containers verified");
    Ok(())
}

fn cmd_encode(args: EncodeArgs) -> anyhow::Result<()> {
    let frames = if sorted_inputs(&args.in_dir, "lscf")?.is_empty() {
        load_png_frames(&args.in_dir)?
    } else {
        load_archived_frames(&args.in_dir)?
    };

    let mut config = match &args.config {
        Some(path) => PipelineConfig::from_json_file(path)?,
        None => PipelineConfig {
            frame_count: frames.len(),
            ..PipelineConfig::default()
        },
    };
    if let Some(width) = args.width {
        config.target_width = width;
    }
    if let Some(height) = args.height {
        config.target_height = height;
    }
    if let Some(max_colors) = args.max_colors {
        config.max_colors = max_colors;
    }
    if args.dither {
        config.dither = true;
    }
    if let Some(quantizer) = args.quantizer {
        config.quantizer = quantizer;
    }
    if let Some(filter) = args.filter {
        config.filter = filter;
    }
    if let Some(delay_cs) = args.delay_cs {
        config.delay_cs = delay_cs;
    }
    if args.no_loop {
        config.loop_forever = false;
    }

    let mut pipeline = Pipeline::new(config)?.with_progress(Box::new(|p: Progress| {
        if p.completed == p.total && p.total > 0 {
            info!(stage = ?p.stage, frames = p.total, "stage frames done");
        }
    }));
    if let Some(dir) = &args.archive {
        pipeline = pipeline.with_archive_dir(dir);
    }

    let output = pipeline.run(&frames, None)?;
    std::fs::write(&args.out, &output.gif)
        .with_context(|| format!("write '{}'", args.out.display()))?;

    let report = &output.report;
    info!(
        out = %args.out.display(),
        frames = report.frame_count,
        palette = report.palette_size,
        gif_bytes = report.gif_bytes,
        compression_ratio = %format_args!("{:.2}", report.compression_ratio),
        "gif written"
    );
    Ok(())
}
