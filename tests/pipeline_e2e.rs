//! End-to-end runs of the standard capture profile, checked through an
//! independent GIF decode.

use std::{collections::HashSet, io::Cursor};

use image::{AnimationDecoder, codecs::gif::GifDecoder};

use loopshot::{
    LoopshotError, Pipeline, PipelineConfig, PipelineStage, QuantizerKind, RawFrame, ScaleFilter,
};

const CYCLE: [[u8; 4]; 4] = [
    [230, 30, 30, 255],
    [30, 230, 30, 255],
    [30, 30, 230, 255],
    [230, 230, 30, 255],
];

/// 81 solid 8x8 frames cycling through four colors, stride-padded like a real
/// capture buffer.
fn capture_batch() -> Vec<RawFrame> {
    (0..81)
        .map(|i| {
            let c = CYCLE[i % CYCLE.len()];
            let stride = 8 * 4 + 8;
            let mut data = vec![0u8; stride * 8];
            for y in 0..8 {
                for x in 0..8 {
                    data[y * stride + x * 4..y * stride + x * 4 + 4].copy_from_slice(&c);
                }
            }
            RawFrame::new(8, 8, stride as u32, i as u64 * 40, data).unwrap()
        })
        .collect()
}

fn standard_config() -> PipelineConfig {
    PipelineConfig {
        frame_count: 81,
        target_width: 4,
        target_height: 4,
        filter: ScaleFilter::Bilinear,
        quantizer: QuantizerKind::MedianCut,
        max_colors: 4,
        dither: false,
        delay_cs: 4,
        loop_forever: true,
    }
}

#[test]
fn standard_profile_produces_a_valid_looping_gif() {
    let mut pipeline = Pipeline::new(standard_config()).unwrap();
    let output = pipeline.run(&capture_batch(), None).unwrap();
    assert_eq!(pipeline.stage(), &PipelineStage::Complete);

    let netscape = b"NETSCAPE2.0";
    assert!(
        output
            .gif
            .windows(netscape.len())
            .any(|w| w == netscape),
        "loop extension missing"
    );

    let decoder = GifDecoder::new(Cursor::new(&output.gif)).unwrap();
    let frames = decoder.into_frames().collect_frames().unwrap();
    assert_eq!(frames.len(), 81);

    let mut seen_colors: HashSet<[u8; 3]> = HashSet::new();
    for frame in &frames {
        let (numer, denom) = frame.delay().numer_denom_ms();
        assert_eq!(numer / denom, 40, "per-frame delay");
        let buf = frame.buffer();
        assert_eq!(buf.width(), 4);
        assert_eq!(buf.height(), 4);
        for px in buf.pixels() {
            seen_colors.insert([px.0[0], px.0[1], px.0[2]]);
        }
    }
    assert!(seen_colors.len() <= 4, "palette leaked: {seen_colors:?}");

    // Solid source frames survive downscale and a 4-color palette exactly.
    let first = frames[0].buffer().get_pixel(0, 0).0;
    assert_eq!(&first[..3], &CYCLE[0][..3]);
}

#[test]
fn octree_with_dither_also_round_trips() {
    let config = PipelineConfig {
        quantizer: QuantizerKind::Octree,
        dither: true,
        filter: ScaleFilter::Lanczos3,
        ..standard_config()
    };
    let mut pipeline = Pipeline::new(config).unwrap();
    let output = pipeline.run(&capture_batch(), None).unwrap();

    let decoder = GifDecoder::new(Cursor::new(&output.gif)).unwrap();
    let frames = decoder.into_frames().collect_frames().unwrap();
    assert_eq!(frames.len(), 81);
}

#[test]
fn single_frame_batch_is_a_valid_gif() {
    let config = PipelineConfig {
        frame_count: 1,
        loop_forever: false,
        ..standard_config()
    };
    let mut pipeline = Pipeline::new(config).unwrap();
    let output = pipeline.run(&capture_batch()[..1], None).unwrap();

    let decoder = GifDecoder::new(Cursor::new(&output.gif)).unwrap();
    assert_eq!(decoder.into_frames().collect_frames().unwrap().len(), 1);
}

#[test]
fn empty_batch_fails_with_batch_count() {
    let config = PipelineConfig {
        frame_count: 1,
        ..standard_config()
    };
    let mut pipeline = Pipeline::new(config).unwrap();
    let err = pipeline.run(&[], None).unwrap_err();
    assert!(matches!(
        err,
        LoopshotError::BatchCount {
            expected: 1,
            actual: 0
        }
    ));
    assert!(matches!(pipeline.stage(), PipelineStage::Failed(_)));
}

#[test]
fn report_accounts_for_every_stage() {
    let mut pipeline = Pipeline::new(standard_config()).unwrap();
    let output = pipeline.run(&capture_batch(), None).unwrap();
    let report = output.report;

    assert_eq!(report.frame_count, 81);
    assert!(report.palette_size <= 4);
    assert_eq!(report.gif_bytes, output.gif.len());
    let raw_rgb = 81.0 * 4.0 * 4.0 * 3.0;
    let expected = raw_rgb / output.gif.len() as f64;
    assert!((report.compression_ratio - expected).abs() < 1e-9);
}
