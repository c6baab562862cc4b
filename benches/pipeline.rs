//! Benchmarks for frame assembly and the temporal codec.

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};

use ascv::{
    animation::{Compression, TemporalDecoder, TemporalEncoder},
    compute::{FrameAssembler, rgba_from_fn},
    schema::{ColorDepth, ColorMode, ConversionConfig, EncoderConfig, Frame, RenderMode},
};

fn source(width: usize, height: usize, t: usize) -> Vec<u8> {
    rgba_from_fn(width, height, |x, y| {
        let v = ((x + y + t * 3) % 256) as u8;
        [v, v.wrapping_mul(3), 255 - v, 255]
    })
}

fn bench_assemble(c: &mut Criterion) {
    let mut group = c.benchmark_group("assemble");

    for mode in [
        RenderMode::Grayscale,
        RenderMode::Dither,
        RenderMode::Binary,
        RenderMode::Block,
    ] {
        for columns in [80, 160, 320] {
            let config = ConversionConfig {
                mode,
                color_mode: ColorMode::Color,
                color_depth: ColorDepth::Twelve,
                resolution: columns,
                ..Default::default()
            };
            let assembler = FrameAssembler::new(config).expect("valid config");
            let (w, h) = assembler.config().sample_size(1280, 720);
            let data = source(w, h, 0);

            group.bench_with_input(
                BenchmarkId::new(format!("{mode:?}"), format!("{w}x{h}")),
                &data,
                |b, data| {
                    b.iter(|| assembler.assemble_rgba(w, h, black_box(data)).expect("assemble"));
                },
            );
        }
    }

    group.finish();
}

fn frames(count: usize) -> Vec<Frame> {
    let assembler = FrameAssembler::new(ConversionConfig {
        color_mode: ColorMode::Color,
        resolution: 160,
        ..Default::default()
    })
    .expect("valid config");
    let (w, h) = assembler.config().sample_size(1280, 720);
    (0..count)
        .map(|t| assembler.assemble_rgba(w, h, &source(w, h, t)).expect("assemble"))
        .collect()
}

fn bench_codec(c: &mut Criterion) {
    let mut group = c.benchmark_group("codec");
    let frames = frames(60);

    for interval in [1, 10, 30] {
        group.bench_with_input(
            BenchmarkId::new("encode", interval),
            &interval,
            |b, &interval| {
                b.iter(|| {
                    let mut encoder = TemporalEncoder::new(EncoderConfig {
                        keyframe_interval: interval,
                    });
                    encoder
                        .encode_sequence(frames.iter().enumerate().map(|(i, f)| (i as f64 * 40.0, f)))
                        .expect("encode")
                });
            },
        );
    }

    let container = TemporalEncoder::new(EncoderConfig::default())
        .encode_sequence(frames.iter().enumerate().map(|(i, f)| (i as f64 * 40.0, f)))
        .expect("encode");

    group.bench_function("seek_loop", |b| {
        let mut decoder = TemporalDecoder::new();
        decoder.load(container.clone()).expect("load");
        let duration = decoder.duration();
        let mut t = 0.0;
        b.iter(|| {
            t = (t + 40.0) % duration;
            black_box(decoder.seek(t).map(Frame::cell_count));
        });
    });

    for compression in [Compression::None, Compression::Gzip, Compression::Lz4] {
        group.bench_with_input(
            BenchmarkId::new("serialize", format!("{compression:?}")),
            &compression,
            |b, &compression| {
                b.iter(|| container.to_bytes(compression).expect("serialize"));
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_assemble, bench_codec);
criterion_main!(benches);
