use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use image::{Rgba, RgbaImage};
use purikura::{
    composite_person, gradient, CompositionInput, DrawingLayer, ExportConfig, FilterChain,
    FilterPreset, FinalCompositor, GradientId, PhotoPresentation, Point, SegmentationMask, Size,
    StrokeStyle,
};

const PHOTO_SIZES: [(u32, u32); 3] = [(640, 480), (1280, 960), (1920, 1080)];

fn test_photo(width: u32, height: u32) -> RgbaImage {
    RgbaImage::from_fn(width, height, |x, y| {
        Rgba([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8, 255])
    })
}

fn scribbled_layer(size: Size) -> DrawingLayer {
    let mut layer = DrawingLayer::new(size).unwrap_or_else(|e| panic!("layer: {e}"));
    let style = StrokeStyle::default();
    let (w, h) = (size.width as f32, size.height as f32);
    layer.stroke_segment(Point::new(0.0, 0.0), Point::new(w, h), &style);
    layer.stroke_segment(Point::new(w, 0.0), Point::new(0.0, h), &style);
    layer
}

fn bench_filters(c: &mut Criterion) {
    let mut group = c.benchmark_group("filter_presets");
    group.sample_size(20);

    let photo = test_photo(640, 480);
    for preset in FilterPreset::ALL {
        let chain = FilterChain::for_preset(preset).unwrap_or_default();
        group.bench_with_input(BenchmarkId::from_parameter(preset), &chain, |b, chain| {
            b.iter(|| black_box(chain.applied_to(black_box(&photo))));
        });
    }

    group.finish();
}

fn bench_composite_person(c: &mut Criterion) {
    let mut group = c.benchmark_group("composite_person");

    for (width, height) in PHOTO_SIZES {
        let photo = test_photo(width, height);
        let mask = SegmentationMask::from_fn(width, height, |x, _| x < width / 2);
        let backdrop = gradient::render(GradientId::Gradient2, width, height);
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{width}x{height}")),
            &(photo, mask, backdrop),
            |b, (photo, mask, backdrop)| {
                b.iter(|| black_box(composite_person(photo, mask, backdrop)));
            },
        );
    }

    group.finish();
}

fn bench_final_compose(c: &mut Criterion) {
    let mut group = c.benchmark_group("final_compose");
    group.sample_size(10);

    let container = Size::new(800, 600);
    let drawing = scribbled_layer(container);
    let compositor = FinalCompositor::without_glyphs(ExportConfig::default());

    for (width, height) in PHOTO_SIZES {
        let photo = test_photo(width, height);
        for (label, presentation, filter) in [
            ("plain", PhotoPresentation::normal(), FilterPreset::None),
            ("kawaii", PhotoPresentation::normal(), FilterPreset::Kawaii),
            (
                "multiply",
                PhotoPresentation::approximated(GradientId::Gradient1, 0.85),
                FilterPreset::None,
            ),
        ] {
            let input = CompositionInput {
                photo: &photo,
                filter,
                presentation,
                drawing: &drawing,
                container,
                stickers: &[],
            };
            group.bench_with_input(
                BenchmarkId::new(label, format!("{width}x{height}")),
                &input,
                |b, input| {
                    b.iter(|| black_box(compositor.compose(input, Size::new(1080, 1080))));
                },
            );
        }
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_filters,
    bench_composite_person,
    bench_final_compose
);
criterion_main!(benches);
