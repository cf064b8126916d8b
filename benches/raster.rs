#[macro_use]
extern crate criterion;

use criterion::{BenchmarkId, Criterion};

use poly_raster::{
    bin_normal, bin_subsector, point2, stencil_write, RasterConfig, StencilBuffer,
    SubsectorBuffer, TriangleArgs, WorkerData,
};

static SIZES: [i32; 3] = [64, 256, 1024];

fn bin(c: &mut Criterion) {
    let mut g = c.benchmark_group("bin");
    for size in &SIZES {
        let config = RasterConfig::new(*size, *size);
        let stencil = StencilBuffer::new(&config);
        let subsector = SubsectorBuffer::new(&config);
        let extent = 2.0 * *size as f32;
        let args = TriangleArgs::new(
            point2(0.0, 0.0),
            point2(0.0, extent),
            point2(extent, 0.0),
            &config,
        );
        let mut thread = WorkerData::new(0, 1, &config);

        g.bench_with_input(BenchmarkId::new("normal", size), size, |b, _| {
            b.iter(|| {
                bin_normal(&args, &stencil, &mut thread);
                std::hint::black_box(thread.full_spans.len());
            })
        });
        g.bench_with_input(BenchmarkId::new("subsector", size), size, |b, _| {
            b.iter(|| {
                bin_subsector(&args, &stencil, &subsector, &mut thread);
                std::hint::black_box(thread.full_spans.len());
            })
        });
    }
    g.finish();
}

fn sharded_bin(c: &mut Criterion) {
    let mut g = c.benchmark_group("sharded_bin");
    let config = RasterConfig::new(1024, 1024);
    let stencil = StencilBuffer::new(&config);
    let args =
        TriangleArgs::new(point2(0.0, 0.0), point2(0.0, 2048.0), point2(2048.0, 0.0), &config);

    for num_cores in &[1i32, 2, 4, 8] {
        let mut threads: Vec<WorkerData> =
            (0..*num_cores).map(|core| WorkerData::new(core, *num_cores, &config)).collect();
        g.bench_with_input(BenchmarkId::from_parameter(num_cores), num_cores, |b, _| {
            b.iter(|| {
                for thread in &mut threads {
                    bin_normal(&args, &stencil, thread);
                    std::hint::black_box(thread.full_spans.len());
                }
            })
        });
    }
    g.finish();
}

fn write_stencil(c: &mut Criterion) {
    let mut g = c.benchmark_group("stencil_write");
    let config = RasterConfig::new(1024, 1024);
    let stencil = StencilBuffer::new(&config);
    let args =
        TriangleArgs::new(point2(0.0, 0.0), point2(0.0, 2048.0), point2(2048.0, 0.0), &config);
    let mut thread = WorkerData::new(0, 1, &config);
    bin_normal(&args, &stencil, &mut thread);

    let mut target = StencilBuffer::new(&config);
    g.bench_function("full_screen", |b| {
        b.iter(|| {
            stencil_write(&mut target, 1, &thread);
            std::hint::black_box(target.tile_value(0, 0));
        })
    });
    g.finish();
}

criterion_group!(benches, bin, sharded_bin, write_stencil);
criterion_main!(benches);
