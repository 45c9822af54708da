use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use pathtile::{
    ArtifactCache, Bound, CategoryId, Config, Layer, LayeredIndex, ObjectId, RasterizeTile, Rgba,
    SlideInfo, TilePoint, TilePolygon, ViewerBuilder, raster,
};

fn benchmark_index_operations(c: &mut Criterion) {
    let mut group = c.benchmark_group("index_operations");

    for count in [1_000, 10_000] {
        let mut index = LayeredIndex::new(256);
        for i in 0..count {
            let x = (i % 100) * 97;
            let y = (i / 100) * 89;
            index.bind(
                ObjectId::named(&format!("p{}", i)),
                &[Bound::new(x, y, x + 8, y + 8, 0)],
                Layer::Point,
            );
        }

        // Benchmark a viewport-sized query
        group.bench_with_input(BenchmarkId::new("window_query", count), &count, |b, _| {
            let window = Bound::new(2000, 2000, 3280, 2720, 0);
            b.iter(|| index.query(black_box(&[window]), Layer::Point))
        });
    }

    group.bench_function("bind_unbind", |b| {
        let mut index = LayeredIndex::new(256);
        let id = ObjectId::named("moving");
        let mut counter = 0i64;
        b.iter(|| {
            let x = (counter % 1000) * 13;
            counter += 1;
            index.bind(id, &[Bound::new(x, x, x + 300, x + 300, 0)], Layer::Area);
            index.unbind(black_box(id), Layer::Area)
        })
    });

    group.finish();
}

fn benchmark_cache_operations(c: &mut Criterion) {
    let mut group = c.benchmark_group("cache_operations");

    let ids: Vec<_> = (0..300).map(|i| ObjectId::named(&format!("t{}", i))).collect();
    let mut cache: ArtifactCache<u64, u64> = ArtifactCache::new(300);
    for (i, id) in ids.iter().enumerate() {
        cache.reserve(*id, i as u64);
    }
    cache.collect_pending(&ids);
    for (i, id) in ids.iter().enumerate() {
        cache.complete(*id, &(i as u64), i as u64);
    }

    group.bench_function("get_visible_30", |b| {
        b.iter(|| cache.get(black_box(&ids[100..130])))
    });

    group.bench_function("reserve_unchanged", |b| {
        b.iter(|| cache.reserve(black_box(ids[0]), 0))
    });

    group.finish();
}

fn benchmark_annotation_edits(c: &mut Criterion) {
    let mut group = c.benchmark_group("annotation_edits");

    let info = SlideInfo::new(
        "bench.svs",
        vec![(40_000, 30_000), (10_000, 7_500), (2_500, 1_875)],
        vec![1, 4, 16],
    )
    .unwrap();
    let mut viewer = ViewerBuilder::new()
        .config(Config::default())
        .slide(info)
        .build()
        .unwrap();

    group.bench_function("add_delete_point", |b| {
        let mut counter = 0i64;
        b.iter(|| {
            let x = (counter * 37) % 40_000;
            counter += 1;
            let id = viewer.add_point(x, 15_000, CategoryId(1)).unwrap();
            viewer.delete_points(black_box(&[id]))
        })
    });

    group.finish();
}

fn benchmark_rasterize(c: &mut Criterion) {
    let mut group = c.benchmark_group("rasterize");
    let color = Rgba::new(52, 152, 219, 200);

    let request = RasterizeTile {
        points: (0..50)
            .map(|i| TilePoint {
                x: i * 20,
                y: i * 20,
                color,
            })
            .collect(),
        polygons: vec![TilePolygon {
            vertices: vec![(100, 100), (900, 150), (700, 900), (200, 800)],
            color,
        }],
        tile_size: (1024, 1024),
    };

    group.bench_function("tile_1024", |b| {
        b.iter(|| raster::rasterize(black_box(&request)).unwrap())
    });

    group.finish();
}

criterion_group!(
    benches,
    benchmark_index_operations,
    benchmark_cache_operations,
    benchmark_annotation_edits,
    benchmark_rasterize
);
criterion_main!(benches);
