use criterion::{black_box, criterion_group, criterion_main, Criterion};

use tilestream::core::bitset::Bitset;
use tilestream::streaming::feedback::{decode_min_mip_feedback, NO_SAMPLE};
use tilestream::streaming::minmip::write_min_mip_data;
use tilestream::texture::layout::{TextureLayout, TiledLevelDesc, TiledTextureDesc};
use tilestream::{ResidencyConfig, ResidencyManager, ResidencyManagerDesc};

/// 8192x8192, 256x256 tiles, six regular mips, one packed tile.
fn large_texture_desc() -> TiledTextureDesc {
    let mut regular_mip_levels = Vec::new();
    let mut tiles = 32u32;
    while tiles >= 1 {
        regular_mip_levels.push(TiledLevelDesc {
            width_in_tiles: tiles,
            height_in_tiles: tiles,
        });
        tiles /= 2;
    }

    TiledTextureDesc {
        texture_width: 8192,
        texture_height: 8192,
        regular_mip_levels,
        packed_mip_levels_num: 8,
        packed_tiles_num: 1,
        tile_width: 256,
        tile_height: 256,
    }
}

fn bench_decode_sparse(c: &mut Criterion) {
    let layout = TextureLayout::new(&large_texture_desc());
    let cells = (layout.feedback_tiles_x * layout.feedback_tiles_y) as usize;

    // A handful of samples in a mostly idle grid: the batch-skip path
    let mut data = vec![NO_SAMPLE; cells];
    for i in (0..cells).step_by(97) {
        data[i] = 0;
    }

    c.bench_function("feedback_decode_sparse", |b| {
        b.iter(|| {
            let mut requested = Bitset::new(layout.tiles_num());
            decode_min_mip_feedback(&layout, black_box(&data), 0, &mut requested);
            requested
        });
    });
}

fn bench_decode_dense(c: &mut Criterion) {
    let layout = TextureLayout::new(&large_texture_desc());
    let cells = (layout.feedback_tiles_x * layout.feedback_tiles_y) as usize;
    let data = vec![0u8; cells];

    c.bench_function("feedback_decode_dense", |b| {
        b.iter(|| {
            let mut requested = Bitset::new(layout.tiles_num());
            decode_min_mip_feedback(&layout, black_box(&data), 0, &mut requested);
            requested
        });
    });
}

fn bench_min_mip_write(c: &mut Criterion) {
    let layout = TextureLayout::new(&large_texture_desc());

    // Everything resident: worst-case footprint stamping
    let mut resident = Bitset::new(layout.tiles_num());
    for tile_index in 0..layout.regular_tiles_num {
        resident.set(tile_index);
    }
    let mut image = vec![0u8; (layout.mip0_tiles_x() * layout.mip0_tiles_y()) as usize];

    c.bench_function("min_mip_write_full", |b| {
        b.iter(|| {
            write_min_mip_data(&layout, black_box(&resident), &mut image);
            image[0]
        });
    });
}

fn bench_frame_update(c: &mut Criterion) {
    let desc = large_texture_desc();
    let layout = TextureLayout::new(&desc);
    let cells = (layout.feedback_tiles_x * layout.feedback_tiles_y) as usize;
    let data = vec![0u8; cells];

    let mut manager = ResidencyManager::new(ResidencyManagerDesc {
        heap_tiles_capacity: 256,
        always_map_packed_tiles: true,
    });
    manager.set_config(ResidencyConfig {
        num_extra_standby_tiles: 0,
    });
    for heap_id in 0..8 {
        manager.add_heap(heap_id).unwrap();
    }
    let texture = manager.add_tiled_texture(&desc);

    c.bench_function("frame_update_dense", |b| {
        let mut timestamp = 0.0f32;
        b.iter(|| {
            timestamp += 1.0 / 60.0;
            manager.update_with_sampler_feedback(texture, &data, 0, timestamp, 1.0);
            manager.allocate_requested_tiles();
            let to_map = manager.get_tiles_to_map(texture);
            manager.update_tiles_mapping(texture, &to_map);
            black_box(manager.get_statistics())
        });
    });
}

criterion_group!(
    benches,
    bench_decode_sparse,
    bench_decode_dense,
    bench_min_mip_write,
    bench_frame_update
);
criterion_main!(benches);
