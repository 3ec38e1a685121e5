//! Frame loop behaviour with a recording context

use movingmap::data::mvt::{GeometryType, VectorTileBuilder};
use movingmap::prelude::*;

fn world_store(zoom: u8) -> Arc<MemoryTileStore> {
    let tile = VectorTileBuilder::new()
        .feature(
            "landcover",
            GeometryType::Polygon,
            &[("class", "grass")],
            vec![vec![(0, 0), (4096, 0), (4096, 4096), (0, 4096)]],
        )
        .build();
    let store = MemoryTileStore::new();
    let n = 1u32 << zoom;
    for x in 0..n {
        for y in 0..n {
            store.insert(zoom, x, y, tile.clone());
        }
    }
    Arc::new(store)
}

fn config(zoom: u8) -> MapEngineConfig {
    let mut config = MapEngineConfig::default();
    config.view.initial_zoom = zoom;
    config.view.initial_center = LatLng::new(0.0, 0.0);
    config.tile_cache.store_rows = RowConvention::Xyz;
    config.tile_cache.upload_queue_len = 128;
    config.tile_cache.uploads_per_frame = 8;
    config.raster.size = 16;
    config
}

fn renderer(zoom: u8) -> Renderer<RecordingContext> {
    Renderer::new(
        RecordingContext::new(800, 600),
        &config(zoom),
        world_store(zoom),
        Arc::new(InlineSpawner),
    )
    .unwrap()
}

#[test]
fn test_visible_set_fills_in_over_frames() {
    let mut renderer = renderer(5);
    let start = Instant::now();

    renderer.context_mut().begin_frame();
    let first = renderer.render_frame(start);
    assert_eq!(first.drawn, 0);
    assert_eq!(first.requested, first.visible);
    assert_eq!(first.uploaded, 8);

    let mut last = first;
    for i in 1..20u64 {
        renderer.context_mut().begin_frame();
        last = renderer.render_frame(start + Duration::from_millis(16 * i));
        if last.drawn == last.visible {
            break;
        }
    }
    assert_eq!(last.drawn, last.visible);
    assert_eq!(last.requested, 0);
    assert_eq!(renderer.context().invalid_draws(), 0);
    assert_eq!(renderer.cache().resident_len(), last.visible);
}

#[test]
fn test_heading_up_follows_ownship() {
    let mut renderer = renderer(6);
    let position = renderer.position_input();
    let gestures = renderer.gesture_input();
    gestures.set_orientation(OrientationMode::HeadingUp);

    let t0 = Instant::now();
    position.push_at(
        LiveSample {
            lat: 10.0,
            lng: 20.0,
            heading_deg: 90.0,
            ground_track_deg: 80.0,
        },
        t0,
    );
    renderer.render_frame(t0 + Duration::from_millis(100));

    let view = renderer.view().snapshot();
    assert!((view.center().lat - 10.0).abs() < 1e-9);
    assert!((view.center().lng - 20.0).abs() < 1e-9);
    assert!((view.rotation_deg() + 90.0).abs() < 1e-9);
}

#[test]
fn test_gestures_reach_the_next_frame() {
    let mut renderer = renderer(5);
    let gestures = renderer.gesture_input();
    let before = renderer.view().snapshot().center();

    // Input arrives from another thread
    let worker = std::thread::spawn(move || {
        gestures.apply(GestureEvent::Pan { dx: -256.0, dy: 0.0 });
    });
    worker.join().unwrap();
    renderer.render_frame(Instant::now());

    let after = renderer.view().snapshot().center();
    assert!(after.lng > before.lng);
    assert!((after.lat - before.lat).abs() < 1e-9);
}

#[test]
fn test_release_leaves_no_textures() {
    let mut renderer = renderer(4);
    renderer.position_input().push(LiveSample {
        lat: 0.0,
        lng: 0.0,
        heading_deg: 45.0,
        ground_track_deg: 45.0,
    });
    let start = Instant::now();
    for i in 0..5u64 {
        renderer.render_frame(start + Duration::from_millis(16 * i));
    }
    assert!(renderer.context().live_textures() > 0);

    renderer.release();
    assert_eq!(renderer.context().live_textures(), 0);
    assert_eq!(renderer.cache().owned_textures(), 0);
}

#[test]
fn test_inverted_zoom_range_rejected() {
    let mut config = config(5);
    config.view.min_zoom = 12;
    config.view.max_zoom = 8;
    let result = Renderer::new(
        RecordingContext::new(800, 600),
        &config,
        world_store(1),
        Arc::new(InlineSpawner),
    );
    assert!(matches!(result, Err(MapError::Config(_))));
}

#[test]
fn test_low_memory_hd_view_keeps_center_tile() {
    let mut config = MapPerformanceProfile::LowMemory.resolve();
    config.view.initial_zoom = 7;
    config.view.initial_center = LatLng::new(0.0, 0.0);
    config.tile_cache.store_rows = RowConvention::Xyz;
    config.tile_cache.upload_queue_len = 256;
    config.raster.size = 16;
    let mut renderer = Renderer::without_overlays(
        RecordingContext::new(1920, 1080),
        &config,
        world_store(7),
        Arc::new(InlineSpawner),
    )
    .unwrap();
    let center = TileCoord::from_lat_lng(&LatLng::new(0.0, 0.0), 7);

    let start = Instant::now();
    for i in 0..120u64 {
        renderer.context_mut().begin_frame();
        let stats = renderer.render_frame(start + Duration::from_millis(33 * i));
        assert_eq!(stats.visible, 11 * 9);
        assert_eq!(renderer.cache().state(center), TileState::Resident, "frame {}", i + 1);
    }
    assert!(renderer.cache().stats().evictions > 0);
    assert_eq!(renderer.context().invalid_draws(), 0);
}
