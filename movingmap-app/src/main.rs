use clap::{Parser, ValueEnum};
use movingmap::core::config::MapPerformanceProfile;
use movingmap::core::geo::{self, METERS_PER_NM};
use movingmap::data::mvt::{GeometryType, VectorTileBuilder};
use movingmap::prelude::*;
use movingmap::rendering::WgpuContext;
use std::path::{Path, PathBuf};

/// Flies a simulated aircraft in circles over a moving map, without a window
#[derive(Debug, Parser)]
#[command(name = "movingmap-app", version)]
struct Args {
    /// JSON configuration file; overrides --profile
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = Profile::Balanced)]
    profile: Profile,

    /// Directory of `{z}/{x}/{y}.pbf` tiles. Synthetic tiles are generated when absent.
    #[arg(long)]
    tiles: Option<PathBuf>,

    #[arg(long, default_value_t = 47.45)]
    lat: f64,

    #[arg(long, default_value_t = 8.56)]
    lng: f64,

    /// Radius of the circuit flown, in nautical miles
    #[arg(long, default_value_t = 5.0)]
    circuit_nm: f64,

    /// Ground speed in knots
    #[arg(long, default_value_t = 140.0)]
    speed_kt: f64,

    /// Half-range shown from the centre to the nearest screen edge
    #[arg(long, default_value_t = 10.0)]
    range_nm: f64,

    #[arg(long, value_enum, default_value_t = Orientation::TrackUp)]
    orientation: Orientation,

    #[arg(long, default_value_t = 800)]
    width: u32,

    #[arg(long, default_value_t = 600)]
    height: u32,

    /// Number of frames to render
    #[arg(long, default_value_t = 600)]
    frames: u64,

    /// Render through wgpu into an offscreen target
    #[arg(long)]
    gpu: bool,

    /// Rasterize the tile under the start position to this PNG and exit
    #[arg(long)]
    export_png: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Profile {
    Balanced,
    LowMemory,
    HighQuality,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Orientation {
    NorthUp,
    TrackUp,
    HeadingUp,
}

impl From<Orientation> for OrientationMode {
    fn from(value: Orientation) -> Self {
        match value {
            Orientation::NorthUp => OrientationMode::NorthUp,
            Orientation::TrackUp => OrientationMode::TrackUp,
            Orientation::HeadingUp => OrientationMode::HeadingUp,
        }
    }
}

/// Generates a plausible tile for any coordinate: land with a lake, a road and a block of buildings
struct SyntheticStore;

impl TileStore for SyntheticStore {
    fn get(&self, zoom: u8, column: u32, row: u32) -> Option<Vec<u8>> {
        let seed = (column ^ row.rotate_left(7) ^ zoom as u32).wrapping_mul(2654435761);
        let offset = (seed % 1024) as i32;
        let class = if seed % 3 == 0 { "forest" } else { "grass" };

        let tile = VectorTileBuilder::new()
            .feature(
                "landcover",
                GeometryType::Polygon,
                &[("class", class)],
                vec![vec![(0, 0), (4096, 0), (4096, 4096), (0, 4096)]],
            )
            .feature(
                "water",
                GeometryType::Polygon,
                &[],
                vec![vec![
                    (512 + offset, 512),
                    (1800 + offset, 700),
                    (1600 + offset, 1900),
                    (600 + offset, 1700),
                ]],
            )
            .feature(
                "transportation",
                GeometryType::LineString,
                &[("class", "primary")],
                vec![vec![(0, 2048 + offset), (4096, 2048 - offset)]],
            )
            .feature(
                "building",
                GeometryType::Polygon,
                &[],
                vec![vec![(2800, 2800), (3300, 2800), (3300, 3300), (2800, 3300)]],
            )
            .build();
        Some(tile)
    }
}

/// Clockwise circuit around a fixed point
struct Circuit {
    center: LatLng,
    radius_nm: f64,
    speed_kt: f64,
}

impl Circuit {
    fn sample(&self, elapsed: Duration) -> LiveSample {
        let hours = elapsed.as_secs_f64() / 3600.0;
        let bearing = (self.speed_kt * hours / self.radius_nm).to_degrees();
        let radius_deg = self.radius_nm / 60.0;
        let lat = self.center.lat + radius_deg * bearing.to_radians().cos();
        let lng = self.center.lng
            + radius_deg * bearing.to_radians().sin() / lat.to_radians().cos().max(1e-6);
        let heading = (bearing + 90.0).rem_euclid(360.0);
        LiveSample {
            lat,
            lng,
            heading_deg: heading,
            // Steady crosswind from the left
            ground_track_deg: (heading + 4.0).rem_euclid(360.0),
        }
    }
}

fn load_config(args: &Args) -> Result<MapEngineConfig> {
    let mut config = match &args.config {
        Some(path) => MapEngineConfig::from_path(path)?,
        None => match args.profile {
            Profile::Balanced => MapPerformanceProfile::Balanced,
            Profile::LowMemory => MapPerformanceProfile::LowMemory,
            Profile::HighQuality => MapPerformanceProfile::HighQuality,
        }
        .resolve(),
    };

    let half_extent_px = args.width.min(args.height) as f64 / 2.0;
    let view = &mut config.view;
    view.initial_center = LatLng::new(args.lat, args.lng);
    view.initial_zoom = geo::zoom_for_half_range_nm(
        args.range_nm,
        half_extent_px,
        args.lat,
        view.tile_display_px,
        view.min_zoom,
        view.max_zoom,
    );
    if args.tiles.is_none() {
        config.tile_cache.store_rows = RowConvention::Xyz;
    }
    config.validate()?;
    Ok(config)
}

fn open_store(args: &Args) -> Arc<dyn TileStore> {
    match &args.tiles {
        Some(dir) => {
            log::info!("reading tiles from {}", dir.display());
            Arc::new(DirectoryTileStore::new(dir))
        }
        None => {
            log::info!("no tile directory given, generating synthetic tiles");
            Arc::new(SyntheticStore)
        }
    }
}

fn export_png(args: &Args, config: &MapEngineConfig, store: &dyn TileStore, path: &Path) -> Result<()> {
    let zoom = config.view.initial_zoom;
    let coord = TileCoord::from_lat_lng(&LatLng::new(args.lat, args.lng), zoom);
    let row = match config.tile_cache.store_rows {
        RowConvention::Xyz => coord.y,
        RowConvention::Tms => coord.flipped_row(),
    };
    let bytes = store.get(coord.z, coord.x, row).unwrap_or_default();
    let raster = Rasterizer::new(&config.raster).rasterize(&bytes);
    raster.save_png(path)?;
    log::info!("tile {} written to {}", coord, path.display());
    Ok(())
}

/// Drives frames in real time while feeding the circuit at the configured sample rate
async fn fly<C: GpuContext>(
    renderer: &mut Renderer<C>,
    config: &MapEngineConfig,
    args: &Args,
    mut end_frame: impl FnMut(&mut C),
) {
    let circuit = Circuit {
        center: LatLng::new(args.lat, args.lng),
        radius_nm: args.circuit_nm.max(0.1),
        speed_kt: args.speed_kt,
    };
    renderer.gesture_input().set_orientation(args.orientation.into());
    let position = renderer.position_input();

    let frame_time = Duration::from_millis(config.frame.target_frame_duration_ms().unwrap_or(16));
    let sample_interval = config.position.sample_interval();
    let mut ticker = tokio::time::interval(frame_time);
    let start = Instant::now();
    let mut next_sample = start;
    let mut over_budget = 0u64;

    for _ in 0..args.frames {
        ticker.tick().await;
        let now = Instant::now();
        if now >= next_sample {
            position.push_at(circuit.sample(now - start), now);
            next_sample += sample_interval;
        }

        let stats = renderer.render_frame(now);
        end_frame(renderer.context_mut());

        if stats.over_budget {
            over_budget += 1;
        }
        if stats.frame % 60 == 0 {
            let view = renderer.view().snapshot();
            log::info!(
                "frame {}: zoom {} center {:.4},{:.4} rotation {:.1}, {}/{} tiles drawn, {} requested, {} uploaded",
                stats.frame,
                view.zoom_level(),
                view.center().lat,
                view.center().lng,
                view.rotation_deg(),
                stats.drawn,
                stats.visible,
                stats.requested,
                stats.uploaded
            );
        }
    }

    let cache = renderer.cache().stats();
    log::info!(
        "{} frames, {} over budget; cache: {} requests, {} misses, {} uploads, {} evictions, {} discarded",
        args.frames,
        over_budget,
        cache.requests,
        cache.misses,
        cache.uploads,
        cache.evictions,
        cache.discarded
    );
    let miles = circuit.center.distance_to(&renderer.view().snapshot().center()) / METERS_PER_NM;
    log::info!("finished {:.1} nm from the circuit centre", miles);
}

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let config = load_config(&args)?;
    let store = open_store(&args);

    if let Some(path) = &args.export_png {
        export_png(&args, &config, store.as_ref(), path)?;
        return Ok(());
    }

    let spawner: Arc<dyn TileSpawner> = match TokioSpawner::current() {
        Some(spawner) => Arc::new(spawner),
        None => default_spawner(),
    };

    if args.gpu {
        let mut ctx = WgpuContext::new(args.width, args.height).await?;
        ctx.set_clear_color(config.raster.background);
        let mut renderer = Renderer::new(ctx, &config, store, spawner)?;
        fly(&mut renderer, &config, &args, |ctx| ctx.present()).await;
        renderer.release();
        renderer.context_mut().present();
    } else {
        let ctx = RecordingContext::new(args.width, args.height);
        let mut renderer = Renderer::new(ctx, &config, store, spawner)?;
        fly(&mut renderer, &config, &args, |ctx| {
            log::trace!("{} quads recorded", ctx.quad_count());
            ctx.begin_frame();
        })
        .await;
        renderer.release();
    }

    Ok(())
}
