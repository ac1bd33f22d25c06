use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use tracing::{info, warn};
use walkdir::WalkDir;

use nox::{ItemState, LayoutKind, NoxConfig, NoxItem, NoxView, WorkerImageLoader};

const VIEWPORT_WIDTH: u32 = 800;
const VIEWPORT_HEIGHT: u32 = 480;
const FRAME_INTERVAL: Duration = Duration::from_millis(16);
const LOAD_TIMEOUT: Duration = Duration::from_secs(30);

fn is_image(path: &Path) -> bool {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    matches!(
        ext.to_lowercase().as_str(),
        "jpg" | "jpeg" | "png" | "webp" | "gif" | "bmp" | "tiff" | "tif"
    )
}

fn scan(dir: &Path) -> Vec<PathBuf> {
    let mut paths: Vec<PathBuf> = WalkDir::new(dir)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file() && is_image(e.path()))
        .map(|e| e.into_path())
        .collect();
    paths.sort();
    paths
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("nox=info".parse().context("Invalid log directive")?),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let Some(dir) = args.next().map(PathBuf::from) else {
        bail!("usage: nox-demo <dir> [layout-key]");
    };
    let kind = match args.next() {
        Some(key) => LayoutKind::from_key(
            key.parse()
                .with_context(|| format!("Layout key must be a number, got {:?}", key))?,
        ),
        None => LayoutKind::Linear,
    };

    let paths = scan(&dir);
    info!(count = paths.len(), ?dir, ?kind, "Scanned directory");

    let mut items = Vec::with_capacity(paths.len());
    for path in &paths {
        items.push(NoxItem::from_url(path.display().to_string())?);
    }

    let loader = Arc::new(
        WorkerImageLoader::builder()
            .default_cache_dir()
            .build()
            .context("Failed to start image loader")?,
    );
    let config = NoxConfig::default().with_layout_kind(kind);
    let mut view = NoxView::new(loader, config)?;
    view.set_viewport_size(VIEWPORT_WIDTH, VIEWPORT_HEIGHT);
    view.on_item_clicked(|position, item| info!(position, source = %item.source(), "Clicked"));
    view.show_items(items);

    let boundaries = view.boundaries();
    info!(?boundaries, visible = view.visible_positions().len(), "Layout ready");

    let started = Instant::now();
    loop {
        for position in view.frame() {
            let state = view.cache().state(position);
            info!(position, ?state, "Redraw");
        }
        if view.cache().in_flight() == 0 {
            break;
        }
        if started.elapsed() > LOAD_TIMEOUT {
            warn!(in_flight = view.cache().in_flight(), "Gave up waiting for images");
            break;
        }
        thread::sleep(FRAME_INTERVAL);
    }

    let visible = view.visible_positions();
    let loaded = visible
        .iter()
        .filter(|&&p| view.cache().state(p) == Some(ItemState::Loaded))
        .count();
    info!(
        loaded,
        visible = visible.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Visible items resolved"
    );

    let center_x = VIEWPORT_WIDTH as f32 / 2.0;
    let center_y = VIEWPORT_HEIGHT as f32 / 2.0;
    view.click(center_x, center_y);
    view.release();
    Ok(())
}
