//! Image panel widget core: geometric layouts of image items inside a
//! scrollable, zoomable viewport with lazy, deduplicated image loading.

pub mod catalog;
pub mod config;
pub mod layout;
pub mod loader;
pub mod models;
pub mod view;
pub mod viewport;

#[cfg(test)]
mod testing;

pub use catalog::{ItemCache, ItemState};
pub use config::NoxConfig;
pub use layout::{Boundaries, Layout, LayoutConfig, LayoutError, LayoutKind, Point};
pub use loader::{
    Bitmap, BitmapCache, CancelToken, FetchError, Fetcher, FsFetcher, ImageLoader, LoadListener,
    LoadRequest, LoaderError, WorkerImageLoader, WorkerImageLoaderBuilder,
};
pub use models::{ImageSource, ItemError, NoxItem, ResourceId};
pub use view::NoxView;
pub use viewport::ViewportTransform;
