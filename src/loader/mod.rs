//! Asynchronous image loading.
//!
//! This module provides:
//! - `ImageLoader` - The contract the item cache issues requests through
//! - `WorkerImageLoader` - Worker pool that fetches, decodes and transforms images
//! - `BitmapCache` - Memory and disk caching of prepared bitmaps
//! - `Fetcher` - Resolution of item sources into encoded bytes

pub mod bitmap_cache;
pub mod decoder;
pub mod fetch;
pub mod worker;

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use image::RgbaImage;
use thiserror::Error;

use crate::models::{ImageSource, ResourceId};

pub use bitmap_cache::BitmapCache;
pub use fetch::{FetchError, Fetcher, FsFetcher};
pub use worker::{WorkerImageLoader, WorkerImageLoaderBuilder};

/// A decoded, ready to draw image. Cloning shares the pixels.
#[derive(Clone)]
pub struct Bitmap(Arc<RgbaImage>);

impl Bitmap {
    pub fn new(image: RgbaImage) -> Self {
        Self(Arc::new(image))
    }

    pub fn width(&self) -> u32 {
        self.0.width()
    }

    pub fn height(&self) -> u32 {
        self.0.height()
    }

    pub fn image(&self) -> &RgbaImage {
        &self.0
    }

    /// Estimated memory used by the pixels.
    pub fn byte_size(&self) -> usize {
        self.0.as_raw().len()
    }

    /// True if both handles share the same pixels.
    pub fn ptr_eq(&self, other: &Bitmap) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Bitmap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bitmap")
            .field("width", &self.width())
            .field("height", &self.height())
            .finish()
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LoaderError {
    #[error("trying to load an image without a url or a resource id")]
    MissingSource,
    #[error("image loader queue is full")]
    QueueFull,
    #[error("image loader has been shut down")]
    Disconnected,
}

/// Shared flag that cancels every request carrying a clone of it.
///
/// Lets one owner drop its own pending requests without touching those of
/// other owners sharing the same loader.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

impl PartialEq for CancelToken {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for CancelToken {}

/// Everything a loader needs to know to produce one image.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadRequest {
    url: Option<String>,
    resource: Option<ResourceId>,
    placeholder: Option<ResourceId>,
    circular: bool,
    size: u32,
    cancel: Option<CancelToken>,
}

impl LoadRequest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request configured to load the given item source.
    pub fn for_source(source: &ImageSource) -> Self {
        match source {
            ImageSource::Remote(url) => Self::new().load_url(url.clone()),
            ImageSource::Local(id) => Self::new().load_resource(*id),
        }
    }

    pub fn load_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn load_resource(mut self, resource: ResourceId) -> Self {
        self.resource = Some(resource);
        self
    }

    pub fn with_placeholder(mut self, placeholder: Option<ResourceId>) -> Self {
        self.placeholder = placeholder;
        self
    }

    pub fn use_circular_transformation(mut self, circular: bool) -> Self {
        self.circular = circular;
        self
    }

    /// Edge length in pixels of the square output. Zero keeps the source size.
    pub fn size(mut self, size: u32) -> Self {
        self.size = size;
        self
    }

    /// Ties the request to a token; once cancelled the loader drops the
    /// request without calling its listener.
    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancelToken::is_cancelled)
    }

    /// The source to load. A url takes priority over a resource id.
    pub fn source(&self) -> Option<ImageSource> {
        match (&self.url, self.resource) {
            (Some(url), _) => Some(ImageSource::Remote(url.clone())),
            (None, Some(id)) => Some(ImageSource::Local(id)),
            (None, None) => None,
        }
    }

    pub fn placeholder(&self) -> Option<ResourceId> {
        self.placeholder
    }

    pub fn is_circular(&self) -> bool {
        self.circular
    }

    pub fn pixel_size(&self) -> u32 {
        self.size
    }

    pub fn validate(&self) -> Result<(), LoaderError> {
        if self.url.is_none() && self.resource.is_none() {
            return Err(LoaderError::MissingSource);
        }
        Ok(())
    }
}

/// Receives the outcome of one [`ImageLoader::notify`] call.
///
/// `on_placeholder_loaded` fires at most once and always before the single
/// terminal callback.
pub trait LoadListener: Send {
    fn on_placeholder_loaded(&self, placeholder: Bitmap);
    fn on_image_loaded(&self, image: Bitmap);
    fn on_error(&self);
    fn on_resource_not_found(&self);
}

/// Downloads images in the background and reports through a listener.
pub trait ImageLoader {
    /// Starts loading. Fails right away if the request has no source.
    fn notify(&self, request: LoadRequest, listener: Box<dyn LoadListener>)
        -> Result<(), LoaderError>;

    /// Holds all queued and future work until [`ImageLoader::resume`].
    fn pause(&self);

    fn resume(&self);

    /// Drops every request that has not delivered its result yet, for all
    /// owners. Use a [`CancelToken`] to cancel only one owner's requests.
    fn cancel_all(&self);
}
