//! Headless widget controller tying layout, viewport and item cache together.
//!
//! A host toolkit forwards size changes, drags, pinches and taps to
//! [`NoxView`] and calls [`NoxView::frame`] once per frame to learn which
//! positions need repainting.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, trace};

use crate::catalog::{ItemCache, ItemState};
use crate::config::NoxConfig;
use crate::layout::{Boundaries, Layout, LayoutConfig, LayoutError, LayoutKind};
use crate::loader::{Bitmap, ImageLoader};
use crate::models::NoxItem;
use crate::viewport::ViewportTransform;

type ClickListener = Box<dyn FnMut(usize, &NoxItem)>;

pub struct NoxView<L: ImageLoader> {
    config: NoxConfig,
    loader: Arc<L>,
    layout: Layout,
    cache: ItemCache<L>,
    transform: ViewportTransform,
    placeholder: Option<Bitmap>,
    on_item_clicked: Option<ClickListener>,
    /// Positions visible in the previous frame, ascending.
    last_visible: Vec<usize>,
}

impl<L: ImageLoader> NoxView<L> {
    /// Creates an empty view with a zero sized viewport.
    pub fn new(loader: Arc<L>, config: NoxConfig) -> Result<Self, LayoutError> {
        let layout_config = config.layout_config()?;
        let layout = Layout::calculated(config.layout_kind, layout_config);
        let cache = Self::build_cache(&loader, &config, Vec::new(), None);
        let transform =
            ViewportTransform::new(layout.boundaries(), config.min_scale, config.max_scale);
        Ok(Self {
            config,
            loader,
            layout,
            cache,
            transform,
            placeholder: None,
            on_item_clicked: None,
            last_visible: Vec::new(),
        })
    }

    fn build_cache(
        loader: &Arc<L>,
        config: &NoxConfig,
        items: Vec<NoxItem>,
        placeholder: Option<Bitmap>,
    ) -> ItemCache<L> {
        let mut cache = ItemCache::with_options(
            loader.clone(),
            items,
            config.image_size(),
            config.circular,
            config.ready_capacity,
        );
        cache.set_default_placeholder(placeholder);
        cache
    }

    pub fn config(&self) -> &NoxConfig {
        &self.config
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn cache(&self) -> &ItemCache<L> {
        &self.cache
    }

    pub fn transform(&self) -> &ViewportTransform {
        &self.transform
    }

    pub fn items(&self) -> &[NoxItem] {
        self.cache.items()
    }

    pub fn boundaries(&self) -> Boundaries {
        self.layout.boundaries()
    }

    fn refresh_boundaries(&mut self) {
        let boundaries = self.layout.boundaries();
        trace!(?boundaries, "Scroll boundaries updated");
        self.transform.scroller_mut().set_boundaries(boundaries);
    }

    fn relayout(&mut self, kind: LayoutKind, config: LayoutConfig) {
        self.layout = Layout::calculated(kind, config);
        self.refresh_boundaries();
    }

    pub fn set_viewport_size(&mut self, width: u32, height: u32) {
        let mut config = *self.layout.config();
        config.set_viewport(width, height);
        debug!(width, height, "Viewport resized");
        self.relayout(self.layout.kind(), config);
    }

    /// Shows a new list of items. Pending loads of the previous list are
    /// cancelled and the viewport returns to its origin.
    pub fn show_items(&mut self, items: Vec<NoxItem>) {
        self.cache.release();
        let mut config = *self.layout.config();
        config.set_item_count(items.len());
        debug!(count = items.len(), kind = ?self.layout.kind(), "Showing items");
        self.layout = Layout::calculated(self.layout.kind(), config);
        self.cache = Self::build_cache(&self.loader, &self.config, items, self.placeholder.clone());
        self.last_visible.clear();
        self.transform = ViewportTransform::new(
            self.layout.boundaries(),
            self.config.min_scale,
            self.config.max_scale,
        );
    }

    /// Replaces the layout. It must be built for the number of items shown.
    pub fn set_layout(&mut self, mut layout: Layout) -> Result<(), LayoutError> {
        if layout.len() != self.cache.len() {
            return Err(LayoutError::CountMismatch {
                expected: self.cache.len(),
                actual: layout.len(),
            });
        }
        if !layout.is_calculated() {
            layout.calculate();
        }
        self.layout = layout;
        self.refresh_boundaries();
        Ok(())
    }

    pub fn set_layout_kind(&mut self, kind: LayoutKind) {
        let config = *self.layout.config();
        self.relayout(kind, config);
    }

    /// Applies an edited item list. Positions present before and after keep
    /// their loaded images.
    pub fn notify_data_set_changed(&mut self, items: Vec<NoxItem>) {
        self.layout.resize(items.len());
        self.layout.calculate();
        self.cache.resize(items);
        self.refresh_boundaries();
    }

    /// Forwards a drag. Returns true if the view scrolled.
    pub fn scroll_by(&mut self, distance_x: f32, distance_y: f32) -> bool {
        self.transform.scroller_mut().scroll_by(distance_x, distance_y)
    }

    pub fn scroll_to(&mut self, x: i32, y: i32) {
        self.transform.scroller_mut().scroll_to(x, y);
    }

    pub fn on_scale(&mut self, factor: f32, focus_x: f32, focus_y: f32) {
        self.transform.zoomer_mut().on_scale(factor, focus_x, focus_y);
    }

    pub fn visible_positions(&self) -> Vec<usize> {
        let (offset_x, offset_y) = self.transform.offset();
        self.layout.visible_positions(offset_x, offset_y)
    }

    /// Requests every visible image and applies finished loads. Returns the
    /// visible positions whose bitmap changed, in ascending order.
    ///
    /// Failed positions are retried only when they come back into view, not
    /// on every frame they stay visible.
    pub fn frame(&mut self) -> Vec<usize> {
        let (offset_x, offset_y) = self.transform.offset();
        let visible = self.layout.visible_positions(offset_x, offset_y);
        for &position in &visible {
            let stayed_visible = self.last_visible.binary_search(&position).is_ok();
            if stayed_visible && self.cache.state(position) == Some(ItemState::Error) {
                continue;
            }
            self.cache.ensure_load(position);
        }
        self.last_visible = visible;

        let mut redraw = self.cache.poll();
        redraw.retain(|&p| {
            self.layout
                .is_visible(p, offset_x, offset_y)
                .unwrap_or(false)
        });
        redraw.sort_unstable();
        redraw.dedup();
        redraw
    }

    /// Bitmap to draw for a position: the image once loaded, otherwise the
    /// placeholder.
    pub fn bitmap(&self, position: usize) -> Option<Bitmap> {
        self.cache
            .image(position)
            .or_else(|| self.cache.placeholder(position))
    }

    /// Resolves a tap in screen coordinates and notifies the click listener.
    pub fn click(&mut self, x: f32, y: f32) -> Option<usize> {
        let (layout_x, layout_y) = self.transform.screen_to_layout(x, y);
        let position = self.layout.hit_test(layout_x, layout_y)?;
        debug!(position, "Item clicked");
        if let Some(listener) = self.on_item_clicked.as_mut() {
            listener(position, &self.cache.items()[position]);
        }
        Some(position)
    }

    pub fn on_item_clicked(&mut self, listener: impl FnMut(usize, &NoxItem) + 'static) {
        self.on_item_clicked = Some(Box::new(listener));
    }

    pub fn set_placeholder(&mut self, placeholder: Option<Bitmap>) {
        self.cache.set_default_placeholder(placeholder.clone());
        self.placeholder = placeholder;
    }

    pub fn pause(&self) {
        self.cache.pause();
    }

    pub fn resume(&self) {
        self.cache.resume();
    }

    pub fn release(&mut self) {
        self.cache.release();
    }
}

impl<L: ImageLoader> fmt::Debug for NoxView<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NoxView")
            .field("config", &self.config)
            .field("layout", &self.layout)
            .field("items", &self.cache.len())
            .field("transform", &self.transform)
            .finish()
    }
}
