//! Per-position image state for the items shown by the widget.
//!
//! `ItemCache` issues at most one load per position through an
//! [`ImageLoader`] and keeps the resulting bitmaps in dense per-position
//! slots. Loader results arrive on a channel and are applied by [`ItemCache::poll`]
//! on the owner's thread.
//!
//! Requests carry a [`CancelToken`] owned by the cache, so releasing or
//! dropping one cache never cancels work issued by another cache sharing
//! the same loader.

mod state;

pub use state::ItemState;

use std::sync::Arc;

use flume::{Receiver, Sender, TryRecvError, TrySendError};
use tracing::{debug, trace, warn};

use crate::loader::{Bitmap, CancelToken, ImageLoader, LoadRequest};
use crate::models::NoxItem;

use state::{Completion, LoadEvent, Slot, SlotListener};

/// Default capacity of the ready notification channel.
pub const DEFAULT_READY_CAPACITY: usize = 256;

pub struct ItemCache<L: ImageLoader> {
    loader: Arc<L>,
    items: Vec<NoxItem>,
    slots: Vec<Slot>,
    item_size: u32,
    circular: bool,
    default_placeholder: Option<Bitmap>,
    /// Last attempt id handed out. Ids are unique for the cache lifetime.
    last_attempt: u64,
    /// Cancels the requests issued since the last release.
    cancel: CancelToken,
    completion_tx: Sender<Completion>,
    completion_rx: Receiver<Completion>,
    /// Created on the first call to [`ItemCache::ready_events`].
    ready: Option<(Sender<usize>, Receiver<usize>)>,
    ready_capacity: usize,
}

impl<L: ImageLoader> ItemCache<L> {
    pub fn new(loader: Arc<L>, items: Vec<NoxItem>, item_size: u32) -> Self {
        Self::with_options(loader, items, item_size, true, DEFAULT_READY_CAPACITY)
    }

    pub fn with_options(
        loader: Arc<L>,
        items: Vec<NoxItem>,
        item_size: u32,
        circular: bool,
        ready_capacity: usize,
    ) -> Self {
        let (completion_tx, completion_rx) = flume::unbounded();
        let slots = vec![Slot::default(); items.len()];
        Self {
            loader,
            items,
            slots,
            item_size,
            circular,
            default_placeholder: None,
            last_attempt: 0,
            cancel: CancelToken::new(),
            completion_tx,
            completion_rx,
            ready: None,
            ready_capacity: ready_capacity.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn items(&self) -> &[NoxItem] {
        &self.items
    }

    pub fn loader(&self) -> &Arc<L> {
        &self.loader
    }

    /// State of a position, or `None` if it does not exist.
    pub fn state(&self, position: usize) -> Option<ItemState> {
        self.slots.get(position).map(|slot| slot.state)
    }

    /// Number of positions currently waiting on the loader.
    pub fn in_flight(&self) -> usize {
        self.slots
            .iter()
            .filter(|slot| slot.state == ItemState::Loading)
            .count()
    }

    fn slot(&self, position: usize) -> &Slot {
        match self.slots.get(position) {
            Some(slot) => slot,
            None => panic!(
                "position {} is out of range for an item cache of {} items",
                position,
                self.slots.len()
            ),
        }
    }

    /// Starts loading the image for `position` unless it is already loading,
    /// loaded or known to be missing. Returns true if a request was issued.
    ///
    /// # Panics
    ///
    /// Panics if `position` is out of range.
    pub fn ensure_load(&mut self, position: usize) -> bool {
        let state = self.slot(position).state;
        if !state.accepts_load() {
            trace!(position, ?state, "Load suppressed");
            return false;
        }
        self.issue(position)
    }

    /// Issues a new load even for a position marked as missing. Loading and
    /// loaded positions are left alone.
    ///
    /// # Panics
    ///
    /// Panics if `position` is out of range.
    pub fn force_retry(&mut self, position: usize) -> bool {
        match self.slot(position).state {
            ItemState::Loading | ItemState::Loaded => false,
            ItemState::NotLoaded | ItemState::Error | ItemState::ResourceNotFound => {
                self.issue(position)
            }
        }
    }

    /// Calls [`ItemCache::ensure_load`] for every position and returns how
    /// many requests were issued.
    pub fn load_all(&mut self) -> usize {
        (0..self.len()).filter(|&p| self.ensure_load(p)).count()
    }

    fn issue(&mut self, position: usize) -> bool {
        let item = &self.items[position];
        let request = LoadRequest::for_source(item.source())
            .with_placeholder(item.placeholder_id())
            .use_circular_transformation(self.circular)
            .size(self.item_size)
            .with_cancel_token(self.cancel.clone());

        let attempt = self.last_attempt + 1;
        let listener = SlotListener {
            position,
            attempt,
            tx: self.completion_tx.clone(),
        };

        match self.loader.notify(request, Box::new(listener)) {
            Ok(()) => {
                self.last_attempt = attempt;
                let slot = &mut self.slots[position];
                slot.state = ItemState::Loading;
                slot.attempt = attempt;
                debug!(position, attempt, source = %item.source(), "Load issued");
                true
            }
            Err(e) => {
                // The slot keeps its previous state so a later call can retry.
                warn!(position, error = %e, "Image loader rejected request");
                false
            }
        }
    }

    /// # Panics
    ///
    /// Panics if `position` is out of range.
    pub fn is_image_ready(&self, position: usize) -> bool {
        self.slot(position).image.is_some()
    }

    /// The loaded image, if any.
    ///
    /// # Panics
    ///
    /// Panics if `position` is out of range.
    pub fn image(&self, position: usize) -> Option<Bitmap> {
        self.slot(position).image.clone()
    }

    /// True if the item has its own placeholder or a default one is set.
    ///
    /// # Panics
    ///
    /// Panics if `position` is out of range.
    pub fn is_placeholder_ready(&self, position: usize) -> bool {
        self.slot(position).placeholder.is_some() || self.default_placeholder.is_some()
    }

    /// The item's own placeholder, falling back to the shared default.
    ///
    /// # Panics
    ///
    /// Panics if `position` is out of range.
    pub fn placeholder(&self, position: usize) -> Option<Bitmap> {
        self.slot(position)
            .placeholder
            .clone()
            .or_else(|| self.default_placeholder.clone())
    }

    pub fn set_default_placeholder(&mut self, placeholder: Option<Bitmap>) {
        self.default_placeholder = placeholder;
    }

    pub fn default_placeholder(&self) -> Option<&Bitmap> {
        self.default_placeholder.as_ref()
    }

    pub fn pause(&self) {
        self.loader.pause();
    }

    pub fn resume(&self) {
        self.loader.resume();
    }

    /// Cancels every outstanding load issued by this cache. Loading positions
    /// go back to `NotLoaded`; results already applied are kept.
    pub fn release(&mut self) {
        self.cancel.cancel();
        self.cancel = CancelToken::new();
        let mut reset = 0;
        for slot in &mut self.slots {
            if slot.state == ItemState::Loading {
                slot.state = ItemState::NotLoaded;
                slot.attempt = 0;
                reset += 1;
            }
        }
        let dropped = self.completion_rx.drain().count();
        debug!(reset, dropped, "Item cache released");
    }

    /// Replaces the item list. Positions that exist in both lists keep their
    /// state, including loads in flight; new positions start `NotLoaded`.
    pub fn resize(&mut self, items: Vec<NoxItem>) {
        let old_len = self.slots.len();
        self.slots.resize_with(items.len(), Slot::default);
        self.items = items;
        debug!(old_len, new_len = self.slots.len(), "Item cache resized");
    }

    /// Receiver of positions whose image or placeholder changed.
    ///
    /// Notifications are only queued once a receiver has been requested.
    /// Owners that consume the return value of [`ItemCache::poll`] instead
    /// never pay for the channel.
    pub fn ready_events(&mut self) -> Receiver<usize> {
        let capacity = self.ready_capacity;
        let (_, rx) = self.ready.get_or_insert_with(|| flume::bounded(capacity));
        rx.clone()
    }

    /// Notifications queued on the ready channel and not received yet.
    pub fn pending_ready(&self) -> usize {
        self.ready.as_ref().map_or(0, |(tx, _)| tx.len())
    }

    /// Applies every loader result received so far and returns the affected
    /// positions in arrival order.
    pub fn poll(&mut self) -> Vec<usize> {
        let mut ready = Vec::new();
        loop {
            match self.completion_rx.try_recv() {
                Ok(completion) => {
                    if let Some(position) = self.apply(completion) {
                        ready.push(position);
                    }
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        ready
    }

    fn apply(&mut self, completion: Completion) -> Option<usize> {
        let Completion {
            position,
            attempt,
            event,
        } = completion;
        let current = self.slots.get(position).map(|slot| slot.attempt);
        if current != Some(attempt) {
            trace!(position, attempt, ?current, "Dropping stale load result");
            return None;
        }
        let applied = match event {
            LoadEvent::Placeholder(bitmap) => self.on_placeholder_ready(position, bitmap),
            LoadEvent::Image(bitmap) => self.on_image_ready(position, bitmap),
            LoadEvent::Error => self.on_error(position),
            LoadEvent::NotFound => self.on_resource_not_found(position),
        };
        applied.then_some(position)
    }

    fn is_loading(&self, position: usize) -> bool {
        self.state(position) == Some(ItemState::Loading)
    }

    /// Attaches a placeholder to a loading position. Returns true if applied.
    pub fn on_placeholder_ready(&mut self, position: usize, placeholder: Bitmap) -> bool {
        if !self.is_loading(position) {
            return false;
        }
        self.slots[position].placeholder = Some(placeholder);
        trace!(position, "Placeholder ready");
        self.notify_ready(position);
        true
    }

    /// Stores the image of a loading position and marks it `Loaded`.
    pub fn on_image_ready(&mut self, position: usize, image: Bitmap) -> bool {
        if !self.is_loading(position) {
            return false;
        }
        let slot = &mut self.slots[position];
        slot.image = Some(image);
        self.finish(position, ItemState::Loaded);
        true
    }

    /// Marks a loading position as failed; a later load may retry it.
    pub fn on_error(&mut self, position: usize) -> bool {
        if !self.is_loading(position) {
            return false;
        }
        self.finish(position, ItemState::Error);
        true
    }

    /// Marks a loading position as missing for good.
    pub fn on_resource_not_found(&mut self, position: usize) -> bool {
        if !self.is_loading(position) {
            return false;
        }
        self.finish(position, ItemState::ResourceNotFound);
        true
    }

    fn finish(&mut self, position: usize, state: ItemState) {
        let slot = &mut self.slots[position];
        slot.state = state;
        slot.attempt = 0;
        debug!(position, ?state, "Load finished");
        self.notify_ready(position);
    }

    fn notify_ready(&self, position: usize) {
        let Some((tx, _)) = &self.ready else {
            return;
        };
        match tx.try_send(position) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                warn!(position, "Ready channel full, dropping notification");
            }
            Err(TrySendError::Disconnected(_)) => {}
        }
    }
}

impl<L: ImageLoader> Drop for ItemCache<L> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::thread;
    use std::time::{Duration, Instant};

    use image::{Rgba, RgbaImage};
    use tempfile::tempdir;

    use super::*;
    use crate::loader::decoder::encode_png;
    use crate::loader::{FsFetcher, WorkerImageLoader};
    use crate::models::ResourceId;
    use crate::testing::{bitmap, FakeImageLoader};

    fn items(count: usize) -> Vec<NoxItem> {
        (0..count)
            .map(|i| NoxItem::from_url(format!("https://example.com/{}.png", i)).unwrap())
            .collect()
    }

    fn cache(count: usize) -> (Arc<FakeImageLoader>, ItemCache<FakeImageLoader>) {
        let loader = Arc::new(FakeImageLoader::new());
        let cache = ItemCache::new(loader.clone(), items(count), 64);
        (loader, cache)
    }

    #[test]
    fn test_ensure_load_issues_single_request() {
        let (loader, mut cache) = cache(3);
        assert!(cache.ensure_load(1));
        assert!(!cache.ensure_load(1));
        assert_eq!(loader.request_count(), 1);
        assert_eq!(cache.state(1), Some(ItemState::Loading));
        assert_eq!(cache.in_flight(), 1);

        let request = loader.request(0);
        assert_eq!(
            request.source().map(|s| s.to_string()),
            Some("https://example.com/1.png".to_string())
        );
        assert_eq!(request.pixel_size(), 64);
        assert!(request.is_circular());
    }

    #[test]
    fn test_request_carries_item_placeholder() {
        let loader = Arc::new(FakeImageLoader::new());
        let items = vec![NoxItem::from_resource(ResourceId(4)).with_placeholder(ResourceId(9))];
        let mut cache = ItemCache::with_options(loader.clone(), items, 32, false, 8);
        cache.ensure_load(0);
        let request = loader.request(0);
        assert_eq!(request.placeholder(), Some(ResourceId(9)));
        assert!(!request.is_circular());
    }

    #[test]
    fn test_image_completion_marks_loaded() {
        let (loader, mut cache) = cache(2);
        cache.ensure_load(0);
        let image = bitmap(4);
        loader.complete_image(0, image.clone());

        assert!(!cache.is_image_ready(0));
        assert_eq!(cache.poll(), vec![0]);
        assert_eq!(cache.state(0), Some(ItemState::Loaded));
        assert!(cache.is_image_ready(0));
        assert!(cache.image(0).unwrap().ptr_eq(&image));
        assert_eq!(cache.in_flight(), 0);

        assert!(!cache.ensure_load(0));
        assert_eq!(loader.request_count(), 1);
    }

    #[test]
    fn test_placeholder_keeps_loading_state() {
        let (loader, mut cache) = cache(1);
        cache.ensure_load(0);
        loader.complete_placeholder(0, bitmap(2));
        assert_eq!(cache.poll(), vec![0]);
        assert_eq!(cache.state(0), Some(ItemState::Loading));
        assert!(cache.is_placeholder_ready(0));
        assert!(!cache.is_image_ready(0));
    }

    #[test]
    fn test_error_allows_retry() {
        let (loader, mut cache) = cache(1);
        cache.ensure_load(0);
        loader.fail(0);
        cache.poll();
        assert_eq!(cache.state(0), Some(ItemState::Error));

        assert!(cache.ensure_load(0));
        assert_eq!(loader.request_count(), 2);
        assert_eq!(cache.state(0), Some(ItemState::Loading));
    }

    #[test]
    fn test_not_found_is_not_retried() {
        let (loader, mut cache) = cache(1);
        cache.ensure_load(0);
        loader.not_found(0);
        cache.poll();
        assert_eq!(cache.state(0), Some(ItemState::ResourceNotFound));

        assert!(!cache.ensure_load(0));
        assert_eq!(loader.request_count(), 1);

        assert!(cache.force_retry(0));
        assert_eq!(loader.request_count(), 2);
        assert_eq!(cache.state(0), Some(ItemState::Loading));
    }

    #[test]
    fn test_rejected_request_keeps_state() {
        let (loader, mut cache) = cache(1);
        loader.reject_next();
        assert!(!cache.ensure_load(0));
        assert_eq!(cache.state(0), Some(ItemState::NotLoaded));
        assert!(cache.ensure_load(0));
    }

    #[test]
    fn test_resize_preserves_existing_state() {
        let (loader, mut cache) = cache(10);
        cache.ensure_load(3);
        loader.complete_image(0, bitmap(2));
        cache.poll();
        assert_eq!(cache.state(3), Some(ItemState::Loaded));

        cache.resize(items(5));
        assert_eq!(cache.len(), 5);
        assert_eq!(cache.state(3), Some(ItemState::Loaded));
        assert!(cache.is_image_ready(3));

        cache.resize(items(2));
        assert_eq!(cache.state(3), None);
    }

    #[test]
    fn test_resize_keeps_in_flight_loads() {
        let (loader, mut cache) = cache(4);
        cache.ensure_load(1);
        cache.resize(items(8));
        assert_eq!(cache.state(1), Some(ItemState::Loading));
        assert_eq!(cache.state(7), Some(ItemState::NotLoaded));

        loader.complete_image(0, bitmap(2));
        assert_eq!(cache.poll(), vec![1]);
        assert_eq!(cache.state(1), Some(ItemState::Loaded));
    }

    #[test]
    fn test_result_for_truncated_position_is_ignored() {
        let (loader, mut cache) = cache(4);
        cache.ensure_load(3);
        cache.resize(items(2));
        cache.resize(items(4));
        loader.complete_image(0, bitmap(2));
        assert!(cache.poll().is_empty());
        assert_eq!(cache.state(3), Some(ItemState::NotLoaded));
    }

    #[test]
    fn test_release_resets_loading_and_ignores_late_results() {
        let (loader, mut cache) = cache(3);
        cache.ensure_load(0);
        cache.ensure_load(1);
        loader.complete_image(0, bitmap(2));
        cache.poll();

        cache.release();
        assert_eq!(loader.cancel_count(), 0);
        assert!(loader.request(1).is_cancelled());
        assert_eq!(cache.state(0), Some(ItemState::Loaded));
        assert_eq!(cache.state(1), Some(ItemState::NotLoaded));

        loader.complete_image(1, bitmap(2));
        assert!(cache.poll().is_empty());
        assert_eq!(cache.state(1), Some(ItemState::NotLoaded));

        assert!(cache.ensure_load(1));
        assert_eq!(loader.request_count(), 3);
        assert!(!loader.request(2).is_cancelled());
    }

    #[test]
    fn test_stale_attempt_is_ignored() {
        let (loader, mut cache) = cache(1);
        cache.ensure_load(0);
        loader.fail(0);
        cache.poll();
        cache.ensure_load(0);

        // A second result for the first attempt must not finish the retry.
        loader.complete_image(0, bitmap(2));
        assert!(cache.poll().is_empty());
        assert_eq!(cache.state(0), Some(ItemState::Loading));

        loader.complete_image(1, bitmap(2));
        assert_eq!(cache.poll(), vec![0]);
        assert_eq!(cache.state(0), Some(ItemState::Loaded));
    }

    #[test]
    fn test_default_placeholder_is_shared() {
        let (_loader, mut cache) = cache(2);
        assert!(!cache.is_placeholder_ready(1));
        assert!(cache.placeholder(1).is_none());

        let default = bitmap(3);
        cache.set_default_placeholder(Some(default.clone()));
        assert!(cache.is_placeholder_ready(0));
        assert!(cache.placeholder(0).unwrap().ptr_eq(&default));
        assert!(cache.placeholder(1).unwrap().ptr_eq(&default));
    }

    #[test]
    fn test_item_placeholder_wins_over_default() {
        let (loader, mut cache) = cache(1);
        cache.set_default_placeholder(Some(bitmap(3)));
        cache.ensure_load(0);
        let own = bitmap(5);
        loader.complete_placeholder(0, own.clone());
        cache.poll();
        assert!(cache.placeholder(0).unwrap().ptr_eq(&own));
    }

    #[test]
    fn test_ready_events_report_positions() {
        let (loader, mut cache) = cache(3);
        let events = cache.ready_events();
        cache.ensure_load(2);
        cache.ensure_load(0);
        loader.complete_image(0, bitmap(2));
        loader.fail(1);
        cache.poll();
        let received: Vec<usize> = events.try_iter().collect();
        assert_eq!(received, vec![2, 0]);
    }

    #[test]
    fn test_full_ready_channel_drops_notifications() {
        let loader = Arc::new(FakeImageLoader::new());
        let mut cache = ItemCache::with_options(loader.clone(), items(3), 16, true, 1);
        let events = cache.ready_events();
        assert_eq!(cache.load_all(), 3);
        for i in 0..3 {
            loader.complete_image(i, bitmap(2));
        }
        assert_eq!(cache.poll(), vec![0, 1, 2]);
        assert_eq!(events.try_iter().count(), 1);
    }

    #[test]
    fn test_ready_channel_stays_empty_without_receiver() {
        let loader = Arc::new(FakeImageLoader::new());
        let mut cache = ItemCache::with_options(loader.clone(), items(5), 16, true, 2);
        cache.load_all();
        for i in 0..5 {
            loader.complete_image(i, bitmap(2));
        }
        assert_eq!(cache.poll(), vec![0, 1, 2, 3, 4]);
        assert_eq!(cache.pending_ready(), 0);

        let events = cache.ready_events();
        cache.resize(items(6));
        cache.ensure_load(5);
        loader.complete_image(5, bitmap(2));
        cache.poll();
        assert_eq!(cache.pending_ready(), 1);
        assert_eq!(events.try_recv(), Ok(5));
        assert_eq!(cache.pending_ready(), 0);
    }

    fn worker_loader(dir: &Path) -> Arc<WorkerImageLoader> {
        let path = dir.join("item.png");
        let img = RgbaImage::from_pixel(8, 8, Rgba([10, 20, 30, 255]));
        std::fs::write(&path, encode_png(&img)).unwrap();
        let fetcher = FsFetcher::new().with_resource(ResourceId(1), path);
        let loader = WorkerImageLoader::builder()
            .workers(1)
            .fetcher(fetcher)
            .build()
            .unwrap();
        Arc::new(loader)
    }

    fn wait_until_settled(cache: &mut ItemCache<WorkerImageLoader>, position: usize) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while cache.state(position) == Some(ItemState::Loading) && Instant::now() < deadline {
            cache.poll();
            thread::sleep(Duration::from_millis(10));
        }
    }

    #[test]
    fn test_dropping_one_cache_keeps_loads_of_another() {
        let dir = tempdir().unwrap();
        let loader = worker_loader(dir.path());
        let items = vec![NoxItem::from_resource(ResourceId(1))];
        loader.pause();

        let mut dropped = ItemCache::new(loader.clone(), items.clone(), 8);
        let mut kept = ItemCache::new(loader.clone(), items, 8);
        assert!(dropped.ensure_load(0));
        assert!(kept.ensure_load(0));
        drop(dropped);
        loader.resume();

        wait_until_settled(&mut kept, 0);
        assert_eq!(kept.state(0), Some(ItemState::Loaded));
        assert!(kept.is_image_ready(0));
    }

    #[test]
    fn test_releasing_one_cache_keeps_loads_of_another() {
        let dir = tempdir().unwrap();
        let loader = worker_loader(dir.path());
        let items = vec![NoxItem::from_resource(ResourceId(1))];
        loader.pause();

        let mut released = ItemCache::new(loader.clone(), items.clone(), 8);
        let mut kept = ItemCache::new(loader.clone(), items, 8);
        released.ensure_load(0);
        kept.ensure_load(0);
        released.release();
        loader.resume();

        wait_until_settled(&mut kept, 0);
        assert_eq!(kept.state(0), Some(ItemState::Loaded));

        thread::sleep(Duration::from_millis(100));
        assert!(released.poll().is_empty());
        assert_eq!(released.state(0), Some(ItemState::NotLoaded));
        assert!(released.ensure_load(0));
    }

    #[test]
    fn test_pause_and_resume_are_forwarded() {
        let (loader, cache) = cache(1);
        cache.pause();
        assert!(loader.is_paused());
        cache.resume();
        assert!(!loader.is_paused());
        assert_eq!(cache.state(0), Some(ItemState::NotLoaded));
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn test_out_of_range_position_panics() {
        let (_loader, mut cache) = cache(2);
        cache.ensure_load(2);
    }
}
