use flume::Sender;

use crate::loader::{Bitmap, LoadListener};

/// Load progress of one position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ItemState {
    #[default]
    NotLoaded,
    Loading,
    Loaded,
    /// Transient failure; a later load attempt may succeed.
    Error,
    /// The source does not exist; not retried unless forced.
    ResourceNotFound,
}

impl ItemState {
    /// States from which a regular load attempt may start.
    pub fn accepts_load(self) -> bool {
        matches!(self, Self::NotLoaded | Self::Error)
    }
}

/// Everything the cache tracks for one position.
#[derive(Debug, Clone, Default)]
pub(crate) struct Slot {
    pub state: ItemState,
    /// Attempt currently allowed to complete this slot; zero when none is.
    pub attempt: u64,
    pub image: Option<Bitmap>,
    pub placeholder: Option<Bitmap>,
}

#[derive(Debug)]
pub(crate) enum LoadEvent {
    Placeholder(Bitmap),
    Image(Bitmap),
    Error,
    NotFound,
}

#[derive(Debug)]
pub(crate) struct Completion {
    pub position: usize,
    pub attempt: u64,
    pub event: LoadEvent,
}

/// Listener handed to the loader for one attempt. Results are queued and
/// applied when the cache owner polls, never from the loader's thread.
pub(crate) struct SlotListener {
    pub position: usize,
    pub attempt: u64,
    pub tx: Sender<Completion>,
}

impl SlotListener {
    fn send(&self, event: LoadEvent) {
        // The cache may be gone already; its results are no longer wanted.
        let _ = self.tx.send(Completion {
            position: self.position,
            attempt: self.attempt,
            event,
        });
    }
}

impl LoadListener for SlotListener {
    fn on_placeholder_loaded(&self, placeholder: Bitmap) {
        self.send(LoadEvent::Placeholder(placeholder));
    }

    fn on_image_loaded(&self, image: Bitmap) {
        self.send(LoadEvent::Image(image));
    }

    fn on_error(&self) {
        self.send(LoadEvent::Error);
    }

    fn on_resource_not_found(&self) {
        self.send(LoadEvent::NotFound);
    }
}
