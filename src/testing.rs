//! Test doubles shared by the unit tests.

use image::{Rgba, RgbaImage};
use parking_lot::Mutex;

use crate::loader::{Bitmap, ImageLoader, LoadListener, LoadRequest, LoaderError};

pub(crate) fn bitmap(side: u32) -> Bitmap {
    Bitmap::new(RgbaImage::from_pixel(side, side, Rgba([20, 40, 60, 255])))
}

#[derive(Default)]
struct FakeState {
    requests: Vec<(LoadRequest, Box<dyn LoadListener>)>,
    paused: bool,
    cancel_count: usize,
    reject_next: bool,
}

/// Loader that records requests and lets the test complete them by hand.
#[derive(Default)]
pub(crate) struct FakeImageLoader {
    state: Mutex<FakeState>,
}

impl FakeImageLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_count(&self) -> usize {
        self.state.lock().requests.len()
    }

    pub fn request(&self, index: usize) -> LoadRequest {
        self.state.lock().requests[index].0.clone()
    }

    /// Makes the next `notify` call fail with a full queue.
    pub fn reject_next(&self) {
        self.state.lock().reject_next = true;
    }

    pub fn is_paused(&self) -> bool {
        self.state.lock().paused
    }

    pub fn cancel_count(&self) -> usize {
        self.state.lock().cancel_count
    }

    fn with_listener(&self, index: usize, f: impl FnOnce(&dyn LoadListener)) {
        let state = self.state.lock();
        f(state.requests[index].1.as_ref());
    }

    pub fn complete_placeholder(&self, index: usize, placeholder: Bitmap) {
        self.with_listener(index, |l| l.on_placeholder_loaded(placeholder));
    }

    pub fn complete_image(&self, index: usize, image: Bitmap) {
        self.with_listener(index, |l| l.on_image_loaded(image));
    }

    pub fn fail(&self, index: usize) {
        self.with_listener(index, |l| l.on_error());
    }

    pub fn not_found(&self, index: usize) {
        self.with_listener(index, |l| l.on_resource_not_found());
    }
}

impl ImageLoader for FakeImageLoader {
    fn notify(
        &self,
        request: LoadRequest,
        listener: Box<dyn LoadListener>,
    ) -> Result<(), LoaderError> {
        request.validate()?;
        let mut state = self.state.lock();
        if std::mem::take(&mut state.reject_next) {
            return Err(LoaderError::QueueFull);
        }
        state.requests.push((request, listener));
        Ok(())
    }

    fn pause(&self) {
        self.state.lock().paused = true;
    }

    fn resume(&self) {
        self.state.lock().paused = false;
    }

    fn cancel_all(&self) {
        self.state.lock().cancel_count += 1;
    }
}
