//! Worker pool implementation of [`ImageLoader`].
//!
//! - Bounded worker pool (1-4 threads) fetching and preparing bitmaps
//! - Placeholder delivered before the image when the request names one
//! - Pause holds workers before they start a job; cancel drops queued jobs
//! - Uses flume for communication between callers and workers

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use flume::{Receiver, Sender};
use parking_lot::{Condvar, Mutex};
use tracing::{debug, error, trace, warn};

use super::bitmap_cache::{BitmapCache, DEFAULT_MAX_MEMORY_MB};
use super::fetch::{Fetcher, FsFetcher};
use super::{ImageLoader, LoadListener, LoadRequest, LoaderError};
use crate::models::ImageSource;

/// Default number of worker threads.
const DEFAULT_WORKERS: usize = 2;

/// Maximum number of worker threads.
const MAX_WORKERS: usize = 4;

/// Maximum number of pending requests in the queue.
const MAX_QUEUE_SIZE: usize = 256;

/// How long an idle or paused worker sleeps before checking for shutdown.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

struct Job {
    request: LoadRequest,
    listener: Box<dyn LoadListener>,
    generation: u64,
}

/// Pause flag workers block on before starting a job.
#[derive(Default)]
struct PauseGate {
    paused: Mutex<bool>,
    resumed: Condvar,
}

impl PauseGate {
    /// Sets the flag, waking every blocked worker when it is cleared.
    fn set(&self, paused: bool) {
        *self.paused.lock() = paused;
        if !paused {
            self.resumed.notify_all();
        }
    }

    /// Blocks while paused. Returns false if shutdown was requested meanwhile.
    fn wait(&self, shutdown: &AtomicBool) -> bool {
        let mut paused = self.paused.lock();
        while *paused {
            if shutdown.load(Ordering::Relaxed) {
                return false;
            }
            self.resumed.wait_for(&mut paused, POLL_INTERVAL);
        }
        true
    }
}

/// State shared by every worker thread.
struct Shared {
    cache: BitmapCache,
    fetcher: Arc<dyn Fetcher>,
    shutdown: AtomicBool,
    generation: AtomicU64,
    gate: PauseGate,
}

impl Shared {
    /// False once the job was cancelled, either loader-wide through
    /// `cancel_all` or by its own cancel token.
    fn is_current(&self, job: &Job) -> bool {
        job.generation == self.generation.load(Ordering::SeqCst) && !job.request.is_cancelled()
    }
}

/// Loads images on a pool of worker threads.
///
/// Results are delivered on the worker thread that produced them.
pub struct WorkerImageLoader {
    request_tx: Sender<Job>,
    workers: Vec<JoinHandle<()>>,
    shared: Arc<Shared>,
}

impl WorkerImageLoader {
    /// Spawns the worker threads. The count is clamped to 1..=4.
    pub fn new(workers: usize, cache: BitmapCache, fetcher: Arc<dyn Fetcher>) -> Self {
        let num_workers = workers.clamp(1, MAX_WORKERS);
        let (request_tx, request_rx) = flume::bounded(MAX_QUEUE_SIZE);

        let shared = Arc::new(Shared {
            cache,
            fetcher,
            shutdown: AtomicBool::new(false),
            generation: AtomicU64::new(0),
            gate: PauseGate::default(),
        });

        let mut handles = Vec::with_capacity(num_workers);
        for worker_id in 0..num_workers {
            let rx = request_rx.clone();
            let shared = Arc::clone(&shared);
            let spawned = thread::Builder::new()
                .name(format!("nox-loader-{}", worker_id))
                .spawn(move || worker_loop(worker_id, rx, shared));
            match spawned {
                Ok(handle) => handles.push(handle),
                Err(e) => error!(worker_id, error = ?e, "Failed to spawn image loader worker"),
            }
        }

        debug!(num_workers = handles.len(), "Started image loader workers");

        Self {
            request_tx,
            workers: handles,
            shared,
        }
    }

    /// Creates a builder for configuring the loader.
    pub fn builder() -> WorkerImageLoaderBuilder {
        WorkerImageLoaderBuilder::new()
    }

    /// Bitmap cache shared by all workers.
    pub fn cache(&self) -> &BitmapCache {
        &self.shared.cache
    }

    /// Number of worker threads actually running.
    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Stops all workers and waits for them to finish their current job.
    /// Later requests fail with [`LoaderError::Disconnected`].
    pub fn shutdown(&mut self) {
        debug!("Shutting down image loader");
        self.shared.shutdown.store(true, Ordering::SeqCst);
        self.shared.gate.set(false);
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
        debug!("Image loader shutdown complete");
    }
}

impl ImageLoader for WorkerImageLoader {
    fn notify(
        &self,
        request: LoadRequest,
        listener: Box<dyn LoadListener>,
    ) -> Result<(), LoaderError> {
        request.validate()?;
        if self.workers.is_empty() {
            return Err(LoaderError::Disconnected);
        }

        let job = Job {
            request,
            listener,
            generation: self.shared.generation.load(Ordering::SeqCst),
        };
        match self.request_tx.try_send(job) {
            Ok(()) => Ok(()),
            Err(flume::TrySendError::Full(_)) => {
                warn!("Image loader queue full, dropping request");
                Err(LoaderError::QueueFull)
            }
            Err(flume::TrySendError::Disconnected(_)) => {
                error!("Image loader queue disconnected");
                Err(LoaderError::Disconnected)
            }
        }
    }

    fn pause(&self) {
        trace!("Pausing image loader");
        self.shared.gate.set(true);
    }

    fn resume(&self) {
        trace!("Resuming image loader");
        self.shared.gate.set(false);
    }

    fn cancel_all(&self) {
        let generation = self.shared.generation.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(generation, "Cancelled all pending image requests");
    }
}

impl Drop for WorkerImageLoader {
    fn drop(&mut self) {
        if !self.shared.shutdown.load(Ordering::Relaxed) {
            self.shutdown();
        }
    }
}

/// Main loop for a worker thread.
fn worker_loop(worker_id: usize, rx: Receiver<Job>, shared: Arc<Shared>) {
    debug!(worker_id, "Image loader worker started");

    loop {
        if shared.shutdown.load(Ordering::Relaxed) {
            break;
        }

        match rx.recv_timeout(POLL_INTERVAL) {
            Ok(job) => {
                if !shared.gate.wait(&shared.shutdown) {
                    break;
                }
                process_job(&job, &shared);
            }
            Err(flume::RecvTimeoutError::Timeout) => continue,
            Err(flume::RecvTimeoutError::Disconnected) => break,
        }
    }

    debug!(worker_id, "Image loader worker stopped");
}

/// Resolves one request and reports to its listener unless it was cancelled.
fn process_job(job: &Job, shared: &Shared) {
    if !shared.is_current(job) {
        trace!("Skipping cancelled image request");
        return;
    }

    let size = job.request.pixel_size();
    let fetcher = shared.fetcher.as_ref();

    if let Some(placeholder_id) = job.request.placeholder() {
        let source = ImageSource::Local(placeholder_id);
        match shared.cache.get_or_prepare(&source, size, false, fetcher) {
            Ok(placeholder) if shared.is_current(job) => {
                job.listener.on_placeholder_loaded(placeholder)
            }
            Ok(_) => return,
            Err(e) => warn!(%source, error = %e, "Failed to load placeholder"),
        }
    }

    let Some(source) = job.request.source() else {
        job.listener.on_error();
        return;
    };

    let result = shared
        .cache
        .get_or_prepare(&source, size, job.request.is_circular(), fetcher);
    if !shared.is_current(job) {
        trace!(%source, "Dropping result of cancelled image request");
        return;
    }

    match result {
        Ok(bitmap) => job.listener.on_image_loaded(bitmap),
        Err(e) if e.is_not_found() => {
            debug!(%source, "Image resource not found");
            job.listener.on_resource_not_found();
        }
        Err(e) => {
            warn!(%source, error = %e, "Failed to load image");
            job.listener.on_error();
        }
    }
}

/// Builder for WorkerImageLoader with configuration options.
pub struct WorkerImageLoaderBuilder {
    workers: usize,
    max_memory_mb: usize,
    cache_dir: Option<std::path::PathBuf>,
    use_default_cache_dir: bool,
    fetcher: Option<Arc<dyn Fetcher>>,
}

impl WorkerImageLoaderBuilder {
    /// Builder with two workers, the default memory budget and no disk layer.
    pub fn new() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            max_memory_mb: DEFAULT_MAX_MEMORY_MB,
            cache_dir: None,
            use_default_cache_dir: false,
            fetcher: None,
        }
    }

    /// Sets the number of worker threads (clamped to 1..=4).
    pub fn workers(mut self, count: usize) -> Self {
        self.workers = count;
        self
    }

    /// Sets the memory cache budget in megabytes (clamped to 16..=512).
    pub fn max_memory_mb(mut self, mb: usize) -> Self {
        self.max_memory_mb = mb;
        self
    }

    /// Persist bitmaps under the given directory.
    pub fn cache_dir(mut self, dir: std::path::PathBuf) -> Self {
        self.cache_dir = Some(dir);
        self
    }

    /// Persist bitmaps under the XDG cache directory.
    pub fn default_cache_dir(mut self) -> Self {
        self.use_default_cache_dir = true;
        self
    }

    /// Replaces the default [`FsFetcher`].
    pub fn fetcher(mut self, fetcher: impl Fetcher + 'static) -> Self {
        self.fetcher = Some(Arc::new(fetcher));
        self
    }

    /// Builds the loader and starts its workers. Fails only when the default
    /// cache directory cannot be determined.
    pub fn build(self) -> anyhow::Result<WorkerImageLoader> {
        let cache = match self.cache_dir {
            Some(dir) => BitmapCache::new(Some(dir), self.max_memory_mb),
            None if self.use_default_cache_dir => BitmapCache::new_default(self.max_memory_mb)?,
            None => BitmapCache::in_memory(self.max_memory_mb),
        };
        let fetcher = self
            .fetcher
            .unwrap_or_else(|| Arc::new(FsFetcher::new()) as Arc<dyn Fetcher>);

        Ok(WorkerImageLoader::new(self.workers, cache, fetcher))
    }
}

impl Default for WorkerImageLoaderBuilder {
    fn default() -> Self {
        Self::new()
    }
}
