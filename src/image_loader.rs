//! Background image loading with a shared cache and a loading manager.
//!
//! Loads decode on a worker thread. Results are delivered to callbacks on the
//! caller's thread when it calls [`ImageLoader::poll`], typically once per frame
//! before the render queue executes:
//!
//! ```no_run
//! use multipass::ImageLoader;
//!
//! let mut loader = ImageLoader::new().with_path("assets/");
//! loader.load(
//!     "noise.png",
//!     |image| println!("{}x{}", image.width(), image.height()),
//!     |err| eprintln!("{err}"),
//! );
//!
//! // Every frame:
//! loader.poll();
//! ```

use crate::error::ImageError;
use image::RgbaImage;
use std::cell::RefCell;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::thread;

/// A decoded image shared between the cache and load callbacks.
pub type ImageRef = Rc<RgbaImage>;

type OnLoad = Box<dyn FnOnce(ImageRef)>;
type OnError = Box<dyn FnOnce(&ImageError)>;

/// Reads and decodes one file on a worker thread.
pub type Decoder = fn(&Path) -> Result<RgbaImage, ImageError>;

/// Decoded images keyed by resolved path. Clones share the same storage.
#[derive(Clone, Default)]
pub struct ImageCache {
    images: Rc<RefCell<HashMap<String, ImageRef>>>,
}

impl ImageCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<ImageRef> {
        self.images.borrow().get(key).cloned()
    }

    pub fn insert(&self, key: impl Into<String>, image: ImageRef) {
        self.images.borrow_mut().insert(key.into(), image);
    }

    pub fn remove(&self, key: &str) -> Option<ImageRef> {
        self.images.borrow_mut().remove(key)
    }

    pub fn clear(&self) {
        self.images.borrow_mut().clear();
    }

    pub fn len(&self) -> usize {
        self.images.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.borrow().is_empty()
    }
}

impl std::fmt::Debug for ImageCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.images.borrow().keys()).finish()
    }
}

#[derive(Debug, Default)]
struct LoadingState {
    started: usize,
    finished: usize,
    failed: Vec<String>,
}

/// Counts items across every loader sharing it. Clones share the same counters.
#[derive(Clone, Debug, Default)]
pub struct LoadingManager {
    state: Rc<RefCell<LoadingState>>,
}

impl LoadingManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn item_start(&self, url: &str) {
        log::trace!("[loading] Started '{}'", url);
        self.state.borrow_mut().started += 1;
    }

    pub fn item_end(&self, url: &str) {
        log::trace!("[loading] Finished '{}'", url);
        self.state.borrow_mut().finished += 1;
    }

    pub fn item_error(&self, url: &str) {
        self.state.borrow_mut().failed.push(url.to_owned());
    }

    /// Items started so far.
    pub fn items_total(&self) -> usize {
        self.state.borrow().started
    }

    /// Items finished so far, successfully or not.
    pub fn items_loaded(&self) -> usize {
        self.state.borrow().finished
    }

    /// Urls of items that failed, in the order they failed.
    pub fn errors(&self) -> Vec<String> {
        self.state.borrow().failed.clone()
    }

    pub fn is_loading(&self) -> bool {
        let state = self.state.borrow();
        state.finished < state.started
    }
}

struct Completion {
    id: u64,
    result: Result<RgbaImage, ImageError>,
}

struct Request {
    url: String,
    on_load: OnLoad,
    on_error: OnError,
}

/// Loads images from disk on worker threads.
pub struct ImageLoader {
    path: Option<PathBuf>,
    cache: ImageCache,
    manager: LoadingManager,
    decoder: Decoder,
    sender: flume::Sender<Completion>,
    receiver: flume::Receiver<Completion>,
    pending: HashMap<u64, Request>,
    hits: Vec<(String, ImageRef, OnLoad)>,
    next_id: u64,
}

impl Default for ImageLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ImageLoader {
    pub fn new() -> Self {
        let (sender, receiver) = flume::unbounded();
        Self {
            path: None,
            cache: ImageCache::new(),
            manager: LoadingManager::new(),
            decoder: decode,
            sender,
            receiver,
            pending: HashMap::new(),
            hits: Vec::new(),
            next_id: 0,
        }
    }

    /// Prefix prepended to every url passed to [`load`](Self::load).
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Share `cache` with other loaders.
    pub fn with_cache(mut self, cache: ImageCache) -> Self {
        self.cache = cache;
        self
    }

    /// Share `manager` with other loaders.
    pub fn with_manager(mut self, manager: LoadingManager) -> Self {
        self.manager = manager;
        self
    }

    /// Replace the function that turns a file into pixels.
    ///
    /// A decoder that panics fails its load with [`ImageError::WorkerPanicked`].
    pub fn with_decoder(mut self, decoder: Decoder) -> Self {
        self.decoder = decoder;
        self
    }

    pub fn cache(&self) -> &ImageCache {
        &self.cache
    }

    pub fn manager(&self) -> &LoadingManager {
        &self.manager
    }

    /// Requests whose callbacks have not run yet.
    pub fn pending(&self) -> usize {
        self.pending.len() + self.hits.len()
    }

    fn resolve(&self, url: &str) -> PathBuf {
        match &self.path {
            Some(prefix) => prefix.join(url),
            None => PathBuf::from(url),
        }
    }

    /// Start loading `url`.
    ///
    /// On a cache hit the cached image is returned immediately, but `on_load`
    /// still only runs on the next [`poll`](Self::poll). On a miss the file is
    /// read and decoded on a worker thread and `None` is returned.
    pub fn load(
        &mut self,
        url: &str,
        on_load: impl FnOnce(ImageRef) + 'static,
        on_error: impl FnOnce(&ImageError) + 'static,
    ) -> Option<ImageRef> {
        let path = self.resolve(url);
        let key = path.to_string_lossy().into_owned();
        self.manager.item_start(&key);

        if let Some(image) = self.cache.get(&key) {
            log::debug!("[image-loader] Cache hit for '{}'", key);
            self.hits.push((key, image.clone(), Box::new(on_load)));
            return Some(image);
        }

        let id = self.next_id;
        self.next_id += 1;
        self.pending.insert(
            id,
            Request {
                url: key,
                on_load: Box::new(on_load),
                on_error: Box::new(on_error),
            },
        );

        let sender = self.sender.clone();
        let decoder = self.decoder;
        thread::spawn(move || {
            let result = panic::catch_unwind(AssertUnwindSafe(|| decoder(&path)))
                .unwrap_or(Err(ImageError::WorkerPanicked));
            // The loader may have been dropped; nobody is waiting then.
            let _ = sender.send(Completion { id, result });
        });

        None
    }

    /// Deliver finished loads. Returns how many callbacks ran.
    pub fn poll(&mut self) -> usize {
        let mut delivered = 0;

        for (url, image, on_load) in std::mem::take(&mut self.hits) {
            on_load(image);
            self.manager.item_end(&url);
            delivered += 1;
        }

        while let Ok(completion) = self.receiver.try_recv() {
            self.complete(completion);
            delivered += 1;
        }

        delivered
    }

    /// Block until every outstanding load is delivered.
    ///
    /// Every worker reports back, including one whose decoder panicked.
    pub fn wait(&mut self) -> usize {
        let mut delivered = self.poll();
        while !self.pending.is_empty() {
            let Ok(completion) = self.receiver.recv() else {
                break;
            };
            self.complete(completion);
            delivered += 1;
        }
        delivered
    }

    fn complete(&mut self, completion: Completion) {
        let Some(request) = self.pending.remove(&completion.id) else {
            return;
        };

        match completion.result {
            Ok(image) => {
                log::debug!(
                    "[image-loader] Loaded '{}' ({}x{})",
                    request.url,
                    image.width(),
                    image.height()
                );
                let image = Rc::new(image);
                self.cache.insert(request.url.clone(), image.clone());
                (request.on_load)(image);
            }
            Err(err) => {
                log::warn!("[image-loader] Failed to load '{}': {}", request.url, err);
                (request.on_error)(&err);
                self.manager.item_error(&request.url);
            }
        }
        self.manager.item_end(&request.url);
    }
}

fn decode(path: &Path) -> Result<RgbaImage, ImageError> {
    let bytes = std::fs::read(path)?;
    Ok(image::load_from_memory(&bytes)?.to_rgba8())
}
