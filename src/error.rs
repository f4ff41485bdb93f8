//! Error types reported by the render queue and the image loader.

use crate::render_queue::PassKind;

/// Why a pass was refused by a queue mutation.
///
/// Returned by [`RenderQueue::set_queue`](crate::RenderQueue::set_queue),
/// [`push_pass`](crate::RenderQueue::push_pass) and friends. The queue is never
/// modified when one of these is returned.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// The pass viewport has a zero width or height.
    #[error("viewport {width}x{height} has a zero dimension")]
    EmptyViewport { width: u32, height: u32 },
    /// Two color outputs of the same pass share an id.
    #[error("color output id '{0}' is declared more than once")]
    DuplicateOutput(String),
    /// The depth output id is also used for a color output of the same pass.
    #[error("depth output id '{0}' is also used as a color output")]
    DepthAliasesColor(String),
    /// `insert_pass` was given an index past the end of the queue.
    #[error("insert index {index} is out of bounds for queue of length {len}")]
    IndexOutOfBounds { index: usize, len: usize },
}

/// Errors reported by queue management calls.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
    /// A pass failed validation.
    #[error("invalid render pass at position {position}: {reason}")]
    Validation {
        /// Position of the offending pass in the submitted list (0 for single-pass calls).
        position: usize,
        reason: ValidationError,
    },
    /// `load_queue` was called with a name no snapshot was stored under.
    #[error("no stored render queue named '{0}'")]
    MissingSnapshot(String),
}

/// Errors that abort a [`RenderQueue::execute`](crate::RenderQueue::execute) run.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExecuteError {
    /// A pass returned an output variant that does not match its kind.
    #[error("render pass {index} ({kind:?}) has invalid preprocess output")]
    InvalidPreprocessOutput { index: usize, kind: PassKind },
}

/// Errors that can occur while loading an image.
#[derive(Debug, thiserror::Error)]
pub enum ImageError {
    /// The file could not be read.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// The bytes could not be decoded as an image.
    #[error("decode error: {0}")]
    Decode(#[from] image::ImageError),
    /// The decoder panicked on the worker thread.
    #[error("image decoder panicked")]
    WorkerPanicked,
}

/// Errors raised while setting up the wgpu context.
#[derive(Debug, thiserror::Error)]
pub enum GpuError {
    #[error("failed to create surface: {0}")]
    Surface(#[from] wgpu::CreateSurfaceError),
    #[error("failed to find a suitable GPU adapter: {0}")]
    Adapter(#[from] wgpu::RequestAdapterError),
    #[error("failed to create device: {0}")]
    Device(#[from] wgpu::RequestDeviceError),
    #[error("surface reports no supported formats")]
    NoSurfaceFormat,
}
