// SPDX-License-Identifier: MPL-2.0

//! Reel Media - client-side media pipeline for a short-video feed
//!
//! Captures short clips from a camera, trims over-length clips by stream
//! copy, and displays images, albums and reels with timeouts, throttled
//! retry and scroll-driven preloading.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`backends`]: device port, stream/track ownership, virtual devices, capability probe
//! - [`pipelines`]: camera capture and clip trimming
//! - [`display`]: resilient media surfaces, albums and reels
//! - [`preload`]: look-ahead cache warming
//! - [`blob`]: object URL lifecycle
//! - [`scheduler`]: timer and animation-frame seam
//! - [`network`]: online/offline signal
//! - [`config`]: user configuration handling
//!
//! State machines never sleep or spawn timers themselves. They ask a
//! [`scheduler::Scheduler`] for timers and frames, and the host routes each
//! [`scheduler::Wakeup`] back to whoever asked.

pub mod backends;
pub mod blob;
pub mod config;
pub mod constants;
pub mod display;
pub mod errors;
pub mod network;
pub mod pipelines;
pub mod preload;
pub mod scheduler;

// Re-export commonly used types
pub use blob::{BlobLifecycle, MemoryUrlStore, ObjectUrl};
pub use config::Config;
pub use display::{MediaDescriptor, PostMedia, ResilientMediaSurface};
pub use errors::{AppError, AppResult, MediaError};
pub use pipelines::capture::{CaptureSession, CaptureState};
pub use pipelines::trim::Trimmer;
pub use preload::PreloadScheduler;
