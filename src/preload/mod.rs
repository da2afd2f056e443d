// SPDX-License-Identifier: MPL-2.0

//! Speculative cache warming for the feed
//!
//! - [`fetcher`]: the prefetch seam, an HTTP implementation and its response cache
//! - [`scheduler`]: mount, scroll and album-settle triggers

pub mod fetcher;
pub mod scheduler;

pub use fetcher::{HttpPrefetcher, Prefetcher, RecordingPrefetcher, ResponseCache};
pub use scheduler::{PreloadScheduler, PreloadWindow};
