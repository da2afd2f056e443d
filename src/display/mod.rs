// SPDX-License-Identifier: MPL-2.0

//! Resilient media display
//!
//! Every visible image, album slide and reel video is a
//! [`ResilientMediaSurface`]: a load/error/retry state machine with a hard
//! timeout, throttled manual retry and an offline short-circuit. Surfaces
//! describe fetches as [`LoadRequest`]s; the host performs them and reports
//! results back, and routes scheduler wakeups to the surface that owns them.
//!
//! - [`descriptor`]: immutable post descriptors and their shape rules
//! - [`url`]: cache-busting and blurred-variant request URLs
//! - [`retry`]: retry throttle and outcomes
//! - [`surface`]: the per-item state machine
//! - [`album`]: windowed album carousel
//! - [`reel`]: visibility-driven reel playback
//! - [`post`]: descriptor to surfaces

pub mod album;
pub mod descriptor;
pub mod post;
pub mod reel;
pub mod retry;
pub mod surface;
pub mod url;

pub use album::{AlbumCarousel, FullViewFn, SlideReadyFn, Swipe};
pub use descriptor::{DescriptorKind, MediaDescriptor, MediaItem, MediaKind};
pub use post::{PostHooks, PostMedia, SingleImage};
pub use reel::{LoadAck, PlayRejection, PlaybackCommand, PlaybackState, ReelPlayer};
pub use retry::{RetryOutcome, RetryThrottle};
pub use surface::{
    LoadRequest, LoadToken, ResilientMediaSurface, SurfaceContext, SurfacePhase, SurfaceState,
    Visual,
};
pub use url::{Variant, request_url};
