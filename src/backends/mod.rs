// SPDX-License-Identifier: MPL-2.0

//! Device abstraction for camera/microphone capture
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────┐
//! │   CaptureSession    │  ← State machine, owns the stream
//! └──────────┬──────────┘
//!            │
//!            ▼
//! ┌─────────────────────┐
//! │  StreamAcquisition  │  ← Fallbacks, error classification
//! └──────────┬──────────┘
//!            │
//!            ▼
//! ┌─────────────────────┐
//! │ MediaDevices Trait  │  ← Platform seam
//! └──────────┬──────────┘
//!            │
//!            ▼
//!     ┌──────────────┐
//!     │VirtualDevices│  ← Scriptable simulated hardware
//!     └──────────────┘
//! ```
//!
//! # Modules
//!
//! - [`types`]: Constraints, facing, raw device failures, platform capabilities
//! - [`stream`]: Stream/track ownership
//! - [`virtual_devices`]: Simulated camera, microphone and recorder
//! - [`probe`]: GStreamer-backed recorder capability probe

pub mod probe;
pub mod stream;
pub mod types;
pub mod virtual_devices;

pub use stream::{MediaStream, MediaTrack, ReadyState, TrackObserver};
pub use types::*;
pub use virtual_devices::{VirtualDevices, VirtualRecorder};

use bytes::Bytes;
use std::future::Future;
use std::time::Duration;

/// Platform camera/microphone access
pub trait MediaDevices: Send + Sync + 'static {
    /// Recorder produced for a stream
    type Recorder: MediaRecorder + 'static;

    /// Open camera (and microphone, if requested) in a single request
    fn get_user_media(
        &self,
        constraints: &StreamConstraints,
    ) -> impl Future<Output = DeviceResult<MediaStream>> + Send;

    /// Create a recorder bound to a live stream
    fn create_recorder(
        &self,
        stream: &MediaStream,
        mime_type: &str,
    ) -> DeviceResult<Self::Recorder>;

    /// Which recording containers/codecs this platform accepts
    fn capabilities(&self) -> PlatformCapabilities;
}

/// Platform media recorder
///
/// Data is produced in time slices and drained cooperatively by the owner.
pub trait MediaRecorder: Send {
    /// Begin recording, flushing data every `time_slice`
    fn start(&mut self, time_slice: Duration) -> DeviceResult<()>;

    /// Data produced since the last call; an error means the hardware failed
    fn take_available(&mut self) -> DeviceResult<Vec<Bytes>>;

    /// Stop and return whatever was still buffered
    fn stop(&mut self) -> Vec<Bytes>;
}
