// SPDX-License-Identifier: MPL-2.0

//! Camera capture
//!
//! - [`acquisition`]: camera/microphone request with fallbacks and error classification
//! - [`format`]: recording container selection from a capability probe
//! - [`session`]: the capture state machine that owns stream, recorder and preview

pub mod acquisition;
pub mod format;
pub mod session;

pub use acquisition::{AcquiredStream, StreamAcquisition, classify};
pub use format::{RecordingFormat, extension_for_mime, select_recording_format};
pub use session::{CaptureSession, CaptureSnapshot, CaptureState, CapturedClip, StopReason};
