// SPDX-License-Identifier: MPL-2.0

//! Error types for the media pipeline
//!
//! [`MediaError`] is the fixed user-facing taxonomy. Raw platform text never
//! reaches a [`MediaError`]; it is logged where it is classified and dropped.

use std::fmt;

/// Result type alias using AppError
pub type AppResult<T> = Result<T, AppError>;

/// Which layer refused camera/microphone access
///
/// The remediation differs: a host-app denial is fixed in the embedding
/// app's settings, a system denial in the OS privacy settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionScope {
    /// Permission disabled by the parent (embedding) application
    HostApp,
    /// Permission denied by the operating system or the user prompt
    System,
}

/// User-facing failure taxonomy shared by every pipeline component
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaError {
    /// Camera or microphone access refused
    PermissionDenied(PermissionScope),
    /// No capture device matches the request
    DeviceNotFound,
    /// Device exists but another process holds it
    DeviceBusy,
    /// Requested constraints cannot be met even unconstrained
    ConstraintUnsatisfiable,
    /// No recording container/codec usable on this platform
    RecorderUnsupported,
    /// The transcoding engine failed to load
    EngineInitFailed,
    /// The transcoding engine failed while trimming
    TranscodeFailed,
    /// A media load stalled past its deadline
    LoadTimeout,
    /// A media load finished with a decode/network error
    DecodeFailed,
    /// The device reports no connectivity
    Offline,
}

impl MediaError {
    /// The single message shown to the user for this failure
    pub fn user_message(&self) -> &'static str {
        match self {
            MediaError::PermissionDenied(PermissionScope::HostApp) => {
                "Camera access is turned off for this app. Enable it in the app settings and try again."
            }
            MediaError::PermissionDenied(PermissionScope::System) => {
                "Camera access was denied. Allow camera and microphone access in your device settings."
            }
            MediaError::DeviceNotFound => "No camera was found on this device.",
            MediaError::DeviceBusy => {
                "The camera is being used by another app. Close it and try again."
            }
            MediaError::ConstraintUnsatisfiable => "Your camera does not support this recording mode.",
            MediaError::RecorderUnsupported => "Video recording is not supported on this device.",
            MediaError::EngineInitFailed => "The video editor could not be loaded. Please try again.",
            MediaError::TranscodeFailed => "Trimming the video failed. Please try again.",
            MediaError::LoadTimeout => "This is taking too long to load. Tap to retry.",
            MediaError::DecodeFailed => "This media could not be loaded. Tap to retry.",
            MediaError::Offline => "You're offline. Check your connection and try again.",
        }
    }

    /// Whether the user can usefully retry the same operation
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            MediaError::DeviceNotFound | MediaError::RecorderUnsupported
        )
    }
}

/// Capture-session errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureError {
    /// Classified hardware/recorder failure
    Media(MediaError),
    /// Action not allowed in the current state
    InvalidTransition {
        action: &'static str,
        state: &'static str,
    },
    /// `start()` without a live stream
    NoLiveStream,
    /// Camera switch requested while recording
    SwitchWhileRecording,
    /// The session was torn down while the operation was in flight
    Aborted,
}

/// Trimming errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranscodeError {
    /// Classified engine failure
    Media(MediaError),
    /// Source/target durations cannot produce a trim window
    InvalidRange(String),
    /// The trimmer was terminated while the job was in flight
    Terminated,
    /// Local file access failed
    Io(String),
}

/// Malformed media descriptor
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DescriptorError {
    /// Album with no slides
    EmptyAlbum,
    /// Album with more slides than allowed
    TooManySlides { count: usize, max: usize },
    /// Reel whose item list is not exactly one video
    ReelShape,
    /// Descriptor kind does not match the surface built from it
    WrongKind {
        expected: &'static str,
        found: &'static str,
    },
}

/// Main application error type
#[derive(Debug, Clone)]
pub enum AppError {
    /// Capture-related errors
    Capture(CaptureError),
    /// Trimming errors
    Transcode(TranscodeError),
    /// Display descriptor errors
    Descriptor(DescriptorError),
    /// Configuration errors
    Config(String),
    /// Storage/filesystem errors
    Storage(String),
    /// Generic error with message
    Other(String),
}

impl fmt::Display for MediaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.user_message())
    }
}

impl fmt::Display for CaptureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureError::Media(e) => write!(f, "{}", e),
            CaptureError::InvalidTransition { action, state } => {
                write!(f, "Cannot {} while {}", action, state)
            }
            CaptureError::NoLiveStream => write!(f, "No live camera stream"),
            CaptureError::SwitchWhileRecording => {
                write!(f, "Cannot switch camera while recording")
            }
            CaptureError::Aborted => write!(f, "Capture session was closed"),
        }
    }
}

impl fmt::Display for TranscodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TranscodeError::Media(e) => write!(f, "{}", e),
            TranscodeError::InvalidRange(msg) => write!(f, "Invalid trim range: {}", msg),
            TranscodeError::Terminated => write!(f, "Trimmer was closed"),
            TranscodeError::Io(msg) => write!(f, "I/O error: {}", msg),
        }
    }
}

impl fmt::Display for DescriptorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DescriptorError::EmptyAlbum => write!(f, "Album has no items"),
            DescriptorError::TooManySlides { count, max } => {
                write!(f, "Album has {} items, at most {} allowed", count, max)
            }
            DescriptorError::ReelShape => write!(f, "Reel must contain exactly one video"),
            DescriptorError::WrongKind { expected, found } => {
                write!(f, "Expected {} descriptor, got {}", expected, found)
            }
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Capture(e) => write!(f, "Capture error: {}", e),
            AppError::Transcode(e) => write!(f, "Trim error: {}", e),
            AppError::Descriptor(e) => write!(f, "Media descriptor error: {}", e),
            AppError::Config(msg) => write!(f, "Configuration error: {}", msg),
            AppError::Storage(msg) => write!(f, "Storage error: {}", msg),
            AppError::Other(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for MediaError {}
impl std::error::Error for CaptureError {}
impl std::error::Error for TranscodeError {}
impl std::error::Error for DescriptorError {}
impl std::error::Error for AppError {}

impl From<MediaError> for CaptureError {
    fn from(err: MediaError) -> Self {
        CaptureError::Media(err)
    }
}

impl From<MediaError> for TranscodeError {
    fn from(err: MediaError) -> Self {
        TranscodeError::Media(err)
    }
}

impl From<CaptureError> for AppError {
    fn from(err: CaptureError) -> Self {
        AppError::Capture(err)
    }
}

impl From<TranscodeError> for AppError {
    fn from(err: TranscodeError) -> Self {
        AppError::Transcode(err)
    }
}

impl From<DescriptorError> for AppError {
    fn from(err: DescriptorError) -> Self {
        AppError::Descriptor(err)
    }
}

impl From<String> for AppError {
    fn from(msg: String) -> Self {
        AppError::Other(msg)
    }
}

impl From<&str> for AppError {
    fn from(msg: &str) -> Self {
        AppError::Other(msg.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Storage(err.to_string())
    }
}

impl From<std::io::Error> for TranscodeError {
    fn from(err: std::io::Error) -> Self {
        TranscodeError::Io(err.to_string())
    }
}
