// SPDX-License-Identifier: GPL-3.0-only

//! Shared types for capture backends

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Which camera to open
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Facing {
    /// Front (selfie) camera
    #[default]
    User,
    /// Rear camera
    Environment,
}

impl Facing {
    /// The opposite camera
    pub fn toggled(self) -> Self {
        match self {
            Facing::User => Facing::Environment,
            Facing::Environment => Facing::User,
        }
    }
}

impl std::fmt::Display for Facing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Facing::User => write!(f, "user"),
            Facing::Environment => write!(f, "environment"),
        }
    }
}

/// Media track kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackKind {
    Audio,
    Video,
}

/// Video part of a stream request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoConstraints {
    pub facing: Facing,
    /// Ideal width; `None` leaves it to the device
    pub ideal_width: Option<u32>,
    /// Ideal height; `None` leaves it to the device
    pub ideal_height: Option<u32>,
}

/// A camera/microphone request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamConstraints {
    pub video: VideoConstraints,
    pub audio: bool,
}

impl StreamConstraints {
    /// Video at an ideal size plus audio
    pub fn ideal(facing: Facing, width: u32, height: u32) -> Self {
        Self {
            video: VideoConstraints {
                facing,
                ideal_width: Some(width),
                ideal_height: Some(height),
            },
            audio: true,
        }
    }

    /// Same request with size constraints dropped
    pub fn unconstrained(self) -> Self {
        Self {
            video: VideoConstraints {
                facing: self.video.facing,
                ideal_width: None,
                ideal_height: None,
            },
            audio: self.audio,
        }
    }

    /// Same request without audio
    pub fn video_only(self) -> Self {
        Self {
            audio: false,
            ..self
        }
    }

    /// Whether width/height are constrained
    pub fn is_sized(&self) -> bool {
        self.video.ideal_width.is_some() || self.video.ideal_height.is_some()
    }
}

/// Platform error class for a failed device request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceFailureKind {
    /// Permission refused
    NotAllowed,
    /// No matching device
    NotFound,
    /// Device could not be opened (usually held elsewhere)
    NotReadable,
    /// Constraints cannot be satisfied
    Overconstrained,
    /// Blocked by a security policy (insecure context, iframe policy)
    Security,
    /// Request aborted by the platform
    Abort,
    /// API or feature unavailable
    NotSupported,
    /// Anything unrecognised
    Other,
}

/// Raw device failure as reported by the platform
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceFailure {
    pub kind: DeviceFailureKind,
    /// Raw platform message; logged, never shown
    pub message: String,
}

impl DeviceFailure {
    pub fn new(kind: DeviceFailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Build from a platform error name (including legacy aliases)
    pub fn from_name(name: &str, message: impl Into<String>) -> Self {
        let kind = match name {
            "NotAllowedError" | "PermissionDeniedError" => DeviceFailureKind::NotAllowed,
            "NotFoundError" | "DevicesNotFoundError" => DeviceFailureKind::NotFound,
            "NotReadableError" | "TrackStartError" => DeviceFailureKind::NotReadable,
            "OverconstrainedError" | "ConstraintNotSatisfiedError" => {
                DeviceFailureKind::Overconstrained
            }
            "SecurityError" => DeviceFailureKind::Security,
            "AbortError" => DeviceFailureKind::Abort,
            "NotSupportedError" | "TypeError" => DeviceFailureKind::NotSupported,
            _ => DeviceFailureKind::Other,
        };
        Self::new(kind, message)
    }
}

impl std::fmt::Display for DeviceFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

impl std::error::Error for DeviceFailure {}

pub type DeviceResult<T> = Result<T, DeviceFailure>;

/// Platform family, for container negotiation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlatformFamily {
    /// Negotiates containers through the MIME support probe
    #[default]
    Standard,
    /// Rejects ordinary negotiation; always records the single fallback container
    AppleMobile,
}

impl PlatformFamily {
    /// Family of the platform this binary runs on
    pub fn current() -> Self {
        if cfg!(target_os = "ios") {
            PlatformFamily::AppleMobile
        } else {
            PlatformFamily::Standard
        }
    }
}

/// Result of a recorder capability probe
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PlatformCapabilities {
    pub family: PlatformFamily,
    supported: BTreeSet<String>,
}

impl PlatformCapabilities {
    pub fn new<I, S>(family: PlatformFamily, supported: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            family,
            supported: supported.into_iter().map(Into::into).collect(),
        }
    }

    /// Whether the recorder accepts this MIME type
    pub fn supports(&self, mime_type: &str) -> bool {
        self.supported.contains(mime_type)
    }

    /// All supported MIME types
    pub fn supported(&self) -> impl Iterator<Item = &str> {
        self.supported.iter().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legacy_error_names_classify() {
        assert_eq!(
            DeviceFailure::from_name("PermissionDeniedError", "").kind,
            DeviceFailureKind::NotAllowed
        );
        assert_eq!(
            DeviceFailure::from_name("TrackStartError", "").kind,
            DeviceFailureKind::NotReadable
        );
        assert_eq!(
            DeviceFailure::from_name("SomethingNew", "").kind,
            DeviceFailureKind::Other
        );
    }

    #[test]
    fn unconstrained_keeps_facing_and_audio() {
        let request = StreamConstraints::ideal(Facing::Environment, 1080, 1920);
        let relaxed = request.unconstrained();
        assert!(!relaxed.is_sized());
        assert_eq!(relaxed.video.facing, Facing::Environment);
        assert!(relaxed.audio);
        assert!(!relaxed.video_only().audio);
    }
}
