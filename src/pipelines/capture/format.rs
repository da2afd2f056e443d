// SPDX-License-Identifier: MPL-2.0

//! Recording container/codec selection
//!
//! A pure function of an explicit capability probe, so selection can be
//! exercised for any simulated platform.

use crate::backends::{PlatformCapabilities, PlatformFamily};
use crate::constants::formats::{NEGOTIATION_FREE_FALLBACK, RECORDING_PREFERENCE};
use crate::errors::MediaError;
use tracing::{debug, warn};

/// Chosen recording format
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordingFormat {
    /// Full MIME type handed to the recorder (may carry a codecs parameter)
    pub mime_type: String,
}

impl RecordingFormat {
    fn new(mime_type: &str) -> Self {
        Self {
            mime_type: mime_type.to_string(),
        }
    }

    /// MIME type without parameters (`video/webm`)
    pub fn container(&self) -> &str {
        self.mime_type
            .split(';')
            .next()
            .unwrap_or(&self.mime_type)
            .trim()
    }

    /// File extension matching the container
    pub fn extension(&self) -> &'static str {
        extension_for_mime(&self.mime_type)
    }
}

/// File extension for a video MIME type
pub fn extension_for_mime(mime_type: &str) -> &'static str {
    let container = mime_type.split(';').next().unwrap_or(mime_type).trim();
    match container {
        "video/webm" => "webm",
        "video/quicktime" => "mov",
        "video/x-matroska" => "mkv",
        _ => "mp4",
    }
}

/// Pick the recording format for a platform
///
/// Platforms that reject container negotiation always get the single
/// fallback; everyone else gets the first supported preference.
pub fn select_recording_format(caps: &PlatformCapabilities) -> Result<RecordingFormat, MediaError> {
    if caps.family == PlatformFamily::AppleMobile {
        debug!(mime = NEGOTIATION_FREE_FALLBACK, "Using negotiation-free container");
        return Ok(RecordingFormat::new(NEGOTIATION_FREE_FALLBACK));
    }

    match RECORDING_PREFERENCE.iter().find(|mime| caps.supports(mime)) {
        Some(mime) => {
            debug!(mime, "Selected recording format");
            Ok(RecordingFormat::new(mime))
        }
        None => {
            warn!("No supported recording format on this platform");
            Err(MediaError::RecorderUnsupported)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_supported_preference_wins() {
        let caps = PlatformCapabilities::new(
            PlatformFamily::Standard,
            ["video/mp4", "video/webm;codecs=vp8,opus", "video/webm"],
        );
        let format = select_recording_format(&caps).unwrap();
        assert_eq!(format.mime_type, "video/webm;codecs=vp8,opus");
        assert_eq!(format.container(), "video/webm");
        assert_eq!(format.extension(), "webm");
    }

    #[test]
    fn apple_mobile_ignores_probe() {
        let caps = PlatformCapabilities::new(PlatformFamily::AppleMobile, ["video/webm"]);
        let format = select_recording_format(&caps).unwrap();
        assert_eq!(format.mime_type, "video/mp4");
        assert_eq!(format.extension(), "mp4");
    }

    #[test]
    fn nothing_supported_is_an_error() {
        let caps = PlatformCapabilities::new(PlatformFamily::Standard, ["audio/ogg"]);
        assert_eq!(
            select_recording_format(&caps),
            Err(MediaError::RecorderUnsupported)
        );
    }
}
