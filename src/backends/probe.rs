// SPDX-License-Identifier: MPL-2.0

//! Recorder capability probe
//!
//! Maps recording MIME types onto the GStreamer muxer/encoder elements that
//! would have to exist to produce them, and reports which are available.

use super::types::{PlatformCapabilities, PlatformFamily};
use gstreamer as gst;
use tracing::{debug, info, warn};

/// Element alternatives per pipeline stage; one of each group must exist
struct MimeRequirement {
    mime_type: &'static str,
    groups: &'static [&'static [&'static str]],
}

const H264_ENCODERS: &[&str] = &["vaapih264enc", "nvh264enc", "v4l2h264enc", "x264enc", "openh264enc"];
const AAC_ENCODERS: &[&str] = &["avenc_aac", "fdkaacenc", "voaacenc", "faac"];

const REQUIREMENTS: &[MimeRequirement] = &[
    MimeRequirement {
        mime_type: "video/webm;codecs=vp9,opus",
        groups: &[&["webmmux"], &["vp9enc"], &["opusenc"]],
    },
    MimeRequirement {
        mime_type: "video/webm;codecs=vp8,opus",
        groups: &[&["webmmux"], &["vp8enc"], &["opusenc"]],
    },
    MimeRequirement {
        mime_type: "video/webm",
        groups: &[&["webmmux"], &["vp8enc", "vp9enc"]],
    },
    MimeRequirement {
        mime_type: "video/mp4;codecs=avc1,mp4a",
        groups: &[&["mp4mux"], H264_ENCODERS, AAC_ENCODERS],
    },
    MimeRequirement {
        mime_type: "video/mp4",
        groups: &[&["mp4mux"], H264_ENCODERS],
    },
];

/// Check if a specific GStreamer element is available
pub fn is_element_available(element_name: &str) -> bool {
    gst::ElementFactory::find(element_name).is_some()
}

/// Probe this machine's recorder capabilities
///
/// If GStreamer cannot initialise, nothing is reported as supported and
/// format selection fails with `RecorderUnsupported`.
pub fn probe_capabilities() -> PlatformCapabilities {
    let family = PlatformFamily::current();

    if let Err(e) = gst::init() {
        warn!(error = %e, "GStreamer unavailable, no recording formats detected");
        return PlatformCapabilities::new(family, Vec::<String>::new());
    }

    let supported: Vec<&str> = REQUIREMENTS
        .iter()
        .filter(|req| {
            let ok = req
                .groups
                .iter()
                .all(|group| group.iter().any(|name| is_element_available(name)));
            debug!(mime = req.mime_type, supported = ok, "Probed recording format");
            ok
        })
        .map(|req| req.mime_type)
        .collect();

    info!(?family, count = supported.len(), "Detected recording formats");
    PlatformCapabilities::new(family, supported)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_runs() {
        // Just ensure probing doesn't panic without plugins installed
        let caps = probe_capabilities();
        let _ = caps.supported().count();
    }

    #[test]
    fn every_preference_has_requirements() {
        for mime in crate::constants::formats::RECORDING_PREFERENCE {
            assert!(REQUIREMENTS.iter().any(|r| r.mime_type == *mime), "{}", mime);
        }
    }
}
