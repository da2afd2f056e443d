// SPDX-License-Identifier: GPL-3.0-only

//! Pipeline-wide constants and defaults

use std::time::Duration;

/// Capture defaults
pub mod capture {
    use super::Duration;

    /// Hard cutoff for a single recorded clip
    pub const MAX_CLIP_DURATION: Duration = Duration::from_secs(10);

    /// Recorder time slice; data is flushed at least this often
    pub const TIME_SLICE: Duration = Duration::from_secs(1);

    /// Ideal capture width (portrait)
    pub const IDEAL_WIDTH: u32 = 1080;

    /// Ideal capture height (portrait)
    pub const IDEAL_HEIGHT: u32 = 1920;

    /// Substrings that identify a host-app (embedding webview) permission denial
    pub const HOST_APP_DENIAL_MARKERS: &[&str] = &[
        "disabled in app settings",
        "not allowed by the host",
        "in-app browser",
        "webview",
    ];
}

/// Recording container/codec preference, first supported wins
pub mod formats {
    /// Ordered MIME preference list for ordinary platforms
    pub const RECORDING_PREFERENCE: &[&str] = &[
        "video/webm;codecs=vp9,opus",
        "video/webm;codecs=vp8,opus",
        "video/webm",
        "video/mp4;codecs=avc1,mp4a",
        "video/mp4",
    ];

    /// The single container used on platforms that reject negotiation
    pub const NEGOTIATION_FREE_FALLBACK: &str = "video/mp4";
}

/// Display defaults
pub mod display {
    use super::Duration;

    /// Image load deadline before the surface flips to error
    pub const IMAGE_LOAD_TIMEOUT: Duration = Duration::from_secs(10);

    /// Video load deadline (larger files, slower first byte)
    pub const VIDEO_LOAD_TIMEOUT: Duration = Duration::from_secs(20);

    /// Minimum spacing between manual retries on the same item
    pub const RETRY_THROTTLE: Duration = Duration::from_secs(2);

    /// Slides requested on each side of the active album slide
    pub const ALBUM_WINDOW: usize = 1;

    /// Maximum album size
    pub const MAX_ALBUM_ITEMS: usize = 10;

    /// Visible fraction at which reels autoplay
    pub const AUTOPLAY_VISIBILITY: f32 = 0.5;

    /// Blur radius requested for locked media
    pub const BLUR_RADIUS: u32 = 24;

    /// Query parameter used to bust caches on retry
    pub const CACHE_BUST_PARAM: &str = "t";

    /// Query parameter carrying the blur radius for locked media
    pub const BLUR_PARAM: &str = "blur";
}

/// Look-ahead defaults
pub mod preload {
    use super::Duration;

    /// Upcoming feed items warmed ahead of the scroll position
    pub const RADIUS: usize = 3;

    /// Leading items warmed on first mount
    pub const INITIAL_COUNT: usize = 3;

    /// Scroll handler debounce
    pub const SCROLL_DEBOUNCE: Duration = Duration::from_millis(150);

    /// Albums larger than this get a bulk warm after the settle delay
    pub const ALBUM_THRESHOLD: usize = 3;

    /// Settle delay before bulk-warming album slides
    pub const ALBUM_SETTLE_DELAY: Duration = Duration::from_millis(1500);

    /// Maximum bodies kept in the session response cache
    pub const RESPONSE_CACHE_ENTRIES: usize = 64;
}

/// Transcoder defaults
pub mod transcode {
    use super::Duration;

    /// Clip length produced by the trimmer
    pub const TARGET_DURATION: Duration = Duration::from_secs(10);

    /// Virtual filesystem name of the trimmer input (extension appended)
    pub const INPUT_STEM: &str = "input";

    /// Virtual filesystem name of the trimmer output (extension appended)
    pub const OUTPUT_STEM: &str = "output";

    /// Virtual filesystem name of an extracted thumbnail
    pub const THUMBNAIL_NAME: &str = "thumbnail.jpg";
}

/// Timing constants
pub mod timing {
    use super::Duration;

    /// Frame interval used by the tokio scheduler (~60 Hz)
    pub const FRAME_INTERVAL: Duration = Duration::from_millis(16);
}

/// Format a duration as `m:ss` for the recording clock
pub fn format_clock(duration: Duration) -> String {
    let secs = duration.as_secs();
    format!("{}:{:02}", secs / 60, secs % 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_clock() {
        assert_eq!(format_clock(Duration::from_millis(0)), "0:00");
        assert_eq!(format_clock(Duration::from_millis(9_999)), "0:09");
        assert_eq!(format_clock(Duration::from_secs(75)), "1:15");
    }

    #[test]
    fn test_video_timeout_longer_than_image() {
        assert!(display::VIDEO_LOAD_TIMEOUT > display::IMAGE_LOAD_TIMEOUT);
    }

    #[test]
    fn test_preference_list_ends_with_fallback_container() {
        assert_eq!(
            formats::RECORDING_PREFERENCE.last().copied(),
            Some(formats::NEGOTIATION_FREE_FALLBACK)
        );
    }
}
