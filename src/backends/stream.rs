// SPDX-License-Identifier: MPL-2.0

//! Exclusive ownership of camera/microphone tracks
//!
//! A [`MediaStream`] owns its tracks. It is not `Clone`; the only way to look
//! at a track from elsewhere is a read-only [`TrackObserver`]. Dropping the
//! stream stops every track, so no exit path can leave hardware open.

use super::types::{Facing, TrackKind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

/// Track lifecycle as reported by the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyState {
    Live,
    Ended,
}

/// One hardware track
#[derive(Debug)]
pub struct MediaTrack {
    id: String,
    kind: TrackKind,
    label: String,
    ended: Arc<AtomicBool>,
}

impl MediaTrack {
    pub fn new(id: impl Into<String>, kind: TrackKind, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind,
            label: label.into(),
            ended: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> TrackKind {
        self.kind
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn ready_state(&self) -> ReadyState {
        if self.ended.load(Ordering::SeqCst) {
            ReadyState::Ended
        } else {
            ReadyState::Live
        }
    }

    /// Release the hardware; idempotent
    pub fn stop(&self) {
        if !self.ended.swap(true, Ordering::SeqCst) {
            debug!(track = %self.id, kind = ?self.kind, "Track stopped");
        }
    }

    /// Read-only view of this track's state
    pub fn observer(&self) -> TrackObserver {
        TrackObserver {
            id: self.id.clone(),
            kind: self.kind,
            ended: Arc::clone(&self.ended),
        }
    }
}

/// Read-only handle used to verify teardown from outside the owner
#[derive(Debug, Clone)]
pub struct TrackObserver {
    id: String,
    kind: TrackKind,
    ended: Arc<AtomicBool>,
}

impl TrackObserver {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> TrackKind {
        self.kind
    }

    pub fn ready_state(&self) -> ReadyState {
        if self.ended.load(Ordering::SeqCst) {
            ReadyState::Ended
        } else {
            ReadyState::Live
        }
    }

    /// Simulate the platform ending the track (device unplugged)
    pub fn end_externally(&self) {
        self.ended.store(true, Ordering::SeqCst);
    }
}

/// A live camera (and optionally microphone) stream
#[derive(Debug)]
pub struct MediaStream {
    id: String,
    facing: Facing,
    tracks: Vec<MediaTrack>,
}

impl MediaStream {
    pub fn new(id: impl Into<String>, facing: Facing, tracks: Vec<MediaTrack>) -> Self {
        Self {
            id: id.into(),
            facing,
            tracks,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn facing(&self) -> Facing {
        self.facing
    }

    pub fn tracks(&self) -> &[MediaTrack] {
        &self.tracks
    }

    pub fn has_audio(&self) -> bool {
        self.tracks.iter().any(|t| t.kind() == TrackKind::Audio)
    }

    pub fn has_video(&self) -> bool {
        self.tracks.iter().any(|t| t.kind() == TrackKind::Video)
    }

    /// Whether any video track is still live
    pub fn video_live(&self) -> bool {
        self.tracks
            .iter()
            .any(|t| t.kind() == TrackKind::Video && t.ready_state() == ReadyState::Live)
    }

    /// Whether every track has ended
    pub fn all_ended(&self) -> bool {
        self.tracks
            .iter()
            .all(|t| t.ready_state() == ReadyState::Ended)
    }

    /// Stop every track
    pub fn stop_all(&self) {
        for track in &self.tracks {
            track.stop();
        }
    }

    /// Observers for every track
    pub fn observers(&self) -> Vec<TrackObserver> {
        self.tracks.iter().map(MediaTrack::observer).collect()
    }
}

impl Drop for MediaStream {
    fn drop(&mut self) {
        self.stop_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drop_ends_all_tracks() {
        let stream = MediaStream::new(
            "s1",
            Facing::User,
            vec![
                MediaTrack::new("v", TrackKind::Video, "cam"),
                MediaTrack::new("a", TrackKind::Audio, "mic"),
            ],
        );
        let observers = stream.observers();
        assert!(observers.iter().all(|o| o.ready_state() == ReadyState::Live));

        drop(stream);
        assert!(observers.iter().all(|o| o.ready_state() == ReadyState::Ended));
    }

    #[test]
    fn external_end_is_visible_to_owner() {
        let stream = MediaStream::new(
            "s2",
            Facing::Environment,
            vec![MediaTrack::new("v", TrackKind::Video, "cam")],
        );
        stream.observers()[0].end_externally();
        assert!(!stream.video_live());
        assert!(!stream.has_audio());
    }
}
