// SPDX-License-Identifier: GPL-3.0-only

//! Simulated camera, microphone and recorder
//!
//! `VirtualDevices` behaves like a platform device layer whose outcomes can
//! be scripted: queued failures, a missing microphone, a busy camera, a slow
//! permission prompt, a recorder fault. It keeps an observer for every track
//! it ever handed out, so callers can prove that teardown really ended them.

use super::stream::{MediaStream, MediaTrack, ReadyState, TrackObserver};
use super::types::*;
use super::{MediaDevices, MediaRecorder};
use bytes::Bytes;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, info};

/// Marker bytes appended by the virtual recorder when it stops
const TAIL_CHUNK: &[u8] = b"virtual-recorder-tail";

#[derive(Debug)]
struct VirtualState {
    cameras: Vec<Facing>,
    microphone: bool,
    busy: bool,
    acquire_delay: Option<Duration>,
    scripted: VecDeque<DeviceFailure>,
    requests: Vec<StreamConstraints>,
    tracks: Vec<TrackObserver>,
    max_live_video: usize,
    next_id: u64,
}

/// Scriptable simulated device layer
#[derive(Debug)]
pub struct VirtualDevices {
    state: Mutex<VirtualState>,
    capabilities: PlatformCapabilities,
    chunks: Arc<Mutex<VecDeque<Bytes>>>,
    recorder_fault: Arc<AtomicBool>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl VirtualDevices {
    /// Front and rear camera, a microphone, WebM/VP8 recording
    pub fn new() -> Self {
        Self::with_capabilities(PlatformCapabilities::new(
            PlatformFamily::Standard,
            ["video/webm;codecs=vp8,opus", "video/webm", "video/mp4"],
        ))
    }

    pub fn with_capabilities(capabilities: PlatformCapabilities) -> Self {
        Self {
            state: Mutex::new(VirtualState {
                cameras: vec![Facing::User, Facing::Environment],
                microphone: true,
                busy: false,
                acquire_delay: None,
                scripted: VecDeque::new(),
                requests: Vec::new(),
                tracks: Vec::new(),
                max_live_video: 0,
                next_id: 0,
            }),
            capabilities,
            chunks: Arc::new(Mutex::new(VecDeque::new())),
            recorder_fault: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Which cameras exist
    pub fn set_cameras(&self, cameras: Vec<Facing>) {
        lock(&self.state).cameras = cameras;
    }

    /// Whether a microphone exists
    pub fn set_microphone(&self, available: bool) {
        lock(&self.state).microphone = available;
    }

    /// Whether the camera is held by another process
    pub fn set_busy(&self, busy: bool) {
        lock(&self.state).busy = busy;
    }

    /// Delay every request (slow permission prompt)
    pub fn set_acquire_delay(&self, delay: Option<Duration>) {
        lock(&self.state).acquire_delay = delay;
    }

    /// Fail the next request with this platform error
    pub fn fail_next(&self, failure: DeviceFailure) {
        lock(&self.state).scripted.push_back(failure);
    }

    /// Deliver a recorded chunk to the active recorder
    pub fn push_chunk(&self, chunk: Bytes) {
        lock(&self.chunks).push_back(chunk);
    }

    /// Make the active recorder report a hardware failure
    pub fn fault_recorder(&self) {
        self.recorder_fault.store(true, Ordering::SeqCst);
    }

    /// Every request received, in order
    pub fn requests(&self) -> Vec<StreamConstraints> {
        lock(&self.state).requests.clone()
    }

    /// Observers for every track ever created
    pub fn tracks(&self) -> Vec<TrackObserver> {
        lock(&self.state).tracks.clone()
    }

    /// Video tracks currently live
    pub fn live_video_tracks(&self) -> usize {
        count_live_video(&lock(&self.state).tracks)
    }

    /// Highest number of simultaneously live video tracks seen
    pub fn max_live_video_tracks(&self) -> usize {
        lock(&self.state).max_live_video
    }

    /// Whether every track ever created has ended
    pub fn all_tracks_ended(&self) -> bool {
        lock(&self.state)
            .tracks
            .iter()
            .all(|t| t.ready_state() == ReadyState::Ended)
    }

    fn open(&self, constraints: &StreamConstraints) -> DeviceResult<MediaStream> {
        let mut state = lock(&self.state);
        state.requests.push(*constraints);

        if let Some(failure) = state.scripted.pop_front() {
            debug!(?failure, "Scripted device failure");
            return Err(failure);
        }
        if state.cameras.is_empty() {
            return Err(DeviceFailure::from_name(
                "NotFoundError",
                "Requested device not found",
            ));
        }
        if state.busy {
            return Err(DeviceFailure::from_name(
                "NotReadableError",
                "Could not start video source",
            ));
        }
        if constraints.audio && !state.microphone {
            return Err(DeviceFailure::from_name(
                "NotFoundError",
                "Requested audio device not found",
            ));
        }

        let requested = constraints.video.facing;
        let facing = if state.cameras.contains(&requested) {
            requested
        } else {
            state.cameras[0]
        };

        state.next_id += 1;
        let id = state.next_id;
        let mut tracks = vec![MediaTrack::new(
            format!("video-{}", id),
            TrackKind::Video,
            format!("Virtual {} camera", facing),
        )];
        if constraints.audio {
            tracks.push(MediaTrack::new(
                format!("audio-{}", id),
                TrackKind::Audio,
                "Virtual microphone",
            ));
        }

        let stream = MediaStream::new(format!("stream-{}", id), facing, tracks);
        state.tracks.extend(stream.observers());
        let live = count_live_video(&state.tracks);
        state.max_live_video = state.max_live_video.max(live);

        info!(stream = %stream.id(), %facing, audio = constraints.audio, "Virtual stream opened");
        Ok(stream)
    }
}

impl Default for VirtualDevices {
    fn default() -> Self {
        Self::new()
    }
}

fn count_live_video(tracks: &[TrackObserver]) -> usize {
    tracks
        .iter()
        .filter(|t| t.kind() == TrackKind::Video && t.ready_state() == ReadyState::Live)
        .count()
}

impl MediaDevices for VirtualDevices {
    type Recorder = VirtualRecorder;

    async fn get_user_media(&self, constraints: &StreamConstraints) -> DeviceResult<MediaStream> {
        let delay = lock(&self.state).acquire_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.open(constraints)
    }

    fn create_recorder(
        &self,
        stream: &MediaStream,
        mime_type: &str,
    ) -> DeviceResult<Self::Recorder> {
        if !self.capabilities.supports(mime_type)
            && self.capabilities.family != PlatformFamily::AppleMobile
        {
            return Err(DeviceFailure::from_name(
                "NotSupportedError",
                format!("{} is not supported", mime_type),
            ));
        }
        if !stream.video_live() {
            return Err(DeviceFailure::from_name(
                "InvalidStateError",
                "Stream has no live video track",
            ));
        }

        self.recorder_fault.store(false, Ordering::SeqCst);
        lock(&self.chunks).clear();
        Ok(VirtualRecorder {
            chunks: Arc::clone(&self.chunks),
            fault: Arc::clone(&self.recorder_fault),
            recording: false,
        })
    }

    fn capabilities(&self) -> PlatformCapabilities {
        self.capabilities.clone()
    }
}

/// Recorder paired with [`VirtualDevices`]
#[derive(Debug)]
pub struct VirtualRecorder {
    chunks: Arc<Mutex<VecDeque<Bytes>>>,
    fault: Arc<AtomicBool>,
    recording: bool,
}

impl MediaRecorder for VirtualRecorder {
    fn start(&mut self, time_slice: Duration) -> DeviceResult<()> {
        debug!(?time_slice, "Virtual recorder started");
        self.recording = true;
        Ok(())
    }

    fn take_available(&mut self) -> DeviceResult<Vec<Bytes>> {
        if self.fault.load(Ordering::SeqCst) {
            return Err(DeviceFailure::from_name(
                "UnknownError",
                "Recorder encountered a hardware error",
            ));
        }
        Ok(lock(&self.chunks).drain(..).collect())
    }

    fn stop(&mut self) -> Vec<Bytes> {
        if !self.recording {
            return Vec::new();
        }
        self.recording = false;
        let mut rest: Vec<Bytes> = lock(&self.chunks).drain(..).collect();
        rest.push(Bytes::from_static(TAIL_CHUNK));
        rest
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_microphone_fails_combined_request() {
        let devices = VirtualDevices::new();
        devices.set_microphone(false);
        let request = StreamConstraints::ideal(Facing::User, 1080, 1920);

        let err = devices.get_user_media(&request).await.unwrap_err();
        assert_eq!(err.kind, DeviceFailureKind::NotFound);

        let stream = devices.get_user_media(&request.video_only()).await.unwrap();
        assert!(!stream.has_audio());
    }

    #[tokio::test]
    async fn falls_back_to_available_camera() {
        let devices = VirtualDevices::new();
        devices.set_cameras(vec![Facing::Environment]);
        let stream = devices
            .get_user_media(&StreamConstraints::ideal(Facing::User, 1080, 1920))
            .await
            .unwrap();
        assert_eq!(stream.facing(), Facing::Environment);
    }

    #[tokio::test]
    async fn recorder_drains_chunks_and_tail() {
        let devices = VirtualDevices::new();
        let stream = devices
            .get_user_media(&StreamConstraints::ideal(Facing::User, 1080, 1920))
            .await
            .unwrap();
        let mut recorder = devices.create_recorder(&stream, "video/webm").unwrap();
        recorder.start(Duration::from_secs(1)).unwrap();

        devices.push_chunk(Bytes::from_static(b"abc"));
        assert_eq!(recorder.take_available().unwrap().len(), 1);
        assert_eq!(recorder.stop(), vec![Bytes::from_static(TAIL_CHUNK)]);
    }
}
