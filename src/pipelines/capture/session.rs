// SPDX-License-Identifier: MPL-2.0

//! Capture session state machine
//!
//! ```text
//! idle ──acquire──▶ requesting ──ok──▶ ready ──start──▶ recording ──stop/cutoff──▶ stopped
//!                        │                                   │                        │
//!                        └──fail──▶ error ◀──hardware fault──┘        reset ──▶ idle ◀┘
//!                                                                     retake ─▶ recording
//! ```
//!
//! The session exclusively owns its stream, recorder and preview URL. A stream
//! exists only in `ready`/`recording`; every other transition tears it down
//! before anything new is requested. Elapsed time is republished on every
//! animation frame, and a timer at `max_duration` backs the cutoff in case
//! frames are throttled.
//!
//! Acquisition is the only suspension point. The lock is never held across
//! it; a generation counter discards results that arrive after a teardown,
//! reset or newer request.

use super::acquisition::{StreamAcquisition, classify};
use super::format::{RecordingFormat, select_recording_format};
use crate::backends::{DeviceFailure, Facing, MediaDevices, MediaRecorder, MediaStream};
use crate::blob::{BlobLifecycle, BlobPurpose, ObjectUrl, ObjectUrlStore};
use crate::config::CaptureConfig;
use crate::errors::{CaptureError, MediaError};
use crate::scheduler::{FrameId, Scheduler, TimerId, Wakeup};
use bytes::{Bytes, BytesMut};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Capture lifecycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureState {
    Idle,
    Requesting,
    Ready,
    Recording,
    Stopped,
    Error(CaptureError),
}

impl CaptureState {
    pub fn name(&self) -> &'static str {
        match self {
            CaptureState::Idle => "idle",
            CaptureState::Requesting => "requesting",
            CaptureState::Ready => "ready",
            CaptureState::Recording => "recording",
            CaptureState::Stopped => "stopped",
            CaptureState::Error(_) => "error",
        }
    }

    pub fn is_recording(&self) -> bool {
        matches!(self, CaptureState::Recording)
    }
}

/// A finished recording, handed to the upload collaborator
#[derive(Debug, Clone, PartialEq)]
pub struct CapturedClip {
    pub data: Bytes,
    pub mime_type: String,
    pub duration: Duration,
    pub has_audio: bool,
}

impl CapturedClip {
    pub fn duration_seconds(&self) -> f64 {
        self.duration.as_secs_f64()
    }

    /// Whether the clip needs trimming to fit `limit`
    pub fn exceeds(&self, limit: Duration) -> bool {
        self.duration > limit
    }
}

/// Why a recording ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    User,
    MaxDuration,
}

/// What the UI renders
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureSnapshot {
    pub state: CaptureState,
    pub facing: Facing,
    pub elapsed: Duration,
    pub max_duration: Duration,
    pub has_audio: bool,
}

impl CaptureSnapshot {
    /// Recording progress in `0.0..=1.0`
    pub fn progress(&self) -> f32 {
        if self.max_duration.is_zero() {
            return 0.0;
        }
        (self.elapsed.as_secs_f32() / self.max_duration.as_secs_f32()).clamp(0.0, 1.0)
    }

    /// Non-blocking warning for a video-only stream
    pub fn audio_warning(&self) -> Option<&'static str> {
        match self.state {
            CaptureState::Ready | CaptureState::Recording if !self.has_audio => {
                Some("Microphone unavailable. Recording without sound.")
            }
            _ => None,
        }
    }
}

struct Inner<R> {
    state: CaptureState,
    facing: Facing,
    stream: Option<MediaStream>,
    has_audio: bool,
    recorder: Option<R>,
    format: Option<RecordingFormat>,
    chunks: Vec<Bytes>,
    started_at: Duration,
    elapsed: Duration,
    frame: Option<FrameId>,
    cutoff: Option<TimerId>,
    clip: Option<CapturedClip>,
    preview: Option<ObjectUrl>,
    generation: u64,
    closed: bool,
}

/// One capture UI instance
pub struct CaptureSession<D: MediaDevices> {
    devices: Arc<D>,
    acquisition: StreamAcquisition<D>,
    scheduler: Arc<dyn Scheduler>,
    blobs: BlobLifecycle,
    config: CaptureConfig,
    inner: Mutex<Inner<D::Recorder>>,
    snapshots: watch::Sender<CaptureSnapshot>,
}

impl<D: MediaDevices> CaptureSession<D> {
    pub fn new(
        devices: Arc<D>,
        scheduler: Arc<dyn Scheduler>,
        url_store: Arc<dyn ObjectUrlStore>,
        config: CaptureConfig,
    ) -> Self {
        let facing = Facing::default();
        let (snapshots, _) = watch::channel(CaptureSnapshot {
            state: CaptureState::Idle,
            facing,
            elapsed: Duration::ZERO,
            max_duration: config.max_duration,
            has_audio: false,
        });

        Self {
            acquisition: StreamAcquisition::new(Arc::clone(&devices), &config),
            devices,
            scheduler,
            blobs: BlobLifecycle::new(format!("capture-{}", uuid::Uuid::new_v4()), url_store),
            config,
            inner: Mutex::new(Inner {
                state: CaptureState::Idle,
                facing,
                stream: None,
                has_audio: false,
                recorder: None,
                format: None,
                chunks: Vec::new(),
                started_at: Duration::ZERO,
                elapsed: Duration::ZERO,
                frame: None,
                cutoff: None,
                clip: None,
                preview: None,
                generation: 0,
                closed: false,
            }),
            snapshots,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner<D::Recorder>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> CaptureState {
        self.lock().state.clone()
    }

    pub fn facing(&self) -> Facing {
        self.lock().facing
    }

    pub fn snapshot(&self) -> CaptureSnapshot {
        self.snapshots.borrow().clone()
    }

    /// Receive a snapshot on every transition and every recording frame
    pub fn subscribe(&self) -> watch::Receiver<CaptureSnapshot> {
        self.snapshots.subscribe()
    }

    /// The finished clip, available in `stopped`
    pub fn clip(&self) -> Option<CapturedClip> {
        self.lock().clip.clone()
    }

    /// Object URL previewing the finished clip
    pub fn preview_url(&self) -> Option<ObjectUrl> {
        self.lock().preview.clone()
    }

    /// Object URLs owned by this session
    pub fn blobs(&self) -> &BlobLifecycle {
        &self.blobs
    }

    /// Register a thumbnail extracted from the clip against this session
    pub fn register_thumbnail(&self, jpeg: Bytes) -> ObjectUrl {
        self.blobs.register(jpeg, "image/jpeg", BlobPurpose::Thumbnail)
    }

    /// `idle`/`error` → `requesting` → `ready`/`error`
    pub async fn acquire(&self) -> Result<(), CaptureError> {
        let (generation, facing) = {
            let mut inner = self.lock();
            if inner.closed {
                return Err(CaptureError::Aborted);
            }
            match inner.state {
                CaptureState::Idle | CaptureState::Error(_) => {}
                ref other => {
                    return Err(CaptureError::InvalidTransition {
                        action: "acquire the camera",
                        state: other.name(),
                    });
                }
            }
            self.begin_request(&mut inner)
        };
        self.complete_request(generation, facing).await
    }

    /// Swap to the other camera; rejected while recording
    pub async fn switch_camera(&self) -> Result<(), CaptureError> {
        let (generation, facing) = {
            let mut inner = self.lock();
            if inner.closed {
                return Err(CaptureError::Aborted);
            }
            match inner.state {
                CaptureState::Recording => {
                    warn!("Camera switch rejected while recording");
                    return Err(CaptureError::SwitchWhileRecording);
                }
                CaptureState::Requesting => {
                    return Err(CaptureError::InvalidTransition {
                        action: "switch camera",
                        state: "requesting",
                    });
                }
                CaptureState::Ready => {}
                _ => {
                    // Nothing open; the next acquire uses the new facing
                    inner.facing = inner.facing.toggled();
                    info!(facing = %inner.facing, "Camera facing changed");
                    self.publish(&inner);
                    return Ok(());
                }
            }

            inner.facing = inner.facing.toggled();
            info!(facing = %inner.facing, "Switching camera");
            Self::release_stream(&mut inner);
            self.begin_request(&mut inner)
        };
        self.complete_request(generation, facing).await
    }

    /// `ready` → `recording`
    pub fn start(&self) -> Result<(), CaptureError> {
        let mut inner = self.lock();
        self.start_locked(&mut inner)
    }

    /// `recording` → `stopped`, returning the clip
    pub fn stop(&self) -> Result<CapturedClip, CaptureError> {
        let mut inner = self.lock();
        if !inner.state.is_recording() {
            return Err(CaptureError::InvalidTransition {
                action: "stop",
                state: inner.state.name(),
            });
        }
        self.finish_recording(&mut inner, StopReason::User);
        inner.clip.clone().ok_or(CaptureError::NoLiveStream)
    }

    /// Release the clip and stream and go back to `idle`
    pub fn reset(&self) {
        let mut inner = self.lock();
        // Any in-flight acquisition is now stale
        inner.generation += 1;
        self.release_all(&mut inner);
        inner.state = CaptureState::Idle;
        info!("Capture session reset");
        self.publish(&inner);
    }

    /// `stopped` → release → re-acquire → `recording`
    pub async fn retake(&self) -> Result<(), CaptureError> {
        let (generation, facing) = {
            let mut inner = self.lock();
            if inner.closed {
                return Err(CaptureError::Aborted);
            }
            if inner.state != CaptureState::Stopped {
                return Err(CaptureError::InvalidTransition {
                    action: "retake",
                    state: inner.state.name(),
                });
            }
            self.release_all(&mut inner);
            info!("Retaking clip");
            self.begin_request(&mut inner)
        };
        self.complete_request(generation, facing).await?;
        self.start()
    }

    /// Release everything; the session cannot be used afterwards
    pub fn teardown(&self) {
        let mut inner = self.lock();
        if inner.closed {
            return;
        }
        inner.closed = true;
        inner.generation += 1;
        self.release_all(&mut inner);
        inner.state = CaptureState::Idle;
        self.blobs.teardown();
        info!("Capture session torn down");
        self.publish(&inner);
    }

    /// Route a scheduler wakeup; returns whether it belonged to this session
    pub fn handle_wakeup(&self, wakeup: Wakeup) -> bool {
        let mut inner = self.lock();
        match wakeup {
            Wakeup::Frame(id) if inner.frame == Some(id) => {
                inner.frame = None;
                self.on_frame(&mut inner);
                true
            }
            Wakeup::Timer(id) if inner.cutoff == Some(id) => {
                inner.cutoff = None;
                if inner.state.is_recording() {
                    info!("Maximum clip duration reached");
                    self.finish_recording(&mut inner, StopReason::MaxDuration);
                }
                true
            }
            _ => false,
        }
    }

    fn begin_request(&self, inner: &mut Inner<D::Recorder>) -> (u64, Facing) {
        inner.generation += 1;
        inner.state = CaptureState::Requesting;
        self.publish(inner);
        (inner.generation, inner.facing)
    }

    async fn complete_request(&self, generation: u64, facing: Facing) -> Result<(), CaptureError> {
        let result = self.acquisition.acquire(facing).await;

        let mut inner = self.lock();
        if inner.closed || inner.generation != generation {
            if let Ok(acquired) = result {
                info!(stream = %acquired.stream.id(), "Discarding stream acquired after teardown");
                acquired.stream.stop_all();
            }
            return Err(CaptureError::Aborted);
        }

        match result {
            Ok(acquired) => {
                inner.has_audio = acquired.has_audio;
                inner.stream = Some(acquired.stream);
                inner.state = CaptureState::Ready;
                self.publish(&inner);
                Ok(())
            }
            Err(e) => {
                inner.state = CaptureState::Error(CaptureError::Media(e));
                self.publish(&inner);
                Err(CaptureError::Media(e))
            }
        }
    }

    fn start_locked(&self, inner: &mut Inner<D::Recorder>) -> Result<(), CaptureError> {
        if inner.closed {
            return Err(CaptureError::Aborted);
        }
        if inner.state != CaptureState::Ready {
            return Err(CaptureError::InvalidTransition {
                action: "start recording",
                state: inner.state.name(),
            });
        }
        let live = inner.stream.as_ref().is_some_and(MediaStream::video_live);
        if !live {
            return Err(CaptureError::NoLiveStream);
        }

        let format = match select_recording_format(&self.devices.capabilities()) {
            Ok(format) => format,
            Err(e) => return Err(self.fail(inner, e)),
        };

        let recorder = match inner.stream.as_ref() {
            Some(stream) => self.devices.create_recorder(stream, &format.mime_type),
            None => return Err(CaptureError::NoLiveStream),
        };
        let mut recorder = match recorder {
            Ok(recorder) => recorder,
            Err(failure) => {
                error!(raw = %failure.message, mime = %format.mime_type, "Failed to create recorder");
                return Err(self.fail(inner, MediaError::RecorderUnsupported));
            }
        };
        if let Err(failure) = recorder.start(self.config.time_slice) {
            error!(raw = %failure.message, "Failed to start recorder");
            return Err(self.fail(inner, MediaError::RecorderUnsupported));
        }

        info!(mime = %format.mime_type, max = ?self.config.max_duration, "Recording started");
        inner.chunks.clear();
        inner.recorder = Some(recorder);
        inner.format = Some(format);
        inner.started_at = self.scheduler.now();
        inner.elapsed = Duration::ZERO;
        inner.frame = Some(self.scheduler.request_frame());
        inner.cutoff = Some(self.scheduler.set_timeout(self.config.max_duration));
        inner.state = CaptureState::Recording;
        self.publish(inner);
        Ok(())
    }

    fn on_frame(&self, inner: &mut Inner<D::Recorder>) {
        if !inner.state.is_recording() {
            return;
        }

        inner.elapsed = self.clamped_elapsed(inner);

        let drained = inner.recorder.as_mut().map(MediaRecorder::take_available);
        match drained {
            Some(Ok(chunks)) => inner.chunks.extend(chunks),
            Some(Err(failure)) => {
                self.hardware_failure(inner, &failure);
                return;
            }
            None => {}
        }

        let video_live = inner.stream.as_ref().is_some_and(MediaStream::video_live);
        if !video_live {
            self.hardware_failure(
                inner,
                &DeviceFailure::from_name("NotFoundError", "Video track ended during recording"),
            );
            return;
        }

        if inner.elapsed >= self.config.max_duration {
            info!("Maximum clip duration reached");
            self.finish_recording(inner, StopReason::MaxDuration);
        } else {
            inner.frame = Some(self.scheduler.request_frame());
            self.publish(inner);
        }
    }

    fn clamped_elapsed(&self, inner: &Inner<D::Recorder>) -> Duration {
        self.scheduler
            .now()
            .saturating_sub(inner.started_at)
            .min(self.config.max_duration)
    }

    fn finish_recording(&self, inner: &mut Inner<D::Recorder>, reason: StopReason) {
        self.cancel_timers(inner);
        let duration = self.clamped_elapsed(inner);

        if let Some(mut recorder) = inner.recorder.take() {
            match recorder.take_available() {
                Ok(chunks) => inner.chunks.extend(chunks),
                Err(failure) => {
                    recorder.stop();
                    self.hardware_failure(inner, &failure);
                    return;
                }
            }
            inner.chunks.extend(recorder.stop());
        }

        let mut data = BytesMut::with_capacity(inner.chunks.iter().map(Bytes::len).sum());
        for chunk in inner.chunks.drain(..) {
            data.extend_from_slice(&chunk);
        }
        let mime_type = inner
            .format
            .take()
            .map(|f| f.mime_type)
            .unwrap_or_default();

        let clip = CapturedClip {
            data: data.freeze(),
            mime_type,
            duration,
            has_audio: inner.has_audio,
        };
        info!(?reason, duration = ?clip.duration, bytes = clip.data.len(), "Recording stopped");

        Self::release_stream(inner);
        inner.preview = Some(self.blobs.register(
            clip.data.clone(),
            &clip.mime_type,
            BlobPurpose::CapturePreview,
        ));
        inner.elapsed = duration;
        inner.clip = Some(clip);
        inner.state = CaptureState::Stopped;
        self.publish(inner);
    }

    fn hardware_failure(&self, inner: &mut Inner<D::Recorder>, failure: &DeviceFailure) {
        let error = classify(failure);
        error!(raw = %failure.message, ?error, "Hardware failure during recording");
        self.release_all(inner);
        inner.state = CaptureState::Error(CaptureError::Media(error));
        self.publish(inner);
    }

    fn fail(&self, inner: &mut Inner<D::Recorder>, error: MediaError) -> CaptureError {
        self.release_all(inner);
        inner.state = CaptureState::Error(CaptureError::Media(error));
        self.publish(inner);
        CaptureError::Media(error)
    }

    fn cancel_timers(&self, inner: &mut Inner<D::Recorder>) {
        if let Some(frame) = inner.frame.take() {
            self.scheduler.cancel_frame(frame);
        }
        if let Some(timer) = inner.cutoff.take() {
            self.scheduler.cancel_timeout(timer);
        }
    }

    fn release_stream(inner: &mut Inner<D::Recorder>) {
        if let Some(stream) = inner.stream.take() {
            stream.stop_all();
            debug!(stream = %stream.id(), "Stream released");
        }
    }

    /// Drop stream, recorder, buffered data, clip and preview
    fn release_all(&self, inner: &mut Inner<D::Recorder>) {
        self.cancel_timers(inner);
        if let Some(mut recorder) = inner.recorder.take() {
            recorder.stop();
        }
        inner.chunks.clear();
        inner.format = None;
        Self::release_stream(inner);
        inner.clip = None;
        if let Some(url) = inner.preview.take() {
            self.blobs.release(&url);
        }
        inner.elapsed = Duration::ZERO;
    }

    fn publish(&self, inner: &Inner<D::Recorder>) {
        self.snapshots.send_replace(CaptureSnapshot {
            state: inner.state.clone(),
            facing: inner.facing,
            elapsed: inner.elapsed,
            max_duration: self.config.max_duration,
            has_audio: inner.has_audio,
        });
    }
}

impl<D: MediaDevices> Drop for CaptureSession<D> {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::VirtualDevices;
    use crate::blob::MemoryUrlStore;
    use crate::scheduler::ManualScheduler;

    struct Fixture {
        devices: Arc<VirtualDevices>,
        scheduler: Arc<ManualScheduler>,
        store: Arc<MemoryUrlStore>,
        session: CaptureSession<VirtualDevices>,
    }

    fn fixture() -> Fixture {
        let devices = Arc::new(VirtualDevices::new());
        let scheduler = ManualScheduler::shared();
        let store = Arc::new(MemoryUrlStore::new());
        let session = CaptureSession::new(
            Arc::clone(&devices),
            scheduler.clone(),
            store.clone(),
            CaptureConfig::default(),
        );
        Fixture {
            devices,
            scheduler,
            store,
            session,
        }
    }

    fn run_frames(f: &Fixture, total: Duration) {
        let step = Duration::from_millis(16);
        let mut elapsed = Duration::ZERO;
        while elapsed < total {
            for wakeup in f.scheduler.advance(step) {
                f.session.handle_wakeup(wakeup);
            }
            elapsed += step;
        }
    }

    #[tokio::test]
    async fn start_requires_ready() {
        let f = fixture();
        assert!(matches!(
            f.session.start(),
            Err(CaptureError::InvalidTransition { .. })
        ));
    }

    #[tokio::test]
    async fn elapsed_published_per_frame() {
        let f = fixture();
        f.session.acquire().await.unwrap();
        f.session.start().unwrap();
        let mut updates = f.session.subscribe();
        updates.borrow_and_update();

        run_frames(&f, Duration::from_millis(500));
        assert!(updates.has_changed().unwrap());
        let snapshot = f.session.snapshot();
        assert!(snapshot.elapsed >= Duration::from_millis(450));
        assert!(snapshot.progress() > 0.0);
    }

    #[tokio::test]
    async fn stop_releases_stream_and_registers_preview() {
        let f = fixture();
        f.session.acquire().await.unwrap();
        f.session.start().unwrap();
        f.devices.push_chunk(Bytes::from_static(b"chunk-1"));
        run_frames(&f, Duration::from_secs(3));

        let clip = f.session.stop().unwrap();
        assert!(clip.data.starts_with(b"chunk-1"));
        assert!(clip.duration >= Duration::from_secs(2));
        assert!(f.devices.all_tracks_ended());
        assert_eq!(f.store.live_count(), 1);
        assert_eq!(f.scheduler.pending_timers(), 0);

        f.session.reset();
        assert_eq!(f.store.live_count(), 0);
        assert_eq!(f.session.state(), CaptureState::Idle);
    }

    #[tokio::test]
    async fn recorder_fault_discards_partial_data() {
        let f = fixture();
        f.session.acquire().await.unwrap();
        f.session.start().unwrap();
        f.devices.push_chunk(Bytes::from_static(b"partial"));
        run_frames(&f, Duration::from_millis(100));

        f.devices.fault_recorder();
        run_frames(&f, Duration::from_millis(32));

        assert!(matches!(f.session.state(), CaptureState::Error(_)));
        assert!(f.session.clip().is_none());
        assert!(f.devices.all_tracks_ended());
    }

    #[tokio::test]
    async fn unplugged_camera_forces_error() {
        let f = fixture();
        f.session.acquire().await.unwrap();
        f.session.start().unwrap();
        for track in f.devices.tracks() {
            track.end_externally();
        }
        run_frames(&f, Duration::from_millis(32));
        assert_eq!(
            f.session.state(),
            CaptureState::Error(CaptureError::Media(MediaError::DeviceNotFound))
        );
    }

    #[test]
    fn audio_warning_only_without_audio() {
        let snapshot = CaptureSnapshot {
            state: CaptureState::Ready,
            facing: Facing::User,
            elapsed: Duration::ZERO,
            max_duration: Duration::from_secs(10),
            has_audio: false,
        };
        assert!(snapshot.audio_warning().is_some());
        let with_audio = CaptureSnapshot {
            has_audio: true,
            ..snapshot
        };
        assert!(with_audio.audio_warning().is_none());
    }
}
