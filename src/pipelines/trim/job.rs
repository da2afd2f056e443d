// SPDX-License-Identifier: MPL-2.0

//! Trim jobs
//!
//! A [`Trimmer`] is mounted when a clip is over the target length. It loads
//! its engine on first use, cuts `[start, start + target]` by stream copy and
//! publishes `{phase, progress}` snapshots. Scratch files are deleted after
//! every job, successful or not, and the same source can be trimmed again
//! after a failure.

use super::engine::TranscodeEngine;
use crate::config::TranscodeConfig;
use crate::constants::transcode::{INPUT_STEM, OUTPUT_STEM, THUMBNAIL_NAME};
use crate::errors::{MediaError, TranscodeError};
use crate::pipelines::capture::extension_for_mime;
use bytes::Bytes;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, Notify, watch};
use tracing::{debug, error, info, warn};

/// Selectable trim range over a source clip
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrimWindow {
    source_duration: Duration,
    target_duration: Duration,
    start: Duration,
}

impl TrimWindow {
    /// Window starting at zero
    pub fn new(source_duration: Duration, target_duration: Duration) -> Self {
        Self {
            source_duration,
            target_duration,
            start: Duration::ZERO,
        }
    }

    /// Whether a clip of `source_duration` must be trimmed at all
    pub fn needs_trim(source_duration: Duration, target_duration: Duration) -> bool {
        source_duration > target_duration
    }

    /// Latest selectable start, `max(0, source - target)`
    pub fn max_start(&self) -> Duration {
        self.source_duration.saturating_sub(self.target_duration)
    }

    /// Move the start, clamped into `[0, max_start]`; returns the applied value
    pub fn set_start(&mut self, start: Duration) -> Duration {
        self.start = start.min(self.max_start());
        self.start
    }

    pub fn with_start(mut self, start: Duration) -> Self {
        self.set_start(start);
        self
    }

    pub fn start(&self) -> Duration {
        self.start
    }

    /// `min(start + target, source)`
    pub fn end(&self) -> Duration {
        (self.start + self.target_duration).min(self.source_duration)
    }

    pub fn length(&self) -> Duration {
        self.end() - self.start
    }

    pub fn source_duration(&self) -> Duration {
        self.source_duration
    }
}

/// Stream-copy cut of `window` from `input` to `output`
///
/// Seeking before `-i` snaps to the preceding keyframe; timestamps are
/// rebased so the output starts at zero.
pub fn trim_args(input: &str, output: &str, window: &TrimWindow) -> Vec<String> {
    vec![
        "-ss".into(),
        seconds_arg(window.start()),
        "-i".into(),
        input.into(),
        "-t".into(),
        seconds_arg(window.length()),
        "-c".into(),
        "copy".into(),
        "-avoid_negative_ts".into(),
        "make_zero".into(),
        output.into(),
    ]
}

/// Single JPEG frame at `at`
pub fn thumbnail_args(input: &str, output: &str, at: Duration) -> Vec<String> {
    vec![
        "-ss".into(),
        seconds_arg(at),
        "-i".into(),
        input.into(),
        "-frames:v".into(),
        "1".into(),
        "-q:v".into(),
        "2".into(),
        output.into(),
    ]
}

fn seconds_arg(duration: Duration) -> String {
    format!("{:.3}", duration.as_secs_f64())
}

/// Trim job phase
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranscodePhase {
    /// Mounted, engine not requested yet
    Idle,
    LoadingEngine,
    Ready,
    Processing,
    Done,
    Failed(TranscodeError),
}

/// Snapshot published to the UI
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscodeJobState {
    pub phase: TranscodePhase,
    /// Percent, `0..=100`
    pub progress: u8,
}

impl TranscodeJobState {
    /// User-facing message for a failed job
    pub fn error_message(&self) -> Option<&'static str> {
        match &self.phase {
            TranscodePhase::Failed(TranscodeError::Media(e)) => Some(e.user_message()),
            TranscodePhase::Failed(_) => Some(MediaError::TranscodeFailed.user_message()),
            _ => None,
        }
    }
}

/// A clip to trim
#[derive(Debug, Clone)]
pub struct TrimRequest {
    pub source: Bytes,
    pub mime_type: String,
    pub source_duration: Duration,
    pub start: Duration,
}

/// A trimmed artifact, distinct from its source
#[derive(Debug, Clone, PartialEq)]
pub struct TrimmedClip {
    pub data: Bytes,
    pub mime_type: String,
    pub start: Duration,
    pub duration: Duration,
}

impl TrimmedClip {
    pub fn duration_seconds(&self) -> f64 {
        self.duration.as_secs_f64()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EngineSlot {
    Unloaded,
    Loaded,
}

/// Cancels the job currently running on a [`Trimmer`]
#[derive(Debug, Clone)]
pub struct AbortHandle {
    requested: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl AbortHandle {
    fn new() -> Self {
        Self {
            requested: Arc::new(AtomicBool::new(false)),
            notify: Arc::new(Notify::new()),
        }
    }

    pub fn abort(&self) {
        self.trip();
    }

    /// Set the flag and wake waiters; returns whether it was already set
    fn trip(&self) -> bool {
        let was_set = self.requested.swap(true, Ordering::SeqCst);
        self.notify.notify_waiters();
        was_set
    }

    fn is_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }

    fn reset(&self) {
        self.requested.store(false, Ordering::SeqCst);
    }

    async fn aborted(&self) {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.requested.load(Ordering::SeqCst) {
                return;
            }
            notified.await;
        }
    }
}

/// One mounted trimmer; exclusively owns its engine
pub struct Trimmer<E: TranscodeEngine> {
    engine: E,
    target_duration: Duration,
    slot: Mutex<EngineSlot>,
    /// Serialises jobs on the engine
    job: Mutex<()>,
    abort: AbortHandle,
    /// Never reset; once tripped the trimmer is finished
    shutdown: AbortHandle,
    state: watch::Sender<TranscodeJobState>,
}

impl<E: TranscodeEngine> Trimmer<E> {
    pub fn new(engine: E, config: &TranscodeConfig) -> Self {
        let (state, _) = watch::channel(TranscodeJobState {
            phase: TranscodePhase::Idle,
            progress: 0,
        });
        Self {
            engine,
            target_duration: config.target_duration,
            slot: Mutex::new(EngineSlot::Unloaded),
            job: Mutex::new(()),
            abort: AbortHandle::new(),
            shutdown: AbortHandle::new(),
            state,
        }
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn target_duration(&self) -> Duration {
        self.target_duration
    }

    /// Selectable window for a source of this length
    pub fn window(&self, source_duration: Duration) -> TrimWindow {
        TrimWindow::new(source_duration, self.target_duration)
    }

    pub fn state(&self) -> TranscodeJobState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<TranscodeJobState> {
        self.state.subscribe()
    }

    pub fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }

    /// Load the engine if needed; a failed load is retried on the next call
    ///
    /// [`terminate`](Self::terminate) abandons a load in flight, and a load
    /// that completes after termination is released again.
    pub async fn ensure_engine(&self) -> Result<(), TranscodeError> {
        let mut slot = tokio::select! {
            slot = self.slot.lock() => slot,
            _ = self.shutdown.aborted() => return Err(TranscodeError::Terminated),
        };
        if self.shutdown.is_requested() {
            return Err(TranscodeError::Terminated);
        }
        if *slot == EngineSlot::Loaded {
            return Ok(());
        }

        self.publish(TranscodePhase::LoadingEngine, 0);
        info!("Loading transcoding engine");
        let loaded = tokio::select! {
            result = self.engine.load() => result,
            _ = self.shutdown.aborted() => {
                info!("Engine load abandoned");
                self.publish(TranscodePhase::Failed(TranscodeError::Terminated), 0);
                return Err(TranscodeError::Terminated);
            }
        };
        if self.shutdown.is_requested() {
            if loaded.is_ok() {
                debug!("Releasing engine loaded after terminate");
                self.engine.terminate();
            }
            self.publish(TranscodePhase::Failed(TranscodeError::Terminated), 0);
            return Err(TranscodeError::Terminated);
        }

        match loaded {
            Ok(()) => {
                *slot = EngineSlot::Loaded;
                self.publish(TranscodePhase::Ready, 0);
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "Transcoding engine failed to load");
                let e = match e {
                    TranscodeError::Terminated => TranscodeError::Terminated,
                    _ => TranscodeError::Media(MediaError::EngineInitFailed),
                };
                self.publish(TranscodePhase::Failed(e.clone()), 0);
                Err(e)
            }
        }
    }

    /// Cut the request down to the target length
    pub async fn trim(&self, request: &TrimRequest) -> Result<TrimmedClip, TranscodeError> {
        if !TrimWindow::needs_trim(request.source_duration, self.target_duration) {
            return Err(TranscodeError::InvalidRange(format!(
                "clip is {:.1}s, already within {:.1}s",
                request.source_duration.as_secs_f64(),
                self.target_duration.as_secs_f64()
            )));
        }
        let window = self
            .window(request.source_duration)
            .with_start(request.start);
        if window.start() != request.start {
            debug!(requested = ?request.start, applied = ?window.start(), "Trim start clamped");
        }

        let extension = extension_for_mime(&request.mime_type);
        let input = format!("{}.{}", INPUT_STEM, extension);
        let output = format!("{}.{}", OUTPUT_STEM, extension);
        let args = trim_args(&input, &output, &window);

        info!(
            start = ?window.start(),
            end = ?window.end(),
            source = ?request.source_duration,
            "Trimming clip"
        );
        let data = self
            .run_job(&request.source, &input, &output, &args)
            .await?;

        Ok(TrimmedClip {
            data,
            mime_type: request.mime_type.clone(),
            start: window.start(),
            duration: window.length(),
        })
    }

    /// Grab one JPEG frame from `source` at `at`
    pub async fn extract_thumbnail(
        &self,
        source: &Bytes,
        mime_type: &str,
        at: Duration,
    ) -> Result<Bytes, TranscodeError> {
        let input = format!("{}.{}", INPUT_STEM, extension_for_mime(mime_type));
        let args = thumbnail_args(&input, THUMBNAIL_NAME, at);
        self.run_job(source, &input, THUMBNAIL_NAME, &args).await
    }

    /// Stop any job or engine load and release the engine
    ///
    /// Returns without waiting for the work it cancels. The trimmer is
    /// unusable afterwards.
    pub fn terminate(&self) {
        if self.shutdown.trip() {
            return;
        }
        self.abort.abort();
        self.engine.terminate();
        info!("Trimmer terminated");
    }

    pub fn is_terminated(&self) -> bool {
        self.shutdown.is_requested()
    }

    async fn run_job(
        &self,
        source: &Bytes,
        input: &str,
        output: &str,
        args: &[String],
    ) -> Result<Bytes, TranscodeError> {
        let _job = self.job.lock().await;
        self.abort.reset();
        self.ensure_engine().await?;

        self.publish(TranscodePhase::Processing, 0);
        let result = self
            .abortable(async {
                self.engine.write_file(input, source.clone()).await?;
                self.engine
                    .exec(args, &|ratio| self.report_progress(ratio))
                    .await?;
                self.engine.read_file(output).await
            })
            .await;

        for name in [input, output] {
            if let Err(e) = self.engine.delete_file(name).await {
                warn!(name, error = %e, "Failed to delete scratch file");
            }
        }

        match result {
            Ok(data) => {
                info!(bytes = data.len(), "Transcode finished");
                self.publish(TranscodePhase::Done, 100);
                Ok(data)
            }
            Err(e) => {
                let e = match e {
                    TranscodeError::Terminated => TranscodeError::Terminated,
                    TranscodeError::Media(m) => TranscodeError::Media(m),
                    _ => TranscodeError::Media(MediaError::TranscodeFailed),
                };
                error!(error = %e, "Transcode failed");
                let progress = self.state.borrow().progress;
                self.publish(TranscodePhase::Failed(e.clone()), progress);
                Err(e)
            }
        }
    }

    async fn abortable<T>(
        &self,
        work: impl Future<Output = Result<T, TranscodeError>>,
    ) -> Result<T, TranscodeError> {
        tokio::select! {
            result = work => result,
            _ = self.abort.aborted() => {
                info!("Transcode aborted");
                Err(TranscodeError::Terminated)
            }
        }
    }

    fn report_progress(&self, ratio: f32) {
        let percent = (ratio.clamp(0.0, 1.0) * 100.0).round() as u8;
        self.state.send_if_modified(|state| {
            if state.phase == TranscodePhase::Processing && percent > state.progress {
                state.progress = percent;
                true
            } else {
                false
            }
        });
    }

    fn publish(&self, phase: TranscodePhase, progress: u8) {
        self.state.send_replace(TranscodeJobState { phase, progress });
    }
}

impl<E: TranscodeEngine> Drop for Trimmer<E> {
    fn drop(&mut self) {
        if !self.shutdown.is_requested() {
            self.engine.terminate();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    #[test]
    fn test_window_clamps_start() {
        let mut window = TrimWindow::new(secs(25), secs(10));
        assert_eq!(window.max_start(), secs(15));
        assert_eq!(window.set_start(secs(40)), secs(15));
        assert_eq!(window.end(), secs(25));
        assert_eq!(window.length(), secs(10));
    }

    #[test]
    fn test_window_for_short_source() {
        let window = TrimWindow::new(secs(6), secs(10)).with_start(secs(3));
        assert_eq!(window.max_start(), Duration::ZERO);
        assert_eq!(window.start(), Duration::ZERO);
        assert_eq!(window.end(), secs(6));
    }

    #[test]
    fn test_trim_args_stream_copy() {
        let window = TrimWindow::new(secs(25), secs(10)).with_start(Duration::from_millis(2500));
        let args = trim_args("input.webm", "output.webm", &window);
        let joined = args.join(" ");
        assert_eq!(
            joined,
            "-ss 2.500 -i input.webm -t 10.000 -c copy -avoid_negative_ts make_zero output.webm"
        );
    }

    #[test]
    fn test_error_message_never_raw() {
        let state = TranscodeJobState {
            phase: TranscodePhase::Failed(TranscodeError::Io("disk full".into())),
            progress: 40,
        };
        assert_eq!(
            state.error_message(),
            Some(MediaError::TranscodeFailed.user_message())
        );
    }
}
