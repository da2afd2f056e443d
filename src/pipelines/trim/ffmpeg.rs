// SPDX-License-Identifier: MPL-2.0

//! ffmpeg command-line engine
//!
//! The scratch filesystem is a private temporary directory; commands run with
//! it as their working directory so bare file names resolve inside it.
//! Progress comes from `-progress pipe:1` key/value lines.

use super::engine::{ProgressFn, TranscodeEngine};
use crate::errors::{MediaError, TranscodeError};
use bytes::Bytes;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};

/// Flags prepended to every command
const BASE_ARGS: &[&str] = &[
    "-hide_banner",
    "-nostdin",
    "-nostats",
    "-y",
    "-progress",
    "pipe:1",
];

#[derive(Default)]
struct EngineState {
    binary: Option<PathBuf>,
    workdir: Option<TempDir>,
    terminated: bool,
}

/// Transcoder backed by the ffmpeg binary
pub struct FfmpegEngine {
    configured: Option<PathBuf>,
    state: Mutex<EngineState>,
    cancel: Notify,
}

impl FfmpegEngine {
    /// Use `configured` when it exists, otherwise look `ffmpeg` up on PATH
    pub fn new(configured: Option<PathBuf>) -> Self {
        Self {
            configured,
            state: Mutex::new(EngineState::default()),
            cancel: Notify::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, EngineState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn locate_binary(&self) -> Option<PathBuf> {
        if let Some(path) = &self.configured {
            if path.exists() {
                return Some(path.clone());
            }
            warn!(path = %path.display(), "Configured ffmpeg not found, falling back to PATH");
        }
        which::which("ffmpeg").ok()
    }

    /// Binary and scratch directory of a loaded engine
    fn session(&self) -> Result<(PathBuf, PathBuf), TranscodeError> {
        let state = self.lock();
        if state.terminated {
            return Err(TranscodeError::Terminated);
        }
        match (&state.binary, &state.workdir) {
            (Some(binary), Some(dir)) => Ok((binary.clone(), dir.path().to_path_buf())),
            _ => Err(TranscodeError::Media(MediaError::EngineInitFailed)),
        }
    }

    fn scratch_path(&self, name: &str) -> Result<PathBuf, TranscodeError> {
        let (_, dir) = self.session()?;
        let plain = Path::new(name)
            .file_name()
            .is_some_and(|file| file == name);
        if !plain {
            return Err(TranscodeError::Io(format!("invalid scratch file name: {}", name)));
        }
        Ok(dir.join(name))
    }
}

impl TranscodeEngine for FfmpegEngine {
    async fn load(&self) -> Result<(), TranscodeError> {
        if self.lock().terminated {
            return Err(TranscodeError::Terminated);
        }

        let Some(binary) = self.locate_binary() else {
            error!("ffmpeg not found");
            return Err(TranscodeError::Media(MediaError::EngineInitFailed));
        };

        let output = Command::new(&binary)
            .arg("-version")
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| {
                error!(error = %e, binary = %binary.display(), "Failed to run ffmpeg");
                TranscodeError::Media(MediaError::EngineInitFailed)
            })?;
        if !output.status.success() {
            error!(status = ?output.status, "ffmpeg -version failed");
            return Err(TranscodeError::Media(MediaError::EngineInitFailed));
        }
        let version = String::from_utf8_lossy(&output.stdout)
            .lines()
            .next()
            .unwrap_or_default()
            .to_string();

        let workdir = tempfile::Builder::new()
            .prefix("reel-media-")
            .tempdir()
            .map_err(|e| {
                error!(error = %e, "Failed to create scratch directory");
                TranscodeError::Media(MediaError::EngineInitFailed)
            })?;

        info!(%version, scratch = %workdir.path().display(), "ffmpeg engine loaded");
        let mut state = self.lock();
        state.binary = Some(binary);
        state.workdir = Some(workdir);
        Ok(())
    }

    async fn write_file(&self, name: &str, data: Bytes) -> Result<(), TranscodeError> {
        let path = self.scratch_path(name)?;
        tokio::fs::write(&path, &data).await?;
        debug!(name, bytes = data.len(), "Wrote scratch file");
        Ok(())
    }

    async fn exec(&self, args: &[String], progress: ProgressFn<'_>) -> Result<(), TranscodeError> {
        let (binary, dir) = self.session()?;
        let total = expected_duration(args);
        debug!(?args, ?total, "Running ffmpeg");

        let mut child = Command::new(&binary)
            .current_dir(&dir)
            .args(BASE_ARGS)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                error!(error = %e, "Failed to spawn ffmpeg");
                TranscodeError::Media(MediaError::TranscodeFailed)
            })?;

        let (Some(stdout), Some(mut stderr)) = (child.stdout.take(), child.stderr.take()) else {
            return Err(TranscodeError::Media(MediaError::TranscodeFailed));
        };
        let stderr_task = tokio::spawn(async move {
            let mut text = String::new();
            let _ = stderr.read_to_string(&mut text).await;
            text
        });

        let run = async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Some(line) = lines.next_line().await? {
                if let Some(ratio) = parse_progress_line(&line, total) {
                    progress(ratio);
                }
            }
            child.wait().await
        };

        let status = tokio::select! {
            status = run => status?,
            _ = self.cancel.notified() => {
                // Dropping `run` kills the child
                info!("ffmpeg command cancelled");
                stderr_task.abort();
                return Err(TranscodeError::Terminated);
            }
        };

        let stderr_text = stderr_task.await.unwrap_or_default();
        if !status.success() {
            let tail: Vec<&str> = stderr_text.lines().rev().take(5).collect();
            error!(?status, stderr = ?tail, "ffmpeg command failed");
            return Err(TranscodeError::Media(MediaError::TranscodeFailed));
        }
        Ok(())
    }

    async fn read_file(&self, name: &str) -> Result<Bytes, TranscodeError> {
        let path = self.scratch_path(name)?;
        let data = tokio::fs::read(&path).await?;
        Ok(Bytes::from(data))
    }

    async fn delete_file(&self, name: &str) -> Result<(), TranscodeError> {
        let path = match self.scratch_path(name) {
            Ok(path) => path,
            // Nothing left to delete once the scratch directory is gone
            Err(TranscodeError::Terminated) => return Ok(()),
            Err(e) => return Err(e),
        };
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn terminate(&self) {
        let workdir = {
            let mut state = self.lock();
            if state.terminated {
                return;
            }
            state.terminated = true;
            state.workdir.take()
        };
        self.cancel.notify_waiters();
        // TempDir removes the scratch directory on drop
        drop(workdir);
        info!("ffmpeg engine terminated");
    }
}

impl Drop for FfmpegEngine {
    fn drop(&mut self) {
        self.terminate();
    }
}

/// Length of the output as given by `-t`, used to turn timestamps into a ratio
fn expected_duration(args: &[String]) -> Option<Duration> {
    let value = args
        .iter()
        .position(|a| a == "-t")
        .and_then(|i| args.get(i + 1))?;
    value
        .parse::<f64>()
        .ok()
        .filter(|secs| secs.is_finite() && *secs > 0.0)
        .map(Duration::from_secs_f64)
}

/// Turn one `-progress` line into a completion ratio
///
/// Both `out_time_us` and the misnamed `out_time_ms` carry microseconds.
fn parse_progress_line(line: &str, total: Option<Duration>) -> Option<f32> {
    let (key, value) = line.trim().split_once('=')?;
    match key {
        "progress" if value == "end" => Some(1.0),
        "out_time_us" | "out_time_ms" => {
            let total = total?;
            let micros = value.parse::<u64>().ok()?;
            let ratio = Duration::from_micros(micros).as_secs_f64() / total.as_secs_f64();
            Some(ratio.clamp(0.0, 1.0) as f32)
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_expected_duration_from_t() {
        let a = args(&["-ss", "2.000", "-i", "input.webm", "-t", "10.000", "output.webm"]);
        assert_eq!(expected_duration(&a), Some(Duration::from_secs(10)));
        assert_eq!(expected_duration(&args(&["-i", "x"])), None);
    }

    #[test]
    fn test_parse_progress_line() {
        let total = Some(Duration::from_secs(10));
        assert_eq!(parse_progress_line("out_time_us=5000000", total), Some(0.5));
        assert_eq!(parse_progress_line("out_time_ms=20000000", total), Some(1.0));
        assert_eq!(parse_progress_line("progress=end", None), Some(1.0));
        assert_eq!(parse_progress_line("progress=continue", total), None);
        assert_eq!(parse_progress_line("out_time_us=N/A", total), None);
        assert_eq!(parse_progress_line("out_time_us=100", None), None);
    }

    #[tokio::test]
    async fn test_unloaded_engine_rejects_commands() {
        let engine = FfmpegEngine::new(None);
        let result = engine.exec(&args(&["-version"]), &|_| {}).await;
        assert_eq!(result, Err(TranscodeError::Media(MediaError::EngineInitFailed)));
    }

    #[tokio::test]
    async fn test_terminated_engine_refuses_to_load() {
        let engine = FfmpegEngine::new(Some(PathBuf::from("/nonexistent/ffmpeg")));
        engine.terminate();
        assert_eq!(engine.load().await, Err(TranscodeError::Terminated));
        assert_eq!(engine.delete_file("input.webm").await, Ok(()));
    }

    #[test]
    fn test_scratch_names_must_be_plain() {
        let engine = FfmpegEngine::new(None);
        engine.lock().binary = Some(PathBuf::from("ffmpeg"));
        engine.lock().workdir = Some(tempfile::tempdir().unwrap());
        assert!(engine.scratch_path("input.webm").is_ok());
        assert!(engine.scratch_path("../escape").is_err());
        assert!(engine.scratch_path("a/b").is_err());
    }
}
