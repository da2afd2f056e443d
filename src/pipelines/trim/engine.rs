// SPDX-License-Identifier: MPL-2.0

//! Transcoding engine seam
//!
//! An engine is loaded once, owns a private scratch filesystem addressed by
//! bare file names, and runs ffmpeg-style argument lists against it.

use crate::errors::{MediaError, TranscodeError};
use bytes::Bytes;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::debug;

/// Fractional progress callback, `0.0..=1.0`
pub type ProgressFn<'a> = &'a (dyn Fn(f32) + Send + Sync);

/// A loadable transcoder with its own scratch filesystem
pub trait TranscodeEngine: Send + Sync + 'static {
    /// Bring the engine up; may be called again after a failed attempt
    fn load(&self) -> impl Future<Output = Result<(), TranscodeError>> + Send;

    fn write_file(
        &self,
        name: &str,
        data: Bytes,
    ) -> impl Future<Output = Result<(), TranscodeError>> + Send;

    /// Run one command, reporting the engine's own progress events
    fn exec(
        &self,
        args: &[String],
        progress: ProgressFn<'_>,
    ) -> impl Future<Output = Result<(), TranscodeError>> + Send;

    fn read_file(&self, name: &str) -> impl Future<Output = Result<Bytes, TranscodeError>> + Send;

    /// Delete a scratch file; deleting a missing file is not an error
    fn delete_file(&self, name: &str) -> impl Future<Output = Result<(), TranscodeError>> + Send;

    /// Stop any running command and release the engine for good
    fn terminate(&self);
}

#[derive(Debug, Default)]
struct ScriptedState {
    fail_load: bool,
    fail_exec: bool,
    exec_delay: Option<Duration>,
    load_delay: Option<Duration>,
    loads: usize,
    files: HashMap<String, Bytes>,
    deleted: Vec<String>,
    commands: Vec<Vec<String>>,
    terminated: bool,
}

/// In-memory engine whose outcomes can be scripted
///
/// `exec` copies the `-i` input to the final argument, reporting progress in
/// quarters, unless told to fail or stall.
#[derive(Debug, Default)]
pub struct ScriptedEngine {
    state: Mutex<ScriptedState>,
}

impl ScriptedEngine {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, ScriptedState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_fail_load(&self, fail: bool) {
        self.lock().fail_load = fail;
    }

    pub fn set_fail_exec(&self, fail: bool) {
        self.lock().fail_exec = fail;
    }

    /// Make every command take `delay` before finishing
    pub fn set_exec_delay(&self, delay: Option<Duration>) {
        self.lock().exec_delay = delay;
    }

    /// Make every load take `delay` before finishing
    pub fn set_load_delay(&self, delay: Option<Duration>) {
        self.lock().load_delay = delay;
    }

    /// Successful and failed load attempts
    pub fn load_count(&self) -> usize {
        self.lock().loads
    }

    /// Files currently in the scratch filesystem
    pub fn files(&self) -> Vec<String> {
        let mut names: Vec<String> = self.lock().files.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn deleted(&self) -> Vec<String> {
        self.lock().deleted.clone()
    }

    pub fn commands(&self) -> Vec<Vec<String>> {
        self.lock().commands.clone()
    }

    pub fn is_terminated(&self) -> bool {
        self.lock().terminated
    }

    fn check_alive(&self) -> Result<(), TranscodeError> {
        if self.lock().terminated {
            Err(TranscodeError::Terminated)
        } else {
            Ok(())
        }
    }
}

impl TranscodeEngine for ScriptedEngine {
    async fn load(&self) -> Result<(), TranscodeError> {
        let delay = {
            let mut state = self.lock();
            state.loads += 1;
            state.load_delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.lock();
        if state.fail_load {
            return Err(TranscodeError::Media(MediaError::EngineInitFailed));
        }
        state.terminated = false;
        Ok(())
    }

    async fn write_file(&self, name: &str, data: Bytes) -> Result<(), TranscodeError> {
        self.check_alive()?;
        self.lock().files.insert(name.to_string(), data);
        Ok(())
    }

    async fn exec(&self, args: &[String], progress: ProgressFn<'_>) -> Result<(), TranscodeError> {
        self.check_alive()?;
        let delay = {
            let mut state = self.lock();
            state.commands.push(args.to_vec());
            state.exec_delay
        };

        for step in [0.25, 0.5, 0.75] {
            progress(step);
        }
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.lock();
        if state.terminated {
            return Err(TranscodeError::Terminated);
        }
        if state.fail_exec {
            return Err(TranscodeError::Media(MediaError::TranscodeFailed));
        }

        let input = args
            .iter()
            .position(|a| a == "-i")
            .and_then(|i| args.get(i + 1))
            .and_then(|name| state.files.get(name).cloned())
            .ok_or(TranscodeError::Media(MediaError::TranscodeFailed))?;
        let output = args
            .last()
            .cloned()
            .ok_or(TranscodeError::Media(MediaError::TranscodeFailed))?;
        debug!(%output, bytes = input.len(), "Scripted engine produced output");
        state.files.insert(output, input);
        drop(state);

        progress(1.0);
        Ok(())
    }

    async fn read_file(&self, name: &str) -> Result<Bytes, TranscodeError> {
        self.check_alive()?;
        self.lock()
            .files
            .get(name)
            .cloned()
            .ok_or_else(|| TranscodeError::Io(format!("no such file: {}", name)))
    }

    async fn delete_file(&self, name: &str) -> Result<(), TranscodeError> {
        let mut state = self.lock();
        state.files.remove(name);
        state.deleted.push(name.to_string());
        Ok(())
    }

    fn terminate(&self) {
        let mut state = self.lock();
        state.terminated = true;
        state.files.clear();
    }
}
