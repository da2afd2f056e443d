// SPDX-License-Identifier: MPL-2.0

//! Clip trimming
//!
//! - [`engine`]: the transcoder seam and an in-memory scripted engine
//! - [`ffmpeg`]: engine backed by the ffmpeg binary and a scratch directory
//! - [`job`]: trim window math and the [`Trimmer`] job runner

pub mod engine;
pub mod ffmpeg;
pub mod job;

pub use engine::{ProgressFn, ScriptedEngine, TranscodeEngine};
pub use ffmpeg::FfmpegEngine;
pub use job::{
    AbortHandle, TranscodeJobState, TranscodePhase, TrimRequest, TrimWindow, TrimmedClip, Trimmer,
    thumbnail_args, trim_args,
};
