// SPDX-License-Identifier: MPL-2.0

//! Media pipelines
//!
//! ```text
//! ┌──────────────┐     ┌───────────────────┐     ┌──────────────┐
//! │ Camera +     │ ──▶ │  Capture Session  │ ──▶ │ CapturedClip │
//! │ Microphone   │     │  - fallbacks      │     │ + preview    │
//! │              │     │  - 10 s cutoff    │     │   object URL │
//! └──────────────┘     └───────────────────┘     └──────┬───────┘
//!                                                       │ too long
//!                      ┌───────────────────┐     ┌──────▼───────┐
//!                      │  Trimmer (ffmpeg) │ ◀── │ picked start │
//!                      │  stream copy      │     │   offset     │
//!                      └───────────────────┘     └──────────────┘
//! ```
//!
//! # Modules
//!
//! - [`capture`]: camera acquisition and the recording state machine
//! - [`trim`]: lazily loaded transcoder that cuts a clip to the target length

pub mod capture;
pub mod trim;
