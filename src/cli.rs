// SPDX-License-Identifier: GPL-3.0-only

//! CLI commands for media operations
//!
//! This module provides command-line functionality for:
//! - Showing the recording formats this machine supports
//! - Trimming a clip through ffmpeg
//! - Printing the preload window for a scroll position
//! - Recording a clip from simulated devices

use bytes::Bytes;
use reel_media::backends::{Facing, VirtualDevices, probe::probe_capabilities};
use reel_media::blob::MemoryUrlStore;
use reel_media::config::Config;
use reel_media::constants::format_clock;
use reel_media::pipelines::capture::{CaptureSession, CaptureState, select_recording_format};
use reel_media::pipelines::trim::{FfmpegEngine, TranscodePhase, TrimRequest, Trimmer};
use reel_media::preload::PreloadWindow;
use reel_media::scheduler::TokioScheduler;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Simulated encoder output per time slice
const DEMO_CHUNK_BYTES: usize = 64 * 1024;

/// Load the config, falling back to defaults when it cannot be read
pub fn load_config(path: Option<&Path>) -> Result<Config, Box<dyn std::error::Error>> {
    let loaded = match path {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    };
    match loaded {
        Ok(config) => Ok(config),
        // An explicitly named file must be usable
        Err(e) if path.is_some() => Err(e.into()),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to load config, using defaults");
            Ok(Config::default())
        }
    }
}

/// Show recording formats and the one the recorder would use
pub fn show_formats() -> Result<(), Box<dyn std::error::Error>> {
    let caps = probe_capabilities();

    println!("Platform: {:?}", caps.family);
    println!();
    let supported: Vec<&str> = caps.supported().collect();
    if supported.is_empty() {
        println!("No recording formats available.");
    } else {
        println!("Supported recording formats:");
        for mime in supported {
            println!("  {}", mime);
        }
    }
    println!();

    match select_recording_format(&caps) {
        Ok(format) => println!(
            "Selected: {} (.{})",
            format.mime_type,
            format.extension()
        ),
        Err(e) => println!("Selected: none ({})", e),
    }

    Ok(())
}

/// Trim a local clip to the configured target length
pub fn trim_clip(
    config: &Config,
    input: PathBuf,
    source_duration: f64,
    start: f64,
    output: Option<PathBuf>,
    thumbnail: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    if !(source_duration.is_finite() && source_duration > 0.0) {
        return Err(format!("Invalid source duration: {}", source_duration).into());
    }
    if !(start.is_finite() && start >= 0.0) {
        return Err(format!("Invalid start offset: {}", start).into());
    }

    let mime_type = mime_for_path(&input)
        .ok_or_else(|| format!("Unsupported clip type: {}", input.display()))?;
    let source = Bytes::from(std::fs::read(&input)?);
    let output_path = output.unwrap_or_else(|| default_trim_output(&input));

    println!("Input: {} ({} bytes)", input.display(), source.len());
    println!("Output: {}", output_path.display());

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async {
        let engine = FfmpegEngine::new(config.transcode.ffmpeg_path.clone());
        let trimmer = Trimmer::new(engine, &config.transcode);

        let window = trimmer
            .window(Duration::from_secs_f64(source_duration))
            .with_start(Duration::from_secs_f64(start));
        println!(
            "Window: {:.2}s - {:.2}s of {:.2}s",
            window.start().as_secs_f64(),
            window.end().as_secs_f64(),
            window.source_duration().as_secs_f64()
        );

        let request = TrimRequest {
            source: source.clone(),
            mime_type: mime_type.to_string(),
            source_duration: Duration::from_secs_f64(source_duration),
            start: Duration::from_secs_f64(start),
        };

        let mut progress = trimmer.subscribe();
        let job = trimmer.trim(&request);
        tokio::pin!(job);
        let trimmed = loop {
            tokio::select! {
                result = &mut job => break result,
                Ok(()) = progress.changed() => {
                    let state = progress.borrow_and_update().clone();
                    if state.phase == TranscodePhase::Processing {
                        print!("\rTrimming: {:3}%", state.progress);
                        let _ = std::io::stdout().flush();
                    }
                }
            }
        };
        println!();
        let trimmed = trimmed?;

        if let Some(parent) = output_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&output_path, &trimmed.data)?;
        println!(
            "Trimmed clip saved: {} ({:.2}s, {} bytes)",
            output_path.display(),
            trimmed.duration_seconds(),
            trimmed.data.len()
        );

        if let Some(path) = thumbnail {
            let jpeg = trimmer
                .extract_thumbnail(&trimmed.data, &trimmed.mime_type, Duration::ZERO)
                .await?;
            std::fs::write(&path, &jpeg)?;
            println!("Thumbnail saved: {}", path.display());
        }

        trimmer.terminate();
        Ok::<(), Box<dyn std::error::Error>>(())
    })
}

/// Print which posts the preloader would warm for a scroll offset
pub fn show_window(
    config: &Config,
    offset: f64,
    extent: f64,
    posts: usize,
) -> Result<(), Box<dyn std::error::Error>> {
    if !(extent.is_finite() && extent > 0.0) {
        return Err(format!("Invalid post extent: {}", extent).into());
    }

    let window = PreloadWindow::from_scroll(offset, extent, config.preload.radius);
    println!("Visible post: {}", window.center);
    match window.upcoming(posts) {
        Some(range) => println!(
            "Warming posts {} to {} ({} of {})",
            range.start(),
            range.end(),
            range.end() - range.start() + 1,
            posts
        ),
        None => println!("Nothing left to warm ({} posts)", posts),
    }

    Ok(())
}

/// Record from simulated devices until the cutoff or `stop_after`
pub fn capture_demo(
    config: &Config,
    facing: Facing,
    stop_after: Option<f64>,
    no_microphone: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let stop_after = match stop_after {
        Some(secs) if !(secs.is_finite() && secs > 0.0) => {
            return Err(format!("Invalid stop time: {}", secs).into());
        }
        other => other.map(Duration::from_secs_f64),
    };

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async {
        let devices = Arc::new(VirtualDevices::new());
        devices.set_microphone(!no_microphone);
        let (scheduler, mut wakeups) = TokioScheduler::new();
        let store = Arc::new(MemoryUrlStore::new());

        let session = CaptureSession::new(
            Arc::clone(&devices),
            scheduler,
            store.clone(),
            config.capture.clone(),
        );

        if session.facing() != facing {
            // Nothing is open yet, so this only flips the facing
            session.switch_camera().await?;
        }
        session.acquire().await?;
        if let Some(warning) = session.snapshot().audio_warning() {
            println!("Warning: {}", warning);
        }

        println!("Recording with the {} camera...", facing);
        session.start()?;

        let mut slice = tokio::time::interval(config.capture.time_slice);
        slice.tick().await;
        let deadline = stop_after.map(|d| tokio::time::Instant::now() + d);

        loop {
            tokio::select! {
                Some(wakeup) = wakeups.recv() => {
                    session.handle_wakeup(wakeup);
                }
                _ = slice.tick() => {
                    devices.push_chunk(Bytes::from(vec![0u8; DEMO_CHUNK_BYTES]));
                }
                _ = async {
                    match deadline {
                        Some(at) => tokio::time::sleep_until(at).await,
                        None => std::future::pending().await,
                    }
                } => {
                    println!();
                    println!("Stopping early...");
                    session.stop()?;
                }
            }

            let snapshot = session.snapshot();
            print!("\rRecording: {}", format_clock(snapshot.elapsed));
            let _ = std::io::stdout().flush();

            match snapshot.state {
                CaptureState::Recording => {}
                CaptureState::Stopped => break,
                CaptureState::Error(e) => {
                    println!();
                    return Err(e.into());
                }
                other => {
                    println!();
                    return Err(format!("Unexpected capture state: {}", other.name()).into());
                }
            }
        }
        println!();

        let clip = session
            .clip()
            .ok_or("Recording stopped without a clip")?;
        println!(
            "Clip: {} ({:.2}s, {} bytes, audio {})",
            clip.mime_type,
            clip.duration_seconds(),
            clip.data.len(),
            if clip.has_audio { "yes" } else { "no" }
        );
        if let Some(url) = session.preview_url() {
            println!("Preview: {}", url.as_str());
        }

        session.teardown();
        println!("Object URLs still live: {}", store.live_count());
        Ok::<(), Box<dyn std::error::Error>>(())
    })
}

fn mime_for_path(path: &Path) -> Option<&'static str> {
    let extension = path.extension()?.to_str()?.to_ascii_lowercase();
    match extension.as_str() {
        "mp4" | "m4v" => Some("video/mp4"),
        "webm" => Some("video/webm"),
        "mov" => Some("video/quicktime"),
        "mkv" => Some("video/x-matroska"),
        _ => None,
    }
}

fn default_trim_output(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("clip");
    let extension = input
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("mp4");
    input.with_file_name(format!("{}_trimmed.{}", stem, extension))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mime_from_extension() {
        assert_eq!(mime_for_path(Path::new("a/clip.MP4")), Some("video/mp4"));
        assert_eq!(mime_for_path(Path::new("clip.webm")), Some("video/webm"));
        assert_eq!(mime_for_path(Path::new("clip.gif")), None);
        assert_eq!(mime_for_path(Path::new("clip")), None);
    }

    #[test]
    fn trimmed_output_sits_next_to_input() {
        assert_eq!(
            default_trim_output(Path::new("/tmp/clip.webm")),
            PathBuf::from("/tmp/clip_trimmed.webm")
        );
    }
}
