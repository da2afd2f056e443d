// SPDX-License-Identifier: MPL-2.0

//! Integration tests for the trimmer over a scripted engine

use bytes::Bytes;
use reel_media::config::TranscodeConfig;
use reel_media::errors::{MediaError, TranscodeError};
use reel_media::pipelines::trim::{ScriptedEngine, TranscodePhase, TrimRequest, Trimmer};
use std::time::Duration;

fn trimmer() -> Trimmer<ScriptedEngine> {
    Trimmer::new(ScriptedEngine::new(), &TranscodeConfig::default())
}

fn request(source_secs: u64, start_secs: u64) -> TrimRequest {
    TrimRequest {
        source: Bytes::from_static(b"webm-payload"),
        mime_type: "video/webm;codecs=vp8,opus".into(),
        source_duration: Duration::from_secs(source_secs),
        start: Duration::from_secs(start_secs),
    }
}

#[tokio::test]
async fn test_trim_fourteen_second_clip() {
    let trimmer = trimmer();
    assert_eq!(trimmer.state().phase, TranscodePhase::Idle);

    let clip = trimmer.trim(&request(14, 2)).await.unwrap();

    assert_eq!(clip.start, Duration::from_secs(2));
    assert_eq!(clip.duration, Duration::from_secs(10));
    assert_eq!(clip.data, Bytes::from_static(b"webm-payload"));
    assert_eq!(clip.mime_type, "video/webm;codecs=vp8,opus");

    let commands = trimmer.engine().commands();
    assert_eq!(commands.len(), 1);
    assert_eq!(
        commands[0].join(" "),
        "-ss 2.000 -i input.webm -t 10.000 -c copy -avoid_negative_ts make_zero output.webm"
    );

    let state = trimmer.state();
    assert_eq!(state.phase, TranscodePhase::Done);
    assert_eq!(state.progress, 100);
    assert!(trimmer.engine().files().is_empty());
}

#[tokio::test]
async fn test_start_clamped_to_last_window() {
    let trimmer = trimmer();
    let clip = trimmer.trim(&request(14, 9)).await.unwrap();
    assert_eq!(clip.start, Duration::from_secs(4));
    assert_eq!(clip.duration, Duration::from_secs(10));
}

#[tokio::test]
async fn test_short_clip_is_not_trimmed() {
    let trimmer = trimmer();
    let result = trimmer.trim(&request(8, 0)).await;
    assert!(matches!(result, Err(TranscodeError::InvalidRange(_))));
    assert_eq!(trimmer.engine().load_count(), 0);
}

#[tokio::test]
async fn test_failed_exec_still_cleans_scratch_files() {
    let trimmer = trimmer();
    trimmer.engine().set_fail_exec(true);

    let result = trimmer.trim(&request(14, 0)).await;

    assert_eq!(
        result,
        Err(TranscodeError::Media(MediaError::TranscodeFailed))
    );
    assert!(trimmer.engine().files().is_empty());
    let deleted = trimmer.engine().deleted();
    assert!(deleted.contains(&"input.webm".to_string()));
    assert!(deleted.contains(&"output.webm".to_string()));
    assert_eq!(
        trimmer.state().error_message(),
        Some(MediaError::TranscodeFailed.user_message())
    );
}

#[tokio::test]
async fn test_engine_init_failure_fails_closed() {
    let trimmer = trimmer();
    trimmer.engine().set_fail_load(true);

    let result = trimmer.trim(&request(14, 0)).await;

    assert_eq!(
        result,
        Err(TranscodeError::Media(MediaError::EngineInitFailed))
    );
    assert!(matches!(trimmer.state().phase, TranscodePhase::Failed(_)));
    assert!(trimmer.engine().commands().is_empty());

    // The next job tries the engine again
    trimmer.engine().set_fail_load(false);
    trimmer.trim(&request(14, 0)).await.unwrap();
    assert_eq!(trimmer.engine().load_count(), 2);
}

#[tokio::test]
async fn test_engine_loaded_once_across_jobs() {
    let trimmer = trimmer();
    trimmer.trim(&request(14, 0)).await.unwrap();
    trimmer.trim(&request(20, 5)).await.unwrap();
    assert_eq!(trimmer.engine().load_count(), 1);
    assert_eq!(trimmer.engine().commands().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_abort_cancels_running_job() {
    let trimmer = trimmer();
    trimmer.engine().set_exec_delay(Some(Duration::from_secs(30)));
    let abort = trimmer.abort_handle();

    let req = request(14, 0);
    let (result, ()) = tokio::join!(trimmer.trim(&req), async {
        tokio::time::sleep(Duration::from_secs(1)).await;
        abort.abort();
    });

    assert_eq!(result, Err(TranscodeError::Terminated));
    assert!(trimmer.engine().files().is_empty());

    // Aborting one job does not poison the next
    trimmer.engine().set_exec_delay(None);
    assert!(trimmer.trim(&request(14, 0)).await.is_ok());
}

#[tokio::test]
async fn test_progress_only_moves_forward() {
    let trimmer = trimmer();
    let mut updates = trimmer.subscribe();
    let seen = tokio::spawn(async move {
        let mut last = 0u8;
        while updates.changed().await.is_ok() {
            let state = updates.borrow_and_update().clone();
            if state.phase == TranscodePhase::Processing {
                assert!(state.progress >= last);
                last = state.progress;
            }
            if state.phase == TranscodePhase::Done {
                return true;
            }
        }
        false
    });

    trimmer.trim(&request(14, 0)).await.unwrap();
    assert!(seen.await.unwrap());
}

#[tokio::test]
async fn test_terminated_trimmer_rejects_jobs() {
    let trimmer = trimmer();
    trimmer.trim(&request(14, 0)).await.unwrap();

    trimmer.terminate();

    assert!(trimmer.engine().is_terminated());
    assert_eq!(
        trimmer.trim(&request(14, 0)).await,
        Err(TranscodeError::Terminated)
    );
}

#[tokio::test(start_paused = true)]
async fn test_terminate_does_not_wait_for_stalled_engine_load() {
    let trimmer = trimmer();
    trimmer
        .engine()
        .set_load_delay(Some(Duration::from_secs(3_600)));

    let started = tokio::time::Instant::now();
    let req = request(14, 0);
    let (result, ()) = tokio::join!(trimmer.trim(&req), async {
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(trimmer.state().phase, TranscodePhase::LoadingEngine);
        trimmer.terminate();
    });

    assert_eq!(result, Err(TranscodeError::Terminated));
    assert!(started.elapsed() < Duration::from_secs(60));
    assert!(trimmer.is_terminated());
    assert!(trimmer.engine().is_terminated());
    assert!(trimmer.engine().commands().is_empty());
    assert_eq!(
        trimmer.state().phase,
        TranscodePhase::Failed(TranscodeError::Terminated)
    );
}

#[tokio::test]
async fn test_thumbnail_extracted_from_clip() {
    let trimmer = trimmer();
    let jpeg = trimmer
        .extract_thumbnail(&Bytes::from_static(b"clip"), "video/mp4", Duration::ZERO)
        .await
        .unwrap();
    assert_eq!(jpeg, Bytes::from_static(b"clip"));
    let command = trimmer.engine().commands().remove(0);
    assert!(command.contains(&"input.mp4".to_string()));
    assert_eq!(command.last().map(String::as_str), Some("thumbnail.jpg"));
}
