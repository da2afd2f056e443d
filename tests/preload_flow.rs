// SPDX-License-Identifier: MPL-2.0

//! Integration tests for look-ahead preloading over a mixed feed

use reel_media::config::PreloadConfig;
use reel_media::display::{MediaDescriptor, MediaItem};
use reel_media::preload::{PreloadScheduler, RecordingPrefetcher};
use reel_media::scheduler::ManualScheduler;
use std::sync::Arc;
use std::time::Duration;

const POST_EXTENT: f64 = 600.0;

fn mixed_feed() -> Vec<MediaDescriptor> {
    (0..12)
        .map(|i| match i % 3 {
            0 => MediaDescriptor::image(format!("https://cdn.example.com/p{i}.jpg")),
            1 => MediaDescriptor::reel(
                vec![MediaItem::video(format!("https://cdn.example.com/p{i}.mp4"))],
                Some(format!("https://cdn.example.com/p{i}-poster.jpg")),
            )
            .unwrap(),
            _ => MediaDescriptor::album(
                (0..5)
                    .map(|s| MediaItem::image(format!("https://cdn.example.com/p{i}-{s}.jpg")))
                    .collect(),
            )
            .unwrap(),
        })
        .collect()
}

struct Harness {
    prefetcher: Arc<RecordingPrefetcher>,
    scheduler: Arc<ManualScheduler>,
    preload: PreloadScheduler,
}

fn harness() -> Harness {
    let prefetcher = Arc::new(RecordingPrefetcher::new());
    let scheduler = ManualScheduler::shared();
    let mut preload = PreloadScheduler::new(
        prefetcher.clone(),
        scheduler.clone(),
        PreloadConfig::default(),
    );
    preload.extend_feed(&mixed_feed());
    Harness {
        prefetcher,
        scheduler,
        preload,
    }
}

fn advance(h: &mut Harness, by: Duration) {
    for wakeup in h.scheduler.advance(by) {
        h.preload.handle_wakeup(wakeup);
    }
}

#[test]
fn test_reels_warm_poster_not_video() {
    let mut h = harness();
    h.preload.mount();

    let warmed = h.prefetcher.warmed();
    assert!(warmed.contains(&"https://cdn.example.com/p1-poster.jpg".to_string()));
    assert!(!warmed.iter().any(|url| url.ends_with(".mp4")));
}

#[test]
fn test_scroll_warms_ahead_without_repeats() {
    let mut h = harness();
    let initial = h.preload.mount();
    assert!(initial > 0);

    // Scroll to post 3, then back up and down again
    for offset in [3.0, 1.0, 3.0] {
        h.preload.on_scroll(offset * POST_EXTENT, POST_EXTENT);
        advance(&mut h, Duration::from_millis(200));
    }

    assert_eq!(h.preload.window().map(|w| w.center), Some(3));
    let warmed = h.prefetcher.warmed();
    let mut unique = warmed.clone();
    unique.sort();
    unique.dedup();
    assert_eq!(unique.len(), warmed.len(), "a url was warmed twice");
    assert!(h.preload.is_warmed("https://cdn.example.com/p6.jpg"));
    assert!(!h.preload.is_warmed("https://cdn.example.com/p9.jpg"));
}

#[test]
fn test_scroll_at_end_of_feed_is_a_no_op() {
    let mut h = harness();
    h.preload.on_scroll(11.0 * POST_EXTENT, POST_EXTENT);
    advance(&mut h, Duration::from_millis(200));
    assert_eq!(h.preload.window().map(|w| w.center), Some(11));
    assert_eq!(h.prefetcher.count(), 0);
}

#[test]
fn test_large_album_warms_after_settle_once() {
    let mut h = harness();
    let feed = mixed_feed();

    assert!(h.preload.album_mounted("post-2", &feed[2]));
    advance(&mut h, Duration::from_millis(1_000));
    assert_eq!(h.prefetcher.count(), 0);
    advance(&mut h, Duration::from_millis(500));
    assert_eq!(h.prefetcher.count(), 5);

    // Remounting the same post does not warm again
    assert!(!h.preload.album_mounted("post-2", &feed[2]));
    advance(&mut h, Duration::from_secs(3));
    assert_eq!(h.prefetcher.count(), 5);
}

#[test]
fn test_teardown_cancels_pending_warms() {
    let mut h = harness();
    let feed = mixed_feed();
    h.preload.on_scroll(POST_EXTENT, POST_EXTENT);
    h.preload.album_mounted("post-5", &feed[5]);
    assert_eq!(h.scheduler.pending_timers(), 2);

    h.preload.teardown();

    assert_eq!(h.scheduler.pending_timers(), 0);
    advance(&mut h, Duration::from_secs(5));
    assert_eq!(h.prefetcher.count(), 0);
}

#[test]
fn test_locked_posts_never_warm_full_resolution() {
    let prefetcher = Arc::new(RecordingPrefetcher::new());
    let scheduler = ManualScheduler::shared();
    let mut preload = PreloadScheduler::new(
        prefetcher.clone(),
        scheduler.clone(),
        PreloadConfig::default(),
    );
    let feed = vec![
        MediaDescriptor::image("https://cdn.example.com/free.jpg"),
        MediaDescriptor::image("https://cdn.example.com/premium.jpg").with_locked(true),
        MediaDescriptor::reel(
            vec![MediaItem::video("https://cdn.example.com/premium.mp4")],
            Some("https://cdn.example.com/premium-poster.jpg".into()),
        )
        .unwrap()
        .with_locked(true),
    ];
    preload.extend_feed(&feed);
    preload.mount();

    assert_eq!(
        prefetcher.warmed(),
        vec![
            "https://cdn.example.com/free.jpg",
            "https://cdn.example.com/premium.jpg?blur=24",
            "https://cdn.example.com/premium-poster.jpg?blur=24",
        ]
    );
    assert!(!preload.is_warmed("https://cdn.example.com/premium.jpg"));
}
