// SPDX-License-Identifier: MPL-2.0

//! Integration tests for post rendering, retry and preview release

use bytes::Bytes;
use reel_media::blob::{BlobLifecycle, BlobPurpose, MemoryUrlStore, ObjectUrl, RevokeReason};
use reel_media::config::DisplayConfig;
use reel_media::display::{
    MediaDescriptor, MediaItem, PostHooks, PostMedia, RetryOutcome, SlideReadyFn, SurfaceContext,
    SurfacePhase, Swipe, Visual,
};
use reel_media::errors::MediaError;
use reel_media::network::ManualConnectivity;
use reel_media::scheduler::ManualScheduler;
use std::sync::Arc;
use std::time::Duration;

struct Feed {
    scheduler: Arc<ManualScheduler>,
    network: Arc<ManualConnectivity>,
    ctx: SurfaceContext,
}

fn feed() -> Feed {
    let scheduler = ManualScheduler::shared();
    let network = Arc::new(ManualConnectivity::default());
    let ctx = SurfaceContext::new(scheduler.clone(), network.clone(), DisplayConfig::default());
    Feed {
        scheduler,
        network,
        ctx,
    }
}

fn advance(feed: &Feed, post: &mut PostMedia, by: Duration) {
    for wakeup in feed.scheduler.advance(by) {
        post.handle_wakeup(wakeup);
    }
}

fn album(n: usize) -> MediaDescriptor {
    let items = (0..n)
        .map(|i| MediaItem::image(format!("https://cdn.example.com/slide-{i}.jpg")))
        .collect();
    MediaDescriptor::album(items).unwrap()
}

#[test]
fn test_album_swipe_requests_window_only() {
    let feed = feed();
    let mut post = PostMedia::render(&feed.ctx, &album(10), PostHooks::default()).unwrap();

    let first: Vec<usize> = post.mount().into_iter().map(|(i, _)| i).collect();
    assert_eq!(first, vec![0, 1]);

    let PostMedia::Album(carousel) = &mut post else {
        panic!("expected an album");
    };
    let issued: Vec<usize> = carousel
        .swipe(Swipe::Next)
        .into_iter()
        .map(|(i, _)| i)
        .collect();
    assert_eq!(issued, vec![2]);
    let issued: Vec<usize> = carousel
        .swipe(Swipe::Next)
        .into_iter()
        .map(|(i, _)| i)
        .collect();
    assert_eq!(issued, vec![3]);

    assert_eq!(carousel.active(), 2);
    assert_eq!(carousel.requested(), vec![0, 1, 2, 3]);
    assert!(carousel.slide(9).unwrap().pending().is_none());
}

#[test]
fn test_remote_ready_releases_local_previews() {
    let feed = feed();
    let store = Arc::new(MemoryUrlStore::new());
    let blobs = Arc::new(BlobLifecycle::new("post-1", store.clone()));

    let previews: Vec<ObjectUrl> = (0..3)
        .map(|i| {
            blobs.register(
                Bytes::from(format!("local-{i}")),
                "image/jpeg",
                BlobPurpose::UploadPreview,
            )
        })
        .collect();
    let descriptor = previews
        .iter()
        .enumerate()
        .fold(album(3), |desc, (i, url)| desc.with_local_preview(i, url.clone()));

    let release: SlideReadyFn = {
        let blobs = Arc::clone(&blobs);
        let previews = previews.clone();
        Arc::new(move |index: usize| {
            if let Some(url) = previews.get(index) {
                blobs.release_on_remote_ready(url);
            }
        })
    };
    let mut post = PostMedia::render(
        &feed.ctx,
        &descriptor,
        PostHooks {
            on_full_view: None,
            on_remote_ready: Some(release),
        },
    )
    .unwrap();

    let requests = post.mount();
    let PostMedia::Album(carousel) = &post else {
        panic!("expected an album");
    };
    assert_eq!(carousel.slide(0).unwrap().visual(), Visual::Preview(&previews[0]));
    assert_eq!(store.live_count(), 3);

    let (index, request) = &requests[0];
    assert!(post.on_load(*index, request.token));
    assert_eq!(
        blobs.revoke_reason(&previews[0]),
        Some(RevokeReason::RemoteReady)
    );
    assert_eq!(store.live_count(), 2);

    // A second success does not fire the hook again
    assert!(post.on_load(*index, request.token));
    assert_eq!(store.live_count(), 2);

    // Unviewed slides keep their previews until the post goes away
    blobs.teardown();
    assert_eq!(store.live_count(), 0);
}

#[test]
fn test_offline_retry_then_recovery() {
    let feed = feed();
    let descriptor = MediaDescriptor::image("https://cdn.example.com/photo.jpg?w=1080");
    let mut post = PostMedia::render(&feed.ctx, &descriptor, PostHooks::default()).unwrap();

    let (_, request) = post.mount().remove(0);
    assert!(post.on_error(0, request.token));

    feed.network.set_online(false);
    assert!(matches!(post.retry(0), RetryOutcome::Offline));
    let PostMedia::Image(image) = &post else {
        panic!("expected an image");
    };
    assert!(image.surface().state().is_offline);
    assert_eq!(
        image.surface().error_message(),
        Some(MediaError::Offline.user_message())
    );

    // Back online but inside the throttle window
    feed.network.set_online(true);
    advance(&feed, &mut post, Duration::from_millis(500));
    assert!(matches!(post.retry(0), RetryOutcome::Throttled));

    advance(&feed, &mut post, Duration::from_secs(2));
    let RetryOutcome::Reissued(retry) = post.retry(0) else {
        panic!("retry should be reissued once online");
    };
    assert!(retry.url.starts_with("https://cdn.example.com/photo.jpg?w=1080&t="));
    assert_ne!(retry.token, request.token);

    // The superseded token can no longer settle the surface
    assert!(!post.on_load(0, request.token));
    assert!(post.on_load(0, retry.token));
    let PostMedia::Image(image) = &post else {
        panic!("expected an image");
    };
    assert_eq!(image.surface().phase(), SurfacePhase::Ready);
    assert_eq!(image.surface().state().retry_count, 0);
    assert_eq!(image.surface().state().retry_key, 1);
}

#[test]
fn test_stalled_video_times_out_then_late_success_wins() {
    let feed = feed();
    let descriptor = MediaDescriptor::reel(
        vec![MediaItem::video("https://cdn.example.com/clip.mp4")],
        None,
    )
    .unwrap();
    let mut post = PostMedia::render(&feed.ctx, &descriptor, PostHooks::default()).unwrap();
    let (_, request) = post.mount().remove(0);

    advance(&feed, &mut post, Duration::from_secs(10));
    let PostMedia::Reel(reel) = &post else {
        panic!("expected a reel");
    };
    assert_eq!(reel.video().phase(), SurfacePhase::Loading);

    advance(&feed, &mut post, Duration::from_secs(10));
    let PostMedia::Reel(reel) = &post else {
        panic!("expected a reel");
    };
    assert_eq!(
        reel.video().phase(),
        SurfacePhase::Error(MediaError::LoadTimeout)
    );

    assert!(post.on_load(0, request.token));
    let PostMedia::Reel(reel) = &post else {
        panic!("expected a reel");
    };
    assert_eq!(reel.video().phase(), SurfacePhase::Ready);
    assert_eq!(feed.scheduler.pending_timers(), 0);
}

#[test]
fn test_locked_post_requests_blurred_variant_until_unlocked() {
    let feed = feed();
    let descriptor = MediaDescriptor::reel(
        vec![MediaItem::video("https://cdn.example.com/locked.mp4")],
        Some("https://cdn.example.com/locked.jpg".into()),
    )
    .unwrap()
    .with_locked(true);
    let mut post = PostMedia::render(&feed.ctx, &descriptor, PostHooks::default()).unwrap();

    let requests = post.mount();
    assert_eq!(requests.len(), 2);
    for (_, request) in &requests {
        assert!(request.url.ends_with("?blur=24"), "{}", request.url);
    }

    let reissued = post.unlock();
    assert_eq!(reissued.len(), 2);
    assert_eq!(reissued[0].1.url, "https://cdn.example.com/locked.jpg");
    assert_eq!(reissued[1].1.url, "https://cdn.example.com/locked.mp4");

    // Results for the blurred loads are stale now
    assert!(!post.on_load(0, requests[1].1.token));
    assert!(post.unlock().is_empty());
}

#[test]
fn test_full_view_hook_for_single_image() {
    let feed = feed();
    let opened = Arc::new(std::sync::Mutex::new(Vec::new()));
    let sink = Arc::clone(&opened);
    let hooks = PostHooks {
        on_full_view: Some(Arc::new(move |index: usize| sink.lock().unwrap().push(index))),
        on_remote_ready: None,
    };
    let post = PostMedia::render(
        &feed.ctx,
        &MediaDescriptor::image("https://cdn.example.com/a.jpg"),
        hooks,
    )
    .unwrap();

    assert!(post.open_full_view());
    assert_eq!(*opened.lock().unwrap(), vec![0]);
}

#[test]
fn test_invalid_descriptors_rejected() {
    assert!(MediaDescriptor::album(Vec::new()).is_err());
    let eleven = (0..11)
        .map(|i| MediaItem::image(format!("https://cdn.example.com/{i}.jpg")))
        .collect();
    assert!(MediaDescriptor::album(eleven).is_err());
    assert!(
        MediaDescriptor::reel(vec![MediaItem::image("https://cdn.example.com/a.jpg")], None)
            .is_err()
    );
}
