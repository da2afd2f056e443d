// SPDX-License-Identifier: MPL-2.0

//! Look-ahead scheduling
//!
//! Three triggers warm URLs through a [`Prefetcher`]:
//!
//! - first mount warms the leading `initial_count` posts
//! - scroll, debounced, warms `radius` posts ahead of the visible one
//! - a large album warms all of its slides once after a settle delay
//!
//! Each URL is handed to the prefetcher at most once per scheduler. Locked
//! posts contribute their blurred variant only.

use super::fetcher::Prefetcher;
use crate::config::PreloadConfig;
use crate::constants::display::BLUR_RADIUS;
use crate::display::{DescriptorKind, MediaDescriptor};
use crate::scheduler::{Scheduler, TimerId, Wakeup};
use std::collections::{HashMap, HashSet};
use std::ops::RangeInclusive;
use std::sync::Arc;
use tracing::{debug, info};

/// Posts to warm around the scroll position
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PreloadWindow {
    /// Post currently at the top of the viewport
    pub center: usize,
    pub radius: usize,
}

impl PreloadWindow {
    /// Window for a scroll `offset` over posts `item_extent` tall
    pub fn from_scroll(offset: f64, item_extent: f64, radius: usize) -> Self {
        let center = if item_extent > 0.0 && offset.is_finite() && offset > 0.0 {
            (offset / item_extent).floor() as usize
        } else {
            0
        };
        Self { center, radius }
    }

    /// Upcoming posts `center+1 ..= center+radius`, clipped to `len`
    pub fn upcoming(&self, len: usize) -> Option<RangeInclusive<usize>> {
        let first = self.center + 1;
        let last = (self.center + self.radius).min(len.checked_sub(1)?);
        (self.radius > 0 && first <= last).then_some(first..=last)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AlbumWarm {
    Scheduled(TimerId),
    Done,
}

/// Decides what to warm; never builds surfaces
pub struct PreloadScheduler {
    prefetcher: Arc<dyn Prefetcher>,
    scheduler: Arc<dyn Scheduler>,
    config: PreloadConfig,
    blur_radius: u32,
    feed: Vec<Vec<String>>,
    warmed: HashSet<String>,
    mounted: bool,
    debounce: Option<TimerId>,
    scroll: Option<(f64, f64)>,
    window: Option<PreloadWindow>,
    albums: HashMap<String, (AlbumWarm, Vec<String>)>,
}

impl PreloadScheduler {
    pub fn new(
        prefetcher: Arc<dyn Prefetcher>,
        scheduler: Arc<dyn Scheduler>,
        config: PreloadConfig,
    ) -> Self {
        Self {
            prefetcher,
            scheduler,
            config,
            blur_radius: BLUR_RADIUS,
            feed: Vec::new(),
            warmed: HashSet::new(),
            mounted: false,
            debounce: None,
            scroll: None,
            window: None,
            albums: HashMap::new(),
        }
    }

    /// Blur radius for locked posts; match the surfaces' `blur_radius`
    pub fn with_blur_radius(mut self, radius: u32) -> Self {
        self.blur_radius = radius;
        self
    }

    /// Append posts to the feed (infinite scroll)
    pub fn extend_feed<'a>(&mut self, posts: impl IntoIterator<Item = &'a MediaDescriptor>) {
        let radius = self.blur_radius;
        self.feed
            .extend(posts.into_iter().map(|post| post.preload_urls(radius)));
    }

    pub fn feed_len(&self) -> usize {
        self.feed.len()
    }

    /// Last window computed from a settled scroll
    pub fn window(&self) -> Option<PreloadWindow> {
        self.window
    }

    /// URLs handed to the prefetcher so far
    pub fn warmed_count(&self) -> usize {
        self.warmed.len()
    }

    pub fn is_warmed(&self, url: &str) -> bool {
        self.warmed.contains(url)
    }

    /// Warm the leading posts once, whatever the scroll position
    pub fn mount(&mut self) -> usize {
        if self.mounted {
            return 0;
        }
        self.mounted = true;
        let count = self.config.initial_count.min(self.feed.len());
        let warmed = self.warm_posts(0..count);
        info!(posts = count, urls = warmed, "Initial preload");
        warmed
    }

    /// Scroll event; the window is recomputed once scrolling settles
    pub fn on_scroll(&mut self, offset: f64, item_extent: f64) {
        self.scroll = Some((offset, item_extent));
        if let Some(timer) = self.debounce.take() {
            self.scheduler.cancel_timeout(timer);
        }
        self.debounce = Some(self.scheduler.set_timeout(self.config.scroll_debounce));
    }

    /// Schedule the one-time bulk warm for an album post
    ///
    /// Returns whether a warm was scheduled; albums at or under the
    /// threshold and albums already scheduled or warmed are skipped.
    pub fn album_mounted(&mut self, key: &str, descriptor: &MediaDescriptor) -> bool {
        if descriptor.kind() != DescriptorKind::Album
            || descriptor.len() <= self.config.album_threshold
            || self.albums.contains_key(key)
        {
            return false;
        }
        let urls = descriptor.preload_urls(self.blur_radius);
        let timer = self.scheduler.set_timeout(self.config.album_settle_delay);
        debug!(album = key, slides = descriptor.len(), "Album warm scheduled");
        self.albums
            .insert(key.to_string(), (AlbumWarm::Scheduled(timer), urls));
        true
    }

    /// Route a scheduler wakeup; returns whether it was one of ours
    pub fn handle_wakeup(&mut self, wakeup: Wakeup) -> bool {
        let Wakeup::Timer(id) = wakeup else {
            return false;
        };

        if self.debounce == Some(id) {
            self.debounce = None;
            self.on_scroll_settled();
            return true;
        }

        let album = self
            .albums
            .iter_mut()
            .find(|(_, (state, _))| *state == AlbumWarm::Scheduled(id));
        let Some((key, (state, urls))) = album else {
            return false;
        };
        *state = AlbumWarm::Done;
        let key = key.clone();
        let urls = std::mem::take(urls);
        let warmed = self.warm_urls(&urls);
        info!(album = %key, urls = warmed, "Album slides warmed");
        true
    }

    /// Cancel pending timers
    pub fn teardown(&mut self) {
        if let Some(timer) = self.debounce.take() {
            self.scheduler.cancel_timeout(timer);
        }
        for (state, _) in self.albums.values_mut() {
            if let AlbumWarm::Scheduled(timer) = *state {
                self.scheduler.cancel_timeout(timer);
                *state = AlbumWarm::Done;
            }
        }
    }

    fn on_scroll_settled(&mut self) {
        let Some((offset, extent)) = self.scroll else {
            return;
        };
        let window = PreloadWindow::from_scroll(offset, extent, self.config.radius);
        self.window = Some(window);
        if let Some(range) = window.upcoming(self.feed.len()) {
            let warmed = self.warm_posts(range);
            debug!(center = window.center, urls = warmed, "Preload window warmed");
        }
    }

    fn warm_posts(&mut self, posts: impl Iterator<Item = usize>) -> usize {
        let urls: Vec<String> = posts
            .filter_map(|index| self.feed.get(index))
            .flatten()
            .cloned()
            .collect();
        self.warm_urls(&urls)
    }

    fn warm_urls(&mut self, urls: &[String]) -> usize {
        let mut count = 0;
        for url in urls {
            if self.warmed.insert(url.clone()) {
                self.prefetcher.warm(url);
                count += 1;
            }
        }
        count
    }
}

impl Drop for PreloadScheduler {
    fn drop(&mut self) {
        self.teardown();
    }
}

impl std::fmt::Debug for PreloadScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreloadScheduler")
            .field("feed", &self.feed.len())
            .field("warmed", &self.warmed.len())
            .field("window", &self.window)
            .finish_non_exhaustive()
    }
}
