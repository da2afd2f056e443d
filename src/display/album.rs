// SPDX-License-Identifier: MPL-2.0

//! Album carousel
//!
//! One surface per slide, but only slides within `album_window` of the
//! active index are ever requested. Navigating widens the requested set;
//! it never shrinks, so a slide that was fetched keeps its state.

use super::descriptor::{DescriptorKind, MediaDescriptor};
use super::retry::RetryOutcome;
use super::surface::{LoadRequest, LoadToken, ResilientMediaSurface, SurfaceContext};
use crate::errors::DescriptorError;
use crate::scheduler::Wakeup;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info};

/// Caller hook for opening the full-screen viewer at an index
pub type FullViewFn = Arc<dyn Fn(usize) + Send + Sync>;

/// Caller hook fired once per slide when its remote asset is confirmed
pub type SlideReadyFn = Arc<dyn Fn(usize) + Send + Sync>;

/// Swipe direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Swipe {
    Next,
    Previous,
}

/// Windowed album of up to ten slides
pub struct AlbumCarousel {
    slides: Vec<ResilientMediaSurface>,
    active: usize,
    window: usize,
    requested: BTreeSet<usize>,
    on_full_view: Option<FullViewFn>,
}

impl AlbumCarousel {
    pub fn new(
        ctx: &SurfaceContext,
        descriptor: &MediaDescriptor,
        on_slide_ready: Option<SlideReadyFn>,
    ) -> Result<Self, DescriptorError> {
        descriptor.expect_kind(DescriptorKind::Album)?;

        let slides = descriptor
            .items()
            .iter()
            .enumerate()
            .map(|(index, item)| {
                let surface =
                    ResilientMediaSurface::new(ctx.clone(), item.remote_key.clone(), item.kind)
                        .with_local_preview(descriptor.local_preview(index).cloned())
                        .with_locked(descriptor.is_locked());
                match &on_slide_ready {
                    Some(hook) => {
                        let hook = Arc::clone(hook);
                        surface.on_remote_ready(move || hook(index))
                    }
                    None => surface,
                }
            })
            .collect();

        Ok(Self {
            slides,
            active: 0,
            window: ctx.config.album_window,
            requested: BTreeSet::new(),
            on_full_view: None,
        })
    }

    pub fn with_full_view(mut self, hook: FullViewFn) -> Self {
        self.on_full_view = Some(hook);
        self
    }

    pub fn len(&self) -> usize {
        self.slides.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slides.is_empty()
    }

    pub fn active(&self) -> usize {
        self.active
    }

    pub fn slide(&self, index: usize) -> Option<&ResilientMediaSurface> {
        self.slides.get(index)
    }

    /// Indices requested so far, ascending
    pub fn requested(&self) -> Vec<usize> {
        self.requested.iter().copied().collect()
    }

    /// Request the slides around the first one
    pub fn mount(&mut self) -> Vec<(usize, LoadRequest)> {
        self.request_window()
    }

    /// Dot tap or programmatic jump; out-of-range indices are ignored
    pub fn navigate(&mut self, index: usize) -> Vec<(usize, LoadRequest)> {
        if index >= self.slides.len() || index == self.active {
            return Vec::new();
        }
        debug!(from = self.active, to = index, "Album navigation");
        self.active = index;
        self.request_window()
    }

    /// Swipe one slide; stops at either end
    pub fn swipe(&mut self, direction: Swipe) -> Vec<(usize, LoadRequest)> {
        let target = match direction {
            Swipe::Next => self.active + 1,
            Swipe::Previous => match self.active.checked_sub(1) {
                Some(index) => index,
                None => return Vec::new(),
            },
        };
        self.navigate(target)
    }

    /// Tap on the active slide
    pub fn open_full_view(&self) -> bool {
        match &self.on_full_view {
            Some(hook) => {
                info!(index = self.active, "Opening full view");
                hook(self.active);
                true
            }
            None => false,
        }
    }

    pub fn on_load(&mut self, index: usize, token: LoadToken) -> bool {
        self.slides
            .get_mut(index)
            .is_some_and(|slide| slide.on_load(token))
    }

    pub fn on_error(&mut self, index: usize, token: LoadToken) -> bool {
        self.slides
            .get_mut(index)
            .is_some_and(|slide| slide.on_error(token))
    }

    pub fn retry(&mut self, index: usize) -> RetryOutcome<LoadRequest> {
        match self.slides.get_mut(index) {
            Some(slide) => slide.retry(),
            None => RetryOutcome::NotNeeded,
        }
    }

    /// Unlock every slide; returns the reissued loads of requested slides
    ///
    /// Slides outside the requested set only lose their blur, so they are
    /// fetched at full size when navigation first reaches them.
    pub fn unlock(&mut self) -> Vec<(usize, LoadRequest)> {
        let mut issued = Vec::new();
        for (index, slide) in self.slides.iter_mut().enumerate() {
            if !self.requested.contains(&index) {
                slide.clear_lock();
            } else if let Some(request) = slide.unlock() {
                issued.push((index, request));
            }
        }
        issued
    }

    pub fn handle_wakeup(&mut self, wakeup: Wakeup) -> bool {
        self.slides
            .iter_mut()
            .any(|slide| slide.handle_wakeup(wakeup))
    }

    fn request_window(&mut self) -> Vec<(usize, LoadRequest)> {
        let last = self.slides.len().saturating_sub(1);
        let from = self.active.saturating_sub(self.window);
        let to = (self.active + self.window).min(last);

        let mut issued = Vec::new();
        for index in from..=to {
            let Some(slide) = self.slides.get_mut(index) else {
                break;
            };
            if self.requested.insert(index) {
                issued.push((index, slide.load()));
            }
        }
        if !issued.is_empty() {
            debug!(active = self.active, count = issued.len(), "Requested album slides");
        }
        issued
    }
}

impl std::fmt::Debug for AlbumCarousel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlbumCarousel")
            .field("slides", &self.slides.len())
            .field("active", &self.active)
            .field("requested", &self.requested)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DisplayConfig;
    use crate::display::descriptor::MediaItem;
    use crate::network::ManualConnectivity;
    use crate::scheduler::ManualScheduler;
    use std::sync::Mutex;

    fn album(n: usize) -> MediaDescriptor {
        let items = (0..n)
            .map(|i| MediaItem::image(format!("https://cdn.example.com/{i}.jpg")))
            .collect();
        MediaDescriptor::album(items).unwrap()
    }

    fn context() -> SurfaceContext {
        SurfaceContext::new(
            ManualScheduler::shared(),
            Arc::new(ManualConnectivity::default()),
            DisplayConfig::default(),
        )
    }

    #[test]
    fn far_slides_not_requested() {
        let mut carousel = AlbumCarousel::new(&context(), &album(10), None).unwrap();
        let first = carousel.mount();
        assert_eq!(first.iter().map(|(i, _)| *i).collect::<Vec<_>>(), vec![0, 1]);

        carousel.swipe(Swipe::Next);
        carousel.swipe(Swipe::Next);
        assert_eq!(carousel.active(), 2);
        assert_eq!(carousel.requested(), vec![0, 1, 2, 3]);
        assert!(!carousel.requested().contains(&9));
    }

    #[test]
    fn swipe_stops_at_ends() {
        let mut carousel = AlbumCarousel::new(&context(), &album(2), None).unwrap();
        carousel.mount();
        assert!(carousel.swipe(Swipe::Previous).is_empty());
        carousel.swipe(Swipe::Next);
        carousel.swipe(Swipe::Next);
        assert_eq!(carousel.active(), 1);
    }

    #[test]
    fn full_view_receives_active_index() {
        let opened = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&opened);
        let mut carousel = AlbumCarousel::new(&context(), &album(4), None)
            .unwrap()
            .with_full_view(Arc::new(move |i: usize| sink.lock().unwrap().push(i)));
        carousel.mount();
        carousel.navigate(3);
        assert!(carousel.open_full_view());
        assert_eq!(*opened.lock().unwrap(), vec![3]);
    }

    #[test]
    fn unlock_reaches_slides_not_yet_requested() {
        let locked = album(6).with_locked(true);
        let mut carousel = AlbumCarousel::new(&context(), &locked, None).unwrap();
        let mounted = carousel.mount();
        assert!(mounted.iter().all(|(_, r)| r.url.contains("blur=")));

        let reissued = carousel.unlock();
        assert_eq!(reissued.iter().map(|(i, _)| *i).collect::<Vec<_>>(), vec![0, 1]);
        assert!(reissued.iter().all(|(_, r)| !r.url.contains("blur=")));

        let later = carousel.navigate(4);
        assert_eq!(later.iter().map(|(i, _)| *i).collect::<Vec<_>>(), vec![3, 4, 5]);
        for (index, request) in &later {
            assert!(!request.url.contains("blur="), "slide {index} still blurred");
        }
    }

    #[test]
    fn empty_window_on_single_slide() {
        let mut carousel = AlbumCarousel::new(&context(), &album(1), None).unwrap();
        assert_eq!(carousel.mount().len(), 1);
        assert!(carousel.navigate(1).is_empty());
        assert!(carousel.swipe(Swipe::Next).is_empty());
    }

    #[test]
    fn wrong_kind_rejected() {
        let image = MediaDescriptor::image("https://cdn.example.com/a.jpg");
        assert!(AlbumCarousel::new(&context(), &image, None).is_err());
    }
}
