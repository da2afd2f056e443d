// SPDX-License-Identifier: MPL-2.0

//! Descriptor → surface tree

use super::album::{AlbumCarousel, FullViewFn, SlideReadyFn};
use super::descriptor::{DescriptorKind, MediaDescriptor};
use super::reel::ReelPlayer;
use super::retry::RetryOutcome;
use super::surface::{LoadRequest, LoadToken, ResilientMediaSurface, SurfaceContext};
use crate::errors::DescriptorError;
use crate::scheduler::Wakeup;
use tracing::info;

/// Single-image post
pub struct SingleImage {
    surface: ResilientMediaSurface,
    on_full_view: Option<FullViewFn>,
}

impl SingleImage {
    pub fn new(
        ctx: &SurfaceContext,
        descriptor: &MediaDescriptor,
        on_remote_ready: Option<Box<dyn FnOnce() + Send>>,
    ) -> Result<Self, DescriptorError> {
        descriptor.expect_kind(DescriptorKind::Image)?;
        let item = descriptor.items().first().ok_or(DescriptorError::WrongKind {
            expected: "image",
            found: "empty",
        })?;

        let mut surface = ResilientMediaSurface::new(ctx.clone(), item.remote_key.clone(), item.kind)
            .with_local_preview(descriptor.local_preview(0).cloned())
            .with_locked(descriptor.is_locked());
        if let Some(callback) = on_remote_ready {
            surface = surface.on_remote_ready(callback);
        }
        Ok(Self {
            surface,
            on_full_view: None,
        })
    }

    pub fn with_full_view(mut self, hook: FullViewFn) -> Self {
        self.on_full_view = Some(hook);
        self
    }

    pub fn surface(&self) -> &ResilientMediaSurface {
        &self.surface
    }

    pub fn surface_mut(&mut self) -> &mut ResilientMediaSurface {
        &mut self.surface
    }

    pub fn mount(&mut self) -> LoadRequest {
        self.surface.load()
    }

    /// Tap; opens the viewer at index 0
    pub fn open_full_view(&self) -> bool {
        match &self.on_full_view {
            Some(hook) => {
                info!(url = %self.surface.remote_url(), "Opening full view");
                hook(0);
                true
            }
            None => false,
        }
    }
}

/// Caller hooks for a rendered post
#[derive(Default)]
pub struct PostHooks {
    /// `onUserRequestsFullView(index)`
    pub on_full_view: Option<FullViewFn>,
    /// Remote asset confirmed for item `index`; used to release its local preview
    pub on_remote_ready: Option<SlideReadyFn>,
}

/// The surfaces for one post
#[derive(Debug)]
pub enum PostMedia {
    Image(SingleImage),
    Album(AlbumCarousel),
    Reel(ReelPlayer),
}

impl PostMedia {
    /// Build the surfaces a descriptor calls for
    pub fn render(
        ctx: &SurfaceContext,
        descriptor: &MediaDescriptor,
        hooks: PostHooks,
    ) -> Result<Self, DescriptorError> {
        let single_ready = hooks.on_remote_ready.clone().map(|hook| {
            Box::new(move || hook(0)) as Box<dyn FnOnce() + Send>
        });

        match descriptor.kind() {
            DescriptorKind::Image => {
                let mut image = SingleImage::new(ctx, descriptor, single_ready)?;
                if let Some(hook) = hooks.on_full_view {
                    image = image.with_full_view(hook);
                }
                Ok(PostMedia::Image(image))
            }
            DescriptorKind::Album => {
                let mut album = AlbumCarousel::new(ctx, descriptor, hooks.on_remote_ready)?;
                if let Some(hook) = hooks.on_full_view {
                    album = album.with_full_view(hook);
                }
                Ok(PostMedia::Album(album))
            }
            DescriptorKind::Reel => Ok(PostMedia::Reel(ReelPlayer::new(
                ctx,
                descriptor,
                single_ready,
            )?)),
        }
    }

    /// Initial loads as `(item index, request)`
    pub fn mount(&mut self) -> Vec<(usize, LoadRequest)> {
        match self {
            PostMedia::Image(image) => vec![(0, image.mount())],
            PostMedia::Album(album) => album.mount(),
            PostMedia::Reel(reel) => reel.mount().into_iter().map(|r| (0, r)).collect(),
        }
    }

    pub fn handle_wakeup(&mut self, wakeup: Wakeup) -> bool {
        match self {
            PostMedia::Image(image) => image.surface.handle_wakeup(wakeup),
            PostMedia::Album(album) => album.handle_wakeup(wakeup),
            PostMedia::Reel(reel) => reel.handle_wakeup(wakeup),
        }
    }

    /// Route a load result
    ///
    /// Reels may want to start playing here; hosts that drive playback call
    /// [`ReelPlayer::on_load`] directly to get the command.
    pub fn on_load(&mut self, index: usize, token: LoadToken) -> bool {
        match self {
            PostMedia::Image(image) => image.surface.on_load(token),
            PostMedia::Album(album) => album.on_load(index, token),
            PostMedia::Reel(reel) => reel.on_load(token).accepted,
        }
    }

    pub fn on_error(&mut self, index: usize, token: LoadToken) -> bool {
        match self {
            PostMedia::Image(image) => image.surface.on_error(token),
            PostMedia::Album(album) => album.on_error(index, token),
            PostMedia::Reel(reel) => reel.on_error(token),
        }
    }

    pub fn retry(&mut self, index: usize) -> RetryOutcome<LoadRequest> {
        match self {
            PostMedia::Image(image) => image.surface.retry(),
            PostMedia::Album(album) => album.retry(index),
            PostMedia::Reel(reel) => reel.retry(),
        }
    }

    /// Payment flow unlocked the post
    pub fn unlock(&mut self) -> Vec<(usize, LoadRequest)> {
        match self {
            PostMedia::Image(image) => image.surface.unlock().map(|r| (0, r)).into_iter().collect(),
            PostMedia::Album(album) => album.unlock(),
            PostMedia::Reel(reel) => reel.unlock().into_iter().map(|r| (0, r)).collect(),
        }
    }

    pub fn open_full_view(&self) -> bool {
        match self {
            PostMedia::Image(image) => image.open_full_view(),
            PostMedia::Album(album) => album.open_full_view(),
            PostMedia::Reel(_) => false,
        }
    }
}

impl std::fmt::Debug for SingleImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SingleImage")
            .field("surface", &self.surface)
            .finish_non_exhaustive()
    }
}
