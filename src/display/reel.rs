// SPDX-License-Identifier: MPL-2.0

//! Reel player
//!
//! A video surface plus an optional poster surface. Playback follows
//! viewport visibility: at or above the autoplay threshold the player asks
//! the host to play, below it to pause. A play request the platform refuses
//! for policy reasons lands in `AutoplayBlocked`, which shows a manual play
//! button instead of the error affordance.

use super::descriptor::{DescriptorKind, MediaDescriptor, MediaKind};
use super::retry::RetryOutcome;
use super::surface::{LoadRequest, LoadToken, ResilientMediaSurface, SurfaceContext, SurfacePhase};
use crate::errors::DescriptorError;
use crate::scheduler::Wakeup;
use tracing::{debug, info, warn};

/// Host-side playback state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    /// Not started yet
    Idle,
    /// A play command is outstanding
    Starting,
    Playing,
    Paused,
    /// Autoplay refused by platform policy; waiting for a user tap
    AutoplayBlocked,
}

/// What the host should do with the video element
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackCommand {
    Play,
    Pause,
}

/// Why a play command did not start playback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayRejection {
    /// Autoplay policy (`NotAllowedError`)
    Blocked,
    /// The media itself could not play
    Failed,
}

/// Result of routing a load to a reel
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadAck {
    /// The token belonged to the poster or video
    pub accepted: bool,
    /// Command to apply now that the video is ready
    pub playback: Option<PlaybackCommand>,
}

/// One reel post
pub struct ReelPlayer {
    video: ResilientMediaSurface,
    poster: Option<ResilientMediaSurface>,
    playback: PlaybackState,
    visibility: f32,
    threshold: f32,
}

impl ReelPlayer {
    pub fn new(
        ctx: &SurfaceContext,
        descriptor: &MediaDescriptor,
        on_remote_ready: Option<Box<dyn FnOnce() + Send>>,
    ) -> Result<Self, DescriptorError> {
        descriptor.expect_kind(DescriptorKind::Reel)?;
        let [item] = descriptor.items() else {
            return Err(DescriptorError::ReelShape);
        };

        let mut video = ResilientMediaSurface::new(ctx.clone(), item.remote_key.clone(), item.kind)
            .with_local_preview(descriptor.local_preview(0).cloned())
            .with_locked(descriptor.is_locked());
        if let Some(callback) = on_remote_ready {
            video = video.on_remote_ready(callback);
        }
        let poster = descriptor.thumbnail_key().map(|key| {
            ResilientMediaSurface::new(ctx.clone(), key, MediaKind::Image)
                .with_locked(descriptor.is_locked())
        });

        Ok(Self {
            video,
            poster,
            playback: PlaybackState::Idle,
            visibility: 0.0,
            threshold: ctx.config.autoplay_visibility,
        })
    }

    pub fn video(&self) -> &ResilientMediaSurface {
        &self.video
    }

    pub fn poster(&self) -> Option<&ResilientMediaSurface> {
        self.poster.as_ref()
    }

    pub fn playback(&self) -> PlaybackState {
        self.playback
    }

    /// Whether to show the manual play button
    pub fn shows_play_button(&self) -> bool {
        self.playback == PlaybackState::AutoplayBlocked
    }

    fn is_visible(&self) -> bool {
        self.visibility >= self.threshold
    }

    /// Poster first, then the video
    pub fn mount(&mut self) -> Vec<LoadRequest> {
        let mut requests = Vec::with_capacity(2);
        if let Some(poster) = &mut self.poster {
            requests.push(poster.load());
        }
        requests.push(self.video.load());
        requests
    }

    /// Intersection update with the visible fraction `0.0..=1.0`
    pub fn set_visibility(&mut self, ratio: f32) -> Option<PlaybackCommand> {
        let was_visible = self.is_visible();
        self.visibility = ratio.clamp(0.0, 1.0);
        let visible = self.is_visible();
        if visible == was_visible {
            return None;
        }
        debug!(ratio = self.visibility, visible, "Reel visibility changed");
        if visible {
            self.try_autoplay()
        } else {
            self.pause()
        }
    }

    /// Host finished loading `token` (poster or video)
    pub fn on_load(&mut self, token: LoadToken) -> LoadAck {
        if self.poster.as_mut().is_some_and(|p| p.on_load(token)) {
            return LoadAck {
                accepted: true,
                playback: None,
            };
        }
        if !self.video.on_load(token) {
            return LoadAck::default();
        }
        let playback = if self.is_visible() {
            self.try_autoplay()
        } else {
            None
        };
        LoadAck {
            accepted: true,
            playback,
        }
    }

    fn on_video_error(&mut self, token: LoadToken) -> bool {
        let failed = self.video.on_error(token);
        if failed {
            self.playback = PlaybackState::Idle;
        }
        failed
    }

    /// Host failed to load `token` (poster or video)
    pub fn on_error(&mut self, token: LoadToken) -> bool {
        if self.poster.as_mut().is_some_and(|p| p.on_error(token)) {
            return true;
        }
        self.on_video_error(token)
    }

    /// Host reports the outcome of the last play command
    pub fn on_play_result(&mut self, result: Result<(), PlayRejection>) {
        if self.playback != PlaybackState::Starting {
            return;
        }
        self.playback = match result {
            Ok(()) => PlaybackState::Playing,
            Err(PlayRejection::Blocked) => {
                info!(url = %self.video.remote_url(), "Autoplay blocked, waiting for tap");
                PlaybackState::AutoplayBlocked
            }
            Err(PlayRejection::Failed) => {
                warn!(url = %self.video.remote_url(), "Video refused to play");
                PlaybackState::Paused
            }
        };
    }

    /// User tapped play
    pub fn play_manually(&mut self) -> Option<PlaybackCommand> {
        if self.video.phase() != SurfacePhase::Ready {
            return None;
        }
        match self.playback {
            PlaybackState::Playing | PlaybackState::Starting => None,
            _ => {
                self.playback = PlaybackState::Starting;
                Some(PlaybackCommand::Play)
            }
        }
    }

    /// Retry whichever surface failed, the video first
    pub fn retry(&mut self) -> RetryOutcome<LoadRequest> {
        if matches!(self.video.phase(), SurfacePhase::Error(_)) {
            return self.video.retry();
        }
        self.retry_poster()
    }

    pub fn retry_poster(&mut self) -> RetryOutcome<LoadRequest> {
        match &mut self.poster {
            Some(poster) => poster.retry(),
            None => RetryOutcome::NotNeeded,
        }
    }

    /// Unlock both surfaces; returns the reissued loads
    pub fn unlock(&mut self) -> Vec<LoadRequest> {
        let mut requests = Vec::new();
        if let Some(request) = self.poster.as_mut().and_then(ResilientMediaSurface::unlock) {
            requests.push(request);
        }
        if let Some(request) = self.video.unlock() {
            self.playback = PlaybackState::Idle;
            requests.push(request);
        }
        requests
    }

    pub fn handle_wakeup(&mut self, wakeup: Wakeup) -> bool {
        if self.video.handle_wakeup(wakeup) {
            return true;
        }
        self.poster
            .as_mut()
            .is_some_and(|poster| poster.handle_wakeup(wakeup))
    }

    fn try_autoplay(&mut self) -> Option<PlaybackCommand> {
        if self.video.phase() != SurfacePhase::Ready {
            return None;
        }
        match self.playback {
            PlaybackState::Playing | PlaybackState::Starting | PlaybackState::AutoplayBlocked => None,
            PlaybackState::Idle | PlaybackState::Paused => {
                self.playback = PlaybackState::Starting;
                Some(PlaybackCommand::Play)
            }
        }
    }

    fn pause(&mut self) -> Option<PlaybackCommand> {
        match self.playback {
            PlaybackState::Playing | PlaybackState::Starting => {
                self.playback = PlaybackState::Paused;
                Some(PlaybackCommand::Pause)
            }
            _ => None,
        }
    }
}

impl std::fmt::Debug for ReelPlayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReelPlayer")
            .field("video", &self.video)
            .field("playback", &self.playback)
            .field("visibility", &self.visibility)
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
    use std::sync::Arc;

    fn reel() -> ReelPlayer {
        let ctx = SurfaceContext::new(
            ManualScheduler::shared(),
            Arc::new(ManualConnectivity::default()),
            DisplayConfig::default(),
        );
        let descriptor = MediaDescriptor::reel(
            vec![MediaItem::video("https://cdn.example.com/v.mp4")],
            Some("https://cdn.example.com/t.jpg".into()),
        )
        .unwrap();
        ReelPlayer::new(&ctx, &descriptor, None).unwrap()
    }

    fn loaded(player: &mut ReelPlayer) {
        let requests = player.mount();
        assert_eq!(requests.len(), 2);
        let video = requests.iter().find(|r| r.kind == MediaKind::Video).unwrap();
        assert!(player.on_load(video.token).accepted);
    }

    #[test]
    fn autoplay_at_half_visibility() {
        let mut player = reel();
        loaded(&mut player);
        assert_eq!(player.set_visibility(0.49), None);
        assert_eq!(player.set_visibility(0.5), Some(PlaybackCommand::Play));
        player.on_play_result(Ok(()));
        assert_eq!(player.playback(), PlaybackState::Playing);
        assert_eq!(player.set_visibility(0.2), Some(PlaybackCommand::Pause));
    }

    #[test]
    fn blocked_autoplay_is_not_an_error() {
        let mut player = reel();
        loaded(&mut player);
        player.set_visibility(1.0);
        player.on_play_result(Err(PlayRejection::Blocked));
        assert!(player.shows_play_button());
        assert_eq!(player.video().phase(), SurfacePhase::Ready);

        // Scrolling away and back does not retry autoplay
        player.set_visibility(0.0);
        assert_eq!(player.set_visibility(1.0), None);
        assert_eq!(player.play_manually(), Some(PlaybackCommand::Play));
    }

    #[test]
    fn failed_poster_can_be_retried() {
        let mut player = reel();
        let requests = player.mount();
        let poster = requests.iter().find(|r| r.kind == MediaKind::Image).unwrap();
        let video = requests.iter().find(|r| r.kind == MediaKind::Video).unwrap();
        assert!(player.on_load(video.token).accepted);
        assert!(player.on_error(poster.token));

        let RetryOutcome::Reissued(request) = player.retry() else {
            panic!("poster retry was not issued");
        };
        assert_eq!(request.kind, MediaKind::Image);
        assert!(request.url.starts_with("https://cdn.example.com/t.jpg"));
        assert_ne!(request.token, poster.token);
        assert_eq!(player.video().phase(), SurfacePhase::Ready);
    }

    #[test]
    fn failed_video_retried_before_poster() {
        let mut player = reel();
        let requests = player.mount();
        for request in &requests {
            assert!(player.on_error(request.token));
        }

        let RetryOutcome::Reissued(request) = player.retry() else {
            panic!("video retry was not issued");
        };
        assert_eq!(request.kind, MediaKind::Video);
        assert!(matches!(player.retry_poster(), RetryOutcome::Reissued(_)));
    }

    #[test]
    fn visible_before_load_plays_on_load() {
        let mut player = reel();
        let requests = player.mount();
        assert_eq!(player.set_visibility(0.8), None);
        let video = requests.iter().find(|r| r.kind == MediaKind::Video).unwrap();
        assert_eq!(player.on_load(video.token).playback, Some(PlaybackCommand::Play));
    }
}
