// SPDX-License-Identifier: MPL-2.0

//! Per-item load/error/retry state machine
//!
//! A surface never fetches anything itself. It hands out [`LoadRequest`]s,
//! the host performs them and reports back with the request's token. Every
//! load is bounded by a scheduler timeout; whichever of success, failure or
//! timeout arrives first decides the phase, and results carrying an older
//! token are ignored.
//!
//! ```text
//! loading ──on_load──▶ ready
//!    │
//!    ├──on_error────▶ error(decode) ──retry──▶ loading
//!    └──timeout─────▶ error(timeout) ─┘
//! ```

use super::descriptor::MediaKind;
use super::retry::{RetryOutcome, RetryThrottle};
use super::url::{Variant, request_url};
use crate::blob::ObjectUrl;
use crate::config::DisplayConfig;
use crate::errors::MediaError;
use crate::network::Connectivity;
use crate::scheduler::{Scheduler, TimerId, Wakeup};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Shared collaborators for every surface of a feed
#[derive(Clone)]
pub struct SurfaceContext {
    pub scheduler: Arc<dyn Scheduler>,
    pub connectivity: Arc<dyn Connectivity>,
    pub config: DisplayConfig,
}

impl SurfaceContext {
    pub fn new(
        scheduler: Arc<dyn Scheduler>,
        connectivity: Arc<dyn Connectivity>,
        config: DisplayConfig,
    ) -> Self {
        Self {
            scheduler,
            connectivity,
            config,
        }
    }

    /// Load deadline for a media kind
    pub fn load_timeout(&self, kind: MediaKind) -> Duration {
        match kind {
            MediaKind::Image => self.config.image_load_timeout,
            MediaKind::Video => self.config.video_load_timeout,
        }
    }
}

/// Identifies one issued load; results with an older token are stale
///
/// Tokens are unique process-wide, so a host can route results for several
/// surfaces through one table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LoadToken(u64);

static NEXT_TOKEN: AtomicU64 = AtomicU64::new(1);

impl LoadToken {
    fn next() -> Self {
        Self(NEXT_TOKEN.fetch_add(1, Ordering::Relaxed))
    }
}

/// A fetch the host should perform
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadRequest {
    pub token: LoadToken,
    pub url: String,
    pub kind: MediaKind,
}

/// Surface phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfacePhase {
    Loading,
    Ready,
    /// `LoadTimeout` or `DecodeFailed`
    Error(MediaError),
}

/// Observable state of one surface
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SurfaceState {
    pub phase: SurfacePhase,
    pub retry_count: u32,
    /// Monotonic; bumped on every reissued load
    pub retry_key: u64,
    pub is_offline: bool,
}

/// What to draw right now
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Visual<'a> {
    /// Loading placeholder
    Skeleton,
    /// Local object URL shown while the remote asset loads underneath
    Preview(&'a ObjectUrl),
    /// The remote asset
    Remote(&'a str),
    /// Retry affordance with its user-facing message
    Failed(&'static str),
}

/// One image, album slide or reel video
pub struct ResilientMediaSurface {
    ctx: SurfaceContext,
    remote_url: String,
    kind: MediaKind,
    locked: bool,
    local_preview: Option<ObjectUrl>,
    state: SurfaceState,
    current: Option<LoadRequest>,
    timeout: Option<TimerId>,
    throttle: RetryThrottle,
    cache_bust: Option<i64>,
    on_remote_ready: Option<Box<dyn FnOnce() + Send>>,
    remote_confirmed: bool,
}

impl ResilientMediaSurface {
    pub fn new(ctx: SurfaceContext, remote_url: impl Into<String>, kind: MediaKind) -> Self {
        let throttle = RetryThrottle::new(ctx.config.retry_throttle);
        Self {
            ctx,
            remote_url: remote_url.into(),
            kind,
            locked: false,
            local_preview: None,
            state: SurfaceState {
                phase: SurfacePhase::Loading,
                retry_count: 0,
                retry_key: 0,
                is_offline: false,
            },
            current: None,
            timeout: None,
            throttle,
            cache_bust: None,
            on_remote_ready: None,
            remote_confirmed: false,
        }
    }

    /// Show `url` until the remote asset is confirmed
    pub fn with_local_preview(mut self, url: Option<ObjectUrl>) -> Self {
        self.local_preview = url;
        self
    }

    pub fn with_locked(mut self, locked: bool) -> Self {
        self.locked = locked;
        self
    }

    /// Called once, the first time the remote asset loads
    pub fn on_remote_ready(mut self, callback: impl FnOnce() + Send + 'static) -> Self {
        self.on_remote_ready = Some(Box::new(callback));
        self
    }

    pub fn state(&self) -> &SurfaceState {
        &self.state
    }

    pub fn phase(&self) -> SurfacePhase {
        self.state.phase
    }

    pub fn kind(&self) -> MediaKind {
        self.kind
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    pub fn remote_url(&self) -> &str {
        &self.remote_url
    }

    /// The load currently in flight
    pub fn pending(&self) -> Option<&LoadRequest> {
        self.current.as_ref()
    }

    /// Whether the host ever confirmed the remote asset
    pub fn remote_confirmed(&self) -> bool {
        self.remote_confirmed
    }

    /// URL the next load will request
    pub fn request_url(&self) -> String {
        let variant = if self.locked {
            Variant::Blurred {
                radius: self.ctx.config.blur_radius,
            }
        } else {
            Variant::Full
        };
        request_url(&self.remote_url, variant, self.cache_bust)
    }

    /// Render decision; a preview suppresses the loading skeleton
    pub fn visual(&self) -> Visual<'_> {
        match self.state.phase {
            SurfacePhase::Ready => match &self.current {
                Some(request) => Visual::Remote(&request.url),
                None => Visual::Remote(&self.remote_url),
            },
            SurfacePhase::Loading => match &self.local_preview {
                Some(url) => Visual::Preview(url),
                None => Visual::Skeleton,
            },
            SurfacePhase::Error(_) => Visual::Failed(self.error_message().unwrap_or_default()),
        }
    }

    /// User-facing message for the error affordance
    pub fn error_message(&self) -> Option<&'static str> {
        match self.state.phase {
            SurfacePhase::Error(_) if self.state.is_offline => Some(MediaError::Offline.user_message()),
            SurfacePhase::Error(e) => Some(e.user_message()),
            _ => None,
        }
    }

    /// Start loading; returns the request to perform
    ///
    /// Calling it while a load is already in flight returns that load.
    pub fn load(&mut self) -> LoadRequest {
        if self.state.phase == SurfacePhase::Loading
            && let Some(current) = &self.current
        {
            return current.clone();
        }
        self.issue()
    }

    /// The host finished loading `token` successfully
    pub fn on_load(&mut self, token: LoadToken) -> bool {
        if !self.is_current(token) {
            debug!(?token, "Ignoring stale load result");
            return false;
        }
        self.cancel_timeout();
        self.state.phase = SurfacePhase::Ready;
        self.state.retry_count = 0;
        self.state.is_offline = false;
        debug!(url = %self.remote_url, "Media loaded");

        if !self.remote_confirmed {
            self.remote_confirmed = true;
            if let Some(callback) = self.on_remote_ready.take() {
                info!(url = %self.remote_url, "Remote asset confirmed");
                callback();
            }
        }
        true
    }

    /// The host failed to load or decode `token`
    pub fn on_error(&mut self, token: LoadToken) -> bool {
        if !self.is_current(token) || self.state.phase != SurfacePhase::Loading {
            debug!(?token, "Ignoring stale load error");
            return false;
        }
        self.cancel_timeout();
        warn!(url = %self.remote_url, retry = self.state.retry_count, "Media failed to load");
        self.state.phase = SurfacePhase::Error(MediaError::DecodeFailed);
        true
    }

    /// Route a scheduler wakeup; returns whether it was this surface's timeout
    pub fn handle_wakeup(&mut self, wakeup: Wakeup) -> bool {
        match wakeup {
            Wakeup::Timer(id) if self.timeout == Some(id) => {
                self.timeout = None;
                if self.state.phase == SurfacePhase::Loading {
                    warn!(
                        url = %self.remote_url,
                        kind = self.kind.name(),
                        "Media load timed out"
                    );
                    self.state.phase = SurfacePhase::Error(MediaError::LoadTimeout);
                }
                true
            }
            _ => false,
        }
    }

    /// Manual retry from the error affordance
    pub fn retry(&mut self) -> RetryOutcome<LoadRequest> {
        if !matches!(self.state.phase, SurfacePhase::Error(_)) {
            return RetryOutcome::NotNeeded;
        }
        if !self.throttle.admit(self.ctx.scheduler.now()) {
            debug!(url = %self.remote_url, "Retry throttled");
            return RetryOutcome::Throttled;
        }
        if !self.ctx.connectivity.is_online() {
            info!(url = %self.remote_url, "Retry skipped, device offline");
            self.state.is_offline = true;
            return RetryOutcome::Offline;
        }

        self.state.is_offline = false;
        self.state.retry_key += 1;
        self.state.retry_count += 1;
        self.cache_bust = Some(self.ctx.scheduler.epoch_millis());
        info!(
            url = %self.remote_url,
            retry = self.state.retry_count,
            "Retrying media load"
        );
        RetryOutcome::Reissued(self.issue())
    }

    /// Drop the blur and request the full asset
    pub fn unlock(&mut self) -> Option<LoadRequest> {
        if !self.locked {
            return None;
        }
        self.locked = false;
        info!(url = %self.remote_url, "Media unlocked");
        Some(self.issue())
    }

    /// Drop the blur without requesting anything; the next `load` is full size
    pub fn clear_lock(&mut self) -> bool {
        std::mem::replace(&mut self.locked, false)
    }

    /// Stop waiting on the current load
    pub fn cancel(&mut self) {
        self.cancel_timeout();
        self.current = None;
    }

    fn issue(&mut self) -> LoadRequest {
        self.cancel_timeout();
        let request = LoadRequest {
            token: LoadToken::next(),
            url: self.request_url(),
            kind: self.kind,
        };
        self.state.phase = SurfacePhase::Loading;
        self.timeout = Some(self.ctx.scheduler.set_timeout(self.ctx.load_timeout(self.kind)));
        debug!(url = %request.url, token = request.token.0, "Media load issued");
        self.current = Some(request.clone());
        request
    }

    fn is_current(&self, token: LoadToken) -> bool {
        self.current.as_ref().is_some_and(|r| r.token == token)
    }

    fn cancel_timeout(&mut self) {
        if let Some(id) = self.timeout.take() {
            self.ctx.scheduler.cancel_timeout(id);
        }
    }
}

impl Drop for ResilientMediaSurface {
    fn drop(&mut self) {
        self.cancel_timeout();
    }
}

impl std::fmt::Debug for ResilientMediaSurface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResilientMediaSurface")
            .field("remote_url", &self.remote_url)
            .field("kind", &self.kind)
            .field("locked", &self.locked)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}
