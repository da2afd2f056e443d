// SPDX-License-Identifier: MPL-2.0

//! Post media descriptors
//!
//! Built once per post render and never mutated; a changed post is a new
//! descriptor. Constructors enforce the shape rules.

use super::url::{Variant, request_url};
use crate::blob::ObjectUrl;
use crate::constants::display::MAX_ALBUM_ITEMS;
use crate::errors::DescriptorError;

/// What a single remote asset is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Image,
    Video,
}

impl MediaKind {
    pub fn name(&self) -> &'static str {
        match self {
            MediaKind::Image => "image",
            MediaKind::Video => "video",
        }
    }
}

/// One remote asset
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaItem {
    /// Remote URL of the asset
    pub remote_key: String,
    pub kind: MediaKind,
}

impl MediaItem {
    pub fn image(remote_key: impl Into<String>) -> Self {
        Self {
            remote_key: remote_key.into(),
            kind: MediaKind::Image,
        }
    }

    pub fn video(remote_key: impl Into<String>) -> Self {
        Self {
            remote_key: remote_key.into(),
            kind: MediaKind::Video,
        }
    }
}

/// Post layout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptorKind {
    Image,
    Album,
    Reel,
}

impl DescriptorKind {
    pub fn name(&self) -> &'static str {
        match self {
            DescriptorKind::Image => "image",
            DescriptorKind::Album => "album",
            DescriptorKind::Reel => "reel",
        }
    }
}

/// Immutable description of a post's media
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaDescriptor {
    kind: DescriptorKind,
    items: Vec<MediaItem>,
    thumbnail_key: Option<String>,
    local_previews: Vec<Option<ObjectUrl>>,
    locked: bool,
}

impl MediaDescriptor {
    /// A single image post
    pub fn image(primary_url: impl Into<String>) -> Self {
        Self {
            kind: DescriptorKind::Image,
            items: vec![MediaItem::image(primary_url)],
            thumbnail_key: None,
            local_previews: vec![None],
            locked: false,
        }
    }

    /// An album of `1..=10` items
    pub fn album(items: Vec<MediaItem>) -> Result<Self, DescriptorError> {
        if items.is_empty() {
            return Err(DescriptorError::EmptyAlbum);
        }
        if items.len() > MAX_ALBUM_ITEMS {
            return Err(DescriptorError::TooManySlides {
                count: items.len(),
                max: MAX_ALBUM_ITEMS,
            });
        }
        Ok(Self {
            kind: DescriptorKind::Album,
            local_previews: vec![None; items.len()],
            items,
            thumbnail_key: None,
            locked: false,
        })
    }

    /// A reel: exactly one video plus an optional poster thumbnail
    pub fn reel(items: Vec<MediaItem>, thumbnail_key: Option<String>) -> Result<Self, DescriptorError> {
        let [item] = items.as_slice() else {
            return Err(DescriptorError::ReelShape);
        };
        if item.kind != MediaKind::Video {
            return Err(DescriptorError::ReelShape);
        }
        Ok(Self {
            kind: DescriptorKind::Reel,
            items,
            thumbnail_key,
            local_previews: vec![None],
            locked: false,
        })
    }

    /// Attach a local object URL shown for item `index` until its remote asset loads
    ///
    /// Out-of-range indices are ignored.
    pub fn with_local_preview(mut self, index: usize, url: ObjectUrl) -> Self {
        if let Some(slot) = self.local_previews.get_mut(index) {
            *slot = Some(url);
        }
        self
    }

    /// Mark the post as locked; only blurred variants are requested
    pub fn with_locked(mut self, locked: bool) -> Self {
        self.locked = locked;
        self
    }

    pub fn kind(&self) -> DescriptorKind {
        self.kind
    }

    pub fn items(&self) -> &[MediaItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn thumbnail_key(&self) -> Option<&str> {
        self.thumbnail_key.as_deref()
    }

    pub fn local_preview(&self, index: usize) -> Option<&ObjectUrl> {
        self.local_previews.get(index).and_then(Option::as_ref)
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    /// Image URLs worth warming ahead of the viewport
    ///
    /// For reels this is the poster; the video itself is left to the surface.
    /// Locked posts only ever warm the blurred variant at `blur_radius`.
    pub fn preload_urls(&self, blur_radius: u32) -> Vec<String> {
        let variant = if self.locked {
            Variant::Blurred {
                radius: blur_radius,
            }
        } else {
            Variant::Full
        };
        let keys: Vec<&str> = match self.kind {
            DescriptorKind::Reel => self.thumbnail_key.as_deref().into_iter().collect(),
            _ => self
                .items
                .iter()
                .filter(|item| item.kind == MediaKind::Image)
                .map(|item| item.remote_key.as_str())
                .collect(),
        };
        keys.into_iter()
            .map(|key| request_url(key, variant, None))
            .collect()
    }

    pub(crate) fn expect_kind(&self, expected: DescriptorKind) -> Result<(), DescriptorError> {
        if self.kind == expected {
            Ok(())
        } else {
            Err(DescriptorError::WrongKind {
                expected: expected.name(),
                found: self.kind.name(),
            })
        }
    }
}
