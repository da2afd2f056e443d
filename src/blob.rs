// SPDX-License-Identifier: MPL-2.0

//! Object URL lifecycle
//!
//! Every object URL created from local data (capture preview, upload
//! preview, extracted thumbnail) is registered with the [`BlobLifecycle`] of
//! the instance that owns it. Each one is revoked on exactly one trigger:
//!
//! - the remote asset it stands in for finished loading
//! - the owner was torn down (explicitly or by `Drop`)
//! - the user replaced it with a different file
//!
//! Revoking twice is a no-op; never revoking is a leak.

use bytes::Bytes;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

/// A local reference to an in-memory blob
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectUrl(String);

impl ObjectUrl {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for ObjectUrl {
    fn from(url: String) -> Self {
        Self(url)
    }
}

impl std::fmt::Display for ObjectUrl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Platform object-URL table (`createObjectURL` / `revokeObjectURL`)
pub trait ObjectUrlStore: Send + Sync {
    fn create(&self, data: Bytes, mime_type: &str) -> ObjectUrl;

    /// Release the blob; unknown urls are ignored
    fn revoke(&self, url: &ObjectUrl);
}

/// In-process object URL table
#[derive(Debug, Default)]
pub struct MemoryUrlStore {
    blobs: Mutex<HashMap<ObjectUrl, (Bytes, String)>>,
}

impl MemoryUrlStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Blob bytes and MIME type behind a live url
    pub fn resolve(&self, url: &ObjectUrl) -> Option<(Bytes, String)> {
        lock(&self.blobs).get(url).cloned()
    }

    /// Number of urls not yet revoked
    pub fn live_count(&self) -> usize {
        lock(&self.blobs).len()
    }
}

impl ObjectUrlStore for MemoryUrlStore {
    fn create(&self, data: Bytes, mime_type: &str) -> ObjectUrl {
        let url = ObjectUrl(format!("blob:reel-media/{}", uuid::Uuid::new_v4()));
        lock(&self.blobs).insert(url.clone(), (data, mime_type.to_string()));
        url
    }

    fn revoke(&self, url: &ObjectUrl) {
        lock(&self.blobs).remove(url);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// What a registered url previews
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlobPurpose {
    CapturePreview,
    UploadPreview,
    Thumbnail,
}

/// Which trigger released a url
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevokeReason {
    RemoteReady,
    Teardown,
    Replaced,
}

#[derive(Debug)]
struct Entry {
    url: ObjectUrl,
    purpose: BlobPurpose,
    revoked: Option<RevokeReason>,
}

/// Object URLs owned by one post or capture instance
pub struct BlobLifecycle {
    owner: String,
    store: Arc<dyn ObjectUrlStore>,
    entries: Mutex<Vec<Entry>>,
    closed: AtomicBool,
}

impl BlobLifecycle {
    pub fn new(owner: impl Into<String>, store: Arc<dyn ObjectUrlStore>) -> Self {
        Self {
            owner: owner.into(),
            store,
            entries: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        }
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Create and register an object URL for local data
    ///
    /// Registering after teardown still returns a url, but it is revoked
    /// immediately so nothing can leak past the owner.
    pub fn register(&self, data: Bytes, mime_type: &str, purpose: BlobPurpose) -> ObjectUrl {
        let url = self.store.create(data, mime_type);
        let closed = self.closed.load(Ordering::SeqCst);
        let revoked = if closed {
            warn!(owner = %self.owner, url = %url, "Blob registered after teardown, revoking");
            self.store.revoke(&url);
            Some(RevokeReason::Teardown)
        } else {
            debug!(owner = %self.owner, url = %url, ?purpose, "Registered object url");
            None
        };

        lock(&self.entries).push(Entry {
            url: url.clone(),
            purpose,
            revoked,
        });
        url
    }

    /// Release a preview once its remote counterpart has loaded
    ///
    /// Returns `true` if this call revoked the url.
    pub fn release_on_remote_ready(&self, url: &ObjectUrl) -> bool {
        self.revoke(url, RevokeReason::RemoteReady)
    }

    /// Release every preview still live for this owner after remote confirmation
    pub fn release_all_on_remote_ready(&self) -> usize {
        self.revoke_where(|_| true, RevokeReason::RemoteReady)
    }

    /// Swap a url for one backed by new data (the user picked another file)
    pub fn replace(&self, old: &ObjectUrl, data: Bytes, mime_type: &str) -> ObjectUrl {
        let purpose = lock(&self.entries)
            .iter()
            .find(|e| &e.url == old)
            .map(|e| e.purpose)
            .unwrap_or(BlobPurpose::UploadPreview);
        self.revoke(old, RevokeReason::Replaced);
        self.register(data, mime_type, purpose)
    }

    /// Release one url because its owner no longer needs it
    pub fn release(&self, url: &ObjectUrl) -> bool {
        self.revoke(url, RevokeReason::Teardown)
    }

    /// Release everything; later registrations are revoked on arrival
    pub fn teardown(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let released = self.revoke_where(|_| true, RevokeReason::Teardown);
        if released > 0 {
            info!(owner = %self.owner, released, "Released object urls on teardown");
        }
    }

    /// Whether a url is registered here and not yet revoked
    pub fn is_live(&self, url: &ObjectUrl) -> bool {
        lock(&self.entries)
            .iter()
            .any(|e| &e.url == url && e.revoked.is_none())
    }

    /// How a url was released, if it was
    pub fn revoke_reason(&self, url: &ObjectUrl) -> Option<RevokeReason> {
        lock(&self.entries)
            .iter()
            .find(|e| &e.url == url)
            .and_then(|e| e.revoked)
    }

    /// Number of live urls
    pub fn live_count(&self) -> usize {
        lock(&self.entries)
            .iter()
            .filter(|e| e.revoked.is_none())
            .count()
    }

    fn revoke(&self, url: &ObjectUrl, reason: RevokeReason) -> bool {
        self.revoke_where(|e| &e.url == url, reason) > 0
    }

    fn revoke_where(&self, matches: impl Fn(&Entry) -> bool, reason: RevokeReason) -> usize {
        let mut entries = lock(&self.entries);
        let mut count = 0;
        for entry in entries.iter_mut().filter(|e| e.revoked.is_none()) {
            if matches(entry) {
                self.store.revoke(&entry.url);
                entry.revoked = Some(reason);
                debug!(owner = %self.owner, url = %entry.url, ?reason, "Revoked object url");
                count += 1;
            }
        }
        count
    }
}

impl Drop for BlobLifecycle {
    fn drop(&mut self) {
        self.teardown();
    }
}

impl std::fmt::Debug for BlobLifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlobLifecycle")
            .field("owner", &self.owner)
            .field("live", &self.live_count())
            .field("closed", &self.closed.load(Ordering::SeqCst))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lifecycle() -> (Arc<MemoryUrlStore>, BlobLifecycle) {
        let store = Arc::new(MemoryUrlStore::new());
        let blobs = BlobLifecycle::new("post-1", store.clone());
        (store, blobs)
    }

    #[test]
    fn remote_ready_revokes_once() {
        let (store, blobs) = lifecycle();
        let url = blobs.register(Bytes::from_static(b"jpeg"), "image/jpeg", BlobPurpose::UploadPreview);
        assert_eq!(store.live_count(), 1);

        assert!(blobs.release_on_remote_ready(&url));
        assert!(!blobs.release_on_remote_ready(&url));
        blobs.teardown();

        assert_eq!(store.live_count(), 0);
        assert_eq!(blobs.revoke_reason(&url), Some(RevokeReason::RemoteReady));
    }

    #[test]
    fn drop_releases_everything() {
        let store = Arc::new(MemoryUrlStore::new());
        {
            let blobs = BlobLifecycle::new("capture", store.clone());
            blobs.register(Bytes::from_static(b"a"), "video/webm", BlobPurpose::CapturePreview);
            blobs.register(Bytes::from_static(b"b"), "image/jpeg", BlobPurpose::Thumbnail);
            assert_eq!(store.live_count(), 2);
        }
        assert_eq!(store.live_count(), 0);
    }

    #[test]
    fn replace_revokes_previous() {
        let (store, blobs) = lifecycle();
        let first = blobs.register(Bytes::from_static(b"one"), "image/png", BlobPurpose::UploadPreview);
        let second = blobs.replace(&first, Bytes::from_static(b"two"), "image/png");

        assert_eq!(blobs.revoke_reason(&first), Some(RevokeReason::Replaced));
        assert!(blobs.is_live(&second));
        assert_eq!(store.live_count(), 1);
        assert_eq!(store.resolve(&second).map(|(b, _)| b), Some(Bytes::from_static(b"two")));
    }

    #[test]
    fn register_after_teardown_does_not_leak() {
        let (store, blobs) = lifecycle();
        blobs.teardown();
        let url = blobs.register(Bytes::from_static(b"late"), "image/png", BlobPurpose::Thumbnail);
        assert!(!blobs.is_live(&url));
        assert_eq!(store.live_count(), 0);
    }
}
