// SPDX-License-Identifier: MPL-2.0

//! Request URL construction
//!
//! Retries append a timestamp query parameter so the fetch bypasses any
//! cached failure. Locked media only ever asks for the blurred variant.

use crate::constants::display::{BLUR_PARAM, CACHE_BUST_PARAM};
use tracing::debug;
use url::Url;

/// Variant of an asset to request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variant {
    Full,
    Blurred { radius: u32 },
}

/// URL to request for `base`
///
/// Existing cache-bust and blur parameters are replaced, other query pairs
/// are kept in order. Keys that do not parse as absolute URLs get the
/// parameters appended textually.
pub fn request_url(base: &str, variant: Variant, cache_bust: Option<i64>) -> String {
    let mut extra: Vec<(&str, String)> = Vec::new();
    if let Variant::Blurred { radius } = variant {
        extra.push((BLUR_PARAM, radius.to_string()));
    }
    if let Some(stamp) = cache_bust {
        extra.push((CACHE_BUST_PARAM, stamp.to_string()));
    }

    let Ok(mut url) = Url::parse(base) else {
        debug!(base, "Request key is not an absolute URL, appending parameters");
        return append_raw(base, &extra);
    };
    if extra.is_empty() {
        return url.into();
    }

    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| k != BLUR_PARAM && k != CACHE_BUST_PARAM)
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    {
        let mut pairs = url.query_pairs_mut();
        pairs.clear();
        for (k, v) in &kept {
            pairs.append_pair(k, v);
        }
        for (k, v) in &extra {
            pairs.append_pair(k, v);
        }
    }
    url.into()
}

fn append_raw(base: &str, extra: &[(&str, String)]) -> String {
    let mut out = base.to_string();
    for (k, v) in extra {
        out.push(if out.contains('?') { '&' } else { '?' });
        out.push_str(k);
        out.push('=');
        out.push_str(v);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_url_untouched() {
        assert_eq!(
            request_url("https://cdn.example.com/a.jpg", Variant::Full, None),
            "https://cdn.example.com/a.jpg"
        );
    }

    #[test]
    fn cache_bust_replaces_previous_stamp() {
        let first = request_url("https://cdn.example.com/a.jpg?w=400", Variant::Full, Some(1));
        assert_eq!(first, "https://cdn.example.com/a.jpg?w=400&t=1");
        let second = request_url(&first, Variant::Full, Some(2));
        assert_eq!(second, "https://cdn.example.com/a.jpg?w=400&t=2");
    }

    #[test]
    fn blurred_variant_only_adds_blur() {
        let url = request_url(
            "https://cdn.example.com/a.jpg",
            Variant::Blurred { radius: 24 },
            None,
        );
        assert_eq!(url, "https://cdn.example.com/a.jpg?blur=24");
    }

    #[test]
    fn relative_keys_appended_textually() {
        assert_eq!(
            request_url("media/a.jpg", Variant::Blurred { radius: 8 }, Some(5)),
            "media/a.jpg?blur=8&t=5"
        );
    }
}
