//! URL canonicalization used at every crawler boundary.
//!
//! Two URLs that differ only in fragment, default port, scheme/host case, or
//! a trailing dot on the host normalize to the same string.

use url::Url;

/// Canonicalize `raw`, resolving it against `base` when relative.
///
/// Returns `None` for anything that is not a fetchable http(s) URL: other
/// schemes (`mailto:`, `javascript:`, data URIs), hostless or malformed
/// input, and relative references without a usable base.
pub fn normalize(raw: &str, base: Option<&str>) -> Option<String> {
    let mut parsed = match Url::parse(raw) {
        Ok(url) => url,
        Err(url::ParseError::RelativeUrlWithoutBase) => {
            let base = Url::parse(base?).ok()?;
            base.join(raw).ok()?
        }
        Err(_) => return None,
    };

    if !matches!(parsed.scheme(), "http" | "https") {
        return None;
    }

    let host = parsed.host_str()?.to_string();
    if host.is_empty() {
        return None;
    }

    // "example.com." and "example.com" are the same origin in DNS terms
    if let Some(stripped) = host.strip_suffix('.') {
        if stripped.is_empty() {
            return None;
        }
        parsed.set_host(Some(stripped)).ok()?;
    }

    parsed.set_fragment(None);

    Some(parsed.to_string())
}
