//! Cached value for the `Date` response header.
//!
//! Formatting an HTTP date on every response is wasteful when thousands of responses share
//! the same second. The formatted value is kept behind an [`ArcSwap`] and refreshed lazily
//! by whichever response first notices the second has changed.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use arc_swap::ArcSwap;
use bytes::Bytes;
use http::HeaderValue;
use once_cell::sync::Lazy;

struct CachedDate {
    second: u64,
    value: HeaderValue,
}

static CURRENT: Lazy<ArcSwap<CachedDate>> = Lazy::new(|| ArcSwap::from_pointee(format_now(now_second())));

fn now_second() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or_default()
}

fn format_now(second: u64) -> CachedDate {
    let mut buf = faf_http_date::get_date_buff_no_key();
    faf_http_date::get_date_no_key(&mut buf);
    let bytes = Bytes::from_owner(buf);
    // SAFETY: faf_http_date only writes visible ascii
    let value = unsafe { HeaderValue::from_maybe_shared_unchecked(bytes) };
    CachedDate { second, value }
}

/// The current date formatted per RFC 9110, e.g. `Sun, 06 Nov 1994 08:49:37 GMT`.
pub(crate) fn http_date() -> HeaderValue {
    let second = now_second();
    let cached = CURRENT.load();
    if cached.second == second {
        return cached.value.clone();
    }

    let fresh = Arc::new(format_now(second));
    let value = fresh.value.clone();
    CURRENT.store(fresh);
    value
}
