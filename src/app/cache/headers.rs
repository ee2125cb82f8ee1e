//! Cache freshness from HTTP response headers

use chrono::{DateTime, Duration as ChronoDuration, Utc};

use crate::app::network::NetworkResponse;
use crate::constants::cache::MAX_FRESHNESS_SECS;

use super::entry::{CacheEntry, CacheTtl};

/// Parse an HTTP date (`Tue, 15 Nov 1994 08:12:31 GMT`)
pub fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(value.trim())
        .ok()
        .map(|date| date.with_timezone(&Utc))
}

#[derive(Debug, Default)]
struct CacheControl {
    present: bool,
    forbidden: bool,
    max_age: i64,
    stale_while_revalidate: i64,
    must_revalidate: bool,
}

fn parse_cache_control(value: Option<&str>) -> CacheControl {
    let mut control = CacheControl::default();
    let Some(value) = value else {
        return control;
    };
    control.present = true;

    for token in value.split(',').map(|t| t.trim().to_ascii_lowercase()) {
        if token == "no-cache" || token == "no-store" {
            control.forbidden = true;
        } else if let Some(seconds) = token.strip_prefix("max-age=") {
            control.max_age = seconds.trim().parse().unwrap_or(0);
        } else if let Some(seconds) = token.strip_prefix("stale-while-revalidate=") {
            control.stale_while_revalidate = seconds.trim().parse().unwrap_or(0);
        } else if token == "must-revalidate" || token == "proxy-revalidate" {
            control.must_revalidate = true;
        }
    }
    control
}

/// `now + delta`, with `delta` clamped to `[0, MAX_FRESHNESS_SECS]`
fn expiry_after(now: DateTime<Utc>, delta: ChronoDuration) -> DateTime<Utc> {
    let delta = delta.clamp(
        ChronoDuration::zero(),
        ChronoDuration::seconds(MAX_FRESHNESS_SECS),
    );
    now.checked_add_signed(delta).unwrap_or(now)
}

fn expiry_after_secs(now: DateTime<Utc>, seconds: i64) -> DateTime<Utc> {
    expiry_after(
        now,
        ChronoDuration::seconds(seconds.clamp(0, MAX_FRESHNESS_SECS)),
    )
}

fn expiry_after_std(now: DateTime<Utc>, duration: std::time::Duration) -> DateTime<Utc> {
    let delta = ChronoDuration::from_std(duration)
        .unwrap_or_else(|_| ChronoDuration::seconds(MAX_FRESHNESS_SECS));
    expiry_after(now, delta)
}

/// Derive a cache entry from the response's caching headers
///
/// Returns `None` when the response forbids caching (`no-cache`, `no-store`)
/// or carries no freshness information at all.
///
/// * `Cache-Control: max-age` sets the soft expiry; `stale-while-revalidate`
///   extends the hard expiry beyond it unless `must-revalidate` or
///   `proxy-revalidate` is present.
/// * Without `Cache-Control`, `Expires - Date` gives both expiries.
///
/// Lifetimes longer than `MAX_FRESHNESS_SECS` are capped.
pub fn parse_cache_headers(response: &NetworkResponse, now: DateTime<Utc>) -> Option<CacheEntry> {
    let control = parse_cache_control(response.header("cache-control"));
    if control.forbidden {
        return None;
    }

    let (soft, hard) = if control.present {
        let max_age = control.max_age.max(0);
        let soft = expiry_after_secs(now, max_age);
        let hard = if control.must_revalidate {
            soft
        } else {
            expiry_after_secs(
                now,
                max_age.saturating_add(control.stale_while_revalidate.max(0)),
            )
        };
        (soft, hard)
    } else {
        let date = response.header("date").and_then(parse_http_date)?;
        let expires = response.header("expires").and_then(parse_http_date)?;
        if expires < date {
            return None;
        }
        let soft = expiry_after(now, expires.signed_duration_since(date));
        (soft, soft)
    };

    Some(CacheEntry::from_response(response, soft, hard))
}

/// Build an entry honouring an explicit TTL instead of the response headers
pub fn entry_with_ttl(response: &NetworkResponse, ttl: CacheTtl, now: DateTime<Utc>) -> CacheEntry {
    let soft = expiry_after_std(now, ttl.soft);
    let hard = expiry_after_std(now, ttl.hard);
    CacheEntry::from_response(response, soft, hard)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::network::Headers;
    use std::time::Duration;

    fn response(headers: &[(&str, &str)]) -> NetworkResponse {
        let headers: Headers = headers.iter().map(|(k, v)| (*k, v.to_string())).collect();
        NetworkResponse::new(200, b"body".to_vec(), headers, "UTF-8")
    }

    #[test]
    fn test_max_age_with_stale_while_revalidate() {
        let now = Utc::now();
        let entry = parse_cache_headers(
            &response(&[
                ("Cache-Control", "public, max-age=60, stale-while-revalidate=30"),
                ("ETag", "\"abc\""),
            ]),
            now,
        )
        .unwrap();

        assert_eq!(entry.soft_expires, now + ChronoDuration::seconds(60));
        assert_eq!(entry.expires, now + ChronoDuration::seconds(90));
        assert_eq!(entry.etag.as_deref(), Some("\"abc\""));
    }

    #[test]
    fn test_must_revalidate_pins_hard_expiry() {
        let now = Utc::now();
        let entry = parse_cache_headers(
            &response(&[(
                "cache-control",
                "max-age=10, stale-while-revalidate=100, must-revalidate",
            )]),
            now,
        )
        .unwrap();
        assert_eq!(entry.expires, entry.soft_expires);
    }

    #[test]
    fn test_no_store_is_not_cached() {
        let now = Utc::now();
        assert!(parse_cache_headers(&response(&[("Cache-Control", "no-store")]), now).is_none());
        assert!(
            parse_cache_headers(&response(&[("Cache-Control", "max-age=5, no-cache")]), now)
                .is_none()
        );
    }

    #[test]
    fn test_expires_relative_to_date() {
        let now = Utc::now();
        let entry = parse_cache_headers(
            &response(&[
                ("Date", "Tue, 15 Nov 1994 08:12:31 GMT"),
                ("Expires", "Tue, 15 Nov 1994 08:22:31 GMT"),
                ("Last-Modified", "Mon, 14 Nov 1994 08:00:00 GMT"),
            ]),
            now,
        )
        .unwrap();

        assert_eq!(entry.soft_expires, now + ChronoDuration::seconds(600));
        assert_eq!(entry.expires, entry.soft_expires);
        assert_eq!(
            entry.last_modified.as_deref(),
            Some("Mon, 14 Nov 1994 08:00:00 GMT")
        );
        assert!(entry.server_date.is_some());
    }

    #[test]
    fn test_no_freshness_information() {
        assert!(parse_cache_headers(&response(&[("ETag", "\"x\"")]), Utc::now()).is_none());
    }

    #[test]
    fn test_explicit_ttl() {
        let now = Utc::now();
        let entry = entry_with_ttl(
            &response(&[("Cache-Control", "no-store")]),
            CacheTtl::new(Duration::from_secs(5), Duration::from_secs(50)),
            now,
        );
        assert_eq!(entry.soft_expires, now + ChronoDuration::seconds(5));
        assert_eq!(entry.expires, now + ChronoDuration::seconds(50));
    }

    #[test]
    fn test_huge_max_age_is_capped() {
        let now = Utc::now();
        let ceiling = now + ChronoDuration::seconds(MAX_FRESHNESS_SECS);

        let entry = parse_cache_headers(
            &response(&[(
                "Cache-Control",
                "max-age=99999999999999, stale-while-revalidate=99999999999999",
            )]),
            now,
        )
        .unwrap();
        assert_eq!(entry.soft_expires, ceiling);
        assert_eq!(entry.expires, ceiling);
        assert!(!entry.refresh_needed(now));
    }

    #[test]
    fn test_huge_explicit_ttl_is_capped() {
        let now = Utc::now();
        let entry = entry_with_ttl(
            &response(&[]),
            CacheTtl::new(Duration::MAX, Duration::from_secs(u64::MAX / 2)),
            now,
        );
        let ceiling = now + ChronoDuration::seconds(MAX_FRESHNESS_SECS);
        assert_eq!(entry.soft_expires, ceiling);
        assert_eq!(entry.expires, ceiling);
    }
}
