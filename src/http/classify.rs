//! URL classification and endpoint extraction.
//!
//! Decides which outgoing requests fall under rate limiting and derives the
//! endpoint key a URL counts against. Keys come from path shape only, never
//! host or query string, so equivalent calls share one quota bucket.

use url::Url;

/// Path markers identifying backend API traffic.
const API_PATH_MARKERS: [&str; 3] = ["/rest/v1", "/auth/v1", "/storage/v1"];

/// Whether `url` addresses a rate-limited API surface.
///
/// Malformed URLs classify as false and bypass the limiter.
pub fn is_api_request(url: &str) -> bool {
    match Url::parse(url) {
        Ok(parsed) => {
            let path = parsed.path();
            API_PATH_MARKERS.iter().any(|marker| path.contains(marker))
        }
        Err(_) => false,
    }
}

/// Derive the endpoint key for `url`.
///
/// Drops the gateway prefix (`rest`) and version segments (`v1`, `v2`, ...)
/// from the path and rejoins the rest, so `/rest/v1/test_codes` keys as
/// `test_codes` and `/auth/v1/login` as `auth/login`. Falls back to `/` on
/// parse failure or an empty result.
pub fn extract_endpoint(url: &str) -> String {
    let Ok(parsed) = Url::parse(url) else {
        return "/".to_string();
    };

    let segments: Vec<&str> = parsed
        .path()
        .split('/')
        .filter(|segment| !segment.is_empty() && *segment != "rest" && !is_version_segment(segment))
        .collect();

    if segments.is_empty() {
        "/".to_string()
    } else {
        segments.join("/")
    }
}

fn is_version_segment(segment: &str) -> bool {
    let mut chars = segment.chars();
    chars.next() == Some('v')
        && segment.len() > 1
        && chars.all(|c| c.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_markers_match() {
        assert!(is_api_request("https://api.example.com/rest/v1/test_codes"));
        assert!(is_api_request("https://api.example.com/auth/v1/login"));
        assert!(is_api_request(
            "https://api.example.com/storage/v1/object/reports/r.pdf"
        ));
    }

    #[test]
    fn test_non_api_urls_bypass() {
        assert!(!is_api_request("https://example.com/index.html"));
        assert!(!is_api_request("https://example.com/api/v2/other"));
    }

    #[test]
    fn test_malformed_url_classifies_false() {
        assert!(!is_api_request("not a url"));
        assert!(!is_api_request("/rest/v1/test_codes"));
    }

    #[test]
    fn test_extract_strips_gateway_and_version() {
        assert_eq!(
            extract_endpoint("https://api.example.com/rest/v1/test_codes"),
            "test_codes"
        );
        assert_eq!(
            extract_endpoint("https://api.example.com/auth/v1/login"),
            "auth/login"
        );
        assert_eq!(
            extract_endpoint("https://api.example.com/auth/v1/mfa/verify"),
            "auth/mfa/verify"
        );
    }

    #[test]
    fn test_extract_ignores_query_and_host() {
        let a = extract_endpoint("https://one.example.com/rest/v1/test_results?select=*&id=eq.7");
        let b = extract_endpoint("https://two.example.com/rest/v1/test_results");
        assert_eq!(a, "test_results");
        assert_eq!(a, b);
    }

    #[test]
    fn test_extract_defaults_to_root() {
        assert_eq!(extract_endpoint("not a url"), "/");
        assert_eq!(extract_endpoint("https://example.com/"), "/");
        assert_eq!(extract_endpoint("https://example.com/rest/v1/"), "/");
    }

    #[test]
    fn test_version_segment_detection() {
        assert!(is_version_segment("v1"));
        assert!(is_version_segment("v12"));
        assert!(!is_version_segment("v"));
        assert!(!is_version_segment("verify"));
        assert!(!is_version_segment("login"));
    }
}
