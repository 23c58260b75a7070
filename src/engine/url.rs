//! Request target construction
//!
//! Two addressing conventions: virtual-host style against AWS proper
//! (`bucket.s3.region.amazonaws.com`) and path-style when the profile
//! configures an `endpoint_url` (MinIO and friends). Endpoint URLs keep
//! their scheme; bare `host:port` endpoints default to HTTPS.

use crate::auth::signer::rfc3986_encode;

/// Where a request goes: scheme, host (with optional port) and path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestTarget {
    pub scheme: String,
    pub host: String,
    pub path: String,
}

/// Split an endpoint URL into scheme and `host[:port]`, dropping any path.
pub fn parse_endpoint(endpoint_url: &str) -> (String, String) {
    let (scheme, rest) = if let Some(rest) = endpoint_url.strip_prefix("https://") {
        ("https", rest)
    } else if let Some(rest) = endpoint_url.strip_prefix("http://") {
        ("http", rest)
    } else {
        ("https", endpoint_url)
    };

    let mut host = rest.trim_end_matches('/');
    if let Some(slash) = host.find('/') {
        host = &host[..slash];
    }
    (scheme.to_string(), host.to_string())
}

/// Target for a bucket-scoped request, optionally addressing a key.
pub fn bucket_target(
    endpoint_url: Option<&str>,
    bucket: &str,
    key: Option<&str>,
    region: &str,
) -> RequestTarget {
    match endpoint_url.filter(|e| !e.is_empty()) {
        Some(endpoint) => {
            let (scheme, host) = parse_endpoint(endpoint);
            let path = match key {
                Some(key) => format!("/{}/{}", bucket, key),
                None => format!("/{}", bucket),
            };
            RequestTarget { scheme, host, path }
        }
        None => RequestTarget {
            scheme: "https".to_string(),
            host: format!("{}.s3.{}.amazonaws.com", bucket, region),
            path: match key {
                Some(key) => format!("/{}", key),
                None => "/".to_string(),
            },
        },
    }
}

/// Target for ListBuckets, which has no bucket in the host.
pub fn service_target(endpoint_url: Option<&str>, region: &str) -> RequestTarget {
    match endpoint_url.filter(|e| !e.is_empty()) {
        Some(endpoint) => {
            let (scheme, host) = parse_endpoint(endpoint);
            RequestTarget {
                scheme,
                host,
                path: "/".to_string(),
            }
        }
        None => RequestTarget {
            scheme: "https".to_string(),
            host: format!("s3.{}.amazonaws.com", region),
            path: "/".to_string(),
        },
    }
}

/// Query string for ListObjectsV2 with `/` delimiting.
pub fn list_objects_query(prefix: &str, continuation_token: &str) -> String {
    let mut query = format!("list-type=2&delimiter={}&max-keys=1000", rfc3986_encode("/"));
    if !prefix.is_empty() {
        query.push_str("&prefix=");
        query.push_str(&rfc3986_encode(prefix));
    }
    if !continuation_token.is_empty() {
        query.push_str("&continuation-token=");
        query.push_str(&rfc3986_encode(continuation_token));
    }
    query
}
