//! `s3://bucket/prefix` path parsing

/// Split an S3 path into bucket and prefix.
///
/// `s3://` and bare `s3:` schemes are accepted, leading slashes after the
/// scheme are stripped, and `s3://` alone addresses the bucket-list root
/// (both parts empty).
pub fn parse_s3_path(path: &str) -> (String, String) {
    let mut rest = path;
    if let Some(stripped) = rest.strip_prefix("s3://") {
        rest = stripped;
    } else if let Some(stripped) = rest.strip_prefix("s3:") {
        rest = stripped;
    }
    let rest = rest.trim_start_matches('/');

    if rest.is_empty() {
        return (String::new(), String::new());
    }

    match rest.split_once('/') {
        Some((bucket, prefix)) => (bucket.to_string(), prefix.to_string()),
        None => (rest.to_string(), String::new()),
    }
}
