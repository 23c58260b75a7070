//! Bucket region discovery from `PermanentRedirect` responses
//!
//! S3 answers a wrong-region request with a redirect error whose body names
//! the correct endpoint. The region is parsed out of that endpoint; failing
//! that, the bucket name is scanned for a known region substring; failing
//! that, `us-east-1` is assumed.

use tracing::warn;

/// Regions matched inside bucket names when endpoint parsing fails.
const KNOWN_REGIONS: &[&str] = &[
    "us-east-1",
    "us-east-2",
    "us-west-1",
    "us-west-2",
    "eu-west-1",
    "eu-west-2",
    "eu-west-3",
    "eu-central-1",
    "eu-north-1",
    "ap-southeast-1",
    "ap-southeast-2",
    "ap-northeast-1",
    "ap-northeast-2",
    "ap-south-1",
    "ca-central-1",
    "sa-east-1",
];

/// Extract a region from an S3 endpoint host.
///
/// Understands `bucket.s3.region.amazonaws.com`,
/// `s3.region.amazonaws.com` and the legacy `s3-region` spelling. The
/// global endpoint (`s3.amazonaws.com`, no region segment) yields `None`,
/// as does any candidate without a dash.
pub fn region_from_endpoint(endpoint: &str) -> Option<String> {
    let rest = endpoint
        .find("s3.")
        .map(|pos| &endpoint[pos + 3..])
        .or_else(|| endpoint.find("s3-").map(|pos| &endpoint[pos + 3..]))?;

    let end = rest.find('.')?;
    let candidate = &rest[..end];
    if candidate.is_empty() || !candidate.contains('-') {
        return None;
    }
    Some(candidate.to_string())
}

/// Scan a bucket name for a known region substring
/// (buckets like `logs-eu-west-2-prod`).
pub fn region_from_bucket_name(bucket: &str) -> Option<String> {
    let lower = bucket.to_ascii_lowercase();
    KNOWN_REGIONS
        .iter()
        .find(|region| lower.contains(*region))
        .map(|region| region.to_string())
}

/// Resolve the region to retry with after a `PermanentRedirect`.
pub fn discover_redirect_region(endpoint: &str, bucket: &str) -> String {
    if !endpoint.is_empty() {
        if let Some(region) = region_from_endpoint(endpoint) {
            return region;
        }
    }
    if let Some(region) = region_from_bucket_name(bucket) {
        return region;
    }
    warn!(
        endpoint,
        bucket, "could not determine redirect region, assuming us-east-1"
    );
    "us-east-1".to_string()
}
