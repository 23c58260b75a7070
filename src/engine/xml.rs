//! Tag-search parsing of the three S3 response shapes
//!
//! The documents consumed here (`ListAllMyBucketsResult`, `ListBucketResult`,
//! `Error`) are small, flat, and never nest same-named tags, so values are
//! located by plain string search instead of a full XML reader.

use crate::events::{Bucket, Object};

/// One page of a ListObjectsV2 response.
#[derive(Debug, Default)]
pub struct ListObjectsPage {
    pub objects: Vec<Object>,
    pub next_continuation_token: String,
    pub is_truncated: bool,
}

/// Extract the text between `<tag>` and `</tag>`, if present.
pub fn extract_tag<'a>(xml: &'a str, tag: &str) -> Option<&'a str> {
    let open = format!("<{}>", tag);
    let close = format!("</{}>", tag);
    let start = xml.find(&open)? + open.len();
    let end = xml[start..].find(&close)? + start;
    Some(&xml[start..end])
}

/// Iterate the inner text of every `<tag>…</tag>` block.
fn blocks<'a>(xml: &'a str, tag: &str) -> Vec<&'a str> {
    let open = format!("<{}>", tag);
    let close = format!("</{}>", tag);
    let mut out = Vec::new();
    let mut pos = 0;
    while let Some(start) = xml[pos..].find(&open) {
        let inner_start = pos + start + open.len();
        let Some(end) = xml[inner_start..].find(&close) else {
            break;
        };
        out.push(&xml[inner_start..inner_start + end]);
        pos = inner_start + end + close.len();
    }
    out
}

/// An `<Error>` body rendered as the `"Code: Message"` string the UI shows.
pub fn extract_error(xml: &str) -> Option<String> {
    let code = extract_tag(xml, "Code")?;
    if code.is_empty() {
        return None;
    }
    let message = extract_tag(xml, "Message").unwrap_or("");
    Some(format!("{}: {}", code, message))
}

/// Parse a `ListAllMyBucketsResult` document.
pub fn parse_list_buckets(xml: &str) -> Vec<Bucket> {
    blocks(xml, "Bucket")
        .into_iter()
        .filter_map(|block| {
            let name = extract_tag(block, "Name")?;
            if name.is_empty() {
                return None;
            }
            Some(Bucket {
                name: name.to_string(),
                creation_date: extract_tag(block, "CreationDate").unwrap_or("").to_string(),
            })
        })
        .collect()
}

/// Parse a `ListBucketResult` (v2) document into folders and files.
///
/// Folders come from `CommonPrefixes`; keys ending in `/` (zero-byte folder
/// markers) are skipped.
pub fn parse_list_objects(xml: &str) -> ListObjectsPage {
    let mut page = ListObjectsPage {
        is_truncated: extract_tag(xml, "IsTruncated") == Some("true"),
        next_continuation_token: extract_tag(xml, "NextContinuationToken")
            .unwrap_or("")
            .to_string(),
        ..Default::default()
    };

    for block in blocks(xml, "CommonPrefixes") {
        if let Some(prefix) = extract_tag(block, "Prefix") {
            if !prefix.is_empty() {
                page.objects.push(Object::folder(prefix));
            }
        }
    }

    for block in blocks(xml, "Contents") {
        let Some(key) = extract_tag(block, "Key") else {
            continue;
        };
        if key.is_empty() || key.ends_with('/') {
            continue;
        }
        let size = extract_tag(block, "Size")
            .and_then(|s| s.parse::<i64>().ok())
            .unwrap_or(0);
        let last_modified = extract_tag(block, "LastModified").unwrap_or("").to_string();
        page.objects.push(Object::file(key, size, last_modified));
    }

    page
}

#[cfg(test)]
mod tests {
    use super::*;

    const BUCKETS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<ListAllMyBucketsResult>
  <Owner><ID>abc</ID></Owner>
  <Buckets>
    <Bucket><Name>alpha</Name><CreationDate>2023-01-15T10:00:00.000Z</CreationDate></Bucket>
    <Bucket><Name>beta</Name><CreationDate>2024-06-01T08:30:00.000Z</CreationDate></Bucket>
  </Buckets>
</ListAllMyBucketsResult>"#;

    const OBJECTS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<ListBucketResult>
  <Name>alpha</Name>
  <Prefix>data/</Prefix>
  <IsTruncated>true</IsTruncated>
  <NextContinuationToken>token-123</NextContinuationToken>
  <Contents>
    <Key>data/file1.txt</Key>
    <LastModified>2024-01-01T00:00:00.000Z</LastModified>
    <Size>1024</Size>
  </Contents>
  <Contents>
    <Key>data/folder-marker/</Key>
    <Size>0</Size>
  </Contents>
  <Contents>
    <Key>data/file2.log</Key>
    <Size>2048</Size>
  </Contents>
  <CommonPrefixes><Prefix>data/sub1/</Prefix></CommonPrefixes>
  <CommonPrefixes><Prefix>data/sub2/</Prefix></CommonPrefixes>
</ListBucketResult>"#;

    const ERROR: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<Error>
  <Code>PermanentRedirect</Code>
  <Message>The bucket is in this region: eu-west-1.</Message>
  <Endpoint>alpha.s3.eu-west-1.amazonaws.com</Endpoint>
</Error>"#;

    #[test]
    fn extracts_tags() {
        assert_eq!(extract_tag(ERROR, "Code"), Some("PermanentRedirect"));
        assert_eq!(
            extract_tag(ERROR, "Endpoint"),
            Some("alpha.s3.eu-west-1.amazonaws.com")
        );
        assert_eq!(extract_tag(ERROR, "Missing"), None);
    }

    #[test]
    fn error_renders_code_and_message() {
        assert_eq!(
            extract_error(ERROR).as_deref(),
            Some("PermanentRedirect: The bucket is in this region: eu-west-1.")
        );
        assert_eq!(extract_error(BUCKETS), None);
    }

    #[test]
    fn parses_bucket_list() {
        let buckets = parse_list_buckets(BUCKETS);
        assert_eq!(buckets.len(), 2);
        assert_eq!(buckets[0].name, "alpha");
        assert_eq!(buckets[0].creation_date, "2023-01-15T10:00:00.000Z");
        assert_eq!(buckets[1].name, "beta");
    }

    #[test]
    fn parses_objects_folders_first() {
        let page = parse_list_objects(OBJECTS);
        assert!(page.is_truncated);
        assert_eq!(page.next_continuation_token, "token-123");

        let names: Vec<&str> = page.objects.iter().map(|o| o.key.as_str()).collect();
        assert_eq!(
            names,
            vec!["data/sub1/", "data/sub2/", "data/file1.txt", "data/file2.log"]
        );
        assert!(page.objects[0].is_folder);
        assert_eq!(page.objects[0].display_name, "sub1");
        assert_eq!(page.objects[2].size, 1024);
        assert_eq!(page.objects[2].display_name, "file1.txt");
    }

    #[test]
    fn folder_markers_are_skipped() {
        let page = parse_list_objects(OBJECTS);
        assert!(!page.objects.iter().any(|o| o.key == "data/folder-marker/"));
    }

    #[test]
    fn untruncated_page_has_no_token() {
        let page = parse_list_objects("<ListBucketResult><IsTruncated>false</IsTruncated></ListBucketResult>");
        assert!(!page.is_truncated);
        assert!(page.next_continuation_token.is_empty());
        assert!(page.objects.is_empty());
    }
}
