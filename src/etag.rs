//! 基于文件元数据的弱 ETag 与条件 GET 校验。

use axum::http::{HeaderMap, header};
use std::fs::Metadata;
use std::time::UNIX_EPOCH;

/// 根据文件元数据生成弱 ETag。
pub fn etag_from_metadata(metadata: &Metadata) -> String {
    let size = metadata.len();
    let modified = metadata.modified().ok();
    if let Some(modified) = modified
        && let Ok(duration) = modified.duration_since(UNIX_EPOCH)
    {
        return format!(
            "W/\"{}-{}-{}\"",
            size,
            duration.as_secs(),
            duration.subsec_nanos()
        );
    }
    format!("W/\"{}\"", size)
}

/// If-None-Match 命中时返回 true，调用方应回 304。
pub fn not_modified(headers: &HeaderMap, current_etag: &str) -> bool {
    let Some(value) = headers
        .get(header::IF_NONE_MATCH)
        .and_then(|v| v.to_str().ok())
    else {
        return false;
    };
    value
        .split(',')
        .map(|item| item.trim())
        .any(|item| item == "*" || item == current_etag)
}

#[cfg(test)]
mod tests {
    use super::not_modified;
    use axum::http::{HeaderMap, HeaderValue, header};

    #[test]
    fn if_none_match_hits_on_listed_or_wildcard_etag() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::IF_NONE_MATCH,
            HeaderValue::from_static("W/\"1-2-3\", W/\"4-5-6\""),
        );
        assert!(not_modified(&headers, "W/\"4-5-6\""));
        assert!(!not_modified(&headers, "W/\"7-8-9\""));

        let mut headers = HeaderMap::new();
        headers.insert(header::IF_NONE_MATCH, HeaderValue::from_static("*"));
        assert!(not_modified(&headers, "W/\"anything\""));

        assert!(!not_modified(&HeaderMap::new(), "W/\"1-2-3\""));
    }
}
