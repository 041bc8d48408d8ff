//! 流式文件内文本搜索。
//!
//! 文件按行读取，单行缓冲有字节上限，任意大的目标都不会整体载入内存；
//! 扫描在每次读取之间让出运行时，因此能及时响应调用方的超时或断开。
//! 空结果以单个 `lineNumber = -1` 的哨兵条目返回，而不是空数组，
//! 界面可以直接渲染其消息。

use axum::extract::{Extension, Query};
use axum::response::Json as JsonResponse;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::io::{self, ErrorKind};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::fs::File;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::time::timeout;
use tracing::info;

use crate::config::{
    MAX_RESULT_LINE_CHARS, MAX_SCANNED_LINE_BYTES, MAX_SEARCH_RESULTS, MAX_SEARCH_TERM_CHARS,
    SEARCH_TIMEOUT_SECS,
};
use crate::error::ApiError;
use crate::storage::{Storage, decode_path_param};

pub const NO_MATCHES_MESSAGE: &str = "No matches found.";

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchMatch {
    /// 从 1 开始的行号，-1 表示信息性哨兵条目。
    pub line_number: i64,
    pub content: String,
}

#[derive(Debug)]
pub enum SearchError {
    TermTooLong(usize),
    NotFound,
    NotAFile,
    Io(io::Error),
}

impl From<io::Error> for SearchError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            ErrorKind::NotFound => SearchError::NotFound,
            _ => SearchError::Io(err),
        }
    }
}

enum Matcher {
    Substring { term: String, case_sensitive: bool },
    WholeWord(Regex),
}

impl Matcher {
    fn build(term: &str, case_sensitive: bool, whole_word: bool) -> Result<Self, SearchError> {
        if whole_word {
            let pattern = format!(r"\b{}\b", regex::escape(term));
            let re = RegexBuilder::new(&pattern)
                .case_insensitive(!case_sensitive)
                .build()
                .map_err(|err| SearchError::Io(io::Error::other(err.to_string())))?;
            Ok(Matcher::WholeWord(re))
        } else {
            let term = if case_sensitive {
                term.to_string()
            } else {
                term.to_lowercase()
            };
            Ok(Matcher::Substring {
                term,
                case_sensitive,
            })
        }
    }

    fn matches(&self, line: &str) -> bool {
        match self {
            Matcher::Substring {
                term,
                case_sensitive,
            } => {
                if *case_sensitive {
                    line.contains(term.as_str())
                } else {
                    line.to_lowercase().contains(term.as_str())
                }
            }
            Matcher::WholeWord(re) => re.is_match(line),
        }
    }
}

/// 在 `path` 中按文件顺序扫描 `term` 的匹配。匹配行被截断为有限长度的
/// 片段，命中 [`MAX_SEARCH_RESULTS`] 条后停止扫描并追加说明哨兵。
pub async fn search_file(
    path: &Path,
    term: &str,
    case_sensitive: bool,
    whole_word: bool,
) -> Result<Vec<SearchMatch>, SearchError> {
    if term.chars().count() > MAX_SEARCH_TERM_CHARS {
        return Err(SearchError::TermTooLong(MAX_SEARCH_TERM_CHARS));
    }

    let metadata = tokio::fs::metadata(path).await?;
    if metadata.is_dir() {
        return Err(SearchError::NotAFile);
    }

    let matcher = Matcher::build(term, case_sensitive, whole_word)?;
    let file = File::open(path).await?;
    let mut reader = BufReader::new(file);
    let mut buf = Vec::new();
    let mut line_number: i64 = 0;
    let mut results = Vec::new();

    loop {
        if !read_line_capped(&mut reader, &mut buf).await? {
            break;
        }
        line_number += 1;
        if buf.last() == Some(&b'\r') {
            buf.pop();
        }
        // 按字节读取再 lossy 解码：存储的文件是任意字节，
        // 个别非法 UTF-8 序列不能中断搜索。
        let line = String::from_utf8_lossy(&buf);
        if matcher.matches(&line) {
            results.push(SearchMatch {
                line_number,
                content: clip_line(&line),
            });
            if results.len() >= MAX_SEARCH_RESULTS {
                results.push(SearchMatch {
                    line_number: -1,
                    content: format!(
                        "Search results limited to {MAX_SEARCH_RESULTS} matches."
                    ),
                });
                break;
            }
        }
    }

    if results.is_empty() {
        results.push(SearchMatch {
            line_number: -1,
            content: NO_MATCHES_MESSAGE.to_string(),
        });
    }

    Ok(results)
}

/// 读取一行（不含换行符）到 `buf`，最多保留 [`MAX_SCANNED_LINE_BYTES`]
/// 字节；超长行的剩余字节边读边丢，不在内存中累积。文件读完返回 `false`。
async fn read_line_capped<R>(reader: &mut R, buf: &mut Vec<u8>) -> io::Result<bool>
where
    R: AsyncBufRead + Unpin,
{
    buf.clear();
    let mut seen_any = false;
    loop {
        let chunk = reader.fill_buf().await?;
        if chunk.is_empty() {
            return Ok(seen_any);
        }
        seen_any = true;
        if let Some(pos) = chunk.iter().position(|&b| b == b'\n') {
            if buf.len() < MAX_SCANNED_LINE_BYTES {
                let take = pos.min(MAX_SCANNED_LINE_BYTES - buf.len());
                buf.extend_from_slice(&chunk[..take]);
            }
            reader.consume(pos + 1);
            return Ok(true);
        }
        let len = chunk.len();
        if buf.len() < MAX_SCANNED_LINE_BYTES {
            let take = len.min(MAX_SCANNED_LINE_BYTES - buf.len());
            buf.extend_from_slice(&chunk[..take]);
        }
        reader.consume(len);
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SearchQuery {
    path: String,
    term: String,
    #[serde(default)]
    case_sensitive: bool,
    #[serde(default)]
    whole_word: bool,
}

/// `GET /search-file` — 在单个文件内搜索，返回 JSON 匹配列表。
/// 整个扫描受 30 秒墙钟上限约束，超时返回 408。
pub async fn search_handler(
    Query(query): Query<SearchQuery>,
    Extension(storage): Extension<Arc<Storage>>,
) -> Result<JsonResponse<Vec<SearchMatch>>, ApiError> {
    if query.path.is_empty() || query.term.is_empty() {
        return Err(ApiError::BadRequest("missing required parameters".into()));
    }
    let decoded = decode_path_param(&query.path)?;
    let target = storage.resolve_path_checked(&decoded, false).await?;

    let matches = timeout(
        Duration::from_secs(SEARCH_TIMEOUT_SECS),
        search_file(&target, &query.term, query.case_sensitive, query.whole_word),
    )
    .await
    .map_err(|_| ApiError::Timeout("search timed out".into()))??;

    info!(
        path = decoded,
        term_len = query.term.len(),
        matches = matches.len(),
        "search complete"
    );
    Ok(JsonResponse(matches))
}

fn clip_line(line: &str) -> String {
    if line.chars().count() <= MAX_RESULT_LINE_CHARS {
        return line.to_string();
    }
    let clipped: String = line.chars().take(MAX_RESULT_LINE_CHARS).collect();
    format!("{clipped}...")
}

#[cfg(test)]
mod tests {
    use super::{NO_MATCHES_MESSAGE, SearchError, search_file};
    use crate::config::{
        MAX_RESULT_LINE_CHARS, MAX_SCANNED_LINE_BYTES, MAX_SEARCH_RESULTS, MAX_SEARCH_TERM_CHARS,
    };
    use std::path::PathBuf;
    use tempfile::tempdir;

    fn write_file(dir: &tempfile::TempDir, content: &str) -> PathBuf {
        let path = dir.path().join("target.txt");
        std::fs::write(&path, content).expect("write");
        path
    }

    fn line_numbers(matches: &[super::SearchMatch]) -> Vec<i64> {
        matches.iter().map(|m| m.line_number).collect()
    }

    #[tokio::test]
    async fn case_and_word_option_grid() {
        let temp = tempdir().expect("tempdir");
        let path = write_file(&temp, "foo\nFOO\nbarfoo\n");

        let matches = search_file(&path, "foo", true, false).await.expect("search");
        assert_eq!(line_numbers(&matches), vec![1, 3]);

        let matches = search_file(&path, "foo", false, false)
            .await
            .expect("search");
        assert_eq!(line_numbers(&matches), vec![1, 2, 3]);

        let matches = search_file(&path, "foo", true, true).await.expect("search");
        assert_eq!(line_numbers(&matches), vec![1]);
    }

    #[tokio::test]
    async fn whole_word_respects_boundaries() {
        let temp = tempdir().expect("tempdir");
        let path = write_file(&temp, "foo bar\n(foo)\nfoobar\nbar_foo\n");

        let matches = search_file(&path, "foo", true, true).await.expect("search");
        // 下划线算单词字符，`bar_foo` 不命中。
        assert_eq!(line_numbers(&matches), vec![1, 2]);
    }

    #[tokio::test]
    async fn empty_result_returns_single_sentinel() {
        let temp = tempdir().expect("tempdir");
        let path = write_file(&temp, "nothing here\n");

        let matches = search_file(&path, "absent", false, false)
            .await
            .expect("search");
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].line_number, -1);
        assert_eq!(matches[0].content, NO_MATCHES_MESSAGE);
    }

    #[tokio::test]
    async fn term_length_boundary() {
        let temp = tempdir().expect("tempdir");
        let path = write_file(&temp, "content\n");

        let exact = "x".repeat(MAX_SEARCH_TERM_CHARS);
        assert!(search_file(&path, &exact, false, false).await.is_ok());

        let over = "x".repeat(MAX_SEARCH_TERM_CHARS + 1);
        let result = search_file(&path, &over, false, false).await;
        assert!(matches!(result, Err(SearchError::TermTooLong(_))));
    }

    #[tokio::test]
    async fn long_lines_are_clipped() {
        let temp = tempdir().expect("tempdir");
        let long_line = format!("{}needle", "x".repeat(MAX_RESULT_LINE_CHARS));
        let path = write_file(&temp, &long_line);

        let matches = search_file(&path, "needle", true, false)
            .await
            .expect("search");
        assert_eq!(matches[0].content.chars().count(), MAX_RESULT_LINE_CHARS + 3);
        assert!(matches[0].content.ends_with("..."));
    }

    #[tokio::test]
    async fn result_cap_appends_limit_sentinel() {
        let temp = tempdir().expect("tempdir");
        let body = "hit\n".repeat(MAX_SEARCH_RESULTS + 50);
        let path = write_file(&temp, &body);

        let matches = search_file(&path, "hit", true, false).await.expect("search");
        assert_eq!(matches.len(), MAX_SEARCH_RESULTS + 1);
        assert_eq!(matches.last().expect("sentinel").line_number, -1);
    }

    #[tokio::test]
    async fn newline_free_blob_matches_within_the_line_cap() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("blob.bin");
        let mut body = vec![b'x'; 3 * 1024 * 1024];
        body[1000..1006].copy_from_slice(b"needle");
        std::fs::write(&path, &body).expect("write");

        let matches = search_file(&path, "needle", true, false).await.expect("search");
        assert_eq!(line_numbers(&matches), vec![1]);
        assert_eq!(matches[0].content.chars().count(), MAX_RESULT_LINE_CHARS + 3);
    }

    #[tokio::test]
    async fn overlong_line_tail_is_dropped_without_breaking_numbering() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("long.txt");
        let mut body = vec![b'x'; MAX_SCANNED_LINE_BYTES + 4096];
        body.extend_from_slice(b"beyond\n");
        body.extend_from_slice(b"needle\n");
        std::fs::write(&path, &body).expect("write");

        // 超出单行字节上限的尾部不参与匹配。
        let matches = search_file(&path, "beyond", true, false).await.expect("search");
        assert_eq!(matches[0].line_number, -1);
        assert_eq!(matches[0].content, NO_MATCHES_MESSAGE);

        let matches = search_file(&path, "needle", true, false).await.expect("search");
        assert_eq!(line_numbers(&matches), vec![2]);
    }

    #[tokio::test]
    async fn missing_and_directory_targets_error() {
        let temp = tempdir().expect("tempdir");

        let result = search_file(&temp.path().join("absent"), "x", false, false).await;
        assert!(matches!(result, Err(SearchError::NotFound)));

        let result = search_file(temp.path(), "x", false, false).await;
        assert!(matches!(result, Err(SearchError::NotAFile)));
    }

    #[tokio::test]
    async fn tolerates_invalid_utf8_lines() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("binary.bin");
        std::fs::write(&path, b"plain match\n\xff\xfe\x00garbage\nmatch again\n")
            .expect("write");

        let matches = search_file(&path, "match", true, false).await.expect("search");
        assert_eq!(line_numbers(&matches), vec![1, 3]);
    }
}
