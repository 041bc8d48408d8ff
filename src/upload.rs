//! 文件上传接收器：multipart 流式写入与原子提交。

use axum::body::Bytes;
use axum::extract::{Extension, Multipart, Query};
use axum::http::StatusCode;
use axum::response::Json as JsonResponse;
use futures_util::{Stream, StreamExt};
use httpdate::fmt_http_date;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::info;

use crate::config::ServerMode;
use crate::error::ApiError;
use crate::staged::StagedFile;
use crate::storage::{Storage, decode_path_param};

#[derive(Debug)]
pub struct UploadConfig {
    pub max_size: u64,
}

#[derive(Deserialize)]
pub(crate) struct UploadQuery {
    /// base64 编码的当前浏览目录，空表示存储根。
    path: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredFileDescriptor {
    pub path: String,
    pub size: u64,
    pub modified: Option<String>,
}

/// 处理 `POST /` 的 multipart 上传：`file` 字段流式写入目标目录。
pub async fn upload_file(
    Query(query): Query<UploadQuery>,
    Extension(mode): Extension<Arc<ServerMode>>,
    Extension(storage): Extension<Arc<Storage>>,
    Extension(config): Extension<Arc<UploadConfig>>,
    mut multipart: Multipart,
) -> Result<(StatusCode, JsonResponse<StoredFileDescriptor>), ApiError> {
    if mode.read_only {
        return Err(ApiError::Forbidden("server is in read-only mode".into()));
    }
    let dir_context = decode_path_param(query.path.as_deref().unwrap_or(""))?;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| ApiError::BadRequest(err.to_string()))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field
            .file_name()
            .map(sanitize_filename)
            .filter(|name| !name.is_empty())
            .ok_or_else(|| ApiError::BadRequest("file name is required".into()))?;
        let relative = if dir_context.is_empty() {
            filename
        } else {
            format!("{dir_context}/{filename}")
        };

        let descriptor = receive(&storage, &relative, config.max_size, field).await?;
        info!(path = descriptor.path, size = descriptor.size, "upload complete");
        return Ok((StatusCode::OK, JsonResponse(descriptor)));
    }

    Err(ApiError::BadRequest("multipart field 'file' is required".into()))
}

/// 将字节流写入暂存文件并原子提交；任何失败都不会留下可见的半成品。
/// 并发写同名文件时以最后一次完成的重命名为准。
pub async fn receive<S, E>(
    storage: &Storage,
    relative: &str,
    max_size: u64,
    stream: S,
) -> Result<StoredFileDescriptor, ApiError>
where
    S: Stream<Item = Result<Bytes, E>>,
    E: std::fmt::Display,
{
    let target = storage.resolve_path_checked(relative, true).await?;
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)
            .await
            .map_err(|err| ApiError::Internal(err.to_string()))?;
    }

    let mut staged = StagedFile::create(&target)
        .await
        .map_err(|err| ApiError::Internal(err.to_string()))?;
    let mut stream = std::pin::pin!(stream);
    let mut total: u64 = 0;
    let write_result: Result<(), ApiError> = async {
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|err| ApiError::Internal(err.to_string()))?;
            if chunk.is_empty() {
                continue;
            }
            total += chunk.len() as u64;
            if max_size > 0 && total > max_size {
                return Err(ApiError::BadRequest("upload size exceeds limit".into()));
            }
            staged
                .writer()
                .write_all(&chunk)
                .await
                .map_err(|err| ApiError::Internal(err.to_string()))?;
        }
        Ok(())
    }
    .await;
    if let Err(err) = write_result {
        staged.discard().await;
        return Err(err);
    }
    staged
        .commit()
        .await
        .map_err(|err| ApiError::Internal(err.to_string()))?;

    let metadata = fs::metadata(&target)
        .await
        .map_err(|err| ApiError::Internal(err.to_string()))?;
    Ok(StoredFileDescriptor {
        path: relative.trim_start_matches('/').to_string(),
        size: metadata.len(),
        modified: metadata.modified().ok().map(fmt_http_date),
    })
}

/// 只保留文件名的最后一段，防止通过 filename 注入目录。
fn sanitize_filename(name: &str) -> String {
    Path::new(name.trim())
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::{receive, sanitize_filename};
    use crate::error::ApiError;
    use crate::storage::Storage;
    use axum::body::Bytes;
    use futures_util::stream;
    use std::io;
    use tempfile::tempdir;

    fn make_storage() -> (tempfile::TempDir, Storage) {
        let temp = tempdir().expect("tempdir");
        let root = temp.path().join("storage");
        std::fs::create_dir_all(&root).expect("create root");
        (temp, Storage::new(root))
    }

    fn ok_chunks(chunks: &[&'static [u8]]) -> Vec<Result<Bytes, io::Error>> {
        chunks.iter().map(|c| Ok(Bytes::from_static(c))).collect()
    }

    #[tokio::test]
    async fn streams_chunks_into_final_file() {
        let (_temp, storage) = make_storage();
        let body = stream::iter(ok_chunks(&[b"hello ", b"", b"world"]));

        let descriptor = receive(&storage, "sub/greeting.txt", 0, body)
            .await
            .expect("receive");
        assert_eq!(descriptor.path, "sub/greeting.txt");
        assert_eq!(descriptor.size, 11);

        let contents =
            std::fs::read(storage.root_path().join("sub/greeting.txt")).expect("read");
        assert_eq!(contents, b"hello world");
    }

    #[tokio::test]
    async fn interrupted_stream_leaves_nothing_visible() {
        let (_temp, storage) = make_storage();
        let body = stream::iter(vec![
            Ok(Bytes::from_static(b"partial")),
            Err(io::Error::other("connection reset")),
        ]);

        let result = receive(&storage, "file.bin", 0, body).await;
        assert!(matches!(result, Err(ApiError::Internal(_))));
        assert!(!storage.root_path().join("file.bin").exists());
        let leftovers = std::fs::read_dir(storage.root_path())
            .expect("read dir")
            .count();
        assert_eq!(leftovers, 0, "no staged temp file may remain");
    }

    #[tokio::test]
    async fn oversize_upload_is_rejected_cleanly() {
        let (_temp, storage) = make_storage();
        let body = stream::iter(ok_chunks(&[b"0123456789", b"overflow"]));

        let result = receive(&storage, "big.bin", 10, body).await;
        assert!(matches!(result, Err(ApiError::BadRequest(_))));
        assert!(!storage.root_path().join("big.bin").exists());
    }

    #[tokio::test]
    async fn traversal_target_is_rejected_before_any_write() {
        let (_temp, storage) = make_storage();
        let body = stream::iter(ok_chunks(&[b"data"]));

        let result = receive(&storage, "../escape.txt", 0, body).await;
        assert!(matches!(result, Err(ApiError::BadRequest(_))));
    }

    #[tokio::test]
    async fn same_name_uploads_last_writer_wins() {
        let (_temp, storage) = make_storage();
        receive(&storage, "contested.txt", 0, stream::iter(ok_chunks(&[b"first"])))
            .await
            .expect("first upload");
        receive(&storage, "contested.txt", 0, stream::iter(ok_chunks(&[b"second"])))
            .await
            .expect("second upload");

        let contents = std::fs::read(storage.root_path().join("contested.txt")).expect("read");
        assert_eq!(contents, b"second");
    }

    #[test]
    fn filenames_are_stripped_to_their_last_segment() {
        assert_eq!(sanitize_filename("report.pdf"), "report.pdf");
        assert_eq!(sanitize_filename("dir/report.pdf"), "report.pdf");
        assert_eq!(sanitize_filename("../../evil.sh"), "evil.sh");
        assert_eq!(sanitize_filename("  spaced.txt "), "spaced.txt");
    }
}
