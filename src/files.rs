//! 文件下载、删除、列表与短路径（custom path）处理器。

use axum::body::Body as AxumBody;
use axum::extract::{Extension, Form, Path as AxumPath, Query};
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Json as JsonResponse, Response};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::fs::{self, File};
use tokio_util::io::ReaderStream;
use tracing::{debug, info};

use crate::alias::{Alias, AliasStore};
use crate::config::ServerMode;
use crate::error::ApiError;
use crate::etag::{etag_from_metadata, not_modified};
use crate::prefs::FlagStore;
use crate::storage::{FileEntry, Storage, decode_path_param};

#[derive(Deserialize)]
pub(crate) struct RequiredPathQuery {
    path: String,
}

#[derive(Deserialize)]
pub(crate) struct OptionalPathQuery {
    path: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CustomPathForm {
    original_path: String,
    custom_path: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CustomPathQuery {
    custom_path: String,
}

/// `GET /raw/{*path}`：先按短路径别名解析，未命中再按字面路径处理。
/// 别名命中时以附件方式下发（原始行为）。
pub async fn raw_file(
    AxumPath(path): AxumPath<String>,
    headers: HeaderMap,
    Extension(storage): Extension<Arc<Storage>>,
    Extension(aliases): Extension<Arc<AliasStore>>,
) -> Result<Response, ApiError> {
    if let Some(alias) = aliases.lookup(path.trim_matches('/')).await {
        debug!(
            custom_path = alias.custom_path,
            original_path = alias.original_path,
            "alias hit"
        );
        return serve_file(&storage, &alias.original_path, &headers, true).await;
    }
    serve_file(&storage, &path, &headers, false).await
}

/// `GET /download?path=<b64>`：附件下载。
pub async fn download_file(
    Query(RequiredPathQuery { path }): Query<RequiredPathQuery>,
    headers: HeaderMap,
    Extension(storage): Extension<Arc<Storage>>,
) -> Result<Response, ApiError> {
    let decoded = decode_path_param(&path)?;
    serve_file(&storage, &decoded, &headers, true).await
}

/// `DELETE /delete?path=<b64>`：删除文件并级联移除其别名。
pub async fn delete_entry(
    Query(RequiredPathQuery { path }): Query<RequiredPathQuery>,
    Extension(mode): Extension<Arc<ServerMode>>,
    Extension(storage): Extension<Arc<Storage>>,
    Extension(aliases): Extension<Arc<AliasStore>>,
) -> Result<StatusCode, ApiError> {
    if mode.read_only {
        return Err(ApiError::Forbidden("server is in read-only mode".into()));
    }
    let decoded = decode_path_param(&path)?;
    if decoded.is_empty() {
        return Err(ApiError::BadRequest("path is required".into()));
    }
    let normalized = storage.delete_file(&decoded).await?;
    let removed_aliases = aliases.remove_for_target(&normalized).await?;
    info!(path = normalized, removed_aliases, "file deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /list?path=<b64>`：目录内容 JSON，含隐藏文件过滤与别名标注。
pub async fn list_files(
    Query(OptionalPathQuery { path }): Query<OptionalPathQuery>,
    Extension(storage): Extension<Arc<Storage>>,
    Extension(aliases): Extension<Arc<AliasStore>>,
    Extension(flags): Extension<Arc<FlagStore>>,
) -> Result<JsonResponse<Vec<FileEntry>>, ApiError> {
    let decoded = match path.as_deref() {
        Some(value) => Some(decode_path_param(value)?),
        None => None,
    };
    let mut entries = storage
        .list_dir(decoded.as_deref(), flags.get())
        .await?;

    let by_target: HashMap<String, String> = aliases
        .all()
        .await
        .into_iter()
        .map(|alias| (alias.original_path, alias.custom_path))
        .collect();
    for entry in &mut entries {
        if !entry.is_dir {
            entry.custom_path = by_target.get(&entry.path).cloned();
        }
    }

    info!(
        path = decoded.as_deref().unwrap_or(""),
        count = entries.len(),
        "list files"
    );
    Ok(JsonResponse(entries))
}

/// `POST /custom-path`：创建短路径别名，表单字段 originalPath（b64）与 customPath。
pub async fn create_custom_path(
    Extension(mode): Extension<Arc<ServerMode>>,
    Extension(storage): Extension<Arc<Storage>>,
    Extension(aliases): Extension<Arc<AliasStore>>,
    Form(form): Form<CustomPathForm>,
) -> Result<Response, ApiError> {
    if mode.read_only {
        return Err(ApiError::Forbidden("server is in read-only mode".into()));
    }
    let decoded = decode_path_param(&form.original_path)?;
    let alias = aliases.create(&storage, &form.custom_path, &decoded).await?;
    Ok((
        StatusCode::OK,
        format!(
            "Custom path '/raw/{}' now serves '{}'",
            alias.custom_path, alias.original_path
        ),
    )
        .into_response())
}

/// `GET /custom-path`：列出全部别名。
pub async fn list_custom_paths(
    Extension(aliases): Extension<Arc<AliasStore>>,
) -> JsonResponse<Vec<Alias>> {
    JsonResponse(aliases.all().await)
}

/// `DELETE /custom-path?customPath=`：幂等删除别名。
pub async fn delete_custom_path(
    Query(CustomPathQuery { custom_path }): Query<CustomPathQuery>,
    Extension(mode): Extension<Arc<ServerMode>>,
    Extension(aliases): Extension<Arc<AliasStore>>,
) -> Result<StatusCode, ApiError> {
    if mode.read_only {
        return Err(ApiError::Forbidden("server is in read-only mode".into()));
    }
    let removed = aliases.remove(&custom_path).await?;
    info!(custom_path, removed, "custom path delete");
    Ok(StatusCode::NO_CONTENT)
}

/// 以流式响应下发单个文件，带 ETag/Last-Modified 与 304 协商。
async fn serve_file(
    storage: &Storage,
    relative: &str,
    request_headers: &HeaderMap,
    attachment: bool,
) -> Result<Response, ApiError> {
    let target = storage.resolve_path_checked(relative, false).await?;
    let metadata = fs::metadata(&target).await?;
    if metadata.is_dir() {
        return Err(ApiError::NotFound("file not found".into()));
    }

    let etag = etag_from_metadata(&metadata);
    let mut response_headers = HeaderMap::new();
    response_headers.insert(
        header::ETAG,
        HeaderValue::from_str(&etag).map_err(|_| ApiError::Internal("bad etag header".into()))?,
    );
    if not_modified(request_headers, &etag) {
        return Ok((StatusCode::NOT_MODIFIED, response_headers).into_response());
    }

    let mime = mime_guess::from_path(&target).first_or_octet_stream();
    response_headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(mime.essence_str())
            .map_err(|_| ApiError::Internal("bad content type".into()))?,
    );
    response_headers.insert(
        header::CONTENT_LENGTH,
        HeaderValue::from_str(&metadata.len().to_string())
            .map_err(|_| ApiError::Internal("bad content length".into()))?,
    );
    if let Ok(modified) = metadata.modified() {
        let value = httpdate::fmt_http_date(modified);
        response_headers.insert(
            header::LAST_MODIFIED,
            HeaderValue::from_str(&value)
                .map_err(|_| ApiError::Internal("bad last-modified header".into()))?,
        );
    }
    if attachment {
        let filename = target
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| "file".into());
        response_headers.insert(
            header::CONTENT_DISPOSITION,
            HeaderValue::from_str(&format!("attachment; filename=\"{filename}\""))
                .map_err(|_| ApiError::Internal("bad disposition header".into()))?,
        );
    }

    let file = File::open(&target)
        .await
        .map_err(|err| ApiError::Internal(err.to_string()))?;
    info!(path = relative, size = metadata.len(), "serve file");
    let stream = ReaderStream::new(file);
    Ok((
        StatusCode::OK,
        response_headers,
        AxumBody::from_stream(stream),
    )
        .into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderMap;
    use base64::Engine as _;
    use base64::engine::general_purpose::STANDARD as BASE64;
    use tempfile::tempdir;

    async fn make_state() -> (tempfile::TempDir, Arc<Storage>, Arc<AliasStore>) {
        let temp = tempdir().expect("tempdir");
        let root = temp.path().join("storage");
        std::fs::create_dir_all(&root).expect("create root");
        let storage = Arc::new(Storage::new(root));
        let aliases = Arc::new(
            AliasStore::load(temp.path().join("aliases.json"))
                .await
                .expect("load aliases"),
        );
        (temp, storage, aliases)
    }

    fn writable() -> Arc<ServerMode> {
        Arc::new(ServerMode { read_only: false })
    }

    #[tokio::test]
    async fn raw_rejects_traversal_path() {
        let (_temp, storage, aliases) = make_state().await;
        let result = raw_file(
            AxumPath("../secret.txt".to_string()),
            HeaderMap::new(),
            Extension(storage),
            Extension(aliases),
        )
        .await;
        assert!(matches!(result, Err(ApiError::BadRequest(_))));
    }

    #[tokio::test]
    async fn raw_serves_alias_as_attachment() {
        let (_temp, storage, aliases) = make_state().await;
        std::fs::write(storage.root_path().join("notes.txt"), b"alias me").expect("write");
        aliases
            .create(&storage, "notes", "notes.txt")
            .await
            .expect("create alias");

        let response = raw_file(
            AxumPath("notes".to_string()),
            HeaderMap::new(),
            Extension(storage),
            Extension(aliases),
        )
        .await
        .expect("raw");

        assert_eq!(response.status(), StatusCode::OK);
        let disposition = response
            .headers()
            .get(header::CONTENT_DISPOSITION)
            .expect("disposition")
            .to_str()
            .expect("ascii");
        assert!(disposition.contains("notes.txt"));
    }

    #[tokio::test]
    async fn raw_stale_alias_returns_not_found() {
        let (_temp, storage, aliases) = make_state().await;
        std::fs::write(storage.root_path().join("gone.txt"), b"x").expect("write");
        aliases
            .create(&storage, "gone", "gone.txt")
            .await
            .expect("create alias");
        std::fs::remove_file(storage.root_path().join("gone.txt")).expect("remove");

        let result = raw_file(
            AxumPath("gone".to_string()),
            HeaderMap::new(),
            Extension(storage),
            Extension(aliases),
        )
        .await;
        assert!(matches!(result, Err(ApiError::NotFound(_))));
    }

    #[tokio::test]
    async fn raw_honors_if_none_match() {
        let (_temp, storage, aliases) = make_state().await;
        std::fs::write(storage.root_path().join("cached.txt"), b"body").expect("write");

        let first = raw_file(
            AxumPath("cached.txt".to_string()),
            HeaderMap::new(),
            Extension(storage.clone()),
            Extension(aliases.clone()),
        )
        .await
        .expect("raw");
        let etag = first
            .headers()
            .get(header::ETAG)
            .expect("etag")
            .clone();

        let mut headers = HeaderMap::new();
        headers.insert(header::IF_NONE_MATCH, etag);
        let second = raw_file(
            AxumPath("cached.txt".to_string()),
            headers,
            Extension(storage),
            Extension(aliases),
        )
        .await
        .expect("raw");
        assert_eq!(second.status(), StatusCode::NOT_MODIFIED);
    }

    #[tokio::test]
    async fn delete_cascades_alias_removal() {
        let (_temp, storage, aliases) = make_state().await;
        std::fs::write(storage.root_path().join("doomed.txt"), b"x").expect("write");
        aliases
            .create(&storage, "doomed", "doomed.txt")
            .await
            .expect("create alias");

        let status = delete_entry(
            Query(RequiredPathQuery {
                path: BASE64.encode("doomed.txt"),
            }),
            Extension(writable()),
            Extension(storage),
            Extension(aliases.clone()),
        )
        .await
        .expect("delete");

        assert_eq!(status, StatusCode::NO_CONTENT);
        assert!(aliases.lookup("doomed").await.is_none());
    }

    #[tokio::test]
    async fn list_annotates_aliased_entries() {
        let (_temp, storage, aliases) = make_state().await;
        std::fs::write(storage.root_path().join("plain.txt"), b"a").expect("write");
        std::fs::write(storage.root_path().join("starred.txt"), b"b").expect("write");
        aliases
            .create(&storage, "star", "starred.txt")
            .await
            .expect("create alias");
        let flags = Arc::new(FlagStore::new(false));

        let JsonResponse(entries) = list_files(
            Query(OptionalPathQuery { path: None }),
            Extension(storage),
            Extension(aliases),
            Extension(flags),
        )
        .await
        .expect("list");

        let starred = entries
            .iter()
            .find(|e| e.name == "starred.txt")
            .expect("starred entry");
        assert_eq!(starred.custom_path.as_deref(), Some("star"));
        let plain = entries.iter().find(|e| e.name == "plain.txt").expect("plain");
        assert!(plain.custom_path.is_none());
    }

    #[tokio::test]
    async fn create_custom_path_handler_roundtrip() {
        let (_temp, storage, aliases) = make_state().await;
        std::fs::write(storage.root_path().join("form.txt"), b"x").expect("write");

        let response = create_custom_path(
            Extension(writable()),
            Extension(storage),
            Extension(aliases.clone()),
            Form(CustomPathForm {
                original_path: BASE64.encode("form.txt"),
                custom_path: "shortform".to_string(),
            }),
        )
        .await
        .expect("create");
        assert_eq!(response.status(), StatusCode::OK);

        let alias = aliases.lookup("shortform").await.expect("lookup");
        assert_eq!(alias.original_path, "form.txt");
    }

    #[tokio::test]
    async fn read_only_mode_rejects_mutations() {
        let (_temp, storage, aliases) = make_state().await;
        std::fs::write(storage.root_path().join("kept.txt"), b"x").expect("write");
        let mode = Arc::new(ServerMode { read_only: true });

        let result = delete_entry(
            Query(RequiredPathQuery {
                path: BASE64.encode("kept.txt"),
            }),
            Extension(mode.clone()),
            Extension(storage.clone()),
            Extension(aliases.clone()),
        )
        .await;
        assert!(matches!(result, Err(ApiError::Forbidden(_))));
        assert!(storage.root_path().join("kept.txt").exists());

        let result = create_custom_path(
            Extension(mode.clone()),
            Extension(storage.clone()),
            Extension(aliases.clone()),
            Form(CustomPathForm {
                original_path: BASE64.encode("kept.txt"),
                custom_path: "kept".to_string(),
            }),
        )
        .await;
        assert!(matches!(result, Err(ApiError::Forbidden(_))));
        assert!(aliases.lookup("kept").await.is_none());

        let result = delete_custom_path(
            Query(CustomPathQuery {
                custom_path: "kept".to_string(),
            }),
            Extension(mode),
            Extension(aliases),
        )
        .await;
        assert!(matches!(result, Err(ApiError::Forbidden(_))));
    }
}
