//! 统一的 API 错误类型与转换。

use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use std::io::ErrorKind;
use tracing::error;

use crate::alias::AliasError;
use crate::search::SearchError;
use crate::storage::StorageError;

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    Forbidden(String),
    Conflict(String),
    Internal(String),
    Timeout(String),
    Unauthorized(HeaderMap),
    TooManyRequests(u64),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg).into_response(),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg).into_response(),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg).into_response(),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg).into_response(),
            ApiError::Internal(msg) => {
                error!(error = %msg, "internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, msg).into_response()
            }
            ApiError::Timeout(msg) => (StatusCode::REQUEST_TIMEOUT, msg).into_response(),
            ApiError::Unauthorized(headers) => {
                (StatusCode::UNAUTHORIZED, headers, "unauthorized").into_response()
            }
            ApiError::TooManyRequests(retry_after) => {
                let mut headers = HeaderMap::new();
                if retry_after > 0
                    && let Ok(value) = HeaderValue::from_str(&retry_after.to_string())
                {
                    headers.insert(header::RETRY_AFTER, value);
                }
                (StatusCode::TOO_MANY_REQUESTS, headers, "too many requests").into_response()
            }
        }
    }
}

impl From<std::io::Error> for ApiError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            ErrorKind::NotFound => ApiError::NotFound("file not found".into()),
            _ => ApiError::Internal(err.to_string()),
        }
    }
}

impl From<StorageError> for ApiError {
    fn from(error: StorageError) -> Self {
        match error {
            StorageError::InvalidPath => ApiError::BadRequest("invalid path".into()),
            StorageError::NotAFile => ApiError::BadRequest("path is not a file".into()),
            StorageError::Io(err) => match err.kind() {
                ErrorKind::NotFound => ApiError::NotFound(err.to_string()),
                _ => ApiError::Internal(err.to_string()),
            },
        }
    }
}

impl From<AliasError> for ApiError {
    fn from(error: AliasError) -> Self {
        match error {
            AliasError::InvalidCustomPath(msg) => ApiError::BadRequest(msg),
            AliasError::AlreadyExists => {
                ApiError::Conflict("custom path already exists".into())
            }
            AliasError::SourceNotFound => {
                ApiError::NotFound("original path does not exist".into())
            }
            AliasError::Storage(err) => ApiError::from(err),
            AliasError::Persist(err) => ApiError::Internal(err.to_string()),
        }
    }
}

impl From<SearchError> for ApiError {
    fn from(error: SearchError) -> Self {
        match error {
            SearchError::TermTooLong(limit) => {
                ApiError::BadRequest(format!("search term exceeds {limit} characters"))
            }
            SearchError::NotFound => ApiError::NotFound("file not found".into()),
            SearchError::NotAFile => ApiError::BadRequest("path is not a file".into()),
            SearchError::Io(err) => ApiError::Internal(err.to_string()),
        }
    }
}
