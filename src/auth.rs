//! 可选的 HTTP Basic 认证中间件。

use axum::body::Body as AxumBody;
use axum::extract::Extension;
use axum::http::{HeaderMap, HeaderValue, Request, header};
use axum::{middleware, response::Response};
use axum_extra::TypedHeader;
use axum_extra::headers::{Authorization, authorization::Basic};
use std::sync::Arc;

use crate::error::ApiError;

/// 全站认证配置：user/pass 同时设置时启用，否则完全开放（原始行为）。
#[derive(Debug)]
pub struct AuthConfig {
    credentials: Option<(String, String)>,
}

impl AuthConfig {
    pub fn new(
        user: Option<String>,
        pass: Option<String>,
    ) -> Result<Self, &'static str> {
        match (user, pass) {
            (Some(user), Some(pass)) => Ok(Self {
                credentials: Some((user, pass)),
            }),
            (None, None) => Ok(Self { credentials: None }),
            _ => Err("auth user and pass must be set together"),
        }
    }

    pub fn enabled(&self) -> bool {
        self.credentials.is_some()
    }
}

/// 认证中间件：凭据未配置时直接放行。
pub async fn auth_middleware(
    Extension(auth): Extension<Arc<AuthConfig>>,
    auth_header: Option<TypedHeader<Authorization<Basic>>>,
    req: Request<AxumBody>,
    next: middleware::Next,
) -> Result<Response, ApiError> {
    let Some((user, pass)) = &auth.credentials else {
        return Ok(next.run(req).await);
    };

    if let Some(TypedHeader(credentials)) = auth_header
        && credentials.username() == user
        && credentials.password() == pass
    {
        return Ok(next.run(req).await);
    }

    let mut headers = HeaderMap::new();
    headers.insert(
        header::WWW_AUTHENTICATE,
        HeaderValue::from_static(r#"Basic realm="updrop""#),
    );
    Err(ApiError::Unauthorized(headers))
}
