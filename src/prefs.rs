//! 隐藏文件可见性开关，由列表接口读取。

use axum::extract::Extension;
use axum::response::Json as JsonResponse;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::info;

use crate::error::ApiError;

/// 进程级可见性开关。初始为关（过滤隐藏文件），仅存于内存。
/// `--disable-hidden-files` 将其永久锁定为关。
pub struct FlagStore {
    show_hidden: AtomicBool,
    locked: bool,
}

impl FlagStore {
    pub fn new(locked: bool) -> Self {
        Self {
            show_hidden: AtomicBool::new(false),
            locked,
        }
    }

    pub fn get(&self) -> bool {
        !self.locked && self.show_hidden.load(Ordering::SeqCst)
    }

    /// 翻转开关并返回新值；锁定时返回 `None`。
    pub fn toggle(&self) -> Option<bool> {
        if self.locked {
            return None;
        }
        Some(!self.show_hidden.fetch_xor(true, Ordering::SeqCst))
    }
}

/// 返回当前隐藏文件可见性设置。
pub async fn get_hidden_files(
    Extension(flags): Extension<Arc<FlagStore>>,
) -> JsonResponse<bool> {
    JsonResponse(flags.get())
}

/// 切换隐藏文件可见性设置。
pub async fn toggle_hidden_files(
    Extension(flags): Extension<Arc<FlagStore>>,
) -> Result<JsonResponse<bool>, ApiError> {
    match flags.toggle() {
        Some(value) => {
            info!(show_hidden = value, "hidden files toggled");
            Ok(JsonResponse(value))
        }
        None => Err(ApiError::Forbidden(
            "hidden file visibility is locked by server configuration".into(),
        )),
    }
}
