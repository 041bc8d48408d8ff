use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::cmp::Ordering;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::time::{Duration, UNIX_EPOCH};
use tokio::fs;
use tokio::io::ErrorKind;

use crate::config::{MAX_PATH_CHARS, MAX_PATH_SEGMENTS};
use crate::staged::is_staged_temp_name;

/// 沙箱化的存储根目录。所有用户提供的路径都先在这里规范化、
/// 校验，然后才派生出任何文件系统访问。
#[derive(Clone, Debug)]
pub struct Storage {
    root: PathBuf,
}

impl Storage {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub async fn ensure_root(&self) -> io::Result<()> {
        fs::create_dir_all(&self.root).await
    }

    pub fn root_path(&self) -> &Path {
        &self.root
    }

    /// 将用户提供的相对路径解析到根目录下，并逐级校验磁盘上没有符号
    /// 链接组件，保证结果是根目录的真实后代而非字符串前缀的伪装。
    pub async fn resolve_path_checked(
        &self,
        relative: &str,
        allow_missing_leaf: bool,
    ) -> Result<PathBuf, StorageError> {
        let normalized = normalize_relative(relative)?;
        let target = self.root.join(&normalized);
        self.ensure_no_symlink_components(&target, allow_missing_leaf)
            .await?;
        Ok(target)
    }

    pub async fn resolve_root_checked(&self) -> Result<PathBuf, StorageError> {
        self.ensure_no_symlink_components(&self.root.clone(), false)
            .await?;
        Ok(self.root.clone())
    }

    async fn ensure_no_symlink_components(
        &self,
        target: &Path,
        allow_missing_leaf: bool,
    ) -> Result<(), StorageError> {
        let relative = target
            .strip_prefix(&self.root)
            .map_err(|_| StorageError::InvalidPath)?;
        let mut current = PathBuf::from(&self.root);
        let mut components = relative.components().peekable();

        while let Some(component) = components.next() {
            current.push(component.as_os_str());
            match fs::symlink_metadata(&current).await {
                Ok(metadata) => {
                    if metadata.file_type().is_symlink() {
                        return Err(StorageError::InvalidPath);
                    }
                    if components.peek().is_some() && !metadata.is_dir() {
                        return Err(StorageError::InvalidPath);
                    }
                }
                Err(err) if err.kind() == ErrorKind::NotFound && allow_missing_leaf => {
                    return Ok(());
                }
                Err(err) => return Err(StorageError::Io(err)),
            }
        }

        Ok(())
    }

    pub async fn list_dir(
        &self,
        relative: Option<&str>,
        show_hidden: bool,
    ) -> Result<Vec<FileEntry>, StorageError> {
        let target = match relative {
            Some(path) if !path.is_empty() => self.resolve_path_checked(path, false).await?,
            _ => self.resolve_root_checked().await?,
        };
        let mut dir = fs::read_dir(&target).await?;
        let mut entries = Vec::new();

        while let Some(entry) = dir.next_entry().await? {
            let metadata = entry.metadata().await?;
            let path = entry.path();
            let name = entry.file_name().to_string_lossy().to_string();
            if is_staged_temp_name(&name) {
                continue;
            }
            if name.starts_with('.') && !show_hidden {
                continue;
            }
            let relative_path = path
                .strip_prefix(&self.root)
                .map_err(|_| StorageError::InvalidPath)?
                .to_string_lossy()
                .replace(std::path::MAIN_SEPARATOR, "/");
            let modified = metadata
                .modified()
                .ok()
                .and_then(|ts| ts.duration_since(UNIX_EPOCH).ok())
                .map(format_timestamp);

            entries.push(FileEntry {
                name,
                path: relative_path,
                is_dir: metadata.is_dir(),
                size: metadata.len(),
                modified,
                custom_path: None,
            });
        }

        entries.sort_by(|a, b| match (a.is_dir, b.is_dir) {
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
            _ => a.name.to_lowercase().cmp(&b.name.to_lowercase()),
        });

        Ok(entries)
    }

    /// 删除单个文件。目录一律拒绝，列表界面也只允许删除文件。
    pub async fn delete_file(&self, relative: &str) -> Result<String, StorageError> {
        let normalized = normalize_relative(relative)?;
        let target = self.resolve_path_checked(relative, false).await?;
        let metadata = fs::metadata(&target).await?;
        if metadata.is_dir() {
            return Err(StorageError::NotAFile);
        }
        fs::remove_file(target).await?;
        Ok(normalized)
    }
}

/// 清洗用户提供的相对路径：去掉前导分隔符与 `.` 段，拒绝 `..` 与绝对
/// 路径组件，限制长度与段数，禁止 NUL 字节。返回值统一使用 `/`。
pub fn normalize_relative(value: &str) -> Result<String, StorageError> {
    if value.contains('\0') || value.chars().count() > MAX_PATH_CHARS {
        return Err(StorageError::InvalidPath);
    }

    let trimmed = value.trim_start_matches(['/', '\\']);
    let mut segments: Vec<&str> = Vec::new();
    for component in Path::new(trimmed).components() {
        match component {
            Component::Normal(segment) => {
                let segment = segment.to_str().ok_or(StorageError::InvalidPath)?;
                segments.push(segment);
            }
            Component::CurDir => continue,
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(StorageError::InvalidPath);
            }
        }
    }
    if segments.len() > MAX_PATH_SEGMENTS {
        return Err(StorageError::InvalidPath);
    }

    Ok(segments.join("/"))
}

/// 将 base64 路径参数解码为 UTF-8。这里只负责解码，
/// 调用方仍需把结果交给 [`Storage::resolve_path_checked`] 校验。
pub fn decode_path_param(value: &str) -> Result<String, StorageError> {
    if value.is_empty() {
        return Ok(String::new());
    }
    let bytes = BASE64
        .decode(value.trim())
        .map_err(|_| StorageError::InvalidPath)?;
    String::from_utf8(bytes).map_err(|_| StorageError::InvalidPath)
}

fn format_timestamp(duration: Duration) -> String {
    let timestamp = UNIX_EPOCH + duration;
    let datetime: DateTime<Utc> = timestamp.into();
    datetime.format("%Y-%m-%d %H:%M:%S").to_string()
}

#[derive(Debug)]
pub enum StorageError {
    InvalidPath,
    NotAFile,
    Io(io::Error),
}

impl From<io::Error> for StorageError {
    fn from(err: io::Error) -> Self {
        StorageError::Io(err)
    }
}

#[derive(Serialize)]
pub struct FileEntry {
    pub name: String,
    pub path: String,
    pub is_dir: bool,
    pub size: u64,
    pub modified: Option<String>,
    #[serde(rename = "customPath", skip_serializing_if = "Option::is_none")]
    pub custom_path: Option<String>,
}
