//! 持久化的短路径别名：人工挑选的短名映射到存储文件，
//! 以 JSON 文件形式在重启间保留。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::info;

use crate::config::RESERVED_CUSTOM_PATHS;
use crate::staged::StagedFile;
use crate::storage::{Storage, StorageError, normalize_relative};

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alias {
    pub custom_path: String,
    pub original_path: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug)]
pub enum AliasError {
    InvalidCustomPath(String),
    AlreadyExists,
    SourceNotFound,
    Storage(StorageError),
    Persist(io::Error),
}

/// 以 custom path 为键的别名表。唯一性检查、插入与持久化写入由同一把
/// 互斥锁保护，同名并发创建可线性化：恰有一个成功。
pub struct AliasStore {
    file: PathBuf,
    entries: Mutex<HashMap<String, Alias>>,
}

impl AliasStore {
    /// 从磁盘加载；文件不存在视为空表。
    pub async fn load(file: PathBuf) -> io::Result<Self> {
        let entries = match fs::read(&file).await {
            Ok(bytes) => {
                let aliases: Vec<Alias> = serde_json::from_slice(&bytes)
                    .map_err(|err| io::Error::new(ErrorKind::InvalidData, err))?;
                aliases
                    .into_iter()
                    .map(|alias| (alias.custom_path.clone(), alias))
                    .collect()
            }
            Err(err) if err.kind() == ErrorKind::NotFound => HashMap::new(),
            Err(err) => return Err(err),
        };
        Ok(Self {
            file,
            entries: Mutex::new(entries),
        })
    }

    /// 校验名称、保留路由与目标存在性后创建别名。映射在返回前持久化；
    /// 写入失败会回滚内存中的条目。
    pub async fn create(
        &self,
        storage: &Storage,
        custom_path: &str,
        original_path: &str,
    ) -> Result<Alias, AliasError> {
        validate_custom_path(custom_path)?;

        let normalized = normalize_relative(original_path).map_err(AliasError::Storage)?;
        if normalized.is_empty() {
            return Err(AliasError::SourceNotFound);
        }
        storage
            .resolve_path_checked(&normalized, false)
            .await
            .map_err(|err| match err {
                StorageError::Io(io_err) if io_err.kind() == ErrorKind::NotFound => {
                    AliasError::SourceNotFound
                }
                other => AliasError::Storage(other),
            })?;

        let alias = Alias {
            custom_path: custom_path.to_string(),
            original_path: normalized,
            created_at: Utc::now(),
        };

        let mut entries = self.entries.lock().await;
        if entries.contains_key(custom_path) {
            return Err(AliasError::AlreadyExists);
        }
        entries.insert(custom_path.to_string(), alias.clone());
        if let Err(err) = self.persist(&entries).await {
            entries.remove(custom_path);
            return Err(AliasError::Persist(err));
        }

        info!(
            custom_path,
            original_path = alias.original_path,
            "custom path created"
        );
        Ok(alias)
    }

    /// 纯读取；未命中不算错误，调用方回退为按字面路径处理。
    pub async fn lookup(&self, custom_path: &str) -> Option<Alias> {
        self.entries.lock().await.get(custom_path).cloned()
    }

    /// 幂等删除。返回是否真正删除了条目；持久化失败时回滚。
    pub async fn remove(&self, custom_path: &str) -> Result<bool, AliasError> {
        let mut entries = self.entries.lock().await;
        let Some(removed) = entries.remove(custom_path) else {
            return Ok(false);
        };
        if let Err(err) = self.persist(&entries).await {
            entries.insert(removed.custom_path.clone(), removed);
            return Err(AliasError::Persist(err));
        }
        Ok(true)
    }

    /// 级联删除：移除绑定到指定存储路径的所有别名。
    /// 持久化失败时回滚，内存与磁盘保持一致。
    pub async fn remove_for_target(&self, original_path: &str) -> Result<usize, AliasError> {
        let mut entries = self.entries.lock().await;
        let stale: Vec<String> = entries
            .iter()
            .filter(|(_, alias)| alias.original_path == original_path)
            .map(|(key, _)| key.clone())
            .collect();
        if stale.is_empty() {
            return Ok(0);
        }
        let mut removed = Vec::with_capacity(stale.len());
        for key in &stale {
            if let Some(alias) = entries.remove(key) {
                removed.push(alias);
            }
        }
        if let Err(err) = self.persist(&entries).await {
            for alias in removed {
                entries.insert(alias.custom_path.clone(), alias);
            }
            return Err(AliasError::Persist(err));
        }
        Ok(stale.len())
    }

    pub async fn all(&self) -> Vec<Alias> {
        let entries = self.entries.lock().await;
        let mut aliases: Vec<Alias> = entries.values().cloned().collect();
        aliases.sort_by(|a, b| a.custom_path.cmp(&b.custom_path));
        aliases
    }

    async fn persist(&self, entries: &HashMap<String, Alias>) -> io::Result<()> {
        let mut aliases: Vec<&Alias> = entries.values().collect();
        aliases.sort_by(|a, b| a.custom_path.cmp(&b.custom_path));
        let bytes = serde_json::to_vec_pretty(&aliases)?;

        if let Some(parent) = self.file.parent()
            && parent != Path::new("")
        {
            fs::create_dir_all(parent).await?;
        }
        let mut staged = StagedFile::create(&self.file).await?;
        if let Err(err) = staged.writer().write_all(&bytes).await {
            staged.discard().await;
            return Err(err);
        }
        staged.commit().await
    }
}

fn validate_custom_path(custom_path: &str) -> Result<(), AliasError> {
    if custom_path.is_empty() {
        return Err(AliasError::InvalidCustomPath(
            "custom path is required".into(),
        ));
    }
    if !custom_path
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(AliasError::InvalidCustomPath(
            "custom path may only contain letters, digits, '-' and '_'".into(),
        ));
    }
    if RESERVED_CUSTOM_PATHS.contains(&custom_path) {
        return Err(AliasError::InvalidCustomPath(
            "custom path collides with a reserved route".into(),
        ));
    }
    Ok(())
}
