//! 临时写入与原子替换：读者永远看不到半成品文件。

use std::io;
use std::path::{Path, PathBuf};
use tokio::fs::{self, File};
use uuid::Uuid;

/// 判断目录项是否为本模块产生的临时文件名。
pub fn is_staged_temp_name(name: &str) -> bool {
    name.starts_with('.') && name.contains(".tmp.")
}

/// 暂存文件：写入同目录的临时名，提交时原子重命名到目标路径。
pub struct StagedFile {
    target: PathBuf,
    temp_path: PathBuf,
    file: File,
}

impl StagedFile {
    /// 在目标路径同目录创建临时文件。
    pub async fn create(target: &Path) -> io::Result<Self> {
        let parent = target
            .parent()
            .ok_or_else(|| io::Error::other("target path has no parent"))?;
        let base = target
            .file_name()
            .map(|name| name.to_string_lossy())
            .unwrap_or_else(|| "file".into());
        let temp_name = format!(".{base}.tmp.{}", Uuid::new_v4());
        let temp_path = parent.join(temp_name);
        let file = File::create(&temp_path).await?;
        Ok(Self {
            target: target.to_path_buf(),
            temp_path,
            file,
        })
    }

    /// 临时文件的可写句柄。
    pub fn writer(&mut self) -> &mut File {
        &mut self.file
    }

    /// 放弃写入并清理临时文件。
    pub async fn discard(self) {
        drop(self.file);
        let _ = fs::remove_file(&self.temp_path).await;
    }

    /// 同步落盘并原子替换目标文件。
    pub async fn commit(self) -> io::Result<()> {
        self.file.sync_all().await?;
        drop(self.file);

        if let Err(err) = fs::rename(&self.temp_path, &self.target).await {
            let _ = fs::remove_file(&self.temp_path).await;
            return Err(err);
        }

        if let Some(parent) = self.target.parent() {
            let _ = sync_dir(parent).await;
        }

        Ok(())
    }
}

async fn sync_dir(path: &Path) -> io::Result<()> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || {
        let dir = std::fs::File::open(path)?;
        dir.sync_all()
    })
    .await
    .map_err(|err| io::Error::other(err.to_string()))?
}
