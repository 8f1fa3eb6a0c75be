use crate::models::submission::SubmitRequest;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tokio::fs;

/// 已处理文件追加的后缀
const PROCESSED_SUFFIX: &str = "done";

/// 从 TOML 文件加载提交请求
pub async fn load_submission_request(toml_file_path: &Path) -> Result<SubmitRequest> {
    let content = fs::read_to_string(toml_file_path)
        .await
        .with_context(|| format!("无法读取TOML文件: {}", toml_file_path.display()))?;

    let request: SubmitRequest = toml::from_str(&content)
        .with_context(|| format!("无法解析TOML文件: {}", toml_file_path.display()))?;

    Ok(request)
}

/// 从收件箱文件夹中加载所有待处理的提交请求
///
/// 返回 (文件路径, 提交请求) 列表，按文件名排序。解析失败的文件只记录警告并跳过。
pub async fn load_all_submission_requests(folder_path: &str) -> Result<Vec<(PathBuf, SubmitRequest)>> {
    let folder = PathBuf::from(folder_path);

    if !folder.exists() {
        anyhow::bail!("文件夹不存在: {}", folder_path);
    }

    let mut paths = Vec::new();
    let mut entries = fs::read_dir(&folder)
        .await
        .with_context(|| format!("无法读取文件夹: {}", folder_path))?;

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().and_then(|s| s.to_str()) == Some("toml") {
            paths.push(path);
        }
    }
    paths.sort();

    let mut requests = Vec::new();
    for path in paths {
        tracing::info!(
            "正在加载: {}",
            path.file_name().unwrap_or_default().to_string_lossy()
        );

        match load_submission_request(&path).await {
            Ok(request) => requests.push((path, request)),
            Err(e) => {
                tracing::warn!("加载文件失败 {}: {:#}", path.display(), e);
            }
        }
    }

    Ok(requests)
}

/// 将已处理的文件重命名为 `*.toml.done`，避免下次启动重复提交
pub async fn mark_processed(path: &Path) -> Result<PathBuf> {
    let mut target = path.as_os_str().to_owned();
    target.push(".");
    target.push(PROCESSED_SUFFIX);
    let target = PathBuf::from(target);

    fs::rename(path, &target)
        .await
        .with_context(|| format!("无法重命名文件: {}", path.display()))?;

    Ok(target)
}
