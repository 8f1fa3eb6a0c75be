//! 基于 JSON 文件的持久化存储
//!
//! 每个文档一个文件：
//!
//! ```text
//! <root>/submissions/<id>.json
//! <root>/feedback/<id>.json
//! ```
//!
//! 写入先落到临时文件再 rename，保证单个文档的写入是原子的。

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::fs;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::StoreError;
use crate::infrastructure::durable_store::{DurableStore, StoreResult};
use crate::models::{Feedback, Submission};

const SUBMISSIONS_DIR: &str = "submissions";
const FEEDBACK_DIR: &str = "feedback";

/// JSON 文件文档存储
pub struct JsonFileStore {
    root: PathBuf,
}

impl JsonFileStore {
    /// 打开（必要时创建）存储目录
    pub async fn open(root: impl Into<PathBuf>) -> StoreResult<Self> {
        let root = root.into();
        for dir in [SUBMISSIONS_DIR, FEEDBACK_DIR] {
            let path = root.join(dir);
            fs::create_dir_all(&path)
                .await
                .map_err(|e| StoreError::io(path.display().to_string(), e))?;
        }
        debug!("持久化存储目录: {}", root.display());
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn document_path(&self, collection: &str, id: Uuid) -> PathBuf {
        self.root.join(collection).join(format!("{}.json", id))
    }

    async fn write_document<T: Serialize>(&self, collection: &str, id: Uuid, doc: &T) -> StoreResult<()> {
        let path = self.document_path(collection, id);
        let tmp = path.with_extension("json.tmp");
        let bytes = serde_json::to_vec_pretty(doc)?;

        fs::write(&tmp, bytes)
            .await
            .map_err(|e| StoreError::io(tmp.display().to_string(), e))?;
        fs::rename(&tmp, &path)
            .await
            .map_err(|e| StoreError::io(path.display().to_string(), e))?;
        Ok(())
    }

    async fn read_document<T: DeserializeOwned>(&self, collection: &str, id: Uuid) -> StoreResult<Option<T>> {
        let path = self.document_path(collection, id);
        match fs::read(&path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::io(path.display().to_string(), e)),
        }
    }

    async fn delete_document(&self, collection: &str, id: Uuid) -> StoreResult<bool> {
        let path = self.document_path(collection, id);
        match fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StoreError::io(path.display().to_string(), e)),
        }
    }

    /// 读取集合中的所有文档
    ///
    /// 损坏的文件只记录警告并跳过，否则一个坏文档会让整个重建失败
    async fn read_collection<T: DeserializeOwned>(&self, collection: &str) -> StoreResult<Vec<T>> {
        let dir = self.root.join(collection);
        let mut entries = fs::read_dir(&dir)
            .await
            .map_err(|e| StoreError::io(dir.display().to_string(), e))?;

        let mut docs = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StoreError::io(dir.display().to_string(), e))?
        {
            let path = entry.path();
            if path.extension().and_then(|s| s.to_str()) != Some("json") {
                continue;
            }
            let bytes = fs::read(&path)
                .await
                .map_err(|e| StoreError::io(path.display().to_string(), e))?;
            match serde_json::from_slice(&bytes) {
                Ok(doc) => docs.push(doc),
                Err(e) => warn!("⚠️ 跳过损坏的文档 {}: {}", path.display(), e),
            }
        }
        Ok(docs)
    }
}

#[async_trait]
impl DurableStore for JsonFileStore {
    async fn insert_submission(&self, submission: &Submission) -> StoreResult<()> {
        if fs::try_exists(self.document_path(SUBMISSIONS_DIR, submission.id))
            .await
            .unwrap_or(false)
        {
            return Err(StoreError::Duplicate(submission.id));
        }
        self.write_document(SUBMISSIONS_DIR, submission.id, submission).await
    }

    async fn replace_submission(&self, submission: &Submission) -> StoreResult<()> {
        if !fs::try_exists(self.document_path(SUBMISSIONS_DIR, submission.id))
            .await
            .unwrap_or(false)
        {
            return Err(StoreError::NotFound(submission.id));
        }
        self.write_document(SUBMISSIONS_DIR, submission.id, submission).await
    }

    async fn delete_submission(&self, id: Uuid) -> StoreResult<bool> {
        self.delete_document(SUBMISSIONS_DIR, id).await
    }

    async fn find_submission(&self, id: Uuid) -> StoreResult<Option<Submission>> {
        self.read_document(SUBMISSIONS_DIR, id).await
    }

    async fn find_submissions_by_student(&self, student_id: Uuid) -> StoreResult<Vec<Submission>> {
        let all: Vec<Submission> = self.read_collection(SUBMISSIONS_DIR).await?;
        Ok(all.into_iter().filter(|s| s.student_id == student_id).collect())
    }

    async fn all_submissions(&self) -> StoreResult<Vec<Submission>> {
        self.read_collection(SUBMISSIONS_DIR).await
    }

    async fn upsert_feedback(&self, feedback: &Feedback) -> StoreResult<()> {
        self.write_document(FEEDBACK_DIR, feedback.submission_id, feedback).await
    }

    async fn delete_feedback(&self, submission_id: Uuid) -> StoreResult<bool> {
        self.delete_document(FEEDBACK_DIR, submission_id).await
    }

    async fn find_feedback(&self, submission_id: Uuid) -> StoreResult<Option<Feedback>> {
        self.read_document(FEEDBACK_DIR, submission_id).await
    }

    async fn find_feedback_by_student(&self, student_id: Uuid) -> StoreResult<Vec<Feedback>> {
        let all: Vec<Feedback> = self.read_collection(FEEDBACK_DIR).await?;
        Ok(all.into_iter().filter(|f| f.student_id == student_id).collect())
    }

    async fn all_feedback(&self) -> StoreResult<Vec<Feedback>> {
        self.read_collection(FEEDBACK_DIR).await
    }
}
