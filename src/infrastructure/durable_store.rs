//! 持久化文档存储 - 基础设施层
//!
//! 保存提交和反馈的权威副本，崩溃后仍然可用。
//! 复制状态在启动或运维触发时从这里整体重建。

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::{Feedback, Submission, SubmissionStatus};

/// 存储操作结果
pub type StoreResult<T> = Result<T, StoreError>;

/// 持久化文档存储接口
///
/// 职责：
/// - 按ID插入 / 替换 / 删除 / 查找文档
/// - 按学生ID查找（二级键）
/// - 全量读取（用于重建复制状态）
/// - 不关心状态机，不做事务
#[async_trait]
pub trait DurableStore: Send + Sync {
    /// 插入新提交，ID 已存在时返回 `Duplicate`
    async fn insert_submission(&self, submission: &Submission) -> StoreResult<()>;

    /// 替换已存在的提交，不存在时返回 `NotFound`
    async fn replace_submission(&self, submission: &Submission) -> StoreResult<()>;

    /// 删除提交，返回是否真的删除了记录
    async fn delete_submission(&self, id: Uuid) -> StoreResult<bool>;

    async fn find_submission(&self, id: Uuid) -> StoreResult<Option<Submission>>;

    async fn find_submissions_by_student(&self, student_id: Uuid) -> StoreResult<Vec<Submission>>;

    async fn all_submissions(&self) -> StoreResult<Vec<Submission>>;

    /// 插入或替换反馈（以提交ID为键）
    async fn upsert_feedback(&self, feedback: &Feedback) -> StoreResult<()>;

    async fn delete_feedback(&self, submission_id: Uuid) -> StoreResult<bool>;

    async fn find_feedback(&self, submission_id: Uuid) -> StoreResult<Option<Feedback>>;

    async fn find_feedback_by_student(&self, student_id: Uuid) -> StoreResult<Vec<Feedback>>;

    async fn all_feedback(&self) -> StoreResult<Vec<Feedback>>;

    /// 更新提交状态
    async fn update_submission_status(&self, id: Uuid, status: SubmissionStatus) -> StoreResult<()> {
        let mut submission = self
            .find_submission(id)
            .await?
            .ok_or(StoreError::NotFound(id))?;
        submission.status = status;
        self.replace_submission(&submission).await
    }
}

/// 内存文档存储
///
/// 进程退出即丢失，适用于本地调试和测试
#[derive(Default)]
pub struct MemoryStore {
    submissions: RwLock<HashMap<Uuid, Submission>>,
    feedback: RwLock<HashMap<Uuid, Feedback>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DurableStore for MemoryStore {
    async fn insert_submission(&self, submission: &Submission) -> StoreResult<()> {
        let mut submissions = self.submissions.write().await;
        if submissions.contains_key(&submission.id) {
            return Err(StoreError::Duplicate(submission.id));
        }
        submissions.insert(submission.id, submission.clone());
        Ok(())
    }

    async fn replace_submission(&self, submission: &Submission) -> StoreResult<()> {
        let mut submissions = self.submissions.write().await;
        match submissions.get_mut(&submission.id) {
            Some(existing) => {
                *existing = submission.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound(submission.id)),
        }
    }

    async fn delete_submission(&self, id: Uuid) -> StoreResult<bool> {
        Ok(self.submissions.write().await.remove(&id).is_some())
    }

    async fn find_submission(&self, id: Uuid) -> StoreResult<Option<Submission>> {
        Ok(self.submissions.read().await.get(&id).cloned())
    }

    async fn find_submissions_by_student(&self, student_id: Uuid) -> StoreResult<Vec<Submission>> {
        Ok(self
            .submissions
            .read()
            .await
            .values()
            .filter(|s| s.student_id == student_id)
            .cloned()
            .collect())
    }

    async fn all_submissions(&self) -> StoreResult<Vec<Submission>> {
        Ok(self.submissions.read().await.values().cloned().collect())
    }

    async fn upsert_feedback(&self, feedback: &Feedback) -> StoreResult<()> {
        self.feedback
            .write()
            .await
            .insert(feedback.submission_id, feedback.clone());
        Ok(())
    }

    async fn delete_feedback(&self, submission_id: Uuid) -> StoreResult<bool> {
        Ok(self.feedback.write().await.remove(&submission_id).is_some())
    }

    async fn find_feedback(&self, submission_id: Uuid) -> StoreResult<Option<Feedback>> {
        Ok(self.feedback.read().await.get(&submission_id).cloned())
    }

    async fn find_feedback_by_student(&self, student_id: Uuid) -> StoreResult<Vec<Feedback>> {
        Ok(self
            .feedback
            .read()
            .await
            .values()
            .filter(|f| f.student_id == student_id)
            .cloned()
            .collect())
    }

    async fn all_feedback(&self) -> StoreResult<Vec<Feedback>> {
        Ok(self.feedback.read().await.values().cloned().collect())
    }
}
