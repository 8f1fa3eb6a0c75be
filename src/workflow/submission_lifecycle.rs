//! 提交生命周期 - 流程层
//!
//! 核心职责：定义"一份提交"从创建到删除的全部状态迁移
//!
//! 两个存储之间的写入顺序：
//! 1. 创建：先写持久化存储，再写复制状态；复制状态写入失败时删除持久化副本（补偿）
//! 2. 状态迁移 / 定稿：先提交复制状态事务，持久化写入尽力而为，失败只记日志
//! 3. 删除：逐条删除，单条失败不影响其他记录
//!
//! 两个存储之间出现的不一致由 `reload()` 修复。

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::{AppError, AppResult, ReplicaError, ValidationError};
use crate::infrastructure::{DurableStore, ReplicatedState};
use crate::models::{Feedback, Submission, SubmissionStatus, SubmitRequest};
use crate::services::{EventKind, NotificationEvent, NotificationPublisher};

/// 重建复制状态的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReloadSummary {
    /// 替换后的代数
    pub generation: u64,
    pub submissions: usize,
    pub feedback: usize,
    /// 找不到所属提交而被跳过的反馈数量
    pub skipped_feedback: usize,
    /// 停留在评分中状态、被恢复的提交数量
    pub recovered: usize,
}

/// 提交生命周期
///
/// - 唯一修改提交和反馈的入口
/// - 所有修改操作共享维护锁，`reload()` 独占维护锁
/// - 不调用评分服务
pub struct SubmissionLifecycle {
    durable: Arc<dyn DurableStore>,
    state: Arc<ReplicatedState>,
    notifier: Arc<dyn NotificationPublisher>,
    maintenance: RwLock<()>,
}

impl SubmissionLifecycle {
    pub fn new(
        durable: Arc<dyn DurableStore>,
        state: Arc<ReplicatedState>,
        notifier: Arc<dyn NotificationPublisher>,
    ) -> Self {
        Self {
            durable,
            state,
            notifier,
            maintenance: RwLock::new(()),
        }
    }

    pub fn state(&self) -> &Arc<ReplicatedState> {
        &self.state
    }

    /// 创建提交
    ///
    /// 校验失败时不修改任何状态
    pub async fn submit(&self, request: SubmitRequest) -> AppResult<Submission> {
        validate_request(&request)?;

        let _shared = self.maintenance.read().await;
        self.check_submission_limit(request.student_id).await?;

        let submission = Submission::new(&request);
        self.durable.insert_submission(&submission).await?;

        if let Err(e) = self.put_replicated(submission.clone()).await {
            error!("❌ 提交 {} 写入复制状态失败，回滚持久化副本: {}", submission.id, e);
            match self.durable.delete_submission(submission.id).await {
                Ok(_) => debug!("已删除持久化副本 {}", submission.id),
                Err(store_err) => {
                    error!("❌ 删除持久化副本 {} 失败，留下孤立记录: {}", submission.id, store_err)
                }
            }
            return Err(e.into());
        }

        info!(
            "📥 新提交 {} - {} ({})，预估处理时间 {} 秒",
            submission.id, submission.title, submission.student_name, submission.estimated_secs
        );
        self.notifier
            .publish(NotificationEvent::for_submission(EventKind::SubmissionCreated, &submission))
            .await;

        Ok(submission)
    }

    /// 标记为评分中
    pub async fn begin_evaluation(&self, submission_id: Uuid) -> AppResult<Submission> {
        let _shared = self.maintenance.read().await;

        let mut tx = self.state.begin().await?;
        let mut submission = tx
            .get_submission(submission_id)
            .await
            .ok_or_else(|| AppError::unknown_submission(submission_id))?;
        transition(&mut submission, SubmissionStatus::Evaluating)?;
        tx.put_submission(submission.clone());
        tx.commit().await?;

        if let Err(e) = self
            .durable
            .update_submission_status(submission_id, SubmissionStatus::Evaluating)
            .await
        {
            warn!("⚠️ 提交 {} 的状态未能写入持久化存储: {}", submission_id, e);
        }

        self.notifier
            .publish(NotificationEvent::for_submission(EventKind::StatusChanged, &submission))
            .await;
        Ok(submission)
    }

    /// 写入评分反馈并进入终态
    ///
    /// 分数 > 0 为 `Graded`，否则为 `Rejected`。
    /// 复制状态提交成功后，持久化写入失败不会回滚，只记录日志。
    pub async fn finalize(&self, submission_id: Uuid, feedback: Feedback) -> AppResult<SubmissionStatus> {
        let _shared = self.maintenance.read().await;

        let mut tx = self.state.begin().await?;
        let mut submission = tx
            .get_submission(submission_id)
            .await
            .ok_or_else(|| AppError::unknown_submission(submission_id))?;
        let status = SubmissionStatus::for_grade(feedback.grade);
        transition(&mut submission, status)?;

        // 评审意见只能由评审人修改，始终以事务内读到的意见为准
        let reviewer_comment = tx
            .get_feedback(submission_id)
            .await
            .and_then(|previous| previous.reviewer_comment);
        let feedback = Feedback {
            submission_id,
            student_id: submission.student_id,
            student_name: submission.student_name.clone(),
            title: submission.title.clone(),
            reviewer_comment,
            ..feedback
        };
        tx.put_submission(submission.clone());
        tx.put_feedback(feedback.clone());
        tx.commit().await?;

        if let Err(e) = self.durable.upsert_feedback(&feedback).await {
            warn!("⚠️ 提交 {} 的反馈未能写入持久化存储，等待重建修复: {}", submission_id, e);
        }
        if let Err(e) = self.durable.replace_submission(&submission).await {
            warn!("⚠️ 提交 {} 的状态未能写入持久化存储，等待重建修复: {}", submission_id, e);
        }

        info!("✓ 提交 {} 评分定稿: {} (分数 {})", submission_id, status, feedback.grade);
        self.notifier
            .publish(
                NotificationEvent::for_submission(EventKind::StatusChanged, &submission).with_feedback(&feedback),
            )
            .await;

        Ok(status)
    }

    /// 从持久化存储整体重建复制状态
    ///
    /// 只能在主副本上执行，期间阻塞所有修改操作。
    /// 新数据在旁边完整构建后一次性替换，替换前的读请求看到的仍是旧数据。
    pub async fn reload(&self) -> AppResult<ReloadSummary> {
        if !self.state.is_primary() {
            return Err(ReplicaError::NotPrimary.into());
        }

        let _exclusive = self.maintenance.write().await;
        info!("🔄 正在从持久化存储重建复制状态...");

        let mut submissions = self.durable.all_submissions().await?;
        let owners: BTreeSet<Uuid> = submissions.iter().map(|s| s.id).collect();

        let (feedback, orphans): (Vec<Feedback>, Vec<Feedback>) = self
            .durable
            .all_feedback()
            .await?
            .into_iter()
            .partition(|f| owners.contains(&f.submission_id));
        for orphan in &orphans {
            warn!("⚠️ 反馈 {} 找不到所属提交，已跳过", orphan.submission_id);
        }

        let recovered = self.recover_stuck(&mut submissions, &feedback).await;

        let summary = ReloadSummary {
            generation: 0,
            submissions: submissions.len(),
            feedback: feedback.len(),
            skipped_feedback: orphans.len(),
            recovered,
        };
        let generation = self.state.swap_keyspace(submissions, feedback).await?;

        info!(
            "✓ 复制状态重建完成 (第 {} 代): {} 个提交，{} 条反馈",
            generation, summary.submissions, summary.feedback
        );
        Ok(ReloadSummary { generation, ..summary })
    }

    /// 删除某个学生的全部提交和反馈
    ///
    /// 逐条删除，单条失败只记录日志。返回实际删除的记录数（提交连同其反馈算一条），
    /// 再次调用返回 0。
    pub async fn purge(&self, student_id: Uuid) -> AppResult<usize> {
        let _shared = self.maintenance.read().await;

        let ids = self.student_record_ids(student_id).await;
        let mut removed = 0;

        for id in ids {
            let mut record_removed = false;

            match self.remove_replicated(id).await {
                Ok(true) => record_removed = true,
                Ok(false) => {}
                Err(e) => warn!("⚠️ 从复制状态删除记录 {} 失败: {}", id, e),
            }
            match self.durable.delete_feedback(id).await {
                Ok(deleted) => record_removed |= deleted,
                Err(e) => warn!("⚠️ 从持久化存储删除反馈 {} 失败: {}", id, e),
            }
            match self.durable.delete_submission(id).await {
                Ok(deleted) => record_removed |= deleted,
                Err(e) => warn!("⚠️ 从持久化存储删除提交 {} 失败: {}", id, e),
            }

            if record_removed {
                removed += 1;
            }
        }

        info!("🗑️ 已删除学生 {} 的 {} 条记录", student_id, removed);
        self.notifier
            .publish(NotificationEvent::student_purged(student_id, removed))
            .await;

        Ok(removed)
    }

    /// 添加或替换评审意见
    pub async fn add_reviewer_comment(&self, submission_id: Uuid, comment: &str) -> AppResult<Feedback> {
        let _shared = self.maintenance.read().await;

        let mut tx = self.state.begin().await?;
        let mut feedback = tx
            .get_feedback(submission_id)
            .await
            .ok_or_else(|| AppError::unknown_submission(submission_id))?;
        let comment = comment.trim();
        feedback.reviewer_comment = (!comment.is_empty()).then(|| comment.to_string());
        tx.put_feedback(feedback.clone());
        tx.commit().await?;

        if let Err(e) = self.durable.upsert_feedback(&feedback).await {
            warn!("⚠️ 提交 {} 的评审意见未能写入持久化存储: {}", submission_id, e);
        }
        info!("📝 提交 {} 已更新评审意见", submission_id);
        Ok(feedback)
    }

    // ========== 查询 ==========

    pub async fn submission(&self, id: Uuid) -> Option<Submission> {
        self.state.get_submission(id).await
    }

    /// 全部提交，按提交时间排序
    pub async fn submissions(&self) -> Vec<Submission> {
        let mut submissions = self.state.list_submissions().await;
        submissions.sort_by_key(|s| s.submitted_at);
        submissions
    }

    pub async fn submissions_by_student(&self, student_id: Uuid) -> Vec<Submission> {
        let mut submissions = self.submissions().await;
        submissions.retain(|s| s.student_id == student_id);
        submissions
    }

    pub async fn submissions_by_status(&self, status: SubmissionStatus) -> Vec<Submission> {
        let mut submissions = self.submissions().await;
        submissions.retain(|s| s.status == status);
        submissions
    }

    pub async fn feedback(&self, submission_id: Uuid) -> Option<Feedback> {
        self.state.get_feedback(submission_id).await
    }

    /// 全部反馈，按评分时间排序
    pub async fn all_feedback(&self) -> Vec<Feedback> {
        let mut feedback = self.state.list_feedback().await;
        feedback.sort_by_key(|f| f.evaluated_at);
        feedback
    }

    pub async fn feedback_by_student(&self, student_id: Uuid) -> Vec<Feedback> {
        let mut feedback = self.all_feedback().await;
        feedback.retain(|f| f.student_id == student_id);
        feedback
    }

    // ========== 内部辅助 ==========

    /// 修复停留在 `Evaluating` 的提交
    ///
    /// 已有反馈的按分数进入终态，否则回到 `Created` 等待重新评分。
    /// 修复结果尽力写回持久化存储。
    async fn recover_stuck(&self, submissions: &mut [Submission], feedback: &[Feedback]) -> usize {
        let grades: HashMap<Uuid, u32> = feedback.iter().map(|f| (f.submission_id, f.grade)).collect();
        let mut recovered = 0;

        for submission in submissions
            .iter_mut()
            .filter(|s| s.status == SubmissionStatus::Evaluating)
        {
            submission.status = grades
                .get(&submission.id)
                .map_or(SubmissionStatus::Created, |grade| SubmissionStatus::for_grade(*grade));
            warn!("⚠️ 提交 {} 停留在评分中状态，恢复为 {}", submission.id, submission.status);

            if let Err(e) = self.durable.replace_submission(submission).await {
                warn!("⚠️ 提交 {} 的恢复状态未能写入持久化存储: {}", submission.id, e);
            }
            recovered += 1;
        }

        recovered
    }

    async fn check_submission_limit(&self, student_id: Uuid) -> Result<(), ValidationError> {
        let Some(limit) = self.state.settings().await.max_submissions_per_student else {
            return Ok(());
        };

        let existing = self
            .state
            .list_submissions()
            .await
            .iter()
            .filter(|s| s.student_id == student_id)
            .count();
        if existing >= limit as usize {
            warn!("⚠️ 学生 {} 已有 {} 个提交，达到上限", student_id, existing);
            return Err(ValidationError::SubmissionLimitReached { student_id, limit });
        }
        Ok(())
    }

    async fn put_replicated(&self, submission: Submission) -> Result<(), ReplicaError> {
        let mut tx = self.state.begin().await?;
        tx.put_submission(submission);
        tx.commit().await
    }

    /// 在一个事务里删除提交及其反馈，返回是否有记录被删除
    async fn remove_replicated(&self, id: Uuid) -> Result<bool, ReplicaError> {
        let mut tx = self.state.begin().await?;
        let present = tx.get_submission(id).await.is_some() || tx.get_feedback(id).await.is_some();
        if !present {
            return Ok(false);
        }
        tx.remove_feedback(id);
        tx.remove_submission(id);
        tx.commit().await?;
        Ok(true)
    }

    /// 两个存储中属于该学生的全部记录ID（提交ID，孤立反馈也按提交ID计）
    async fn student_record_ids(&self, student_id: Uuid) -> BTreeSet<Uuid> {
        let mut ids = BTreeSet::new();

        for s in self.state.list_submissions().await {
            if s.student_id == student_id {
                ids.insert(s.id);
            }
        }
        for f in self.state.list_feedback().await {
            if f.student_id == student_id {
                ids.insert(f.submission_id);
            }
        }

        match self.durable.find_submissions_by_student(student_id).await {
            Ok(found) => ids.extend(found.iter().map(|s| s.id)),
            Err(e) => warn!("⚠️ 无法从持久化存储读取学生 {} 的提交: {}", student_id, e),
        }
        match self.durable.find_feedback_by_student(student_id).await {
            Ok(found) => ids.extend(found.iter().map(|f| f.submission_id)),
            Err(e) => warn!("⚠️ 无法从持久化存储读取学生 {} 的反馈: {}", student_id, e),
        }

        ids
    }
}

fn validate_request(request: &SubmitRequest) -> Result<(), ValidationError> {
    if request.student_id.is_nil() {
        return Err(ValidationError::InvalidStudentId);
    }
    if request.title.trim().is_empty() {
        return Err(ValidationError::EmptyTitle);
    }
    if request.content.trim().is_empty() {
        return Err(ValidationError::EmptyContent);
    }
    Ok(())
}

fn transition(submission: &mut Submission, next: SubmissionStatus) -> Result<(), AppError> {
    if !submission.status.can_transition_to(next) {
        return Err(AppError::illegal_transition(submission.status, next));
    }
    submission.status = next;
    Ok(())
}
