//! 评分流程 - 流程层
//!
//! 核心职责：定义"给一份提交评分"的完整流程
//!
//! 流程顺序：
//! 1. 标记为评分中（短事务）
//! 2. 读取当前设置
//! 3. 调用评分服务（不持有任何锁或事务）
//! 4. 定稿（短事务）

use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use crate::error::AppResult;
use crate::models::{Feedback, SubmissionStatus, SubmitRequest};
use crate::services::{EvaluationService, EventKind, NotificationEvent, NotificationPublisher, SettingsService};
use crate::utils::logging::truncate_text;
use crate::workflow::SubmissionLifecycle;

/// 评分结果
#[derive(Debug, Clone, PartialEq)]
pub struct GradingOutcome {
    pub submission_id: Uuid,
    pub status: SubmissionStatus,
    pub feedback: Feedback,
}

/// 评分流程
///
/// - 编排生命周期和评分服务
/// - 评分服务失败时得到兜底反馈，流程本身不会因此失败
pub struct GradingFlow {
    lifecycle: Arc<SubmissionLifecycle>,
    evaluator: EvaluationService,
    settings: SettingsService,
    notifier: Arc<dyn NotificationPublisher>,
}

impl GradingFlow {
    pub fn new(
        lifecycle: Arc<SubmissionLifecycle>,
        evaluator: EvaluationService,
        notifier: Arc<dyn NotificationPublisher>,
    ) -> Self {
        let settings = SettingsService::new(lifecycle.state().clone());
        Self {
            lifecycle,
            evaluator,
            settings,
            notifier,
        }
    }

    pub fn lifecycle(&self) -> &Arc<SubmissionLifecycle> {
        &self.lifecycle
    }

    /// 创建提交并立即评分
    pub async fn submit_and_grade(&self, request: SubmitRequest) -> AppResult<GradingOutcome> {
        let submission = self.lifecycle.submit(request).await?;
        self.run(submission.id).await
    }

    /// 对已创建的提交评分
    pub async fn run(&self, submission_id: Uuid) -> AppResult<GradingOutcome> {
        self.grade(submission_id, None).await
    }

    /// 重新评分
    ///
    /// 使用评审人提供的额外说明。评审意见由定稿时的事务沿用，
    /// 评分期间评审人修改的意见不会被覆盖。
    pub async fn reevaluate(&self, submission_id: Uuid, instructions: Option<&str>) -> AppResult<GradingOutcome> {
        let outcome = self.grade(submission_id, instructions).await?;

        if let Some(submission) = self.lifecycle.submission(submission_id).await {
            self.notifier
                .publish(
                    NotificationEvent::for_submission(EventKind::Reevaluated, &submission)
                        .with_feedback(&outcome.feedback),
                )
                .await;
        }
        info!("🔁 提交 {} 重新评分完成，分数: {}", submission_id, outcome.feedback.grade);
        Ok(outcome)
    }

    async fn grade(&self, submission_id: Uuid, instructions: Option<&str>) -> AppResult<GradingOutcome> {
        let submission = self.lifecycle.begin_evaluation(submission_id).await?;
        info!(
            "📝 开始评分: {} - {}",
            submission.title,
            truncate_text(&submission.content, 40)
        );

        let constraints = self.settings.constraints().await;
        let analysis = self
            .evaluator
            .evaluate(&submission.content, instructions, &constraints)
            .await;

        let feedback = Feedback::from_analysis(&submission, analysis);
        let status = self.lifecycle.finalize(submission_id, feedback.clone()).await?;
        let feedback = self.lifecycle.feedback(submission_id).await.unwrap_or(feedback);

        Ok(GradingOutcome {
            submission_id,
            status,
            feedback,
        })
    }
}
