//! 批量评分处理器 - 编排层
//!
//! ## 职责
//!
//! 本模块是整个应用的入口，负责批量评分和资源管理。
//!
//! ## 核心功能
//!
//! 1. **应用初始化**：打开持久化存储、创建复制状态、选择评分服务
//! 2. **启动屏障**：先从持久化存储重建复制状态，再接收任何请求
//! 3. **批量加载**：扫描收件箱中的 TOML 提交请求
//! 4. **并发控制**：使用 Semaphore 限制同时评分的数量
//! 5. **全局统计**：汇总所有反馈的统计信息
//!
//! ## 设计特点
//!
//! - **顶层编排**：不处理单个提交的细节
//! - **资源所有者**：唯一创建存储和评分服务的模块
//! - **向下委托**：委托 `GradingFlow` 处理单个提交

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use futures::future::join_all;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::clients::{GradingProvider, LlmClient, OllamaClient};
use crate::config::{Config, ProviderKind};
use crate::error::AppError;
use crate::infrastructure::{JsonFileStore, ReplicatedState};
use crate::models::{self, SubmissionStatus, SubmitRequest};
use crate::services::{aggregate, EvaluationService, InMemoryNotifier, SettingsService, StatisticsSnapshot};
use crate::utils::logging::{log_startup, log_submissions_loaded, print_final_stats};
use crate::workflow::{GradingFlow, SubmissionLifecycle};

/// 应用主结构
pub struct App {
    config: Config,
    lifecycle: Arc<SubmissionLifecycle>,
    flow: Arc<GradingFlow>,
    notifier: Arc<InMemoryNotifier>,
}

impl App {
    /// 初始化应用
    ///
    /// 返回前已经完成复制状态的重建
    pub async fn initialize(config: Config) -> Result<Self> {
        log_startup(&config);

        let durable = JsonFileStore::open(&config.data_dir)
            .await
            .with_context(|| format!("无法打开数据目录: {}", config.data_dir))?;
        let state = Arc::new(ReplicatedState::with_replicas(config.replica_count));
        let notifier = Arc::new(InMemoryNotifier::new());

        let lifecycle = Arc::new(SubmissionLifecycle::new(
            Arc::new(durable),
            state.clone(),
            notifier.clone(),
        ));

        SettingsService::new(state)
            .seed(config.grading.clone(), config.max_submissions_per_student)
            .await
            .context("初始设置无效")?;

        let evaluator = EvaluationService::new(build_provider(&config), config.provider_timeout());
        let flow = Arc::new(GradingFlow::new(lifecycle.clone(), evaluator, notifier.clone()));

        // 启动屏障：重建完成前不处理任何提交
        lifecycle.reload().await.context("启动时重建复制状态失败")?;

        Ok(Self {
            config,
            lifecycle,
            flow,
            notifier,
        })
    }

    pub fn lifecycle(&self) -> &Arc<SubmissionLifecycle> {
        &self.lifecycle
    }

    pub fn flow(&self) -> &Arc<GradingFlow> {
        &self.flow
    }

    /// 运行应用主逻辑
    pub async fn run(&self) -> Result<StatisticsSnapshot> {
        let event_logger = self.spawn_event_logger();

        let pending = self.resume_pending().await?;
        let inbox = self.load_inbox().await?;

        if inbox.is_empty() && pending.is_empty() {
            warn!("⚠️ 没有找到待评分的提交");
        } else {
            log_submissions_loaded(inbox.len() + pending.len(), self.config.max_concurrent_submissions);
        }

        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_submissions.max(1)));
        let mut handles = Vec::new();
        for submission_id in pending {
            handles.push(self.spawn_job(semaphore.clone(), Job::Resume(submission_id)));
        }
        for (path, request) in inbox {
            handles.push(self.spawn_job(semaphore.clone(), Job::Inbox(path, request)));
        }

        let mut success = 0;
        let mut failed = 0;
        for result in join_all(handles).await {
            match result {
                Ok(true) => success += 1,
                Ok(false) => failed += 1,
                Err(e) => {
                    error!("任务执行失败: {}", e);
                    failed += 1;
                }
            }
        }

        let feedback = self.lifecycle.all_feedback().await;
        let snapshot = aggregate(&feedback, self.config.stats_scale.into());
        print_final_stats(success, failed, &snapshot);

        event_logger.abort();
        Ok(snapshot)
    }

    /// 上次运行中已创建但尚未评分的提交
    ///
    /// 停留在评分中状态的提交先通过重建恢复为 `Created`，再一并评分
    async fn resume_pending(&self) -> Result<Vec<uuid::Uuid>> {
        let stuck = self.lifecycle.submissions_by_status(SubmissionStatus::Evaluating).await;
        if !stuck.is_empty() {
            warn!("⚠️ 有 {} 个提交停留在评分中状态，重建后重新评分", stuck.len());
            let summary = self.lifecycle.reload().await.context("恢复评分中的提交失败")?;
            info!("✓ 已恢复 {} 个提交", summary.recovered);
        }

        Ok(self
            .lifecycle
            .submissions_by_status(SubmissionStatus::Created)
            .await
            .into_iter()
            .map(|s| s.id)
            .collect())
    }

    /// 加载收件箱
    async fn load_inbox(&self) -> Result<Vec<(PathBuf, SubmitRequest)>> {
        let folder = &self.config.inbox_folder;
        if !tokio::fs::try_exists(folder).await.unwrap_or(false) {
            warn!("⚠️ 收件箱目录不存在: {}", folder);
            return Ok(Vec::new());
        }

        info!("\n📁 正在扫描收件箱...");
        models::load_all_submission_requests(folder).await
    }

    fn spawn_job(&self, semaphore: Arc<Semaphore>, job: Job) -> JoinHandle<bool> {
        let flow = self.flow.clone();

        tokio::spawn(async move {
            let Ok(_permit) = semaphore.acquire_owned().await else {
                return false;
            };

            match job {
                Job::Resume(submission_id) => grade_submission(&flow, submission_id).await,
                Job::Inbox(path, request) => process_inbox_file(&flow, &path, request).await,
            }
        })
    }

    /// 订阅全部事件并写入调试日志
    fn spawn_event_logger(&self) -> JoinHandle<()> {
        let mut subscription = self.notifier.subscribe(&[]);
        tokio::spawn(async move {
            while let Some(event) = subscription.recv().await {
                debug!(
                    kind = ?event.kind,
                    submission = ?event.submission_id,
                    status = ?event.status,
                    grade = ?event.grade,
                    "📣 {}",
                    event.title
                );
            }
        })
    }
}

/// 单个评分任务
enum Job {
    /// 复制状态中已存在的提交
    Resume(uuid::Uuid),
    /// 收件箱中的新提交
    Inbox(PathBuf, SubmitRequest),
}

/// 处理收件箱中的一个文件
///
/// 提交创建成功后立即标记文件已处理，之后的评分失败由下次启动时的恢复流程接手，
/// 不会重复创建提交。
async fn process_inbox_file(flow: &GradingFlow, path: &Path, request: SubmitRequest) -> bool {
    let submission = match flow.lifecycle().submit(request).await {
        Ok(submission) => submission,
        Err(e) => {
            log_job_error(&path.display().to_string(), &e);
            return false;
        }
    };

    if let Err(e) = models::mark_processed(path).await {
        warn!("⚠️ 无法标记已处理文件 {}: {:#}", path.display(), e);
    }

    grade_submission(flow, submission.id).await
}

async fn grade_submission(flow: &GradingFlow, submission_id: uuid::Uuid) -> bool {
    match flow.run(submission_id).await {
        Ok(outcome) => outcome.status == SubmissionStatus::Graded,
        Err(e) => {
            log_job_error(&submission_id.to_string(), &e);
            false
        }
    }
}

/// 输入问题记为警告，其余记为错误
fn log_job_error(target: &str, err: &AppError) {
    if err.is_validation() {
        warn!("⚠️ {} 被拒绝: {}", target, err);
    } else {
        error!("❌ {} 处理失败: {}", target, err);
    }
}

/// 根据配置选择评分服务
fn build_provider(config: &Config) -> Arc<dyn GradingProvider> {
    match config.provider {
        ProviderKind::OpenAi => {
            if config.llm_api_key.is_empty() {
                warn!("⚠️ 未设置 LLM_API_KEY，评分请求可能被拒绝");
            }
            Arc::new(LlmClient::new(config))
        }
        ProviderKind::Ollama => Arc::new(OllamaClient::new(config)),
    }
}
