//! 集成测试共用的替身实现
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use submission_grading::clients::{GradingPrompt, GradingProvider};
use submission_grading::error::{ProviderError, StoreError};
use submission_grading::infrastructure::{DurableStore, MemoryStore, StoreResult};
use submission_grading::services::{EvaluationService, InMemoryNotifier};
use submission_grading::{Feedback, GradingFlow, ReplicatedState, Submission, SubmissionLifecycle};

/// 符合格式要求的评分回复
pub fn grade_json(grade: i64, problems: &[&str]) -> String {
    serde_json::json!({
        "Grade": grade,
        "IdentifiedErrors": problems,
        "ImprovementSuggestions": ["write more tests"],
        "FurtherRecommendations": ["read the style guide"],
    })
    .to_string()
}

/// 按顺序返回预设回复的评分服务，预设用完后重复最后一个回复
pub struct ScriptedProvider {
    replies: Mutex<VecDeque<Result<String, ProviderError>>>,
    last: Mutex<Option<Result<String, ProviderError>>>,
    prompts: Mutex<Vec<GradingPrompt>>,
    delay: Duration,
}

impl ScriptedProvider {
    pub fn new(replies: Vec<Result<String, ProviderError>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            last: Mutex::new(None),
            prompts: Mutex::new(Vec::new()),
            delay: Duration::ZERO,
        }
    }

    pub fn always(grade: i64) -> Self {
        Self::new(vec![Ok(grade_json(grade, &["naming"]))])
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn prompts(&self) -> Vec<GradingPrompt> {
        self.prompts.lock().unwrap().clone()
    }
}

fn clone_reply(reply: &Result<String, ProviderError>) -> Result<String, ProviderError> {
    match reply {
        Ok(body) => Ok(body.clone()),
        Err(ProviderError::BadStatus(code)) => Err(ProviderError::BadStatus(*code)),
        Err(ProviderError::Timeout(d)) => Err(ProviderError::Timeout(*d)),
        Err(ProviderError::EmptyResponse) => Err(ProviderError::EmptyResponse),
        Err(other) => Err(ProviderError::RequestFailed(other.to_string())),
    }
}

#[async_trait]
impl GradingProvider for ScriptedProvider {
    async fn complete(&self, prompt: &GradingPrompt) -> Result<String, ProviderError> {
        self.prompts.lock().unwrap().push(prompt.clone());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let next = self.replies.lock().unwrap().pop_front();
        let mut last = self.last.lock().unwrap();
        match next {
            Some(reply) => {
                let out = clone_reply(&reply);
                *last = Some(reply);
                out
            }
            None => match last.as_ref() {
                Some(reply) => clone_reply(reply),
                None => Err(ProviderError::EmptyResponse),
            },
        }
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// 可以按需让写入或删除失败的持久化存储
#[derive(Default)]
pub struct FlakyStore {
    inner: MemoryStore,
    fail_writes: AtomicBool,
    fail_deletes: AtomicBool,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    fn check_write(&self) -> StoreResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("写入被禁用".to_string()));
        }
        Ok(())
    }

    fn check_delete(&self) -> StoreResult<()> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("删除被禁用".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl DurableStore for FlakyStore {
    async fn insert_submission(&self, submission: &Submission) -> StoreResult<()> {
        self.check_write()?;
        self.inner.insert_submission(submission).await
    }

    async fn replace_submission(&self, submission: &Submission) -> StoreResult<()> {
        self.check_write()?;
        self.inner.replace_submission(submission).await
    }

    async fn delete_submission(&self, id: Uuid) -> StoreResult<bool> {
        self.check_delete()?;
        self.inner.delete_submission(id).await
    }

    async fn find_submission(&self, id: Uuid) -> StoreResult<Option<Submission>> {
        self.inner.find_submission(id).await
    }

    async fn find_submissions_by_student(&self, student_id: Uuid) -> StoreResult<Vec<Submission>> {
        self.inner.find_submissions_by_student(student_id).await
    }

    async fn all_submissions(&self) -> StoreResult<Vec<Submission>> {
        self.inner.all_submissions().await
    }

    async fn upsert_feedback(&self, feedback: &Feedback) -> StoreResult<()> {
        self.check_write()?;
        self.inner.upsert_feedback(feedback).await
    }

    async fn delete_feedback(&self, submission_id: Uuid) -> StoreResult<bool> {
        self.check_delete()?;
        self.inner.delete_feedback(submission_id).await
    }

    async fn find_feedback(&self, submission_id: Uuid) -> StoreResult<Option<Feedback>> {
        self.inner.find_feedback(submission_id).await
    }

    async fn find_feedback_by_student(&self, student_id: Uuid) -> StoreResult<Vec<Feedback>> {
        self.inner.find_feedback_by_student(student_id).await
    }

    async fn all_feedback(&self) -> StoreResult<Vec<Feedback>> {
        self.inner.all_feedback().await
    }
}

/// 装配好的测试环境
pub struct Harness {
    pub durable: Arc<FlakyStore>,
    pub state: Arc<ReplicatedState>,
    pub notifier: Arc<InMemoryNotifier>,
    pub provider: Arc<ScriptedProvider>,
    pub lifecycle: Arc<SubmissionLifecycle>,
    pub flow: GradingFlow,
}

impl Harness {
    pub fn new(provider: ScriptedProvider) -> Self {
        Self::with_timeout(provider, Duration::from_secs(2))
    }

    pub fn with_timeout(provider: ScriptedProvider, timeout: Duration) -> Self {
        let durable = Arc::new(FlakyStore::new());
        let state = Arc::new(ReplicatedState::with_replicas(2));
        let notifier = Arc::new(InMemoryNotifier::new());
        let provider = Arc::new(provider);

        let lifecycle = Arc::new(SubmissionLifecycle::new(durable.clone(), state.clone(), notifier.clone()));
        let evaluator = EvaluationService::new(provider.clone(), timeout);
        let flow = GradingFlow::new(lifecycle.clone(), evaluator, notifier.clone());

        Self {
            durable,
            state,
            notifier,
            provider,
            lifecycle,
            flow,
        }
    }
}
