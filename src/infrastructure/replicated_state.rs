//! 复制状态 - 基础设施层
//!
//! 进程内的复制键值空间（提交、反馈、设置），支持跨多个键的原子事务。
//!
//! ## 事务模型
//!
//! - `begin()` 只记录开始时的代数（generation），不持有任何锁
//! - 写操作先暂存在事务里，`commit()` 时在一把写锁下一次性应用到主副本和所有从副本
//! - 事务被丢弃（包括中途出错提前返回）时，暂存的写操作全部作废
//! - 整体重建（`swap_keyspace`）会让代数加一，之前开启的事务无法再提交
//!
//! 评分服务调用耗时很长，调用期间不能持有事务或锁。

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::ReplicaError;
use crate::models::{Feedback, SettingsRecord, Submission};

/// 单个副本持有的键空间
#[derive(Debug, Clone, Default)]
pub struct Keyspace {
    generation: u64,
    submissions: HashMap<Uuid, Submission>,
    feedback: HashMap<Uuid, Feedback>,
    settings: SettingsRecord,
}

impl Keyspace {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn submission(&self, id: &Uuid) -> Option<&Submission> {
        self.submissions.get(id)
    }

    pub fn submissions(&self) -> impl Iterator<Item = &Submission> {
        self.submissions.values()
    }

    pub fn feedback(&self, id: &Uuid) -> Option<&Feedback> {
        self.feedback.get(id)
    }

    pub fn all_feedback(&self) -> impl Iterator<Item = &Feedback> {
        self.feedback.values()
    }

    pub fn settings(&self) -> &SettingsRecord {
        &self.settings
    }

    fn apply(&mut self, op: &WriteOp) {
        match op {
            WriteOp::PutSubmission(s) => {
                self.submissions.insert(s.id, s.clone());
            }
            WriteOp::RemoveSubmission(id) => {
                self.submissions.remove(id);
            }
            WriteOp::PutFeedback(f) => {
                self.feedback.insert(f.submission_id, f.clone());
            }
            WriteOp::RemoveFeedback(id) => {
                self.feedback.remove(id);
            }
            WriteOp::PutSettings(settings) => {
                self.settings = settings.clone();
            }
        }
    }
}

/// 暂存的写操作
#[derive(Debug, Clone)]
enum WriteOp {
    PutSubmission(Submission),
    RemoveSubmission(Uuid),
    PutFeedback(Feedback),
    RemoveFeedback(Uuid),
    PutSettings(SettingsRecord),
}

/// 复制状态
///
/// 一个主副本加若干从副本。只有主副本接受写入；读操作读主副本。
pub struct ReplicatedState {
    primary_role: AtomicBool,
    primary: RwLock<Keyspace>,
    secondaries: Vec<RwLock<Keyspace>>,
}

impl ReplicatedState {
    /// 创建只有主副本的复制状态
    pub fn new() -> Self {
        Self::with_replicas(0)
    }

    /// 创建带 `secondaries` 个从副本的复制状态
    pub fn with_replicas(secondaries: usize) -> Self {
        Self {
            primary_role: AtomicBool::new(true),
            primary: RwLock::new(Keyspace::default()),
            secondaries: (0..secondaries).map(|_| RwLock::new(Keyspace::default())).collect(),
        }
    }

    pub fn is_primary(&self) -> bool {
        self.primary_role.load(Ordering::SeqCst)
    }

    /// 降级为从副本，之后的写事务都会失败
    pub fn demote(&self) {
        info!("复制状态降级为从副本");
        self.primary_role.store(false, Ordering::SeqCst);
    }

    /// 提升为主副本
    pub fn promote(&self) {
        info!("复制状态提升为主副本");
        self.primary_role.store(true, Ordering::SeqCst);
    }

    pub fn replica_count(&self) -> usize {
        self.secondaries.len()
    }

    /// 开启写事务
    pub async fn begin(&self) -> Result<Transaction<'_>, ReplicaError> {
        self.ensure_primary()?;
        let base_generation = self.primary.read().await.generation;
        Ok(Transaction {
            state: self,
            base_generation,
            ops: Vec::new(),
            committed: false,
        })
    }

    pub async fn generation(&self) -> u64 {
        self.primary.read().await.generation
    }

    pub async fn get_submission(&self, id: Uuid) -> Option<Submission> {
        self.primary.read().await.submissions.get(&id).cloned()
    }

    pub async fn list_submissions(&self) -> Vec<Submission> {
        self.primary.read().await.submissions.values().cloned().collect()
    }

    pub async fn get_feedback(&self, submission_id: Uuid) -> Option<Feedback> {
        self.primary.read().await.feedback.get(&submission_id).cloned()
    }

    pub async fn list_feedback(&self) -> Vec<Feedback> {
        self.primary.read().await.feedback.values().cloned().collect()
    }

    pub async fn settings(&self) -> SettingsRecord {
        self.primary.read().await.settings.clone()
    }

    /// 读取某个从副本的完整快照
    pub async fn secondary_snapshot(&self, index: usize) -> Option<Keyspace> {
        match self.secondaries.get(index) {
            Some(replica) => Some(replica.read().await.clone()),
            None => None,
        }
    }

    /// 用新构建好的数据整体替换提交和反馈（设置保留）
    ///
    /// 新数据在调用前已经完整构建，这里只做一次原子替换，外部看不到中间的空状态。
    /// 返回新的代数。
    pub async fn swap_keyspace(
        &self,
        submissions: Vec<Submission>,
        feedback: Vec<Feedback>,
    ) -> Result<u64, ReplicaError> {
        self.ensure_primary()?;

        let mut primary = self.primary.write().await;
        let next = Keyspace {
            generation: primary.generation + 1,
            submissions: submissions.into_iter().map(|s| (s.id, s)).collect(),
            feedback: feedback.into_iter().map(|f| (f.submission_id, f)).collect(),
            settings: primary.settings.clone(),
        };

        for replica in &self.secondaries {
            *replica.write().await = next.clone();
        }
        *primary = next;

        debug!("复制状态已整体替换，当前代数: {}", primary.generation);
        Ok(primary.generation)
    }

    fn ensure_primary(&self) -> Result<(), ReplicaError> {
        if self.is_primary() {
            Ok(())
        } else {
            Err(ReplicaError::NotPrimary)
        }
    }
}

impl Default for ReplicatedState {
    fn default() -> Self {
        Self::new()
    }
}

/// 写事务
///
/// 所有写操作在 `commit()` 时一起生效，要么全部成功要么全部丢弃
pub struct Transaction<'a> {
    state: &'a ReplicatedState,
    base_generation: u64,
    ops: Vec<WriteOp>,
    committed: bool,
}

impl<'a> Transaction<'a> {
    pub fn put_submission(&mut self, submission: Submission) {
        self.ops.push(WriteOp::PutSubmission(submission));
    }

    pub fn remove_submission(&mut self, id: Uuid) {
        self.ops.push(WriteOp::RemoveSubmission(id));
    }

    pub fn put_feedback(&mut self, feedback: Feedback) {
        self.ops.push(WriteOp::PutFeedback(feedback));
    }

    pub fn remove_feedback(&mut self, submission_id: Uuid) {
        self.ops.push(WriteOp::RemoveFeedback(submission_id));
    }

    pub fn put_settings(&mut self, settings: SettingsRecord) {
        self.ops.push(WriteOp::PutSettings(settings));
    }

    /// 读取提交，能看到本事务中尚未提交的写入
    pub async fn get_submission(&self, id: Uuid) -> Option<Submission> {
        for op in self.ops.iter().rev() {
            match op {
                WriteOp::PutSubmission(s) if s.id == id => return Some(s.clone()),
                WriteOp::RemoveSubmission(removed) if *removed == id => return None,
                _ => {}
            }
        }
        self.state.get_submission(id).await
    }

    /// 读取反馈，能看到本事务中尚未提交的写入
    pub async fn get_feedback(&self, submission_id: Uuid) -> Option<Feedback> {
        for op in self.ops.iter().rev() {
            match op {
                WriteOp::PutFeedback(f) if f.submission_id == submission_id => return Some(f.clone()),
                WriteOp::RemoveFeedback(removed) if *removed == submission_id => return None,
                _ => {}
            }
        }
        self.state.get_feedback(submission_id).await
    }

    /// 枚举提交（包含本事务的暂存写入）
    pub async fn submissions(&self) -> Vec<Submission> {
        let mut view = self.state.primary.read().await.clone();
        for op in &self.ops {
            view.apply(op);
        }
        view.submissions.into_values().collect()
    }

    /// 提交事务
    ///
    /// 在主副本写锁下依次应用到主副本和每个从副本
    pub async fn commit(mut self) -> Result<(), ReplicaError> {
        self.state.ensure_primary()?;

        let mut primary = self.state.primary.write().await;
        if primary.generation != self.base_generation {
            return Err(ReplicaError::StaleGeneration {
                expected: self.base_generation,
                found: primary.generation,
            });
        }

        for op in &self.ops {
            primary.apply(op);
        }
        for replica in &self.state.secondaries {
            let mut replica = replica.write().await;
            for op in &self.ops {
                replica.apply(op);
            }
        }

        self.committed = true;
        Ok(())
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if !self.committed && !self.ops.is_empty() {
            debug!("事务未提交，丢弃 {} 个写操作", self.ops.len());
        }
    }
}
