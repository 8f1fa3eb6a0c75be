//! 通知服务 - 业务能力层
//!
//! 提交生命周期事件的广播通道。
//!
//! ## 投递语义
//!
//! - 最多一次，尽力而为：发布失败只记录日志，不回滚、不重试、不排队
//! - 发布时不在线的订阅者永久错过该事件（没有重放日志）
//! - 处理过慢的订阅者会丢失积压的事件

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::debug;
use uuid::Uuid;

use crate::models::{Feedback, Submission, SubmissionStatus};

/// 每个订阅者最多缓存的事件数量
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// 事件类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum EventKind {
    SubmissionCreated,
    StatusChanged,
    Reevaluated,
    StudentPurged,
}

/// 生命周期事件
///
/// 带有足够的冗余字段，订阅者无需再次查询即可展示
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NotificationEvent {
    pub kind: EventKind,
    pub submission_id: Option<Uuid>,
    pub student_id: Uuid,
    pub student_name: String,
    pub title: String,
    pub status: Option<SubmissionStatus>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub evaluated_at: Option<DateTime<Utc>>,
    pub estimated_secs: Option<u64>,
    pub grade: Option<u32>,
    /// 仅 `StudentPurged` 使用
    pub purged_count: Option<usize>,
}

impl NotificationEvent {
    /// 基于提交记录构建事件
    pub fn for_submission(kind: EventKind, submission: &Submission) -> Self {
        Self {
            kind,
            submission_id: Some(submission.id),
            student_id: submission.student_id,
            student_name: submission.student_name.clone(),
            title: submission.title.clone(),
            status: Some(submission.status),
            submitted_at: Some(submission.submitted_at),
            evaluated_at: None,
            estimated_secs: Some(submission.estimated_secs),
            grade: None,
            purged_count: None,
        }
    }

    /// 附加评分结果
    pub fn with_feedback(mut self, feedback: &Feedback) -> Self {
        self.evaluated_at = Some(feedback.evaluated_at);
        self.grade = Some(feedback.grade);
        self
    }

    pub fn student_purged(student_id: Uuid, purged_count: usize) -> Self {
        Self {
            kind: EventKind::StudentPurged,
            submission_id: None,
            student_id,
            student_name: String::new(),
            title: String::new(),
            status: None,
            submitted_at: None,
            evaluated_at: None,
            estimated_secs: None,
            grade: None,
            purged_count: Some(purged_count),
        }
    }
}

/// 事件发布接口
#[async_trait]
pub trait NotificationPublisher: Send + Sync {
    /// 发布事件，返回收到事件的订阅者数量
    ///
    /// 不返回错误：发布失败只记录日志
    async fn publish(&self, event: NotificationEvent) -> usize;

    /// 已发布（尝试过）的事件总数
    fn events_published(&self) -> u64;
}

/// 基于 `tokio::sync::broadcast` 的进程内通知总线
pub struct InMemoryNotifier {
    sender: broadcast::Sender<NotificationEvent>,
    events_published: AtomicU64,
}

impl InMemoryNotifier {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            events_published: AtomicU64::new(0),
        }
    }

    /// 订阅事件；`kinds` 为空表示订阅全部类型
    pub fn subscribe(&self, kinds: &[EventKind]) -> Subscription {
        debug!(kinds = ?kinds, "新增订阅");
        Subscription {
            receiver: self.sender.subscribe(),
            kinds: kinds.to_vec(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for InMemoryNotifier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NotificationPublisher for InMemoryNotifier {
    async fn publish(&self, event: NotificationEvent) -> usize {
        self.events_published.fetch_add(1, Ordering::Relaxed);
        let kind = event.kind;

        match self.sender.send(event) {
            Ok(receivers) => {
                debug!(kind = ?kind, receivers, "事件已发布");
                receivers
            }
            Err(_) => {
                debug!(kind = ?kind, "没有订阅者，事件被丢弃");
                0
            }
        }
    }

    fn events_published(&self) -> u64 {
        self.events_published.load(Ordering::Relaxed)
    }
}

/// 订阅句柄，丢弃即取消订阅
pub struct Subscription {
    receiver: broadcast::Receiver<NotificationEvent>,
    kinds: Vec<EventKind>,
}

impl Subscription {
    /// 接收下一个匹配的事件，总线关闭时返回 `None`
    pub async fn recv(&mut self) -> Option<NotificationEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) if self.matches(&event) => return Some(event),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
                Err(broadcast::error::RecvError::Lagged(count)) => {
                    debug!(lagged = count, "订阅者处理过慢，丢失部分事件");
                }
            }
        }
    }

    /// 非阻塞地取出下一个匹配事件
    pub fn try_recv(&mut self) -> Option<NotificationEvent> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) if self.matches(&event) => return Some(event),
                Ok(_) => continue,
                Err(broadcast::error::TryRecvError::Lagged(count)) => {
                    debug!(lagged = count, "订阅者处理过慢，丢失部分事件");
                }
                Err(_) => return None,
            }
        }
    }

    fn matches(&self, event: &NotificationEvent) -> bool {
        self.kinds.is_empty() || self.kinds.contains(&event.kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_without_subscribers_is_dropped() {
        let notifier = InMemoryNotifier::new();
        let receivers = notifier
            .publish(NotificationEvent::student_purged(Uuid::new_v4(), 2))
            .await;
        assert_eq!(receivers, 0);
        assert_eq!(notifier.events_published(), 1);
    }

    #[tokio::test]
    async fn test_subscription_filters_by_kind() {
        let notifier = InMemoryNotifier::new();
        let mut purges = notifier.subscribe(&[EventKind::StudentPurged]);
        let mut everything = notifier.subscribe(&[]);

        let student = Uuid::new_v4();
        let mut created = NotificationEvent::student_purged(student, 0);
        created.kind = EventKind::SubmissionCreated;
        notifier.publish(created).await;
        notifier.publish(NotificationEvent::student_purged(student, 3)).await;

        let event = purges.recv().await.unwrap();
        assert_eq!(event.kind, EventKind::StudentPurged);
        assert_eq!(event.purged_count, Some(3));
        assert!(purges.try_recv().is_none());

        assert_eq!(everything.recv().await.unwrap().kind, EventKind::SubmissionCreated);
        assert_eq!(everything.recv().await.unwrap().kind, EventKind::StudentPurged);
    }

    #[tokio::test]
    async fn test_late_subscriber_misses_earlier_events() {
        let notifier = InMemoryNotifier::new();
        let _early = notifier.subscribe(&[]);
        notifier.publish(NotificationEvent::student_purged(Uuid::new_v4(), 1)).await;

        let mut late = notifier.subscribe(&[]);
        assert!(late.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_lagging_subscriber_skips_dropped_events() {
        let notifier = InMemoryNotifier::with_capacity(2);
        let mut slow = notifier.subscribe(&[]);
        for count in 0..5 {
            notifier.publish(NotificationEvent::student_purged(Uuid::new_v4(), count)).await;
        }

        assert_eq!(slow.try_recv().unwrap().purged_count, Some(3));
        assert_eq!(slow.try_recv().unwrap().purged_count, Some(4));
        assert!(slow.try_recv().is_none());
    }
}
