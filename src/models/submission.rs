use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 提交状态
///
/// 状态机：`Created → Evaluating → {Graded, Rejected}`，
/// 终态只能通过重新评分回到 `Evaluating`。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SubmissionStatus {
    /// 已创建，等待评分
    Created,
    /// 评分中
    Evaluating,
    /// 评分完成（分数 > 0）
    Graded,
    /// 评分失败或被拒绝（分数为 0）
    Rejected,
}

impl SubmissionStatus {
    /// 是否为终态
    pub fn is_terminal(self) -> bool {
        matches!(self, SubmissionStatus::Graded | SubmissionStatus::Rejected)
    }

    /// 判断是否允许迁移到目标状态
    ///
    /// `Created` 可以直接进入终态，对同步调用方来说 `Created` 和 `Evaluating` 等价。
    pub fn can_transition_to(self, next: SubmissionStatus) -> bool {
        use SubmissionStatus::*;
        matches!(
            (self, next),
            (Created, Evaluating)
                | (Created, Graded)
                | (Created, Rejected)
                | (Evaluating, Graded)
                | (Evaluating, Rejected)
                | (Graded, Evaluating)
                | (Rejected, Evaluating)
        )
    }

    /// 根据分数决定终态
    pub fn for_grade(grade: u32) -> Self {
        if grade > 0 {
            SubmissionStatus::Graded
        } else {
            SubmissionStatus::Rejected
        }
    }
}

impl fmt::Display for SubmissionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SubmissionStatus::Created => "Created",
            SubmissionStatus::Evaluating => "Evaluating",
            SubmissionStatus::Graded => "Graded",
            SubmissionStatus::Rejected => "Rejected",
        };
        f.write_str(name)
    }
}

/// 预估处理时间档位：(字符数上限, 秒数)
const DURATION_TIERS: [(usize, u64); 3] = [(1_000, 60), (5_000, 180), (10_000, 300)];

/// 超出所有档位时的预估处理时间
const LONGEST_TIER_SECS: u64 = 600;

/// 根据内容长度估算评分所需时间
///
/// 按字符数（而不是字节数）分档，结果随长度单调不减。
pub fn estimate_processing_time(content: &str) -> Duration {
    let chars = content.chars().count();
    let secs = DURATION_TIERS
        .iter()
        .find(|(limit, _)| chars <= *limit)
        .map(|(_, secs)| *secs)
        .unwrap_or(LONGEST_TIER_SECS);
    Duration::from_secs(secs)
}

/// 学生提交的作业
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Submission {
    pub id: Uuid,
    pub student_id: Uuid,
    pub student_name: String,
    pub title: String,
    pub content: String,
    pub submitted_at: DateTime<Utc>,
    pub status: SubmissionStatus,
    /// 预估处理时间（秒）
    pub estimated_secs: u64,
}

impl Submission {
    /// 根据提交请求创建新的提交记录，状态为 `Created`
    pub fn new(request: &SubmitRequest) -> Self {
        Self {
            id: Uuid::new_v4(),
            student_id: request.student_id,
            student_name: request.student_name.trim().to_string(),
            title: request.title.trim().to_string(),
            content: request.content.clone(),
            submitted_at: Utc::now(),
            status: SubmissionStatus::Created,
            estimated_secs: estimate_processing_time(&request.content).as_secs(),
        }
    }

    pub fn estimated_duration(&self) -> Duration {
        Duration::from_secs(self.estimated_secs)
    }
}

/// 提交请求
///
/// 也是收件箱中 TOML 文件的格式
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitRequest {
    pub student_id: Uuid,
    #[serde(default)]
    pub student_name: String,
    pub title: String,
    pub content: String,
}

impl SubmitRequest {
    pub fn new(
        student_id: Uuid,
        student_name: impl Into<String>,
        title: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            student_id,
            student_name: student_name.into(),
            title: title.into(),
            content: content.into(),
        }
    }
}
