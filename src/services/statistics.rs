//! 统计服务 - 业务能力层
//!
//! 纯函数：输入一组反馈，输出统计快照。没有 I/O，也不关心统计范围，
//! 范围（全部 / 单个学生 / 时间段）由调用方通过 `StatisticsScope` 先行筛选。

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::config::ScaleKind;
use crate::models::Feedback;

/// 分档阈值
///
/// `grade >= high_min` 为高分档，`middle_min <= grade < high_min` 为中间档，其余为低分档
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ThresholdScale {
    pub high_min: u32,
    pub middle_min: u32,
}

impl ThresholdScale {
    /// 10 分制：≥9 / 7–8 / <7
    pub const TEN_POINT: ThresholdScale = ThresholdScale {
        high_min: 9,
        middle_min: 7,
    };

    /// 100 分制：≥90 / 70–89 / <70
    pub const HUNDRED_POINT: ThresholdScale = ThresholdScale {
        high_min: 90,
        middle_min: 70,
    };
}

impl From<ScaleKind> for ThresholdScale {
    fn from(kind: ScaleKind) -> Self {
        match kind {
            ScaleKind::Ten => ThresholdScale::TEN_POINT,
            ScaleKind::Hundred => ThresholdScale::HUNDRED_POINT,
        }
    }
}

/// 各分档的数量
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ThresholdBuckets {
    pub high: usize,
    pub middle: usize,
    pub low: usize,
}

/// 统计快照（每次查询时重新计算，不持久化）
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatisticsSnapshot {
    pub total: usize,
    pub average_grade: f64,
    pub grade_distribution: BTreeMap<u32, usize>,
    /// 按评分时间升序排列的 (时间, 分数)
    pub timeline: Vec<(DateTime<Utc>, u32)>,
    pub problem_frequency: HashMap<String, usize>,
    pub buckets: ThresholdBuckets,
    pub scale: ThresholdScale,
}

impl StatisticsSnapshot {
    /// 出现次数最多的前 `n` 个问题（次数相同按字母序）
    pub fn top_problems(&self, n: usize) -> Vec<(&str, usize)> {
        let mut problems: Vec<(&str, usize)> = self
            .problem_frequency
            .iter()
            .map(|(problem, count)| (problem.as_str(), *count))
            .collect();
        problems.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        problems.truncate(n);
        problems
    }
}

/// 统计范围
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatisticsScope {
    All,
    Student(Uuid),
    /// 评分时间在 `[from, to]` 内，可选限定单个学生
    DateRange {
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        student: Option<Uuid>,
    },
}

impl StatisticsScope {
    pub fn contains(&self, feedback: &Feedback) -> bool {
        match self {
            StatisticsScope::All => true,
            StatisticsScope::Student(id) => feedback.student_id == *id,
            StatisticsScope::DateRange { from, to, student } => {
                feedback.evaluated_at >= *from
                    && feedback.evaluated_at <= *to
                    && student.map_or(true, |id| feedback.student_id == id)
            }
        }
    }

    /// 筛选出范围内的反馈
    pub fn select<'a>(&self, feedback: &'a [Feedback]) -> Vec<&'a Feedback> {
        feedback.iter().filter(|f| self.contains(f)).collect()
    }
}

/// 计算统计快照
///
/// 分数为 0 的反馈代表评分失败，不计入任何统计
pub fn aggregate<'a, I>(feedback: I, scale: ThresholdScale) -> StatisticsSnapshot
where
    I: IntoIterator<Item = &'a Feedback>,
{
    let mut graded: Vec<&Feedback> = feedback.into_iter().filter(|f| f.grade > 0).collect();
    graded.sort_by_key(|f| f.evaluated_at);

    let total = graded.len();
    let average_grade = if total == 0 {
        0.0
    } else {
        let sum: u64 = graded.iter().map(|f| u64::from(f.grade)).sum();
        round_to_cents(sum as f64 / total as f64)
    };

    let mut grade_distribution = BTreeMap::new();
    let mut problem_frequency = HashMap::new();
    let mut buckets = ThresholdBuckets::default();

    for f in &graded {
        *grade_distribution.entry(f.grade).or_insert(0) += 1;
        for problem in &f.identified_problems {
            *problem_frequency.entry(problem.clone()).or_insert(0) += 1;
        }
        if f.grade >= scale.high_min {
            buckets.high += 1;
        } else if f.grade >= scale.middle_min {
            buckets.middle += 1;
        } else {
            buckets.low += 1;
        }
    }

    StatisticsSnapshot {
        total,
        average_grade,
        grade_distribution,
        timeline: graded.iter().map(|f| (f.evaluated_at, f.grade)).collect(),
        problem_frequency,
        buckets,
        scale,
    }
}

/// 保留两位小数，恰好一半时取偶数（7.125 → 7.12）
fn round_to_cents(value: f64) -> f64 {
    (value * 100.0).round_ties_even() / 100.0
}
