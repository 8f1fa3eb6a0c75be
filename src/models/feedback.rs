use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::Submission;

/// 评分服务返回的分析结果（已经过校验和分数裁剪）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Analysis {
    pub grade: u32,
    pub identified_problems: Vec<String>,
    pub improvement_suggestions: Vec<String>,
    pub further_recommendations: Vec<String>,
}

impl Analysis {
    /// 评分失败时使用的固定兜底结果
    pub fn fallback() -> Self {
        Self {
            grade: 0,
            identified_problems: vec!["Analysis failed.".to_string()],
            improvement_suggestions: vec!["Try again later.".to_string()],
            further_recommendations: vec![
                "Please consult a professor or teaching assistant for manual review.".to_string(),
            ],
        }
    }

    pub fn is_fallback(&self) -> bool {
        *self == Self::fallback()
    }
}

/// 评分反馈
///
/// 与提交一一对应，以提交ID为键。重新评分会整体替换，
/// 但 `reviewer_comment` 需要从旧反馈中继承。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feedback {
    pub submission_id: Uuid,
    pub student_id: Uuid,
    pub student_name: String,
    pub title: String,
    pub grade: u32,
    pub identified_problems: Vec<String>,
    pub improvement_suggestions: Vec<String>,
    pub further_recommendations: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reviewer_comment: Option<String>,
    pub evaluated_at: DateTime<Utc>,
}

impl Feedback {
    /// 将分析结果绑定到提交上
    pub fn from_analysis(submission: &Submission, analysis: Analysis) -> Self {
        Self {
            submission_id: submission.id,
            student_id: submission.student_id,
            student_name: submission.student_name.clone(),
            title: submission.title.clone(),
            grade: analysis.grade,
            identified_problems: analysis.identified_problems,
            improvement_suggestions: analysis.improvement_suggestions,
            further_recommendations: analysis.further_recommendations,
            reviewer_comment: None,
            evaluated_at: Utc::now(),
        }
    }
}
