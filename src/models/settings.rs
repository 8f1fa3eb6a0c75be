use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// 评分约束
///
/// 由管理员设置，每次评分时读取
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GradingConstraints {
    pub min_grade: u32,
    pub max_grade: u32,
    /// 分析方法/评分标准，例如 grammar、code-style
    #[serde(default)]
    pub criteria: Vec<String>,
}

impl Default for GradingConstraints {
    fn default() -> Self {
        Self {
            min_grade: 1,
            max_grade: 10,
            criteria: Vec::new(),
        }
    }
}

impl GradingConstraints {
    /// 创建并校验评分约束（要求 min < max）
    pub fn new(min_grade: u32, max_grade: u32, criteria: Vec<String>) -> Result<Self, ValidationError> {
        let constraints = Self {
            min_grade,
            max_grade,
            criteria,
        };
        constraints.validate()?;
        Ok(constraints)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.min_grade >= self.max_grade {
            return Err(ValidationError::InvalidGradeRange {
                min: self.min_grade,
                max: self.max_grade,
            });
        }
        Ok(())
    }

    /// 将分数裁剪到 `[min_grade, max_grade]`
    pub fn clamp(&self, grade: i64) -> u32 {
        grade.clamp(i64::from(self.min_grade), i64::from(self.max_grade)) as u32
    }
}

/// 系统设置记录
///
/// 单条带版本号的配置记录，存放在复制状态的 settings 中
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct SettingsRecord {
    pub version: u64,
    pub constraints: GradingConstraints,
    /// 每个学生的最大提交数量，`None` 表示不限制
    #[serde(default)]
    pub max_submissions_per_student: Option<u32>,
}
