//! 评分服务 - 业务能力层
//!
//! 只负责"给一段内容打分"能力，不关心提交的状态和存储。
//!
//! ## 防御性处理
//! - 调用评分服务有超时限制
//! - 回复必须是严格的 JSON，字段缺失或类型错误都视为失败
//! - 任何失败都返回固定的兜底结果（0 分），不向调用方抛出错误
//! - 成功时分数一律裁剪到管理员设置的区间内

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use regex::Regex;
use serde_json::Value;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::clients::{GradingPrompt, GradingProvider};
use crate::error::ProviderError;
use crate::models::{Analysis, GradingConstraints};

const SYSTEM_MESSAGE: &str =
    "You are an educational assistant that analyzes student submissions and gives structured JSON feedback.";

const FIELD_GRADE: &str = "Grade";
const FIELD_PROBLEMS: &str = "IdentifiedErrors";
const FIELD_SUGGESTIONS: &str = "ImprovementSuggestions";
const FIELD_RECOMMENDATIONS: &str = "FurtherRecommendations";

/// 评分服务
pub struct EvaluationService {
    provider: Arc<dyn GradingProvider>,
    timeout: Duration,
}

impl EvaluationService {
    pub fn new(provider: Arc<dyn GradingProvider>, timeout: Duration) -> Self {
        Self { provider, timeout }
    }

    /// 对内容评分
    ///
    /// # 参数
    /// - `content`: 提交内容
    /// - `instructions`: 额外说明（重新评分时由评审人提供）
    /// - `constraints`: 当前的评分约束
    ///
    /// # 返回
    /// 总是返回一个完整的分析结果，失败时为兜底结果
    pub async fn evaluate(
        &self,
        content: &str,
        instructions: Option<&str>,
        constraints: &GradingConstraints,
    ) -> Analysis {
        let prompt = build_grading_prompt(content, instructions, constraints);

        match self.try_evaluate(&prompt, constraints).await {
            Ok(analysis) => {
                info!("✓ 评分完成 ({})，分数: {}", self.provider.name(), analysis.grade);
                analysis
            }
            Err(e) => {
                warn!("⚠️ 评分失败 ({})，使用兜底结果: {}", self.provider.name(), e);
                Analysis::fallback()
            }
        }
    }

    async fn try_evaluate(
        &self,
        prompt: &GradingPrompt,
        constraints: &GradingConstraints,
    ) -> Result<Analysis, ProviderError> {
        let raw = timeout(self.timeout, self.provider.complete(prompt))
            .await
            .map_err(|_| ProviderError::Timeout(self.timeout))??;

        debug!("评分服务原始回复长度: {} 字符", raw.len());
        parse_analysis(&raw, constraints)
    }
}

/// 构建评分提示词
pub fn build_grading_prompt(
    content: &str,
    instructions: Option<&str>,
    constraints: &GradingConstraints,
) -> GradingPrompt {
    let range_text = format!(
        "Grade MUST be an int in the range [{}-{}].",
        constraints.min_grade, constraints.max_grade
    );

    let criteria_text = if constraints.criteria.is_empty() {
        "Use your default best-practice analysis for the given content.".to_string()
    } else {
        format!(
            "Use the following analysis methods/criteria (adapt as applicable): {}.",
            constraints.criteria.join(", ")
        )
    };

    let instructions_text = match instructions.map(str::trim) {
        Some(extra) if !extra.is_empty() => format!(" Additional instructions: {}", extra),
        _ => String::new(),
    };

    let user = format!(
        r#"Respond ONLY with valid JSON.
DO NOT include any text before or after the JSON.
DO NOT wrap in code fences.
The JSON MUST contain EXACTLY these fields:
- {FIELD_GRADE} (int)
- {FIELD_PROBLEMS} (list of strings)
- {FIELD_SUGGESTIONS} (list of strings)
- {FIELD_RECOMMENDATIONS} (list of strings)
{range_text}
{criteria_text}{instructions_text}

Analyze the following educational work:
{content}"#
    );

    GradingPrompt {
        system: SYSTEM_MESSAGE.to_string(),
        user,
    }
}

fn code_fence() -> &'static Regex {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    FENCE.get_or_init(|| {
        Regex::new(r"(?s)^```[a-zA-Z]*\s*(.*?)\s*```$").expect("代码块正则必须合法")
    })
}

/// 去掉模型有时仍会加上的 ``` 代码块包裹
fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    match code_fence().captures(trimmed).and_then(|c| c.get(1)) {
        Some(inner) => inner.as_str(),
        None => trimmed,
    }
}

/// 解析评分服务的回复，并把分数裁剪到约束区间
pub fn parse_analysis(raw: &str, constraints: &GradingConstraints) -> Result<Analysis, ProviderError> {
    let cleaned = strip_code_fences(raw);
    if cleaned.is_empty() {
        return Err(ProviderError::EmptyResponse);
    }

    let value: Value =
        serde_json::from_str(cleaned).map_err(|e| ProviderError::MalformedJson(e.to_string()))?;
    let object = value
        .as_object()
        .ok_or_else(|| ProviderError::MalformedJson("顶层不是 JSON 对象".to_string()))?;

    let grade = object
        .get(FIELD_GRADE)
        .and_then(Value::as_i64)
        .ok_or_else(|| ProviderError::InvalidField(FIELD_GRADE.to_string()))?;

    let string_list = |field: &str| -> Result<Vec<String>, ProviderError> {
        let invalid = || ProviderError::InvalidField(field.to_string());
        object
            .get(field)
            .and_then(Value::as_array)
            .ok_or_else(invalid)?
            .iter()
            .map(|item| item.as_str().map(str::to_string).ok_or_else(invalid))
            .collect()
    };

    Ok(Analysis {
        grade: constraints.clamp(grade),
        identified_problems: string_list(FIELD_PROBLEMS)?,
        improvement_suggestions: string_list(FIELD_SUGGESTIONS)?,
        further_recommendations: string_list(FIELD_RECOMMENDATIONS)?,
    })
}
