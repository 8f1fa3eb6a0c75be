use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;
use crate::models::GradingConstraints;

/// 默认配置文件路径
pub const DEFAULT_CONFIG_FILE: &str = "grading.toml";

/// 评分服务类型
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// 兼容 OpenAI API 的服务
    OpenAi,
    /// 本地 Ollama
    Ollama,
}

impl FromStr for ProviderKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(ProviderKind::OpenAi),
            "ollama" => Ok(ProviderKind::Ollama),
            _ => Err(()),
        }
    }
}

/// 统计分档刻度
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScaleKind {
    /// ≥9 / 7–8 / <7
    Ten,
    /// ≥90 / 70–89 / <70
    Hundred,
}

impl FromStr for ScaleKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ten" | "10" => Ok(ScaleKind::Ten),
            "hundred" | "100" => Ok(ScaleKind::Hundred),
            _ => Err(()),
        }
    }
}

/// 程序配置
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// 同时评分的提交数量
    pub max_concurrent_submissions: usize,
    /// 持久化存储目录
    pub data_dir: String,
    /// 待处理提交（TOML）存放目录
    pub inbox_folder: String,
    /// 从副本数量
    pub replica_count: usize,
    /// 是否显示详细日志
    pub verbose_logging: bool,
    /// 统计分档刻度
    pub stats_scale: ScaleKind,
    // --- 评分服务配置 ---
    pub provider: ProviderKind,
    /// 单次评分调用的超时时间（秒）
    pub provider_timeout_secs: u64,
    pub llm_api_key: String,
    pub llm_api_base_url: String,
    pub llm_model_name: String,
    pub ollama_base_url: String,
    pub ollama_model_name: String,
    // --- 管理员设置的初始值 ---
    /// 首次启动时写入复制状态的评分约束
    pub grading: GradingConstraints,
    /// 每个学生的最大提交数量
    pub max_submissions_per_student: Option<u32>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_concurrent_submissions: 4,
            data_dir: "data".to_string(),
            inbox_folder: "inbox".to_string(),
            replica_count: 2,
            verbose_logging: false,
            stats_scale: ScaleKind::Ten,
            provider: ProviderKind::OpenAi,
            provider_timeout_secs: 60,
            llm_api_key: String::new(),
            llm_api_base_url: "https://api.groq.com/openai/v1".to_string(),
            llm_model_name: "meta-llama/llama-4-scout-17b-16e-instruct".to_string(),
            ollama_base_url: "http://localhost:11434".to_string(),
            ollama_model_name: "gemma:2b".to_string(),
            grading: GradingConstraints::default(),
            max_submissions_per_student: None,
        }
    }
}

impl Config {
    /// 加载配置：默认值 → 配置文件（`GRADING_CONFIG` 或 `grading.toml`，可选）→ 环境变量
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var("GRADING_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
        let base = if Path::new(&path).exists() {
            Self::from_file(&path)?
        } else {
            Self::default()
        };
        base.with_env_overrides()
    }

    /// 从 TOML 文件读取配置，缺省字段使用默认值
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::FileReadFailed {
            path: path.to_string(),
            source,
        })?;
        Self::from_toml_str(&content, path)
    }

    fn from_toml_str(content: &str, path: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|source| ConfigError::TomlParseFailed {
            path: path.to_string(),
            source,
        })
    }

    /// 使用环境变量覆盖配置
    pub fn with_env_overrides(self) -> Result<Self, ConfigError> {
        self.with_overrides(|name| std::env::var(name).ok())
    }

    fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        if let Some(v) = parse_var(&lookup, "MAX_CONCURRENT_SUBMISSIONS", "usize")? {
            self.max_concurrent_submissions = v;
        }
        if let Some(v) = lookup("DATA_DIR") {
            self.data_dir = v;
        }
        if let Some(v) = lookup("INBOX_FOLDER") {
            self.inbox_folder = v;
        }
        if let Some(v) = parse_var(&lookup, "REPLICA_COUNT", "usize")? {
            self.replica_count = v;
        }
        if let Some(v) = parse_var(&lookup, "VERBOSE_LOGGING", "bool")? {
            self.verbose_logging = v;
        }
        if let Some(v) = parse_var(&lookup, "STATS_SCALE", "ten|hundred")? {
            self.stats_scale = v;
        }
        if let Some(v) = parse_var(&lookup, "GRADING_PROVIDER", "openai|ollama")? {
            self.provider = v;
        }
        if let Some(v) = parse_var(&lookup, "PROVIDER_TIMEOUT_SECS", "u64")? {
            self.provider_timeout_secs = v;
        }
        if let Some(v) = lookup("LLM_API_KEY") {
            self.llm_api_key = v;
        }
        if let Some(v) = lookup("LLM_API_BASE_URL") {
            self.llm_api_base_url = v;
        }
        if let Some(v) = lookup("LLM_MODEL_NAME") {
            self.llm_model_name = v;
        }
        if let Some(v) = lookup("OLLAMA_BASE_URL") {
            self.ollama_base_url = v;
        }
        if let Some(v) = lookup("OLLAMA_MODEL_NAME") {
            self.ollama_model_name = v;
        }
        if let Some(v) = parse_var(&lookup, "MIN_GRADE", "u32")? {
            self.grading.min_grade = v;
        }
        if let Some(v) = parse_var(&lookup, "MAX_GRADE", "u32")? {
            self.grading.max_grade = v;
        }
        if let Some(v) = parse_var(&lookup, "MAX_SUBMISSIONS_PER_STUDENT", "u32")? {
            self.max_submissions_per_student = Some(v);
        }
        Ok(self)
    }

    pub fn provider_timeout(&self) -> Duration {
        Duration::from_secs(self.provider_timeout_secs)
    }
}

fn parse_var<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    var_name: &str,
    expected_type: &str,
) -> Result<Option<T>, ConfigError> {
    match lookup(var_name) {
        None => Ok(None),
        Some(value) => value
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::EnvVarParseFailed {
                var_name: var_name.to_string(),
                value,
                expected_type: expected_type.to_string(),
            }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = Config::from_toml_str(
            r#"
provider = "ollama"
max_concurrent_submissions = 8

[grading]
min_grade = 0
max_grade = 100
criteria = ["grammar", "code-style"]
"#,
            "inline",
        )
        .unwrap();

        assert_eq!(config.provider, ProviderKind::Ollama);
        assert_eq!(config.max_concurrent_submissions, 8);
        assert_eq!(config.grading.max_grade, 100);
        assert_eq!(config.grading.criteria.len(), 2);
        assert_eq!(config.data_dir, "data");
        assert_eq!(config.stats_scale, ScaleKind::Ten);
    }

    #[test]
    fn test_env_overrides() {
        let config = Config::default()
            .with_overrides(lookup_from(&[
                ("GRADING_PROVIDER", "ollama"),
                ("STATS_SCALE", "hundred"),
                ("MAX_GRADE", "100"),
                ("MAX_SUBMISSIONS_PER_STUDENT", "3"),
            ]))
            .unwrap();

        assert_eq!(config.provider, ProviderKind::Ollama);
        assert_eq!(config.stats_scale, ScaleKind::Hundred);
        assert_eq!(config.grading.max_grade, 100);
        assert_eq!(config.max_submissions_per_student, Some(3));
    }

    #[test]
    fn test_bad_env_value_is_error() {
        let err = Config::default()
            .with_overrides(lookup_from(&[("REPLICA_COUNT", "many")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::EnvVarParseFailed { ref var_name, .. } if var_name == "REPLICA_COUNT"));
    }

    #[test]
    fn test_invalid_toml_is_error() {
        assert!(matches!(
            Config::from_toml_str("provider = 3", "inline"),
            Err(ConfigError::TomlParseFailed { .. })
        ));
    }
}
