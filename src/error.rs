use std::time::Duration;

use thiserror::Error;
use uuid::Uuid;

use crate::models::SubmissionStatus;

/// 应用程序错误类型
#[derive(Debug, Error)]
pub enum AppError {
    /// 输入校验错误（不会修改任何状态）
    #[error("校验错误: {0}")]
    Validation(#[from] ValidationError),
    /// 持久化存储错误
    #[error("存储错误: {0}")]
    Store(#[from] StoreError),
    /// 复制状态错误
    #[error("复制状态错误: {0}")]
    Replica(#[from] ReplicaError),
    /// 评分服务错误
    #[error("评分服务错误: {0}")]
    Provider(#[from] ProviderError),
    /// 配置错误
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),
}

/// 输入校验错误
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// 标题为空
    #[error("标题不能为空")]
    EmptyTitle,
    /// 内容为空
    #[error("提交内容不能为空")]
    EmptyContent,
    /// 学生ID无效
    #[error("无效的学生ID")]
    InvalidStudentId,
    /// 超出每个学生的提交上限
    #[error("学生 {student_id} 已达到提交上限 ({limit})")]
    SubmissionLimitReached { student_id: Uuid, limit: u32 },
    /// 分数区间无效
    #[error("无效的分数区间 [{min}, {max}]")]
    InvalidGradeRange { min: u32, max: u32 },
    /// 提交不存在
    #[error("提交不存在: {0}")]
    UnknownSubmission(Uuid),
    /// 非法的状态迁移
    #[error("非法的状态迁移: {from} -> {to}")]
    IllegalTransition {
        from: SubmissionStatus,
        to: SubmissionStatus,
    },
}

/// 持久化存储错误
#[derive(Debug, Error)]
pub enum StoreError {
    /// 读写文件失败
    #[error("文件操作失败 ({path}): {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    /// 文档序列化失败
    #[error("文档序列化失败: {0}")]
    Serialization(#[from] serde_json::Error),
    /// 文档已存在
    #[error("文档已存在: {0}")]
    Duplicate(Uuid),
    /// 文档不存在
    #[error("文档不存在: {0}")]
    NotFound(Uuid),
    /// 存储不可用
    #[error("存储不可用: {0}")]
    Unavailable(String),
}

/// 复制状态错误
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ReplicaError {
    /// 当前副本不是主副本，不接受写入
    #[error("当前副本不是主副本，拒绝写入")]
    NotPrimary,
    /// 事务开始后状态已被整体重建
    #[error("事务已过期: 开始于第 {expected} 代，当前为第 {found} 代")]
    StaleGeneration { expected: u64, found: u64 },
}

/// 评分服务错误
///
/// 这些错误永远不会传递给提交方，而是统一转换为兜底反馈
#[derive(Debug, Error)]
pub enum ProviderError {
    /// 调用超时
    #[error("评分服务调用超时 ({0:?})")]
    Timeout(Duration),
    /// 网络请求失败
    #[error("评分服务请求失败: {0}")]
    RequestFailed(String),
    /// 返回非成功状态码
    #[error("评分服务返回错误状态: {0}")]
    BadStatus(u16),
    /// 返回内容为空
    #[error("评分服务返回内容为空")]
    EmptyResponse,
    /// JSON 解析失败
    #[error("无法解析评分结果: {0}")]
    MalformedJson(String),
    /// 缺少必需字段或字段类型错误
    #[error("评分结果缺少字段或类型错误: {0}")]
    InvalidField(String),
}

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    /// 环境变量解析失败
    #[error("环境变量 {var_name} 解析失败: 值 '{value}' 无法转换为 {expected_type}")]
    EnvVarParseFailed {
        var_name: String,
        value: String,
        expected_type: String,
    },
    /// 读取配置文件失败
    #[error("读取配置文件失败 ({path}): {source}")]
    FileReadFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },
    /// TOML 解析失败
    #[error("TOML解析失败 ({path}): {source}")]
    TomlParseFailed {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}

// ========== 便捷构造函数 ==========

impl AppError {
    /// 创建提交不存在错误
    pub fn unknown_submission(id: Uuid) -> Self {
        AppError::Validation(ValidationError::UnknownSubmission(id))
    }

    /// 创建非法状态迁移错误
    pub fn illegal_transition(from: SubmissionStatus, to: SubmissionStatus) -> Self {
        AppError::Validation(ValidationError::IllegalTransition { from, to })
    }

    /// 是否为校验类错误
    pub fn is_validation(&self) -> bool {
        matches!(self, AppError::Validation(_))
    }
}

impl StoreError {
    /// 创建文件操作错误
    pub fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        StoreError::Io {
            path: path.into(),
            source,
        }
    }
}

// ========== Result 类型别名 ==========

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;
