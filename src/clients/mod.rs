//! 评分服务客户端
//!
//! 评分服务被视为不可信的黑盒：只负责把提示词发出去、把原始文本拿回来，
//! 解析、校验、分数裁剪和兜底都在 `services::evaluation_service` 中完成。

pub mod llm_client;
pub mod ollama_client;

use async_trait::async_trait;

use crate::error::ProviderError;

pub use llm_client::LlmClient;
pub use ollama_client::OllamaClient;

/// 发送给评分服务的提示词
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GradingPrompt {
    pub system: String,
    pub user: String,
}

/// 评分服务接口
#[async_trait]
pub trait GradingProvider: Send + Sync {
    /// 发送提示词，返回评分服务的原始回复文本
    async fn complete(&self, prompt: &GradingPrompt) -> Result<String, ProviderError>;

    /// 用于日志显示的名称
    fn name(&self) -> &str;
}
