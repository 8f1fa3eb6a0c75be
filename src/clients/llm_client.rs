//! LLM 评分客户端
//!
//! 使用 `async-openai` 调用兼容 OpenAI API 的服务（Groq、Azure、Doubao 等）
use async_openai::{
    config::OpenAIConfig,
    types::chat::{
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use tracing::{debug, warn};

use crate::clients::{GradingPrompt, GradingProvider};
use crate::config::Config;
use crate::error::ProviderError;

/// 评分请求使用较低的温度，减少同一内容多次评分的波动
const GRADING_TEMPERATURE: f32 = 0.2;

/// LLM 客户端
pub struct LlmClient {
    client: Client<OpenAIConfig>,
    model_name: String,
}

impl LlmClient {
    /// 创建新的 LLM 客户端
    pub fn new(config: &Config) -> Self {
        Self::with_model(config, config.llm_model_name.clone())
    }

    /// 创建自定义模型的 LLM 客户端
    pub fn with_model(config: &Config, model_name: impl Into<String>) -> Self {
        let openai_config = OpenAIConfig::new()
            .with_api_key(&config.llm_api_key)
            .with_api_base(&config.llm_api_base_url);

        Self {
            client: Client::with_config(openai_config),
            model_name: model_name.into(),
        }
    }
}

fn request_failed(e: impl std::fmt::Display) -> ProviderError {
    ProviderError::RequestFailed(e.to_string())
}

#[async_trait]
impl GradingProvider for LlmClient {
    async fn complete(&self, prompt: &GradingPrompt) -> Result<String, ProviderError> {
        debug!("调用 LLM API，模型: {}", self.model_name);
        debug!("用户消息长度: {} 字符", prompt.user.len());

        let system_msg = ChatCompletionRequestSystemMessageArgs::default()
            .content(prompt.system.as_str())
            .build()
            .map_err(request_failed)?;
        let user_msg = ChatCompletionRequestUserMessageArgs::default()
            .content(prompt.user.as_str())
            .build()
            .map_err(request_failed)?;

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model_name)
            .messages(vec![
                ChatCompletionRequestMessage::System(system_msg),
                ChatCompletionRequestMessage::User(user_msg),
            ])
            .temperature(GRADING_TEMPERATURE)
            .max_tokens(1024u32)
            .build()
            .map_err(request_failed)?;

        let response = self.client.chat().create(request).await.map_err(|e| {
            warn!("LLM API 调用失败: {}", e);
            request_failed(e)
        })?;

        debug!("LLM API 调用成功");

        let content = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .ok_or(ProviderError::EmptyResponse)?;

        if content.trim().is_empty() {
            return Err(ProviderError::EmptyResponse);
        }

        Ok(content.trim().to_string())
    }

    fn name(&self) -> &str {
        &self.model_name
    }
}
