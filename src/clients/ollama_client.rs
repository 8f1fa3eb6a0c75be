//! Ollama 评分客户端
//!
//! 调用本地 Ollama 的 `/api/generate` 接口（非流式）
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::clients::{GradingPrompt, GradingProvider};
use crate::config::Config;
use crate::error::ProviderError;

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    system: &'a str,
    prompt: &'a str,
    stream: bool,
    format: &'a str,
}

/// Ollama 客户端
pub struct OllamaClient {
    http: reqwest::Client,
    base_url: String,
    model_name: String,
}

impl OllamaClient {
    pub fn new(config: &Config) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: config.ollama_base_url.trim_end_matches('/').to_string(),
            model_name: config.ollama_model_name.clone(),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/api/generate", self.base_url)
    }
}

#[async_trait]
impl GradingProvider for OllamaClient {
    async fn complete(&self, prompt: &GradingPrompt) -> Result<String, ProviderError> {
        let endpoint = self.endpoint();
        debug!("调用 Ollama API: {}，模型: {}", endpoint, self.model_name);

        let body = GenerateRequest {
            model: &self.model_name,
            system: &prompt.system,
            prompt: &prompt.user,
            stream: false,
            format: "json",
        };

        let response = self
            .http
            .post(&endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                warn!("Ollama 请求失败: {}", e);
                ProviderError::RequestFailed(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::BadStatus(status.as_u16()));
        }

        let text = response
            .text()
            .await
            .map_err(|e| ProviderError::RequestFailed(e.to_string()))?;
        if text.trim().is_empty() {
            return Err(ProviderError::EmptyResponse);
        }

        let envelope: Value =
            serde_json::from_str(&text).map_err(|e| ProviderError::MalformedJson(e.to_string()))?;
        let answer = envelope
            .get("response")
            .and_then(Value::as_str)
            .ok_or_else(|| ProviderError::InvalidField("response".to_string()))?;

        if answer.trim().is_empty() {
            return Err(ProviderError::EmptyResponse);
        }
        Ok(answer.trim().to_string())
    }

    fn name(&self) -> &str {
        &self.model_name
    }
}
