use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use tracing::warn;

/// External semantic judgment service.
///
/// Returns the raw response text. Callers decode the verdict themselves,
/// since providers do not always honour the requested structure.
#[async_trait]
pub trait SemanticJudge: Send + Sync {
    async fn judge(&self, profile: &str, title: &str) -> Result<String>;
}

const OPENAI_URL: &str = "https://api.openai.com/v1/chat/completions";
const MAX_ATTEMPTS: u32 = 3;

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<Message>,
    tools: serde_json::Value,
    tool_choice: serde_json::Value,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize, Deserialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ToolCall>>,
}

#[derive(Deserialize)]
struct ToolCall {
    function: FunctionCall,
}

#[derive(Deserialize)]
struct FunctionCall {
    arguments: String,
}

pub struct OpenAiJudge {
    client: Client,
    api_key: String,
    model: String,
}

impl OpenAiJudge {
    pub fn new(api_key: String, model: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            api_key,
            model,
        })
    }

    fn system_prompt(profile: &str) -> String {
        format!(
            "You are a Job-Offer Analyst. \
             Return JSON: {{\"match\": true/false}} based on whether the job title fits the CV.\n\
             CV SUMMARY:\n{}",
            profile
        )
    }

    async fn try_judge(&self, profile: &str, title: &str) -> Result<String> {
        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                Message {
                    role: "system".to_string(),
                    content: Self::system_prompt(profile),
                },
                Message {
                    role: "user".to_string(),
                    content: format!("Job title: {}", title),
                },
            ],
            tools: json!([{
                "type": "function",
                "function": {
                    "name": "set_match",
                    "parameters": {
                        "type": "object",
                        "properties": {"match": {"type": "boolean"}},
                        "required": ["match"]
                    }
                }
            }]),
            tool_choice: json!({"type": "function", "function": {"name": "set_match"}}),
            temperature: 0.0,
            max_tokens: 16,
        };

        let response = self
            .client
            .post(OPENAI_URL)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .context("Failed to send request to OpenAI API")?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| String::from("unknown error"));
            anyhow::bail!("OpenAI API error {}: {}", status, error_text);
        }

        let chat = response
            .json::<ChatResponse>()
            .await
            .context("Failed to parse OpenAI API response")?;

        let message = chat
            .choices
            .into_iter()
            .next()
            .map(|c| c.message)
            .context("OpenAI response contained no choices")?;

        Ok(message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .next()
            .map(|call| call.function.arguments)
            .or(message.content)
            .unwrap_or_default())
    }
}

#[async_trait]
impl SemanticJudge for OpenAiJudge {
    async fn judge(&self, profile: &str, title: &str) -> Result<String> {
        let mut attempt = 0;
        loop {
            match self.try_judge(profile, title).await {
                Ok(raw) => return Ok(raw),
                Err(e) if attempt + 1 < MAX_ATTEMPTS => {
                    let is_rate_limit = e.to_string().contains("429");
                    let backoff = if is_rate_limit {
                        Duration::from_secs(15 * (attempt as u64 + 1))
                    } else {
                        Duration::from_millis(1000 * 2_u64.pow(attempt))
                    };
                    warn!(title, "judge call failed, retrying in {:?}: {:#}", backoff, e);
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
