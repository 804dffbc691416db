use crate::config::Settings;
use crate::llm::error::LlmDiagnosticsError;
use crate::llm::{DeviationContext, NarrativeGenerator, Provider};
use anyhow::Context;
use reqwest::header::{HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const DEFAULT_MODEL: &str = "claude-3-5-sonnet-latest";
const DEFAULT_MAX_TOKENS: u32 = 600;
const DEFAULT_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Clone)]
pub struct AnthropicClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    max_tokens: u32,
}

impl AnthropicClient {
    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let api_key = settings.require_anthropic_api_key()?.to_string();
        let base_url =
            std::env::var("ANTHROPIC_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        let model = std::env::var("ANTHROPIC_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());
        let max_tokens = std::env::var("ANTHROPIC_MAX_TOKENS")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(DEFAULT_MAX_TOKENS);

        let timeout_secs = std::env::var("ANTHROPIC_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("failed to build reqwest client")?;

        Ok(Self {
            http,
            api_key,
            base_url,
            model,
            max_tokens,
        })
    }

    async fn create_message(&self, req: CreateMessageRequest) -> anyhow::Result<CreateMessageResponse> {
        let mut headers = HeaderMap::new();
        headers.insert("x-api-key", HeaderValue::from_str(&self.api_key)?);
        headers.insert(
            "anthropic-version",
            HeaderValue::from_static(ANTHROPIC_VERSION),
        );

        let url = format!("{}/v1/messages", self.base_url.trim_end_matches('/'));
        let res = self
            .http
            .post(url)
            .headers(headers)
            .json(&req)
            .send()
            .await
            .context("Anthropic request failed")?;

        let status = res.status();
        let text = res
            .text()
            .await
            .context("failed to read Anthropic response body")?;
        if !status.is_success() {
            return Err(http_error(status, text));
        }

        serde_json::from_str::<CreateMessageResponse>(&text)
            .with_context(|| format!("failed to decode Anthropic response: {text}"))
    }

    fn system_prompt() -> String {
        [
            "Sos un analista de expensas de consorcios en Argentina.",
            "Explicás en español rioplatense, en 3 a 5 oraciones, por qué las expensas de un edificio",
            "crecieron más o menos que la inflación y que el promedio de edificios comparables.",
            "Usá solo los datos provistos. Todos los porcentajes son variación acumulada desde el",
            "primer período del usuario. No inventes montos. No uses markdown.",
        ]
        .join("\n")
    }

    fn user_prompt(ctx: &DeviationContext) -> anyhow::Result<String> {
        let data = serde_json::to_string_pretty(ctx).context("failed to serialize deviation context")?;
        Ok(format!(
            "Datos del análisis (JSON):\n{data}\n\n\
             Explicá la desviación respecto de la inflación y del mercado. \
             Si la desviación no es significativa, decilo brevemente."
        ))
    }

    fn response_text(res: &CreateMessageResponse) -> String {
        let mut out = String::new();
        for block in &res.content {
            if let ContentBlock::Text { text } = block {
                if !out.is_empty() {
                    out.push('\n');
                }
                out.push_str(text);
            }
        }
        out
    }
}

#[async_trait::async_trait]
impl NarrativeGenerator for AnthropicClient {
    fn provider(&self) -> Provider {
        Provider::Anthropic
    }

    async fn explain_deviation(&self, ctx: &DeviationContext) -> anyhow::Result<String> {
        let req = CreateMessageRequest {
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            system: Some(Self::system_prompt()),
            messages: vec![Message {
                role: "user",
                content: Self::user_prompt(ctx)?,
            }],
        };

        let res = self.create_message(req).await?;
        let text = Self::response_text(&res);
        let text = text.trim();
        if text.is_empty() {
            return Err(LlmDiagnosticsError {
                provider: Provider::Anthropic,
                stage: "empty_output",
                status: None,
                detail: format!("stop_reason={:?}", res.stop_reason),
                raw_output: None,
                raw_response_json: None,
            }
            .into());
        }

        Ok(text.to_string())
    }
}

/// Non-2xx reply. Keeps the status so callers can tell throttling apart from other failures.
fn http_error(status: reqwest::StatusCode, text: String) -> anyhow::Error {
    let raw_response_json = serde_json::from_str::<serde_json::Value>(&text).ok();
    LlmDiagnosticsError {
        provider: Provider::Anthropic,
        stage: "http",
        status: Some(status.as_u16()),
        detail: format!("status={status}"),
        raw_output: Some(text),
        raw_response_json,
    }
    .into()
}

#[derive(Debug, Clone, Serialize)]
struct CreateMessageRequest {
    model: String,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<Message>,
}

#[derive(Debug, Clone, Serialize)]
struct Message {
    role: &'static str,
    content: String,
}

#[derive(Debug, Clone, Deserialize)]
struct CreateMessageResponse {
    content: Vec<ContentBlock>,

    #[serde(default)]
    stop_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },

    #[serde(other)]
    Unknown,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::trend::{Deviations, TrendPercent};
    use crate::llm::error::is_rate_limited;
    use serde_json::json;

    #[test]
    fn joins_text_blocks_and_skips_others() {
        let res: CreateMessageResponse = serde_json::from_value(json!({
            "content": [
                {"type": "text", "text": "Primera."},
                {"type": "thinking", "thinking": "...", "signature": "x"},
                {"type": "text", "text": "Segunda."}
            ],
            "stop_reason": "end_turn"
        }))
        .unwrap();
        assert_eq!(AnthropicClient::response_text(&res), "Primera.\nSegunda.");
    }

    #[test]
    fn throttled_reply_is_reported_as_rate_limit() {
        let body = r#"{"type":"error","error":{"type":"rate_limit_error","message":"slow down"}}"#;
        let err = http_error(reqwest::StatusCode::TOO_MANY_REQUESTS, body.to_string());
        assert!(is_rate_limited(&err));

        let diag = err.downcast_ref::<LlmDiagnosticsError>().unwrap();
        assert_eq!(diag.status, Some(429));
        assert_eq!(diag.stage, "http");
        assert_eq!(
            diag.raw_response_json.as_ref().map(|v| v["error"]["type"].clone()),
            Some(json!("rate_limit_error"))
        );
    }

    #[test]
    fn server_errors_are_not_rate_limits() {
        let err = http_error(reqwest::StatusCode::INTERNAL_SERVER_ERROR, "oops".to_string());
        assert!(!is_rate_limited(&err));
        let diag = err.downcast_ref::<LlmDiagnosticsError>().unwrap();
        assert_eq!(diag.raw_response_json, None);
    }

    #[test]
    fn user_prompt_embeds_context_json() {
        let ctx = DeviationContext {
            building_name: Some("Edificio Central".to_string()),
            user_trend: vec![TrendPercent {
                period: "2024-02".to_string(),
                percent: 20.0,
            }],
            inflation_trend: vec![],
            buildings_trend: vec![],
            deviations: Deviations {
                from_inflation: Some(10.0),
                from_buildings: None,
                is_significant: true,
            },
        };
        let prompt = AnthropicClient::user_prompt(&ctx).unwrap();
        assert!(prompt.contains("\"buildingName\": \"Edificio Central\""));
        assert!(prompt.contains("\"isSignificant\": true"));
    }
}
