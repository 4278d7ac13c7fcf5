//! Gemini `generateContent` client.
//!
//! Speaks the Google Generative Language REST API: a conversation of
//! user/model turns with text parts, optional function declarations, and
//! a reply whose parts mix text segments with function calls.

use async_trait::async_trait;
use relayclaw_core::completion::{CompletionClient, CompletionReply, CompletionRequest};
use relayclaw_core::error::ProviderError;
use relayclaw_core::message::{Message, Role};
use relayclaw_core::tool::{FunctionCall, ToolDeclaration};
use serde::{Deserialize, Serialize};
use serde_json::Map;
use tracing::{debug, warn};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// A Gemini completion client.
#[derive(Debug)]
pub struct GeminiClient {
    api_key: String,
    model: String,
    base_url: String,
    client: reqwest::Client,
}

impl GeminiClient {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            api_key: api_key.into(),
            model: model.into(),
            base_url: DEFAULT_BASE_URL.into(),
            client,
        }
    }

    /// Point the client at a non-default endpoint (tests, proxies).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Convert our Message types to API content turns.
    fn to_api_contents(messages: &[Message]) -> Vec<ApiContent> {
        messages
            .iter()
            .map(|m| ApiContent {
                role: match m.role {
                    Role::User => "user".into(),
                    Role::Model => "model".into(),
                },
                parts: vec![ApiPart {
                    text: Some(m.content.clone()),
                    function_call: None,
                }],
            })
            .collect()
    }

    /// Convert tool declarations to the API's function-declaration format.
    /// Only the sanitized schema travels; the original stays home for
    /// argument filtering.
    fn to_api_tools(tools: &[ToolDeclaration]) -> Vec<ApiTool> {
        if tools.is_empty() {
            return Vec::new();
        }
        vec![ApiTool {
            function_declarations: tools
                .iter()
                .map(|t| ApiFunctionDeclaration {
                    name: t.name.clone(),
                    description: t.description.clone(),
                    parameters: t.parameters.clone(),
                })
                .collect(),
        }]
    }
}

#[async_trait]
impl CompletionClient for GeminiClient {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn generate(
        &self,
        request: CompletionRequest,
    ) -> std::result::Result<CompletionReply, ProviderError> {
        let url = format!(
            "{}/models/{}:generateContent",
            self.base_url, self.model
        );

        let body = ApiRequest {
            contents: Self::to_api_contents(&request.contents),
            tools: Self::to_api_tools(&request.tools),
            generation_config: ApiGenerationConfig {
                temperature: request.temperature,
                max_output_tokens: request.max_output_tokens,
            },
        };

        debug!(
            model = %self.model,
            turns = request.contents.len(),
            tools = request.tools.len(),
            "Sending completion request"
        );

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        let status = response.status().as_u16();

        if status == 401 || status == 403 {
            return Err(ProviderError::AuthenticationFailed(
                "Invalid API key or insufficient permissions".into(),
            ));
        }

        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Completion API returned error");
            return Err(ProviderError::ApiError {
                status_code: status,
                message: error_body,
            });
        }

        let api_response: ApiResponse =
            response.json().await.map_err(|e| ProviderError::ApiError {
                status_code: 200,
                message: format!("Failed to parse response: {e}"),
            })?;

        Ok(parse_reply(api_response))
    }
}

/// Flatten the first candidate's parts into text + function calls.
/// Replies with neither are legal here; the loop's empty-turn policy
/// decides what to do with them.
fn parse_reply(response: ApiResponse) -> CompletionReply {
    let mut reply = CompletionReply::default();

    let Some(candidate) = response.candidates.into_iter().next() else {
        return reply;
    };

    let mut text_segments: Vec<String> = Vec::new();
    for part in candidate.content.parts {
        if let Some(fc) = part.function_call {
            reply.function_calls.push(FunctionCall {
                name: fc.name,
                arguments: fc.args.unwrap_or_default(),
            });
        } else if let Some(text) = part.text {
            if !text.is_empty() {
                text_segments.push(text);
            }
        }
    }

    if !text_segments.is_empty() {
        reply.text = Some(text_segments.join(""));
    }

    reply
}

// --- Gemini API types (internal) ---

#[derive(Debug, Serialize)]
struct ApiRequest {
    contents: Vec<ApiContent>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<ApiTool>,
    #[serde(rename = "generationConfig")]
    generation_config: ApiGenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiContent {
    role: String,
    parts: Vec<ApiPart>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiPart {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(rename = "functionCall", skip_serializing_if = "Option::is_none")]
    function_call: Option<ApiFunctionCall>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiFunctionCall {
    name: String,
    #[serde(default)]
    args: Option<Map<String, serde_json::Value>>,
}

#[derive(Debug, Serialize)]
struct ApiTool {
    #[serde(rename = "functionDeclarations")]
    function_declarations: Vec<ApiFunctionDeclaration>,
}

#[derive(Debug, Serialize)]
struct ApiFunctionDeclaration {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Debug, Serialize)]
struct ApiGenerationConfig {
    temperature: f32,
    #[serde(rename = "maxOutputTokens")]
    max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    candidates: Vec<ApiCandidate>,
}

#[derive(Debug, Deserialize)]
struct ApiCandidate {
    content: ApiCandidateContent,
}

#[derive(Debug, Deserialize)]
struct ApiCandidateContent {
    #[serde(default)]
    parts: Vec<ApiPart>,
}
