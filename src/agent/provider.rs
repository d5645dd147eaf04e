use std::future::Future;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::session::conversation::Turn;

// ── Request handed to a generator ─────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct GenerateRequest {
    pub model: String,
    pub system_instruction: Option<String>,
    pub contents: Vec<Turn>,
    pub temperature: Option<f32>,
    pub response_mime_type: Option<&'static str>,
}

/// Anything that turns a request into generated text.
pub trait Generator: Send + Sync {
    fn generate(&self, request: &GenerateRequest) -> impl Future<Output = Result<String>> + Send;
}

// ── Gemini generateContent wire types ─────────────────────────────────────────

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ApiRequest<'a> {
    contents: Vec<ApiContent<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<ApiInstruction<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<ApiGenerationConfig>,
}

#[derive(Serialize)]
struct ApiContent<'a> {
    role: &'static str,
    parts: Vec<ApiPart<'a>>,
}

#[derive(Serialize)]
struct ApiInstruction<'a> {
    parts: Vec<ApiPart<'a>>,
}

#[derive(Serialize)]
struct ApiPart<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ApiGenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<&'static str>,
}

#[derive(Deserialize)]
struct ApiResponse {
    #[serde(default)]
    candidates: Vec<ApiCandidate>,
}

#[derive(Deserialize)]
struct ApiCandidate {
    content: Option<ApiCandidateContent>,
}

#[derive(Deserialize)]
struct ApiCandidateContent {
    #[serde(default)]
    parts: Vec<ApiCandidatePart>,
}

#[derive(Deserialize)]
struct ApiCandidatePart {
    text: Option<String>,
}

// ── HTTP client builder ───────────────────────────────────────────────────────

pub fn build_http_client(config: &Config) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder();

    if let Some(proxy_url) = config.proxy.as_deref() {
        builder = builder.proxy(reqwest::Proxy::all(proxy_url)?);
    }

    if let Some(ms) = config.timeout_ms {
        builder = builder
            .timeout(std::time::Duration::from_millis(ms))
            .connect_timeout(std::time::Duration::from_secs(10));
    }

    builder.build().map_err(Into::into)
}

// ── Gemini provider ───────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct GeminiProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl GeminiProvider {
    pub fn new(client: reqwest::Client, config: &Config) -> Self {
        Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        }
    }

    fn endpoint(&self, model: &str) -> String {
        format!("{}/v1beta/models/{model}:generateContent", self.base_url)
    }
}

impl Generator for GeminiProvider {
    async fn generate(&self, request: &GenerateRequest) -> Result<String> {
        let body = build_request(request);
        tracing::debug!(
            model = %request.model,
            turns = request.contents.len(),
            "sending generateContent request"
        );

        let resp = self
            .client
            .post(self.endpoint(&request.model))
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .context("HTTP request failed")?;

        parse_response(resp).await
    }
}

fn build_request(request: &GenerateRequest) -> ApiRequest<'_> {
    let contents = request
        .contents
        .iter()
        .map(|t| ApiContent {
            role: t.origin.wire_role(),
            parts: vec![ApiPart { text: &t.text }],
        })
        .collect();

    let system_instruction = request.system_instruction.as_deref().map(|text| ApiInstruction {
        parts: vec![ApiPart { text }],
    });

    let generation_config =
        if request.temperature.is_some() || request.response_mime_type.is_some() {
            Some(ApiGenerationConfig {
                temperature: request.temperature,
                response_mime_type: request.response_mime_type,
            })
        } else {
            None
        };

    ApiRequest {
        contents,
        system_instruction,
        generation_config,
    }
}

async fn parse_response(resp: reqwest::Response) -> Result<String> {
    if !resp.status().is_success() {
        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();
        return Err(anyhow!("API error {status}: {text}"));
    }
    let parsed: ApiResponse = resp.json().await.context("failed to parse API response")?;
    Ok(response_text(parsed))
}

/// Concatenated text parts of the first candidate. Empty when there is none.
fn response_text(parsed: ApiResponse) -> String {
    parsed
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|c| {
            c.parts
                .into_iter()
                .filter_map(|p| p.text)
                .collect::<Vec<_>>()
                .join("")
        })
        .unwrap_or_default()
}
