use anyhow::{Context, Result, anyhow};
use serde_json::Value;

use crate::agent::prompt::{build_extraction_prompt, build_system_instruction};
use crate::agent::provider::{GenerateRequest, Generator};
use crate::config::Config;
use crate::session::conversation::Turn;
use crate::session::state::SummaryUpdate;
use crate::types::Stage;

pub const EMPTY_REPLY_FALLBACK: &str =
    "I'm having trouble processing that. Let's try to focus back on the first principles.";
pub const ERROR_REPLY_FALLBACK: &str = "I encountered a constraint (error). Let's recalibrate.";

const JSON_MIME_TYPE: &str = "application/json";

// ── Outcomes ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Generated(String),
    /// Fallback text standing in for a reply the service could not give.
    Degraded {
        text: &'static str,
        cause: DegradeCause,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum DegradeCause {
    EmptyOutput,
    ServiceError(String),
}

impl DegradeCause {
    /// Short text for the exchange audit.
    pub fn describe(&self) -> String {
        match self {
            Self::EmptyOutput => "empty output".to_string(),
            Self::ServiceError(reason) => reason.clone(),
        }
    }
}

impl Reply {
    pub fn text(&self) -> &str {
        match self {
            Self::Generated(text) => text,
            Self::Degraded { text, .. } => text,
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, Self::Degraded { .. })
    }

    fn empty() -> Self {
        Self::Degraded {
            text: EMPTY_REPLY_FALLBACK,
            cause: DegradeCause::EmptyOutput,
        }
    }

    fn failed(reason: String) -> Self {
        Self::Degraded {
            text: ERROR_REPLY_FALLBACK,
            cause: DegradeCause::ServiceError(reason),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Extraction {
    Found(SummaryUpdate),
    Absent(String),
}

// ── Gateway ───────────────────────────────────────────────────────────────────

/// Facade over the generation service: one reply call, one extraction call.
#[derive(Clone)]
pub struct Gateway<G> {
    generator: G,
    reply_model: String,
    summary_model: String,
    temperature: f32,
}

impl<G: Generator> Gateway<G> {
    pub fn new(generator: G, config: &Config) -> Self {
        Self {
            generator,
            reply_model: config.reply_model.clone(),
            summary_model: config.summary_model.clone(),
            temperature: config.temperature,
        }
    }

    /// Next assistant reply. Never fails; degraded replies carry fallback text.
    pub async fn generate_reply(&self, history: &[Turn], stage: Stage) -> Reply {
        let Some((current, prior)) = history.split_last() else {
            return Reply::failed("no turn to reply to".to_string());
        };

        let mut contents = prior.to_vec();
        contents.push(Turn::user(current.text.clone()));

        let request = GenerateRequest {
            model: self.reply_model.clone(),
            system_instruction: Some(build_system_instruction(stage)),
            contents,
            temperature: Some(self.temperature),
            response_mime_type: None,
        };

        match self.generator.generate(&request).await {
            Ok(text) if text.trim().is_empty() => {
                tracing::warn!(model = %self.reply_model, "reply came back empty");
                Reply::empty()
            }
            Ok(text) => Reply::Generated(text),
            Err(e) => {
                let reason = format!("{e:#}");
                tracing::warn!(model = %self.reply_model, error = %reason, "reply failed");
                Reply::failed(reason)
            }
        }
    }

    /// Best-effort projection of the conversation into summary fields.
    pub async fn extract_summary(&self, history: &[Turn]) -> Extraction {
        let request = GenerateRequest {
            model: self.summary_model.clone(),
            system_instruction: None,
            contents: vec![Turn::user(build_extraction_prompt(history))],
            temperature: None,
            response_mime_type: Some(JSON_MIME_TYPE),
        };

        let text = match self.generator.generate(&request).await {
            Ok(text) => text,
            Err(e) => {
                let reason = format!("{e:#}");
                tracing::warn!(model = %self.summary_model, error = %reason, "extraction failed");
                return Extraction::Absent(reason);
            }
        };

        match parse_summary(&text) {
            Ok(update) => Extraction::Found(update),
            Err(e) => {
                let reason = format!("{e:#}");
                tracing::warn!(error = %reason, "extraction response was not usable");
                Extraction::Absent(reason)
            }
        }
    }
}

/// Parse the extraction response. Tolerates a surrounding markdown code fence.
pub fn parse_summary(text: &str) -> Result<SummaryUpdate> {
    let body = strip_code_fence(text.trim());
    if body.is_empty() {
        return Err(anyhow!("extraction returned empty content"));
    }
    let value: Value = serde_json::from_str(body).context("extraction is not valid JSON")?;
    if !value.is_object() {
        return Err(anyhow!("extraction must be a JSON object"));
    }
    serde_json::from_value(value).context("extraction has unexpected field types")
}

fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    let rest = match rest.get(..4) {
        Some(tag) if tag.eq_ignore_ascii_case("json") => &rest[4..],
        _ => rest,
    };
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    /// Replays canned results and records every request it sees.
    struct Scripted {
        results: Mutex<Vec<Result<String>>>,
        seen: Mutex<Vec<GenerateRequest>>,
    }

    impl Scripted {
        fn new(results: Vec<Result<String>>) -> Self {
            Self {
                results: Mutex::new(results.into_iter().rev().collect()),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    impl Generator for Scripted {
        async fn generate(&self, request: &GenerateRequest) -> Result<String> {
            self.seen.lock().unwrap().push(request.clone());
            self.results
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| Err(anyhow!("script exhausted")))
        }
    }

    fn gateway(results: Vec<Result<String>>) -> Gateway<Scripted> {
        Gateway::new(Scripted::new(results), &Config::default())
    }

    #[tokio::test]
    async fn reply_sends_prior_turns_then_latest_as_user() {
        let gw = gateway(vec![Ok("What must be true?".to_string())]);
        let history = vec![
            Turn::user("onboarding is slow"),
            Turn::assistant("slow for whom?"),
            Turn::user("new hires"),
        ];
        let reply = gw.generate_reply(&history, Stage::DefineProblem).await;
        assert_eq!(reply, Reply::Generated("What must be true?".to_string()));

        let seen = gw.generator.seen.lock().unwrap();
        let req = &seen[0];
        assert_eq!(req.contents, history);
        assert_eq!(req.temperature, Some(0.7));
        assert_eq!(req.model, Config::default().reply_model);
        assert!(
            req.system_instruction
                .as_deref()
                .is_some_and(|s| s.ends_with("CURRENT ACTIVE STEP: 1"))
        );
    }

    #[tokio::test]
    async fn reply_failure_becomes_error_fallback() {
        let gw = gateway(vec![Err(anyhow!("API error 403: key invalid"))]);
        let reply = gw.generate_reply(&[Turn::user("hi")], Stage::Grounding).await;
        assert!(reply.is_degraded());
        assert_eq!(reply.text(), ERROR_REPLY_FALLBACK);
        assert!(matches!(
            reply,
            Reply::Degraded { cause: DegradeCause::ServiceError(ref msg), .. } if msg.contains("403")
        ));
    }

    #[tokio::test]
    async fn empty_reply_becomes_empty_fallback() {
        let gw = gateway(vec![Ok("   ".to_string())]);
        let reply = gw.generate_reply(&[Turn::user("hi")], Stage::Grounding).await;
        assert_eq!(
            reply,
            Reply::Degraded {
                text: EMPTY_REPLY_FALLBACK,
                cause: DegradeCause::EmptyOutput
            }
        );
    }

    #[tokio::test]
    async fn reply_without_history_is_degraded() {
        let gw = gateway(Vec::new());
        let reply = gw.generate_reply(&[], Stage::Grounding).await;
        assert_eq!(reply.text(), ERROR_REPLY_FALLBACK);
        assert!(gw.generator.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn extraction_requests_json_over_full_history() {
        let gw = gateway(vec![Ok(
            r#"{"problem":"X","facts":["a"],"assumptions":[],"requirements":[]}"#.to_string(),
        )]);
        let history = vec![Turn::user("hi"), Turn::assistant("why?")];
        let extraction = gw.extract_summary(&history).await;
        let Extraction::Found(update) = extraction else {
            panic!("expected an update");
        };
        assert_eq!(update.problem.as_deref(), Some("X"));
        assert_eq!(update.facts, Some(vec!["a".to_string()]));
        assert_eq!(update.assumptions, Some(Vec::new()));

        let seen = gw.generator.seen.lock().unwrap();
        let req = &seen[0];
        assert_eq!(req.response_mime_type, Some("application/json"));
        assert_eq!(req.model, Config::default().summary_model);
        assert_eq!(req.contents.len(), 1);
        assert!(req.contents[0].text.ends_with("user: hi\nmodel: why?"));
    }

    #[tokio::test]
    async fn malformed_extraction_is_absent() {
        let gw = gateway(vec![Ok("not json at all".to_string())]);
        assert!(matches!(
            gw.extract_summary(&[Turn::user("hi")]).await,
            Extraction::Absent(_)
        ));
    }

    #[tokio::test]
    async fn extraction_transport_error_is_absent() {
        let gw = gateway(vec![Err(anyhow!("HTTP request failed"))]);
        let extraction = gw.extract_summary(&[Turn::user("hi")]).await;
        assert!(
            matches!(extraction, Extraction::Absent(ref reason) if reason.contains("HTTP request failed"))
        );
    }

    #[test]
    fn parse_summary_accepts_fenced_json() {
        let update = parse_summary("```json\n{\"problem\":\"P\"}\n```").unwrap();
        assert_eq!(update.problem.as_deref(), Some("P"));
        assert_eq!(update.facts, None);
    }

    #[test]
    fn parse_summary_accepts_upper_case_fence_tag() {
        let update = parse_summary("```JSON\n{\"facts\":[\"a\"]}\n```").unwrap();
        assert_eq!(update.facts, Some(vec!["a".to_string()]));

        let update = parse_summary("```Json {\"problem\":\"P\"} ```").unwrap();
        assert_eq!(update.problem.as_deref(), Some("P"));
    }

    #[test]
    fn degrade_cause_describes_itself() {
        assert_eq!(DegradeCause::EmptyOutput.describe(), "empty output");
        assert_eq!(
            DegradeCause::ServiceError("API error 500".to_string()).describe(),
            "API error 500"
        );
    }

    #[test]
    fn parse_summary_rejects_non_objects_and_bad_types() {
        assert!(parse_summary("[1,2,3]").is_err());
        assert!(parse_summary(r#"{"facts":"one fact"}"#).is_err());
        assert!(parse_summary("").is_err());
    }
}
