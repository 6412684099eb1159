//! Semantic oracle: provider abstraction for the external relevance judge.
//!
//! Every failure (missing key, transport error, non-2xx, unparseable body)
//! surfaces as `None`, which callers treat as "oracle unavailable", never as
//! "not relevant".

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::oracle::OracleConfig;
use crate::profile::PageSnapshot;

/// Body text sent to the oracle is capped to keep prompts small.
const PROMPT_BODY_CHARS: usize = 3_000;
const MAX_REASON_CHARS: usize = 160;

/// Semantic summary of the anchor page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnchorSummary {
    pub topic: String,
    #[serde(default)]
    pub keywords: Vec<String>,
}

/// Oracle's judgment for one candidate page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OracleVerdict {
    pub relevant: bool,
    /// In [0, 1].
    pub confidence: f64,
    #[serde(default)]
    pub reason: String,
}

pub type OracleFuture<'a, T> = Pin<Box<dyn Future<Output = Option<T>> + Send + 'a>>;

/// Trait object used by the engine and controller.
pub trait SemanticOracle: Send + Sync {
    /// Judge whether `page` is on-topic for `anchor`.
    fn judge<'a>(
        &'a self,
        anchor: &'a AnchorSummary,
        page: &'a PageSnapshot,
    ) -> OracleFuture<'a, OracleVerdict>;

    /// Summarize the anchor page into `{topic, keywords}`.
    fn summarize<'a>(&'a self, page: &'a PageSnapshot) -> OracleFuture<'a, AnchorSummary>;

    /// Provider name for diagnostics.
    fn provider_name(&self) -> &'static str;

    /// False when calls would always return `None`; lets callers skip the await.
    fn is_available(&self) -> bool {
        true
    }
}

pub type DynOracle = Arc<dyn SemanticOracle>;

/// Factory: build an oracle according to config and environment.
///
/// * `AI_TEST_MODE=mock` → deterministic mock oracle.
/// * disabled config or empty key → [`DisabledOracle`].
/// * provider "gemini" → [`GeminiOracle`].
pub fn build_oracle(config: &OracleConfig) -> DynOracle {
    if std::env::var("AI_TEST_MODE")
        .map(|v| v == "mock")
        .unwrap_or(false)
    {
        return Arc::new(MockOracle::relevant("Related (mock)"));
    }

    if !config.is_usable() {
        return Arc::new(DisabledOracle);
    }

    match config.provider.as_str() {
        "gemini" => match GeminiOracle::new(&config.api_key, &config.model) {
            Ok(o) => Arc::new(o),
            Err(e) => {
                warn!(target: "oracle", error = %e, "failed to build gemini client, oracle disabled");
                Arc::new(DisabledOracle)
            }
        },
        other => {
            warn!(target: "oracle", provider = other, "unsupported oracle provider, oracle disabled");
            Arc::new(DisabledOracle)
        }
    }
}

/// Always abstains; used when no credentials are configured.
pub struct DisabledOracle;

impl SemanticOracle for DisabledOracle {
    fn judge<'a>(
        &'a self,
        _anchor: &'a AnchorSummary,
        _page: &'a PageSnapshot,
    ) -> OracleFuture<'a, OracleVerdict> {
        Box::pin(async { None })
    }

    fn summarize<'a>(&'a self, _page: &'a PageSnapshot) -> OracleFuture<'a, AnchorSummary> {
        Box::pin(async { None })
    }

    fn provider_name(&self) -> &'static str {
        "disabled"
    }

    fn is_available(&self) -> bool {
        false
    }
}

/// Fixed answers for tests and local runs. `None` fields simulate failures.
#[derive(Debug, Clone, Default)]
pub struct MockOracle {
    pub verdict: Option<OracleVerdict>,
    pub summary: Option<AnchorSummary>,
}

impl MockOracle {
    pub fn relevant(reason: &str) -> Self {
        Self::with_verdict(true, 0.9, reason)
    }

    pub fn with_verdict(relevant: bool, confidence: f64, reason: &str) -> Self {
        Self {
            verdict: Some(OracleVerdict {
                relevant,
                confidence,
                reason: reason.to_string(),
            }),
            summary: Some(AnchorSummary {
                topic: "mock topic".to_string(),
                keywords: vec!["mock".to_string()],
            }),
        }
    }

    pub fn failing() -> Self {
        Self::default()
    }
}

impl SemanticOracle for MockOracle {
    fn judge<'a>(
        &'a self,
        _anchor: &'a AnchorSummary,
        _page: &'a PageSnapshot,
    ) -> OracleFuture<'a, OracleVerdict> {
        let out = self.verdict.clone();
        Box::pin(async move { out })
    }

    fn summarize<'a>(&'a self, _page: &'a PageSnapshot) -> OracleFuture<'a, AnchorSummary> {
        let out = self.summary.clone();
        Box::pin(async move { out })
    }

    fn provider_name(&self) -> &'static str {
        "mock"
    }
}

// ------------------------------------------------------------
// Gemini provider
// ------------------------------------------------------------

/// Google Gemini `generateContent` provider.
pub struct GeminiOracle {
    http: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl GeminiOracle {
    pub fn new(api_key: &str, model: &str) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent("focus-guard/0.1")
            .connect_timeout(Duration::from_secs(4))
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            http,
            api_key: api_key.trim().to_string(),
            model: model.to_string(),
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
        })
    }

    /// Point at a different endpoint (local stub servers).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn generate(&self, prompt: String) -> Option<String> {
        if self.api_key.is_empty() {
            return None;
        }

        #[derive(Serialize)]
        struct Part {
            text: String,
        }
        #[derive(Serialize)]
        struct Content {
            parts: Vec<Part>,
        }
        #[derive(Serialize)]
        #[serde(rename_all = "camelCase")]
        struct GenConfig {
            temperature: f32,
            response_mime_type: &'static str,
        }
        #[derive(Serialize)]
        #[serde(rename_all = "camelCase")]
        struct Req {
            contents: Vec<Content>,
            generation_config: GenConfig,
        }
        #[derive(Deserialize)]
        struct Resp {
            #[serde(default)]
            candidates: Vec<Candidate>,
        }
        #[derive(Deserialize)]
        struct Candidate {
            content: RespContent,
        }
        #[derive(Deserialize)]
        struct RespContent {
            #[serde(default)]
            parts: Vec<RespPart>,
        }
        #[derive(Deserialize)]
        struct RespPart {
            #[serde(default)]
            text: String,
        }

        let req = Req {
            contents: vec![Content {
                parts: vec![Part { text: prompt }],
            }],
            generation_config: GenConfig {
                temperature: 0.1,
                response_mime_type: "application/json",
            },
        };

        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);
        let resp = match self
            .http
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&req)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                warn!(target: "oracle", error = %e, "gemini request failed");
                return None;
            }
        };

        if !resp.status().is_success() {
            warn!(target: "oracle", status = %resp.status(), "gemini returned non-success");
            return None;
        }
        let body: Resp = resp.json().await.ok()?;
        let text = body
            .candidates
            .first()
            .and_then(|c| c.content.parts.first())
            .map(|p| p.text.clone())
            .unwrap_or_default();
        if text.trim().is_empty() {
            None
        } else {
            Some(text)
        }
    }
}

impl SemanticOracle for GeminiOracle {
    fn judge<'a>(
        &'a self,
        anchor: &'a AnchorSummary,
        page: &'a PageSnapshot,
    ) -> OracleFuture<'a, OracleVerdict> {
        Box::pin(async move {
            let raw = self.generate(judge_prompt(anchor, page)).await?;
            parse_verdict(&raw)
        })
    }

    fn summarize<'a>(&'a self, page: &'a PageSnapshot) -> OracleFuture<'a, AnchorSummary> {
        Box::pin(async move {
            let raw = self.generate(summary_prompt(page)).await?;
            parse_summary(&raw)
        })
    }

    fn provider_name(&self) -> &'static str {
        "gemini"
    }
}

// ------------------------------------------------------------
// Prompts & parsing
// ------------------------------------------------------------

fn page_excerpt(page: &PageSnapshot) -> String {
    let body: String = page.body_text.chars().take(PROMPT_BODY_CHARS).collect();
    format!(
        "URL: {}\nTitle: {}\nDescription: {}\nHeadings: {}\nText: {}",
        page.url,
        page.title,
        page.description,
        page.headings.join(" | "),
        body
    )
}

pub fn summary_prompt(page: &PageSnapshot) -> String {
    format!(
        "Summarize the main topic of this web page. Respond with JSON only: \
         {{\"topic\": \"<short topic>\", \"keywords\": [\"<up to 10 keywords>\"]}}\n\n{}",
        page_excerpt(page)
    )
}

pub fn judge_prompt(anchor: &AnchorSummary, page: &PageSnapshot) -> String {
    format!(
        "A user is focused on the topic \"{}\" (keywords: {}). Decide whether the following page \
         is relevant to that focus. Be lenient with tangentially related material. Respond with \
         JSON only: {{\"relevant\": true|false, \"confidence\": 0.0-1.0, \"reason\": \"<one short \
         sentence addressed to the user>\"}}\n\n{}",
        anchor.topic,
        anchor.keywords.join(", "),
        page_excerpt(page)
    )
}

/// Drop surrounding ```json fences some models add despite instructions.
fn strip_code_fences(raw: &str) -> &str {
    let t = raw.trim();
    let t = t
        .strip_prefix("```json")
        .or_else(|| t.strip_prefix("```"))
        .unwrap_or(t);
    t.strip_suffix("```").unwrap_or(t).trim()
}

pub fn parse_verdict(raw: &str) -> Option<OracleVerdict> {
    let mut v: OracleVerdict = serde_json::from_str(strip_code_fences(raw)).ok()?;
    if !v.confidence.is_finite() {
        return None;
    }
    v.confidence = v.confidence.clamp(0.0, 1.0);
    v.reason = sanitize_reason(&v.reason);
    Some(v)
}

pub fn parse_summary(raw: &str) -> Option<AnchorSummary> {
    let mut s: AnchorSummary = serde_json::from_str(strip_code_fences(raw)).ok()?;
    s.topic = sanitize_reason(&s.topic);
    if s.topic.is_empty() {
        return None;
    }
    s.keywords = s
        .keywords
        .into_iter()
        .map(|k| k.trim().to_lowercase())
        .filter(|k| !k.is_empty())
        .take(10)
        .collect();
    Some(s)
}

/// Ensure ASCII-only, single line, and <=160 chars. Collapses whitespace.
pub fn sanitize_reason(input: &str) -> String {
    let mut out = String::with_capacity(MAX_REASON_CHARS);
    let mut prev_space = false;
    for ch in input.chars() {
        let c = match ch {
            '\r' | '\n' | '\t' => ' ',
            c if c.is_ascii() => c,
            _ => ' ',
        };
        if c == ' ' {
            if !prev_space && !out.is_empty() {
                out.push(' ');
            }
            prev_space = true;
        } else {
            out.push(c);
            prev_space = false;
        }
        if out.len() >= MAX_REASON_CHARS {
            break;
        }
    }
    out.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_fenced_verdict_and_clamps() {
        let raw = "```json\n{\"relevant\": false, \"confidence\": 1.4, \"reason\": \"Off\\ntopic\"}\n```";
        let v = parse_verdict(raw).unwrap();
        assert!(!v.relevant);
        assert_eq!(v.confidence, 1.0);
        assert_eq!(v.reason, "Off topic");
    }

    #[test]
    fn garbage_is_none() {
        assert!(parse_verdict("I think it is relevant").is_none());
        assert!(parse_summary("{\"topic\": \"  \"}").is_none());
    }

    #[test]
    fn summary_keywords_are_cleaned() {
        let s = parse_summary(r#"{"topic":"Rust async","keywords":[" Tokio ",""," Futures"]}"#)
            .unwrap();
        assert_eq!(s.topic, "Rust async");
        assert_eq!(s.keywords, vec!["tokio", "futures"]);
    }

    #[test]
    fn sanitize_caps_length() {
        let long = "x".repeat(500);
        assert_eq!(sanitize_reason(&long).len(), MAX_REASON_CHARS);
    }

    #[tokio::test]
    async fn disabled_oracle_abstains() {
        let o = DisabledOracle;
        let anchor = AnchorSummary {
            topic: "t".into(),
            keywords: vec![],
        };
        assert!(!o.is_available());
        assert!(o.judge(&anchor, &PageSnapshot::default()).await.is_none());
        assert!(o.summarize(&PageSnapshot::default()).await.is_none());
    }

    #[tokio::test]
    async fn gemini_without_key_returns_none() {
        let o = GeminiOracle::new("", "m").unwrap();
        assert!(o.summarize(&PageSnapshot::default()).await.is_none());
    }

    #[tokio::test]
    async fn mock_oracle_answers() {
        let o = MockOracle::with_verdict(false, 0.8, "nope");
        let anchor = AnchorSummary {
            topic: "t".into(),
            keywords: vec![],
        };
        let v = o.judge(&anchor, &PageSnapshot::default()).await.unwrap();
        assert!(!v.relevant);
        assert!(MockOracle::failing().summarize(&PageSnapshot::default()).await.is_none());
    }
}
