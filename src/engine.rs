// src/engine.rs
//! Relevance decision engine.
//!
//! Cheap checks run first and synchronously ([`Engine::quick_verdict`]):
//! internal pages, same-domain navigation, the browsing/entertainment
//! policies and the reading-mode fast paths. Only when those are inconclusive
//! does reading mode fall through to [`Engine::resolve_content`], an explicit
//! pipeline: oracle → profile similarity → domain/category comparison.

use rand::Rng;
use tracing::debug;

use crate::categories::{categorize, extract_domain, is_internal_url, Category};
use crate::config::FocusConfig;
use crate::decision::{distraction_message, Mode, Verdict, VerdictSource};
use crate::oracle::{AnchorSummary, SemanticOracle};
use crate::profile::{PageSnapshot, TopicProfile};
use crate::relevance::{analyze_relevance, anon_hash, Thresholds};
use crate::session::FocusSession;

/// Categories decisive enough in reading mode to skip content analysis.
pub const READING_FAST_DENY: &[Category] = &[
    Category::Social,
    Category::Shopping,
    Category::Gaming,
    Category::Finance,
];

/// Categories that trigger a nudge in reading mode's domain-only fallback.
pub const READING_DISTRACTIONS: &[Category] = &[
    Category::Social,
    Category::Entertainment,
    Category::Shopping,
    Category::Gaming,
    Category::News,
    Category::Finance,
];

const ENTERTAINMENT_ALLOWED: &[Category] = &[
    Category::Entertainment,
    Category::Social,
    Category::Gaming,
];

/// Everything the engine needs from the session, detached so it can move
/// into a background evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct AnchorContext {
    pub mode: Mode,
    pub anchor_url: String,
    pub anchor_domain: String,
    pub anchor_profile: Option<TopicProfile>,
    pub anchor_summary: Option<AnchorSummary>,
    pub allowlist: Vec<String>,
}

impl AnchorContext {
    /// `None` for an inactive session.
    pub fn from_session(session: &FocusSession) -> Option<Self> {
        if !session.active {
            return None;
        }
        Some(Self {
            mode: session.mode?,
            anchor_url: session.anchor_url.clone(),
            anchor_domain: session.anchor_domain(),
            anchor_profile: session.anchor_profile.clone(),
            anchor_summary: session.anchor_summary.clone(),
            allowlist: session.allowlist.clone(),
        })
    }
}

#[derive(Debug, Clone)]
pub struct Engine {
    thresholds: Thresholds,
    min_confidence: f64,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(&FocusConfig::default())
    }
}

impl Engine {
    pub fn new(config: &FocusConfig) -> Self {
        Self {
            thresholds: Thresholds::from(&config.relevance),
            min_confidence: config.oracle.min_confidence,
        }
    }

    pub fn thresholds(&self) -> &Thresholds {
        &self.thresholds
    }

    /// Verdict from URL-level information alone, or `None` when reading mode
    /// needs content analysis.
    pub fn quick_verdict<R: Rng>(
        &self,
        ctx: &AnchorContext,
        url: &str,
        rng: &mut R,
    ) -> Option<Verdict> {
        let category = categorize(url);

        if is_internal_url(url) {
            return Some(Verdict::allow(
                Category::Unknown,
                "Browser internal page.",
                VerdictSource::Internal,
            ));
        }
        let domain = extract_domain(url);
        if !domain.is_empty() && domain == ctx.anchor_domain {
            return Some(Verdict::allow(
                category,
                "Same domain as your focus page.",
                VerdictSource::SameDomain,
            ));
        }

        match ctx.mode {
            Mode::Browsing => Some(browsing_policy(url, category, &ctx.allowlist)),
            Mode::Entertainment => Some(entertainment_policy(url, category)),
            Mode::Reading => {
                if category.is_research_tool() {
                    return Some(Verdict::allow(
                        category,
                        "Research tool, allowed in Reading mode.",
                        VerdictSource::FastPath,
                    ));
                }
                if READING_FAST_DENY.contains(&category) {
                    return Some(Verdict::deny(
                        category,
                        distraction_message(category, rng),
                        VerdictSource::FastPath,
                    ));
                }
                None
            }
        }
    }

    /// Content-based resolution for reading mode.
    ///
    /// A missing `snapshot` means extraction failed; the oracle still gets a
    /// URL-only snapshot and the profile step is skipped.
    ///
    /// With neither a confident oracle answer nor a profile judgment, the
    /// domain-only reading rules decide, first match wins: research tools,
    /// reference, same category as the anchor, work pages under a work
    /// anchor, then [`READING_DISTRACTIONS`] deny, unknown sites allow, and
    /// anything else is denied.
    pub async fn resolve_content<R: Rng + Send>(
        &self,
        ctx: &AnchorContext,
        url: &str,
        snapshot: Option<&PageSnapshot>,
        oracle: &dyn SemanticOracle,
        rng: &mut R,
    ) -> Verdict {
        let category = categorize(url);
        let page = snapshot
            .map(PageSnapshot::normalized)
            .unwrap_or_else(|| PageSnapshot::url_only(url));

        if let Some(v) = self.try_oracle(ctx, &page, category, oracle).await {
            return v;
        }
        if let Some(v) = self.try_profile(ctx, snapshot.map(|_| &page), category) {
            return v;
        }
        debug!(target: "engine", url = %anon_hash(url), "no content signal, falling back to category rules");
        check_relevance(&ctx.anchor_url, url, Mode::Reading, &[], rng)
    }

    /// Oracle step. `None` when the oracle is absent, fails, or is not confident.
    pub async fn try_oracle(
        &self,
        ctx: &AnchorContext,
        page: &PageSnapshot,
        category: Category,
        oracle: &dyn SemanticOracle,
    ) -> Option<Verdict> {
        let summary = ctx.anchor_summary.as_ref()?;
        if !oracle.is_available() {
            return None;
        }
        let Some(answer) = oracle.judge(summary, page).await else {
            crate::metrics::record_oracle_call("failed");
            return None;
        };
        if answer.confidence < self.min_confidence {
            crate::metrics::record_oracle_call("low_confidence");
            debug!(target: "engine", confidence = answer.confidence, "oracle abstained");
            return None;
        }
        crate::metrics::record_oracle_call("trusted");

        let reason = if !answer.reason.is_empty() {
            answer.reason
        } else if answer.relevant {
            format!("Related to your focus on \"{}\".", summary.topic)
        } else {
            format!("This page doesn't seem related to \"{}\".", summary.topic)
        };
        let v = if answer.relevant {
            Verdict::allow(category, reason, VerdictSource::Oracle)
        } else {
            Verdict::deny(category, reason, VerdictSource::Oracle)
        };
        Some(v.with_score(answer.confidence))
    }

    /// Profile-similarity step. Needs an anchor profile and a titled snapshot.
    pub fn try_profile(
        &self,
        ctx: &AnchorContext,
        page: Option<&PageSnapshot>,
        category: Category,
    ) -> Option<Verdict> {
        let anchor = ctx.anchor_profile.as_ref()?;
        let page = page.filter(|p| p.has_title())?;
        let j = analyze_relevance(anchor, page, &self.thresholds);
        let v = if j.relevant {
            Verdict::allow(category, j.reason, VerdictSource::Profile)
        } else {
            Verdict::deny(category, j.reason, VerdictSource::Profile)
        };
        Some(v.with_score(j.score))
    }

    /// Full decision for one navigation.
    pub async fn decide<R: Rng + Send>(
        &self,
        session: &FocusSession,
        url: &str,
        snapshot: Option<&PageSnapshot>,
        oracle: &dyn SemanticOracle,
        rng: &mut R,
    ) -> Verdict {
        let Some(ctx) = AnchorContext::from_session(session) else {
            return Verdict::allow(categorize(url), "No active focus rules.", VerdictSource::Category);
        };
        if let Some(v) = self.quick_verdict(&ctx, url, rng) {
            return v;
        }
        self.resolve_content(&ctx, url, snapshot, oracle, rng).await
    }
}

/// Lowercased allowlist with `www.` stripped.
pub fn normalize_allowlist(allowlist: &[String]) -> Vec<String> {
    allowlist
        .iter()
        .map(|d| {
            let d = d.trim().to_lowercase();
            d.strip_prefix("www.").map(str::to_string).unwrap_or(d)
        })
        .filter(|d| !d.is_empty())
        .collect()
}

fn browsing_policy(url: &str, category: Category, allowlist: &[String]) -> Verdict {
    let domain = extract_domain(url).to_lowercase();
    if normalize_allowlist(allowlist).contains(&domain) {
        return Verdict::allow(category, "Domain is in your allowlist.", VerdictSource::Category);
    }
    if category.is_research_tool() {
        return Verdict::allow(
            category,
            "Search/AI tools are always allowed.",
            VerdictSource::Category,
        );
    }
    Verdict::deny(
        category,
        format!("{domain} is not in your focus allowlist."),
        VerdictSource::Category,
    )
}

fn entertainment_policy(url: &str, category: Category) -> Verdict {
    if ENTERTAINMENT_ALLOWED.contains(&category) {
        return Verdict::allow(
            category,
            "Entertainment content, enjoy your break!",
            VerdictSource::Category,
        );
    }
    match category {
        Category::Search => Verdict::allow(
            category,
            "Searching is fine during your break.",
            VerdictSource::Category,
        ),
        Category::Dev | Category::Productivity => Verdict::deny(
            category,
            format!(
                "You're supposed to be relaxing! {} looks like work.",
                extract_domain(url)
            ),
            VerdictSource::Category,
        ),
        Category::News | Category::Reference => Verdict::allow(
            category,
            "Light reading, acceptable during break.",
            VerdictSource::Category,
        ),
        _ => Verdict::allow(category, "Looks fine for your break.", VerdictSource::Category),
    }
}

fn reading_category_rules<R: Rng>(anchor_url: &str, category: Category, rng: &mut R) -> Verdict {
    let anchor_category = categorize(anchor_url);

    if category.is_research_tool() {
        return Verdict::allow(
            category,
            "Research tool, allowed in Reading mode.",
            VerdictSource::Category,
        );
    }
    if category == Category::Reference {
        return Verdict::allow(
            category,
            "Reference material, relevant to reading.",
            VerdictSource::Category,
        );
    }
    if category == anchor_category && anchor_category != Category::Unknown {
        return Verdict::allow(
            category,
            format!("Same category ({category}) as your focus page."),
            VerdictSource::Category,
        );
    }
    if matches!(category, Category::Dev | Category::Productivity)
        && matches!(
            anchor_category,
            Category::Dev | Category::Productivity | Category::Reference
        )
    {
        return Verdict::allow(
            category,
            "Work-related, relevant to your reading context.",
            VerdictSource::Category,
        );
    }
    if READING_DISTRACTIONS.contains(&category) {
        return Verdict::deny(category, distraction_message(category, rng), VerdictSource::Category);
    }
    if category == Category::Unknown {
        return Verdict::allow(
            category,
            "Unrecognized site, allowed for now.",
            VerdictSource::Category,
        );
    }
    Verdict::deny(
        category,
        "This doesn't seem related to what you were reading.",
        VerdictSource::Category,
    )
}

/// Plain domain/category comparison, no content involved.
pub fn check_relevance<R: Rng>(
    anchor_url: &str,
    url: &str,
    mode: Mode,
    allowlist: &[String],
    rng: &mut R,
) -> Verdict {
    let category = categorize(url);
    let domain = extract_domain(url);

    if !domain.is_empty() && domain == extract_domain(anchor_url) {
        return Verdict::allow(category, "Same domain as your focus page.", VerdictSource::SameDomain);
    }
    if is_internal_url(url) {
        return Verdict::allow(Category::Unknown, "Browser internal page.", VerdictSource::Internal);
    }
    match mode {
        Mode::Reading => reading_category_rules(anchor_url, category, rng),
        Mode::Browsing => browsing_policy(url, category, allowlist),
        Mode::Entertainment => entertainment_policy(url, category),
    }
}
