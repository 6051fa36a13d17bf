// src/relevance.rs
//! Relevance scorer: config types, compiled keyword tiers, and scoring.
//!
//! The model is a transparent keyword sum. Each keyword counts once when it
//! occurs anywhere in the lowercased text (substring, unanchored), weighted by
//! its tier; the sum is divided by a fixed normalizer and clamped to 1.0.

use serde::Deserialize;
use std::collections::HashSet;
use tracing::debug;

// --- defaults ---
pub const DEFAULT_NORMALIZER: f32 = 15.0;
pub const DEFAULT_MIN_SCORE: f32 = 0.05;
pub const DEFAULT_RELEVANT_SCORE: f32 = 0.15;

/// Result of relevance evaluation
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Relevance {
    pub score: f32,
    /// Matched keywords, high tier first, in configuration order.
    pub matched: Vec<String>,
    pub reasons: Vec<String>,
}

/* ----------------------------
Config schema (from TOML)
---------------------------- */

#[derive(Debug, Clone, Deserialize)]
pub struct RelevanceRoot {
    pub relevance: RelevanceSection,
    #[serde(default)]
    pub weights: TierWeights,
    pub keywords: KeywordTiers,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RelevanceSection {
    #[serde(default = "default_normalizer")]
    pub normalizer: f32,
    #[serde(default = "default_min_score")]
    pub min_score: f32,
    #[serde(default = "default_relevant_score")]
    pub relevant_score: f32,
}

impl Default for RelevanceSection {
    fn default() -> Self {
        Self {
            normalizer: DEFAULT_NORMALIZER,
            min_score: DEFAULT_MIN_SCORE,
            relevant_score: DEFAULT_RELEVANT_SCORE,
        }
    }
}

fn default_normalizer() -> f32 {
    DEFAULT_NORMALIZER
}
fn default_min_score() -> f32 {
    DEFAULT_MIN_SCORE
}
fn default_relevant_score() -> f32 {
    DEFAULT_RELEVANT_SCORE
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct TierWeights {
    pub high: u32,
    pub medium: u32,
    pub low: u32,
}

impl Default for TierWeights {
    fn default() -> Self {
        Self {
            high: 3,
            medium: 2,
            low: 1,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct KeywordTiers {
    #[serde(default)]
    pub high: Vec<String>,
    #[serde(default)]
    pub medium: Vec<String>,
    /// Full vocabulary; anything already in high/medium is skipped.
    #[serde(default)]
    pub low: Vec<String>,
}

/* ----------------------------
Compiled engine structures
---------------------------- */

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    High,
    Medium,
    Low,
}

impl Tier {
    fn label(self) -> &'static str {
        match self {
            Tier::High => "high",
            Tier::Medium => "medium",
            Tier::Low => "low",
        }
    }
}

#[derive(Debug)]
struct CompiledTier {
    tier: Tier,
    weight: u32,
    keywords: Vec<String>,
}

/// Holds the disjoint keyword tiers and scoring constants.
#[derive(Debug)]
pub struct RelevanceEngine {
    pub cfg: RelevanceSection,
    tiers: Vec<CompiledTier>,
}

impl RelevanceEngine {
    pub fn new(section: RelevanceSection, weights: TierWeights, keywords: &KeywordTiers) -> Self {
        let mut cfg = section;
        // harden: a zero or non-finite normalizer would blow up the division
        if !cfg.normalizer.is_finite() || cfg.normalizer <= 0.0 {
            cfg.normalizer = DEFAULT_NORMALIZER;
        }
        cfg.min_score = sanitize_unit(cfg.min_score, DEFAULT_MIN_SCORE);
        cfg.relevant_score = sanitize_unit(cfg.relevant_score, DEFAULT_RELEVANT_SCORE);

        let mut seen: HashSet<String> = HashSet::new();
        let mut compile = |tier: Tier, weight: u32, list: &[String]| CompiledTier {
            tier,
            weight,
            keywords: list
                .iter()
                .map(|k| k.trim().to_lowercase())
                .filter(|k| !k.is_empty())
                .filter(|k| seen.insert(k.clone()))
                .collect(),
        };

        let tiers = vec![
            compile(Tier::High, weights.high, &keywords.high),
            compile(Tier::Medium, weights.medium, &keywords.medium),
            compile(Tier::Low, weights.low, &keywords.low),
        ];

        Self { cfg, tiers }
    }

    /// Build from a TOML string carrying `[relevance]`, `[weights]` and `[keywords]`.
    pub fn from_toml_str(toml_str: &str) -> anyhow::Result<Self> {
        let root: RelevanceRoot = toml::from_str(toml_str)?;
        Ok(Self::new(root.relevance, root.weights, &root.keywords))
    }

    pub fn min_score(&self) -> f32 {
        self.cfg.min_score
    }

    pub fn relevant_score(&self) -> f32 {
        self.cfg.relevant_score
    }

    /// Keywords of one tier after dedup across tiers.
    pub fn tier_keywords(&self, tier: Tier) -> &[String] {
        self.tiers
            .iter()
            .find(|t| t.tier == tier)
            .map(|t| t.keywords.as_slice())
            .unwrap_or_default()
    }

    /// Score title + body; the hot path for the pipelines.
    pub fn score(&self, title: &str, body: &str) -> f32 {
        self.score_article(title, body).score
    }

    pub fn score_article(&self, title: &str, body: &str) -> Relevance {
        self.evaluate(&format!("{title} {body}"))
    }

    /// Public scoring API: presence per keyword × tier weight, normalized and clamped.
    pub fn evaluate(&self, text: &str) -> Relevance {
        let haystack = text.to_lowercase();
        let mut rel = Relevance::default();
        let mut raw = 0u32;

        for tier in &self.tiers {
            let mut hits = 0u32;
            for kw in &tier.keywords {
                if haystack.contains(kw.as_str()) {
                    hits += 1;
                    rel.matched.push(kw.clone());
                }
            }
            raw += hits * tier.weight;
            rel.reasons.push(format!("{}:{}", tier.tier.label(), hits));
        }

        rel.score = (raw as f32 / self.cfg.normalizer).clamp(0.0, 1.0);
        rel.reasons
            .push(format!("raw:{}/{}", raw, self.cfg.normalizer));

        debug!(
            target: "relevance",
            score = rel.score,
            raw,
            matched = ?truncate_vec(&rel.matched, 5),
            "scored"
        );
        rel
    }
}

fn sanitize_unit(v: f32, fallback: f32) -> f32 {
    if v.is_finite() {
        v.clamp(0.0, 1.0)
    } else {
        fallback
    }
}

pub(crate) fn truncate_vec<T: ToString>(v: &[T], max: usize) -> Vec<String> {
    v.iter().take(max).map(|x| x.to_string()).collect()
}

/* ----------------------------
Tests
---------------------------- */
