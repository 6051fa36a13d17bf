// src/config/curation.rs
use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::categorize::{CategorizeSection, Categorizer, CategoryCfg};
use crate::posts::{HashtagCfg, PlatformsCfg, PostGenerator};
use crate::relevance::{KeywordTiers, RelevanceEngine, RelevanceSection, TierWeights};

// --- env defaults & names ---
pub const DEFAULT_CURATION_CONFIG_PATH: &str = "config/curation.toml";
pub const ENV_CURATION_CONFIG_PATH: &str = "CURATION_CONFIG_PATH";
pub const ENV_MIN_RELEVANCE: &str = "CURATION_MIN_RELEVANCE";

const BUILTIN_CURATION_TOML: &str = include_str!("../../config/curation.toml");

/// Keyword tiers, taxonomy and formatting rules. One canonical copy, treated as data.
#[derive(Debug, Clone, Deserialize)]
pub struct CurationConfig {
    pub relevance: RelevanceSection,
    #[serde(default)]
    pub weights: TierWeights,
    pub keywords: KeywordTiers,
    #[serde(default)]
    pub categorize: CategorizeSection,
    #[serde(default)]
    pub categories: Vec<CategoryCfg>,
    #[serde(default)]
    pub hashtags: HashtagCfg,
    #[serde(default)]
    pub platforms: PlatformsCfg,
}

impl CurationConfig {
    /// The copy of `config/curation.toml` compiled into the crate.
    pub fn builtin() -> Result<Self> {
        Self::from_toml_str(BUILTIN_CURATION_TOML).context("parsing built-in curation config")
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        let cfg: CurationConfig = toml::from_str(s)?;
        Ok(cfg)
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading curation config from {}", path.display()))?;
        Self::from_toml_str(&content)
            .with_context(|| format!("parsing curation config {}", path.display()))
    }

    /// Resolve the config:
    /// 1) $CURATION_CONFIG_PATH (must exist)
    /// 2) config/curation.toml
    /// 3) built-in copy
    ///
    /// then apply $CURATION_MIN_RELEVANCE if set.
    pub fn load() -> Result<Self> {
        let mut cfg = if let Ok(p) = std::env::var(ENV_CURATION_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if !pb.exists() {
                return Err(anyhow!(
                    "{ENV_CURATION_CONFIG_PATH} points to non-existent path {}",
                    pb.display()
                ));
            }
            Self::from_path(&pb)?
        } else {
            let default = PathBuf::from(DEFAULT_CURATION_CONFIG_PATH);
            if default.exists() {
                Self::from_path(&default)?
            } else {
                Self::builtin()?
            }
        };

        if let Some(t) = parse_unit_env(std::env::var(ENV_MIN_RELEVANCE).ok()) {
            cfg.relevance.min_score = t;
        }
        Ok(cfg)
    }

    pub fn relevance_engine(&self) -> RelevanceEngine {
        RelevanceEngine::new(self.relevance.clone(), self.weights, &self.keywords)
    }

    pub fn categorizer(&self) -> Categorizer {
        Categorizer::new(&self.categorize, &self.categories)
    }

    pub fn post_generator(&self) -> PostGenerator {
        PostGenerator::new(&self.hashtags, &self.categories, &self.platforms)
    }
}

// parse optional float env and clamp to <0.0..=1.0>
fn parse_unit_env(raw: Option<String>) -> Option<f32> {
    raw.and_then(|s| s.trim().parse::<f32>().ok())
        .filter(|v| v.is_finite())
        .map(|v| v.clamp(0.0, 1.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    #[test]
    fn builtin_config_is_complete() {
        let cfg = CurationConfig::builtin().expect("builtin");
        assert_eq!(cfg.weights.high, 3);
        assert_eq!(cfg.categories.len(), 8);
        assert_eq!(cfg.categorize.max_categories, 4);
        assert_eq!(cfg.hashtags.base_take, 3);
        assert_eq!(cfg.platforms.x.max_chars, Some(280));
        assert!((cfg.relevance.normalizer - 15.0).abs() < f32::EPSILON);
    }

    #[test]
    fn env_threshold_is_clamped() {
        assert_eq!(parse_unit_env(Some(" 0.3 ".into())), Some(0.3));
        assert_eq!(parse_unit_env(Some("7".into())), Some(1.0));
        assert_eq!(parse_unit_env(Some("nan".into())), None);
        assert_eq!(parse_unit_env(None), None);
    }

    #[serial_test::serial]
    #[test]
    fn load_prefers_env_path_then_falls_back() {
        let old = env::current_dir().unwrap();
        let tmp = tempfile::tempdir().unwrap();
        env::set_current_dir(tmp.path()).unwrap();
        env::remove_var(ENV_CURATION_CONFIG_PATH);
        env::remove_var(ENV_MIN_RELEVANCE);

        // Nothing on disk → built-in copy
        let cfg = CurationConfig::load().unwrap();
        assert_eq!(cfg.categories.len(), 8);

        // Env path wins, and the threshold override applies on top
        let p = tmp.path().join("custom.toml");
        fs::write(
            &p,
            "[relevance]\nmin_score = 0.2\n[keywords]\nhigh = [\"kigali\"]\n",
        )
        .unwrap();
        env::set_var(ENV_CURATION_CONFIG_PATH, p.display().to_string());
        env::set_var(ENV_MIN_RELEVANCE, "0.4");
        let cfg = CurationConfig::load().unwrap();
        assert_eq!(cfg.keywords.high, vec!["kigali".to_string()]);
        assert!((cfg.relevance.min_score - 0.4).abs() < f32::EPSILON);

        // Missing env path is an error, not a silent fallback
        env::set_var(ENV_CURATION_CONFIG_PATH, tmp.path().join("missing.toml"));
        assert!(CurationConfig::load().is_err());

        env::remove_var(ENV_CURATION_CONFIG_PATH);
        env::remove_var(ENV_MIN_RELEVANCE);
        env::set_current_dir(&old).unwrap();
    }
}
