// src/ingest/config.rs
use anyhow::{anyhow, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use crate::model::SourceSeed;

pub const ENV_SOURCES_CONFIG_PATH: &str = "SOURCES_CONFIG_PATH";
pub const DEFAULT_SOURCES_CONFIG_PATH: &str = "config/sources.toml";

const BUILTIN_SOURCES_TOML: &str = include_str!("../../config/sources.toml");

/// Load seed sources from an explicit path. Supports TOML or JSON formats.
pub fn load_sources_from(path: &Path) -> Result<Vec<SourceSeed>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading sources from {}", path.display()))?;
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    parse_sources(&content, ext.as_str())
        .with_context(|| format!("parsing sources {}", path.display()))
}

/// Load seed sources using env var + fallbacks:
/// 1) $SOURCES_CONFIG_PATH
/// 2) config/sources.toml
/// 3) the built-in list
pub fn load_sources_default() -> Result<Vec<SourceSeed>> {
    if let Ok(p) = std::env::var(ENV_SOURCES_CONFIG_PATH) {
        let pb = PathBuf::from(p);
        if pb.exists() {
            return load_sources_from(&pb);
        } else {
            return Err(anyhow!(
                "{ENV_SOURCES_CONFIG_PATH} points to non-existent path {}",
                pb.display()
            ));
        }
    }
    let toml_p = PathBuf::from(DEFAULT_SOURCES_CONFIG_PATH);
    if toml_p.exists() {
        return load_sources_from(&toml_p);
    }
    builtin_sources()
}

pub fn builtin_sources() -> Result<Vec<SourceSeed>> {
    parse_toml(BUILTIN_SOURCES_TOML).context("parsing built-in sources")
}

fn parse_sources(s: &str, hint_ext: &str) -> Result<Vec<SourceSeed>> {
    if hint_ext == "json" {
        return parse_json(s);
    }
    parse_toml(s).or_else(|toml_err| {
        parse_json(s).map_err(|_| anyhow!("unsupported sources format: {toml_err}"))
    })
}

fn parse_toml(s: &str) -> Result<Vec<SourceSeed>> {
    #[derive(serde::Deserialize)]
    struct TomlSources {
        sources: Vec<SourceSeed>,
    }
    let v: TomlSources = toml::from_str(s)?;
    Ok(clean_list(v.sources))
}

/// Either a bare array or `{ "sources": [...] }`.
fn parse_json(s: &str) -> Result<Vec<SourceSeed>> {
    #[derive(serde::Deserialize)]
    #[serde(untagged)]
    enum JsonSources {
        Bare(Vec<SourceSeed>),
        Wrapped { sources: Vec<SourceSeed> },
    }
    let v = match serde_json::from_str::<JsonSources>(s)? {
        JsonSources::Bare(v) | JsonSources::Wrapped { sources: v } => v,
    };
    Ok(clean_list(v))
}

/// Trim, drop blank URLs and repeated URLs (first wins).
fn clean_list(items: Vec<SourceSeed>) -> Vec<SourceSeed> {
    use std::collections::HashSet;
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter_map(|mut it| {
            it.name = it.name.trim().to_string();
            it.url = it.url.trim().to_string();
            if it.url.is_empty() || !seen.insert(it.url.clone()) {
                return None;
            }
            if it.name.is_empty() {
                it.name = it.url.clone();
            }
            Some(it)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{env, fs};

    #[test]
    fn builtin_list_parses() {
        let v = builtin_sources().unwrap();
        assert!(v.len() >= 5);
        assert!(v.iter().all(|s| s.url.starts_with("https://")));
    }

    #[test]
    fn dedup_trim_and_formats_work() {
        let toml = r#"
[[sources]]
name = " A "
url = "https://a.example/rss"
priority = 2

[[sources]]
name = "dup"
url = " https://a.example/rss "

[[sources]]
name = ""
url = "https://b.example/rss"
enabled = false
"#;
        let out = parse_sources(toml, "toml").unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].name, "A");
        assert_eq!(out[0].priority, 2);
        assert_eq!(out[1].name, "https://b.example/rss");
        assert!(!out[1].enabled);

        let json = r#"[{"name":"C","url":"https://c.example/rss"}]"#;
        let out = parse_sources(json, "json").unwrap();
        assert_eq!(out[0].priority, 1);
        assert!(out[0].enabled);

        let wrapped = r#"{"sources":[{"name":"D","url":"https://d.example/rss"}]}"#;
        assert_eq!(parse_sources(wrapped, "").unwrap()[0].name, "D");
    }

    #[serial_test::serial]
    #[test]
    fn default_uses_env_then_fallbacks() {
        // isolate CWD so the repo's config/ does not interfere
        let old = env::current_dir().unwrap();
        let tmp = tempfile::tempdir().unwrap();
        env::set_current_dir(tmp.path()).unwrap();
        env::remove_var(ENV_SOURCES_CONFIG_PATH);

        // no files → built-in list
        let v = load_sources_default().unwrap();
        assert_eq!(v, builtin_sources().unwrap());

        // env wins
        let p_json = tmp.path().join("sources.json");
        fs::write(&p_json, r#"[{"name":"X","url":"https://x.example/rss"}]"#).unwrap();
        env::set_var(ENV_SOURCES_CONFIG_PATH, p_json.display().to_string());
        let v2 = load_sources_default().unwrap();
        assert_eq!(v2.len(), 1);
        assert_eq!(v2[0].name, "X");

        // env pointing nowhere is an error
        env::set_var(ENV_SOURCES_CONFIG_PATH, tmp.path().join("missing.toml"));
        assert!(load_sources_default().is_err());
        env::remove_var(ENV_SOURCES_CONFIG_PATH);

        env::set_current_dir(&old).unwrap();
    }
}
