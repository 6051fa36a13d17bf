//! # Post Generator
//! Renders one post per supported platform from an approved article.
//! Pure: no I/O, storing the batch is the caller's transaction.
//!
//! Platforms are a closed enum; each variant maps to its own formatter and
//! shares the hashtag derivation (base tags, then one tag per matched
//! category, capped per platform; platform extras appended after the cap;
//! deduplicated throughout).

use serde::Deserialize;
use std::collections::{HashMap, HashSet};

use crate::categorize::CategoryCfg;
use crate::model::{Article, NewPost, Platform};

pub const ELLIPSIS: &str = "...";
pub const X_MAX_CHARS: usize = 280;
const FACEBOOK_SUMMARY_CHARS: usize = 400;
const INSTAGRAM_SUMMARY_CHARS: usize = 300;
const TIKTOK_TITLE_CHARS: usize = 100;

/* ----------------------------
Config schema (from TOML)
---------------------------- */

#[derive(Debug, Clone, Deserialize)]
pub struct HashtagCfg {
    #[serde(default)]
    pub base: Vec<String>,
    /// How many of `base` lead every tag list.
    #[serde(default = "default_base_take")]
    pub base_take: usize,
}

impl Default for HashtagCfg {
    fn default() -> Self {
        Self {
            base: Vec::new(),
            base_take: default_base_take(),
        }
    }
}

fn default_base_take() -> usize {
    3
}

/// Per-platform knobs. Unset values fall back to the platform defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PlatformRules {
    /// Cap on base + category tags; `extra_tags` come on top.
    pub max_tags: Option<usize>,
    pub max_chars: Option<usize>,
    pub summary_chars: Option<usize>,
    pub title_chars: Option<usize>,
    #[serde(default)]
    pub extra_tags: Vec<String>,
    pub follow_line: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PlatformsCfg {
    #[serde(default)]
    pub x: PlatformRules,
    #[serde(default)]
    pub facebook: PlatformRules,
    #[serde(default)]
    pub instagram: PlatformRules,
    #[serde(default)]
    pub tiktok: PlatformRules,
}

impl PlatformsCfg {
    pub fn rules(&self, platform: Platform) -> &PlatformRules {
        match platform {
            Platform::X => &self.x,
            Platform::Facebook => &self.facebook,
            Platform::Instagram => &self.instagram,
            Platform::TikTok => &self.tiktok,
        }
    }
}

/// Tag cap used when the config does not set one.
pub fn default_tag_cap(platform: Platform) -> usize {
    match platform {
        Platform::X => 3,
        Platform::Facebook | Platform::Instagram => 5,
        Platform::TikTok => 4,
    }
}

/* ----------------------------
Generator
---------------------------- */

#[derive(Debug, Clone)]
pub struct PostGenerator {
    base: Vec<String>,
    category_tags: HashMap<String, String>,
    platforms: PlatformsCfg,
}

impl PostGenerator {
    pub fn new(hashtags: &HashtagCfg, categories: &[CategoryCfg], platforms: &PlatformsCfg) -> Self {
        let base = hashtags
            .base
            .iter()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .take(hashtags.base_take)
            .collect();
        let category_tags = categories
            .iter()
            .filter_map(|c| {
                c.hashtags
                    .first()
                    .map(|t| (c.name.trim().to_string(), t.trim().to_string()))
            })
            .collect();
        Self {
            base,
            category_tags,
            platforms: platforms.clone(),
        }
    }

    /// Exactly one post per platform, in `Platform::ALL` order.
    pub fn generate(&self, article: &Article) -> Vec<NewPost> {
        Platform::ALL
            .iter()
            .map(|p| self.render(*p, article))
            .collect()
    }

    pub fn render(&self, platform: Platform, article: &Article) -> NewPost {
        let tags = self.hashtags(platform, article);
        let tag_line = tags.join(" ");
        let content = match platform {
            Platform::X => self.format_x(article, &tag_line),
            Platform::Facebook => self.format_facebook(article, &tag_line),
            Platform::Instagram => self.format_instagram(article, &tag_line),
            Platform::TikTok => self.format_tiktok(article, &tag_line),
        };
        NewPost {
            platform,
            content,
            hashtags: tags,
            media_url: article.image_url.clone(),
        }
    }

    pub fn hashtags(&self, platform: Platform, article: &Article) -> Vec<String> {
        let rules = self.platforms.rules(platform);
        let cap = rules.max_tags.unwrap_or_else(|| default_tag_cap(platform));

        let category_tags = article
            .category_list()
            .into_iter()
            .filter_map(|c| self.category_tags.get(c).cloned());

        let mut seen = HashSet::new();
        let mut tags: Vec<String> = self
            .base
            .iter()
            .cloned()
            .chain(category_tags)
            .filter(|t| !t.is_empty())
            .filter(|t| seen.insert(t.to_lowercase()))
            .take(cap)
            .collect();
        tags.extend(
            rules
                .extra_tags
                .iter()
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .filter(|t| seen.insert(t.to_lowercase())),
        );
        tags
    }

    fn format_x(&self, article: &Article, tag_line: &str) -> String {
        let max_chars = self.platforms.x.max_chars.unwrap_or(X_MAX_CHARS);
        let url = article.url.trim();
        // two "\n\n" separators
        let fixed = char_len(url) + char_len(tag_line) + 4;
        let title = ellipsize(article.title.trim(), max_chars.saturating_sub(fixed));
        let content = format!("{title}\n\n{url}\n\n{tag_line}");
        // only reachable with pathological URLs; the ceiling still holds
        ellipsize(&content, max_chars)
    }

    fn format_facebook(&self, article: &Article, tag_line: &str) -> String {
        let limit = self
            .platforms
            .facebook
            .summary_chars
            .unwrap_or(FACEBOOK_SUMMARY_CHARS);
        paragraphs([
            format!("📰 {}", article.title.trim()),
            ellipsize(lead_text(article), limit),
            format!("🔗 Read more: {}", article.url.trim()),
            tag_line.to_string(),
        ])
    }

    fn format_instagram(&self, article: &Article, tag_line: &str) -> String {
        let rules = &self.platforms.instagram;
        let limit = rules.summary_chars.unwrap_or(INSTAGRAM_SUMMARY_CHARS);
        paragraphs([
            format!("🇸🇸 {}", article.title.trim()),
            ellipsize(lead_text(article), limit),
            rules.follow_line.clone().unwrap_or_default(),
            format!(".\n.\n.\n{tag_line}"),
        ])
    }

    fn format_tiktok(&self, article: &Article, tag_line: &str) -> String {
        let rules = &self.platforms.tiktok;
        let limit = rules.title_chars.unwrap_or(TIKTOK_TITLE_CHARS);
        paragraphs([
            format!("🚨 BREAKING: {}", ellipsize(article.title.trim(), limit)),
            rules.follow_line.clone().unwrap_or_default(),
            tag_line.to_string(),
        ])
    }
}

/// Summary when present, otherwise the (possibly long) content.
fn lead_text(article: &Article) -> &str {
    let summary = article.summary.trim();
    if summary.is_empty() {
        article.content.trim()
    } else {
        summary
    }
}

fn paragraphs<const N: usize>(parts: [String; N]) -> String {
    parts
        .into_iter()
        .filter(|p| !p.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub(crate) fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Cut `s` to at most `max` chars, ending in `...` when something was dropped.
pub fn ellipsize(s: &str, max: usize) -> String {
    if char_len(s) <= max {
        return s.to_string();
    }
    let ell = char_len(ELLIPSIS);
    if max <= ell {
        return s.chars().take(max).collect();
    }
    let head: String = s.chars().take(max - ell).collect();
    format!("{}{}", head.trim_end(), ELLIPSIS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CurationConfig;
    use crate::model::{ArticleId, ArticleStatus};
    use chrono::Utc;

    fn article(title: &str, categories: &str) -> Article {
        Article {
            id: ArticleId(1),
            url: "https://example.com/news/1".into(),
            title: title.into(),
            content: "Full body text.".into(),
            summary: "Leaders met in Juba on Tuesday.".into(),
            author: String::new(),
            source_name: "Test".into(),
            image_url: Some("https://example.com/img.jpg".into()),
            published_at: Utc::now(),
            fetched_at: Utc::now(),
            relevance_score: 0.6,
            categories: categories.into(),
            keywords: String::new(),
            word_count: 3,
            status: ArticleStatus::Approved,
            process_attempts: 0,
        }
    }

    fn generator() -> PostGenerator {
        let cfg = CurationConfig::builtin().expect("builtin config");
        cfg.post_generator()
    }

    #[test]
    fn one_post_per_platform() {
        let posts = generator().generate(&article("Peace talks resume", "Politics"));
        let platforms: Vec<_> = posts.iter().map(|p| p.platform).collect();
        assert_eq!(platforms, Platform::ALL.to_vec());
        assert!(posts
            .iter()
            .all(|p| p.media_url.as_deref() == Some("https://example.com/img.jpg")));
    }

    #[test]
    fn x_post_respects_ceiling_with_huge_title() {
        let title = "A".repeat(1000);
        let post = generator().render(Platform::X, &article(&title, "Politics,Conflict"));
        assert!(char_len(&post.content) <= X_MAX_CHARS, "{}", char_len(&post.content));
        let first_line = post.content.lines().next().unwrap_or_default();
        assert!(first_line.ends_with(ELLIPSIS));
        assert!(post.content.contains("https://example.com/news/1"));
    }

    #[test]
    fn x_post_keeps_short_title_intact() {
        let post = generator().render(Platform::X, &article("Juba floods", ""));
        assert!(post.content.starts_with("Juba floods\n\n"));
        assert!(!post.content.contains(ELLIPSIS));
    }

    #[test]
    fn x_ceiling_holds_even_for_absurd_urls() {
        let mut a = article("Title", "");
        a.url = format!("https://example.com/{}", "x".repeat(400));
        let post = generator().render(Platform::X, &a);
        assert!(char_len(&post.content) <= X_MAX_CHARS);
    }

    #[test]
    fn hashtags_are_deduplicated_and_capped() {
        let gen = generator();
        let a = article("t", "Politics,Conflict,Humanitarian,Economy");
        for p in Platform::ALL {
            let tags = gen.hashtags(p, &a);
            let uniq: HashSet<_> = tags.iter().map(|t| t.to_lowercase()).collect();
            assert_eq!(uniq.len(), tags.len(), "{p}: {tags:?}");
        }
        assert_eq!(gen.hashtags(Platform::X, &a).len(), 3);
        assert_eq!(gen.hashtags(Platform::Facebook, &a).len(), 5);
        assert_eq!(gen.hashtags(Platform::Instagram, &a).len(), 8);
        assert_eq!(gen.hashtags(Platform::TikTok, &a).len(), 7);
    }

    #[test]
    fn platform_extras_survive_a_full_category_list() {
        let gen = generator();
        let a = article("t", "Politics,Conflict,Humanitarian,Economy");

        let ig = gen.hashtags(Platform::Instagram, &a);
        assert_eq!(&ig[..3], &["#SouthSudan", "#Juba", "#JunubTimes"]);
        assert_eq!(&ig[5..], &["#News", "#Breaking", "#Africa"]);

        let tiktok = gen.hashtags(Platform::TikTok, &a);
        assert_eq!(tiktok.len(), 7);
        assert_eq!(&tiktok[4..], &["#NewsUpdate", "#BreakingNews", "#FYP"]);
    }

    #[test]
    fn category_tag_follows_base_tags() {
        let tags = generator().hashtags(Platform::Facebook, &article("t", "Health"));
        assert_eq!(tags, vec!["#SouthSudan", "#Juba", "#JunubTimes", "#Health"]);
    }

    #[test]
    fn duplicate_extras_collapse() {
        let hashtags = HashtagCfg {
            base: vec!["#Africa".into(), "#News".into()],
            base_take: 2,
        };
        let platforms = PlatformsCfg {
            instagram: PlatformRules {
                max_tags: Some(10),
                extra_tags: vec!["#news".into(), "#Africa".into(), "#Extra".into()],
                ..PlatformRules::default()
            },
            ..PlatformsCfg::default()
        };
        let gen = PostGenerator::new(&hashtags, &[], &platforms);
        assert_eq!(
            gen.hashtags(Platform::Instagram, &article("t", "")),
            vec!["#Africa", "#News", "#Extra"]
        );
    }

    #[test]
    fn facebook_falls_back_to_content_and_truncates() {
        let mut a = article("Title", "");
        a.summary = String::new();
        a.content = "word ".repeat(200);
        let post = generator().render(Platform::Facebook, &a);
        assert!(post.content.starts_with("📰 Title\n\n"));
        assert!(post.content.contains("...\n\n🔗 Read more: https://example.com/news/1"));
    }

    #[test]
    fn tiktok_title_is_capped() {
        let post = generator().render(Platform::TikTok, &article(&"B".repeat(300), ""));
        let first = post.content.lines().next().unwrap_or_default();
        assert_eq!(char_len(first), char_len("🚨 BREAKING: ") + 100);
        assert!(first.ends_with(ELLIPSIS));
    }

    #[test]
    fn ellipsize_edges() {
        assert_eq!(ellipsize("abc", 3), "abc");
        assert_eq!(ellipsize("abcdef", 2), "ab");
        assert_eq!(ellipsize("abcdef", 5), "ab...");
        assert_eq!(ellipsize("ééééé", 4), "é...");
    }
}
