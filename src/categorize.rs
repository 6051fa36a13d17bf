//! Topical tagging against a fixed taxonomy.
//!
//! Categories are checked in declaration order and the first `max_categories`
//! matches win. This is not a ranking.

use serde::Deserialize;

pub const DEFAULT_MAX_CATEGORIES: usize = 4;

#[derive(Debug, Clone, Deserialize)]
pub struct CategoryCfg {
    pub name: String,
    pub triggers: Vec<String>,
    /// Only the first entry is used when deriving post hashtags.
    #[serde(default)]
    pub hashtags: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CategorizeSection {
    #[serde(default = "default_max_categories")]
    pub max_categories: usize,
}

impl Default for CategorizeSection {
    fn default() -> Self {
        Self {
            max_categories: DEFAULT_MAX_CATEGORIES,
        }
    }
}

fn default_max_categories() -> usize {
    DEFAULT_MAX_CATEGORIES
}

#[derive(Debug)]
struct CompiledCategory {
    name: String,
    triggers: Vec<String>,
}

#[derive(Debug)]
pub struct Categorizer {
    categories: Vec<CompiledCategory>,
    max: usize,
}

impl Categorizer {
    pub fn new(section: &CategorizeSection, categories: &[CategoryCfg]) -> Self {
        let categories = categories
            .iter()
            .map(|c| CompiledCategory {
                name: c.name.trim().to_string(),
                triggers: c
                    .triggers
                    .iter()
                    .map(|t| t.trim().to_lowercase())
                    .filter(|t| !t.is_empty())
                    .collect(),
            })
            .filter(|c| !c.name.is_empty())
            .collect();
        Self {
            categories,
            max: section.max_categories,
        }
    }

    /// Build from a TOML string carrying `[categorize]` and `[[categories]]`.
    pub fn from_toml_str(toml_str: &str) -> anyhow::Result<Self> {
        #[derive(Deserialize)]
        struct Root {
            #[serde(default)]
            categorize: CategorizeSection,
            #[serde(default)]
            categories: Vec<CategoryCfg>,
        }
        let root: Root = toml::from_str(toml_str)?;
        Ok(Self::new(&root.categorize, &root.categories))
    }

    pub fn categorize(&self, text: &str) -> Vec<String> {
        let haystack = text.to_lowercase();
        self.categories
            .iter()
            .filter(|c| c.triggers.iter().any(|t| haystack.contains(t.as_str())))
            .take(self.max)
            .map(|c| c.name.clone())
            .collect()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.categories.iter().map(|c| c.name.as_str())
    }
}
