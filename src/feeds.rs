//! # Feed source registry
//!
//! Static configuration mapping each RSS feed URL to a category and an
//! outlet-level bias prior. Loaded from TOML or JSON with an env-var
//! override path and a built-in seed fallback; immutable at runtime and
//! re-read once per harvest trigger.

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::bias::BiasLabel;

const ENV_PATH: &str = "NEWS_FEEDS_PATH";
const DEFAULT_TOML: &str = "config/feeds.toml";
const DEFAULT_JSON: &str = "config/feeds.json";

/// One configured RSS feed. `bias_prior` absent means the outlet's lean is
/// unknown and classification falls through to the content signal.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FeedSource {
    pub url: String,
    pub category: String,
    #[serde(default)]
    pub bias_prior: Option<BiasLabel>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FeedRegistry {
    #[serde(default)]
    pub feeds: Vec<FeedSource>,
}

impl FeedRegistry {
    /// Load from an explicit path. Format chosen by extension, with the
    /// other format as fallback.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading feed registry from {}", path.display()))?;
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        parse_registry(&content, ext.as_str())
    }

    /// Load using env var + fallbacks:
    /// 1) $NEWS_FEEDS_PATH
    /// 2) config/feeds.toml
    /// 3) config/feeds.json
    /// 4) built-in seed
    pub fn load_default() -> Result<Self> {
        if let Ok(p) = std::env::var(ENV_PATH) {
            let pb = PathBuf::from(p);
            if pb.exists() {
                return Self::load_from(&pb);
            }
            return Err(anyhow!("NEWS_FEEDS_PATH points to non-existent path"));
        }
        let toml_p = PathBuf::from(DEFAULT_TOML);
        if toml_p.exists() {
            return Self::load_from(&toml_p);
        }
        let json_p = PathBuf::from(DEFAULT_JSON);
        if json_p.exists() {
            return Self::load_from(&json_p);
        }
        Ok(Self::default_seed())
    }

    pub fn is_empty(&self) -> bool {
        self.feeds.is_empty()
    }

    pub fn len(&self) -> usize {
        self.feeds.len()
    }

    /// Built-in seed covering the four launch categories. Used as fallback
    /// if no config file is present.
    pub fn default_seed() -> Self {
        fn feed(url: &str, category: &str, prior: Option<BiasLabel>) -> FeedSource {
            FeedSource {
                url: url.to_string(),
                category: category.to_string(),
                bias_prior: prior,
            }
        }
        Self {
            feeds: vec![
                feed(
                    "http://feeds.bbci.co.uk/news/politics/rss.xml",
                    "Politics",
                    Some(BiasLabel::Center),
                ),
                feed(
                    "https://rss.nytimes.com/services/xml/rss/nyt/Politics.xml",
                    "Politics",
                    Some(BiasLabel::LeanLeft),
                ),
                feed(
                    "http://feeds.bbci.co.uk/news/world/rss.xml",
                    "International",
                    Some(BiasLabel::Center),
                ),
                feed(
                    "https://www.aljazeera.com/xml/rss/all.xml",
                    "International",
                    Some(BiasLabel::LeanLeft),
                ),
                feed(
                    "https://www.eonline.com/news/rss.xml",
                    "Entertainment",
                    None,
                ),
                feed(
                    "https://rss.nytimes.com/services/xml/rss/nyt/Movies.xml",
                    "Entertainment",
                    Some(BiasLabel::LeanLeft),
                ),
                feed("https://www.espn.com/espn/rss/news", "Sports", None),
                feed("http://feeds.bbci.co.uk/sport/rss.xml", "Sports", Some(BiasLabel::Center)),
            ],
        }
    }
}

fn parse_registry(s: &str, hint_ext: &str) -> Result<FeedRegistry> {
    let try_toml = hint_ext == "toml" || s.contains("[[feeds]]");
    if try_toml {
        if let Ok(v) = toml::from_str::<FeedRegistry>(s) {
            return Ok(v);
        }
    }
    if let Ok(v) = serde_json::from_str::<FeedRegistry>(s) {
        return Ok(v);
    }
    if !try_toml {
        if let Ok(v) = toml::from_str::<FeedRegistry>(s) {
            return Ok(v);
        }
    }
    Err(anyhow!("unsupported feed registry format"))
}
