//! AI adapter: provider abstraction + file cache + daily limit.
//!
//! The pipeline only sees the [`Analyst`] trait. Concrete providers do a
//! real chat-completions call and return structured analysis; the caching
//! wrapper keys results on a content hash so re-enrichment of identical
//! text never burns quota.

use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::article::{DetailedSummary, SECTION_PLACEHOLDER};
use crate::bias::BiasLabel;

// ------------------------------------------------------------
// Public surface
// ------------------------------------------------------------

/// Structured result of one article analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub tldr: String,
    pub sections: DetailedSummary,
    pub topic_tags: Vec<String>,
    pub keywords: Vec<String>,
    /// Article-level bias read from the content itself; `None` when the
    /// model declined or returned an unrecognized label.
    pub content_bias: Option<BiasLabel>,
}

/// Per-item analysis failure. Transient: drives the enricher's
/// retry-ceiling state machine, never aborts a batch.
#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    #[error("analysis timed out")]
    Timeout,
    #[error("upstream analysis error: {0}")]
    Upstream(String),
    #[error("malformed analysis response: {0}")]
    Malformed(String),
    #[error("daily analysis limit reached")]
    LimitExhausted,
    #[error("analysis disabled")]
    Disabled,
}

/// Trait object used by the enricher and tests.
#[async_trait]
pub trait Analyst: Send + Sync {
    async fn analyze(&self, raw_content: &str) -> Result<AnalysisResult, AnalysisError>;
    /// Provider name for diagnostics/logging.
    fn provider_name(&self) -> &'static str;
}

/// Convenient alias used by callers.
pub type DynAnalyst = Arc<dyn Analyst>;

/// Build-time config loaded from `config/ai.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalystConfig {
    pub enabled: bool,
    /// "openai" is the only real provider today.
    pub provider: Option<String>,
    /// Optional per-day limit; defaults to 200 if absent.
    pub daily_limit: Option<u32>,
    /// Optional model override; defaults to gpt-4o-mini.
    pub model: Option<String>,
}

impl Default for AnalystConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            provider: None,
            daily_limit: Some(200),
            model: None,
        }
    }
}

/// Load config from `config/ai.json`. If reading/parsing fails, returns
/// `AnalystConfig::default()`.
pub fn load_analyst_config() -> AnalystConfig {
    let path = Path::new("config/ai.json");
    match fs::read_to_string(path) {
        Ok(s) => serde_json::from_str(&s).unwrap_or_default(),
        Err(_) => AnalystConfig::default(),
    }
}

/// Reads config from disk and builds an analyst.
pub fn build_analyst() -> DynAnalyst {
    let cfg = load_analyst_config();
    build_analyst_from_config(&cfg)
}

/// Factory: build an analyst according to config and environment.
///
/// * If `AI_TEST_MODE=mock`, returns a deterministic mock.
/// * Else if `config.enabled == false`, returns a disabled analyst.
/// * Else builds the real provider wrapped with caching + daily limit.
pub fn build_analyst_from_config(config: &AnalystConfig) -> DynAnalyst {
    if std::env::var("AI_TEST_MODE")
        .map(|v| v == "mock")
        .unwrap_or(false)
    {
        let mock = MockAnalyst::canned();
        let client = CachingAnalyst::new(
            mock,
            default_cache_dir(),
            config.daily_limit.unwrap_or(200),
        );
        return Arc::new(client);
    }

    if !config.enabled {
        return Arc::new(DisabledAnalyst);
    }

    match config.provider.as_deref() {
        Some("openai") => {
            let provider = OpenAiAnalyst::new(config.model.as_deref());
            let client = CachingAnalyst::new(
                provider,
                default_cache_dir(),
                config.daily_limit.unwrap_or(200),
            );
            Arc::new(client)
        }
        _ => Arc::new(DisabledAnalyst),
    }
}

// ------------------------------------------------------------
// Concrete providers
// ------------------------------------------------------------

/// OpenAI provider (Chat Completions API). Requires `OPENAI_API_KEY`.
pub struct OpenAiAnalyst {
    http: reqwest::Client,
    api_key: String,
    model: String,
}

impl OpenAiAnalyst {
    /// `model_override`: pass Some("gpt-4o-mini") to override; defaults to
    /// gpt-4o-mini.
    pub fn new(model_override: Option<&str>) -> Self {
        let api_key = std::env::var("OPENAI_API_KEY").unwrap_or_default();
        let http = reqwest::Client::builder()
            .user_agent("news-prism/0.1 (+analysis)")
            .connect_timeout(Duration::from_secs(4))
            .timeout(Duration::from_secs(30))
            .build()
            .expect("reqwest client");
        let model = model_override.unwrap_or("gpt-4o-mini").to_string();
        Self {
            http,
            api_key,
            model,
        }
    }
}

const ANALYSIS_SYSTEM_PROMPT: &str = "You analyze one news article and reply with a single JSON \
object, no markdown fences, with exactly these fields: \
\"tldr\" (2-3 sentence summary, max 50 words), \
\"what_happened\", \"impact\", \"conclusion\" (one short paragraph each), \
\"bias_label\" (one of \"Left\", \"Lean Left\", \"Center\", \"Lean Right\", \"Right\"), \
\"topic_tags\" (3-5 short tags), \"keywords\" (5-10 lowercase keywords). \
Output only the JSON object.";

#[async_trait]
impl Analyst for OpenAiAnalyst {
    async fn analyze(&self, raw_content: &str) -> Result<AnalysisResult, AnalysisError> {
        if self.api_key.is_empty() {
            return Err(AnalysisError::Upstream("missing OPENAI_API_KEY".into()));
        }

        #[derive(Serialize)]
        struct Msg<'a> {
            role: &'a str,
            content: &'a str,
        }
        #[derive(Serialize)]
        struct Req<'a> {
            model: &'a str,
            messages: Vec<Msg<'a>>,
            temperature: f32,
            max_tokens: u32,
        }
        #[derive(Deserialize)]
        struct Resp {
            choices: Vec<Choice>,
        }
        #[derive(Deserialize)]
        struct Choice {
            message: ChoiceMsg,
        }
        #[derive(Deserialize)]
        struct ChoiceMsg {
            content: String,
        }

        let req = Req {
            model: &self.model,
            messages: vec![
                Msg {
                    role: "system",
                    content: ANALYSIS_SYSTEM_PROMPT,
                },
                Msg {
                    role: "user",
                    content: raw_content,
                },
            ],
            temperature: 0.2,
            max_tokens: 700,
        };

        let resp = self
            .http
            .post("https://api.openai.com/v1/chat/completions")
            .bearer_auth(&self.api_key)
            .json(&req)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AnalysisError::Timeout
                } else {
                    AnalysisError::Upstream(e.to_string())
                }
            })?;

        if !resp.status().is_success() {
            return Err(AnalysisError::Upstream(format!(
                "HTTP {}",
                resp.status().as_u16()
            )));
        }
        let body: Resp = resp
            .json()
            .await
            .map_err(|e| AnalysisError::Malformed(e.to_string()))?;
        let content = body
            .choices
            .first()
            .map(|c| c.message.content.as_str())
            .unwrap_or("");
        parse_analysis_json(content)
    }

    fn provider_name(&self) -> &'static str {
        "openai"
    }
}

/// Always fails with [`AnalysisError::Disabled`]; used when AI is off.
pub struct DisabledAnalyst;

#[async_trait]
impl Analyst for DisabledAnalyst {
    async fn analyze(&self, _raw_content: &str) -> Result<AnalysisResult, AnalysisError> {
        Err(AnalysisError::Disabled)
    }
    fn provider_name(&self) -> &'static str {
        "disabled"
    }
}

/// Deterministic mock for tests/local runs.
#[derive(Clone)]
pub struct MockAnalyst {
    pub fixed: AnalysisResult,
}

impl MockAnalyst {
    pub fn canned() -> Self {
        Self {
            fixed: AnalysisResult {
                tldr: "Mock summary of the article.".to_string(),
                sections: DetailedSummary {
                    what_happened: "Mock event description.".to_string(),
                    impact: "Mock impact description.".to_string(),
                    conclusion: "Mock conclusion.".to_string(),
                },
                topic_tags: vec!["Mock".to_string()],
                keywords: vec!["mock".to_string()],
                content_bias: Some(BiasLabel::Center),
            },
        }
    }
}

#[async_trait]
impl Analyst for MockAnalyst {
    async fn analyze(&self, _raw_content: &str) -> Result<AnalysisResult, AnalysisError> {
        Ok(self.fixed.clone())
    }
    fn provider_name(&self) -> &'static str {
        "mock"
    }
}

// ------------------------------------------------------------
// Response parsing
// ------------------------------------------------------------

#[derive(Deserialize)]
struct RawAnalysis {
    #[serde(default)]
    tldr: String,
    #[serde(default)]
    what_happened: String,
    #[serde(default)]
    impact: String,
    #[serde(default)]
    conclusion: String,
    #[serde(default)]
    bias_label: Option<String>,
    #[serde(default)]
    topic_tags: Vec<String>,
    #[serde(default)]
    keywords: Vec<String>,
}

/// Parse the model's JSON payload. Tolerates markdown fences; missing
/// detailed sections are filled with the explicit placeholder rather than
/// dropped. An empty tldr means the response is unusable.
pub fn parse_analysis_json(content: &str) -> Result<AnalysisResult, AnalysisError> {
    let stripped = content
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();
    let raw: RawAnalysis = serde_json::from_str(stripped)
        .map_err(|e| AnalysisError::Malformed(e.to_string()))?;

    if raw.tldr.trim().is_empty() {
        return Err(AnalysisError::Malformed("empty tldr".into()));
    }

    let section = |s: String| {
        let t = s.trim().to_string();
        if t.is_empty() {
            SECTION_PLACEHOLDER.to_string()
        } else {
            t
        }
    };

    Ok(AnalysisResult {
        tldr: raw.tldr.trim().to_string(),
        sections: DetailedSummary {
            what_happened: section(raw.what_happened),
            impact: section(raw.impact),
            conclusion: section(raw.conclusion),
        },
        topic_tags: clean_terms(raw.topic_tags),
        keywords: clean_terms(raw.keywords),
        content_bias: raw.bias_label.as_deref().and_then(BiasLabel::parse),
    })
}

fn clean_terms(terms: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = terms
        .into_iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect();
    out.dedup();
    out
}

// ------------------------------------------------------------
// Caching wrapper (file cache + daily limit)
// ------------------------------------------------------------

/// File names and counter state are guarded by a `Mutex` to keep it simple
/// and safe. Cache hits do not count against the daily limit.
pub struct CachingAnalyst<A: Analyst> {
    inner: A,
    cache_dir: PathBuf,
    daily_limit_max: u32,
    counter: Arc<Mutex<DailyCounter>>,
}

impl<A: Analyst> CachingAnalyst<A> {
    pub fn new(inner: A, cache_dir: PathBuf, daily_limit_max: u32) -> Self {
        let _ = fs::create_dir_all(&cache_dir); // best-effort
        let counter = Arc::new(Mutex::new(
            load_daily_counter(&cache_dir).unwrap_or_default(),
        ));
        Self {
            inner,
            cache_dir,
            daily_limit_max,
            counter,
        }
    }
}

#[async_trait]
impl<A: Analyst> Analyst for CachingAnalyst<A> {
    async fn analyze(&self, raw_content: &str) -> Result<AnalysisResult, AnalysisError> {
        // 1) Cache lookup.
        let key = cache_key(raw_content);
        if let Some(hit) = read_cache_file(&self.cache_dir, &key) {
            return Ok(hit);
        }

        // 2) Check daily limit (real calls only increment; cache hits do not).
        {
            let mut g = self.counter.lock().expect("poisoned counter");
            if g.is_expired() {
                g.reset_to_today();
                let _ = save_daily_counter(&self.cache_dir, &g);
            }
            if g.count >= self.daily_limit_max {
                return Err(AnalysisError::LimitExhausted);
            }
        }

        // 3) Real call.
        let fresh = self.inner.analyze(raw_content).await?;
        let _ = write_cache_file(&self.cache_dir, &key, &fresh);
        let mut g = self.counter.lock().expect("poisoned counter");
        g.count = g.count.saturating_add(1);
        let _ = save_daily_counter(&self.cache_dir, &g);
        Ok(fresh)
    }

    fn provider_name(&self) -> &'static str {
        self.inner.provider_name()
    }
}

// ------------------------------------------------------------
// File cache helpers
// ------------------------------------------------------------

fn default_cache_dir() -> PathBuf {
    PathBuf::from("cache/ai")
}

fn cache_key(input: &str) -> String {
    let digest = Sha256::digest(input.as_bytes());
    // 16 hex chars is plenty for a local cache namespace.
    digest.iter().take(8).map(|b| format!("{b:02x}")).collect()
}

fn cache_path(dir: &Path, key: &str) -> PathBuf {
    dir.join(format!("{key}.json"))
}

fn read_cache_file(dir: &Path, key: &str) -> Option<AnalysisResult> {
    let path = cache_path(dir, key);
    let mut file = fs::File::open(path).ok()?;
    let mut buf = String::new();
    file.read_to_string(&mut buf).ok()?;
    serde_json::from_str(&buf).ok()
}

fn write_cache_file(dir: &Path, key: &str, value: &AnalysisResult) -> io::Result<()> {
    let path = cache_path(dir, key);
    let tmp = path.with_extension("json.tmp");
    let json = serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string());
    let mut f = fs::File::create(&tmp)?;
    f.write_all(json.as_bytes())?;
    fs::rename(tmp, path)?;
    Ok(())
}

// ------------------------------------------------------------
// Daily counter helpers
// ------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
struct DailyCounter {
    date: String,
    count: u32,
}
impl Default for DailyCounter {
    fn default() -> Self {
        Self {
            date: today(),
            count: 0,
        }
    }
}
impl DailyCounter {
    fn is_expired(&self) -> bool {
        self.date != today()
    }
    fn reset_to_today(&mut self) {
        self.date = today();
        self.count = 0;
    }
}

fn today() -> String {
    // Days since UNIX epoch (string). Sufficient for equality and rollover.
    use std::time::{SystemTime, UNIX_EPOCH};
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_else(|_| std::time::Duration::from_secs(0))
        .as_secs();
    let days = secs / 86_400;
    days.to_string()
}

fn counter_path(dir: &Path) -> PathBuf {
    dir.join("daily_count.json")
}

fn load_daily_counter(dir: &Path) -> io::Result<DailyCounter> {
    let p = counter_path(dir);
    let s = fs::read_to_string(p)?;
    let dc: DailyCounter =
        serde_json::from_str(&s).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    Ok(dc)
}

fn save_daily_counter(dir: &Path, dc: &DailyCounter) -> io::Result<()> {
    let p = counter_path(dir);
    let tmp = p.with_extension("json.tmp");
    let s = serde_json::to_string(dc).unwrap_or_else(|_| "{}".to_string());
    let mut f = fs::File::create(&tmp)?;
    f.write_all(s.as_bytes())?;
    fs::rename(tmp, p)?;
    Ok(())
}
