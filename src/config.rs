use std::collections::HashSet;
use std::env;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::policy::basic::{HellthreadPolicy, NoopPolicy, PubkeyBanPolicy, ReadOnlyPolicy};
use crate::policy::duplicate::{DuplicateOptions, DuplicatePolicy};
use crate::policy::keywords::KeywordPolicy;
use crate::policy::moderation::{
    default_handler, score_threshold_handler, ModerationOptions, ModerationPolicy, RejectAction,
};
use crate::policy::rate_limit::{RateLimitOptions, RateLimitPolicy};
use crate::policy::regex::RegexPolicy;
use crate::policy::{Pipeline, Policy};
use crate::store::CounterStore;

/// A policy that can be named in STRAINER_POLICIES.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyKind {
    Keywords,
    Regex,
    RateLimit,
    Moderation,
    PubkeyBan,
    Hellthread,
    AntiDuplication,
    ReadOnly,
    Noop,
}

impl PolicyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PolicyKind::Keywords => "keywords",
            PolicyKind::Regex => "regex",
            PolicyKind::RateLimit => "rate-limit",
            PolicyKind::Moderation => "moderation",
            PolicyKind::PubkeyBan => "pubkey-ban",
            PolicyKind::Hellthread => "hellthread",
            PolicyKind::AntiDuplication => "anti-duplication",
            PolicyKind::ReadOnly => "read-only",
            PolicyKind::Noop => "noop",
        }
    }
}

impl FromStr for PolicyKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "keywords" => Ok(PolicyKind::Keywords),
            "regex" => Ok(PolicyKind::Regex),
            "rate-limit" => Ok(PolicyKind::RateLimit),
            "moderation" => Ok(PolicyKind::Moderation),
            "pubkey-ban" => Ok(PolicyKind::PubkeyBan),
            "hellthread" => Ok(PolicyKind::Hellthread),
            "anti-duplication" => Ok(PolicyKind::AntiDuplication),
            "read-only" => Ok(PolicyKind::ReadOnly),
            "noop" => Ok(PolicyKind::Noop),
            other => anyhow::bail!("Unknown policy '{other}' in STRAINER_POLICIES"),
        }
    }
}

/// Central configuration loaded from environment variables.
///
/// The .env file is loaded automatically at startup via dotenvy. Every
/// setting has a default, so an empty environment yields a working
/// keywords + rate-limit pipeline that bans nothing.
#[derive(Debug, Clone)]
pub struct Config {
    pub db_path: String,
    /// Policies in evaluation order.
    pub policies: Vec<PolicyKind>,
    pub banned_words: Vec<String>,
    pub banned_patterns: Vec<String>,
    pub banned_pubkeys: Vec<String>,
    pub rate_limit: RateLimitOptions,
    pub moderation: ModerationOptions,
    /// When set, moderation uses the score-threshold handler instead of the default.
    pub moderation_score_threshold: Option<f64>,
    pub hellthread_limit: usize,
    pub duplicate: DuplicateOptions,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: "./strainer.db".to_string(),
            policies: vec![PolicyKind::Keywords, PolicyKind::RateLimit],
            banned_words: Vec::new(),
            banned_patterns: Vec::new(),
            banned_pubkeys: Vec::new(),
            rate_limit: RateLimitOptions {
                whitelist: HashSet::from(["127.0.0.1".to_string()]),
                ..Default::default()
            },
            moderation: ModerationOptions::default(),
            moderation_score_threshold: None,
            hellthread_limit: crate::policy::basic::DEFAULT_HELLTHREAD_LIMIT,
            duplicate: DuplicateOptions::default(),
        }
    }
}

impl Config {
    /// Load configuration from the process environment.
    pub fn load() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a config from any key lookup. `load` passes the environment;
    /// tests pass a map.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Config::default();

        if let Some(path) = lookup("STRAINER_DB_PATH") {
            config.db_path = path;
        }

        if let Some(raw) = lookup("STRAINER_POLICIES") {
            config.policies = split_list(&raw)
                .iter()
                .map(|name| name.parse::<PolicyKind>())
                .collect::<Result<_>>()?;
        }

        if let Some(raw) = lookup("STRAINER_BANNED_WORDS") {
            config.banned_words = split_list(&raw);
        }
        if let Some(raw) = lookup("STRAINER_BANNED_PATTERNS") {
            config.banned_patterns = split_list(&raw);
        }
        if let Some(raw) = lookup("STRAINER_BANNED_PUBKEYS") {
            config.banned_pubkeys = split_list(&raw);
        }

        if let Some(ms) = parse_var::<u64>(&lookup, "STRAINER_RATE_LIMIT_INTERVAL_MS")? {
            config.rate_limit.interval = Duration::from_millis(ms);
        }
        if let Some(max) = parse_var::<i64>(&lookup, "STRAINER_RATE_LIMIT_MAX")? {
            config.rate_limit.max = max;
        }
        if let Some(raw) = lookup("STRAINER_RATE_LIMIT_WHITELIST") {
            config.rate_limit.whitelist = split_list(&raw).into_iter().collect();
        }

        if let Some(url) = lookup("STRAINER_MODERATION_URL") {
            config.moderation.url = url;
        }
        if let Some(token) = lookup("STRAINER_MODERATION_TOKEN") {
            config.moderation.token = token;
        }
        if let Some(raw) = lookup("STRAINER_MODERATION_KINDS") {
            config.moderation.kinds = split_list(&raw)
                .iter()
                .map(|k| {
                    k.parse::<u64>()
                        .with_context(|| format!("STRAINER_MODERATION_KINDS: invalid kind '{k}'"))
                })
                .collect::<Result<_>>()?;
        }
        if let Some(ms) = parse_var::<u64>(&lookup, "STRAINER_MODERATION_TIMEOUT_MS")? {
            config.moderation.timeout = Duration::from_millis(ms);
        }
        if let Some(shadow) = parse_var::<bool>(&lookup, "STRAINER_MODERATION_SHADOW")? {
            config.moderation.action = if shadow {
                RejectAction::ShadowReject
            } else {
                RejectAction::Reject
            };
        }
        if let Some(accept) = parse_var::<bool>(&lookup, "STRAINER_MODERATION_ACCEPT_ON_FAIL")? {
            config.moderation.accept_on_fail = accept;
        }
        config.moderation_score_threshold =
            parse_var::<f64>(&lookup, "STRAINER_MODERATION_SCORE_THRESHOLD")?;
        config.moderation.handler = match config.moderation_score_threshold {
            Some(threshold) => score_threshold_handler(threshold),
            None => default_handler(),
        };

        if let Some(limit) = parse_var::<usize>(&lookup, "STRAINER_HELLTHREAD_LIMIT")? {
            config.hellthread_limit = limit;
        }

        if let Some(ms) = parse_var::<u64>(&lookup, "STRAINER_DUPLICATE_TTL_MS")? {
            config.duplicate.ttl = Duration::from_millis(ms);
        }
        if let Some(len) = parse_var::<usize>(&lookup, "STRAINER_DUPLICATE_MIN_LENGTH")? {
            config.duplicate.min_length = len;
        }

        Ok(config)
    }

    /// Whether any configured policy needs the counter store.
    pub fn needs_store(&self) -> bool {
        self.policies
            .iter()
            .any(|p| matches!(p, PolicyKind::RateLimit | PolicyKind::AntiDuplication))
    }

    /// Instantiate the configured policies, in order.
    pub fn build_pipeline(&self, store: Arc<dyn CounterStore>) -> Result<Pipeline> {
        let mut policies: Vec<Box<dyn Policy>> = Vec::with_capacity(self.policies.len());

        for kind in &self.policies {
            let policy: Box<dyn Policy> = match kind {
                PolicyKind::Keywords => Box::new(KeywordPolicy::new(self.banned_words.clone())),
                PolicyKind::Regex => Box::new(RegexPolicy::new(&self.banned_patterns)?),
                PolicyKind::RateLimit => Box::new(RateLimitPolicy::new(
                    Arc::clone(&store),
                    self.rate_limit.clone(),
                )),
                PolicyKind::Moderation => {
                    Box::new(ModerationPolicy::new(self.moderation.clone())?)
                }
                PolicyKind::PubkeyBan => {
                    Box::new(PubkeyBanPolicy::new(self.banned_pubkeys.clone()))
                }
                PolicyKind::Hellthread => Box::new(HellthreadPolicy::new(self.hellthread_limit)),
                PolicyKind::AntiDuplication => Box::new(DuplicatePolicy::new(
                    Arc::clone(&store),
                    self.duplicate.clone(),
                )),
                PolicyKind::ReadOnly => Box::new(ReadOnlyPolicy),
                PolicyKind::Noop => Box::new(NoopPolicy),
            };
            policies.push(policy);
        }

        Ok(Pipeline::new(policies))
    }
}

/// Split a comma-separated value, trimming whitespace and dropping empties.
fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Parse an optional variable, treating an unparseable value as an error
/// rather than silently falling back to the default.
fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .with_context(|| format!("{key}: invalid value '{raw}'")),
    }
}
