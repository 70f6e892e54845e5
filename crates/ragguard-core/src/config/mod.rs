//! Configuration management
//!
//! One [`Config`] is built at startup (file, then environment overrides, then
//! validation) and handed to every component. Nothing else reads the
//! environment.

use crate::confidence::ConfidenceAggregation;
use crate::error::{RagGuardError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable pointing at an explicit config file
pub const CONFIG_PATH_ENV: &str = "RAGGUARD_CONFIG";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    /// Admission, gating and resilience policy
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,

    /// Generation and embedding backend
    #[serde(default)]
    pub llm_service: LLMServiceConfig,

    /// Vector search backend
    #[serde(default)]
    pub search_service: SearchServiceConfig,

    #[serde(default)]
    pub audit: AuditConfig,
}

/// HTTP listener
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    7071
}

/// Policy consumed by the query orchestrator and its services.
///
/// The camelCase aliases accept the option names used by deployment
/// manifests (`rateLimitPerWindow`, `breakerCooldownSeconds`, ...).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    #[serde(alias = "rateLimitPerWindow")]
    pub rate_limit_per_window: u32,

    #[serde(alias = "rateLimitWindowSeconds")]
    pub rate_limit_window_secs: u64,

    /// Buckets untouched for this long are evicted
    #[serde(alias = "rateLimitIdleSeconds")]
    pub rate_limit_idle_secs: u64,

    #[serde(alias = "confidenceHighThreshold")]
    pub confidence_high_threshold: f64,

    #[serde(alias = "confidenceLowThreshold")]
    pub confidence_low_threshold: f64,

    #[serde(alias = "confidenceAggregation")]
    pub confidence_aggregation: ConfidenceAggregation,

    #[serde(alias = "breakerFailureThreshold")]
    pub breaker_failure_threshold: u32,

    #[serde(alias = "breakerCooldownSeconds")]
    pub breaker_cooldown_secs: u64,

    #[serde(alias = "generationTimeoutSeconds")]
    pub generation_timeout_secs: u64,

    #[serde(alias = "retrievalTimeoutSeconds")]
    pub retrieval_timeout_secs: u64,

    /// Passages requested from the retriever
    #[serde(alias = "topK")]
    pub top_k: usize,

    /// Maximum characters of each passage quoted in a fallback answer
    #[serde(alias = "fallbackExcerptChars")]
    pub fallback_excerpt_chars: usize,

    /// Classification stamped on every response
    #[serde(alias = "complianceLevel")]
    pub compliance_level: String,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            rate_limit_per_window: 10,
            rate_limit_window_secs: 60,
            rate_limit_idle_secs: 600,
            confidence_high_threshold: 0.75,
            confidence_low_threshold: 0.4,
            confidence_aggregation: ConfidenceAggregation::Top,
            breaker_failure_threshold: 3,
            breaker_cooldown_secs: 60,
            generation_timeout_secs: 8,
            retrieval_timeout_secs: 5,
            top_k: 3,
            fallback_excerpt_chars: 600,
            compliance_level: "CONFIDENTIAL".to_string(),
        }
    }
}

impl OrchestratorConfig {
    pub fn rate_limit_window(&self) -> Duration {
        Duration::from_secs(self.rate_limit_window_secs)
    }

    pub fn rate_limit_idle(&self) -> Duration {
        Duration::from_secs(self.rate_limit_idle_secs)
    }

    pub fn breaker_cooldown(&self) -> Duration {
        Duration::from_secs(self.breaker_cooldown_secs)
    }

    pub fn generation_timeout(&self) -> Duration {
        Duration::from_secs(self.generation_timeout_secs)
    }

    pub fn retrieval_timeout(&self) -> Duration {
        Duration::from_secs(self.retrieval_timeout_secs)
    }

    /// Check ranges and cross-field constraints
    pub fn validate(&self) -> Result<()> {
        let unit = 0.0..=1.0;
        if !unit.contains(&self.confidence_low_threshold)
            || !unit.contains(&self.confidence_high_threshold)
        {
            return Err(RagGuardError::Config(
                "confidence thresholds must be within [0, 1]".to_string(),
            ));
        }
        if self.confidence_low_threshold > self.confidence_high_threshold {
            return Err(RagGuardError::Config(format!(
                "confidence_low_threshold ({}) exceeds confidence_high_threshold ({})",
                self.confidence_low_threshold, self.confidence_high_threshold
            )));
        }

        let positive = [
            ("rate_limit_per_window", self.rate_limit_per_window as u64),
            ("rate_limit_window_secs", self.rate_limit_window_secs),
            ("rate_limit_idle_secs", self.rate_limit_idle_secs),
            ("breaker_failure_threshold", self.breaker_failure_threshold as u64),
            ("breaker_cooldown_secs", self.breaker_cooldown_secs),
            ("generation_timeout_secs", self.generation_timeout_secs),
            ("retrieval_timeout_secs", self.retrieval_timeout_secs),
            ("top_k", self.top_k as u64),
            ("fallback_excerpt_chars", self.fallback_excerpt_chars as u64),
        ];
        if let Some((name, _)) = positive.iter().find(|(_, v)| *v == 0) {
            return Err(RagGuardError::Config(format!("{} must be greater than 0", name)));
        }

        Ok(())
    }
}

/// LLM service configuration for external inference
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMServiceConfig {
    /// Base URL of an OpenAI-compatible service
    #[serde(default = "default_llm_url")]
    pub url: String,

    /// Model name for chat completions
    #[serde(default = "default_chat_model")]
    pub model: String,

    /// Base URL for embeddings service (can be different from LLM URL)
    #[serde(default)]
    pub embedding_url: Option<String>,

    /// Model name for embeddings
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    /// API key (optional, for authenticated services)
    #[serde(default)]
    pub api_key: Option<String>,

    /// Transport-level timeout in seconds; the orchestrator applies its own,
    /// tighter, generation timeout on top
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

impl LLMServiceConfig {
    /// Get the embeddings URL (falls back to main URL if not specified)
    pub fn embeddings_url(&self) -> &str {
        self.embedding_url.as_deref().unwrap_or(&self.url)
    }
}

impl Default for LLMServiceConfig {
    fn default() -> Self {
        Self {
            url: default_llm_url(),
            model: default_chat_model(),
            embedding_url: None,
            embedding_model: default_embedding_model(),
            api_key: None,
            timeout_secs: default_timeout(),
            max_tokens: default_max_tokens(),
        }
    }
}

fn default_llm_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_chat_model() -> String {
    "gpt-35-turbo".to_string()
}

fn default_embedding_model() -> String {
    "text-embedding-ada-002".to_string()
}

fn default_timeout() -> u64 {
    30
}

fn default_max_tokens() -> u32 {
    500
}

/// Vector search service (Azure AI Search compatible REST API)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchServiceConfig {
    #[serde(default = "default_search_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_index_name")]
    pub index_name: String,

    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_api_version")]
    pub api_version: String,

    /// Index field holding the passage embedding
    #[serde(default = "default_vector_field")]
    pub vector_field: String,

    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl Default for SearchServiceConfig {
    fn default() -> Self {
        Self {
            endpoint: default_search_endpoint(),
            index_name: default_index_name(),
            api_key: None,
            api_version: default_api_version(),
            vector_field: default_vector_field(),
            timeout_secs: default_timeout(),
        }
    }
}

fn default_search_endpoint() -> String {
    "http://localhost:8080".to_string()
}

fn default_index_name() -> String {
    "compliance-docs-index".to_string()
}

fn default_api_version() -> String {
    "2023-11-01".to_string()
}

fn default_vector_field() -> String {
    "content_vector".to_string()
}

/// Where audit records go
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AuditSinkKind {
    /// Structured log line on the `ragguard::audit` target
    #[default]
    Tracing,
    /// Append-only JSON lines file
    Jsonl,
    /// Kept in process memory (tests and embedding)
    Memory,
}

impl std::str::FromStr for AuditSinkKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "tracing" => Ok(Self::Tracing),
            "jsonl" => Ok(Self::Jsonl),
            "memory" => Ok(Self::Memory),
            other => Err(format!(
                "unknown audit sink '{}', expected tracing|jsonl|memory",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditConfig {
    #[serde(default)]
    pub sink: AuditSinkKind,

    /// Target file for the `jsonl` sink
    #[serde(default)]
    pub path: Option<PathBuf>,

    /// Records buffered between the request path and the sink writer
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,

    /// Secret mixed into client and question digests
    #[serde(default)]
    pub hash_key: Option<String>,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            sink: AuditSinkKind::default(),
            path: None,
            channel_capacity: default_channel_capacity(),
            hash_key: None,
        }
    }
}

fn default_channel_capacity() -> usize {
    1024
}

impl Config {
    /// Load config from `$RAGGUARD_CONFIG` or the default path, apply
    /// environment overrides and validate
    pub fn load() -> Result<Self> {
        let path = std::env::var(CONFIG_PATH_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| Self::default_path());
        Self::load_from(&path)
    }

    /// Load from an explicit path; a missing file yields defaults
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            serde_yaml::from_str::<Config>(&content)?
        } else {
            tracing::debug!(path = %path.display(), "config file not found, using defaults");
            Config::default()
        };
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Get default config path
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(crate::CONFIG_DIR_NAME)
            .join("config.yml")
    }

    pub fn validate(&self) -> Result<()> {
        self.orchestrator.validate()?;
        if self.audit.channel_capacity == 0 {
            return Err(RagGuardError::Config(
                "audit.channel_capacity must be greater than 0".to_string(),
            ));
        }
        if self.audit.sink == AuditSinkKind::Jsonl && self.audit.path.is_none() {
            return Err(RagGuardError::Config(
                "audit.path is required for the jsonl sink".to_string(),
            ));
        }
        Ok(())
    }

    /// Overlay `RAGGUARD_*` environment variables
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        let o = &mut self.orchestrator;
        env_override("RAGGUARD_RATE_LIMIT_PER_WINDOW", &mut o.rate_limit_per_window)?;
        env_override("RAGGUARD_RATE_LIMIT_WINDOW_SECONDS", &mut o.rate_limit_window_secs)?;
        env_override(
            "RAGGUARD_CONFIDENCE_HIGH_THRESHOLD",
            &mut o.confidence_high_threshold,
        )?;
        env_override("RAGGUARD_CONFIDENCE_LOW_THRESHOLD", &mut o.confidence_low_threshold)?;
        env_override(
            "RAGGUARD_BREAKER_FAILURE_THRESHOLD",
            &mut o.breaker_failure_threshold,
        )?;
        env_override("RAGGUARD_BREAKER_COOLDOWN_SECONDS", &mut o.breaker_cooldown_secs)?;
        env_override(
            "RAGGUARD_GENERATION_TIMEOUT_SECONDS",
            &mut o.generation_timeout_secs,
        )?;
        env_override("RAGGUARD_RETRIEVAL_TIMEOUT_SECONDS", &mut o.retrieval_timeout_secs)?;
        env_override("RAGGUARD_COMPLIANCE_LEVEL", &mut o.compliance_level)?;

        env_override("RAGGUARD_HOST", &mut self.server.host)?;
        env_override("RAGGUARD_PORT", &mut self.server.port)?;

        let llm = &mut self.llm_service;
        env_override("RAGGUARD_LLM_URL", &mut llm.url)?;
        env_override("RAGGUARD_LLM_MODEL", &mut llm.model)?;
        env_override("RAGGUARD_EMBEDDING_MODEL", &mut llm.embedding_model)?;
        env_override_opt("RAGGUARD_EMBEDDING_URL", &mut llm.embedding_url);
        env_override_opt("RAGGUARD_LLM_API_KEY", &mut llm.api_key);

        let search = &mut self.search_service;
        env_override("RAGGUARD_SEARCH_ENDPOINT", &mut search.endpoint)?;
        env_override("RAGGUARD_SEARCH_INDEX", &mut search.index_name)?;
        env_override_opt("RAGGUARD_SEARCH_KEY", &mut search.api_key);

        env_override("RAGGUARD_AUDIT_SINK", &mut self.audit.sink)?;
        if let Ok(path) = std::env::var("RAGGUARD_AUDIT_PATH") {
            self.audit.path = Some(PathBuf::from(path));
        }
        env_override_opt("RAGGUARD_AUDIT_HASH_KEY", &mut self.audit.hash_key);

        Ok(())
    }
}

fn env_override<T>(key: &str, slot: &mut T) -> Result<()>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    if let Ok(raw) = std::env::var(key) {
        *slot = raw.trim().parse::<T>().map_err(|e| {
            RagGuardError::Config(format!("failed to parse env var {}={}: {}", key, raw, e))
        })?;
    }
    Ok(())
}

fn env_override_opt(key: &str, slot: &mut Option<String>) {
    if let Ok(raw) = std::env::var(key) {
        if !raw.trim().is_empty() {
            *slot = Some(raw);
        }
    }
}
