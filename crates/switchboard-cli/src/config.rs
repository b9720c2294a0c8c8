use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::warn;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SwitchboardConfig {
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub classifier: ClassifierConfig,
    #[serde(default)]
    pub policy: PolicyConfig,
    #[serde(default)]
    pub taxonomy: TaxonomyConfig,
    #[serde(default)]
    pub audit: AuditConfig,
    #[serde(default)]
    pub registry: RegistryConfig,
}

// ── Gateway ─────────────────────────────────────────────────────

#[derive(Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_gateway_bind")]
    pub bind: String,
    #[serde(default = "default_gateway_port")]
    pub port: u16,
    #[serde(default)]
    pub auth_token: String,
}

impl std::fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("bind", &self.bind)
            .field("port", &self.port)
            .field("auth_token", &mask_secret(&self.auth_token))
            .finish()
    }
}

fn default_gateway_bind() -> String {
    "127.0.0.1".to_string()
}

fn default_gateway_port() -> u16 {
    18700
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind: default_gateway_bind(),
            port: default_gateway_port(),
            auth_token: String::new(),
        }
    }
}

// ── Classifier ──────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_classifier_base_url")]
    pub base_url: String,
    #[serde(default = "default_classifier_model")]
    pub model: String,
    #[serde(default = "default_classifier_timeout")]
    pub timeout_secs: u64,
}

fn default_classifier_base_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_classifier_model() -> String {
    "llama3-router".to_string()
}

fn default_classifier_timeout() -> u64 {
    5
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_url: default_classifier_base_url(),
            model: default_classifier_model(),
            timeout_secs: default_classifier_timeout(),
        }
    }
}

// ── Policy store ────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Path to the SQLite policy database. Empty means
    /// `<config dir>/policy.db`.
    #[serde(default)]
    pub db_path: String,
    #[serde(default = "default_true")]
    pub seed_defaults: bool,
}

impl PolicyConfig {
    pub fn resolved_db_path(&self) -> PathBuf {
        if self.db_path.is_empty() {
            config_dir().join("policy.db")
        } else {
            PathBuf::from(&self.db_path)
        }
    }
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            db_path: String::new(),
            seed_defaults: true,
        }
    }
}

// ── Taxonomy ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TaxonomyConfig {
    /// Optional TOML catalog file replacing the built-in catalog.
    #[serde(default)]
    pub path: Option<String>,
}

/// On-disk catalog file shape.
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogFile {
    pub intents: Vec<switchboard_core::Intent>,
}

// ── Audit ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditConfig {
    #[serde(default = "default_audit_capacity")]
    pub capacity: usize,
}

fn default_audit_capacity() -> usize {
    switchboard_core::DEFAULT_AUDIT_CAPACITY
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            capacity: default_audit_capacity(),
        }
    }
}

// ── Registry ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    #[serde(default = "default_fallback_agent")]
    pub fallback: String,
    /// Agents to register at startup. Empty means the built-in desks.
    #[serde(default)]
    pub agents: Vec<switchboard_core::AgentDescriptor>,
}

fn default_fallback_agent() -> String {
    "agent_general".to_string()
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            fallback: default_fallback_agent(),
            agents: vec![],
        }
    }
}

fn default_true() -> bool {
    true
}

/// Mask a secret string for safe display in Debug output / logs.
/// Shows first 3 and last 4 chars for long values, otherwise "***".
fn mask_secret(s: &str) -> String {
    if s.is_empty() {
        return "(empty)".to_string();
    }
    let chars: Vec<char> = s.chars().collect();
    if chars.len() > 7 {
        let prefix: String = chars[..3].iter().collect();
        let suffix: String = chars[chars.len() - 4..].iter().collect();
        format!("{}...{}", prefix, suffix)
    } else {
        "***".to_string()
    }
}

pub fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".switchboard")
}

impl SwitchboardConfig {
    pub fn load(custom_path: &Option<PathBuf>) -> Result<Self> {
        let path = custom_path
            .clone()
            .unwrap_or_else(|| config_dir().join("config.toml"));

        let content = std::fs::read_to_string(&path).with_context(|| {
            format!(
                "Failed to read config at {}. Run `switchboard init` first.",
                path.display()
            )
        })?;

        let expanded = expand_env_vars(&content);

        let config: Self = toml::from_str(&expanded)
            .with_context(|| format!("Failed to parse config at {}", path.display()))?;

        if !config.gateway.auth_token.is_empty() && !content.contains("${") {
            warn!(
                "Gateway token is hardcoded in the config file. For security, use an environment variable: auth_token = \"${{SWITCHBOARD_GATEWAY_TOKEN}}\""
            );
        }

        Ok(config)
    }
}

/// Allowlist of environment variable names that may be expanded in config
/// files, so a writable config cannot be used to read arbitrary env vars.
const ALLOWED_ENV_VARS: &[&str] = &[
    "SWITCHBOARD_GATEWAY_TOKEN",
    "CLASSIFIER_BASE_URL",
    "HOME",
    "USER",
];

fn expand_env_vars(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(start) = rest.find("${") {
        result.push_str(&rest[..start]);
        let tail = &rest[start..];
        match tail.find('}') {
            Some(end) => {
                let var_name = &tail[2..end];
                if ALLOWED_ENV_VARS.contains(&var_name) {
                    result.push_str(&std::env::var(var_name).unwrap_or_default());
                } else {
                    warn!(
                        "Skipping expansion of unrecognized env var '{}' in config (not in allowlist)",
                        var_name
                    );
                    // Leave the ${VAR} unexpanded so it's obvious
                    result.push_str(&tail[..=end]);
                }
                rest = &tail[end + 1..];
            }
            None => {
                result.push_str(tail);
                return result;
            }
        }
    }
    result.push_str(rest);
    result
}
