//! Gateway configuration.
//!
//! Load order: TOML file (`--config` or `MCP_HWP_GATEWAY_CONFIG`) →
//! `MCP_HWP_GATEWAY_*` environment variables → CLI flags → defaults.

use crate::capability::Platform;
use crate::retrieval::RetrievalWeights;
use crate::router::Aggregation;
use anyhow::{Context, Result, bail};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_ENV: &str = "MCP_HWP_GATEWAY_CONFIG";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GatewayConfig {
    pub backend: BackendConfig,
    pub gateway: GatewaySettings,
    pub retrieval: RetrievalWeights,
    pub router: RouterConfig,
    pub grouping: GroupingConfig,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    #[default]
    Stdio,
    Manifest,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BackendConfig {
    pub kind: BackendKind,
    /// Executable of the child MCP server (`stdio`).
    pub command: Option<String>,
    pub args: Vec<String>,
    /// Tool listing file (`manifest`).
    pub manifest: Option<PathBuf>,
    /// Declared backend platform; enables capability gating when set.
    pub platform: Option<Platform>,
    pub timeout_ms: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            kind: BackendKind::Stdio,
            command: None,
            args: Vec::new(),
            manifest: None,
            platform: None,
            timeout_ms: 30_000,
        }
    }
}

impl BackendConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// What an operation does before the first registry build.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InitPolicy {
    /// Build the registry on demand, blocking the caller.
    #[default]
    Build,
    /// Fail with `not_initialized` until an explicit refresh.
    Fail,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GatewaySettings {
    pub on_uninitialized: InitPolicy,
    pub default_top_k: usize,
    pub max_top_k: usize,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            on_uninitialized: InitPolicy::Build,
            default_top_k: 5,
            max_top_k: 50,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RouterConfig {
    pub aggregation: Aggregation,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GroupingConfig {
    /// Rules file; the built-in `rules/groups.toml` when unset.
    pub rules: Option<PathBuf>,
}

/// Parse an env var and apply it to a config field.
fn env_override<T: std::str::FromStr>(var: &str, target: &mut T) -> Result<()> {
    if let Ok(value) = std::env::var(var) {
        *target = value
            .parse()
            .map_err(|_| anyhow::anyhow!("{var} has an invalid value: {value}"))?;
    }
    Ok(())
}

/// Same as [`env_override`] for snake_case serde enums.
fn env_override_enum<T: DeserializeOwned>(var: &str, target: &mut T) -> Result<()> {
    if let Ok(value) = std::env::var(var) {
        *target = serde_json::from_value(serde_json::Value::String(value.clone()))
            .with_context(|| format!("{var} has an invalid value: {value}"))?;
    }
    Ok(())
}

fn env_path(var: &str, target: &mut Option<PathBuf>) {
    if let Ok(value) = std::env::var(var)
        && !value.is_empty()
    {
        *target = Some(PathBuf::from(value));
    }
}

impl GatewayConfig {
    /// Load from `path` (or `MCP_HWP_GATEWAY_CONFIG`), then apply env overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let env_path = std::env::var_os(CONFIG_ENV).map(PathBuf::from);
        let mut config = match path.map(Path::to_path_buf).or(env_path) {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML file; relative paths inside resolve against its directory.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let mut config = Self::from_toml_str(&content)
            .with_context(|| format!("invalid config {}", path.display()))?;
        if let Some(base) = path.parent() {
            config.resolve_paths(base);
        }
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    fn resolve_paths(&mut self, base: &Path) {
        for path in [&mut self.backend.manifest, &mut self.grouping.rules]
            .into_iter()
            .flatten()
        {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        env_override_enum("MCP_HWP_GATEWAY_BACKEND_KIND", &mut self.backend.kind)?;
        if let Ok(command) = std::env::var("MCP_HWP_GATEWAY_BACKEND_COMMAND") {
            self.backend.command = Some(command);
        }
        if let Ok(args) = std::env::var("MCP_HWP_GATEWAY_BACKEND_ARGS") {
            self.backend.args = args.split_whitespace().map(str::to_string).collect();
        }
        env_path("MCP_HWP_GATEWAY_MANIFEST", &mut self.backend.manifest);
        env_override("MCP_HWP_GATEWAY_TIMEOUT_MS", &mut self.backend.timeout_ms)?;
        env_override_enum(
            "MCP_HWP_GATEWAY_ON_UNINITIALIZED",
            &mut self.gateway.on_uninitialized,
        )?;
        env_override("MCP_HWP_GATEWAY_DEFAULT_TOP_K", &mut self.gateway.default_top_k)?;
        env_override_enum("MCP_HWP_GATEWAY_AGGREGATION", &mut self.router.aggregation)?;
        env_path("MCP_HWP_GATEWAY_RULES", &mut self.grouping.rules);
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.gateway.default_top_k == 0 {
            bail!("gateway.default_top_k must be at least 1");
        }
        if self.gateway.max_top_k < self.gateway.default_top_k {
            bail!("gateway.max_top_k must be >= gateway.default_top_k");
        }
        if self.backend.timeout_ms == 0 {
            bail!("backend.timeout_ms must be at least 1");
        }
        self.retrieval
            .validate()
            .map_err(|message| anyhow::anyhow!(message))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn defaults_are_valid() {
        let config = GatewayConfig::default();
        config.validate().expect("valid");
        assert_eq!(config.gateway.default_top_k, 5);
        assert_eq!(config.gateway.on_uninitialized, InitPolicy::Build);
        assert_eq!(config.router.aggregation, Aggregation::Max);
        assert_eq!(config.backend.timeout(), Duration::from_secs(30));
    }

    #[test]
    fn parses_all_sections() {
        let config = GatewayConfig::from_toml_str(
            r#"
            [backend]
            kind = "manifest"
            manifest = "tools.json"
            platform = "cross_platform"
            timeout_ms = 500

            [gateway]
            on_uninitialized = "fail"
            default_top_k = 3

            [retrieval]
            name_weight = 0.4

            [router]
            aggregation = "sum"
            "#,
        )
        .expect("config");
        assert_eq!(config.backend.kind, BackendKind::Manifest);
        assert_eq!(config.backend.platform, Some(Platform::CrossPlatform));
        assert_eq!(config.gateway.on_uninitialized, InitPolicy::Fail);
        assert_eq!(config.gateway.max_top_k, 50);
        assert_eq!(config.retrieval.name_weight, 0.4);
        assert_eq!(config.retrieval.k1, 1.5);
        assert_eq!(config.router.aggregation, Aggregation::Sum);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(GatewayConfig::from_toml_str("[gateway]\ntop_k = 3\n").is_err());
        assert!(GatewayConfig::from_toml_str("[router]\naggregation = \"mean\"\n").is_err());
    }

    #[test]
    fn invalid_values_fail_validation() {
        let mut config = GatewayConfig::default();
        config.gateway.default_top_k = 0;
        assert!(config.validate().is_err());

        let mut config = GatewayConfig::default();
        config.retrieval.lexical_weight = -1.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn relative_paths_resolve_against_config_dir() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("gateway.toml");
        std::fs::write(
            &path,
            "[backend]\nkind = \"manifest\"\nmanifest = \"tools.json\"\n\n[grouping]\nrules = \"/abs/rules.toml\"\n",
        )
        .expect("write");
        let config = GatewayConfig::from_file(&path).expect("config");
        assert_eq!(config.backend.manifest, Some(dir.path().join("tools.json")));
        assert_eq!(config.grouping.rules, Some(PathBuf::from("/abs/rules.toml")));
    }
}
