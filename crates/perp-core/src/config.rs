//! Configuration loading.
//!
//! Every binary reads a single JSON file. Secrets are not stored in the file:
//! any `${NAME}` placeholder is replaced with the value of environment variable
//! `NAME` before parsing (placeholders whose variable is unset are left as-is).
//!
//! # Example
//!
//! ```json
//! {
//!   "runtime": { "module_name": "perp-runner", "log_path": "/tmp/log" },
//!   "exchange": { "api_key": "${ASTER_API_KEY}", "secret_key": "${ASTER_API_SECRET}" }
//! }
//! ```

use std::path::Path;
use std::sync::LazyLock;

use anyhow::Context;
use regex::Regex;
use serde::Deserialize;
use serde::de::DeserializeOwned;

static ENV_PLACEHOLDER: LazyLock<Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r"\$\{([^}]+)\}"));

/// Runtime metadata block shared by all binaries.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ModuleMeta {
    pub module_name: Option<String>,
    pub log_path: Option<String>,
    pub log_level: Option<String>,
}

impl ModuleMeta {
    /// Module name, falling back to `default`.
    pub fn module_name_or(&self, default: &str) -> String {
        self.module_name.clone().unwrap_or_else(|| default.to_string())
    }
}

/// Replace `${NAME}` placeholders using `lookup`.
pub fn substitute_with<F>(raw: &str, lookup: F) -> anyhow::Result<String>
where
    F: Fn(&str) -> Option<String>,
{
    let placeholder = ENV_PLACEHOLDER
        .as_ref()
        .map_err(|e| anyhow::anyhow!("placeholder pattern failed to compile: {e}"))?;
    Ok(placeholder
        .replace_all(raw, |caps: &regex::Captures<'_>| {
            lookup(&caps[1]).unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned())
}

/// Replace `${NAME}` placeholders from the process environment.
pub fn substitute_env_vars(raw: &str) -> anyhow::Result<String> {
    substitute_with(raw, |name| std::env::var(name).ok())
}

/// Parse a JSON config string after placeholder substitution.
pub fn parse_json<T: DeserializeOwned>(raw: &str) -> anyhow::Result<T> {
    let expanded = substitute_env_vars(raw)?;
    serde_json::from_str(&expanded).context("invalid config JSON")
}

/// Load and parse a JSON config file.
pub fn load_json<T: DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    parse_json(&content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substitutes_known_and_keeps_unknown_placeholders() {
        let raw = r#"{"key": "${API_KEY}", "secret": "${MISSING}"}"#;
        let out = substitute_with(raw, |name| (name == "API_KEY").then(|| "abc123".to_string())).unwrap();
        assert_eq!(out, r#"{"key": "abc123", "secret": "${MISSING}"}"#);
    }

    #[test]
    fn parses_module_meta() {
        let meta: ModuleMeta = parse_json(r#"{"module_name": "perp", "log_level": "debug"}"#).unwrap();
        assert_eq!(meta.module_name_or("x"), "perp");
        assert_eq!(meta.log_level.as_deref(), Some("debug"));
        assert!(meta.log_path.is_none());
    }

    #[test]
    fn placeholders_expand_before_parsing() {
        let raw = r#"{"module_name": "${PERP_CONFIG_TEST_MODULE}"}"#;
        let unset: ModuleMeta = parse_json(raw).unwrap();
        assert_eq!(unset.module_name.as_deref(), Some("${PERP_CONFIG_TEST_MODULE}"));

        let out = substitute_with("${A}-${B}", |name| Some(name.to_lowercase())).unwrap();
        assert_eq!(out, "a-b");
    }
}
