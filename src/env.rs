//! Environment variable expansion for configuration text
//!
//! `${NAME}` is replaced by the variable's value and `${NAME:-fallback}`
//! uses `fallback` when the variable is unset. Expansion happens on the raw
//! YAML text before parsing, so any value (bucket, endpoint, mount path)
//! can come from the environment.

use std::env;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use crate::config::ConfigError;

static ENV_VAR_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}").expect("valid env var pattern")
});

/// Expand environment variable references in `input`.
///
/// Unset variables without a fallback are collected and reported together.
pub fn substitute_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut missing: Vec<String> = Vec::new();

    let expanded = ENV_VAR_PATTERN.replace_all(input, |caps: &Captures<'_>| {
        let name = &caps[1];
        match (env::var(name), caps.get(2)) {
            (Ok(value), _) => value,
            (Err(_), Some(fallback)) => fallback.as_str().to_string(),
            (Err(_), None) => {
                if !missing.iter().any(|m| m == name) {
                    missing.push(name.to_string());
                }
                String::new()
            }
        }
    });

    if !missing.is_empty() {
        return Err(ConfigError::ValidationError(format!(
            "Missing environment variables: {}",
            missing.join(", ")
        )));
    }

    Ok(expanded.into_owned())
}
