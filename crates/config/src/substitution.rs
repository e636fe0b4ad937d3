use anyhow::{Context, Result};
use regex::{Captures, Regex};
use std::env;
use tracing::{debug, warn};

/// `${VAR}`, `${VAR:-fallback}` or `$VAR`
const PLACEHOLDER: &str = r"\$\{(\w+)(?::-([^}]*))?\}|\$(\w+)";

fn placeholder_regex() -> Result<Regex> {
    Regex::new(PLACEHOLDER).context("invalid placeholder pattern")
}

/// Substitute environment variables in the format `${VAR}`, `${VAR:-default}` or `$VAR`
///
/// Unset variables without an inline default keep their placeholder so the
/// validator can report them.
pub fn substitute_env_vars(content: &str) -> Result<String> {
    let re = placeholder_regex()?;
    let mut missing_vars = Vec::new();

    let result = re.replace_all(content, |caps: &Captures| {
        let whole = caps.get(0).map_or("", |m| m.as_str());
        let Some(name) = caps.get(1).or_else(|| caps.get(3)).map(|m| m.as_str()) else {
            return whole.to_string();
        };

        match env::var(name) {
            Ok(value) => {
                debug!(var = name, "Substituting environment variable");
                value
            }
            Err(_) => match caps.get(2) {
                Some(fallback) => {
                    debug!(var = name, "Environment variable not set, using inline default");
                    fallback.as_str().to_string()
                }
                None => {
                    warn!("Environment variable '{}' not set", name);
                    missing_vars.push(name.to_string());
                    whole.to_string()
                }
            },
        }
    });

    if !missing_vars.is_empty() {
        debug!(
            "Environment variables not set (may fail validation): {:?}",
            missing_vars
        );
    }

    Ok(result.into_owned())
}

/// Check if a string contains unresolved environment variable placeholders
pub fn has_unresolved_env_vars(content: &str) -> bool {
    placeholder_regex()
        .map(|re| re.is_match(content))
        .unwrap_or(false)
}
