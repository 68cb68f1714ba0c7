//! Environment variable interpolation for config files.
//!
//! Supported forms:
//! - `$VAR` or `${VAR}`: value of VAR, an error if unset
//! - `${VAR:-default}`: default when VAR is unset or empty
//! - `${VAR-default}`: default only when VAR is unset
//! - `$$`: a literal `$`

use regex::{Captures, Regex};
use std::env;
use std::sync::LazyLock;

static ENV_VAR_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?x)
        (?P<escape>\$\$)
        |
        \$\{
            (?P<braced>[A-Za-z_][A-Za-z0-9_]*)
            (?:(?P<op>:?-)(?P<default>[^}]*))?
        \}
        |
        \$(?P<bare>[A-Za-z_][A-Za-z0-9_]*)
        ",
    )
    .expect("Invalid regex pattern")
});

/// How a missing or empty variable falls back to a default.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Fallback<'a> {
    None,
    /// `${VAR-default}`
    IfUnset(&'a str),
    /// `${VAR:-default}`
    IfUnsetOrEmpty(&'a str),
}

impl<'a> Fallback<'a> {
    fn from_captures(caps: &Captures<'a>) -> Self {
        let default = caps.name("default").map(|m| m.as_str()).unwrap_or("");
        match caps.name("op").map(|m| m.as_str()) {
            Some(":-") => Fallback::IfUnsetOrEmpty(default),
            Some("-") => Fallback::IfUnset(default),
            _ => Fallback::None,
        }
    }
}

fn resolve(name: &str, fallback: Fallback<'_>) -> Result<String, String> {
    match env::var(name) {
        Ok(value) if value.contains('\n') || value.contains('\r') => Err(format!(
            "environment variable '{name}' contains newlines, which is not allowed"
        )),
        Ok(value) if value.is_empty() => match fallback {
            Fallback::IfUnsetOrEmpty(default) => Ok(default.to_string()),
            _ => Ok(value),
        },
        Ok(value) => Ok(value),
        Err(_) => match fallback {
            Fallback::IfUnset(default) | Fallback::IfUnsetOrEmpty(default) => {
                Ok(default.to_string())
            }
            Fallback::None => Err(format!("environment variable '{name}' is not set")),
        },
    }
}

/// Interpolate environment variables in `input`.
///
/// Every problem is collected so a config with several missing variables
/// reports all of them at once.
pub fn interpolate(input: &str) -> Result<String, Vec<String>> {
    let mut errors = Vec::new();

    let text = ENV_VAR_PATTERN.replace_all(input, |caps: &Captures| {
        if caps.name("escape").is_some() {
            return "$".to_string();
        }

        let (name, fallback) = match (caps.name("braced"), caps.name("bare")) {
            (Some(braced), _) => (braced.as_str(), Fallback::from_captures(caps)),
            (None, Some(bare)) => (bare.as_str(), Fallback::None),
            (None, None) => return caps[0].to_string(),
        };

        resolve(name, fallback).unwrap_or_else(|message| {
            errors.push(message);
            caps[0].to_string()
        })
    });

    if errors.is_empty() {
        Ok(text.into_owned())
    } else {
        Err(errors)
    }
}
