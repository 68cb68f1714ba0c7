//! Object key naming.
//!
//! Keys and prefixes may carry strftime-style codes that are rendered once
//! per run against the current UTC time:
//! - `%Y` - 4-digit year (e.g., 2026)
//! - `%m` - 2-digit month (01-12)
//! - `%d` - 2-digit day (01-31)
//! - `%H`, `%M`, `%S` - hour, minute, second
//! - `%%` - a literal `%`

use chrono::{DateTime, Utc};
use std::fmt::Write;

use crate::error::{ConfigError, InvalidKeyTemplateSnafu};

/// A key or prefix with optional strftime codes.
///
/// # Example
/// ```ignore
/// let template = KeyTemplate::parse("data/files-%Y%m%d/")?;
/// let prefix = template.render();
/// // Returns: "data/files-20260128/"
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyTemplate {
    template: String,
}

impl KeyTemplate {
    /// Parse a template, rejecting unknown format codes.
    pub fn parse(template: &str) -> Result<Self, ConfigError> {
        let mut rendered = String::new();
        write!(rendered, "{}", Utc::now().format(template)).map_err(|_| {
            InvalidKeyTemplateSnafu {
                template: template.to_string(),
            }
            .build()
        })?;

        Ok(Self {
            template: template.to_owned(),
        })
    }

    /// Render against the current time.
    pub fn render(&self) -> String {
        self.render_at(Utc::now())
    }

    /// Render against a specific timestamp.
    pub fn render_at(&self, now: DateTime<Utc>) -> String {
        // parse() already proved every code in the template is valid
        now.format(&self.template).to_string()
    }
}

/// Key of chunk `index`: `{prefix}{base_name}_part_{index}.{extension}`.
///
/// The prefix is prepended verbatim, so it carries its own trailing `/`
/// when it names a directory.
pub fn chunk_key(prefix: &str, base_name: &str, index: usize, extension: &str) -> String {
    format!("{prefix}{base_name}_part_{index}.{extension}")
}
