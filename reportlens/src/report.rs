//! Structured report record.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{Error, Result};

/// A parsed report.
///
/// Metrics and attributes are kept in ordered maps so iteration, and
/// therefore analysis, never depends on insertion order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuredReport {
    /// Identifier of the stored object this report was parsed from
    #[serde(skip)]
    pub source: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default)]
    pub metrics: BTreeMap<String, f64>,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

impl StructuredReport {
    pub fn new(source: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            source: source.into(),
            timestamp,
            title: None,
            metrics: BTreeMap::new(),
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_metric(mut self, name: impl Into<String>, value: f64) -> Self {
        self.metrics.insert(name.into(), value);
        self
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// Serialize into the JSON report format.
    pub fn to_json_bytes(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec_pretty(self)
    }

    /// Serialize into the line-oriented text report format.
    ///
    /// Header fields use `key: value`, metrics use `key = value`.
    ///
    /// # Errors
    ///
    /// `Error::MalformedReport` when a field cannot be written so that it
    /// parses back unchanged: keys that are empty, contain `:`, `=` or a line
    /// break, start with `#` or carry surrounding whitespace; attributes named
    /// `timestamp` or `title`; values with line breaks or surrounding
    /// whitespace; and non-finite metrics.
    pub fn to_text(&self) -> Result<String> {
        let mut out = String::new();
        out.push_str(&format!(
            "timestamp: {}\n",
            self.timestamp.to_rfc3339_opts(SecondsFormat::AutoSi, true)
        ));
        if let Some(title) = &self.title {
            self.check_text_value("title", title)?;
            out.push_str(&format!("title: {}\n", title));
        }
        for (key, value) in &self.attributes {
            self.check_text_key(key)?;
            if key == "timestamp" || key == "title" {
                return Err(self.unrepresentable(format!(
                    "attribute '{}' collides with a header field",
                    key
                )));
            }
            self.check_text_value(key, value)?;
            out.push_str(&format!("{}: {}\n", key, value));
        }
        if !self.metrics.is_empty() {
            out.push('\n');
        }
        for (key, value) in &self.metrics {
            self.check_text_key(key)?;
            if !value.is_finite() {
                return Err(self.unrepresentable(format!("metric '{}' is not finite", key)));
            }
            out.push_str(&format!("{} = {}\n", key, value));
        }
        Ok(out)
    }

    fn check_text_key(&self, key: &str) -> Result<()> {
        let valid = !key.is_empty()
            && key.trim() == key
            && !key.starts_with('#')
            && !key.contains(|c: char| matches!(c, ':' | '=' | '\n' | '\r'));
        if valid {
            Ok(())
        } else {
            Err(self.unrepresentable(format!("key {:?} cannot be written as text", key)))
        }
    }

    fn check_text_value(&self, key: &str, value: &str) -> Result<()> {
        if value.trim() == value && !value.contains(|c: char| c == '\n' || c == '\r') {
            Ok(())
        } else {
            Err(self.unrepresentable(format!(
                "value of '{}' cannot be written as text: {:?}",
                key, value
            )))
        }
    }

    fn unrepresentable(&self, reason: String) -> Error {
        Error::malformed(self.source.clone(), reason)
    }
}
