//! Configuration file support.
//!
//! ```toml
//! [storage]
//! backend = "local"
//! directory_path = "~/reports"
//! recursive = true
//!
//! [report]
//! format = "auto"
//!
//! [analysis]
//! precision = 4
//!
//! [logging]
//! level = "info"
//! format = "pretty"
//! ```
//!
//! Every key under `[storage]` other than `backend` is handed to the selected
//! backend as a string option.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::analyzer::{SummaryAnalyzer, DEFAULT_PRECISION};
use crate::error::{Error, Result};
use crate::facade::ReportAnalyzer;
use crate::parser::ReportFormat;

/// Main configuration
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageSection,
    #[serde(default)]
    pub report: ReportSection,
    #[serde(default)]
    pub analysis: AnalysisSection,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageSection {
    #[serde(default = "default_backend")]
    pub backend: String,
    /// Backend-specific options, e.g. `directory_path`
    #[serde(flatten)]
    pub options: BTreeMap<String, toml::Value>,
}

fn default_backend() -> String {
    "local".to_string()
}

fn default_directory() -> String {
    "./reports".to_string()
}

impl Default for StorageSection {
    fn default() -> Self {
        let mut options = BTreeMap::new();
        options.insert(
            "directory_path".to_string(),
            toml::Value::String(default_directory()),
        );
        Self {
            backend: default_backend(),
            options,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ReportSection {
    #[serde(default)]
    pub format: ReportFormat,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AnalysisSection {
    /// Decimal places kept in analysis results
    #[serde(default = "default_precision")]
    pub precision: u32,
}

fn default_precision() -> u32 {
    DEFAULT_PRECISION
}

impl Default for AnalysisSection {
    fn default() -> Self {
        Self {
            precision: default_precision(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_level")]
    pub level: String,
    /// Log output format: "pretty" or "json"
    /// Override with LOG_FORMAT env var
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            format: default_log_format(),
        }
    }
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_tilde(path: &Path) -> Result<PathBuf> {
    let s = path.to_string_lossy();
    let home = || {
        dirs::home_dir()
            .ok_or_else(|| Error::Configuration("Cannot determine home directory".to_string()))
    };
    if let Some(rest) = s.strip_prefix("~/") {
        Ok(home()?.join(rest))
    } else if s == "~" {
        home()
    } else {
        Ok(path.to_path_buf())
    }
}

impl Config {
    /// Load config from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let mut config: Config = toml::from_str(content)?;
        config.expand_paths()?;
        Ok(config)
    }

    /// Expand ~ in the local report directory
    fn expand_paths(&mut self) -> Result<()> {
        if let Some(toml::Value::String(dir)) = self.storage.options.get_mut("directory_path") {
            *dir = expand_tilde(Path::new(dir.as_str()))?
                .to_string_lossy()
                .into_owned();
        }
        Ok(())
    }

    /// Storage options as the flat string mapping backends consume.
    ///
    /// Scalars are stringified and arrays are joined with commas.
    pub fn storage_options(&self) -> Result<BTreeMap<String, String>> {
        self.storage
            .options
            .iter()
            .map(|(key, value)| Ok((key.clone(), option_string(key, value)?)))
            .collect()
    }

    /// Set a storage option, replacing any value from the file.
    pub fn set_storage_option(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.storage
            .options
            .insert(key.into(), toml::Value::String(value.into()));
    }

    pub fn build_analyzer(&self) -> SummaryAnalyzer {
        SummaryAnalyzer::new().with_precision(self.analysis.precision)
    }

    /// Build a fully configured [`ReportAnalyzer`].
    pub fn report_analyzer(&self) -> Result<ReportAnalyzer> {
        let options = self.storage_options()?;
        let analyzer = ReportAnalyzer::new(&self.storage.backend, &options)?
            .with_format(self.report.format)
            .with_analyzer(std::sync::Arc::new(self.build_analyzer()));
        Ok(analyzer)
    }
}

fn option_string(key: &str, value: &toml::Value) -> Result<String> {
    match value {
        toml::Value::String(s) => Ok(s.clone()),
        toml::Value::Integer(i) => Ok(i.to_string()),
        toml::Value::Float(f) => Ok(f.to_string()),
        toml::Value::Boolean(b) => Ok(b.to_string()),
        toml::Value::Datetime(d) => Ok(d.to_string()),
        toml::Value::Array(items) => {
            let items = items
                .iter()
                .map(|item| option_string(key, item))
                .collect::<Result<Vec<_>>>()?;
            Ok(items.join(","))
        }
        toml::Value::Table(_) => Err(Error::Configuration(format!(
            "storage option '{}' must not be a table",
            key
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.storage.backend, "local");
        assert_eq!(config.report.format, ReportFormat::Auto);
        assert_eq!(config.analysis.precision, DEFAULT_PRECISION);
        assert_eq!(config.logging.level, "info");

        let options = config.storage_options().unwrap();
        assert_eq!(options["directory_path"], "./reports");
    }

    #[test]
    fn test_non_string_options_stringified() {
        let config = Config::from_toml_str(
            r#"
            [storage]
            backend = "local"
            directory_path = "/var/reports"
            recursive = true
            depth = 3
            extensions = ["txt", "json"]
            "#,
        )
        .unwrap();

        let options = config.storage_options().unwrap();
        assert_eq!(options["recursive"], "true");
        assert_eq!(options["depth"], "3");
        assert_eq!(options["extensions"], "txt,json");
        assert!(!options.contains_key("backend"));
    }

    #[test]
    fn test_table_option_rejected() {
        let config = Config::from_toml_str(
            r#"
            [storage]
            directory_path = "/var/reports"
            [storage.nested]
            a = 1
            "#,
        )
        .unwrap();

        assert!(config.storage_options().unwrap_err().is_configuration());
    }

    #[test]
    fn test_tilde_expanded() {
        let Some(home) = dirs::home_dir() else {
            return;
        };
        let config = Config::from_toml_str(
            r#"
            [storage]
            directory_path = "~/reports"
            "#,
        )
        .unwrap();

        let options = config.storage_options().unwrap();
        assert_eq!(
            options["directory_path"],
            home.join("reports").to_string_lossy()
        );
    }

    #[test]
    fn test_expand_tilde_leaves_other_paths() {
        assert_eq!(
            expand_tilde(Path::new("/tmp/x")).unwrap(),
            PathBuf::from("/tmp/x")
        );
        assert_eq!(
            expand_tilde(Path::new("a/~/b")).unwrap(),
            PathBuf::from("a/~/b")
        );
    }

    #[test]
    fn test_sections_parsed() {
        let config = Config::from_toml_str(
            r#"
            [report]
            format = "json"

            [analysis]
            precision = 2

            [logging]
            level = "debug"
            format = "json"
            "#,
        )
        .unwrap();

        assert_eq!(config.report.format, ReportFormat::Json);
        assert_eq!(config.build_analyzer().precision(), 2);
        assert_eq!(config.logging.format, "json");
        // storage section falls back entirely to defaults
        assert_eq!(config.storage.backend, "local");
    }

    #[test]
    fn test_invalid_toml() {
        let err = Config::from_toml_str("[storage\nbackend = 1").unwrap_err();
        assert!(matches!(err, Error::Toml(_)));
        assert!(err.is_configuration());
    }

    #[test]
    fn test_set_storage_option_overrides() {
        let mut config = Config::default();
        config.set_storage_option("directory_path", "/srv/reports");
        assert_eq!(
            config.storage_options().unwrap()["directory_path"],
            "/srv/reports"
        );
    }
}
