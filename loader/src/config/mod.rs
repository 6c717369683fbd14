//! Column mapping and runtime settings.
//!
//! Header names are configuration, not contract: [`ColumnConfig`] maps every
//! logical column to the header string found in the CSV. [`Settings`] collects
//! the environment-driven options of the CLI and the HTTP server.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};

/// Directory of the local store (relative to current dir)
pub const DEFAULT_STORE_DIR: &str = ".cfload";

/// Default HTTP port
pub const DEFAULT_PORT: u16 = 3000;

// =============================================================================
// Column Configuration
// =============================================================================

/// Header names of the input CSV.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ColumnConfig {
    /// Target database name.
    pub database: String,
    /// Flow name.
    pub name: String,
    /// Optional flow code.
    pub code: String,
    /// Unit of the flow.
    pub unit: String,
    /// Optional CAS registry number.
    pub cas_number: String,
    /// Category columns, concatenated in this order.
    pub categories: Vec<String>,
    /// Optional flow type.
    pub flow_type: String,
    /// Characterization factor.
    pub factor: String,
    /// Optional unit label of the factor.
    pub factor_unit: String,
    /// Separator between segments inside a category cell.
    pub category_separator: String,
    /// Flow type used when the type column is absent or blank.
    pub default_flow_type: String,
    /// Field delimiter; auto-detected from the header line when unset.
    pub delimiter: Option<char>,
}

impl Default for ColumnConfig {
    fn default() -> Self {
        Self {
            database: "new_database".to_string(),
            name: "flow_name".to_string(),
            code: "code".to_string(),
            unit: "unit".to_string(),
            cas_number: "CAS number".to_string(),
            categories: vec!["categories".to_string()],
            flow_type: "type".to_string(),
            factor: "cf".to_string(),
            factor_unit: "cf_unit".to_string(),
            category_separator: "::".to_string(),
            default_flow_type: "emission".to_string(),
            delimiter: None,
        }
    }
}

impl ColumnConfig {
    /// Load a configuration from a JSON file. Missing keys keep their defaults.
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&content)?;
        config.check()?;
        Ok(config)
    }

    /// Reject configurations no CSV could satisfy.
    pub fn check(&self) -> ConfigResult<()> {
        if self.categories.is_empty() {
            return Err(ConfigError::InvalidColumns(
                "at least one category column is required".to_string(),
            ));
        }
        if self.category_separator.is_empty() {
            return Err(ConfigError::InvalidColumns(
                "category separator must not be empty".to_string(),
            ));
        }
        let named = [&self.database, &self.name, &self.unit, &self.factor];
        if named.iter().any(|c| c.trim().is_empty())
            || self.categories.iter().any(|c| c.trim().is_empty())
        {
            return Err(ConfigError::InvalidColumns(
                "required column names must not be blank".to_string(),
            ));
        }
        if let Some(d) = self.delimiter.filter(|d| !d.is_ascii() || matches!(*d, '"' | '\n' | '\r')) {
            return Err(ConfigError::InvalidColumns(format!(
                "unusable delimiter {d:?}"
            )));
        }
        Ok(())
    }

    /// Columns the flow parser cannot work without.
    pub fn flow_columns(&self) -> Vec<&str> {
        let mut columns = vec![self.database.as_str(), self.name.as_str()];
        columns.extend(self.categories.iter().map(String::as_str));
        columns.push(self.unit.as_str());
        columns
    }

    /// Columns the factor parser cannot work without.
    pub fn factor_columns(&self) -> Vec<&str> {
        let mut columns = vec![self.database.as_str(), self.name.as_str()];
        columns.extend(self.categories.iter().map(String::as_str));
        columns.push(self.factor.as_str());
        columns
    }
}

// =============================================================================
// Settings
// =============================================================================

/// Runtime settings read from the environment.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Local store directory.
    pub store_dir: PathBuf,
    /// Base URL of a remote LCA data service, when writes go over HTTP.
    pub remote_url: Option<String>,
    /// Bearer token for the remote service.
    pub remote_token: Option<String>,
    /// HTTP server port.
    pub port: u16,
    /// Column configuration file.
    pub columns_file: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            store_dir: PathBuf::from(DEFAULT_STORE_DIR),
            remote_url: None,
            remote_token: None,
            port: DEFAULT_PORT,
            columns_file: None,
        }
    }
}

impl Settings {
    /// Read `CFLOAD_*` variables, loading a `.env` file first if present.
    pub fn from_env() -> ConfigResult<Self> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build settings from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> ConfigResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        let port = match var("CFLOAD_PORT") {
            Some(raw) => raw.trim().parse().map_err(|e| ConfigError::InvalidVar {
                name: "CFLOAD_PORT".to_string(),
                message: format!("{e}"),
            })?,
            None => defaults.port,
        };

        Ok(Self {
            store_dir: var("CFLOAD_STORE_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.store_dir),
            remote_url: var("CFLOAD_REMOTE_URL"),
            remote_token: var("CFLOAD_REMOTE_TOKEN"),
            port,
            columns_file: var("CFLOAD_COLUMNS").map(PathBuf::from),
        })
    }

    /// Column configuration from [`Settings::columns_file`], or the defaults.
    pub fn columns(&self) -> ConfigResult<ColumnConfig> {
        match &self.columns_file {
            Some(path) => ColumnConfig::from_file(path),
            None => Ok(ColumnConfig::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    #[test]
    fn test_default_columns() {
        let config = ColumnConfig::default();
        assert_eq!(config.database, "new_database");
        assert_eq!(config.cas_number, "CAS number");
        assert_eq!(
            config.flow_columns(),
            vec!["new_database", "flow_name", "categories", "unit"]
        );
        assert_eq!(
            config.factor_columns(),
            vec!["new_database", "flow_name", "categories", "cf"]
        );
        assert!(config.check().is_ok());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("columns.json");
        fs::write(
            &path,
            r#"{ "name": "substance", "categories": ["compartment", "subcompartment"], "delimiter": ";" }"#,
        )
        .unwrap();

        let config = ColumnConfig::from_file(&path).unwrap();
        assert_eq!(config.name, "substance");
        assert_eq!(config.categories, vec!["compartment", "subcompartment"]);
        assert_eq!(config.delimiter, Some(';'));
        assert_eq!(config.factor, "cf");
    }

    #[test]
    fn test_empty_categories_rejected() {
        let config = ColumnConfig {
            categories: vec![],
            ..ColumnConfig::default()
        };
        assert!(matches!(config.check(), Err(ConfigError::InvalidColumns(_))));
    }

    #[test]
    fn test_settings_from_lookup() {
        let vars: HashMap<&str, &str> = [
            ("CFLOAD_STORE_DIR", "/tmp/store"),
            ("CFLOAD_PORT", "8080"),
            ("CFLOAD_REMOTE_URL", "http://localhost:9000"),
            ("CFLOAD_REMOTE_TOKEN", ""),
        ]
        .into_iter()
        .collect();

        let settings =
            Settings::from_lookup(|name| vars.get(name).map(|v| v.to_string())).unwrap();
        assert_eq!(settings.store_dir, PathBuf::from("/tmp/store"));
        assert_eq!(settings.port, 8080);
        assert_eq!(settings.remote_url.as_deref(), Some("http://localhost:9000"));
        assert!(settings.remote_token.is_none());
        assert!(settings.columns_file.is_none());
    }

    #[test]
    fn test_invalid_port() {
        let result = Settings::from_lookup(|name| {
            (name == "CFLOAD_PORT").then(|| "not-a-port".to_string())
        });
        assert!(matches!(result, Err(ConfigError::InvalidVar { .. })));
    }
}
