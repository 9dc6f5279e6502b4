//! Configuration Management
//!
//! This module loads and saves the typed session settings.
//!
//! # Configuration Locations
//! - Local: `.miniquery/settings.json` (per-project)
//! - Global: `~/.config/miniquery/settings.json` (per-user)
//!
//! # Resolution Precedence
//! 1. Explicit command-line parameters (highest priority, applied by the caller)
//! 2. Local settings file
//! 3. Global settings file
//!
//! Files are merged key by key: a local file only needs the keys it overrides.
//!
//! # Dynamic Settings
//! Everything is a typed field except aliases, abbreviations and variables,
//! which are open-ended and therefore kept as explicit string maps.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{MiniError, Result};
use crate::render::DisplayMode;

/// Default explicit-command leader
pub const DEFAULT_LEADER: &str = "\\";

/// Whether generated queries are shown, run, or both
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    /// Only print the synthesized SQL
    Query,
    /// Only execute it
    #[default]
    Run,
    /// Print and execute
    Both,
}

impl RunMode {
    /// Persistent option keys seeded for this mode (`q` shows, `r` runs)
    #[must_use]
    pub const fn option_keys(self) -> &'static [&'static str] {
        match self {
            Self::Query => &["q"],
            Self::Run => &["r"],
            Self::Both => &["q", "r"],
        }
    }
}

/// How the connection string is assembled
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConnectionDefinition {
    /// Complete connection string, used verbatim
    FullString { connection_string: String },
    /// Engine plus file path (file databases)
    FullPath {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        engine: Option<String>,
        path: String,
    },
    /// Built from individual parts
    Components {
        engine: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        driver: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        host: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        port: Option<u16>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        driver_options: Option<String>,
    },
}

impl Default for ConnectionDefinition {
    fn default() -> Self {
        Self::Components {
            engine: "sqlite".to_string(),
            driver: None,
            host: None,
            port: None,
            driver_options: None,
        }
    }
}

/// Per-command password override
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialOverride {
    /// Use this password
    Supplied(String),
    /// Use an empty password
    Empty,
}

/// Connection parameters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionSettings {
    #[serde(default)]
    pub definition: ConnectionDefinition,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,

    /// WARNING: Sensitive data, do not log or include in error messages
    #[serde(default, skip_serializing_if = "Option::is_none")]
    password: Option<String>,

    /// Environment variable name for password (if not storing password directly)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_env: Option<String>,
}

impl ConnectionSettings {
    /// Override the stored password
    pub fn apply_credential(&mut self, credential: CredentialOverride) {
        self.password = Some(match credential {
            CredentialOverride::Supplied(secret) => secret,
            CredentialOverride::Empty => String::new(),
        });
    }

    pub fn set_password(&mut self, password: Option<String>) {
        self.password = password;
    }

    #[must_use]
    pub fn password(&self) -> Option<&str> {
        self.password.as_deref()
    }

    /// Password to connect with: explicit value first, then `password_env`
    pub fn resolve_password(&self) -> Result<Option<String>> {
        if let Some(password) = &self.password {
            return Ok(Some(password.clone()));
        }
        match &self.password_env {
            Some(env_var) => std::env::var(env_var).map(Some).map_err(|_| {
                MiniError::config_error(format!(
                    "Environment variable {env_var} not found for password"
                ))
            }),
            None => Ok(None),
        }
    }

    /// Assemble the connection string for `database`
    pub fn connection_string(&self, database: Option<&str>) -> Result<String> {
        let (engine, driver, host, port, driver_options) = match &self.definition {
            ConnectionDefinition::FullString { connection_string } => {
                return Ok(connection_string.clone());
            }
            ConnectionDefinition::FullPath { engine: Some(engine), path } => {
                return Ok(format!("{engine}:{path}"));
            }
            ConnectionDefinition::FullPath { engine: None, path } => return Ok(path.clone()),
            ConnectionDefinition::Components { engine, driver, host, port, driver_options } => {
                (engine, driver, host, port, driver_options)
            }
        };

        let driver_part = match driver {
            Some(driver) => format!("{engine}+{driver}"),
            None => engine.clone(),
        };

        let user_part = match (&self.user, self.resolve_password()?) {
            (Some(user), Some(password)) => format!("{user}:{password}"),
            (Some(user), None) => user.clone(),
            (None, _) => String::new(),
        };

        let host_part = match (host, port) {
            (Some(host), Some(port)) => format!("{host}:{port}"),
            (Some(host), None) => host.clone(),
            (None, _) => String::new(),
        };

        let user_host = if !user_part.is_empty() && !host_part.is_empty() {
            format!("{user_part}@{host_part}")
        } else {
            format!("{user_part}{host_part}")
        };

        let db_part = match (database, driver_options) {
            (Some(db), Some(options)) => format!("{db}?{options}"),
            (Some(db), None) => db.to_string(),
            (None, _) => String::new(),
        };

        let right = if !user_host.is_empty() && !db_part.is_empty() {
            format!("{user_host}/{db_part}")
        } else {
            format!("{user_host}{db_part}")
        };

        Ok(format!("{driver_part}://{right}"))
    }

    /// File the SQLite executor should open
    pub fn sqlite_path(&self, database: Option<&str>) -> Result<PathBuf> {
        let not_sqlite = || MiniError::config_error("Connection is not a SQLite database");
        match &self.definition {
            ConnectionDefinition::FullPath { engine, path } => match engine.as_deref() {
                None | Some("sqlite") => Ok(PathBuf::from(path)),
                Some(_) => Err(not_sqlite()),
            },
            ConnectionDefinition::FullString { connection_string } => connection_string
                .strip_prefix("sqlite://")
                .or_else(|| connection_string.strip_prefix("sqlite:"))
                .map(PathBuf::from)
                .ok_or_else(not_sqlite),
            ConnectionDefinition::Components { engine, .. } if engine == "sqlite" => database
                .map(PathBuf::from)
                .ok_or_else(|| MiniError::config_error("No database selected")),
            ConnectionDefinition::Components { .. } => Err(not_sqlite()),
        }
    }
}

/// Session settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Active database name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,

    /// Active table name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,

    /// Default display format
    pub format: DisplayMode,

    /// Default run mode
    pub run_mode: RunMode,

    /// Explicit-command leader
    pub leader: String,

    /// Anchor column per table for wrapped output
    pub anchor_columns: BTreeMap<String, String>,

    pub connection: ConnectionSettings,

    pub aliases: BTreeMap<String, String>,

    /// Short forms for database object names
    pub abbreviations: BTreeMap<String, String>,

    pub variables: BTreeMap<String, String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database: None,
            table: None,
            format: DisplayMode::default(),
            run_mode: RunMode::default(),
            leader: DEFAULT_LEADER.to_string(),
            anchor_columns: BTreeMap::new(),
            connection: ConnectionSettings::default(),
            aliases: BTreeMap::new(),
            abbreviations: BTreeMap::new(),
            variables: BTreeMap::new(),
        }
    }
}

impl Settings {
    /// Configured anchor column for `table`
    #[must_use]
    pub fn anchor_column(&self, table: &str) -> Option<&str> {
        self.anchor_columns.get(table).map(String::as_str)
    }
}

/// Get path to local settings file (`.miniquery/settings.json`)
pub fn local_settings_path() -> Result<PathBuf> {
    let current_dir = std::env::current_dir().map_err(|e| {
        MiniError::config_error(format!("Could not determine current directory: {e}"))
    })?;

    Ok(current_dir.join(".miniquery").join("settings.json"))
}

/// Get path to global settings file (`~/.config/miniquery/settings.json`)
pub fn global_settings_path() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .ok_or_else(|| MiniError::config_error("Could not determine user config directory"))?;

    Ok(config_dir.join("miniquery").join("settings.json"))
}

fn read_settings_value(path: &Path) -> Result<Option<serde_json::Value>> {
    if !path.exists() {
        return Ok(None);
    }

    let contents = fs::read_to_string(path)
        .map_err(|e| MiniError::config_error(format!("Could not read settings file: {e}")))?;

    serde_json::from_str(&contents).map(Some).map_err(|e| {
        MiniError::config_error(format!("Invalid settings file {}: {e}", path.display()))
    })
}

/// Overlay `overlay` onto `base`, recursing into objects
fn merge_json(base: &mut serde_json::Value, overlay: serde_json::Value) {
    match (base, overlay) {
        (serde_json::Value::Object(base), serde_json::Value::Object(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(existing) => merge_json(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

/// Load settings from files ordered from lowest to highest precedence
///
/// Missing files are skipped; no files at all yields the defaults.
pub fn load_layered(paths: &[PathBuf]) -> Result<Settings> {
    let mut merged = serde_json::Value::Object(serde_json::Map::new());
    for path in paths {
        if let Some(layer) = read_settings_value(path)? {
            merge_json(&mut merged, layer);
        }
    }

    serde_json::from_value(merged)
        .map_err(|e| MiniError::config_error(format!("Invalid settings: {e}")))
}

/// Load a single settings file
pub fn load_settings(path: &Path) -> Result<Settings> {
    load_layered(&[path.to_path_buf()])
}

/// Load settings with precedence (local over global)
pub fn load_with_precedence() -> Result<Settings> {
    load_layered(&[global_settings_path()?, local_settings_path()?])
}

/// Save settings to a file, creating its directory
pub fn save_settings(path: &Path, settings: &Settings) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| {
            MiniError::config_error(format!("Could not create config directory: {e}"))
        })?;
    }

    let contents = serde_json::to_string_pretty(settings)
        .map_err(|e| MiniError::config_error(format!("Could not serialize settings: {e}")))?;

    fs::write(path, contents)
        .map_err(|e| MiniError::config_error(format!("Could not write settings file: {e}")))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn temp_path(name: &str) -> PathBuf {
        use std::sync::atomic::{AtomicU64, Ordering};
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        let id = COUNTER.fetch_add(1, Ordering::SeqCst);
        std::env::temp_dir()
            .join(format!("miniquery_config_{}_{id}", std::process::id()))
            .join(name)
    }

    fn components(driver: Option<&str>, host: Option<&str>, port: Option<u16>) -> ConnectionSettings {
        ConnectionSettings {
            definition: ConnectionDefinition::Components {
                engine: "mysql".to_string(),
                driver: driver.map(str::to_string),
                host: host.map(str::to_string),
                port,
                driver_options: None,
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.leader, "\\");
        assert_eq!(settings.format, DisplayMode::Wrap);
        assert_eq!(settings.run_mode, RunMode::Run);
        assert!(settings.aliases.is_empty());
    }

    #[test]
    fn test_run_mode_keys() {
        assert_eq!(RunMode::Query.option_keys(), ["q"]);
        assert_eq!(RunMode::Run.option_keys(), ["r"]);
        assert_eq!(RunMode::Both.option_keys(), ["q", "r"]);
    }

    #[test]
    fn test_connection_string_components() {
        let mut conn = components(Some("pymysql"), Some("db.local"), Some(3306));
        conn.user = Some("ann".to_string());
        conn.set_password(Some("pw".to_string()));
        assert_eq!(
            conn.connection_string(Some("shop")).unwrap(),
            "mysql+pymysql://ann:pw@db.local:3306/shop"
        );

        let conn = components(None, Some("db.local"), None);
        assert_eq!(conn.connection_string(None).unwrap(), "mysql://db.local");

        let mut conn = components(None, None, None);
        conn.user = Some("ann".to_string());
        assert_eq!(conn.connection_string(Some("shop")).unwrap(), "mysql://ann/shop");
    }

    #[test]
    fn test_connection_string_with_driver_options() {
        let conn = ConnectionSettings {
            definition: ConnectionDefinition::Components {
                engine: "postgresql".to_string(),
                driver: None,
                host: Some("h".to_string()),
                port: None,
                driver_options: Some("sslmode=require".to_string()),
            },
            ..Default::default()
        };
        assert_eq!(
            conn.connection_string(Some("app")).unwrap(),
            "postgresql://h/app?sslmode=require"
        );
    }

    #[test]
    fn test_connection_string_full_forms() {
        let conn = ConnectionSettings {
            definition: ConnectionDefinition::FullString {
                connection_string: "mysql://x@y/z".to_string(),
            },
            ..Default::default()
        };
        assert_eq!(conn.connection_string(Some("ignored")).unwrap(), "mysql://x@y/z");

        let conn = ConnectionSettings {
            definition: ConnectionDefinition::FullPath {
                engine: Some("sqlite".to_string()),
                path: "/tmp/a.db".to_string(),
            },
            ..Default::default()
        };
        assert_eq!(conn.connection_string(None).unwrap(), "sqlite:/tmp/a.db");
    }

    #[test]
    fn test_empty_credential_override() {
        let mut conn = components(None, Some("h"), None);
        conn.user = Some("ann".to_string());
        conn.set_password(Some("stored".to_string()));
        conn.apply_credential(CredentialOverride::Empty);
        assert_eq!(conn.password(), Some(""));
        assert_eq!(conn.connection_string(Some("d")).unwrap(), "mysql://ann:@h/d");
    }

    #[test]
    fn test_password_env_resolution() {
        let mut conn = ConnectionSettings::default();
        conn.password_env = Some("MINIQUERY_TEST_UNSET_PASSWORD_VAR".to_string());
        let err = conn.resolve_password().unwrap_err();
        assert!(err.message().contains("MINIQUERY_TEST_UNSET_PASSWORD_VAR"));

        // An explicit password wins over the environment
        conn.apply_credential(CredentialOverride::Supplied("direct".to_string()));
        assert_eq!(conn.resolve_password().unwrap().as_deref(), Some("direct"));
    }

    #[test]
    fn test_sqlite_path() {
        let conn = ConnectionSettings::default();
        assert_eq!(conn.sqlite_path(Some("/tmp/x.db")).unwrap(), PathBuf::from("/tmp/x.db"));
        assert!(conn.sqlite_path(None).is_err());

        let conn = ConnectionSettings {
            definition: ConnectionDefinition::FullString {
                connection_string: "sqlite:///tmp/y.db".to_string(),
            },
            ..Default::default()
        };
        assert_eq!(conn.sqlite_path(None).unwrap(), PathBuf::from("/tmp/y.db"));

        assert!(components(None, None, None).sqlite_path(Some("d")).is_err());
    }

    #[test]
    fn test_settings_serialization() {
        let mut settings = Settings::default();
        settings.table = Some("orders".to_string());
        settings.anchor_columns.insert("orders".to_string(), "order_id".to_string());
        settings.connection.set_password(Some("secret".to_string()));

        let json = serde_json::to_string(&settings).unwrap();
        assert!(json.contains(r#""format":"wrap""#));
        assert!(json.contains(r#""run_mode":"run""#));
        assert!(json.contains(r#""type":"components""#));

        let back: Settings = serde_json::from_str(&json).unwrap();
        assert_eq!(back, settings);
        assert_eq!(back.anchor_column("orders"), Some("order_id"));
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let settings: Settings = serde_json::from_str(r#"{"format": "vertical"}"#).unwrap();
        assert_eq!(settings.format, DisplayMode::Vertical);
        assert_eq!(settings.leader, "\\");
    }

    #[test]
    fn test_missing_files_yield_defaults() {
        let settings = load_layered(&[temp_path("nope.json")]).unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn test_layered_precedence() {
        let global = temp_path("global.json");
        let local = temp_path("local.json");

        let mut global_settings = Settings::default();
        global_settings.database = Some("global.db".to_string());
        global_settings.format = DisplayMode::Tab;
        global_settings.variables.insert("a".to_string(), "1".to_string());
        save_settings(&global, &global_settings).unwrap();

        fs::create_dir_all(local.parent().unwrap()).unwrap();
        fs::write(&local, r#"{"format": "nowrap", "variables": {"b": "2"}}"#).unwrap();

        let settings = load_layered(&[global.clone(), local.clone()]).unwrap();
        assert_eq!(settings.database.as_deref(), Some("global.db"));
        assert_eq!(settings.format, DisplayMode::NoWrap);
        assert_eq!(settings.variables.get("a").map(String::as_str), Some("1"));
        assert_eq!(settings.variables.get("b").map(String::as_str), Some("2"));

        let _ = fs::remove_file(global);
        let _ = fs::remove_file(local);
    }

    #[test]
    fn test_invalid_file_is_config_error() {
        let path = temp_path("broken.json");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "{ not json").unwrap();
        let err = load_settings(&path).unwrap_err();
        assert_eq!(err.error_code(), "CONFIG_ERROR");
        let _ = fs::remove_file(path);
    }
}
