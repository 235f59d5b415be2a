//! Global config for the engine
//! Includes the SI depth limit, the symbol table capacity and the workspace defaults.
use std::collections::HashMap;

use camino::Utf8PathBuf;
use config::{Config, ConfigError, Environment, File};
use once_cell::sync::OnceCell;
use serde::Deserialize;

use crate::cli::paths::apl_default_dir;

/// Global config variable for `Settings`
pub static APL_CONFIG: OnceCell<Settings> = OnceCell::new();

/// Global path variable for configuration file
pub static APL_CONFIG_FILE: OnceCell<Utf8PathBuf> = OnceCell::new();

/// Gets the `APL_CONFIG` settings. If uninitialized, sets the global variable
/// in the following order (greatest to least precedence):
/// - `settings` map if provided, e.g. with key ("max_depth", "200")
/// - Env var per setting, e.g. `APL_MAX_DEPTH`
/// - Config file, which also has a configurable location (see `apl_config_file()`),
///   and has the following syntax for e.g. TOML:
///   ```toml
///   index_origin = 0
///   ```
/// - Default values, see [`Settings::default`]
pub fn apl_config(
    file: Option<&Utf8PathBuf>,
    settings: Option<&HashMap<&str, String>>,
) -> &'static Settings {
    APL_CONFIG.get_or_init(|| match Settings::from_config(apl_config_file(file), settings) {
        Ok(settings) => settings,
        Err(e) => {
            tracing::warn!("ignoring configuration: {e}");
            Settings::default()
        }
    })
}

/// Gets the `APL_CONFIG_FILE` path. If uninitialized, sets the global variable
/// in the following order (greatest to least precedence):
/// - `config_file` parameter if provided
/// - `APL_CONFIG_FILE` env var
/// - Default location at `$HOME/.apl/apl.toml`
pub fn apl_config_file(config_file: Option<&Utf8PathBuf>) -> &'static Utf8PathBuf {
    APL_CONFIG_FILE.get_or_init(|| {
        if let Some(file) = config_file {
            file.clone()
        } else if let Ok(file) = std::env::var("APL_CONFIG_FILE") {
            Utf8PathBuf::from(file)
        } else {
            apl_default_dir().join("apl.toml")
        }
    })
}

/// Engine settings
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct Settings {
    /// Maximum number of active contexts
    pub max_depth: usize,
    /// Capacity of the symbol table
    pub max_symbols: usize,
    /// Initial `⎕IO`
    pub index_origin: i64,
    /// Significant digits when printing floats
    pub print_precision: usize,
}

impl Settings {
    /// Loads config settings from a file or env vars, then applies `overrides`
    pub fn from_config(
        config_file: &Utf8PathBuf,
        overrides: Option<&HashMap<&str, String>>,
    ) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let keys = ["max_depth", "max_symbols", "index_origin", "print_precision"];
        let get = |key: &str| overrides.and_then(|s| s.get(key).cloned());
        // Sources are read first to last, in order of increasing precedence.
        let settings: Self = Config::builder()
            .set_default(keys[0], defaults.max_depth as u64)?
            .set_default(keys[1], defaults.max_symbols as u64)?
            .set_default(keys[2], defaults.index_origin)?
            .set_default(keys[3], defaults.print_precision as u64)?
            .add_source(File::with_name(config_file.as_str()).required(false))
            .add_source(Environment::with_prefix("APL"))
            .set_override_option(keys[0], get(keys[0]))?
            .set_override_option(keys[1], get(keys[1]))?
            .set_override_option(keys[2], get(keys[2]))?
            .set_override_option(keys[3], get(keys[3]))?
            .build()
            .and_then(|c| c.try_deserialize())?;
        settings.validate()
    }

    fn validate(self) -> Result<Self, ConfigError> {
        if self.index_origin != 0 && self.index_origin != 1 {
            return Err(ConfigError::Message(format!(
                "index_origin must be 0 or 1, not {}",
                self.index_origin
            )));
        }
        if self.max_depth == 0 {
            return Err(ConfigError::Message("max_depth must be positive".into()));
        }
        Ok(self)
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            max_depth: 1000,
            max_symbols: 65536,
            index_origin: 1,
            print_precision: 10,
        }
    }
}

#[cfg(test)]
mod tests {
    use camino::Utf8Path;
    use std::collections::HashMap;
    use std::io::prelude::*;
    use tempfile::Builder;

    use super::Settings;

    #[test]
    fn test_config_file_and_overrides() {
        let tmp_dir = Builder::new().prefix("tmp").tempdir().unwrap();
        let tmp_dir = Utf8Path::from_path(tmp_dir.path()).unwrap();
        let config_file = tmp_dir.join("apl.toml");

        let mut file = std::fs::File::create(config_file.clone()).unwrap();
        file.write_all(b"index_origin = 0\nmax_depth = 64\n").unwrap();

        let settings = Settings::from_config(&config_file, None).unwrap();
        assert_eq!(settings.index_origin, 0);
        assert_eq!(settings.max_depth, 64);
        assert_eq!(settings.max_symbols, Settings::default().max_symbols);

        let overrides = HashMap::from([("max_depth", "8".to_string())]);
        let settings = Settings::from_config(&config_file, Some(&overrides)).unwrap();
        assert_eq!(settings.max_depth, 8);
    }

    #[test]
    fn test_config_rejects_index_origin() {
        let tmp_dir = Builder::new().prefix("tmp").tempdir().unwrap();
        let tmp_dir = Utf8Path::from_path(tmp_dir.path()).unwrap();
        let config_file = tmp_dir.join("apl.toml");
        std::fs::write(&config_file, "index_origin = 7\n").unwrap();
        assert!(Settings::from_config(&config_file, None).is_err());
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let tmp_dir = Builder::new().prefix("tmp").tempdir().unwrap();
        let tmp_dir = Utf8Path::from_path(tmp_dir.path()).unwrap();
        let settings = Settings::from_config(&tmp_dir.join("absent.toml"), None).unwrap();
        assert_eq!(settings, Settings::default());
    }
}
