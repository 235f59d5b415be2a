//! Global config for the CLI
//! Includes the REPL prompt and history settings
use std::collections::HashMap;

use crate::config::{apl_config_file, Settings, APL_CONFIG};
use camino::Utf8PathBuf;
use config::{Config, ConfigError, Environment, File};
use once_cell::sync::OnceCell;
use serde::Deserialize;

/// Global config varable for `CliSettings`
pub(crate) static CLI_CONFIG: OnceCell<CliSettings> = OnceCell::new();

/// Gets the `CLI_CONFIG` settings, initializing the engine's `APL_CONFIG` from
/// the same sources on the way. Precedence, greatest to least:
/// - `settings` map if provided; this contains any CLI args, set e.g. by
///   `apl --max-depth 200`
/// - Env var per setting, e.g. `APL_PROMPT`
/// - Config file (see `apl_config_file()`), e.g. in TOML:
///   ```toml
///   prompt = "> "
///   history = false
///   ```
/// - Default values
pub(crate) fn cli_config(
    config_file: Option<&Utf8PathBuf>,
    settings: Option<&HashMap<&str, String>>,
) -> &'static CliSettings {
    let file = apl_config_file(config_file);
    let engine = Settings::from_config(file, settings).unwrap_or_else(|e| {
        tracing::warn!("ignoring configuration: {e}");
        Settings::default()
    });
    APL_CONFIG.set(engine).unwrap_or(());
    CLI_CONFIG.get_or_init(|| {
        CliSettings::from_config(file, settings).unwrap_or_else(|e| {
            tracing::warn!("ignoring CLI configuration: {e}");
            CliSettings::default()
        })
    })
}

/// Contains the CLI configuration settings
// NOTE: The engine and the CLI share one config file.
#[derive(Debug, Deserialize)]
pub(crate) struct CliSettings {
    /// Keep the REPL history in `~/.apl/repl-history`
    pub(crate) history: bool,
    /// REPL input prompt
    pub(crate) prompt: String,
}

impl CliSettings {
    /// Loads config settings from a file or env var, or CLI arg if applicable
    pub(crate) fn from_config(
        config_file: &Utf8PathBuf,
        cli_settings: Option<&HashMap<&str, String>>,
    ) -> Result<Self, ConfigError> {
        let (history, prompt) = ("history", "prompt");
        let defaults = Self::default();
        Config::builder()
            .set_default(history, defaults.history)?
            .set_default(prompt, defaults.prompt)?
            .add_source(File::with_name(config_file.as_str()).required(false))
            // Then overwrite with any `APL` environment variables
            .add_source(Environment::with_prefix("APL"))
            .set_override_option(history, cli_settings.and_then(|s| s.get(history).map(|v| v.to_owned())))?
            .set_override_option(prompt, cli_settings.and_then(|s| s.get(prompt).map(|v| v.to_owned())))?
            .build()
            .and_then(|c| c.try_deserialize())
    }
}

impl Default for CliSettings {
    fn default() -> Self {
        Self {
            history: true,
            prompt: "      ".into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use camino::Utf8Path;
    use std::io::prelude::*;
    use tempfile::Builder;

    use crate::cli::config::CliSettings;
    use crate::config::Settings;

    // Tests a generic config file with identical syntax to that used in `CLI_CONFIG`
    #[test]
    fn test_config_cli() {
        let tmp_dir = Builder::new().prefix("tmp").tempdir().unwrap();
        let tmp_dir = Utf8Path::from_path(tmp_dir.path()).unwrap();
        let config_dir = tmp_dir.join("apl.toml");

        let mut config_file = std::fs::File::create(config_dir.clone()).unwrap();
        config_file.write_all(b"history = false\n").unwrap();
        config_file.write_all(b"prompt = \"apl> \"\n").unwrap();
        config_file.write_all(b"print_precision = 4\n").unwrap();

        let cli_config = CliSettings::from_config(&config_dir, None).unwrap();
        let apl_config = Settings::from_config(&config_dir, None).unwrap();
        assert!(!cli_config.history);
        assert_eq!(cli_config.prompt, "apl> ");
        assert_eq!(apl_config.print_precision, 4);
    }
}
