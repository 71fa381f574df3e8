//! Code for loading program settings.
//!
//! Settings are read once at startup and treated as immutable for the life of the process. The
//! flow scale factor is deliberately not a setting; it is an init-time constant.
use crate::get_coldplan_config_dir;
use crate::input::read_toml;
use crate::solver::{SolverChoice, SolverOptions};
use anyhow::{Result, bail};
use documented::DocumentedFields;
use log::LevelFilter;
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt::Write;
use std::path::{Path, PathBuf};

const SETTINGS_FILE_NAME: &str = "settings.toml";

/// The log level used when neither the settings file nor the environment names one
const DEFAULT_LOG_LEVEL: &str = "info";

const DEFAULT_SETTINGS_FILE_HEADER: &str =
    "# This file contains the program settings for the coldplan planner
";

/// Default log level for program
fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

/// Default relative MIP gap
fn default_mip_gap() -> f64 {
    1e-4
}

/// Warmstart hints are generated unless disabled
fn default_warmstart() -> bool {
    true
}

/// Get the path to where the settings file will be read from
pub fn get_settings_file_path() -> PathBuf {
    let mut path = get_coldplan_config_dir();
    path.push(SETTINGS_FILE_NAME);

    path
}

/// Program settings from config file
#[derive(Debug, DocumentedFields, Serialize, Deserialize, PartialEq)]
pub struct Settings {
    /// The default program log level
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Which MIP solver to use (highs or cbc)
    #[serde(default)]
    pub solver: SolverChoice,
    /// Relative MIP gap at which the solver may stop
    #[serde(default = "default_mip_gap")]
    pub mip_gap: f64,
    /// Wall-clock limit for one solve, in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_limit_seconds: Option<f64>,
    /// Number of solver threads; the solver decides when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threads: Option<i32>,
    /// Whether to generate campaign-pattern warmstart hints
    #[serde(default = "default_warmstart")]
    pub warmstart: bool,
    /// Whether the solver may log to the console
    #[serde(default)]
    pub solver_log: bool,
}

impl Default for Settings {
    fn default() -> Self {
        toml::from_str("").expect("Cannot create settings from empty TOML file")
    }
}

impl Settings {
    /// Read the contents of a settings file from the user's config directory.
    ///
    /// If the file is not present, default values for settings will be used
    ///
    /// # Returns
    ///
    /// The program settings as a `Settings` struct or an error if the file is invalid
    pub fn load() -> Result<Settings> {
        Self::load_from_path(&get_settings_file_path())
    }

    /// Read from the specified path, falling back to defaults when the file is absent
    fn load_from_path(file_path: &Path) -> Result<Settings> {
        if !file_path.is_file() {
            return Ok(Settings::default());
        }

        read_toml(file_path)
    }

    /// The effective log level.
    ///
    /// The `COLDPLAN_LOG_LEVEL` environment variable takes precedence over the settings file.
    /// Recognised levels are off, error, warn, info, debug and trace.
    pub fn log_level_filter(&self) -> Result<LevelFilter> {
        let name = env::var("COLDPLAN_LOG_LEVEL").unwrap_or_else(|_| self.log_level.clone());
        match name.to_lowercase().as_str() {
            "off" => Ok(LevelFilter::Off),
            "error" => Ok(LevelFilter::Error),
            "warn" => Ok(LevelFilter::Warn),
            "info" => Ok(LevelFilter::Info),
            "debug" => Ok(LevelFilter::Debug),
            "trace" => Ok(LevelFilter::Trace),
            unknown => bail!("Unknown log level: {unknown}"),
        }
    }

    /// The [`SolverOptions`] these settings describe
    pub fn solver_options(&self) -> SolverOptions {
        SolverOptions {
            mip_gap: self.mip_gap,
            time_limit_seconds: self.time_limit_seconds,
            threads: self.threads,
            log_to_console: self.solver_log,
        }
    }

    /// The contents of the default settings file
    pub fn default_file_contents() -> String {
        // Settings object with default values set by serde
        let settings = Settings::default();

        // Convert to TOML
        let settings_raw = toml::to_string(&settings).expect("Could not convert settings to TOML");

        // Iterate through the generated TOML, commenting out lines and adding docs
        let mut out = DEFAULT_SETTINGS_FILE_HEADER.to_string();
        for line in settings_raw.split('\n') {
            if let Some(last) = line.find('=') {
                // Add documentation from doc comments
                let field = line[..last].trim();

                // Use doc comment to document parameter. All fields should have doc comments.
                let docs = Settings::get_field_docs(field).expect("Missing doc comment for field");
                for line in docs.split('\n') {
                    write!(&mut out, "\n# # {}\n", line.trim()).unwrap();
                }

                writeln!(&mut out, "# {}", line.trim()).unwrap();
            }
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn test_settings_load_from_path_no_file() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join(SETTINGS_FILE_NAME); // NB: doesn't exist
        assert_eq!(
            Settings::load_from_path(&file_path).unwrap(),
            Settings::default()
        );
    }

    #[test]
    fn test_settings_load_from_path() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join(SETTINGS_FILE_NAME);

        {
            let mut file = File::create(&file_path).unwrap();
            writeln!(file, "log_level = \"warn\"\nsolver = \"highs\"\nmip_gap = 0.01").unwrap();
        }

        let settings = Settings::load_from_path(&file_path).unwrap();
        assert_eq!(settings.log_level, "warn");
        assert_eq!(settings.solver, SolverChoice::Highs);
        assert_eq!(settings.solver_options().mip_gap, 0.01);
        assert!(settings.warmstart);
    }

    #[test]
    fn test_default_file_contents() {
        assert!(!Settings::default_file_contents().is_empty());
    }

    /// NB: assumes COLDPLAN_LOG_LEVEL is not set in the test environment
    #[test]
    fn test_log_level_filter() {
        let mut settings = Settings::default();
        assert_eq!(settings.log_level_filter().unwrap(), LevelFilter::Info);

        settings.log_level = "debug".to_string();
        assert_eq!(settings.log_level_filter().unwrap(), LevelFilter::Debug);

        settings.log_level = "verbose".to_string();
        assert!(settings.log_level_filter().is_err());
    }
}
