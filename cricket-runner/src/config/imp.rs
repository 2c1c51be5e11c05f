// Copyright (c) The cricket Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{
    decoder::Sentinels,
    errors::{ConfigParseError, ConfigParseErrorKind},
    process::CommandLauncher,
};
use camino::{Utf8Path, Utf8PathBuf};
use config::{Config, ConfigBuilder, ConfigError, File, FileFormat, builder::DefaultState};
use itertools::Itertools;
use serde::Deserialize;
use std::{collections::BTreeSet, time::Duration};
use tracing::warn;

/// Trait for handling configuration warnings.
///
/// This trait allows for different warning handling strategies, such as logging warnings
/// (the default behavior) or collecting them for testing purposes.
pub trait ConfigWarnings {
    /// Handle unknown configuration keys found in a config file.
    fn unknown_config_keys(
        &mut self,
        config_file: &Utf8Path,
        project_dir: &Utf8Path,
        unknown: &BTreeSet<String>,
    );
}

/// Default implementation of ConfigWarnings that logs warnings using the tracing crate.
pub struct DefaultConfigWarnings;

impl ConfigWarnings for DefaultConfigWarnings {
    fn unknown_config_keys(
        &mut self,
        config_file: &Utf8Path,
        project_dir: &Utf8Path,
        unknown: &BTreeSet<String>,
    ) {
        let unknown_str = if unknown.len() == 1 {
            // Print this on the same line.
            format!("key: {}", unknown.iter().join(""))
        } else {
            format!(
                "keys:\n{}",
                unknown.iter().map(|key| format!("\n  - {key}")).join("")
            )
        };

        warn!(
            "in config file {}, ignoring unknown configuration {unknown_str}",
            config_file
                .strip_prefix(project_dir)
                .unwrap_or(config_file),
        )
    }
}

/// Overall configuration for cricket.
///
/// This is the root data structure for cricket configuration. It is layered from an embedded
/// default configuration and an optional per-project file.
#[derive(Clone, Debug)]
pub struct CricketConfig {
    project_dir: Utf8PathBuf,
    inner: CricketConfigDeserialize,
}

impl CricketConfig {
    /// The default location of the config within the path: `.config/cricket.toml`, used to read
    /// the config from the given directory.
    pub const CONFIG_PATH: &'static str = ".config/cricket.toml";

    /// Contains the default config as a TOML file.
    ///
    /// Repository-specific configuration is layered on top of the default config.
    pub const DEFAULT_CONFIG: &'static str = include_str!("../../default-config.toml");

    /// Reads the cricket config from the given file, or if not specified from
    /// `.config/cricket.toml` in the project directory.
    ///
    /// If the file isn't specified and the directory doesn't have `.config/cricket.toml`, uses
    /// the default config options.
    pub fn from_sources(
        project_dir: impl Into<Utf8PathBuf>,
        config_file: Option<&Utf8Path>,
        warnings: &mut impl ConfigWarnings,
    ) -> Result<Self, ConfigParseError> {
        let project_dir = project_dir.into();

        let (config_file, source) = match config_file {
            Some(file) => (file.to_owned(), File::new(file.as_str(), FileFormat::Toml)),
            None => {
                let config_file = project_dir.join(Self::CONFIG_PATH);
                let source = File::new(config_file.as_str(), FileFormat::Toml).required(false);
                (config_file, source)
            }
        };

        let builder = Self::make_default_config().add_source(source);
        let (inner, unknown) = Self::build_and_deserialize_config(&builder)
            .map_err(|kind| ConfigParseError::new(&config_file, kind))?;
        if !unknown.is_empty() {
            warnings.unknown_config_keys(&config_file, &project_dir, &unknown);
        }

        inner
            .validate()
            .map_err(|kind| ConfigParseError::new(&config_file, kind))?;

        Ok(Self { project_dir, inner })
    }

    /// Returns the default cricket config.
    #[cfg(test)]
    pub(crate) fn default_config(project_dir: impl Into<Utf8PathBuf>) -> Self {
        let config = Self::make_default_config()
            .build()
            .expect("default config is always valid");

        let mut unknown = BTreeSet::new();
        let inner: CricketConfigDeserialize =
            serde_ignored::deserialize(config, |path: serde_ignored::Path| {
                unknown.insert(path.to_string());
            })
            .expect("default config is always valid");

        // Make sure there aren't any unknown keys in the default config, since it is
        // embedded/shipped with this binary.
        if !unknown.is_empty() {
            panic!(
                "found unknown keys in default config: {}",
                unknown.iter().join(", ")
            );
        }

        Self {
            project_dir: project_dir.into(),
            inner,
        }
    }

    /// Returns the project directory: the working directory for the runner and discovery
    /// commands.
    pub fn project_dir(&self) -> &Utf8Path {
        &self.project_dir
    }

    /// Returns the runner configuration.
    pub fn runner(&self) -> &RunnerConfig {
        &self.inner.runner
    }

    /// Returns the discovery configuration.
    pub fn discover(&self) -> &DiscoverConfig {
        &self.inner.discover
    }

    /// Returns the protocol sentinels.
    pub fn sentinels(&self) -> &Sentinels {
        &self.inner.protocol
    }

    /// Returns a launcher for the configured runner command, running in the project directory.
    pub fn launcher(&self) -> CommandLauncher {
        let (program, args) = self
            .inner
            .runner
            .command
            .split_first()
            // Validation rejects empty commands.
            .expect("runner command is non-empty");
        CommandLauncher::new(program, args).current_dir(&self.project_dir)
    }

    // ---
    // Helper methods
    // ---

    fn make_default_config() -> ConfigBuilder<DefaultState> {
        Config::builder().add_source(File::from_str(Self::DEFAULT_CONFIG, FileFormat::Toml))
    }

    fn build_and_deserialize_config(
        builder: &ConfigBuilder<DefaultState>,
    ) -> Result<(CricketConfigDeserialize, BTreeSet<String>), ConfigParseErrorKind> {
        let config = builder
            .build_cloned()
            .map_err(|error| ConfigParseErrorKind::BuildError(Box::new(error)))?;

        let mut ignored = BTreeSet::new();
        let mut cb = |path: serde_ignored::Path| {
            ignored.insert(path.to_string());
        };
        let ignored_de = serde_ignored::Deserializer::new(config, &mut cb);
        let config: CricketConfigDeserialize = serde_path_to_error::deserialize(ignored_de)
            .map_err(|error| {
                // Both serde_path_to_error and the config crate report the key. We drop the key
                // from the config error for consistency.
                let path = error.path().clone();
                let config_error = error.into_inner();
                let error = match config_error {
                    ConfigError::At { error, .. } => *error,
                    other => other,
                };
                ConfigParseErrorKind::DeserializeError(Box::new(serde_path_to_error::Error::new(
                    path, error,
                )))
            })?;

        Ok((config, ignored))
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct CricketConfigDeserialize {
    runner: RunnerConfig,
    discover: DiscoverConfig,
    protocol: Sentinels,
}

impl CricketConfigDeserialize {
    fn validate(&self) -> Result<(), ConfigParseErrorKind> {
        if self.runner.command.is_empty() {
            return Err(ConfigParseErrorKind::EmptyCommand {
                key: "runner.command",
            });
        }
        if self.discover.command.is_empty() {
            return Err(ConfigParseErrorKind::EmptyCommand {
                key: "discover.command",
            });
        }

        let Sentinels {
            section_sentinel,
            run_terminator,
        } = &self.protocol;
        if section_sentinel.is_empty() || run_terminator.is_empty() {
            return Err(ConfigParseErrorKind::InvalidSentinels {
                reason: "sentinels must not be empty",
            });
        }
        if section_sentinel == run_terminator {
            return Err(ConfigParseErrorKind::InvalidSentinels {
                reason: "section sentinel and run terminator must differ",
            });
        }
        if section_sentinel.contains('\n') || run_terminator.contains('\n') {
            return Err(ConfigParseErrorKind::InvalidSentinels {
                reason: "sentinels must fit on a single line",
            });
        }

        Ok(())
    }
}

/// Configuration for running tests.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RunnerConfig {
    /// The command that runs tests and writes results to standard output.
    pub command: Vec<String>,

    /// How often the runner's output is polled.
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,
}

/// Configuration for discovering tests.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct DiscoverConfig {
    /// The command that lists test paths, one per line.
    pub command: Vec<String>,
}
