// Copyright (c) 2025 TexasFortress.AI
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use config::{Environment, File};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    pub level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Used for accounts whose stored interval is zero.
    pub default_interval_minutes: u32,
    /// Number of messages pulled from a backend when storage runs short.
    pub receive_batch_size: usize,
    /// Forward failures caught by account schedulers to `exception_occurred`.
    pub report_scheduler_failures: bool,
    /// Forward per-folder failures of a pass to `exception_occurred`.
    pub report_folder_failures: bool,
    pub failure_history_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventsConfig {
    pub history_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupConfig {
    pub file_extension: String,
    pub download_uri: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub log: LogConfig,
    pub sync: SyncConfig,
    pub events: EventsConfig,
    pub backup: BackupConfig,
}

impl Settings {
    pub fn new(config_path: Option<&str>) -> Result<Self, SettingsError> {
        let mut config_builder = config::Config::builder()
            .set_default("log.level", "info")?
            .set_default("sync.default_interval_minutes", 10)?
            .set_default("sync.receive_batch_size", 100)?
            .set_default("sync.report_scheduler_failures", false)?
            .set_default("sync.report_folder_failures", false)?
            .set_default("sync.failure_history_size", 100)?
            .set_default("events.history_size", 100)?
            .set_default("backup.file_extension", ".backup")?;

        if let Some(path) = config_path {
            config_builder = config_builder.add_source(File::with_name(path));
        }

        // e.g. `MAILHUB_SYNC__RECEIVE_BATCH_SIZE=50` overrides `sync.receive_batch_size`
        config_builder = config_builder.add_source(
            Environment::with_prefix("MAILHUB")
                .prefix_separator("_")
                .separator("__")
                .ignore_empty(true)
                .try_parsing(true),
        );

        let settings: Settings = config_builder.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.sync.receive_batch_size == 0 {
            return Err(SettingsError::Invalid("sync.receive_batch_size must be positive".into()));
        }
        if self.sync.failure_history_size == 0 {
            return Err(SettingsError::Invalid("sync.failure_history_size must be positive".into()));
        }
        if self.events.history_size == 0 {
            return Err(SettingsError::Invalid("events.history_size must be positive".into()));
        }
        Ok(())
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        LogConfig { level: "info".to_string() }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            default_interval_minutes: 10,
            receive_batch_size: 100,
            report_scheduler_failures: false,
            report_folder_failures: false,
            failure_history_size: 100,
        }
    }
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self { history_size: 100 }
    }
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            file_extension: ".backup".to_string(),
            download_uri: None,
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log: LogConfig::default(),
            sync: SyncConfig::default(),
            events: EventsConfig::default(),
            backup: BackupConfig::default(),
        }
    }
}

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("Failed to load or parse configuration: {0}")]
    LoadError(#[from] config::ConfigError),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

impl From<SettingsError> for crate::error::CoreError {
    fn from(err: SettingsError) -> Self {
        crate::error::CoreError::Config(err.to_string())
    }
}
