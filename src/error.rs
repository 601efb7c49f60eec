// Copyright (c) 2025 TexasFortress.AI
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use serde::Serialize;
use thiserror::Error;

use crate::models::{EmailAddress, Folder};

#[derive(Debug, Error, Clone)]
pub enum CoreError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Authentication error for {address}: {message}")]
    Authentication { address: EmailAddress, message: String },

    #[error("Account not found: {0}")]
    AccountNotFound(EmailAddress),

    #[error("Account already exists: {0}")]
    AccountAlreadyExists(EmailAddress),

    #[error("Invalid database password")]
    InvalidPassword,

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Mail core has been disposed")]
    Disposed,

    #[error("New messages check failed for {} folder(s)", .0.len())]
    NewMessagesCheckFailed(Vec<FolderFailure>),

    #[error("Backup error: {0}")]
    Backup(String),

    #[error("Message protection error: {0}")]
    Protection(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Operation failed: {0}")]
    OperationFailed(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl CoreError {
    pub fn authentication(address: &EmailAddress, message: impl Into<String>) -> Self {
        CoreError::Authentication {
            address: address.clone(),
            message: message.into(),
        }
    }

    pub fn is_connection(&self) -> bool {
        matches!(self, CoreError::Connection(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, CoreError::Cancelled)
    }

    pub fn is_disposed(&self) -> bool {
        matches!(self, CoreError::Disposed)
    }
}

impl From<config::ConfigError> for CoreError {
    fn from(err: config::ConfigError) -> Self {
        CoreError::Config(err.to_string())
    }
}

impl From<tokio::task::JoinError> for CoreError {
    fn from(err: tokio::task::JoinError) -> Self {
        CoreError::OperationFailed(format!("Task failed: {}", err))
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;

/// A failure recorded while checking one account for new messages.
///
/// `folder` is `None` when the failure happened outside of a single folder
/// (refreshing the structure or reconciling with storage).
#[derive(Debug, Clone, Serialize)]
pub struct FolderFailure {
    pub email: EmailAddress,
    pub folder: Option<Folder>,
    pub error: String,
}

impl FolderFailure {
    pub fn new(email: EmailAddress, folder: Option<Folder>, error: &CoreError) -> Self {
        Self {
            email,
            folder,
            error: error.to_string(),
        }
    }
}
