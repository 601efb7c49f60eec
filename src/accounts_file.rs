// Copyright (c) 2025 TexasFortress.AI
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! JSON seed file of accounts and groups.
//!
//! ```json
//! {
//!   "version": 1,
//!   "groups": [{ "id": 1, "name": "Work" }],
//!   "accounts": [{ "email": { "address": "me@example.com", "name": "Me" }, "group_id": 1 }]
//! }
//! ```
//!
//! Secrets in `auth_data` are read but never written back out.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use log::{debug, info};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{Account, AccountGroup, EmailAddress};

pub const SUPPORTED_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum AccountsFileError {
    #[error("Failed to read accounts file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse accounts file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Unsupported accounts file version {0} (expected {})", SUPPORTED_VERSION)]
    UnsupportedVersion(u32),

    #[error("Account {0} is listed twice")]
    DuplicateAccount(EmailAddress),

    #[error("Account {email} refers to unknown group {group_id}")]
    UnknownGroup { email: EmailAddress, group_id: i32 },
}

fn default_version() -> u32 {
    SUPPORTED_VERSION
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountsFile {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub groups: Vec<AccountGroup>,
    #[serde(default)]
    pub accounts: Vec<Account>,
}

impl AccountsFile {
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, AccountsFileError> {
        let path = path.as_ref();
        debug!("Loading accounts file {}", path.display());
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| AccountsFileError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        let file = Self::parse(&text, path)?;
        info!(
            "Loaded {} account(s) in {} group(s) from {}",
            file.accounts.len(),
            file.groups.len(),
            path.display()
        );
        Ok(file)
    }

    pub fn parse(text: &str, path: &Path) -> Result<Self, AccountsFileError> {
        let file: AccountsFile = serde_json::from_str(text).map_err(|source| AccountsFileError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        file.validate()?;
        Ok(file)
    }

    pub fn validate(&self) -> Result<(), AccountsFileError> {
        if self.version != SUPPORTED_VERSION {
            return Err(AccountsFileError::UnsupportedVersion(self.version));
        }

        let group_ids: HashSet<i32> = self.groups.iter().map(|g| g.id).collect();
        let mut seen = HashSet::new();
        for account in &self.accounts {
            if !seen.insert(account.email.clone()) {
                return Err(AccountsFileError::DuplicateAccount(account.email.clone()));
            }
            if account.is_grouped() && !group_ids.contains(&account.group_id) {
                return Err(AccountsFileError::UnknownGroup {
                    email: account.email.clone(),
                    group_id: account.group_id,
                });
            }
        }
        Ok(())
    }
}
