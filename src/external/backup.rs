// Copyright (c) 2025 TexasFortress.AI
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use async_trait::async_trait;
use url::Url;

use crate::error::Result;
use crate::models::{Account, EmailAddress, Message};

#[derive(Debug, Clone)]
pub struct FolderMessages {
    pub folder_full_name: String,
    pub messages: Vec<Message>,
}

/// Content recovered from a backup, applied by the core.
#[derive(Debug, Clone, Default)]
pub struct RestoredBackup {
    pub accounts: Vec<Account>,
    pub messages: Vec<(EmailAddress, Vec<FolderMessages>)>,
}

#[async_trait]
pub trait BackupManager: Send + Sync {
    fn backup_key_fingerprint(&self) -> String;
    async fn restore_backup(&self, backup: Vec<u8>) -> Result<RestoredBackup>;
}

/// Remote backup download.
#[async_trait]
pub trait BackupTransfer: Send + Sync {
    /// `Ok(None)` when no backup with that name exists.
    async fn download(&self, uri: &Url, file_name: &str) -> Result<Option<Vec<u8>>>;
}
