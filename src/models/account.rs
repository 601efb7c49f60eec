// Copyright (c) 2025 TexasFortress.AI
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::address::EmailAddress;
use super::folder::Folder;

/// Group id meaning "not part of any group".
pub const NO_GROUP: i32 = 0;

/// Authentication material stored with an account.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AuthData {
    Basic {
        #[serde(skip_serializing, default)]
        password: String,
    },
    #[serde(rename = "oauth2")]
    OAuth2 {
        #[serde(skip_serializing, default)]
        refresh_token: String,
        #[serde(default)]
        auth_assistant_id: String,
    },
    ThirdPartyToken {
        user_id: String,
        #[serde(skip_serializing, default)]
        refresh_token: String,
        #[serde(skip_serializing, default)]
        salted_password: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub email: EmailAddress,
    #[serde(default)]
    pub group_id: i32,
    #[serde(default)]
    pub auth_data: Option<AuthData>,
    /// Minutes between scheduled synchronization passes.
    #[serde(default)]
    pub synchronization_interval: u32,
    #[serde(default)]
    pub folders_structure: Vec<Folder>,
    #[serde(default)]
    pub default_inbox_folder: Option<Folder>,
    #[serde(default)]
    pub is_backup_account_settings_enabled: bool,
    #[serde(default)]
    pub is_backup_account_messages_enabled: bool,
    #[serde(default)]
    pub key_tag: Option<String>,
}

impl Account {
    pub fn new(email: EmailAddress) -> Self {
        Self {
            email,
            group_id: NO_GROUP,
            auth_data: None,
            synchronization_interval: 0,
            folders_structure: Vec::new(),
            default_inbox_folder: None,
            is_backup_account_settings_enabled: false,
            is_backup_account_messages_enabled: false,
            key_tag: None,
        }
    }

    pub fn is_grouped(&self) -> bool {
        self.group_id != NO_GROUP
    }

    /// Scheduler period for this account; `fallback_minutes` applies when the
    /// stored interval is zero.
    pub fn synchronization_period(&self, fallback_minutes: u32) -> Duration {
        let minutes = if self.synchronization_interval == 0 {
            fallback_minutes.max(1)
        } else {
            self.synchronization_interval
        };
        Duration::from_secs(u64::from(minutes) * 60)
    }

    /// Replaces the folder structure and re-derives the default inbox.
    pub fn set_folders_structure(&mut self, folders: Vec<Folder>) {
        let keep_current = self
            .default_inbox_folder
            .as_ref()
            .is_some_and(|inbox| folders.contains(inbox));
        if !keep_current {
            self.default_inbox_folder = folders.iter().find(|f| f.is_inbox).cloned();
        }
        self.folders_structure = folders;
    }
}

/// Protocol spoken by a mail server under test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MailProtocol {
    Imap,
    Pop3,
    Smtp,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountGroup {
    pub id: i32,
    pub name: String,
}
