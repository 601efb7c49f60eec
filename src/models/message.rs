// Copyright (c) 2025 TexasFortress.AI
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::address::EmailAddress;
use super::folder::Folder;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Backend id, unique within its folder.
    pub id: u32,
    pub folder: Folder,
    #[serde(default)]
    pub from: Vec<EmailAddress>,
    #[serde(default)]
    pub to: Vec<EmailAddress>,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub text_body: Option<String>,
    pub date: DateTime<Utc>,
    #[serde(default)]
    pub is_read: bool,
    #[serde(default)]
    pub is_flagged: bool,
}

impl Message {
    pub fn new(id: u32, folder: Folder, date: DateTime<Utc>) -> Self {
        Self {
            id,
            folder,
            from: Vec::new(),
            to: Vec::new(),
            subject: String::new(),
            text_body: None,
            date,
            is_read: false,
            is_flagged: false,
        }
    }

    /// Total newest-first ordering key used for paging.
    pub fn page_key(&self) -> (DateTime<Utc>, String, String, u32) {
        (
            self.date,
            self.folder.account_email.address().to_ascii_lowercase(),
            self.folder.name_key(),
            self.id,
        )
    }
}

/// A newly received message together with the account that received it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReceivedMessageInfo {
    pub email: EmailAddress,
    pub message: Message,
}

impl ReceivedMessageInfo {
    pub fn new(email: EmailAddress, message: Message) -> Self {
        Self { email, message }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactAvatar {
    #[serde(skip_serializing, default)]
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contact {
    pub email: EmailAddress,
    #[serde(default)]
    pub full_name: String,
    #[serde(default)]
    pub avatar: Option<ContactAvatar>,
    #[serde(default)]
    pub unread_count: usize,
}

impl Contact {
    pub fn new(email: EmailAddress, full_name: impl Into<String>) -> Self {
        Self {
            email,
            full_name: full_name.into(),
            avatar: None,
            unread_count: 0,
        }
    }
}

/// Application-wide settings kept in storage.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoredSettings {
    #[serde(default)]
    pub decentralized_account_counter: u32,
}
