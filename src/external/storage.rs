// Copyright (c) 2025 TexasFortress.AI
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{
    Account, AccountGroup, Contact, ContactAvatar, EmailAddress, Folder, Message, StoredSettings,
};
use crate::services::events::EventHub;

/// Durable storage for accounts, groups, folders, contacts, messages and
/// settings.
///
/// Lookups of a missing account fail with `CoreError::AccountNotFound`; the
/// credential refresh protocol depends on that distinction.
#[async_trait]
pub trait DataStorage: Send + Sync {
    async fn exists_account_with_email_address(&self, email: &EmailAddress) -> Result<bool>;
    async fn get_account(&self, email: &EmailAddress) -> Result<Account>;
    async fn get_accounts(&self) -> Result<Vec<Account>>;
    async fn add_account(&self, account: &Account) -> Result<()>;
    async fn update_account(&self, account: &Account) -> Result<()>;
    async fn delete_account(&self, account: &Account) -> Result<()>;

    async fn get_account_groups(&self) -> Result<Vec<AccountGroup>>;
    /// Stores a new group and returns it with its assigned id.
    async fn add_account_group(&self, name: &str) -> Result<AccountGroup>;

    async fn delete_folder(&self, email: &EmailAddress, full_name: &str) -> Result<()>;

    async fn get_contacts(&self) -> Result<Vec<Contact>>;
    async fn get_contact(&self, email: &EmailAddress) -> Result<Contact>;
    async fn exists_contact_with_email_address(&self, email: &EmailAddress) -> Result<bool>;
    async fn set_contact_avatar(&self, email: &EmailAddress, avatar: ContactAvatar) -> Result<()>;
    async fn remove_contact(&self, email: &EmailAddress) -> Result<()>;

    /// Inserts or replaces messages of `folder`, keyed by message id.
    async fn add_messages(&self, folder: &Folder, messages: &[Message]) -> Result<()>;

    /// Up to `count` messages of `folders` strictly older than `last`,
    /// newest first.
    async fn get_earlier_messages_in_folders(
        &self,
        folders: &[Folder],
        count: usize,
        last: Option<&Message>,
    ) -> Result<Vec<Message>>;

    /// Up to `count` messages exchanged with `contact` strictly older than
    /// `last`, newest first.
    async fn get_earlier_contact_messages(
        &self,
        contact: &EmailAddress,
        count: usize,
        last: Option<&Message>,
    ) -> Result<Vec<Message>>;

    async fn get_unread_messages_count_by_contact(&self) -> Result<Vec<(EmailAddress, usize)>>;

    async fn get_settings(&self) -> Result<StoredSettings>;
    async fn set_settings(&self, settings: &StoredSettings) -> Result<()>;

    /// Lets the storage publish contact events it originates.
    fn attach_event_hub(&self, _events: EventHub) {}

    /// Releases the underlying resources. Called once, on disposal.
    async fn close(&self) {}
}
