// Copyright (c) 2025 TexasFortress.AI
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::external::mailbox::MailBox;
use crate::external::security::MessageProtector;
use crate::external::storage::DataStorage;
use crate::models::{Account, EmailAddress, Folder, Message};
use crate::services::events::EventHub;

/// Folder refresh, message fetch and synchronization against one account's
/// backend.
#[async_trait]
pub trait AccountService: Send + Sync {
    fn email(&self) -> &EmailAddress;

    /// Refreshes the folder structure from the backend and returns it.
    async fn update_folder_structure(&self, cancel: &CancellationToken) -> Result<Vec<Folder>>;

    async fn receive_new_messages_in_folder(
        &self,
        folder: &Folder,
        cancel: &CancellationToken,
    ) -> Result<Vec<Message>>;

    /// Pulls up to `count` messages older than anything already stored for
    /// `folder` into storage and returns them.
    async fn receive_earlier_messages(
        &self,
        folder: &Folder,
        count: usize,
        cancel: &CancellationToken,
    ) -> Result<Vec<Message>>;

    async fn synchronize(&self, full: bool, cancel: &CancellationToken) -> Result<()>;

    async fn get_unread_messages_count(&self) -> Result<usize>;

    async fn delete_messages(&self, folder: &Folder, messages: &[Message]) -> Result<()>;
    async fn mark_messages_as_read(&self, messages: &[Message]) -> Result<()>;
    async fn mark_messages_as_unread(&self, messages: &[Message]) -> Result<()>;
    async fn flag_messages(&self, messages: &[Message]) -> Result<()>;
    async fn unflag_messages(&self, messages: &[Message]) -> Result<()>;

    async fn get_message_body(&self, message: &Message) -> Result<Message>;
    async fn send_message(&self, message: &Message, encrypt: bool, sign: bool) -> Result<()>;
    async fn create_draft_message(&self, message: &Message) -> Result<Message>;
    async fn update_draft_message(&self, id: u32, message: &Message) -> Result<Message>;

    async fn add_messages_to_storage(&self, folder: &Folder, messages: Vec<Message>) -> Result<()>;
}

/// Everything an account service is built from.
pub struct AccountServiceContext {
    pub account: Account,
    pub storage: Arc<dyn DataStorage>,
    pub mailbox: Arc<dyn MailBox>,
    pub protector: Arc<dyn MessageProtector>,
    /// Deleted / read / flagged / unread notifications go here.
    pub events: EventHub,
}

/// Builds account services.
///
/// Construction must be free of side effects: when two callers race to create
/// the service for one account the losing instance is dropped unused.
pub trait AccountServiceFactory: Send + Sync {
    fn create_account_service(&self, context: AccountServiceContext) -> Arc<dyn AccountService>;
}
