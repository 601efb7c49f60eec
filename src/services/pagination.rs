// Copyright (c) 2025 TexasFortress.AI
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Storage-first retrieval of earlier messages with one backend top-up.

use async_trait::async_trait;
use log::{debug, error};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::error::{CoreError, Result};
use crate::external::storage::DataStorage;
use crate::models::{EmailAddress, Folder, Message};
use crate::services::composite::CompositeFolder;

/// One entry of a page. `MoreAvailable` is only ever the sole entry of a page:
/// the backend produced messages but none of them landed on this page.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PageEntry {
    Message(Message),
    MoreAvailable,
}

impl PageEntry {
    pub fn message(&self) -> Option<&Message> {
        match self {
            PageEntry::Message(message) => Some(message),
            PageEntry::MoreAvailable => None,
        }
    }
}

/// Messages of a page, dropping the marker.
pub fn page_messages(page: &[PageEntry]) -> Vec<Message> {
    page.iter().filter_map(|e| e.message().cloned()).collect()
}

/// Where stored messages of a page come from.
#[async_trait]
pub trait StoredMessages: Send + Sync {
    async fn earlier(&self, count: usize, last: Option<&Message>) -> Result<Vec<Message>>;
}

/// Stored messages of the composite's member folders.
pub struct FolderMessages<'a> {
    pub storage: &'a dyn DataStorage,
    pub folders: &'a [Folder],
}

#[async_trait]
impl StoredMessages for FolderMessages<'_> {
    async fn earlier(&self, count: usize, last: Option<&Message>) -> Result<Vec<Message>> {
        self.storage
            .get_earlier_messages_in_folders(self.folders, count, last)
            .await
    }
}

/// Stored messages exchanged with one contact.
pub struct ContactMessages<'a> {
    pub storage: &'a dyn DataStorage,
    pub contact: &'a EmailAddress,
}

#[async_trait]
impl StoredMessages for ContactMessages<'_> {
    async fn earlier(&self, count: usize, last: Option<&Message>) -> Result<Vec<Message>> {
        self.storage
            .get_earlier_contact_messages(self.contact, count, last)
            .await
    }
}

/// Up to `count` messages older than `last`.
///
/// Storage answers first. When it runs short, one batch of `batch_size` is
/// pulled into storage through `folder` and the page is rebuilt from storage
/// starting at `last` again. Pulled messages of one member can be newer than
/// stored messages of another, so they must compete for the whole page.
/// Backend connection failures degrade to storage-only results.
pub async fn earlier_messages(
    folder: &CompositeFolder,
    stored: &dyn StoredMessages,
    count: usize,
    last: Option<&Message>,
    batch_size: usize,
    cancel: &CancellationToken,
) -> Result<Vec<PageEntry>> {
    if count == 0 {
        return Ok(Vec::new());
    }

    let mut messages = stored.earlier(count, last).await?;
    if messages.len() >= count {
        messages.truncate(count);
        return Ok(messages.into_iter().map(PageEntry::Message).collect());
    }

    let mut page: Vec<PageEntry> = Vec::with_capacity(count);
    match folder.receive_earlier_messages(batch_size, cancel).await {
        Ok(loaded) => {
            let stored_before = messages.len();
            if !loaded.is_empty() {
                messages = stored.earlier(count, last).await?;
            }
            debug!(
                "Backend loaded {} earlier message(s), page grew from {} to {}",
                loaded.len(),
                stored_before,
                messages.len()
            );

            page.extend(messages.into_iter().map(PageEntry::Message));
            if !loaded.is_empty() && page.is_empty() {
                page.push(PageEntry::MoreAvailable);
            }
        }
        Err(CoreError::Cancelled) => {
            page.extend(messages.into_iter().map(PageEntry::Message));
        }
        Err(e) if e.is_connection() => {
            error!("Connection error while loading earlier messages: {}", e);
            page.extend(messages.into_iter().map(PageEntry::Message));
        }
        Err(e) => return Err(e),
    }

    page.truncate(count);
    Ok(page)
}
