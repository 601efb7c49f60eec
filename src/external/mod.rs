// Copyright (c) 2025 TexasFortress.AI
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Contracts of the collaborators the orchestration core talks to.

pub mod account_service;
pub mod backup;
pub mod mailbox;
pub mod security;
pub mod storage;

pub use account_service::{AccountService, AccountServiceContext, AccountServiceFactory};
pub use backup::{BackupManager, BackupTransfer, FolderMessages, RestoredBackup};
pub use mailbox::{MailBox, MailBoxFactory};
pub use security::{MessageProtector, SecurityManager};
pub use storage::DataStorage;
pub use crate::services::credentials::TokenResolver;
