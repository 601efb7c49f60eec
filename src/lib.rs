// Copyright (c) 2025 TexasFortress.AI
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Library core for MailHub.
//!
//! Coordinates many mail accounts behind one facade, [`MailCore`]: a timer
//! per account, composite folders that span accounts of a group, paged
//! retrieval that prefers local storage, and OAuth2 credentials that survive
//! refresh-token rotation. Backends, storage and key management are
//! collaborator traits under [`external`].

// --- Modules ---
pub mod accounts_file;
pub mod config;
pub mod error;
pub mod external;
pub mod models;
pub mod services;
pub mod testing;

pub use services::mail_core::{MailCore, MailCoreDependencies};

// CONSOLIDATED PRELUDE
pub mod prelude {
    // Config
    pub use crate::config::Settings;

    // Errors
    pub use crate::error::{CoreError, FolderFailure, Result};

    // Models
    pub use crate::models::{
        Account, AccountGroup, AuthData, Contact, ContactAvatar, EmailAddress, Folder, Message, NO_GROUP,
    };

    // Collaborators
    pub use crate::external::{
        AccountService, AccountServiceFactory, BackupManager, BackupTransfer, DataStorage, MailBox,
        MailBoxFactory, SecurityManager,
    };
    pub use crate::services::credentials::TokenResolver;

    // Core
    pub use crate::services::{
        CompositeAccount, CompositeFolder, EventHub, MailCore, MailCoreDependencies, MailEvent, PageEntry,
    };

    // Common Libs
    pub use log::{debug, error, info, trace, warn};
    pub use std::sync::Arc;
    pub use tokio_util::sync::CancellationToken;
}
