// Copyright (c) 2025 TexasFortress.AI
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

pub mod composite;
pub mod credentials;
pub mod directory;
pub mod events;
pub mod mail_core;
pub mod pagination;
pub mod scheduler;
pub mod sync;

pub use composite::{CompositeAccount, CompositeFolder};
pub use credentials::{
    AccountCredentials, CredentialsManager, CredentialsProvider, SharedAccount, TokenPair, TokenResolver,
};
pub use directory::AccountDirectory;
pub use events::{EventHub, MailEvent, Subscription};
pub use mail_core::{MailCore, MailCoreDependencies};
pub use pagination::{page_messages, PageEntry};
pub use scheduler::{AccountScheduler, SchedulerState};
pub use sync::{FailureLog, PassReport, SyncEngine};
