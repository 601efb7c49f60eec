// Copyright (c) 2025 TexasFortress.AI
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::models::{Account, Folder, MailProtocol};
use crate::services::credentials::CredentialsProvider;

/// Protocol-level handle to one account's backend.
#[async_trait]
pub trait MailBox: Send + Sync {
    async fn get_folders_structure(&self, cancel: &CancellationToken) -> Result<Vec<Folder>>;
}

/// Builds backend handles; `credentials` is `None` for accounts that carry no
/// authentication data.
#[async_trait]
pub trait MailBoxFactory: Send + Sync {
    fn create_mailbox(
        &self,
        account: &Account,
        credentials: Option<Arc<dyn CredentialsProvider>>,
    ) -> Result<Arc<dyn MailBox>>;

    /// Connects to a server and logs in with `credentials`, without creating
    /// an account.
    async fn test_mail_server(
        &self,
        server_address: &str,
        server_port: u16,
        protocol: MailProtocol,
        credentials: Arc<dyn CredentialsProvider>,
        cancel: &CancellationToken,
    ) -> Result<()>;
}
