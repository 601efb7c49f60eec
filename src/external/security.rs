// Copyright (c) 2025 TexasFortress.AI
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{Account, EmailAddress, Message};

/// Encrypts/signs outgoing and decrypts incoming messages.
#[async_trait]
pub trait MessageProtector: Send + Sync {
    async fn protect(&self, message: Message, encrypt: bool, sign: bool) -> Result<Message>;
    async fn unprotect(&self, message: Message) -> Result<Message>;
}

/// Storage unlock, master password and key management.
#[async_trait]
pub trait SecurityManager: Send + Sync {
    /// Unlocks storage; fails with `CoreError::InvalidPassword` on a wrong password.
    async fn start(&self, password: &str) -> Result<()>;
    async fn reset(&self) -> Result<()>;
    async fn is_never_started(&self) -> Result<bool>;
    async fn change_password(&self, current: &str, new: &str) -> Result<()>;
    async fn is_seed_phrase_initialized(&self) -> Result<bool>;

    fn message_protector(&self) -> Arc<dyn MessageProtector>;

    async fn create_default_pgp_keys(&self, account: &Account) -> Result<()>;

    /// Encryption public key of `email`, in address-safe form.
    async fn email_public_key(&self, email: &EmailAddress) -> Result<String>;

    /// Derives a decentralized identity for `tag` and returns its public key
    /// in address-safe form.
    async fn derive_decentralized_key(&self, tag: &str) -> Result<String>;
}
