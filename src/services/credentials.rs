// Copyright (c) 2025 TexasFortress.AI
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Credential providers built from an account's authentication data.
//!
//! Handles:
//! - Basic (user name + password) credentials
//! - OAuth2 credentials, refreshing the access token on every request and
//!   persisting rotated refresh tokens
//! - Third-party token credentials

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, info, warn};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

#[cfg(test)]
use mockall::automock;

use crate::error::{CoreError, Result};
use crate::external::storage::DataStorage;
use crate::models::{Account, AuthData, EmailAddress};

/// Credentials handed to a backend connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccountCredentials {
    Basic {
        user_name: String,
        password: String,
    },
    OAuth2 {
        user_name: String,
        access_token: String,
    },
    ThirdPartyToken {
        user_name: String,
        user_id: String,
        refresh_token: String,
        salted_password: String,
    },
}

/// Access token together with the refresh token to use next time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Exchanges a refresh token for a fresh access token. `auth_assistant_id`
/// names the OAuth2 provider that issued the token.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait TokenResolver: Send + Sync {
    async fn get_access_token(
        &self,
        email: &EmailAddress,
        auth_assistant_id: &str,
        refresh_token: &str,
        cancel: &CancellationToken,
    ) -> Result<TokenPair>;
}

#[async_trait]
pub trait CredentialsProvider: Send + Sync {
    /// `supported_mechanisms` only matters to providers that negotiate.
    async fn get_credentials(
        &self,
        supported_mechanisms: &HashSet<String>,
        cancel: &CancellationToken,
    ) -> Result<AccountCredentials>;
}

/// In-memory account record shared between the caller creating an account
/// and the provider that may rotate its token before it is stored.
pub type SharedAccount = Arc<Mutex<Account>>;

pub struct CredentialsManager {
    storage: Arc<dyn DataStorage>,
    token_resolver: Arc<dyn TokenResolver>,
}

impl CredentialsManager {
    pub fn new(storage: Arc<dyn DataStorage>, token_resolver: Arc<dyn TokenResolver>) -> Self {
        Self {
            storage,
            token_resolver,
        }
    }

    /// Builds a provider for the account held by `record`, or `None` when the
    /// account carries no authentication data.
    pub async fn create_credentials_provider(
        &self,
        record: SharedAccount,
    ) -> Option<Arc<dyn CredentialsProvider>> {
        let (email, auth_data) = {
            let account = record.lock().await;
            (account.email.clone(), account.auth_data.clone())
        };

        let provider: Arc<dyn CredentialsProvider> = match auth_data? {
            AuthData::Basic { password } => Arc::new(BasicCredentialsProvider {
                credentials: AccountCredentials::Basic {
                    user_name: email.address().to_string(),
                    password,
                },
            }),
            AuthData::OAuth2 {
                refresh_token,
                auth_assistant_id,
            } => Arc::new(OAuth2CredentialsProvider::new(
                Arc::clone(&self.storage),
                Arc::clone(&self.token_resolver),
                email,
                auth_assistant_id,
                refresh_token,
                record,
            )),
            AuthData::ThirdPartyToken {
                user_id,
                refresh_token,
                salted_password,
            } => Arc::new(ThirdPartyTokenCredentialsProvider {
                credentials: AccountCredentials::ThirdPartyToken {
                    user_name: email.address().to_string(),
                    user_id,
                    refresh_token,
                    salted_password,
                },
            }),
        };
        Some(provider)
    }

    pub async fn create_for_account(&self, account: &Account) -> Option<Arc<dyn CredentialsProvider>> {
        self.create_credentials_provider(Arc::new(Mutex::new(account.clone())))
            .await
    }
}

pub struct BasicCredentialsProvider {
    credentials: AccountCredentials,
}

#[async_trait]
impl CredentialsProvider for BasicCredentialsProvider {
    async fn get_credentials(
        &self,
        _supported_mechanisms: &HashSet<String>,
        _cancel: &CancellationToken,
    ) -> Result<AccountCredentials> {
        Ok(self.credentials.clone())
    }
}

pub struct ThirdPartyTokenCredentialsProvider {
    credentials: AccountCredentials,
}

#[async_trait]
impl CredentialsProvider for ThirdPartyTokenCredentialsProvider {
    async fn get_credentials(
        &self,
        _supported_mechanisms: &HashSet<String>,
        _cancel: &CancellationToken,
    ) -> Result<AccountCredentials> {
        Ok(self.credentials.clone())
    }
}

/// Where rotated refresh tokens go.
enum AccountBinding {
    /// The account may not be stored yet; rotations also land in this record.
    Pending(SharedAccount),
    /// The account has been written to storage at least once.
    Persisted,
}

struct OAuth2State {
    refresh_token: String,
    binding: AccountBinding,
}

pub struct OAuth2CredentialsProvider {
    storage: Arc<dyn DataStorage>,
    token_resolver: Arc<dyn TokenResolver>,
    email: EmailAddress,
    auth_assistant_id: String,
    // Held across the refresh so rotations for one account never interleave.
    state: Mutex<OAuth2State>,
}

impl OAuth2CredentialsProvider {
    pub fn new(
        storage: Arc<dyn DataStorage>,
        token_resolver: Arc<dyn TokenResolver>,
        email: EmailAddress,
        auth_assistant_id: String,
        refresh_token: String,
        record: SharedAccount,
    ) -> Self {
        Self {
            storage,
            token_resolver,
            email,
            auth_assistant_id,
            state: Mutex::new(OAuth2State {
                refresh_token,
                binding: AccountBinding::Pending(record),
            }),
        }
    }

    /// Refresh token the next request will present.
    pub async fn current_refresh_token(&self) -> String {
        self.state.lock().await.refresh_token.clone()
    }

    pub async fn is_persisted(&self) -> bool {
        matches!(self.state.lock().await.binding, AccountBinding::Persisted)
    }

    async fn get_access_token(&self, cancel: &CancellationToken) -> Result<String> {
        let mut state = self.state.lock().await;

        let pair = self
            .token_resolver
            .get_access_token(&self.email, &self.auth_assistant_id, &state.refresh_token, cancel)
            .await?;

        let rotated = pair.refresh_token != state.refresh_token;
        state.refresh_token = pair.refresh_token;

        if rotated || matches!(state.binding, AccountBinding::Pending(_)) {
            if rotated {
                debug!("Refresh token rotated for {}", self.email);
            }
            self.persist_refresh_token(&mut state).await?;
        }

        Ok(pair.access_token)
    }

    async fn persist_refresh_token(&self, state: &mut OAuth2State) -> Result<()> {
        match self.storage.get_account(&self.email).await {
            Ok(mut account) => {
                replace_refresh_token(&mut account, &state.refresh_token)?;
                self.storage.update_account(&account).await.map_err(|e| {
                    CoreError::Storage(format!(
                        "Failed to persist refresh token for {}: {}",
                        self.email, e
                    ))
                })?;
                if matches!(state.binding, AccountBinding::Pending(_)) {
                    info!("Account {} is persisted, token rotations now go to storage", self.email);
                }
                state.binding = AccountBinding::Persisted;
                Ok(())
            }
            Err(CoreError::AccountNotFound(_)) => match &state.binding {
                AccountBinding::Pending(record) => {
                    // Still being created: keep the rotation in memory and retry
                    // persistence on the next refresh.
                    let mut account = record.lock().await;
                    replace_refresh_token(&mut account, &state.refresh_token)?;
                    debug!("Account {} not stored yet, kept rotated token in memory", self.email);
                    Ok(())
                }
                AccountBinding::Persisted => {
                    warn!("Account {} disappeared from storage", self.email);
                    Err(CoreError::authentication(&self.email, "Account not found"))
                }
            },
            Err(e) => Err(CoreError::Storage(format!(
                "Failed to load account {} for token rotation: {}",
                self.email, e
            ))),
        }
    }
}

fn replace_refresh_token(account: &mut Account, refresh_token: &str) -> Result<()> {
    match account.auth_data.as_mut() {
        Some(AuthData::OAuth2 {
            refresh_token: stored,
            ..
        }) => {
            *stored = refresh_token.to_string();
            Ok(())
        }
        _ => Err(CoreError::authentication(
            &account.email,
            "Account doesn't have authentication data",
        )),
    }
}

#[async_trait]
impl CredentialsProvider for OAuth2CredentialsProvider {
    async fn get_credentials(
        &self,
        _supported_mechanisms: &HashSet<String>,
        cancel: &CancellationToken,
    ) -> Result<AccountCredentials> {
        Ok(AccountCredentials::OAuth2 {
            user_name: self.email.address().to_string(),
            access_token: self.get_access_token(cancel).await?,
        })
    }
}
