// Copyright (c) 2025 TexasFortress.AI
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Refresh-token rotation while an account is being added, and afterwards.

#[cfg(test)]
mod credential_rotation_tests {
    use mailhub::config::Settings;
    use mailhub::error::CoreError;
    use mailhub::external::DataStorage;
    use mailhub::models::{Account, AuthData, EmailAddress};
    use mailhub::testing::{FakeTokenResolver, TestHarness};
    use tokio_util::sync::CancellationToken;

    fn oauth_account(email: &str, refresh_token: &str) -> Account {
        let mut account = Account::new(EmailAddress::from(email));
        account.auth_data = Some(AuthData::OAuth2 {
            refresh_token: refresh_token.to_string(),
            auth_assistant_id: "provider".to_string(),
        });
        account
    }

    fn refresh_token(account: &Account) -> &str {
        match &account.auth_data {
            Some(AuthData::OAuth2 { refresh_token, .. }) => refresh_token,
            other => panic!("Unexpected auth data: {:?}", other),
        }
    }

    #[tokio::test]
    async fn token_rotated_during_add_is_the_one_stored() {
        let harness = TestHarness::build(Settings::default(), FakeTokenResolver::rotating());
        let account = oauth_account("me@example.com", "r0");

        harness
            .core
            .add_account(account.clone(), &CancellationToken::new())
            .await
            .unwrap();

        let stored = harness.core.get_account(&account.email).await.unwrap();
        assert_eq!(refresh_token(&stored), "r0-r1");
        assert_eq!(harness.tokens.call_count(), 1);
        assert_eq!(
            harness.tokens.requests(),
            vec![(account.email.clone(), "provider".to_string())]
        );
        harness.core.dispose().await;
    }

    #[tokio::test]
    async fn later_rotations_go_to_storage() {
        let harness = TestHarness::build(Settings::default(), FakeTokenResolver::rotating());
        let account = oauth_account("me@example.com", "r0");
        harness.seed_account(account.clone()).await.unwrap();
        let cancel = CancellationToken::new();

        let service = harness.core.get_account_service(&account.email).await.unwrap();
        service.update_folder_structure(&cancel).await.unwrap();
        service.update_folder_structure(&cancel).await.unwrap();

        let stored = harness.storage.get_account(&account.email).await.unwrap();
        assert_eq!(refresh_token(&stored), "r0-r1-r2");
        assert_eq!(harness.storage.account_update_count(), 2);
    }

    #[tokio::test]
    async fn persisted_account_removed_from_storage_fails_authentication() {
        let harness = TestHarness::build(Settings::default(), FakeTokenResolver::rotating());
        let account = oauth_account("me@example.com", "r0");
        harness.seed_account(account.clone()).await.unwrap();
        let cancel = CancellationToken::new();

        let service = harness.core.get_account_service(&account.email).await.unwrap();
        service.update_folder_structure(&cancel).await.unwrap();
        harness.storage.delete_account(&account).await.unwrap();

        let err = service.update_folder_structure(&cancel).await.unwrap_err();
        assert!(matches!(err, CoreError::Authentication { .. }));
    }

    #[tokio::test]
    async fn storage_outage_during_rotation_is_not_an_authentication_error() {
        let harness = TestHarness::build(Settings::default(), FakeTokenResolver::rotating());
        let account = oauth_account("me@example.com", "r0");
        harness.seed_account(account.clone()).await.unwrap();
        let cancel = CancellationToken::new();

        let service = harness.core.get_account_service(&account.email).await.unwrap();
        harness.storage.fail_account_reads(true);

        let err = service.update_folder_structure(&cancel).await.unwrap_err();
        assert!(matches!(err, CoreError::Storage(_)));
    }

    #[tokio::test]
    async fn basic_accounts_never_touch_the_token_resolver() {
        let harness = TestHarness::new();
        let mut account = Account::new(EmailAddress::from("me@example.com"));
        account.auth_data = Some(AuthData::Basic {
            password: "secret".into(),
        });

        harness
            .core
            .add_account(account, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(harness.tokens.call_count(), 0);
        harness.core.dispose().await;
    }
}
