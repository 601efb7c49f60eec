// Copyright (c) 2025 TexasFortress.AI
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Restoring accounts and messages from a downloaded backup.

#[cfg(test)]
mod backup_restore_tests {
    use crate::common::{account, drain, folder, kinds, message};
    use mailhub::config::Settings;
    use mailhub::external::{FolderMessages, RestoredBackup};
    use mailhub::models::NO_GROUP;
    use mailhub::testing::{FakeBackupManager, TestHarness};
    use url::Url;

    const BACKUP_URI: &str = "https://backup.example.com/store/";

    fn backup_file_name() -> String {
        format!("{}.backup", FakeBackupManager::FINGERPRINT)
    }

    fn harness() -> TestHarness {
        let mut settings = Settings::default();
        settings.backup.download_uri = Some(BACKUP_URI.to_string());
        TestHarness::with_settings(settings)
    }

    #[tokio::test]
    async fn empty_installation_restores_accounts_and_messages() {
        let harness = harness();
        harness.security.set_seed_initialized(true);
        let me = account("me@example.com", NO_GROUP, &["INBOX", "Archive"]);
        let inbox = folder(&me, "INBOX");
        harness.transfer.put(&backup_file_name(), vec![7, 7, 7]);
        harness.backup.set_restored(RestoredBackup {
            accounts: vec![me.clone()],
            messages: vec![(
                me.email.clone(),
                vec![
                    FolderMessages {
                        folder_full_name: "inbox".into(),
                        messages: vec![message(1, &inbox, 1), message(2, &inbox, 2)],
                    },
                    FolderMessages {
                        folder_full_name: "Gone".into(),
                        messages: vec![message(3, &inbox, 3)],
                    },
                ],
            )],
        });
        let mut events = harness.core.subscribe();

        assert!(harness.core.restore_from_configured_backup().await.unwrap());

        assert_eq!(
            harness.transfer.requests(),
            vec![(Url::parse(BACKUP_URI).unwrap(), backup_file_name())]
        );
        assert_eq!(harness.backup.received(), vec![vec![7, 7, 7]]);
        assert!(harness.core.exists_account(&me.email).await.unwrap());
        assert_eq!(harness.core.scheduler_count(), 1);
        assert_eq!(harness.storage.messages_in(&inbox).len(), 2);
        assert_eq!(harness.storage.message_count(), 2);
        assert_eq!(kinds(&drain(&mut events)), vec!["account_added"]);
        harness.core.dispose().await;
    }

    #[tokio::test]
    async fn nothing_happens_before_the_seed_phrase_exists() {
        let harness = harness();
        harness.transfer.put(&backup_file_name(), vec![1]);

        assert!(!harness.core.restore_from_configured_backup().await.unwrap());
        assert!(harness.transfer.requests().is_empty());
    }

    #[tokio::test]
    async fn nothing_happens_once_accounts_exist() {
        let harness = harness();
        harness.security.set_seed_initialized(true);
        harness.seed_account(account("me@example.com", NO_GROUP, &["INBOX"])).await.unwrap();

        assert!(!harness.core.restore_from_configured_backup().await.unwrap());
        assert!(harness.transfer.requests().is_empty());
    }

    #[tokio::test]
    async fn missing_backup_file_is_not_an_error() {
        let harness = harness();
        harness.security.set_seed_initialized(true);

        assert!(!harness.core.restore_from_configured_backup().await.unwrap());
        assert_eq!(harness.transfer.requests().len(), 1);
        assert!(harness.backup.received().is_empty());
    }

    #[tokio::test]
    async fn unconfigured_backup_location_is_skipped() {
        let harness = TestHarness::new();
        harness.security.set_seed_initialized(true);

        assert!(!harness.core.restore_from_configured_backup().await.unwrap());
        assert!(harness.transfer.requests().is_empty());
    }
}
