// Copyright (c) 2025 TexasFortress.AI
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Scheduled and manual new-message checks.

#[cfg(test)]
mod new_message_checks_tests {
    use crate::common::{account, drain, folder, kinds, message};
    use mailhub::config::Settings;
    use mailhub::error::CoreError;
    use mailhub::models::{Account, NO_GROUP};
    use mailhub::services::events::MailEvent;
    use mailhub::testing::TestHarness;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    fn received_ids(events: &[MailEvent]) -> Vec<u32> {
        events
            .iter()
            .filter_map(|e| match e {
                MailEvent::MessagesReceived { messages, .. } => Some(messages),
                _ => None,
            })
            .flatten()
            .map(|info| info.message.id)
            .collect()
    }

    async fn started(settings: Settings, accounts: &[Account]) -> TestHarness {
        let harness = TestHarness::with_settings(settings);
        for account in accounts {
            harness.seed_account(account.clone()).await.unwrap();
        }
        assert!(harness.core.initialize_application("pw").await.unwrap());
        harness
    }

    #[tokio::test]
    async fn failing_folder_does_not_hide_its_siblings() {
        let mut settings = Settings::default();
        settings.sync.report_scheduler_failures = true;
        let me = account("me@example.com", NO_GROUP, &["INBOX", "Work"]);
        let harness = started(settings, &[me.clone()]).await;
        let behavior = harness.behavior();
        behavior.fail_folder(&folder(&me, "INBOX"), CoreError::OperationFailed("corrupt".into()));
        behavior.push_new_messages(&folder(&me, "Work"), vec![message(9, &folder(&me, "Work"), 1)]);
        let mut events = harness.core.subscribe();

        assert!(harness.core.run_scheduled_pass_now(&me.email).await.unwrap());

        let published = drain(&mut events);
        assert_eq!(received_ids(&published), vec![9]);
        assert_eq!(
            kinds(&published),
            vec!["messages_received", "exception_occurred"]
        );

        let failures = harness.core.failure_history();
        assert_eq!(failures.len(), 1);
        assert_eq!(
            failures[0].folder.as_ref().map(|f| f.full_name.as_str()),
            Some("INBOX")
        );
        assert_eq!(behavior.synchronize_calls(&me.email), 1);
        harness.core.dispose().await;
    }

    #[tokio::test]
    async fn failures_stay_quiet_unless_reporting_is_enabled() {
        let me = account("me@example.com", NO_GROUP, &["INBOX"]);
        let harness = started(Settings::default(), &[me.clone()]).await;
        harness
            .behavior()
            .fail_folder(&folder(&me, "INBOX"), CoreError::OperationFailed("corrupt".into()));
        let mut events = harness.core.subscribe();

        harness.core.run_scheduled_pass_now(&me.email).await.unwrap();

        assert!(!kinds(&drain(&mut events)).contains(&"exception_occurred"));
        assert_eq!(harness.core.failure_history().len(), 1);
        harness.core.dispose().await;
    }

    #[tokio::test]
    async fn connection_loss_ends_the_pass_early() {
        let me = account("me@example.com", NO_GROUP, &["INBOX", "Work"]);
        let harness = started(Settings::default(), &[me.clone()]).await;
        let behavior = harness.behavior();
        behavior.fail_folder(&folder(&me, "INBOX"), CoreError::Connection("reset".into()));
        behavior.push_new_messages(&folder(&me, "Work"), vec![message(9, &folder(&me, "Work"), 1)]);

        harness.core.run_scheduled_pass_now(&me.email).await.unwrap();

        assert_eq!(behavior.synchronize_calls(&me.email), 0);
        assert_eq!(harness.storage.messages_in(&folder(&me, "Work")).len(), 0);
        harness.core.dispose().await;
    }

    #[tokio::test(start_paused = true)]
    async fn manual_pass_is_refused_while_the_timer_pass_runs() {
        let me = account("me@example.com", NO_GROUP, &["INBOX"]);
        let harness = started(Settings::default(), &[me.clone()]).await;
        let behavior = harness.behavior();
        behavior.set_folder_delay(&folder(&me, "INBOX"), Duration::from_secs(25 * 60));

        // Timer fires at 10 minutes, pass runs until 35
        tokio::time::sleep(Duration::from_secs(11 * 60)).await;
        assert!(!harness.core.run_scheduled_pass_now(&me.email).await.unwrap());

        tokio::time::sleep(Duration::from_secs(30 * 60)).await;
        assert_eq!(behavior.synchronize_calls(&me.email), 1);
        assert_eq!(behavior.max_in_flight(), 1);

        harness.core.dispose().await;
    }

    #[tokio::test(start_paused = true)]
    async fn timer_passes_repeat_at_the_account_interval() {
        let mut me = account("me@example.com", NO_GROUP, &["INBOX"]);
        me.synchronization_interval = 5;
        let harness = started(Settings::default(), &[me.clone()]).await;

        tokio::time::sleep(Duration::from_secs(16 * 60)).await;

        assert_eq!(harness.behavior().synchronize_calls(&me.email), 3);
        harness.core.dispose().await;
        tokio::time::sleep(Duration::from_secs(10 * 60)).await;
        assert_eq!(harness.behavior().synchronize_calls(&me.email), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn only_one_manual_check_runs_at_a_time() {
        let a = account("a@example.com", NO_GROUP, &["INBOX"]);
        let harness = started(Settings::default(), &[a.clone()]).await;
        harness
            .behavior()
            .set_folder_delay(&folder(&a, "INBOX"), Duration::from_millis(100));
        let cancel = CancellationToken::new();

        let (first, second) = tokio::join!(
            harness.core.check_for_new_inbox_messages(&cancel),
            harness.core.check_for_new_inbox_messages(&cancel)
        );

        assert!(first.unwrap());
        assert!(!second.unwrap());
        assert!(harness.core.check_for_new_inbox_messages(&cancel).await.unwrap());
        harness.core.dispose().await;
    }

    #[tokio::test(start_paused = true)]
    async fn dispose_waits_for_a_running_manual_check() {
        let me = account("me@example.com", NO_GROUP, &["INBOX"]);
        let harness = started(Settings::default(), &[me.clone()]).await;
        let inbox = folder(&me, "INBOX");
        let behavior = harness.behavior();
        behavior.set_folder_delay(&inbox, Duration::from_secs(60));
        behavior.push_new_messages(&inbox, vec![message(1, &inbox, 1)]);
        let cancel = CancellationToken::new();

        let (checked, ()) = tokio::join!(
            harness.core.check_for_new_inbox_messages(&cancel),
            async {
                tokio::time::sleep(Duration::from_secs(1)).await;
                harness.core.dispose().await;
                // The pass finished before storage closed
                assert_eq!(behavior.synchronize_calls(&me.email), 1);
                assert_eq!(harness.storage.messages_in(&inbox).len(), 1);
                assert!(harness.storage.is_closed());
            }
        );

        assert!(checked.unwrap());
        let err = harness
            .core
            .check_for_new_inbox_messages(&cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Disposed));
    }

    #[tokio::test]
    async fn inbox_check_covers_every_account_and_only_inboxes() {
        let a = account("a@example.com", NO_GROUP, &["INBOX", "Work"]);
        let b = account("b@example.com", NO_GROUP, &["Inbox"]);
        let harness = started(Settings::default(), &[a.clone(), b.clone()]).await;
        let behavior = harness.behavior();
        behavior.push_new_messages(&folder(&a, "INBOX"), vec![message(1, &folder(&a, "INBOX"), 2)]);
        behavior.push_new_messages(&folder(&a, "Work"), vec![message(2, &folder(&a, "Work"), 2)]);
        behavior.push_new_messages(&folder(&b, "Inbox"), vec![message(3, &folder(&b, "Inbox"), 2)]);
        let mut events = harness.core.subscribe();

        assert!(harness
            .core
            .check_for_new_inbox_messages(&CancellationToken::new())
            .await
            .unwrap());

        let mut ids = received_ids(&drain(&mut events));
        ids.sort_unstable();
        assert_eq!(ids, vec![1, 3]);
        harness.core.dispose().await;
    }

    #[tokio::test]
    async fn new_messages_flow_straight_to_storage() {
        let me = account("me@example.com", NO_GROUP, &["INBOX"]);
        let harness = started(Settings::default(), &[me.clone()]).await;
        let inbox = folder(&me, "INBOX");
        harness
            .behavior()
            .push_new_messages(&inbox, vec![message(1, &inbox, 1), message(2, &inbox, 2)]);

        harness.core.run_scheduled_pass_now(&me.email).await.unwrap();

        assert_eq!(harness.storage.messages_in(&inbox).len(), 2);
        // Handed out once
        harness.core.run_scheduled_pass_now(&me.email).await.unwrap();
        assert_eq!(harness.storage.messages_in(&inbox).len(), 2);
        harness.core.dispose().await;
    }
}
