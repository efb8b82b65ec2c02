//! End-to-end client tests over the in-memory backend

use agora_client::{AccessDecision, ClientError, CommunityClient, IdentityAdapter, Severity};
use agora_core::{ClientConfig, ErrorKind, Identity, PrincipalId};
use agora_test_utils::{alice, bob, seeded_connector, MemoryConnector, CONNECT, POST_POINTS};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;

fn start(connector: &MemoryConnector, auth: &IdentityAdapter) -> CommunityClient {
    CommunityClient::new(Arc::new(connector.clone()), auth.clone(), ClientConfig::default())
}

async fn wait_for_calls(connector: &MemoryConnector, op: &str, more_than: u64) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while connector.store().calls(op) <= more_than {
            tokio::task::yield_now().await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("{op} was not called again"));
}

#[tokio::test(start_paused = true)]
async fn test_anonymous_session_never_arms_profile_watchdog() {
    let connector = seeded_connector();
    let auth = IdentityAdapter::new();
    let client = start(&connector, &auth);

    let handle = client.wait_ready().await.unwrap();
    assert!(handle.key().is_anonymous());

    tokio::time::sleep(Duration::from_secs(10)).await;

    let report = client.watchdog().report();
    assert!(!report.profile.is_loading);
    assert!(!report.profile.is_slow);
    assert!(report.notice().is_none());
    assert!(client.current_user_profile().state().is_disabled);
    assert_eq!(connector.store().calls("get_caller_user_profile"), 0);
    assert_eq!(client.require_auth(), AccessDecision::Login);
}

#[tokio::test]
async fn test_anonymous_reads_are_served() {
    let connector = seeded_connector();
    connector
        .store()
        .seed_message(alice().principal(), "welcome", true);
    let client = start(&connector, &IdentityAdapter::new());
    client.wait_ready().await.unwrap();

    let messages = client.visible_messages().fetch().await.unwrap();
    let board = client.leaderboard().fetch().await.unwrap();

    assert_eq!(messages.len(), 1);
    assert_eq!(board.len(), 3);
    assert!(!*client.is_admin().fetch().await.unwrap());
}

#[tokio::test]
async fn test_post_message_refreshes_messages_and_profile() {
    let connector = seeded_connector();
    let client = start(&connector, &IdentityAdapter::with_identity(alice()));
    client.wait_ready().await.unwrap();

    let mut messages = client.visible_messages().subscribe();
    messages.wait_for(|s| s.is_fetched).await;
    let mut profile = client.current_user_profile().subscribe();
    profile.wait_for(|s| s.is_fetched).await;
    let before = connector.store().calls("get_visible_messages");

    client.post_message("hello agora").await.unwrap();

    let refreshed = profile
        .wait_for(|s| {
            s.data
                .as_deref()
                .and_then(Option::as_ref)
                .is_some_and(|p| p.points == POST_POINTS)
        })
        .await;
    assert!(refreshed.is_success());
    wait_for_calls(&connector, "get_visible_messages", before).await;
    assert_eq!(client.mutation_state("postMessage").runs, 1);
}

#[tokio::test(start_paused = true)]
async fn test_post_during_profile_fetch_still_reconciles_points() {
    let connector = seeded_connector();
    let client = start(&connector, &IdentityAdapter::with_identity(alice()));
    client.wait_ready().await.unwrap();
    let mut profile = client.current_user_profile().subscribe();
    profile.wait_for(|s| s.is_fetched).await;

    let store = connector.store();
    store.set_reply_delay("get_caller_user_profile", Duration::from_secs(1));
    let before = store.calls("get_caller_user_profile");
    let stale = {
        let client = client.clone();
        tokio::spawn(async move { client.current_user_profile().refetch().await })
    };
    wait_for_calls(&connector, "get_caller_user_profile", before).await;

    client.post_message("hello agora").await.unwrap();

    let points = |s: &agora_cache::QueryState<Option<agora_core::PrivateUserProfile>>| {
        s.data.as_deref().and_then(Option::as_ref).map(|p| p.points)
    };
    let state = tokio::time::timeout(
        Duration::from_secs(60),
        profile.wait_for(|s| points(s) == Some(POST_POINTS) && !s.is_fetching),
    )
    .await
    .expect("profile was not refetched after posting");
    assert!(!state.is_invalidated);

    let refetched = stale.await.unwrap().unwrap();
    assert_eq!(refetched.as_ref().as_ref().map(|p| p.points), Some(POST_POINTS));
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(points(&client.current_user_profile().state()), Some(POST_POINTS));
}

#[tokio::test]
async fn test_rejected_removal_restores_message() {
    let connector = seeded_connector();
    let id = connector
        .store()
        .seed_message(alice().principal(), "mine", true);
    let client = start(&connector, &IdentityAdapter::with_identity(bob()));
    client.wait_ready().await.unwrap();

    let listed = client.visible_messages().fetch().await.unwrap();
    assert!(!client.can_remove_message(&listed[0]));

    let err = client.remove_message(id).await.unwrap_err();

    assert_eq!(err.kind(), Some(ErrorKind::Rejected));
    let state = client.visible_messages().state();
    assert_eq!(state.data.as_deref().map(Vec::len), Some(1));
    assert!(client.mutation_state("removeMessage").last_error.is_some());
    assert!(connector.store().message(id).is_some());
}

#[tokio::test]
async fn test_author_removal_disappears_immediately() {
    let connector = seeded_connector();
    let id = connector
        .store()
        .seed_message(alice().principal(), "mine", true);
    let client = start(&connector, &IdentityAdapter::with_identity(alice()));
    client.wait_ready().await.unwrap();
    client.visible_messages().fetch().await.unwrap();

    client.remove_message(id).await.unwrap();

    let state = client.visible_messages().state();
    assert_eq!(state.data.as_deref().map(Vec::len), Some(0));
    assert!(connector.store().message(id).is_none());
}

#[tokio::test(start_paused = true)]
async fn test_vote_is_visible_before_the_backend_confirms() {
    let connector = seeded_connector();
    let id = connector
        .store()
        .seed_message(bob().principal(), "vote for me", true);
    connector
        .store()
        .set_latency("vote_message", Duration::from_secs(1));
    let client = start(&connector, &IdentityAdapter::with_identity(alice()));
    client.wait_ready().await.unwrap();
    client.visible_messages().fetch().await.unwrap();

    let (result, during) = tokio::join!(client.vote_message(id), async {
        tokio::time::sleep(Duration::from_millis(100)).await;
        client.visible_messages().state()
    });

    result.unwrap();
    assert_eq!(during.data.unwrap()[0].votes, 1);
    let after = client.visible_messages().fetch().await.unwrap();
    assert_eq!(after[0].votes, 1);
}

#[tokio::test]
async fn test_second_vote_rolls_back() {
    let connector = seeded_connector();
    let id = connector
        .store()
        .seed_message(bob().principal(), "popular", true);
    let client = start(&connector, &IdentityAdapter::with_identity(alice()));
    client.wait_ready().await.unwrap();
    client.visible_messages().fetch().await.unwrap();

    client.vote_message(id).await.unwrap();
    client.visible_messages().fetch().await.unwrap();
    let err = client.vote_message(id).await.unwrap_err();

    assert_eq!(err.kind(), Some(ErrorKind::AlreadyVoted));
    assert_eq!(client.visible_messages().state().data.unwrap()[0].votes, 1);
}

#[tokio::test(start_paused = true)]
async fn test_retry_initialization_rebuilds_failed_connection() {
    let connector = seeded_connector();
    connector
        .store()
        .fail_times(CONNECT, 2, "IC0503: canister replica unavailable");
    let client = start(&connector, &IdentityAdapter::with_identity(alice()));

    let err = client.wait_ready().await.unwrap_err();
    assert!(matches!(err, ClientError::Handle(_)));
    assert!(err.is_retryable());

    client.retry_initialization().await;

    let handle = client.wait_ready().await.unwrap();
    assert_eq!(handle.key().to_string(), "alice-principal");
    assert_eq!(connector.store().calls(CONNECT), 3);
}

#[tokio::test]
async fn test_full_reload_rebuilds_handle_and_drops_values() {
    let connector = seeded_connector();
    let client = start(&connector, &IdentityAdapter::with_identity(alice()));
    let first = client.wait_ready().await.unwrap();
    client.leaderboard().fetch().await.unwrap();

    client.full_reload().await;

    let second = client.wait_ready().await.unwrap();
    assert!(!Arc::ptr_eq(&first, &second));
    assert!(client.leaderboard().state().data.is_none());
    assert_eq!(connector.store().calls(CONNECT), 2);
}

#[tokio::test(start_paused = true)]
async fn test_slow_connection_raises_notice_then_clears() {
    let connector = seeded_connector();
    connector.store().set_latency(CONNECT, Duration::from_secs(6));
    let client = start(&connector, &IdentityAdapter::with_identity(alice()));

    tokio::time::sleep(Duration::from_millis(4_500)).await;
    let report = client.watchdog().report();
    assert!(report.connection.is_slow);
    assert_eq!(report.notice().map(|n| n.severity), Some(Severity::Slow));

    client.wait_ready().await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    let report = client.watchdog().report();
    assert!(!report.connection.is_loading);
    assert!(!report.connection.is_slow);
}

#[tokio::test]
async fn test_identity_switch_does_not_leak_profile() {
    let connector = seeded_connector();
    let auth = IdentityAdapter::with_identity(alice());
    let client = start(&connector, &auth);
    client.wait_ready().await.unwrap();
    let profile = client.current_user_profile().fetch().await.unwrap();
    assert_eq!(profile.as_ref().as_ref().map(|p| p.display_name.as_str()), Some("Alice"));

    auth.logout();
    auth.login_started();
    auth.login_succeeded(bob());
    client.wait_ready().await.unwrap();

    let leaked = client
        .current_user_profile()
        .state()
        .data
        .and_then(|p| p.as_ref().as_ref().map(|p| p.display_name.clone()));
    assert_ne!(leaked.as_deref(), Some("Alice"));
    let profile = client.current_user_profile().fetch().await.unwrap();
    assert_eq!(profile.as_ref().as_ref().map(|p| p.display_name.as_str()), Some("Bob"));
}

#[tokio::test]
async fn test_onboarding_guard_follows_profile() {
    let connector = MemoryConnector::default();
    let newcomer = Identity::new("newcomer-principal");
    let client = start(&connector, &IdentityAdapter::with_identity(newcomer.clone()));
    client.wait_ready().await.unwrap();

    client.current_user_profile().fetch().await.unwrap();
    assert_eq!(client.require_onboarding(), AccessDecision::Onboarding);

    client.register_user().await.unwrap();
    client.complete_onboarding().await.unwrap();
    client.current_user_profile().fetch().await.unwrap();

    assert_eq!(client.require_onboarding(), AccessDecision::Allow);
    let stored = connector.store().profile(newcomer.principal()).unwrap();
    assert!(stored.onboarding_complete);
}

#[tokio::test]
async fn test_admin_event_lifecycle() {
    let connector = seeded_connector();
    let client = start(
        &connector,
        &IdentityAdapter::with_identity(agora_test_utils::admin()),
    );
    client.wait_ready().await.unwrap();
    client.is_admin().fetch().await.unwrap();
    assert_eq!(client.require_admin(), AccessDecision::Allow);

    let id = client
        .create_event(agora_test_utils::event_draft("Meetup"))
        .await
        .unwrap();
    assert_eq!(client.events().fetch().await.unwrap().len(), 1);

    client
        .update_event(id, agora_test_utils::event_draft("Summer meetup"))
        .await
        .unwrap();
    client.rsvp(id, true).await.unwrap();
    let event = client.event(id).fetch().await.unwrap();
    assert_eq!(event.title, "Summer meetup");
    assert_eq!(event.rsvp_count, 1);

    let admin = PrincipalId::new("admin-principal");
    assert_eq!(*client.validated_event_count(&admin).fetch().await.unwrap(), 1);

    client.delete_event(id).await.unwrap();
    assert!(client.events().fetch().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_member_is_denied_admin_screens() {
    let connector = seeded_connector();
    let client = start(&connector, &IdentityAdapter::with_identity(alice()));
    client.wait_ready().await.unwrap();

    client.is_admin().fetch().await.unwrap();
    assert_eq!(client.require_admin(), AccessDecision::Denied);

    let err = client.statistics().fetch().await.unwrap_err();
    assert_eq!(err.kind(), Some(ErrorKind::Rejected));
}
