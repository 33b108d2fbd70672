use ritual_core::RitualDraft;
use ritual_engine::{Channel, MemRemote, Notification};

#[path = "helpers.rs"]
mod helpers;
use helpers::Device;

fn advisories(events: &[Notification]) -> Vec<Channel> {
    events
        .iter()
        .filter_map(|e| match e {
            Notification::SyncAdvisory { channel, .. } => Some(*channel),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn entries_and_profile_are_uploaded_after_commit() {
    let remote = MemRemote::new();
    let device = Device::with_remote(&remote);
    device.sign_in("u1").await;

    device
        .engine
        .submit_entry(RitualDraft::new("tt1", "Heat", "tense and quiet"))
        .await
        .unwrap();
    assert_eq!(remote.entry_count("u1"), 1);
    assert_eq!(remote.profile("u1").unwrap()["totalXP"], 20);
    assert_eq!(device.engine.pending_uploads(), 0);
}

#[tokio::test]
async fn missing_channel_is_disabled_and_never_retried() {
    let remote = MemRemote::new();
    remote.set_missing(Channel::Follows, true);
    let device = Device::with_remote(&remote);
    device.sign_in("u1").await;

    assert_eq!(device.engine.disabled_channels(), vec![Channel::Follows]);
    assert_eq!(remote.calls(Channel::Follows), 1);

    assert!(device.engine.toggle_follow("director_cut").await.unwrap());
    device.engine.award_xp(10).await.unwrap();
    assert_eq!(remote.calls(Channel::Follows), 1);
    assert_eq!(device.engine.pending_uploads(), 0);
    assert!(device.engine.snapshot().following.contains("director_cut"));

    // Capability gaps are not the user's problem.
    assert!(advisories(&device.engine.drain_notifications()).is_empty());
}

#[tokio::test]
async fn missing_profile_table_keeps_engine_local() {
    let remote = MemRemote::new();
    remote.set_missing(Channel::Profile, true);
    let device = Device::with_remote(&remote);
    device.sign_in("u1").await;
    assert!(device.engine.is_ready());
    let calls = remote.calls(Channel::Profile);

    device.engine.award_xp(40).await.unwrap();
    device.engine.claim_share_reward().await.unwrap();
    assert_eq!(remote.calls(Channel::Profile), calls);
    assert_eq!(device.engine.cache().read("u1").unwrap().total_xp, 55);
}

#[tokio::test]
async fn transient_failures_queue_uploads_for_the_next_mutation() {
    let remote = MemRemote::new();
    let device = Device::with_remote(&remote);
    device.sign_in("u1").await;
    device.engine.drain_notifications();

    remote.set_offline(Channel::Entries, true);
    let outcome = device
        .engine
        .submit_entry(RitualDraft::new("tt1", "Heat", "tense and quiet"))
        .await
        .unwrap();
    assert_eq!(outcome.xp_granted, 20);
    assert_eq!(remote.entry_count("u1"), 0);
    assert_eq!(device.engine.pending_uploads(), 1);
    assert_eq!(advisories(&device.engine.drain_notifications()), vec![Channel::Entries]);
    // Local state is untouched by the failure.
    assert_eq!(device.engine.snapshot().journal_entries.len(), 1);
    assert!(device.engine.disabled_channels().is_empty());

    remote.set_offline(Channel::Entries, false);
    device.engine.award_xp(5).await.unwrap();
    assert_eq!(remote.entry_count("u1"), 1);
    assert_eq!(device.engine.pending_uploads(), 0);
    assert_eq!(device.engine.snapshot().total_xp, 25);
}

#[tokio::test]
async fn follow_edges_track_the_latest_toggle() {
    let remote = MemRemote::new();
    let device = Device::with_remote(&remote);
    device.sign_in("u1").await;

    assert!(device.engine.toggle_follow("u2").await.unwrap());
    assert!(remote.is_following("u1", "u2"));

    remote.set_offline(Channel::Follows, true);
    assert!(!device.engine.toggle_follow("u2").await.unwrap());
    assert!(remote.is_following("u1", "u2"));
    assert_eq!(device.engine.pending_uploads(), 1);

    remote.set_offline(Channel::Follows, false);
    device.engine.award_xp(1).await.unwrap();
    assert!(!remote.is_following("u1", "u2"));
    assert_eq!(device.engine.pending_uploads(), 0);
}

#[tokio::test]
async fn follower_count_comes_from_remote() {
    let remote = MemRemote::new();
    let fan = Device::with_remote(&remote);
    fan.sign_in("fan").await;
    fan.engine.toggle_follow("star").await.unwrap();

    let star = Device::with_remote(&remote);
    star.sign_in("star").await;
    assert_eq!(star.engine.snapshot().followers, 1);
}

#[tokio::test]
async fn channels_are_reenabled_for_a_new_session() {
    let remote = MemRemote::new();
    remote.set_missing(Channel::Entries, true);
    let device = Device::with_remote(&remote);
    device.sign_in("u1").await;
    assert_eq!(device.engine.disabled_channels(), vec![Channel::Entries]);

    remote.set_missing(Channel::Entries, false);
    device.engine.sign_out();
    device.sign_in("u1").await;
    assert!(device.engine.disabled_channels().is_empty());
}

#[tokio::test]
async fn rejected_entries_are_dropped_not_resent() {
    let remote = MemRemote::new();
    let device = Device::with_remote(&remote);
    device.sign_in("u1").await;
    device.engine.drain_notifications();

    remote.set_rejecting(Channel::Entries, true);
    device
        .engine
        .submit_entry(RitualDraft::new("tt1", "Heat", "tense and quiet"))
        .await
        .unwrap();
    assert_eq!(device.engine.pending_uploads(), 0);
    assert!(advisories(&device.engine.drain_notifications()).is_empty());
    assert!(device.engine.disabled_channels().is_empty());
    let calls = remote.calls(Channel::Entries);

    remote.set_rejecting(Channel::Entries, false);
    device.engine.award_xp(5).await.unwrap();
    assert_eq!(remote.calls(Channel::Entries), calls);
    assert_eq!(remote.entry_count("u1"), 0);
    assert_eq!(device.engine.snapshot().journal_entries.len(), 1);
}
