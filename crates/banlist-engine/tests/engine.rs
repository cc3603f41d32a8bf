//! Decision engine behaviour: queries, ordering, routing and rebuilds.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::sync::Arc;

use serde_json::json;

use banlist_engine::obs::metrics::EngineMetrics;
use banlist_engine::refresh::{self, RefreshRequest};
use banlist_engine::{Enforcement, PolicyEngine, RebuildOutcome, Routing, UserProfile};

use fixtures::*;

#[tokio::test]
async fn user_glob_ban() {
    let e = engine(Enforcement::default(), &[LIST]);
    let s = store(vec![ban("$1", LIST, "m.policy.rule.user", "@spam:*")]);

    let outcome = e.rebuild(s.as_ref(), LIST, None).await;
    assert_eq!(outcome, RebuildOutcome::Published { rules: 1 });

    assert!(e.is_user_banned("@spam:example.org"));
    assert!(e.is_user_banned("@SPAM:other.org"));
    assert!(!e.is_user_banned("@good:example.org"));
    assert!(!e.is_room_banned("@spam:example.org"));
}

#[tokio::test]
async fn invite_to_banned_room_is_denied() {
    let e = engine(Enforcement::default(), &[LIST]);
    let s = store(vec![ban("$1", LIST, "m.policy.rule.room", "!abc:example.org")]);
    e.rebuild(s.as_ref(), LIST, None).await;

    assert!(!e.decide_invite("@a:x", "@b:y", "!abc:example.org"));
    assert!(e.decide_invite("@a:x", "@b:y", "!def:example.org"));
}

#[tokio::test]
async fn invite_checks_inviter_and_domain() {
    let e = engine(Enforcement::default(), &[LIST]);
    let s = store(vec![
        ban("$1", LIST, "m.policy.rule.user", "@troll:example.org"),
        ban("$2", LIST, "m.policy.rule.server", "*.evil.org"),
    ]);
    e.rebuild(s.as_ref(), LIST, None).await;

    assert!(!e.decide_invite("@troll:example.org", "@b:y", "!r:x"));
    assert!(!e.decide_invite("@a:matrix.evil.org", "@b:y", "!r:x"));
    assert!(e.decide_invite("@a:example.org", "@troll:example.org", "!r:x"));
}

#[tokio::test]
async fn flags_off_always_allow() {
    let e = engine(
        Enforcement {
            messages: false,
            invites: false,
            usernames: false,
        },
        &[LIST],
    );
    let s = store(vec![
        ban("$1", LIST, "m.policy.rule.user", "*"),
        ban("$2", LIST, "m.policy.rule.room", "*"),
    ]);
    e.rebuild(s.as_ref(), LIST, None).await;

    assert!(e.is_user_banned("@a:x"));
    assert!(!e.decide_message(&message("$m", "!r:x", "@a:x", "hi")));
    assert!(e.decide_invite("@a:x", "@b:y", "!r:x"));
    assert!(e.decide_username(&UserProfile {
        user_id: "@a:x".into(),
        display_name: None
    }));
}

#[tokio::test]
async fn messages_blocked_by_sender_or_domain() {
    let e = engine(enforce_all(), &[LIST]);
    let s = store(vec![
        ban("$1", LIST, "m.policy.rule.user", "@spammer:good.org"),
        ban("$2", LIST, "m.policy.rule.server", "evil.org"),
    ]);
    e.rebuild(s.as_ref(), LIST, None).await;

    assert!(e.decide_message(&message("$a", "!r:x", "@spammer:good.org", "hi")));
    assert!(e.decide_message(&message("$b", "!r:x", "@anyone:evil.org", "hi")));
    assert!(!e.decide_message(&message("$c", "!r:x", "@fine:good.org", "hi")));
    // Unparseable sender: only the full-string check applies.
    assert!(!e.decide_message(&message("$d", "!r:x", "not-a-user", "hi")));

    assert_eq!(
        e.metrics().decisions.get(&[("check", "message"), ("verdict", "deny")]),
        2
    );
}

#[tokio::test]
async fn usernames_check_id_and_display_name() {
    let e = engine(enforce_all(), &[LIST]);
    let s = store(vec![ban("$1", LIST, "m.policy.rule.user", "*crypto giveaway*")]);
    e.rebuild(s.as_ref(), LIST, None).await;

    assert!(!e.decide_username(&UserProfile {
        user_id: "@a:x".into(),
        display_name: Some("Free CRYPTO GIVEAWAY now".into()),
    }));
    assert!(e.decide_username(&UserProfile {
        user_id: "@a:x".into(),
        display_name: Some("Alice".into()),
    }));
}

#[tokio::test]
async fn first_match_wins_across_lists() {
    let mute = rule("$1", LIST, "m.policy.rule.user", "k1", "@x:*", "m.mute");
    let ban_other = ban("$2", OTHER_LIST, "m.policy.rule.user", "@x:*");
    let s = store(vec![mute, ban_other]);

    let e = engine(Enforcement::default(), &[LIST, OTHER_LIST]);
    e.rebuild_all(s.as_ref()).await;
    assert!(!e.is_user_banned("@x:example.org"));

    let e = engine(Enforcement::default(), &[OTHER_LIST, LIST]);
    e.rebuild_all(s.as_ref()).await;
    assert!(e.is_user_banned("@x:example.org"));
}

#[tokio::test]
async fn first_match_wins_within_list() {
    let e = engine(Enforcement::default(), &[LIST]);
    let s = store(vec![
        ban("$1", LIST, "m.policy.rule.user", "@x:example.org"),
        rule("$2", LIST, "m.policy.rule.user", "k2", "@x:*", "org.example.allow"),
    ]);
    e.rebuild(s.as_ref(), LIST, None).await;
    assert!(e.is_user_banned("@x:example.org"));
}

#[tokio::test]
async fn malformed_record_adds_nothing() {
    let e = engine(Enforcement::default(), &[LIST]);
    let s = store(vec![record(
        "$1",
        LIST,
        "m.policy.rule.user",
        "k",
        json!({"entity": "@spam:*", "recommendation": "m.ban"}),
    )]);

    assert_eq!(e.rebuild(s.as_ref(), LIST, None).await, RebuildOutcome::Published { rules: 0 });
    assert!(!e.is_user_banned("@spam:example.org"));
}

#[test]
fn live_record_applies_before_store_catches_up() {
    let (tx, mut rx) = refresh::channel();
    let e = PolicyEngine::new(Enforcement::default(), Some(tx), Arc::new(EngineMetrics::default()));
    e.get_or_create(LIST);

    let live = ban("$live", LIST, "m.policy.rule.user", "@new-spam:*");
    assert_eq!(e.route_record(&live), Routing::PolicyUpdate);
    assert!(e.is_user_banned("@new-spam:example.org"));

    match rx.try_recv().expect("refresh queued") {
        RefreshRequest::Incremental { container_id, record } => {
            assert_eq!(container_id, LIST);
            assert_eq!(record.event_id, live.event_id);
        }
        other => panic!("unexpected request: {other:?}"),
    }
}

#[tokio::test]
async fn live_record_supersedes_published_rule() {
    let e = engine(Enforcement::default(), &[LIST]);
    let s = store(vec![rule("$old", LIST, "m.policy.rule.user", "k", "@x:*", "m.ban")]);
    e.rebuild(s.as_ref(), LIST, None).await;
    assert!(e.is_user_banned("@x:example.org"));

    // Rule withdrawn by replacing the record with empty content.
    let cleared = record("$new", LIST, "m.policy.rule.user", "k", json!({}));
    assert_eq!(e.route_record(&cleared), Routing::PolicyUpdate);
    assert!(!e.is_user_banned("@x:example.org"));

    // The store still has the stale record; an incremental rebuild keeps the
    // live one on top.
    e.rebuild(s.as_ref(), LIST, Some(&cleared)).await;
    assert!(!e.is_user_banned("@x:example.org"));
}

#[tokio::test]
async fn redelivered_stored_record_keeps_decisions() {
    let e = engine(Enforcement::default(), &[LIST]);
    let stored = rule("$r", LIST, "m.policy.rule.user", "a", "@x:*", "m.mute");
    let s = store(vec![
        stored.clone(),
        rule("$s", LIST, "m.policy.rule.user", "b", "@x:*", "m.ban"),
    ]);
    e.rebuild(s.as_ref(), LIST, None).await;
    assert!(!e.is_user_banned("@x:example.org"));

    assert_eq!(e.route_record(&stored), Routing::PolicyUpdate);
    assert!(!e.is_user_banned("@x:example.org"));

    e.rebuild(s.as_ref(), LIST, Some(&stored)).await;
    assert!(!e.is_user_banned("@x:example.org"));

    e.rebuild(s.as_ref(), LIST, None).await;
    assert!(!e.is_user_banned("@x:example.org"));
}

#[tokio::test]
async fn records_without_id_do_not_retire_each_other() {
    let e = engine(Enforcement::default(), &[LIST]);
    let s = store(vec![rule("", LIST, "m.policy.rule.user", "a", "@old-a:*", "m.ban")]);
    e.rebuild(s.as_ref(), LIST, None).await;

    let live_a = record("", LIST, "m.policy.rule.user", "a", json!({}));
    let live_b = rule("", LIST, "m.policy.rule.user", "b", "@b:*", "m.ban");
    e.route_record(&live_a);
    e.route_record(&live_b);

    // The store catches up on `live_b` only; its rebuild must leave `live_a`
    // pending.
    s.insert(live_b.clone());
    e.rebuild(s.as_ref(), LIST, Some(&live_b)).await;
    e.rebuild(s.as_ref(), LIST, None).await;
    assert!(!e.is_user_banned("@old-a:example.org"));
    assert!(e.is_user_banned("@b:example.org"));
}

#[test]
fn policy_records_are_never_spam() {
    let e = engine(enforce_all(), &[LIST]);
    let mut r = ban("$1", LIST, "m.policy.rule.server", "example.org");
    r.sender = "@mod:example.org".into();

    assert!(!e.decide_message(&r));
    // The rule is live and now catches ordinary messages from that server.
    assert!(e.decide_message(&message("$m", "!r:x", "@mod:example.org", "hi")));
}

#[test]
fn non_policy_records_route_as_content() {
    let e = engine(enforce_all(), &[LIST]);

    let mut unkeyed = ban("$1", LIST, "m.policy.rule.user", "*");
    unkeyed.state_key = None;
    assert_eq!(e.route_record(&unkeyed), Routing::NotPolicy);

    let other_type = record("$2", LIST, "m.room.topic", "", json!({"topic": "hi"}));
    assert_eq!(e.route_record(&other_type), Routing::NotPolicy);

    assert!(e.rule_set(LIST).unwrap().is_empty());
}

#[tokio::test]
async fn failed_fetch_keeps_previous_rules() {
    let e = engine(Enforcement::default(), &[LIST, OTHER_LIST]);
    let good = store(vec![
        ban("$1", LIST, "m.policy.rule.user", "@a:*"),
        ban("$2", OTHER_LIST, "m.policy.rule.user", "@b:*"),
    ]);
    e.rebuild_all(good.as_ref()).await;

    assert_eq!(e.rebuild(&FailingStore, LIST, None).await, RebuildOutcome::Failed);
    assert!(e.is_user_banned("@a:x"));
    assert!(e.is_user_banned("@b:x"));
    assert_eq!(
        e.metrics().rebuilds.get(&[("mode", "full"), ("outcome", "failed")]),
        1
    );
}

#[tokio::test]
async fn slow_fetch_does_not_overwrite_live_record() {
    let e = engine(Enforcement::default(), &[LIST]);
    let s = Arc::new(GatedStore::default());

    let rebuild = {
        let e = Arc::clone(&e);
        let s = Arc::clone(&s);
        tokio::spawn(async move { e.rebuild(s.as_ref(), LIST, None).await })
    };
    s.entered.notified().await;

    let live = ban("$live", LIST, "m.policy.rule.user", "@late:*");
    e.route_record(&live);
    s.release.notify_one();

    assert_eq!(rebuild.await.unwrap(), RebuildOutcome::Stale);
    assert!(e.is_user_banned("@late:example.org"));
}

#[tokio::test]
async fn full_rebuild_keeps_pending_live_record() {
    let e = engine(Enforcement::default(), &[LIST]);
    let s = store(vec![rule("$old", LIST, "m.policy.rule.user", "k", "@x:*", "m.ban")]);
    e.rebuild(s.as_ref(), LIST, None).await;

    let cleared = record("$new", LIST, "m.policy.rule.user", "k", json!({}));
    e.route_record(&cleared);

    // A full rebuild against the lagging store must not resurrect the rule.
    e.rebuild(s.as_ref(), LIST, None).await;
    assert!(!e.is_user_banned("@x:example.org"));

    // Once the store catches up the record is no longer pending.
    s.insert(cleared.clone());
    e.rebuild(s.as_ref(), LIST, None).await;
    s.insert(rule("$newer", LIST, "m.policy.rule.user", "k", "@x:*", "m.ban"));
    e.rebuild(s.as_ref(), LIST, None).await;
    assert!(e.is_user_banned("@x:example.org"));
}
