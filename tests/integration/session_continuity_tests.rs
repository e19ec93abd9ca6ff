//! Session continuity across consecutive invocations.

use nanoclaw_harness::orchestrator::{run_invocation, InvocationOptions};
use nanoclaw_harness::persistence::{FileSessionStore, SessionStore};
use nanoclaw_harness::workload::spawner::InvocationNames;
use tokio_util::sync::CancellationToken;

use super::support::{responder_script, TestWorld};

#[tokio::test]
async fn second_turn_offers_the_session_id_from_the_first() {
    let world = TestWorld::with_runtime_script(&responder_script("abc"));
    let store = FileSessionStore::new(world.config.sessions_dir());
    let names = InvocationNames::new();
    let cancel = CancellationToken::new();

    let turn1 = InvocationOptions::new("family", "first turn");
    run_invocation(&world.config, &names, &store, &turn1, &cancel)
        .await
        .expect("turn 1");

    let turn2 = InvocationOptions::new("family", "second turn");
    run_invocation(&world.config, &names, &store, &turn2, &cancel)
        .await
        .expect("turn 2");

    let payloads = world.payloads();
    assert_eq!(payloads.len(), 2);
    assert!(payloads[0].get("sessionId").is_none(), "turn 1 starts fresh");
    assert_eq!(payloads[1]["sessionId"], "abc", "turn 2 resumes the stored session");
}

#[tokio::test]
async fn reset_between_turns_starts_a_fresh_session() {
    let world = TestWorld::with_runtime_script(&responder_script("abc"));
    let store = FileSessionStore::new(world.config.sessions_dir());
    let names = InvocationNames::new();
    let cancel = CancellationToken::new();

    let turn1 = InvocationOptions::new("family", "first turn");
    run_invocation(&world.config, &names, &store, &turn1, &cancel)
        .await
        .expect("turn 1");
    assert!(store.reset("family").expect("reset"), "a record existed");

    let turn2 = InvocationOptions::new("family", "post-reset turn");
    run_invocation(&world.config, &names, &store, &turn2, &cancel)
        .await
        .expect("turn 2");

    let payloads = world.payloads();
    assert!(
        payloads[1].get("sessionId").is_none(),
        "reset must clear the offered session"
    );
}

#[tokio::test]
async fn session_records_survive_a_new_store_instance() {
    let world = TestWorld::with_runtime_script(&responder_script("abc"));
    let names = InvocationNames::new();
    let cancel = CancellationToken::new();

    {
        let store = FileSessionStore::new(world.config.sessions_dir());
        let turn = InvocationOptions::new("family", "first turn");
        run_invocation(&world.config, &names, &store, &turn, &cancel)
            .await
            .expect("turn 1");
    }

    // A fresh store over the same state directory models a harness
    // restart between turns.
    let reopened = FileSessionStore::new(world.config.sessions_dir());
    let record = reopened.load("family").expect("load").expect("record persisted");
    assert_eq!(record.session_id, "abc");

    let turn = InvocationOptions::new("family", "after restart");
    run_invocation(&world.config, &names, &reopened, &turn, &cancel)
        .await
        .expect("turn 2");
    assert_eq!(world.payloads()[1]["sessionId"], "abc");
}

#[tokio::test]
async fn groups_never_share_sessions() {
    let world = TestWorld::with_runtime_script(&responder_script("abc"));
    let store = FileSessionStore::new(world.config.sessions_dir());
    let names = InvocationNames::new();
    let cancel = CancellationToken::new();

    let alpha = InvocationOptions::new("alpha", "turn for alpha");
    run_invocation(&world.config, &names, &store, &alpha, &cancel)
        .await
        .expect("alpha turn");

    let beta = InvocationOptions::new("beta", "turn for beta");
    run_invocation(&world.config, &names, &store, &beta, &cancel)
        .await
        .expect("beta turn");

    let payloads = world.payloads();
    assert!(
        payloads[1].get("sessionId").is_none(),
        "beta must not resume alpha's session"
    );
}
