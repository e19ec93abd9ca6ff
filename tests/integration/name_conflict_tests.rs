//! Fail-fast behaviour when an invocation name is already held.

use std::sync::Arc;
use std::time::Duration;

use nanoclaw_harness::orchestrator::{run_invocation, InvocationOptions};
use nanoclaw_harness::persistence::MemorySessionStore;
use nanoclaw_harness::workload::spawner::InvocationNames;
use nanoclaw_harness::HarnessError;
use tokio_util::sync::CancellationToken;

use super::support::{TestWorld, END, START};

/// Responder that holds the invocation open long enough for a second
/// caller to collide with it.
fn slow_responder() -> String {
    format!(
        r#"case "$1" in
  stop) exit 0 ;;
esac
cat >> @PAYLOADS@
sleep 1
echo "{START}"
printf '{{"status":"success","result":"slow reply"}}\n'
echo "{END}"
exit 0"#
    )
}

#[tokio::test]
async fn concurrent_invocation_for_the_same_group_fails_fast() {
    let world = Arc::new(TestWorld::with_runtime_script(&slow_responder()));
    let store = Arc::new(MemorySessionStore::new());
    let names = InvocationNames::new();
    let cancel = CancellationToken::new();

    let first = {
        let world = Arc::clone(&world);
        let store = Arc::clone(&store);
        let names = names.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move {
            let opts = InvocationOptions::new("family", "first");
            run_invocation(&world.config, &names, store.as_ref(), &opts, &cancel).await
        })
    };

    // Give the first invocation time to reserve its name and spawn.
    tokio::time::sleep(Duration::from_millis(200)).await;

    let opts = InvocationOptions::new("family", "second");
    let err = run_invocation(&world.config, &names, store.as_ref(), &opts, &cancel)
        .await
        .expect_err("the name is still held");
    assert!(
        matches!(err, HarnessError::NameConflict(ref name) if name == "nanoclaw-family"),
        "got {err}"
    );

    let outcome = first.await.expect("join").expect("first invocation unaffected");
    assert_eq!(outcome.reply, "slow reply");
}

#[tokio::test]
async fn the_name_is_reusable_once_the_invocation_ends() {
    let world = TestWorld::with_runtime_script(&slow_responder());
    let store = MemorySessionStore::new();
    let names = InvocationNames::new();
    let cancel = CancellationToken::new();

    let opts = InvocationOptions::new("family", "first");
    run_invocation(&world.config, &names, &store, &opts, &cancel)
        .await
        .expect("first turn");
    assert!(!names.is_reserved("nanoclaw-family"));

    let opts = InvocationOptions::new("family", "second");
    run_invocation(&world.config, &names, &store, &opts, &cancel)
        .await
        .expect("name released after the first turn");
}

#[tokio::test]
async fn different_groups_run_concurrently_without_conflict() {
    let world = Arc::new(TestWorld::with_runtime_script(&slow_responder()));
    let store = Arc::new(MemorySessionStore::new());
    let names = InvocationNames::new();
    let cancel = CancellationToken::new();

    let mut turns = Vec::new();
    for group in ["alpha", "beta"] {
        let world = Arc::clone(&world);
        let store = Arc::clone(&store);
        let names = names.clone();
        let cancel = cancel.clone();
        turns.push(tokio::spawn(async move {
            let opts = InvocationOptions::new(group, "hello");
            run_invocation(&world.config, &names, store.as_ref(), &opts, &cancel).await
        }));
    }

    for turn in turns {
        turn.await.expect("join").expect("independent groups never collide");
    }
}

#[tokio::test]
async fn a_launch_failure_still_releases_the_name() {
    let mut world = TestWorld::with_runtime_script(&slow_responder());
    world.config.container.runtime = "/nonexistent/fake-runtime".into();
    let store = MemorySessionStore::new();
    let names = InvocationNames::new();
    let cancel = CancellationToken::new();

    let opts = InvocationOptions::new("family", "hello");
    let err = run_invocation(&world.config, &names, &store, &opts, &cancel)
        .await
        .expect_err("missing binary");
    assert!(matches!(err, HarnessError::Launch(_)));
    assert!(
        !names.is_reserved("nanoclaw-family"),
        "the reservation must not leak on the error path"
    );
}
