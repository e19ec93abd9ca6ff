//! Timeout enforcement against workloads that never exit on their own.

use std::path::Path;
use std::time::{Duration, Instant};

use nanoclaw_harness::orchestrator::{run_invocation, InvocationOptions};
use nanoclaw_harness::persistence::MemorySessionStore;
use nanoclaw_harness::workload::spawner::InvocationNames;
use nanoclaw_harness::HarnessError;
use tokio_util::sync::CancellationToken;

use super::support::TestWorld;

fn workload_pid(world: &TestWorld) -> i32 {
    let raw = std::fs::read_to_string(world.dir.path().join("workload.pid"))
        .expect("workload wrote its pid");
    raw.trim().parse().expect("pid is numeric")
}

fn process_alive(pid: i32) -> bool {
    Path::new(&format!("/proc/{pid}")).exists()
}

/// Hanging workload whose `stop` verb terminates it, modelling a runtime
/// that honours the graceful stop.
fn hang_honouring_stop() -> String {
    r#"case "$1" in
  stop)
    pid=$(cat @DIR@/workload.pid 2>/dev/null) || exit 0
    kill "$pid" 2>/dev/null
    exit 0
    ;;
esac
cat > /dev/null
echo $$ > @DIR@/workload.pid
exec sleep 300"#
        .to_owned()
}

/// Hanging workload that ignores the graceful stop entirely, forcing the
/// hard-kill fallback.
fn hang_ignoring_stop() -> String {
    r#"case "$1" in
  stop) exit 0 ;;
esac
cat > /dev/null
echo $$ > @DIR@/workload.pid
exec sleep 300"#
        .to_owned()
}

#[tokio::test]
async fn deadline_stops_a_hung_workload_within_a_bounded_margin() {
    let mut world = TestWorld::with_runtime_script(&hang_honouring_stop());
    world.config.timeouts.invoke_seconds = 1;
    let store = MemorySessionStore::new();
    let names = InvocationNames::new();
    let cancel = CancellationToken::new();

    let started = Instant::now();
    let opts = InvocationOptions::new("family", "hang forever");
    let err = run_invocation(&world.config, &names, &store, &opts, &cancel)
        .await
        .expect_err("the deadline must end the turn");

    assert!(matches!(err, HarnessError::Timeout(1)), "got {err}");
    assert!(
        started.elapsed() <= Duration::from_secs(5),
        "stop must land promptly, took {:?}",
        started.elapsed()
    );
    assert!(
        !process_alive(workload_pid(&world)),
        "no workload process may survive the harness returning"
    );
    assert!(!names.is_reserved("nanoclaw-family"));
}

#[tokio::test]
async fn hard_kill_backstops_a_workload_that_ignores_the_stop() {
    let mut world = TestWorld::with_runtime_script(&hang_ignoring_stop());
    world.config.timeouts.invoke_seconds = 1;
    world.config.timeouts.stop_grace_seconds = 1;
    let store = MemorySessionStore::new();
    let names = InvocationNames::new();
    let cancel = CancellationToken::new();

    let started = Instant::now();
    let opts = InvocationOptions::new("family", "ignore the stop");
    let err = run_invocation(&world.config, &names, &store, &opts, &cancel)
        .await
        .expect_err("the kill fallback must end the turn");

    assert!(matches!(err, HarnessError::Timeout(1)), "got {err}");
    assert!(
        started.elapsed() <= Duration::from_secs(8),
        "grace then kill, took {:?}",
        started.elapsed()
    );
    assert!(!process_alive(workload_pid(&world)));
}

#[tokio::test]
async fn caller_cancellation_uses_the_same_stop_path() {
    let world = TestWorld::with_runtime_script(&hang_honouring_stop());
    let store = MemorySessionStore::new();
    let names = InvocationNames::new();
    let cancel = CancellationToken::new();

    let canceller = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(300)).await;
        canceller.cancel();
    });

    let started = Instant::now();
    let opts = InvocationOptions::new("family", "hang until cancelled");
    let err = run_invocation(&world.config, &names, &store, &opts, &cancel)
        .await
        .expect_err("cancellation ends the turn");

    assert!(matches!(err, HarnessError::Workload(ref msg) if msg.contains("cancelled")));
    assert!(started.elapsed() <= Duration::from_secs(5));
    assert!(!process_alive(workload_pid(&world)));
    assert!(!names.is_reserved("nanoclaw-family"));
}

#[tokio::test]
async fn fast_completion_never_trips_the_watchdog() {
    let mut world = TestWorld::with_runtime_script(&super::support::responder_script("sess-w"));
    world.config.timeouts.invoke_seconds = 30;
    let store = MemorySessionStore::new();
    let names = InvocationNames::new();
    let cancel = CancellationToken::new();

    let opts = InvocationOptions::new("family", "quick turn");
    let outcome = run_invocation(&world.config, &names, &store, &opts, &cancel)
        .await
        .expect("fast turn succeeds");
    assert_eq!(outcome.reply, "fake reply");
}
