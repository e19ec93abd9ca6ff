//! The four smoke checks and their runner.

use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::HarnessConfig;
use crate::errors::{HarnessError, Result};
use crate::orchestrator::{run_invocation, InvocationOptions};
use crate::persistence::SessionStore;
use crate::workload::spawner::InvocationNames;
use crate::workload::ContainerSpec;

use super::report::{CheckResult, SmokeReport};

/// Check name: agent image is present on the host.
pub const IMAGE_CHECK: &str = "image-build";

/// Check name: the runtime can start a container at all.
pub const START_CHECK: &str = "container-start";

/// Check name: the agent answers a prompt through the full stack.
pub const RESPONSE_CHECK: &str = "agent-response";

/// Check name: a follow-up turn succeeds and resumes the stored session.
pub const STATUS_CHECK: &str = "status";

/// Prompt sent for the agent-level checks.
pub const SMOKE_PROMPT: &str = "Reply with exactly: SMOKE_TEST_OK";

/// Token the agent reply must contain.
pub const SMOKE_TOKEN: &str = "SMOKE_TEST_OK";

const PROBE_TIMEOUT: Duration = Duration::from_secs(30);
const DETAIL_CLIP: usize = 200;

/// Run the full check sequence against the configured host.
///
/// Every check runs regardless of earlier outcomes; failures become
/// report lines, never early returns. The two agent-level checks are
/// skipped when no credential is configured.
pub async fn run_smoke(
    config: &HarnessConfig,
    names: &InvocationNames,
    store: &dyn SessionStore,
    group: &str,
    cancel: &CancellationToken,
) -> SmokeReport {
    let mut report = SmokeReport::new();
    report.push(check_image(config).await);
    report.push(check_container_start(config).await);

    if config.has_credentials() {
        report.push(check_agent_response(config, names, store, group, cancel).await);
        report.push(check_status(config, names, store, group, cancel).await);
    } else {
        let why = "no credential configured";
        report.push(CheckResult::skipped(RESPONSE_CHECK, why));
        report.push(CheckResult::skipped(STATUS_CHECK, why));
    }
    report
}

async fn check_image(config: &HarnessConfig) -> CheckResult {
    let image = config.container.image.clone();
    let args = vec!["image".to_owned(), "exists".to_owned(), image.clone()];
    match run_probe(&config.container.runtime, &args, PROBE_TIMEOUT).await {
        Ok(probe) if probe.exit_code == Some(0) => {
            CheckResult::passed(IMAGE_CHECK, format!("image {image} present"))
        }
        Ok(probe) => CheckResult::failed(
            IMAGE_CHECK,
            format!("image {image} not found ({})", probe.describe()),
        ),
        Err(err) => CheckResult::failed(IMAGE_CHECK, err.to_string()),
    }
}

async fn check_container_start(config: &HarnessConfig) -> CheckResult {
    let probe_text = format!("nanoclaw-probe-{}", Uuid::new_v4());
    let name = format!("{}-smoke-{}", config.container.name_prefix, Uuid::new_v4());
    let mut spec = ContainerSpec::new(
        &config.container.runtime,
        &config.container.image,
        name,
    );
    spec.command = vec!["echo".to_owned(), probe_text.clone()];

    match run_probe(&config.container.runtime, &spec.run_args(), PROBE_TIMEOUT).await {
        Ok(probe) if probe.exit_code == Some(0) && probe.stdout.contains(&probe_text) => {
            CheckResult::passed(START_CHECK, "container started and echoed the probe")
        }
        Ok(probe) if probe.exit_code == Some(0) => CheckResult::failed(
            START_CHECK,
            format!("container ran but probe text missing ({})", probe.describe()),
        ),
        Ok(probe) => CheckResult::failed(
            START_CHECK,
            format!("container failed to start ({})", probe.describe()),
        ),
        Err(err) => CheckResult::failed(START_CHECK, err.to_string()),
    }
}

async fn check_agent_response(
    config: &HarnessConfig,
    names: &InvocationNames,
    store: &dyn SessionStore,
    group: &str,
    cancel: &CancellationToken,
) -> CheckResult {
    let opts = InvocationOptions::new(group, SMOKE_PROMPT);
    match run_invocation(config, names, store, &opts, cancel).await {
        Ok(outcome) if outcome.reply.contains(SMOKE_TOKEN) => CheckResult::passed(
            RESPONSE_CHECK,
            format!("agent replied in {:.1}s", outcome.duration.as_secs_f64()),
        ),
        Ok(outcome) => CheckResult::failed(
            RESPONSE_CHECK,
            format!("reply missing {SMOKE_TOKEN}: {}", clip(&outcome.reply)),
        ),
        Err(err) => CheckResult::failed(RESPONSE_CHECK, err.to_string()),
    }
}

async fn check_status(
    config: &HarnessConfig,
    names: &InvocationNames,
    store: &dyn SessionStore,
    group: &str,
    cancel: &CancellationToken,
) -> CheckResult {
    let prior = store
        .load(group)
        .ok()
        .flatten()
        .map(|record| record.session_id);

    let opts = InvocationOptions::new(group, SMOKE_PROMPT);
    match run_invocation(config, names, store, &opts, cancel).await {
        Ok(_outcome) => {
            let detail = prior.map_or_else(
                || "status success; no prior session to resume".to_owned(),
                |id| format!("status success; resumed session {id}"),
            );
            CheckResult::passed(STATUS_CHECK, detail)
        }
        Err(err) => CheckResult::failed(STATUS_CHECK, err.to_string()),
    }
}

struct ProbeOutput {
    exit_code: Option<i32>,
    stdout: String,
    stderr: String,
}

impl ProbeOutput {
    fn describe(&self) -> String {
        let exit = self
            .exit_code
            .map_or_else(|| "killed by signal".to_owned(), |c| format!("exit {c}"));
        let noise = if self.stderr.trim().is_empty() {
            &self.stdout
        } else {
            &self.stderr
        };
        if noise.trim().is_empty() {
            exit
        } else {
            format!("{exit}: {}", clip(noise))
        }
    }
}

/// Run one short-lived runtime command and collect its output whole.
async fn run_probe(runtime: &str, args: &[String], limit: Duration) -> Result<ProbeOutput> {
    let mut cmd = Command::new(runtime);
    cmd.args(args).stdin(Stdio::null()).kill_on_drop(true);

    match tokio::time::timeout(limit, cmd.output()).await {
        Ok(Ok(output)) => Ok(ProbeOutput {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        }),
        Ok(Err(err)) if err.kind() == std::io::ErrorKind::NotFound => Err(HarnessError::Launch(
            format!("runtime binary not found: {runtime}"),
        )),
        Ok(Err(err)) => Err(HarnessError::Launch(format!(
            "failed to run {runtime}: {err}"
        ))),
        Err(_elapsed) => Err(HarnessError::Timeout(limit.as_secs())),
    }
}

fn clip(text: &str) -> String {
    let flat = text.trim().replace('\n', " | ");
    if flat.chars().count() <= DETAIL_CLIP {
        flat
    } else {
        let clipped: String = flat.chars().take(DETAIL_CLIP).collect();
        format!("{clipped}…")
    }
}
