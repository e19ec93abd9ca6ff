#![forbid(unsafe_code)]

//! `nanoclaw-harness` — container invocation and smoke-test harness binary.
//!
//! Drives the nanoclaw agent container through its stdin/stdout contract:
//! single-shot invocations, an interactive prompt loop, orchestrated smoke
//! checks, and session-state management.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use nanoclaw_harness::config::HarnessConfig;
use nanoclaw_harness::orchestrator::{run_invocation, InvocationOptions};
use nanoclaw_harness::persistence::{FileSessionStore, SessionStore};
use nanoclaw_harness::smoke::run_smoke;
use nanoclaw_harness::workload::spawner::InvocationNames;
use nanoclaw_harness::{HarnessError, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(
    name = "nanoclaw-harness",
    about = "Container invocation and smoke-test harness for the nanoclaw agent runner",
    version,
    long_about = None
)]
struct Cli {
    /// Path to the TOML configuration file. Defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Base directory of the nanoclaw checkout (overrides the config).
    #[arg(long)]
    project: Option<PathBuf>,

    /// Harness state directory (overrides the config).
    #[arg(long)]
    state_dir: Option<PathBuf>,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Container runtime binary (overrides the config).
    #[arg(long)]
    runtime: Option<String>,

    /// Agent image reference (overrides the config).
    #[arg(long)]
    image: Option<String>,

    /// Model identifier exported to the workload (overrides the config).
    #[arg(long)]
    model: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run one prompt against the agent container and print the reply.
    Invoke {
        /// Group folder the invocation belongs to.
        #[arg(long)]
        group: String,
        /// Prompt text; read from stdin when omitted.
        #[arg(long)]
        prompt: Option<String>,
        /// Mark the turn as schedule-triggered.
        #[arg(long)]
        scheduled: bool,
    },
    /// Interactive prompt loop against one group.
    Repl {
        /// Group folder the loop runs against.
        #[arg(long)]
        group: String,
    },
    /// Run the orchestrated smoke checks and print the report.
    Smoke {
        /// Group folder used by the agent-level checks.
        #[arg(long, default_value = "smoke")]
        group: String,
    },
    /// Inspect or discard persisted session state.
    Session {
        #[command(subcommand)]
        action: SessionAction,
    },
}

#[derive(Debug, Subcommand)]
enum SessionAction {
    /// Discard the stored session for a group.
    Reset {
        /// Group folder whose session is discarded.
        #[arg(long)]
        group: String,
    },
    /// Print the stored session for a group.
    Show {
        /// Group folder whose session is printed.
        #[arg(long)]
        group: String,
    },
}

fn main() {
    let args = Cli::parse();
    if let Err(err) = init_tracing(args.log_format) {
        eprintln!("{err}");
        std::process::exit(err.exit_code());
    }

    let outcome = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| HarnessError::Config(format!("failed to build tokio runtime: {err}")))
        .and_then(|runtime| runtime.block_on(run(args)));

    match outcome {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            error!(error = %err, "harness failed");
            eprintln!("{err}");
            std::process::exit(err.exit_code());
        }
    }
}

async fn run(args: Cli) -> Result<i32> {
    // ── Load configuration ──────────────────────────────
    let mut config = match args.config {
        Some(ref path) => HarnessConfig::load_from_path(path)?,
        None => HarnessConfig::default(),
    };
    if let Some(project) = args.project {
        config.project_dir = project;
    }
    if let Some(state_dir) = args.state_dir {
        config.state_dir = Some(state_dir);
    }
    if let Some(runtime) = args.runtime {
        config.container.runtime = runtime;
    }
    if let Some(image) = args.image {
        config.container.image = image;
    }
    if let Some(model) = args.model {
        config.agent.model = Some(model);
    }
    config.validate()?;
    config.load_credentials();
    info!(project_dir = %config.project_dir.display(), "configuration loaded");

    let store = FileSessionStore::new(config.sessions_dir());
    let names = InvocationNames::new();

    match args.command {
        Command::Invoke {
            group,
            prompt,
            scheduled,
        } => {
            let prompt = match prompt {
                Some(text) => text,
                None => read_stdin_prompt().await?,
            };
            let mut opts = InvocationOptions::new(group, prompt);
            opts.is_scheduled_task = scheduled;

            let outcome = with_ctrl_c(|cancel| async move {
                run_invocation(&config, &names, &store, &opts, &cancel).await
            })
            .await?;
            println!("{}", outcome.reply);
            Ok(0)
        }
        Command::Repl { group } => run_repl(&config, &names, &store, &group).await,
        Command::Smoke { group } => {
            let report = with_ctrl_c(|cancel| async move {
                Ok(run_smoke(&config, &names, &store, &group, &cancel).await)
            })
            .await?;
            print!("{}", report.render());
            Ok(report.exit_code())
        }
        Command::Session { action } => match action {
            SessionAction::Reset { group } => {
                if store.reset(&group)? {
                    println!("session cleared for {group}");
                } else {
                    println!("no session stored for {group}");
                }
                Ok(0)
            }
            SessionAction::Show { group } => {
                match store.load(&group)? {
                    Some(record) => println!(
                        "{} (updated {})",
                        record.session_id,
                        record.updated_at.to_rfc3339()
                    ),
                    None => println!("no session stored for {group}"),
                }
                Ok(0)
            }
        },
    }
}

/// Run `body` with a cancellation token wired to Ctrl-C.
async fn with_ctrl_c<T, F, Fut>(body: F) -> Result<T>
where
    F: FnOnce(CancellationToken) -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    let signal_task = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            signal_cancel.cancel();
        }
    });
    let result = body(cancel).await;
    signal_task.abort();
    result
}

/// Interactive prompt loop. Turn-level failures are printed and the loop
/// continues; infrastructure failures end it.
async fn run_repl(
    config: &HarnessConfig,
    names: &InvocationNames,
    store: &FileSessionStore,
    group: &str,
) -> Result<i32> {
    println!("nanoclaw repl — group {group}. `/reset` clears the session, `exit` leaves.");

    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
    loop {
        prompt_marker().await?;
        let Some(line) = lines
            .next_line()
            .await
            .map_err(|err| HarnessError::Io(format!("failed to read stdin: {err}")))?
        else {
            break;
        };
        let line = line.trim();

        match line {
            "" => continue,
            "exit" | "quit" => break,
            "/reset" => {
                if store.reset(group)? {
                    println!("session cleared");
                } else {
                    println!("no session to clear");
                }
                continue;
            }
            _ => {}
        }

        let opts = InvocationOptions::new(group, line);
        let turn = with_ctrl_c(|cancel| async move {
            run_invocation(config, names, store, &opts, &cancel).await
        })
        .await;

        match turn {
            Ok(outcome) => println!("{}", outcome.reply),
            Err(err) if err.is_turn_level() => eprintln!("{err}"),
            Err(err) => return Err(err),
        }
    }

    println!("bye");
    Ok(0)
}

async fn prompt_marker() -> Result<()> {
    let mut stdout = tokio::io::stdout();
    stdout
        .write_all(b"> ")
        .await
        .map_err(|err| HarnessError::Io(format!("failed to write prompt: {err}")))?;
    stdout
        .flush()
        .await
        .map_err(|err| HarnessError::Io(format!("failed to flush prompt: {err}")))
}

async fn read_stdin_prompt() -> Result<String> {
    let mut prompt = String::new();
    tokio::io::stdin()
        .read_to_string(&mut prompt)
        .await
        .map_err(|err| HarnessError::Io(format!("failed to read prompt from stdin: {err}")))?;
    Ok(prompt.trim().to_owned())
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(env_filter).with_writer(std::io::stderr);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| HarnessError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| HarnessError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
