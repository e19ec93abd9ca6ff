//! Container workload invocation plumbing.
//!
//! This module owns everything between "a prompt exists" and "structured
//! output came back": building the runtime command line for one container
//! invocation, spawning it with piped stdio, capturing stdout/stderr line
//! by line into shared buffers, and extracting the sentinel-framed JSON
//! payload from whatever the workload printed.
//!
//! Submodules:
//! - `codec`: [`LinesCodec`](tokio_util::codec::LinesCodec)-based framing
//!   for workload output streams with a max-line-length guard.
//! - `reader`: Async capture task feeding a [`CaptureBuffer`] that the
//!   close-signal watcher observes while the invocation is still running.
//! - `spawner`: Command construction, process spawning, the invocation
//!   name registry, and the graceful-stop primitive.
//! - `framing`: Sentinel extraction and payload encode/decode.

pub mod codec;
pub mod framing;
pub mod reader;
pub mod spawner;

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::Mutex;

/// One host-to-container bind mount.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mount {
    /// Host-side path.
    pub host: PathBuf,
    /// Container-side path.
    pub container: String,
    /// Mount read-only.
    pub read_only: bool,
}

impl Mount {
    /// Construct a writable bind mount.
    #[must_use]
    pub fn writable(host: PathBuf, container: impl Into<String>) -> Self {
        Self {
            host,
            container: container.into(),
            read_only: false,
        }
    }

    /// Construct a read-only bind mount.
    #[must_use]
    pub fn read_only(host: PathBuf, container: impl Into<String>) -> Self {
        Self {
            host,
            container: container.into(),
            read_only: true,
        }
    }

    fn to_volume_arg(&self) -> String {
        let mut arg = format!("{}:{}", self.host.display(), self.container);
        if self.read_only {
            arg.push_str(":ro");
        }
        arg
    }
}

/// Executable invocation descriptor for one container workload.
///
/// The `name` must be unique among concurrently running invocations; the
/// spawner enforces this through [`spawner::InvocationNames`] and the
/// watchdog addresses its graceful-stop request to the same name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSpec {
    /// Runtime binary (`podman`, `docker`, or a stand-in under test).
    pub runtime: String,
    /// Image reference to run.
    pub image: String,
    /// Unique invocation name (`--name`).
    pub name: String,
    /// Bind mounts.
    pub mounts: Vec<Mount>,
    /// Environment variables exported into the container.
    pub env: Vec<(String, String)>,
    /// Memory limit (`--memory`), when set.
    pub memory: Option<String>,
    /// CPU limit (`--cpus`), when set.
    pub cpus: Option<String>,
    /// Extra runtime arguments inserted before the image reference.
    pub extra_args: Vec<String>,
    /// Command and arguments appended after the image reference,
    /// overriding the image entrypoint when non-empty.
    pub command: Vec<String>,
}

impl ContainerSpec {
    /// Construct a spec with no mounts, env, or limits.
    #[must_use]
    pub fn new(
        runtime: impl Into<String>,
        image: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            runtime: runtime.into(),
            image: image.into(),
            name: name.into(),
            mounts: Vec::new(),
            env: Vec::new(),
            memory: None,
            cpus: None,
            extra_args: Vec::new(),
            command: Vec::new(),
        }
    }

    /// Arguments for `runtime run`: removal on exit, stdin attached, the
    /// unique name, limits, mounts, env, then the image reference.
    #[must_use]
    pub fn run_args(&self) -> Vec<String> {
        let mut args = vec![
            "run".to_owned(),
            "--rm".to_owned(),
            "-i".to_owned(),
            "--name".to_owned(),
            self.name.clone(),
        ];
        if let Some(ref memory) = self.memory {
            args.push("--memory".to_owned());
            args.push(memory.clone());
        }
        if let Some(ref cpus) = self.cpus {
            args.push("--cpus".to_owned());
            args.push(cpus.clone());
        }
        for mount in &self.mounts {
            args.push("-v".to_owned());
            args.push(mount.to_volume_arg());
        }
        for (key, value) in &self.env {
            args.push("-e".to_owned());
            args.push(format!("{key}={value}"));
        }
        args.extend(self.extra_args.iter().cloned());
        args.push(self.image.clone());
        args.extend(self.command.iter().cloned());
        args
    }

    /// Arguments for the graceful-stop primitive, addressed by name.
    #[must_use]
    pub fn stop_args(&self, grace_seconds: u64) -> Vec<String> {
        vec![
            "stop".to_owned(),
            "-t".to_owned(),
            grace_seconds.to_string(),
            self.name.clone(),
        ]
    }
}

/// Shared, growable capture of one output stream.
///
/// The reader task appends decoded lines while the invocation runs; the
/// close-signal watcher scans the same buffer concurrently. Once the
/// invocation ends the orchestrator drains it with [`take_lines`].
///
/// [`take_lines`]: CaptureBuffer::take_lines
#[derive(Debug, Default)]
pub struct CaptureBuffer {
    lines: Vec<String>,
    closed: bool,
}

impl CaptureBuffer {
    /// Append one decoded line.
    pub fn push(&mut self, line: String) {
        self.lines.push(line);
    }

    /// Mark the stream as closed (EOF observed).
    pub fn mark_closed(&mut self) {
        self.closed = true;
    }

    /// Whether EOF has been observed on the stream.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Captured lines so far.
    #[must_use]
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Number of captured lines so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    /// Whether nothing has been captured yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Drain the buffer, leaving it empty.
    pub fn take_lines(&mut self) -> Vec<String> {
        std::mem::take(&mut self.lines)
    }
}

/// Handle type shared between the reader task and its observers.
pub type SharedCapture = Arc<Mutex<CaptureBuffer>>;

/// Allocate an empty shared capture buffer.
#[must_use]
pub fn shared_capture() -> SharedCapture {
    Arc::new(Mutex::new(CaptureBuffer::default()))
}

/// Everything a finished invocation left behind.
///
/// A non-zero exit code is data, not an error: the workload may exit
/// non-zero while still having printed a valid sentinel-framed payload,
/// and callers decide what the code means.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedOutput {
    /// Captured stdout lines.
    pub stdout: Vec<String>,
    /// Captured stderr lines.
    pub stderr: Vec<String>,
    /// Process exit code; `None` when the process was signal-killed.
    pub exit_code: Option<i32>,
}

impl CapturedOutput {
    /// Whether the process exited zero.
    #[must_use]
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Last `max_lines` of stdout joined for diagnostics, stderr appended
    /// when stdout is empty.
    #[must_use]
    pub fn diagnostic_tail(&self, max_lines: usize) -> String {
        let source = if self.stdout.is_empty() {
            &self.stderr
        } else {
            &self.stdout
        };
        let start = source.len().saturating_sub(max_lines);
        source[start..].join("\n")
    }
}
