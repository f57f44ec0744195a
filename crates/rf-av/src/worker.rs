//! Single-use process worker: runs one external command and streams its
//! output line-by-line.
//!
//! stderr is redirected into stdout through one shared anonymous pipe, so
//! the interleaving of normal and diagnostic output is exactly what the
//! tool produced. The blocking read loop runs on the tokio blocking pool;
//! reading from the child is the only suspension point.

use std::io::{BufRead, BufReader};
use std::process::{Child, Command, Stdio};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use rf_core::types::StageResult;
use rf_core::{Error, Result};

// ---------------------------------------------------------------------------
// WorkerCommand
// ---------------------------------------------------------------------------

/// A command for the worker to run: an argument vector, optionally marked
/// for shell interpretation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerCommand {
    /// Program followed by arguments. For shell commands, a single element
    /// of shell text.
    pub argv: Vec<String>,
    /// When set, the command text is handed to `sh -c`.
    pub shell: bool,
}

impl WorkerCommand {
    /// A directly executed argument vector.
    pub fn argv(argv: Vec<String>) -> Self {
        Self { argv, shell: false }
    }

    /// A shell-interpreted command text.
    pub fn shell(text: impl Into<String>) -> Self {
        Self {
            argv: vec![text.into()],
            shell: true,
        }
    }

    /// Whether there is anything to run.
    pub fn is_empty(&self) -> bool {
        self.argv.is_empty()
    }

    /// The literal command line, as echoed to collaborators.
    pub fn display(&self) -> String {
        self.argv.join(" ")
    }
}

// ---------------------------------------------------------------------------
// WorkerEvent
// ---------------------------------------------------------------------------

/// Events emitted by a running worker, in strict arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerEvent {
    /// One completed line of interleaved stdout/stderr.
    Line(String),
    /// The process has terminated; emitted exactly once, last.
    Completed {
        /// Numeric exit status; `None` when killed by a signal.
        exit_code: Option<i32>,
    },
}

// ---------------------------------------------------------------------------
// ProcessWorker
// ---------------------------------------------------------------------------

/// Runs exactly one [`WorkerCommand`]. Consumed by [`ProcessWorker::run`];
/// a new worker is built for every stage launch.
#[derive(Debug)]
pub struct ProcessWorker {
    command: WorkerCommand,
}

impl ProcessWorker {
    /// Create a worker for the given command.
    pub fn new(command: WorkerCommand) -> Self {
        Self { command }
    }

    /// Run the command to completion.
    ///
    /// Text events and the final completion event are sent through
    /// `events`; the returned [`StageResult`] carries the same exit code
    /// together with the full captured output, so the owning coordinator
    /// does not have to re-accumulate lines.
    ///
    /// An empty command emits no output and completes immediately as a
    /// trivial success. Firing the cancellation token kills the child at
    /// once, even while it is silent; the completion event then carries
    /// the kill status.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Launch`] when the executable cannot be spawned.
    /// A non-zero exit status is *not* an error.
    pub async fn run(
        self,
        events: mpsc::UnboundedSender<WorkerEvent>,
        cancel: CancellationToken,
    ) -> Result<StageResult> {
        if self.command.is_empty() {
            // No-op stage: coordinators still get a uniform completion.
            let _ = events.send(WorkerEvent::Completed { exit_code: Some(0) });
            return Ok(StageResult {
                exit_code: Some(0),
                text: String::new(),
            });
        }

        // The child handle is shared with a watcher that kills it the
        // moment the token fires; the read loop then sees EOF.
        let child_slot: Arc<Mutex<Option<Child>>> = Arc::new(Mutex::new(None));
        let watcher = {
            let cancel = cancel.clone();
            let child_slot = Arc::clone(&child_slot);
            tokio::spawn(async move {
                cancel.cancelled().await;
                tracing::info!("cancellation requested; killing child");
                kill_child(&child_slot);
            })
        };

        let command = self.command;
        let joined =
            tokio::task::spawn_blocking(move || run_blocking(command, events, cancel, child_slot))
                .await;
        watcher.abort();
        joined.map_err(|e| Error::Internal(format!("worker task panicked: {e}")))?
    }
}

fn kill_child(slot: &Mutex<Option<Child>>) {
    if let Some(child) = slot.lock().as_mut() {
        let _ = child.kill();
    }
}

/// The blocking body: spawn, stream, wait.
fn run_blocking(
    command: WorkerCommand,
    events: mpsc::UnboundedSender<WorkerEvent>,
    cancel: CancellationToken,
    child_slot: Arc<Mutex<Option<Child>>>,
) -> Result<StageResult> {
    let (program, args): (String, Vec<String>) = if command.shell {
        (
            "sh".to_string(),
            vec!["-c".to_string(), command.argv.join(" ")],
        )
    } else {
        (command.argv[0].clone(), command.argv[1..].to_vec())
    };

    // Echo the literal command line as the first streamed event.
    let echoed = command.display();
    let _ = events.send(WorkerEvent::Line(echoed.clone()));
    let mut text = String::new();
    text.push_str(&echoed);
    text.push('\n');

    // One pipe, two write ends: the child's stdout and stderr share it, so
    // the parent reads a single interleaved byte stream.
    let (reader, writer) = std::io::pipe()?;
    let writer_clone = writer.try_clone()?;

    let mut cmd = Command::new(&program);
    cmd.args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::from(writer))
        .stderr(Stdio::from(writer_clone));

    tracing::debug!(command = %echoed, "spawning stage process");

    let child = cmd.spawn().map_err(|e| Error::Launch {
        tool: program.clone(),
        message: e.to_string(),
    })?;
    *child_slot.lock() = Some(child);
    // The watcher may have fired before the slot was filled.
    if cancel.is_cancelled() {
        kill_child(&child_slot);
    }

    // The parent's copies of the write end must be closed, or the read
    // loop below never sees EOF.
    drop(cmd);

    let mut lines = BufReader::new(reader);
    let mut buf = String::new();
    loop {
        buf.clear();
        let n = match lines.read_line(&mut buf) {
            Ok(n) => n,
            Err(e) => {
                // The child is still running; reap it before bailing out.
                kill_child(&child_slot);
                if let Some(child) = child_slot.lock().as_mut() {
                    let _ = child.wait();
                }
                return Err(e.into());
            }
        };
        if n == 0 {
            break;
        }
        let line = buf.trim_end().to_string();
        text.push_str(&line);
        text.push('\n');
        let _ = events.send(WorkerEvent::Line(line));
    }

    let status = {
        let mut slot = child_slot.lock();
        let child = slot
            .as_mut()
            .ok_or_else(|| Error::Internal("worker lost its child handle".into()))?;
        child.wait().map_err(|e| Error::Launch {
            tool: program,
            message: format!("failed waiting for process: {e}"),
        })?
    };
    let exit_code = status.code();

    let summary = match exit_code {
        Some(rc) => format!("Completed with returncode {rc}"),
        None => "Completed: killed by signal".to_string(),
    };
    text.push_str(&summary);
    text.push('\n');
    let _ = events.send(WorkerEvent::Line(summary));
    let _ = events.send(WorkerEvent::Completed { exit_code });

    Ok(StageResult { exit_code, text })
}
