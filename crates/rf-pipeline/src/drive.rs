//! Shared stage-driving glue between a coordinator and its worker.

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use rf_av::worker::{ProcessWorker, WorkerCommand, WorkerEvent};
use rf_core::events::{EventBus, EventPayload};
use rf_core::types::{Stage, StageResult, Workflow};
use rf_core::Result;

/// Run one stage command to completion, republishing the worker's events
/// on the coordinator's bus in strict arrival order.
///
/// On a launch failure a `StageEnded` with no exit code is still broadcast
/// so dependent collaborator controls are re-enabled; the error itself is
/// returned to the caller.
pub(crate) async fn run_stage(
    bus: &EventBus,
    workflow: Workflow,
    stage: Stage,
    command: WorkerCommand,
    cancel: CancellationToken,
) -> Result<StageResult> {
    tracing::info!(%workflow, %stage, command = %command.display(), "stage starting");
    bus.broadcast(EventPayload::StageStarted { workflow, stage });

    let (tx, mut rx) = mpsc::unbounded_channel();
    let run = ProcessWorker::new(command).run(tx, cancel);

    let forward = async {
        // The channel closes when the worker finishes; events arrive in
        // the order the worker sent them.
        while let Some(event) = rx.recv().await {
            match event {
                WorkerEvent::Line(line) => bus.broadcast(EventPayload::StageLine {
                    workflow,
                    stage,
                    line,
                }),
                WorkerEvent::Completed { exit_code } => {
                    bus.broadcast(EventPayload::StageEnded {
                        workflow,
                        stage,
                        exit_code,
                    })
                }
            }
        }
    };

    let (result, ()) = tokio::join!(run, forward);

    match &result {
        Ok(res) => {
            tracing::info!(%workflow, %stage, exit_code = ?res.exit_code, "stage ended");
        }
        Err(e) => {
            tracing::error!(%workflow, %stage, error = %e, "stage failed to launch");
            bus.broadcast(EventPayload::StageEnded {
                workflow,
                stage,
                exit_code: None,
            });
        }
    }

    result
}
