//! Transcode workflow coordinator: stream probe and encode.
//!
//! The Info probe rebuilds the collaborator-editable stream list from
//! scratch; the Run stage encodes whatever is selected at launch time.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use rf_av::builder;
use rf_av::probe::parse_stream_lines;
use rf_av::ToolRegistry;
use rf_core::events::{EventBus, EventPayload};
use rf_core::params::ParameterStore;
use rf_core::types::{Stage, StageResult, StreamKind, StreamSpec, Workflow};
use rf_core::{Error, Result};

use crate::drive;

#[derive(Default)]
struct TranscodeState {
    active: Option<Stage>,
    results: HashMap<Stage, StageResult>,
}

/// Drives the transcode workflow. One stage at a time; a launch attempt
/// while a stage is active is rejected with [`Error::StageBusy`].
pub struct TranscodeCoordinator {
    store: Arc<ParameterStore>,
    tools: Arc<ToolRegistry>,
    bus: Arc<EventBus>,
    state: Mutex<TranscodeState>,
}

impl TranscodeCoordinator {
    pub fn new(store: Arc<ParameterStore>, tools: Arc<ToolRegistry>, bus: Arc<EventBus>) -> Self {
        Self {
            store,
            tools,
            bus,
            state: Mutex::new(TranscodeState::default()),
        }
    }

    /// The stage currently running, if any.
    pub fn active(&self) -> Option<Stage> {
        self.state.lock().active
    }

    /// Captured result of the last completed run of `stage`.
    pub fn result(&self, stage: Stage) -> Option<StageResult> {
        self.state.lock().results.get(&stage).cloned()
    }

    /// Launch the stream probe. Discards the current stream list up front;
    /// the parsed replacement lands when the probe completes.
    ///
    /// # Errors
    ///
    /// [`Error::Validation`] when no input is set, [`Error::Precondition`]
    /// when the input file is missing, [`Error::StageBusy`], or
    /// [`Error::Launch`] when ffmpeg was not discovered.
    pub fn launch_info(
        self: &Arc<Self>,
        cancel: CancellationToken,
    ) -> Result<JoinHandle<Result<StageResult>>> {
        let snap = self.store.transcode_snapshot()?;
        if !snap.input.is_file() {
            return Err(Error::precondition("input file", snap.input));
        }
        let tool = self.tools.require(builder::TRANSCODE_TOOL)?.path.clone();
        self.begin(Stage::Info)?;

        // A fresh probe never merges with stale discoveries.
        self.store.replace_streams(Vec::new());

        let command = builder::transcode_info(&tool, &snap);
        let this = Arc::clone(self);
        Ok(tokio::spawn(async move {
            let outcome =
                drive::run_stage(&this.bus, Workflow::Transcode, Stage::Info, command, cancel)
                    .await;
            match outcome {
                Ok(result) => {
                    this.absorb_info(&result);
                    this.finish(Stage::Info, Some(result.clone()));
                    Ok(result)
                }
                Err(e) => {
                    this.finish(Stage::Info, None);
                    Err(e)
                }
            }
        }))
    }

    /// Launch the encode from the current stream list.
    ///
    /// # Errors
    ///
    /// [`Error::Validation`] when no input is set, [`Error::Precondition`]
    /// when the input file or output directory is missing,
    /// [`Error::StageBusy`], or [`Error::Launch`].
    pub fn launch_run(
        self: &Arc<Self>,
        cancel: CancellationToken,
    ) -> Result<JoinHandle<Result<StageResult>>> {
        let snap = self.store.transcode_snapshot()?;
        if !snap.input.is_file() {
            return Err(Error::precondition("input file", snap.input));
        }
        if !snap.outdir.is_dir() {
            return Err(Error::precondition("output directory", snap.outdir));
        }
        let tool = self.tools.require(builder::TRANSCODE_TOOL)?.path.clone();
        self.begin(Stage::Run)?;

        let command = builder::transcode_run(&tool, &snap);
        let this = Arc::clone(self);
        Ok(tokio::spawn(async move {
            let outcome =
                drive::run_stage(&this.bus, Workflow::Transcode, Stage::Run, command, cancel)
                    .await;
            match outcome {
                Ok(result) => {
                    this.finish(Stage::Run, Some(result.clone()));
                    Ok(result)
                }
                Err(e) => {
                    this.finish(Stage::Run, None);
                    Err(e)
                }
            }
        }))
    }

    fn begin(&self, stage: Stage) -> Result<()> {
        let mut state = self.state.lock();
        if let Some(active) = state.active {
            return Err(Error::busy(Workflow::Transcode, active));
        }
        state.active = Some(stage);
        Ok(())
    }

    fn finish(&self, stage: Stage, result: Option<StageResult>) {
        let mut state = self.state.lock();
        state.active = None;
        if let Some(result) = result {
            state.results.insert(stage, result);
        }
    }

    /// Run the stream grammar over the probe output and rebuild the list.
    fn absorb_info(&self, result: &StageResult) {
        let streams: Vec<StreamSpec> = parse_stream_lines(&result.text)
            .into_iter()
            .map(|line| {
                StreamSpec::discovered(
                    line.index,
                    StreamKind::from_probe_word(&line.kind),
                    line.description,
                )
            })
            .collect();
        let count = streams.len();
        tracing::info!(count, "stream probe complete");
        self.store.replace_streams(streams);
        self.bus
            .broadcast(EventPayload::StreamsDiscovered { count });
    }
}
