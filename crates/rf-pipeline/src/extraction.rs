//! Extraction workflow coordinator: Info probe, title copy, VOB concat.
//!
//! Stage launches are synchronous up to the busy check; the stage itself
//! runs on a spawned task and reports through the event bus. The disc
//! grammar runs on the Info probe's captured output, and a successful Run
//! can auto-chain into the Cat stage.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use rf_av::builder;
use rf_av::probe::parse_disc_info;
use rf_av::worker::WorkerCommand;
use rf_av::ToolRegistry;
use rf_core::events::{EventBus, EventPayload};
use rf_core::params::{ExtractionSnapshot, ParameterStore};
use rf_core::types::{Stage, StageResult, Workflow};
use rf_core::{Error, Result};

use crate::drive;

/// Collaborator hook for the one interactive point in the pipeline: the
/// Cat stage asking for a VOB directory when the expected one is missing.
///
/// Returning `None` declines the request and aborts the Cat launch.
#[async_trait]
pub trait PathRequest: Send + Sync {
    async fn request_vob_dir(&self, suggested: &Path) -> Option<PathBuf>;
}

#[derive(Default)]
struct ExtractionState {
    active: Option<Stage>,
    results: HashMap<Stage, StageResult>,
    media_name: String,
    summary: String,
    /// Concat command cached by the last recompute. Only valid while the
    /// directory it was derived from still exists.
    cat_command: Option<WorkerCommand>,
    vob_dir: Option<PathBuf>,
}

/// Drives the extraction workflow. One stage at a time; a launch attempt
/// while a stage is active is rejected with [`Error::StageBusy`].
pub struct ExtractionCoordinator {
    store: Arc<ParameterStore>,
    tools: Arc<ToolRegistry>,
    bus: Arc<EventBus>,
    path_request: Option<Arc<dyn PathRequest>>,
    state: Mutex<ExtractionState>,
}

impl ExtractionCoordinator {
    pub fn new(store: Arc<ParameterStore>, tools: Arc<ToolRegistry>, bus: Arc<EventBus>) -> Self {
        Self {
            store,
            tools,
            bus,
            path_request: None,
            state: Mutex::new(ExtractionState::default()),
        }
    }

    /// Attach the interactive path-request collaborator.
    pub fn with_path_request(mut self, path_request: Arc<dyn PathRequest>) -> Self {
        self.path_request = Some(path_request);
        self
    }

    // -- Observed state ----------------------------------------------------

    /// The stage currently running, if any.
    pub fn active(&self) -> Option<Stage> {
        self.state.lock().active
    }

    /// Disc title parsed from the last Info probe ("" until detected).
    pub fn media_name(&self) -> String {
        self.state.lock().media_name.clone()
    }

    /// Main-feature / title-set summary from the last Info probe.
    pub fn disc_summary(&self) -> String {
        self.state.lock().summary.clone()
    }

    /// Captured result of the last completed run of `stage`.
    pub fn result(&self, stage: Stage) -> Option<StageResult> {
        self.state.lock().results.get(&stage).cloned()
    }

    /// Whether a validated concat command is currently cached. The cache
    /// is only as good as the directory it was derived from, so a candidate
    /// whose directory has since vanished is dropped here rather than
    /// reported stale.
    pub fn has_cat_candidate(&self) -> bool {
        let mut state = self.state.lock();
        match state.vob_dir {
            Some(ref dir) if dir.is_dir() => state.cat_command.is_some(),
            Some(_) => {
                state.cat_command = None;
                state.vob_dir = None;
                false
            }
            None => false,
        }
    }

    // -- Stage launches -----------------------------------------------------

    /// Launch the disc info probe.
    ///
    /// # Errors
    ///
    /// [`Error::Precondition`] when the device node is missing,
    /// [`Error::StageBusy`] when a stage is already active, or
    /// [`Error::Launch`] when dvdbackup was not discovered.
    pub fn launch_info(
        self: &Arc<Self>,
        cancel: CancellationToken,
    ) -> Result<JoinHandle<Result<StageResult>>> {
        let snap = self.store.extraction_snapshot();
        if !snap.device.exists() {
            return Err(Error::precondition("device", snap.device));
        }
        let tool = self.tools.require(builder::EXTRACT_TOOL)?.path.clone();
        self.begin(Stage::Info)?;

        let command = builder::extraction_info(&tool, &snap);
        let this = Arc::clone(self);
        Ok(tokio::spawn(async move {
            let outcome =
                drive::run_stage(&this.bus, Workflow::Extraction, Stage::Info, command, cancel)
                    .await;
            match outcome {
                Ok(result) => {
                    this.absorb_info(&result, &snap);
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

    /// Launch the title copy, auto-chaining into Cat when enabled.
    ///
    /// The returned handle resolves only after any auto-chained Cat stage
    /// has also finished.
    ///
    /// # Errors
    ///
    /// [`Error::Precondition`] when the device or output directory is
    /// missing, [`Error::StageBusy`], or [`Error::Launch`].
    pub fn launch_run(
        self: &Arc<Self>,
        cancel: CancellationToken,
    ) -> Result<JoinHandle<Result<StageResult>>> {
        let snap = self.store.extraction_snapshot();
        if !snap.device.exists() {
            return Err(Error::precondition("device", snap.device));
        }
        if !snap.outdir.is_dir() {
            return Err(Error::precondition("output directory", snap.outdir));
        }
        let tool = self.tools.require(builder::EXTRACT_TOOL)?.path.clone();
        self.begin(Stage::Run)?;

        let command = builder::extraction_run(&tool, &snap);
        let this = Arc::clone(self);
        Ok(tokio::spawn(async move {
            let outcome = drive::run_stage(
                &this.bus,
                Workflow::Extraction,
                Stage::Run,
                command,
                cancel.clone(),
            )
            .await;
            match outcome {
                Ok(result) => {
                    this.finish(Stage::Run, Some(result.clone()));
                    this.recompute_cat(&snap);
                    // Cat re-validates its own preconditions, so a non-zero
                    // copy exit does not suppress the chain.
                    if snap.auto_cat {
                        this.auto_chain_cat(cancel).await;
                    }
                    Ok(result)
                }
                Err(e) => {
                    this.finish(Stage::Run, None);
                    Err(e)
                }
            }
        }))
    }

    /// Launch the VOB concatenation.
    ///
    /// Uses the cached candidate when its directory still exists; otherwise
    /// derives the expected path and, failing that, asks the collaborator.
    ///
    /// # Errors
    ///
    /// [`Error::Precondition`] when no valid VOB directory can be resolved,
    /// [`Error::PathRequestDeclined`] when the collaborator cancels,
    /// [`Error::StageBusy`], or [`Error::Launch`] when `sh` is missing.
    pub async fn launch_cat(
        self: &Arc<Self>,
        cancel: CancellationToken,
    ) -> Result<JoinHandle<Result<StageResult>>> {
        let snap = self.store.extraction_snapshot();
        let vob_dir = self.resolve_vob_dir(&snap).await?;
        self.tools.require("sh")?;
        self.begin(Stage::Cat)?;

        let command = builder::concat(&vob_dir);
        let this = Arc::clone(self);
        Ok(tokio::spawn(async move {
            let outcome =
                drive::run_stage(&this.bus, Workflow::Extraction, Stage::Cat, command, cancel)
                    .await;
            match outcome {
                Ok(result) => {
                    this.finish(Stage::Cat, Some(result.clone()));
                    this.absorb_cat(&result, &vob_dir);
                    Ok(result)
                }
                Err(e) => {
                    this.finish(Stage::Cat, None);
                    Err(e)
                }
            }
        }))
    }

    // -- Internals -----------------------------------------------------------

    /// Atomically claim the workflow for `stage`.
    fn begin(&self, stage: Stage) -> Result<()> {
        let mut state = self.state.lock();
        if let Some(active) = state.active {
            return Err(Error::busy(Workflow::Extraction, active));
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

    /// Run the disc grammar over the Info probe output and refresh the
    /// derived facts.
    fn absorb_info(&self, result: &StageResult, snap: &ExtractionSnapshot) {
        let info = parse_disc_info(&result.text);
        {
            let mut state = self.state.lock();
            state.media_name = info.name.clone();
            state.summary = info.summary();
        }
        if !info.name.is_empty() {
            tracing::info!(name = %info.name, "media name detected");
            self.bus
                .broadcast(EventPayload::MediaNameDetected { name: info.name });
        }
        self.recompute_cat(snap);
    }

    /// A finished concat invalidates the cached candidate; a clean one with
    /// an on-disk output file is announced as a transcode source.
    fn absorb_cat(&self, result: &StageResult, vob_dir: &Path) {
        {
            let mut state = self.state.lock();
            state.cat_command = None;
            state.vob_dir = None;
        }
        if result.exit_code == Some(0) {
            let output = vob_dir.join("output.vob");
            if output.is_file() {
                self.bus
                    .broadcast(EventPayload::SourcePathAvailable { path: output });
            }
        }
    }

    /// Re-derive the cat candidate from the current media name. Newly valid
    /// directories are announced so the transcode workflow can adopt them.
    fn recompute_cat(&self, snap: &ExtractionSnapshot) {
        let mut state = self.state.lock();
        let dir = builder::vob_path(snap, &state.media_name);
        if !state.media_name.is_empty() && dir.is_dir() {
            let newly_valid = state.vob_dir.as_deref() != Some(dir.as_path());
            state.cat_command = Some(builder::concat(&dir));
            state.vob_dir = Some(dir.clone());
            drop(state);
            if newly_valid {
                self.bus
                    .broadcast(EventPayload::SourcePathAvailable { path: dir });
            }
        } else {
            state.cat_command = None;
            state.vob_dir = None;
        }
    }

    /// Resolve the directory the concat should read: cached candidate if
    /// still valid, expected path otherwise, collaborator as last resort.
    async fn resolve_vob_dir(&self, snap: &ExtractionSnapshot) -> Result<PathBuf> {
        let cached = self.state.lock().vob_dir.clone();
        if let Some(dir) = cached {
            if dir.is_dir() {
                return Ok(dir);
            }
        }

        let suggested = {
            let state = self.state.lock();
            builder::vob_path(snap, &state.media_name)
        };
        if suggested.is_dir() {
            return Ok(suggested);
        }

        let Some(request) = &self.path_request else {
            return Err(Error::precondition("VOB directory", suggested));
        };
        match request.request_vob_dir(&suggested).await {
            Some(dir) if dir.is_dir() => Ok(dir),
            Some(dir) => Err(Error::precondition("VOB directory", dir)),
            None => Err(Error::PathRequestDeclined),
        }
    }

    /// Auto-chain into Cat after a completed Run. Failures are logged and
    /// reported as a stage-line, never propagated into the Run result.
    async fn auto_chain_cat(self: &Arc<Self>, cancel: CancellationToken) {
        match self.launch_cat(cancel).await {
            Ok(handle) => {
                if let Ok(Err(e)) = handle.await {
                    tracing::warn!(error = %e, "auto-chained cat stage failed");
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "auto-chained cat stage not launched");
                self.bus.broadcast(EventPayload::StageLine {
                    workflow: Workflow::Extraction,
                    stage: Stage::Cat,
                    line: e.to_string(),
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use rf_core::config::Config;
    use std::os::unix::fs::PermissionsExt;

    /// Write an executable stub script.
    fn script(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        let mut perms = std::fs::metadata(&path).unwrap().permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&path, perms).unwrap();
        path
    }

    fn coordinator(
        store: ParameterStore,
        dvdbackup: PathBuf,
    ) -> (Arc<ExtractionCoordinator>, Arc<EventBus>) {
        let tools = ToolRegistry::with_tools([
            ("dvdbackup".to_string(), dvdbackup),
            ("sh".to_string(), PathBuf::from("/bin/sh")),
        ]);
        let bus = Arc::new(EventBus::default());
        let coord = Arc::new(ExtractionCoordinator::new(
            Arc::new(store),
            Arc::new(tools),
            Arc::clone(&bus),
        ));
        (coord, bus)
    }

    /// A store whose device is an existing file and whose outdir is a
    /// fresh directory, both under `dir`.
    fn store_under(dir: &Path) -> ParameterStore {
        let device = dir.join("sr0");
        std::fs::write(&device, "").unwrap();
        let outdir = dir.join("out");
        std::fs::create_dir(&outdir).unwrap();
        let store = ParameterStore::from_config(&Config::default());
        store.set_device(device);
        store.set_extraction_outdir(outdir);
        store
    }

    const TITLE_LINE: &str =
        r#"echo 'DVD-Video information of the DVD with title "SOME_DISC"'"#;

    #[tokio::test]
    async fn missing_device_is_precondition_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = ParameterStore::from_config(&Config::default());
        store.set_device("/nonexistent/sr0");
        let (coord, _bus) = coordinator(store, script(dir.path(), "dvdbackup", "exit 0"));

        let err = coord.launch_info(CancellationToken::new()).unwrap_err();
        assert_matches!(err, Error::Precondition { .. });
        assert_eq!(coord.active(), None, "no stage may have been claimed");
    }

    #[tokio::test]
    async fn info_probe_detects_media_name() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_under(dir.path());
        let (coord, bus) = coordinator(store, script(dir.path(), "dvdbackup", TITLE_LINE));
        let mut rx = bus.subscribe();

        let handle = coord.launch_info(CancellationToken::new()).unwrap();
        let result = handle.await.unwrap().unwrap();

        assert_eq!(result.exit_code, Some(0));
        assert_eq!(coord.media_name(), "SOME_DISC");
        assert_eq!(coord.active(), None);
        assert!(coord.result(Stage::Info).is_some());

        let mut detected = false;
        while let Ok(event) = rx.try_recv() {
            if matches!(event.payload, EventPayload::MediaNameDetected { ref name } if name == "SOME_DISC")
            {
                detected = true;
            }
        }
        assert!(detected, "MediaNameDetected must be broadcast");
    }

    #[tokio::test]
    async fn second_launch_while_running_is_busy() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_under(dir.path());
        let (coord, _bus) = coordinator(store, script(dir.path(), "dvdbackup", "sleep 1"));

        let handle = coord.launch_run(CancellationToken::new()).unwrap();
        // Give the stage a moment to claim the workflow, then collide.
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        let err = coord.launch_info(CancellationToken::new()).unwrap_err();
        assert_matches!(
            err,
            Error::StageBusy {
                workflow: Workflow::Extraction,
                stage: Stage::Run,
            }
        );
        handle.await.unwrap().unwrap();
        assert_eq!(coord.active(), None);
    }

    #[tokio::test]
    async fn run_auto_chains_cat_exactly_once() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_under(dir.path());
        store.set_auto_cat(true);
        let outdir = store.extraction_snapshot().outdir;
        let vob_dir = outdir.join("SOME_DISC").join("VIDEO_TS");
        std::fs::create_dir_all(&vob_dir).unwrap();
        std::fs::write(vob_dir.join("a.VOB"), "one\n").unwrap();
        std::fs::write(vob_dir.join("b.VOB"), "two\n").unwrap();

        let (coord, bus) = coordinator(store, script(dir.path(), "dvdbackup", TITLE_LINE));
        let mut rx = bus.subscribe();

        // The info probe establishes the media name the chain keys on.
        coord
            .launch_info(CancellationToken::new())
            .unwrap()
            .await
            .unwrap()
            .unwrap();
        coord
            .launch_run(CancellationToken::new())
            .unwrap()
            .await
            .unwrap()
            .unwrap();

        let joined = std::fs::read_to_string(vob_dir.join("output.vob")).unwrap();
        assert_eq!(joined, "one\ntwo\n");
        assert_eq!(
            coord.result(Stage::Cat).and_then(|r| r.exit_code),
            Some(0)
        );

        let mut cat_starts = 0;
        while let Ok(event) = rx.try_recv() {
            if matches!(
                event.payload,
                EventPayload::StageStarted {
                    stage: Stage::Cat,
                    ..
                }
            ) {
                cat_starts += 1;
            }
        }
        assert_eq!(cat_starts, 1, "cat must launch exactly once");
    }

    #[tokio::test]
    async fn nonzero_run_exit_still_chains_into_cat() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_under(dir.path());
        store.set_auto_cat(true);
        let outdir = store.extraction_snapshot().outdir;
        let vob_dir = outdir.join("SOME_DISC").join("VIDEO_TS");
        std::fs::create_dir_all(&vob_dir).unwrap();
        std::fs::write(vob_dir.join("a.VOB"), "one\n").unwrap();

        // The copy reports failure; the chain gates on the directory, not
        // on the exit status.
        let body = format!("{TITLE_LINE}\nexit 9");
        let (coord, bus) = coordinator(store, script(dir.path(), "dvdbackup", &body));
        let mut rx = bus.subscribe();

        coord
            .launch_info(CancellationToken::new())
            .unwrap()
            .await
            .unwrap()
            .unwrap();
        let run = coord
            .launch_run(CancellationToken::new())
            .unwrap()
            .await
            .unwrap()
            .unwrap();
        assert_eq!(run.exit_code, Some(9));

        let joined = std::fs::read_to_string(vob_dir.join("output.vob")).unwrap();
        assert_eq!(joined, "one\n");

        let mut cat_starts = 0;
        while let Ok(event) = rx.try_recv() {
            if matches!(
                event.payload,
                EventPayload::StageStarted {
                    stage: Stage::Cat,
                    ..
                }
            ) {
                cat_starts += 1;
            }
        }
        assert_eq!(cat_starts, 1, "cat must launch exactly once");
    }

    #[tokio::test]
    async fn cat_candidate_is_dropped_once_its_directory_is_gone() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_under(dir.path());
        let outdir = store.extraction_snapshot().outdir;
        let vob_dir = outdir.join("SOME_DISC").join("VIDEO_TS");
        std::fs::create_dir_all(&vob_dir).unwrap();
        std::fs::write(vob_dir.join("a.VOB"), "one\n").unwrap();

        let (coord, _bus) = coordinator(store, script(dir.path(), "dvdbackup", TITLE_LINE));
        coord
            .launch_info(CancellationToken::new())
            .unwrap()
            .await
            .unwrap()
            .unwrap();
        assert!(coord.has_cat_candidate());

        std::fs::remove_dir_all(&outdir).unwrap();
        assert!(
            !coord.has_cat_candidate(),
            "cache must be invalid once its directory is gone"
        );
    }

    #[tokio::test]
    async fn run_without_auto_cat_leaves_candidate_for_manual_launch() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_under(dir.path());
        store.set_auto_cat(false);
        let outdir = store.extraction_snapshot().outdir;
        let vob_dir = outdir.join("SOME_DISC").join("VIDEO_TS");
        std::fs::create_dir_all(&vob_dir).unwrap();
        std::fs::write(vob_dir.join("a.VOB"), "one\n").unwrap();

        let (coord, _bus) = coordinator(store, script(dir.path(), "dvdbackup", TITLE_LINE));

        coord
            .launch_info(CancellationToken::new())
            .unwrap()
            .await
            .unwrap()
            .unwrap();
        coord
            .launch_run(CancellationToken::new())
            .unwrap()
            .await
            .unwrap()
            .unwrap();

        assert!(!vob_dir.join("output.vob").exists(), "no auto chain");
        assert!(coord.has_cat_candidate());

        coord
            .launch_cat(CancellationToken::new())
            .await
            .unwrap()
            .await
            .unwrap()
            .unwrap();
        assert!(vob_dir.join("output.vob").exists());
        // A completed concat forces re-validation next time.
        assert!(!coord.has_cat_candidate());
    }

    #[tokio::test]
    async fn cat_without_vob_dir_and_no_collaborator_fails() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_under(dir.path());
        let (coord, _bus) = coordinator(store, script(dir.path(), "dvdbackup", "exit 0"));

        let err = coord
            .launch_cat(CancellationToken::new())
            .await
            .unwrap_err();
        assert_matches!(err, Error::Precondition { .. });
    }

    struct Declines;

    #[async_trait]
    impl PathRequest for Declines {
        async fn request_vob_dir(&self, _suggested: &Path) -> Option<PathBuf> {
            None
        }
    }

    struct Provides(PathBuf);

    #[async_trait]
    impl PathRequest for Provides {
        async fn request_vob_dir(&self, _suggested: &Path) -> Option<PathBuf> {
            Some(self.0.clone())
        }
    }

    #[tokio::test]
    async fn declined_path_request_aborts_cat() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_under(dir.path());
        let tools = ToolRegistry::with_tools([("sh".to_string(), PathBuf::from("/bin/sh"))]);
        let coord = Arc::new(
            ExtractionCoordinator::new(
                Arc::new(store),
                Arc::new(tools),
                Arc::new(EventBus::default()),
            )
            .with_path_request(Arc::new(Declines)),
        );

        let err = coord
            .launch_cat(CancellationToken::new())
            .await
            .unwrap_err();
        assert_matches!(err, Error::PathRequestDeclined);
        assert_eq!(coord.active(), None);
    }

    #[tokio::test]
    async fn collaborator_path_feeds_cat() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_under(dir.path());
        let vob_dir = dir.path().join("elsewhere");
        std::fs::create_dir(&vob_dir).unwrap();
        std::fs::write(vob_dir.join("x.VOB"), "payload\n").unwrap();

        let tools = ToolRegistry::with_tools([("sh".to_string(), PathBuf::from("/bin/sh"))]);
        let coord = Arc::new(
            ExtractionCoordinator::new(
                Arc::new(store),
                Arc::new(tools),
                Arc::new(EventBus::default()),
            )
            .with_path_request(Arc::new(Provides(vob_dir.clone()))),
        );

        coord
            .launch_cat(CancellationToken::new())
            .await
            .unwrap()
            .await
            .unwrap()
            .unwrap();
        let joined = std::fs::read_to_string(vob_dir.join("output.vob")).unwrap();
        assert_eq!(joined, "payload\n");
    }

    #[tokio::test]
    async fn store_edits_never_mutate_completed_results() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_under(dir.path());
        let (coord, _bus) = coordinator(store, script(dir.path(), "dvdbackup", TITLE_LINE));

        coord
            .launch_info(CancellationToken::new())
            .unwrap()
            .await
            .unwrap()
            .unwrap();
        let before = coord.result(Stage::Info).unwrap();

        coord.store.set_title(9);
        coord.store.set_device("/dev/sr3");
        assert_eq!(coord.result(Stage::Info), Some(before));
    }
}
