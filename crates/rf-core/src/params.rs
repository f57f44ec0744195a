//! Mutable parameter store and immutable launch-time snapshots.
//!
//! The store holds the current, collaborator-editable configuration for
//! both workflows. Coordinators never read it field-by-field; they take a
//! [`ExtractionSnapshot`] / [`TranscodeSnapshot`] at the instant a stage is
//! launched, so edits during a running stage can never affect the in-flight
//! command. Every edit bumps a single revision watch channel; derived state
//! is recomputed by whoever subscribes, never as a setter side effect.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::sync::watch;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::types::StreamSpec;

// ---------------------------------------------------------------------------
// Snapshots
// ---------------------------------------------------------------------------

/// Point-in-time copy of the extraction parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionSnapshot {
    pub device: PathBuf,
    pub outdir: PathBuf,
    pub title: u32,
    pub extra_flags: Vec<String>,
    pub auto_cat: bool,
}

/// Point-in-time copy of the transcode parameters, including the ordered
/// stream list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscodeSnapshot {
    pub input: PathBuf,
    pub outdir: PathBuf,
    pub threads: u32,
    pub crf: u32,
    pub container: String,
    pub streams: Vec<StreamSpec>,
}

// ---------------------------------------------------------------------------
// ParameterStore
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct Params {
    device: PathBuf,
    extraction_outdir: PathBuf,
    title: u32,
    extra_flags: Vec<String>,
    auto_cat: bool,

    input: Option<PathBuf>,
    transcode_outdir: PathBuf,
    threads: u32,
    crf: u32,
    container: String,
    streams: Vec<StreamSpec>,
}

/// Shared mutable configuration for both workflows.
pub struct ParameterStore {
    inner: RwLock<Params>,
    revision: watch::Sender<u64>,
}

impl ParameterStore {
    /// Seed the store from a loaded [`Config`].
    pub fn from_config(config: &Config) -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            inner: RwLock::new(Params {
                device: config.extraction.device.clone(),
                extraction_outdir: config.extraction.outdir.clone(),
                title: config.extraction.title,
                extra_flags: config.extraction.extra_flags.clone(),
                auto_cat: config.extraction.auto_cat,
                input: config.transcode.input.clone(),
                transcode_outdir: config.transcode.outdir.clone(),
                threads: config.transcode.threads,
                crf: config.transcode.crf,
                container: config.transcode.container.clone(),
                streams: Vec::new(),
            }),
            revision,
        }
    }

    /// Subscribe to the "snapshot changed" notification. The value is a
    /// monotonically increasing revision counter.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    fn bump(&self) {
        self.revision.send_modify(|r| *r += 1);
    }

    // -- Snapshots -----------------------------------------------------------

    /// Capture an extraction snapshot at this instant.
    pub fn extraction_snapshot(&self) -> ExtractionSnapshot {
        let p = self.inner.read();
        ExtractionSnapshot {
            device: p.device.clone(),
            outdir: p.extraction_outdir.clone(),
            title: p.title,
            extra_flags: p.extra_flags.clone(),
            auto_cat: p.auto_cat,
        }
    }

    /// Capture a transcode snapshot at this instant.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] when no input file has been set.
    pub fn transcode_snapshot(&self) -> Result<TranscodeSnapshot> {
        let p = self.inner.read();
        let input = p
            .input
            .clone()
            .ok_or_else(|| Error::Validation("transcode input is not set".into()))?;
        Ok(TranscodeSnapshot {
            input,
            outdir: p.transcode_outdir.clone(),
            threads: p.threads,
            crf: p.crf,
            container: p.container.clone(),
            streams: p.streams.clone(),
        })
    }

    // -- Extraction edits ------------------------------------------------

    pub fn set_device(&self, device: impl Into<PathBuf>) {
        self.inner.write().device = device.into();
        self.bump();
    }

    pub fn set_extraction_outdir(&self, outdir: impl Into<PathBuf>) {
        self.inner.write().extraction_outdir = outdir.into();
        self.bump();
    }

    pub fn set_title(&self, title: u32) {
        self.inner.write().title = title;
        self.bump();
    }

    pub fn set_auto_cat(&self, auto_cat: bool) {
        self.inner.write().auto_cat = auto_cat;
        self.bump();
    }

    // -- Transcode edits -----------------------------------------------------

    pub fn set_input(&self, input: impl Into<PathBuf>) {
        self.inner.write().input = Some(input.into());
        self.bump();
    }

    pub fn set_transcode_outdir(&self, outdir: impl Into<PathBuf>) {
        self.inner.write().transcode_outdir = outdir.into();
        self.bump();
    }

    pub fn set_threads(&self, threads: u32) {
        self.inner.write().threads = threads;
        self.bump();
    }

    pub fn set_crf(&self, crf: u32) {
        self.inner.write().crf = crf;
        self.bump();
    }

    pub fn set_container(&self, container: impl Into<String>) {
        self.inner.write().container = container.into();
        self.bump();
    }

    // -- Stream list -----------------------------------------------------

    /// Replace the stream list wholesale (done at the start of every new
    /// info probe, and again when its output has been parsed).
    pub fn replace_streams(&self, streams: Vec<StreamSpec>) {
        self.inner.write().streams = streams;
        self.bump();
    }

    /// Current stream list, in discovery order.
    pub fn streams(&self) -> Vec<StreamSpec> {
        self.inner.read().streams.clone()
    }

    /// Toggle selection for the stream with the given probe index.
    /// Unknown indices are ignored.
    pub fn set_stream_selected(&self, index: &str, selected: bool) {
        let mut p = self.inner.write();
        if let Some(s) = p.streams.iter_mut().find(|s| s.index == index) {
            s.selected = selected;
        }
        drop(p);
        self.bump();
    }

    /// Mark every stream selected.
    pub fn select_all_streams(&self) {
        for s in self.inner.write().streams.iter_mut() {
            s.selected = true;
        }
        self.bump();
    }

    /// Edit language/title metadata for an audio/subtitle stream. Ignored
    /// for kinds that carry no metadata and for unknown indices.
    pub fn set_stream_metadata(&self, index: &str, language: Option<String>, title: Option<String>) {
        let mut p = self.inner.write();
        if let Some(s) = p.streams.iter_mut().find(|s| s.index == index) {
            if s.kind.carries_metadata() {
                if language.is_some() {
                    s.language = language;
                }
                if title.is_some() {
                    s.title = title;
                }
            }
        }
        drop(p);
        self.bump();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{StreamKind, StreamSpec};

    fn store() -> ParameterStore {
        ParameterStore::from_config(&Config::default())
    }

    #[test]
    fn extraction_snapshot_reflects_edits() {
        let store = store();
        store.set_device("/dev/sr1");
        store.set_title(3);
        let snap = store.extraction_snapshot();
        assert_eq!(snap.device, PathBuf::from("/dev/sr1"));
        assert_eq!(snap.title, 3);
        assert_eq!(snap.extra_flags, vec!["-v", "-p"]);
    }

    #[test]
    fn snapshot_is_point_in_time() {
        let store = store();
        let snap = store.extraction_snapshot();
        store.set_device("/dev/sr9");
        // The earlier snapshot is unaffected by later edits.
        assert_eq!(snap.device, PathBuf::from("/dev/sr0"));
    }

    #[test]
    fn transcode_snapshot_requires_input() {
        let store = store();
        assert!(matches!(
            store.transcode_snapshot(),
            Err(Error::Validation(_))
        ));
        store.set_input("/tmp/output.vob");
        let snap = store.transcode_snapshot().unwrap();
        assert_eq!(snap.input, PathBuf::from("/tmp/output.vob"));
    }

    #[test]
    fn edits_bump_revision() {
        let store = store();
        let rx = store.subscribe();
        assert_eq!(*rx.borrow(), 0);
        store.set_crf(18);
        store.set_threads(2);
        assert_eq!(*rx.borrow(), 2);
    }

    #[test]
    fn stream_selection_and_metadata() {
        let store = store();
        store.replace_streams(vec![
            StreamSpec::discovered("0:0", StreamKind::Video, "mpeg2video"),
            StreamSpec::discovered("0:1", StreamKind::Audio, "ac3"),
        ]);

        store.set_stream_selected("0:1", true);
        store.set_stream_metadata("0:1", Some("fra".into()), Some("Français".into()));
        // Video streams never carry metadata, even if a collaborator tries.
        store.set_stream_metadata("0:0", Some("fra".into()), None);

        let streams = store.streams();
        assert!(!streams[0].selected);
        assert_eq!(streams[0].language, None);
        assert!(streams[1].selected);
        assert_eq!(streams[1].language.as_deref(), Some("fra"));
        assert_eq!(streams[1].title.as_deref(), Some("Français"));
    }

    #[test]
    fn replace_streams_is_wholesale() {
        let store = store();
        store.replace_streams(vec![StreamSpec::discovered(
            "0:0",
            StreamKind::Video,
            "mpeg2video",
        )]);
        store.set_stream_selected("0:0", true);
        store.replace_streams(vec![StreamSpec::discovered(
            "0:0",
            StreamKind::Video,
            "h264",
        )]);
        let streams = store.streams();
        assert_eq!(streams.len(), 1);
        assert_eq!(streams[0].description, "h264");
        assert!(!streams[0].selected, "fresh probe never merges old state");
    }
}
